//! Projecting the points (backward).

pub use super::*;

use crate::spherical_harmonics;
use bytemuck::{cast_slice, cast_slice_mut};
use project::{covariance_2d, jacobian_view, Arguments, ViewMatrices};

#[derive(Clone, Copy, Debug)]
pub struct Inputs<'a> {
    /// `[P, 3]`
    pub colors_rgb_grad: &'a [[f32; 3]],
    /// `[P, 3]`
    pub conics_grad: &'a [[f32; 3]],
    pub input: &'a forward::RenderInput,
    /// `[P]`
    pub points: &'a [ProjectedGaussian],
    /// `[P, 2]`
    pub positions_2d_grad: &'a [[f32; 2]],
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Outputs {
    /// `[P, M * 3]`
    pub colors_sh_grad: Vec<f32>,
    /// `[P, 3]`
    pub positions_grad: Vec<[f32; 3]>,
    /// `[P, 4]`
    pub rotations_grad: Vec<[f32; 4]>,
    /// `[P, 3]`
    pub scalings_grad: Vec<[f32; 3]>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct PointGrad {
    position: [f32; 3],
    rotation: [f32; 4],
    scaling: [f32; 3],
}

/// Projecting the points (backward).
///
/// The culled points receive zero gradients.
pub fn main(
    arguments: &Arguments,
    inputs: Inputs,
) -> Result<Outputs, Error> {
    let input = inputs.input;
    // P
    let point_count = input.point_count();
    // M
    let colors_sh_count = input.colors_sh_count();

    let view = ViewMatrices::new(arguments);

    // [P, M * 3]
    let mut colors_sh_grad = vec![0.0_f32; point_count * colors_sh_count * 3];

    let points_grad = colors_sh_grad
        .par_chunks_mut((colors_sh_count * 3).max(1))
        .enumerate()
        .map(|(index, colors_sh_grad)| {
            let point = &inputs.points[index];
            if !point.is_visible() {
                return Ok(PointGrad::default());
            }

            let colors_sh: &[[f32; 3]] = cast_slice(
                &input.colors_sh
                    [index * colors_sh_count * 3..(index + 1) * colors_sh_count * 3],
            );
            let grad = project_point_backward(
                arguments,
                &view,
                point,
                colors_sh,
                &input.positions[index],
                &input.rotations[index],
                &input.scalings[index],
                &inputs.colors_rgb_grad[index],
                &inputs.conics_grad[index],
                &inputs.positions_2d_grad[index],
                cast_slice_mut(colors_sh_grad),
            );

            let is_finite = grad.position.iter().all(|v| v.is_finite())
                && grad.rotation.iter().all(|v| v.is_finite())
                && grad.scaling.iter().all(|v| v.is_finite())
                && colors_sh_grad.iter().all(|v| v.is_finite());
            if !is_finite {
                return Err(Error::NumericalFault(
                    "projection gradient".into(),
                    index as u32,
                    None,
                ));
            }

            Ok(grad)
        })
        .collect::<Result<Vec<_>, Error>>()?;

    Ok(Outputs {
        colors_sh_grad,
        positions_grad: points_grad.iter().map(|grad| grad.position).collect(),
        rotations_grad: points_grad.iter().map(|grad| grad.rotation).collect(),
        scalings_grad: points_grad.iter().map(|grad| grad.scaling).collect(),
    })
}

#[allow(clippy::too_many_arguments)]
fn project_point_backward(
    arguments: &Arguments,
    view: &ViewMatrices,
    point: &ProjectedGaussian,
    colors_sh: &[[f32; 3]],
    position: &[f32; 3],
    rotation: &[f32; 4],
    scaling: &[f32; 3],
    color_rgb_grad: &[f32; 3],
    conic_grad: &[f32; 3],
    position_2d_grad: &[f32; 2],
    colors_sh_grad: &mut [[f32; 3]],
) -> PointGrad {
    // Recomputing the forward values

    let position_view = view.to_view(position);
    let position_clip = view.to_clip(&position_view);
    let rotation_norm = rotation.iter().map(|q| q * q).sum::<f32>().sqrt();
    let rotation_normalized = rotation.map(|q| q / rotation_norm);
    let r = rotation_matrix(&rotation_normalized);
    let s = Matrix3::from_diagonal(&Vector3::from(*scaling));
    let m = r * s;
    let covariance_3d = m * m.transpose();
    let t = jacobian_view(arguments, view, &position_view);

    // Color

    let mut position_grad = {
        let (direction, norm) = view.direction(position);
        let color_rgb_grad = [0, 1, 2].map(|channel| {
            if point.is_color_rgb_not_clamped[channel] {
                color_rgb_grad[channel]
            } else {
                0.0
            }
        });
        let direction_grad = Vector3::from(spherical_harmonics::to_rgb_backward(
            arguments.colors_sh_degree_max,
            &[direction.x, direction.y, direction.z],
            colors_sh,
            &color_rgb_grad,
            colors_sh_grad,
        ));

        // dD_v/dP = (I - D_v * D_v^T) / |P - V_p|
        (direction_grad - direction * direction.dot(&direction_grad)) / norm
    };

    // Conic to 2D covariance

    let [a, b, c] = covariance_2d(&t, &covariance_3d);
    let determinant = a * c - b * b;
    let determinant_2_inv = 1.0 / (determinant * determinant);
    let [g_a, g_b, g_c] = *conic_grad;
    let g_a_2d = determinant_2_inv * (-c * c * g_a + b * c * g_b + (determinant - a * c) * g_c);
    let g_b_2d = determinant_2_inv
        * (2.0 * b * c * g_a + (-determinant - 2.0 * b * b) * g_b + 2.0 * a * b * g_c);
    let g_c_2d = determinant_2_inv * ((determinant - a * c) * g_a + a * b * g_b - a * a * g_c);
    // The symmetric gradient matrix
    let covariance_2d_grad = Matrix2::new(g_a_2d, g_b_2d / 2.0, g_b_2d / 2.0, g_c_2d);

    // 2D covariance to 3D covariance and `T = J * R_v`

    // dL/dΣ = T^T * G * T
    let covariance_3d_grad = t.transpose() * covariance_2d_grad * t;
    // dL/dT = 2 * G * T * Σ
    let t_grad = 2.0 * covariance_2d_grad * t * covariance_3d;
    // dL/dJ = dL/dT * R_v^T
    let j_grad = t_grad * view.rotation.transpose();

    // Jacobian to view-space position

    let (x, y, z) = (position_view.x, position_view.y, position_view.z);
    let f_x = arguments.focal_length_x;
    let f_y = arguments.focal_length_y;
    let z_2_inv = 1.0 / (z * z);
    let mut position_view_grad = Vector3::zeros();
    position_view_grad.z += -f_x * z_2_inv * j_grad[(0, 0)] - f_y * z_2_inv * j_grad[(1, 1)];

    let u = x / z;
    if u.abs() > arguments.view_bound_x {
        // J_02 = -F_x * clamp(u) / z
        let u = u.clamp(-arguments.view_bound_x, arguments.view_bound_x);
        position_view_grad.z += f_x * u * z_2_inv * j_grad[(0, 2)];
    } else {
        // J_02 = -F_x * x / z^2
        position_view_grad.x += -f_x * z_2_inv * j_grad[(0, 2)];
        position_view_grad.z += 2.0 * f_x * x * z_2_inv / z * j_grad[(0, 2)];
    }
    let v = y / z;
    if v.abs() > arguments.view_bound_y {
        let v = v.clamp(-arguments.view_bound_y, arguments.view_bound_y);
        position_view_grad.z += f_y * v * z_2_inv * j_grad[(1, 2)];
    } else {
        position_view_grad.y += -f_y * z_2_inv * j_grad[(1, 2)];
        position_view_grad.z += 2.0 * f_y * y * z_2_inv / z * j_grad[(1, 2)];
    }

    // Screen-space position to view-space position

    // dP'/dP_c = I / 2 * [1 / w, -P_c.xy / w^2]
    let w_inv = 1.0 / position_clip.w;
    let ndc_x = position_clip.x * w_inv;
    let ndc_y = position_clip.y * w_inv;
    let scale_x = arguments.grid.image_size_x as f32 / 2.0 * w_inv;
    let scale_y = arguments.grid.image_size_y as f32 / 2.0 * w_inv;
    let position_clip_grad = Vector4::new(
        position_2d_grad[0] * scale_x,
        position_2d_grad[1] * scale_y,
        0.0,
        -position_2d_grad[0] * scale_x * ndc_x - position_2d_grad[1] * scale_y * ndc_y,
    );
    position_view_grad += (view.projection.transpose() * position_clip_grad).xyz();

    // View-space position to world-space position

    position_grad += view.rotation.transpose() * position_view_grad;

    // 3D covariance to rotation and scaling

    // dL/dM = 2 * dL/dΣ * M
    let m_grad = 2.0 * covariance_3d_grad * m;
    let scaling_grad = Vector3::from_fn(|i, _| m_grad.column(i).dot(&r.column(i)));
    let g = m_grad * s;

    // dL/dq' from dL/dR
    let [qx, qy, qz, qw] = rotation_normalized;
    let rotation_normalized_grad = [
        2.0 * (qy * (g[(0, 1)] + g[(1, 0)]) + qz * (g[(0, 2)] + g[(2, 0)])
            + qw * (g[(2, 1)] - g[(1, 2)])
            - 2.0 * qx * (g[(1, 1)] + g[(2, 2)])),
        2.0 * (qx * (g[(0, 1)] + g[(1, 0)]) + qz * (g[(1, 2)] + g[(2, 1)])
            + qw * (g[(0, 2)] - g[(2, 0)])
            - 2.0 * qy * (g[(0, 0)] + g[(2, 2)])),
        2.0 * (qx * (g[(0, 2)] + g[(2, 0)]) + qy * (g[(1, 2)] + g[(2, 1)])
            + qw * (g[(1, 0)] - g[(0, 1)])
            - 2.0 * qz * (g[(0, 0)] + g[(1, 1)])),
        2.0 * (qz * (g[(1, 0)] - g[(0, 1)])
            + qy * (g[(0, 2)] - g[(2, 0)])
            + qx * (g[(2, 1)] - g[(1, 2)])),
    ];

    // dq = (dq' - q' * (q' · dq')) / |q|
    let dot = rotation_normalized
        .iter()
        .zip(&rotation_normalized_grad)
        .map(|(q, g)| q * g)
        .sum::<f32>();
    let rotation_grad = [0, 1, 2, 3]
        .map(|i| (rotation_normalized_grad[i] - rotation_normalized[i] * dot) / rotation_norm);

    PointGrad {
        position: position_grad.into(),
        rotation: rotation_grad,
        scaling: scaling_grad.into(),
    }
}
