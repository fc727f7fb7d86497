//! Projecting the points.

pub use super::*;

use crate::spherical_harmonics;
use bytemuck::cast_slice;

/// Arguments.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Arguments {
    /// `(0 ~ 3)`
    pub colors_sh_degree_max: u32,
    /// `z_far`
    pub depth_far: f32,
    /// `z_near`
    pub depth_near: f32,
    /// `F_x <- I_x / tan(Fov_x / 2) / 2`
    pub focal_length_x: f32,
    /// `F_y <- I_y / tan(Fov_y / 2) / 2`
    pub focal_length_y: f32,
    pub grid: RenderGrid,
    /// Column-major, from view space to clip space.
    pub projection_transform: [[f32; 4]; 4],
    /// `tan(Fov_x / 2) * (C_f + 1)`
    pub view_bound_x: f32,
    /// `tan(Fov_y / 2) * (C_f + 1)`
    pub view_bound_y: f32,
    /// `V_p`
    pub view_position: [f32; 3],
    /// Column-major, from world space to view space.
    pub view_transform: [[f32; 4]; 4],
}

/// Outputs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Outputs {
    /// `[P]`
    pub points: Vec<ProjectedGaussian>,
}

/// A point projected onto the screen.
///
/// A culled point has zero radius and an empty tile rectangle.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ProjectedGaussian {
    /// `C_rgb`, clamped at zero.
    pub color_rgb: [f32; 3],
    /// `Σ'^-1` as `[a, b, c]` of `[[a, b], [b, c]]`
    pub conic: [f32; 3],
    /// `P_v.z`
    pub depth: f32,
    pub is_color_rgb_not_clamped: [bool; 3],
    pub opacity: f32,
    /// `P'` in pixels.
    pub position_2d: [f32; 2],
    /// `r` in pixels.
    pub radius: u32,
    pub tile_rect: TileRect,
}

/// `C_f`
pub const FILTER_LOW_PASS: f64 = 0.3;
/// The determinant floor of `Σ'`.
pub const DETERMINANT_MIN: f32 = f32::EPSILON;

impl ProjectedGaussian {
    #[inline]
    pub const fn is_visible(&self) -> bool {
        self.radius > 0
    }

    /// `T`
    #[inline]
    pub const fn tile_count(&self) -> u32 {
        self.tile_rect.count()
    }
}

/// The view transforms as matrices.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ViewMatrices {
    /// `V_p`
    pub position: Vector3<f32>,
    /// From view space to clip space.
    pub projection: Matrix4<f32>,
    /// `R_v`
    pub rotation: Matrix3<f32>,
    /// From world space to view space.
    pub transform: Matrix4<f32>,
}

impl ViewMatrices {
    pub fn new(arguments: &Arguments) -> Self {
        let transform = matrix4_from_columns(&arguments.view_transform);
        Self {
            position: Vector3::from(arguments.view_position),
            projection: matrix4_from_columns(&arguments.projection_transform),
            rotation: transform.fixed_view::<3, 3>(0, 0).into_owned(),
            transform,
        }
    }

    /// `P_v = R_v * P + T_v`
    #[inline]
    pub fn to_view(
        &self,
        position: &[f32; 3],
    ) -> Vector3<f32> {
        (self.transform * Point3::from(*position).to_homogeneous()).xyz()
    }

    /// `P_c = P_proj * [P_v, 1]`
    #[inline]
    pub fn to_clip(
        &self,
        position_view: &Vector3<f32>,
    ) -> Vector4<f32> {
        self.projection * Point3::from(*position_view).to_homogeneous()
    }

    /// `D_v = (P - V_p) / |P - V_p|` and `|P - V_p|`
    #[inline]
    pub fn direction(
        &self,
        position: &[f32; 3],
    ) -> (Vector3<f32>, f32) {
        let offset = Vector3::from(*position) - self.position;
        let norm = offset.norm().max(f32::EPSILON);
        (offset / norm, norm)
    }
}

/// Projecting the points.
///
/// For each one of the `P` points, do the following steps:
///
/// 1. Transform the position from world space to view space,
///    `P_v = R_v * P + T_v`, and cull the point if `P_v.z <= z_near`.
/// 2. Compute the 3D covariance `Σ = (R * S) * (R * S)^T`
///    from the normalized quaternion `R` and the scaling `S`.
/// 3. Project the position onto the screen with the projection transform,
///    `P' = ((P_c.xy / P_c.w + 1) * I - 1) / 2`.
/// 4. Project the covariance with the local affine approximation,
///    `Σ' = J * R_v * Σ * (J * R_v)^T + C_f * I`.
/// 5. Invert `Σ'` and cull the point if its determinant is too small.
/// 6. Estimate the radius `r = ceil(3 * sqrt(λ_max))`,
///    clamp its pixel box to the image and find the touched tiles.
/// 7. Transform the color from SH space to RGB space
///    using the viewing direction `D_v = (P - V_p) / |P - V_p|`.
pub fn main(
    arguments: &Arguments,
    inputs: &forward::RenderInput,
) -> Outputs {
    // M
    let colors_sh_count = inputs.colors_sh_count();
    let view = ViewMatrices::new(arguments);

    let points = (0..inputs.point_count())
        .into_par_iter()
        .map(|index| {
            let colors_sh: &[[f32; 3]] = cast_slice(
                &inputs.colors_sh
                    [index * colors_sh_count * 3..(index + 1) * colors_sh_count * 3],
            );
            project_point(
                arguments,
                &view,
                colors_sh,
                inputs.opacities[index],
                &inputs.positions[index],
                &inputs.rotations[index],
                &inputs.scalings[index],
            )
        })
        .collect();

    Outputs { points }
}

fn project_point(
    arguments: &Arguments,
    view: &ViewMatrices,
    colors_sh: &[[f32; 3]],
    opacity: f32,
    position: &[f32; 3],
    rotation: &[f32; 4],
    scaling: &[f32; 3],
) -> ProjectedGaussian {
    let culled = ProjectedGaussian::default();

    // P_v
    let position_view = view.to_view(position);
    let depth = position_view.z;
    if depth.is_nan() || depth <= arguments.depth_near {
        return culled;
    }

    // P_c
    let position_clip = view.to_clip(&position_view);
    if position_clip.w.is_nan() || position_clip.w <= f32::EPSILON {
        return culled;
    }

    let rotation_norm = rotation.iter().map(|q| q * q).sum::<f32>().sqrt();
    if rotation_norm.is_nan() || rotation_norm <= f32::EPSILON {
        return culled;
    }

    // Σ
    let covariance_3d = {
        let m = rotation_matrix(rotation) * Matrix3::from_diagonal(&Vector3::from(*scaling));
        m * m.transpose()
    };

    // P'
    let grid = &arguments.grid;
    let position_2d = [
        ((position_clip.x / position_clip.w + 1.0) * grid.image_size_x as f32 - 1.0) / 2.0,
        ((position_clip.y / position_clip.w + 1.0) * grid.image_size_y as f32 - 1.0) / 2.0,
    ];

    // Σ' = T * Σ * T^T + C_f * I, where T = J * R_v
    let t = jacobian_view(arguments, view, &position_view);
    let covariance_2d = covariance_2d(&t, &covariance_3d);

    // |Σ'|
    let [a, b, c] = covariance_2d;
    let determinant = a * c - b * b;
    if determinant.is_nan() || determinant <= DETERMINANT_MIN {
        return culled;
    }
    let conic = [c / determinant, -b / determinant, a / determinant];

    // r <- ceil(3 * sqrt(λ_max))
    let middle = (a + c) / 2.0;
    let eigenvalue_max = middle + (middle * middle - determinant).max(0.1).sqrt();
    let radius = (3.0 * eigenvalue_max.sqrt()).ceil();

    let tile_rect = tile_rect(grid, &position_2d, radius);
    if tile_rect.count() == 0 {
        return culled;
    }

    // D_v
    let direction: [f32; 3] = view.direction(position).0.into();
    let color_rgb = spherical_harmonics::to_rgb(
        arguments.colors_sh_degree_max,
        &direction,
        colors_sh,
    )
    .map(|c| c + 0.5);
    let is_color_rgb_not_clamped = color_rgb.map(|c| c >= 0.0);

    ProjectedGaussian {
        color_rgb: color_rgb.map(|c| c.max(0.0)),
        conic,
        depth,
        is_color_rgb_not_clamped,
        opacity,
        position_2d,
        radius: radius as u32,
        tile_rect,
    }
}

/// `J * R_v`, where `J` is the Jacobian of the perspective projection
/// with the tangent clamped to the view bound.
pub(crate) fn jacobian_view(
    arguments: &Arguments,
    view: &ViewMatrices,
    position_view: &Vector3<f32>,
) -> Matrix2x3<f32> {
    let z = position_view.z;
    let u = (position_view.x / z).clamp(-arguments.view_bound_x, arguments.view_bound_x);
    let v = (position_view.y / z).clamp(-arguments.view_bound_y, arguments.view_bound_y);
    let f_x = arguments.focal_length_x;
    let f_y = arguments.focal_length_y;

    #[rustfmt::skip]
    let j = Matrix2x3::new(
        f_x / z, 0.0, -f_x * u / z,
        0.0, f_y / z, -f_y * v / z,
    );
    j * view.rotation
}

/// `T * Σ * T^T + C_f * I` as `[a, b, c]`
pub(crate) fn covariance_2d(
    t: &Matrix2x3<f32>,
    covariance_3d: &Matrix3<f32>,
) -> [f32; 3] {
    let covariance_2d = t * covariance_3d * t.transpose();
    let filter = FILTER_LOW_PASS as f32;
    [
        covariance_2d[(0, 0)] + filter,
        covariance_2d[(0, 1)],
        covariance_2d[(1, 1)] + filter,
    ]
}

/// The touched tiles of a disk.
///
/// The pixel box of the disk is clamped to the image before it is
/// converted to tiles, so the rectangle is empty if the box misses the image.
pub(crate) fn tile_rect(
    grid: &RenderGrid,
    position_2d: &[f32; 2],
    radius: f32,
) -> TileRect {
    let [x, y] = *position_2d;
    let x_last = (grid.image_size_x - 1) as f32;
    let y_last = (grid.image_size_y - 1) as f32;

    let x_low = (x - radius).max(0.0);
    let x_high = (x + radius).min(x_last);
    let y_low = (y - radius).max(0.0);
    let y_high = (y + radius).min(y_last);
    // The NaN comparisons are also empty
    if !(x_low <= x_high && y_low <= y_high) {
        return TileRect::default();
    }

    let size_x = grid.tile_size_x as f32;
    let size_y = grid.tile_size_y as f32;
    TileRect {
        x_max: (x_high / size_x) as u32 + 1,
        x_min: (x_low / size_x) as u32,
        y_max: (y_high / size_y) as u32 + 1,
        y_min: (y_low / size_y) as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A camera at the origin looking along `+z`, with `tan(Fov / 2) = 0.5`.
    fn arguments(
        image_size: u32,
        tile_size: u32,
    ) -> Arguments {
        let field_of_view = 2.0 * 0.5_f64.atan();
        let identity = [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        let projection = View::projection(0.01, 100.0, field_of_view, field_of_view)
            .map(|col| col.map(|v| v as f32));

        Arguments {
            colors_sh_degree_max: 0,
            depth_far: 100.0,
            depth_near: 0.01,
            focal_length_x: image_size as f32,
            focal_length_y: image_size as f32,
            grid: RenderGrid::new(image_size, image_size, tile_size, tile_size).unwrap(),
            projection_transform: projection,
            view_bound_x: 0.5 * 1.3,
            view_bound_y: 0.5 * 1.3,
            view_position: [0.0; 3],
            view_transform: identity,
        }
    }

    fn input(positions: Vec<[f32; 3]>) -> forward::RenderInput {
        let point_count = positions.len();
        forward::RenderInput {
            colors_sh: vec![0.0; point_count * 3],
            opacities: vec![0.5; point_count],
            positions,
            rotations: vec![[0.0, 0.0, 0.0, 1.0]; point_count],
            scalings: vec![[0.1; 3]; point_count],
        }
    }

    #[test]
    fn project_center() {
        let arguments = arguments(16, 16);
        let outputs = main(&arguments, &input(vec![[0.0, 0.0, 4.0]]));
        let point = outputs.points[0];

        assert!(point.is_visible());
        assert!((point.position_2d[0] - 7.5).abs() < 1e-5);
        assert!((point.position_2d[1] - 7.5).abs() < 1e-5);
        assert_eq!(point.depth, 4.0);
        assert_eq!(point.tile_count(), 1);
        assert_eq!(point.color_rgb, [0.5; 3]);
        assert_eq!(point.is_color_rgb_not_clamped, [true; 3]);

        // Σ' = (F / z * s)^2 + C_f
        let variance = (16.0 / 4.0 * 0.1_f32).powi(2) + 0.3;
        assert!((point.conic[0] - 1.0 / variance).abs() < 1e-4);
        assert!(point.conic[1].abs() < 1e-6);
        assert!((point.conic[2] - 1.0 / variance).abs() < 1e-4);
        let eigenvalue_max = variance + 0.1_f32.sqrt();
        assert_eq!(point.radius, (3.0 * eigenvalue_max.sqrt()).ceil() as u32);
    }

    #[test]
    fn project_culled() {
        let arguments = arguments(16, 4);
        let outputs = main(
            &arguments,
            &input(vec![
                // Behind the camera
                [0.0, 0.0, -4.0],
                // On the near plane
                [0.0, 0.0, 0.01],
                // Out of the image
                [20.0, 0.0, 5.0],
                [0.0, -30.0, 5.0],
            ]),
        );

        for (index, point) in outputs.points.iter().enumerate() {
            assert_eq!(point.radius, 0, "index: {index}");
            assert_eq!(point.tile_count(), 0, "index: {index}");
        }
    }

    #[test]
    fn project_tile_rect_clamped() {
        let arguments = arguments(16, 4);
        // Near the left edge
        let outputs = main(&arguments, &input(vec![[-1.75, 0.0, 4.0]]));
        let point = outputs.points[0];

        assert!(point.is_visible());
        assert_eq!(point.tile_rect.x_min, 0);
        assert!(point.tile_rect.x_max <= 4);
        assert!(point.tile_rect.y_max <= 4);
    }

    #[test]
    fn project_color_clamped() {
        let arguments = arguments(16, 16);
        let mut input = input(vec![[0.0, 0.0, 4.0]]);
        // rgb <- C_0 * c + 0.5
        input.colors_sh = vec![-4.0, 0.0, 4.0];
        let point = main(&arguments, &input).points[0];

        assert_eq!(point.color_rgb[0], 0.0);
        assert_eq!(point.color_rgb[1], 0.5);
        assert!(point.color_rgb[2] > 1.0);
        assert_eq!(point.is_color_rgb_not_clamped, [false, true, true]);
    }

    #[test]
    fn tile_rect_bounds() {
        let grid = RenderGrid::new(33, 17, 16, 16).unwrap();

        let rect = tile_rect(&grid, &[16.0, 8.0], 3.0);
        assert_eq!(
            rect,
            TileRect {
                x_max: 2,
                x_min: 0,
                y_max: 1,
                y_min: 0,
            }
        );

        let rect = tile_rect(&grid, &[-40.0, 8.0], 3.0);
        assert_eq!(rect.count(), 0);

        // Touching the last pixel column
        let rect = tile_rect(&grid, &[35.0, 8.0], 3.0);
        assert_eq!((rect.x_min, rect.x_max), (2, 3));
    }

    #[test]
    fn tile_rect_outside_partial_edge_tile() {
        // The last tile covers the pixels 16 to 31, but the image ends at 16.
        let grid = RenderGrid::new(17, 17, 16, 16).unwrap();

        let rect = tile_rect(&grid, &[24.0, 6.0], 3.0);
        assert_eq!(rect, TileRect::default());
        assert_eq!(rect.count(), 0);

        let rect = tile_rect(&grid, &[6.0, 24.0], 3.0);
        assert_eq!(rect.count(), 0);

        let rect = tile_rect(&grid, &[19.0, 6.0], 3.0);
        assert_eq!(
            rect,
            TileRect {
                x_max: 2,
                x_min: 1,
                y_max: 1,
                y_min: 0,
            }
        );
    }

    #[test]
    fn project_outside_partial_edge_tile() {
        let mut arguments = arguments(16, 16);
        // 17 x 17 pixels in 2 x 2 tiles
        arguments.grid = RenderGrid::new(17, 17, 16, 16).unwrap();
        arguments.focal_length_x = 17.0;
        arguments.focal_length_y = 17.0;

        // P'.x = ((x / z / 0.5 + 1) * 17 - 1) / 2
        let outputs = main(&arguments, &input(vec![[3.2, 0.0, 4.0], [1.882, 0.0, 4.0]]));
        let [outside, inside] = [outputs.points[0], outputs.points[1]];

        // 21.6 - 3 is beyond the last column
        assert!((outside.position_2d[0] - 21.6).abs() < 1e-3, "{outside:?}");
        assert_eq!(outside.radius, 0);
        assert_eq!(outside.tile_count(), 0);
        assert!(!outside.is_visible());

        // 16.0 - 3 touches both tile columns
        assert!((inside.position_2d[0] - 16.0).abs() < 1e-2, "{inside:?}");
        assert!(inside.is_visible());
        assert_eq!(inside.radius, 3);
        assert_eq!(inside.tile_count(), 2);
        assert_eq!(inside.tile_rect.x_max, 2);
    }
}
