//! Compositing the points onto the image (backward).

pub use super::*;

use composite::{density, Density};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Arguments {
    pub grid: RenderGrid,
}

#[derive(Clone, Copy, Debug)]
pub struct Inputs<'a> {
    /// `[I_y, I_x, 3]`
    pub colors_rgb_2d_grad: &'a [[f32; 3]],
    /// `[I_y, I_x]`
    pub last_contributors: &'a [u32],
    /// `[T]`
    pub point_indices: &'a [u32],
    /// `[P]`
    pub points: &'a [ProjectedGaussian],
    /// `[I_y / T_y, I_x / T_x]`
    pub tile_ranges: &'a [TileRange],
    /// `[I_y, I_x]`
    pub transmittances: &'a [f32],
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Outputs {
    /// `[P, 3]`
    pub colors_rgb_grad: Vec<[f32; 3]>,
    /// `[P, 3]`
    pub conics_grad: Vec<[f32; 3]>,
    /// `[P]`
    pub opacities_grad: Vec<f32>,
    /// `[P, 2]`
    pub positions_2d_grad: Vec<[f32; 2]>,
}

/// The gradients of one duplicated entry.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EntryGrad {
    pub color_rgb: [f32; 3],
    pub conic: [f32; 3],
    pub opacity: f32,
    pub position_2d: [f32; 2],
}

impl EntryGrad {
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.color_rgb.iter().all(|v| v.is_finite())
            && self.conic.iter().all(|v| v.is_finite())
            && self.opacity.is_finite()
            && self.position_2d.iter().all(|v| v.is_finite())
    }
}

/// Compositing the points onto the image (backward).
///
/// Each tile accumulates into its own slice of the per-entry gradients,
/// which are then reduced into the points in entry order.
pub fn main(
    arguments: &Arguments,
    inputs: Inputs,
) -> Result<Outputs, Error> {
    let grid = &arguments.grid;
    // I_x
    let image_size_x = grid.image_size_x as usize;
    // P
    let point_count = inputs.points.len();

    // [T]
    let mut entries_grad = vec![EntryGrad::default(); inputs.point_indices.len()];

    // The ranges are disjoint, ordered by tile and covering all entries.
    let mut slices = Vec::with_capacity(grid.tile_count());
    let mut rest = entries_grad.as_mut_slice();
    for range in inputs.tile_ranges {
        let (slice, tail) = rest.split_at_mut(range.len());
        slices.push(slice);
        rest = tail;
    }

    slices
        .into_par_iter()
        .zip(inputs.tile_ranges)
        .enumerate()
        .try_for_each(|(tile_index, (tile_grad, range))| {
            if range.is_empty() {
                return Ok(());
            }

            let point_indices = &inputs.point_indices[range.as_range()];
            let (xs, ys) = grid.tile_pixel_bounds(tile_index as u32);
            for y in ys {
                for x in xs.clone() {
                    let index = y as usize * image_size_x + x as usize;
                    blend_backward(
                        &[x as f32, y as f32],
                        &point_indices[..inputs.last_contributors[index] as usize],
                        inputs.points,
                        inputs.transmittances[index],
                        &inputs.colors_rgb_2d_grad[index],
                        tile_grad,
                    );
                }
            }

            match tile_grad.iter().position(|grad| !grad.is_finite()) {
                Some(offset) => Err(Error::NumericalFault(
                    "composite gradient".into(),
                    point_indices[offset],
                    Some(tile_index as u32),
                )),
                None => Ok(()),
            }
        })?;

    // Reducing the gradients of entries into points

    let mut outputs = Outputs {
        colors_rgb_grad: vec![[0.0; 3]; point_count],
        conics_grad: vec![[0.0; 3]; point_count],
        opacities_grad: vec![0.0; point_count],
        positions_2d_grad: vec![[0.0; 2]; point_count],
    };
    for (grad, &point_index) in entries_grad.iter().zip(inputs.point_indices) {
        let index = point_index as usize;
        let color_rgb_grad = &mut outputs.colors_rgb_grad[index];
        color_rgb_grad[0] += grad.color_rgb[0];
        color_rgb_grad[1] += grad.color_rgb[1];
        color_rgb_grad[2] += grad.color_rgb[2];
        let conic_grad = &mut outputs.conics_grad[index];
        conic_grad[0] += grad.conic[0];
        conic_grad[1] += grad.conic[1];
        conic_grad[2] += grad.conic[2];
        outputs.opacities_grad[index] += grad.opacity;
        let position_2d_grad = &mut outputs.positions_2d_grad[index];
        position_2d_grad[0] += grad.position_2d[0];
        position_2d_grad[1] += grad.position_2d[1];
    }

    Ok(outputs)
}

/// Blending the sorted points back-to-front at the pixel.
///
/// `point_indices` ends at the last contributor,
/// and `entries_grad` is aligned with the tile's entries.
pub fn blend_backward(
    pixel: &[f32; 2],
    point_indices: &[u32],
    points: &[ProjectedGaussian],
    transmittance: f32,
    color_rgb_2d_grad: &[f32; 3],
    entries_grad: &mut [EntryGrad],
) {
    let g = color_rgb_2d_grad;
    let mut transmittance = transmittance;
    // The color blended behind the current point
    let mut color_rgb_behind = [0.0; 3];
    let mut color_rgb_last = [0.0; 3];
    let mut alpha_last = 0.0;

    for (position, &point_index) in point_indices.iter().enumerate().rev() {
        let point = &points[point_index as usize];
        let Some(Density {
            alpha,
            distance,
            gaussian,
            is_alpha_clamped,
        }) = density(point, pixel)
        else {
            continue;
        };
        let grad = &mut entries_grad[position];

        // T_i <- T_(i + 1) / (1 - α_i)
        transmittance /= 1.0 - alpha;

        // dL/dC_i = α_i * T_i * dL/dC
        let weight = alpha * transmittance;
        grad.color_rgb[0] += weight * g[0];
        grad.color_rgb[1] += weight * g[1];
        grad.color_rgb[2] += weight * g[2];

        // dL/dα_i = T_i * (C_i - C_behind) * dL/dC
        let mut alpha_grad = 0.0;
        for channel in 0..3 {
            color_rgb_behind[channel] = alpha_last * color_rgb_last[channel]
                + (1.0 - alpha_last) * color_rgb_behind[channel];
            color_rgb_last[channel] = point.color_rgb[channel];
            alpha_grad += (point.color_rgb[channel] - color_rgb_behind[channel]) * g[channel];
        }
        alpha_grad *= transmittance;
        alpha_last = alpha;

        // The clamped α is constant
        if is_alpha_clamped {
            continue;
        }

        // dL/do = G * dL/dα
        grad.opacity += gaussian * alpha_grad;

        // dL/dpower = o * G * dL/dα
        let power_grad = point.opacity * gaussian * alpha_grad;
        let [a, b, c] = point.conic;
        let [x, y] = distance;
        grad.conic[0] += -0.5 * x * x * power_grad;
        grad.conic[1] += -x * y * power_grad;
        grad.conic[2] += -0.5 * y * y * power_grad;
        grad.position_2d[0] += (a * x + b * y) * power_grad;
        grad.position_2d[1] += (b * x + c * y) * power_grad;
    }
}
