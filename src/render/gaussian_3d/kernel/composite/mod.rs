//! Compositing the points onto the image.

pub use super::*;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Arguments {
    pub grid: RenderGrid,
}

#[derive(Clone, Copy, Debug)]
pub struct Inputs<'a> {
    /// `[T]`, sorted by key.
    pub point_indices: &'a [u32],
    /// `[P]`
    pub points: &'a [ProjectedGaussian],
    /// `[I_y / T_y, I_x / T_x]`
    pub tile_ranges: &'a [TileRange],
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Outputs {
    /// `[I_y, I_x, 3]`
    pub colors_rgb_2d: Vec<[f32; 3]>,
    /// `[I_y, I_x]`
    pub last_contributors: Vec<u32>,
    /// `[I_y, I_x]`
    pub transmittances: Vec<f32>,
}

/// The blending result of a pixel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pixel {
    pub color_rgb: [f32; 3],
    /// The count of entries walked up to the last blended one.
    pub last_contributor: u32,
    /// The final transmittance.
    pub transmittance: f32,
}

/// The opacity of a point at a pixel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Density {
    /// `α = min(o * G, α_max)`
    pub alpha: f32,
    /// `d = [x, y] - P'`
    pub distance: [f32; 2],
    /// `G = exp(power)`
    pub gaussian: f32,
    pub is_alpha_clamped: bool,
}

/// `α_max`
pub const ALPHA_MAX: f32 = 0.999;
/// `α_min`
pub const ALPHA_MIN: f32 = 1.0 / 255.0;
/// `T_min`
pub const TRANSMITTANCE_MIN: f32 = 1e-4;

impl Default for Pixel {
    #[inline]
    fn default() -> Self {
        Self {
            color_rgb: [0.0; 3],
            last_contributor: 0,
            transmittance: 1.0,
        }
    }
}

/// Evaluating the opacity of the point at the pixel.
///
/// It returns `None` if the point is skipped.
#[inline]
pub fn density(
    point: &ProjectedGaussian,
    pixel: &[f32; 2],
) -> Option<Density> {
    let distance = [
        pixel[0] - point.position_2d[0],
        pixel[1] - point.position_2d[1],
    ];
    let [a, b, c] = point.conic;
    let [x, y] = distance;
    let power = -0.5 * (a * x * x + c * y * y) - b * x * y;
    if power > 0.0 {
        return None;
    }

    let gaussian = power.exp();
    let alpha = point.opacity * gaussian;
    let is_alpha_clamped = alpha > ALPHA_MAX;
    let alpha = alpha.min(ALPHA_MAX);
    if alpha < ALPHA_MIN {
        return None;
    }

    Some(Density {
        alpha,
        distance,
        gaussian,
        is_alpha_clamped,
    })
}

/// Blending the sorted points front-to-back at the pixel.
///
/// `on_blend` observes `(walk position, α, T after blending)` of each blended point.
pub fn blend<F: FnMut(usize, f32, f32)>(
    pixel: &[f32; 2],
    point_indices: &[u32],
    points: &[ProjectedGaussian],
    mut on_blend: F,
) -> Pixel {
    let mut output = Pixel::default();

    for (position, &point_index) in point_indices.iter().enumerate() {
        let point = &points[point_index as usize];
        let Some(Density { alpha, .. }) = density(point, pixel) else {
            continue;
        };

        let weight = alpha * output.transmittance;
        output.color_rgb[0] += point.color_rgb[0] * weight;
        output.color_rgb[1] += point.color_rgb[1] * weight;
        output.color_rgb[2] += point.color_rgb[2] * weight;
        output.transmittance *= 1.0 - alpha;
        output.last_contributor = position as u32 + 1;
        on_blend(position, alpha, output.transmittance);

        if output.transmittance < TRANSMITTANCE_MIN {
            break;
        }
    }

    output
}

/// Compositing the points onto the image.
///
/// Each tile is a task and its pixels are walked by the task.
/// The background is black.
pub fn main(
    arguments: &Arguments,
    inputs: Inputs,
) -> Outputs {
    let grid = &arguments.grid;
    // I_x
    let image_size_x = grid.image_size_x as usize;

    // [I_y / T_y, I_x / T_x, (T_y, T_x)]
    let tiles = (0..grid.tile_count() as u32)
        .into_par_iter()
        .map(|tile_index| {
            let range = inputs.tile_ranges[tile_index as usize].as_range();
            let point_indices = &inputs.point_indices[range];
            let (xs, ys) = grid.tile_pixel_bounds(tile_index);
            ys.flat_map(|y| xs.clone().map(move |x| [x as f32, y as f32]))
                .map(|pixel| blend(&pixel, point_indices, inputs.points, |_, _, _| {}))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    let mut outputs = Outputs {
        colors_rgb_2d: vec![[0.0; 3]; grid.pixel_count()],
        last_contributors: vec![0; grid.pixel_count()],
        transmittances: vec![1.0; grid.pixel_count()],
    };

    // Scattering each row of tiles into its band of image rows
    let band_size = grid.tile_size_y as usize * image_size_x;
    outputs
        .colors_rgb_2d
        .par_chunks_mut(band_size)
        .zip(outputs.last_contributors.par_chunks_mut(band_size))
        .zip(outputs.transmittances.par_chunks_mut(band_size))
        .zip(tiles.par_chunks(grid.tile_count_x as usize))
        .for_each(|(((colors_rgb_2d, last_contributors), transmittances), tiles)| {
            for (tile_x, tile) in tiles.iter().enumerate() {
                let x_min = tile_x * grid.tile_size_x as usize;
                let x_max = (x_min + grid.tile_size_x as usize).min(image_size_x);
                let width = x_max - x_min;
                for (offset, pixel) in tile.iter().enumerate() {
                    let index = offset / width * image_size_x + x_min + offset % width;
                    colors_rgb_2d[index] = pixel.color_rgb;
                    last_contributors[index] = pixel.last_contributor;
                    transmittances[index] = pixel.transmittance;
                }
            }
        });

    outputs
}
