//! Initializing a scene from a point cloud.

pub use super::*;
pub use crate::scene::point::{Point, Points};

use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;

/// The opacity of every new splat.
pub const OPACITY_INITIAL: f32 = 0.1;

/// The seed of the scalings of new splats.
pub const SCALING_SEED: u64 = 0x3D65;

#[derive(Clone, PartialEq)]
pub struct Gaussian3dSceneConfig<B: Backend> {
    /// `M`, which is clamped into `[1, SH_COUNT_MAX]`.
    pub colors_sh_count: usize,
    pub device: B::Device,
    pub points: Points,
}

impl<B: Backend> fmt::Debug for Gaussian3dSceneConfig<B> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("Gaussian3dSceneConfig")
            .field("colors_sh_count", &self.colors_sh_count)
            .field("device", &self.device)
            .field("points.len()", &self.points.len())
            .finish()
    }
}

impl<B: Backend> Default for Gaussian3dSceneConfig<B> {
    fn default() -> Self {
        Self {
            colors_sh_count: SH_COUNT_MAX,
            device: Default::default(),
            points: vec![Default::default()],
        }
    }
}

/// Placing a splat at each point.
///
/// A splat starts with the point color, [`OPACITY_INITIAL`], no rotation,
/// and an isotropic scaling from [`initial_scalings`].
impl<B: Backend> From<Gaussian3dSceneConfig<B>> for Gaussian3dScene<B> {
    fn from(config: Gaussian3dSceneConfig<B>) -> Self {
        let Gaussian3dSceneConfig {
            colors_sh_count,
            device,
            points,
        } = config;
        // P
        let point_count = points.len();
        // M
        let colors_sh_count = colors_sh_count.clamp(1, SH_COUNT_MAX);

        // [P, M * 3], only the coefficients of degree 0 are non-zero.
        let mut colors_sh = vec![0.0_f32; point_count * colors_sh_count * 3];
        colors_sh
            .chunks_exact_mut(colors_sh_count * 3)
            .zip(&points)
            .for_each(|(colors_sh, point)| {
                // C_rgb = C_0 * c + 0.5
                colors_sh[..3]
                    .iter_mut()
                    .zip(point.color_rgb)
                    .for_each(|(c, c_rgb)| *c = ((c_rgb - 0.5) / SH_COEF.0[0]) as f32);
            });
        let positions = points
            .iter()
            .flat_map(|point| point.position.map(|p| p as f32))
            .collect();
        let rotations = [0.0, 0.0, 0.0, 1.0].repeat(point_count);
        let scalings = initial_scalings(point_count);

        let tensor = |values: Vec<f32>, size: usize| {
            Tensor::from_data(TensorData::new(values, [point_count, size]), &device)
        };

        Self {
            colors_sh: Param::from_tensor(Self::make_inner_colors_sh(tensor(
                colors_sh,
                colors_sh_count * 3,
            ))),
            opacities: Param::from_tensor(Self::make_inner_opacities(Tensor::full(
                [point_count, 1],
                OPACITY_INITIAL,
                &device,
            ))),
            positions: Param::from_tensor(Self::make_inner_positions(tensor(positions, 3))),
            rotations: Param::from_tensor(Self::make_inner_rotations(tensor(rotations, 4))),
            scalings: Param::from_tensor(Self::make_inner_scalings(tensor(scalings, 3))),
        }
    }
}

/// `[P * 3]`, the scalings `sqrt(X / max(X))` for `X ~ exp(N(0, e))`
/// repeated on the three axes.
///
/// They are in `(0, 1]` and seeded with [`SCALING_SEED`].
pub fn initial_scalings(point_count: usize) -> Vec<f32> {
    let samples = StdRng::seed_from_u64(SCALING_SEED)
        .sample_iter(StandardNormal)
        .take(point_count)
        .map(|sample: f32| (sample * std::f32::consts::E).exp().max(f32::EPSILON))
        .collect::<Vec<_>>();
    let sample_max = samples.iter().copied().fold(f32::EPSILON, f32::max);

    samples
        .into_iter()
        .flat_map(|sample| [(sample / sample_max).sqrt().max(f32::EPSILON); 3])
        .collect()
}
