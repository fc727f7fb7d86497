pub mod config;
pub mod property;
pub mod render;

pub use crate::{
    error::Error,
    render::{
        gaussian_3d::{
            backward, forward, Gaussian3dRenderOptions, Gaussian3dRenderer,
        },
        view::View,
    },
    spherical_harmonics::{SH_COEF, SH_COUNT_MAX},
};
pub use burn::{
    module::{Module, Param},
    tensor::{backend::Backend, Bool, Int, Tensor, TensorData},
};
pub use config::*;
pub use render::*;

use std::fmt;

/// 3D Gaussian splats as trainable parameters.
///
/// The parameters hold the inner values,
/// which are activated into the outer values for rendering.
#[derive(Module)]
pub struct Gaussian3dScene<B: Backend> {
    /// `[P, M * 3]`
    pub colors_sh: Param<Tensor<B, 2>>,
    /// `[P, 1]`
    pub opacities: Param<Tensor<B, 2>>,
    /// `[P, 3]`
    pub positions: Param<Tensor<B, 2>>,
    /// `[P, 4]`
    pub rotations: Param<Tensor<B, 2>>,
    /// `[P, 3]`
    pub scalings: Param<Tensor<B, 2>>,
}

impl<B: Backend> fmt::Debug for Gaussian3dScene<B> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("Gaussian3dScene")
            .field("device", &self.device())
            .field("point_count", &self.point_count())
            .field("colors_sh_count", &self.colors_sh_count())
            .field("num_params", &self.num_params())
            .finish()
    }
}

impl<B: Backend> Default for Gaussian3dScene<B> {
    fn default() -> Self {
        Gaussian3dSceneConfig::default().into()
    }
}
