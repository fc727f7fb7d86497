//! Tile-based rasterization of 3D Gaussians.
//!
//! A frame is rendered in five stages:
//!
//! 1. [`kernel::project`]: projecting the points onto the image.
//! 2. [`kernel::key`]: duplicating the points for each touched tile.
//! 3. [`kernel::sort`]: sorting the duplicated entries by tile and depth.
//! 4. [`kernel::range`]: segmenting the sorted entries into tiles.
//! 5. [`kernel::composite`]: blending the entries of each tile front-to-back.
//!
//! The backward pass walks the saved state of a forward pass in reverse.

pub mod backward;
pub mod cpu;
pub mod forward;
pub mod grid;
pub mod kernel;
pub mod pipeline;
pub mod registry;

pub use crate::{
    error::Error,
    render::view::View,
    spherical_harmonics::{sh_count, SH_DEGREE_MAX},
};
pub use burn::config::Config;
pub use cpu::CpuRasterizer;
pub use grid::*;
pub use registry::RasterizerRegistry;

use std::{fmt, sync::Arc};

/// A rasterizer executing the stages on a specific target.
///
/// Each stage follows the kernel contract in [`kernel`].
pub trait Gaussian3dRasterizer: 'static + Send + Sync + fmt::Debug {
    /// `(T_x, T_y)`
    fn tile_size(&self) -> (u32, u32);

    fn project(
        &self,
        arguments: &kernel::project::Arguments,
        input: &forward::RenderInput,
    ) -> kernel::project::Outputs;

    fn generate_keys(
        &self,
        arguments: &kernel::key::Arguments,
        inputs: kernel::key::Inputs,
    ) -> Result<kernel::key::Outputs, Error>;

    fn sort(
        &self,
        inputs: kernel::sort::Inputs,
    );

    fn build_ranges(
        &self,
        arguments: &kernel::range::Arguments,
        inputs: kernel::range::Inputs,
    ) -> kernel::range::Outputs;

    fn composite(
        &self,
        arguments: &kernel::composite::Arguments,
        inputs: kernel::composite::Inputs,
    ) -> kernel::composite::Outputs;

    fn composite_backward(
        &self,
        arguments: &kernel::composite_backward::Arguments,
        inputs: kernel::composite_backward::Inputs,
    ) -> Result<kernel::composite_backward::Outputs, Error>;

    fn project_backward(
        &self,
        arguments: &kernel::project::Arguments,
        inputs: kernel::project_backward::Inputs,
    ) -> Result<kernel::project_backward::Outputs, Error>;
}

#[derive(Config, Debug)]
pub struct Gaussian3dRenderOptions {
    #[config(default = "[0.0, 0.0, 0.0]")]
    /// It should be black.
    pub background_rgb: [f32; 3],

    #[config(default = "SH_DEGREE_MAX")]
    /// It should be no more than [`SH_DEGREE_MAX`].
    pub colors_sh_degree_max: u32,

    #[config(default = 100.0)]
    /// `z_far`
    pub depth_far: f64,

    #[config(default = 0.01)]
    /// `z_near`, which is also the culling plane.
    pub depth_near: f64,

    #[config(default = "ENTRY_COUNT_MAX")]
    /// The maximum count of the duplicated entries in a frame.
    pub entry_count_max: u32,

    #[config(default = "RenderMode::Rgb")]
    pub render_mode: RenderMode,

    #[config(default = 16)]
    /// `T_x`, which should be one of [`TILE_SIZES`].
    pub tile_size_x: u32,

    #[config(default = 16)]
    /// `T_y`, which should be one of [`TILE_SIZES`].
    pub tile_size_y: u32,
}

#[derive(Config, Debug, PartialEq, Eq)]
pub enum RenderMode {
    Rgb,
    Depth,
    RgbDepth,
}

/// The default maximum count of the duplicated entries, which take 1 GiB.
pub const ENTRY_COUNT_MAX: u32 = 1 << 26;

/// The supported tile sizes.
pub const TILE_SIZES: [u32; 3] = [4, 8, 16];

/// The renderer dispatching the frames to the rasterizers in its registry.
#[derive(Debug, Default)]
pub struct Gaussian3dRenderer {
    registry: RasterizerRegistry,
}

impl Gaussian3dRenderOptions {
    /// Rejecting the unsupported options eagerly.
    pub fn validate(&self) -> Result<&Self, Error> {
        if self.render_mode != RenderMode::Rgb {
            return Err(Error::Configuration(format!(
                "render mode ({:?})",
                self.render_mode
            )));
        }
        if self.background_rgb != [0.0; 3] {
            return Err(Error::Configuration(format!(
                "background ({:?})",
                self.background_rgb
            )));
        }
        if !TILE_SIZES.contains(&self.tile_size_x)
            || !TILE_SIZES.contains(&self.tile_size_y)
        {
            return Err(Error::Configuration(format!(
                "tile size ({}x{})",
                self.tile_size_x, self.tile_size_y
            )));
        }
        if self.colors_sh_degree_max > SH_DEGREE_MAX {
            return Err(Error::Configuration(format!(
                "colors_sh_degree_max ({})",
                self.colors_sh_degree_max
            )));
        }

        let is_depth_range_valid = self.depth_near.is_finite()
            && self.depth_far.is_finite()
            && self.depth_near > 0.0
            && self.depth_far > self.depth_near;
        if !is_depth_range_valid {
            return Err(Error::Validation(
                format!("depth range ({}, {})", self.depth_near, self.depth_far),
                "0 < z_near < z_far".into(),
            ));
        }

        Ok(self)
    }
}

impl Gaussian3dRenderer {
    #[inline]
    pub fn new(registry: RasterizerRegistry) -> Self {
        Self { registry }
    }

    #[inline]
    pub fn registry(&self) -> &RasterizerRegistry {
        &self.registry
    }

    /// Returns the rasterizer for the tile size of `options`.
    pub fn rasterizer(
        &self,
        options: &Gaussian3dRenderOptions,
    ) -> Result<Arc<dyn Gaussian3dRasterizer>, Error> {
        options.validate()?;
        self.registry.get(options.tile_size_x, options.tile_size_y)
    }

    /// Rendering a frame of `input` from `view`.
    pub fn forward(
        &self,
        input: forward::RenderInput,
        view: &View,
        options: &Gaussian3dRenderOptions,
    ) -> Result<forward::RenderOutput, Error> {
        let rasterizer = self.rasterizer(options)?;
        pipeline::forward(rasterizer.as_ref(), input, view, options)
    }

    /// Computing the gradients of the frame saved in `state`.
    pub fn backward(
        &self,
        state: backward::RenderInput,
        colors_rgb_2d_grad: &[[f32; 3]],
    ) -> Result<backward::RenderOutput, Error> {
        let grid = &state.arguments.grid;
        let rasterizer = self.registry.get(grid.tile_size_x, grid.tile_size_y)?;
        pipeline::backward(rasterizer.as_ref(), state, colors_rgb_2d_grad)
    }
}

impl Default for Gaussian3dRenderOptions {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
