pub use super::*;

/// The state saved by a forward pass.
#[derive(Clone, Debug)]
pub struct RenderInput {
    pub arguments: kernel::project::Arguments,
    pub input: forward::RenderInput,
    /// `[I_y, I_x]`
    pub last_contributors: Vec<u32>,
    /// `[T]`, sorted by key.
    pub point_indices: Vec<u32>,
    /// `[P]`
    pub points: Vec<kernel::ProjectedGaussian>,
    /// `[I_y / T_y, I_x / T_x]`
    pub tile_ranges: Vec<TileRange>,
    /// `[I_y, I_x]`
    pub transmittances: Vec<f32>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderOutput {
    /// `[P, M * 3]`
    pub colors_sh_grad: Vec<f32>,
    /// `[P]`
    pub opacities_grad: Vec<f32>,
    /// `[P, 2]`
    pub positions_2d_grad: Vec<[f32; 2]>,
    /// `[P]`, the L2 norm of `positions_2d_grad`.
    pub positions_2d_grad_norm: Vec<f32>,
    /// `[P, 3]`
    pub positions_grad: Vec<[f32; 3]>,
    /// `[P, 4]`
    pub rotations_grad: Vec<[f32; 4]>,
    /// `[P, 3]`
    pub scalings_grad: Vec<[f32; 3]>,
}

impl RenderInput {
    /// `T`
    #[inline]
    pub fn entry_count(&self) -> usize {
        self.point_indices.len()
    }
}
