//! The outer values of a scene and their gradients.
//!
//! | Parameter   | Shape        | Outer value `X` | `dL/dx`                         |
//! |-------------|--------------|-----------------|---------------------------------|
//! | `colors_sh` | `[P, M * 3]` | `x`             | `dL/dX`                         |
//! | `opacities` | `[P, 1]`     | `sigmoid(x)`    | `dL/dX * X * (1 - X)`           |
//! | `positions` | `[P, 3]`     | `x`             | `dL/dX`                         |
//! | `rotations` | `[P, 4]`     | `x / abs(x)`    | `(dL/dX - X * (X · dL/dX)) / abs(x)` |
//! | `scalings`  | `[P, 3]`     | `exp(x)`        | `dL/dX * X`                     |

pub use super::*;

use burn::tensor::activation;

/// Outer values
impl<B: Backend> Gaussian3dScene<B> {
    /// `[P, M * 3]`
    ///
    /// The row of a point is its `[M, 3]` coefficients flattened,
    /// so the channels of a coefficient are adjacent.
    #[inline]
    pub fn get_colors_sh(&self) -> Tensor<B, 2> {
        self.colors_sh.val()
    }

    /// `[P, 1]` in `(0, 1)`
    #[inline]
    pub fn get_opacities(&self) -> Tensor<B, 2> {
        activation::sigmoid(self.opacities.val())
    }

    /// `[P, 3]`
    #[inline]
    pub fn get_positions(&self) -> Tensor<B, 2> {
        self.positions.val()
    }

    /// `[P, 4]`, the normalized quaternions `[x, y, z, w]`.
    #[inline]
    pub fn get_rotations(&self) -> Tensor<B, 2> {
        let (rotations, _) = normalize(self.rotations.val());
        rotations
    }

    /// `[P, 3]`
    #[inline]
    pub fn get_scalings(&self) -> Tensor<B, 2> {
        self.scalings.val().exp()
    }
}

/// Inverse activations
impl<B: Backend> Gaussian3dScene<B> {
    #[inline]
    pub fn make_inner_colors_sh(colors_sh: Tensor<B, 2>) -> Tensor<B, 2> {
        colors_sh
    }

    /// `logit(O)`
    #[inline]
    pub fn make_inner_opacities(opacities: Tensor<B, 2>) -> Tensor<B, 2> {
        opacities.to_owned().div(-opacities + 1.0).log()
    }

    #[inline]
    pub fn make_inner_positions(positions: Tensor<B, 2>) -> Tensor<B, 2> {
        positions
    }

    #[inline]
    pub fn make_inner_rotations(rotations: Tensor<B, 2>) -> Tensor<B, 2> {
        rotations
    }

    /// `log(S)`
    #[inline]
    pub fn make_inner_scalings(scalings: Tensor<B, 2>) -> Tensor<B, 2> {
        scalings.log()
    }
}

/// Chaining the gradients of the outer values into the parameters
impl<B: Backend> Gaussian3dScene<B> {
    #[inline]
    pub fn make_inner_colors_sh_grad(
        &self,
        colors_sh_grad: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        colors_sh_grad
    }

    pub fn make_inner_opacities_grad(
        &self,
        opacities_grad: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let opacities = self.get_opacities();
        opacities_grad * opacities.to_owned() * (-opacities + 1.0)
    }

    #[inline]
    pub fn make_inner_positions_grad(
        &self,
        positions_grad: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        positions_grad
    }

    pub fn make_inner_rotations_grad(
        &self,
        rotations_grad: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let (rotations, norms) = normalize(self.rotations.val());
        let dots = (rotations.to_owned() * rotations_grad.to_owned()).sum_dim(1);
        (rotations_grad - rotations * dots) / norms
    }

    pub fn make_inner_scalings_grad(
        &self,
        scalings_grad: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        scalings_grad * self.get_scalings()
    }
}

impl<B: Backend> Gaussian3dScene<B> {
    #[inline]
    pub fn device(&self) -> B::Device {
        self.devices().first().cloned().unwrap_or_default()
    }

    /// `P`
    #[inline]
    pub fn point_count(&self) -> usize {
        self.colors_sh.dims()[0]
    }

    /// `M`
    #[inline]
    pub fn colors_sh_count(&self) -> usize {
        self.colors_sh.dims()[1] / 3
    }
}

/// `(x / abs(x), abs(x))` for each row.
fn normalize<B: Backend>(rotations: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
    let norms = rotations.to_owned().powf_scalar(2.0).sum_dim(1).sqrt();
    (rotations / norms.to_owned(), norms)
}
