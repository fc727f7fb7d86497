//! Rendering the scene with tensors.

pub use super::*;

use bytemuck::{try_cast_slice, Pod};

/// The frame rendered from a scene.
#[derive(Clone, Debug)]
pub struct Gaussian3dRenderOutput<B: Backend> {
    /// `[I_y, I_x]`
    pub alphas_2d: Tensor<B, 2>,
    /// `[I_y, I_x, 3]`
    pub colors_rgb_2d: Tensor<B, 3>,
    /// `[P]`
    pub depths: Tensor<B, 1>,
    /// `[P, 2]`
    pub positions_2d: Tensor<B, 2>,
    /// `[P]`
    pub radii: Tensor<B, 1, Int>,
    /// The state for [`Gaussian3dScene::render_backward`].
    pub state: backward::RenderInput,
    /// `[P]`
    pub visibilities: Tensor<B, 1, Bool>,
}

/// The gradients of the outer values of a scene.
#[derive(Clone, Debug)]
pub struct Gaussian3dRenderGrad<B: Backend> {
    /// `[P, M * 3]`
    pub colors_sh_grad: Tensor<B, 2>,
    /// `[P, 1]`
    pub opacities_grad: Tensor<B, 2>,
    /// `[P, 2]`
    pub positions_2d_grad: Tensor<B, 2>,
    /// `[P]`
    pub positions_2d_grad_norm: Tensor<B, 1>,
    /// `[P, 3]`
    pub positions_grad: Tensor<B, 2>,
    /// `[P, 4]`
    pub rotations_grad: Tensor<B, 2>,
    /// `[P, 3]`
    pub scalings_grad: Tensor<B, 2>,
}

impl<B: Backend> Gaussian3dScene<B> {
    /// Rendering the scene from `view`.
    pub fn render(
        &self,
        renderer: &Gaussian3dRenderer,
        view: &View,
        options: &Gaussian3dRenderOptions,
    ) -> Result<Gaussian3dRenderOutput<B>, Error> {
        #[cfg(debug_assertions)]
        log::debug!(
            target: "gausplat::rasterizer::scene",
            "Gaussian3dScene::render ({})",
            view.view_id,
        );

        let input = forward::RenderInput {
            colors_sh: into_vec(self.get_colors_sh())?,
            opacities: into_vec(self.get_opacities())?,
            positions: into_arrays(into_vec(self.get_positions())?)?,
            rotations: into_arrays(into_vec(self.get_rotations())?)?,
            scalings: into_arrays(into_vec(self.get_scalings())?)?,
        };

        let output = renderer.forward(input, view, options)?;

        let device = self.device();
        // P
        let point_count = output.radii.len();
        // I_x
        let image_size_x = view.image_width as usize;
        // I_y
        let image_size_y = view.image_height as usize;

        Ok(Gaussian3dRenderOutput {
            alphas_2d: Tensor::from_data(
                TensorData::new(output.alphas_2d, [image_size_y, image_size_x]),
                &device,
            ),
            colors_rgb_2d: Tensor::from_data(
                TensorData::new(
                    output.colors_rgb_2d.concat(),
                    [image_size_y, image_size_x, 3],
                ),
                &device,
            ),
            depths: Tensor::from_data(
                TensorData::new(output.depths, [point_count]),
                &device,
            ),
            positions_2d: Tensor::from_data(
                TensorData::new(output.positions_2d.concat(), [point_count, 2]),
                &device,
            ),
            radii: Tensor::from_data(
                TensorData::new(output.radii, [point_count]),
                &device,
            ),
            state: output.state,
            visibilities: Tensor::from_data(
                TensorData::new(output.visibilities, [point_count]),
                &device,
            ),
        })
    }

    /// Computing the gradients of the outer values from the frame in `state`.
    ///
    /// ## Arguments
    ///
    /// * `colors_rgb_2d_grad` - `[I_y, I_x, 3]`
    pub fn render_backward(
        &self,
        renderer: &Gaussian3dRenderer,
        state: backward::RenderInput,
        colors_rgb_2d_grad: Tensor<B, 3>,
    ) -> Result<Gaussian3dRenderGrad<B>, Error> {
        #[cfg(debug_assertions)]
        log::debug!(target: "gausplat::rasterizer::scene", "Gaussian3dScene::render_backward");

        let grid = &state.arguments.grid;
        let dims = [grid.image_size_y as usize, grid.image_size_x as usize, 3];
        if colors_rgb_2d_grad.dims() != dims {
            return Err(Error::Validation(
                format!("the shape of colors_rgb_2d_grad ({:?})", colors_rgb_2d_grad.dims()),
                format!("{dims:?}"),
            ));
        }
        // M
        let colors_sh_count = state.input.colors_sh_count();

        let colors_rgb_2d_grad = into_arrays(into_vec(colors_rgb_2d_grad)?)?;
        let grad = renderer.backward(state, &colors_rgb_2d_grad)?;

        let device = self.device();
        // P
        let point_count = grad.opacities_grad.len();

        Ok(Gaussian3dRenderGrad {
            colors_sh_grad: Tensor::from_data(
                TensorData::new(grad.colors_sh_grad, [point_count, colors_sh_count * 3]),
                &device,
            ),
            opacities_grad: Tensor::from_data(
                TensorData::new(grad.opacities_grad, [point_count, 1]),
                &device,
            ),
            positions_2d_grad: Tensor::from_data(
                TensorData::new(grad.positions_2d_grad.concat(), [point_count, 2]),
                &device,
            ),
            positions_2d_grad_norm: Tensor::from_data(
                TensorData::new(grad.positions_2d_grad_norm, [point_count]),
                &device,
            ),
            positions_grad: Tensor::from_data(
                TensorData::new(grad.positions_grad.concat(), [point_count, 3]),
                &device,
            ),
            rotations_grad: Tensor::from_data(
                TensorData::new(grad.rotations_grad.concat(), [point_count, 4]),
                &device,
            ),
            scalings_grad: Tensor::from_data(
                TensorData::new(grad.scalings_grad.concat(), [point_count, 3]),
                &device,
            ),
        })
    }
}

impl<B: Backend> Gaussian3dRenderGrad<B> {
    /// Chaining the gradients into the inner values of `scene`.
    pub fn into_inner(
        self,
        scene: &Gaussian3dScene<B>,
    ) -> Self {
        Self {
            colors_sh_grad: scene.make_inner_colors_sh_grad(self.colors_sh_grad),
            opacities_grad: scene.make_inner_opacities_grad(self.opacities_grad),
            positions_grad: scene.make_inner_positions_grad(self.positions_grad),
            rotations_grad: scene.make_inner_rotations_grad(self.rotations_grad),
            scalings_grad: scene.make_inner_scalings_grad(self.scalings_grad),
            ..self
        }
    }
}

fn into_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>, Error> {
    Ok(tensor.into_data().convert::<f32>().to_vec::<f32>()?)
}

fn into_arrays<const N: usize>(values: Vec<f32>) -> Result<Vec<[f32; N]>, Error>
where
    [f32; N]: Pod,
{
    try_cast_slice(&values)
        .map(<[[f32; N]]>::to_vec)
        .map_err(|error| Error::Data(format!("{error:?}")))
}
