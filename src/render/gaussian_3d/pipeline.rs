//! Running the stages of a rasterizer in order.

pub use super::*;

use kernel::*;

/// Rendering a frame of `input` from `view` with `rasterizer`.
pub fn forward<R: Gaussian3dRasterizer + ?Sized>(
    rasterizer: &R,
    input: forward::RenderInput,
    view: &View,
    options: &Gaussian3dRenderOptions,
) -> Result<forward::RenderOutput, Error> {
    #[cfg(debug_assertions)]
    log::debug!(target: "gausplat::rasterizer::gaussian_3d::forward", "start");

    options.validate()?;
    input.validate(options.colors_sh_degree_max)?;

    // Specifying the arguments

    // (T_x, T_y)
    let tile_size = rasterizer.tile_size();
    if tile_size != (options.tile_size_x, options.tile_size_y) {
        return Err(Error::Configuration(format!(
            "tile size ({}x{}) for the rasterizer of {}x{}",
            options.tile_size_x, options.tile_size_y, tile_size.0, tile_size.1,
        )));
    }
    let grid = RenderGrid::new(
        view.image_width,
        view.image_height,
        tile_size.0,
        tile_size.1,
    )?;

    // tan(Fov_x / 2)
    let field_of_view_x_half_tan = (view.field_of_view_x / 2.0).tan();
    // tan(Fov_y / 2)
    let field_of_view_y_half_tan = (view.field_of_view_y / 2.0).tan();
    let is_field_of_view_valid = field_of_view_x_half_tan.is_finite()
        && field_of_view_y_half_tan.is_finite()
        && field_of_view_x_half_tan > 0.0
        && field_of_view_y_half_tan > 0.0;
    if !is_field_of_view_valid {
        return Err(Error::Validation(
            format!(
                "field of view ({}, {})",
                view.field_of_view_x, view.field_of_view_y
            ),
            "in (0, π)".into(),
        ));
    }

    let arguments = project::Arguments {
        colors_sh_degree_max: options.colors_sh_degree_max,
        depth_far: options.depth_far as f32,
        depth_near: options.depth_near as f32,
        // F_x <- I_x / tan(Fov_x / 2) / 2
        focal_length_x: (grid.image_size_x as f64 / field_of_view_x_half_tan / 2.0)
            as f32,
        // F_y <- I_y / tan(Fov_y / 2) / 2
        focal_length_y: (grid.image_size_y as f64 / field_of_view_y_half_tan / 2.0)
            as f32,
        grid,
        projection_transform: view
            .projection_transform
            .map(|col| col.map(|v| v as f32)),
        // tan(Fov_x / 2) * (C_f + 1)
        view_bound_x: (field_of_view_x_half_tan * (project::FILTER_LOW_PASS + 1.0))
            as f32,
        // tan(Fov_y / 2) * (C_f + 1)
        view_bound_y: (field_of_view_y_half_tan * (project::FILTER_LOW_PASS + 1.0))
            as f32,
        view_position: view.view_position.map(|v| v as f32),
        view_transform: view.view_transform.map(|col| col.map(|v| v as f32)),
    };

    // Launching the stages

    let project::Outputs { points } = rasterizer.project(&arguments, &input);
    #[cfg(debug_assertions)]
    log::debug!(target: "gausplat::rasterizer::gaussian_3d::forward", "project");

    let key::Outputs { mut entries } = rasterizer.generate_keys(
        &key::Arguments {
            depth_far: arguments.depth_far,
            depth_near: arguments.depth_near,
            entry_count_max: options.entry_count_max,
            grid,
        },
        key::Inputs { points: &points },
    )?;
    #[cfg(debug_assertions)]
    log::debug!(
        target: "gausplat::rasterizer::gaussian_3d::forward",
        "key ({} entries, {})",
        entries.len(),
        humansize::format_size(
            entries.len() * size_of::<DuplicatedEntry>(),
            humansize::BINARY.decimal_places(1)
        ),
    );

    rasterizer.sort(sort::Inputs {
        entries: &mut entries,
    });
    #[cfg(debug_assertions)]
    log::debug!(target: "gausplat::rasterizer::gaussian_3d::forward", "sort");

    let range::Outputs { tile_ranges } = rasterizer.build_ranges(
        &range::Arguments { grid },
        range::Inputs { entries: &entries },
    );
    #[cfg(debug_assertions)]
    log::debug!(target: "gausplat::rasterizer::gaussian_3d::forward", "range");

    let point_indices = entries
        .iter()
        .map(|entry| entry.point_index)
        .collect::<Vec<_>>();
    drop(entries);

    let composite::Outputs {
        colors_rgb_2d,
        last_contributors,
        transmittances,
    } = rasterizer.composite(
        &composite::Arguments { grid },
        composite::Inputs {
            point_indices: &point_indices,
            points: &points,
            tile_ranges: &tile_ranges,
        },
    );
    #[cfg(debug_assertions)]
    log::debug!(target: "gausplat::rasterizer::gaussian_3d::forward", "composite");

    Ok(forward::RenderOutput {
        alphas_2d: transmittances.iter().map(|t| 1.0 - t).collect(),
        colors_rgb_2d,
        depths: points.iter().map(|point| point.depth).collect(),
        positions_2d: points.iter().map(|point| point.position_2d).collect(),
        radii: points.iter().map(|point| point.radius).collect(),
        visibilities: points.iter().map(|point| point.is_visible()).collect(),
        state: backward::RenderInput {
            arguments,
            input,
            last_contributors,
            point_indices,
            points,
            tile_ranges,
            transmittances,
        },
    })
}

/// Computing the gradients of the frame saved in `state` with `rasterizer`.
///
/// ## Arguments
///
/// * `colors_rgb_2d_grad` - `[I_y, I_x, 3]`
pub fn backward<R: Gaussian3dRasterizer + ?Sized>(
    rasterizer: &R,
    state: backward::RenderInput,
    colors_rgb_2d_grad: &[[f32; 3]],
) -> Result<backward::RenderOutput, Error> {
    #[cfg(debug_assertions)]
    log::debug!(target: "gausplat::rasterizer::gaussian_3d::backward", "start");

    let grid = state.arguments.grid;
    if colors_rgb_2d_grad.len() != grid.pixel_count() {
        return Err(Error::Validation(
            format!("the pixel count of the gradient ({})", colors_rgb_2d_grad.len()),
            format!("{} ({}x{})", grid.pixel_count(), grid.image_size_x, grid.image_size_y),
        ));
    }

    // Launching the stages

    let composite_backward::Outputs {
        colors_rgb_grad,
        conics_grad,
        opacities_grad,
        positions_2d_grad,
    } = rasterizer.composite_backward(
        &composite_backward::Arguments { grid },
        composite_backward::Inputs {
            colors_rgb_2d_grad,
            last_contributors: &state.last_contributors,
            point_indices: &state.point_indices,
            points: &state.points,
            tile_ranges: &state.tile_ranges,
            transmittances: &state.transmittances,
        },
    )?;
    #[cfg(debug_assertions)]
    log::debug!(target: "gausplat::rasterizer::gaussian_3d::backward", "composite_backward");

    let project_backward::Outputs {
        colors_sh_grad,
        positions_grad,
        rotations_grad,
        scalings_grad,
    } = rasterizer.project_backward(
        &state.arguments,
        project_backward::Inputs {
            colors_rgb_grad: &colors_rgb_grad,
            conics_grad: &conics_grad,
            input: &state.input,
            points: &state.points,
            positions_2d_grad: &positions_2d_grad,
        },
    )?;
    #[cfg(debug_assertions)]
    log::debug!(target: "gausplat::rasterizer::gaussian_3d::backward", "project_backward");

    Ok(backward::RenderOutput {
        colors_sh_grad,
        opacities_grad,
        positions_2d_grad_norm: positions_2d_grad
            .iter()
            .map(|[x, y]| (x * x + y * y).sqrt())
            .collect(),
        positions_2d_grad,
        positions_grad,
        rotations_grad,
        scalings_grad,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spherical_harmonics::SH_COEF;
    use bytemuck::cast_slice_mut;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    /// A camera at the origin looking along `+z`, with `tan(Fov / 2) = 0.5`.
    fn view(
        image_size_x: u32,
        image_size_y: u32,
    ) -> View {
        let field_of_view = 2.0 * 0.5_f64.atan();
        let identity = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        View::new(
            &identity,
            &[0.0; 3],
            field_of_view,
            field_of_view,
            image_size_y,
            image_size_x,
            0.01,
            100.0,
        )
    }

    /// The SH coefficients of degree 0 giving `color_rgb`.
    fn colors_sh(color_rgb: [f32; 3]) -> [f32; 3] {
        let c_0 = SH_COEF.0[0] as f32;
        color_rgb.map(|c| (c - 0.5) / c_0)
    }

    fn gaussian(
        input: &mut forward::RenderInput,
        position: [f32; 3],
        scaling: f32,
        opacity: f32,
        color_rgb: [f32; 3],
    ) {
        input.colors_sh.extend(colors_sh(color_rgb));
        input.opacities.push(opacity);
        input.positions.push(position);
        input.rotations.push([0.0, 0.0, 0.0, 1.0]);
        input.scalings.push([scaling; 3]);
    }

    fn options(tile_size: u32) -> Gaussian3dRenderOptions {
        Gaussian3dRenderOptions::default()
            .with_colors_sh_degree_max(0)
            .with_tile_size_x(tile_size)
            .with_tile_size_y(tile_size)
    }

    fn random_input(
        rng: &mut StdRng,
        point_count: usize,
        colors_sh_count: usize,
    ) -> forward::RenderInput {
        forward::RenderInput {
            colors_sh: (0..point_count * colors_sh_count * 3)
                .map(|_| rng.gen_range(-0.2..0.2))
                .collect(),
            opacities: (0..point_count).map(|_| rng.gen_range(0.3..0.6)).collect(),
            positions: (0..point_count)
                .map(|index| {
                    [
                        rng.gen_range(-0.5..0.5),
                        rng.gen_range(-0.5..0.5),
                        4.0 + 0.3 * index as f32,
                    ]
                })
                .collect(),
            rotations: (0..point_count)
                .map(|_| {
                    [
                        rng.gen_range(-1.0..1.0),
                        rng.gen_range(-1.0..1.0),
                        rng.gen_range(-1.0..1.0),
                        rng.gen_range(0.5..1.5),
                    ]
                })
                .collect(),
            scalings: (0..point_count)
                .map(|_| {
                    [
                        rng.gen_range(2.5..3.5),
                        rng.gen_range(2.5..3.5),
                        rng.gen_range(2.5..3.5),
                    ]
                })
                .collect(),
        }
    }

    #[test]
    fn forward_single_gaussian() {
        let rasterizer = CpuRasterizer::new(16, 16).unwrap();
        let mut input = forward::RenderInput::default();
        gaussian(&mut input, [0.0, 0.0, 4.0], 0.5, 0.9, [1.0, 0.0, 0.0]);

        let output = forward(&rasterizer, input, &view(17, 17), &options(16)).unwrap();

        assert_eq!(output.colors_rgb_2d.len(), 17 * 17);
        assert_eq!(output.visibilities, [true]);
        assert!(output.radii[0] > 0);
        assert_eq!(output.depths, [4.0]);
        assert!((output.positions_2d[0][0] - 8.0).abs() < 1e-5);
        assert!((output.positions_2d[0][1] - 8.0).abs() < 1e-5);

        // The center pixel
        let center = 8 * 17 + 8;
        let color = output.colors_rgb_2d[center];
        assert!((color[0] - 0.9).abs() < 1e-4, "{color:?}");
        assert!(color[1].abs() < 1e-6, "{color:?}");
        assert!(color[2].abs() < 1e-6, "{color:?}");
        assert!((output.alphas_2d[center] - 0.9).abs() < 1e-4);
        assert_eq!(output.state.last_contributors[center], 1);

        // The corner pixel out of the touched tiles
        let corner = 17 * 17 - 1;
        assert_eq!(output.colors_rgb_2d[corner], [0.0; 3]);
        assert_eq!(output.alphas_2d[corner], 0.0);
        assert_eq!(output.state.last_contributors[corner], 0);

        // Colors fall off from the center
        let row = &output.colors_rgb_2d[8 * 17..9 * 17];
        row[..9].windows(2).for_each(|pair| assert!(pair[0][0] <= pair[1][0]));
        row[8..].windows(2).for_each(|pair| assert!(pair[0][0] >= pair[1][0]));
    }

    #[test]
    fn forward_front_to_back() {
        let rasterizer = CpuRasterizer::new(16, 16).unwrap();
        let mut back_first = forward::RenderInput::default();
        gaussian(&mut back_first, [0.0, 0.0, 4.0], 0.5, 0.5, [0.0, 0.0, 1.0]);
        gaussian(&mut back_first, [0.0, 0.0, 2.0], 0.25, 0.5, [1.0, 0.0, 0.0]);
        let mut front_first = forward::RenderInput::default();
        gaussian(&mut front_first, [0.0, 0.0, 2.0], 0.25, 0.5, [1.0, 0.0, 0.0]);
        gaussian(&mut front_first, [0.0, 0.0, 4.0], 0.5, 0.5, [0.0, 0.0, 1.0]);

        let output = forward(&rasterizer, back_first, &view(17, 17), &options(16)).unwrap();
        let output_swapped =
            forward(&rasterizer, front_first, &view(17, 17), &options(16)).unwrap();

        let center = 8 * 17 + 8;
        let color = output.colors_rgb_2d[center];
        assert!((color[0] - 0.5).abs() < 1e-4, "{color:?}");
        assert!(color[1].abs() < 1e-6, "{color:?}");
        assert!((color[2] - 0.25).abs() < 1e-4, "{color:?}");
        assert!((output.state.transmittances[center] - 0.25).abs() < 1e-5);
        assert_eq!(output.state.last_contributors[center], 2);
        assert_eq!(output.state.point_indices, [1, 0]);

        assert_eq!(output.colors_rgb_2d, output_swapped.colors_rgb_2d);
        assert_eq!(output.alphas_2d, output_swapped.alphas_2d);
    }

    #[test]
    fn forward_single_opaque_gaussian() {
        let rasterizer = CpuRasterizer::new(16, 16).unwrap();
        let mut input = forward::RenderInput::default();
        gaussian(&mut input, [0.0, 0.0, 4.0], 0.5, 1.0, [1.0, 0.0, 0.0]);

        let output = forward(&rasterizer, input, &view(17, 17), &options(16)).unwrap();

        // The alpha is clamped at the center
        let center = 8 * 17 + 8;
        let color = output.colors_rgb_2d[center];
        assert!((color[0] - composite::ALPHA_MAX).abs() < 1e-5, "{color:?}");
        assert!(color[1].abs() < 1e-6, "{color:?}");
        assert!(color[2].abs() < 1e-6, "{color:?}");
        assert!((output.alphas_2d[center] - composite::ALPHA_MAX).abs() < 1e-5);

        let corner = 17 * 17 - 1;
        assert_eq!(output.colors_rgb_2d[corner], [0.0; 3]);
        assert_eq!(output.state.last_contributors[corner], 0);

        for (index, color) in output.colors_rgb_2d.iter().enumerate() {
            let last_contributor = output.state.last_contributors[index];
            if color[0] > 0.0 {
                assert_eq!(last_contributor, 1, "index: {index}");
            } else {
                assert_eq!(last_contributor, 0, "index: {index}");
            }
        }

        // Only the color receives the gradient of a clamped alpha
        let mut colors_rgb_2d_grad = vec![[0.0; 3]; 17 * 17];
        colors_rgb_2d_grad[center] = [1.0, 0.0, 0.0];
        let grad = backward(&rasterizer, output.state, &colors_rgb_2d_grad).unwrap();
        assert_eq!(grad.opacities_grad, [0.0]);
        assert_eq!(grad.positions_2d_grad, [[0.0; 2]]);
        assert_eq!(grad.scalings_grad, [[0.0; 3]]);
        let c_0 = SH_COEF.0[0] as f32;
        assert!((grad.colors_sh_grad[0] - composite::ALPHA_MAX * c_0).abs() < 1e-5);
    }

    #[test]
    fn forward_overlapping_by_depth() {
        let rasterizer = CpuRasterizer::new(16, 16).unwrap();
        let mut input = forward::RenderInput::default();
        // The farther one is inserted first
        gaussian(&mut input, [0.0, 0.0, 4.0], 0.5, 1.0, [0.0, 0.0, 1.0]);
        gaussian(&mut input, [0.0, 0.0, 2.0], 0.25, 0.5, [1.0, 0.0, 0.0]);

        let output = forward(&rasterizer, input, &view(17, 17), &options(16)).unwrap();

        // 0.5 * red + 0.5 * blue
        let center = 8 * 17 + 8;
        let color = output.colors_rgb_2d[center];
        assert!((color[0] - 0.5).abs() < 1e-3, "{color:?}");
        assert!(color[1].abs() < 1e-6, "{color:?}");
        assert!((color[2] - 0.5).abs() < 1e-3, "{color:?}");
        assert_eq!(output.state.last_contributors[center], 2);
        assert_eq!(output.state.point_indices, [1, 0]);
    }

    #[test]
    fn forward_culled() {
        let rasterizer = CpuRasterizer::new(8, 8).unwrap();
        let mut input = forward::RenderInput::default();
        // Behind the camera
        gaussian(&mut input, [0.0, 0.0, -4.0], 0.5, 0.9, [1.0; 3]);
        // Out of the image
        gaussian(&mut input, [40.0, 0.0, 4.0], 0.5, 0.9, [1.0; 3]);
        gaussian(&mut input, [0.0, 0.0, 4.0], 0.5, 0.9, [1.0; 3]);

        let output = forward(&rasterizer, input, &view(16, 16), &options(8)).unwrap();
        assert_eq!(output.visibilities, [false, false, true]);
        assert_eq!(output.radii[..2], [0, 0]);
        assert!(output.state.point_indices.iter().all(|&index| index == 2));

        let colors_rgb_2d_grad = vec![[1.0; 3]; 16 * 16];
        let grad = backward(&rasterizer, output.state, &colors_rgb_2d_grad).unwrap();
        for index in 0..2 {
            assert_eq!(grad.opacities_grad[index], 0.0);
            assert_eq!(grad.positions_grad[index], [0.0; 3]);
            assert_eq!(grad.rotations_grad[index], [0.0; 4]);
            assert_eq!(grad.scalings_grad[index], [0.0; 3]);
            assert_eq!(grad.colors_sh_grad[index * 3..index * 3 + 3], [0.0; 3]);
            assert_eq!(grad.positions_2d_grad_norm[index], 0.0);
        }
        assert!(grad.opacities_grad[2] > 0.0);
    }

    #[test]
    fn forward_empty() {
        let rasterizer = CpuRasterizer::new(16, 16).unwrap();
        let output = forward(
            &rasterizer,
            forward::RenderInput::default(),
            &view(20, 10),
            &options(16),
        )
        .unwrap();

        assert_eq!(output.colors_rgb_2d, vec![[0.0; 3]; 200]);
        assert_eq!(output.alphas_2d, vec![0.0; 200]);
        assert!(output.state.point_indices.is_empty());

        let grad = backward(&rasterizer, output.state, &[[1.0; 3]; 200]).unwrap();
        assert!(grad.colors_sh_grad.is_empty());
        assert!(grad.positions_grad.is_empty());
    }

    #[test]
    fn forward_invalid() {
        let rasterizer = CpuRasterizer::new(16, 16).unwrap();
        let mut input = forward::RenderInput::default();
        gaussian(&mut input, [0.0, 0.0, 4.0], 0.5, 0.9, [1.0; 3]);

        // The tile size differs from the rasterizer
        let error = forward(&rasterizer, input.to_owned(), &view(16, 16), &options(8))
            .unwrap_err();
        assert!(matches!(error, Error::Configuration(_)), "{error}");

        let error = forward(
            &rasterizer,
            input.to_owned(),
            &view(16, 16),
            &options(16).with_entry_count_max(0),
        )
        .unwrap_err();
        assert_eq!(
            error,
            Error::CapacityOverflow("duplicated entry count".into(), 1, 0)
        );

        let error = forward(&rasterizer, input.to_owned(), &view(0, 16), &options(16))
            .unwrap_err();
        assert!(matches!(error, Error::Validation(_, _)), "{error}");

        // Degree 1 needs 4 coefficients
        let error = forward(
            &rasterizer,
            input.to_owned(),
            &view(16, 16),
            &options(16).with_colors_sh_degree_max(1),
        )
        .unwrap_err();
        assert!(matches!(error, Error::Validation(_, _)), "{error}");

        let output = forward(&rasterizer, input, &view(16, 16), &options(16)).unwrap();
        let error = backward(&rasterizer, output.state, &[[1.0; 3]; 15]).unwrap_err();
        assert!(matches!(error, Error::Validation(_, _)), "{error}");
    }

    /// Comparing the gradients of `L = Σ w * C` to the central differences.
    #[allow(clippy::too_many_arguments)]
    fn assert_grad_matches_finite_difference(
        rasterizer: &CpuRasterizer,
        view: &View,
        options: &Gaussian3dRenderOptions,
        input: &forward::RenderInput,
        epsilon: f32,
        tolerance: f32,
        rng: &mut StdRng,
    ) {
        let weights = (0..view.image_width * view.image_height)
            .map(|_| {
                [
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                ]
            })
            .collect::<Vec<[f32; 3]>>();

        let loss = |input: forward::RenderInput| {
            let output = forward(rasterizer, input, view, options).unwrap();
            output
                .colors_rgb_2d
                .iter()
                .zip(&weights)
                .flat_map(|(c, w)| (0..3).map(move |i| c[i] as f64 * w[i] as f64))
                .sum::<f64>()
        };

        let output = forward(rasterizer, input.to_owned(), view, options).unwrap();
        assert!(output.visibilities.iter().all(|&is_visible| is_visible));
        let grad = backward(rasterizer, output.state, &weights).unwrap();

        let groups: [(&str, fn(&mut forward::RenderInput) -> &mut [f32], Vec<f32>); 5] = [
            ("colors_sh", |input| input.colors_sh.as_mut_slice(), grad.colors_sh_grad),
            ("opacities", |input| input.opacities.as_mut_slice(), grad.opacities_grad),
            (
                "positions",
                |input| cast_slice_mut(&mut input.positions),
                grad.positions_grad.concat(),
            ),
            (
                "rotations",
                |input| cast_slice_mut(&mut input.rotations),
                grad.rotations_grad.concat(),
            ),
            (
                "scalings",
                |input| cast_slice_mut(&mut input.scalings),
                grad.scalings_grad.concat(),
            ),
        ];

        for (name, parameters, analytic) in groups {
            for (index, &analytic) in analytic.iter().enumerate() {
                let mut input_add = input.to_owned();
                parameters(&mut input_add)[index] += epsilon;
                let mut input_sub = input.to_owned();
                parameters(&mut input_sub)[index] -= epsilon;
                let numeric =
                    ((loss(input_add) - loss(input_sub)) / (2.0 * epsilon as f64)) as f32;

                let tolerance = 2e-2 * analytic.abs().max(numeric.abs()) + tolerance;
                assert!(
                    (analytic - numeric).abs() <= tolerance,
                    "{name}[{index}]: analytic {analytic}, numeric {numeric}",
                );
            }
        }
    }

    #[test]
    fn backward_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(0x3D65);
        let rasterizer = CpuRasterizer::new(4, 4).unwrap();
        let options = options(4).with_colors_sh_degree_max(1);
        let input = random_input(&mut rng, 4, 4);

        assert_grad_matches_finite_difference(
            &rasterizer,
            &view(8, 8),
            &options,
            &input,
            1e-2,
            2e-3,
            &mut rng,
        );
    }

    #[test]
    fn backward_matches_finite_difference_with_posed_camera() {
        use nalgebra::{Rotation3, Vector3};

        let mut rng = StdRng::seed_from_u64(0x3D66);
        let rasterizer = CpuRasterizer::new(4, 8).unwrap();
        let options = options(4).with_tile_size_y(8).with_colors_sh_degree_max(1);

        // P_v = R_v * (P - V_p)
        let rotation = Rotation3::from_euler_angles(0.2, -0.3, 0.1);
        let view_position = Vector3::new(0.5, -0.25, -1.5);
        let translation: [f64; 3] = (-(rotation * view_position)).into();
        let matrix = rotation.matrix();
        let view = View::new(
            &[0, 1, 2].map(|col| [0, 1, 2].map(|row| matrix[(row, col)])),
            &translation,
            2.0 * 0.5_f64.atan(),
            2.0 * 0.6_f64.atan(),
            12,
            10,
            0.01,
            100.0,
        );
        assert!(
            view.view_position
                .iter()
                .zip(view_position.iter())
                .all(|(a, b)| (a - b).abs() < 1e-9),
            "{:?}",
            view.view_position,
        );

        let mut input = random_input(&mut rng, 4, 4);
        input.positions.iter_mut().for_each(|position| {
            let position_view = Vector3::from(position.map(|v| v as f64));
            let position_world = rotation.inverse() * position_view + view_position;
            *position = position_world.map(|v| v as f32).into();
        });

        assert_grad_matches_finite_difference(
            &rasterizer,
            &view,
            &options,
            &input,
            1e-3,
            4e-3,
            &mut rng,
        );
    }

    #[test]
    fn backward_matches_finite_difference_beyond_view_bound() {
        let mut rng = StdRng::seed_from_u64(0x3D67);
        let rasterizer = CpuRasterizer::new(4, 4).unwrap();
        let options = options(4).with_colors_sh_degree_max(1);
        let mut input = random_input(&mut rng, 3, 4);
        // x / z = 0.9 is beyond tan(Fov_x / 2) * 1.3 = 0.65
        input.positions[0] = [3.6, 0.1, 4.0];
        input.positions[1][1] = -0.9 * input.positions[1][2];

        let view = view(8, 8);
        let output = forward(&rasterizer, input.to_owned(), &view, &options).unwrap();
        let bound = output.state.arguments.view_bound_x;
        assert!((bound - 0.65).abs() < 1e-6);
        assert!(output.positions_2d[0][0] > 8.0, "{:?}", output.positions_2d);
        assert!(output.positions_2d[1][1] < 0.0, "{:?}", output.positions_2d);

        assert_grad_matches_finite_difference(
            &rasterizer,
            &view,
            &options,
            &input,
            1e-3,
            4e-3,
            &mut rng,
        );
    }

    #[test]
    fn backward_deterministic() {
        let mut rng = StdRng::seed_from_u64(0x3D65);
        let renderer = Gaussian3dRenderer::default();
        let view = view(64, 48);
        let options = Gaussian3dRenderOptions::default().with_colors_sh_degree_max(1);
        let mut input = random_input(&mut rng, 128, 4);
        input.positions.iter_mut().for_each(|position| {
            position[0] *= 4.0;
            position[1] *= 4.0;
        });
        input.scalings.iter_mut().flatten().for_each(|scaling| *scaling /= 10.0);
        let colors_rgb_2d_grad = (0..64 * 48)
            .map(|_| [rng.gen(), rng.gen(), rng.gen()])
            .collect::<Vec<_>>();

        let render = || {
            let output = renderer.forward(input.to_owned(), &view, &options).unwrap();
            let colors_rgb_2d = output.colors_rgb_2d.to_owned();
            let grad = renderer.backward(output.state, &colors_rgb_2d_grad).unwrap();
            (colors_rgb_2d, grad)
        };

        let (colors_rgb_2d, grad) = render();
        let (colors_rgb_2d_other, grad_other) = render();
        assert!(colors_rgb_2d.iter().flatten().any(|&c| c > 0.0));
        assert_eq!(colors_rgb_2d, colors_rgb_2d_other);
        assert_eq!(grad, grad_other);
        assert_eq!(renderer.registry().len(), 1);
    }
}
