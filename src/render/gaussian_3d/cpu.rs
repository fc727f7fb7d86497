//! The rasterizer running on the host.

pub use super::*;

use kernel::*;

/// The rasterizer running the kernels on a dedicated thread pool.
#[derive(Debug)]
pub struct CpuRasterizer {
    pool: rayon::ThreadPool,
    tile_size_x: u32,
    tile_size_y: u32,
}

impl CpuRasterizer {
    /// Spawning the thread pool for tiles of `T_x x T_y` pixels.
    pub fn new(
        tile_size_x: u32,
        tile_size_y: u32,
    ) -> Result<Self, Error> {
        if !TILE_SIZES.contains(&tile_size_x) || !TILE_SIZES.contains(&tile_size_y) {
            return Err(Error::Configuration(format!(
                "tile size ({tile_size_x}x{tile_size_y})"
            )));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .thread_name(move |index| {
                format!("gausplat-rasterizer-{tile_size_x}x{tile_size_y}-{index}")
            })
            .build()
            .map_err(|error| Error::Backend(error.to_string()))?;

        log::info!(
            target: "gausplat::rasterizer::gaussian_3d::cpu",
            "init ({tile_size_x}x{tile_size_y}, {} threads)",
            pool.current_num_threads(),
        );

        Ok(Self {
            pool,
            tile_size_x,
            tile_size_y,
        })
    }

    /// The worker count.
    #[inline]
    pub fn thread_count(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl Gaussian3dRasterizer for CpuRasterizer {
    #[inline]
    fn tile_size(&self) -> (u32, u32) {
        (self.tile_size_x, self.tile_size_y)
    }

    fn project(
        &self,
        arguments: &project::Arguments,
        input: &forward::RenderInput,
    ) -> project::Outputs {
        self.pool.install(|| project::main(arguments, input))
    }

    fn generate_keys(
        &self,
        arguments: &key::Arguments,
        inputs: key::Inputs,
    ) -> Result<key::Outputs, Error> {
        self.pool.install(|| key::main(arguments, inputs))
    }

    fn sort(
        &self,
        inputs: sort::Inputs,
    ) {
        self.pool.install(|| sort::main(inputs))
    }

    fn build_ranges(
        &self,
        arguments: &range::Arguments,
        inputs: range::Inputs,
    ) -> range::Outputs {
        self.pool.install(|| range::main(arguments, inputs))
    }

    fn composite(
        &self,
        arguments: &composite::Arguments,
        inputs: composite::Inputs,
    ) -> composite::Outputs {
        self.pool.install(|| composite::main(arguments, inputs))
    }

    fn composite_backward(
        &self,
        arguments: &composite_backward::Arguments,
        inputs: composite_backward::Inputs,
    ) -> Result<composite_backward::Outputs, Error> {
        self.pool.install(|| composite_backward::main(arguments, inputs))
    }

    fn project_backward(
        &self,
        arguments: &project::Arguments,
        inputs: project_backward::Inputs,
    ) -> Result<project_backward::Outputs, Error> {
        self.pool.install(|| project_backward::main(arguments, inputs))
    }
}
