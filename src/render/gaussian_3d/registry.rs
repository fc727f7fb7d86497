//! Caching the rasterizers by tile size.

pub use super::*;

use std::sync::{Arc, OnceLock};

/// Building a rasterizer for tiles of `T_x x T_y` pixels.
pub type RasterizerFactory =
    fn(u32, u32) -> Result<Arc<dyn Gaussian3dRasterizer>, Error>;

/// The rasterizers initialized lazily, at most once for each tile size.
///
/// The concurrent first uses of a tile size share one initialization,
/// and its failure is cached as well.
#[derive(Debug)]
pub struct RasterizerRegistry {
    factory: RasterizerFactory,
    slots: [[Slot; TILE_SIZES.len()]; TILE_SIZES.len()],
}

type Slot = OnceLock<Result<Arc<dyn Gaussian3dRasterizer>, Error>>;

impl RasterizerRegistry {
    pub fn new(factory: RasterizerFactory) -> Self {
        Self {
            factory,
            slots: Default::default(),
        }
    }

    /// Returns the rasterizer for tiles of `T_x x T_y` pixels.
    pub fn get(
        &self,
        tile_size_x: u32,
        tile_size_y: u32,
    ) -> Result<Arc<dyn Gaussian3dRasterizer>, Error> {
        let position = |size: u32| TILE_SIZES.iter().position(|&s| s == size);
        let (Some(x), Some(y)) = (position(tile_size_x), position(tile_size_y)) else {
            return Err(Error::Configuration(format!(
                "tile size ({tile_size_x}x{tile_size_y})"
            )));
        };

        self.slots[y][x]
            .get_or_init(|| {
                #[cfg(debug_assertions)]
                log::debug!(
                    target: "gausplat::rasterizer::gaussian_3d::registry",
                    "init ({tile_size_x}x{tile_size_y})",
                );

                (self.factory)(tile_size_x, tile_size_y)
            })
            .clone()
    }

    /// The count of the initialized rasterizers.
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().filter(|slot| slot.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RasterizerRegistry {
    #[inline]
    fn default() -> Self {
        Self::new(|tile_size_x, tile_size_y| {
            Ok(Arc::new(CpuRasterizer::new(tile_size_x, tile_size_y)?))
        })
    }
}
