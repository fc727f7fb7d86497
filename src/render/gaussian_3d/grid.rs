//! Mapping between image pixels and tiles.

pub use super::*;

use std::ops::Range;

/// Maximum of `(I_x / T_x) * (I_y / T_y)`
pub const TILE_COUNT_MAX: u32 = 1 << 24;

/// The image and its tiling.
///
/// The grid exactly covers the image. The tiles on the right and bottom edges
/// may be partially outside the image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderGrid {
    /// `I_x`, the image width.
    pub image_size_x: u32,
    /// `I_y`, the image height.
    pub image_size_y: u32,
    /// `I_x / T_x` (rounded up), the grid width.
    pub tile_count_x: u32,
    /// `I_y / T_y` (rounded up), the grid height.
    pub tile_count_y: u32,
    /// `T_x`, the tile width.
    pub tile_size_x: u32,
    /// `T_y`, the tile height.
    pub tile_size_y: u32,
}

/// A rectangle of tiles, `[x_min, x_max) * [y_min, y_max)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TileRect {
    pub x_max: u32,
    pub x_min: u32,
    pub y_max: u32,
    pub y_min: u32,
}

/// The range of sorted entries belonging to one tile, `[start, end)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TileRange {
    pub end: u32,
    pub start: u32,
}

impl RenderGrid {
    pub fn new(
        image_size_x: u32,
        image_size_y: u32,
        tile_size_x: u32,
        tile_size_y: u32,
    ) -> Result<Self, Error> {
        if image_size_x == 0 || image_size_y == 0 {
            return Err(Error::Validation(
                format!("image size ({image_size_x}x{image_size_y})"),
                "non-zero".into(),
            ));
        }
        if tile_size_x == 0 || tile_size_y == 0 {
            return Err(Error::Validation(
                format!("tile size ({tile_size_x}x{tile_size_y})"),
                "non-zero".into(),
            ));
        }

        let tile_count_x = image_size_x.div_ceil(tile_size_x);
        let tile_count_y = image_size_y.div_ceil(tile_size_y);
        let tile_count = tile_count_x as u64 * tile_count_y as u64;
        if tile_count > TILE_COUNT_MAX as u64 {
            return Err(Error::CapacityOverflow(
                "tile count".into(),
                tile_count,
                TILE_COUNT_MAX as u64,
            ));
        }

        Ok(Self {
            image_size_x,
            image_size_y,
            tile_count_x,
            tile_count_y,
            tile_size_x,
            tile_size_y,
        })
    }

    /// `I_x * I_y`
    #[inline]
    pub const fn pixel_count(&self) -> usize {
        self.image_size_x as usize * self.image_size_y as usize
    }

    /// `(I_x / T_x) * (I_y / T_y)`
    #[inline]
    pub const fn tile_count(&self) -> usize {
        self.tile_count_x as usize * self.tile_count_y as usize
    }

    /// The row-major tile index.
    #[inline]
    pub const fn tile_index(
        &self,
        tile_x: u32,
        tile_y: u32,
    ) -> u32 {
        tile_y * self.tile_count_x + tile_x
    }

    /// The pixel bounds of the tile, clipped to the image.
    ///
    /// It returns `(x range, y range)`.
    pub fn tile_pixel_bounds(
        &self,
        tile_index: u32,
    ) -> (Range<u32>, Range<u32>) {
        let tile_x = tile_index % self.tile_count_x;
        let tile_y = tile_index / self.tile_count_x;
        let x_min = tile_x * self.tile_size_x;
        let y_min = tile_y * self.tile_size_y;
        let x_max = (x_min + self.tile_size_x).min(self.image_size_x);
        let y_max = (y_min + self.tile_size_y).min(self.image_size_y);
        (x_min..x_max, y_min..y_max)
    }
}

impl TileRect {
    /// The count of tiles inside.
    #[inline]
    pub const fn count(&self) -> u32 {
        (self.x_max - self.x_min) * (self.y_max - self.y_min)
    }

    /// Iterating over the row-major tile indices inside.
    pub fn tile_indices(
        self,
        grid: &RenderGrid,
    ) -> impl Iterator<Item = u32> + '_ {
        (self.y_min..self.y_max).flat_map(move |y| {
            (self.x_min..self.x_max).map(move |x| grid.tile_index(x, y))
        })
    }
}

impl TileRange {
    #[inline]
    pub const fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.end == self.start
    }

    #[inline]
    pub const fn as_range(&self) -> Range<usize> {
        self.start as usize..self.end as usize
    }
}
