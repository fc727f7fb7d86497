//! Duplicating the points for each touched tile.

pub use super::*;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Arguments {
    /// `z_far`
    pub depth_far: f32,
    /// `z_near`
    pub depth_near: f32,
    /// The maximum of `T`.
    pub entry_count_max: u32,
    pub grid: RenderGrid,
}

#[derive(Clone, Copy, Debug)]
pub struct Inputs<'a> {
    /// `[P]`
    pub points: &'a [ProjectedGaussian],
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Outputs {
    /// `[T]`, grouped by point and unsorted.
    pub entries: Vec<DuplicatedEntry>,
}

/// A pair of sort key and point index.
///
/// The key is `(tile index << 32) | quantized depth`,
/// so the ascending order is tile-major, then front-to-back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DuplicatedEntry {
    pub key: u64,
    pub point_index: u32,
}

impl DuplicatedEntry {
    #[inline]
    pub const fn new(
        tile_index: u32,
        depth_key: u32,
        point_index: u32,
    ) -> Self {
        Self {
            key: ((tile_index as u64) << 32) | depth_key as u64,
            point_index,
        }
    }

    #[inline]
    pub const fn tile_index(&self) -> u32 {
        (self.key >> 32) as u32
    }

    #[inline]
    pub const fn depth_key(&self) -> u32 {
        self.key as u32
    }
}

/// Quantizing the depth in `[z_near, z_far]` linearly into 32 bits.
///
/// The depths out of range are clamped.
#[inline]
pub fn depth_key(
    depth: f32,
    depth_near: f32,
    depth_far: f32,
) -> u32 {
    let ratio = ((depth as f64 - depth_near as f64)
        / (depth_far as f64 - depth_near as f64))
        .clamp(0.0, 1.0);
    (ratio * u32::MAX as f64).round() as u32
}

/// Duplicating the points for each touched tile.
///
/// The offsets are the exclusive prefix sum of tile counts,
/// so every point writes into its own slice.
pub fn main(
    arguments: &Arguments,
    inputs: Inputs,
) -> Result<Outputs, Error> {
    let points = inputs.points;

    // [P]
    let tile_counts = points
        .par_iter()
        .map(|point| point.tile_count() as u64)
        .collect::<Vec<_>>();
    let scan::Outputs {
        total,
        values: offsets,
    } = scan::main(scan::Inputs {
        values: &tile_counts,
    });

    if total > arguments.entry_count_max as u64 {
        return Err(Error::CapacityOverflow(
            "duplicated entry count".into(),
            total,
            arguments.entry_count_max as u64,
        ));
    }

    // [T]
    let mut entries = Vec::new();
    entries.try_reserve_exact(total as usize).map_err(|_| {
        Error::CapacityOverflow(
            "duplicated entry memory (bytes)".into(),
            total * size_of::<DuplicatedEntry>() as u64,
            isize::MAX as u64,
        )
    })?;
    entries.resize(total as usize, DuplicatedEntry::default());

    let mut slices = Vec::with_capacity(points.len());
    let mut rest = entries.as_mut_slice();
    for (index, offset) in offsets.iter().enumerate() {
        let end = offsets.get(index + 1).copied().unwrap_or(total);
        let (slice, tail) = rest.split_at_mut((end - offset) as usize);
        slices.push(slice);
        rest = tail;
    }

    let grid = &arguments.grid;
    slices
        .into_par_iter()
        .zip(points)
        .enumerate()
        .for_each(|(point_index, (slice, point))| {
            let depth_key =
                depth_key(point.depth, arguments.depth_near, arguments.depth_far);
            slice
                .iter_mut()
                .zip(point.tile_rect.tile_indices(grid))
                .for_each(|(entry, tile_index)| {
                    *entry = DuplicatedEntry::new(tile_index, depth_key, point_index as u32);
                });
        });

    Ok(Outputs { entries })
}
