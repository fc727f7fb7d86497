//! Segmenting the sorted entries into tiles.

pub use super::*;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Arguments {
    pub grid: RenderGrid,
}

#[derive(Clone, Copy, Debug)]
pub struct Inputs<'a> {
    /// `[T]`, sorted by key.
    pub entries: &'a [DuplicatedEntry],
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Outputs {
    /// `[I_y / T_y, I_x / T_x]`
    pub tile_ranges: Vec<TileRange>,
}

/// Segmenting the sorted entries into tiles.
///
/// A tile starts wherever the tile index of an entry differs from its predecessor.
/// The tiles touched by nothing are `[0, 0)`.
pub fn main(
    arguments: &Arguments,
    inputs: Inputs,
) -> Outputs {
    let entries = inputs.entries;
    // T
    let entry_count = entries.len() as u32;

    // [(tile index, start)]
    let starts = (0..entries.len())
        .into_par_iter()
        .filter_map(|index| {
            let tile_index = entries[index].tile_index();
            let is_start =
                index == 0 || entries[index - 1].tile_index() != tile_index;
            is_start.then_some((tile_index, index as u32))
        })
        .collect::<Vec<_>>();

    let mut tile_ranges = vec![TileRange::default(); arguments.grid.tile_count()];
    for (index, &(tile_index, start)) in starts.iter().enumerate() {
        let end = starts
            .get(index + 1)
            .map(|&(_, end)| end)
            .unwrap_or(entry_count);
        debug_assert!(
            (tile_index as usize) < tile_ranges.len(),
            "Tile index ({tile_index}) should be less than {}",
            tile_ranges.len(),
        );
        if let Some(range) = tile_ranges.get_mut(tile_index as usize) {
            *range = TileRange { end, start };
        }
    }

    Outputs { tile_ranges }
}
