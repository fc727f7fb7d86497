pub use super::*;

#[derive(Debug)]
pub struct Inputs<'a> {
    /// `[T]`
    pub entries: &'a mut [DuplicatedEntry],
}

/// Sorting the entries by key in place.
///
/// It is stable, so the entries with equal keys keep their point order.
pub fn main(inputs: Inputs) {
    inputs.entries.par_sort_by_key(|entry| entry.key);
}
