pub use super::*;

#[derive(Clone, Copy, Debug)]
pub struct Inputs<'a> {
    /// The values to scan.
    pub values: &'a [u64],
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Outputs {
    /// The exclusively scanned values.
    pub values: Vec<u64>,
    /// The total of scanned values.
    pub total: u64,
}

/// `N / N'`
pub const GROUP_SIZE: usize = 256;

/// Scanning the values exclusively.
pub fn main(inputs: Inputs) -> Outputs {
    // [N]
    let values = inputs.values;
    // N
    let count = values.len();
    // N'
    let count_next = count.div_ceil(GROUP_SIZE);

    // Summing each group

    // [N']
    let values_next = values
        .par_chunks(GROUP_SIZE)
        .map(|group| group.iter().sum::<u64>())
        .collect::<Vec<_>>();

    let (offsets_next, total) = if count_next > 1 {
        // Recursing if there is more than one remaining group
        let Outputs { total, values } = main(Inputs {
            values: &values_next,
        });
        (values, total)
    } else {
        // Returning the next values if there is only one group
        (vec![0; count_next], values_next.first().copied().unwrap_or_default())
    };

    // Scanning each group from its offset

    let mut values_scanned = vec![0; count];
    values_scanned
        .par_chunks_mut(GROUP_SIZE)
        .zip(values.par_chunks(GROUP_SIZE))
        .zip(offsets_next)
        .for_each(|((outputs, inputs), offset)| {
            outputs.iter_mut().zip(inputs).fold(offset, |sum, (output, input)| {
                *output = sum;
                sum + input
            });
        });

    Outputs {
        total,
        values: values_scanned,
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn scan_add_small() {
        use super::*;

        let values_source = vec![0, 3, 0, 2, 4, 1, 3, 2, 9];

        let values_target = vec![0, 0, 3, 3, 5, 9, 10, 13, 15];
        let total_target = 24;

        let Outputs { total, values } = main(Inputs {
            values: &values_source,
        });

        assert_eq!(total, total_target);
        assert_eq!(values, values_target);
    }

    #[test]
    fn scan_add_empty() {
        use super::*;

        let Outputs { total, values } = main(Inputs { values: &[] });
        assert_eq!(total, 0);
        assert!(values.is_empty());
    }

    #[test]
    fn scan_add_random() {
        use super::*;
        use rand::{rngs::StdRng, Rng, SeedableRng};

        // Recursing twice
        let count = GROUP_SIZE * GROUP_SIZE * 3 + 17;
        let values_source = StdRng::seed_from_u64(0x3D65)
            .sample_iter(rand_distr::Uniform::new(0, 1 << 8))
            .take(count)
            .collect::<Vec<u64>>();

        let values_target = values_source
            .iter()
            .scan(0, |state, &value| {
                let output = *state;
                *state += value;
                Some(output)
            })
            .collect::<Vec<_>>();
        let total_target = values_source.iter().sum::<u64>();

        let Outputs { total, values } = main(Inputs {
            values: &values_source,
        });

        assert_eq!(total, total_target);
        values
            .iter()
            .zip(&values_target)
            .enumerate()
            .for_each(|(index, (output, target))| {
                assert_eq!(output, target, "index: {index}");
            });
    }
}
