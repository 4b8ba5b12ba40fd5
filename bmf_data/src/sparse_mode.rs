use bmf_utils::{bincount, offsets};
use serde::{Deserialize, Serialize};

/// Observations of a sparse array sorted by their coordinate on one mode.
///
/// `row_ptr[n]..row_ptr[n + 1]` delimits the contiguous run of entries whose
/// coordinate on `mode` is `n`, so all observations sharing a row are reached
/// without scanning the full list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SparseMode {
    mode: usize,
    nmodes: usize,
    row_ptr: Vec<usize>,
    /// Full coordinates, `nmodes` per entry
    coords: Vec<usize>,
    values: Vec<f64>,
}

impl SparseMode {
    /// Build the index fixing `mode` from flat coordinates (`nmodes` per
    /// entry) and their values. Entries within a row keep input order.
    pub fn new(
        coords: &[usize],
        values: &[f64],
        nmodes: usize,
        mode: usize,
        mode_size: usize,
    ) -> Self {
        assert!(mode < nmodes);
        assert_eq!(coords.len(), values.len() * nmodes);

        let keys: Vec<usize> = coords
            .chunks_exact(nmodes)
            .map(|coord| coord[mode])
            .collect();
        let row_ptr = offsets(&bincount(&keys, mode_size));

        let mut cursor = row_ptr.clone();
        let mut sorted_coords = vec![0; coords.len()];
        let mut sorted_values = vec![0.0; values.len()];
        coords
            .chunks_exact(nmodes)
            .zip(values.iter())
            .for_each(|(coord, &value)| {
                let dst = cursor[coord[mode]];
                cursor[coord[mode]] += 1;
                sorted_coords[dst * nmodes..(dst + 1) * nmodes]
                    .copy_from_slice(coord);
                sorted_values[dst] = value;
            });

        SparseMode {
            mode,
            nmodes,
            row_ptr,
            coords: sorted_coords,
            values: sorted_values,
        }
    }

    #[inline]
    pub fn mode(&self) -> usize {
        self.mode
    }

    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Size of the fixed mode
    #[inline]
    pub fn n_rows(&self) -> usize {
        self.row_ptr.len() - 1
    }

    #[inline]
    pub fn begin(&self, row: usize) -> usize {
        self.row_ptr[row]
    }

    #[inline]
    pub fn end(&self, row: usize) -> usize {
        self.row_ptr[row + 1]
    }

    /// Full coordinate of the `ix`th sorted entry
    #[inline]
    pub fn coord(&self, ix: usize) -> &[usize] {
        &self.coords[ix * self.nmodes..(ix + 1) * self.nmodes]
    }

    #[inline]
    pub fn value(&self, ix: usize) -> f64 {
        self.values[ix]
    }

    /// Entries whose coordinate on the fixed mode is `row`
    pub fn row(&self, row: usize) -> impl Iterator<Item = (&[usize], f64)> {
        (self.begin(row)..self.end(row))
            .map(move |ix| (self.coord(ix), self.value(ix)))
    }

    /// All entries, in fixed-mode order
    pub fn iter(&self) -> impl Iterator<Item = (&[usize], f64)> {
        self.coords
            .chunks_exact(self.nmodes)
            .zip(self.values.iter().copied())
    }

    /// Replace each value with `f(coord, value)`
    pub fn map_values<F>(&mut self, mut f: F)
    where
        F: FnMut(&[usize], f64) -> f64,
    {
        self.coords
            .chunks_exact(self.nmodes)
            .zip(self.values.iter_mut())
            .for_each(|(coord, value)| *value = f(coord, *value));
    }
}
