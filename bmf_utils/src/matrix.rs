use rayon::prelude::{ParallelSlice, ParallelSliceMut};
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// A lightweight row-major matrix. Factor matrices store one latent vector
/// per row.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Matrix<T: Send + Sync> {
    n_rows: usize,
    n_cols: usize,
    values: Vec<T>,
}

impl<T: Send + Sync> Matrix<T> {
    pub fn from_raw_parts(values: Vec<T>, n_rows: usize, n_cols: usize) -> Self {
        assert_eq!(values.len(), n_rows * n_cols);
        Matrix {
            n_rows,
            n_cols,
            values,
        }
    }

    /// Create a new Matrix from a vector of row vectors
    ///
    /// # Example
    ///
    /// ```rust
    /// # use bmf_utils::Matrix;
    /// let mat = Matrix::from_vecs(vec![vec![0, 1, 2], vec![3, 4, 5]]);
    ///
    /// assert_eq!(mat.n_rows(), 2);
    /// assert_eq!(mat.n_cols(), 3);
    /// assert_eq!(mat[(1, 0)], 3);
    /// ```
    pub fn from_vecs(vecs: Vec<Vec<T>>) -> Self {
        let n_rows = vecs.len();
        let n_cols = vecs.first().map_or(0, |row| row.len());
        let mut values = Vec::with_capacity(n_rows * n_cols);

        vecs.into_iter().for_each(|row| {
            assert_eq!(row.len(), n_cols);
            values.extend(row);
        });

        Matrix {
            n_rows,
            n_cols,
            values,
        }
    }

    #[inline]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    #[inline]
    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    #[inline]
    pub fn nelem(&self) -> usize {
        self.n_cols * self.n_rows
    }

    #[inline]
    pub fn raw_values(&self) -> &[T] {
        &self.values
    }

    #[inline]
    pub fn row(&self, ix: usize) -> &[T] {
        let start = ix * self.n_cols;
        &self.values[start..start + self.n_cols]
    }

    #[inline]
    pub fn row_mut(&mut self, ix: usize) -> &mut [T] {
        let start = ix * self.n_cols;
        &mut self.values[start..start + self.n_cols]
    }

    /// Create an iterator through rows
    #[inline]
    pub fn rows(&self) -> std::slice::ChunksExact<'_, T> {
        self.values.chunks_exact(self.n_cols)
    }

    /// Create a mutable iterator through rows
    #[inline]
    pub fn rows_mut(&mut self) -> std::slice::ChunksExactMut<'_, T> {
        self.values.chunks_exact_mut(self.n_cols)
    }

    /// Parallel version of `rows`
    #[inline]
    pub fn par_rows(&self) -> rayon::slice::ChunksExact<'_, T> {
        self.values.par_chunks_exact(self.n_cols)
    }

    /// Parallel version of `rows_mut`
    #[inline]
    pub fn par_rows_mut(&mut self) -> rayon::slice::ChunksExactMut<'_, T> {
        self.values.par_chunks_exact_mut(self.n_cols)
    }

    /// `true` if the stored buffer agrees with the declared shape
    pub fn is_consistent(&self) -> bool {
        self.values.len() == self.n_rows * self.n_cols
    }
}

impl<T: Send + Sync + Clone + Default> Matrix<T> {
    /// A matrix filled with `T::default()`
    pub fn zeros(n_rows: usize, n_cols: usize) -> Self {
        Matrix {
            n_rows,
            n_cols,
            values: vec![T::default(); n_rows * n_cols],
        }
    }
}

impl Matrix<f64> {
    /// Frobenius norm of the matrix
    ///
    /// # Example
    ///
    /// ```rust
    /// # use bmf_utils::Matrix;
    /// let mat = Matrix::from_vecs(vec![vec![3.0, 0.0], vec![0.0, 4.0]]);
    /// assert_eq!(mat.norm(), 5.0);
    /// ```
    pub fn norm(&self) -> f64 {
        self.values.iter().map(|x| x * x).sum::<f64>().sqrt()
    }

    /// `true` if every entry is finite
    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|x| x.is_finite())
    }
}

impl<T> Index<(usize, usize)> for Matrix<T>
where
    T: Send + Sync,
{
    type Output = T;

    #[inline]
    fn index(&self, (i, j): (usize, usize)) -> &Self::Output {
        &self.values[self.n_cols * i + j]
    }
}

impl<T> IndexMut<(usize, usize)> for Matrix<T>
where
    T: Send + Sync,
{
    #[inline]
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut Self::Output {
        &mut self.values[self.n_cols * i + j]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn par_rows_mut_touches_every_row_once() {
        let mut mat: Matrix<f64> = Matrix::zeros(5, 3);
        mat.par_rows_mut().enumerate().for_each(|(ix, row)| {
            row.iter_mut().for_each(|x| *x += ix as f64);
        });

        for ix in 0..5 {
            assert!(mat.row(ix).iter().all(|&x| x == ix as f64));
        }
    }

    #[test]
    fn row_mut_writes_only_its_row() {
        let mut mat: Matrix<u8> = Matrix::zeros(3, 2);
        mat.row_mut(1).copy_from_slice(&[7, 8]);
        assert_eq!(mat.raw_values(), &[0, 0, 7, 8, 0, 0]);
    }

    #[test]
    fn from_raw_parts_keeps_shape() {
        let mat = Matrix::from_raw_parts(vec![1, 2, 3, 4, 5, 6], 3, 2);
        assert_eq!(mat[(2, 1)], 6);
        assert_eq!(mat.rows().count(), 3);
    }

    #[test]
    #[should_panic]
    fn from_raw_parts_rejects_bad_shape() {
        let _mat = Matrix::from_raw_parts(vec![1, 2, 3], 2, 2);
    }

    #[test]
    fn serde_yaml_keeps_values() {
        let mat = Matrix::from_vecs(vec![vec![0.5, 1.5], vec![-2.0, 3.0]]);
        let s = serde_yaml::to_string(&mat).unwrap();
        let back: Matrix<f64> = serde_yaml::from_str(&s).unwrap();
        assert_eq!(mat, back);
    }
}
