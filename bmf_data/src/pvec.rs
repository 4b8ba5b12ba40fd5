use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Index, IndexMut, Sub};

/// An N-dimensional integer position: one coordinate per mode
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct PVec(Vec<usize>);

impl PVec {
    /// The origin of an `nmodes`-dimensional space
    pub fn zeros(nmodes: usize) -> Self {
        Self(vec![0; nmodes])
    }

    #[inline]
    pub fn nmodes(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    /// Number of cells in a box with these side lengths
    ///
    /// # Example
    ///
    /// ```rust
    /// # use bmf_data::PVec;
    /// assert_eq!(PVec::from(vec![3, 4, 2]).prod(), 24);
    /// ```
    pub fn prod(&self) -> usize {
        self.0.iter().product()
    }

    /// `true` if every coordinate of `self` is strictly below `dims`
    pub fn in_bounds(&self, dims: &PVec) -> bool {
        self.nmodes() == dims.nmodes()
            && self.0.iter().zip(dims.0.iter()).all(|(x, d)| x < d)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, usize> {
        self.0.iter()
    }
}

impl From<Vec<usize>> for PVec {
    fn from(coords: Vec<usize>) -> Self {
        Self(coords)
    }
}

impl From<&[usize]> for PVec {
    fn from(coords: &[usize]) -> Self {
        Self(coords.to_vec())
    }
}

impl From<PVec> for Vec<usize> {
    fn from(pos: PVec) -> Self {
        pos.0
    }
}

impl Index<usize> for PVec {
    type Output = usize;

    #[inline]
    fn index(&self, mode: usize) -> &usize {
        &self.0[mode]
    }
}

impl IndexMut<usize> for PVec {
    #[inline]
    fn index_mut(&mut self, mode: usize) -> &mut usize {
        &mut self.0[mode]
    }
}

impl Add for &PVec {
    type Output = PVec;

    fn add(self, other: &PVec) -> PVec {
        assert_eq!(self.nmodes(), other.nmodes());
        PVec(self.0.iter().zip(other.0.iter()).map(|(a, b)| a + b).collect())
    }
}

impl Sub for &PVec {
    type Output = PVec;

    fn sub(self, other: &PVec) -> PVec {
        assert_eq!(self.nmodes(), other.nmodes());
        PVec(self.0.iter().zip(other.0.iter()).map(|(a, b)| a - b).collect())
    }
}

impl fmt::Display for PVec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (ix, x) in self.0.iter().enumerate() {
            if ix > 0 {
                write!(f, ",")?;
            }
            write!(f, "{x}")?;
        }
        write!(f, ")")
    }
}
