use crate::{DataError, NoiseConfig, TensorData};
use serde::{Deserialize, Serialize};

/// Observed entries of one sparse array
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SparseConfig {
    /// Size of each mode
    pub dims: Vec<usize>,
    /// One coordinate vector per observed entry
    #[serde(default)]
    pub coords: Vec<Vec<usize>>,
    #[serde(default)]
    pub values: Vec<f64>,
    #[serde(default)]
    pub noise: NoiseConfig,
}

impl SparseConfig {
    pub fn new(dims: Vec<usize>) -> Self {
        Self {
            dims,
            ..Default::default()
        }
    }

    /// Add one observed entry
    pub fn push(mut self, coord: Vec<usize>, value: f64) -> Self {
        self.coords.push(coord);
        self.values.push(value);
        self
    }

    pub fn noise(mut self, noise: NoiseConfig) -> Self {
        self.noise = noise;
        self
    }

    pub fn nmodes(&self) -> usize {
        self.dims.len()
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn build(&self) -> Result<TensorData, DataError> {
        TensorData::new(self.dims.clone(), &self.coords, &self.values, &self.noise)
    }
}

/// One block of a block-composed array
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockConfig {
    /// Block coordinate in the block grid
    pub pos: Vec<usize>,
    pub data: SparseConfig,
}

impl BlockConfig {
    pub fn new(pos: Vec<usize>, data: SparseConfig) -> Self {
        Self { pos, data }
    }
}

/// Description of the training data handed to the sampler
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataConfig {
    Sparse(SparseConfig),
    Blocks(Vec<BlockConfig>),
}

impl DataConfig {
    pub fn nmodes(&self) -> usize {
        match self {
            Self::Sparse(sparse) => sparse.nmodes(),
            Self::Blocks(blocks) => blocks.first().map_or(0, |b| b.data.nmodes()),
        }
    }

    /// Noise settings of every block
    pub fn noise_configs(&self) -> Vec<&NoiseConfig> {
        match self {
            Self::Sparse(sparse) => vec![&sparse.noise],
            Self::Blocks(blocks) => blocks.iter().map(|b| &b.data.noise).collect(),
        }
    }
}
