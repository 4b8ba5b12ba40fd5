use std::collections::HashMap;

use bmf_consts::rv::nalgebra::{DMatrix, DVector};
use bmf_utils::{offsets, RunContext, Stream};
use itertools::Itertools;
use rand::Rng;

use crate::center::CenteringAccumulator;
use crate::{
    CenterMode, Centering, DataError, Factors, NoiseModel, Offset, PVec,
    TensorData,
};

/// One sub-array of a [`MatricesData`]
#[derive(Clone, Debug)]
pub struct Block {
    /// Block coordinate in the block grid
    pos: PVec,
    /// Global coordinate of the block's first cell
    start: PVec,
    data: TensorData,
}

impl Block {
    #[inline]
    pub fn pos(&self) -> &PVec {
        &self.pos
    }

    #[inline]
    pub fn start(&self) -> &PVec {
        &self.start
    }

    #[inline]
    pub fn dims(&self) -> &PVec {
        self.data.dims()
    }

    #[inline]
    pub fn data(&self) -> &TensorData {
        &self.data
    }

    /// `true` if the global coordinate `ix` on `mode` falls in this block
    #[inline]
    pub fn in_mode(&self, mode: usize, ix: usize) -> bool {
        ix >= self.start[mode] && ix < self.start[mode] + self.dims()[mode]
    }

    /// `true` if the global position `pos` falls in this block
    pub fn contains(&self, pos: &[usize]) -> bool {
        pos.iter()
            .enumerate()
            .all(|(mode, &ix)| self.in_mode(mode, ix))
    }
}

/// Several sparse blocks laid out on a grid and seen as one sparse array.
///
/// Blocks in the same block row along a mode must agree on their size along
/// that mode, and every grid cell must hold exactly one block, so each
/// global coordinate belongs to exactly one block.
#[derive(Clone, Debug)]
pub struct MatricesData {
    nmodes: usize,
    blocks: Vec<Block>,
    /// Block size along each mode, indexed by block coordinate
    mode_sizes: Vec<Vec<Option<usize>>>,
    by_pos: HashMap<PVec, usize>,
    /// Global start of each block coordinate along each mode, with the total
    /// size as the last entry
    mode_offsets: Vec<Vec<usize>>,
    /// Blocks in each block coordinate along each mode
    mode_blocks: Vec<Vec<Vec<usize>>>,
    dims: PVec,
    centering: Centering,
}

impl MatricesData {
    pub fn new(nmodes: usize) -> Result<Self, DataError> {
        if nmodes < 2 {
            return Err(DataError::TooFewModes(nmodes));
        }
        Ok(Self {
            nmodes,
            blocks: Vec::new(),
            mode_sizes: vec![Vec::new(); nmodes],
            by_pos: HashMap::new(),
            mode_offsets: vec![vec![0]; nmodes],
            mode_blocks: vec![Vec::new(); nmodes],
            dims: PVec::zeros(nmodes),
            centering: Centering::default(),
        })
    }

    /// Place `data` at block coordinate `pos`
    pub fn add(&mut self, pos: PVec, data: TensorData) -> Result<(), DataError> {
        if pos.nmodes() != self.nmodes {
            return Err(DataError::ModeMismatch {
                expected: self.nmodes,
                found: pos.nmodes(),
            });
        }
        if data.nmodes() != self.nmodes {
            return Err(DataError::ModeMismatch {
                expected: self.nmodes,
                found: data.nmodes(),
            });
        }
        if self.by_pos.contains_key(&pos) {
            return Err(DataError::DuplicateBlock(pos));
        }

        for mode in 0..self.nmodes {
            let size = data.dims()[mode];
            match self.mode_sizes[mode].get(pos[mode]).copied().flatten() {
                Some(expected) if expected != size => {
                    return Err(DataError::BlockSizeMismatch {
                        pos,
                        mode,
                        expected,
                        found: size,
                    });
                }
                _ => (),
            }
        }

        for mode in 0..self.nmodes {
            let sizes = &mut self.mode_sizes[mode];
            if sizes.len() <= pos[mode] {
                sizes.resize(pos[mode] + 1, None);
            }
            sizes[pos[mode]] = Some(data.dims()[mode]);
        }

        self.by_pos.insert(pos.clone(), self.blocks.len());
        self.blocks.push(Block {
            start: PVec::zeros(self.nmodes),
            pos,
            data,
        });
        self.layout();
        Ok(())
    }

    /// Recompute block starts and total dimensions
    fn layout(&mut self) {
        self.mode_offsets = self
            .mode_sizes
            .iter()
            .map(|sizes| {
                let sizes: Vec<usize> =
                    sizes.iter().map(|s| s.unwrap_or(0)).collect();
                offsets(&sizes)
            })
            .collect();
        self.dims = PVec::from(
            self.mode_offsets
                .iter()
                .map(|offs| offs.last().copied().unwrap_or(0))
                .collect::<Vec<_>>(),
        );

        let offsets = &self.mode_offsets;
        self.blocks.iter_mut().for_each(|block| {
            (0..block.pos.nmodes())
                .for_each(|m| block.start[m] = offsets[m][block.pos[m]]);
        });

        self.mode_blocks = self
            .mode_sizes
            .iter()
            .enumerate()
            .map(|(mode, sizes)| {
                (0..sizes.len())
                    .map(|b| {
                        self.blocks
                            .iter()
                            .enumerate()
                            .filter(|(_, block)| block.pos[mode] == b)
                            .map(|(ix, _)| ix)
                            .collect()
                    })
                    .collect()
            })
            .collect();
    }

    /// Verify that the blocks tile the full array: every cell of the block
    /// grid holds a block.
    pub fn validate(&self) -> Result<(), DataError> {
        if self.blocks.is_empty() {
            return Err(DataError::Empty);
        }
        self.mode_sizes
            .iter()
            .map(|sizes| 0..sizes.len())
            .multi_cartesian_product()
            .map(PVec::from)
            .find(|pos| !self.by_pos.contains_key(pos))
            .map_or(Ok(()), |pos| Err(DataError::MissingBlock(pos)))
    }

    #[inline]
    pub fn nmodes(&self) -> usize {
        self.nmodes
    }

    #[inline]
    pub fn dims(&self) -> &PVec {
        &self.dims
    }

    #[inline]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    #[inline]
    pub fn centering(&self) -> &Centering {
        &self.centering
    }

    /// The block holding global position `pos` and the position local to
    /// that block
    pub fn find(&self, pos: &[usize]) -> Option<(&Block, PVec)> {
        if pos.len() != self.nmodes || !PVec::from(pos).in_bounds(&self.dims) {
            return None;
        }
        let block_pos: PVec = pos
            .iter()
            .zip(self.mode_offsets.iter())
            .map(|(&x, offs)| offs.partition_point(|&o| o <= x) - 1)
            .collect::<Vec<_>>()
            .into();
        self.by_pos.get(&block_pos).map(|&ix| {
            let block = &self.blocks[ix];
            let local = &PVec::from(pos) - &block.start;
            (block, local)
        })
    }

    /// Fold `f` over all blocks
    pub fn accumulate<T, F>(&self, init: T, f: F) -> T
    where
        F: FnMut(T, &Block) -> T,
    {
        self.blocks.iter().fold(init, f)
    }

    pub fn nnz(&self) -> usize {
        self.accumulate(0, |acc, b| acc + b.data.nnz())
    }

    pub fn nna(&self) -> usize {
        self.accumulate(0, |acc, b| acc + b.data.nna())
    }

    pub fn sum(&self) -> f64 {
        self.accumulate(0.0, |acc, b| acc + b.data.sum())
    }

    /// Pooled variance of the observed values across blocks
    pub fn var_total(&self) -> f64 {
        let n = self.nnz() as f64;
        let mean = self.sum() / n;
        let sum_sq = self.accumulate(0.0, |acc, b| acc + b.data.sum_sq());
        sum_sq / n - mean * mean
    }

    pub fn sumsq<F: Factors + ?Sized>(&self, model: &F) -> f64 {
        self.accumulate(0.0, |acc, b| {
            acc + b.data.sumsq(&Offset::new(model, &b.start))
        })
    }

    /// Compute one centering over all blocks and remove it from every value
    pub(crate) fn center(&mut self, mode: CenterMode) {
        let mut acc = CenteringAccumulator::new(mode, self.dims.as_slice());
        self.blocks
            .iter()
            .for_each(|b| b.data.push_centering(&mut acc, &b.start));
        let centering = acc.finish();
        self.blocks
            .iter_mut()
            .for_each(|b| b.data.center(&centering, &b.start));
        self.centering = centering;
    }

    pub(crate) fn init_noise(&mut self) {
        self.blocks.iter_mut().for_each(|b| b.data.init_noise());
    }

    /// Add the contribution of every block intersecting global `row` of
    /// `mode`
    #[allow(clippy::too_many_arguments)]
    pub fn get_pnm<F, R>(
        &self,
        model: &F,
        mode: usize,
        row: usize,
        current: &[f64],
        rr: &mut DVector<f64>,
        mm: &mut DMatrix<f64>,
        rng: &mut R,
    ) where
        F: Factors + ?Sized,
        R: Rng,
    {
        let b = self.mode_offsets[mode].partition_point(|&o| o <= row) - 1;
        self.mode_blocks[mode][b].iter().for_each(|&ix| {
            let block = &self.blocks[ix];
            let local_row = row - block.start[mode];
            block.data.get_pnm(
                &Offset::new(model, &block.start),
                mode,
                local_row,
                current,
                rr,
                mm,
                rng,
            );
        });
    }

    pub fn update_pnm<F: Factors + ?Sized>(&mut self, model: &F, mode: usize) {
        self.blocks.iter_mut().for_each(|block| {
            block.data.update_pnm(&Offset::new(model, &block.start), mode)
        });
    }

    /// Refresh each block's noise from its own residuals
    pub fn update_noise<F: Factors + ?Sized>(
        &mut self,
        model: &F,
        ctx: &RunContext,
    ) {
        self.blocks.iter_mut().enumerate().for_each(|(ix, block)| {
            let mut rng = ctx.rng(Stream::Noise { block: ix });
            block
                .data
                .update_noise(&Offset::new(model, &block.start), &mut rng)
        });
    }

    pub fn noise_precisions(&self) -> Vec<f64> {
        self.blocks
            .iter()
            .map(|b| b.data.noise().precision())
            .collect()
    }

    pub fn noise_models(&self) -> Vec<NoiseModel> {
        self.blocks.iter().map(|b| b.data.noise().clone()).collect()
    }

    /// Replace the noise state of every block, in block order
    pub fn set_noise_models(
        &mut self,
        noise: Vec<NoiseModel>,
    ) -> Result<(), DataError> {
        if noise.len() != self.blocks.len() {
            return Err(DataError::NoiseCount {
                expected: self.blocks.len(),
                found: noise.len(),
            });
        }
        if let Some(ix) = self
            .blocks
            .iter()
            .zip(noise.iter())
            .position(|(b, n)| !b.data.noise().same_kind(n))
        {
            return Err(DataError::NoiseMismatch(ix));
        }
        self.blocks
            .iter_mut()
            .zip(noise)
            .for_each(|(b, n)| b.data.set_noise(n));
        Ok(())
    }

    pub(crate) fn has_probit(&self) -> bool {
        self.blocks.iter().any(|b| b.data.noise().is_probit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::test_factors::VecFactors;
    use crate::NoiseConfig;
    use approx::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    fn block(n_rows: usize, n_cols: usize, fill: f64) -> TensorData {
        let coords: Vec<Vec<usize>> = (0..n_rows)
            .flat_map(|i| (0..n_cols).map(move |j| vec![i, j]))
            .filter(|c| (c[0] + c[1]) % 2 == 0)
            .collect();
        let values = vec![fill; coords.len()];
        TensorData::new(vec![n_rows, n_cols], &coords, &values, &NoiseConfig::default())
            .unwrap()
    }

    // 2x2 grid: rows split 3 + 2, cols split 2 + 4
    fn grid() -> MatricesData {
        let mut md = MatricesData::new(2).unwrap();
        md.add(PVec::from(vec![0, 0]), block(3, 2, 1.0)).unwrap();
        md.add(PVec::from(vec![0, 1]), block(3, 4, 2.0)).unwrap();
        md.add(PVec::from(vec![1, 0]), block(2, 2, 3.0)).unwrap();
        md.add(PVec::from(vec![1, 1]), block(2, 4, 4.0)).unwrap();
        md.validate().unwrap();
        md
    }

    #[test]
    fn dims_and_starts() {
        let md = grid();
        assert_eq!(md.dims(), &PVec::from(vec![5, 6]));
        let starts: Vec<PVec> =
            md.blocks().iter().map(|b| b.start().clone()).collect();
        assert_eq!(
            starts,
            vec![
                PVec::from(vec![0, 0]),
                PVec::from(vec![0, 2]),
                PVec::from(vec![3, 0]),
                PVec::from(vec![3, 2]),
            ]
        );
    }

    #[test]
    fn every_coordinate_maps_to_exactly_one_block() {
        let md = grid();
        for i in 0..5 {
            for j in 0..6 {
                let pos = [i, j];
                let n_containing =
                    md.blocks().iter().filter(|b| b.contains(&pos)).count();
                assert_eq!(n_containing, 1);

                let (block, local) = md.find(&pos).unwrap();
                assert!(block.contains(&pos));
                assert_eq!(&(&local + block.start()), &PVec::from(vec![i, j]));
                assert!(local.in_bounds(block.dims()));
            }
        }
        assert!(md.find(&[5, 0]).is_none());
    }

    #[test]
    fn missing_block_is_reported() {
        let mut md = MatricesData::new(2).unwrap();
        md.add(PVec::from(vec![0, 0]), block(3, 2, 1.0)).unwrap();
        md.add(PVec::from(vec![0, 1]), block(3, 4, 2.0)).unwrap();
        md.add(PVec::from(vec![1, 1]), block(2, 4, 4.0)).unwrap();
        assert_eq!(
            md.validate(),
            Err(DataError::MissingBlock(PVec::from(vec![1, 0])))
        );
    }

    #[test]
    fn inconsistent_block_size_is_rejected() {
        let mut md = MatricesData::new(2).unwrap();
        md.add(PVec::from(vec![0, 0]), block(3, 2, 1.0)).unwrap();
        let res = md.add(PVec::from(vec![0, 1]), block(4, 4, 2.0));
        assert!(matches!(
            res,
            Err(DataError::BlockSizeMismatch { mode: 0, expected: 3, found: 4, .. })
        ));
    }

    #[test]
    fn duplicate_block_is_rejected() {
        let mut md = grid();
        let res = md.add(PVec::from(vec![1, 1]), block(2, 4, 4.0));
        assert_eq!(res, Err(DataError::DuplicateBlock(PVec::from(vec![1, 1]))));
    }

    #[test]
    fn reductions_fold_over_blocks() {
        let md = grid();
        let nnz: usize = md.blocks().iter().map(|b| b.data().nnz()).sum();
        assert_eq!(md.nnz(), nnz);
        assert_eq!(md.nnz() + md.nna(), 30);
        let sum: f64 = md.blocks().iter().map(|b| b.data().sum()).sum();
        assert_relative_eq!(md.sum(), sum);
    }

    #[test]
    fn global_centering_is_shared() {
        let mut md = grid();
        let mean = md.sum() / md.nnz() as f64;
        md.center(CenterMode::Global);
        assert_relative_eq!(md.centering().global_mean(), mean);
        assert_relative_eq!(md.sum(), 0.0, epsilon = 1E-10);
    }

    #[test]
    fn get_pnm_uses_global_rows() {
        let md = grid();
        let rows = |n: usize, v: f64| vec![vec![v, 1.0]; n];
        let f = VecFactors(vec![rows(5, 1.0), rows(6, 2.0)]);

        // global row 4 lives in the second block row
        let mut rr = DVector::zeros(2);
        let mut mm = DMatrix::zeros(2, 2);
        let mut rng = Xoshiro256Plus::seed_from_u64(3);
        md.get_pnm(&f, 0, 4, &[1.0, 1.0], &mut rr, &mut mm, &mut rng);

        let n_obs: usize = md
            .blocks()
            .iter()
            .filter(|b| b.in_mode(0, 4))
            .map(|b| b.data().mode(0).row(4 - b.start()[0]).count())
            .sum();
        assert!(n_obs > 0);
        // every neighbour row is [2, 1] and the default precision applies
        let alpha = bmf_consts::DEFAULT_PRECISION;
        assert_relative_eq!(mm[(0, 0)], alpha * 4.0 * n_obs as f64);
        assert_relative_eq!(mm[(1, 1)], alpha * n_obs as f64);
    }

    #[test]
    fn noise_models_are_replaced_in_block_order() {
        let mut md = grid();
        let n = md.blocks().len();
        let mut noise = md.noise_models();
        assert_eq!(noise.len(), n);
        noise[1] = NoiseModel::Fixed { precision: 3.5 };
        md.set_noise_models(noise).unwrap();
        assert_relative_eq!(md.noise_precisions()[1], 3.5);

        assert_eq!(
            md.set_noise_models(vec![]),
            Err(DataError::NoiseCount {
                expected: n,
                found: 0
            })
        );
        let mut wrong = md.noise_models();
        wrong[0] = NoiseModel::Probit;
        assert_eq!(md.set_noise_models(wrong), Err(DataError::NoiseMismatch(0)));
    }
}
