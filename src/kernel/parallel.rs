use glam::{Vec3A, Vec4};
use rayon::prelude::*;

use super::{direct_sum, integrate_slot, tiled_sum, Kernel, StepParams};

/// Direct pairwise summation parallelized over particles with rayon.
///
/// Each worker serially sums the contributions for its own indices in the
/// same order as [`sequential::BruteForce`](super::sequential::BruteForce),
/// so results are identical to the serial kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct BruteForce;

impl Kernel for BruteForce {
    fn snapshot_reads(&self) -> bool {
        true
    }

    fn integrate(
        &mut self,
        bodies: usize,
        src: &[Vec4],
        dst: &mut [Vec4],
        velocities: &mut [Vec4],
        params: &StepParams,
    ) {
        let softening_sq = params.softening * params.softening;

        dst.par_iter_mut()
            .zip(velocities.par_iter_mut())
            .enumerate()
            .for_each(|(i, (position, velocity))| {
                *position = src[i];
                if i < bodies {
                    let acceleration = direct_sum(Vec3A::from(src[i]), src, softening_sq);
                    integrate_slot(acceleration, position, velocity, params);
                }
            });
    }

    fn integrate_in_place(
        &mut self,
        bodies: usize,
        positions: &mut [Vec4],
        velocities: &mut [Vec4],
        params: &StepParams,
    ) {
        let softening_sq = params.softening * params.softening;

        let accelerations: Vec<Vec3A> = {
            let snapshot: &[Vec4] = positions;
            snapshot[..bodies]
                .par_iter()
                .map(|&p| direct_sum(Vec3A::from(p), snapshot, softening_sq))
                .collect()
        };

        positions[..bodies]
            .par_iter_mut()
            .zip(velocities[..bodies].par_iter_mut())
            .zip(accelerations)
            .for_each(|((position, velocity), acceleration)| {
                integrate_slot(acceleration, position, velocity, params);
            });
    }
}

/// Tiled pairwise summation parallelized over particles with rayon.
#[derive(Debug, Clone, Copy)]
pub struct Tiled {
    /// Tile width in particles.
    pub block_size: u32,
}

impl Default for Tiled {
    fn default() -> Self {
        Self { block_size: 64 }
    }
}

impl Kernel for Tiled {
    fn snapshot_reads(&self) -> bool {
        true
    }

    fn integrate(
        &mut self,
        bodies: usize,
        src: &[Vec4],
        dst: &mut [Vec4],
        velocities: &mut [Vec4],
        params: &StepParams,
    ) {
        let softening_sq = params.softening * params.softening;
        let block_size = self.block_size as usize;

        dst.par_iter_mut()
            .zip(velocities.par_iter_mut())
            .enumerate()
            .for_each(|(i, (position, velocity))| {
                *position = src[i];
                if i < bodies {
                    let acceleration =
                        tiled_sum(Vec3A::from(src[i]), src, block_size, softening_sq);
                    integrate_slot(acceleration, position, velocity, params);
                }
            });
    }

    fn integrate_in_place(
        &mut self,
        bodies: usize,
        positions: &mut [Vec4],
        velocities: &mut [Vec4],
        params: &StepParams,
    ) {
        let softening_sq = params.softening * params.softening;
        let block_size = self.block_size as usize;

        let accelerations: Vec<Vec3A> = {
            let snapshot: &[Vec4] = positions;
            snapshot[..bodies]
                .par_iter()
                .map(|&p| tiled_sum(Vec3A::from(p), snapshot, block_size, softening_sq))
                .collect()
        };

        positions[..bodies]
            .par_iter_mut()
            .zip(velocities[..bodies].par_iter_mut())
            .zip(accelerations)
            .for_each(|((position, velocity), acceleration)| {
                integrate_slot(acceleration, position, velocity, params);
            });
    }
}
