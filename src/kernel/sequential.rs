use glam::{Vec3A, Vec4};

use super::{direct_sum, integrate_slot, tiled_sum, Kernel, StepParams};

/// Direct pairwise summation on one thread, O(N^2).
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

        for i in 0..src.len() {
            dst[i] = src[i];
            if i < bodies {
                let acceleration = direct_sum(Vec3A::from(src[i]), src, softening_sq);
                integrate_slot(acceleration, &mut dst[i], &mut velocities[i], params);
            }
        }
    }

    fn integrate_in_place(
        &mut self,
        bodies: usize,
        positions: &mut [Vec4],
        velocities: &mut [Vec4],
        params: &StepParams,
    ) {
        let softening_sq = params.softening * params.softening;

        let accelerations: Vec<Vec3A> = positions[..bodies]
            .iter()
            .map(|&p| direct_sum(Vec3A::from(p), positions, softening_sq))
            .collect();

        for (i, acceleration) in accelerations.into_iter().enumerate() {
            integrate_slot(acceleration, &mut positions[i], &mut velocities[i], params);
        }
    }
}

/// Pairwise summation staged through block-sized tiles, reproducing the
/// accumulation order of the shared-memory GPU kernel.
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

        for i in 0..src.len() {
            dst[i] = src[i];
            if i < bodies {
                let acceleration = tiled_sum(Vec3A::from(src[i]), src, block_size, softening_sq);
                integrate_slot(acceleration, &mut dst[i], &mut velocities[i], params);
            }
        }
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

        let accelerations: Vec<Vec3A> = positions[..bodies]
            .iter()
            .map(|&p| tiled_sum(Vec3A::from(p), positions, block_size, softening_sq))
            .collect();

        for (i, acceleration) in accelerations.into_iter().enumerate() {
            integrate_slot(acceleration, &mut positions[i], &mut velocities[i], params);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests;
    use super::*;

    #[test]
    fn brute_force_matches_reference() {
        tests::step_matches_reference(BruteForce);
    }

    #[test]
    fn brute_force_zero_dt_only_damps() {
        tests::zero_dt_only_damps(BruteForce);
    }

    #[test]
    fn brute_force_conserves_momentum() {
        tests::momentum_conserved(BruteForce);
    }

    #[test]
    fn brute_force_padding_is_neutral() {
        tests::padding_is_neutral(BruteForce, BruteForce, 1e-5);
    }

    #[test]
    fn brute_force_in_place_matches_ping_pong() {
        tests::in_place_matches_ping_pong(BruteForce);
    }

    #[test]
    fn tiled_matches_reference() {
        tests::step_matches_reference(Tiled { block_size: 32 });
    }

    #[test]
    fn tiled_zero_dt_only_damps() {
        tests::zero_dt_only_damps(Tiled { block_size: 32 });
    }

    #[test]
    fn tiled_conserves_momentum() {
        tests::momentum_conserved(Tiled { block_size: 32 });
    }

    #[test]
    fn tiled_padding_is_neutral() {
        tests::padding_is_neutral(
            Tiled { block_size: 32 },
            Tiled { block_size: 64 },
            1e-3,
        );
    }

    #[test]
    fn tiled_in_place_matches_ping_pong() {
        tests::in_place_matches_ping_pong(Tiled { block_size: 32 });
    }

    /// The two accumulation strategies only differ in summation order.
    #[test]
    fn tiled_matches_brute_force() {
        use crate::buffer::{BufferMode, BufferScheduler};

        let mut direct = tests::test_buffer(96, 32);
        let mut staged = direct.clone();
        let params = StepParams {
            dt: 0.01,
            gravitational_constant: 1.0,
            softening: 0.5,
            damping: 0.95,
        };

        let scheduler = BufferScheduler::new(BufferMode::PingPong);
        for _ in 0..3 {
            scheduler.run(&mut direct, &mut BruteForce, &params).unwrap();
            scheduler
                .run(&mut staged, &mut Tiled { block_size: 32 }, &params)
                .unwrap();
        }

        for i in 0..direct.len() {
            tests::assert_close(staged.positions()[i], direct.positions()[i], 1e-3);
            tests::assert_close(staged.velocities()[i], direct.velocities()[i], 1e-3);
        }
    }
}
