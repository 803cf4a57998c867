use glam::{Vec3, Vec4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp1, UnitBall, UnitSphere};

use crate::buffer::ParticleBuffer;
use crate::config::SimulationOptions;
use crate::error::Error;

/// Positional and velocity field shaping of a generated cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CreationMode {
    /// Positions and velocities drawn uniformly inside scaled unit balls.
    Random,
    /// A hollow shell with tangential velocities, producing circulating
    /// orbits rather than radial collapse.
    #[default]
    Shell,
    /// Positions as in [`Random`](Self::Random) with purely radial outward
    /// velocities, modeling uniform expansion.
    Expand,
}

/// Mass distribution of a generated cloud, independent of the creation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MassMode {
    /// Every particle weighs the configured factor.
    #[default]
    Constant,
    /// Masses drawn uniformly from `[0, factor)`.
    Uniform,
    /// Exponential variates with rate `factor`, rescaled from the `[0, 5]`
    /// domain into `[0.1, 20]` and clamped there.
    Exponential,
}

/// Body count past which the cloud extent grows with N, keeping the density
/// of oversized clouds in check.
const REFERENCE_BODIES: u32 = 65536;

/// Shell bounds as multiples of the position scale.
const SHELL_INNER: f32 = 2.5;
const SHELL_OUTER: f32 = 4.0;

/// Dot-product deviation below which a position counts as parallel to the
/// reference axis.
const AXIS_EPSILON: f32 = 1e-6;

/// Deterministically fills `buffer` with the cloud described by `options`.
///
/// The random stream is reseeded from `options.seed` on every call, so the
/// same options always produce the same arrays. Padding slots are explicitly
/// zeroed and the back position slot mirrors the front, leaving both
/// ping-pong partners in the same state.
///
/// The buffer must hold exactly `options.bodies` slots; any other extent is
/// rejected before a single particle is written.
pub fn populate(buffer: &mut ParticleBuffer, options: &SimulationOptions) -> Result<(), Error> {
    if buffer.len() != options.bodies as usize {
        return Err(Error::BufferMismatch {
            expected: options.bodies as usize,
            found: buffer.len(),
        });
    }

    fill(buffer, options);
    Ok(())
}

/// Allocates a buffer sized for `options` and fills it with the described
/// cloud.
pub fn generate(options: &SimulationOptions) -> ParticleBuffer {
    let mut buffer = ParticleBuffer::new(options.bodies, options.block_size);
    fill(&mut buffer, options);
    buffer
}

fn fill(buffer: &mut ParticleBuffer, options: &SimulationOptions) {
    let mut rng = StdRng::seed_from_u64(options.seed);
    let bodies = buffer.len();

    let compensation = (options.bodies / REFERENCE_BODIES).max(1) as f32;
    let position_scale = match options.creation_mode {
        CreationMode::Shell => options.position_scale,
        CreationMode::Random | CreationMode::Expand => options.position_scale * compensation,
    };
    let velocity_scale = options.velocity_scale * position_scale;

    log::debug!(
        "generating {:?}/{:?} cloud: {bodies} bodies, seed {}",
        options.creation_mode,
        options.mass_mode,
        options.seed
    );

    for i in 0..bodies {
        let mass = sample_mass(&mut rng, options.mass_mode, options.mass_factor);
        let (position, velocity) = match options.creation_mode {
            CreationMode::Random => (
                ball(&mut rng) * position_scale,
                ball(&mut rng) * velocity_scale,
            ),
            CreationMode::Shell => shell_particle(&mut rng, position_scale, velocity_scale),
            CreationMode::Expand => {
                let position = ball(&mut rng) * position_scale;
                (position, position * velocity_scale)
            }
        };

        buffer.positions_padded_mut()[i] = position.extend(mass);
        buffer.velocities_padded_mut()[i] = velocity.extend(0.0);
    }

    for slot in bodies..buffer.padded_len() {
        buffer.positions_padded_mut()[slot] = Vec4::ZERO;
        buffer.velocities_padded_mut()[slot] = Vec4::ZERO;
    }

    buffer.mirror_front();
}

/// One shell particle: a radius interpolated between the scaled bounds and a
/// velocity orthogonal to both the position and the reference axis.
fn shell_particle(rng: &mut StdRng, position_scale: f32, velocity_scale: f32) -> (Vec3, Vec3) {
    let inner = SHELL_INNER * position_scale;
    let outer = SHELL_OUTER * position_scale;

    let [x, y, z]: [f32; 3] = UnitSphere.sample(rng);
    let direction = Vec3::new(x, y, z);
    let radius = inner + (outer - inner) * rng.gen::<f32>();
    let position = direction * radius;

    let mut axis = Vec3::Z;
    if 1.0 - direction.dot(axis) < AXIS_EPSILON {
        axis = Vec3::new(position.y, position.x, 1.0).normalize();
    }
    let velocity = position.cross(axis) * velocity_scale;

    (position, velocity)
}

fn sample_mass(rng: &mut StdRng, mode: MassMode, factor: f32) -> f32 {
    match mode {
        MassMode::Constant => factor,
        MassMode::Uniform => rng.gen::<f32>() * factor,
        MassMode::Exponential => {
            let variate: f32 = rng.sample(Exp1);
            rescale(variate / factor, 0.0, 5.0, 0.1, 20.0).clamp(0.1, 20.0)
        }
    }
}

fn ball(rng: &mut StdRng) -> Vec3 {
    let [x, y, z]: [f32; 3] = UnitBall.sample(rng);
    Vec3::new(x, y, z)
}

/// Linearly maps `v` from the `[from0, from1]` domain onto `[to0, to1]`.
fn rescale(v: f32, from0: f32, from1: f32, to0: f32, to1: f32) -> f32 {
    (v - from0) / (from1 - from0) * (to1 - to0) + to0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(creation_mode: CreationMode, mass_mode: MassMode) -> SimulationOptions {
        SimulationOptions {
            bodies: 256,
            creation_mode,
            mass_mode,
            mass_factor: 3.0,
            ..SimulationOptions::default()
        }
    }

    #[test]
    fn regeneration_is_deterministic() {
        for creation_mode in [CreationMode::Random, CreationMode::Shell, CreationMode::Expand] {
            let options = options(creation_mode, MassMode::Exponential);
            let first = generate(&options);
            let second = generate(&options);

            assert_eq!(first.positions_padded(), second.positions_padded());
            assert_eq!(first.velocities_padded(), second.velocities_padded());
        }
    }

    #[test]
    fn seeds_shape_the_stream() {
        let base = options(CreationMode::Shell, MassMode::Uniform);
        let reseeded = SimulationOptions { seed: 128, ..base.clone() };

        assert_ne!(
            generate(&base).positions_padded(),
            generate(&reseeded).positions_padded()
        );
    }

    #[test]
    fn constant_masses_equal_factor() {
        let buffer = generate(&options(CreationMode::Random, MassMode::Constant));
        assert!(buffer.positions().iter().all(|p| p.w == 3.0));
    }

    #[test]
    fn uniform_masses_stay_below_factor() {
        let buffer = generate(&options(CreationMode::Random, MassMode::Uniform));
        assert!(buffer.positions().iter().all(|p| (0.0..3.0).contains(&p.w)));
    }

    #[test]
    fn exponential_masses_stay_in_range() {
        let buffer = generate(&options(CreationMode::Random, MassMode::Exponential));
        assert!(buffer
            .positions()
            .iter()
            .all(|p| (0.1..=20.0).contains(&p.w)));
    }

    #[test]
    fn shell_radii_stay_between_bounds() {
        let options = options(CreationMode::Shell, MassMode::Constant);
        let buffer = generate(&options);

        let inner = SHELL_INNER * options.position_scale;
        let outer = SHELL_OUTER * options.position_scale;
        for p in buffer.positions() {
            let radius = p.truncate().length();
            assert!(radius >= inner * 0.999 && radius <= outer * 1.001);
        }
    }

    #[test]
    fn shell_velocities_are_tangential() {
        let buffer = generate(&options(CreationMode::Shell, MassMode::Constant));

        for (p, v) in buffer.positions().iter().zip(buffer.velocities()) {
            let radial = p.truncate().dot(v.truncate()).abs();
            let scale = 1.0 + p.truncate().length() * v.truncate().length();
            assert!(radial <= 1e-4 * scale, "residual radial component {radial}");
        }
    }

    #[test]
    fn expand_velocities_are_radial() {
        let buffer = generate(&options(CreationMode::Expand, MassMode::Constant));

        for (p, v) in buffer.positions().iter().zip(buffer.velocities()) {
            let sideways = p.truncate().cross(v.truncate()).length();
            let scale = 1.0 + p.truncate().length() * v.truncate().length();
            assert!(sideways <= 1e-4 * scale);
            assert!(p.truncate().dot(v.truncate()) >= 0.0);
        }
    }

    #[test]
    fn velocity_w_slot_is_unused() {
        let buffer = generate(&options(CreationMode::Random, MassMode::Uniform));
        assert!(buffer.velocities().iter().all(|v| v.w == 0.0));
    }

    #[test]
    fn padding_slots_are_zeroed() {
        let options = SimulationOptions {
            bodies: 100,
            block_size: 64,
            ..options(CreationMode::Shell, MassMode::Exponential)
        };
        let buffer = generate(&options);

        assert_eq!(buffer.padded_len(), 128);
        for slot in buffer.len()..buffer.padded_len() {
            assert_eq!(buffer.positions_padded()[slot], Vec4::ZERO);
            assert_eq!(buffer.velocities_padded()[slot], Vec4::ZERO);
        }
    }

    #[test]
    fn oversized_clouds_spread_out() {
        let bodies = REFERENCE_BODIES * 2;
        let options = SimulationOptions {
            bodies,
            position_scale: 16.0,
            velocity_scale: 0.0,
            ..options(CreationMode::Expand, MassMode::Constant)
        };
        let buffer = generate(&options);

        let max_radius = buffer
            .positions()
            .iter()
            .map(|p| p.truncate().length())
            .fold(0.0, f32::max);

        // Doubled body count doubles the extent.
        assert!(max_radius > 16.0);
        assert!(max_radius <= 32.0 * 1.001);
    }

    #[test]
    fn mismatched_buffer_is_rejected() {
        let options = SimulationOptions {
            bodies: 131_072,
            ..options(CreationMode::Expand, MassMode::Constant)
        };
        let mut undersized = ParticleBuffer::new(64, 64);

        let denied = populate(&mut undersized, &options);
        assert!(matches!(
            denied,
            Err(Error::BufferMismatch {
                expected: 131_072,
                found: 64
            })
        ));
        // Rejected before anything was written.
        assert!(undersized
            .positions_padded()
            .iter()
            .all(|p| *p == Vec4::ZERO));
    }
}
