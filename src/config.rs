use crate::cloud::{CreationMode, MassMode};

/// Preferred adapter class for GPU execution.
///
/// Mirrors the two classes exposed by WebGPU-style APIs. Ignored by the CPU
/// kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerPreference {
    /// Favor battery life over throughput.
    LowPower,
    /// Favor throughput, usually a discrete adapter.
    #[default]
    HighPerformance,
}

/// Tunable physical and execution constants for one simulation session.
///
/// Hosts fill this in once and hand it to
/// [`Simulation::new`](crate::simulation::Simulation::new); the session
/// keeps its own sanitized copy and only changes it through setters or a
/// full [`configure`](crate::simulation::Simulation::configure). Structural
/// fields are sanitized on construction: at least one body, block size
/// snapped to a power of two in `[1, 256]`, damping kept in `(0, 1]`,
/// scales and physical constants kept non-negative.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationOptions {
    /// Number of simulated bodies.
    pub bodies: u32,
    /// Seed for the deterministic cloud generation stream.
    pub seed: u64,
    /// Positional and velocity field shaping of the initial cloud.
    pub creation_mode: CreationMode,
    /// Mass distribution of the initial cloud.
    pub mass_mode: MassMode,
    /// Meaning depends on [`MassMode`]: the constant mass, the exclusive
    /// upper bound of the uniform draw, or the exponential rate.
    pub mass_factor: f32,
    /// Spatial extent multiplier of the generated cloud.
    pub position_scale: f32,
    /// Base velocity multiplier, applied on top of the position scale.
    pub velocity_scale: f32,
    /// Gravitational constant G.
    pub gravitational_constant: f32,
    /// Softening length added inside the squared-distance term.
    pub softening: f32,
    /// Per-step velocity damping factor in `(0, 1]`; 1 disables dissipation.
    pub damping: f32,
    /// Base speed multiplier applied to the smoothed speed scalar.
    pub speed: f32,
    /// Workgroup/tile width in particles; the buffer is padded to a multiple
    /// of it.
    pub block_size: u32,
    /// Whether the session starts paused.
    pub paused: bool,
    /// Adapter class requested when acquiring a GPU device.
    pub power_preference: PowerPreference,
    /// Accept a software fallback adapter instead of failing.
    pub force_fallback_adapter: bool,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            bodies: 1024,
            seed: 127,
            creation_mode: CreationMode::Shell,
            mass_mode: MassMode::Constant,
            mass_factor: 1.0,
            position_scale: 16.0,
            velocity_scale: 1.0,
            gravitational_constant: 1.0,
            softening: 1.0,
            damping: 0.95,
            speed: 1.0,
            block_size: 64,
            paused: false,
            power_preference: PowerPreference::HighPerformance,
            force_fallback_adapter: false,
        }
    }
}

impl SimulationOptions {
    /// Returns a copy with every structural field forced into its valid
    /// range.
    pub fn sanitized(&self) -> Self {
        let mut options = self.clone();
        options.bodies = options.bodies.max(1);
        options.block_size = options.block_size.clamp(1, 256).next_power_of_two();
        options.mass_factor = options.mass_factor.max(0.0);
        options.position_scale = options.position_scale.max(0.0);
        options.velocity_scale = options.velocity_scale.max(0.0);
        options.gravitational_constant = options.gravitational_constant.max(0.0);
        options.softening = options.softening.max(0.0);
        options.damping = options.damping.clamp(f32::EPSILON, 1.0);
        options.speed = options.speed.max(0.0);
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_already_sanitized() {
        let options = SimulationOptions::default();
        assert_eq!(options, options.sanitized());
        assert_eq!(options.bodies, 1024);
        assert_eq!(options.seed, 127);
        assert_eq!(options.creation_mode, CreationMode::Shell);
        assert_eq!(options.block_size, 64);
    }

    #[test]
    fn sanitize_snaps_structural_fields() {
        let options = SimulationOptions {
            bodies: 0,
            block_size: 100,
            damping: 0.0,
            softening: -1.0,
            speed: -2.0,
            ..SimulationOptions::default()
        }
        .sanitized();

        assert_eq!(options.bodies, 1);
        assert_eq!(options.block_size, 128);
        assert!(options.damping > 0.0 && options.damping <= 1.0);
        assert_eq!(options.softening, 0.0);
        assert_eq!(options.speed, 0.0);
    }

    #[test]
    fn sanitize_caps_block_size() {
        let options = SimulationOptions {
            block_size: 4096,
            ..SimulationOptions::default()
        }
        .sanitized();

        assert_eq!(options.block_size, 256);
    }
}
