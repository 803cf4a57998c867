use glam::Vec4;

use crate::buffer::{BufferScheduler, ParticleBuffer};
use crate::cloud;
use crate::config::SimulationOptions;
use crate::controller::SpeedController;
use crate::error::Error;
use crate::kernel::{sequential, Kernel, StepParams};

/// A complete simulation session: generated cloud, speed control and a
/// kernel dispatched once per frame.
///
/// The host calls [`step`](Self::step) with its wall-clock frame delta;
/// stepping is frame-rate-coupled, so a slow host integrates with larger
/// time steps. Positions are exposed read-only for drawing.
///
/// # Example
///
/// ```
/// use gravitas::prelude::*;
///
/// let options = SimulationOptions {
///     bodies: 256,
///     ..SimulationOptions::default()
/// };
/// let mut simulation: Simulation = Simulation::new(options);
///
/// simulation.step(1.0 / 60.0)?;
/// assert_eq!(simulation.positions().len(), 256);
/// # Ok::<(), Error>(())
/// ```
pub struct Simulation<K = sequential::BruteForce> {
    options: SimulationOptions,
    buffer: ParticleBuffer,
    scheduler: BufferScheduler,
    controller: SpeedController,
    kernel: K,
}

impl<K: Kernel + Default> Simulation<K> {
    /// Creates a session with a default-constructed kernel.
    pub fn new(options: SimulationOptions) -> Self {
        Self::with_kernel(options, K::default())
    }
}

impl<K: Kernel> Simulation<K> {
    /// Creates a session stepping with the given kernel.
    ///
    /// The options are sanitized once here; the cloud is generated
    /// immediately and deterministically from the stored seed.
    pub fn with_kernel(options: SimulationOptions, kernel: K) -> Self {
        let options = options.sanitized();
        let buffer = cloud::generate(&options);

        let scheduler = BufferScheduler::for_kernel(&kernel);
        let controller = SpeedController::new(options.speed, options.paused);

        log::info!(
            "simulation ready: {} bodies, {:?}/{:?}, {:?} buffers",
            options.bodies,
            options.creation_mode,
            options.mass_mode,
            scheduler.mode()
        );

        Self {
            options,
            buffer,
            scheduler,
            controller,
            kernel,
        }
    }

    /// Advances the simulation by one frame.
    ///
    /// `frame_dt` is the host's wall-clock delta in seconds; the effective
    /// integration step is this delta scaled by the speed controller. While
    /// paused, no dispatch is issued and the call is a cheap no-op.
    pub fn step(&mut self, frame_dt: f32) -> Result<(), Error> {
        self.step_with_input(frame_dt, 0.0)
    }

    /// Advances the simulation by one frame, feeding a scroll notch into
    /// the speed controller.
    pub fn step_with_input(&mut self, frame_dt: f32, scroll: f32) -> Result<(), Error> {
        let Some(dt) = self.controller.tick(frame_dt, scroll) else {
            return Ok(());
        };

        let params = StepParams::new(&self.options, dt);
        self.scheduler.run(&mut self.buffer, &mut self.kernel, &params)
    }

    /// Read-only positions of the real particles (x, y, z, mass), suitable
    /// for instanced point-cloud drawing.
    #[inline]
    pub fn positions(&self) -> &[Vec4] {
        self.buffer.positions()
    }

    /// Read-only velocities of the real particles.
    #[inline]
    pub fn velocities(&self) -> &[Vec4] {
        self.buffer.velocities()
    }

    /// The underlying particle buffer, including padding slots.
    #[inline]
    pub fn buffer(&self) -> &ParticleBuffer {
        &self.buffer
    }

    /// The active (sanitized) configuration.
    #[inline]
    pub fn options(&self) -> &SimulationOptions {
        &self.options
    }

    /// Number of real particles.
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the session holds no particles.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Current speed scalar in `[0, 1]`.
    #[inline]
    pub fn speed_scalar(&self) -> f32 {
        self.controller.scalar()
    }

    /// Whether stepping is currently suspended.
    #[inline]
    pub fn is_paused(&self) -> bool {
        self.controller.is_paused()
    }

    /// Pauses or resumes dispatching. Paused state is frozen, not stepped.
    pub fn set_paused(&mut self, paused: bool) {
        self.controller.set_paused(paused);
        self.options.paused = paused;
    }

    /// Regenerates the cloud from the stored options and restores full
    /// speed. The same session always resets to the same state.
    pub fn reset(&mut self) {
        self.buffer = cloud::generate(&self.options);
        self.controller.reset();
    }

    /// Replaces the whole configuration, reallocating the buffer and
    /// regenerating the cloud.
    ///
    /// This is the resize path: it must only be called between frames,
    /// never while a dispatch is in flight.
    pub fn configure(&mut self, options: SimulationOptions) {
        self.options = options.sanitized();
        self.buffer = cloud::generate(&self.options);
        self.controller = SpeedController::new(self.options.speed, self.options.paused);
    }

    /// Updates the base speed without regenerating the cloud.
    pub fn set_speed(&mut self, speed: f32) {
        self.options.speed = speed;
        self.options = self.options.sanitized();
        self.controller.set_base_speed(self.options.speed);
    }

    /// Updates the gravitational constant without regenerating the cloud.
    pub fn set_gravitational_constant(&mut self, gravitational_constant: f32) {
        self.options.gravitational_constant = gravitational_constant;
        self.options = self.options.sanitized();
    }

    /// Updates the softening length without regenerating the cloud.
    pub fn set_softening(&mut self, softening: f32) {
        self.options.softening = softening;
        self.options = self.options.sanitized();
    }

    /// Updates the damping factor without regenerating the cloud.
    pub fn set_damping(&mut self, damping: f32) {
        self.options.damping = damping;
        self.options = self.options.sanitized();
    }

    /// The kernel stepping this session.
    #[inline]
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Mutable access to the kernel, for backends with their own surface.
    #[inline]
    pub fn kernel_mut(&mut self) -> &mut K {
        &mut self.kernel
    }
}
