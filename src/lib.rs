//! # Gravitas
//!
//! Gravitas is a crate simulating the N-body gravitational collapse of a
//! particle cloud in Rust.
//!
//! ## Goals
//!
//! The main goal of this crate is to provide a self-contained simulation
//! core that plugs into existing render loops: it owns the particle state,
//! generates clouds deterministically, and advances them one kernel
//! dispatch per frame while the host only supplies wall-clock frame deltas
//! and user input. Drawing the cloud is deliberately left to the host.
//!
//! Integration is semi-implicit Euler over softened gravitational
//! attraction with velocity damping. Two accumulation strategies are
//! provided, a brute-force loop and a tile-staged variant, which are
//! numerically equivalent up to floating-point summation order.
//!
//! Gravitas can step particles on multiple CPU threads thanks to
//! [rayon](https://github.com/rayon-rs/rayon). Enable the "parallel"
//! feature to access the available kernels.
//!
//! Gravitas can also keep the whole cloud resident on the GPU thanks to
//! [wgpu](https://github.com/gfx-rs/wgpu). Enable the "gpu" feature to
//! access the available kernels.
//!
//! # Using Gravitas
//!
//! ## Setting up a session
//!
//! Describe the cloud with [`SimulationOptions`](config::SimulationOptions)
//! and hand it to a [`Simulation`](simulation::Simulation). The same
//! options always generate the same cloud:
//!
//! ```
//! use gravitas::prelude::*;
//!
//! let options = SimulationOptions {
//!     bodies: 512,
//!     seed: 42,
//!     creation_mode: CreationMode::Shell,
//!     ..SimulationOptions::default()
//! };
//!
//! let mut simulation: Simulation = Simulation::new(options);
//! ```
//!
//! ## Stepping and drawing
//!
//! Call [`step`](simulation::Simulation::step) once per rendered frame with
//! the wall-clock delta and draw from the read-only positions, packed as
//! `(x, y, z, mass)`:
//!
//! ```
//! # use gravitas::prelude::*;
//! #
//! # let mut simulation: Simulation = Simulation::new(SimulationOptions {
//! #     bodies: 64,
//! #     ..SimulationOptions::default()
//! # });
//! simulation.step(1.0 / 60.0)?;
//!
//! for position in simulation.positions() {
//!     let (point, mass) = (position.truncate(), position.w);
//!     // Hand point and mass to the instanced point-cloud pipeline.
//! #     let _ = (point, mass);
//! }
//! # Ok::<(), Error>(())
//! ```

#![warn(missing_docs)]

/// Particle state storage and the double-buffered dispatch scheduler.
pub mod buffer;

/// Deterministic generation of initial particle clouds.
pub mod cloud;

/// Session configuration and its sanitization rules.
pub mod config;

/// Scroll-driven speed smoothing and pause control.
pub mod controller;

/// Errors surfaced during initialization and dispatch setup.
pub mod error;

/// Integration kernels for the available execution strategies.
pub mod kernel;

/// A full simulation session driving generation, control and stepping.
pub mod simulation;

/// Everything needed to use the crate.
pub mod prelude {
    pub use crate::buffer::{BufferMode, BufferScheduler, ParticleBuffer};
    pub use crate::cloud::{CreationMode, MassMode};
    pub use crate::config::{PowerPreference, SimulationOptions};
    pub use crate::controller::SpeedController;
    pub use crate::error::Error;
    #[cfg(feature = "gpu")]
    pub use crate::kernel::gpu;
    #[cfg(feature = "parallel")]
    pub use crate::kernel::parallel;
    pub use crate::kernel::{sequential, Kernel, StepParams};
    pub use crate::simulation::Simulation;
}
