#[cfg(feature = "gpu")]
/// Kernels that run on the GPU.
pub mod gpu;

#[cfg(feature = "parallel")]
/// Kernels that use multiple CPU threads.
pub mod parallel;

/// Kernels that use one CPU thread.
pub mod sequential;

use glam::{Vec3A, Vec4};

use crate::config::SimulationOptions;

/// Per-step scalar parameters consumed by every kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepParams {
    /// Integration time step for this frame.
    pub dt: f32,
    /// Gravitational constant G.
    pub gravitational_constant: f32,
    /// Softening length, added squared inside the distance term.
    pub softening: f32,
    /// Velocity damping factor in `(0, 1]`; 1 disables dissipation.
    pub damping: f32,
}

impl StepParams {
    /// Builds the per-step parameters from session options and a frame time
    /// step.
    pub fn new(options: &SimulationOptions, dt: f32) -> Self {
        Self {
            dt,
            gravitational_constant: options.gravitational_constant,
            softening: options.softening,
            damping: options.damping,
        }
    }
}

/// One integration step over particle state, the execution-strategy seam.
///
/// Implementors accumulate gravitational accelerations from the read-side
/// positions and apply semi-implicit Euler with velocity damping:
///
/// ```text
/// a_i = G * sum_j m_j * (p_j - p_i) / (|p_j - p_i|^2 + softening^2)^(3/2)
/// v_i = (v_i + a_i * dt) * damping
/// p_i = p_i + v_i * dt
/// ```
///
/// Slices always cover a buffer's full padded length and `bodies` counts the
/// real particles. Padding slots carry zero mass, so summation may run over
/// full blocks; they must pass through a step unchanged.
pub trait Kernel {
    /// Whether every read issued during a step observes positions as they
    /// were when the step began. Kernels reporting `true` may be stepped in
    /// place over a single position buffer.
    fn snapshot_reads(&self) -> bool;

    /// Reads neighbours from `src`, writes integrated positions to `dst` and
    /// updates `velocities` in place.
    fn integrate(
        &mut self,
        bodies: usize,
        src: &[Vec4],
        dst: &mut [Vec4],
        velocities: &mut [Vec4],
        params: &StepParams,
    );

    /// Integrates `positions` in place. Implementors must finish all
    /// neighbour reads before their first write; the scheduler only routes
    /// here when [`snapshot_reads`](Kernel::snapshot_reads) holds.
    fn integrate_in_place(
        &mut self,
        bodies: usize,
        positions: &mut [Vec4],
        velocities: &mut [Vec4],
        params: &StepParams,
    );
}

/// Acceleration contribution of one neighbour packed as (xyz, mass).
#[inline]
fn attraction(position: Vec3A, neighbour: Vec4, softening_sq: f32) -> Vec3A {
    let dir = Vec3A::from(neighbour) - position;
    let mag_2 = dir.length_squared() + softening_sq;

    if mag_2 != 0.0 {
        dir * neighbour.w / (mag_2 * mag_2.sqrt())
    } else {
        Vec3A::ZERO
    }
}

/// Serial sum of all neighbour contributions.
#[inline]
pub(crate) fn direct_sum(position: Vec3A, src: &[Vec4], softening_sq: f32) -> Vec3A {
    src.iter().fold(Vec3A::ZERO, |acceleration, &neighbour| {
        acceleration + attraction(position, neighbour, softening_sq)
    })
}

/// The same sum staged through block-sized tiles, matching the accumulation
/// order of the shared-memory GPU kernel.
#[inline]
pub(crate) fn tiled_sum(
    position: Vec3A,
    src: &[Vec4],
    block_size: usize,
    softening_sq: f32,
) -> Vec3A {
    let mut acceleration = Vec3A::ZERO;
    for tile in src.chunks(block_size.max(1)) {
        let mut partial = Vec3A::ZERO;
        for &neighbour in tile {
            partial += attraction(position, neighbour, softening_sq);
        }
        acceleration += partial;
    }
    acceleration
}

/// Applies semi-implicit Euler with damping to one particle slot.
#[inline]
pub(crate) fn integrate_slot(
    acceleration: Vec3A,
    position: &mut Vec4,
    velocity: &mut Vec4,
    params: &StepParams,
) {
    let damped = (Vec3A::from(*velocity)
        + acceleration * (params.gravitational_constant * params.dt))
        * params.damping;

    *velocity = damped.extend(velocity.w);
    *position = (Vec3A::from(*position) + damped * params.dt).extend(position.w);
}
