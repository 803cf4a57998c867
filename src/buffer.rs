use glam::Vec4;

use crate::error::Error;
use crate::kernel::{Kernel, StepParams};

/// Rounds `bodies` up to the next multiple of `block_size`.
#[inline]
pub fn padded_len(bodies: u32, block_size: u32) -> usize {
    let block_size = block_size.max(1);
    (bodies.div_ceil(block_size) * block_size) as usize
}

/// Owns the particle state for one simulation session.
///
/// Two parallel position arrays (a front slot and its ping-pong partner)
/// plus one velocity array, all allocated to the same padded length so every
/// dispatch group is fully populated. Slots at or past [`len`](Self::len)
/// are padding: zero position, zero mass, zero velocity. Positions pack the
/// mass in the `w` component; the velocity `w` slot is unused and kept zero.
#[derive(Debug, Clone)]
pub struct ParticleBuffer {
    positions: Vec<Vec4>,
    back_positions: Vec<Vec4>,
    velocities: Vec<Vec4>,
    bodies: usize,
}

impl ParticleBuffer {
    /// Allocates a zeroed buffer for `bodies` particles, padded to a
    /// multiple of `block_size`.
    pub fn new(bodies: u32, block_size: u32) -> Self {
        let padded = padded_len(bodies, block_size);
        log::debug!("allocating particle buffer: {bodies} bodies in {padded} slots");

        Self {
            positions: vec![Vec4::ZERO; padded],
            back_positions: vec![Vec4::ZERO; padded],
            velocities: vec![Vec4::ZERO; padded],
            bodies: bodies as usize,
        }
    }

    /// Number of real (non-padding) particles.
    #[inline]
    pub fn len(&self) -> usize {
        self.bodies
    }

    /// Whether the buffer holds no real particles.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bodies == 0
    }

    /// Allocated slot count, a multiple of the block size the buffer was
    /// built with.
    #[inline]
    pub fn padded_len(&self) -> usize {
        self.positions.len()
    }

    /// Read-only positions of the real particles (x, y, z, mass).
    #[inline]
    pub fn positions(&self) -> &[Vec4] {
        &self.positions[..self.bodies]
    }

    /// Read-only velocities of the real particles.
    #[inline]
    pub fn velocities(&self) -> &[Vec4] {
        &self.velocities[..self.bodies]
    }

    /// Positions including padding slots, the layout uploaded to GPU
    /// storage.
    #[inline]
    pub fn positions_padded(&self) -> &[Vec4] {
        &self.positions
    }

    /// Velocities including padding slots.
    #[inline]
    pub fn velocities_padded(&self) -> &[Vec4] {
        &self.velocities
    }

    #[inline]
    pub(crate) fn positions_padded_mut(&mut self) -> &mut [Vec4] {
        &mut self.positions
    }

    #[inline]
    pub(crate) fn velocities_padded_mut(&mut self) -> &mut [Vec4] {
        &mut self.velocities
    }

    /// Both padded state arrays at once, for whole-buffer readback writes.
    #[cfg(feature = "gpu")]
    #[inline]
    pub(crate) fn state_padded_mut(&mut self) -> (&mut [Vec4], &mut [Vec4]) {
        (&mut self.positions, &mut self.velocities)
    }

    /// Copies the front positions into the back partner so both ping-pong
    /// slots start from the same state.
    pub(crate) fn mirror_front(&mut self) {
        self.back_positions.copy_from_slice(&self.positions);
    }

    fn swap(&mut self) {
        std::mem::swap(&mut self.positions, &mut self.back_positions);
    }

    fn split(&mut self) -> (&[Vec4], &mut [Vec4], &mut [Vec4]) {
        (
            &self.positions,
            &mut self.back_positions,
            &mut self.velocities,
        )
    }
}

/// Read/write role policy for the position slots across steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferMode {
    /// Two slots alternating read and write roles each step, so no thread
    /// ever reads a neighbour's position after it was overwritten in the
    /// same step. Always safe.
    #[default]
    PingPong,
    /// One slot updated in place, valid only for kernels guaranteeing
    /// snapshot reads.
    InPlace,
}

impl BufferMode {
    /// Picks the cheapest mode a backend capability allows: in-place when
    /// every read within a step observes pre-step state, ping-pong
    /// otherwise.
    #[inline]
    pub fn select(snapshot_reads: bool) -> Self {
        if snapshot_reads {
            Self::InPlace
        } else {
            Self::PingPong
        }
    }
}

/// Issues one kernel dispatch per frame over a [`ParticleBuffer`], enforcing
/// the active [`BufferMode`].
#[derive(Debug, Clone)]
pub struct BufferScheduler {
    mode: BufferMode,
}

impl BufferScheduler {
    /// Creates a scheduler with an explicit buffer mode.
    pub fn new(mode: BufferMode) -> Self {
        Self { mode }
    }

    /// Creates a scheduler with the mode the kernel's capability allows.
    pub fn for_kernel<K: Kernel>(kernel: &K) -> Self {
        Self::new(BufferMode::select(kernel.snapshot_reads()))
    }

    /// Active buffer mode.
    #[inline]
    pub fn mode(&self) -> BufferMode {
        self.mode
    }

    /// Runs one integration step over the buffer.
    ///
    /// The buffer partition is validated before dispatch; a mismatched slot
    /// count aborts the step. When ping-ponging, the slot roles swap after
    /// the kernel returns so the freshly written positions become the next
    /// read side.
    pub fn run<K: Kernel>(
        &self,
        buffer: &mut ParticleBuffer,
        kernel: &mut K,
        params: &StepParams,
    ) -> Result<(), Error> {
        let expected = buffer.positions.len();
        for found in [buffer.back_positions.len(), buffer.velocities.len()] {
            if found != expected {
                return Err(Error::BufferMismatch { expected, found });
            }
        }
        if buffer.bodies > expected {
            return Err(Error::BufferMismatch {
                expected,
                found: buffer.bodies,
            });
        }

        match self.mode {
            BufferMode::PingPong => {
                let bodies = buffer.bodies;
                let (src, dst, velocities) = buffer.split();
                kernel.integrate(bodies, src, dst, velocities, params);
                buffer.swap();
            }
            BufferMode::InPlace => {
                if !kernel.snapshot_reads() {
                    return Err(Error::SnapshotRequired);
                }
                kernel.integrate_in_place(
                    buffer.bodies,
                    &mut buffer.positions,
                    &mut buffer.velocities,
                    params,
                );
            }
        }

        Ok(())
    }
}
