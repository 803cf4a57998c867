/// Fraction of the speed range traversed per scroll notch.
const SCROLL_SENSITIVITY: f32 = 0.2;

/// Settle time of the speed scalar, in seconds.
const SMOOTH_TIME: f32 = 0.1;

/// Translates scroll input and wall-clock frame deltas into time steps.
///
/// The controller keeps a speed scalar in `[0, 1]` that chases a
/// scroll-driven target with critically-damped smoothing, so speed changes
/// ramp instead of jumping. The target is recomputed from the current
/// scalar on every tick, so the ramp only advances while input is live;
/// only the smoothing velocity persists between frames. Each tick yields
/// the effective `dt` for one step, or `None` while paused.
#[derive(Debug, Clone)]
pub struct SpeedController {
    base_speed: f32,
    scalar: f32,
    velocity: f32,
    paused: bool,
}

impl SpeedController {
    /// Creates a controller running at full scalar speed.
    pub fn new(base_speed: f32, paused: bool) -> Self {
        Self {
            base_speed,
            scalar: 1.0,
            velocity: 0.0,
            paused,
        }
    }

    /// Advances the smoothing by one frame and returns the step's `dt`.
    ///
    /// `scroll` steers the target away from the current scalar before
    /// smoothing. While paused no `dt` is produced and scroll input is
    /// discarded.
    pub fn tick(&mut self, frame_dt: f32, scroll: f32) -> Option<f32> {
        if self.paused {
            return None;
        }

        let target = self.scalar + scroll * SCROLL_SENSITIVITY;
        self.scalar = smooth_damp(
            self.scalar,
            target,
            &mut self.velocity,
            SMOOTH_TIME,
            frame_dt,
        )
        .clamp(0.0, 1.0);

        Some(self.scalar * self.base_speed * frame_dt)
    }

    /// Current speed scalar in `[0, 1]`.
    pub fn scalar(&self) -> f32 {
        self.scalar
    }

    /// Base speed multiplying the scalar and the frame delta.
    pub fn base_speed(&self) -> f32 {
        self.base_speed
    }

    /// Replaces the base speed; the smoothed scalar is unaffected.
    pub fn set_base_speed(&mut self, base_speed: f32) {
        self.base_speed = base_speed;
    }

    /// Whether ticks currently produce steps.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Pauses or resumes step production.
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Snaps back to full scalar speed with no smoothing momentum.
    pub fn reset(&mut self) {
        self.scalar = 1.0;
        self.velocity = 0.0;
    }
}

/// Critically-damped interpolation of `current` toward `target`.
///
/// `velocity` carries the smoothing rate between calls. The output never
/// overshoots the target.
fn smooth_damp(current: f32, target: f32, velocity: &mut f32, smooth_time: f32, dt: f32) -> f32 {
    let omega = 2.0 / smooth_time.max(1e-4);

    let x = omega * dt;
    let exp = 1.0 / (1.0 + x + 0.48 * x * x + 0.235 * x * x * x);
    let change = current - target;
    let temp = (*velocity + omega * change) * dt;
    *velocity = (*velocity - omega * temp) * exp;
    let mut output = target + (change + temp) * exp;

    if (target - current > 0.0) == (output > target) {
        output = target;
        *velocity = 0.0;
    }

    output
}
