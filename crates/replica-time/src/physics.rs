//! Physics tick alignment
//!
//! The client simulation runs physics at a fixed rate that is unrelated to the network
//! frame rate. Input is applied per network frame, so each time input time crosses a
//! frame boundary we need to know which physics sub-step of the current render frame
//! coincides with it.

use replica_core::NetworkTime;

/// Tolerance when counting sub-steps, to absorb rounding in `accumulator / step`
const SUB_STEP_EPSILON: f64 = 1e-9;

/// Tracks the physics accumulator and resolves network frame boundaries to sub-steps
#[derive(Clone, Debug)]
pub struct PhysicsTickAligner {
    physics_frequency: u32,
    /// Simulated time not yet consumed by a whole physics step, in seconds
    accumulator: f64,
    /// A boundary was crossed in a frame that ran no physics step
    deferred: bool,
}

impl PhysicsTickAligner {
    pub fn new(physics_frequency: u32) -> Self {
        PhysicsTickAligner {
            physics_frequency: physics_frequency.max(1),
            accumulator: 0.0,
            deferred: false,
        }
    }

    pub fn physics_frequency(&self) -> u32 {
        self.physics_frequency
    }

    /// Duration of one physics step in seconds
    #[inline]
    pub fn physics_time_step(&self) -> f64 {
        1.0 / self.physics_frequency as f64
    }

    /// Leftover time carried into the next frame
    pub fn accumulator(&self) -> f64 {
        self.accumulator
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
        self.deferred = false;
    }

    /// Number of physics sub-steps a frame of `scaled_time_step` seconds will run,
    /// without consuming it
    pub fn peek_sub_steps(&self, scaled_time_step: f32) -> u32 {
        let total = self.accumulator + (scaled_time_step as f64).max(0.0);
        (total / self.physics_time_step() + SUB_STEP_EPSILON).floor() as u32
    }

    /// Consume one frame of `scaled_time_step` seconds, during which input time moved
    /// from `previous` to `current`.
    ///
    /// Returns the index of the physics sub-step of this frame at which the most recent
    /// network frame begins, or `None` when no boundary is resolved this frame. Older
    /// boundaries crossed in the same frame are coalesced into the most recent one.
    pub fn align(
        &mut self,
        previous: NetworkTime,
        current: NetworkTime,
        scaled_time_step: f32,
    ) -> Option<u32> {
        let dt = self.physics_time_step();
        let step = if scaled_time_step.is_finite() {
            (scaled_time_step as f64).max(0.0)
        } else {
            0.0
        };

        let leftover = self.accumulator;
        let sub_steps = self.peek_sub_steps(step as f32);
        self.accumulator = (leftover + step - sub_steps as f64 * dt).max(0.0);

        let boundary_offset = if current.frame() > previous.frame() {
            let boundary = NetworkTime::from_frame(current.frame());
            let travelled = current - previous;
            // Input time advances linearly over the scaled step
            let fraction = if travelled > 0.0 {
                ((boundary - previous) / travelled).clamp(0.0, 1.0)
            } else {
                1.0
            };
            Some(step * fraction)
        } else {
            None
        };

        match (boundary_offset, sub_steps) {
            (None, 0) => None,
            (None, _) => {
                if self.deferred {
                    self.deferred = false;
                    Some(0)
                } else {
                    None
                }
            }
            (Some(_), 0) => {
                self.deferred = true;
                None
            }
            (Some(offset), n) => {
                self.deferred = false;
                // Sub-step i starts at `i * dt - leftover` into the frame
                let tick = ((offset + leftover) / dt).round().max(0.0) as u32;
                Some(tick.min(n - 1))
            }
        }
    }
}
