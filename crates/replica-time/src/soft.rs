//! Soft network time - a time axis that follows a target smoothly
//!
//! Small errors are absorbed by running the axis slightly faster or slower
//! (dilation), so that anything driven by it never visibly jumps. Errors beyond the
//! snap threshold are resolved by jumping straight to the target.

use replica_core::NetworkTime;

/// Outcome of one [`SoftNetworkTime::update_to`] call
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackStep {
    /// Time step to feed dependent simulation, in seconds
    pub scaled_time_step: f32,
    /// Applied scale factor; 1 on snap
    pub dilation: f64,
    /// Whether the axis jumped to the target
    pub snapped: bool,
    /// Signed error `target - current` before the update, in frames
    pub error: f64,
}

impl TrackStep {
    fn idle(error: f64) -> Self {
        TrackStep {
            scaled_time_step: 0.0,
            dilation: 1.0,
            snapped: false,
            error,
        }
    }
}

/// Smoothed time axis
#[derive(Clone, Debug)]
pub struct SoftNetworkTime {
    current: NetworkTime,
    update_frequency: f64,
}

impl SoftNetworkTime {
    pub fn new(update_frequency: u32, initial: NetworkTime) -> Self {
        SoftNetworkTime {
            current: initial,
            update_frequency: update_frequency as f64,
        }
    }

    /// Current smoothed value
    #[inline]
    pub fn get(&self) -> NetworkTime {
        self.current
    }

    /// Jump to a value without smoothing
    pub fn reset(&mut self, time: NetworkTime) {
        self.current = time;
    }

    /// Advance the axis by `time_step` seconds toward `target`.
    ///
    /// `target` is where the axis should be at the end of this step. Thresholds are in
    /// seconds. A non-positive or non-finite time step leaves the axis untouched,
    /// whatever the error.
    pub fn update_to(
        &mut self,
        target: NetworkTime,
        time_step: f32,
        min_dilation: f64,
        max_dilation: f64,
        snap_threshold: f64,
    ) -> TrackStep {
        debug_assert!(min_dilation <= max_dilation);

        let error = target - self.current;
        if !(time_step > 0.0) || !time_step.is_finite() {
            return TrackStep::idle(error);
        }

        if error.abs() > snap_threshold * self.update_frequency {
            self.current = target;
            return TrackStep {
                scaled_time_step: time_step,
                dilation: 1.0,
                snapped: true,
                error,
            };
        }

        let step_frames = time_step as f64 * self.update_frequency;
        let ideal = error / step_frames;
        let dilation = ideal.max(min_dilation).min(max_dilation);

        if dilation == ideal {
            // Reachable within the bounds: land exactly
            self.current = target;
        } else {
            self.current += step_frames * dilation;
        }

        TrackStep {
            scaled_time_step: (time_step as f64 * dilation) as f32,
            dilation,
            snapped: false,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const FREQ: u32 = 30;
    const STEP: f32 = 1.0 / 30.0;

    fn track_at(frame: i64) -> SoftNetworkTime {
        SoftNetworkTime::new(FREQ, NetworkTime::from_frame(frame))
    }

    #[test]
    fn test_zero_step_is_noop() {
        let mut track = track_at(10);
        let step = track.update_to(NetworkTime::from_frame(500), 0.0, 0.9, 1.1, 1.0);
        assert_eq!(track.get(), NetworkTime::from_frame(10));
        assert_eq!(step.scaled_time_step, 0.0);
        assert!(!step.snapped);
    }

    #[test]
    fn test_non_finite_step_is_noop() {
        let mut track = track_at(10);
        for step in [f32::INFINITY, f32::NAN, -STEP] {
            let result = track.update_to(NetworkTime::from_frame(11), step, 0.9, 1.1, 1.0);
            assert_eq!(track.get(), NetworkTime::from_frame(10));
            assert_eq!(result.scaled_time_step, 0.0);
            assert!(!result.snapped);
        }
    }

    #[test]
    fn test_snap_beyond_threshold() {
        let mut track = track_at(10);
        let target = NetworkTime::new(41, 0.25);
        let step = track.update_to(target, STEP, 0.9, 1.1, 1.0);
        assert!(step.snapped);
        assert_eq!(track.get(), target);
        assert_eq!(step.scaled_time_step, STEP);
        assert_eq!(step.dilation, 1.0);
    }

    #[test]
    fn test_exactly_at_threshold_dilates() {
        let mut track = track_at(0);
        // 1.0s at 30Hz = 30 frames
        let step = track.update_to(NetworkTime::from_frame(30), STEP, 0.9, 1.1, 1.0);
        assert!(!step.snapped);
        assert_eq!(step.dilation, 1.1);
        assert!(track.get() < NetworkTime::from_frame(30));
    }

    #[test]
    fn test_reachable_target_lands_exactly() {
        let mut track = track_at(100);
        let target = NetworkTime::new(101, 0.05);
        let step = track.update_to(target, STEP, 0.9, 1.1, 1.0);
        assert_eq!(track.get(), target);
        assert!((step.dilation - 1.05).abs() < 1e-6);
        assert!((step.scaled_time_step - STEP * 1.05).abs() < 1e-6);
    }

    #[test]
    fn test_behind_target_runs_fast() {
        let mut track = track_at(0);
        let step = track.update_to(NetworkTime::from_frame(5), STEP, 0.9, 1.1, 1.0);
        assert_eq!(step.dilation, 1.1);
        assert!((track.get().to_frames() - 1.1).abs() < 1e-6);
    }

    #[test]
    fn test_ahead_of_target_runs_slow_without_falling_behind() {
        let mut track = track_at(10);
        let target = NetworkTime::from_frame(9);
        let step = track.update_to(target, STEP, 0.9, 1.1, 1.0);
        assert_eq!(step.dilation, 0.9);
        assert!(track.get() >= target);
        assert!((track.get().to_frames() - 10.9).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn prop_zero_step_idempotent(start in -1e5f64..1e5, target in -1e5f64..1e5) {
            let initial = NetworkTime::ZERO + start;
            let mut track = SoftNetworkTime::new(FREQ, initial);
            track.update_to(NetworkTime::ZERO + target, 0.0, 0.9, 1.1, 1.0);
            prop_assert_eq!(track.get(), initial);
        }

        #[test]
        fn prop_snap_lands_on_target(start in -1e4f64..1e4, gap in 30.001f64..1e4, sign in any::<bool>()) {
            let initial = NetworkTime::ZERO + start;
            let target = initial + if sign { gap } else { -gap };
            let mut track = SoftNetworkTime::new(FREQ, initial);
            let step = track.update_to(target, STEP, 0.9, 1.1, 1.0);
            prop_assert!(step.snapped);
            prop_assert_eq!(track.get(), target);
        }

        #[test]
        fn prop_dilation_within_bounds(start in -1e4f64..1e4, gap in -29.9f64..29.9, dt in 0.001f32..0.1) {
            let initial = NetworkTime::ZERO + start;
            let mut track = SoftNetworkTime::new(FREQ, initial);
            let step = track.update_to(initial + gap, dt, 0.9, 1.1, 1.0);
            prop_assert!(!step.snapped);
            prop_assert!(step.dilation >= 0.9 && step.dilation <= 1.1);
            let advanced = track.get() - initial;
            prop_assert!(advanced <= dt as f64 * FREQ as f64 * 1.1 + 1e-9);
        }

        #[test]
        fn prop_converges_monotonically(offset in -25.0f64..25.0, steps in 1usize..200) {
            // Target advances with time, as server time does
            let mut target = NetworkTime::from_frame(1000);
            let mut track = SoftNetworkTime::new(FREQ, target + offset);
            let step_frames = STEP as f64 * FREQ as f64;
            let mut residual = (target - track.get()).abs();

            for _ in 0..steps {
                target += step_frames;
                let before = track.get();
                track.update_to(target, STEP, 0.9, 1.1, 1.0);
                prop_assert!(track.get() - before <= step_frames * 1.1 + 1e-9);

                let next = (target - track.get()).abs();
                if residual > 1e-9 {
                    prop_assert!(next < residual);
                } else {
                    prop_assert!(next <= 1e-9);
                }
                residual = next;
            }
        }
    }
}
