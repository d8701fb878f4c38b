//! Network time primitives
//!
//! Network time is measured in frames of the fixed-frequency replication timeline.
//! A value is stored as an integer frame index plus a fraction of the frame in `[0, 1)`,
//! so that long sessions keep sub-frame precision.
//!
//! Frame indices are signed: derived axes such as replica time may sit before frame 0
//! right after a session starts. Wraparound of the frame counter is assumed never to
//! happen within a session and is not handled.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Point on the network timeline
#[derive(Clone, Copy, Default)]
pub struct NetworkTime {
    frame: i64,
    /// INVARIANT: always in `[0, 1)`
    fraction: f64,
}

impl NetworkTime {
    pub const ZERO: NetworkTime = NetworkTime {
        frame: 0,
        fraction: 0.0,
    };

    /// Create a time from a frame and an arbitrary fractional offset.
    /// The offset may exceed one frame or be negative; it is carried into the frame index.
    pub fn new(frame: i64, fraction: f64) -> Self {
        NetworkTime::from_frame(frame) + fraction
    }

    #[inline]
    pub fn from_frame(frame: i64) -> Self {
        NetworkTime {
            frame,
            fraction: 0.0,
        }
    }

    /// Create a time from an unsigned server frame.
    /// Frames beyond `i64::MAX` saturate.
    #[inline]
    pub fn from_server_frame(frame: u64) -> Self {
        NetworkTime::from_frame(i64::try_from(frame).unwrap_or(i64::MAX))
    }

    /// Integer frame index (floor of the time)
    #[inline]
    pub fn frame(self) -> i64 {
        self.frame
    }

    /// Fraction of the current frame in `[0, 1)`
    #[inline]
    pub fn fraction(self) -> f64 {
        self.fraction
    }

    /// Time as a single floating point frame count.
    /// Loses sub-frame precision for very large frame indices.
    #[inline]
    pub fn to_frames(self) -> f64 {
        self.frame as f64 + self.fraction
    }

    /// Signed distance `self - other` in frames
    #[inline]
    pub fn frames_since(self, other: NetworkTime) -> f64 {
        let frames = i128::from(self.frame) - i128::from(other.frame);
        frames as f64 + (self.fraction - other.fraction)
    }

    fn shifted(self, delta: f64) -> Self {
        debug_assert!(delta.is_finite(), "non-finite network time delta");
        if !delta.is_finite() {
            return self;
        }

        let total = self.fraction + delta;
        let carry = total.floor();
        // Frame indices saturate at the ends of the timeline
        let mut frame = self.frame.saturating_add(carry as i64);
        // `+ 0.0` turns a negative zero into a positive one
        let mut fraction = total - carry + 0.0;

        // Rounding can land exactly on 1.0 for tiny negative totals
        if fraction >= 1.0 {
            fraction -= 1.0;
            frame = frame.saturating_add(1);
        }

        NetworkTime { frame, fraction }
    }
}

impl Add<f64> for NetworkTime {
    type Output = NetworkTime;

    #[inline]
    fn add(self, rhs: f64) -> Self::Output {
        self.shifted(rhs)
    }
}

impl AddAssign<f64> for NetworkTime {
    #[inline]
    fn add_assign(&mut self, rhs: f64) {
        *self = self.shifted(rhs);
    }
}

impl Sub<f64> for NetworkTime {
    type Output = NetworkTime;

    #[inline]
    fn sub(self, rhs: f64) -> Self::Output {
        self.shifted(-rhs)
    }
}

impl SubAssign<f64> for NetworkTime {
    #[inline]
    fn sub_assign(&mut self, rhs: f64) {
        *self = self.shifted(-rhs);
    }
}

impl Sub<NetworkTime> for NetworkTime {
    type Output = f64;

    #[inline]
    fn sub(self, rhs: NetworkTime) -> Self::Output {
        self.frames_since(rhs)
    }
}

impl PartialEq for NetworkTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for NetworkTime {}

impl PartialOrd for NetworkTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NetworkTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.frame
            .cmp(&other.frame)
            .then_with(|| self.fraction.total_cmp(&other.fraction))
    }
}

impl fmt::Debug for NetworkTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NetworkTime({}+{:.4})", self.frame, self.fraction)
    }
}

impl fmt::Display for NetworkTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:.3}", self.frame, self.fraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_carry_into_frame() {
        let t = NetworkTime::new(10, 0.75) + 0.5;
        assert_eq!(t.frame(), 11);
        assert!((t.fraction() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_borrow_from_frame() {
        let t = NetworkTime::new(10, 0.25) - 0.5;
        assert_eq!(t.frame(), 9);
        assert!((t.fraction() - 0.75).abs() < 1e-12);

        let before_zero = NetworkTime::ZERO - 2.5;
        assert_eq!(before_zero.frame(), -3);
        assert!((before_zero.fraction() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_tiny_negative_delta_stays_normalized() {
        let t = NetworkTime::from_frame(5) + (-1e-20);
        assert!(t.fraction() >= 0.0 && t.fraction() < 1.0);
        assert!(t <= NetworkTime::from_frame(5));
    }

    #[test]
    fn test_distance_is_antisymmetric() {
        let a = NetworkTime::new(100, 0.2);
        let b = NetworkTime::new(97, 0.9);
        assert!((a - b - 2.3).abs() < 1e-9);
        assert!((b - a + 2.3).abs() < 1e-9);
    }

    #[test]
    fn test_ordering() {
        let a = NetworkTime::new(3, 0.1);
        let b = NetworkTime::new(3, 0.2);
        let c = NetworkTime::from_frame(4);
        assert!(a < b && b < c);
        assert_eq!(NetworkTime::new(2, 1.5), NetworkTime::new(3, 0.5));
    }

    #[test]
    fn test_shift_saturates_at_timeline_end() {
        let end = NetworkTime::from_frame(i64::MAX);
        assert_eq!((end + 10.0).frame(), i64::MAX);
        assert_eq!((NetworkTime::from_frame(i64::MIN) - 10.0).frame(), i64::MIN);

        let start = NetworkTime::from_frame(i64::MIN);
        assert!(end - start > 0.0);
        assert!(start - end < 0.0);
    }

    #[test]
    fn test_server_frame_saturates() {
        assert_eq!(NetworkTime::from_server_frame(u64::MAX).frame(), i64::MAX);
        assert_eq!(NetworkTime::from_server_frame(42).frame(), 42);
    }

    proptest! {
        #[test]
        fn prop_fraction_normalized(frame in -1_000_000i64..1_000_000, delta in -1e6f64..1e6) {
            let t = NetworkTime::from_frame(frame) + delta;
            prop_assert!(t.fraction() >= 0.0 && t.fraction() < 1.0);
        }

        #[test]
        fn prop_add_then_distance(frame in -1_000_000i64..1_000_000, fraction in 0.0f64..1.0, delta in -1e4f64..1e4) {
            let base = NetworkTime::new(frame, fraction);
            let moved = base + delta;
            prop_assert!(((moved - base) - delta).abs() < 1e-6);
            prop_assert!(((base - moved) + delta).abs() < 1e-6);
        }

        #[test]
        fn prop_order_matches_distance(a in -1e6f64..1e6, b in -1e6f64..1e6) {
            let ta = NetworkTime::ZERO + a;
            let tb = NetworkTime::ZERO + b;
            if ta < tb {
                prop_assert!(ta - tb <= 0.0);
            } else if ta > tb {
                prop_assert!(ta - tb >= 0.0);
            }
        }
    }
}
