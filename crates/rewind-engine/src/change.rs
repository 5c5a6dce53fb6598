//! Change detection for snapshot compression.
//!
//! A recorder only stores a new snapshot when the captured state differs
//! from the newest stored one. [`Changed`] is that comparison. Exact types
//! compare by equality; floating-point types compare against a small
//! tolerance so integrator noise does not defeat compression.
//!
//! ```
//! use rewind_engine::change::{Angle, Changed};
//!
//! assert!(!1.0f32.changed(&(1.0 + 1e-7)));
//! assert!([0.0f32, 0.0].changed(&[0.0, 0.5]));
//! assert!(!Angle(std::f64::consts::PI).changed(&Angle(-std::f64::consts::PI)));
//! ```

use std::f64::consts::{PI, TAU};

use serde::{Deserialize, Serialize};

/// Squared tolerance for scalar floats.
pub const SCALAR_EPSILON_SQ: f64 = 1e-10;

/// Squared tolerance for float vectors (positions, velocities).
pub const DISTANCE_EPSILON_SQ: f64 = 1e-10;

/// Tolerance for angles, in radians.
pub const ANGLE_EPSILON: f64 = 1e-4;

/// Returns whether two values differ enough to be worth a new snapshot.
pub trait Changed {
    /// `true` if `self` and `other` should be stored as distinct states.
    fn changed(&self, other: &Self) -> bool;
}

// ---------------------------------------------------------------------------
// Exact comparisons
// ---------------------------------------------------------------------------

macro_rules! impl_changed_exact {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Changed for $ty {
                #[inline]
                fn changed(&self, other: &Self) -> bool {
                    self != other
                }
            }
        )*
    };
}

impl_changed_exact!(bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, String);

// ---------------------------------------------------------------------------
// Tolerant comparisons
// ---------------------------------------------------------------------------

impl Changed for f32 {
    #[inline]
    fn changed(&self, other: &Self) -> bool {
        let d = f64::from(*self) - f64::from(*other);
        d * d > SCALAR_EPSILON_SQ
    }
}

impl Changed for f64 {
    #[inline]
    fn changed(&self, other: &Self) -> bool {
        let d = self - other;
        d * d > SCALAR_EPSILON_SQ
    }
}

impl<const N: usize> Changed for [f32; N] {
    fn changed(&self, other: &Self) -> bool {
        let distance_sq: f64 = self
            .iter()
            .zip(other)
            .map(|(a, b)| {
                let d = f64::from(*a) - f64::from(*b);
                d * d
            })
            .sum();
        distance_sq > DISTANCE_EPSILON_SQ
    }
}

impl<const N: usize> Changed for [f64; N] {
    fn changed(&self, other: &Self) -> bool {
        let distance_sq: f64 = self
            .iter()
            .zip(other)
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        distance_sq > DISTANCE_EPSILON_SQ
    }
}

// ---------------------------------------------------------------------------
// Angle
// ---------------------------------------------------------------------------

/// An orientation in radians. Compared by shortest angular distance, so
/// `PI` and `-PI` are the same orientation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Angle(pub f64);

impl Angle {
    /// Shortest signed distance from `self` to `other`, in `[-PI, PI]`.
    pub fn delta(self, other: Angle) -> f64 {
        let d = (other.0 - self.0).rem_euclid(TAU);
        if d > PI {
            d - TAU
        } else {
            d
        }
    }
}

impl Changed for Angle {
    fn changed(&self, other: &Self) -> bool {
        self.delta(*other).abs() > ANGLE_EPSILON
    }
}

// ---------------------------------------------------------------------------
// Composites
// ---------------------------------------------------------------------------

impl<T: Changed> Changed for Option<T> {
    fn changed(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.changed(b),
            (None, None) => false,
            _ => true,
        }
    }
}

impl<A: Changed, B: Changed> Changed for (A, B) {
    fn changed(&self, other: &Self) -> bool {
        self.0.changed(&other.0) || self.1.changed(&other.1)
    }
}

impl<A: Changed, B: Changed, C: Changed> Changed for (A, B, C) {
    fn changed(&self, other: &Self) -> bool {
        self.0.changed(&other.0) || self.1.changed(&other.1) || self.2.changed(&other.2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_types_compare_by_equality() {
        assert!(!7u32.changed(&7));
        assert!(7u32.changed(&8));
        assert!(true.changed(&false));
        assert!(!"idle".to_owned().changed(&"idle".to_owned()));
    }

    #[test]
    fn floats_ignore_noise_below_tolerance() {
        assert!(!0.5f64.changed(&(0.5 + 1e-6)));
        assert!(0.5f64.changed(&0.5001));
        assert!(!2.0f32.changed(&2.000_001));
    }

    #[test]
    fn vectors_use_euclidean_distance() {
        assert!(![1.0f32, 2.0].changed(&[1.0, 2.0]));
        assert!(![1.0f64, 2.0, 3.0].changed(&[1.0 + 1e-6, 2.0, 3.0 - 1e-6]));
        assert!([1.0f64, 2.0, 3.0].changed(&[1.0, 2.0, 3.01]));
    }

    #[test]
    fn angles_wrap_around() {
        assert!(!Angle(0.0).changed(&Angle(TAU)));
        assert!(!Angle(PI - 1e-6).changed(&Angle(-PI + 1e-6)));
        assert!(Angle(0.0).changed(&Angle(0.1)));
        assert!((Angle(3.0).delta(Angle(-3.0)) - (TAU - 6.0)).abs() < 1e-12);
    }

    #[test]
    fn option_presence_counts_as_change() {
        assert!(Some(1u8).changed(&None));
        assert!(!None::<u8>.changed(&None));
        assert!(!Some(1.0f64).changed(&Some(1.0)));
    }

    #[test]
    fn tuples_change_when_any_component_changes() {
        assert!(!(1u8, 2.0f64).changed(&(1, 2.0)));
        assert!((1u8, 2.0f64, false).changed(&(1, 2.0, true)));
    }
}
