//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::{Float, FloatConst};

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Signed shortest rotation taking angle `from` onto angle `to`, in the range (-pi, pi].
///
/// Positive results are anticlockwise rotations.
pub fn ang_diff<T>(from: T, to: T) -> T
where
    T: Float + FloatConst,
{
    wrap_pi(to - from)
}

/// Wrap an angle into the range (-pi, pi].
pub fn wrap_pi<T>(value: T) -> T
where
    T: Float + FloatConst,
{
    let pi = T::PI();
    let wrapped = rem_euclid(value + pi, pi + pi) - pi;

    // -pi is outside the range, use +pi
    if wrapped <= -pi {
        pi
    } else {
        wrapped
    }
}

/// Least nonnegative remainder of `lhs (mod rhs)`, as `f64::rem_euclid` for any `Float`.
///
/// Rounding can give `rhs.abs()` when `lhs` is a tiny negative number.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float,
{
    let r = lhs % rhs;

    if r < T::zero() {
        r + rhs.abs()
    } else {
        r
    }
}
