//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Apply polynomial coefficients to a value
///
/// Coefficients are ordered from the highest power down to the constant term.
pub fn poly_val<T>(value: T, coeffs: &[T]) -> T
where
    T: Float,
{
    // Horner's method
    coeffs
        .iter()
        .fold(T::zero(), |acc, &c| acc * value + c)
}

/// Clamp a value into the range `[min, max]`.
pub fn clamp<T>(value: T, min: T, max: T) -> T
where
    T: Float,
{
    value.max(min).min(max)
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
///
/// This function is taken from the std library as num is missing it.
///
/// In particular, the return value `r` satisfies `0.0 <= r < rhs.abs()` in
/// most cases. However, due to a floating point round-off error it can
/// result in `r == rhs.abs()`, violating the mathematical definition, if
/// `self` is much smaller than `rhs.abs()` in magnitude and `self < 0.0`.
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

/// Wrap an angle into the range `[0, 2pi)`.
pub fn wrap_2pi<T>(angle: T) -> T
where
    T: Float,
{
    let tau_t = T::from(std::f64::consts::TAU).unwrap_or_else(T::zero);
    let r = rem_euclid(angle, tau_t);

    // Round-off can produce exactly tau
    if r >= tau_t {
        T::zero()
    } else {
        r
    }
}
