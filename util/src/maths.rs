//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Evaluate a polynomial at the given value.
///
/// Coefficients are ordered lowest degree first, i.e. `coeffs[i]` multiplies
/// `value^i`. This matches the ordering produced by the path fitting.
pub fn poly_val<T>(value: &T, coeffs: &[T]) -> T
where
    T: Float + std::ops::AddAssign,
{
    let mut res = T::from(0).unwrap();

    for (i, c) in coeffs.iter().enumerate() {
        res += *c * value.powi(i as i32);
    }

    res
}

/// Evaluate the first derivative of a polynomial at the given value.
///
/// Coefficients are ordered lowest degree first, as for [`poly_val`].
pub fn poly_der_val<T>(value: &T, coeffs: &[T]) -> T
where
    T: Float + std::ops::AddAssign,
{
    let mut res = T::from(0).unwrap();

    for (i, c) in coeffs.iter().enumerate().skip(1) {
        res += *c * T::from(i).unwrap() * value.powi(i as i32 - 1);
    }

    res
}

/// Clamp a value between a minimum and maximum.
pub fn clamp<T>(value: &T, min: &T, max: &T) -> T
where
    T: Float,
{
    let mut ret = *value;

    if ret > *max {
        ret = *max
    }
    if ret < *min {
        ret = *min
    }

    ret
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_poly_val() {
        // 1 + 2x + 3x^2 at x = 2 is 17
        let coeffs = vec![1f64, 2f64, 3f64];
        assert_eq!(poly_val(&2f64, &coeffs), 17f64);

        // Empty coefficients give zero
        assert_eq!(poly_val(&5f64, &Vec::<f64>::new()), 0f64);
    }

    #[test]
    fn test_poly_der_val() {
        // d/dx (1 + 2x + 3x^2) = 2 + 6x, at x = 2 is 14
        let coeffs = vec![1f64, 2f64, 3f64];
        assert_eq!(poly_der_val(&2f64, &coeffs), 14f64);

        // Derivative of a constant is zero
        assert_eq!(poly_der_val(&2f64, &[7f64]), 0f64);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(&2f64, &-1f64, &1f64), 1f64);
        assert_eq!(clamp(&-2f64, &-1f64, &1f64), -1f64);
        assert_eq!(clamp(&0.5f64, &-1f64, &1f64), 0.5f64);
    }
}
