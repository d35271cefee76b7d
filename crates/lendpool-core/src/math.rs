//! checked fixed-point helpers
//!
//! Every ratio in the engine is an integer product followed by a division.
//! Products of two amounts overflow `u128` easily at 18-decimal scale, so
//! the slow path widens to a big integer before dividing.

use crate::error::{LendingError, Result};
use num_bigint::BigUint;

/// floor(a * b / d)
pub fn mul_div(a: u128, b: u128, d: u128) -> Result<u128> {
    if d == 0 {
        return Err(LendingError::ArithmeticOverflow);
    }
    match a.checked_mul(b) {
        Some(product) => Ok(product / d),
        None => wide_mul_div(a, b, d, false),
    }
}

/// ceil(a * b / d)
pub fn mul_div_ceil(a: u128, b: u128, d: u128) -> Result<u128> {
    if d == 0 {
        return Err(LendingError::ArithmeticOverflow);
    }
    match a.checked_mul(b) {
        Some(product) => {
            let q = product / d;
            if product % d == 0 {
                Ok(q)
            } else {
                q.checked_add(1).ok_or(LendingError::ArithmeticOverflow)
            }
        }
        None => wide_mul_div(a, b, d, true),
    }
}

fn wide_mul_div(a: u128, b: u128, d: u128, round_up: bool) -> Result<u128> {
    let product = BigUint::from(a) * BigUint::from(b);
    let divisor = BigUint::from(d);
    let mut quotient = &product / &divisor;
    if round_up && (&product % &divisor) != BigUint::from(0u8) {
        quotient += 1u8;
    }
    u128::try_from(quotient).map_err(|_| LendingError::ArithmeticOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_div_rounding() {
        assert_eq!(mul_div(10, 1, 3).unwrap(), 3);
        assert_eq!(mul_div_ceil(10, 1, 3).unwrap(), 4);
        assert_eq!(mul_div_ceil(9, 1, 3).unwrap(), 3);
    }

    #[test]
    fn test_wide_intermediate() {
        // 1e30 * 1e18 overflows u128 but the quotient fits
        let a = 1_000_000_000_000_000_000_000_000_000_000u128;
        let wad = 1_000_000_000_000_000_000u128;
        assert_eq!(mul_div(a, wad, wad).unwrap(), a);
        assert_eq!(mul_div_ceil(a, wad, wad).unwrap(), a);
        assert_eq!(mul_div(a, wad + 1, wad).unwrap(), a + a / wad);
    }

    #[test]
    fn test_zero_divisor_and_overflow() {
        assert_eq!(mul_div(1, 1, 0), Err(LendingError::ArithmeticOverflow));
        assert_eq!(mul_div(u128::MAX, 2, 1), Err(LendingError::ArithmeticOverflow));
    }
}
