//! Fixed-point decimal numbers (zero drift in emitted geometry).
//!
//! A [`FixedDecimal`] is an arbitrary-precision integer mantissa scaled by
//! `10^PRECISION`. Addition and subtraction are exact; multiplication and
//! division round half away from zero at the last fractional digit.
//! Floating point only appears in [`FixedDecimal::to_f64`] and
//! [`FixedDecimal::from_f64`], which feed the trigonometry of distortions.

use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use thiserror::Error;

/// Number of fractional digits kept by every value.
pub const PRECISION: u32 = 18;

const SCALE: u64 = 1_000_000_000_000_000_000;

/// Errors raised by decimal construction and arithmetic
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecimalError {
    #[error("invalid decimal literal \"{0}\"")]
    Invalid(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("value {0} is not finite")]
    NotFinite(f64),
}

/// Decimal value with a fixed number of fractional digits
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FixedDecimal(BigInt);

/// Divide, rounding half away from zero.
///
/// Computed as `q + (2·n / d) % 2` with truncating integer division, which is
/// the same as adding half the divisor before truncating.
fn round_div(dividend: &BigInt, divisor: &BigInt) -> BigInt {
    let quotient = dividend / divisor;
    let doubled: BigInt = dividend * 2;
    quotient + (doubled / divisor) % 2
}

fn pow10(exponent: u32) -> BigInt {
    num_traits::pow(BigInt::from(10u8), exponent as usize)
}

impl FixedDecimal {
    pub fn zero() -> Self {
        FixedDecimal(BigInt::zero())
    }

    pub fn from_int(value: i64) -> Self {
        FixedDecimal(BigInt::from(value) * SCALE)
    }

    /// π to the full internal precision.
    pub fn pi() -> Self {
        FixedDecimal(BigInt::from(3_141_592_653_589_793_238u64))
    }

    /// Scaled integer backing this value.
    pub fn mantissa(&self) -> &BigInt {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    /// The value as an integer, if it has no fractional part.
    pub fn to_integer(&self) -> Option<i64> {
        let scale = BigInt::from(SCALE);
        if (&self.0 % &scale).is_zero() {
            (&self.0 / scale).to_i64()
        } else {
            None
        }
    }

    /// Checked division returning `None` if the divisor is zero
    pub fn checked_div(&self, rhs: &FixedDecimal) -> Option<FixedDecimal> {
        if rhs.is_zero() {
            None
        } else {
            Some(FixedDecimal(round_div(&(&self.0 * SCALE), &rhs.0)))
        }
    }

    /// Lossy conversion for transcendental functions.
    pub fn to_f64(&self) -> f64 {
        self.format(-1).parse().unwrap_or(f64::NAN)
    }

    /// Convert a float through its shortest decimal rendering.
    pub fn from_f64(value: f64) -> Result<Self, DecimalError> {
        if !value.is_finite() {
            return Err(DecimalError::NotFinite(value));
        }
        format!("{value}").parse()
    }

    /// Multiply by a float coefficient (a sine, cosine or tangent).
    pub fn scale_by(&self, factor: f64) -> Result<Self, DecimalError> {
        Ok(self.clone() * FixedDecimal::from_f64(factor)?)
    }

    /// Render with `precision` fractional digits, trailing zeros trimmed.
    ///
    /// A negative precision renders the full internal precision.
    pub fn format(&self, precision: i32) -> String {
        let digits = if precision < 0 {
            PRECISION
        } else {
            (precision as u32).min(PRECISION)
        };
        let rounded = round_div(&self.0, &pow10(PRECISION - digits));
        let negative = rounded.is_negative();
        let width = digits as usize + 1;
        let magnitude = format!("{:0>width$}", rounded.abs().to_string());
        let (integer, fraction) = magnitude.split_at(magnitude.len() - digits as usize);
        let fraction = fraction.trim_end_matches('0');

        let mut text = String::with_capacity(magnitude.len() + 2);
        if negative {
            text.push('-');
        }
        text.push_str(integer);
        if !fraction.is_empty() {
            text.push('.');
            text.push_str(fraction);
        }
        text
    }
}

impl FromStr for FixedDecimal {
    type Err = DecimalError;

    /// Parse `[+-]digits[.digits]`; extra fractional digits round half up
    /// in magnitude.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let invalid = || DecimalError::Invalid(text.to_string());
        let (negative, unsigned) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };
        let (integer, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
        if integer.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if !integer.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let kept = &fraction[..fraction.len().min(PRECISION as usize)];
        let mut digits = String::with_capacity(integer.len() + PRECISION as usize);
        digits.push_str(integer);
        digits.push_str(kept);
        for _ in kept.len()..PRECISION as usize {
            digits.push('0');
        }
        let mut mantissa: BigInt = digits.parse().map_err(|_| invalid())?;
        if fraction.as_bytes().get(PRECISION as usize).is_some_and(|b| *b >= b'5') {
            mantissa += 1;
        }
        if negative {
            mantissa = -mantissa;
        }
        Ok(FixedDecimal(mantissa))
    }
}

impl From<i64> for FixedDecimal {
    fn from(value: i64) -> Self {
        FixedDecimal::from_int(value)
    }
}

impl Add for FixedDecimal {
    type Output = FixedDecimal;
    fn add(self, rhs: FixedDecimal) -> FixedDecimal {
        FixedDecimal(self.0 + rhs.0)
    }
}

impl Sub for FixedDecimal {
    type Output = FixedDecimal;
    fn sub(self, rhs: FixedDecimal) -> FixedDecimal {
        FixedDecimal(self.0 - rhs.0)
    }
}

impl<'a> Add<&'a FixedDecimal> for &'a FixedDecimal {
    type Output = FixedDecimal;
    fn add(self, rhs: &FixedDecimal) -> FixedDecimal {
        FixedDecimal(&self.0 + &rhs.0)
    }
}

impl<'a> Sub<&'a FixedDecimal> for &'a FixedDecimal {
    type Output = FixedDecimal;
    fn sub(self, rhs: &FixedDecimal) -> FixedDecimal {
        FixedDecimal(&self.0 - &rhs.0)
    }
}

impl Mul for FixedDecimal {
    type Output = FixedDecimal;
    fn mul(self, rhs: FixedDecimal) -> FixedDecimal {
        FixedDecimal(round_div(&(self.0 * rhs.0), &BigInt::from(SCALE)))
    }
}

// NOTE: FixedDecimal / FixedDecimal is intentionally NOT implemented as a trait.
// Use checked_div() which returns None for a zero divisor.

impl Neg for FixedDecimal {
    type Output = FixedDecimal;
    fn neg(self) -> FixedDecimal {
        FixedDecimal(-self.0)
    }
}

impl AddAssign for FixedDecimal {
    fn add_assign(&mut self, rhs: FixedDecimal) {
        self.0 += rhs.0;
    }
}

impl SubAssign for FixedDecimal {
    fn sub_assign(&mut self, rhs: FixedDecimal) {
        self.0 -= rhs.0;
    }
}

impl fmt::Display for FixedDecimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format(-1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(text: &str) -> FixedDecimal {
        text.parse().unwrap()
    }

    #[test]
    fn parse_and_format_round_trip() {
        for text in [
            "0",
            "1",
            "-1",
            "12.5",
            "0.000000000000000001",
            "-3.25",
            "1234567890123.123456789012345678",
        ] {
            assert_eq!(dec(text).format(18), text);
        }
        assert_eq!(dec("+7.50").format(18), "7.5");
        assert_eq!(dec(".5").format(18), "0.5");
        assert_eq!(dec("5.").format(18), "5");
    }

    #[test]
    fn parse_rounds_at_the_nineteenth_digit() {
        assert_eq!(dec("0.0000000000000000014").format(-1), "0.000000000000000001");
        assert_eq!(dec("0.0000000000000000015").format(-1), "0.000000000000000002");
        assert_eq!(dec("-0.0000000000000000015").format(-1), "-0.000000000000000002");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("".parse::<FixedDecimal>().is_err());
        assert!("-".parse::<FixedDecimal>().is_err());
        assert!("1.2.3".parse::<FixedDecimal>().is_err());
        assert!("1e5".parse::<FixedDecimal>().is_err());
    }

    #[test]
    fn add_then_subtract_is_identity() {
        let a = dec("12.345678901234567891");
        let b = dec("-98.7");
        assert_eq!((a.clone() + b.clone()) - b, a);
    }

    #[test]
    fn multiply_then_divide_is_identity() {
        let a = dec("3.5");
        let b = dec("0.25");
        assert_eq!((a.clone() * b.clone()).checked_div(&b), Some(a));
    }

    #[test]
    fn division_rounds_half_up() {
        let third = dec("2").checked_div(&dec("3")).unwrap();
        assert_eq!(third.format(-1), "0.666666666666666667");
        assert_eq!(third.format(3), "0.667");
        let negative = dec("-2").checked_div(&dec("3")).unwrap();
        assert_eq!(negative.format(-1), "-0.666666666666666667");
    }

    #[test]
    fn division_by_zero_is_rejected() {
        assert_eq!(dec("1").checked_div(&FixedDecimal::zero()), None);
    }

    #[test]
    fn format_trims_and_rounds() {
        assert_eq!(dec("10.5000").format(3), "10.5");
        assert_eq!(dec("10.0004").format(3), "10");
        assert_eq!(dec("10.0005").format(3), "10.001");
        assert_eq!(dec("-0.0001").format(3), "0");
        assert_eq!(dec("-1.25").format(1), "-1.3");
        assert_eq!(dec("99.96").format(1), "100");
        assert_eq!(dec("0.123").format(0), "0");
    }

    #[test]
    fn float_bridge() {
        assert_eq!(FixedDecimal::from_f64(0.5).unwrap(), dec("0.5"));
        assert_eq!(FixedDecimal::from_f64(1e-7).unwrap(), dec("0.0000001"));
        assert!(FixedDecimal::from_f64(f64::INFINITY).is_err());
        assert_eq!(dec("-2.75").to_f64(), -2.75);
    }

    #[test]
    fn integer_detection() {
        assert_eq!(dec("3").to_integer(), Some(3));
        assert_eq!(dec("-2.000").to_integer(), Some(-2));
        assert_eq!(dec("2.5").to_integer(), None);
    }
}
