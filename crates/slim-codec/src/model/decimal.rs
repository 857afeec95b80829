//! Fixed-point decimal values.

use std::fmt;

use crate::limits::MAX_DECIMAL_SCALE;

/// A high-precision decimal: `mantissa * 10^-scale`.
///
/// Equality is structural, so `1.0` (mantissa 10, scale 1) and `1.00`
/// (mantissa 100, scale 2) are different values and round-trip as such.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Decimal {
    mantissa: i128,
    scale: u8,
}

impl Decimal {
    /// Zero with no fractional digits.
    pub const ZERO: Decimal = Decimal { mantissa: 0, scale: 0 };

    /// Creates a decimal, or `None` if `scale` exceeds 28.
    pub fn new(mantissa: i128, scale: u8) -> Option<Self> {
        (scale <= MAX_DECIMAL_SCALE).then_some(Self { mantissa, scale })
    }

    /// Creates an integral decimal.
    pub fn from_i64(value: i64) -> Self {
        Self {
            mantissa: value as i128,
            scale: 0,
        }
    }

    /// Returns the unscaled mantissa.
    pub fn mantissa(&self) -> i128 {
        self.mantissa
    }

    /// Returns the number of digits after the decimal point.
    pub fn scale(&self) -> u8 {
        self.scale
    }

    /// Returns true if the value is zero at any scale.
    pub fn is_zero(&self) -> bool {
        self.mantissa == 0
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.mantissa);
        }
        let digits = self.mantissa.unsigned_abs().to_string();
        let scale = self.scale as usize;
        let padded = if digits.len() <= scale {
            format!("{}{}", "0".repeat(scale + 1 - digits.len()), digits)
        } else {
            digits
        };
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        let sign = if self.mantissa < 0 { "-" } else { "" };
        write!(f, "{sign}{int_part}.{frac_part}")
    }
}
