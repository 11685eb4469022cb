//! Measurement and color values.
//!
//! Lengths are stored as integral English Metric Units (EMU), the native unit
//! of the package format, so conversions are exact for every helper unit.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DomError, Result, quoted};

pub const EMU_PER_INCH: i64 = 914_400;
pub const EMU_PER_CM: i64 = 360_000;
pub const EMU_PER_MM: i64 = 36_000;
pub const EMU_PER_POINT: i64 = 12_700;
pub const EMU_PER_TWIP: i64 = 635;

/// Largest magnitude any length may take: 22 inches, the biggest page edge
/// word processors accept.
pub const MAX_LENGTH_EMU: i64 = 22 * EMU_PER_INCH;

/// The units scripts can express lengths in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    Point,
    Inch,
    Centimeter,
    Millimeter,
    Emu,
    Twip,
}

impl Unit {
    /// Number of EMU in one of this unit.
    pub fn emu_per_unit(self) -> i64 {
        match self {
            Self::Point => EMU_PER_POINT,
            Self::Inch => EMU_PER_INCH,
            Self::Centimeter => EMU_PER_CM,
            Self::Millimeter => EMU_PER_MM,
            Self::Emu => 1,
            Self::Twip => EMU_PER_TWIP,
        }
    }

    /// Name of the script helper that constructs lengths in this unit.
    pub fn helper_name(self) -> &'static str {
        match self {
            Self::Point => "Pt",
            Self::Inch => "Inches",
            Self::Centimeter => "Cm",
            Self::Millimeter => "Mm",
            Self::Emu => "Emu",
            Self::Twip => "Twips",
        }
    }
}

/// A signed length in EMU, bounded to ±[`MAX_LENGTH_EMU`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Length(i64);

impl Length {
    pub const ZERO: Length = Length(0);

    /// Whole inches, for compile-time defaults.
    pub const fn whole_inches(inches: i64) -> Self {
        Self(inches * EMU_PER_INCH)
    }

    /// Whole points, for compile-time defaults.
    pub const fn whole_points(points: i64) -> Self {
        Self(points * EMU_PER_POINT)
    }

    pub(crate) const fn raw(emu: i64) -> Self {
        Self(emu)
    }

    /// Build a length from raw EMU, rejecting values beyond the bound.
    pub fn from_emu(emu: i64) -> Result<Self> {
        if emu.abs() > MAX_LENGTH_EMU {
            return Err(out_of_range("Emu()", &emu.to_string()));
        }
        Ok(Self(emu))
    }

    /// Convert `value` expressed in `unit` to a length.
    ///
    /// Non-finite input and magnitudes above 22 inches are rejected; the
    /// result is rounded to the nearest EMU.
    pub fn from_unit(value: f64, unit: Unit) -> Result<Self> {
        let operation = format!("{}()", unit.helper_name());
        if !value.is_finite() {
            return Err(DomError::InvalidValue {
                operation,
                value: value.to_string(),
                expected: "a finite number".into(),
            });
        }
        let emu = (value * unit.emu_per_unit() as f64).round();
        if emu.abs() > MAX_LENGTH_EMU as f64 {
            return Err(out_of_range(&operation, &format_number(value)));
        }
        Ok(Self(emu as i64))
    }

    pub fn points(value: f64) -> Result<Self> {
        Self::from_unit(value, Unit::Point)
    }

    pub fn inches(value: f64) -> Result<Self> {
        Self::from_unit(value, Unit::Inch)
    }

    pub fn cm(value: f64) -> Result<Self> {
        Self::from_unit(value, Unit::Centimeter)
    }

    pub const fn emu(self) -> i64 {
        self.0
    }

    pub fn to_unit(self, unit: Unit) -> f64 {
        self.0 as f64 / unit.emu_per_unit() as f64
    }

    pub fn to_points(self) -> f64 {
        self.to_unit(Unit::Point)
    }

    /// Twentieths of a point, rounded; the unit of most page measurements in
    /// the package.
    pub fn twips(self) -> i64 {
        (self.0 as f64 / EMU_PER_TWIP as f64).round() as i64
    }

    /// Half points, rounded; the unit of font sizes in the package.
    pub fn half_points(self) -> i64 {
        (self.0 as f64 / (EMU_PER_POINT as f64 / 2.0)).round() as i64
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Length) -> Result<Self> {
        Self::from_emu(self.0.saturating_add(other.0))
    }

    pub fn checked_sub(self, other: Length) -> Result<Self> {
        Self::from_emu(self.0.saturating_sub(other.0))
    }

    /// Multiply by a scalar, keeping the result within bounds.
    pub fn scale(self, factor: f64) -> Result<Self> {
        Self::from_unit(self.0 as f64 * factor, Unit::Emu)
    }
}

impl fmt::Display for Length {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}pt", format_number(self.to_points()))
    }
}

fn out_of_range(operation: &str, value: &str) -> DomError {
    DomError::InvalidValue {
        operation: operation.to_string(),
        value: value.to_string(),
        expected: "a length within ±22 inches".into(),
    }
}

/// Format a float without a trailing `.0` noise for whole numbers.
pub(crate) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let text = format!("{value:.4}");
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// An sRGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    /// Build a color from integer components, each in `0..=255`.
    pub fn from_components(r: i64, g: i64, b: i64) -> Result<Self> {
        let component = |name: &str, value: i64| -> Result<u8> {
            u8::try_from(value).map_err(|_| DomError::InvalidValue {
                operation: "RGBColor()".into(),
                value: format!("{name}={value}"),
                expected: "components between 0 and 255".into(),
            })
        };
        Ok(Self {
            r: component("r", r)?,
            g: component("g", g)?,
            b: component("b", b)?,
        })
    }

    /// Parse a six-digit hex string, with or without a leading `#`.
    pub fn from_hex(text: &str) -> Result<Self> {
        let invalid = || DomError::InvalidValue {
            operation: "RGBColor.from_string()".into(),
            value: quoted(text),
            expected: "six hexadecimal digits such as 'FF0000'".into(),
        };
        let digits = text.strip_prefix('#').unwrap_or(text);
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16).map_err(|_| invalid())
        };
        Ok(Self {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }

    /// Upper-case hex form used by the package format.
    pub fn to_hex(self) -> String {
        format!("{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RGBColor(0x{:02x}, 0x{:02x}, 0x{:02x})", self.r, self.g, self.b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helper_conversions_are_exact() {
        assert_eq!(Length::inches(1.0).unwrap().emu(), EMU_PER_INCH);
        assert_eq!(Length::points(12.0).unwrap().emu(), 12 * EMU_PER_POINT);
        assert_eq!(Length::cm(2.54).unwrap().emu(), EMU_PER_INCH);
        assert_eq!(Length::inches(1.0).unwrap().twips(), 1440);
        assert_eq!(Length::points(11.0).unwrap().half_points(), 22);
    }

    #[test]
    fn rejects_non_finite_and_huge_values() {
        assert!(Length::points(f64::NAN).is_err());
        assert!(Length::inches(f64::INFINITY).is_err());
        let err = Length::inches(23.0).unwrap_err();
        assert!(err.to_string().contains("Inches()"));
        assert!(err.to_string().contains("23"));
        assert!(Length::inches(-22.0).is_ok());
    }

    #[test]
    fn arithmetic_stays_bounded() {
        let a = Length::inches(20.0).unwrap();
        assert!(a.checked_add(Length::inches(3.0).unwrap()).is_err());
        assert_eq!(
            a.checked_sub(Length::inches(19.0).unwrap()).unwrap(),
            Length::whole_inches(1)
        );
        assert_eq!(Length::whole_points(6).scale(2.0).unwrap(), Length::whole_points(12));
    }

    #[test]
    fn display_in_points() {
        assert_eq!(Length::whole_points(12).to_string(), "12pt");
        assert_eq!(Length::points(10.5).unwrap().to_string(), "10.5pt");
    }

    #[test]
    fn color_components_validated() {
        let c = Color::from_components(255, 0, 16).unwrap();
        assert_eq!(c.to_hex(), "FF0010");
        let err = Color::from_components(256, 0, 0).unwrap_err();
        assert!(err.to_string().contains("r=256"));
        assert!(Color::from_components(0, -1, 0).is_err());
    }

    #[test]
    fn color_from_hex() {
        assert_eq!(
            Color::from_hex("#00ff7f").unwrap(),
            Color { r: 0, g: 255, b: 127 }
        );
        let err = Color::from_hex("red").unwrap_err();
        assert!(err.to_string().contains("'red'"));
        assert!(Color::from_hex("GG0000").is_err());
    }
}
