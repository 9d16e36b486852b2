//! Units and scaling exponents of numeric parameters.
//!
//! The firmware reports each float parameter with a unit code and a power of ten exponent. E.g.
//! `IMon` is reported in amps with exponent `-6`, so a raw reading of `12.5` means 12.5 µA.

use core::fmt;

use strum::IntoEnumIterator;
use strum_macros::EnumIter;

/// Unit codes reported by the `Unit` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[repr(u32)]
pub enum Unit {
    None = 0,
    Ampere = 1,
    Volt = 2,
    Watt = 3,
    Celsius = 4,
    Hertz = 5,
    Bar = 6,
    VoltPerSecond = 7,
    Second = 8,
    Rpm = 9,
    Count = 10,
}

impl Unit {
    pub const fn symbol(&self) -> &'static str {
        match self {
            Unit::None => "",
            Unit::Ampere => "A",
            Unit::Volt => "V",
            Unit::Watt => "W",
            Unit::Celsius => "°C",
            Unit::Hertz => "Hz",
            Unit::Bar => "bar",
            Unit::VoltPerSecond => "V/s",
            Unit::Second => "s",
            Unit::Rpm => "rpm",
            Unit::Count => "counts",
        }
    }
}

impl TryFrom<u32> for Unit {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Unit::iter().find(|unit| *unit as u32 == value).ok_or(())
    }
}

/// Range, unit and exponent of a `Float` parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericProps {
    pub min: f32,
    pub max: f32,
    pub unit: Unit,
    pub exponent: i8,
}

impl NumericProps {
    /// Whether a value in the parameter's own scaled units is inside the discovered range.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min as f64 && value <= self.max as f64
    }

    /// Convert a value in the parameter's scaled units into base SI units.
    pub fn to_si(&self, value: f64) -> f64 {
        value * 10f64.powi(self.exponent as i32)
    }

    /// Wrap a value for display with its unit, e.g. `12.50 µA`.
    pub fn display(&self, value: f64, decimals: u8) -> Quantity {
        Quantity {
            value,
            props: *self,
            decimals,
        }
    }
}

/// A value paired with its parameter's unit for logging.
#[derive(Debug, Clone, Copy)]
pub struct Quantity {
    value: f64,
    props: NumericProps,
    decimals: u8,
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.props.exponent {
            -9 => "n",
            -6 => "µ",
            -3 => "m",
            3 => "k",
            6 => "M",
            _ => "",
        };
        let symbol = self.props.unit.symbol();
        let value = if prefix.is_empty() {
            self.props.to_si(self.value)
        } else {
            self.value
        };
        write!(f, "{:.*}", self.decimals as usize, value)?;
        if !symbol.is_empty() {
            write!(f, " {prefix}{symbol}")?;
        }
        Ok(())
    }
}

/// Round to a fixed number of decimals and return the scaled integer, so two values compare equal
/// exactly when they round to the same decimal.
pub fn round_key(value: f64, decimals: u8) -> i64 {
    (value * 10f64.powi(decimals as i32)).round() as i64
}

/// Round to a fixed number of decimals.
pub fn round_to(value: f64, decimals: u8) -> f64 {
    round_key(value, decimals) as f64 / 10f64.powi(decimals as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn current_props() -> NumericProps {
        NumericProps {
            min: 0.0,
            max: 3000.0,
            unit: Unit::Ampere,
            exponent: -6,
        }
    }

    #[test]
    fn unit_codes() {
        assert_eq!(Unit::try_from(2), Ok(Unit::Volt));
        assert_eq!(Unit::try_from(7), Ok(Unit::VoltPerSecond));
        assert_eq!(Unit::try_from(11), Err(()));
    }

    #[test]
    fn range_check() {
        let props = current_props();
        assert!(props.contains(0.0));
        assert!(props.contains(3000.0));
        assert!(!props.contains(3000.5));
        assert!(!props.contains(-1.0));
    }

    #[test]
    fn exponent_scaling() {
        let props = current_props();
        assert!((props.to_si(12.5) - 12.5e-6).abs() < 1e-15);
        assert_eq!(props.display(12.5, 2).to_string(), "12.50 µA");

        let volts = NumericProps {
            min: 0.0,
            max: 4000.0,
            unit: Unit::Volt,
            exponent: 0,
        };
        assert_eq!(volts.display(500.0, 1).to_string(), "500.0 V");
    }

    #[test]
    fn rounding() {
        // 69.42 is not representable as f32, the rounded key still matches.
        assert_eq!(round_key(69.42f32 as f64, 2), round_key(69.42, 2));
        assert_eq!(round_key(500.004, 2), 50000);
        assert_ne!(round_key(500.01, 2), round_key(500.0, 2));
        assert_eq!(round_to(7.777, 1), 7.8);
    }
}
