//! This module contains types describing parameters and the values read from them.

use core::fmt;

use modular_bitfield::prelude::*;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

use crate::protocol::{ReturnCode, WireType};

/// Whether a parameter belongs to the board or to a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum Scope {
    #[strum(to_string = "board")]
    Board,
    #[strum(to_string = "channel")]
    Channel,
}

/// Parameter type as reported by the `Type` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[repr(u32)]
pub enum ParamKind {
    /// `PARAM_TYPE_NUMERIC`: a float with range, unit and exponent.
    Float = 0,
    /// `PARAM_TYPE_ONOFF`: a two state register with firmware provided labels.
    OnOff = 1,
    /// `PARAM_TYPE_CHSTATUS`: the channel status bitmask.
    ChannelStatus = 2,
    /// `PARAM_TYPE_BDSTATUS`: the board status bitmask.
    BoardStatus = 3,
}

impl ParamKind {
    /// Only `Float` parameters travel as floats, everything else is an integer register.
    pub fn wire_type(&self) -> WireType {
        match self {
            ParamKind::Float => WireType::Float,
            _ => WireType::UInt,
        }
    }
}

impl TryFrom<u32> for ParamKind {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        ParamKind::iter().find(|kind| *kind as u32 == value).ok_or(())
    }
}

/// Access mode as reported by the `Mode` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[repr(u32)]
pub enum AccessMode {
    ReadOnly = 0,
    WriteOnly = 1,
    ReadWrite = 2,
}

impl AccessMode {
    pub fn readable(&self) -> bool {
        *self != AccessMode::WriteOnly
    }

    pub fn writable(&self) -> bool {
        *self != AccessMode::ReadOnly
    }
}

impl TryFrom<u32> for AccessMode {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        AccessMode::iter().find(|mode| *mode as u32 == value).ok_or(())
    }
}

/// One value read back from the controller.
///
/// A failed read is reported per channel as [`Reading::Error`] rather than failing a whole batch.
/// It is never a number: safety checks must treat it as a fault.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Float(f32),
    Int(u32),
    Error(ReturnCode),
}

impl Reading {
    /// Numeric value, `None` for a failed read.
    pub fn value(&self) -> Option<f64> {
        match *self {
            Reading::Float(v) => Some(v as f64),
            Reading::Int(v) => Some(v as f64),
            Reading::Error(_) => None,
        }
    }

    /// Integer register value, `None` for a failed read. Floats are never truncated into one.
    pub fn as_int(&self) -> Option<u32> {
        match *self {
            Reading::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reading::Error(_))
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Float(v) => write!(f, "{v}"),
            Reading::Int(v) => write!(f, "{v}"),
            Reading::Error(_) => f.write_str("Error"),
        }
    }
}

/// Highest status value which is not a fault: off, on, ramping up or ramping down.
pub const SETTLED_THRESHOLD: u32 = 7;

/// Fault bits of the channel `Status` register, in the order they are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, Display)]
#[repr(u32)]
pub enum Fault {
    #[strum(to_string = "overcurrent")]
    OverCurrent = 0x0008,
    #[strum(to_string = "overvoltage")]
    OverVoltage = 0x0010,
    #[strum(to_string = "undervoltage")]
    UnderVoltage = 0x0020,
    #[strum(to_string = "overcurrent trip")]
    Trip = 0x0040,
    #[strum(to_string = "overpower")]
    OverPower = 0x0080,
    #[strum(to_string = "temperature warning")]
    TemperatureWarning = 0x0100,
    #[strum(to_string = "over-temperature")]
    OverTemperature = 0x0200,
    #[strum(to_string = "kill state")]
    Kill = 0x0400,
    #[strum(to_string = "interlock tripped")]
    Interlock = 0x0800,
    #[strum(to_string = "off while commanded on")]
    Disabled = 0x1000,
    #[strum(to_string = "general failure")]
    Failure = 0x2000,
    #[strum(to_string = "local mode while on")]
    Local = 0x4000,
}

impl Fault {
    pub fn mask(&self) -> u32 {
        *self as u32
    }

    /// Whether a status sample is past the settled threshold.
    pub fn is_fault(status: u32) -> bool {
        status > SETTLED_THRESHOLD
    }

    /// The fault reported for a status sample: the first set bit wins.
    pub fn first_in(status: u32) -> Option<Fault> {
        Fault::iter().find(|fault| status & fault.mask() != 0)
    }

    /// Every fault bit set in a status sample, for diagnostics.
    pub fn all_in(status: u32) -> Vec<Fault> {
        Fault::iter().filter(|fault| status & fault.mask() != 0).collect()
    }
}

/// Bit view of the low 16 bits of a channel `Status` register.
#[bitfield]
#[derive(Debug, Clone, Copy)]
pub struct ChannelStatus {
    pub on: bool,
    pub ramping_up: bool,
    pub ramping_down: bool,
    pub overcurrent: bool,
    pub overvoltage: bool,
    pub undervoltage: bool,
    pub trip: bool,
    pub overpower: bool,
    pub temperature_warning: bool,
    pub over_temperature: bool,
    pub kill: bool,
    pub interlock: bool,
    pub disabled: bool,
    pub failure: bool,
    pub local: bool,
    #[skip]
    __: B1,
}

impl From<u32> for ChannelStatus {
    fn from(value: u32) -> Self {
        ChannelStatus::from_bytes((value as u16).to_le_bytes())
    }
}

/// Where a channel is in its power cycle, derived fresh from each status sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Unknown,
    Off,
    RampingUp,
    On,
    RampingDown,
    Fault(Fault),
}

impl From<Reading> for ChannelState {
    fn from(reading: Reading) -> Self {
        let Some(status) = reading.as_int() else {
            return ChannelState::Unknown;
        };
        if Fault::is_fault(status) {
            return ChannelState::Fault(Fault::first_in(status).unwrap_or(Fault::Failure));
        }
        let bits = ChannelStatus::from(status);
        if bits.ramping_up() {
            ChannelState::RampingUp
        } else if bits.ramping_down() {
            ChannelState::RampingDown
        } else if bits.on() {
            ChannelState::On
        } else {
            ChannelState::Off
        }
    }
}
