//! This module is used to name the parameters the driver relies on.
//!
//! The firmware's full parameter set is discovered at runtime (see [`crate::catalog`]). These are
//! the mnemonics the power sequencing and the test scripts address directly.

use strum_macros::{AsRefStr, Display, EnumIter, IntoStaticStr};

/// Channel scoped parameters.
#[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter, Display, AsRefStr, IntoStaticStr)]
pub enum ChannelParam {
    /// __R/W__ - Voltage setpoint, volts.
    VSet,
    /// __R__ - Monitored output voltage, volts.
    VMon,
    /// __R/W__ - Current limit, scaled by the discovered exponent (µA on the R8033DM).
    ISet,
    /// __R__ - Monitored output current, scaled by the discovered exponent.
    IMon,
    /// __R/W__ - Current monitor range.
    /// * `0` - High range.
    /// * `1` - Low range.
    IMRange,
    /// __R/W__ - Overcurrent trip time, seconds.
    Trip,
    /// __R/W__ - Ramp down rate, V/s.
    RDwn,
    /// __R/W__ - Ramp up rate, V/s.
    RUp,
    /// __R/W__ - Power down mode.
    /// * `0` - Kill.
    /// * `1` - Ramp.
    PDwn,
    /// __R/W__ - Power enable.
    /// * `0` - Off.
    /// * `1` - On.
    Pw,
    /// __R__ - Channel status bitmask. See [`Fault`](crate::types::Fault).
    Status,
}

/// Board scoped parameters.
#[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter, Display, AsRefStr, IntoStaticStr)]
pub enum BoardParam {
    /// __R__ - Interlock state, reported with the firmware's on/off labels.
    BdIlk,
    /// __R__ - Board status bitmask. Any non-zero value is a failure.
    BdStatus,
    /// __R__ - Local/remote control state.
    BdCtr,
}

impl ChannelParam {
    /// Mnemonic used on the wire.
    pub fn name(self) -> &'static str {
        self.into()
    }
}

impl BoardParam {
    /// Mnemonic used on the wire.
    pub fn name(self) -> &'static str {
        self.into()
    }
}
