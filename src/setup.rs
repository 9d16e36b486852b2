use log::info;
use thiserror::Error;

use crate::{
    channel::{Channels, Values},
    error::Result,
    hv::R8033dm,
    params::ChannelParam,
    sequencer::Pause,
    session::Transport,
};

/// Current monitor range, written to `IMRange`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CurrentRange {
    High = 0,
    Low = 1,
}

/// Behaviour on power off, written to `PDwn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PowerDown {
    /// Drop the output immediately.
    Kill = 0,
    /// Ramp down at the `RDwn` rate.
    Ramp = 1,
}

/// Use [`ChannelSetupBuilder`] to create a setup.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSetup {
    /// Voltage setpoint, volts.
    voltage: Option<f64>,
    /// Current limit, µA.
    current_limit: Option<f64>,
    current_range: Option<CurrentRange>,
    /// Overcurrent trip time, seconds.
    trip_time: Option<f64>,
    /// V/s.
    ramp_up: Option<f64>,
    /// V/s.
    ramp_down: Option<f64>,
    power_down: Option<PowerDown>,
}

impl ChannelSetup {
    /// Write this setup to every channel. Each parameter is read back and verified before the next
    /// one is written, and the voltage setpoint goes last.
    pub fn apply<T: Transport, P: Pause>(
        &self,
        hv: &mut R8033dm<T, P>,
        channels: impl Into<Channels>,
    ) -> Result<(), T::Error> {
        let channels = channels.into();
        let writes = [
            (ChannelParam::RUp, self.ramp_up),
            (ChannelParam::RDwn, self.ramp_down),
            (ChannelParam::Trip, self.trip_time),
            (ChannelParam::ISet, self.current_limit),
            (
                ChannelParam::IMRange,
                self.current_range.map(|range| range as u8 as f64),
            ),
            (
                ChannelParam::PDwn,
                self.power_down.map(|mode| mode as u8 as f64),
            ),
            (ChannelParam::VSet, self.voltage),
        ];
        for (param, value) in writes {
            if let Some(value) = value {
                hv.set_and_check(channels.clone(), param, Values::Scalar(value))?;
            }
        }
        info!("Applied setup to channels {channels}");
        Ok(())
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ChannelSetupBuilderError {
    #[error("A setup must set at least one parameter")]
    Empty,
    #[error("{0} must not be negative")]
    Negative(&'static str),
}

/// Use this type to create a setup.
#[derive(Debug, Clone, Default)]
pub struct ChannelSetupBuilder {
    voltage: Option<f64>,
    current_limit: Option<f64>,
    current_range: Option<CurrentRange>,
    trip_time: Option<f64>,
    ramp_up: Option<f64>,
    ramp_down: Option<f64>,
    power_down: Option<PowerDown>,
}

impl ChannelSetupBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let's build it!
    pub fn build(self) -> core::result::Result<ChannelSetup, ChannelSetupBuilderError> {
        let values = [
            ("voltage", self.voltage),
            ("current limit", self.current_limit),
            ("trip time", self.trip_time),
            ("ramp up rate", self.ramp_up),
            ("ramp down rate", self.ramp_down),
        ];
        if let Some((name, _)) = values
            .iter()
            .find(|(_, value)| value.is_some_and(|v| v < 0.0))
        {
            return Err(ChannelSetupBuilderError::Negative(name));
        }
        if values.iter().all(|(_, value)| value.is_none())
            && self.current_range.is_none()
            && self.power_down.is_none()
        {
            return Err(ChannelSetupBuilderError::Empty);
        }
        Ok(ChannelSetup {
            voltage: self.voltage,
            current_limit: self.current_limit,
            current_range: self.current_range,
            trip_time: self.trip_time,
            ramp_up: self.ramp_up,
            ramp_down: self.ramp_down,
            power_down: self.power_down,
        })
    }

    /// Set the voltage setpoint. Volts.
    pub fn with_voltage(mut self, volts: f64) -> Self {
        self.voltage = Some(volts);
        self
    }

    /// Set the current limit. µA.
    pub fn with_current_limit(mut self, microamps: f64) -> Self {
        self.current_limit = Some(microamps);
        self
    }

    pub fn with_current_range(mut self, range: CurrentRange) -> Self {
        self.current_range = Some(range);
        self
    }

    /// Set the overcurrent trip time. Seconds.
    pub fn with_trip_time(mut self, seconds: f64) -> Self {
        self.trip_time = Some(seconds);
        self
    }

    /// Set both ramp rates. V/s.
    pub fn with_ramp(mut self, up: f64, down: f64) -> Self {
        self.ramp_up = Some(up);
        self.ramp_down = Some(down);
        self
    }

    pub fn with_power_down(mut self, mode: PowerDown) -> Self {
        self.power_down = Some(mode);
        self
    }
}
