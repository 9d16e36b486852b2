//! Periodic sampling of channel readbacks for characterisation runs.
//!
//! [`R8033dm::monitor`] samples at a fixed setpoint, [`R8033dm::scan`] steps the voltage
//! setpoint and samples once per step.

use fugit::MillisDurationU32;
use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    channel::{Channels, Values},
    error::Result,
    hv::R8033dm,
    params::ChannelParam,
    sequencer::Pause,
    session::Transport,
    types::{ChannelState, Reading},
};

/// One channel's readbacks from one sampling round. A failed read is `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelSample {
    pub round: u32,
    /// Time since the first round, counted in sampling intervals.
    pub elapsed_ms: u64,
    pub channel: u8,
    /// Volts.
    pub voltage: Option<f64>,
    /// µA.
    pub current: Option<f64>,
    pub status: Option<u32>,
    /// Set when the status sample reports a fault.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
}

impl ChannelSample {
    fn new(channel: u8, voltage: Reading, current: Reading, status: Reading) -> Self {
        let fault = match ChannelState::from(status) {
            ChannelState::Fault(fault) => Some(fault.to_string()),
            _ => None,
        };
        Self {
            round: 0,
            elapsed_ms: 0,
            channel,
            voltage: voltage.value(),
            current: current.value(),
            status: status.as_int(),
            fault,
        }
    }
}

/// A sample taken after settling at one setpoint of a voltage scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanPoint {
    /// Volts.
    pub setpoint: f64,
    #[serde(flatten)]
    pub sample: ChannelSample,
}

impl<T: Transport, P: Pause> R8033dm<T, P> {
    /// Read voltage, current and status of each channel once.
    pub fn sample(
        &mut self,
        channels: impl Into<Channels>,
    ) -> Result<Vec<ChannelSample>, T::Error> {
        let channels = channels.into();
        let voltages = self.get(channels.clone(), ChannelParam::VMon)?.into_vec();
        let currents = self.get(channels.clone(), ChannelParam::IMon)?.into_vec();
        let statuses = self.get(channels.clone(), ChannelParam::Status)?.into_vec();

        let samples: Vec<_> = channels
            .as_slice()
            .iter()
            .zip(voltages)
            .zip(currents)
            .zip(statuses)
            .map(|(((channel, voltage), current), status)| {
                ChannelSample::new(channel.index(), voltage, current, status)
            })
            .collect();
        for sample in &samples {
            if let Some(fault) = &sample.fault {
                warn!("Channel {} reports {fault} while sampling", sample.channel);
            }
        }
        Ok(samples)
    }

    /// Sample `rounds` times, pausing `interval` between rounds.
    ///
    /// Faults are recorded in the samples and do not stop the run. Cancelling through
    /// [`R8033dm::cancel_token`] stops it early and returns the rounds taken so far.
    pub fn monitor(
        &mut self,
        channels: impl Into<Channels>,
        rounds: u32,
        interval: MillisDurationU32,
    ) -> Result<Vec<ChannelSample>, T::Error> {
        let channels = channels.into();
        let cancel = self.cancel_token();
        let mut samples = Vec::new();
        for round in 0..rounds {
            if round > 0 {
                self.sequencer().pause(interval);
            }
            if cancel.is_cancelled() {
                info!("Monitoring cancelled after {round} of {rounds} rounds");
                break;
            }
            let elapsed_ms = round as u64 * interval.ticks() as u64;
            let taken = self.sample(channels.clone())?;
            debug!("Round {round} at {elapsed_ms} ms: {} samples", taken.len());
            samples.extend(taken.into_iter().map(|sample| ChannelSample {
                round,
                elapsed_ms,
                ..sample
            }));
        }
        Ok(samples)
    }

    /// Step the voltage setpoint of every channel through `setpoints`. Each step is written and
    /// verified, then the channels dwell for `dwell` before they are sampled.
    ///
    /// Cancelling through [`R8033dm::cancel_token`] stops the scan early and returns the steps
    /// taken so far. The last setpoint is left applied.
    pub fn scan(
        &mut self,
        channels: impl Into<Channels>,
        setpoints: &[f64],
        dwell: MillisDurationU32,
    ) -> Result<Vec<ScanPoint>, T::Error> {
        let channels = channels.into();
        let cancel = self.cancel_token();
        let mut points = Vec::new();
        for (step, &setpoint) in (0u32..).zip(setpoints) {
            if cancel.is_cancelled() {
                info!("Scan cancelled after {step} of {} steps", setpoints.len());
                break;
            }
            self.set_and_check(channels.clone(), ChannelParam::VSet, Values::Scalar(setpoint))?;
            self.sequencer().pause(dwell);

            let elapsed_ms = (step as u64 + 1) * dwell.ticks() as u64;
            let taken = self.sample(channels.clone())?;
            debug!("Step {step} at {setpoint} V: {} samples", taken.len());
            points.extend(taken.into_iter().map(|sample| ScanPoint {
                setpoint,
                sample: ChannelSample {
                    round: step,
                    elapsed_ms,
                    ..sample
                },
            }));
        }
        Ok(points)
    }
}
