//! Power sequencing of HV channels.
//!
//! A power transition goes through these steps, strictly in order:
//!
//! 1. Sample `Status` on every requested channel and refuse to continue if any is faulted.
//! 2. Write `Pw` on every channel.
//! 3. Read `Pw` back and require it to equal the commanded value.
//! 4. Pause one quantum. The firmware reports a ramp as done before it has started.
//! 5. Poll every channel that has not reached its terminal status until it does.
//!
//! A fault bit at any sample aborts the whole call. The poll is bounded by an optional ramp
//! timeout and can be interrupted through a [`CancelToken`].

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use fugit::MillisDurationU32;
use log::{error, info};

use crate::{
    accessor::Accessor,
    channel::{Channel, Channels, PerChannel, Values},
    error::{Error, Result},
    params::ChannelParam,
    session::Transport,
    types::{Fault, Reading},
    units::round_key,
};

/// How the sequencer waits between samples.
pub trait Pause {
    fn pause(&mut self, duration: MillisDurationU32);
}

/// Blocks the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleep;

impl Pause for ThreadSleep {
    fn pause(&mut self, duration: MillisDurationU32) {
        std::thread::sleep(std::time::Duration::from_millis(duration.to_millis() as u64));
    }
}

/// Shared flag to abort a ramp wait from another thread.
#[derive(Debug, Default, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Re-arm the token for the next transition.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencerConfig {
    /// Settle delay after a `Pw` write, and the poll period while ramping.
    pub quantum: MillisDurationU32,
    /// Give up on a ramp after this long. `None` polls until the channel settles or faults.
    pub ramp_timeout: Option<MillisDurationU32>,
    /// Decimals compared when checking a read-back value.
    pub decimals: u8,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            quantum: MillisDurationU32::millis(1000),
            ramp_timeout: Some(MillisDurationU32::minutes(30)),
            decimals: 2,
        }
    }
}

/// Direction of a power transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// `Status` once the ramp is complete.
    pub fn terminal(&self) -> u32 {
        match self {
            Direction::Up => 1,
            Direction::Down => 0,
        }
    }

    /// Value written to `Pw`.
    pub fn power(&self) -> f64 {
        match self {
            Direction::Up => 1.0,
            Direction::Down => 0.0,
        }
    }
}

/// Drives channel power transitions on top of an [`Accessor`].
pub struct Sequencer<T: Transport, P: Pause = ThreadSleep> {
    accessor: Accessor<T>,
    pause: P,
    config: SequencerConfig,
    cancel: CancelToken,
}

impl<T: Transport, P: Pause> Sequencer<T, P> {
    pub fn new(accessor: Accessor<T>, pause: P, config: SequencerConfig) -> Self {
        Self {
            accessor,
            pause,
            config,
            cancel: CancelToken::new(),
        }
    }

    pub fn accessor(&self) -> &Accessor<T> {
        &self.accessor
    }

    pub fn accessor_mut(&mut self) -> &mut Accessor<T> {
        &mut self.accessor
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    /// A handle which aborts the current and any later ramp wait until it is reset.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Pause one interval outside of a power transition.
    pub fn pause(&mut self, duration: MillisDurationU32) {
        self.pause.pause(duration);
    }

    #[cfg(test)]
    pub(crate) fn pauser(&self) -> &P {
        &self.pause
    }

    pub fn into_accessor(self) -> Accessor<T> {
        self.accessor
    }

    pub fn turn_on(&mut self, channels: &Channels) -> Result<(), T::Error> {
        self.transition(channels, Direction::Up)
    }

    pub fn turn_off(&mut self, channels: &Channels) -> Result<(), T::Error> {
        self.transition(channels, Direction::Down)
    }

    fn transition(&mut self, channels: &Channels, direction: Direction) -> Result<(), T::Error> {
        info!("Powering {direction:?} channels {channels}");

        // Never power a channel which is already faulted.
        for channel in channels.as_slice() {
            let status = self.status(*channel)?;
            self.check_fault(*channel, status)?;
        }

        let power = Values::Scalar(direction.power());
        let pw = ChannelParam::Pw.name();
        self.accessor.set(channels, pw, &power)?;
        self.get_check_channel_parameter(channels, pw, &power)?;

        self.pause.pause(self.config.quantum);

        for channel in channels.as_slice() {
            let status = self.status(*channel)?;
            self.check_fault(*channel, status)?;
            if status != direction.terminal() {
                let samples = self.wait_for_ramp(*channel, direction)?;
                info!("Channel {channel} ramped {direction:?} after {samples} samples");
            }
        }
        info!("Channels {channels} are powered {direction:?}");
        Ok(())
    }

    /// Poll a channel's status once per quantum until it reaches the terminal value of
    /// `direction`. Returns the number of samples taken.
    pub fn wait_for_ramp(
        &mut self,
        channel: Channel,
        direction: Direction,
    ) -> Result<u32, T::Error> {
        let quantum = self.config.quantum.to_millis() as u64;
        let mut elapsed: u64 = 0;
        let mut samples = 0;
        loop {
            if self.cancel.is_cancelled() {
                info!("Ramp wait on channel {channel} cancelled after {samples} samples");
                return Err(Error::Cancelled { channel });
            }
            self.pause.pause(self.config.quantum);
            elapsed += quantum;

            let status = self.status(channel)?;
            samples += 1;
            self.check_fault(channel, status)?;
            if status == direction.terminal() {
                return Ok(samples);
            }
            if let Some(timeout) = self.config.ramp_timeout {
                if elapsed >= timeout.to_millis() as u64 {
                    error!(
                        "Channel {channel} still ramping after {elapsed} ms, status {status:#06x}"
                    );
                    return Err(Error::RampTimeout {
                        channel,
                        timeout_ms: timeout.to_millis(),
                        status,
                    });
                }
            }
        }
    }

    /// Read a parameter back and compare it with the value which was written, rounded to the
    /// configured decimals. Any mismatch is fatal and carries the channel's status.
    ///
    /// A scalar expectation is compared against every channel, a list is compared by position.
    pub fn get_check_channel_parameter(
        &mut self,
        channels: &Channels,
        param: &str,
        expected: &Values<f64>,
    ) -> Result<PerChannel<Reading>, T::Error> {
        let pairs = expected
            .zip(channels)
            .map_err(|(expected, got)| Error::ShapeMismatch { expected, got })?;
        let readings = self.accessor.get(channels, param)?;

        let decimals = self.config.decimals;
        for ((channel, expected), read) in pairs.into_iter().zip(readings.as_slice()) {
            // NaN and infinities never round to a match.
            let matches = expected.is_finite()
                && read.value().filter(|value| value.is_finite()).is_some_and(|value| {
                    round_key(value, decimals) == round_key(expected, decimals)
                });
            if !matches {
                let status = self.read_one(channel, ChannelParam::Status.name())?;
                error!(
                    "Wrote {expected} to {param} on channel {channel}, read back {read} (status {status})"
                );
                return Err(Error::WriteVerification {
                    channel,
                    param: param.to_owned(),
                    expected,
                    read: *read,
                    status,
                });
            }
        }
        Ok(readings)
    }

    /// Current status register of one channel. A failed read is treated as a fault.
    pub fn status(&mut self, channel: Channel) -> Result<u32, T::Error> {
        match self.read_one(channel, ChannelParam::Status.name())? {
            Reading::Int(status) => Ok(status),
            Reading::Error(code) => {
                error!("Status of channel {channel} is unreadable, return code {code}");
                Err(Error::StatusUnreadable { channel, code })
            }
            Reading::Float(_) => Err(Error::InvalidResponse),
        }
    }

    fn read_one(&mut self, channel: Channel, param: &str) -> Result<Reading, T::Error> {
        self.accessor
            .get(&Channels::Single(channel), param)?
            .single()
            .ok_or(Error::InvalidResponse)
    }

    fn check_fault(&self, channel: Channel, status: u32) -> Result<(), T::Error> {
        if !Fault::is_fault(status) {
            return Ok(());
        }
        let faults = Fault::all_in(status);
        for fault in &faults {
            error!("Channel {channel}: {fault}");
        }
        // Bits above the known set still count as a fault.
        let fault = faults.first().copied().unwrap_or(Fault::Failure);
        Err(Error::ChannelFault {
            channel,
            fault,
            status,
        })
    }
}
