use log::warn;

use crate::{
    accessor::Accessor,
    catalog::Catalog,
    channel::{Channels, PerChannel, Values},
    config::HvConfig,
    error::Result,
    guard,
    params::{BoardParam, ChannelParam},
    protocol::Request,
    sequencer::{CancelToken, Pause, Sequencer, ThreadSleep},
    session::{Session, Transport},
    types::{ChannelState, Reading},
};

/// An R8033DM high-voltage controller, discovered and checked.
///
/// You can open one over any [`Transport`]. Use [`R8033dm::connect`] to talk to a real controller
/// through an [embedded_io::Read] & [embedded_io::Write] interface.
///
/// Channel arguments accept one channel (`3u8`) or a list (`[3u8, 4, 5]`, `0u8..8`), and every
/// answer comes back in the same shape. Every `set_*` method reads the parameter back, verifies
/// it and returns what was read. Numeric values are in the parameter's own units: volts for
/// voltages, µA for currents, V/s for ramp rates and seconds for the trip time.
pub struct R8033dm<T: Transport, P: Pause = ThreadSleep> {
    sequencer: Sequencer<T, P>,
}

impl<S: embedded_io::Read + embedded_io::Write, const L: usize> R8033dm<Session<S, L>> {
    /// Initialise the HV system over `interface` and open the board.
    pub fn connect(interface: S, config: &HvConfig) -> Result<Self, S::Error> {
        let session = Session::connect(
            interface,
            &config.address,
            &config.username,
            &config.password,
        )?;
        Self::open(session, config, ThreadSleep)
    }
}

impl<T: Transport, P: Pause> R8033dm<T, P> {
    /// Discover the parameter schema, then run the board checks. Nothing is written to a
    /// channel until both succeed.
    pub fn open(mut transport: T, config: &HvConfig, pause: P) -> Result<Self, T::Error> {
        let catalog = Catalog::discover(&mut transport, config.slot, config.channel_count)?;
        let mut accessor = Accessor::new(transport, catalog, config.slot);
        guard::check_board(&mut accessor)?;
        Ok(Self {
            sequencer: Sequencer::new(accessor, pause, config.sequencer()),
        })
    }

    /// Release the HV system and hand back the transport.
    pub fn close(self) -> Result<T, T::Error> {
        let mut transport = self.sequencer.into_accessor().into_transport();
        let reply = transport.call(&Request::Deinit)?;
        if !reply.code.is_ok() {
            warn!("Deinit returned {}", reply.code);
        }
        Ok(transport)
    }

    pub fn catalog(&self) -> &Catalog {
        self.sequencer.accessor().catalog()
    }

    /// See [`CancelToken`]. Cancelling makes the ramp wait in progress fail.
    pub fn cancel_token(&self) -> CancelToken {
        self.sequencer.cancel_token()
    }

    pub(crate) fn sequencer(&mut self) -> &mut Sequencer<T, P> {
        &mut self.sequencer
    }

    /// Power channels on and wait until they have ramped up.
    pub fn turn_on(&mut self, channels: impl Into<Channels>) -> Result<(), T::Error> {
        self.sequencer.turn_on(&channels.into())
    }

    /// Power channels off and wait until they have ramped down.
    pub fn turn_off(&mut self, channels: impl Into<Channels>) -> Result<(), T::Error> {
        self.sequencer.turn_off(&channels.into())
    }

    /// Set the voltage setpoint. Volts.
    pub fn set_hv_value(
        &mut self,
        channels: impl Into<Channels>,
        voltage: impl Into<Values<f64>>,
    ) -> Result<PerChannel<Reading>, T::Error> {
        self.set_and_check(channels.into(), ChannelParam::VSet, voltage.into())
    }

    /// Get the voltage setpoint. Volts.
    pub fn get_hv_value(
        &mut self,
        channels: impl Into<Channels>,
    ) -> Result<PerChannel<Reading>, T::Error> {
        self.get(channels.into(), ChannelParam::VSet)
    }

    /// Return the measured output voltage. Volts.
    pub fn get_voltage(
        &mut self,
        channels: impl Into<Channels>,
    ) -> Result<PerChannel<Reading>, T::Error> {
        self.get(channels.into(), ChannelParam::VMon)
    }

    /// Return the measured output current. µA.
    pub fn get_current(
        &mut self,
        channels: impl Into<Channels>,
    ) -> Result<PerChannel<Reading>, T::Error> {
        self.get(channels.into(), ChannelParam::IMon)
    }

    /// Set the current limit. µA.
    pub fn set_overcurrent(
        &mut self,
        channels: impl Into<Channels>,
        current: impl Into<Values<f64>>,
    ) -> Result<PerChannel<Reading>, T::Error> {
        self.set_and_check(channels.into(), ChannelParam::ISet, current.into())
    }

    pub fn get_overcurrent(
        &mut self,
        channels: impl Into<Channels>,
    ) -> Result<PerChannel<Reading>, T::Error> {
        self.get(channels.into(), ChannelParam::ISet)
    }

    /// Select the current monitor range. `0` high, `1` low.
    pub fn set_current_range(
        &mut self,
        channels: impl Into<Channels>,
        range: impl Into<Values<f64>>,
    ) -> Result<PerChannel<Reading>, T::Error> {
        self.set_and_check(channels.into(), ChannelParam::IMRange, range.into())
    }

    pub fn get_current_range(
        &mut self,
        channels: impl Into<Channels>,
    ) -> Result<PerChannel<Reading>, T::Error> {
        self.get(channels.into(), ChannelParam::IMRange)
    }

    /// Set how long an overcurrent is tolerated before the channel trips. Seconds.
    pub fn set_trip_time(
        &mut self,
        channels: impl Into<Channels>,
        seconds: impl Into<Values<f64>>,
    ) -> Result<PerChannel<Reading>, T::Error> {
        self.set_and_check(channels.into(), ChannelParam::Trip, seconds.into())
    }

    pub fn get_trip_time(
        &mut self,
        channels: impl Into<Channels>,
    ) -> Result<PerChannel<Reading>, T::Error> {
        self.get(channels.into(), ChannelParam::Trip)
    }

    /// Set the ramp up rate. V/s.
    pub fn set_rampup(
        &mut self,
        channels: impl Into<Channels>,
        rate: impl Into<Values<f64>>,
    ) -> Result<PerChannel<Reading>, T::Error> {
        self.set_and_check(channels.into(), ChannelParam::RUp, rate.into())
    }

    pub fn get_rampup(
        &mut self,
        channels: impl Into<Channels>,
    ) -> Result<PerChannel<Reading>, T::Error> {
        self.get(channels.into(), ChannelParam::RUp)
    }

    /// Set the ramp down rate. V/s.
    pub fn set_rampdown(
        &mut self,
        channels: impl Into<Channels>,
        rate: impl Into<Values<f64>>,
    ) -> Result<PerChannel<Reading>, T::Error> {
        self.set_and_check(channels.into(), ChannelParam::RDwn, rate.into())
    }

    pub fn get_rampdown(
        &mut self,
        channels: impl Into<Channels>,
    ) -> Result<PerChannel<Reading>, T::Error> {
        self.get(channels.into(), ChannelParam::RDwn)
    }

    /// Select what happens on power off. `0` kill, `1` ramp down.
    pub fn set_powerdown(
        &mut self,
        channels: impl Into<Channels>,
        mode: impl Into<Values<f64>>,
    ) -> Result<PerChannel<Reading>, T::Error> {
        self.set_and_check(channels.into(), ChannelParam::PDwn, mode.into())
    }

    pub fn get_powerdown(
        &mut self,
        channels: impl Into<Channels>,
    ) -> Result<PerChannel<Reading>, T::Error> {
        self.get(channels.into(), ChannelParam::PDwn)
    }

    /// Raw channel status register. See [`Fault`](crate::types::Fault) for the bits.
    pub fn get_channel_status(
        &mut self,
        channels: impl Into<Channels>,
    ) -> Result<PerChannel<Reading>, T::Error> {
        self.get(channels.into(), ChannelParam::Status)
    }

    /// Where each channel is in its power cycle.
    pub fn get_channel_state(
        &mut self,
        channels: impl Into<Channels>,
    ) -> Result<PerChannel<ChannelState>, T::Error> {
        Ok(self.get_channel_status(channels)?.map(ChannelState::from))
    }

    /// Raw board status. Zero when healthy.
    pub fn get_board_status(&mut self) -> Result<Reading, T::Error> {
        self.sequencer
            .accessor_mut()
            .get_board(BoardParam::BdStatus.name())
    }

    /// Interlock state as labelled by the firmware. `None` when it could not be read.
    pub fn get_board_interlock(&mut self) -> Result<Option<String>, T::Error> {
        guard::read_label(self.sequencer.accessor_mut(), BoardParam::BdIlk)
    }

    /// Local/remote control state as labelled by the firmware.
    ///
    /// The R8033DM reports local control even while it is driven remotely, so this is only
    /// informative.
    pub fn get_board_control(&mut self) -> Result<Option<String>, T::Error> {
        guard::read_label(self.sequencer.accessor_mut(), BoardParam::BdCtr)
    }

    /// Write a parameter, then read it back and verify it.
    pub fn set_and_check(
        &mut self,
        channels: Channels,
        param: ChannelParam,
        values: Values<f64>,
    ) -> Result<PerChannel<Reading>, T::Error> {
        self.sequencer
            .accessor_mut()
            .set(&channels, param.name(), &values)?;
        self.sequencer
            .get_check_channel_parameter(&channels, param.name(), &values)
    }

    /// Read a parameter on each channel.
    pub fn get(
        &mut self,
        channels: Channels,
        param: ChannelParam,
    ) -> Result<PerChannel<Reading>, T::Error> {
        self.sequencer.accessor_mut().get(&channels, param.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{Error, StartupViolation},
        mock_controller::{CountingPause, MockController},
        mock_link::MockLink,
        protocol::{OpCode, Payload, Reply},
        types::Fault,
    };

    fn open(controller: MockController) -> R8033dm<MockController, CountingPause> {
        R8033dm::open(controller, &HvConfig::new("10.0.0.2"), CountingPause::default()).unwrap()
    }

    #[test]
    fn tripped_interlock_aborts_before_any_channel_call() {
        let mut controller = MockController::r8033dm();
        controller.set_board_value("BdIlk", 1.0);

        let result = R8033dm::open(controller, &HvConfig::new("x"), CountingPause::default());
        match result {
            Err(Error::Startup(StartupViolation::InterlockTripped { state })) => {
                assert_eq!(state, "Tripped")
            }
            Err(other) => panic!("unexpected {other:?}"),
            Ok(_) => panic!("opened with a tripped interlock"),
        }
    }

    #[test]
    fn interlock_abort_makes_no_channel_calls() {
        let mut controller = MockController::r8033dm();
        controller.set_board_value("BdIlk", 1.0);
        let catalog = Catalog::discover(&mut controller, 0, 16).unwrap();
        let mut accessor = Accessor::new(controller, catalog, 0);

        assert!(guard::check_board(&mut accessor).is_err());
        assert_eq!(accessor.transport_mut().channel_calls(), 0);
    }

    #[test]
    fn set_then_get_rounds_to_written_value() {
        let mut hv = open(MockController::r8033dm());

        let read_back = hv.set_hv_value(2u8, 500.00).unwrap();
        assert_eq!(read_back, PerChannel::Single(Reading::Float(500.0)));

        let value = hv.get_hv_value(2u8).unwrap().single().and_then(|r| r.value());
        assert_eq!(value.map(|v| crate::units::round_to(v, 2)), Some(500.00));
    }

    #[test]
    fn setters_return_read_back_in_request_shape() {
        let mut hv = open(MockController::r8033dm());

        let read_back = hv.set_trip_time([4u8, 5, 6], [7.7, 8.8, 9.0]).unwrap();
        assert_eq!(
            read_back,
            PerChannel::Many(vec![
                Reading::Float(7.7),
                Reading::Float(8.8),
                Reading::Float(9.0)
            ])
        );

        let ranges = hv.set_current_range(1u8, 1.0).unwrap();
        assert_eq!(ranges, PerChannel::Single(Reading::Int(1)));
        hv.set_powerdown([3u8, 4], [0.0, 1.0]).unwrap();
        assert_eq!(
            hv.get_powerdown([3u8, 4]).unwrap(),
            PerChannel::Many(vec![Reading::Int(0), Reading::Int(1)])
        );
        hv.set_rampup([3u8, 4, 5], 45.0).unwrap();
        hv.set_rampdown(3u8, 57.0).unwrap();
        hv.set_overcurrent(5u8, 34.35).unwrap();
        assert_eq!(
            hv.get_overcurrent(5u8).unwrap(),
            PerChannel::Single(Reading::Float(34.35))
        );
    }

    #[test]
    fn faulted_channel_blocks_turn_on() {
        let mut controller = MockController::r8033dm();
        controller.script_status(3, &[0x48]);
        let mut hv = open(controller);

        let result = hv.turn_on([3u8]);
        assert!(matches!(
            result,
            Err(Error::ChannelFault {
                fault: Fault::OverCurrent,
                ..
            })
        ));
        assert_eq!(
            hv.get_channel_state(3u8).unwrap(),
            PerChannel::Single(ChannelState::Fault(Fault::OverCurrent))
        );
        let controller = hv.close().unwrap();
        assert!(controller.writes_to("Pw").is_empty());
        assert_eq!(controller.requests.last(), Some(&Request::Deinit));
    }

    #[test]
    fn power_cycle() {
        let mut controller = MockController::r8033dm();
        controller.script_status(0, &[0, 3, 1, 1, 5, 0]);
        let mut hv = open(controller);

        hv.turn_on(0u8).unwrap();
        assert_eq!(
            hv.get_channel_state(0u8).unwrap(),
            PerChannel::Single(ChannelState::On)
        );
        hv.turn_off(0u8).unwrap();
        assert_eq!(
            hv.get_channel_state(0u8).unwrap(),
            PerChannel::Single(ChannelState::Off)
        );
    }

    #[test]
    fn board_readings() {
        let mut controller = MockController::r8033dm();
        controller.set_board_value("BdCtr", 1.0);
        let mut hv = open(controller);

        assert_eq!(hv.get_board_status().unwrap(), Reading::Int(0));
        assert_eq!(hv.get_board_interlock().unwrap(), Some("Ok".to_owned()));
        // Local is reported but does not block.
        assert_eq!(hv.get_board_control().unwrap(), Some("Local".to_owned()));
    }

    #[test]
    fn connect_over_a_byte_link() {
        let mut link = MockLink::new();
        link.queue_read_data(&Reply::ok(Payload::Empty).to_frame(OpCode::Init))
            .unwrap();
        // The board name list fails, so opening stops after Init.
        link.queue_read_data(&Reply::failed(0x1).to_frame(OpCode::BoardParamInfo))
            .unwrap();

        let result: Result<R8033dm<Session<MockLink>>, _> =
            R8033dm::connect(link, &HvConfig::new("10.0.0.2"));
        assert!(matches!(result, Err(Error::Schema(_))));
    }
}
