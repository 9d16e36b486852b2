//! Type directed reads and writes of discovered parameters.
//!
//! Every access is checked against the [`Catalog`] before anything goes on the wire: the name must
//! have been discovered, the access mode must allow it and written values must fit the parameter.
//! The parameter kind picks the wire type. Channel lists are handled one wire call per channel, in
//! list order.

use log::{debug, warn};

use crate::{
    catalog::{Catalog, ParameterDescriptor},
    channel::{Channel, Channels, PerChannel, Values},
    error::{AccessViolation, Error, Result},
    protocol::{Payload, Reply, Request, WireValue},
    session::Transport,
    types::{ParamKind, Reading, Scope},
    units::NumericProps,
};

/// Checked parameter access for one board.
pub struct Accessor<T: Transport> {
    transport: T,
    catalog: Catalog,
    slot: u16,
}

impl<T: Transport> Accessor<T> {
    pub fn new(transport: T, catalog: Catalog, slot: u16) -> Self {
        Self {
            transport,
            catalog,
            slot,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn slot(&self) -> u16 {
        self.slot
    }

    /// Raw access to the transport, bypassing every catalog check.
    #[cfg(test)]
    pub(crate) fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Read a board parameter. A non-zero return code gives [`Reading::Error`].
    pub fn get_board(&mut self, param: &str) -> Result<Reading, T::Error> {
        let kind = readable(&self.catalog, Scope::Board, param)?.kind;
        let reply = self.transport.call(&Request::GetBoardParam {
            slot: self.slot,
            param: param.to_owned(),
            wire: kind.wire_type(),
        })?;
        let reading = to_reading::<T::Error>(kind, reply)?;
        if let Reading::Error(code) = reading {
            warn!("Reading board parameter {param} failed with return code {code}");
        } else {
            debug!("Board {param} = {reading}");
        }
        Ok(reading)
    }

    /// Write a board parameter. A non-zero return code is fatal.
    pub fn set_board(&mut self, param: &str, value: f64) -> Result<(), T::Error> {
        let wire = to_wire::<T::Error>(writable(&self.catalog, Scope::Board, param)?, value)?;
        let reply = self.transport.call(&Request::SetBoardParam {
            slot: self.slot,
            param: param.to_owned(),
            value: wire,
        })?;
        if !reply.code.is_ok() {
            return Err(Error::WriteRejected {
                scope: Scope::Board,
                param: param.to_owned(),
                value,
                code: reply.code,
            });
        }
        debug!("Board {param} <- {value}");
        Ok(())
    }

    /// Read a channel parameter on each channel.
    ///
    /// A failed read is reported as [`Reading::Error`] for that channel only.
    pub fn get(
        &mut self,
        channels: &Channels,
        param: &str,
    ) -> Result<PerChannel<Reading>, T::Error> {
        let descriptor = readable(&self.catalog, Scope::Channel, param)?;
        let (kind, numeric) = (descriptor.kind, descriptor.numeric);
        self.check_channels(channels)?;

        let mut readings = Vec::with_capacity(channels.len());
        for channel in channels.as_slice() {
            readings.push(self.read_channel(*channel, param, kind, numeric)?);
        }
        Ok(channels.shape(readings))
    }

    /// Write a channel parameter on each channel.
    ///
    /// A scalar value is written to every channel, a list is paired with the channels by
    /// position. Every value is validated before the first write goes out.
    pub fn set(
        &mut self,
        channels: &Channels,
        param: &str,
        values: &Values<f64>,
    ) -> Result<(), T::Error> {
        let descriptor = writable(&self.catalog, Scope::Channel, param)?;
        let numeric = descriptor.numeric;
        self.check_channels(channels)?;
        let pairs = values
            .zip(channels)
            .map_err(|(expected, got)| Error::ShapeMismatch { expected, got })?;
        let mut writes = Vec::with_capacity(pairs.len());
        for (channel, value) in pairs {
            writes.push((channel, value, to_wire::<T::Error>(descriptor, value)?));
        }

        for (channel, value, wire) in writes {
            let reply = self.transport.call(&Request::SetChannelParam {
                slot: self.slot,
                channel: channel.index() as u16,
                param: param.to_owned(),
                value: wire,
            })?;
            if !reply.code.is_ok() {
                return Err(Error::WriteRejected {
                    scope: Scope::Channel,
                    param: param.to_owned(),
                    value,
                    code: reply.code,
                });
            }
            match numeric {
                Some(props) => debug!("Channel {channel} {param} <- {}", props.display(value, 2)),
                None => debug!("Channel {channel} {param} <- {value}"),
            }
        }
        Ok(())
    }

    fn read_channel(
        &mut self,
        channel: Channel,
        param: &str,
        kind: ParamKind,
        numeric: Option<NumericProps>,
    ) -> Result<Reading, T::Error> {
        let reply = self.transport.call(&Request::GetChannelParam {
            slot: self.slot,
            channel: channel.index() as u16,
            param: param.to_owned(),
            wire: kind.wire_type(),
        })?;
        let reading = to_reading::<T::Error>(kind, reply)?;
        match (reading, numeric) {
            (Reading::Error(code), _) => {
                warn!("Reading {param} on channel {channel} failed with return code {code}")
            }
            (Reading::Float(value), Some(props)) => {
                debug!("Channel {channel} {param} = {}", props.display(value as f64, 2))
            }
            _ => debug!("Channel {channel} {param} = {reading}"),
        }
        Ok(reading)
    }

    fn check_channels(&self, channels: &Channels) -> Result<(), T::Error> {
        match channels
            .as_slice()
            .iter()
            .find(|channel| !self.catalog.has_channel(**channel))
        {
            Some(channel) => Err(Error::InvalidChannel(*channel)),
            None => Ok(()),
        }
    }
}

fn readable<'a>(
    catalog: &'a Catalog,
    scope: Scope,
    param: &str,
) -> core::result::Result<&'a ParameterDescriptor, AccessViolation> {
    let descriptor = catalog.lookup(scope, param)?;
    if !descriptor.mode.readable() {
        return Err(AccessViolation::WriteOnly {
            scope,
            param: param.to_owned(),
        });
    }
    Ok(descriptor)
}

fn writable<'a>(
    catalog: &'a Catalog,
    scope: Scope,
    param: &str,
) -> core::result::Result<&'a ParameterDescriptor, AccessViolation> {
    let descriptor = catalog.lookup(scope, param)?;
    if !descriptor.mode.writable() {
        return Err(AccessViolation::ReadOnly {
            scope,
            param: param.to_owned(),
        });
    }
    Ok(descriptor)
}

/// Validate a value against a parameter and pick its wire representation.
fn to_wire<I: embedded_io::Error>(
    descriptor: &ParameterDescriptor,
    value: f64,
) -> Result<WireValue, I> {
    let out_of_range = |min: f64, max: f64| Error::OutOfRange {
        param: descriptor.name.clone(),
        value,
        min,
        max,
    };
    match (descriptor.kind, descriptor.numeric) {
        (ParamKind::Float, Some(numeric)) => {
            if !numeric.contains(value) {
                return Err(out_of_range(numeric.min as f64, numeric.max as f64));
            }
            Ok(WireValue::Float(value as f32))
        }
        (ParamKind::Float, None) => Err(Error::InvalidResponse),
        (kind, _) => {
            let max = match kind {
                ParamKind::OnOff => 1.0,
                _ => u32::MAX as f64,
            };
            if !(0.0..=max).contains(&value) || value.fract() != 0.0 {
                return Err(out_of_range(0.0, max));
            }
            Ok(WireValue::UInt(value as u32))
        }
    }
}

fn to_reading<I: embedded_io::Error>(kind: ParamKind, reply: Reply) -> Result<Reading, I> {
    if !reply.code.is_ok() {
        return Ok(Reading::Error(reply.code));
    }
    match (kind, reply.payload) {
        (ParamKind::Float, Payload::Float(value)) => Ok(Reading::Float(value)),
        (ParamKind::Float, _) => Err(Error::InvalidResponse),
        (_, Payload::UInt(value)) => Ok(Reading::Int(value)),
        _ => Err(Error::InvalidResponse),
    }
}
