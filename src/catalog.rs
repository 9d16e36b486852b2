//! Runtime discovery of the board and channel parameter schema.
//!
//! Discovery runs in two phases. First the name list is fetched as one buffer of 10 byte name
//! slots. The firmware gives no reliable count, so the list ends at the first slot which does not
//! decode to an alphanumeric name. Then every name is queried for its `Type` and `Mode`, followed
//! by `Minval`/`Maxval`/`Unit`/`Exp` for floats or `Onstate`/`Offstate` for on/off parameters.
//!
//! Any failure aborts discovery. A [`Catalog`] is only ever handed out complete, and it is never
//! patched afterwards: rediscovery builds a new one.

use std::collections::BTreeMap;

use log::{debug, info, warn};

use crate::{
    channel::{Channel, MAX_CHANNELS},
    error::{AccessViolation, Error, Result, SchemaError},
    protocol::{decode_name_slot, Payload, Property, Request, NAME_SLOT_LEN},
    session::Transport,
    types::{AccessMode, ParamKind, Scope},
    units::{NumericProps, Unit},
};

/// Firmware labels of the two states of an on/off parameter, e.g. `Tripped`/`Ok` for `BdIlk`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLabels {
    pub on: String,
    pub off: String,
}

impl StateLabels {
    /// Label for a raw register value. Any non-zero value is the on state.
    pub fn label(&self, value: u32) -> &str {
        if value != 0 { &self.on } else { &self.off }
    }
}

/// Everything discovered about one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDescriptor {
    pub name: String,
    pub kind: ParamKind,
    pub mode: AccessMode,
    /// Present exactly when `kind` is [`ParamKind::Float`].
    pub numeric: Option<NumericProps>,
    /// Present exactly when `kind` is [`ParamKind::OnOff`].
    pub states: Option<StateLabels>,
}

/// The discovered parameter schema of one board.
///
/// Channel parameters are discovered from channel 0 and assumed identical on every channel.
#[derive(Debug, Clone)]
pub struct Catalog {
    board: BTreeMap<String, ParameterDescriptor>,
    channel: BTreeMap<String, ParameterDescriptor>,
    channel_count: u8,
}

impl Catalog {
    /// Discover the board and channel schema of the board in `slot`.
    pub fn discover<T: Transport>(
        transport: &mut T,
        slot: u16,
        channel_count: u8,
    ) -> Result<Self, T::Error> {
        if channel_count > MAX_CHANNELS {
            warn!("Channel count {channel_count} clamped to {MAX_CHANNELS}");
        }
        let board = discover_scope(transport, Scope::Board, slot)?;
        let channel = discover_scope(transport, Scope::Channel, slot)?;
        info!(
            "Discovered {} board and {} channel parameters",
            board.len(),
            channel.len()
        );
        Ok(Self {
            board,
            channel,
            channel_count: channel_count.min(MAX_CHANNELS),
        })
    }

    /// Look a parameter up by name.
    pub fn lookup(
        &self,
        scope: Scope,
        name: &str,
    ) -> core::result::Result<&ParameterDescriptor, AccessViolation> {
        self.scope(scope)
            .get(name)
            .ok_or_else(|| AccessViolation::Undiscovered {
                scope,
                param: name.to_owned(),
            })
    }

    /// All parameters of a scope, ordered by name.
    pub fn params(&self, scope: Scope) -> impl Iterator<Item = &ParameterDescriptor> {
        self.scope(scope).values()
    }

    pub fn channel_count(&self) -> u8 {
        self.channel_count
    }

    pub fn has_channel(&self, channel: Channel) -> bool {
        channel.index() < self.channel_count
    }

    fn scope(&self, scope: Scope) -> &BTreeMap<String, ParameterDescriptor> {
        match scope {
            Scope::Board => &self.board,
            Scope::Channel => &self.channel,
        }
    }
}

/// Walk a name list buffer slot by slot, stopping at the first slot which is not an alphanumeric
/// name.
pub fn scan_name_slots(buf: &[u8]) -> Vec<String> {
    buf.chunks(NAME_SLOT_LEN)
        .map_while(|slot| {
            decode_name_slot(slot)
                .filter(|name| !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric()))
        })
        .map(str::to_owned)
        .collect()
}

fn discover_scope<T: Transport>(
    transport: &mut T,
    scope: Scope,
    slot: u16,
) -> Result<BTreeMap<String, ParameterDescriptor>, T::Error> {
    let request = match scope {
        Scope::Board => Request::BoardParamInfo { slot },
        Scope::Channel => Request::ChannelParamInfo { slot, channel: 0 },
    };
    let reply = transport.call(&request)?;
    if !reply.code.is_ok() {
        return Err(SchemaError::NameList {
            scope,
            code: reply.code,
        }
        .into());
    }
    let Payload::Bytes(buf) = reply.payload else {
        return Err(Error::InvalidResponse);
    };

    let mut params = BTreeMap::new();
    for name in scan_name_slots(&buf) {
        if params.contains_key(&name) {
            continue;
        }
        let descriptor = Query {
            transport: &mut *transport,
            scope,
            slot,
            param: &name,
        }
        .describe()?;
        debug!(
            "{scope} parameter {name}: {:?} {:?}",
            descriptor.kind, descriptor.mode
        );
        params.insert(name, descriptor);
    }
    Ok(params)
}

/// Property queries for one parameter.
struct Query<'a, T: Transport> {
    transport: &'a mut T,
    scope: Scope,
    slot: u16,
    param: &'a str,
}

impl<T: Transport> Query<'_, T> {
    fn describe(mut self) -> Result<ParameterDescriptor, T::Error> {
        // The type decides which properties exist, so it has to come first.
        let code = self.uint(Property::Type)?;
        let kind = ParamKind::try_from(code).map_err(|_| SchemaError::UnknownType {
            scope: self.scope,
            param: self.param.to_owned(),
            code,
        })?;
        let code = self.uint(Property::Mode)?;
        let mode = AccessMode::try_from(code).map_err(|_| SchemaError::UnknownMode {
            scope: self.scope,
            param: self.param.to_owned(),
            code,
        })?;

        let numeric = match kind {
            ParamKind::Float => Some(self.numeric()?),
            _ => None,
        };
        let states = match kind {
            ParamKind::OnOff => Some(StateLabels {
                on: self.text(Property::Onstate)?,
                off: self.text(Property::Offstate)?,
            }),
            _ => None,
        };

        Ok(ParameterDescriptor {
            name: self.param.to_owned(),
            kind,
            mode,
            numeric,
            states,
        })
    }

    fn numeric(&mut self) -> Result<NumericProps, T::Error> {
        let min = self.float(Property::Minval)?;
        let max = self.float(Property::Maxval)?;
        let code = self.uint(Property::Unit)?;
        let unit = Unit::try_from(code).map_err(|_| SchemaError::UnknownUnit {
            scope: self.scope,
            param: self.param.to_owned(),
            code,
        })?;
        let exponent = match self.fetch(Property::Exp)? {
            Payload::Int(exp) => i8::try_from(exp).ok(),
            Payload::UInt(exp) => i8::try_from(exp).ok(),
            _ => None,
        }
        .ok_or_else(|| self.unexpected(Property::Exp))?;
        Ok(NumericProps {
            min,
            max,
            unit,
            exponent,
        })
    }

    fn fetch(&mut self, property: Property) -> Result<Payload, T::Error> {
        let param = self.param.to_owned();
        let request = match self.scope {
            Scope::Board => Request::BoardParamProp {
                slot: self.slot,
                param,
                property,
            },
            Scope::Channel => Request::ChannelParamProp {
                slot: self.slot,
                channel: 0,
                param,
                property,
            },
        };
        let reply = self.transport.call(&request)?;
        if !reply.code.is_ok() {
            return Err(SchemaError::Query {
                scope: self.scope,
                param: self.param.to_owned(),
                property,
                code: reply.code,
            }
            .into());
        }
        Ok(reply.payload)
    }

    fn uint(&mut self, property: Property) -> Result<u32, T::Error> {
        match self.fetch(property)? {
            Payload::UInt(value) => Ok(value),
            _ => Err(self.unexpected(property).into()),
        }
    }

    fn float(&mut self, property: Property) -> Result<f32, T::Error> {
        match self.fetch(property)? {
            Payload::Float(value) => Ok(value),
            _ => Err(self.unexpected(property).into()),
        }
    }

    fn text(&mut self, property: Property) -> Result<String, T::Error> {
        match self.fetch(property)? {
            Payload::Text(value) => Ok(value),
            _ => Err(self.unexpected(property).into()),
        }
    }

    fn unexpected(&self, property: Property) -> SchemaError {
        SchemaError::UnexpectedPayload {
            scope: self.scope,
            param: self.param.to_owned(),
            property,
        }
    }
}
