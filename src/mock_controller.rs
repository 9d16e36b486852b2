//! A simulated R8033DM answering requests at the [`Transport`] level.
//!
//! Parameters are described with the same codes the firmware reports. Values are kept per
//! channel, `Status` can be scripted as a sequence of samples, and every request is logged so
//! tests can assert which wire calls were (or were not) made.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::{
    error::Result,
    mock_link::MockLinkError,
    protocol::{NAME_SLOT_LEN, Payload, Property, Reply, Request, WireType, WireValue},
    session::Transport,
};

/// Firmware description of one parameter.
#[derive(Debug, Clone)]
pub struct MockParam {
    pub name: &'static str,
    pub kind: u32,
    pub mode: u32,
    /// Minval, Maxval, Unit, Exp.
    pub numeric: Option<(f32, f32, u32, i32)>,
    /// Onstate, Offstate.
    pub states: Option<(&'static str, &'static str)>,
}

impl MockParam {
    pub fn float(name: &'static str, mode: u32, min: f32, max: f32, unit: u32, exp: i32) -> Self {
        Self {
            name,
            kind: 0,
            mode,
            numeric: Some((min, max, unit, exp)),
            states: None,
        }
    }

    pub fn onoff(name: &'static str, mode: u32, on: &'static str, off: &'static str) -> Self {
        Self {
            name,
            kind: 1,
            mode,
            numeric: None,
            states: Some((on, off)),
        }
    }

    pub fn status(name: &'static str, kind: u32) -> Self {
        Self {
            name,
            kind,
            mode: 0,
            numeric: None,
            states: None,
        }
    }
}

const RO: u32 = 0;
const RW: u32 = 2;

/// Return code used for every simulated failure.
pub const MOCK_FAILURE: i32 = 0x3;

pub struct MockController {
    board: Vec<MockParam>,
    channel: Vec<MockParam>,
    board_values: HashMap<String, f64>,
    channel_values: HashMap<(u16, String), f64>,
    status: HashMap<u16, VecDeque<u32>>,
    failing_gets: HashSet<(u16, String)>,
    failing_board_gets: HashSet<String>,
    failing_props: HashSet<(String, Property)>,
    ignored_writes: HashSet<String>,
    reject_writes: bool,
    pub requests: Vec<Request>,
}

impl MockController {
    /// An empty controller with no parameters.
    pub fn new(board: Vec<MockParam>, channel: Vec<MockParam>) -> Self {
        Self {
            board,
            channel,
            board_values: HashMap::new(),
            channel_values: HashMap::new(),
            status: HashMap::new(),
            failing_gets: HashSet::new(),
            failing_board_gets: HashSet::new(),
            failing_props: HashSet::new(),
            ignored_writes: HashSet::new(),
            reject_writes: false,
            requests: Vec::new(),
        }
    }

    /// The parameter set of an R8033DM, healthy and with every channel off.
    pub fn r8033dm() -> Self {
        let board = vec![
            MockParam::onoff("BdIlk", RO, "Tripped", "Ok"),
            MockParam::status("BdStatus", 3),
            MockParam::onoff("BdCtr", RO, "Local", "Remote"),
        ];
        let channel = vec![
            MockParam::float("VSet", RW, 0.0, 4000.0, 2, 0),
            MockParam::float("VMon", RO, 0.0, 4000.0, 2, 0),
            MockParam::float("ISet", RW, 0.0, 3000.0, 1, -6),
            MockParam::float("IMon", RO, 0.0, 3000.0, 1, -6),
            MockParam::onoff("IMRange", RW, "Low", "High"),
            MockParam::float("Trip", RW, 0.0, 1000.0, 8, 0),
            MockParam::float("RDwn", RW, 1.0, 500.0, 7, 0),
            MockParam::float("RUp", RW, 1.0, 500.0, 7, 0),
            MockParam::onoff("PDwn", RW, "Ramp", "Kill"),
            MockParam::onoff("Pw", RW, "On", "Off"),
            MockParam::status("Status", 2),
        ];
        Self::new(board, channel)
    }

    pub fn set_board_value(&mut self, param: &str, value: f64) {
        self.board_values.insert(param.to_owned(), value);
    }

    pub fn set_channel_value(&mut self, channel: u16, param: &str, value: f64) {
        self.channel_values.insert((channel, param.to_owned()), value);
    }

    pub fn channel_value(&self, channel: u16, param: &str) -> Option<f64> {
        self.channel_values.get(&(channel, param.to_owned())).copied()
    }

    /// Successive `Status` samples for a channel. The last one repeats.
    pub fn script_status(&mut self, channel: u16, samples: &[u32]) {
        self.status.insert(channel, samples.iter().copied().collect());
    }

    pub fn fail_get(&mut self, channel: u16, param: &str) {
        self.failing_gets.insert((channel, param.to_owned()));
    }

    pub fn fail_board_get(&mut self, param: &str) {
        self.failing_board_gets.insert(param.to_owned());
    }

    pub fn fail_property(&mut self, param: &str, property: Property) {
        self.failing_props.insert((param.to_owned(), property));
    }

    /// Accept writes to `param` with a zero return code but keep the old value.
    pub fn ignore_writes(&mut self, param: &str) {
        self.ignored_writes.insert(param.to_owned());
    }

    pub fn reject_writes(&mut self) {
        self.reject_writes = true;
    }

    pub fn param_mut(&mut self, name: &str) -> Option<&mut MockParam> {
        self.board
            .iter_mut()
            .chain(self.channel.iter_mut())
            .find(|p| p.name == name)
    }

    /// Number of channel scoped requests seen.
    pub fn channel_calls(&self) -> usize {
        self.requests
            .iter()
            .filter(|r| {
                matches!(
                    r,
                    Request::GetChannelParam { .. } | Request::SetChannelParam { .. }
                )
            })
            .count()
    }

    /// Channels written with `param`, in order.
    pub fn writes_to(&self, param: &str) -> Vec<u16> {
        self.requests
            .iter()
            .filter_map(|r| match r {
                Request::SetChannelParam {
                    channel, param: p, ..
                } if p == param => Some(*channel),
                _ => None,
            })
            .collect()
    }

    /// Number of `Status` reads of a channel.
    pub fn status_reads(&self, channel: u16) -> usize {
        self.requests
            .iter()
            .filter(|r| {
                matches!(r, Request::GetChannelParam { channel: c, param, .. }
                    if *c == channel && param == "Status")
            })
            .count()
    }

    fn name_list(params: &[MockParam]) -> Payload {
        let mut buf = Vec::new();
        for param in params {
            let mut slot = [0u8; NAME_SLOT_LEN];
            slot[..param.name.len()].copy_from_slice(param.name.as_bytes());
            buf.extend_from_slice(&slot);
        }
        // Firmware leaves whatever follows the last name in the buffer.
        buf.extend_from_slice(&[0x01, 0x02, 0x7F, 0xEE, 0x00, 0x13, 0x37, 0x00, 0x00, 0x42]);
        Payload::Bytes(buf)
    }

    fn property(&self, params: &[MockParam], name: &str, property: Property) -> Reply {
        if self.failing_props.contains(&(name.to_owned(), property)) {
            return Reply::failed(MOCK_FAILURE);
        }
        let Some(param) = params.iter().find(|p| p.name == name) else {
            return Reply::failed(MOCK_FAILURE);
        };
        let payload = match (property, param.numeric, param.states) {
            (Property::Type, _, _) => Payload::UInt(param.kind),
            (Property::Mode, _, _) => Payload::UInt(param.mode),
            (Property::Minval, Some((min, ..)), _) => Payload::Float(min),
            (Property::Maxval, Some((_, max, ..)), _) => Payload::Float(max),
            (Property::Unit, Some((_, _, unit, _)), _) => Payload::UInt(unit),
            (Property::Exp, Some((.., exp)), _) => Payload::Int(exp),
            (Property::Onstate, _, Some((on, _))) => Payload::Text(on.to_owned()),
            (Property::Offstate, _, Some((_, off))) => Payload::Text(off.to_owned()),
            _ => return Reply::failed(MOCK_FAILURE),
        };
        Reply::ok(payload)
    }

    fn encode(value: f64, wire: WireType) -> Payload {
        match wire {
            WireType::Float => Payload::Float(value as f32),
            WireType::UInt => Payload::UInt(value as u32),
        }
    }

    fn decode(value: &WireValue) -> f64 {
        match *value {
            WireValue::Float(v) => v as f64,
            WireValue::UInt(v) => v as f64,
        }
    }

    fn get_channel(&mut self, channel: u16, param: &str, wire: WireType) -> Reply {
        if self.failing_gets.contains(&(channel, param.to_owned())) {
            return Reply::failed(MOCK_FAILURE);
        }
        if param == "Status" {
            if let Some(samples) = self.status.get_mut(&channel) {
                let sample = if samples.len() > 1 {
                    samples.pop_front()
                } else {
                    samples.front().copied()
                };
                if let Some(sample) = sample {
                    return Reply::ok(Payload::UInt(sample));
                }
            }
        }
        let value = self.channel_value(channel, param).unwrap_or_default();
        Reply::ok(Self::encode(value, wire))
    }

    fn set(&mut self, key: Option<u16>, param: &str, value: &WireValue) -> Reply {
        if self.reject_writes {
            return Reply::failed(MOCK_FAILURE);
        }
        if !self.ignored_writes.contains(param) {
            let value = Self::decode(value);
            match key {
                Some(channel) => self.set_channel_value(channel, param, value),
                None => self.set_board_value(param, value),
            }
        }
        Reply::ok(Payload::Empty)
    }
}

impl Transport for MockController {
    type Error = MockLinkError;

    fn call(&mut self, request: &Request) -> Result<Reply, MockLinkError> {
        self.requests.push(request.clone());
        let reply = match request {
            Request::Init { .. } | Request::Deinit => Reply::ok(Payload::Empty),
            Request::BoardParamInfo { .. } => Reply::ok(Self::name_list(&self.board)),
            Request::ChannelParamInfo { .. } => Reply::ok(Self::name_list(&self.channel)),
            Request::BoardParamProp {
                param, property, ..
            } => self.property(&self.board, param, *property),
            Request::ChannelParamProp {
                param, property, ..
            } => self.property(&self.channel, param, *property),
            Request::GetBoardParam { param, .. } if self.failing_board_gets.contains(param) => {
                Reply::failed(MOCK_FAILURE)
            }
            Request::GetBoardParam { param, wire, .. } => {
                let value = self.board_values.get(param).copied().unwrap_or_default();
                Reply::ok(Self::encode(value, *wire))
            }
            Request::SetBoardParam { param, value, .. } => self.set(None, param, value),
            Request::GetChannelParam {
                channel,
                param,
                wire,
                ..
            } => self.get_channel(*channel, param, *wire),
            Request::SetChannelParam {
                channel,
                param,
                value,
                ..
            } => self.set(Some(*channel), param, value),
        };
        Ok(reply)
    }
}

/// Counts pauses instead of sleeping.
#[derive(Debug, Default)]
pub struct CountingPause {
    pub count: usize,
}

impl crate::sequencer::Pause for CountingPause {
    fn pause(&mut self, _duration: fugit::MillisDurationU32) {
        self.count += 1;
    }
}
