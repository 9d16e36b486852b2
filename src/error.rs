//! Our error types for the R8033DM high-voltage controller.
//!
//! Every variant is fatal at the point it is detected. The driver never retries on its own; the
//! caller decides whether to stop the run.

use thiserror::Error;

use crate::{
    channel::Channel,
    protocol::{Property, ReturnCode},
    types::{Fault, Reading, Scope},
};

pub type Result<T, I> = core::result::Result<T, Error<I>>;

/// Custom error type for R8033DM communications and power sequencing.
#[derive(Error, Debug)]
pub enum Error<I: embedded_io::Error> {
    #[error("Transport communication error")]
    Transport(I),
    #[error("Invalid response received")]
    InvalidResponse,
    #[error("Frame does not fit in the request buffer")]
    BufferError,
    #[error("Name `{0}` does not fit in a 10 byte parameter slot")]
    NameTooLong(String),
    #[error("Could not initialise the HV system, return code {0}")]
    Connection(ReturnCode),
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("Access violation: {0}")]
    Access(#[from] AccessViolation),
    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupViolation),
    #[error(
        "Wrote {expected} to {param} on channel {channel}, read back {read} (channel status {status})"
    )]
    WriteVerification {
        channel: Channel,
        param: String,
        expected: f64,
        read: Reading,
        status: Reading,
    },
    #[error("Writing {value} to {param} ({scope}) was rejected with return code {code}")]
    WriteRejected {
        scope: Scope,
        param: String,
        value: f64,
        code: ReturnCode,
    },
    #[error("Channel {channel} reports {fault} (status {status:#06x})")]
    ChannelFault {
        channel: Channel,
        fault: Fault,
        status: u32,
    },
    #[error("Channel {channel} status could not be read, return code {code}")]
    StatusUnreadable { channel: Channel, code: ReturnCode },
    #[error("Channel {channel} did not finish ramping within {timeout_ms} ms (last status {status:#06x})")]
    RampTimeout {
        channel: Channel,
        timeout_ms: u32,
        status: u32,
    },
    #[error("Waiting for channel {channel} to ramp was cancelled")]
    Cancelled { channel: Channel },
    #[error("Value {value} for {param} is outside the range [{min}, {max}]")]
    OutOfRange {
        param: String,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("Channel {0} is not available on this board")]
    InvalidChannel(Channel),
    #[error("Expected {expected} values to match the channel list, got {got}")]
    ShapeMismatch { expected: usize, got: usize },
}

/// Problems found while discovering the parameter schema. An incomplete catalog is never used.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Listing {scope} parameters failed with return code {code}")]
    NameList { scope: Scope, code: ReturnCode },
    #[error("Querying {property} of {scope} parameter {param} failed with return code {code}")]
    Query {
        scope: Scope,
        param: String,
        property: Property,
        code: ReturnCode,
    },
    #[error("{property} of {scope} parameter {param} came back with an unexpected payload")]
    UnexpectedPayload {
        scope: Scope,
        param: String,
        property: Property,
    },
    #[error("{scope} parameter {param} has unknown type code {code}")]
    UnknownType { scope: Scope, param: String, code: u32 },
    #[error("{scope} parameter {param} has unknown access mode code {code}")]
    UnknownMode { scope: Scope, param: String, code: u32 },
    #[error("{scope} parameter {param} has unknown unit code {code}")]
    UnknownUnit { scope: Scope, param: String, code: u32 },
}

/// Misuse of the parameter catalog, caught before any wire call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessViolation {
    #[error("{scope} parameter {param} was never discovered")]
    Undiscovered { scope: Scope, param: String },
    #[error("{scope} parameter {param} is write-only")]
    WriteOnly { scope: Scope, param: String },
    #[error("{scope} parameter {param} is read-only")]
    ReadOnly { scope: Scope, param: String },
    #[error("{scope} parameter {param} is not an on/off parameter")]
    NotOnOff { scope: Scope, param: String },
}

/// Board level conditions which block every channel operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StartupViolation {
    #[error("board interlock has tripped ({state})")]
    InterlockTripped { state: String },
    #[error("board failed with status {0:#x}")]
    BoardStatus(u32),
    #[error("board parameter {param} could not be read, return code {code}")]
    Unreadable { param: String, code: ReturnCode },
}
