//! This crate provides an interface for controlling the CAEN R8033DM high-voltage power supply.
//!
//! The R8033DM has 8 bipolar outputs, exposed as 16 logical channels. Every parameter is
//! discovered from the controller at startup, along with its type, access mode, range and
//! unit, so nothing about the parameter set is hard coded except the names this crate drives.
//!
//! Safety comes first:
//! * The board interlock and board status are checked before any channel is touched.
//! * Every write is read back and verified.
//! * A channel is never powered while it reports a fault, and its status is polled until a
//!   ramp has settled.
//!
//! Start with [`hv::R8033dm`]. Settings for a bench run can be loaded with
//! [`config::BenchConfig`].

pub mod accessor;
pub mod catalog;
pub mod channel;
pub mod config;
pub mod error;
pub mod guard;
pub mod hv;
pub mod monitor;
pub mod params;
pub mod protocol;
pub mod sequencer;
pub mod session;
pub mod setup;
pub mod types;
pub mod units;

#[cfg(test)]
mod mock_controller;
#[cfg(test)]
mod mock_link;
