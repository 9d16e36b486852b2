//! Bench configuration loaded from TOML.
//!
//! ```toml
//! [hv]
//! address = "192.168.0.250"
//! channel_count = 16
//! quantum_ms = 1000
//! ramp_timeout_s = 1800
//!
//! [thresholds]
//! leakage_current = { min = 0.0, max = 0.5 }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use fugit::MillisDurationU32;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{channel::MAX_CHANNELS, sequencer::SequencerConfig};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Everything a bench run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchConfig {
    pub hv: HvConfig,
    /// Pass/fail windows by measurement name.
    #[serde(default)]
    pub thresholds: BTreeMap<String, Threshold>,
}

impl BenchConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// The threshold for a measurement, if one is configured.
    pub fn threshold(&self, name: &str) -> Option<&Threshold> {
        self.thresholds.get(name)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.hv.validate()?;
        for (name, threshold) in &self.thresholds {
            if threshold.min > threshold.max {
                return Err(ConfigError::Invalid(format!(
                    "threshold {name} has min {} above max {}",
                    threshold.min, threshold.max
                )));
            }
        }
        Ok(())
    }
}

/// Connection and sequencing settings of the HV controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HvConfig {
    pub address: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub slot: u16,
    #[serde(default = "default_channel_count")]
    pub channel_count: u8,
    /// Settle delay and ramp poll period.
    #[serde(default = "default_quantum_ms")]
    pub quantum_ms: u32,
    /// Longest ramp to wait for. Zero waits forever.
    #[serde(default = "default_ramp_timeout_s")]
    pub ramp_timeout_s: u32,
    /// Decimals compared when verifying a write.
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

fn default_channel_count() -> u8 {
    MAX_CHANNELS
}

fn default_quantum_ms() -> u32 {
    1000
}

fn default_ramp_timeout_s() -> u32 {
    1800
}

fn default_decimals() -> u8 {
    2
}

impl HvConfig {
    /// Settings for a controller at `address` with every default.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            username: String::new(),
            password: String::new(),
            slot: 0,
            channel_count: default_channel_count(),
            quantum_ms: default_quantum_ms(),
            ramp_timeout_s: default_ramp_timeout_s(),
            decimals: default_decimals(),
        }
    }

    pub fn sequencer(&self) -> SequencerConfig {
        SequencerConfig {
            quantum: MillisDurationU32::millis(self.quantum_ms),
            ramp_timeout: match self.ramp_timeout_s {
                0 => None,
                secs => Some(MillisDurationU32::millis(secs.saturating_mul(1000))),
            },
            decimals: self.decimals,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_count == 0 || self.channel_count > MAX_CHANNELS {
            return Err(ConfigError::Invalid(format!(
                "channel_count must be between 1 and {MAX_CHANNELS}, got {}",
                self.channel_count
            )));
        }
        if self.quantum_ms == 0 {
            return Err(ConfigError::Invalid("quantum_ms must be positive".into()));
        }
        Ok(())
    }
}

/// Outcome of comparing a measurement with its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    Pass,
    Fail,
}

/// Inclusive pass window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub min: f64,
    pub max: f64,
}

impl Threshold {
    pub fn grade(&self, value: f64) -> Grade {
        if value >= self.min && value <= self.max {
            Grade::Pass
        } else {
            Grade::Fail
        }
    }
}
