//! Channel addressing.
//!
//! The R8033DM exposes 8 bipolar outputs as 16 logical channels: 0-7 are the positive polarity
//! side and 8-15 the negative polarity side of the same connectors. Every operation accepts
//! either one channel or an ordered list, and answers in the same shape.

use core::fmt;
use core::ops::Range;

/// Logical channel count of the board family.
pub const MAX_CHANNELS: u8 = 16;
/// Physical bipolar connectors.
pub const CONNECTORS: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Polarity {
    Positive,
    Negative,
}

/// A logical channel index. Validity against the board is checked when it is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Channel(u8);

impl Channel {
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    pub const fn index(&self) -> u8 {
        self.0
    }

    pub const fn polarity(&self) -> Polarity {
        if self.0 < CONNECTORS {
            Polarity::Positive
        } else {
            Polarity::Negative
        }
    }

    /// The physical connector this logical channel is wired to.
    pub const fn connector(&self) -> u8 {
        self.0 % CONNECTORS
    }
}

impl From<u8> for Channel {
    fn from(index: u8) -> Self {
        Self(index)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One channel or an ordered list of channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channels {
    Single(Channel),
    Many(Vec<Channel>),
}

impl Channels {
    /// All channels in request order.
    pub fn as_slice(&self) -> &[Channel] {
        match self {
            Channels::Single(channel) => core::slice::from_ref(channel),
            Channels::Many(channels) => channels,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// Pack per channel results back into the shape of this request.
    pub fn shape<T>(&self, mut results: Vec<T>) -> PerChannel<T> {
        match self {
            Channels::Single(_) if results.len() == 1 => match results.pop() {
                Some(result) => PerChannel::Single(result),
                None => PerChannel::Many(results),
            },
            _ => PerChannel::Many(results),
        }
    }
}

impl From<u8> for Channels {
    fn from(index: u8) -> Self {
        Channels::Single(Channel(index))
    }
}

impl From<Channel> for Channels {
    fn from(channel: Channel) -> Self {
        Channels::Single(channel)
    }
}

impl From<Vec<u8>> for Channels {
    fn from(indices: Vec<u8>) -> Self {
        Channels::Many(indices.into_iter().map(Channel).collect())
    }
}

impl From<&[u8]> for Channels {
    fn from(indices: &[u8]) -> Self {
        Channels::Many(indices.iter().copied().map(Channel).collect())
    }
}

impl<const N: usize> From<[u8; N]> for Channels {
    fn from(indices: [u8; N]) -> Self {
        Channels::Many(indices.into_iter().map(Channel).collect())
    }
}

impl From<Range<u8>> for Channels {
    fn from(range: Range<u8>) -> Self {
        Channels::Many(range.map(Channel).collect())
    }
}

impl fmt::Display for Channels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channels::Single(channel) => write!(f, "{channel}"),
            Channels::Many(channels) => {
                f.write_str("[")?;
                for (i, channel) in channels.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{channel}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// A result for each requested channel, in the shape of the request.
#[derive(Debug, Clone, PartialEq)]
pub enum PerChannel<T> {
    Single(T),
    Many(Vec<T>),
}

impl<T> PerChannel<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            PerChannel::Single(value) => vec![value],
            PerChannel::Many(values) => values,
        }
    }

    pub fn as_slice(&self) -> &[T] {
        match self {
            PerChannel::Single(value) => core::slice::from_ref(value),
            PerChannel::Many(values) => values,
        }
    }

    /// The scalar answer of a single channel request.
    pub fn single(self) -> Option<T> {
        match self {
            PerChannel::Single(value) => Some(value),
            PerChannel::Many(_) => None,
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> PerChannel<U> {
        match self {
            PerChannel::Single(value) => PerChannel::Single(f(value)),
            PerChannel::Many(values) => PerChannel::Many(values.into_iter().map(f).collect()),
        }
    }
}

/// A value to write or compare: the same value for every channel, or one value per channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Values<T> {
    Scalar(T),
    List(Vec<T>),
}

impl<T: Copy> Values<T> {
    /// Pair each channel with its value. A scalar is broadcast; a list must match positionally.
    pub fn zip(&self, channels: &Channels) -> Result<Vec<(Channel, T)>, (usize, usize)> {
        match (self, channels) {
            (Values::Scalar(value), _) => {
                Ok(channels.as_slice().iter().map(|ch| (*ch, *value)).collect())
            }
            (Values::List(values), Channels::Many(list)) if values.len() == list.len() => {
                Ok(list.iter().copied().zip(values.iter().copied()).collect())
            }
            (Values::List(values), _) => Err((channels.len(), values.len())),
        }
    }
}

impl From<f64> for Values<f64> {
    fn from(value: f64) -> Self {
        Values::Scalar(value)
    }
}

impl From<i32> for Values<f64> {
    fn from(value: i32) -> Self {
        Values::Scalar(value as f64)
    }
}

impl From<Vec<f64>> for Values<f64> {
    fn from(values: Vec<f64>) -> Self {
        Values::List(values)
    }
}

impl<const N: usize> From<[f64; N]> for Values<f64> {
    fn from(values: [f64; N]) -> Self {
        Values::List(values.to_vec())
    }
}

impl<const N: usize> From<[i32; N]> for Values<f64> {
    fn from(values: [i32; N]) -> Self {
        Values::List(values.iter().map(|v| *v as f64).collect())
    }
}

impl fmt::Display for Values<f64> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Values::Scalar(value) => write!(f, "{value}"),
            Values::List(values) => write!(f, "{values:?}"),
        }
    }
}
