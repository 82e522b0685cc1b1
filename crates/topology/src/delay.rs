//! Propagation delay values
//!
//! Delays are written the way `tc` reads them: a decimal number followed by
//! a unit (`5ms`, `250us`, `1.5ms`, `1s`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DelayError {
    #[error("Empty delay")]
    Empty,

    #[error("Delay '{0}' has no unit (expected us, ms or s)")]
    MissingUnit(String),

    #[error("Delay '{0}' has an unknown unit (expected us, ms or s)")]
    UnknownUnit(String),

    #[error("Delay '{0}' is not a valid non-negative number")]
    InvalidNumber(String),
}

/// One-way propagation delay with microsecond precision
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Delay(Duration);

impl Delay {
    pub const ZERO: Delay = Delay(Duration::ZERO);

    pub fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }

    pub fn from_micros(us: u64) -> Self {
        Self(Duration::from_micros(us))
    }

    pub fn as_micros(&self) -> u64 {
        self.0.as_micros() as u64
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl From<Duration> for Delay {
    fn from(d: Duration) -> Self {
        // Sub-microsecond precision is not representable in tc arguments
        Self(Duration::from_micros(d.as_micros() as u64))
    }
}

impl FromStr for Delay {
    type Err = DelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DelayError::Empty);
        }

        let split = s
            .find(|c: char| c.is_ascii_alphabetic())
            .ok_or_else(|| DelayError::MissingUnit(s.to_string()))?;
        let (number, unit) = s.split_at(split);

        let scale_us = match unit {
            "us" => 1.0,
            "ms" => 1_000.0,
            "s" => 1_000_000.0,
            _ => return Err(DelayError::UnknownUnit(s.to_string())),
        };

        let value: f64 = number
            .trim()
            .parse()
            .map_err(|_| DelayError::InvalidNumber(s.to_string()))?;
        if !value.is_finite() || value < 0.0 {
            return Err(DelayError::InvalidNumber(s.to_string()));
        }

        Ok(Self::from_micros((value * scale_us).round() as u64))
    }
}

impl fmt::Display for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let us = self.as_micros();
        if us % 1_000 == 0 {
            write!(f, "{}ms", us / 1_000)
        } else {
            write!(f, "{}us", us)
        }
    }
}

impl TryFrom<String> for Delay {
    type Error = DelayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Delay> for String {
    fn from(delay: Delay) -> Self {
        delay.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!("5ms".parse::<Delay>().unwrap(), Delay::from_millis(5));
        assert_eq!("250us".parse::<Delay>().unwrap(), Delay::from_micros(250));
        assert_eq!("1s".parse::<Delay>().unwrap(), Delay::from_millis(1000));
        assert_eq!("1.5ms".parse::<Delay>().unwrap(), Delay::from_micros(1500));
        assert_eq!(" 60ms ".parse::<Delay>().unwrap(), Delay::from_millis(60));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!("".parse::<Delay>(), Err(DelayError::Empty));
        assert!(matches!("5".parse::<Delay>(), Err(DelayError::MissingUnit(_))));
        assert!(matches!("5min".parse::<Delay>(), Err(DelayError::UnknownUnit(_))));
        assert!(matches!("ms".parse::<Delay>(), Err(DelayError::InvalidNumber(_))));
        assert!(matches!("-5ms".parse::<Delay>(), Err(DelayError::InvalidNumber(_))));
    }

    #[test]
    fn test_display() {
        assert_eq!(Delay::from_millis(5).to_string(), "5ms");
        assert_eq!(Delay::from_micros(1500).to_string(), "1500us");
        assert_eq!(Delay::ZERO.to_string(), "0ms");
        assert_eq!("1s".parse::<Delay>().unwrap().to_string(), "1000ms");
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&Delay::from_millis(10)).unwrap();
        assert_eq!(json, "\"10ms\"");

        let back: Delay = serde_json::from_str("\"60ms\"").unwrap();
        assert_eq!(back, Delay::from_millis(60));

        assert!(serde_json::from_str::<Delay>("\"sixty\"").is_err());
    }
}
