use std::fmt::Display;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ClockError;

/// the highest hour value on the extended clock. schedules use times past
/// 24:00:00 to keep after-midnight stops attached to their service day.
pub const MAX_EXTENDED_HOUR: u32 = 28;

/// a time of day on the GTFS extended clock, in [00:00:00, 28:59:59].
///
/// stored as whole seconds since the start of the service day so that
/// ordering and arithmetic do not need to re-parse the hh:mm:ss form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExtendedTime {
    seconds: u32,
}

impl ExtendedTime {
    pub fn new(hour: u32, minute: u32, second: u32) -> Result<ExtendedTime, ClockError> {
        if hour > MAX_EXTENDED_HOUR || minute > 59 || second > 59 {
            return Err(ClockError::InvalidTime(format!(
                "{hour:02}:{minute:02}:{second:02}"
            )));
        }
        Ok(ExtendedTime {
            seconds: hour * 3600 + minute * 60 + second,
        })
    }

    pub fn hour(&self) -> u32 {
        self.seconds / 3600
    }

    pub fn minute(&self) -> u32 {
        (self.seconds % 3600) / 60
    }

    pub fn second(&self) -> u32 {
        self.seconds % 60
    }

    /// seconds since the start of the service day
    pub fn total_seconds(&self) -> u32 {
        self.seconds
    }

    /// true when this time denotes an after-midnight passage (hour >= 24)
    pub fn rolls_past_midnight(&self) -> bool {
        self.hour() >= 24
    }
}

impl FromStr for ExtendedTime {
    type Err = ClockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let (h, m, sec) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(m), Some(sec), None) => (h, m, sec),
            _ => return Err(ClockError::InvalidTime(s.to_string())),
        };
        let parse = |field: &str| -> Result<u32, ClockError> {
            field
                .parse::<u32>()
                .map_err(|_| ClockError::InvalidTime(s.to_string()))
        };
        ExtendedTime::new(parse(h)?, parse(m)?, parse(sec)?)
    }
}

impl Display for ExtendedTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.hour(),
            self.minute(),
            self.second()
        )
    }
}

impl Serialize for ExtendedTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ExtendedTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ExtendedTime::from_str(&s).map_err(de::Error::custom)
    }
}
