use std::fmt::Display;
use std::str::FromStr;

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::clock::SERVICE_DAY_FORMAT;
use crate::error::ClockError;

/// a calendar day of network service, always rendered as yyyymmdd.
///
/// trips running past midnight still belong to the service day on which
/// they started; see [`crate::clock::ops::wall_to_extended`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceDay(NaiveDate);

impl ServiceDay {
    pub fn new(date: NaiveDate) -> ServiceDay {
        ServiceDay(date)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    pub fn weekday(&self) -> Weekday {
        self.0.weekday()
    }

    /// Monday through Friday. public holidays are not modeled.
    pub fn is_business_day(&self) -> bool {
        !matches!(self.0.weekday(), Weekday::Sat | Weekday::Sun)
    }

    pub fn previous(&self) -> Result<ServiceDay, ClockError> {
        self.0
            .checked_sub_days(Days::new(1))
            .map(ServiceDay)
            .ok_or_else(|| ClockError::InvalidServiceDay(format!("{self} - 1 day")))
    }

    pub fn next(&self) -> Result<ServiceDay, ClockError> {
        self.0
            .checked_add_days(Days::new(1))
            .map(ServiceDay)
            .ok_or_else(|| ClockError::InvalidServiceDay(format!("{self} + 1 day")))
    }
}

impl FromStr for ServiceDay {
    type Err = ClockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s, SERVICE_DAY_FORMAT)
            .map(ServiceDay)
            .map_err(|_| ClockError::InvalidServiceDay(s.to_string()))
    }
}

impl Display for ServiceDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format(SERVICE_DAY_FORMAT))
    }
}

impl Serialize for ServiceDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ServiceDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ServiceDay::from_str(&s).map_err(de::Error::custom)
    }
}
