use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::clock::{ExtendedTime, ServiceDay};
use crate::model::keys;

/// a transit operator, from agency.txt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agency {
    pub agency_id: String,
    #[serde(default)]
    pub agency_name: Option<String>,
    #[serde(default)]
    pub agency_url: Option<String>,
    #[serde(default)]
    pub agency_timezone: Option<String>,
    #[serde(default)]
    pub agency_lang: Option<String>,
}

/// a line of the network, from routes.txt. `route_short_name` is the
/// rider-facing line letter and the grouping key for line aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub route_id: String,
    #[serde(default)]
    pub agency_id: Option<String>,
    #[serde(default)]
    pub route_short_name: Option<String>,
    #[serde(default)]
    pub route_long_name: Option<String>,
    #[serde(default)]
    pub route_type: Option<String>,
    #[serde(default)]
    pub route_color: Option<String>,
    #[serde(default)]
    pub route_text_color: Option<String>,
}

/// one scheduled run of a train, from trips.txt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub trip_id: String,
    pub route_id: String,
    pub service_id: String,
    #[serde(default)]
    pub trip_headsign: Option<String>,
    #[serde(default)]
    pub direction_id: Option<String>,
    #[serde(default)]
    pub block_id: Option<String>,
}

impl Trip {
    pub fn train_num(&self) -> Option<String> {
        keys::train_num_of_trip(&self.trip_id)
    }
}

/// a boarding location, from stops.txt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stop {
    pub stop_id: String,
    #[serde(default)]
    pub stop_name: Option<String>,
    #[serde(default)]
    pub stop_desc: Option<String>,
    #[serde(default)]
    pub stop_lat: Option<f64>,
    #[serde(default)]
    pub stop_lon: Option<f64>,
    #[serde(default)]
    pub zone_id: Option<String>,
    #[serde(default)]
    pub location_type: Option<String>,
    #[serde(default)]
    pub parent_station: Option<String>,
}

impl Stop {
    pub fn station_id(&self) -> Option<String> {
        keys::station_id_of_stop(&self.stop_id)
    }
}

/// one scheduled stop of a trip, from stop_times.txt. times are on the
/// extended clock; stop_sequence is dense and strictly increasing along
/// a trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopTimeRecord {
    pub trip_id: String,
    pub stop_id: String,
    pub arrival_time: ExtendedTime,
    pub departure_time: ExtendedTime,
    pub stop_sequence: u32,
    #[serde(default)]
    pub stop_headsign: Option<String>,
    #[serde(default)]
    pub pickup_type: Option<String>,
    #[serde(default)]
    pub drop_off_type: Option<String>,
}

impl StopTimeRecord {
    pub fn station_id(&self) -> Option<String> {
        keys::station_id_of_stop(&self.stop_id)
    }

    pub fn train_num(&self) -> Option<String> {
        keys::train_num_of_trip(&self.trip_id)
    }

    /// the (station_id, day_train_num) pair under which a realtime passage
    /// for this stop would be recorded on the given day
    pub fn realtime_key(&self, day: &ServiceDay) -> Option<(String, String)> {
        let station_id = self.station_id()?;
        let train_num = self.train_num()?;
        Some((station_id, keys::day_train_num(day, &train_num)))
    }
}

/// weekday service pattern with a validity window, from calendar.txt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calendar {
    pub service_id: String,
    pub monday: u8,
    pub tuesday: u8,
    pub wednesday: u8,
    pub thursday: u8,
    pub friday: u8,
    pub saturday: u8,
    pub sunday: u8,
    pub start_date: ServiceDay,
    pub end_date: ServiceDay,
}

impl Calendar {
    pub fn runs_on_weekday(&self, weekday: Weekday) -> bool {
        let flag = match weekday {
            Weekday::Mon => self.monday,
            Weekday::Tue => self.tuesday,
            Weekday::Wed => self.wednesday,
            Weekday::Thu => self.thursday,
            Weekday::Fri => self.friday,
            Weekday::Sat => self.saturday,
            Weekday::Sun => self.sunday,
        };
        flag == 1
    }

    /// true when the weekday pattern and validity window both admit the day
    pub fn covers(&self, day: &ServiceDay) -> bool {
        self.runs_on_weekday(day.weekday()) && self.start_date <= *day && *day <= self.end_date
    }
}

/// per-date service override type, from calendar_dates.txt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExceptionKind {
    Added,
    Removed,
}

impl ExceptionKind {
    /// GTFS encodes added as 1 and removed as 2
    pub fn from_gtfs_code(code: &str) -> Option<ExceptionKind> {
        match code.trim() {
            "1" => Some(ExceptionKind::Added),
            "2" => Some(ExceptionKind::Removed),
            _ => None,
        }
    }

    pub fn gtfs_code(&self) -> &'static str {
        match self {
            ExceptionKind::Added => "1",
            ExceptionKind::Removed => "2",
        }
    }
}

/// a one-day service override, from calendar_dates.txt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarException {
    pub service_id: String,
    pub date: ServiceDay,
    pub exception_type: ExceptionKind,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn calendar(thursday: u8, start: &str, end: &str) -> Calendar {
        Calendar {
            service_id: "S".to_string(),
            monday: 0,
            tuesday: 0,
            wednesday: 0,
            thursday,
            friday: 0,
            saturday: 0,
            sunday: 0,
            start_date: ServiceDay::from_str(start).unwrap(),
            end_date: ServiceDay::from_str(end).unwrap(),
        }
    }

    #[test]
    fn test_calendar_covers_matching_thursday() {
        let cal = calendar(1, "20170102", "20170707");
        let day = ServiceDay::from_str("20170202").unwrap();
        assert!(cal.covers(&day));
    }

    #[test]
    fn test_calendar_rejects_day_outside_window() {
        let cal = calendar(1, "20170102", "20170707");
        let day = ServiceDay::from_str("20170713").unwrap(); // a Thursday past end_date
        assert!(!cal.covers(&day));
    }

    #[test]
    fn test_calendar_rejects_wrong_weekday() {
        let cal = calendar(1, "20170102", "20170707");
        let day = ServiceDay::from_str("20170203").unwrap(); // a Friday
        assert!(!cal.covers(&day));
    }

    #[test]
    fn test_exception_kind_codes() {
        assert_eq!(ExceptionKind::from_gtfs_code("1"), Some(ExceptionKind::Added));
        assert_eq!(
            ExceptionKind::from_gtfs_code("2"),
            Some(ExceptionKind::Removed)
        );
        assert_eq!(ExceptionKind::from_gtfs_code("3"), None);
    }

    #[test]
    fn test_stop_time_realtime_key() {
        let st = StopTimeRecord {
            trip_id: "DUASN123456F01001".to_string(),
            stop_id: "StopPoint:DUA8739300".to_string(),
            arrival_time: ExtendedTime::from_str("08:00:00").unwrap(),
            departure_time: ExtendedTime::from_str("08:01:00").unwrap(),
            stop_sequence: 0,
            stop_headsign: None,
            pickup_type: None,
            drop_off_type: None,
        };
        let day = ServiceDay::from_str("20170202").unwrap();
        let (station, dtn) = st.realtime_key(&day).unwrap();
        assert_eq!(station, "8739300");
        assert_eq!(dtn, "20170202_123456");
    }
}
