//! builders shared by the engine and feature tests: synthetic trips with
//! configurable realtime coverage.

use std::str::FromStr;

use chrono::NaiveDateTime;

use raildelay_core::clock::{ExtendedTime, ServiceDay};
use raildelay_core::model::{
    keys, RealtimePassage, Route, ScheduleRow, StopTimeRecord, Trip,
};

use crate::join::JoinedResult;

pub const TEST_DAY: &str = "20170202";

pub fn test_day() -> ServiceDay {
    ServiceDay::from_str(TEST_DAY).unwrap()
}

/// an instant on the test day
pub fn at(time: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(&format!("{TEST_DAY}T{time}"), "%Y%m%dT%H:%M:%S").unwrap()
}

pub fn time_from_minutes(minutes: u32) -> ExtendedTime {
    ExtendedTime::new(minutes / 60, minutes % 60, 0).unwrap()
}

fn time_from_seconds(seconds: i64) -> ExtendedTime {
    let seconds = seconds as u32;
    ExtendedTime::new(seconds / 3600, (seconds % 3600) / 60, seconds % 60).unwrap()
}

/// shape of one synthetic trip. stations are derived from the trip's
/// sixth-to-eleventh trip id characters so two trips never share stops.
pub struct TripSpec {
    pub trip_id: &'static str,
    pub line: &'static str,
    /// minutes from midnight of the first stop's departure
    pub first_departure_minute: u32,
    pub minutes_between_stops: u32,
    pub stops: u32,
    /// highest stop sequence carrying a realtime passage, if any
    pub realtime_through: Option<u32>,
    /// realtime expected = schedule + this many seconds
    pub realtime_delay_secs: i64,
}

/// joined rows for one trip, in stop-sequence order
pub fn joined_trip(spec: TripSpec) -> Vec<JoinedResult> {
    let day = test_day();
    let train_num = keys::train_num_of_trip(spec.trip_id).unwrap();
    let station_prefix = &train_num[..5];

    (0..spec.stops)
        .map(|sequence| {
            let station_id = format!("{station_prefix}{sequence:02}");
            let departure = time_from_minutes(
                spec.first_departure_minute + sequence * spec.minutes_between_stops,
            );
            let stop_time = StopTimeRecord {
                trip_id: spec.trip_id.to_string(),
                stop_id: format!("StopPoint:DUA{station_id}"),
                arrival_time: departure,
                departure_time: departure,
                stop_sequence: sequence,
                stop_headsign: None,
                pickup_type: None,
                drop_off_type: None,
            };
            let schedule = ScheduleRow {
                stop_time,
                trip: Some(Trip {
                    trip_id: spec.trip_id.to_string(),
                    route_id: format!("R-{}", spec.line),
                    service_id: "S1".to_string(),
                    trip_headsign: None,
                    direction_id: Some("0".to_string()),
                    block_id: None,
                }),
                stop: None,
                route: Some(Route {
                    route_id: format!("R-{}", spec.line),
                    agency_id: None,
                    route_short_name: Some(spec.line.to_string()),
                    route_long_name: None,
                    route_type: None,
                    route_color: None,
                    route_text_color: None,
                }),
                calendar: None,
            };

            let realtime = match spec.realtime_through {
                Some(through) if sequence <= through => {
                    let expected = time_from_seconds(
                        departure.total_seconds() as i64 + spec.realtime_delay_secs,
                    );
                    Some(RealtimePassage {
                        station_8d: format!("{station_id}9"),
                        station_id: station_id.clone(),
                        train_num: train_num.clone(),
                        day_train_num: keys::day_train_num(&day, &train_num),
                        expected_passage_day: day,
                        expected_passage_time: expected,
                        request_day: day,
                        request_time: expected,
                        data_freshness: 0,
                        miss: None,
                        term: None,
                        etat: None,
                        scheduled_departure_time: Some(departure),
                    })
                }
                _ => None,
            };

            JoinedResult { schedule, realtime }
        })
        .collect()
}
