//! network state at an instant: per-stop passage flags and delays, trip
//! aggregates, line aggregates over a rolling window, and the predictable
//! set. the instant is always an explicit parameter; nothing in here reads
//! the wall clock.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;

use raildelay_core::clock::{ops, ServiceDay};

use crate::error::EtlError;
use crate::join::JoinedResult;
use crate::state::StopState;

/// window of past seconds considered for line median delays
pub const DEFAULT_MEDIAN_WINDOW_SECS: i64 = 1200;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub median_window_secs: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            median_window_secs: DEFAULT_MEDIAN_WINDOW_SECS,
        }
    }
}

/// the computed state of every scheduled stop of one day at one instant
#[derive(Debug)]
pub struct DaySnapshot {
    pub day: ServiceDay,
    pub at: NaiveDateTime,
    pub rows: Vec<StopState>,
}

impl DaySnapshot {
    /// indices of the stops a prediction should be made for
    pub fn predictable(&self) -> impl Iterator<Item = &StopState> {
        self.rows.iter().filter(|row| row.is_predictable())
    }
}

pub struct TripStateEngine {
    config: EngineConfig,
}

impl TripStateEngine {
    pub fn new(config: EngineConfig) -> TripStateEngine {
        TripStateEngine { config }
    }

    /// computes the day's stop states at the given instant. the passes run
    /// in order: per-stop flags and delays, trip aggregates, line
    /// aggregates, then realtime back-propagation.
    pub fn compute(
        &self,
        joined: &[JoinedResult],
        day: &ServiceDay,
        at: &NaiveDateTime,
    ) -> Result<DaySnapshot, EtlError> {
        let mut rows = Vec::with_capacity(joined.len());
        for result in joined {
            rows.push(initial_stop_state(result, day, at)?);
        }
        trip_level(&mut rows);
        line_level(&mut rows, self.config.median_window_secs);
        back_propagate_passed_realtime(&mut rows);
        log::info!(
            "computed state of {} stops at {at}: {} predictable",
            rows.len(),
            rows.iter().filter(|r| r.is_predictable()).count()
        );
        Ok(DaySnapshot {
            day: *day,
            at: *at,
            rows,
        })
    }
}

/// per-stop pass: schedule and realtime passage flags, observed and
/// expected delays
fn initial_stop_state(
    result: &JoinedResult,
    day: &ServiceDay,
    at: &NaiveDateTime,
) -> Result<StopState, EtlError> {
    let stop_time = &result.schedule.stop_time;
    let passed_schedule = ops::seconds_since_extended(at, day, &stop_time.departure_time)? >= 0;

    let mut row = StopState {
        trip_id: stop_time.trip_id.clone(),
        stop_id: stop_time.stop_id.clone(),
        stop_name: result
            .schedule
            .stop
            .as_ref()
            .and_then(|s| s.stop_name.clone()),
        route_short_name: result.schedule.route_short_name().map(|s| s.to_string()),
        direction_id: result
            .schedule
            .trip
            .as_ref()
            .and_then(|t| t.direction_id.clone()),
        stop_sequence: stop_time.stop_sequence,
        departure_time: stop_time.departure_time,
        business_day: day.is_business_day(),
        has_realtime: false,
        expected_passage_day: None,
        expected_passage_time: None,
        data_freshness: None,
        mission: None,
        passed_schedule,
        time_to_passage: None,
        passed_realtime: None,
        observed_delay: None,
        expected_delay: None,
        total_sequence: 0,
        trip_status: 0.0,
        last_sequence_number: None,
        last_observed_delay: None,
        last_observed_departure_time: None,
        sequence_diff: None,
        stations_scheduled_trip_time: None,
        line_median_delay: None,
        line_station_median_delay: None,
        rolling_trips_on_line: None,
        label: None,
        label_ev: None,
        naive_pred_mae: None,
        naive_pred_mse: None,
    };

    if let Some(realtime) = &result.realtime {
        let diff = ops::seconds_since_extended(
            at,
            &realtime.expected_passage_day,
            &realtime.expected_passage_time,
        )?;
        let passed = diff >= 0;
        let delay = ops::seconds_between_extended(
            &realtime.expected_passage_day,
            &realtime.expected_passage_time,
            day,
            &stop_time.departure_time,
        )?;
        row.has_realtime = true;
        row.expected_passage_day = Some(realtime.expected_passage_day);
        row.expected_passage_time = Some(realtime.expected_passage_time);
        row.data_freshness = Some(realtime.data_freshness);
        row.mission = realtime.miss.clone();
        row.time_to_passage = Some(diff);
        row.passed_realtime = Some(passed);
        if passed {
            row.observed_delay = Some(delay);
        } else {
            row.expected_delay = Some(delay);
        }
    }
    Ok(row)
}

/// trip pass: stop counts, status in [0,1], last observed stop and its
/// delay and scheduled departure, per-row sequence and trip-time distances
fn trip_level(rows: &mut [StopState]) {
    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for (index, row) in rows.iter().enumerate() {
        groups.entry(row.trip_id.clone()).or_default().push(index);
    }

    for indices in groups.values() {
        let total = indices.len() as u32;
        let passed = indices
            .iter()
            .filter(|&&i| rows[i].passed_schedule)
            .count();
        let status = passed as f64 / total as f64;
        let rolling = 0.0 < status && status < 1.0;

        let last_sequence = if rolling {
            indices
                .iter()
                .filter(|&&i| rows[i].passed_realtime == Some(true))
                .map(|&i| rows[i].stop_sequence)
                .max()
        } else {
            None
        };
        let last_observed = last_sequence.and_then(|sequence| {
            indices
                .iter()
                .find(|&&i| rows[i].stop_sequence == sequence)
                .map(|&i| (rows[i].observed_delay, rows[i].departure_time))
        });

        for &i in indices {
            let row = &mut rows[i];
            row.total_sequence = total;
            row.trip_status = status;
            row.last_sequence_number = last_sequence;
            if let (Some(sequence), Some((delay, departure))) = (last_sequence, last_observed) {
                row.last_observed_delay = delay;
                row.last_observed_departure_time = Some(departure);
                row.sequence_diff = Some(row.stop_sequence as i64 - sequence as i64);
                row.stations_scheduled_trip_time = Some(
                    row.departure_time.total_seconds() as i64
                        - departure.total_seconds() as i64,
                );
            }
        }
    }
}

/// line pass: median observed delay per line and per (line, stop) over the
/// window of recent passages, and the count of rolling trips per line
fn line_level(rows: &mut [StopState], window_secs: i64) {
    let mut line_delays: HashMap<String, Vec<i64>> = HashMap::new();
    let mut line_station_delays: HashMap<(String, String), Vec<i64>> = HashMap::new();
    let mut rolling_trips: HashMap<String, HashSet<String>> = HashMap::new();

    for row in rows.iter() {
        let line = match &row.route_short_name {
            Some(line) => line.clone(),
            None => continue,
        };
        if let (Some(diff), Some(delay)) = (row.time_to_passage, row.observed_delay) {
            if (0..window_secs).contains(&diff) {
                line_delays.entry(line.clone()).or_default().push(delay);
                line_station_delays
                    .entry((line.clone(), row.stop_id.clone()))
                    .or_default()
                    .push(delay);
            }
        }
        if 0.0 < row.trip_status && row.trip_status < 1.0 {
            rolling_trips
                .entry(line)
                .or_default()
                .insert(row.trip_id.clone());
        }
    }

    let line_medians: HashMap<String, f64> = line_delays
        .into_iter()
        .filter_map(|(line, mut delays)| median(&mut delays).map(|m| (line, m)))
        .collect();
    let station_medians: HashMap<(String, String), f64> = line_station_delays
        .into_iter()
        .filter_map(|(key, mut delays)| median(&mut delays).map(|m| (key, m)))
        .collect();

    for row in rows.iter_mut() {
        let line = match &row.route_short_name {
            Some(line) => line.clone(),
            None => continue,
        };
        row.line_median_delay = line_medians.get(&line).copied();
        row.line_station_median_delay = station_medians
            .get(&(line.clone(), row.stop_id.clone()))
            .copied();
        row.rolling_trips_on_line = rolling_trips.get(&line).map(|trips| trips.len() as u32);
    }
}

/// a stop without realtime is still passed when a later stop of the same
/// trip has been observed passing
fn back_propagate_passed_realtime(rows: &mut [StopState]) {
    let mut last_passed: HashMap<String, u32> = HashMap::new();
    for row in rows.iter() {
        if row.passed_realtime == Some(true) {
            let entry = last_passed.entry(row.trip_id.clone()).or_insert(0);
            *entry = (*entry).max(row.stop_sequence);
        }
    }
    for row in rows.iter_mut() {
        if row.has_realtime {
            continue;
        }
        if let Some(&sequence) = last_passed.get(&row.trip_id) {
            if row.stop_sequence < sequence {
                row.passed_realtime = Some(true);
            }
        }
    }
}

fn median(values: &mut Vec<i64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid] as f64)
    } else {
        Some((values[mid - 1] + values[mid]) as f64 / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::{at, joined_trip, TripSpec};

    fn engine() -> TripStateEngine {
        TripStateEngine::new(EngineConfig::default())
    }

    fn day() -> ServiceDay {
        use std::str::FromStr;
        ServiceDay::from_str("20170202").unwrap()
    }

    /// ten stops every ten minutes from 08:00; realtime mirrors the
    /// schedule for the first four stops only
    fn rolling_trip() -> Vec<JoinedResult> {
        joined_trip(TripSpec {
            trip_id: "DUASN111111F01001",
            line: "C",
            first_departure_minute: 8 * 60,
            minutes_between_stops: 10,
            stops: 10,
            realtime_through: Some(3),
            realtime_delay_secs: 0,
        })
    }

    #[test]
    fn test_trip_status_and_last_sequence() {
        let snapshot = engine()
            .compute(&rolling_trip(), &day(), &at("08:35:00"))
            .unwrap();

        let row = &snapshot.rows[7];
        assert_eq!(row.total_sequence, 10);
        assert_eq!(row.trip_status, 0.4);
        assert_eq!(row.last_sequence_number, Some(3));
        assert_eq!(row.sequence_diff, Some(4));
        // four scheduled gaps of ten minutes between stop 3 and stop 7
        assert_eq!(row.stations_scheduled_trip_time, Some(4 * 600));
    }

    #[test]
    fn test_trip_status_bounds_and_monotonicity() {
        let joined = rolling_trip();
        let mut previous_status = -1.0;
        let mut previous_passed = 0usize;
        for instant in ["07:00:00", "08:05:00", "08:35:00", "09:15:00", "10:00:00"] {
            let snapshot = engine().compute(&joined, &day(), &at(instant)).unwrap();
            let status = snapshot.rows[0].trip_status;
            assert!((0.0..=1.0).contains(&status), "status {status} at {instant}");
            assert!(status >= previous_status, "status decreased at {instant}");
            previous_status = status;

            let passed = snapshot.rows.iter().filter(|r| r.passed_schedule).count();
            assert!(passed >= previous_passed, "passed count fell at {instant}");
            previous_passed = passed;
        }
    }

    #[test]
    fn test_no_last_sequence_before_departure_or_after_arrival() {
        let joined = rolling_trip();
        // before the first stop, the trip is not rolling
        let before = engine().compute(&joined, &day(), &at("07:30:00")).unwrap();
        assert_eq!(before.rows[0].last_sequence_number, None);
        assert_eq!(before.rows[0].trip_status, 0.0);
        // after the last stop, status is 1 and nothing is predictable
        let after = engine().compute(&joined, &day(), &at("10:00:00")).unwrap();
        assert_eq!(after.rows[0].trip_status, 1.0);
        assert_eq!(after.predictable().count(), 0);
    }

    #[test]
    fn test_observed_and_expected_delay_split() {
        let joined = joined_trip(TripSpec {
            trip_id: "DUASN111111F01001",
            line: "C",
            first_departure_minute: 8 * 60,
            minutes_between_stops: 10,
            stops: 4,
            realtime_through: Some(3),
            realtime_delay_secs: 120,
        });
        // stops 0 and 1 have passed in realtime; 2 and 3 have board
        // predictions two minutes late
        let snapshot = engine().compute(&joined, &day(), &at("08:15:00")).unwrap();
        assert_eq!(snapshot.rows[0].observed_delay, Some(120));
        assert_eq!(snapshot.rows[0].expected_delay, None);
        assert_eq!(snapshot.rows[2].observed_delay, None);
        assert_eq!(snapshot.rows[2].expected_delay, Some(120));
    }

    #[test]
    fn test_predictable_set() {
        let snapshot = engine()
            .compute(&rolling_trip(), &day(), &at("08:35:00"))
            .unwrap();
        let predictable: Vec<u32> = snapshot.predictable().map(|r| r.stop_sequence).collect();
        // stops 4..9 are not yet passed and the trip is anchored at stop 3
        assert_eq!(predictable, vec![4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_predictable_rows_carry_trip_and_line_features() {
        let snapshot = engine()
            .compute(&rolling_trip(), &day(), &at("08:35:00"))
            .unwrap();
        for row in snapshot.predictable() {
            assert!(row.last_observed_delay.is_some());
            assert!(row.sequence_diff.is_some());
            assert!(row.stations_scheduled_trip_time.is_some());
            assert!(row.line_median_delay.is_some());
            assert!(row.rolling_trips_on_line.is_some());
            // the per-station median stays missing for stations with no
            // recent observation; the feature builder drops those rows
        }
    }

    #[test]
    fn test_line_median_delay_window() {
        // two rolling trips on the same line, their first stops observed
        // 60s and 180s late within the window
        let mut joined = joined_trip(TripSpec {
            trip_id: "DUASN111111F01001",
            line: "C",
            first_departure_minute: 8 * 60,
            minutes_between_stops: 10,
            stops: 3,
            realtime_through: Some(0),
            realtime_delay_secs: 60,
        });
        joined.extend(joined_trip(TripSpec {
            trip_id: "DUASN222222F01002",
            line: "C",
            first_departure_minute: 8 * 60 + 5,
            minutes_between_stops: 10,
            stops: 3,
            realtime_through: Some(0),
            realtime_delay_secs: 180,
        }));

        let snapshot = engine().compute(&joined, &day(), &at("08:12:00")).unwrap();
        let row = &snapshot.rows[0];
        assert_eq!(row.line_median_delay, Some(120.0));
        assert_eq!(row.rolling_trips_on_line, Some(2));
        // the station median only sees this trip's own station
        assert_eq!(row.line_station_median_delay, Some(60.0));
    }

    #[test]
    fn test_line_median_ignores_stale_observations() {
        // observation 30 minutes old falls outside the 1200s window
        let joined = joined_trip(TripSpec {
            trip_id: "DUASN111111F01001",
            line: "C",
            first_departure_minute: 8 * 60,
            minutes_between_stops: 45,
            stops: 3,
            realtime_through: Some(0),
            realtime_delay_secs: 60,
        });
        let snapshot = engine().compute(&joined, &day(), &at("08:30:00")).unwrap();
        assert_eq!(snapshot.rows[0].line_median_delay, None);
    }

    #[test]
    fn test_back_propagation_marks_unobserved_earlier_stop() {
        // realtime at stops 0, 1 and 3, nothing at stop 2
        let mut joined = joined_trip(TripSpec {
            trip_id: "DUASN111111F01001",
            line: "C",
            first_departure_minute: 8 * 60,
            minutes_between_stops: 10,
            stops: 5,
            realtime_through: Some(3),
            realtime_delay_secs: 0,
        });
        joined[2].realtime = None;

        let snapshot = engine().compute(&joined, &day(), &at("08:35:00")).unwrap();
        let gap = &snapshot.rows[2];
        assert!(!gap.has_realtime);
        assert_eq!(gap.passed_realtime, Some(true));
        // and it is therefore not predictable
        assert!(!gap.is_predictable());
    }

    #[test]
    fn test_median_helper() {
        assert_eq!(median(&mut vec![]), None);
        assert_eq!(median(&mut vec![7]), Some(7.0));
        assert_eq!(median(&mut vec![3, 1, 2]), Some(2.0));
        assert_eq!(median(&mut vec![4, 1, 3, 2]), Some(2.5));
    }
}
