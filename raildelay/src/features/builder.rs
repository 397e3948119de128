//! builds training and inference matrices from joined schedule/realtime
//! rows. training is retroactive: the snapshot instant lies in the past
//! and labels come from the realtime state known at `now`. both instants
//! are explicit parameters everywhere.

use chrono::NaiveDateTime;
use rayon::prelude::*;

use raildelay_core::clock::{ops, ExtendedTime, ServiceDay};

use crate::error::EtlError;
use crate::features::MatrixRow;
use crate::join::JoinedResult;
use crate::state::{DaySnapshot, EngineConfig, TripStateEngine};

/// instants swept when building a whole day, business window by default
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub begin: ExtendedTime,
    pub end: ExtendedTime,
    pub step_minutes: u32,
}

impl Default for SweepConfig {
    fn default() -> Self {
        SweepConfig {
            begin: ExtendedTime::new(5, 0, 0).expect("constant sweep bound"),
            end: ExtendedTime::new(23, 45, 0).expect("constant sweep bound"),
            step_minutes: 60,
        }
    }
}

pub struct FeatureBuilder {
    engine: TripStateEngine,
    sweep: SweepConfig,
}

impl FeatureBuilder {
    pub fn new(engine_config: EngineConfig, sweep: SweepConfig) -> FeatureBuilder {
        FeatureBuilder {
            engine: TripStateEngine::new(engine_config),
            sweep,
        }
    }

    /// training rows for one instant: predictable stops whose passage is
    /// known at `now`, with labels and naive baselines attached
    pub fn training_rows(
        &self,
        joined: &[JoinedResult],
        day: &ServiceDay,
        at: &NaiveDateTime,
        now: &NaiveDateTime,
    ) -> Result<Vec<MatrixRow>, EtlError> {
        let mut snapshot = self.engine.compute(joined, day, at)?;
        assign_labels(&mut snapshot, now)?;
        Ok(collect_rows(&snapshot, at, true))
    }

    /// inference rows: one vector per predictable stop at `now`, no labels
    pub fn inference_rows(
        &self,
        joined: &[JoinedResult],
        day: &ServiceDay,
        now: &NaiveDateTime,
    ) -> Result<Vec<MatrixRow>, EtlError> {
        let snapshot = self.engine.compute(joined, day, now)?;
        Ok(collect_rows(&snapshot, now, false))
    }

    /// the wall-clock instants of the day's sweep window
    pub fn sweep_instants(&self, day: &ServiceDay) -> Result<Vec<NaiveDateTime>, EtlError> {
        let mut instants = Vec::new();
        let mut seconds = self.sweep.begin.total_seconds();
        let end = self.sweep.end.total_seconds();
        let step = self.sweep.step_minutes * 60;
        while seconds <= end {
            let time = ExtendedTime::new(seconds / 3600, (seconds % 3600) / 60, seconds % 60)
                .map_err(EtlError::Clock)?;
            instants.push(ops::extended_to_wall(day, &time)?);
            seconds += step;
        }
        Ok(instants)
    }

    /// sweeps the whole day and concatenates per-instant training rows.
    /// instants are independent, so they are computed in parallel.
    pub fn day_matrix(
        &self,
        joined: &[JoinedResult],
        day: &ServiceDay,
        now: &NaiveDateTime,
    ) -> Result<Vec<MatrixRow>, EtlError> {
        let instants = self.sweep_instants(day)?;
        log::info!(
            "building day matrix for {day}: {} instants of {} joined rows",
            instants.len(),
            joined.len()
        );
        let per_instant: Vec<Vec<MatrixRow>> = instants
            .par_iter()
            .map(|at| self.training_rows(joined, day, at, now))
            .collect::<Result<Vec<_>, EtlError>>()?;
        Ok(per_instant.into_iter().flatten().collect())
    }
}

/// attaches labels to stops whose realtime passage has been realized by
/// `now`: the board-predicted delay becomes ground truth, and the naive
/// "delay stays constant" baseline is scored against its evolution
fn assign_labels(snapshot: &mut DaySnapshot, now: &NaiveDateTime) -> Result<(), EtlError> {
    for row in snapshot.rows.iter_mut() {
        let (day, time) = match (row.expected_passage_day, row.expected_passage_time) {
            (Some(day), Some(time)) => (day, time),
            _ => continue,
        };
        if ops::seconds_since_extended(now, &day, &time)? < 0 {
            continue;
        }
        if let Some(label) = row.expected_delay {
            row.label = Some(label);
            if let Some(last) = row.last_observed_delay {
                let evolution = label - last;
                row.label_ev = Some(evolution);
                row.naive_pred_mae = Some(evolution.abs());
                row.naive_pred_mse = Some(evolution * evolution);
            }
        }
    }
    Ok(())
}

fn collect_rows(snapshot: &DaySnapshot, at: &NaiveDateTime, labeled_only: bool) -> Vec<MatrixRow> {
    let mut rows = Vec::new();
    let mut incomplete = 0usize;
    let mut unlabeled = 0usize;
    for state in snapshot.predictable() {
        match MatrixRow::from_stop_state(state, at) {
            None => {
                incomplete += 1;
                log::debug!(
                    "dropping incomplete vector for trip {} stop {}",
                    state.trip_id,
                    state.stop_id
                );
            }
            Some(row) => {
                if labeled_only && row.label.is_none() {
                    unlabeled += 1;
                } else {
                    rows.push(row);
                }
            }
        }
    }
    if incomplete > 0 || unlabeled > 0 {
        log::info!(
            "kept {} of {} predictable stops ({incomplete} incomplete, {unlabeled} unlabeled)",
            rows.len(),
            rows.len() + incomplete + unlabeled
        );
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::{at, joined_trip, test_day, time_from_minutes, TripSpec};
    use raildelay_core::model::RealtimePassage;

    fn builder() -> FeatureBuilder {
        FeatureBuilder::new(EngineConfig::default(), SweepConfig::default())
    }

    /// line C: trip X rolling with its last observation 120s late and a
    /// board prediction 180s late at the next stop; trip Y done, having
    /// passed the predicted station 60s late within the window
    fn network() -> Vec<JoinedResult> {
        let mut joined = joined_trip(TripSpec {
            trip_id: "DUASN111111F01001",
            line: "C",
            first_departure_minute: 8 * 60,
            minutes_between_stops: 10,
            stops: 5,
            realtime_through: Some(2),
            realtime_delay_secs: 120,
        });

        // board prediction at stop 3, station 1111103
        let observed = joined[0].realtime.clone().unwrap();
        joined[3].realtime = Some(RealtimePassage {
            station_8d: "11111039".to_string(),
            station_id: "1111103".to_string(),
            expected_passage_time: time_from_minutes(8 * 60 + 33),
            scheduled_departure_time: Some(time_from_minutes(8 * 60 + 30)),
            ..observed
        });

        // trip Y calls at the same station and passed it 60s late
        let mut other = joined_trip(TripSpec {
            trip_id: "DUASN222222F01002",
            line: "C",
            first_departure_minute: 8 * 60 + 10,
            minutes_between_stops: 10,
            stops: 1,
            realtime_through: Some(0),
            realtime_delay_secs: 60,
        });
        other[0].schedule.stop_time.stop_id = "StopPoint:DUA1111103".to_string();
        if let Some(rt) = other[0].realtime.as_mut() {
            rt.station_id = "1111103".to_string();
        }
        joined.extend(other);
        joined
    }

    #[test]
    fn test_training_rows_labels_and_naive_baseline() {
        let rows = builder()
            .training_rows(&network(), &test_day(), &at("08:25:00"), &at("08:40:00"))
            .unwrap();
        assert_eq!(rows.len(), 1);

        let row = &rows[0];
        assert_eq!(row.stop_id, "StopPoint:DUA1111103");
        assert_eq!(row.last_observed_delay, 120);
        assert_eq!(row.sequence_diff, 1);
        assert_eq!(row.stations_scheduled_trip_time, 600);
        assert_eq!(row.predicted_station_median_delay, 60.0);
        assert_eq!(row.rolling_trips_on_line, 1);
        assert!(row.business_day);
        assert_eq!(row.label, Some(180));
        assert_eq!(row.label_ev, Some(60));
        assert_eq!(row.naive_pred_mae, Some(60));
        assert_eq!(row.naive_pred_mse, Some(3600));
    }

    #[test]
    fn test_training_rows_drop_unrealized_passages() {
        // at 08:30 the predicted passage (08:33) has not happened yet, so
        // no labeled row can be built
        let rows = builder()
            .training_rows(&network(), &test_day(), &at("08:25:00"), &at("08:30:00"))
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_inference_rows_have_no_labels_and_drop_incomplete() {
        let rows = builder()
            .inference_rows(&network(), &test_day(), &at("08:25:00"))
            .unwrap();
        // stop 3 is complete; stop 4's station has no recent observation
        // and is dropped
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].stop_id, "StopPoint:DUA1111103");
        assert_eq!(rows[0].label, None);
        assert_eq!(rows[0].naive_pred_mae, None);
    }

    #[test]
    fn test_index_columns_mirror_values() {
        let rows = builder()
            .training_rows(&network(), &test_day(), &at("08:25:00"), &at("08:40:00"))
            .unwrap();
        let row = &rows[0];
        assert_eq!(row.at_datetime_ix, row.at_datetime);
        assert_eq!(row.trip_id_ix, row.trip_id);
        assert_eq!(row.stop_id_ix, row.stop_id);
        assert_eq!(row.route_short_name_ix, row.route_short_name);
        assert_eq!(row.sequence_diff_ix, row.sequence_diff);
        assert_eq!(
            row.stations_scheduled_trip_time_ix,
            row.stations_scheduled_trip_time
        );
        assert_eq!(row.at_datetime, "20170202-08:25:00");
    }

    #[test]
    fn test_sweep_instants() {
        let sweep = SweepConfig {
            begin: ExtendedTime::new(8, 0, 0).unwrap(),
            end: ExtendedTime::new(9, 0, 0).unwrap(),
            step_minutes: 30,
        };
        let builder = FeatureBuilder::new(EngineConfig::default(), sweep);
        let instants = builder.sweep_instants(&test_day()).unwrap();
        assert_eq!(instants, vec![at("08:00:00"), at("08:30:00"), at("09:00:00")]);
    }

    #[test]
    fn test_day_matrix_concatenates_instants() {
        let sweep = SweepConfig {
            begin: ExtendedTime::new(8, 20, 0).unwrap(),
            end: ExtendedTime::new(8, 40, 0).unwrap(),
            step_minutes: 5,
        };
        let builder = FeatureBuilder::new(EngineConfig::default(), sweep);
        let matrix = builder
            .day_matrix(&network(), &test_day(), &at("09:30:00"))
            .unwrap();
        // the predicted stop is labeled at every instant where the trip is
        // rolling and the stop still ahead
        assert!(!matrix.is_empty());
        let mut at_datetimes: Vec<&str> =
            matrix.iter().map(|r| r.at_datetime.as_str()).collect();
        at_datetimes.dedup();
        assert!(at_datetimes.len() > 1, "rows from a single instant only");
    }
}
