use chrono::NaiveDateTime;
use serde::Serialize;

use crate::state::StopState;

/// rendering of the snapshot instant in matrix files
pub const AT_DATETIME_FORMAT: &str = "%Y%m%d-%H:%M:%S";

/// one row of a day matrix: identification columns duplicated as index
/// (`*_ix`) and as values, the prediction features, and the labels when the
/// build is retroactive. downstream readers filter on the value columns
/// without reindexing.
#[derive(Debug, Clone, Serialize)]
pub struct MatrixRow {
    pub at_datetime_ix: String,
    pub trip_id_ix: String,
    pub stop_id_ix: String,
    pub route_short_name_ix: String,
    pub sequence_diff_ix: i64,
    pub stations_scheduled_trip_time_ix: i64,

    pub at_datetime: String,
    pub trip_id: String,
    pub stop_id: String,
    pub route_short_name: String,
    pub sequence_diff: i64,
    pub stations_scheduled_trip_time: i64,

    pub last_observed_delay: i64,
    pub predicted_station_median_delay: f64,
    pub line_median_delay: f64,
    pub rolling_trips_on_line: u32,
    pub business_day: bool,

    pub label: Option<i64>,
    pub label_ev: Option<i64>,
    pub naive_pred_mae: Option<i64>,
    pub naive_pred_mse: Option<i64>,
}

impl MatrixRow {
    /// builds the row when every required feature is present; None means
    /// the stop must be dropped from the matrix
    pub fn from_stop_state(state: &StopState, at: &NaiveDateTime) -> Option<MatrixRow> {
        let route_short_name = state.route_short_name.clone()?;
        let sequence_diff = state.sequence_diff?;
        let stations_scheduled_trip_time = state.stations_scheduled_trip_time?;
        let last_observed_delay = state.last_observed_delay?;
        let predicted_station_median_delay = state.line_station_median_delay?;
        let line_median_delay = state.line_median_delay?;
        let rolling_trips_on_line = state.rolling_trips_on_line?;

        let at_datetime = at.format(AT_DATETIME_FORMAT).to_string();
        Some(MatrixRow {
            at_datetime_ix: at_datetime.clone(),
            trip_id_ix: state.trip_id.clone(),
            stop_id_ix: state.stop_id.clone(),
            route_short_name_ix: route_short_name.clone(),
            sequence_diff_ix: sequence_diff,
            stations_scheduled_trip_time_ix: stations_scheduled_trip_time,
            at_datetime,
            trip_id: state.trip_id.clone(),
            stop_id: state.stop_id.clone(),
            route_short_name,
            sequence_diff,
            stations_scheduled_trip_time,
            last_observed_delay,
            predicted_station_median_delay,
            line_median_delay,
            rolling_trips_on_line,
            business_day: state.business_day,
            label: state.label,
            label_ev: state.label_ev,
            naive_pred_mae: state.naive_pred_mae,
            naive_pred_mse: state.naive_pred_mse,
        })
    }
}
