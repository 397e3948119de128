use raildelay_core::clock::{ExtendedTime, ServiceDay};

/// the state of one scheduled stop at the snapshot instant, together with
/// the trip- and line-level aggregates it inherits.
///
/// a stop moves Pending -> Scheduled-Passed -> Realtime-Passed; the first
/// transition is driven by the instant alone, the second also needs an
/// observed (or back-propagated) passage.
#[derive(Debug, Clone)]
pub struct StopState {
    pub trip_id: String,
    pub stop_id: String,
    pub stop_name: Option<String>,
    pub route_short_name: Option<String>,
    pub direction_id: Option<String>,
    pub stop_sequence: u32,
    pub departure_time: ExtendedTime,
    pub business_day: bool,

    // realtime attributes, when a passage was recorded for this stop
    pub has_realtime: bool,
    pub expected_passage_day: Option<ServiceDay>,
    pub expected_passage_time: Option<ExtendedTime>,
    pub data_freshness: Option<i64>,
    pub mission: Option<String>,

    // state at the snapshot instant
    pub passed_schedule: bool,
    /// instant minus expected passage, seconds; >= 0 means passed
    pub time_to_passage: Option<i64>,
    pub passed_realtime: Option<bool>,
    /// realtime vs schedule, seconds, for passages already observed
    pub observed_delay: Option<i64>,
    /// same difference for board predictions not yet realized
    pub expected_delay: Option<i64>,

    // trip aggregates
    pub total_sequence: u32,
    pub trip_status: f64,
    pub last_sequence_number: Option<u32>,
    pub last_observed_delay: Option<i64>,
    pub last_observed_departure_time: Option<ExtendedTime>,
    pub sequence_diff: Option<i64>,
    pub stations_scheduled_trip_time: Option<i64>,

    // line aggregates over the rolling window
    pub line_median_delay: Option<f64>,
    pub line_station_median_delay: Option<f64>,
    pub rolling_trips_on_line: Option<u32>,

    // labels, assigned only for retroactive builds
    pub label: Option<i64>,
    pub label_ev: Option<i64>,
    pub naive_pred_mae: Option<i64>,
    pub naive_pred_mse: Option<i64>,
}

impl StopState {
    /// true for stops a prediction should be made for: the trip is rolling,
    /// this stop has passed neither on schedule nor in realtime, and a
    /// prior observation anchors the trip
    pub fn is_predictable(&self) -> bool {
        let rolling = 0.0 < self.trip_status && self.trip_status < 1.0;
        rolling
            && !self.passed_schedule
            && self.passed_realtime != Some(true)
            && self.sequence_diff.is_some()
    }

    /// true when every numeric feature of the prediction vector is present
    pub fn has_all_features(&self) -> bool {
        self.last_observed_delay.is_some()
            && self.line_station_median_delay.is_some()
            && self.line_median_delay.is_some()
            && self.sequence_diff.is_some()
            && self.stations_scheduled_trip_time.is_some()
            && self.rolling_trips_on_line.is_some()
    }
}
