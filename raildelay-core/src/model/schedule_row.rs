use serde::{Deserialize, Serialize};

use crate::clock::ServiceDay;
use crate::model::{Calendar, PassageKey, Route, Stop, StopTimeRecord, Trip};

/// one scheduled stop with the entities it joins to, as wide as the query's
/// projection level asked for. the stop time itself is always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRow {
    pub stop_time: StopTimeRecord,
    pub trip: Option<Trip>,
    pub stop: Option<Stop>,
    pub route: Option<Route>,
    pub calendar: Option<Calendar>,
}

impl ScheduleRow {
    pub fn of_stop_time(stop_time: StopTimeRecord) -> ScheduleRow {
        ScheduleRow {
            stop_time,
            trip: None,
            stop: None,
            route: None,
            calendar: None,
        }
    }

    pub fn trip_id(&self) -> &str {
        &self.stop_time.trip_id
    }

    pub fn stop_id(&self) -> &str {
        &self.stop_time.stop_id
    }

    pub fn route_short_name(&self) -> Option<&str> {
        self.route
            .as_ref()
            .and_then(|r| r.route_short_name.as_deref())
    }

    /// the realtime lookup key for this row on the given day, when the stop
    /// and trip ids carry the derived station and train codes
    pub fn passage_key(&self, day: &ServiceDay) -> Option<PassageKey> {
        let (station_id, day_train_num) = self.stop_time.realtime_key(day)?;
        Some(PassageKey::new(station_id, day_train_num))
    }
}
