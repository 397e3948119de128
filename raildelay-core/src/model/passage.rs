use serde::{Deserialize, Serialize};

use crate::clock::{ExtendedTime, ServiceDay};

/// the compound primary key of a realtime passage record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PassageKey {
    pub station_id: String,
    pub day_train_num: String,
}

impl PassageKey {
    pub fn new(station_id: impl Into<String>, day_train_num: impl Into<String>) -> PassageKey {
        PassageKey {
            station_id: station_id.into(),
            day_train_num: day_train_num.into(),
        }
    }
}

impl std::fmt::Display for PassageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.station_id, self.day_train_num)
    }
}

/// an observed or board-predicted passage of a train at a station, as
/// normalized from one vendor payload entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimePassage {
    /// station code as queried on the API (8 digits)
    pub station_8d: String,
    /// station code in schedule form (7 digits); hash key
    pub station_id: String,
    pub train_num: String,
    /// range key: `expected_passage_day + "_" + train_num`
    pub day_train_num: String,
    pub expected_passage_day: ServiceDay,
    pub expected_passage_time: ExtendedTime,
    pub request_day: ServiceDay,
    pub request_time: ExtendedTime,
    /// |request - expected passage| in seconds; lower means the board was
    /// read closer to the passage it predicts
    pub data_freshness: i64,
    /// vendor mission code
    pub miss: Option<String>,
    /// terminus station code
    pub term: Option<String>,
    /// vendor status text (e.g. delayed, deleted)
    pub etat: Option<String>,
    /// scheduled departure for the same key, stamped during ingestion when
    /// the schedule knows this train
    pub scheduled_departure_time: Option<ExtendedTime>,
}

impl RealtimePassage {
    pub fn key(&self) -> PassageKey {
        PassageKey::new(self.station_id.clone(), self.day_train_num.clone())
    }
}
