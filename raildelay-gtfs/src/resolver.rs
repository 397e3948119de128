//! materializes the schedule of one service day: active services, the
//! trips they run, and filtered stop-time projections ready for the
//! realtime join.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use raildelay_core::clock::{ExtendedTime, ServiceDay};
use raildelay_core::model::{PassageKey, ScheduleRow, Trip};

use crate::error::ScheduleError;
use crate::store::{Projection, ScheduleStore, StopTimeFilter};

/// filters applied to one day's stop times; all optional and conjunctive
#[derive(Debug, Clone, Default)]
pub struct DayFilter {
    pub route_short_name: Option<String>,
    /// keep only trips running at this instant: first stop departed, last
    /// stop not yet departed
    pub active_at: Option<ExtendedTime>,
    pub stop_id: Option<String>,
    pub station_id: Option<String>,
    pub trip_ids: Option<Vec<String>>,
    pub departure_at_or_after: Option<ExtendedTime>,
    pub departure_at_or_before: Option<ExtendedTime>,
}

pub struct ScheduleResolver {
    store: Arc<ScheduleStore>,
}

impl ScheduleResolver {
    pub fn new(store: Arc<ScheduleStore>) -> ScheduleResolver {
        ScheduleResolver { store }
    }

    /// service ids active on the day (weekday calendar within validity,
    /// plus added exceptions, minus removed ones)
    pub async fn services_on(&self, day: &ServiceDay) -> Result<Vec<String>, ScheduleError> {
        self.store.service_ids_on(day).await
    }

    /// trips whose service runs on the day
    pub async fn trips_on(&self, day: &ServiceDay) -> Result<Vec<Trip>, ScheduleError> {
        let services = self.services_on(day).await?;
        if services.is_empty() {
            return Ok(Vec::new());
        }
        self.store.trips_by_service_ids(&services).await
    }

    /// the day's stop times under the given filter, ordered by
    /// (trip_id, stop_sequence)
    pub async fn stop_times_on(
        &self,
        day: &ServiceDay,
        filter: &DayFilter,
        projection: Projection,
    ) -> Result<Vec<ScheduleRow>, ScheduleError> {
        let trips = self.trips_on(day).await?;
        let mut trip_ids: Vec<String> = trips.into_iter().map(|t| t.trip_id).collect();

        if let Some(wanted) = &filter.trip_ids {
            let wanted: HashSet<&String> = wanted.iter().collect();
            trip_ids.retain(|id| wanted.contains(id));
        }
        if let Some(at) = &filter.active_at {
            trip_ids = self.active_trip_ids(&trip_ids, at).await?;
        }
        if trip_ids.is_empty() {
            return Ok(Vec::new());
        }

        let store_filter = StopTimeFilter {
            trip_ids: Some(trip_ids),
            stop_id: filter.stop_id.clone(),
            station_id: filter.station_id.clone(),
            route_short_name: filter.route_short_name.clone(),
            departure_at_or_after: filter.departure_at_or_after,
            departure_at_or_before: filter.departure_at_or_before,
        };
        self.store.stop_times(&store_filter, projection).await
    }

    /// trips already departed from their first stop and not yet departed
    /// from their last one at the given instant
    async fn active_trip_ids(
        &self,
        trip_ids: &[String],
        at: &ExtendedTime,
    ) -> Result<Vec<String>, ScheduleError> {
        let bounds = self.store.trip_departure_bounds(trip_ids).await?;
        Ok(trip_ids
            .iter()
            .filter(|id| match bounds.get(*id) {
                Some((first, last)) => first <= at && at <= last,
                None => false,
            })
            .cloned()
            .collect())
    }

    /// the day's stop times indexed by realtime key, for stamping schedule
    /// information onto freshly polled passages.
    ///
    /// rows without derivable keys are dropped; when several rows share a
    /// key (one physical train serving several trip ids), the first in
    /// (trip_id, stop_sequence) order wins.
    pub async fn day_passage_index(
        &self,
        day: &ServiceDay,
    ) -> Result<HashMap<PassageKey, ScheduleRow>, ScheduleError> {
        let rows = self
            .stop_times_on(day, &DayFilter::default(), Projection::StopTime)
            .await?;
        let mut index = HashMap::with_capacity(rows.len());
        for row in rows {
            let key = match row.passage_key(day) {
                Some(key) => key,
                None => continue,
            };
            index.entry(key).or_insert(row);
        }
        Ok(index)
    }
}
