//! typed query surface over the GTFS tables. every query opens its own
//! connection from the shared pool and widens its projection through the
//! [`Projection`] level.

use std::collections::HashMap;
use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use raildelay_core::clock::{ExtendedTime, ServiceDay};
use raildelay_core::model::{
    Calendar, CalendarException, ExceptionKind, Route, ScheduleRow, Stop, StopTimeRecord, Trip,
};

use crate::error::ScheduleError;
use crate::service_ops;
use crate::store::ScheduleStore;

/// sqlite caps bound variables per statement; IN-lists are chunked below it
const IN_LIST_CHUNK: usize = 400;

/// how wide a stop-time query's result rows are
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Projection {
    /// the stop time alone
    StopTime,
    /// stop time + trip
    WithTrip,
    /// stop time + trip + stop
    WithStop,
    /// stop time + trip + stop + route + calendar
    Full,
}

impl Projection {
    fn with_trip(&self) -> bool {
        !matches!(self, Projection::StopTime)
    }

    fn with_stop(&self) -> bool {
        matches!(self, Projection::WithStop | Projection::Full)
    }

    fn with_route(&self) -> bool {
        matches!(self, Projection::Full)
    }

    fn with_calendar(&self) -> bool {
        matches!(self, Projection::Full)
    }
}

/// filters of a stop-time query; all optional and conjunctive
#[derive(Debug, Clone, Default)]
pub struct StopTimeFilter {
    pub trip_ids: Option<Vec<String>>,
    pub stop_id: Option<String>,
    /// matches the last 7 characters of the stop id
    pub station_id: Option<String>,
    pub route_short_name: Option<String>,
    pub departure_at_or_after: Option<ExtendedTime>,
    pub departure_at_or_before: Option<ExtendedTime>,
}

impl ScheduleStore {
    /// all routes; with `distinct_short_name`, one route per line letter
    pub async fn routes(&self, distinct_short_name: bool) -> Result<Vec<Route>, ScheduleError> {
        let sql = if distinct_short_name {
            "SELECT * FROM routes GROUP BY route_short_name ORDER BY route_id"
        } else {
            "SELECT * FROM routes ORDER BY route_id"
        };
        let rows = sqlx::query(sql).fetch_all(self.pool()).await?;
        rows.iter().map(route_from_row).collect()
    }

    /// stop points, optionally restricted to those touched by a line
    /// (Stop -> StopTime -> Trip -> Route)
    pub async fn stops(
        &self,
        on_route_short_name: Option<&str>,
    ) -> Result<Vec<Stop>, ScheduleError> {
        let rows = match on_route_short_name {
            Some(short_name) => {
                sqlx::query(
                    r#"
                    SELECT DISTINCT s.*
                    FROM stops s
                    JOIN stop_times st ON st.stop_id = s.stop_id
                    JOIN trips t ON t.trip_id = st.trip_id
                    JOIN routes r ON r.route_id = t.route_id
                    WHERE r.route_short_name = ? AND s.stop_id LIKE 'StopPoint%'
                    ORDER BY s.stop_id
                    "#,
                )
                .bind(short_name)
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT * FROM stops WHERE stop_id LIKE 'StopPoint%' ORDER BY stop_id",
                )
                .fetch_all(self.pool())
                .await?
            }
        };
        rows.iter().map(stop_from_row).collect()
    }

    pub async fn calendars(&self) -> Result<Vec<Calendar>, ScheduleError> {
        let rows = sqlx::query("SELECT * FROM calendars ORDER BY service_id")
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(calendar_from_row).collect()
    }

    pub async fn calendar_exceptions_on(
        &self,
        day: &ServiceDay,
    ) -> Result<Vec<CalendarException>, ScheduleError> {
        let rows = sqlx::query("SELECT * FROM calendar_dates WHERE date = ? ORDER BY service_id")
            .bind(day.to_string())
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(calendar_exception_from_row).collect()
    }

    /// service ids active on a day (base calendar plus added exceptions,
    /// minus removed ones)
    pub async fn service_ids_on(&self, day: &ServiceDay) -> Result<Vec<String>, ScheduleError> {
        let calendars = self.calendars().await?;
        let exceptions = self.calendar_exceptions_on(day).await?;
        Ok(service_ops::active_service_ids(&calendars, &exceptions, day))
    }

    /// trips whose service id is in the given set
    pub async fn trips_by_service_ids(
        &self,
        service_ids: &[String],
    ) -> Result<Vec<Trip>, ScheduleError> {
        let mut trips = Vec::new();
        for chunk in service_ids.chunks(IN_LIST_CHUNK) {
            let sql = format!(
                "SELECT * FROM trips WHERE service_id IN ({}) ORDER BY trip_id",
                placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(id);
            }
            let rows = query.fetch_all(self.pool()).await?;
            for row in rows.iter() {
                trips.push(trip_from_row(row)?);
            }
        }
        Ok(trips)
    }

    /// first and last scheduled departure per trip, for activity windows
    pub async fn trip_departure_bounds(
        &self,
        trip_ids: &[String],
    ) -> Result<HashMap<String, (ExtendedTime, ExtendedTime)>, ScheduleError> {
        let mut bounds = HashMap::with_capacity(trip_ids.len());
        for chunk in trip_ids.chunks(IN_LIST_CHUNK) {
            let sql = format!(
                r#"
                SELECT trip_id,
                       MIN(departure_time) AS first_departure,
                       MAX(departure_time) AS last_departure
                FROM stop_times
                WHERE trip_id IN ({})
                GROUP BY trip_id
                "#,
                placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(id);
            }
            let rows = query.fetch_all(self.pool()).await?;
            for row in rows.iter() {
                let trip_id: String = row.try_get("trip_id")?;
                let first = parse_time(row, "first_departure")?;
                let last = parse_time(row, "last_departure")?;
                bounds.insert(trip_id, (first, last));
            }
        }
        Ok(bounds)
    }

    /// stop times matching the filter, widened to the projection level.
    /// results are ordered by (trip_id, stop_sequence).
    pub async fn stop_times(
        &self,
        filter: &StopTimeFilter,
        projection: Projection,
    ) -> Result<Vec<ScheduleRow>, ScheduleError> {
        match &filter.trip_ids {
            None => self.stop_times_chunk(filter, None, projection).await,
            Some(ids) => {
                let mut rows = Vec::new();
                for chunk in ids.chunks(IN_LIST_CHUNK) {
                    rows.extend(
                        self.stop_times_chunk(filter, Some(chunk), projection)
                            .await?,
                    );
                }
                Ok(rows)
            }
        }
    }

    async fn stop_times_chunk(
        &self,
        filter: &StopTimeFilter,
        trip_ids: Option<&[String]>,
        projection: Projection,
    ) -> Result<Vec<ScheduleRow>, ScheduleError> {
        let sql = build_stop_times_sql(filter, trip_ids.map_or(0, |ids| ids.len()), projection);

        let mut query = sqlx::query(&sql);
        if let Some(ids) = trip_ids {
            for id in ids {
                query = query.bind(id);
            }
        }
        if let Some(stop_id) = &filter.stop_id {
            query = query.bind(stop_id);
        }
        if let Some(station_id) = &filter.station_id {
            query = query.bind(station_id);
        }
        if let Some(short_name) = &filter.route_short_name {
            query = query.bind(short_name);
        }
        if let Some(above) = &filter.departure_at_or_after {
            query = query.bind(above.to_string());
        }
        if let Some(below) = &filter.departure_at_or_before {
            query = query.bind(below.to_string());
        }

        let rows = query.fetch_all(self.pool()).await?;
        rows.iter()
            .map(|row| schedule_row_from_row(row, projection))
            .collect()
    }
}

fn build_stop_times_sql(
    filter: &StopTimeFilter,
    trip_id_count: usize,
    projection: Projection,
) -> String {
    let mut columns: Vec<&str> = vec![
        "st.trip_id",
        "st.stop_id",
        "st.arrival_time",
        "st.departure_time",
        "st.stop_sequence",
        "st.stop_headsign",
        "st.pickup_type",
        "st.drop_off_type",
    ];
    if projection.with_trip() {
        columns.extend([
            "t.route_id",
            "t.service_id",
            "t.trip_headsign",
            "t.direction_id",
            "t.block_id",
        ]);
    }
    if projection.with_stop() {
        columns.extend([
            "s.stop_name",
            "s.stop_desc",
            "s.stop_lat",
            "s.stop_lon",
            "s.zone_id",
            "s.location_type",
            "s.parent_station",
        ]);
    }
    if projection.with_route() {
        columns.extend([
            "r.agency_id",
            "r.route_short_name",
            "r.route_long_name",
            "r.route_type",
            "r.route_color",
            "r.route_text_color",
        ]);
    }
    if projection.with_calendar() {
        columns.extend([
            "c.monday",
            "c.tuesday",
            "c.wednesday",
            "c.thursday",
            "c.friday",
            "c.saturday",
            "c.sunday",
            "c.start_date",
            "c.end_date",
        ]);
    }

    let needs_route_join = projection.with_route() || filter.route_short_name.is_some();
    let needs_trip_join =
        projection.with_trip() || projection.with_calendar() || needs_route_join;

    let mut sql = format!("SELECT {} FROM stop_times st", columns.join(", "));
    if needs_trip_join {
        sql.push_str(" JOIN trips t ON t.trip_id = st.trip_id");
    }
    if projection.with_stop() {
        sql.push_str(" JOIN stops s ON s.stop_id = st.stop_id");
    }
    if needs_route_join {
        sql.push_str(" JOIN routes r ON r.route_id = t.route_id");
    }
    if projection.with_calendar() {
        sql.push_str(" JOIN calendars c ON c.service_id = t.service_id");
    }

    let mut conditions = Vec::new();
    if trip_id_count > 0 {
        conditions.push(format!("st.trip_id IN ({})", placeholders(trip_id_count)));
    }
    if filter.stop_id.is_some() {
        conditions.push("st.stop_id = ?".to_string());
    }
    if filter.station_id.is_some() {
        conditions.push("substr(st.stop_id, -7) = ?".to_string());
    }
    if filter.route_short_name.is_some() {
        conditions.push("r.route_short_name = ?".to_string());
    }
    if filter.departure_at_or_after.is_some() {
        conditions.push("st.departure_time >= ?".to_string());
    }
    if filter.departure_at_or_before.is_some() {
        conditions.push("st.departure_time <= ?".to_string());
    }
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    sql.push_str(" ORDER BY st.trip_id, st.stop_sequence");
    sql
}

fn placeholders(count: usize) -> String {
    itertools::Itertools::intersperse(std::iter::repeat_n("?", count), ",").collect()
}

fn parse_time(row: &SqliteRow, column: &str) -> Result<ExtendedTime, ScheduleError> {
    let raw: String = row.try_get(column)?;
    Ok(ExtendedTime::from_str(&raw)?)
}

fn parse_day(row: &SqliteRow, column: &str) -> Result<ServiceDay, ScheduleError> {
    let raw: String = row.try_get(column)?;
    Ok(ServiceDay::from_str(&raw)?)
}

fn route_from_row(row: &SqliteRow) -> Result<Route, ScheduleError> {
    Ok(Route {
        route_id: row.try_get("route_id")?,
        agency_id: row.try_get("agency_id")?,
        route_short_name: row.try_get("route_short_name")?,
        route_long_name: row.try_get("route_long_name")?,
        route_type: row.try_get("route_type")?,
        route_color: row.try_get("route_color")?,
        route_text_color: row.try_get("route_text_color")?,
    })
}

fn stop_from_row(row: &SqliteRow) -> Result<Stop, ScheduleError> {
    Ok(Stop {
        stop_id: row.try_get("stop_id")?,
        stop_name: row.try_get("stop_name")?,
        stop_desc: row.try_get("stop_desc")?,
        stop_lat: row.try_get("stop_lat")?,
        stop_lon: row.try_get("stop_lon")?,
        zone_id: row.try_get("zone_id")?,
        location_type: row.try_get("location_type")?,
        parent_station: row.try_get("parent_station")?,
    })
}

fn trip_from_row(row: &SqliteRow) -> Result<Trip, ScheduleError> {
    Ok(Trip {
        trip_id: row.try_get("trip_id")?,
        route_id: row.try_get("route_id")?,
        service_id: row.try_get("service_id")?,
        trip_headsign: row.try_get("trip_headsign")?,
        direction_id: row.try_get("direction_id")?,
        block_id: row.try_get("block_id")?,
    })
}

fn calendar_from_row(row: &SqliteRow) -> Result<Calendar, ScheduleError> {
    Ok(Calendar {
        service_id: row.try_get("service_id")?,
        monday: row.try_get::<i64, _>("monday")? as u8,
        tuesday: row.try_get::<i64, _>("tuesday")? as u8,
        wednesday: row.try_get::<i64, _>("wednesday")? as u8,
        thursday: row.try_get::<i64, _>("thursday")? as u8,
        friday: row.try_get::<i64, _>("friday")? as u8,
        saturday: row.try_get::<i64, _>("saturday")? as u8,
        sunday: row.try_get::<i64, _>("sunday")? as u8,
        start_date: parse_day(row, "start_date")?,
        end_date: parse_day(row, "end_date")?,
    })
}

fn calendar_exception_from_row(row: &SqliteRow) -> Result<CalendarException, ScheduleError> {
    let code: String = row.try_get("exception_type")?;
    let kind = ExceptionKind::from_gtfs_code(&code).ok_or_else(|| {
        ScheduleError::TableRead(
            "calendar_dates".to_string(),
            format!("unknown exception_type '{code}'"),
        )
    })?;
    Ok(CalendarException {
        service_id: row.try_get("service_id")?,
        date: parse_day(row, "date")?,
        exception_type: kind,
    })
}

fn schedule_row_from_row(
    row: &SqliteRow,
    projection: Projection,
) -> Result<ScheduleRow, ScheduleError> {
    let stop_time = StopTimeRecord {
        trip_id: row.try_get("trip_id")?,
        stop_id: row.try_get("stop_id")?,
        arrival_time: parse_time(row, "arrival_time")?,
        departure_time: parse_time(row, "departure_time")?,
        stop_sequence: row.try_get::<i64, _>("stop_sequence")? as u32,
        stop_headsign: row.try_get("stop_headsign")?,
        pickup_type: row.try_get("pickup_type")?,
        drop_off_type: row.try_get("drop_off_type")?,
    };
    let mut result = ScheduleRow::of_stop_time(stop_time);

    if projection.with_trip() {
        result.trip = Some(Trip {
            trip_id: result.stop_time.trip_id.clone(),
            route_id: row.try_get("route_id")?,
            service_id: row.try_get("service_id")?,
            trip_headsign: row.try_get("trip_headsign")?,
            direction_id: row.try_get("direction_id")?,
            block_id: row.try_get("block_id")?,
        });
    }
    if projection.with_stop() {
        result.stop = Some(Stop {
            stop_id: result.stop_time.stop_id.clone(),
            stop_name: row.try_get("stop_name")?,
            stop_desc: row.try_get("stop_desc")?,
            stop_lat: row.try_get("stop_lat")?,
            stop_lon: row.try_get("stop_lon")?,
            zone_id: row.try_get("zone_id")?,
            location_type: row.try_get("location_type")?,
            parent_station: row.try_get("parent_station")?,
        });
    }
    if projection.with_route() {
        let route_id = result
            .trip
            .as_ref()
            .map(|t| t.route_id.clone())
            .unwrap_or_default();
        result.route = Some(Route {
            route_id,
            agency_id: row.try_get("agency_id")?,
            route_short_name: row.try_get("route_short_name")?,
            route_long_name: row.try_get("route_long_name")?,
            route_type: row.try_get("route_type")?,
            route_color: row.try_get("route_color")?,
            route_text_color: row.try_get("route_text_color")?,
        });
    }
    if projection.with_calendar() {
        let service_id = result
            .trip
            .as_ref()
            .map(|t| t.service_id.clone())
            .unwrap_or_default();
        result.calendar = Some(Calendar {
            service_id,
            monday: row.try_get::<i64, _>("monday")? as u8,
            tuesday: row.try_get::<i64, _>("tuesday")? as u8,
            wednesday: row.try_get::<i64, _>("wednesday")? as u8,
            thursday: row.try_get::<i64, _>("thursday")? as u8,
            friday: row.try_get::<i64, _>("friday")? as u8,
            saturday: row.try_get::<i64, _>("saturday")? as u8,
            sunday: row.try_get::<i64, _>("sunday")? as u8,
            start_date: parse_day(row, "start_date")?,
            end_date: parse_day(row, "end_date")?,
        });
    }
    Ok(result)
}
