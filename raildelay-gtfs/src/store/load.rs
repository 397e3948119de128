//! bulk ingestion of GTFS text tables. each table is written in chunks
//! inside a transaction; a chunk that fails (typically a primary-key
//! conflict on re-ingestion) is retried row by row as upserts, so the
//! whole load is idempotent.

use std::path::Path;

use kdam::tqdm;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::Sqlite;

use raildelay_core::clock::ServiceDay;
use raildelay_core::model::{
    Agency, Calendar, CalendarException, ExceptionKind, Route, Stop, StopTimeRecord, Trip,
};

use crate::error::ScheduleError;
use crate::fetch::REQUIRED_TABLES;
use crate::store::ScheduleStore;

/// rows per insert transaction
const CHUNK_SIZE: usize = 500;

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// per-table row counts of one GTFS ingestion
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub agencies: usize,
    pub routes: usize,
    pub trips: usize,
    pub stops: usize,
    pub stop_times: usize,
    pub calendars: usize,
    pub calendar_exceptions: usize,
}

/// calendar_dates.txt as written, before the exception code is decoded
#[derive(Debug, Deserialize)]
struct RawCalendarDate {
    service_id: String,
    date: ServiceDay,
    exception_type: String,
}

impl ScheduleStore {
    /// ingests all seven GTFS tables from the canonical directory.
    /// fails with [`ScheduleError::ScheduleNotLoaded`] when a required
    /// file is missing; unparseable rows are dropped with a debug log.
    pub async fn load_gtfs_directory(&self, dir: &Path) -> Result<LoadSummary, ScheduleError> {
        ensure_required_tables(dir)?;
        let mut summary = LoadSummary::default();

        let agencies: Vec<Agency> = read_table(dir, "agency.txt")?;
        summary.agencies = self.bulk_insert_agencies(&agencies).await?;

        let routes: Vec<Route> = read_table(dir, "routes.txt")?;
        summary.routes = self.bulk_insert_routes(&routes).await?;

        let trips: Vec<Trip> = read_table(dir, "trips.txt")?;
        summary.trips = self.bulk_insert_trips(&trips).await?;

        let stops: Vec<Stop> = read_table(dir, "stops.txt")?;
        summary.stops = self.bulk_insert_stops(&stops).await?;

        let stop_times: Vec<StopTimeRecord> = read_table(dir, "stop_times.txt")?;
        summary.stop_times = self.bulk_insert_stop_times(&stop_times).await?;

        let calendars: Vec<Calendar> = read_table(dir, "calendar.txt")?;
        summary.calendars = self.bulk_insert_calendars(&calendars).await?;

        let raw_dates: Vec<RawCalendarDate> = read_table(dir, "calendar_dates.txt")?;
        let exceptions = decode_calendar_dates(raw_dates);
        summary.calendar_exceptions = self.bulk_insert_calendar_exceptions(&exceptions).await?;

        log::info!(
            "GTFS load complete: {} trips, {} stop_times, {} services",
            summary.trips,
            summary.stop_times,
            summary.calendars
        );
        Ok(summary)
    }

    async fn bulk_insert_agencies(&self, rows: &[Agency]) -> Result<usize, ScheduleError> {
        let failed = self
            .insert_chunked(rows, "agencies", INSERT_AGENCY, bind_agency, false)
            .await?;
        let mut loaded = rows.len() - failed.len();
        for row in failed {
            if self.try_upsert("agencies", self.upsert_agency(row).await) {
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    async fn bulk_insert_routes(&self, rows: &[Route]) -> Result<usize, ScheduleError> {
        let failed = self
            .insert_chunked(rows, "routes", INSERT_ROUTE, bind_route, false)
            .await?;
        let mut loaded = rows.len() - failed.len();
        for row in failed {
            if self.try_upsert("routes", self.upsert_route(row).await) {
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    async fn bulk_insert_trips(&self, rows: &[Trip]) -> Result<usize, ScheduleError> {
        let failed = self
            .insert_chunked(rows, "trips", INSERT_TRIP, bind_trip, false)
            .await?;
        let mut loaded = rows.len() - failed.len();
        for row in failed {
            if self.try_upsert("trips", self.upsert_trip(row).await) {
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    async fn bulk_insert_stops(&self, rows: &[Stop]) -> Result<usize, ScheduleError> {
        let failed = self
            .insert_chunked(rows, "stops", INSERT_STOP, bind_stop, false)
            .await?;
        let mut loaded = rows.len() - failed.len();
        for row in failed {
            if self.try_upsert("stops", self.upsert_stop(row).await) {
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    async fn bulk_insert_stop_times(
        &self,
        rows: &[StopTimeRecord],
    ) -> Result<usize, ScheduleError> {
        let failed = self
            .insert_chunked(rows, "stop_times", INSERT_STOP_TIME, bind_stop_time, true)
            .await?;
        let mut loaded = rows.len() - failed.len();
        for row in failed {
            if self.try_upsert("stop_times", self.upsert_stop_time(row).await) {
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    async fn bulk_insert_calendars(&self, rows: &[Calendar]) -> Result<usize, ScheduleError> {
        let failed = self
            .insert_chunked(rows, "calendars", INSERT_CALENDAR, bind_calendar, false)
            .await?;
        let mut loaded = rows.len() - failed.len();
        for row in failed {
            if self.try_upsert("calendars", self.upsert_calendar(row).await) {
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    async fn bulk_insert_calendar_exceptions(
        &self,
        rows: &[CalendarException],
    ) -> Result<usize, ScheduleError> {
        let failed = self
            .insert_chunked(
                rows,
                "calendar_dates",
                INSERT_CALENDAR_DATE,
                bind_calendar_date,
                false,
            )
            .await?;
        let mut loaded = rows.len() - failed.len();
        for row in failed {
            if self.try_upsert("calendar_dates", self.upsert_calendar_exception(row).await) {
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    /// inserts rows in transactions of [`CHUNK_SIZE`]; returns the rows of
    /// every chunk that failed, for the caller's per-row upsert fallback
    async fn insert_chunked<'r, T, F>(
        &self,
        rows: &'r [T],
        table: &str,
        insert_sql: &'static str,
        bind: F,
        with_progress: bool,
    ) -> Result<Vec<&'r T>, ScheduleError>
    where
        F: for<'q> Fn(SqliteQuery<'q>, &'q T) -> SqliteQuery<'q>,
    {
        let mut failed: Vec<&'r T> = Vec::new();
        let chunk_count = rows.len().div_ceil(CHUNK_SIZE);
        let mut chunks: Box<dyn Iterator<Item = &'r [T]> + 'r> = Box::new(rows.chunks(CHUNK_SIZE));
        if with_progress {
            chunks = Box::new(tqdm!(
                rows.chunks(CHUNK_SIZE),
                total = chunk_count,
                desc = table.to_string()
            ));
        }
        for chunk in chunks {
            match self.insert_chunk(chunk, insert_sql, &bind).await {
                Ok(()) => {}
                Err(e) => {
                    log::warn!(
                        "chunk of {} rows failed on '{table}', falling back to row upserts: {e}",
                        chunk.len()
                    );
                    failed.extend(chunk.iter());
                }
            }
        }
        if with_progress {
            eprintln!();
        }
        Ok(failed)
    }

    async fn insert_chunk<T, F>(
        &self,
        chunk: &[T],
        insert_sql: &'static str,
        bind: &F,
    ) -> Result<(), ScheduleError>
    where
        F: for<'q> Fn(SqliteQuery<'q>, &'q T) -> SqliteQuery<'q>,
    {
        let mut tx = self.pool().begin().await?;
        for row in chunk {
            bind(sqlx::query(insert_sql), row)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// logs and swallows a failed row-level upsert; the row is dropped
    fn try_upsert(&self, table: &str, outcome: Result<(), ScheduleError>) -> bool {
        match outcome {
            Ok(()) => true,
            Err(e) => {
                log::debug!("dropping row on '{table}': {e}");
                false
            }
        }
    }
}

fn ensure_required_tables(dir: &Path) -> Result<(), ScheduleError> {
    for file in REQUIRED_TABLES {
        if !dir.join(file).is_file() {
            return Err(ScheduleError::ScheduleNotLoaded(file.to_string()));
        }
    }
    Ok(())
}

fn read_table<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<Vec<T>, ScheduleError> {
    let path = dir.join(name);
    let mut reader = csv::Reader::from_path(&path)
        .map_err(|e| ScheduleError::TableRead(name.to_string(), e.to_string()))?;
    let mut rows = Vec::new();
    let mut dropped = 0usize;
    for result in reader.deserialize::<T>() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) => {
                dropped += 1;
                log::debug!("dropping row of {name}: {e}");
            }
        }
    }
    if dropped > 0 {
        log::warn!("dropped {dropped} unreadable rows from {name}");
    }
    Ok(rows)
}

fn decode_calendar_dates(raw: Vec<RawCalendarDate>) -> Vec<CalendarException> {
    raw.into_iter()
        .filter_map(|row| match ExceptionKind::from_gtfs_code(&row.exception_type) {
            Some(kind) => Some(CalendarException {
                service_id: row.service_id,
                date: row.date,
                exception_type: kind,
            }),
            None => {
                log::debug!(
                    "dropping calendar_dates row for {}: unknown exception_type '{}'",
                    row.service_id,
                    row.exception_type
                );
                None
            }
        })
        .collect()
}

const INSERT_AGENCY: &str = r#"
    INSERT INTO agencies (agency_id, agency_name, agency_url, agency_timezone, agency_lang)
    VALUES (?, ?, ?, ?, ?)
"#;

fn bind_agency<'q>(query: SqliteQuery<'q>, row: &'q Agency) -> SqliteQuery<'q> {
    query
        .bind(&row.agency_id)
        .bind(&row.agency_name)
        .bind(&row.agency_url)
        .bind(&row.agency_timezone)
        .bind(&row.agency_lang)
}

const INSERT_ROUTE: &str = r#"
    INSERT INTO routes (route_id, agency_id, route_short_name, route_long_name,
                        route_type, route_color, route_text_color)
    VALUES (?, ?, ?, ?, ?, ?, ?)
"#;

fn bind_route<'q>(query: SqliteQuery<'q>, row: &'q Route) -> SqliteQuery<'q> {
    query
        .bind(&row.route_id)
        .bind(&row.agency_id)
        .bind(&row.route_short_name)
        .bind(&row.route_long_name)
        .bind(&row.route_type)
        .bind(&row.route_color)
        .bind(&row.route_text_color)
}

const INSERT_TRIP: &str = r#"
    INSERT INTO trips (trip_id, route_id, service_id, trip_headsign, direction_id, block_id)
    VALUES (?, ?, ?, ?, ?, ?)
"#;

fn bind_trip<'q>(query: SqliteQuery<'q>, row: &'q Trip) -> SqliteQuery<'q> {
    query
        .bind(&row.trip_id)
        .bind(&row.route_id)
        .bind(&row.service_id)
        .bind(&row.trip_headsign)
        .bind(&row.direction_id)
        .bind(&row.block_id)
}

const INSERT_STOP: &str = r#"
    INSERT INTO stops (stop_id, stop_name, stop_desc, stop_lat, stop_lon,
                       zone_id, location_type, parent_station)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
"#;

fn bind_stop<'q>(query: SqliteQuery<'q>, row: &'q Stop) -> SqliteQuery<'q> {
    query
        .bind(&row.stop_id)
        .bind(&row.stop_name)
        .bind(&row.stop_desc)
        .bind(row.stop_lat)
        .bind(row.stop_lon)
        .bind(&row.zone_id)
        .bind(&row.location_type)
        .bind(&row.parent_station)
}

const INSERT_STOP_TIME: &str = r#"
    INSERT INTO stop_times (trip_id, stop_id, arrival_time, departure_time,
                            stop_sequence, stop_headsign, pickup_type, drop_off_type)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
"#;

fn bind_stop_time<'q>(query: SqliteQuery<'q>, row: &'q StopTimeRecord) -> SqliteQuery<'q> {
    query
        .bind(&row.trip_id)
        .bind(&row.stop_id)
        .bind(row.arrival_time.to_string())
        .bind(row.departure_time.to_string())
        .bind(row.stop_sequence as i64)
        .bind(&row.stop_headsign)
        .bind(&row.pickup_type)
        .bind(&row.drop_off_type)
}

const INSERT_CALENDAR: &str = r#"
    INSERT INTO calendars (service_id, monday, tuesday, wednesday, thursday,
                           friday, saturday, sunday, start_date, end_date)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

fn bind_calendar<'q>(query: SqliteQuery<'q>, row: &'q Calendar) -> SqliteQuery<'q> {
    query
        .bind(&row.service_id)
        .bind(row.monday as i64)
        .bind(row.tuesday as i64)
        .bind(row.wednesday as i64)
        .bind(row.thursday as i64)
        .bind(row.friday as i64)
        .bind(row.saturday as i64)
        .bind(row.sunday as i64)
        .bind(row.start_date.to_string())
        .bind(row.end_date.to_string())
}

const INSERT_CALENDAR_DATE: &str = r#"
    INSERT INTO calendar_dates (service_id, date, exception_type)
    VALUES (?, ?, ?)
"#;

fn bind_calendar_date<'q>(query: SqliteQuery<'q>, row: &'q CalendarException) -> SqliteQuery<'q> {
    query
        .bind(&row.service_id)
        .bind(row.date.to_string())
        .bind(row.exception_type.gtfs_code())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_minimal_gtfs(dir: &Path) {
        fs::write(
            dir.join("agency.txt"),
            "agency_id,agency_name\nAG1,Suburban Rail\n",
        )
        .unwrap();
        fs::write(
            dir.join("routes.txt"),
            "route_id,agency_id,route_short_name\nR1,AG1,C\n",
        )
        .unwrap();
        fs::write(
            dir.join("trips.txt"),
            "trip_id,route_id,service_id\nDUASN123456F01001,R1,S1\n",
        )
        .unwrap();
        fs::write(
            dir.join("stops.txt"),
            "stop_id,stop_name,stop_lat,stop_lon\nStopPoint:DUA8739300,Javel,48.8,2.2\n",
        )
        .unwrap();
        fs::write(
            dir.join("stop_times.txt"),
            "trip_id,stop_id,arrival_time,departure_time,stop_sequence\n\
             DUASN123456F01001,StopPoint:DUA8739300,08:00:00,08:01:00,0\n\
             DUASN123456F01001,StopPoint:DUA8739301,08:10:00,bad-time,1\n",
        )
        .unwrap();
        fs::write(
            dir.join("calendar.txt"),
            "service_id,monday,tuesday,wednesday,thursday,friday,saturday,sunday,start_date,end_date\n\
             S1,1,1,1,1,1,0,0,20170102,20170707\n",
        )
        .unwrap();
        fs::write(
            dir.join("calendar_dates.txt"),
            "service_id,date,exception_type\nS1,20170202,2\nS1,20170203,9\n",
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_load_gtfs_directory() {
        let dir = tempfile::tempdir().unwrap();
        write_minimal_gtfs(dir.path());
        let store = ScheduleStore::in_memory().await.unwrap();
        let summary = store.load_gtfs_directory(dir.path()).await.unwrap();

        assert_eq!(summary.agencies, 1);
        assert_eq!(summary.routes, 1);
        assert_eq!(summary.trips, 1);
        // the row with the malformed departure time is dropped
        assert_eq!(summary.stop_times, 1);
        assert_eq!(summary.calendars, 1);
        // the unknown exception_type code is dropped
        assert_eq!(summary.calendar_exceptions, 1);
    }

    #[tokio::test]
    async fn test_reload_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_minimal_gtfs(dir.path());
        let store = ScheduleStore::in_memory().await.unwrap();
        let first = store.load_gtfs_directory(dir.path()).await.unwrap();
        let second = store.load_gtfs_directory(dir.path()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_missing_required_file_is_schedule_not_loaded() {
        let dir = tempfile::tempdir().unwrap();
        write_minimal_gtfs(dir.path());
        fs::remove_file(dir.path().join("stop_times.txt")).unwrap();
        let store = ScheduleStore::in_memory().await.unwrap();
        let result = store.load_gtfs_directory(dir.path()).await;
        assert!(matches!(
            result,
            Err(ScheduleError::ScheduleNotLoaded(f)) if f == "stop_times.txt"
        ));
    }
}
