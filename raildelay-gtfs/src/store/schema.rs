//! table creation and single-row upserts, keyed on each entity's primary
//! key so every write path is idempotent.

use raildelay_core::model::{
    Agency, Calendar, CalendarException, Route, Stop, StopTimeRecord, Trip,
};

use crate::error::ScheduleError;
use crate::store::ScheduleStore;

const CREATE_STATEMENTS: [&str; 10] = [
    r#"
    CREATE TABLE IF NOT EXISTS agencies (
        agency_id TEXT PRIMARY KEY,
        agency_name TEXT,
        agency_url TEXT,
        agency_timezone TEXT,
        agency_lang TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS routes (
        route_id TEXT PRIMARY KEY,
        agency_id TEXT,
        route_short_name TEXT,
        route_long_name TEXT,
        route_type TEXT,
        route_color TEXT,
        route_text_color TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS trips (
        trip_id TEXT PRIMARY KEY,
        route_id TEXT NOT NULL,
        service_id TEXT NOT NULL,
        trip_headsign TEXT,
        direction_id TEXT,
        block_id TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS stops (
        stop_id TEXT PRIMARY KEY,
        stop_name TEXT,
        stop_desc TEXT,
        stop_lat REAL,
        stop_lon REAL,
        zone_id TEXT,
        location_type TEXT,
        parent_station TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS stop_times (
        trip_id TEXT NOT NULL,
        stop_id TEXT NOT NULL,
        arrival_time TEXT NOT NULL,
        departure_time TEXT NOT NULL,
        stop_sequence INTEGER NOT NULL,
        stop_headsign TEXT,
        pickup_type TEXT,
        drop_off_type TEXT,
        PRIMARY KEY (trip_id, stop_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_stop_times_stop ON stop_times (stop_id)",
    "CREATE INDEX IF NOT EXISTS idx_stop_times_departure ON stop_times (departure_time)",
    r#"
    CREATE TABLE IF NOT EXISTS calendars (
        service_id TEXT PRIMARY KEY,
        monday INTEGER NOT NULL,
        tuesday INTEGER NOT NULL,
        wednesday INTEGER NOT NULL,
        thursday INTEGER NOT NULL,
        friday INTEGER NOT NULL,
        saturday INTEGER NOT NULL,
        sunday INTEGER NOT NULL,
        start_date TEXT NOT NULL,
        end_date TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS calendar_dates (
        service_id TEXT NOT NULL,
        date TEXT NOT NULL,
        exception_type TEXT NOT NULL,
        PRIMARY KEY (service_id, date, exception_type)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS predictors (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        line TEXT NOT NULL,
        features TEXT NOT NULL,
        training_start TEXT NOT NULL,
        training_end TEXT NOT NULL,
        version_tag TEXT NOT NULL,
        score_notes TEXT,
        pipeline BLOB NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    )
    "#,
];

impl ScheduleStore {
    pub(crate) async fn create_tables(&self) -> Result<(), ScheduleError> {
        for statement in CREATE_STATEMENTS {
            sqlx::query(statement).execute(self.pool()).await?;
        }
        Ok(())
    }

    pub async fn upsert_agency(&self, agency: &Agency) -> Result<(), ScheduleError> {
        sqlx::query(
            r#"
            INSERT INTO agencies (agency_id, agency_name, agency_url, agency_timezone, agency_lang)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(agency_id) DO UPDATE SET
                agency_name = excluded.agency_name,
                agency_url = excluded.agency_url,
                agency_timezone = excluded.agency_timezone,
                agency_lang = excluded.agency_lang
            "#,
        )
        .bind(&agency.agency_id)
        .bind(&agency.agency_name)
        .bind(&agency.agency_url)
        .bind(&agency.agency_timezone)
        .bind(&agency.agency_lang)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn upsert_route(&self, route: &Route) -> Result<(), ScheduleError> {
        sqlx::query(
            r#"
            INSERT INTO routes (route_id, agency_id, route_short_name, route_long_name,
                                route_type, route_color, route_text_color)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(route_id) DO UPDATE SET
                agency_id = excluded.agency_id,
                route_short_name = excluded.route_short_name,
                route_long_name = excluded.route_long_name,
                route_type = excluded.route_type,
                route_color = excluded.route_color,
                route_text_color = excluded.route_text_color
            "#,
        )
        .bind(&route.route_id)
        .bind(&route.agency_id)
        .bind(&route.route_short_name)
        .bind(&route.route_long_name)
        .bind(&route.route_type)
        .bind(&route.route_color)
        .bind(&route.route_text_color)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn upsert_trip(&self, trip: &Trip) -> Result<(), ScheduleError> {
        sqlx::query(
            r#"
            INSERT INTO trips (trip_id, route_id, service_id, trip_headsign, direction_id, block_id)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(trip_id) DO UPDATE SET
                route_id = excluded.route_id,
                service_id = excluded.service_id,
                trip_headsign = excluded.trip_headsign,
                direction_id = excluded.direction_id,
                block_id = excluded.block_id
            "#,
        )
        .bind(&trip.trip_id)
        .bind(&trip.route_id)
        .bind(&trip.service_id)
        .bind(&trip.trip_headsign)
        .bind(&trip.direction_id)
        .bind(&trip.block_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn upsert_stop(&self, stop: &Stop) -> Result<(), ScheduleError> {
        sqlx::query(
            r#"
            INSERT INTO stops (stop_id, stop_name, stop_desc, stop_lat, stop_lon,
                               zone_id, location_type, parent_station)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(stop_id) DO UPDATE SET
                stop_name = excluded.stop_name,
                stop_desc = excluded.stop_desc,
                stop_lat = excluded.stop_lat,
                stop_lon = excluded.stop_lon,
                zone_id = excluded.zone_id,
                location_type = excluded.location_type,
                parent_station = excluded.parent_station
            "#,
        )
        .bind(&stop.stop_id)
        .bind(&stop.stop_name)
        .bind(&stop.stop_desc)
        .bind(stop.stop_lat)
        .bind(stop.stop_lon)
        .bind(&stop.zone_id)
        .bind(&stop.location_type)
        .bind(&stop.parent_station)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn upsert_stop_time(&self, stop_time: &StopTimeRecord) -> Result<(), ScheduleError> {
        sqlx::query(
            r#"
            INSERT INTO stop_times (trip_id, stop_id, arrival_time, departure_time,
                                    stop_sequence, stop_headsign, pickup_type, drop_off_type)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(trip_id, stop_id) DO UPDATE SET
                arrival_time = excluded.arrival_time,
                departure_time = excluded.departure_time,
                stop_sequence = excluded.stop_sequence,
                stop_headsign = excluded.stop_headsign,
                pickup_type = excluded.pickup_type,
                drop_off_type = excluded.drop_off_type
            "#,
        )
        .bind(&stop_time.trip_id)
        .bind(&stop_time.stop_id)
        .bind(stop_time.arrival_time.to_string())
        .bind(stop_time.departure_time.to_string())
        .bind(stop_time.stop_sequence as i64)
        .bind(&stop_time.stop_headsign)
        .bind(&stop_time.pickup_type)
        .bind(&stop_time.drop_off_type)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn upsert_calendar(&self, calendar: &Calendar) -> Result<(), ScheduleError> {
        sqlx::query(
            r#"
            INSERT INTO calendars (service_id, monday, tuesday, wednesday, thursday,
                                   friday, saturday, sunday, start_date, end_date)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(service_id) DO UPDATE SET
                monday = excluded.monday,
                tuesday = excluded.tuesday,
                wednesday = excluded.wednesday,
                thursday = excluded.thursday,
                friday = excluded.friday,
                saturday = excluded.saturday,
                sunday = excluded.sunday,
                start_date = excluded.start_date,
                end_date = excluded.end_date
            "#,
        )
        .bind(&calendar.service_id)
        .bind(calendar.monday as i64)
        .bind(calendar.tuesday as i64)
        .bind(calendar.wednesday as i64)
        .bind(calendar.thursday as i64)
        .bind(calendar.friday as i64)
        .bind(calendar.saturday as i64)
        .bind(calendar.sunday as i64)
        .bind(calendar.start_date.to_string())
        .bind(calendar.end_date.to_string())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn upsert_calendar_exception(
        &self,
        exception: &CalendarException,
    ) -> Result<(), ScheduleError> {
        sqlx::query(
            r#"
            INSERT INTO calendar_dates (service_id, date, exception_type)
            VALUES (?, ?, ?)
            ON CONFLICT(service_id, date, exception_type) DO NOTHING
            "#,
        )
        .bind(&exception.service_id)
        .bind(exception.date.to_string())
        .bind(exception.exception_type.gtfs_code())
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
