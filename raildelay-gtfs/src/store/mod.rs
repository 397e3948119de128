#[cfg(test)]
pub(crate) mod fixtures;
mod load;
mod predictor;
mod query;
mod schema;

pub use load::LoadSummary;
pub use predictor::PredictorRecord;
pub use query::{Projection, StopTimeFilter};

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::error::ScheduleError;

/// relational store for the seven GTFS tables plus trained predictors.
///
/// the pool is shared and session-scoped; every query checks a connection
/// out and returns it when done.
pub struct ScheduleStore {
    pool: SqlitePool,
}

impl ScheduleStore {
    /// connects to the given sqlx database url and prepares the schema
    pub async fn connect(url: &str) -> Result<ScheduleStore, ScheduleError> {
        let pool = SqlitePoolOptions::new().connect(url).await?;
        let store = ScheduleStore { pool };
        store.create_tables().await?;
        Ok(store)
    }

    /// opens (and creates if needed) a database file on disk
    pub async fn open_file(path: &std::path::Path) -> Result<ScheduleStore, ScheduleError> {
        let url = format!("sqlite://{}?mode=rwc", path.display());
        ScheduleStore::connect(&url).await
    }

    /// a private in-memory store. restricted to a single connection, since
    /// every sqlite in-memory connection is its own database.
    pub async fn in_memory() -> Result<ScheduleStore, ScheduleError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = ScheduleStore { pool };
        store.create_tables().await?;
        Ok(store)
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
