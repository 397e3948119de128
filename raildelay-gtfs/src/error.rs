use raildelay_core::error::ClockError;

#[derive(thiserror::Error, Debug)]
pub enum ScheduleError {
    #[error("schedule not loaded: missing required GTFS file '{0}'")]
    ScheduleNotLoaded(String),
    #[error("failure on schedule store: {0}")]
    Store(#[from] sqlx::Error),
    #[error("failure reading GTFS table '{0}': {1}")]
    TableRead(String, String),
    #[error("failure fetching GTFS archives: {0}")]
    Fetch(String),
    #[error("GTFS archive is malformed: {0}")]
    MalformedArchive(String),
    #[error("canonical archive directory '{0}' missing after extraction")]
    CanonicalArchiveMissing(String),
    #[error("failure mirroring GTFS snapshot to object storage: {0}")]
    Snapshot(String),
    #[error("clock failure in schedule data: {0}")]
    Clock(#[from] ClockError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
