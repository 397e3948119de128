use raildelay_core::error::ClockError;
use raildelay_gtfs::error::ScheduleError;
use raildelay_realtime::error::RealtimeError;

#[derive(thiserror::Error, Debug)]
pub enum EtlError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Realtime(#[from] RealtimeError),
    #[error("clock failure: {0}")]
    Clock(#[from] ClockError),
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("a schedule refresh is already running ({0})")]
    ConcurrentRefresh(String),
    #[error("failure writing output artifact: {0}")]
    Output(String),
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("async runtime failure: {0}")]
    Runtime(String),
}
