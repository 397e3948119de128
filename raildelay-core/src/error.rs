#[derive(thiserror::Error, Debug)]
pub enum ClockError {
    #[error("invalid service day '{0}': expected yyyymmdd")]
    InvalidServiceDay(String),
    #[error("invalid time '{0}': expected hh:mm:ss with hour in [0,28]")]
    InvalidTime(String),
    #[error("invalid datetime '{0}': {1}")]
    InvalidDatetime(String, String),
}
