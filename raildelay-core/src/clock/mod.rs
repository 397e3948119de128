mod extended_time;
pub mod ops;
mod service_day;

pub use extended_time::ExtendedTime;
pub use service_day::ServiceDay;

/// format used for service days everywhere in the pipeline (keys, files, logs)
pub const SERVICE_DAY_FORMAT: &str = "%Y%m%d";

/// format of the datetime field in vendor passage payloads
pub const VENDOR_DATETIME_FORMAT: &str = "%d/%m/%Y %H:%M";

/// wall-clock hours below this value belong to the previous service day,
/// shifted by +24h on the extended clock
pub const EARLY_MORNING_LIMIT: u32 = 3;
