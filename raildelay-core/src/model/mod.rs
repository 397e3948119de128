mod gtfs;
pub mod keys;
mod passage;
mod schedule_row;

pub use gtfs::{
    Agency, Calendar, CalendarException, ExceptionKind, Route, Stop, StopTimeRecord, Trip,
};
pub use passage::{PassageKey, RealtimePassage};
pub use schedule_row::ScheduleRow;
