//! conversions between wall-clock datetimes and (service day, extended time)
//! pairs, and signed delay arithmetic between schedule and realtime clocks.

use chrono::{Duration, NaiveDateTime, Timelike};

use crate::clock::{
    ExtendedTime, ServiceDay, EARLY_MORNING_LIMIT, VENDOR_DATETIME_FORMAT,
};
use crate::error::ClockError;

const SECS_IN_DAY: i64 = 86_400;

/// reduces an extended (service day, time) pair to the wall-clock datetime
/// it denotes. hours 24-28 land on the following calendar day.
pub fn extended_to_wall(
    day: &ServiceDay,
    time: &ExtendedTime,
) -> Result<NaiveDateTime, ClockError> {
    let midnight = day
        .date()
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| ClockError::InvalidServiceDay(day.to_string()))?;
    Ok(midnight + Duration::seconds(time.total_seconds() as i64))
}

/// attributes a wall-clock datetime to its service day. datetimes before
/// [`EARLY_MORNING_LIMIT`] belong to the previous service day with the
/// hour shifted by +24 on the extended clock.
pub fn wall_to_extended(dt: &NaiveDateTime) -> Result<(ServiceDay, ExtendedTime), ClockError> {
    let day = ServiceDay::new(dt.date());
    if dt.hour() < EARLY_MORNING_LIMIT {
        let time = ExtendedTime::new(dt.hour() + 24, dt.minute(), dt.second())?;
        Ok((day.previous()?, time))
    } else {
        let time = ExtendedTime::new(dt.hour(), dt.minute(), dt.second())?;
        Ok((day, time))
    }
}

/// parses a vendor passage datetime (`DD/MM/YYYY HH:MM`) and attributes it
/// to its service day.
pub fn reduce_vendor_datetime(raw: &str) -> Result<(ServiceDay, ExtendedTime), ClockError> {
    let dt = NaiveDateTime::parse_from_str(raw, VENDOR_DATETIME_FORMAT)
        .map_err(|e| ClockError::InvalidDatetime(raw.to_string(), e.to_string()))?;
    wall_to_extended(&dt)
}

/// signed seconds between a scheduled and an observed time of day, positive
/// when the observation is later than schedule.
///
/// both operands are taken modulo 24h and a delta larger than half a day is
/// treated as a midnight crossing, so 23:59:00 vs 00:01:00 yields +120
/// rather than -86280.
pub fn compute_delay(scheduled: &ExtendedTime, real: &ExtendedTime) -> i64 {
    let s = scheduled.total_seconds() as i64 % SECS_IN_DAY;
    let r = real.total_seconds() as i64 % SECS_IN_DAY;
    let mut delta = r - s;
    if delta > SECS_IN_DAY / 2 {
        delta -= SECS_IN_DAY;
    } else if delta < -(SECS_IN_DAY / 2) {
        delta += SECS_IN_DAY;
    }
    delta
}

/// signed seconds from an extended (day, time) pair to a wall-clock
/// datetime, positive when the datetime is later.
pub fn seconds_since_extended(
    dt: &NaiveDateTime,
    day: &ServiceDay,
    time: &ExtendedTime,
) -> Result<i64, ClockError> {
    let reference = extended_to_wall(day, time)?;
    Ok((*dt - reference).num_seconds())
}

/// signed seconds between two extended (day, time) pairs, positive when the
/// first is later. day attribution makes this exact across midnight.
pub fn seconds_between_extended(
    day_a: &ServiceDay,
    time_a: &ExtendedTime,
    day_b: &ServiceDay,
    time_b: &ExtendedTime,
) -> Result<i64, ClockError> {
    let a = extended_to_wall(day_a, time_a)?;
    let b = extended_to_wall(day_b, time_b)?;
    Ok((a - b).num_seconds())
}
