//! active-service resolution for one day: the base weekday calendar,
//! plus added exceptions, minus removed ones.

use std::collections::BTreeSet;

use raildelay_core::clock::ServiceDay;
use raildelay_core::model::{Calendar, CalendarException, ExceptionKind};

/// the set of service ids running on a day, sorted for determinism
pub fn active_service_ids(
    calendars: &[Calendar],
    exceptions: &[CalendarException],
    day: &ServiceDay,
) -> Vec<String> {
    let mut services: BTreeSet<String> = calendars
        .iter()
        .filter(|calendar| calendar.covers(day))
        .map(|calendar| calendar.service_id.clone())
        .collect();

    for exception in exceptions {
        if exception.date != *day {
            continue;
        }
        match exception.exception_type {
            ExceptionKind::Added => {
                services.insert(exception.service_id.clone());
            }
            ExceptionKind::Removed => {
                services.remove(&exception.service_id);
            }
        }
    }
    services.into_iter().collect()
}
