//! derived identifiers shared by the schedule and realtime sides of the
//! pipeline. realtime passages and scheduled stops only ever meet through
//! the (station_id, day_train_num) compound key built here.

use crate::clock::ServiceDay;

/// the GTFS station code: the last 7 characters of a stop id, all digits.
/// returns None when the stop id carries no station code.
pub fn station_id_of_stop(stop_id: &str) -> Option<String> {
    let tail = stop_id.get(stop_id.len().checked_sub(7)?..)?;
    if tail.chars().all(|c| c.is_ascii_digit()) {
        Some(tail.to_string())
    } else {
        None
    }
}

/// the train number embedded in a trip id: characters 6 through 11, all
/// digits. returns None when the trip id does not carry one.
pub fn train_num_of_trip(trip_id: &str) -> Option<String> {
    let num = trip_id.get(5..11)?;
    if num.chars().all(|c| c.is_ascii_digit()) {
        Some(num.to_string())
    } else {
        None
    }
}

/// the range key of a realtime passage: `yyyymmdd_NNNNNN`
pub fn day_train_num(day: &ServiceDay, train_num: &str) -> String {
    format!("{day}_{train_num}")
}

/// an API station code (8 digits) reduced to its GTFS form (7 digits)
pub fn station_id_of_api_station(station_8d: &str) -> Option<String> {
    if station_8d.len() < 2 {
        return None;
    }
    Some(station_8d[..station_8d.len() - 1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_station_id_of_stop() {
        assert_eq!(
            station_id_of_stop("StopPoint:DUA8739300"),
            Some("8739300".to_string())
        );
        assert_eq!(station_id_of_stop("StopArea:DUAHIDDEN"), None);
        assert_eq!(station_id_of_stop("short"), None);
    }

    #[test]
    fn test_train_num_of_trip() {
        assert_eq!(
            train_num_of_trip("DUASN123456F01001"),
            Some("123456".to_string())
        );
        assert_eq!(train_num_of_trip("DUASNABCDEF01001"), None);
        assert_eq!(train_num_of_trip("DUA"), None);
    }

    #[test]
    fn test_day_train_num() {
        let day = ServiceDay::from_str("20170202").unwrap();
        assert_eq!(day_train_num(&day, "123456"), "20170202_123456");
    }

    #[test]
    fn test_station_id_of_api_station() {
        assert_eq!(
            station_id_of_api_station("87393009"),
            Some("8739300".to_string())
        );
    }
}
