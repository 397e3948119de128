//! in-memory schedule fixtures shared by the store and resolver tests.

use std::str::FromStr;

use raildelay_core::clock::{ExtendedTime, ServiceDay};
use raildelay_core::model::{
    Agency, Calendar, CalendarException, ExceptionKind, Route, Stop, StopTimeRecord, Trip,
};

use crate::store::ScheduleStore;

pub(crate) const TRIP_A: &str = "DUASN111111F01001";
pub(crate) const TRIP_B: &str = "DUASN222222F01002";
pub(crate) const SERVICE_WEEKDAYS: &str = "S1";
pub(crate) const SERVICE_EXTRA: &str = "S2";

/// a Thursday covered by SERVICE_WEEKDAYS
pub(crate) fn service_day() -> ServiceDay {
    ServiceDay::from_str("20170202").unwrap()
}

pub(crate) fn stop_time(trip_id: &str, station: &str, dep: &str, sequence: u32) -> StopTimeRecord {
    StopTimeRecord {
        trip_id: trip_id.to_string(),
        stop_id: format!("StopPoint:DUA{station}"),
        arrival_time: ExtendedTime::from_str(dep).unwrap(),
        departure_time: ExtendedTime::from_str(dep).unwrap(),
        stop_sequence: sequence,
        stop_headsign: None,
        pickup_type: None,
        drop_off_type: None,
    }
}

fn stop(station: &str, name: &str) -> Stop {
    Stop {
        stop_id: format!("StopPoint:DUA{station}"),
        stop_name: Some(name.to_string()),
        stop_desc: None,
        stop_lat: Some(48.8),
        stop_lon: Some(2.3),
        zone_id: None,
        location_type: None,
        parent_station: None,
    }
}

fn route(route_id: &str, short_name: &str) -> Route {
    Route {
        route_id: route_id.to_string(),
        agency_id: Some("AG1".to_string()),
        route_short_name: Some(short_name.to_string()),
        route_long_name: None,
        route_type: Some("2".to_string()),
        route_color: None,
        route_text_color: None,
    }
}

fn weekday_calendar(service_id: &str) -> Calendar {
    Calendar {
        service_id: service_id.to_string(),
        monday: 1,
        tuesday: 1,
        wednesday: 1,
        thursday: 1,
        friday: 1,
        saturday: 0,
        sunday: 0,
        start_date: ServiceDay::from_str("20170101").unwrap(),
        end_date: ServiceDay::from_str("20171231").unwrap(),
    }
}

/// two trips on lines C and J, five stations, one weekday service, plus a
/// second service added by exception on 20170202 with no trips of its own
pub(crate) async fn small_network() -> ScheduleStore {
    let store = ScheduleStore::in_memory().await.unwrap();

    store
        .upsert_agency(&Agency {
            agency_id: "AG1".to_string(),
            agency_name: Some("Suburban Rail".to_string()),
            agency_url: None,
            agency_timezone: Some("Europe/Paris".to_string()),
            agency_lang: None,
        })
        .await
        .unwrap();

    for r in [route("R1", "C"), route("R2", "C"), route("R3", "J")] {
        store.upsert_route(&r).await.unwrap();
    }

    for (trip_id, route_id) in [(TRIP_A, "R1"), (TRIP_B, "R3")] {
        store
            .upsert_trip(&Trip {
                trip_id: trip_id.to_string(),
                route_id: route_id.to_string(),
                service_id: SERVICE_WEEKDAYS.to_string(),
                trip_headsign: None,
                direction_id: Some("0".to_string()),
                block_id: None,
            })
            .await
            .unwrap();
    }

    for (station, name) in [
        ("8739300", "Javel"),
        ("8739301", "Pont du Garigliano"),
        ("8739302", "Issy"),
        ("8739303", "Meudon"),
        ("8739304", "Chaville"),
    ] {
        store.upsert_stop(&stop(station, name)).await.unwrap();
    }

    for st in [
        stop_time(TRIP_A, "8739300", "08:00:00", 0),
        stop_time(TRIP_A, "8739301", "08:10:00", 1),
        stop_time(TRIP_A, "8739302", "08:20:00", 2),
        stop_time(TRIP_B, "8739303", "08:05:00", 0),
        stop_time(TRIP_B, "8739304", "08:15:00", 1),
    ] {
        store.upsert_stop_time(&st).await.unwrap();
    }

    store
        .upsert_calendar(&weekday_calendar(SERVICE_WEEKDAYS))
        .await
        .unwrap();
    store
        .upsert_calendar_exception(&CalendarException {
            service_id: SERVICE_EXTRA.to_string(),
            date: service_day(),
            exception_type: ExceptionKind::Added,
        })
        .await
        .unwrap();

    store
}
