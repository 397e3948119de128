//! turns raw vendor departure boards into canonical passage records.
//! the raw XML tree never crosses this module's boundary.

use chrono::{NaiveDateTime, Timelike};
use serde::Deserialize;

use raildelay_core::clock::{ops, ExtendedTime, ServiceDay};
use raildelay_core::model::{keys, RealtimePassage};

use crate::error::RealtimeError;

/// vendor payload root: `<passages><train>...</train>...</passages>`
#[derive(Debug, Deserialize)]
struct PassagesDocument {
    #[serde(rename = "train", default)]
    trains: Vec<TrainEntry>,
}

#[derive(Debug, Deserialize)]
struct TrainEntry {
    date: DateField,
    num: String,
    #[serde(default)]
    miss: Option<String>,
    #[serde(default)]
    term: Option<String>,
    #[serde(default)]
    etat: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DateField {
    #[serde(rename = "@mode", default)]
    #[allow(dead_code)]
    mode: Option<String>,
    #[serde(rename = "$text")]
    text: String,
}

/// parses one station payload into passage records.
///
/// a payload whose root cannot be read fails as a whole (the caller skips
/// the station); a single unreadable train entry is dropped with a debug
/// log and never aborts the rest of the board.
pub fn normalize_station_payload(
    xml: &str,
    station_8d: &str,
    requested_at: &NaiveDateTime,
) -> Result<Vec<RealtimePassage>, RealtimeError> {
    let document: PassagesDocument = quick_xml::de::from_str(xml)
        .map_err(|e| RealtimeError::Parse(format!("station {station_8d}: {e}")))?;

    let station_id = keys::station_id_of_api_station(station_8d).ok_or_else(|| {
        RealtimeError::Parse(format!("station code '{station_8d}' is too short"))
    })?;

    let request_day = ServiceDay::new(requested_at.date());
    let request_time = ExtendedTime::new(
        requested_at.hour(),
        requested_at.minute(),
        requested_at.second(),
    )?;

    let mut passages = Vec::with_capacity(document.trains.len());
    for entry in document.trains {
        match normalize_entry(entry, station_8d, &station_id, &request_day, &request_time) {
            Ok(passage) => passages.push(passage),
            Err(e) => {
                log::debug!("dropping train entry at station {station_8d}: {e}");
            }
        }
    }
    Ok(passages)
}

fn normalize_entry(
    entry: TrainEntry,
    station_8d: &str,
    station_id: &str,
    request_day: &ServiceDay,
    request_time: &ExtendedTime,
) -> Result<RealtimePassage, RealtimeError> {
    let (expected_day, expected_time) = ops::reduce_vendor_datetime(&entry.date.text)?;
    let day_train_num = keys::day_train_num(&expected_day, &entry.num);
    let data_freshness = ops::compute_delay(request_time, &expected_time).abs();

    Ok(RealtimePassage {
        station_8d: station_8d.to_string(),
        station_id: station_id.to_string(),
        train_num: entry.num,
        day_train_num,
        expected_passage_day: expected_day,
        expected_passage_time: expected_time,
        request_day: *request_day,
        request_time: *request_time,
        data_freshness,
        miss: entry.miss,
        term: entry.term,
        etat: entry.etat,
        scheduled_departure_time: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOARD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<passages gare="87393009">
  <train>
    <date mode="R">26/02/2017 14:55</date>
    <num>134610</num>
    <miss>POPI</miss>
    <term>87384008</term>
  </train>
  <train>
    <date mode="T">27/02/2017 01:12</date>
    <num>134620</num>
    <miss>PEBU</miss>
    <term>87384008</term>
    <etat>Retard&#233;</etat>
  </train>
</passages>"#;

    fn requested_at(raw: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").unwrap()
    }

    #[test]
    fn test_normalize_board() {
        let passages =
            normalize_station_payload(BOARD, "87393009", &requested_at("2017-02-26T14:50:00"))
                .unwrap();
        assert_eq!(passages.len(), 2);

        let first = &passages[0];
        assert_eq!(first.station_8d, "87393009");
        assert_eq!(first.station_id, "8739300");
        assert_eq!(first.train_num, "134610");
        assert_eq!(first.day_train_num, "20170226_134610");
        assert_eq!(first.expected_passage_time.to_string(), "14:55:00");
        assert_eq!(first.miss.as_deref(), Some("POPI"));
        assert_eq!(first.etat, None);
        // board read 5 minutes before the expected passage
        assert_eq!(first.data_freshness, 300);
    }

    #[test]
    fn test_normalize_attributes_early_morning_to_previous_day() {
        let passages =
            normalize_station_payload(BOARD, "87393009", &requested_at("2017-02-26T14:50:00"))
                .unwrap();
        let late = &passages[1];
        assert_eq!(late.expected_passage_day.to_string(), "20170226");
        assert_eq!(late.expected_passage_time.to_string(), "25:12:00");
        assert_eq!(late.day_train_num, "20170226_134620");
        assert_eq!(late.etat.as_deref(), Some("Retardé"));
    }

    #[test]
    fn test_normalize_empty_board_yields_no_passages() {
        let passages = normalize_station_payload(
            r#"<passages gare="87393009"></passages>"#,
            "87393009",
            &requested_at("2017-02-26T14:50:00"),
        )
        .unwrap();
        assert!(passages.is_empty());
    }

    #[test]
    fn test_normalize_drops_entry_with_bad_date() {
        let xml = r#"<passages gare="87393009">
  <train><date>not a date</date><num>000001</num></train>
  <train><date>26/02/2017 15:10</date><num>000002</num></train>
</passages>"#;
        let passages =
            normalize_station_payload(xml, "87393009", &requested_at("2017-02-26T14:50:00"))
                .unwrap();
        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].train_num, "000002");
    }

    #[test]
    fn test_normalize_rejects_unreadable_root() {
        let result = normalize_station_payload(
            "<unexpected>!</unexpected",
            "87393009",
            &requested_at("2017-02-26T14:50:00"),
        );
        assert!(result.is_err());
    }
}
