//! embedded key-value store for realtime passages, keyed by
//! (station_id, day_train_num). writes are idempotent upserts with
//! last-writer-wins semantics; reads tolerate eventual consistency.

use std::collections::HashMap;
use std::path::Path;
use std::thread;
use std::time::Duration;

use raildelay_core::model::{PassageKey, RealtimePassage};

use crate::error::RealtimeError;

/// physical write batch limit
pub const MAX_PUT_BATCH: usize = 25;

/// physical multi-get batch limit
pub const MAX_GET_BATCH: usize = 100;

/// attempts at unprocessed keys before giving up on them
const BATCH_RETRY_LIMIT: u32 = 3;

/// outcome of a multi-get: found records plus the keys the store never
/// answered for. absent keys are neither — they are simply not found.
#[derive(Debug, Default)]
pub struct BatchGetOutcome {
    pub found: HashMap<PassageKey, RealtimePassage>,
    pub unprocessed: Vec<PassageKey>,
}

pub struct RealtimeStore {
    db: sled::Db,
}

impl RealtimeStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<RealtimeStore, RealtimeError> {
        let db = sled::open(path)?;
        Ok(RealtimeStore { db })
    }

    /// upserts the given passages in batches of [`MAX_PUT_BATCH`]. reapplying
    /// the same records leaves the store unchanged; for a contested key the
    /// last write wins. returns the number of records written.
    pub fn put_batch(&self, passages: &[RealtimePassage]) -> Result<usize, RealtimeError> {
        let mut written = 0;
        for chunk in passages.chunks(MAX_PUT_BATCH) {
            let mut batch = sled::Batch::default();
            for passage in chunk {
                let key = encode_key(&passage.key());
                let value = serde_json::to_vec(passage)?;
                batch.insert(key, value);
            }
            self.db.apply_batch(batch)?;
            written += chunk.len();
        }
        self.db.flush()?;
        log::debug!("upserted {written} passages");
        Ok(written)
    }

    /// single-key lookup; a missing key is an [`RealtimeError::ItemNotFound`]
    pub fn get(&self, key: &PassageKey) -> Result<RealtimePassage, RealtimeError> {
        match self.db.get(encode_key(key))? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Err(RealtimeError::ItemNotFound(key.clone())),
        }
    }

    /// multi-get in batches of [`MAX_GET_BATCH`]. keys the store failed to
    /// answer for are retried with exponential backoff up to
    /// [`BATCH_RETRY_LIMIT`] times, then reported as unprocessed. partial
    /// success is not an error.
    pub fn batch_get(&self, keys: &[PassageKey]) -> Result<BatchGetOutcome, RealtimeError> {
        let mut outcome = BatchGetOutcome::default();
        for chunk in keys.chunks(MAX_GET_BATCH) {
            let (found, unprocessed) = self.fetch_chunk(chunk);
            outcome.found.extend(found);
            outcome.unprocessed.extend(unprocessed);
        }

        let mut attempt: u32 = 0;
        while !outcome.unprocessed.is_empty() && attempt < BATCH_RETRY_LIMIT {
            attempt += 1;
            thread::sleep(backoff_delay(attempt));
            let pending = std::mem::take(&mut outcome.unprocessed);
            log::debug!(
                "retrying {} unprocessed keys (attempt {attempt})",
                pending.len()
            );
            for chunk in pending.chunks(MAX_GET_BATCH) {
                let (found, unprocessed) = self.fetch_chunk(chunk);
                outcome.found.extend(found);
                outcome.unprocessed.extend(unprocessed);
            }
        }
        if !outcome.unprocessed.is_empty() {
            log::warn!(
                "{} keys left unprocessed after {BATCH_RETRY_LIMIT} retries",
                outcome.unprocessed.len()
            );
        }
        Ok(outcome)
    }

    fn fetch_chunk(
        &self,
        keys: &[PassageKey],
    ) -> (Vec<(PassageKey, RealtimePassage)>, Vec<PassageKey>) {
        let mut found = Vec::new();
        let mut unprocessed = Vec::new();
        for key in keys {
            match self.db.get(encode_key(key)) {
                Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                    Ok(passage) => found.push((key.clone(), passage)),
                    Err(e) => {
                        // an undecodable record is data corruption, not a
                        // transient store failure; drop it with a log
                        log::error!("undecodable passage at {key}: {e}");
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    log::debug!("store failed for {key}: {e}");
                    unprocessed.push(key.clone());
                }
            }
        }
        (found, unprocessed)
    }

    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// physical key layout: `station_id \x1f day_train_num`
fn encode_key(key: &PassageKey) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(key.station_id.len() + key.day_train_num.len() + 1);
    bytes.extend_from_slice(key.station_id.as_bytes());
    bytes.push(0x1f);
    bytes.extend_from_slice(key.day_train_num.as_bytes());
    bytes
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs_f64(0.5 * 1.5f64.powi(attempt as i32 - 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use raildelay_core::clock::{ExtendedTime, ServiceDay};
    use std::str::FromStr;

    fn passage(station_id: &str, train_num: &str) -> RealtimePassage {
        let day = ServiceDay::from_str("20170226").unwrap();
        RealtimePassage {
            station_8d: format!("{station_id}9"),
            station_id: station_id.to_string(),
            train_num: train_num.to_string(),
            day_train_num: format!("{day}_{train_num}"),
            expected_passage_day: day,
            expected_passage_time: ExtendedTime::from_str("14:55:00").unwrap(),
            request_day: day,
            request_time: ExtendedTime::from_str("14:50:00").unwrap(),
            data_freshness: 300,
            miss: Some("POPI".to_string()),
            term: None,
            etat: None,
            scheduled_departure_time: None,
        }
    }

    fn open_store() -> (RealtimeStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = RealtimeStore::open(dir.path().join("realtime")).unwrap();
        (store, dir)
    }

    #[test]
    fn test_put_then_get() {
        let (store, _dir) = open_store();
        let p = passage("8739300", "134610");
        store.put_batch(std::slice::from_ref(&p)).unwrap();
        let loaded = store.get(&p.key()).unwrap();
        assert_eq!(loaded.train_num, "134610");
        assert_eq!(loaded.data_freshness, 300);
    }

    #[test]
    fn test_get_missing_key_is_item_not_found() {
        let (store, _dir) = open_store();
        let missing = PassageKey::new("8739300", "20170226_000000");
        assert!(matches!(
            store.get(&missing),
            Err(RealtimeError::ItemNotFound(_))
        ));
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let (store, _dir) = open_store();
        let p = passage("8739300", "134610");
        store.put_batch(std::slice::from_ref(&p)).unwrap();
        let before = store.len();
        store.put_batch(std::slice::from_ref(&p)).unwrap();
        assert_eq!(store.len(), before);
        assert_eq!(store.get(&p.key()).unwrap().data_freshness, 300);
    }

    #[test]
    fn test_last_writer_wins_on_rewrite() {
        let (store, _dir) = open_store();
        let mut p = passage("8739300", "134610");
        store.put_batch(std::slice::from_ref(&p)).unwrap();
        p.data_freshness = 60;
        store.put_batch(std::slice::from_ref(&p)).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&p.key()).unwrap().data_freshness, 60);
    }

    #[test]
    fn test_batch_get_partial_presence() {
        let (store, _dir) = open_store();
        let passages: Vec<RealtimePassage> = (0..130)
            .map(|i| passage("8739300", &format!("{i:06}")))
            .collect();
        store.put_batch(&passages).unwrap();

        let mut keys: Vec<PassageKey> = passages.iter().map(|p| p.key()).collect();
        keys.push(PassageKey::new("8739300", "20170226_999999"));

        let outcome = store.batch_get(&keys).unwrap();
        assert_eq!(outcome.found.len(), 130);
        assert!(outcome.unprocessed.is_empty());
        assert!(!outcome
            .found
            .contains_key(&PassageKey::new("8739300", "20170226_999999")));
    }

    #[test]
    fn test_backoff_delay_grows() {
        assert!(backoff_delay(1) < backoff_delay(2));
        assert!(backoff_delay(2) < backoff_delay(3));
    }
}
