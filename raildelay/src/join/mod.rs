//! batch join of scheduled stop times against the realtime passage store.

use raildelay_core::clock::ServiceDay;
use raildelay_core::model::{PassageKey, RealtimePassage, ScheduleRow};
use raildelay_realtime::error::RealtimeError;
use raildelay_realtime::store::RealtimeStore;

/// one scheduled stop paired with its realtime passage, when one was
/// recorded for the (station_id, day_train_num) key on the given day
#[derive(Debug, Clone)]
pub struct JoinedResult {
    pub schedule: ScheduleRow,
    pub realtime: Option<RealtimePassage>,
}

impl JoinedResult {
    pub fn has_realtime(&self) -> bool {
        self.realtime.is_some()
    }
}

/// joins every input row to at most one realtime passage, preserving input
/// order and multiplicity. rows without derivable keys, keys with no
/// recorded passage, and keys the store left unprocessed after its retries
/// all come back realtime-absent.
pub fn join_with_realtime(
    rows: Vec<ScheduleRow>,
    store: &RealtimeStore,
    day: &ServiceDay,
) -> Result<Vec<JoinedResult>, RealtimeError> {
    let keys: Vec<Option<PassageKey>> = rows.iter().map(|row| row.passage_key(day)).collect();
    let lookup: Vec<PassageKey> = keys.iter().flatten().cloned().collect();

    log::info!(
        "realtime join: {} stop times, {} resolvable keys",
        rows.len(),
        lookup.len()
    );
    let outcome = store.batch_get(&lookup)?;
    if !outcome.unprocessed.is_empty() {
        log::warn!(
            "{} keys unprocessed by the realtime store, treated as absent",
            outcome.unprocessed.len()
        );
    }
    log::info!("found realtime information for {} keys", outcome.found.len());

    let joined = rows
        .into_iter()
        .zip(keys)
        .map(|(schedule, key)| JoinedResult {
            realtime: key.and_then(|k| outcome.found.get(&k).cloned()),
            schedule,
        })
        .collect();
    Ok(joined)
}
