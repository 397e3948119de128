//! composition root: wires the poller, normalizer, stores, resolver and
//! feature builder together and drives the extraction cycles, schedule
//! refreshes and retroactive matrix builds.

use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use object_store::ObjectStore;

use raildelay_core::clock::ServiceDay;
use raildelay_core::model::{PassageKey, RealtimePassage};
use raildelay_gtfs::fetch::GtfsFetcher;
use raildelay_gtfs::resolver::{DayFilter, ScheduleResolver};
use raildelay_gtfs::store::{Projection, ScheduleStore};
use raildelay_realtime::client::{ApiClient, ApiCredentials};
use raildelay_realtime::normalize::normalize_station_payload;
use raildelay_realtime::poller::{PollerConfig, StationPoller};
use raildelay_realtime::store::RealtimeStore;

use crate::config::EtlConfig;
use crate::error::EtlError;
use crate::features::{upload_matrix, write_matrix, FeatureBuilder, MatrixRow, SweepConfig};
use crate::join::join_with_realtime;
use crate::state::EngineConfig;

/// outcome of one extraction cycle
#[derive(Debug, Default)]
pub struct CycleReport {
    pub stations_polled: usize,
    pub stations_failed: usize,
    pub passages_written: usize,
}

pub struct Orchestrator {
    config: EtlConfig,
    runtime: tokio::runtime::Runtime,
    schedule_store: Arc<ScheduleStore>,
    resolver: ScheduleResolver,
    realtime_store: RealtimeStore,
    poller: StationPoller,
    builder: FeatureBuilder,
}

impl Orchestrator {
    pub fn new(config: EtlConfig) -> Result<Orchestrator, EtlError> {
        std::fs::create_dir_all(&config.data_dir)?;
        let runtime = tokio::runtime::Runtime::new()
            .map_err(|e| EtlError::Runtime(format!("failure creating tokio runtime: {e}")))?;

        let schedule_store =
            Arc::new(runtime.block_on(ScheduleStore::open_file(&config.schedule_db_path()))?);
        let resolver = ScheduleResolver::new(schedule_store.clone());
        let realtime_store = RealtimeStore::open(config.realtime_db_path())?;

        let client = ApiClient::with_retry_timeout(
            ApiCredentials {
                core_url: config.api_base_url.clone(),
                user: config.api_user.clone(),
                password: config.api_password.clone(),
            },
            Duration::from_secs(config.retry_timeout_sec),
        )?;
        let poller = StationPoller::new(
            Arc::new(client),
            PollerConfig {
                max_per_minute: config.max_per_minute,
                ..Default::default()
            },
        );
        let builder = FeatureBuilder::new(
            EngineConfig {
                median_window_secs: config.median_window_sec,
            },
            SweepConfig::default(),
        );

        Ok(Orchestrator {
            config,
            runtime,
            schedule_store,
            resolver,
            realtime_store,
            poller,
            builder,
        })
    }

    pub fn schedule_store(&self) -> &ScheduleStore {
        &self.schedule_store
    }

    /// one extraction cycle: poll every station, normalize, stamp the
    /// scheduled departure, upsert into the realtime store. a single
    /// failing station or row never fails the cycle.
    pub fn operate_one_cycle(&self) -> Result<CycleReport, EtlError> {
        self.config.validate_for_polling()?;
        let stations = self.config.station_ids()?;
        log::info!("extraction of {} stations", stations.len());

        let hard_stop = Duration::from_secs(self.config.stop_time_sec);
        let payloads = self.runtime.block_on(async {
            let deadline = tokio::time::Instant::now() + hard_stop;
            self.poller.poll_cycle_until(&stations, Some(deadline)).await
        });

        let requested_at = Local::now().naive_local();
        let mut report = CycleReport {
            stations_polled: payloads.len(),
            ..Default::default()
        };
        let mut passages: Vec<RealtimePassage> = Vec::new();
        for payload in &payloads {
            let Some(body) = &payload.body else {
                report.stations_failed += 1;
                continue;
            };
            match normalize_station_payload(body, &payload.station, &requested_at) {
                Ok(station_passages) => passages.extend(station_passages),
                Err(e) => {
                    log::debug!("cannot parse station {}: {e}", payload.station);
                    report.stations_failed += 1;
                }
            }
        }

        self.extend_with_schedule(&mut passages)?;
        report.passages_written = self.realtime_store.put_batch(&passages)?;
        log::info!(
            "cycle done: {} stations, {} failed, {} passages written",
            report.stations_polled,
            report.stations_failed,
            report.passages_written
        );
        Ok(report)
    }

    /// stamps the scheduled departure onto passages whose
    /// (station, day_train_num) key the schedule knows
    fn extend_with_schedule(
        &self,
        passages: &mut [RealtimePassage],
    ) -> Result<(), EtlError> {
        let days: BTreeSet<ServiceDay> =
            passages.iter().map(|p| p.expected_passage_day).collect();
        for day in days {
            let index = self.runtime.block_on(self.resolver.day_passage_index(&day))?;
            if index.is_empty() {
                log::debug!("no schedule loaded for {day}, passages kept unextended");
                continue;
            }
            for passage in passages.iter_mut() {
                if passage.expected_passage_day != day {
                    continue;
                }
                let key =
                    PassageKey::new(passage.station_id.clone(), passage.day_train_num.clone());
                if let Some(row) = index.get(&key) {
                    passage.scheduled_departure_time = Some(row.stop_time.departure_time);
                }
            }
        }
        Ok(())
    }

    /// cycles until the stop-time budget, sleeping out each cycle period
    pub fn operate_multiple_cycles(&self, cycle_time_sec: Option<u64>) -> Result<(), EtlError> {
        let cycle_secs = cycle_time_sec.unwrap_or(self.config.cycle_time_sec);
        let stop_secs = self.config.stop_time_sec;
        log::info!("beginning operation with limit of {stop_secs} seconds");
        log::info!(
            "max number of queries per minute to the API: {}",
            self.config.max_per_minute
        );
        let begin = Instant::now();

        while begin.elapsed().as_secs() < stop_secs {
            let cycle_begin = Instant::now();
            log::info!("beginning cycle of {cycle_secs} seconds");

            match self.operate_one_cycle() {
                Ok(report) => log::info!(
                    "cycle wrote {} passages from {} stations",
                    report.passages_written,
                    report.stations_polled
                ),
                // a failed cycle never stops the operation
                Err(e) => log::error!("cycle failed: {e}"),
            }

            let time_passed = cycle_begin.elapsed().as_secs();
            log::info!("time spent on cycle: {time_passed} seconds");
            if time_passed < cycle_secs {
                let wait = cycle_secs - time_passed;
                log::info!("waiting {wait} seconds till next cycle");
                std::thread::sleep(Duration::from_secs(wait));
            } else {
                log::warn!("cycle took more than expected: {time_passed} seconds");
            }
            log::info!(
                "time spent from beginning: {} seconds (stop at {stop_secs} seconds)",
                begin.elapsed().as_secs()
            );
        }
        Ok(())
    }

    /// downloads the GTFS archive set and reloads the relational store,
    /// then mirrors the snapshot when a bucket is configured. refreshes
    /// are serialized by an advisory lock; a conflicting caller returns
    /// `Ok(false)` without touching anything.
    pub fn refresh_schedule(&self) -> Result<bool, EtlError> {
        let _lock = match RefreshLock::acquire(&self.config.data_dir) {
            Ok(lock) => lock,
            Err(EtlError::ConcurrentRefresh(holder)) => {
                log::warn!("schedule refresh already running ({holder}), nothing done");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let fetcher = GtfsFetcher::new(&self.config.gtfs_index_url, &self.config.data_dir)?;
        let archives = fetcher.download_all()?;
        let summary = self
            .runtime
            .block_on(self.schedule_store.load_gtfs_directory(&fetcher.canonical_dir()))?;
        log::info!(
            "schedule refreshed: {} trips, {} stop times",
            summary.trips,
            summary.stop_times
        );

        if let Some(bucket) = &self.config.snapshot_bucket {
            let today = ServiceDay::new(Local::now().date_naive());
            fetcher.mirror_snapshot(self.object_bucket(bucket)?, &today, &archives)?;
        }
        Ok(true)
    }

    /// retroactive training matrix for one day, written day-partitioned
    /// and uploaded when a training bucket is configured
    pub fn build_training_day(&self, day: &ServiceDay) -> Result<PathBuf, EtlError> {
        log::info!("building training set for {day}");
        let rows = self.runtime.block_on(self.resolver.stop_times_on(
            day,
            &DayFilter::default(),
            Projection::Full,
        ))?;
        if rows.is_empty() {
            log::warn!("no scheduled stop times found for {day}");
        }
        let joined = join_with_realtime(rows, &self.realtime_store, day)?;

        let now = Local::now().naive_local();
        let matrix = self.builder.day_matrix(&joined, day, &now)?;
        let path = write_matrix(
            &matrix,
            &self.config.training_dir(),
            &format!("{day}.csv.gz"),
        )?;
        if let Some(bucket) = &self.config.training_bucket {
            upload_matrix(self.object_bucket(bucket)?, &path)?;
        }
        Ok(path)
    }

    /// training matrices for every day in [start, end]
    pub fn build_training_range(
        &self,
        start: &ServiceDay,
        end: &ServiceDay,
    ) -> Result<Vec<PathBuf>, EtlError> {
        if start > end {
            return Err(EtlError::Configuration(format!(
                "start day {start} is after end day {end}"
            )));
        }
        let mut paths = Vec::new();
        let mut day = *start;
        loop {
            paths.push(self.build_training_day(&day)?);
            if day >= *end {
                break;
            }
            day = day.next()?;
        }
        Ok(paths)
    }

    /// inference vectors for the not-yet-passed stops of a day, as of now
    pub fn build_inference_vectors(
        &self,
        day: &ServiceDay,
    ) -> Result<Vec<MatrixRow>, EtlError> {
        let rows = self.runtime.block_on(self.resolver.stop_times_on(
            day,
            &DayFilter::default(),
            Projection::Full,
        ))?;
        let joined = join_with_realtime(rows, &self.realtime_store, day)?;
        let now = Local::now().naive_local();
        self.builder.inference_rows(&joined, day, &now)
    }

    fn object_bucket(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, EtlError> {
        let store = object_store::aws::AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .build()
            .map_err(|e| EtlError::Output(format!("building object store '{bucket}': {e}")))?;
        Ok(Arc::new(store))
    }
}

/// advisory lock serializing GTFS refreshes on the working directory.
/// the lock file is removed when the guard drops.
struct RefreshLock {
    path: PathBuf,
}

impl RefreshLock {
    const FILENAME: &'static str = ".gtfs-refresh.lock";

    fn acquire(data_dir: &Path) -> Result<RefreshLock, EtlError> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(Self::FILENAME);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(RefreshLock { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(EtlError::ConcurrentRefresh(path.display().to_string()))
            }
            Err(e) => Err(EtlError::Io(e)),
        }
    }
}

impl Drop for RefreshLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::warn!("could not remove refresh lock {}: {e}", self.path.display());
        }
    }
}
