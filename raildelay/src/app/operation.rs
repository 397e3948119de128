//! command-line surface of the pipeline: extraction cycles, schedule
//! refreshes and matrix builds.

use std::str::FromStr;

use chrono::Local;
use clap::{Parser, Subcommand};

use raildelay_core::clock::ServiceDay;
use raildelay_gtfs::fetch::GtfsFetcher;

use crate::config::EtlConfig;
use crate::error::EtlError;
use crate::orchestrate::Orchestrator;

#[derive(Debug, Parser)]
#[command(name = "raildelay", about = "train delay ingestion and feature pipeline")]
pub struct EtlApp {
    #[command(subcommand)]
    pub op: EtlOperation,
}

#[derive(Debug, Clone, Subcommand)]
pub enum EtlOperation {
    /// run rate-paced extraction cycles until the stop-time budget runs out
    Extract {
        /// seconds between cycle starts, defaults to the configured period
        cycle_sec: Option<u64>,
    },
    /// poll every station once and write the passages
    ExtractOnce,
    /// download the GTFS archive set into the working directory
    DownloadGtfs,
    /// weekly refresh: download archives, reload the relational store and
    /// mirror the snapshot when a bucket is configured
    RefreshSchedule,
    /// retroactive training matrices for a day range, bounds included
    BuildTrainingSet {
        /// first day, yyyymmdd
        #[arg(long)]
        start: String,
        /// last day, yyyymmdd
        #[arg(long)]
        end: String,
    },
    /// print inference vectors for the not-yet-passed stops of a day
    Predictable {
        /// day to predict, yyyymmdd, defaults to today
        #[arg(long)]
        day: Option<String>,
    },
}

impl EtlOperation {
    pub fn run(&self, config: EtlConfig) -> Result<(), EtlError> {
        match self {
            EtlOperation::Extract { cycle_sec } => {
                Orchestrator::new(config)?.operate_multiple_cycles(*cycle_sec)
            }
            EtlOperation::ExtractOnce => {
                let report = Orchestrator::new(config)?.operate_one_cycle()?;
                log::info!(
                    "single cycle done: {} passages from {} stations",
                    report.passages_written,
                    report.stations_polled
                );
                Ok(())
            }
            EtlOperation::DownloadGtfs => {
                let fetcher = GtfsFetcher::new(&config.gtfs_index_url, &config.data_dir)?;
                let extracted = fetcher.download_all()?;
                log::info!("extracted {} archives", extracted.len());
                Ok(())
            }
            EtlOperation::RefreshSchedule => {
                Orchestrator::new(config)?.refresh_schedule().map(|_| ())
            }
            EtlOperation::BuildTrainingSet { start, end } => {
                let start = parse_day(start)?;
                let end = parse_day(end)?;
                let paths = Orchestrator::new(config)?.build_training_range(&start, &end)?;
                log::info!("wrote {} day matrices", paths.len());
                Ok(())
            }
            EtlOperation::Predictable { day } => {
                let day = match day {
                    Some(raw) => parse_day(raw)?,
                    None => ServiceDay::new(Local::now().date_naive()),
                };
                let vectors = Orchestrator::new(config)?.build_inference_vectors(&day)?;
                log::info!("{} predictable stops on {day}", vectors.len());
                for vector in vectors {
                    let line = serde_json::to_string(&vector)
                        .map_err(|e| EtlError::Output(e.to_string()))?;
                    println!("{line}");
                }
                Ok(())
            }
        }
    }
}

fn parse_day(raw: &str) -> Result<ServiceDay, EtlError> {
    ServiceDay::from_str(raw)
        .map_err(|_| EtlError::Configuration(format!("'{raw}' is not a yyyymmdd day")))
}
