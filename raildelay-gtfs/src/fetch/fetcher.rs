//! downloads the published GTFS archive set and unpacks it into the
//! working directory, then mirrors the extracted tree into object storage
//! as a dated snapshot.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use object_store::{path::Path as ObjectPath, ObjectStore, ObjectStoreExt, PutPayload};
use raildelay_core::clock::ServiceDay;

use crate::error::ScheduleError;

/// the archive directory the schedule loader reads from; a download run
/// only succeeds when this directory is present afterwards
pub const CANONICAL_ARCHIVE: &str = "gtfs-lines-last";

/// GTFS text tables the pipeline cannot run without
pub const REQUIRED_TABLES: [&str; 7] = [
    "agency.txt",
    "routes.txt",
    "trips.txt",
    "stops.txt",
    "stop_times.txt",
    "calendar.txt",
    "calendar_dates.txt",
];

/// column of the remote index CSV holding the archive urls
const INDEX_URL_COLUMN: &str = "file";

pub struct GtfsFetcher {
    index_url: String,
    data_dir: PathBuf,
    http: reqwest::blocking::Client,
}

impl GtfsFetcher {
    pub fn new(index_url: &str, data_dir: &Path) -> Result<GtfsFetcher, ScheduleError> {
        let http = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| ScheduleError::Fetch(format!("failure building http client: {e}")))?;
        Ok(GtfsFetcher {
            index_url: index_url.to_string(),
            data_dir: data_dir.to_path_buf(),
            http,
        })
    }

    /// downloads every archive listed by the index and extracts each one
    /// under a subdirectory named after its logical name. succeeds iff the
    /// canonical `gtfs-lines-last` directory exists afterwards.
    pub fn download_all(&self) -> Result<Vec<PathBuf>, ScheduleError> {
        log::info!("downloading GTFS index from {}", self.index_url);
        let index_body = self.get_text(&self.index_url)?;
        let urls = archive_urls(&index_body)?;
        log::info!("index lists {} archives", urls.len());

        let mut extracted = Vec::with_capacity(urls.len());
        for url in urls {
            match self.download_and_extract(&url) {
                Ok(dir) => extracted.push(dir),
                Err(e) => {
                    // one bad archive does not abort the refresh
                    log::error!("skipping archive {url}: {e}");
                }
            }
        }

        let canonical = self.data_dir.join(CANONICAL_ARCHIVE);
        if canonical.is_dir() {
            log::info!("the '{CANONICAL_ARCHIVE}' archive has been found");
            Ok(extracted)
        } else {
            Err(ScheduleError::CanonicalArchiveMissing(
                CANONICAL_ARCHIVE.to_string(),
            ))
        }
    }

    /// the directory the schedule loader should read from
    pub fn canonical_dir(&self) -> PathBuf {
        self.data_dir.join(CANONICAL_ARCHIVE)
    }

    fn download_and_extract(&self, url: &str) -> Result<PathBuf, ScheduleError> {
        log::info!("downloading {url}");
        let response = self
            .http
            .get(url)
            .send()
            .map_err(|e| ScheduleError::Fetch(format!("GET {url}: {e}")))?;
        if !response.status().is_success() {
            return Err(ScheduleError::Fetch(format!(
                "GET {url} returned status {}",
                response.status()
            )));
        }
        let disposition = response
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let name = logical_name(disposition.as_deref(), url);
        let bytes = response
            .bytes()
            .map_err(|e| ScheduleError::Fetch(format!("reading body of {url}: {e}")))?;

        let target = self.data_dir.join(&name);
        extract_zip(&bytes, &target)?;
        log::info!("extracted '{name}' into {}", target.display());
        Ok(target)
    }

    fn get_text(&self, url: &str) -> Result<String, ScheduleError> {
        self.http
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text())
            .map_err(|e| ScheduleError::Fetch(format!("GET {url}: {e}")))
    }

    /// copies the extracted archive trees into the object store under a
    /// `yyyymmdd-gtfs/<archive-name>/` layout. returns the number of files
    /// mirrored.
    pub fn mirror_snapshot(
        &self,
        store: Arc<dyn ObjectStore>,
        day: &ServiceDay,
        archive_dirs: &[PathBuf],
    ) -> Result<usize, ScheduleError> {
        let prefix = format!("{day}-gtfs");
        let mut files = Vec::new();
        for dir in archive_dirs {
            files.extend(
                collect_files(dir)
                    .map_err(|e| ScheduleError::Snapshot(format!("walking extracted tree: {e}")))?,
            );
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ScheduleError::Snapshot(format!("failure creating tokio runtime: {e}")))?;

        let mut uploaded = 0;
        for file in files {
            let relative = file
                .strip_prefix(&self.data_dir)
                .map_err(|e| ScheduleError::Snapshot(e.to_string()))?;
            let key = format!("{prefix}/{}", relative.to_string_lossy().replace('\\', "/"));
            let bytes = fs::read(&file)
                .map_err(|e| ScheduleError::Snapshot(format!("reading {}: {e}", file.display())))?;
            runtime
                .block_on(store.put(&ObjectPath::from(key.clone()), PutPayload::from(bytes)))
                .map_err(|e| ScheduleError::Snapshot(format!("uploading {key}: {e}")))?;
            uploaded += 1;
        }
        log::info!("mirrored {uploaded} files under {prefix}/");
        Ok(uploaded)
    }
}

/// reads the `file` column of the remote index CSV
fn archive_urls(index_body: &str) -> Result<Vec<String>, ScheduleError> {
    let mut reader = csv::Reader::from_reader(index_body.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| ScheduleError::Fetch(format!("reading index header: {e}")))?;
    let column = headers
        .iter()
        .position(|h| h == INDEX_URL_COLUMN)
        .ok_or_else(|| {
            ScheduleError::Fetch(format!("index CSV has no '{INDEX_URL_COLUMN}' column"))
        })?;

    let mut urls = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ScheduleError::Fetch(format!("reading index row: {e}")))?;
        if let Some(url) = record.get(column) {
            if !url.is_empty() {
                urls.push(url.to_string());
            }
        }
    }
    Ok(urls)
}

/// the archive's logical name: the filename announced in the
/// Content-Disposition header, else the url stem, minus any `.zip` suffix
fn logical_name(content_disposition: Option<&str>, url: &str) -> String {
    let from_header = content_disposition.and_then(|value| {
        value.split(';').find_map(|part| {
            let part = part.trim();
            part.strip_prefix("filename=")
                .map(|name| name.trim_matches('"').to_string())
        })
    });
    let raw = from_header.unwrap_or_else(|| {
        url.rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or("archive")
            .split('?')
            .next()
            .unwrap_or("archive")
            .to_string()
    });
    raw.strip_suffix(".zip").unwrap_or(&raw).to_string()
}

fn extract_zip(bytes: &[u8], target: &Path) -> Result<(), ScheduleError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ScheduleError::MalformedArchive(e.to_string()))?;
    fs::create_dir_all(target)
        .map_err(|e| ScheduleError::Fetch(format!("creating {}: {e}", target.display())))?;
    archive
        .extract(target)
        .map_err(|e| ScheduleError::MalformedArchive(e.to_string()))
}

fn collect_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}
