//! day matrix persistence: gzip CSV files on disk, mirrored to the
//! training-set bucket when one is configured.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;
use object_store::{path::Path as ObjectPath, ObjectStore, ObjectStoreExt, PutPayload};

use crate::error::EtlError;
use crate::features::MatrixRow;

/// writes a day matrix as `<filename>` under `directory`, gzip CSV with a
/// header row. returns the written path.
pub fn write_matrix(
    rows: &[MatrixRow],
    directory: &Path,
    filename: &str,
) -> Result<PathBuf, EtlError> {
    std::fs::create_dir_all(directory)?;
    let filepath = directory.join(filename);
    let file = File::create(&filepath)?;
    let buffer = GzEncoder::new(file, Compression::default());
    let mut writer = csv::Writer::from_writer(buffer);
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| EtlError::Output(format!("failed to write {filename}: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| EtlError::Output(format!("failed to flush {filename}: {e}")))?;
    log::info!("wrote {} matrix rows to {}", rows.len(), filepath.display());
    Ok(filepath)
}

/// uploads a written matrix file under `training_sets/` in the bucket
pub fn upload_matrix(store: Arc<dyn ObjectStore>, filepath: &Path) -> Result<(), EtlError> {
    let filename = filepath
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| EtlError::Output(format!("no file name in {}", filepath.display())))?;
    let key = format!("training_sets/{filename}");
    let bytes = std::fs::read(filepath)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| EtlError::Runtime(format!("failure creating tokio runtime: {e}")))?;
    runtime
        .block_on(store.put(&ObjectPath::from(key.clone()), PutPayload::from(bytes)))
        .map_err(|e| EtlError::Output(format!("uploading {key}: {e}")))?;
    log::info!("uploaded {}", key);
    Ok(())
}
