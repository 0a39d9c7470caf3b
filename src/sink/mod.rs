// src/sink/mod.rs

use anyhow::{Context, Result};
use arrow::datatypes::SchemaRef;
use parquet::{
    arrow::ArrowWriter,
    basic::Compression,
    file::properties::WriterProperties,
};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tempfile::NamedTempFile;
use tracing::{info, instrument};

use crate::records::{to_record_batch, ActivityRecord};

/// Where a run's records end up. The whole sequence is handed over in one
/// call and the backing store is a single file that can be encrypted afterwards.
pub trait RecordSink {
    /// Persist every record or none of them. Returns the number written.
    fn insert_all(&mut self, records: Vec<ActivityRecord>) -> Result<usize>;

    /// The file holding the persisted records.
    fn storage_path(&self) -> &Path;

    /// Native column definitions of the stored records.
    fn columns(&self) -> SchemaRef {
        Arc::new(ActivityRecord::schema())
    }
}

/// Stores records as one Snappy-compressed Parquet file.
pub struct ParquetSink {
    path: PathBuf,
}

impl ParquetSink {
    /// Sink writing to `path`; the parent directory is created if needed.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating sink directory {:?}", parent))?;
        }
        Ok(Self { path })
    }
}

impl RecordSink for ParquetSink {
    #[instrument(level = "info", skip(self, records), fields(path = %self.path.display(), rows = records.len()))]
    fn insert_all(&mut self, records: Vec<ActivityRecord>) -> Result<usize> {
        let batch = to_record_batch(&records)?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));

        // write next to the target, rename into place only once fully closed
        let tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("creating temp file in {:?}", dir))?;
        let file = tmp.reopen().context("reopening temp sink file")?;

        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
            .context("creating Arrow writer for sink")?;
        writer.write(&batch).context("writing activity batch")?;
        writer.close().context("closing sink writer")?;

        tmp.persist(&self.path)
            .with_context(|| format!("persisting sink file {:?}", self.path))?;

        info!("persisted activity records");
        Ok(records.len())
    }

    fn storage_path(&self) -> &Path {
        &self.path
    }
}
