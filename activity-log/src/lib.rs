pub mod format;

pub use format::*;

use autoreply_core::{ActionRecord, ActivityLogError, CoreError, DedupSet};
use chrono::{NaiveDate, NaiveDateTime};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};


/// Append-only record of submitted replies.
///
/// The scheduler is the only writer. Readers re-read the whole file and rely
/// on [`parse_records`] to ignore a record that is still being written.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    path: PathBuf,
}

impl ActivityLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display_path(&self) -> String {
        self.path.display().to_string()
    }

    /// Creates the file with its header if it does not exist yet. Returns
    /// true when a new file was created.
    pub async fn initialize(&self, started_at: NaiveDateTime) -> Result<bool, CoreError> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .await;

        let mut file = match file {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(source) => {
                return Err(ActivityLogError::Initialize {
                    path: self.display_path(),
                    source,
                }
                .into())
            }
        };

        let header = format_header(started_at);
        file.write_all(header.as_bytes())
            .await
            .map_err(|source| ActivityLogError::Initialize {
                path: self.display_path(),
                source,
            })?;
        info!("Created new comment history file at {}", self.display_path());
        Ok(true)
    }

    /// Appends one record as a single write.
    pub async fn append(&self, record: &ActionRecord) -> Result<(), CoreError> {
        let append_error = |source| ActivityLogError::Append {
            path: self.display_path(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(append_error)?;
        file.write_all(format_record(record).as_bytes())
            .await
            .map_err(append_error)?;
        file.flush().await.map_err(append_error)?;

        debug!("Appended record for r/{} to {}", record.forum, self.display_path());
        Ok(())
    }

    /// Raw log contents; a missing file reads as empty.
    pub async fn read_text(&self) -> Result<String, CoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(source) => Err(ActivityLogError::Read {
                path: self.display_path(),
                source,
            }
            .into()),
        }
    }

    pub async fn read_records(&self) -> Result<Vec<ActionRecord>, CoreError> {
        Ok(parse_records(&self.read_text().await?))
    }

    pub async fn load_dedup_set(&self) -> Result<DedupSet, CoreError> {
        Ok(dedup_from_text(&self.read_text().await?))
    }

    /// Number of records whose timestamp falls on `day`.
    pub async fn count_on(&self, day: NaiveDate) -> Result<usize, CoreError> {
        let records = self.read_records().await?;
        Ok(count_on_day(&records, day))
    }
}
