//! JSON Lines implementation of [`IChangeSink`]
//!
//! Appends one JSON object per applied record to a file and flushes it to
//! disk before reporting success. A record re-delivered after a crash shows
//! up twice in the file with the same `sequence_id`; readers that need
//! exactly-once can dedupe on `(resource_uri, sequence_id)`.
//!
//! The file only ever holds whole lines: a failed write is cut back to the
//! previous length, and a partial last line left by a crash is dropped when
//! the sink is opened.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};
use trs_core::domain::ChangeRecord;
use trs_core::ports::{IChangeSink, SinkError};

#[derive(Serialize)]
struct Line<'a> {
    applied_at: DateTime<Utc>,
    #[serde(flatten)]
    record: &'a ChangeRecord,
}

/// Sink writing `changes.jsonl`-style output
pub struct JsonLinesSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesSink {
    /// Opens `path` for appending, creating it and its parent directories
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .await?;
        let dropped = discard_torn_tail(&mut file).await?;
        if dropped > 0 {
            warn!(path = %path.display(), bytes = dropped, "Dropped partial last line");
        }
        debug!(path = %path.display(), "Opened change sink");

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl IChangeSink for JsonLinesSink {
    async fn apply(&self, record: &ChangeRecord) -> Result<(), SinkError> {
        let line = Line {
            applied_at: Utc::now(),
            record,
        };
        let mut bytes =
            serde_json::to_vec(&line).map_err(|e| SinkError::Permanent(e.to_string()))?;
        bytes.push(b'\n');

        let mut file = self.file.lock().await;
        let offset = file
            .metadata()
            .await
            .map_err(|e| SinkError::Transient(format!("{}: {e}", self.path.display())))?
            .len();

        if let Err(e) = write_line(&mut file, &bytes).await {
            // cut off whatever part of the line reached the file
            return Err(match file.set_len(offset).await {
                Ok(()) => SinkError::Transient(format!("{}: {e}", self.path.display())),
                Err(cut) => SinkError::Permanent(format!(
                    "{}: partial line left after {e}: {cut}",
                    self.path.display()
                )),
            });
        }

        trace!(sequence = %record.sequence_id, resource = %record.resource_uri, "Wrote change");
        Ok(())
    }
}

async fn write_line(file: &mut File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.sync_data().await
}

/// Truncates the file after its last newline, returning the bytes removed
async fn discard_torn_tail(file: &mut File) -> std::io::Result<u64> {
    const CHUNK: u64 = 4096;

    let len = file.metadata().await?.len();
    let mut end = len;
    let mut keep = 0;
    while end > 0 {
        let start = end.saturating_sub(CHUNK);
        let mut chunk = vec![0u8; (end - start) as usize];
        file.seek(SeekFrom::Start(start)).await?;
        file.read_exact(&mut chunk).await?;
        if let Some(pos) = chunk.iter().rposition(|&b| b == b'\n') {
            keep = start + pos as u64 + 1;
            break;
        }
        end = start;
    }

    if keep < len {
        file.set_len(keep).await?;
        file.sync_data().await?;
    }
    Ok(len - keep)
}
