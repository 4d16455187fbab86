//! Append-only JSON lines audit store.

use super::AuditStore;
use crate::audit::{AuditQuery, AuditRecord};
use crate::{Error, Result};

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

struct Writer {
    file: tokio::fs::File,
    /// Length of the file up to the last complete line
    len: u64,
    correlation_ids: HashSet<String>,
}

impl Writer {
    /// Write, flush and sync one line. On failure the file is cut back to
    /// its last complete line so a retry never lands after partial bytes.
    async fn append(&mut self, line: &[u8]) -> std::io::Result<()> {
        match self.write_durably(line).await {
            Ok(()) => {
                self.len += line.len() as u64;
                Ok(())
            }
            Err(e) => {
                self.rollback().await;
                Err(e)
            }
        }
    }

    async fn write_durably(&mut self, line: &[u8]) -> std::io::Result<()> {
        self.file.write_all(line).await?;
        self.file.flush().await?;
        self.file.sync_data().await
    }

    async fn rollback(&mut self) {
        if let Err(e) = self.file.set_len(self.len).await {
            warn!(len = self.len, error = %e, "Failed to truncate audit file after write error");
        }
    }
}

/// Audit store writing one JSON object per line.
///
/// Every record is flushed and `fsync`ed before `persist` returns.
pub struct JsonlAuditStore {
    path: PathBuf,
    writer: Mutex<Writer>,
}

impl JsonlAuditStore {
    /// Open (or create) the audit file at `path` in append mode.
    ///
    /// Parent directories are created automatically. Existing records are
    /// scanned so duplicates are refused across restarts.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let len = repair_tail(&file, &path).await?;

        let correlation_ids = read_records(&path)
            .await?
            .into_iter()
            .map(|r| r.correlation_id)
            .collect();

        Ok(Self {
            path,
            writer: Mutex::new(Writer {
                file,
                len,
                correlation_ids,
            }),
        })
    }

    /// Path of the audit file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Drop bytes after the last newline, left by a write that never completed.
async fn repair_tail(file: &tokio::fs::File, path: &Path) -> Result<u64> {
    let content = tokio::fs::read(path).await?;
    let complete = content
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |i| i + 1);

    if complete < content.len() {
        warn!(
            path = %path.display(),
            dropped_bytes = content.len() - complete,
            "Truncating incomplete audit line"
        );
        file.set_len(complete as u64).await?;
        file.sync_data().await?;
    }
    Ok(complete as u64)
}

async fn read_records(path: &Path) -> Result<Vec<AuditRecord>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut records = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(path = %path.display(), line = line_no + 1, error = %e, "Skipping unreadable audit line"),
        }
    }
    Ok(records)
}

fn io_error(e: std::io::Error) -> Error {
    Error::storage("jsonl", e.to_string())
}

#[async_trait]
impl AuditStore for JsonlAuditStore {
    fn backend(&self) -> &'static str {
        "jsonl"
    }

    async fn persist(&self, record: &AuditRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        if writer.correlation_ids.contains(&record.correlation_id) {
            return Err(Error::duplicate_audit(&record.correlation_id));
        }

        writer.append(&line).await.map_err(io_error)?;

        writer.correlation_ids.insert(record.correlation_id.clone());
        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>> {
        // Hold the writer lock so no half-written line is read.
        let _writer = self.writer.lock().await;
        let matching = read_records(&self.path)
            .await
            .map_err(|e| Error::storage("jsonl", e.to_string()))?
            .into_iter()
            .filter(|r| query.matches(r))
            .collect();
        Ok(query.finish(matching))
    }
}
