//! Periodic worker status snapshots for external liveness checks.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Snapshot of the worker's counters, written on a fixed interval and once
/// more at shutdown. Mutated only by the worker's own loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatus {
    /// Snapshot time (RFC 3339, UTC)
    pub timestamp: String,
    /// "running" while the loop is active, "stopped" after shutdown
    pub status: String,
    /// Messages archived and acknowledged
    pub messages_processed: u64,
    /// Messages that failed parsing, upload, or processing
    pub messages_failed: u64,
    /// Id of the most recently archived-and-acknowledged message
    pub last_processed_id: Option<String>,
    /// Seconds since the worker started
    pub uptime_seconds: i64,
}

/// Writes status snapshots to a file pollable by a liveness checker.
pub struct StatusWriter {
    path: PathBuf,
}

impl StatusWriter {
    /// Snapshot file name within the health directory
    pub const FILE_NAME: &'static str = "worker-status.json";

    /// Create a writer targeting `<health_dir>/worker-status.json`
    pub fn new(health_dir: impl AsRef<Path>) -> Self {
        Self {
            path: health_dir.as_ref().join(Self::FILE_NAME),
        }
    }

    /// Path of the snapshot file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one snapshot, replacing the previous one
    pub async fn write(&self, status: &WorkerStatus) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let body = serde_json::to_vec_pretty(status)?;
        tokio::fs::write(&self.path, body).await?;

        debug!(
            path = %self.path.display(),
            messages_processed = status.messages_processed,
            "Status snapshot written"
        );
        Ok(())
    }
}

/// Current RFC 3339 UTC timestamp for snapshots and dead-letter records
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let writer = StatusWriter::new(dir.path());

        let status = WorkerStatus {
            timestamp: now_rfc3339(),
            status: "running".to_string(),
            messages_processed: 7,
            messages_failed: 2,
            last_processed_id: Some("msg_0123456789abcdef".to_string()),
            uptime_seconds: 42,
        };

        writer.write(&status).await.unwrap();

        let written = tokio::fs::read(writer.path()).await.unwrap();
        let read_back: WorkerStatus = serde_json::from_slice(&written).unwrap();
        assert_eq!(read_back, status);
    }

    #[tokio::test]
    async fn test_snapshot_replaces_previous() {
        let dir = tempfile::tempdir().unwrap();
        let writer = StatusWriter::new(dir.path());

        let mut status = WorkerStatus {
            timestamp: now_rfc3339(),
            status: "running".to_string(),
            messages_processed: 1,
            messages_failed: 0,
            last_processed_id: None,
            uptime_seconds: 1,
        };
        writer.write(&status).await.unwrap();

        status.messages_processed = 2;
        status.status = "stopped".to_string();
        writer.write(&status).await.unwrap();

        let written = tokio::fs::read(writer.path()).await.unwrap();
        let read_back: WorkerStatus = serde_json::from_slice(&written).unwrap();
        assert_eq!(read_back.messages_processed, 2);
        assert_eq!(read_back.status, "stopped");
    }
}
