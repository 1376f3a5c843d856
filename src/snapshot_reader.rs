use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::aircraft_report::{AircraftReport, parse_snapshot};

/// Source of aircraft snapshots. Implementations never fail: anything that goes
/// wrong while reading yields an empty batch and the next poll tries again.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn read_snapshot(&self) -> Vec<AircraftReport>;
}

/// Reads the receiver's `aircraft.json` from disk
#[derive(Debug, Clone)]
pub struct FileSnapshotReader {
    path: PathBuf,
}

impl FileSnapshotReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SnapshotSource for FileSnapshotReader {
    async fn read_snapshot(&self) -> Vec<AircraftReport> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to read {}: {}", self.path.display(), e);
                metrics::counter!("ingest.snapshot.read_failed").increment(1);
                return Vec::new();
            }
        };

        // The receiver rewrites the file in place, so a partial document is expected now and then
        match parse_snapshot(&bytes) {
            Ok(parsed) => {
                if parsed.skipped_no_hex > 0 || parsed.skipped_malformed > 0 {
                    debug!(
                        "Snapshot {}: {} aircraft, {} without hex, {} malformed",
                        self.path.display(),
                        parsed.reports.len(),
                        parsed.skipped_no_hex,
                        parsed.skipped_malformed
                    );
                }
                metrics::counter!("ingest.reports.skipped_no_hex")
                    .increment(parsed.skipped_no_hex as u64);
                parsed.reports
            }
            Err(e) => {
                warn!("Skipping unreadable snapshot {}: {:#}", self.path.display(), e);
                metrics::counter!("ingest.snapshot.read_failed").increment(1);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_reports() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aircraft.json");
        std::fs::write(
            &path,
            r#"{"now": 1736942400.0, "aircraft": [
                {"hex": "4cc581", "flight": "ICE501 ", "lat": 64.1, "lon": -21.9, "seen": 5, "seen_pos": 5},
                {"flight": "NOHEX", "seen": 1}
            ]}"#,
        )
        .unwrap();

        let reports = FileSnapshotReader::new(&path).read_snapshot().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].hex, "4cc581");
    }

    #[tokio::test]
    async fn test_missing_file_yields_empty_batch() {
        let dir = tempfile::tempdir().unwrap();
        let reader = FileSnapshotReader::new(dir.path().join("absent.json"));
        assert!(reader.read_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_partial_file_yields_empty_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aircraft.json");
        std::fs::write(&path, r#"{"now": 1736942400.0, "aircraft": [{"hex": "4cc5"#).unwrap();

        assert!(FileSnapshotReader::new(&path).read_snapshot().await.is_empty());
    }
}
