//! Small shared helpers: monotonic session ids and atomic file writes.
//!
//! Every persisted document in this crate (backlog, checkpoint, alert store,
//! session index) uses the same write-temp-then-rename pattern, so it lives
//! here once instead of being copy-pasted into each store.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;

/// Build a session log filename matching spec §6's documented layout:
/// `<YYYYMMDD>_<NNN>_<agent>_<feature>.jsonl`, zero-padding the sequence to
/// three digits and substituting `init` for the feature segment when there
/// is no feature (the one-shot initializer session).
pub fn session_log_filename(started_at: DateTime<Utc>, session_id: u64, agent_kind: &str, feature_id: Option<&str>) -> String {
    let date = started_at.format("%Y%m%d");
    let feature = feature_id.unwrap_or("init");
    format!("{date}_{session_id:03}_{agent_kind}_{feature}.jsonl")
}

/// Monotonically increasing session id generator, seeded from the highest
/// id already present in the session index at startup.
#[derive(Debug)]
pub struct SessionIdGenerator {
    next: AtomicU64,
}

impl SessionIdGenerator {
    pub fn starting_at(next: u64) -> Self {
        Self {
            next: AtomicU64::new(next),
        }
    }

    /// Allocate the next session id.
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// The id that would be returned by the next call to [`Self::next`],
    /// without consuming it. Used by resume logic to report the resume
    /// point without allocating.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}

impl Default for SessionIdGenerator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

/// Write `contents` to `path` atomically: write to a sibling `.tmp` file in
/// the same directory, fsync it, then rename over the destination. Rename
/// within the same filesystem is atomic on every platform this crate
/// targets, so readers never observe a partially-written document.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let tmp_path = sibling_tmp_path(path);
    {
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(contents).await?;
        file.flush().await?;
        file.sync_all().await?;
    }
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

/// Synchronous counterpart of [`write_atomic`] for call sites that are not
/// async (e.g. a panic hook or a signal handler running final flush logic).
pub fn write_atomic_sync(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    let tmp_path = sibling_tmp_path(path);
    {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.flush()?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn sibling_tmp_path(path: &Path) -> std::path::PathBuf {
    let file_name = path
        .file_name()
        .map(|n| format!(".{}.tmp", n.to_string_lossy()))
        .unwrap_or_else(|| ".tmp".to_string());
    path.with_file_name(file_name)
}

/// Validate a feature id slug: lowercase ascii alphanumerics and hyphens
/// only, non-empty. Used at backlog load time and whenever a feature is
/// added programmatically.
pub fn is_valid_feature_slug(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !id.starts_with('-')
        && !id.ends_with('-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_generator_increments() {
        let gen = SessionIdGenerator::starting_at(5);
        assert_eq!(gen.peek(), 5);
        assert_eq!(gen.next(), 5);
        assert_eq!(gen.next(), 6);
        assert_eq!(gen.peek(), 7);
    }

    #[test]
    fn feature_slug_validation() {
        assert!(is_valid_feature_slug("add-login-page"));
        assert!(is_valid_feature_slug("f-042"));
        assert!(!is_valid_feature_slug(""));
        assert!(!is_valid_feature_slug("-leading-hyphen"));
        assert!(!is_valid_feature_slug("Has Spaces"));
        assert!(!is_valid_feature_slug("Upper_Case"));
    }

    #[test]
    fn session_log_filename_matches_documented_layout() {
        let started = DateTime::parse_from_rfc3339("2026-07-28T09:15:00Z").unwrap().with_timezone(&Utc);
        assert_eq!(
            session_log_filename(started, 7, "coding", Some("add-login-page")),
            "20260728_007_coding_add-login-page.jsonl"
        );
        assert_eq!(
            session_log_filename(started, 1, "initializer", None),
            "20260728_001_initializer_init.jsonl"
        );
    }

    #[tokio::test]
    async fn write_atomic_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        write_atomic(&path, b"{\"a\":1}").await.unwrap();
        let read_back = tokio::fs::read(&path).await.unwrap();
        assert_eq!(read_back, b"{\"a\":1}");
        // tmp sibling must not remain
        assert!(!sibling_tmp_path(&path).exists());
    }
}
