//! Archive rotation (spec §4.9): once the sessions directory exceeds the
//! configured size cap, the oldest sessions are packed into a dated `tar`
//! bundle under `.ada/logs/archive/` and removed from the live directory.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;

/// Rotate `sessions_dir` if its total size exceeds `cap_bytes`, moving the
/// oldest files (by modification time) into a new tar bundle under
/// `archive_dir` until the directory is back under the cap. Returns the
/// filenames that were archived, so the caller can flip their index
/// entries to `archived`.
pub async fn rotate_if_oversized(
    sessions_dir: &Path,
    archive_dir: &Path,
    cap_bytes: u64,
) -> std::io::Result<Vec<String>> {
    let sessions_dir = sessions_dir.to_path_buf();
    let archive_dir = archive_dir.to_path_buf();
    let stamp = Utc::now().format("%Y%m%d%H%M%S").to_string();

    tokio::task::spawn_blocking(move || rotate_blocking(&sessions_dir, &archive_dir, cap_bytes, &stamp))
        .await
        .expect("archive rotation task panicked")
}

fn rotate_blocking(
    sessions_dir: &Path,
    archive_dir: &Path,
    cap_bytes: u64,
    stamp: &str,
) -> std::io::Result<Vec<String>> {
    if !sessions_dir.exists() {
        return Ok(Vec::new());
    }

    let mut files: Vec<(PathBuf, u64, std::time::SystemTime)> = Vec::new();
    let mut total: u64 = 0;
    for entry in std::fs::read_dir(sessions_dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        total += meta.len();
        files.push((entry.path(), meta.len(), meta.modified()?));
    }

    if total <= cap_bytes {
        return Ok(Vec::new());
    }

    files.sort_by_key(|(_, _, modified)| *modified);

    std::fs::create_dir_all(archive_dir)?;
    let bundle_path = archive_dir.join(format!("{stamp}.tar"));
    let bundle = std::fs::File::create(&bundle_path)?;
    let mut builder = tar::Builder::new(bundle);

    let mut archived = Vec::new();
    for (path, size, _) in &files {
        if total <= cap_bytes {
            break;
        }
        let filename = path
            .file_name()
            .expect("directory entry always has a file name")
            .to_string_lossy()
            .to_string();
        let mut f = std::fs::File::open(path)?;
        builder.append_file(&filename, &mut f)?;
        archived.push(filename);
        total = total.saturating_sub(*size);
    }
    builder.finish()?;
    drop(builder);

    for (path, _, _) in files.iter().take(archived.len()) {
        std::fs::remove_file(path)?;
    }

    Ok(archived)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn leaves_small_directory_untouched() {
        let dir = tempdir().unwrap();
        let sessions = dir.path().join("sessions");
        std::fs::create_dir_all(&sessions).unwrap();
        std::fs::write(sessions.join("session-1.jsonl"), b"small").unwrap();

        let archive = dir.path().join("archive");
        let archived = rotate_if_oversized(&sessions, &archive, 1024 * 1024).await.unwrap();
        assert!(archived.is_empty());
        assert!(sessions.join("session-1.jsonl").exists());
    }

    #[tokio::test]
    async fn archives_oldest_files_when_over_cap() {
        let dir = tempdir().unwrap();
        let sessions = dir.path().join("sessions");
        std::fs::create_dir_all(&sessions).unwrap();

        let old = sessions.join("session-old.jsonl");
        std::fs::write(&old, vec![b'a'; 100]).unwrap();
        // Ensure distinguishable mtimes across filesystems with coarse
        // resolution.
        std::thread::sleep(std::time::Duration::from_millis(10));
        let new = sessions.join("session-new.jsonl");
        std::fs::write(&new, vec![b'b'; 100]).unwrap();

        let archive = dir.path().join("archive");
        let archived = rotate_if_oversized(&sessions, &archive, 150).await.unwrap();

        assert_eq!(archived, vec!["session-old.jsonl".to_string()]);
        assert!(!old.exists());
        assert!(new.exists());

        let bundles: Vec<_> = std::fs::read_dir(&archive).unwrap().collect();
        assert_eq!(bundles.len(), 1);
        let bundle_path = bundles.into_iter().next().unwrap().unwrap().path();
        let mut archive_file = tar::Archive::new(std::fs::File::open(bundle_path).unwrap());
        let mut names = Vec::new();
        for entry in archive_file.entries().unwrap() {
            let entry = entry.unwrap();
            names.push(entry.path().unwrap().to_string_lossy().to_string());
        }
        assert_eq!(names, vec!["session-old.jsonl".to_string()]);
    }
}
