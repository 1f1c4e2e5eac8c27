//! Timestamped backups in a backup directory.
//!
//! Files are named `inventory_backup_{reason}_{YYYYmmdd_HHMMSS}.db` with the
//! timestamp in UTC, so the newest backup can be found from names alone.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use stockroom_infra::Store;

const PREFIX: &str = "inventory_backup_";
const SUFFIX: &str = ".db";
const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const STAMP_LEN: usize = 15;

/// Backups older than this are refreshed on startup.
const MAX_BACKUP_AGE_HOURS: i64 = 24;

pub fn backup_file_name(reason: &str, at: DateTime<Utc>) -> Result<String> {
    if reason.is_empty() || !reason.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        bail!("backup reason `{reason}` must be letters, digits or dashes");
    }
    Ok(format!("{PREFIX}{reason}_{}{SUFFIX}", at.format(STAMP_FORMAT)))
}

/// Timestamp encoded in a backup file name, if it is one.
fn stamp_of(file_name: &str) -> Option<DateTime<Utc>> {
    let stem = file_name.strip_prefix(PREFIX)?.strip_suffix(SUFFIX)?;
    let split = stem.len().checked_sub(STAMP_LEN)?;
    let (head, stamp) = (stem.get(..split)?, stem.get(split..)?);
    if !head.ends_with('_') || head.len() < 2 {
        return None;
    }
    NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Time of the newest backup in `dir`; `None` when there is none or the
/// directory does not exist yet.
pub fn latest_backup_time(dir: &Path) -> Result<Option<DateTime<Utc>>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err).with_context(|| format!("cannot read {}", dir.display())),
    };

    let mut latest = None;
    for entry in entries {
        let entry = entry.with_context(|| format!("cannot read {}", dir.display()))?;
        if let Some(stamp) = entry.file_name().to_str().and_then(stamp_of) {
            latest = latest.max(Some(stamp));
        }
    }
    Ok(latest)
}

pub async fn create_backup(store: &Store, dir: &Path, reason: &str, at: DateTime<Utc>) -> Result<PathBuf> {
    let target = dir.join(backup_file_name(reason, at)?);
    std::fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
    store
        .backup_to(&target)
        .await
        .with_context(|| format!("backup to {} failed", target.display()))?;
    Ok(target)
}

/// Back up when the newest backup is missing or older than a day.
pub async fn backup_if_stale(store: &Store, dir: &Path, now: DateTime<Utc>) -> Result<Option<PathBuf>> {
    match latest_backup_time(dir)? {
        Some(latest) if now - latest < Duration::hours(MAX_BACKUP_AGE_HOURS) => Ok(None),
        _ => create_backup(store, dir, "auto", now).await.map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 30, 5).unwrap()
    }

    #[test]
    fn names_round_trip_their_timestamp() {
        let name = backup_file_name("pre-import", at(2, 14)).unwrap();
        assert_eq!(name, "inventory_backup_pre-import_20240302_143005.db");
        assert_eq!(stamp_of(&name), Some(at(2, 14)));

        assert!(backup_file_name("", at(1, 0)).is_err());
        assert!(backup_file_name("../escape", at(1, 0)).is_err());
        assert_eq!(stamp_of("inventory_backup__20240302_143005.db"), None);
        assert_eq!(stamp_of("notes.txt"), None);
        assert_eq!(stamp_of("inventory_backup_auto_2024.db"), None);
    }

    #[test]
    fn latest_ignores_unrelated_files() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(latest_backup_time(&dir.path().join("missing")).unwrap(), None);

        for name in [
            backup_file_name("auto", at(1, 9)).unwrap(),
            backup_file_name("manual", at(3, 9)).unwrap(),
            "inventory_backup_manual_garbage.db".to_string(),
            "readme.md".to_string(),
        ] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        assert_eq!(latest_backup_time(dir.path()).unwrap(), Some(at(3, 9)));
    }

    #[tokio::test]
    async fn stale_backups_are_refreshed() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory().await.unwrap();

        let first = backup_if_stale(&store, dir.path(), at(1, 9)).await.unwrap();
        assert!(first.is_some_and(|path| path.exists()));

        assert!(backup_if_stale(&store, dir.path(), at(1, 20)).await.unwrap().is_none());

        let refreshed = backup_if_stale(&store, dir.path(), at(2, 10)).await.unwrap();
        assert!(refreshed.is_some());
        assert_eq!(latest_backup_time(dir.path()).unwrap(), Some(at(2, 10)));
    }
}
