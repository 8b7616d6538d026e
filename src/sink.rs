//! Output sink for the three materialized tables.
//!
//! Each commit replaces `clean_readings.jsonl`, `window_stats.jsonl` and
//! `anomalies.jsonl` as a unit. Every table is first serialized to a
//! `.jsonl.tmp` file next to its target. Only once all three are staged does
//! the swap begin: each previous table is hard-linked to `.jsonl.bak` before
//! its staged file is renamed over it. If any step of the swap fails, the
//! tables already swapped are restored from their backups, so a failed commit
//! leaves the previous snapshot in place and no temp files behind.

use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::defaults;
use crate::types::{AnomalyRecord, CleanReading, WindowStat};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize row for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Row counts of a committed snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    pub clean_readings: usize,
    pub window_stats: usize,
    pub anomalies: usize,
}

#[derive(Debug, Clone)]
pub struct OutputSink {
    dir: PathBuf,
}

impl OutputSink {
    /// Sink rooted at `dir` (created if missing).
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| SinkError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn clean_readings_path(&self) -> PathBuf {
        self.dir.join(defaults::CLEAN_READINGS_FILE)
    }

    pub fn window_stats_path(&self) -> PathBuf {
        self.dir.join(defaults::WINDOW_STATS_FILE)
    }

    pub fn anomalies_path(&self) -> PathBuf {
        self.dir.join(defaults::ANOMALIES_FILE)
    }

    /// Replace all three tables.
    pub fn commit(
        &self,
        clean: &[CleanReading],
        window_stats: &[WindowStat],
        anomalies: &[AnomalyRecord],
    ) -> Result<CommitSummary, SinkError> {
        let targets = [
            self.clean_readings_path(),
            self.window_stats_path(),
            self.anomalies_path(),
        ];

        let staged = [
            write_staged(&targets[0], clean),
            write_staged(&targets[1], window_stats),
            write_staged(&targets[2], anomalies),
        ];

        let mut temps = Vec::with_capacity(staged.len());
        let mut first_error = None;
        for result in staged {
            match result {
                Ok(tmp) => temps.push(tmp),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            temps.iter().for_each(|tmp| discard(tmp));
            return Err(e);
        }

        let mut swapped: Vec<Swapped> = Vec::with_capacity(targets.len());
        for (tmp, target) in temps.iter().zip(&targets) {
            match swap_in(tmp, target) {
                Ok(done) => swapped.push(done),
                Err(e) => {
                    warn!(table = %target.display(), error = %e, "Commit failed mid-swap, restoring previous tables");
                    for done in swapped.iter().rev() {
                        done.restore();
                    }
                    temps.iter().for_each(|tmp| discard(tmp));
                    return Err(e);
                }
            }
        }
        for done in &swapped {
            if let Some(backup) = &done.backup {
                discard(backup);
            }
        }

        let summary = CommitSummary {
            clean_readings: clean.len(),
            window_stats: window_stats.len(),
            anomalies: anomalies.len(),
        };
        debug!(dir = %self.dir.display(), ?summary, "Committed output tables");
        Ok(summary)
    }
}

/// A table whose staged file has replaced the previous one.
struct Swapped {
    target: PathBuf,
    /// Link to the previous table, `None` if there was none
    backup: Option<PathBuf>,
}

impl Swapped {
    /// Put the previous table back, or remove the new one if there was none.
    fn restore(&self) {
        let result = match &self.backup {
            Some(backup) => std::fs::rename(backup, &self.target),
            None => std::fs::remove_file(&self.target),
        };
        if let Err(e) = result {
            warn!(table = %self.target.display(), error = %e, "Failed to restore previous table");
        }
    }
}

/// Back up `target` and rename the staged `tmp` over it.
fn swap_in(tmp: &Path, target: &Path) -> Result<Swapped, SinkError> {
    let io_err = |path: &Path, source| SinkError::Io {
        path: path.to_path_buf(),
        source,
    };

    let backup = match std::fs::symlink_metadata(target) {
        Ok(_) => {
            let backup = target.with_extension("jsonl.bak");
            discard(&backup);
            std::fs::hard_link(target, &backup).map_err(|e| io_err(target, e))?;
            Some(backup)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(io_err(target, e)),
    };

    if let Err(e) = std::fs::rename(tmp, target) {
        if let Some(backup) = &backup {
            discard(backup);
        }
        return Err(io_err(target, e));
    }
    Ok(Swapped {
        target: target.to_path_buf(),
        backup,
    })
}

/// Best-effort removal of a temp or backup file.
fn discard(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove leftover file");
        }
    }
}

/// Serialize `rows` as JSON lines into a temp file beside `target`.
///
/// The temp file is removed again if any write fails.
fn write_staged<T: Serialize>(target: &Path, rows: &[T]) -> Result<PathBuf, SinkError> {
    let tmp = target.with_extension("jsonl.tmp");
    let io_err = |source| SinkError::Io {
        path: tmp.clone(),
        source,
    };

    let file = File::create(&tmp).map_err(io_err)?;
    let written = (|| -> Result<(), SinkError> {
        let mut writer = BufWriter::new(file);
        for row in rows {
            serde_json::to_writer(&mut writer, row).map_err(|source| SinkError::Serialize {
                path: target.to_path_buf(),
                source,
            })?;
            writer.write_all(b"\n").map_err(io_err)?;
        }
        let file = writer.into_inner().map_err(|e| io_err(e.into_error()))?;
        file.sync_all().map_err(io_err)
    })();

    match written {
        Ok(()) => Ok(tmp),
        Err(e) => {
            discard(&tmp);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WindowBounds;
    use chrono::{TimeZone, Utc};

    fn clean(power_output: f64) -> CleanReading {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 3, 0, 0).unwrap();
        CleanReading {
            timestamp: ts,
            turbine_id: 1,
            wind_speed: 10.0,
            wind_direction: 90.0,
            power_output,
            loaded_time: ts,
        }
    }

    fn stat() -> WindowStat {
        WindowStat {
            turbine_id: 1,
            window: WindowBounds {
                start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            },
            avg_power: 5.0,
            min_power: 4.0,
            max_power: 6.0,
            std_power: Some(0.5),
            reading_count: 3,
            sigma_multiplier: 2.0,
        }
    }

    fn lines(path: &Path) -> Vec<serde_json::Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_commit_writes_all_tables() {
        let dir = tempfile::tempdir().unwrap();
        let sink = OutputSink::new(dir.path().join("out")).unwrap();
        let anomaly = AnomalyRecord {
            reading: clean(9.0),
            window: stat(),
            is_anomaly: true,
        };

        let summary = sink.commit(&[clean(5.0), clean(9.0)], &[stat()], &[anomaly]).unwrap();
        assert_eq!(summary.clean_readings, 2);

        assert_eq!(lines(&sink.clean_readings_path()).len(), 2);
        let stats = lines(&sink.window_stats_path());
        assert_eq!(stats[0]["upper_bound"], 6.0);
        let anomalies = lines(&sink.anomalies_path());
        assert_eq!(anomalies[0]["is_anomaly"], true);
        assert_eq!(anomalies[0]["power_output"], 9.0);
    }

    #[test]
    fn test_commit_replaces_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let sink = OutputSink::new(dir.path()).unwrap();
        sink.commit(&[clean(5.0), clean(6.0)], &[stat()], &[]).unwrap();
        sink.commit(&[clean(5.0)], &[], &[]).unwrap();

        assert_eq!(lines(&sink.clean_readings_path()).len(), 1);
        assert!(lines(&sink.window_stats_path()).is_empty());
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().extension().is_some_and(|x| x == "tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_failed_staging_keeps_previous_tables() {
        let dir = tempfile::tempdir().unwrap();
        let sink = OutputSink::new(dir.path()).unwrap();
        sink.commit(&[clean(5.0)], &[stat()], &[]).unwrap();

        // A directory squatting on the anomalies temp path makes staging fail
        std::fs::create_dir(sink.anomalies_path().with_extension("jsonl.tmp")).unwrap();
        assert!(sink.commit(&[clean(1.0), clean(2.0)], &[], &[]).is_err());

        let kept = lines(&sink.clean_readings_path());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0]["power_output"], 5.0);
        assert_eq!(lines(&sink.window_stats_path()).len(), 1);
    }

    fn leftovers(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp") || name.ends_with(".bak"))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_failed_swap_restores_previous_tables() {
        let dir = tempfile::tempdir().unwrap();
        let sink = OutputSink::new(dir.path()).unwrap();
        sink.commit(&[clean(5.0)], &[stat()], &[]).unwrap();

        // A non-empty directory in place of the stats table makes its swap
        // fail after the clean table has already been replaced
        std::fs::remove_file(sink.window_stats_path()).unwrap();
        std::fs::create_dir(sink.window_stats_path()).unwrap();
        std::fs::write(sink.window_stats_path().join("keep"), b"x").unwrap();

        assert!(sink.commit(&[clean(1.0), clean(2.0)], &[], &[]).is_err());

        let kept = lines(&sink.clean_readings_path());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0]["power_output"], 5.0);
        assert!(lines(&sink.anomalies_path()).is_empty());
        assert!(sink.window_stats_path().is_dir());
        assert!(leftovers(dir.path()).is_empty(), "{:?}", leftovers(dir.path()));
    }

    #[test]
    fn test_failed_first_commit_leaves_no_tables() {
        let dir = tempfile::tempdir().unwrap();
        let sink = OutputSink::new(dir.path()).unwrap();
        std::fs::create_dir(sink.anomalies_path()).unwrap();
        std::fs::write(sink.anomalies_path().join("keep"), b"x").unwrap();

        assert!(sink.commit(&[clean(1.0)], &[stat()], &[]).is_err());
        assert!(!sink.clean_readings_path().exists());
        assert!(!sink.window_stats_path().exists());
        assert!(leftovers(dir.path()).is_empty());
    }

    #[test]
    fn test_failed_serialization_removes_temp_file() {
        struct Unserializable;

        impl Serialize for Unserializable {
            fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("cannot serialize"))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("broken.jsonl");
        let err = write_staged(&target, &[Unserializable]).unwrap_err();
        assert!(matches!(err, SinkError::Serialize { .. }));
        assert!(!target.with_extension("jsonl.tmp").exists());
    }
}
