//! Persistent sample cache
//!
//! Small on-disk history that lets the forecaster see a trend across
//! one-shot runs. Layout: one directory per cluster context, one
//! append-only log per metric of fixed-width `(unix_ts, value)` records.
//! A ring truncation keeps each file at or under 1 MB. Writes go to a
//! temp file and are renamed into place; access is serialized behind a
//! lock file and reads take a snapshot copy.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Result, SmartError};

/// `{ts:>12} {value:>18.6}\n`
const RECORD_WIDTH: usize = 32;
const MAX_FILE_BYTES: usize = 1024 * 1024;
const MAX_RECORDS: usize = MAX_FILE_BYTES / RECORD_WIDTH;

const LOCK_RETRIES: u32 = 50;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(10);
const LOCK_STALE_AFTER: Duration = Duration::from_secs(10);

pub struct SampleCache {
    dir: PathBuf,
}

impl SampleCache {
    /// Open (and create) the cache directory for one cluster context.
    pub fn open(base_dir: &Path, context: &str) -> Result<Self> {
        let dir = base_dir.join(sanitize(context));
        fs::create_dir_all(&dir).map_err(|e| {
            SmartError::Config(format!("cannot create cache dir {}: {e}", dir.display()))
        })?;
        Ok(Self { dir })
    }

    /// Append one sample and return the full history including it.
    pub fn record(&self, metric: &str, ts: i64, value: f64) -> Result<Vec<(i64, f64)>> {
        let _lock = LockFile::acquire(&self.dir.join(".lock"))?;
        let path = self.metric_path(metric);

        let mut samples = read_samples(&path);
        samples.push((ts, value));
        samples.sort_by_key(|(t, _)| *t);
        samples.dedup_by_key(|(t, _)| *t);

        // Ring truncation: drop the oldest half once full
        if samples.len() > MAX_RECORDS {
            let drop = samples.len() - MAX_RECORDS / 2;
            samples.drain(..drop);
        }

        write_atomic(&path, &samples)?;
        Ok(samples)
    }

    /// Snapshot of a metric's history; empty when nothing is cached.
    pub fn read(&self, metric: &str) -> Vec<(i64, f64)> {
        let Ok(_lock) = LockFile::acquire(&self.dir.join(".lock")) else {
            return Vec::new();
        };
        read_samples(&self.metric_path(metric))
    }

    fn metric_path(&self, metric: &str) -> PathBuf {
        self.dir.join(format!("{}.log", sanitize(metric)))
    }
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn read_samples(path: &Path) -> Vec<(i64, f64)> {
    let Ok(content) = fs::read_to_string(path) else {
        return Vec::new();
    };
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let ts = fields.next()?.parse().ok()?;
            let value = fields.next()?.parse().ok()?;
            Some((ts, value))
        })
        .collect()
}

fn write_atomic(path: &Path, samples: &[(i64, f64)]) -> Result<()> {
    let mut content = String::with_capacity(samples.len() * RECORD_WIDTH);
    for (ts, value) in samples {
        content.push_str(&format!("{ts:>12} {value:>18.6}\n"));
    }

    let temp = path.with_extension("tmp");
    fs::write(&temp, content.as_bytes())
        .map_err(|e| SmartError::Internal(format!("cache write failed: {e}")))?;
    fs::rename(&temp, path)
        .map_err(|e| SmartError::Internal(format!("cache rename failed: {e}")))?;
    debug!(path = %path.display(), records = samples.len(), "cache file updated");
    Ok(())
}

/// Exclusive lock via `O_EXCL` file creation. Stale locks left by a killed
/// process are reclaimed after ten seconds.
struct LockFile {
    path: PathBuf,
}

impl LockFile {
    fn acquire(path: &Path) -> Result<Self> {
        for _ in 0..LOCK_RETRIES {
            match fs::OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(_) => {
                    return Ok(Self {
                        path: path.to_path_buf(),
                    })
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if lock_is_stale(path) {
                        warn!(path = %path.display(), "removing stale cache lock");
                        let _ = fs::remove_file(path);
                        continue;
                    }
                    std::thread::sleep(LOCK_RETRY_DELAY);
                }
                Err(e) => {
                    return Err(SmartError::Internal(format!(
                        "cannot create cache lock {}: {e}",
                        path.display()
                    )))
                }
            }
        }
        Err(SmartError::Internal(format!(
            "cache lock {} is held by another process",
            path.display()
        )))
    }
}

fn lock_is_stale(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|mtime| mtime.elapsed().ok())
        .is_some_and(|age| age > LOCK_STALE_AFTER)
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SampleCache::open(dir.path(), "test-context").unwrap();

        cache.record("node_w1_cpu", 1000, 42.5).unwrap();
        cache.record("node_w1_cpu", 2000, 43.25).unwrap();

        let samples = cache.read("node_w1_cpu");
        assert_eq!(samples, vec![(1000, 42.5), (2000, 43.25)]);
    }

    #[test]
    fn metrics_are_isolated_per_context() {
        let dir = tempfile::tempdir().unwrap();
        let a = SampleCache::open(dir.path(), "ctx-a").unwrap();
        let b = SampleCache::open(dir.path(), "ctx-b").unwrap();

        a.record("m", 1, 1.0).unwrap();
        assert!(b.read("m").is_empty());
    }

    #[test]
    fn duplicate_timestamps_are_collapsed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SampleCache::open(dir.path(), "c").unwrap();
        cache.record("m", 100, 1.0).unwrap();
        let samples = cache.record("m", 100, 2.0).unwrap();
        assert_eq!(samples.len(), 1);
    }

    #[test]
    fn ring_truncation_caps_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SampleCache::open(dir.path(), "c").unwrap();

        // Simulate an over-full history on disk, then append
        let samples: Vec<(i64, f64)> = (0..MAX_RECORDS as i64 + 10).map(|i| (i, i as f64)).collect();
        write_atomic(&cache.metric_path("m"), &samples).unwrap();

        let after = cache.record("m", 10_000_000, 1.0).unwrap();
        assert!(after.len() <= MAX_RECORDS / 2 + 1);
        assert_eq!(after.last().unwrap().0, 10_000_000);

        let size = fs::metadata(cache.metric_path("m")).unwrap().len() as usize;
        assert!(size <= MAX_FILE_BYTES);
    }

    #[test]
    fn lock_contention_times_out_then_recovers_after_stale() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SampleCache::open(dir.path(), "c").unwrap();
        let lock_path = dir.path().join("c").join(".lock");

        // A held (fresh) lock blocks the writer
        fs::write(&lock_path, b"").unwrap();
        assert!(cache.record("m", 1, 1.0).is_err());
        fs::remove_file(&lock_path).unwrap();
        assert!(cache.record("m", 1, 1.0).is_ok());
    }

    #[test]
    fn corrupt_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SampleCache::open(dir.path(), "c").unwrap();
        fs::write(cache.metric_path("m"), "garbage line\n         100          1.500000\n").unwrap();
        assert_eq!(cache.read("m"), vec![(100, 1.5)]);
    }
}
