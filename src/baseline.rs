// ===============================
// src/baseline.rs (daily balance baseline store)
// ===============================
//
// File JSON: { "YYYY-MM-DD": { "ASSET": balance } }
// Dibaca penuh, ditulis ulang penuh. Read-check-write dijaga Mutex (in-process)
// + lock file `<path>.lock` (antar proses).
// Dari async: pakai `get_or_init_async` (jalan di blocking pool, bukan worker tokio).
//
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime};

use chrono::NaiveDate;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info, warn};

pub type History = BTreeMap<String, BTreeMap<String, f64>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("baseline io {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("baseline json {path}: {source}")]
    Json { path: PathBuf, source: serde_json::Error },
    #[error("baseline lock {0} not acquired")]
    LockTimeout(PathBuf),
    #[error("baseline task: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// How hard to try for the sidecar lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    pub attempts: u32,
    /// A lock file older than this is assumed abandoned.
    pub stale_after: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self { attempts: 50, stale_after: Duration::from_secs(30) }
    }
}

/// Removes the lock file on drop.
struct FileLock { path: PathBuf }

impl FileLock {
    fn acquire(path: PathBuf, policy: LockPolicy) -> Result<Self, StoreError> {
        for attempt in 0..policy.attempts {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if is_stale(&path, policy.stale_after) {
                        match break_stale(&path, policy.stale_after) {
                            Ok(true) => warn!(path = %path.display(), "broke stale baseline lock"),
                            Ok(false) => debug!(path = %path.display(), "stale lock already handled"),
                            Err(source) => return Err(StoreError::Io { path, source }),
                        }
                        continue;
                    }
                    // backoff kecil + jitter
                    let wait = 10 + u64::from(attempt.min(10)) * 10 + rand::thread_rng().gen_range(0..10);
                    thread::sleep(Duration::from_millis(wait));
                }
                Err(source) => return Err(StoreError::Io { path, source }),
            }
        }
        Err(StoreError::LockTimeout(path))
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| SystemTime::now().duration_since(t).ok())
        .map_or(false, |age| age > stale_after)
}

/// Move a stale lock aside under a unique name, then delete it.
///
/// `Ok(false)` when another contender got there first. If the file moved aside
/// turns out to be fresh (someone re-locked in between), it is linked back.
fn break_stale(lock: &Path, stale_after: Duration) -> std::io::Result<bool> {
    let aside = sidecar(lock, &format!(".stale-{}-{:08x}", std::process::id(), rand::random::<u32>()));
    match fs::rename(lock, &aside) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    }
    if is_stale(&aside, stale_after) {
        fs::remove_file(&aside)?;
        return Ok(true);
    }
    if let Err(e) = fs::hard_link(&aside, lock) {
        warn!(path = %lock.display(), error = %e, "could not restore live baseline lock");
    }
    fs::remove_file(&aside)?;
    Ok(false)
}

fn sidecar(path: &Path, ext: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(ext);
    PathBuf::from(s)
}

pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Persisted start-of-day balances per asset. Keys are never pruned here.
///
/// Clones share the in-process guard.
#[derive(Debug, Clone)]
pub struct BaselineStore {
    path: PathBuf,
    policy: LockPolicy,
    guard: Arc<Mutex<()>>,
}

impl BaselineStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), policy: LockPolicy::default(), guard: Arc::new(Mutex::new(())) }
    }

    pub fn with_lock_policy(mut self, policy: LockPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn path(&self) -> &Path { &self.path }

    fn load(&self) -> Result<History, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(s) if s.trim().is_empty() => Ok(History::new()),
            Ok(s) => serde_json::from_str(&s)
                .map_err(|source| StoreError::Json { path: self.path.clone(), source }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(History::new()),
            Err(source) => Err(StoreError::Io { path: self.path.clone(), source }),
        }
    }

    fn ensure_parent(&self) -> Result<(), StoreError> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
                .map_err(|source| StoreError::Io { path: parent.to_path_buf(), source }),
            _ => Ok(()),
        }
    }

    fn save(&self, history: &History) -> Result<(), StoreError> {
        let body = serde_json::to_string_pretty(history)
            .map_err(|source| StoreError::Json { path: self.path.clone(), source })?;
        // tulis ke .tmp lalu rename, supaya pembaca tidak pernah lihat file setengah jadi
        let tmp = sidecar(&self.path, ".tmp");
        fs::write(&tmp, body).map_err(|source| StoreError::Io { path: tmp.clone(), source })?;
        fs::rename(&tmp, &self.path).map_err(|source| StoreError::Io { path: self.path.clone(), source })
    }

    pub fn get(&self, date: NaiveDate, asset: &str) -> Result<Option<f64>, StoreError> {
        let _g = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.load()?.get(&date_key(date)).and_then(|m| m.get(asset)).copied())
    }

    /// Baseline for `(date, asset)`; the first caller of the day records `current`.
    /// Blocks while waiting for the lock file.
    pub fn get_or_init(&self, date: NaiveDate, asset: &str, current: f64) -> Result<f64, StoreError> {
        let _g = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        self.ensure_parent()?;
        let _lock = FileLock::acquire(sidecar(&self.path, ".lock"), self.policy)?;

        let mut history = self.load()?;
        let key = date_key(date);
        if let Some(v) = history.get(&key).and_then(|m| m.get(asset)) {
            debug!(date = %key, %asset, baseline = v, "baseline hit");
            return Ok(*v);
        }
        history.entry(key.clone()).or_default().insert(asset.to_string(), current);
        self.save(&history)?;
        info!(date = %key, %asset, baseline = current, "baseline recorded");
        Ok(current)
    }

    /// `get_or_init` on the blocking pool.
    pub async fn get_or_init_async(&self, date: NaiveDate, asset: &str, current: f64) -> Result<f64, StoreError> {
        let store = self.clone();
        let asset = asset.to_string();
        tokio::task::spawn_blocking(move || store.get_or_init(date, &asset, current)).await?
    }

    pub fn snapshot(&self) -> Result<History, StoreError> {
        let _g = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        self.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(2025, 3, d).unwrap() }

    #[test]
    fn first_observation_wins_for_the_day() {
        let dir = tempfile::tempdir().unwrap();
        let store = BaselineStore::new(dir.path().join("daily_balances.json"));
        assert_eq!(store.get(day(1), "XRP").unwrap(), None);
        assert_eq!(store.get_or_init(day(1), "XRP", 100.0).unwrap(), 100.0);
        assert_eq!(store.get_or_init(day(1), "XRP", 250.0).unwrap(), 100.0);
        // new date is a new key
        assert_eq!(store.get_or_init(day(2), "XRP", 250.0).unwrap(), 250.0);
        assert_eq!(store.get(day(1), "XRP").unwrap(), Some(100.0));
        assert!(!sidecar(store.path(), ".lock").exists());
    }

    #[test]
    fn file_layout_is_date_then_asset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("b.json");
        let store = BaselineStore::new(&path);
        store.get_or_init(day(5), "CAKE", 3.5).unwrap();
        let v: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["2025-03-05"]["CAKE"], 3.5);

        // reopen: existing content is kept
        let again = BaselineStore::new(&path);
        assert_eq!(again.get_or_init(day(5), "CAKE", 9.0).unwrap(), 3.5);
        assert_eq!(again.snapshot().unwrap().len(), 1);
    }

    #[test]
    fn concurrent_writers_agree_on_one_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.json");
        // separate store instances stand in for separate processes
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let p = path.clone();
                thread::spawn(move || BaselineStore::new(p).get_or_init(day(7), "XRP", i as f64).unwrap())
            })
            .collect();
        let seen: Vec<f64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(seen.windows(2).all(|w| w[0] == w[1]), "{seen:?}");

        assert_eq!(BaselineStore::new(&path).get(day(7), "XRP").unwrap(), Some(seen[0]));
    }

    fn age(path: &Path, secs: u64) {
        let f = OpenOptions::new().write(true).open(path).unwrap();
        f.set_modified(SystemTime::now() - Duration::from_secs(secs)).unwrap();
    }

    fn leftovers(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> =
            fs::read_dir(dir).unwrap().map(|e| e.unwrap().file_name().to_string_lossy().into_owned()).collect();
        names.sort();
        names
    }

    #[test]
    fn abandoned_lock_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.json");
        let lock = sidecar(&path, ".lock");
        fs::write(&lock, "").unwrap();
        age(&lock, 120);

        let store = BaselineStore::new(&path);
        assert_eq!(store.get_or_init(day(3), "XRP", 42.0).unwrap(), 42.0);
        assert_eq!(leftovers(dir.path()), vec!["b.json".to_string()]);
    }

    #[test]
    fn held_lock_gives_up_after_bounded_retries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.json");
        let lock = sidecar(&path, ".lock");
        fs::write(&lock, "").unwrap();

        let store = BaselineStore::new(&path)
            .with_lock_policy(LockPolicy { attempts: 3, stale_after: Duration::from_secs(30) });
        assert!(matches!(store.get_or_init(day(3), "XRP", 1.0), Err(StoreError::LockTimeout(p)) if p == lock));
        // someone else's lock is left alone, nothing was written
        assert!(lock.exists());
        assert!(!path.exists());
    }

    #[test]
    fn breaking_keeps_a_lock_that_was_renewed() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join("b.json.lock");
        fs::write(&lock, "").unwrap();

        // fresh by the time it is moved aside: put back
        assert!(!break_stale(&lock, Duration::from_secs(30)).unwrap());
        assert_eq!(leftovers(dir.path()), vec!["b.json.lock".to_string()]);

        age(&lock, 120);
        assert!(break_stale(&lock, Duration::from_secs(30)).unwrap());
        // second contender finds nothing to break
        assert!(!break_stale(&lock, Duration::from_secs(30)).unwrap());
        assert!(leftovers(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn async_lookup_runs_off_the_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let store = BaselineStore::new(dir.path().join("b.json"));
        assert_eq!(store.get_or_init_async(day(9), "CAKE", 5.0).await.unwrap(), 5.0);
        assert_eq!(store.clone().get_or_init_async(day(9), "CAKE", 6.0).await.unwrap(), 5.0);
    }

    #[test]
    fn corrupt_file_is_an_error_not_a_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.json");
        fs::write(&path, "{not json").unwrap();
        let store = BaselineStore::new(&path);
        assert!(matches!(store.get_or_init(day(1), "XRP", 1.0), Err(StoreError::Json { .. })));
    }
}
