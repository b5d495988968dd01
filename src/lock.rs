//! Advisory cross-process lock files.
//!
//! A lock is a file created with `create_new` whose first token names the
//! owner. While held, a heartbeat thread keeps its mtime fresh, so a lock
//! only goes stale once its owner has stopped (crashed or was killed)
//! for `lock_timeout`. Only the owner ever removes a live lock.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::CacheSettings;
use crate::error::IrdsError;
use crate::resource::{CancelToken, ResourceKey};

static NEXT_NONCE: AtomicU64 = AtomicU64::new(0);

const MIN_HEARTBEAT: Duration = Duration::from_millis(10);

pub struct FileLock {
    path: Utf8PathBuf,
    token: String,
    heartbeat: Option<(Sender<()>, JoinHandle<()>)>,
}

impl FileLock {
    /// Blocks until the lock at `path` is ours.
    ///
    /// Waiting ends early with `LockTimeout` only when
    /// `settings.wait_timeout` is set.
    pub fn acquire(
        path: Utf8PathBuf,
        settings: CacheSettings,
        cancel: &CancelToken,
        key: &ResourceKey,
    ) -> Result<Self, IrdsError> {
        let started = Instant::now();
        let token = new_token();
        let mut logged = false;
        loop {
            cancel.check(key)?;
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path.as_std_path())
            {
                Ok(file) => return Self::hold(path, token, file, settings),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    if break_if_stale(&path, settings.lock_timeout)? {
                        continue;
                    }
                    if settings
                        .wait_timeout
                        .is_some_and(|limit| started.elapsed() >= limit)
                    {
                        return Err(IrdsError::LockTimeout {
                            path: path.to_string(),
                            waited_secs: started.elapsed().as_secs(),
                        });
                    }
                    if !logged {
                        tracing::debug!(lock = %path, "waiting for another process");
                        logged = true;
                    }
                    thread::sleep(settings.poll_interval);
                }
                Err(err) => {
                    return Err(IrdsError::Filesystem(format!("create lock {path}: {err}")));
                }
            }
        }
    }

    fn hold(
        path: Utf8PathBuf,
        token: String,
        mut file: File,
        settings: CacheSettings,
    ) -> Result<Self, IrdsError> {
        let stamp = format!("{token} acquired_at={}\n", chrono::Utc::now().to_rfc3339());
        if let Err(err) = file.write_all(stamp.as_bytes()).and_then(|()| file.sync_all()) {
            tracing::debug!(lock = %path, error = %err, "could not stamp lock");
            if let Err(err) = fs::remove_file(path.as_std_path()) {
                tracing::debug!(lock = %path, error = %err, "could not remove unstamped lock");
            }
            return Err(IrdsError::Filesystem(format!("write lock {path}: {err}")));
        }
        drop(file);

        let interval = (settings.lock_timeout / 4).max(MIN_HEARTBEAT);
        let (stop, ticks) = mpsc::channel::<()>();
        let beat_path = path.clone();
        let beat_token = token.clone();
        let handle = thread::spawn(move || {
            while let Err(RecvTimeoutError::Timeout) = ticks.recv_timeout(interval) {
                if !owns(&beat_path, &beat_token) {
                    tracing::warn!(lock = %beat_path, "lock was taken over; heartbeat stopped");
                    return;
                }
                if let Err(err) = touch(&beat_path) {
                    tracing::debug!(lock = %beat_path, error = %err, "heartbeat failed");
                }
            }
        });

        Ok(Self {
            path,
            token,
            heartbeat: Some((stop, handle)),
        })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Some((stop, handle)) = self.heartbeat.take() {
            drop(stop);
            if handle.join().is_err() {
                tracing::debug!(lock = %self.path, "heartbeat thread panicked");
            }
        }
        if !owns(&self.path, &self.token) {
            tracing::debug!(lock = %self.path, "lock no longer ours; leaving it");
            return;
        }
        if let Err(err) = fs::remove_file(self.path.as_std_path()) {
            tracing::debug!(lock = %self.path, error = %err, "lock already gone");
        }
    }
}

fn new_token() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    format!(
        "pid={} nonce={nanos:x}-{}",
        std::process::id(),
        NEXT_NONCE.fetch_add(1, Ordering::Relaxed)
    )
}

fn owns(path: &Utf8Path, token: &str) -> bool {
    fs::read_to_string(path.as_std_path())
        .map(|content| {
            content
                .split_whitespace()
                .take(2)
                .eq(token.split_whitespace())
        })
        .unwrap_or(false)
}

fn touch(path: &Utf8Path) -> io::Result<()> {
    OpenOptions::new()
        .write(true)
        .open(path.as_std_path())?
        .set_modified(SystemTime::now())
}

fn lock_age(path: &Utf8Path) -> Option<Duration> {
    let modified = fs::metadata(path.as_std_path())
        .and_then(|meta| meta.modified())
        .ok()?;
    Some(
        SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO),
    )
}

/// Removes the lock at `path` if its heartbeat has been silent for
/// `lock_timeout`. Returns whether the caller should retry creation.
fn break_if_stale(path: &Utf8Path, lock_timeout: Duration) -> Result<bool, IrdsError> {
    let Ok(observed) = fs::read_to_string(path.as_std_path()) else {
        // Released between our create and read.
        return Ok(true);
    };
    match lock_age(path) {
        None => return Ok(true),
        Some(age) if age < lock_timeout => return Ok(false),
        Some(_) => {}
    }
    // The owner may have re-stamped since the read; only remove what we saw.
    if fs::read_to_string(path.as_std_path()).ok().as_deref() != Some(observed.as_str()) {
        return Ok(true);
    }
    tracing::warn!(lock = %path, holder = observed.trim(), "breaking stale lock");
    match fs::remove_file(path.as_std_path()) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(true),
        Err(err) => Err(IrdsError::Filesystem(format!(
            "remove stale lock {path}: {err}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(lock_timeout: Duration) -> CacheSettings {
        CacheSettings {
            lock_timeout,
            poll_interval: Duration::from_millis(5),
            max_failures: 3,
            wait_timeout: None,
        }
    }

    fn key() -> ResourceKey {
        ResourceKey::new("demo", "lock")
    }

    fn lock_path() -> (tempfile::TempDir, Utf8PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        (temp, root.join(".target.lock"))
    }

    #[test]
    fn heartbeat_keeps_a_long_hold_fresh() {
        let (_temp, path) = lock_path();
        let settings = settings(Duration::from_millis(200));
        let lock = FileLock::acquire(path.clone(), settings, &CancelToken::new(), &key()).unwrap();

        thread::sleep(Duration::from_millis(600));
        assert!(lock_age(&path).unwrap() < settings.lock_timeout);
        assert!(!break_if_stale(&path, settings.lock_timeout).unwrap());
        assert!(owns(&path, &lock.token));

        drop(lock);
        assert!(!path.as_std_path().exists());
    }

    #[test]
    fn drop_leaves_a_lock_owned_by_someone_else() {
        let (_temp, path) = lock_path();
        let settings = settings(Duration::from_secs(10));
        let lock = FileLock::acquire(path.clone(), settings, &CancelToken::new(), &key()).unwrap();

        fs::write(path.as_std_path(), "pid=1 nonce=other acquired_at=now\n").unwrap();
        drop(lock);
        assert_eq!(
            fs::read_to_string(path.as_std_path()).unwrap(),
            "pid=1 nonce=other acquired_at=now\n"
        );
    }

    #[test]
    fn abandoned_lock_is_broken() {
        let (_temp, path) = lock_path();
        fs::write(path.as_std_path(), "pid=1 nonce=gone acquired_at=then\n").unwrap();
        thread::sleep(Duration::from_millis(60));

        let settings = settings(Duration::from_millis(50));
        let lock = FileLock::acquire(path.clone(), settings, &CancelToken::new(), &key()).unwrap();
        assert!(owns(&path, &lock.token));
    }

    #[test]
    fn tokens_differ_within_a_process() {
        assert_ne!(new_token(), new_token());
    }
}
