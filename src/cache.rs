//! At-most-once materialization of resource nodes.
//!
//! Every target path moves through `Absent -> InProgress -> Complete`.
//! Threads of one process coordinate through the shared [`CacheStore`]
//! table; separate processes coordinate through a [`FileLock`] next to the
//! target. A target is only ever written by an atomic rename, so any file
//! found at a target path is complete.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::{Condvar, Mutex};

use crate::config::CacheSettings;
use crate::error::IrdsError;
use crate::lock::FileLock;
use crate::resource::{CancelToken, ResourceKey, ResourceNode, SharedNode};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryState {
    #[default]
    Absent,
    InProgress,
    Complete,
}

#[derive(Debug, Default)]
struct EntryRecord {
    state: EntryState,
    failures: u32,
    last_error: Option<String>,
}

/// The shared CacheEntry table of one cache root.
pub struct CacheStore {
    store: Store,
    settings: CacheSettings,
    entries: Mutex<HashMap<Utf8PathBuf, EntryRecord>>,
    changed: Condvar,
}

impl CacheStore {
    pub fn new(store: Store, settings: CacheSettings) -> Arc<Self> {
        Arc::new(Self {
            store,
            settings,
            entries: Mutex::new(HashMap::new()),
            changed: Condvar::new(),
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn settings(&self) -> CacheSettings {
        self.settings
    }

    pub fn entry_state(&self, target: &Utf8Path) -> EntryState {
        let entries = self.entries.lock();
        match entries.get(target) {
            Some(record) => record.state,
            None if Store::is_complete(target) => EntryState::Complete,
            None => EntryState::Absent,
        }
    }

    pub fn failures(&self, target: &Utf8Path) -> u32 {
        self.entries
            .lock()
            .get(target)
            .map(|record| record.failures)
            .unwrap_or(0)
    }

    /// Clears the failure counter so a key escalated to `Fatal` may be retried.
    pub fn reset_failures(&self, target: &Utf8Path) {
        if let Some(record) = self.entries.lock().get_mut(target) {
            record.failures = 0;
            record.last_error = None;
        }
    }
}

/// In-process claim on a target. Dropping an unfinished claim reverts the
/// entry to `Absent`, whether the resolution failed, was cancelled or panicked.
struct Claim<'a> {
    cache: &'a CacheStore,
    target: &'a Utf8Path,
    done: bool,
}

impl Claim<'_> {
    fn complete(mut self) {
        let mut entries = self.cache.entries.lock();
        let record = entries.entry(self.target.to_path_buf()).or_default();
        record.state = EntryState::Complete;
        record.failures = 0;
        record.last_error = None;
        self.done = true;
        self.cache.changed.notify_all();
    }

    fn record_failure(&self, err: &IrdsError) {
        let mut entries = self.cache.entries.lock();
        let record = entries.entry(self.target.to_path_buf()).or_default();
        record.failures += 1;
        record.last_error = Some(err.to_string());
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let mut entries = self.cache.entries.lock();
        if let Some(record) = entries.get_mut(self.target) {
            record.state = EntryState::Absent;
        }
        self.cache.changed.notify_all();
    }
}

/// Materializes its upstream at `target` at most once per cache store.
pub struct CacheNode {
    key: ResourceKey,
    upstream: SharedNode,
    target: Utf8PathBuf,
    cache: Arc<CacheStore>,
}

impl CacheNode {
    pub fn new(
        key: ResourceKey,
        upstream: SharedNode,
        target: Utf8PathBuf,
        cache: Arc<CacheStore>,
    ) -> Self {
        Self {
            key,
            upstream,
            target,
            cache,
        }
    }

    pub fn target(&self) -> &Utf8Path {
        &self.target
    }

    pub fn state(&self) -> EntryState {
        self.cache.entry_state(&self.target)
    }

    /// Blocks until this caller owns the entry, or returns the path when some
    /// other caller has completed it in the meantime.
    fn claim(&self, cancel: &CancelToken) -> Result<Option<Claim<'_>>, IrdsError> {
        let settings = self.cache.settings;
        let started = Instant::now();
        let mut entries = self.cache.entries.lock();
        loop {
            cancel.check(&self.key)?;
            let record = entries.entry(self.target.clone()).or_default();
            match record.state {
                EntryState::Complete if Store::is_complete(&self.target) => return Ok(None),
                EntryState::Complete => {
                    tracing::warn!(key = %self.key, path = %self.target, "cached file vanished");
                    record.state = EntryState::Absent;
                }
                EntryState::InProgress => {
                    if settings
                        .wait_timeout
                        .is_some_and(|limit| started.elapsed() >= limit)
                    {
                        return Err(IrdsError::LockTimeout {
                            path: self.target.to_string(),
                            waited_secs: started.elapsed().as_secs(),
                        });
                    }
                    self.cache
                        .changed
                        .wait_for(&mut entries, settings.poll_interval);
                }
                EntryState::Absent => {
                    if Store::is_complete(&self.target) {
                        record.state = EntryState::Complete;
                        return Ok(None);
                    }
                    if record.failures >= settings.max_failures {
                        return Err(IrdsError::Fatal {
                            key: self.key.to_string(),
                            failures: record.failures,
                            last: record.last_error.clone().unwrap_or_default(),
                        });
                    }
                    record.state = EntryState::InProgress;
                    return Ok(Some(Claim {
                        cache: &self.cache,
                        target: &self.target,
                        done: false,
                    }));
                }
            }
        }
    }

    fn materialize(&self, cancel: &CancelToken) -> Result<(), IrdsError> {
        Store::ensure_parent(&self.target)?;
        let _lock = FileLock::acquire(
            Store::lock_path(&self.target),
            self.cache.settings,
            cancel,
            &self.key,
        )?;
        if Store::is_complete(&self.target) {
            tracing::debug!(key = %self.key, "materialized by another process");
            return Ok(());
        }

        let produced = self.upstream.resolve_with(cancel)?;
        cancel.check(&self.key)?;
        if !Store::is_complete(&produced) {
            return Err(IrdsError::EmptyResource {
                key: self.upstream.key().to_string(),
                path: produced.to_string(),
            });
        }

        if self.upstream.is_transient() {
            Store::move_file_atomic(&produced, &self.target)?;
        } else {
            Store::copy_file_atomic(&produced, &self.target)?;
        }
        tracing::info!(key = %self.key, path = %self.target, "materialized");
        Ok(())
    }
}

impl ResourceNode for CacheNode {
    fn key(&self) -> &ResourceKey {
        &self.key
    }

    fn resolve_with(&self, cancel: &CancelToken) -> Result<Utf8PathBuf, IrdsError> {
        let Some(claim) = self.claim(cancel)? else {
            tracing::debug!(key = %self.key, "cache hit");
            return Ok(self.target.clone());
        };

        match self.materialize(cancel) {
            Ok(()) => {
                claim.complete();
                Ok(self.target.clone())
            }
            Err(err) => {
                if !matches!(err, IrdsError::Cancelled { .. }) {
                    claim.record_failure(&err);
                }
                Err(err)
            }
        }
    }

    fn is_materialized(&self) -> bool {
        Store::is_complete(&self.target)
    }
}
