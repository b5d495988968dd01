//! The resource-node abstraction shared by downloads, archive extraction and
//! the materialization cache.
//!
//! A node resolves to a local file path, possibly by resolving the upstream
//! nodes it holds. Nodes are composed as a plain acyclic object graph:
//!
//! ```text
//! CacheNode ─▶ ArchiveMemberNode ─▶ FetchNode
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;

use crate::error::IrdsError;

/// Stable identity of a resource: dataset namespace plus logical role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    namespace: String,
    role: String,
}

impl ResourceKey {
    pub fn new(namespace: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            role: role.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    /// Key of a resource derived from this one, e.g. a member of an archive.
    pub fn child(&self, suffix: &str) -> Self {
        Self::new(self.namespace.clone(), format!("{}!{}", self.role, suffix))
    }

    /// Role flattened into a single file name, used for staging and scratch files.
    pub fn file_stem(&self) -> String {
        self.role
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                    ch
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.role)
    }
}

/// Caller-side abandonment of a resolution: an explicit flag and/or a deadline.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self
                .deadline
                .map(|deadline| Instant::now() >= deadline)
                .unwrap_or(false)
    }

    pub fn check(&self, key: &ResourceKey) -> Result<(), IrdsError> {
        if self.is_cancelled() {
            return Err(IrdsError::Cancelled {
                key: key.to_string(),
            });
        }
        Ok(())
    }
}

pub trait ResourceNode: Send + Sync {
    fn key(&self) -> &ResourceKey;

    fn resolve_with(&self, cancel: &CancelToken) -> Result<Utf8PathBuf, IrdsError>;

    fn resolve(&self) -> Result<Utf8PathBuf, IrdsError> {
        self.resolve_with(&CancelToken::new())
    }

    /// Whether the resolved file is scratch output that a consumer may move away.
    fn is_transient(&self) -> bool {
        false
    }

    /// Whether a resolution would be served without doing any upstream work.
    fn is_materialized(&self) -> bool {
        false
    }
}

pub type SharedNode = Arc<dyn ResourceNode>;
