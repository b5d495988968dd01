use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;

use camino::Utf8PathBuf;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::DownloadsLocation;
use crate::error::IrdsError;
use crate::fetch::DownloadClient;
use crate::resource::CancelToken;
use crate::store::Store;

/// Where a remote object lives and what it must look like once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    pub url: String,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

impl Descriptor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            sha256: None,
            size: None,
        }
    }

    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = Some(sha256.into().to_ascii_lowercase());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

pub trait DescriptorSource: Send + Sync {
    fn get(&self, dataset_key: &str, sub_key: &str) -> Result<Descriptor, IrdsError>;
}

/// `{namespace: {sub_key: descriptor}}`, the shape of `downloads.json`.
pub type DescriptorTable = BTreeMap<String, BTreeMap<String, Descriptor>>;

fn lookup(table: &DescriptorTable, dataset_key: &str, sub_key: &str) -> Result<Descriptor, IrdsError> {
    table
        .get(dataset_key)
        .and_then(|entries| entries.get(sub_key))
        .cloned()
        .ok_or_else(|| IrdsError::ConfigUnavailable {
            key: format!("{dataset_key}/{sub_key}"),
            message: "no download descriptor registered".to_string(),
        })
}

#[derive(Debug, Clone, Default)]
pub struct StaticDescriptorSource {
    table: DescriptorTable,
}

impl StaticDescriptorSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        mut self,
        dataset_key: impl Into<String>,
        sub_key: impl Into<String>,
        descriptor: Descriptor,
    ) -> Self {
        self.table
            .entry(dataset_key.into())
            .or_default()
            .insert(sub_key.into(), descriptor);
        self
    }
}

impl DescriptorSource for StaticDescriptorSource {
    fn get(&self, dataset_key: &str, sub_key: &str) -> Result<Descriptor, IrdsError> {
        lookup(&self.table, dataset_key, sub_key)
    }
}

/// Descriptor table read from a JSON document on first lookup.
///
/// Remote tables are fetched once into the cache root and reused from there
/// on later runs. A failed load is not remembered, so a later lookup retries.
pub struct JsonDescriptorSource {
    location: DownloadsLocation,
    store: Store,
    client: Arc<dyn DownloadClient>,
    table: Mutex<Option<Arc<DescriptorTable>>>,
}

impl JsonDescriptorSource {
    pub fn new(location: DownloadsLocation, store: Store, client: Arc<dyn DownloadClient>) -> Self {
        Self {
            location,
            store,
            client,
            table: Mutex::new(None),
        }
    }

    pub fn parse(content: &str) -> Result<DescriptorTable, IrdsError> {
        serde_json::from_str(content).map_err(|err| IrdsError::ConfigUnavailable {
            key: "downloads".to_string(),
            message: format!("invalid descriptor table: {err}"),
        })
    }

    fn cached_remote_path(&self) -> Utf8PathBuf {
        self.store.root().join(".downloads.json")
    }

    fn load(&self) -> Result<Arc<DescriptorTable>, IrdsError> {
        let mut guard = self.table.lock();
        if let Some(table) = guard.as_ref() {
            return Ok(Arc::clone(table));
        }

        let content = match &self.location {
            DownloadsLocation::File(path) => {
                fs::read_to_string(path.as_std_path()).map_err(|err| {
                    IrdsError::ConfigUnavailable {
                        key: "downloads".to_string(),
                        message: format!("read {path}: {err}"),
                    }
                })?
            }
            DownloadsLocation::Url(url) => self.fetch_remote(url)?,
        };

        let table = Arc::new(Self::parse(&content)?);
        *guard = Some(Arc::clone(&table));
        Ok(table)
    }

    fn fetch_remote(&self, url: &str) -> Result<String, IrdsError> {
        let cached = self.cached_remote_path();
        if Store::is_complete(&cached) {
            tracing::debug!(path = %cached, "using cached descriptor table");
            return fs::read_to_string(cached.as_std_path())
                .map_err(|err| IrdsError::Filesystem(err.to_string()));
        }

        tracing::info!(%url, "fetching descriptor table");
        let mut body = Vec::new();
        self.client
            .download(url, &mut body, &CancelToken::new())
            .map_err(|err| IrdsError::ConfigUnavailable {
                key: "downloads".to_string(),
                message: err.to_string(),
            })?;
        let content = String::from_utf8(body).map_err(|err| IrdsError::ConfigUnavailable {
            key: "downloads".to_string(),
            message: err.to_string(),
        })?;
        Self::parse(&content)?;
        Store::write_bytes_atomic(&cached, content.as_bytes())?;
        Ok(content)
    }
}

impl DescriptorSource for JsonDescriptorSource {
    fn get(&self, dataset_key: &str, sub_key: &str) -> Result<Descriptor, IrdsError> {
        let table = self.load()?;
        lookup(&table, dataset_key, sub_key)
    }
}
