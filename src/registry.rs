use std::collections::BTreeMap;
use std::sync::Arc;

use camino::Utf8PathBuf;

use crate::archive::ArchiveMemberNode;
use crate::cache::{CacheNode, CacheStore};
use crate::config::FetchSettings;
use crate::dataset::Dataset;
use crate::descriptor::DescriptorSource;
use crate::error::IrdsError;
use crate::fetch::{DownloadClient, FetchNode};
use crate::resource::{ResourceKey, SharedNode};
use crate::store::Store;

/// Process-wide table from dataset id to dataset.
///
/// Built once by a bootstrap routine holding `&mut Registry`, then shared
/// read-only. Ids are `/`-separated strings; hierarchy is naming only.
#[derive(Debug, Default)]
pub struct Registry {
    datasets: BTreeMap<String, Arc<Dataset>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every built-in dataset family.
    pub fn bootstrap(factory: &ResourceFactory) -> Result<Self, IrdsError> {
        let mut registry = Self::new();
        crate::trec_tot::register(&mut registry, factory)?;
        Ok(registry)
    }

    pub fn register(&mut self, id: &str, dataset: Dataset) -> Result<Arc<Dataset>, IrdsError> {
        if self.datasets.contains_key(id) {
            return Err(IrdsError::DuplicateId(id.to_string()));
        }
        let dataset = Arc::new(dataset.with_id(id));
        self.datasets.insert(id.to_string(), Arc::clone(&dataset));
        Ok(dataset)
    }

    pub fn get(&self, id: &str) -> Result<Arc<Dataset>, IrdsError> {
        self.datasets
            .get(id)
            .cloned()
            .ok_or_else(|| IrdsError::UnknownId(id.to_string()))
    }

    pub fn list_ids(&self) -> Vec<String> {
        self.datasets.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

/// Builds resource chains against one cache store:
/// `cached(zip_member(download(..), ..), ..)`.
#[derive(Clone)]
pub struct ResourceFactory {
    cache: Arc<CacheStore>,
    descriptors: Arc<dyn DescriptorSource>,
    client: Arc<dyn DownloadClient>,
    fetch: FetchSettings,
}

impl ResourceFactory {
    pub fn new(
        cache: Arc<CacheStore>,
        descriptors: Arc<dyn DescriptorSource>,
        client: Arc<dyn DownloadClient>,
        fetch: FetchSettings,
    ) -> Self {
        Self {
            cache,
            descriptors,
            client,
            fetch,
        }
    }

    pub fn store(&self) -> &Store {
        self.cache.store()
    }

    pub fn cache_store(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Remote object named by `sub_key` in the namespace's descriptor table.
    pub fn download(&self, namespace: &str, sub_key: &str) -> SharedNode {
        let key = ResourceKey::new(namespace, sub_key);
        let staging = self.store().download_path(&key);
        Arc::new(FetchNode::new(
            key,
            sub_key,
            Arc::clone(&self.descriptors),
            Arc::clone(&self.client),
            staging,
            self.fetch,
        )
        .with_lock_settings(self.cache.settings()))
    }

    pub fn zip_member(&self, archive: &SharedNode, member: &str) -> SharedNode {
        Arc::new(ArchiveMemberNode::zip(
            Arc::clone(archive),
            member,
            self.store(),
        ))
    }

    pub fn gzip_member(&self, archive: &SharedNode, label: &str) -> SharedNode {
        Arc::new(ArchiveMemberNode::gzip(
            Arc::clone(archive),
            label,
            self.store(),
        ))
    }

    /// Materializes `upstream` at `<root>/<namespace>/<relative>`.
    pub fn cached(&self, upstream: SharedNode, namespace: &str, relative: &str) -> SharedNode {
        let target: Utf8PathBuf = self.store().materialized_path(namespace, relative);
        Arc::new(CacheNode::new(
            ResourceKey::new(namespace, relative),
            upstream,
            target,
            Arc::clone(&self.cache),
        ))
    }
}
