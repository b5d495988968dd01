#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use camino::Utf8PathBuf;
use ir_datasets::cache::CacheStore;
use ir_datasets::config::{CacheSettings, FetchSettings};
use ir_datasets::descriptor::{Descriptor, StaticDescriptorSource};
use ir_datasets::error::IrdsError;
use ir_datasets::fetch::DownloadClient;
use ir_datasets::registry::ResourceFactory;
use ir_datasets::resource::{CancelToken, ResourceKey, ResourceNode};
use ir_datasets::store::Store;
use zip::write::SimpleFileOptions;

pub fn utf8_tempdir() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

pub fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn fast_fetch() -> FetchSettings {
    FetchSettings {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        timeout: Duration::from_secs(5),
    }
}

pub fn fast_cache() -> CacheSettings {
    CacheSettings {
        lock_timeout: Duration::from_secs(10),
        poll_interval: Duration::from_millis(5),
        max_failures: 3,
        wait_timeout: None,
    }
}

/// Serves in-memory objects by URL, counting transfer attempts per URL.
#[derive(Default)]
pub struct MemoryClient {
    objects: HashMap<String, Vec<u8>>,
    calls: Mutex<HashMap<String, usize>>,
    transient_failures: AtomicUsize,
    delay: Duration,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.objects.insert(url.to_string(), bytes);
        self
    }

    /// The next `count` transfers fail with a retryable transport error.
    pub fn failing_first(self, count: usize) -> Self {
        self.transient_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Every transfer takes at least `delay`, as a slow link would.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn object_len(&self, url: &str) -> Option<u64> {
        self.objects.get(url).map(|bytes| bytes.len() as u64)
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

impl DownloadClient for MemoryClient {
    fn download(
        &self,
        url: &str,
        destination: &mut dyn Write,
        _cancel: &CancelToken,
    ) -> Result<u64, IrdsError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_insert(0) += 1;
        std::thread::sleep(self.delay);

        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            // Half-written body before the connection drops.
            destination.write_all(b"partial").unwrap();
            return Err(IrdsError::Transport {
                url: url.to_string(),
                message: "connection reset".to_string(),
            });
        }

        match self.objects.get(url) {
            Some(bytes) => {
                destination.write_all(bytes).unwrap();
                Ok(bytes.len() as u64)
            }
            None => Err(IrdsError::HttpStatus {
                url: url.to_string(),
                status: 404,
                message: "not found".to_string(),
            }),
        }
    }
}

/// Upstream stand-in that writes fixed content and counts executions.
pub struct CountingNode {
    key: ResourceKey,
    output: Utf8PathBuf,
    content: String,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl CountingNode {
    pub fn new(output: Utf8PathBuf, content: &str) -> Self {
        Self {
            key: ResourceKey::new("test", "counting"),
            output,
            content: content.to_string(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ResourceNode for CountingNode {
    fn key(&self) -> &ResourceKey {
        &self.key
    }

    fn resolve_with(&self, cancel: &CancelToken) -> Result<Utf8PathBuf, IrdsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        cancel.check(&self.key)?;
        Store::write_bytes_atomic(&self.output, self.content.as_bytes())?;
        Ok(self.output.clone())
    }
}

/// Upstream that always fails with a transport error.
pub struct FailingNode {
    key: ResourceKey,
    pub calls: AtomicUsize,
}

impl FailingNode {
    pub fn new() -> Self {
        Self {
            key: ResourceKey::new("test", "failing"),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ResourceNode for FailingNode {
    fn key(&self) -> &ResourceKey {
        &self.key
    }

    fn resolve_with(&self, _cancel: &CancelToken) -> Result<Utf8PathBuf, IrdsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(IrdsError::Transport {
            url: "mem://unreachable".to_string(),
            message: "no route to host".to_string(),
        })
    }
}

pub const CORPUS_2023: &str = concat!(
    r#"{"doc_id": "1", "page_title": "Alien", "wikidata_id": "Q103569", "wikidata_classes": ["film"], "text": "Crew meets a creature.", "sections": {"Plot": "Crew meets a creature."}, "infoboxes": [{"director": "Ridley Scott"}]}"#,
    "\n",
    r#"{"doc_id": "2", "page_title": "Heat", "wikidata_id": "Q2001", "wikidata_classes": [["Q11424", "film"]], "text": "A heist in Los Angeles.", "sections": {}, "infoboxes": [{"runtime": 170, "starring": ["Al Pacino", "Robert De Niro"]}]}"#,
    "\n",
);

pub const QUERIES_2023_TRAIN: &str = concat!(
    r#"{"id": "101", "url": "https://example.org/q/101", "domain": "movie", "title": "space monster movie", "text": "Crew on a ship gets hunted.", "sentence_annotations": [{"id": "0", "text": "Crew on a ship gets hunted."}]}"#,
    "\n",
    r#"{"id": "102", "url": "https://example.org/q/102", "domain": "movie", "title": "old cartoon", "text": "I watched it as a kid.", "sentence_annotations": [{"id": 0, "text": "I watched it as a kid.", "labels": ["context:temporal"]}]}"#,
    "\n",
);

pub const QUERIES_2023_DEV: &str = concat!(
    r#"{"id": "201", "url": "https://example.org/q/201", "domain": "movie", "title": "bank robbery film", "text": "Two men, one city.", "sentence_annotations": []}"#,
    "\n",
);

pub const CORPUS_2024: &str = concat!(
    r#"{"doc_id": "10", "title": "Eiffel Tower", "wikidata_id": "Q243", "text": "Lattice tower in Paris.", "sections": {"History": "Built 1889."}}"#,
    "\n",
);

pub const QUERIES_2024_TEST: &str = concat!(
    r#"{"query_id": "2001", "query": "iron tower I saw on a trip"}"#,
    "\n",
);

/// Memory-backed factory serving the three trec-tot archives.
pub struct TrecTotFixture {
    pub client: Arc<MemoryClient>,
    pub factory: ResourceFactory,
    pub store: Store,
}

/// Client serving the three trec-tot archives.
pub fn trec_tot_client() -> MemoryClient {
    let archive_2023 = build_zip(&[
        ("TREC-TOT/corpus.jsonl", CORPUS_2023),
        ("TREC-TOT/train/queries.jsonl", QUERIES_2023_TRAIN),
        ("TREC-TOT/train/qrel.txt", "101 0 1 1\n"),
        ("TREC-TOT/dev/queries.jsonl", QUERIES_2023_DEV),
        ("TREC-TOT/dev/qrel.txt", "201 0 2 1\n201 0 1 0\n"),
    ]);
    let archive_2024 = build_zip(&[("corpus.jsonl", CORPUS_2024)]);
    let archive_2024_test = build_zip(&[("test-2024/queries.jsonl", QUERIES_2024_TEST)]);
    MemoryClient::new()
        .with_object("mem://2023", archive_2023)
        .with_object("mem://2024", archive_2024)
        .with_object("mem://2024-test", archive_2024_test)
}

impl TrecTotFixture {
    pub fn new(root: &Utf8PathBuf) -> Self {
        Self::with_client(root, Arc::new(trec_tot_client()))
    }

    /// Fixture with its own cache table over `root`, sharing `client`.
    pub fn with_client(root: &Utf8PathBuf, client: Arc<MemoryClient>) -> Self {
        let mut size_2023 = Descriptor::new("mem://2023");
        if let Some(len) = client.object_len("mem://2023") {
            size_2023 = size_2023.with_size(len);
        }
        let descriptors = StaticDescriptorSource::new()
            .insert("trec-tot", "2023", size_2023)
            .insert("trec-tot", "2024", Descriptor::new("mem://2024"))
            .insert("trec-tot", "2024-test", Descriptor::new("mem://2024-test"));

        let store = Store::new(root.clone());
        let cache = CacheStore::new(store.clone(), fast_cache());
        let factory = ResourceFactory::new(
            cache,
            Arc::new(descriptors),
            client.clone(),
            fast_fetch(),
        );
        Self {
            client,
            factory,
            store,
        }
    }
}
