use std::fs;
use std::io::{BufWriter, Read, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::Mutex;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tempfile::Builder;

use crate::config::{CacheSettings, FetchSettings};
use crate::descriptor::{Descriptor, DescriptorSource};
use crate::error::IrdsError;
use crate::fs_util::{HashingWriter, sha256_file};
use crate::lock::FileLock;
use crate::resource::{CancelToken, ResourceKey, ResourceNode};
use crate::store::Store;

/// One transfer attempt of a remote object into `destination`.
pub trait DownloadClient: Send + Sync {
    fn download(
        &self,
        url: &str,
        destination: &mut dyn Write,
        cancel: &CancelToken,
    ) -> Result<u64, IrdsError>;
}

#[derive(Clone)]
pub struct HttpDownloadClient {
    client: Client,
}

impl HttpDownloadClient {
    pub fn new(timeout: Duration) -> Result<Self, IrdsError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("irds/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| IrdsError::Filesystem(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| IrdsError::Transport {
                url: String::new(),
                message: err.to_string(),
            })?;
        Ok(Self { client })
    }
}

impl DownloadClient for HttpDownloadClient {
    fn download(
        &self,
        url: &str,
        destination: &mut dyn Write,
        cancel: &CancelToken,
    ) -> Result<u64, IrdsError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|err| IrdsError::Transport {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "download request failed".to_string());
            return Err(IrdsError::HttpStatus {
                url: url.to_string(),
                status,
                message,
            });
        }

        let mut buf = vec![0u8; 256 * 1024];
        let mut total = 0u64;
        loop {
            if cancel.is_cancelled() {
                return Err(IrdsError::Cancelled {
                    key: url.to_string(),
                });
            }
            let read = response.read(&mut buf).map_err(|err| IrdsError::Transport {
                url: url.to_string(),
                message: err.to_string(),
            })?;
            if read == 0 {
                break;
            }
            destination
                .write_all(&buf[..read])
                .map_err(|err| IrdsError::Filesystem(err.to_string()))?;
            total += read as u64;
        }
        Ok(total)
    }
}

/// Downloads one remote object into a staging path, verified against its
/// descriptor. The staging path only ever holds a complete, verified file.
pub struct FetchNode {
    key: ResourceKey,
    sub_key: String,
    descriptors: Arc<dyn DescriptorSource>,
    client: Arc<dyn DownloadClient>,
    staging: Utf8PathBuf,
    settings: FetchSettings,
    lock: CacheSettings,
    busy: Mutex<()>,
}

impl FetchNode {
    pub fn new(
        key: ResourceKey,
        sub_key: impl Into<String>,
        descriptors: Arc<dyn DescriptorSource>,
        client: Arc<dyn DownloadClient>,
        staging: Utf8PathBuf,
        settings: FetchSettings,
    ) -> Self {
        Self {
            key,
            sub_key: sub_key.into(),
            descriptors,
            client,
            staging,
            settings,
            lock: CacheSettings::default(),
            busy: Mutex::new(()),
        }
    }

    /// Limits for the lock file that serializes downloads across processes.
    pub fn with_lock_settings(mut self, lock: CacheSettings) -> Self {
        self.lock = lock;
        self
    }

    pub fn staging_path(&self) -> &Utf8Path {
        &self.staging
    }

    fn verify(&self, descriptor: &Descriptor, digest: &str, size: u64) -> Result<(), IrdsError> {
        if let Some(expected) = descriptor.size {
            if expected != size {
                return Err(IrdsError::Integrity {
                    key: self.key.to_string(),
                    expected: format!("{expected} bytes"),
                    actual: format!("{size} bytes"),
                });
            }
        }
        if let Some(expected) = &descriptor.sha256 {
            if !expected.eq_ignore_ascii_case(digest) {
                return Err(IrdsError::Integrity {
                    key: self.key.to_string(),
                    expected: format!("sha256 {expected}"),
                    actual: format!("sha256 {digest}"),
                });
            }
        }
        Ok(())
    }

    fn verify_staged(&self, descriptor: &Descriptor) -> Result<(), IrdsError> {
        let size = fs::metadata(self.staging.as_std_path())
            .map_err(|err| IrdsError::Filesystem(err.to_string()))?
            .len();
        let digest = match descriptor.sha256 {
            Some(_) => sha256_file(self.staging.as_std_path())?,
            None => String::new(),
        };
        self.verify(descriptor, &digest, size)
    }

    fn download_once(&self, descriptor: &Descriptor, cancel: &CancelToken) -> Result<(), IrdsError> {
        let parent = self
            .staging
            .parent()
            .ok_or_else(|| IrdsError::Filesystem("invalid staging path".to_string()))?;
        let mut temp = Builder::new()
            .prefix(".irds-fetch")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| IrdsError::Filesystem(err.to_string()))?;

        let (digest, size) = {
            let mut writer = HashingWriter::new(BufWriter::new(temp.as_file_mut()));
            self.client.download(&descriptor.url, &mut writer, cancel)?;
            let (mut buffered, digest, size) = writer.finish();
            buffered
                .flush()
                .map_err(|err| IrdsError::Filesystem(err.to_string()))?;
            (digest, size)
        };
        self.verify(descriptor, &digest, size)?;

        temp.persist(self.staging.as_std_path())
            .map_err(|err| IrdsError::Filesystem(err.to_string()))?;
        tracing::info!(key = %self.key, bytes = size, path = %self.staging, "download complete");
        Ok(())
    }
}

impl ResourceNode for FetchNode {
    fn key(&self) -> &ResourceKey {
        &self.key
    }

    fn resolve_with(&self, cancel: &CancelToken) -> Result<Utf8PathBuf, IrdsError> {
        let _busy = self.busy.lock();
        let descriptor = self.descriptors.get(self.key.namespace(), &self.sub_key)?;

        Store::ensure_parent(&self.staging)?;
        let _lock = FileLock::acquire(
            Store::lock_path(&self.staging),
            self.lock,
            cancel,
            &self.key,
        )?;
        if self.staging.as_std_path().is_file() {
            match self.verify_staged(&descriptor) {
                Ok(()) => {
                    tracing::debug!(key = %self.key, "staged download verified");
                    return Ok(self.staging.clone());
                }
                Err(err) => {
                    tracing::warn!(key = %self.key, error = %err, "discarding staged download");
                    fs::remove_file(self.staging.as_std_path())
                        .map_err(|err| IrdsError::Filesystem(err.to_string()))?;
                }
            }
        }

        let mut attempt = 1u32;
        loop {
            cancel.check(&self.key)?;
            tracing::info!(key = %self.key, url = %descriptor.url, attempt, "downloading");
            match self.download_once(&descriptor, cancel) {
                Ok(()) => return Ok(self.staging.clone()),
                Err(err) if err.is_retryable() && attempt < self.settings.max_attempts => {
                    let delay = self.settings.backoff(attempt);
                    tracing::warn!(
                        key = %self.key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "download failed, retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) if err.is_retryable() => {
                    return Err(IrdsError::Transport {
                        url: descriptor.url.clone(),
                        message: format!("gave up after {attempt} attempts: {err}"),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn is_materialized(&self) -> bool {
        self.staging.as_std_path().is_file()
    }
}

/// A file placed on disk out of band, e.g. a corpus that requires a manual
/// download. Resolution only checks that it is there.
pub struct LocalFileNode {
    key: ResourceKey,
    path: Utf8PathBuf,
}

impl LocalFileNode {
    pub fn new(key: ResourceKey, path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            key,
            path: path.into(),
        }
    }
}

impl ResourceNode for LocalFileNode {
    fn key(&self) -> &ResourceKey {
        &self.key
    }

    fn resolve_with(&self, cancel: &CancelToken) -> Result<Utf8PathBuf, IrdsError> {
        cancel.check(&self.key)?;
        if !self.path.as_std_path().is_file() {
            return Err(IrdsError::Filesystem(format!(
                "{} expects a local file at {}",
                self.key, self.path
            )));
        }
        Ok(self.path.clone())
    }

    fn is_materialized(&self) -> bool {
        self.path.as_std_path().is_file()
    }
}
