use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::Builder;

use crate::error::IrdsError;
use crate::resource::ResourceKey;

/// Deterministic on-disk layout of the shared cache store.
///
/// ```text
/// <root>/<namespace>/<relative>            materialized files
/// <root>/<namespace>/.downloads/<role>     fetch staging
/// <root>/<namespace>/.scratch/<role>       archive member outputs
/// <dir>/.<file>.lock                       cross-process locks
/// ```
#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

impl Store {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn namespace_dir(&self, namespace: &str) -> Utf8PathBuf {
        self.root.join(namespace)
    }

    pub fn materialized_path(&self, namespace: &str, relative: &str) -> Utf8PathBuf {
        relative
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
            .fold(self.namespace_dir(namespace), |path, segment| {
                path.join(segment)
            })
    }

    pub fn download_path(&self, key: &ResourceKey) -> Utf8PathBuf {
        self.namespace_dir(key.namespace())
            .join(".downloads")
            .join(key.file_stem())
    }

    pub fn scratch_path(&self, key: &ResourceKey) -> Utf8PathBuf {
        self.namespace_dir(key.namespace())
            .join(".scratch")
            .join(key.file_stem())
    }

    pub fn lock_path(target: &Utf8Path) -> Utf8PathBuf {
        let name = target.file_name().unwrap_or("resource");
        match target.parent() {
            Some(parent) => parent.join(format!(".{name}.lock")),
            None => Utf8PathBuf::from(format!(".{name}.lock")),
        }
    }

    pub fn ensure_root(&self) -> Result<(), IrdsError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| IrdsError::Filesystem(err.to_string()))
    }

    pub fn ensure_parent(path: &Utf8Path) -> Result<(), IrdsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path()).map_err(|err| {
                IrdsError::Filesystem(format!("create {parent}: {err}"))
            })?;
        }
        Ok(())
    }

    /// A complete file is one that exists at its final path and is non-empty;
    /// nothing ever writes a final path except through an atomic rename.
    pub fn is_complete(path: &Utf8Path) -> bool {
        fs::metadata(path.as_std_path())
            .map(|meta| meta.is_file() && meta.len() > 0)
            .unwrap_or(false)
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), IrdsError> {
        Self::ensure_parent(path)?;
        let tmp_path = path.with_extension("tmp");
        fs::write(tmp_path.as_std_path(), content)
            .map_err(|err| IrdsError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| IrdsError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn copy_file_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), IrdsError> {
        let parent = dest
            .parent()
            .ok_or_else(|| IrdsError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| IrdsError::Filesystem(err.to_string()))?;
        let temp = Builder::new()
            .prefix(".irds-copy")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| IrdsError::Filesystem(err.to_string()))?;
        fs::copy(source.as_std_path(), temp.path())
            .map_err(|err| IrdsError::Filesystem(format!("copy {source}: {err}")))?;
        temp.persist(dest.as_std_path())
            .map_err(|err| IrdsError::Filesystem(err.to_string()))?;
        Ok(())
    }

    /// Renames `source` onto `dest`; falls back to an atomic copy when the
    /// two paths live on different filesystems.
    pub fn move_file_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), IrdsError> {
        Self::ensure_parent(dest)?;
        match fs::rename(source.as_std_path(), dest.as_std_path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
                Self::copy_file_atomic(source, dest)?;
                fs::remove_file(source.as_std_path())
                    .map_err(|err| IrdsError::Filesystem(err.to_string()))
            }
            Err(err) => Err(IrdsError::Filesystem(format!(
                "move {source} -> {dest}: {err}"
            ))),
        }
    }
}
