use std::io::{BufWriter, Write};

use camino::Utf8PathBuf;
use tempfile::Builder;

use crate::error::IrdsError;
use crate::fs_util;
use crate::resource::{CancelToken, ResourceKey, ResourceNode, SharedNode};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveFormat {
    Zip,
    Gzip,
}

/// Resolves to a single member of a container archive, leaving every other
/// member packed. The output lands at a deterministic scratch path and is
/// transient: a cache in front of this node moves it to its final place.
pub struct ArchiveMemberNode {
    key: ResourceKey,
    archive: SharedNode,
    member: String,
    format: ArchiveFormat,
    output: Utf8PathBuf,
}

impl ArchiveMemberNode {
    pub fn zip(archive: SharedNode, member: impl Into<String>, store: &Store) -> Self {
        let member = member.into();
        let key = archive.key().child(&member);
        let output = store.scratch_path(&key);
        Self {
            key,
            archive,
            member,
            format: ArchiveFormat::Zip,
            output,
        }
    }

    /// A gzip stream holds exactly one member; `label` only names the output.
    pub fn gzip(archive: SharedNode, label: impl Into<String>, store: &Store) -> Self {
        let member = label.into();
        let key = archive.key().child(&member);
        let output = store.scratch_path(&key);
        Self {
            key,
            archive,
            member,
            format: ArchiveFormat::Gzip,
            output,
        }
    }
}

impl ResourceNode for ArchiveMemberNode {
    fn key(&self) -> &ResourceKey {
        &self.key
    }

    fn resolve_with(&self, cancel: &CancelToken) -> Result<Utf8PathBuf, IrdsError> {
        let archive_path = self.archive.resolve_with(cancel)?;
        cancel.check(&self.key)?;

        Store::ensure_parent(&self.output)?;
        let parent = self
            .output
            .parent()
            .ok_or_else(|| IrdsError::Filesystem("invalid scratch path".to_string()))?;
        let mut temp = Builder::new()
            .prefix(".irds-extract")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| IrdsError::Filesystem(err.to_string()))?;

        tracing::info!(key = %self.key, archive = %archive_path, member = %self.member, "extracting");
        let bytes = {
            let mut writer = BufWriter::new(temp.as_file_mut());
            let bytes = match self.format {
                ArchiveFormat::Zip => fs_util::extract_zip_member(
                    archive_path.as_std_path(),
                    &self.member,
                    &mut writer,
                )?,
                ArchiveFormat::Gzip => fs_util::gunzip(archive_path.as_std_path(), &mut writer)?,
            };
            writer
                .flush()
                .map_err(|err| IrdsError::Filesystem(err.to_string()))?;
            bytes
        };
        cancel.check(&self.key)?;

        temp.persist(self.output.as_std_path())
            .map_err(|err| IrdsError::Filesystem(err.to_string()))?;
        tracing::debug!(key = %self.key, bytes, path = %self.output, "member extracted");
        Ok(self.output.clone())
    }

    fn is_transient(&self) -> bool {
        true
    }
}
