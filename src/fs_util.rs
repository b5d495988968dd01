use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use sha2::{Digest, Sha256};
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::IrdsError;

/// Streams exactly one member of a zip archive into `destination`.
pub fn extract_zip_member(
    zip_path: &Path,
    member: &str,
    destination: &mut dyn Write,
) -> Result<u64, IrdsError> {
    let archive_name = zip_path.display().to_string();
    let file = fs::File::open(zip_path)
        .map_err(|err| IrdsError::Filesystem(format!("open zip {archive_name}: {err}")))?;
    let mut archive = ZipArchive::new(file).map_err(|err| IrdsError::CorruptArchive {
        archive: archive_name.clone(),
        message: err.to_string(),
    })?;

    let mut entry = match archive.by_name(member) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => {
            return Err(IrdsError::MemberNotFound {
                archive: archive_name,
                member: member.to_string(),
            });
        }
        Err(err) => {
            return Err(IrdsError::CorruptArchive {
                archive: archive_name,
                message: err.to_string(),
            });
        }
    };
    if entry.is_dir() {
        return Err(IrdsError::MemberNotFound {
            archive: archive_name,
            member: member.to_string(),
        });
    }

    io::copy(&mut entry, destination).map_err(|err| IrdsError::CorruptArchive {
        archive: archive_name,
        message: format!("reading {member}: {err}"),
    })
}

pub fn list_zip_members(zip_path: &Path) -> Result<Vec<String>, IrdsError> {
    let archive_name = zip_path.display().to_string();
    let file = fs::File::open(zip_path)
        .map_err(|err| IrdsError::Filesystem(format!("open zip {archive_name}: {err}")))?;
    let archive = ZipArchive::new(file).map_err(|err| IrdsError::CorruptArchive {
        archive: archive_name,
        message: err.to_string(),
    })?;
    Ok(archive.file_names().map(str::to_string).collect())
}

/// Decompresses a (possibly multi-member) gzip stream into `destination`.
pub fn gunzip(gz_path: &Path, destination: &mut dyn Write) -> Result<u64, IrdsError> {
    let archive_name = gz_path.display().to_string();
    let file = fs::File::open(gz_path)
        .map_err(|err| IrdsError::Filesystem(format!("open gzip {archive_name}: {err}")))?;
    let mut decoder = MultiGzDecoder::new(io::BufReader::new(file));
    io::copy(&mut decoder, destination).map_err(|err| IrdsError::CorruptArchive {
        archive: archive_name,
        message: err.to_string(),
    })
}

pub fn sha256_file(path: &Path) -> Result<String, IrdsError> {
    let mut file = fs::File::open(path)
        .map_err(|err| IrdsError::Filesystem(format!("open {}: {err}", path.display())))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let read = file
            .read(&mut buf)
            .map_err(|err| IrdsError::Filesystem(err.to_string()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Writer adapter that hashes and counts everything passing through it.
pub struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }

    pub fn finish(self) -> (W, String, u64) {
        (self.inner, hex::encode(self.hasher.finalize()), self.written)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn hashing_writer_matches_file_hash() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("blob");
        let mut writer = HashingWriter::new(Vec::new());
        writer.write_all(b"hello world").unwrap();
        let (bytes, digest, written) = writer.finish();
        fs::write(&path, &bytes).unwrap();

        assert_eq!(written, 11);
        assert_eq!(
            digest,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(sha256_file(&path).unwrap(), digest);
    }

    #[test]
    fn gunzip_round_trip() {
        use flate2::Compression;
        use flate2::write::GzEncoder;

        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("qrels.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"1 0 doc 1\n").unwrap();
        fs::write(&path, encoder.finish().unwrap()).unwrap();

        let mut out = Cursor::new(Vec::new());
        gunzip(&path, &mut out).unwrap();
        assert_eq!(out.into_inner(), b"1 0 doc 1\n");
    }
}
