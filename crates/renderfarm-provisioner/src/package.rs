//! Launcher deployment package
//!
//! The archive holds a single executable `bootstrap` entry with fixed
//! metadata, so the same binary always yields the same bytes and the same
//! `CodeSha256` as Lambda computes it.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Entry name Lambda executes for custom runtimes
pub const BOOTSTRAP_ENTRY: &str = "bootstrap";

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("Failed to read launcher binary '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Launcher binary '{}' is empty", path.display())]
    EmptyBinary { path: PathBuf },

    #[error("Failed to write deployment archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Failed to write deployment archive: {0}")]
    Write(#[from] std::io::Error),
}

/// Zipped launcher ready for `CreateFunction` / `UpdateFunctionCode`.
#[derive(Clone, PartialEq, Eq)]
pub struct FunctionPackage {
    bytes: Vec<u8>,
    code_sha256: String,
}

impl FunctionPackage {
    /// Package the binary at `path`.
    pub fn from_binary_path(path: &Path) -> Result<Self, PackageError> {
        let binary = std::fs::read(path).map_err(|source| PackageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if binary.is_empty() {
            return Err(PackageError::EmptyBinary {
                path: path.to_path_buf(),
            });
        }
        Self::from_binary(&binary)
    }

    pub fn from_binary(binary: &[u8]) -> Result<Self, PackageError> {
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
            .unix_permissions(0o755);

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file(BOOTSTRAP_ENTRY, options)?;
        writer.write_all(binary)?;
        let bytes = writer.finish()?.into_inner();

        let code_sha256 = code_sha256(&bytes);
        Ok(Self { bytes, code_sha256 })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Base64 SHA-256 of the archive, as reported by Lambda
    pub fn code_sha256(&self) -> &str {
        &self.code_sha256
    }
}

impl std::fmt::Debug for FunctionPackage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionPackage")
            .field("len", &self.bytes.len())
            .field("code_sha256", &self.code_sha256)
            .finish()
    }
}

/// Base64-encoded SHA-256 digest
pub fn code_sha256(bytes: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::NamedTempFile;
    use zip::ZipArchive;

    const FAKE_BINARY: &[u8] = b"\x7fELF fake launcher";

    #[test]
    fn test_package_is_deterministic() {
        let a = FunctionPackage::from_binary(FAKE_BINARY).unwrap();
        let b = FunctionPackage::from_binary(FAKE_BINARY).unwrap();
        assert_eq!(a.bytes(), b.bytes());
        assert_eq!(a.code_sha256(), b.code_sha256());

        let c = FunctionPackage::from_binary(b"other").unwrap();
        assert_ne!(a.code_sha256(), c.code_sha256());
    }

    #[test]
    fn test_archive_contains_executable_bootstrap() {
        let package = FunctionPackage::from_binary(FAKE_BINARY).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(package.bytes())).unwrap();
        assert_eq!(archive.len(), 1);

        let mut entry = archive.by_name(BOOTSTRAP_ENTRY).unwrap();
        assert_eq!(entry.unix_mode().map(|m| m & 0o777), Some(0o755));
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        assert_eq!(content, FAKE_BINARY);
    }

    #[test]
    fn test_code_sha256_matches_known_digest() {
        // sha256("") in base64
        assert_eq!(
            code_sha256(b""),
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }

    #[test]
    fn test_from_path() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(FAKE_BINARY).unwrap();
        let from_path = FunctionPackage::from_binary_path(file.path()).unwrap();
        let direct = FunctionPackage::from_binary(FAKE_BINARY).unwrap();
        assert_eq!(from_path, direct);
    }

    #[test]
    fn test_empty_binary_rejected() {
        let file = NamedTempFile::new().unwrap();
        let err = FunctionPackage::from_binary_path(file.path()).unwrap_err();
        assert!(matches!(err, PackageError::EmptyBinary { .. }));
    }

    #[test]
    fn test_missing_binary_reports_path() {
        let err = FunctionPackage::from_binary_path(Path::new("/nonexistent/bootstrap"))
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/bootstrap"));
    }
}
