//! Local adapters: a filesystem-backed object store and a plain-text
//! extractor. Production deployments substitute cloud storage and a PDF
//! extractor behind the same traits.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use super::{ObjectStore, ServiceError, TextExtractor};
use crate::types::SourceLocation;

/// Object store rooted at a directory: `bucket` maps to a subdirectory,
/// `blob` to a file path inside it.
#[derive(Clone, Debug)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, location: &SourceLocation) -> Result<PathBuf, ServiceError> {
        let relative = Path::new(&location.bucket).join(&location.blob);
        // Reject traversal out of the root; a blob is a key, not a path.
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir))
        {
            return Err(ServiceError::NotFound {
                location: location.clone(),
            });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn fetch_bytes(&self, location: &SourceLocation) -> Result<Vec<u8>, ServiceError> {
        let path = self.resolve(location)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(ServiceError::NotFound {
                    location: location.clone(),
                })
            }
            Err(err) => Err(ServiceError::TransientIo(err.to_string())),
        }
    }
}

/// Plain-text extractor: decodes the bytes as UTF-8.
///
/// Binary document formats need their own [`TextExtractor`]; this one
/// rejects `.pdf` uploads explicitly rather than decoding garbage.
#[derive(Clone, Copy, Debug, Default)]
pub struct Utf8TextExtractor;

#[async_trait]
impl TextExtractor for Utf8TextExtractor {
    async fn extract(&self, bytes: &[u8], filename: &str) -> Result<String, ServiceError> {
        if filename.to_ascii_lowercase().ends_with(".pdf") {
            return Err(ServiceError::UnsupportedFormat(format!(
                "{filename}: PDF extraction requires a PDF-capable extractor"
            )));
        }
        String::from_utf8(bytes.to_vec())
            .map_err(|err| ServiceError::CorruptInput(format!("{filename}: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn fetches_bytes_from_bucket_directory() {
        let dir = tempdir().unwrap();
        let bucket = dir.path().join("uploads");
        std::fs::create_dir_all(&bucket).unwrap();
        std::fs::write(bucket.join("doc.txt"), b"hello").unwrap();

        let store = FsObjectStore::new(dir.path());
        let bytes = store
            .fetch_bytes(&SourceLocation::new("uploads", "doc.txt"))
            .await
            .unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn missing_blob_is_not_found() {
        let dir = tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        let err = store
            .fetch_bytes(&SourceLocation::new("uploads", "nope.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let dir = tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        let err = store
            .fetch_bytes(&SourceLocation::new("uploads", "../../etc/passwd"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn utf8_extraction_and_pdf_rejection() {
        let extractor = Utf8TextExtractor;
        let text = extractor.extract(b"plain text", "a.txt").await.unwrap();
        assert_eq!(text, "plain text");

        let err = extractor.extract(b"%PDF-1.7", "a.pdf").await.unwrap_err();
        assert!(matches!(err, ServiceError::UnsupportedFormat(_)));

        let err = extractor
            .extract(&[0xff, 0xfe, 0x00, 0x80], "a.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::CorruptInput(_)));
    }
}
