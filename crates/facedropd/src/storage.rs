//! Upload storage: streams multipart file fields to disk under opaque names.

use axum::extract::multipart::MultipartError;
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use image::ImageFormat;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Extension used when the client name does not carry a known image extension.
const FALLBACK_EXTENSION: &str = "bin";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("upload directory i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("reading upload body failed: {0}")]
    Upload(#[from] MultipartError),
}

/// A file written by [`UploadSink::store`].
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Name supplied by the client. Never used to build paths.
    pub original_name: String,
    /// Name assigned on disk.
    pub stored_name: String,
    pub path: PathBuf,
    pub size: u64,
}

/// Writes uploads into a single directory.
#[derive(Debug, Clone)]
pub struct UploadSink {
    dir: PathBuf,
}

impl UploadSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stream `body` into a freshly named file.
    ///
    /// The file is created with create-new semantics, so an existing upload is
    /// never overwritten. A partially written file is removed on failure.
    pub async fn store<S, E>(
        &self,
        original_name: &str,
        body: S,
    ) -> Result<UploadedFile, StorageError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<StorageError>,
    {
        let stored_name = storage_name(original_name);
        let path = self.dir.join(&stored_name);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        match write_body(&mut file, body).await {
            Ok(size) => {
                tracing::debug!(
                    original = ?original_name,
                    stored = %stored_name,
                    size,
                    "upload stored"
                );
                Ok(UploadedFile {
                    original_name: original_name.to_string(),
                    stored_name,
                    path,
                    size,
                })
            }
            Err(e) => {
                drop(file);
                if let Err(rm) = fs::remove_file(&path).await {
                    tracing::warn!(
                        path = %path.display(),
                        error = %rm,
                        "failed to remove partial upload"
                    );
                }
                Err(e)
            }
        }
    }

    /// Delete a stored upload. Failures are logged, not returned.
    pub async fn discard(&self, file: &UploadedFile) {
        match fs::remove_file(&file.path).await {
            Ok(()) => tracing::debug!(stored = %file.stored_name, "upload discarded"),
            Err(e) => {
                tracing::warn!(stored = %file.stored_name, error = %e, "failed to discard upload")
            }
        }
    }
}

async fn write_body<S, E>(file: &mut fs::File, body: S) -> Result<u64, StorageError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<StorageError>,
{
    let mut body = std::pin::pin!(body.map_err(|e| -> StorageError { e.into() }));
    let mut size = 0u64;
    while let Some(chunk) = body.try_next().await? {
        file.write_all(&chunk).await?;
        size += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(size)
}

/// `<unix-millis>_<uuid>.<ext>`, where only the extension is derived from
/// the client name and only when it names a known image format.
fn storage_name(original_name: &str) -> String {
    format!(
        "{}_{}.{}",
        chrono::Utc::now().timestamp_millis(),
        Uuid::new_v4().simple(),
        sanitized_extension(original_name)
    )
}

fn sanitized_extension(original_name: &str) -> &'static str {
    Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .and_then(ImageFormat::from_extension)
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or(FALLBACK_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn body(chunks: &[&'static [u8]]) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
        stream::iter(chunks.iter().map(|c| Ok(Bytes::from_static(*c))).collect::<Vec<_>>())
    }

    fn entries(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir).unwrap().map(|e| e.unwrap().path()).collect()
    }

    #[test]
    fn test_sanitized_extension() {
        assert_eq!(sanitized_extension("face.png"), "png");
        assert_eq!(sanitized_extension("FACE.JPEG"), "jpg");
        assert_eq!(sanitized_extension("../../etc/passwd"), "bin");
        assert_eq!(sanitized_extension("shell.php"), "bin");
        assert_eq!(sanitized_extension("noext"), "bin");
        assert_eq!(sanitized_extension(""), "bin");
    }

    #[test]
    fn test_storage_name_never_contains_client_name() {
        let name = storage_name("../../secret holiday.webp");
        assert!(!name.contains("secret"));
        assert!(!name.contains('/'));
        assert!(!name.contains(".."));
        assert!(name.ends_with(".webp"));

        let (millis, rest) = name.split_once('_').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(rest.len(), 32 + ".webp".len());
    }

    #[tokio::test]
    async fn test_store_writes_all_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let sink = UploadSink::new(dir.path());

        let file = sink.store("me.jpg", body(&[b"hello ", b"world"])).await.unwrap();

        assert_eq!(file.original_name, "me.jpg");
        assert_eq!(file.size, 11);
        assert_eq!(file.path.parent(), Some(dir.path()));
        assert!(file.stored_name.ends_with(".jpg"));
        assert_eq!(std::fs::read(&file.path).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_same_name_twice_gives_two_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = UploadSink::new(dir.path());

        let a = sink.store("same.png", body(&[b"first"])).await.unwrap();
        let b = sink.store("same.png", body(&[b"second"])).await.unwrap();

        assert_ne!(a.path, b.path);
        assert_eq!(entries(dir.path()).len(), 2);
        assert_eq!(std::fs::read(&a.path).unwrap(), b"first");
        assert_eq!(std::fs::read(&b.path).unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_traversal_name_stays_in_dir() {
        let dir = tempfile::tempdir().unwrap();
        let sink = UploadSink::new(dir.path());

        let file = sink.store("../../outside.png", body(&[b"x"])).await.unwrap();
        assert_eq!(file.path.parent(), Some(dir.path()));
        assert_eq!(entries(dir.path()), vec![file.path.clone()]);
    }

    #[tokio::test]
    async fn test_failed_body_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let sink = UploadSink::new(dir.path());

        let failing = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "client went away")),
        ]);

        let err = sink.store("a.png", failing).await.unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
        assert!(entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let sink = UploadSink::new(dir.path().join("does-not-exist"));

        let err = sink.store("a.png", body(&[b"x"])).await.unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
    }

    #[tokio::test]
    async fn test_discard_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = UploadSink::new(dir.path());

        let file = sink.store("a.png", body(&[b"x"])).await.unwrap();
        sink.discard(&file).await;
        assert!(entries(dir.path()).is_empty());

        // second discard only logs
        sink.discard(&file).await;
    }
}
