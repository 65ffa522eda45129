//! Retrieval resolver: decides the response shape for a seed code.
//!
//! Every mode starts with a store lookup. Text records are answered inline.
//! File records are classified by the lower-cased extension of their
//! original name into a [`ViewBucket`], which decides whether the bytes are
//! streamed, read as text, or withheld in favour of a download link.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::links::download_path;
use super::store::{ContentStore, Payload};
use crate::error::{Error, Result};

/// Fallback content type for unknown extensions.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// How a stored file is presented by the view mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewBucket {
    /// Browser-renderable media, streamed as-is.
    Render,
    /// Text-like files, read and returned inline.
    Text,
    /// Everything else: metadata and a download link only.
    Opaque,
}

impl ViewBucket {
    /// Classify a lower-case extension without the leading dot.
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "jpg" | "jpeg" | "png" | "ico" | "gif" | "bmp" | "pdf" | "mp4" | "webm" | "mov" => {
                Self::Render
            },
            "txt" | "md" | "js" | "html" | "css" | "json" | "xml" => Self::Text,
            _ => Self::Opaque,
        }
    }
}

/// Recover the client's filename from a stored file name.
///
/// Stored names are `<unix-millis>-<original>`; everything after the first
/// `-` is the original. A name without `-` is returned unchanged.
pub fn original_name(stored_name: &str) -> &str {
    stored_name
        .split_once('-')
        .map_or(stored_name, |(_, original)| original)
}

/// Lower-cased extension of `name` without the dot, or `""` if none.
pub fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Answer to a file-name lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameLookup {
    /// The inline text of a text record.
    Text(String),
    /// The storage reference of a file record.
    File(String),
}

/// A stored file that exists on disk and can be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Location of the bytes.
    pub path: PathBuf,
    /// Size in bytes when resolved.
    pub len: u64,
    /// Guessed from the extension.
    pub content_type: String,
    /// Original client filename.
    pub file_name: String,
}

/// Answer to a download request.
#[derive(Debug)]
pub enum Download {
    /// A text record, served as `<seed>.txt`.
    Text {
        /// Attachment filename.
        file_name: String,
        /// The text itself.
        body: String,
    },
    /// A stored file.
    File(StoredFile),
}

/// Answer to a view request.
#[derive(Debug)]
pub enum View {
    /// Inline text content.
    Text {
        /// The text.
        content: String,
        /// Seed code for text records, original filename for files.
        file_name: String,
    },
    /// Renderable media to serve as-is.
    Stream(StoredFile),
    /// Metadata for files that are not shown inline.
    Metadata {
        /// Original client filename.
        file_name: String,
        /// Extension without the dot.
        file_type: String,
        /// Host-relative download path.
        download_url: String,
    },
}

/// Resolves seed codes into responses.
#[derive(Clone)]
pub struct Resolver {
    store: ContentStore,
}

impl Resolver {
    /// Create a resolver over `store`.
    pub const fn new(store: ContentStore) -> Self {
        Self { store }
    }

    /// Text body or file reference of a record.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the seed code has no record, [`Error::Storage`]
    /// if the lookup fails.
    pub async fn lookup_name(&self, seed_code: &str) -> Result<NameLookup> {
        let record = self.store.fetch(seed_code).await?;
        Ok(match record.payload {
            Payload::Text(text) => NameLookup::Text(text),
            Payload::File(path) => NameLookup::File(path.to_string_lossy().into_owned()),
        })
    }

    /// Content to send as an attachment.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the record or its backing file is missing,
    /// [`Error::Storage`] if the file cannot be opened.
    pub async fn download(&self, seed_code: &str) -> Result<Download> {
        let record = self.store.fetch(seed_code).await?;
        match record.payload {
            Payload::Text(body) => Ok(Download::Text {
                file_name: format!("{}.txt", record.seed_code),
                body,
            }),
            Payload::File(ref path) => {
                Ok(Download::File(stored_file(&record.seed_code, path).await?))
            },
        }
    }

    /// Content shaped for in-browser viewing.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the record or its backing file is missing,
    /// [`Error::Storage`] if the file cannot be read.
    pub async fn view(&self, seed_code: &str) -> Result<View> {
        let record = self.store.fetch(seed_code).await?;
        let path = match record.payload {
            Payload::Text(content) => {
                return Ok(View::Text {
                    content,
                    file_name: record.seed_code,
                });
            },
            Payload::File(ref path) => path.clone(),
        };

        let file_name = stored_original_name(&path);
        let ext = extension_of(&file_name);
        let bucket = ViewBucket::from_extension(&ext);
        debug!(seed_code = %record.seed_code, ext = %ext, bucket = ?bucket, "Resolved view");

        match bucket {
            ViewBucket::Render => Ok(View::Stream(stored_file(&record.seed_code, &path).await?)),
            ViewBucket::Text => {
                let bytes = tokio::fs::read(&path).await.map_err(missing_as_not_found)?;
                Ok(View::Text {
                    content: String::from_utf8_lossy(&bytes).into_owned(),
                    file_name,
                })
            },
            ViewBucket::Opaque => {
                if !tokio::fs::try_exists(&path).await? {
                    return Err(Error::file_not_found());
                }
                Ok(View::Metadata {
                    file_name,
                    file_type: ext,
                    download_url: download_path(&record.seed_code),
                })
            },
        }
    }
}

fn stored_original_name(path: &Path) -> String {
    let stored = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    original_name(&stored).to_string()
}

fn missing_as_not_found(err: std::io::Error) -> Error {
    if err.kind() == ErrorKind::NotFound {
        Error::file_not_found()
    } else {
        Error::storage(err)
    }
}

async fn stored_file(seed_code: &str, path: &Path) -> Result<StoredFile> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(missing_as_not_found)?;
    if !metadata.is_file() {
        return Err(Error::file_not_found());
    }
    let file_name = stored_original_name(path);
    let content_type = mime_guess::from_path(&file_name)
        .first()
        .map_or_else(|| OCTET_STREAM.to_string(), |mime| mime.to_string());

    debug!(
        seed_code = %seed_code,
        file_name = %file_name,
        len = metadata.len(),
        "Resolved stored file"
    );
    Ok(StoredFile {
        path: path.to_path_buf(),
        len: metadata.len(),
        content_type,
        file_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::ContentRecord;
    use chrono::{Duration, Utc};
    use proptest::prelude::*;
    use tempfile::TempDir;

    async fn store_file(store: &ContentStore, dir: &TempDir, seed: &str, name: &str, body: &[u8]) {
        let path = dir.path().join(format!("1700000000000-{name}"));
        std::fs::write(&path, body).unwrap();
        store
            .create(&ContentRecord::new(
                seed,
                Payload::File(path),
                serde_json::json!({}),
                Utc::now() + Duration::hours(1),
            ))
            .await
            .unwrap();
    }

    async fn store_text(store: &ContentStore, seed: &str, text: &str) {
        store
            .create(&ContentRecord::new(
                seed,
                Payload::Text(text.into()),
                serde_json::json!({}),
                Utc::now() + Duration::hours(1),
            ))
            .await
            .unwrap();
    }

    #[test]
    fn test_original_name_splits_on_first_dash() {
        assert_eq!(original_name("1700000000000-report.pdf"), "report.pdf");
        assert_eq!(original_name("1700000000000-my-file-v2.txt"), "my-file-v2.txt");
        assert_eq!(original_name("nodash.txt"), "nodash.txt");
        assert_eq!(original_name("123-"), "");
    }

    #[test]
    fn test_bucket_mapping() {
        for ext in ["jpg", "jpeg", "png", "ico", "gif", "bmp", "pdf", "mp4", "webm", "mov"] {
            assert_eq!(ViewBucket::from_extension(ext), ViewBucket::Render, "{ext}");
        }
        for ext in ["txt", "md", "js", "html", "css", "json", "xml"] {
            assert_eq!(ViewBucket::from_extension(ext), ViewBucket::Text, "{ext}");
        }
        for ext in ["bin", "zip", "exe", "", "tar", "svg"] {
            assert_eq!(ViewBucket::from_extension(ext), ViewBucket::Opaque, "{ext}");
        }
    }

    #[test]
    fn test_extension_is_lower_cased() {
        assert_eq!(extension_of("PHOTO.JPG"), "jpg");
        assert_eq!(extension_of("archive.tar.gz"), "gz");
        assert_eq!(extension_of("README"), "");
        assert_eq!(ViewBucket::from_extension(&extension_of("Notes.MD")), ViewBucket::Text);
    }

    #[tokio::test]
    async fn test_text_record_modes() {
        let store = ContentStore::memory();
        store_text(&store, "abc123", "hello").await;
        let resolver = Resolver::new(store);

        assert_eq!(
            resolver.lookup_name("abc123").await.unwrap(),
            NameLookup::Text("hello".into())
        );

        match resolver.view("abc123").await.unwrap() {
            View::Text { content, file_name } => {
                assert_eq!(content, "hello");
                assert_eq!(file_name, "abc123");
            },
            other => panic!("unexpected view: {other:?}"),
        }

        match resolver.download("abc123").await.unwrap() {
            Download::Text { file_name, body } => {
                assert_eq!(file_name, "abc123.txt");
                assert_eq!(body, "hello");
            },
            other => panic!("unexpected download: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_file_download_resolves_original_name() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::memory();
        store_file(&store, &dir, "pdf", "report.pdf", b"%PDF-1.4 body").await;
        let resolver = Resolver::new(store);

        match resolver.lookup_name("pdf").await.unwrap() {
            NameLookup::File(reference) => assert!(reference.ends_with("1700000000000-report.pdf")),
            other => panic!("unexpected lookup: {other:?}"),
        }

        let Download::File(file) = resolver.download("pdf").await.unwrap() else {
            panic!("expected file download");
        };
        assert_eq!(file.file_name, "report.pdf");
        assert_eq!(file.content_type, "application/pdf");
        assert_eq!(file.len, 13);
        assert_eq!(std::fs::read(&file.path).unwrap(), b"%PDF-1.4 body");
    }

    #[tokio::test]
    async fn test_view_buckets() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::memory();
        store_file(&store, &dir, "img", "cat.PNG", b"\x89PNG").await;
        store_file(&store, &dir, "md", "notes.md", b"# Title").await;
        store_file(&store, &dir, "bin", "blob.bin", b"\0\0").await;
        let resolver = Resolver::new(store);

        match resolver.view("img").await.unwrap() {
            View::Stream(stream) => {
                assert_eq!(stream.file_name, "cat.PNG");
                assert_eq!(stream.content_type, "image/png");
            },
            other => panic!("unexpected view: {other:?}"),
        }

        match resolver.view("md").await.unwrap() {
            View::Text { content, file_name } => {
                assert_eq!(content, "# Title");
                assert_eq!(file_name, "notes.md");
            },
            other => panic!("unexpected view: {other:?}"),
        }

        match resolver.view("bin").await.unwrap() {
            View::Metadata {
                file_name,
                file_type,
                download_url,
            } => {
                assert_eq!(file_name, "blob.bin");
                assert_eq!(file_type, "bin");
                assert_eq!(download_url, "/api/download/bin");
            },
            other => panic!("unexpected view: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_backing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::memory();
        for (seed, name) in [("a", "gone.pdf"), ("b", "gone.txt"), ("c", "gone.bin")] {
            store_file(&store, &dir, seed, name, b"x").await;
            std::fs::remove_file(dir.path().join(format!("1700000000000-{name}"))).unwrap();
        }
        let resolver = Resolver::new(store);

        assert!(matches!(
            resolver.download("a").await.unwrap_err(),
            Error::NotFound { what: "File" }
        ));
        for seed in ["a", "b", "c"] {
            assert!(
                matches!(resolver.view(seed).await.unwrap_err(), Error::NotFound { what: "File" }),
                "{seed}"
            );
        }
    }

    #[tokio::test]
    async fn test_unknown_seed_is_not_found() {
        let resolver = Resolver::new(ContentStore::memory());
        assert!(matches!(
            resolver.lookup_name("missing").await.unwrap_err(),
            Error::NotFound { what: "Seed Code" }
        ));
        assert!(resolver.download("missing").await.is_err());
        assert!(resolver.view("missing").await.is_err());
    }

    proptest! {
        #[test]
        fn prop_original_name_survives_timestamp_prefix(
            millis in 0u64..=u64::MAX,
            name in "[A-Za-z0-9._ -]{1,40}",
        ) {
            let stored = format!("{millis}-{name}");
            prop_assert_eq!(original_name(&stored), name.as_str());
        }

        #[test]
        fn prop_classification_ignores_case(ext in "[a-zA-Z]{1,5}") {
            let lowered = extension_of(&format!("file.{ext}"));
            prop_assert_eq!(&lowered, &ext.to_lowercase());
            prop_assert_eq!(
                ViewBucket::from_extension(&lowered),
                ViewBucket::from_extension(&ext.to_lowercase())
            );
        }
    }
}
