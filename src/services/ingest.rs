//! Ingestion pipeline: validate a submission, place file bytes, create the record.
//!
//! File parts are streamed into a temporary file inside the upload directory
//! while counting bytes. The temporary file deletes itself when dropped, so a
//! rejected, failed or abandoned upload (including a client disconnect that
//! drops the request future) leaves nothing behind. Only once every check
//! has passed is the file renamed to its final `<unix-millis>-<name>` path.
//! The rename and the record insert run together on a spawned task, and the
//! renamed file is removed again only if the insert fails.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::links::download_path;
use super::store::{ContentKind, ContentRecord, ContentStore, Payload};
use crate::constants::{MAX_FILE_SIZE_BYTES, MAX_SEED_CODE_LEN};
use crate::error::{Error, Result};
use crate::reliability::sanitize_upload_name;

/// Rejection for a missing or oversized file part.
pub const FILE_REQUIRED_MESSAGE: &str = "File is required and must be under 10 MB";

/// Rejection for a file part exceeding the size cap.
pub const FILE_TOO_LARGE_MESSAGE: &str = "File too large";

/// How many timestamp bumps to try when a final name is already taken.
const MAX_NAME_ATTEMPTS: i64 = 16;

/// Settings for the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Directory receiving uploaded files. Must exist.
    pub upload_dir: PathBuf,
    /// Per-file size cap in bytes.
    pub max_file_size: u64,
    /// How long a record lives before it is swept.
    pub retention: Duration,
}

impl IngestConfig {
    /// Create settings with the default size cap and retention.
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            max_file_size: MAX_FILE_SIZE_BYTES,
            retention: crate::constants::DEFAULT_RETENTION,
        }
    }
}

/// A file part that has been fully received but not yet committed.
///
/// Dropping it deletes the temporary file.
#[derive(Debug)]
pub struct StagedFile {
    temp: TempPath,
    original_name: String,
    size: u64,
}

impl StagedFile {
    /// Sanitized client filename.
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    /// Bytes received.
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Current temporary location.
    pub fn temp_path(&self) -> &Path {
        &self.temp
    }
}

/// Raw upload fields as received from the client.
///
/// Every field is optional here; [`Ingestor::submit`] decides what is
/// required for the requested kind.
#[derive(Debug, Default)]
pub struct Submission {
    /// Requested seed code.
    pub seed_code: Option<String>,
    /// `"text"` or `"file"`.
    pub upload_type: Option<String>,
    /// Body for text uploads.
    pub text_message: Option<String>,
    /// Staged file part for file uploads.
    pub file: Option<StagedFile>,
    /// JSON metadata document, as sent.
    pub metadata: Option<String>,
}

/// Successful upload result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Seed code the content is stored under.
    pub seed_code: String,
    /// Kind of the stored content.
    pub kind: ContentKind,
    /// Path (without host) where the content can be downloaded.
    pub download_path: String,
}

/// Removes a committed file on drop unless disarmed.
struct CommitGuard {
    path: Option<PathBuf>,
}

impl CommitGuard {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    fn disarm(mut self) -> PathBuf {
        self.path.take().unwrap_or_default()
    }
}

impl Drop for CommitGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take()
            && let Err(e) = std::fs::remove_file(&path)
            && e.kind() != ErrorKind::NotFound
        {
            warn!(path = %path.display(), error = %e, "Failed to remove uncommitted upload");
        }
    }
}

/// Turns submissions into content records.
#[derive(Clone)]
pub struct Ingestor {
    store: ContentStore,
    config: IngestConfig,
}

impl Ingestor {
    /// Create a pipeline writing into `config.upload_dir`.
    pub const fn new(store: ContentStore, config: IngestConfig) -> Self {
        Self { store, config }
    }

    /// The pipeline settings.
    pub const fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Stream a file part into a temporary file in the upload directory.
    ///
    /// Bytes are counted as they arrive; the first chunk pushing the total
    /// past the cap aborts the transfer with a validation error and the
    /// partial file is deleted.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for an unusable filename, an oversized file, or
    ///   a validation error yielded by the stream itself
    /// - [`Error::Storage`] if the temporary file cannot be written
    pub async fn stage_file<S>(&self, raw_name: &str, chunks: S) -> Result<StagedFile>
    where
        S: Stream<Item = Result<Bytes>>,
    {
        let original_name = sanitize_upload_name(raw_name).map_err(|e| {
            debug!(filename = %raw_name.escape_debug(), reason = %e, "Rejected upload filename");
            Error::validation(e.to_string())
        })?;

        let upload_dir = self.config.upload_dir.clone();
        let named = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(".upload-")
                .tempfile_in(&upload_dir)
        })
        .await
        .map_err(Error::storage)??;

        let (file, temp) = named.into_parts();
        let mut file = tokio::fs::File::from_std(file);
        let mut size: u64 = 0;
        let mut chunks = std::pin::pin!(chunks);

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            size += chunk.len() as u64;
            if size > self.config.max_file_size {
                warn!(
                    target: "audit",
                    security_event = "upload_too_large",
                    filename = %original_name,
                    limit = self.config.max_file_size,
                    "Upload exceeded size cap"
                );
                return Err(Error::validation(FILE_TOO_LARGE_MESSAGE));
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        debug!(filename = %original_name, size, "Staged upload");
        Ok(StagedFile {
            temp,
            original_name,
            size,
        })
    }

    /// Validate a submission and create its record.
    ///
    /// Validation runs in order: seed code, upload type, then the payload for
    /// that type, then metadata. A staged file that is not used (wrong kind
    /// or any failure) is deleted.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for missing or malformed input
    /// - [`Error::DuplicateKey`] if the seed code is taken
    /// - [`Error::Storage`] if the file or record cannot be persisted
    pub async fn submit(&self, submission: Submission) -> Result<UploadReceipt> {
        let Submission {
            seed_code,
            upload_type,
            text_message,
            file,
            metadata,
        } = submission;

        let seed_code = validate_seed_code(seed_code)?;
        let kind: ContentKind = upload_type
            .as_deref()
            .unwrap_or_default()
            .parse()
            .map_err(|_| Error::validation("Invalid upload type"))?;

        match kind {
            ContentKind::Text => {
                let text = text_message
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| Error::validation("Text message is required"))?;
                let metadata = parse_metadata(metadata.as_deref())?;
                drop(file);

                let record = self.record(&seed_code, Payload::Text(text), metadata)?;
                self.store.create(&record).await?;
            },
            ContentKind::File => {
                let staged = file.ok_or_else(|| Error::validation(FILE_REQUIRED_MESSAGE))?;
                let metadata = parse_metadata(metadata.as_deref())?;

                let ingestor = self.clone();
                let owned_seed = seed_code.clone();
                let path = tokio::spawn(async move {
                    ingestor.place_file(&owned_seed, staged, metadata).await
                })
                .await
                .map_err(Error::storage)??;
                debug!(seed_code = %seed_code, path = %path.display(), "Stored upload");
            },
        }

        Ok(UploadReceipt {
            download_path: download_path(&seed_code),
            seed_code,
            kind,
        })
    }

    fn record(
        &self,
        seed_code: &str,
        payload: Payload,
        metadata: serde_json::Value,
    ) -> Result<ContentRecord> {
        let retention = chrono::Duration::from_std(self.config.retention)
            .map_err(|e| Error::storage(anyhow::anyhow!("retention out of range: {e}")))?;
        Ok(ContentRecord::new(
            seed_code,
            payload,
            metadata,
            Utc::now() + retention,
        ))
    }

    /// Commit a staged file and create its record.
    ///
    /// Runs on a spawned task: once started it finishes even if the request
    /// that submitted it is dropped, so the guard only removes the file when
    /// the insert itself failed.
    async fn place_file(
        &self,
        seed_code: &str,
        staged: StagedFile,
        metadata: serde_json::Value,
    ) -> Result<PathBuf> {
        let upload_dir = self.config.upload_dir.clone();
        let guard = tokio::task::spawn_blocking(move || commit(&upload_dir, staged))
            .await
            .map_err(Error::storage)??;

        let record = self.record(seed_code, Payload::File(guard.path().to_path_buf()), metadata)?;
        self.store.create(&record).await?;
        Ok(guard.disarm())
    }
}

/// Move a staged file to its final name.
///
/// The name is `<unix-millis>-<original-name>`; if that exists the timestamp
/// is bumped rather than overwriting another upload. Blocking.
fn commit(upload_dir: &Path, staged: StagedFile) -> Result<CommitGuard> {
    let StagedFile {
        mut temp,
        original_name,
        ..
    } = staged;
    let millis = Utc::now().timestamp_millis();

    for bump in 0..MAX_NAME_ATTEMPTS {
        let target = upload_dir.join(format!("{}-{original_name}", millis + bump));
        match temp.persist_noclobber(&target) {
            Ok(()) => return Ok(CommitGuard::new(target)),
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => temp = e.path,
            Err(e) => return Err(Error::storage(e.error)),
        }
    }
    Err(Error::storage(anyhow::anyhow!(
        "no free file name for '{original_name}' after {MAX_NAME_ATTEMPTS} attempts"
    )))
}

fn validate_seed_code(seed_code: Option<String>) -> Result<String> {
    let seed_code = seed_code
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::validation("seed_code is required"))?;

    if seed_code.len() > MAX_SEED_CODE_LEN {
        return Err(Error::validation(format!(
            "seed_code must be at most {MAX_SEED_CODE_LEN} bytes"
        )));
    }
    if seed_code.contains('/') || seed_code.chars().any(char::is_control) {
        return Err(Error::validation(
            "seed_code cannot contain '/' or control characters",
        ));
    }
    Ok(seed_code)
}

/// Empty or missing metadata becomes `{}`; anything else must be JSON.
fn parse_metadata(raw: Option<&str>) -> Result<serde_json::Value> {
    match raw.map(str::trim) {
        None | Some("") => Ok(serde_json::Value::Object(serde_json::Map::new())),
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| Error::validation(format!("metadata must be valid JSON: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::{ContentStore, InsertOutcome, MemoryRecordStore, RecordStore};
    use async_trait::async_trait;
    use chrono::DateTime;
    use futures::stream;
    use tempfile::TempDir;

    fn ingestor(dir: &TempDir) -> Ingestor {
        Ingestor::new(ContentStore::memory(), IngestConfig::new(dir.path()))
    }

    fn chunks(data: &[u8], chunk: usize) -> impl Stream<Item = Result<Bytes>> + use<> {
        let parts: Vec<Result<Bytes>> = data
            .chunks(chunk)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        stream::iter(parts)
    }

    fn dir_entries(dir: &TempDir) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn text_submission(seed: &str, text: &str) -> Submission {
        Submission {
            seed_code: Some(seed.into()),
            upload_type: Some("text".into()),
            text_message: Some(text.into()),
            ..Submission::default()
        }
    }

    #[tokio::test]
    async fn test_text_submission_creates_record_without_files() {
        let dir = TempDir::new().unwrap();
        let ingestor = ingestor(&dir);

        let receipt = ingestor
            .submit(text_submission("abc123", "hello"))
            .await
            .unwrap();
        assert_eq!(receipt.seed_code, "abc123");
        assert_eq!(receipt.kind, ContentKind::Text);
        assert_eq!(receipt.download_path, "/api/download/abc123");

        let record = ingestor.store.fetch("abc123").await.unwrap();
        assert_eq!(record.payload, Payload::Text("hello".into()));
        assert_eq!(record.metadata, serde_json::json!({}));
        assert!(dir_entries(&dir).is_empty());
    }

    #[tokio::test]
    async fn test_file_submission_is_committed_with_timestamp_prefix() {
        let dir = TempDir::new().unwrap();
        let ingestor = ingestor(&dir);
        let data = vec![7u8; 10_000];

        let staged = ingestor
            .stage_file("report.pdf", chunks(&data, 1024))
            .await
            .unwrap();
        assert_eq!(staged.size(), 10_000);
        assert_eq!(staged.original_name(), "report.pdf");

        ingestor
            .submit(Submission {
                seed_code: Some("pdf".into()),
                upload_type: Some("file".into()),
                file: Some(staged),
                metadata: Some(r#"{"title":"Q3"}"#.into()),
                ..Submission::default()
            })
            .await
            .unwrap();

        let record = ingestor.store.fetch("pdf").await.unwrap();
        assert_eq!(record.metadata, serde_json::json!({"title": "Q3"}));
        let path = record.payload.file_path().unwrap().to_path_buf();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        let (millis, rest) = name.split_once('-').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(rest, "report.pdf");
        assert_eq!(std::fs::read(&path).unwrap(), data);
        assert_eq!(dir_entries(&dir), vec![name]);
    }

    #[tokio::test]
    async fn test_oversized_file_is_rejected_and_removed() {
        let dir = TempDir::new().unwrap();
        let mut config = IngestConfig::new(dir.path());
        config.max_file_size = 4096;
        let ingestor = Ingestor::new(ContentStore::memory(), config);

        let err = ingestor
            .stage_file("big.bin", chunks(&[0u8; 5000], 1000))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), FILE_TOO_LARGE_MESSAGE);
        assert!(dir_entries(&dir).is_empty());
    }

    #[tokio::test]
    async fn test_file_exactly_at_cap_is_accepted() {
        let dir = TempDir::new().unwrap();
        let mut config = IngestConfig::new(dir.path());
        config.max_file_size = 4096;
        let ingestor = Ingestor::new(ContentStore::memory(), config);

        let staged = ingestor
            .stage_file("exact.bin", chunks(&[1u8; 4096], 1000))
            .await
            .unwrap();
        assert_eq!(staged.size(), 4096);
    }

    #[tokio::test]
    async fn test_stream_error_leaves_no_partial_file() {
        let dir = TempDir::new().unwrap();
        let ingestor = ingestor(&dir);

        let parts: Vec<Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(Error::validation("connection reset")),
        ];
        let err = ingestor
            .stage_file("a.txt", stream::iter(parts))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(dir_entries(&dir).is_empty());
    }

    #[tokio::test]
    async fn test_dropped_stage_future_leaves_no_partial_file() {
        let dir = TempDir::new().unwrap();
        let ingestor = ingestor(&dir);

        let (tx, rx) = futures::channel::mpsc::unbounded::<Result<Bytes>>();
        tx.unbounded_send(Ok(Bytes::from_static(b"first chunk")))
            .unwrap();

        // The sender stays open, so staging never completes on its own.
        let attempt = tokio::time::timeout(
            Duration::from_millis(100),
            ingestor.stage_file("slow.txt", rx),
        )
        .await;
        assert!(attempt.is_err());
        drop(tx);

        assert!(dir_entries(&dir).is_empty());
    }

    #[tokio::test]
    async fn test_validation_order() {
        let dir = TempDir::new().unwrap();
        let ingestor = ingestor(&dir);

        let err = ingestor
            .submit(Submission {
                upload_type: Some("bogus".into()),
                ..Submission::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "seed_code is required");

        let err = ingestor
            .submit(Submission {
                seed_code: Some("s".into()),
                upload_type: Some("bogus".into()),
                ..Submission::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid upload type");

        let err = ingestor
            .submit(Submission {
                seed_code: Some("s".into()),
                upload_type: Some("text".into()),
                text_message: Some(String::new()),
                ..Submission::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Text message is required");

        let err = ingestor
            .submit(Submission {
                seed_code: Some("s".into()),
                upload_type: Some("file".into()),
                ..Submission::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), FILE_REQUIRED_MESSAGE);
    }

    #[tokio::test]
    async fn test_seed_code_shape_is_checked() {
        let dir = TempDir::new().unwrap();
        let ingestor = ingestor(&dir);

        for seed in ["a/b".to_string(), "x\ny".to_string(), "s".repeat(MAX_SEED_CODE_LEN + 1)] {
            let err = ingestor
                .submit(text_submission(&seed, "hi"))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{seed:?}");
        }
    }

    #[tokio::test]
    async fn test_invalid_metadata_is_rejected_and_file_removed() {
        let dir = TempDir::new().unwrap();
        let ingestor = ingestor(&dir);

        let staged = ingestor
            .stage_file("a.txt", chunks(b"abc", 2))
            .await
            .unwrap();
        let err = ingestor
            .submit(Submission {
                seed_code: Some("m".into()),
                upload_type: Some("file".into()),
                file: Some(staged),
                metadata: Some("{not json".into()),
                ..Submission::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(dir_entries(&dir).is_empty());
        assert!(ingestor.store.fetch("m").await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_file_upload_removes_new_file() {
        let dir = TempDir::new().unwrap();
        let ingestor = ingestor(&dir);

        ingestor.submit(text_submission("taken", "first")).await.unwrap();

        let staged = ingestor
            .stage_file("b.txt", chunks(b"second", 3))
            .await
            .unwrap();
        let err = ingestor
            .submit(Submission {
                seed_code: Some("taken".into()),
                upload_type: Some("file".into()),
                file: Some(staged),
                ..Submission::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateKey { .. }));
        assert!(dir_entries(&dir).is_empty());

        let record = ingestor.store.fetch("taken").await.unwrap();
        assert_eq!(record.payload, Payload::Text("first".into()));
    }

    #[tokio::test]
    async fn test_text_upload_discards_stray_file_part() {
        let dir = TempDir::new().unwrap();
        let ingestor = ingestor(&dir);

        let staged = ingestor
            .stage_file("stray.txt", chunks(b"ignored", 4))
            .await
            .unwrap();
        let mut submission = text_submission("t", "inline");
        submission.file = Some(staged);
        ingestor.submit(submission).await.unwrap();

        assert!(dir_entries(&dir).is_empty());
    }

    #[tokio::test]
    async fn test_same_name_same_millisecond_does_not_clobber() {
        let dir = TempDir::new().unwrap();
        let ingestor = ingestor(&dir);

        for (seed, body) in [("one", b"111".as_slice()), ("two", b"222".as_slice())] {
            let staged = ingestor
                .stage_file("same.txt", chunks(body, 8))
                .await
                .unwrap();
            ingestor
                .submit(Submission {
                    seed_code: Some(seed.into()),
                    upload_type: Some("file".into()),
                    file: Some(staged),
                    ..Submission::default()
                })
                .await
                .unwrap();
        }

        let one = ingestor.store.fetch("one").await.unwrap();
        let two = ingestor.store.fetch("two").await.unwrap();
        assert_ne!(one.payload, two.payload);
        assert_eq!(std::fs::read(one.payload.file_path().unwrap()).unwrap(), b"111");
        assert_eq!(std::fs::read(two.payload.file_path().unwrap()).unwrap(), b"222");
    }

    /// Memory backend whose inserts land only after a delay.
    struct SlowInsertStore {
        inner: MemoryRecordStore,
        delay: Duration,
    }

    #[async_trait]
    impl RecordStore for SlowInsertStore {
        async fn insert(&self, record: &ContentRecord) -> anyhow::Result<InsertOutcome> {
            tokio::time::sleep(self.delay).await;
            self.inner.insert(record).await
        }

        async fn get(&self, seed_code: &str) -> anyhow::Result<Option<ContentRecord>> {
            self.inner.get(seed_code).await
        }

        async fn delete(&self, seed_code: &str) -> anyhow::Result<bool> {
            self.inner.delete(seed_code).await
        }

        async fn expired(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<ContentRecord>> {
            self.inner.expired(now).await
        }
    }

    #[tokio::test]
    async fn test_abandoned_submit_keeps_file_of_committed_record() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::custom(SlowInsertStore {
            inner: MemoryRecordStore::new(),
            delay: Duration::from_millis(100),
        });
        let ingestor = Ingestor::new(store.clone(), IngestConfig::new(dir.path()));

        let staged = ingestor
            .stage_file("a.bin", chunks(b"payload", 4))
            .await
            .unwrap();
        let submission = Submission {
            seed_code: Some("late".into()),
            upload_type: Some("file".into()),
            file: Some(staged),
            ..Submission::default()
        };

        // The caller gives up while the insert is still in flight.
        let attempt =
            tokio::time::timeout(Duration::from_millis(20), ingestor.submit(submission)).await;
        assert!(attempt.is_err());

        tokio::time::sleep(Duration::from_millis(300)).await;
        let record = store.fetch("late").await.unwrap();
        let path = record.payload.file_path().unwrap();
        assert!(path.exists(), "{} was removed", path.display());
        assert_eq!(std::fs::read(path).unwrap(), b"payload");
    }

    #[test]
    fn test_parse_metadata() {
        assert_eq!(parse_metadata(None).unwrap(), serde_json::json!({}));
        assert_eq!(parse_metadata(Some("  ")).unwrap(), serde_json::json!({}));
        assert_eq!(
            parse_metadata(Some(r#"{"k":"v"}"#)).unwrap(),
            serde_json::json!({"k": "v"})
        );
        assert!(parse_metadata(Some("nope")).is_err());
    }
}
