// tests/pipeline_test.rs
// Pipeline integration tests: scripted service fakes + in-memory SQLite.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::Connection;

use docpipe::chunker::SemanticChunker;
use docpipe::db::documents::DocumentStore;
use docpipe::db::schema_init::SchemaInitializer;
use docpipe::embedder::{EmbeddingError, EmbeddingProvider};
use docpipe::extractor::{ensure_readable, ExtractError, TextExtractor};
use docpipe::fetcher::{StorageClient, StorageError};
use docpipe::llm::{LlmError, LlmProvider};
use docpipe::pipeline::{Pipeline, PipelineError};
use docpipe::source::{resolve, Visibility};

struct FakeStorage {
    bytes: Vec<u8>,
}

#[async_trait]
impl StorageClient for FakeStorage {
    async fn sign_url(&self, bucket: &str, path: &str) -> Result<String, StorageError> {
        Ok(format!("mock://{}/{}", bucket, path))
    }

    async fn download(&self, _url: &str) -> Result<Vec<u8>, StorageError> {
        Ok(self.bytes.clone())
    }
}

struct FailingStorage;

#[async_trait]
impl StorageClient for FailingStorage {
    async fn sign_url(&self, _bucket: &str, _path: &str) -> Result<String, StorageError> {
        Err(StorageError::SignUrl("storage unavailable".to_string()))
    }

    async fn download(&self, _url: &str) -> Result<Vec<u8>, StorageError> {
        unreachable!("sign_url already failed")
    }
}

/// Treats the downloaded bytes as UTF-8 text, with the same readability
/// threshold as the real PDF extractor.
struct Utf8Extractor;

impl TextExtractor for Utf8Extractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let text = String::from_utf8(bytes.to_vec()).map_err(|_| ExtractError::Unreadable)?;
        ensure_readable(text)
    }
}

struct ScriptedLlm {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedLlm {
    fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, LlmError> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::ConnectionFailed("script exhausted".to_string()))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

struct FakeEmbedder {
    dims: usize,
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|_| vec![0.5; self.dims]).collect())
    }
}

/// Returns one vector too few, violating embedding/chunk parity.
struct ShortEmbedder;

#[async_trait]
impl EmbeddingProvider for ShortEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().skip(1).map(|_| vec![0.5; 3]).collect())
    }
}

fn candidate_json(title: &str, content: &str) -> String {
    format!(
        r#"{{"section_title":"{}","content":"{}","summary":"s","keywords":["k"],"section_level":1,"start_char":0,"end_char":{}}}"#,
        title,
        content,
        content.len().max(1)
    )
}

struct Harness {
    store: DocumentStore,
    conn: Arc<Mutex<Connection>>,
}

impl Harness {
    fn new() -> Self {
        let conn = Connection::open_in_memory().unwrap();
        SchemaInitializer::init(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        Self {
            store: DocumentStore::new(conn.clone()),
            conn,
        }
    }

    fn seed_private(&self, id: &str, path: Option<&str>) {
        self.conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO documents (id, file_path) VALUES (?1, ?2)",
                rusqlite::params![id, path],
            )
            .unwrap();
    }

    fn set_status(&self, id: &str, status: &str) {
        self.conn
            .lock()
            .unwrap()
            .execute(
                "UPDATE documents SET processing_status = ?2 WHERE id = ?1",
                rusqlite::params![id, status],
            )
            .unwrap();
    }

    fn status_of(&self, id: &str) -> (String, Option<String>) {
        let status = self
            .store
            .status(resolve(Visibility::Private), id)
            .unwrap()
            .unwrap();
        (status.processing_status, status.processing_error)
    }

    fn chunk_contents(&self, id: &str) -> Vec<(i64, String, i64, i64, i64)> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT chunk_index, content, tokens, start_char, end_char FROM chunks \
                 WHERE document_id = ?1 ORDER BY chunk_index",
            )
            .unwrap();
        let rows = stmt
            .query_map(rusqlite::params![id], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            })
            .unwrap();
        rows.map(|r| r.unwrap()).collect()
    }

    fn pipeline(
        &self,
        storage: Arc<dyn StorageClient>,
        llm: Arc<dyn LlmProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        max_window_chars: usize,
    ) -> Pipeline {
        Pipeline::new(
            storage,
            Arc::new(Utf8Extractor),
            SemanticChunker::new(llm),
            embedder,
            self.store.clone(),
        )
        .with_max_window_chars(max_window_chars)
    }
}

// 30 chars -> three 10-char windows with max_window_chars = 10.
const THREE_WINDOW_TEXT: &str = "abcdefghijklmnopqrstuvwxyz0123";

#[tokio::test]
async fn test_successful_run_reports_lengths_and_marks_done() {
    let harness = Harness::new();
    harness.seed_private("doc1", Some("reports/doc1.pdf"));

    let llm = Arc::new(ScriptedLlm::new(vec![
        format!("[{}]", candidate_json("W0", "alpha")),
        format!("[{}]", candidate_json("W1", "beta")),
        format!("[{}]", candidate_json("W2", "gamma")),
    ]));
    let pipeline = harness.pipeline(
        Arc::new(FakeStorage {
            bytes: THREE_WINDOW_TEXT.as_bytes().to_vec(),
        }),
        llm,
        Arc::new(FakeEmbedder { dims: 3 }),
        10,
    );

    let report = pipeline.run("doc1", Visibility::Private).await.unwrap();
    assert_eq!(report.extracted_text_length, 30);
    assert_eq!(report.chunks_inserted, 3);

    let (status, error) = harness.status_of("doc1");
    assert_eq!(status, "done");
    assert!(error.is_none());
}

#[tokio::test]
async fn test_partial_tolerance_skips_bad_middle_window() {
    let harness = Harness::new();
    harness.seed_private("doc1", Some("reports/doc1.pdf"));

    let llm = Arc::new(ScriptedLlm::new(vec![
        format!("[{}]", candidate_json("W0", "from window zero")),
        "not json at all".to_string(),
        format!("[{}]", candidate_json("W2", "from window two")),
    ]));
    let pipeline = harness.pipeline(
        Arc::new(FakeStorage {
            bytes: THREE_WINDOW_TEXT.as_bytes().to_vec(),
        }),
        llm,
        Arc::new(FakeEmbedder { dims: 3 }),
        10,
    );

    let report = pipeline.run("doc1", Visibility::Private).await.unwrap();
    assert_eq!(report.chunks_inserted, 2);

    let chunks = harness.chunk_contents("doc1");
    assert_eq!(chunks.len(), 2);
    // Survivors re-indexed gaplessly, window order preserved.
    assert_eq!(chunks[0].0, 0);
    assert_eq!(chunks[0].1, "from window zero");
    assert_eq!(chunks[1].0, 1);
    assert_eq!(chunks[1].1, "from window two");

    assert_eq!(harness.status_of("doc1").0, "done");
}

#[tokio::test]
async fn test_persisted_chunk_invariants() {
    let harness = Harness::new();
    harness.seed_private("doc1", Some("reports/doc1.pdf"));

    let llm = Arc::new(ScriptedLlm::new(vec![format!(
        "[{},{}]",
        candidate_json("A", "five!"),
        candidate_json("B", "exactly eight")
    )]));
    let pipeline = harness.pipeline(
        Arc::new(FakeStorage {
            bytes: "a text long enough to pass the readability check".into(),
        }),
        llm,
        Arc::new(FakeEmbedder { dims: 3 }),
        12_000,
    );

    pipeline.run("doc1", Visibility::Private).await.unwrap();

    for (index, content, tokens, start_char, end_char) in harness.chunk_contents("doc1") {
        assert!(index >= 0);
        assert_eq!(tokens, (content.len() as i64 + 3) / 4);
        assert!(start_char < end_char);
    }
}

#[tokio::test]
async fn test_short_text_fails_whole_document() {
    let harness = Harness::new();
    harness.seed_private("doc1", Some("reports/doc1.pdf"));

    let pipeline = harness.pipeline(
        Arc::new(FakeStorage {
            bytes: b"ten chars.".to_vec(),
        }),
        Arc::new(ScriptedLlm::new(vec![])),
        Arc::new(FakeEmbedder { dims: 3 }),
        10,
    );

    let err = pipeline.run("doc1", Visibility::Private).await.unwrap_err();
    assert!(matches!(err, PipelineError::Upstream(_)));

    let (status, error) = harness.status_of("doc1");
    assert_eq!(status, "error");
    assert_eq!(error.as_deref(), Some("Text too short or unreadable"));
    assert!(harness.chunk_contents("doc1").is_empty());
}

#[tokio::test]
async fn test_embedding_parity_violation_aborts_with_no_rows() {
    let harness = Harness::new();
    harness.seed_private("doc1", Some("reports/doc1.pdf"));

    let llm = Arc::new(ScriptedLlm::new(vec![format!(
        "[{},{}]",
        candidate_json("A", "first"),
        candidate_json("B", "second")
    )]));
    let pipeline = harness.pipeline(
        Arc::new(FakeStorage {
            bytes: "a text long enough to pass the readability check".into(),
        }),
        llm,
        Arc::new(ShortEmbedder),
        12_000,
    );

    let err = pipeline.run("doc1", Visibility::Private).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::EmbeddingMismatch {
            expected: 2,
            got: 1
        }
    ));

    assert_eq!(harness.status_of("doc1").0, "error");
    assert!(harness.chunk_contents("doc1").is_empty());
}

#[tokio::test]
async fn test_all_windows_failing_still_succeeds_with_zero_chunks() {
    let harness = Harness::new();
    harness.seed_private("doc1", Some("reports/doc1.pdf"));

    let llm = Arc::new(ScriptedLlm::new(vec![
        "nope".to_string(),
        "still nope".to_string(),
        "never".to_string(),
    ]));
    let pipeline = harness.pipeline(
        Arc::new(FakeStorage {
            bytes: THREE_WINDOW_TEXT.as_bytes().to_vec(),
        }),
        llm,
        Arc::new(FakeEmbedder { dims: 3 }),
        10,
    );

    let report = pipeline.run("doc1", Visibility::Private).await.unwrap();
    assert_eq!(report.chunks_inserted, 0);
    assert_eq!(harness.status_of("doc1").0, "done");
}

#[tokio::test]
async fn test_reprocess_replaces_prior_chunks() {
    let harness = Harness::new();
    harness.seed_private("doc1", Some("reports/doc1.pdf"));

    let storage = || {
        Arc::new(FakeStorage {
            bytes: "a text long enough to pass the readability check".into(),
        })
    };
    let script = || {
        Arc::new(ScriptedLlm::new(vec![format!(
            "[{},{}]",
            candidate_json("A", "first"),
            candidate_json("B", "second")
        )]))
    };

    let first = harness.pipeline(storage(), script(), Arc::new(FakeEmbedder { dims: 3 }), 12_000);
    first.run("doc1", Visibility::Private).await.unwrap();
    let first_chunks = harness.chunk_contents("doc1");

    let second = harness.pipeline(storage(), script(), Arc::new(FakeEmbedder { dims: 3 }), 12_000);
    second.run("doc1", Visibility::Private).await.unwrap();
    let second_chunks = harness.chunk_contents("doc1");

    // Identical responses produce an identical chunk set, not an appended one.
    assert_eq!(first_chunks, second_chunks);
    assert_eq!(second_chunks.len(), 2);
}

#[tokio::test]
async fn test_missing_document_is_not_found_and_leaves_status_alone() {
    let harness = Harness::new();

    let pipeline = harness.pipeline(
        Arc::new(FailingStorage),
        Arc::new(ScriptedLlm::new(vec![])),
        Arc::new(FakeEmbedder { dims: 3 }),
        10,
    );

    let err = pipeline.run("ghost", Visibility::Private).await.unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)));
}

#[tokio::test]
async fn test_pathless_document_is_not_found() {
    let harness = Harness::new();
    harness.seed_private("doc1", None);

    let pipeline = harness.pipeline(
        Arc::new(FailingStorage),
        Arc::new(ScriptedLlm::new(vec![])),
        Arc::new(FakeEmbedder { dims: 3 }),
        10,
    );

    let err = pipeline.run("doc1", Visibility::Private).await.unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)));
    assert_eq!(harness.status_of("doc1").0, "idle");
}

#[tokio::test]
async fn test_empty_document_id_is_input_error() {
    let harness = Harness::new();
    let pipeline = harness.pipeline(
        Arc::new(FailingStorage),
        Arc::new(ScriptedLlm::new(vec![])),
        Arc::new(FakeEmbedder { dims: 3 }),
        10,
    );

    let err = pipeline.run("  ", Visibility::Private).await.unwrap_err();
    assert!(matches!(err, PipelineError::Input(_)));
}

#[tokio::test]
async fn test_concurrent_run_is_rejected() {
    let harness = Harness::new();
    harness.seed_private("doc1", Some("reports/doc1.pdf"));
    harness.set_status("doc1", "processing");

    let pipeline = harness.pipeline(
        Arc::new(FailingStorage),
        Arc::new(ScriptedLlm::new(vec![])),
        Arc::new(FakeEmbedder { dims: 3 }),
        10,
    );

    let err = pipeline.run("doc1", Visibility::Private).await.unwrap_err();
    assert!(matches!(err, PipelineError::AlreadyProcessing(_)));
    assert_eq!(harness.status_of("doc1").0, "processing");
}

#[tokio::test]
async fn test_storage_failure_marks_error() {
    let harness = Harness::new();
    harness.seed_private("doc1", Some("reports/doc1.pdf"));

    let pipeline = harness.pipeline(
        Arc::new(FailingStorage),
        Arc::new(ScriptedLlm::new(vec![])),
        Arc::new(FakeEmbedder { dims: 3 }),
        10,
    );

    let err = pipeline.run("doc1", Visibility::Private).await.unwrap_err();
    assert!(matches!(err, PipelineError::Upstream(_)));

    let (status, error) = harness.status_of("doc1");
    assert_eq!(status, "error");
    assert!(error.unwrap().contains("storage unavailable"));
}
