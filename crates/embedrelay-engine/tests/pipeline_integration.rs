//! End-to-end pipeline tests over real SQLite backends and a filesystem
//! artifact container, with the sink replaced by an in-process recorder.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use embedrelay_engine::artifact_store::{ArtifactStore, FsArtifactStore};
use embedrelay_engine::dead_letter::DeadLetterHandler;
use embedrelay_engine::scanner::Scanner;
use embedrelay_engine::signer::{Credentials, RequestSigner, SignedHeaders};
use embedrelay_engine::sink::VectorSink;
use embedrelay_engine::status::StatusResolver;
use embedrelay_engine::worker::Worker;
use embedrelay_queue::{Delivery, QueueError, SqliteTaskQueue, TaskQueue};
use embedrelay_state::{SqliteStateStore, StateStore};
use embedrelay_types::document::UpsertChunk;
use embedrelay_types::error::TaskError;
use embedrelay_types::id::{ChunkId, DocumentId, PipelineId};
use embedrelay_types::record::{DocumentStatus, FailureStatus};
use embedrelay_types::task::ProcessingTask;
use serde_json::json;

fn doc_hash(seed: u8) -> String {
    format!("{seed:02x}").repeat(32)
}

fn artifact_key(day: u8, seed: u8) -> String {
    format!("2024-03-{day:02}T00:00:00.000Z-{}.json", doc_hash(seed))
}

/// Write a status artifact plus its chunk text/vector objects into the
/// container. Each document gets `chunk_count` chunks of 3-float vectors.
fn write_document(root: &std::path::Path, day: u8, seed: u8, chunk_count: u32) -> String {
    let hash = doc_hash(seed);
    let mut references = Vec::new();
    for i in 0..chunk_count {
        let content_ref = format!("chunks/{hash}/{i}.txt");
        let vector_ref = format!("vectors/{hash}/{i}.json");
        let content_path = root.join(&content_ref);
        std::fs::create_dir_all(content_path.parent().unwrap()).unwrap();
        std::fs::write(&content_path, format!("chunk {i} of {hash}")).unwrap();
        let vector_path = root.join(&vector_ref);
        std::fs::create_dir_all(vector_path.parent().unwrap()).unwrap();
        std::fs::write(&vector_path, "[0.1, 0.2, 0.3]").unwrap();
        references.push(json!({
            "chunk_id": format!("{hash}#{i}"),
            "chunk_index": i,
            "content_ref": content_ref,
            "vector_ref": vector_ref,
        }));
    }
    let key = artifact_key(day, seed);
    let doc = json!({
        "document_id": hash,
        "processing_id": format!("run-{seed}"),
        "original_document_ref": format!("originals/{hash}.pdf"),
        "summary": {
            "total_chunks": chunk_count,
            "model": "text-embed-small",
            "total_tokens": 128,
        },
        "chunk_references": references,
    });
    std::fs::write(root.join(&key), serde_json::to_vec(&doc).unwrap()).unwrap();
    key
}

/// Sink double that records upserts keyed by chunk id, mirroring the real
/// sink's idempotency contract.
#[derive(Default)]
struct RecordingSink {
    upserted: Mutex<HashMap<ChunkId, UpsertChunk>>,
    calls: AtomicUsize,
}

impl RecordingSink {
    fn chunk_count(&self) -> usize {
        self.upserted.lock().unwrap().len()
    }
}

#[async_trait]
impl VectorSink for RecordingSink {
    async fn upsert(
        &self,
        chunks: &[UpsertChunk],
        headers: &SignedHeaders,
    ) -> Result<serde_json::Value, TaskError> {
        assert!(headers.authorization.contains("ER1-HMAC-SHA256"));
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut upserted = self.upserted.lock().unwrap();
        for chunk in chunks {
            upserted.insert(chunk.chunk_id.clone(), chunk.clone());
        }
        Ok(json!({ "upserted": chunks.len() }))
    }
}

/// Queue wrapper that injects an enqueue failure at a fixed position.
struct FlakyQueue {
    inner: SqliteTaskQueue,
    enqueues: AtomicUsize,
    fail_at: usize,
}

impl FlakyQueue {
    fn new(inner: SqliteTaskQueue, fail_at: usize) -> Self {
        Self {
            inner,
            enqueues: AtomicUsize::new(0),
            fail_at,
        }
    }
}

impl TaskQueue for FlakyQueue {
    fn enqueue(&self, task: &ProcessingTask) -> Result<(), QueueError> {
        let n = self.enqueues.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_at {
            return Err(QueueError::Io(std::io::Error::other(
                "synthetic enqueue failure",
            )));
        }
        self.inner.enqueue(task)
    }

    fn receive(&self, max_items: usize) -> Result<Vec<Delivery>, QueueError> {
        self.inner.receive(max_items)
    }

    fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.inner.ack(delivery)
    }

    fn fail(&self, delivery: &Delivery, retry_delay: Duration) -> Result<(), QueueError> {
        self.inner.fail(delivery, retry_delay)
    }

    fn receive_dead_letters(&self, max_items: usize) -> Result<Vec<Delivery>, QueueError> {
        self.inner.receive_dead_letters(max_items)
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    pipeline: PipelineId,
    artifacts: Arc<dyn ArtifactStore>,
    queue: Arc<dyn TaskQueue>,
    state: Arc<dyn StateStore>,
    sink: Arc<RecordingSink>,
    root: std::path::PathBuf,
}

fn harness(queue: Option<Arc<dyn TaskQueue>>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let queue = queue.unwrap_or_else(|| {
        Arc::new(SqliteTaskQueue::in_memory(Duration::ZERO, 3).unwrap())
    });
    Harness {
        pipeline: PipelineId::new("relay-test"),
        artifacts: Arc::new(FsArtifactStore::new(&root)),
        queue,
        state: Arc::new(SqliteStateStore::in_memory().unwrap()),
        sink: Arc::new(RecordingSink::default()),
        root,
        _dir: dir,
    }
}

impl Harness {
    fn scanner(&self) -> Scanner {
        Scanner::new(
            self.pipeline.clone(),
            self.root.display().to_string(),
            25,
            Arc::clone(&self.artifacts),
            Arc::clone(&self.queue),
            Arc::clone(&self.state),
        )
    }

    fn worker(&self) -> Arc<Worker> {
        let credentials = Credentials {
            access_key_id: "AKIDTEST".into(),
            secret_access_key: "test-secret".into(),
            session_token: Some("test-session".into()),
        };
        let signer =
            Arc::new(RequestSigner::new(credentials, "https://sink.test/whoami").unwrap());
        Arc::new(Worker::new(
            self.pipeline.clone(),
            25,
            2,
            Arc::clone(&self.artifacts),
            Arc::clone(&self.queue),
            Arc::clone(&self.state),
            signer,
            Arc::clone(&self.sink) as Arc<dyn VectorSink>,
            "https://sink.test/upsert",
        ))
    }

    fn dead_letter(&self) -> DeadLetterHandler {
        DeadLetterHandler::new(
            self.pipeline.clone(),
            25,
            Arc::clone(&self.queue),
            Arc::clone(&self.state),
        )
    }
}

#[tokio::test]
async fn scanner_enqueues_valid_keys_in_order_and_checkpoints() {
    let h = harness(None);
    // Written out of chronological order; listing sorts, parsing filters.
    let key3 = write_document(&h.root, 3, 3, 1);
    let key1 = write_document(&h.root, 1, 1, 1);
    let key2 = write_document(&h.root, 2, 2, 1);
    std::fs::write(h.root.join("notes.txt"), "not an artifact").unwrap();

    let outcome = h.scanner().run_once().await.unwrap();
    assert_eq!(outcome.candidates, 3);
    assert_eq!(outcome.enqueued, 3);
    assert!(outcome.checkpoint_advanced);

    let deliveries = h.queue.receive(10).unwrap();
    let keys: Vec<&str> = deliveries
        .iter()
        .map(|d| d.task.artifact_key.as_str())
        .collect();
    assert_eq!(keys, vec![key1.as_str(), key2.as_str(), key3.as_str()]);

    let cp = h.state.get_checkpoint(&h.pipeline).unwrap().unwrap();
    assert_eq!(cp.last_processed_key, key3);

    // A second scan with nothing new enqueues nothing.
    let outcome = h.scanner().run_once().await.unwrap();
    assert_eq!(outcome.enqueued, 0);
}

#[tokio::test]
async fn enqueue_failure_caps_checkpoint_at_last_success() {
    let inner = SqliteTaskQueue::in_memory(Duration::ZERO, 3).unwrap();
    let flaky: Arc<dyn TaskQueue> = Arc::new(FlakyQueue::new(inner, 2));
    let h = harness(Some(flaky));
    let key1 = write_document(&h.root, 1, 1, 1);
    let key2 = write_document(&h.root, 2, 2, 1);
    let key3 = write_document(&h.root, 3, 3, 1);

    // Second enqueue fails; the scan reports the error but the checkpoint
    // still covers the first key.
    assert!(h.scanner().run_once().await.is_err());
    let cp = h.state.get_checkpoint(&h.pipeline).unwrap().unwrap();
    assert_eq!(cp.last_processed_key, key1);

    // The next scan resumes past the checkpoint and picks up the rest.
    let outcome = h.scanner().run_once().await.unwrap();
    assert_eq!(outcome.enqueued, 2);
    let keys: Vec<String> = h
        .queue
        .receive(10)
        .unwrap()
        .iter()
        .map(|d| d.task.artifact_key.as_str().to_string())
        .collect();
    assert!(keys.contains(&key2));
    assert!(keys.contains(&key3));
    let cp = h.state.get_checkpoint(&h.pipeline).unwrap().unwrap();
    assert_eq!(cp.last_processed_key, key3);
}

#[tokio::test]
async fn worker_delivers_batch_and_isolates_bad_task() {
    let h = harness(None);
    for seed in 1..=5u8 {
        write_document(&h.root, seed, seed, 2);
    }
    // Corrupt document 3's vectors: empty arrays fail validation.
    let bad_hash = doc_hash(3);
    std::fs::write(h.root.join(format!("vectors/{bad_hash}/0.json")), "[]").unwrap();
    std::fs::write(h.root.join(format!("vectors/{bad_hash}/1.json")), "[]").unwrap();

    h.scanner().run_once().await.unwrap();
    let outcome = h.worker().run_once().await.unwrap();
    assert_eq!(outcome.received, 5);
    assert_eq!(outcome.succeeded, 4);
    assert_eq!(outcome.failed, 1);

    // Four documents of two chunks each reached the sink.
    assert_eq!(h.sink.chunk_count(), 8);

    // The bad task is held back by its retry backoff, then redelivered
    // alone on its second attempt.
    assert!(h.queue.receive(10).unwrap().is_empty());
    tokio::time::sleep(Duration::from_millis(150)).await;
    let deliveries = h.queue.receive(10).unwrap();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].attempt, 2);
    assert_eq!(deliveries[0].task.artifact_key.hash_str(), bad_hash);

    // Successful documents have completed metadata records.
    let record = h
        .state
        .latest_metadata(&DocumentId::new(doc_hash(1)))
        .unwrap()
        .unwrap();
    assert_eq!(record.status, DocumentStatus::Completed);
    assert_eq!(record.summary.total_chunks, 2);

    // Delivered source artifacts were cleaned up; the failed one remains.
    assert!(!h.root.join(artifact_key(1, 1)).exists());
    assert!(h.root.join(artifact_key(3, 3)).exists());
}

#[tokio::test]
async fn unusable_chunk_is_skipped_and_the_rest_delivered() {
    let h = harness(None);
    write_document(&h.root, 1, 4, 3);
    // Chunk 1's vector object is not a float array; that chunk is dropped
    // but the document still goes out.
    let hash = doc_hash(4);
    std::fs::write(h.root.join(format!("vectors/{hash}/1.json")), "oops").unwrap();

    h.scanner().run_once().await.unwrap();
    let outcome = h.worker().run_once().await.unwrap();
    assert_eq!(outcome.succeeded, 1);
    assert_eq!(outcome.failed, 0);

    // Two of three chunks reached the sink, indices 0 and 2.
    assert_eq!(h.sink.chunk_count(), 2);
    let upserted = h.sink.upserted.lock().unwrap();
    let mut indices: Vec<u32> = upserted.values().map(|c| c.metadata.chunk_index).collect();
    indices.sort_unstable();
    assert_eq!(indices, vec![0, 2]);
    drop(upserted);

    // The task is acked and the document recorded as completed.
    let record = h
        .state
        .latest_metadata(&DocumentId::new(hash))
        .unwrap()
        .unwrap();
    assert_eq!(record.status, DocumentStatus::Completed);
    assert!(h.queue.receive(10).unwrap().is_empty());
    assert!(!h.root.join(artifact_key(1, 4)).exists());
}

#[tokio::test]
async fn document_with_no_usable_chunks_fails_without_sink_call() {
    let h = harness(None);
    write_document(&h.root, 1, 6, 2);
    // Every chunk loses its text object, so nothing can be assembled.
    let hash = doc_hash(6);
    std::fs::remove_file(h.root.join(format!("chunks/{hash}/0.txt"))).unwrap();
    std::fs::remove_file(h.root.join(format!("chunks/{hash}/1.txt"))).unwrap();

    h.scanner().run_once().await.unwrap();
    let outcome = h.worker().run_once().await.unwrap();
    assert_eq!(outcome.succeeded, 0);
    assert_eq!(outcome.failed, 1);

    // The sink was never called and no metadata was recorded; the source
    // artifact survives for the retry.
    assert_eq!(h.sink.calls.load(Ordering::SeqCst), 0);
    assert!(h
        .state
        .latest_metadata(&DocumentId::new(hash))
        .unwrap()
        .is_none());
    assert!(h.root.join(artifact_key(1, 6)).exists());
}

#[tokio::test]
async fn redelivered_document_upserts_same_chunk_ids() {
    let h = harness(None);
    let key = write_document(&h.root, 1, 7, 2);
    h.scanner().run_once().await.unwrap();
    let worker = h.worker();
    assert_eq!(worker.run_once().await.unwrap().succeeded, 1);

    // Simulate a redelivery after a lost ack: the artifact reappears and
    // is enqueued again.
    write_document(&h.root, 1, 7, 2);
    let task = ProcessingTask::new(
        embedrelay_types::artifact::ArtifactKey::parse(&key).unwrap(),
        h.root.display().to_string(),
    );
    h.queue.enqueue(&task).unwrap();
    assert_eq!(worker.run_once().await.unwrap().succeeded, 1);

    // Two sink calls, but chunk-id keying leaves one entry per chunk.
    assert_eq!(h.sink.calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.sink.chunk_count(), 2);
}

#[tokio::test]
async fn exhausted_task_converges_to_one_failure_record() {
    let h = harness(None);
    let key = artifact_key(1, 9);
    std::fs::write(h.root.join(&key), "not json at all").unwrap();

    h.scanner().run_once().await.unwrap();
    let worker = h.worker();
    for attempt in 1..=3u32 {
        let outcome = worker.run_once().await.unwrap();
        assert_eq!(outcome.failed, 1);
        // Wait out the doubling retry backoff before the next attempt.
        tokio::time::sleep(Duration::from_millis(150 * u64::from(attempt))).await;
    }
    // Attempts exhausted: nothing left on the work channel.
    assert_eq!(worker.run_once().await.unwrap().received, 0);

    let drained = h.dead_letter().run_once().await.unwrap();
    assert_eq!(drained.received, 1);
    assert_eq!(drained.recorded, 1);

    // The key parses, so the document id is recovered from its hash.
    let failure = h
        .state
        .latest_failure(&DocumentId::new(doc_hash(9)))
        .unwrap()
        .unwrap();
    assert_eq!(failure.error_details.attempt_count, 3);
    assert_eq!(failure.status, FailureStatus::Logged);

    // A second drain finds the channel empty: exactly one record.
    let drained = h.dead_letter().run_once().await.unwrap();
    assert_eq!(drained.received, 0);
}

#[tokio::test]
async fn status_resolver_tracks_document_lifecycle() {
    let h = harness(None);
    let resolver = StatusResolver::new(Arc::clone(&h.state), Arc::clone(&h.artifacts));

    let unknown = resolver.resolve(&DocumentId::new(doc_hash(5))).await.unwrap();
    assert_eq!(unknown.status, DocumentStatus::Pending);

    write_document(&h.root, 1, 5, 1);
    let awaiting = resolver.resolve(&DocumentId::new(doc_hash(5))).await.unwrap();
    assert_eq!(awaiting.status, DocumentStatus::Processing);

    h.scanner().run_once().await.unwrap();
    h.worker().run_once().await.unwrap();
    let done = resolver.resolve(&DocumentId::new(doc_hash(5))).await.unwrap();
    assert_eq!(done.status, DocumentStatus::Completed);
    assert!(done.metadata.is_some());
}
