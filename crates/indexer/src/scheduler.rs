use crate::deep::DeepProcessor;
use crate::fast::FastProcessor;
use crate::state_manager::StateManager;
use context_protocol::{FileRecord, Settings};
use context_storage::Storage;
use log::warn;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

/// How many consecutive failures a file may accumulate before the
/// scheduler stops retrying it (it stays at stage `-1` until something
/// external — a re-upsert, a settings change — resets it, §4.6).
const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Default bound on files processed concurrently, mirroring the
/// teacher's `MAX_CONCURRENT` batching constant.
const DEFAULT_CONCURRENCY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    Running,
    Paused,
    Stopped,
}

/// Drives the fast and deep processors over the pending-file queues
/// (§4.6 C6): bounded concurrency, fast-before-deep priority, oldest-first
/// within each queue, bounded consecutive-failure retry, and mutual
/// exclusion between fast and deep work on the same file.
pub struct IndexerScheduler {
    storage: Arc<Storage>,
    fast: Arc<FastProcessor>,
    deep: Arc<DeepProcessor>,
    state: Arc<StateManager>,
    settings: Arc<Mutex<Settings>>,
    concurrency: usize,
    max_consecutive_failures: u32,
    mode: watch::Sender<RunMode>,
    failure_counts: Mutex<HashMap<String, u32>>,
    in_flight: Mutex<std::collections::HashSet<String>>,
    stop_requested: AtomicBool,
}

impl IndexerScheduler {
    #[must_use]
    pub fn new(
        storage: Arc<Storage>,
        fast: Arc<FastProcessor>,
        deep: Arc<DeepProcessor>,
        state: Arc<StateManager>,
        settings: Arc<Mutex<Settings>>,
    ) -> Arc<Self> {
        let (mode, _) = watch::channel(RunMode::Paused);
        Arc::new(Self {
            storage,
            fast,
            deep,
            state,
            settings,
            concurrency: DEFAULT_CONCURRENCY,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            mode,
            failure_counts: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(std::collections::HashSet::new()),
            stop_requested: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn with_limits(
        storage: Arc<Storage>,
        fast: Arc<FastProcessor>,
        deep: Arc<DeepProcessor>,
        state: Arc<StateManager>,
        settings: Arc<Mutex<Settings>>,
        concurrency: usize,
        max_consecutive_failures: u32,
    ) -> Arc<Self> {
        let (mode, _) = watch::channel(RunMode::Paused);
        Arc::new(Self {
            storage,
            fast,
            deep,
            state,
            settings,
            concurrency: concurrency.max(1),
            max_consecutive_failures,
            mode,
            failure_counts: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(std::collections::HashSet::new()),
            stop_requested: AtomicBool::new(false),
        })
    }

    /// Spawns the scheduling loop in the background. Returns immediately;
    /// call `stop` to end it.
    pub fn start(self: &Arc<Self>) {
        let _ = self.mode.send(RunMode::Running);
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            scheduler.run_loop().await;
        });
    }

    pub fn pause(&self) {
        let _ = self.mode.send(RunMode::Paused);
    }

    pub fn resume(&self) {
        let _ = self.mode.send(RunMode::Running);
    }

    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        let _ = self.mode.send(RunMode::Stopped);
    }

    /// Resets the retry counter for a file, allowing the scheduler to
    /// pick it back up even though it sits at stage `-1`.
    pub fn clear_failure(&self, file_id: &str) {
        self.failure_counts.lock().expect("not poisoned").remove(file_id);
    }

    #[must_use]
    pub fn status(&self) -> Arc<context_protocol::IndexingState> {
        self.state.status()
    }

    async fn run_loop(self: Arc<Self>) {
        let mut receiver = self.mode.subscribe();
        loop {
            if self.stop_requested.load(Ordering::SeqCst) {
                return;
            }
            if *receiver.borrow() != RunMode::Running {
                if receiver.changed().await.is_err() {
                    return;
                }
                continue;
            }

            let drained = self.run_one_sweep().await;
            if !drained {
                tokio::select! {
                    _ = tokio::time::sleep(std::time::Duration::from_millis(500)) => {}
                    result = receiver.changed() => {
                        if result.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Runs one bounded-concurrency batch each of pending fast work, then
    /// pending deep work. Pause takes effect only between sweeps, so
    /// in-flight files always finish their current stage (§4.6 "pause
    /// completes in-flight work first").
    ///
    /// Returns whether any work was found.
    async fn run_one_sweep(self: &Arc<Self>) -> bool {
        let fast_candidates = self.storage.list_pending_fast().unwrap_or_default();
        let ran_fast = self.run_batch(fast_candidates, Stage::Fast).await;

        if *self.mode.subscribe().borrow() != RunMode::Running {
            return ran_fast;
        }

        let deep_candidates = self.storage.list_pending_deep().unwrap_or_default();
        let ran_deep = self.run_batch(deep_candidates, Stage::Deep).await;

        ran_fast || ran_deep
    }

    async fn run_batch(self: &Arc<Self>, candidates: Vec<FileRecord>, stage: Stage) -> bool {
        let eligible: Vec<FileRecord> = candidates
            .into_iter()
            .filter(|file| self.is_eligible(file))
            .collect();
        if eligible.is_empty() {
            return false;
        }

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for file in eligible {
            {
                let mut in_flight = self.in_flight.lock().expect("not poisoned");
                if !in_flight.insert(file.file_id.clone()) {
                    continue;
                }
            }

            let permit = Arc::clone(&semaphore).acquire_owned().await.expect("semaphore open");
            let scheduler = Arc::clone(self);
            let file_id = file.file_id.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let settings = scheduler.settings.lock().expect("not poisoned").clone();
                let result = match stage {
                    Stage::Fast => scheduler.fast.process(&file_id, &settings).await,
                    Stage::Deep => scheduler.deep.process(&file_id, &settings).await,
                };
                scheduler.in_flight.lock().expect("not poisoned").remove(&file_id);
                scheduler.record_outcome(&file_id, result.is_ok());
                if let Err(err) = result {
                    warn!("{stage:?} processing failed for {file_id}: {err}");
                }
            });
        }

        while tasks.join_next().await.is_some() {}
        true
    }

    fn is_eligible(&self, file: &FileRecord) -> bool {
        let failures = self
            .failure_counts
            .lock()
            .expect("not poisoned")
            .get(&file.file_id)
            .copied()
            .unwrap_or(0);
        failures < self.max_consecutive_failures
    }

    fn record_outcome(&self, file_id: &str, success: bool) {
        let mut failures = self.failure_counts.lock().expect("not poisoned");
        if success {
            failures.remove(file_id);
        } else {
            *failures.entry(file_id.to_string()).or_insert(0) += 1;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Fast,
    Deep,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_manager::StateManager;
    use context_chunker::{Chunker, ChunkerConfig};
    use context_clients::{ClientError, EmbeddingClient, VisionClient};
    use context_content::ContentRouter;
    use context_protocol::FileKind;
    use context_vector_store::InMemoryVectorStore;
    use std::io::Write;
    use tempfile::NamedTempFile;

    struct StubEmbeddingClient;

    #[async_trait::async_trait]
    impl EmbeddingClient for StubEmbeddingClient {
        async fn encode(&self, texts: &[String]) -> context_clients::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.5; 3]).collect())
        }
    }

    struct StubVisionClient;

    #[async_trait::async_trait]
    impl VisionClient for StubVisionClient {
        async fn describe_image(&self, _image: &[u8], _prompt: &str) -> context_clients::Result<String> {
            Err(ClientError::Decode("unused in this test".to_string()))
        }
    }

    fn make_scheduler(storage: Arc<Storage>) -> Arc<IndexerScheduler> {
        let state = Arc::new(StateManager::new());
        let fast = Arc::new(FastProcessor::new(
            storage.clone(),
            Arc::new(ContentRouter::with_defaults()),
            Arc::new(Chunker::new(ChunkerConfig::new(10, 2).unwrap())),
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(StubEmbeddingClient),
            state.clone(),
        ));
        let deep = Arc::new(DeepProcessor::new(
            storage.clone(),
            Arc::new(ContentRouter::with_defaults()),
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(StubEmbeddingClient),
            Arc::new(StubVisionClient),
            state.clone(),
        ));
        IndexerScheduler::new(
            storage,
            fast,
            deep,
            state,
            Arc::new(Mutex::new(Settings::default())),
        )
    }

    #[tokio::test]
    async fn sweep_processes_pending_fast_file() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(tmp, "some body text here").unwrap();
        let record = FileRecord::new("f1", tmp.path().to_str().unwrap(), FileKind::Text);
        storage.upsert_file(&record).unwrap();

        let scheduler = make_scheduler(storage.clone());
        let drained = scheduler.run_one_sweep().await;
        assert!(drained);

        let updated = storage.get_file("f1").unwrap().unwrap();
        assert_eq!(updated.fast_stage, context_protocol::STAGE_EMBEDDED);
    }

    #[tokio::test]
    async fn repeated_failures_stop_retrying_after_the_limit() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let record = FileRecord::new("f1", "/does/not/exist.txt", FileKind::Text);
        storage.upsert_file(&record).unwrap();

        let scheduler = make_scheduler(storage.clone());
        for _ in 0..DEFAULT_MAX_CONSECUTIVE_FAILURES {
            storage.update_fast_stage("f1", 0, None, false).unwrap();
            scheduler.run_one_sweep().await;
        }
        assert_eq!(
            *scheduler.failure_counts.lock().unwrap().get("f1").unwrap(),
            DEFAULT_MAX_CONSECUTIVE_FAILURES
        );

        storage.update_fast_stage("f1", 0, None, false).unwrap();
        let drained = scheduler.run_one_sweep().await;
        assert!(!drained);
    }

    #[tokio::test]
    async fn clearing_failure_allows_retry_again() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let record = FileRecord::new("f1", "/does/not/exist.txt", FileKind::Text);
        storage.upsert_file(&record).unwrap();

        let scheduler = make_scheduler(storage.clone());
        for _ in 0..DEFAULT_MAX_CONSECUTIVE_FAILURES {
            storage.update_fast_stage("f1", 0, None, false).unwrap();
            scheduler.run_one_sweep().await;
        }
        scheduler.clear_failure("f1");
        storage.update_fast_stage("f1", 0, None, false).unwrap();
        let drained = scheduler.run_one_sweep().await;
        assert!(drained);
    }
}
