use crate::error::Result;
use context_protocol::{FileKind, FileRecord, STAGE_PENDING};
use context_storage::Storage;
use ignore::WalkBuilder;
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time;

/// How long to wait after the last filesystem event before re-scanning,
/// and the hard ceiling on how long a burst of events can postpone a
/// scan — the same two-knob shape as the teacher's `DebounceState`.
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryConfig {
    pub debounce: Duration,
    pub max_batch_wait: Duration,
    pub poll_interval: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(750),
            max_batch_wait: Duration::from_secs(3),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Watches a root directory and registers new or changed files into
/// storage at stage 0, where the scheduler's pending-file queues pick
/// them up (§4.6). Simplified from the teacher's multi-model watcher:
/// one root, one storage backend, no health telemetry.
pub struct FileDiscovery {
    root: PathBuf,
    storage: Arc<Storage>,
    config: DiscoveryConfig,
}

impl FileDiscovery {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, storage: Arc<Storage>, config: DiscoveryConfig) -> Self {
        Self {
            root: root.into(),
            storage,
            config,
        }
    }

    /// Walks the tree once synchronously, registering every file not yet
    /// known to storage. Call this before `watch` to seed the backlog.
    pub fn initial_scan(&self) -> Result<usize> {
        self.scan()
    }

    /// Spawns the notify-backed watch loop in the background.
    pub fn watch(self: Arc<Self>) -> Result<RecommendedWatcher> {
        let (tx, rx) = mpsc::channel(256);
        let root = self.root.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.blocking_send(res);
            },
            NotifyConfig::default().with_poll_interval(self.config.poll_interval),
        )
        .map_err(|e| crate::error::IndexerError::Watcher(e.to_string()))?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| crate::error::IndexerError::Watcher(e.to_string()))?;

        let discovery = Arc::clone(&self);
        tokio::spawn(async move {
            discovery.debounce_loop(rx).await;
        });

        Ok(watcher)
    }

    async fn debounce_loop(self: Arc<Self>, mut events: mpsc::Receiver<notify::Result<Event>>) {
        let mut last_event: Option<Instant> = None;
        let mut burst_start: Option<Instant> = None;

        loop {
            let deadline = last_event.map(|t| t + self.config.debounce);
            tokio::select! {
                Some(event) = events.recv() => {
                    if event.is_ok() {
                        let now = Instant::now();
                        last_event = Some(now);
                        burst_start.get_or_insert(now);
                    }
                }
                () = async {
                    if let Some(deadline) = deadline {
                        time::sleep_until(deadline.into()).await;
                    }
                }, if deadline.is_some() => {
                    if let Err(err) = self.scan() {
                        log::warn!("discovery scan failed: {err}");
                    }
                    last_event = None;
                    burst_start = None;
                }
                else => return,
            }

            if let (Some(start), Some(_)) = (burst_start, last_event) {
                if start.elapsed() >= self.config.max_batch_wait {
                    if let Err(err) = self.scan() {
                        log::warn!("discovery scan failed: {err}");
                    }
                    last_event = None;
                    burst_start = None;
                }
            }
        }
    }

    fn scan(&self) -> Result<usize> {
        let mut registered = 0usize;
        let mut pending: VecDeque<PathBuf> = VecDeque::new();

        for entry in WalkBuilder::new(&self.root).hidden(false).build() {
            let Ok(entry) = entry else { continue };
            if entry.file_type().is_some_and(|ft| ft.is_file()) {
                pending.push_back(entry.into_path());
            }
        }

        while let Some(path) = pending.pop_front() {
            if self.register_path(&path)? {
                registered += 1;
            }
        }

        Ok(registered)
    }

    /// Registers one path if it is new, or resets it to stage 0 if its
    /// mtime has moved past the last recorded fast-round timestamp.
    /// Returns whether a (re)registration happened.
    fn register_path(&self, path: &Path) -> Result<bool> {
        let file_id = file_id_for_path(path);
        let existing = self.storage.get_file(&file_id)?;

        let modified = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .map(chrono::DateTime::<chrono::Utc>::from);

        match existing {
            None => {
                let kind = classify_kind(path);
                let record = FileRecord::new(file_id, path.to_string_lossy(), kind);
                self.storage.upsert_file(&record)?;
                Ok(true)
            }
            Some(mut record) => {
                let stale = match (modified, record.fast_text_at) {
                    (Some(modified), Some(last_text_at)) => modified > last_text_at,
                    _ => false,
                };
                if stale {
                    record.fast_stage = STAGE_PENDING;
                    record.deep_stage = STAGE_PENDING;
                    self.storage.upsert_file(&record)?;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }
}

/// Deterministic file identity derived from the absolute path, so
/// repeated scans of an unchanged tree resolve to the same `file_id`.
fn file_id_for_path(path: &Path) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    path.hash(&mut hasher);
    format!("f{:016x}", hasher.finish())
}

fn classify_kind(path: &Path) -> FileKind {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    match extension.as_str() {
        "txt" | "md" | "mdx" | "csv" | "log" | "json" | "yaml" | "yml" => FileKind::Text,
        "pdf" | "doc" | "docx" | "rtf" | "odt" => FileKind::Document,
        "jpg" | "jpeg" | "png" | "gif" | "bmp" | "webp" | "tiff" => FileKind::Image,
        "mp3" | "wav" | "flac" | "ogg" | "m4a" | "aac" => FileKind::Audio,
        "mp4" | "mov" | "avi" | "mkv" | "webm" => FileKind::Video,
        "ppt" | "pptx" | "key" | "odp" => FileKind::Presentation,
        _ => FileKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn scan_registers_new_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "hello world").unwrap();
        fs::write(dir.path().join("image.png"), [0u8; 4]).unwrap();

        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let discovery = FileDiscovery::new(dir.path(), storage.clone(), DiscoveryConfig::default());
        let registered = discovery.initial_scan().unwrap();
        assert_eq!(registered, 2);

        let second_pass = discovery.initial_scan().unwrap();
        assert_eq!(second_pass, 0, "unchanged files are not re-registered");
    }

    #[test]
    fn classify_kind_maps_common_extensions() {
        assert_eq!(classify_kind(Path::new("a.pdf")), FileKind::Document);
        assert_eq!(classify_kind(Path::new("a.png")), FileKind::Image);
        assert_eq!(classify_kind(Path::new("a.txt")), FileKind::Text);
        assert_eq!(classify_kind(Path::new("a.mp4")), FileKind::Video);
        assert_eq!(classify_kind(Path::new("a.unknownext")), FileKind::Other);
    }

    #[test]
    fn file_id_is_stable_for_the_same_path() {
        let a = file_id_for_path(Path::new("/tmp/x.txt"));
        let b = file_id_for_path(Path::new("/tmp/x.txt"));
        assert_eq!(a, b);
    }
}
