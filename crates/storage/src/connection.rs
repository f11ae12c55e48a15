use crate::error::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Relational store (§4.2 C2): files, chunks (fast/deep versions), and
/// folders, backed by SQLite with an FTS5 keyword index. A single
/// `Mutex<Connection>` serializes access, matching the teacher's
/// storage layer pattern of one connection shared across async callers.
#[derive(Clone)]
pub struct Storage {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl Storage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")?;
        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        storage.migrate()?;
        Ok(storage)
    }

    /// Additive migrations only: every statement is `IF NOT EXISTS`, so
    /// re-running this against an already-migrated database is a no-op.
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS folders (
                folder_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                parent_id TEXT
            );

            CREATE TABLE IF NOT EXISTS files (
                file_id TEXT PRIMARY KEY,
                path TEXT NOT NULL,
                name TEXT NOT NULL,
                extension TEXT,
                kind TEXT NOT NULL,
                folder_id TEXT,
                privacy_level TEXT NOT NULL DEFAULT 'public',
                page_count INTEGER,
                preview_image BLOB,
                metadata TEXT NOT NULL DEFAULT '{}',
                fast_stage INTEGER NOT NULL DEFAULT 0,
                deep_stage INTEGER NOT NULL DEFAULT 0,
                fast_text_at TEXT,
                fast_embed_at TEXT,
                deep_text_at TEXT,
                deep_embed_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_files_folder ON files(folder_id);
            CREATE INDEX IF NOT EXISTS idx_files_name ON files(name);

            CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chunk_id TEXT NOT NULL,
                file_id TEXT NOT NULL REFERENCES files(file_id) ON DELETE CASCADE,
                version TEXT NOT NULL,
                ordinal INTEGER NOT NULL,
                text TEXT NOT NULL,
                snippet TEXT NOT NULL,
                token_count INTEGER NOT NULL,
                char_count INTEGER NOT NULL,
                section_path TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                UNIQUE(chunk_id, version)
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_file_version ON chunks(file_id, version);

            CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
                text,
                chunk_id UNINDEXED,
                file_id UNINDEXED,
                version UNINDEXED,
                tokenize = 'porter'
            );

            CREATE TABLE IF NOT EXISTS memory_episodes (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                summary TEXT NOT NULL,
                episode TEXT,
                subject TEXT,
                timestamp TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}'
            );
            CREATE INDEX IF NOT EXISTS idx_memory_episodes_user ON memory_episodes(user_id);
            CREATE INDEX IF NOT EXISTS idx_memory_episodes_timestamp ON memory_episodes(timestamp DESC);

            CREATE TABLE IF NOT EXISTS memory_event_logs (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                atomic_fact TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                parent_episode_id TEXT REFERENCES memory_episodes(id) ON DELETE SET NULL,
                metadata TEXT NOT NULL DEFAULT '{}'
            );
            CREATE INDEX IF NOT EXISTS idx_memory_event_logs_user ON memory_event_logs(user_id);
            CREATE INDEX IF NOT EXISTS idx_memory_event_logs_episode ON memory_event_logs(parent_episode_id);

            CREATE TABLE IF NOT EXISTS memory_foresights (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                content TEXT NOT NULL,
                evidence TEXT,
                parent_episode_id TEXT REFERENCES memory_episodes(id) ON DELETE SET NULL,
                metadata TEXT NOT NULL DEFAULT '{}'
            );
            CREATE INDEX IF NOT EXISTS idx_memory_foresights_user ON memory_foresights(user_id);

            CREATE TABLE IF NOT EXISTS memory_profiles (
                user_id TEXT PRIMARY KEY,
                user_name TEXT,
                personality TEXT,
                interests TEXT,
                hard_skills TEXT,
                soft_skills TEXT,
                updated_at TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}'
            );

            CREATE VIRTUAL TABLE IF NOT EXISTS memory_fts USING fts5(
                content,
                user_id UNINDEXED,
                memory_type UNINDEXED,
                memory_id UNINDEXED,
                tokenize = 'porter unicode61'
            );
            ",
        )?;
        Ok(())
    }

    pub fn counts(&self) -> Result<StorageCounts> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let files: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        let fast_chunks: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE version = 'fast'",
            [],
            |row| row.get(0),
        )?;
        let deep_chunks: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE version = 'deep'",
            [],
            |row| row.get(0),
        )?;
        let folders: i64 = conn.query_row("SELECT COUNT(*) FROM folders", [], |row| row.get(0))?;
        Ok(StorageCounts {
            files: files as usize,
            fast_chunks: fast_chunks as usize,
            deep_chunks: deep_chunks as usize,
            folders: folders as usize,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorageCounts {
    pub files: usize,
    pub fast_chunks: usize,
    pub deep_chunks: usize,
    pub folders: usize,
}
