use crate::connection::Storage;
use crate::error::{Result, StorageError};
use chrono::{DateTime, Utc};
use context_protocol::{FileKind, FileRecord, PrivacyLevel};
use rusqlite::{params, OptionalExtension, Row};
use std::collections::HashMap;

fn kind_to_str(kind: FileKind) -> Result<String> {
    Ok(serde_json::to_value(kind)?
        .as_str()
        .expect("FileKind serializes to a string")
        .to_string())
}

fn kind_from_str(raw: &str) -> Result<FileKind> {
    Ok(serde_json::from_value(serde_json::Value::String(
        raw.to_string(),
    ))?)
}

fn privacy_to_str(level: PrivacyLevel) -> &'static str {
    level.as_str()
}

fn privacy_from_str(raw: &str) -> PrivacyLevel {
    match raw {
        "private" => PrivacyLevel::Private,
        _ => PrivacyLevel::Public,
    }
}

fn row_to_file_record(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let kind_raw: String = row.get("kind")?;
    let kind = kind_from_str(&kind_raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?;
    let metadata_raw: String = row.get("metadata")?;
    let metadata: HashMap<String, serde_json::Value> =
        serde_json::from_str(&metadata_raw).unwrap_or_default();
    let privacy_raw: String = row.get("privacy_level")?;

    Ok(FileRecord {
        file_id: row.get("file_id")?,
        path: row.get("path")?,
        name: row.get("name")?,
        extension: row.get("extension")?,
        kind,
        folder_id: row.get("folder_id")?,
        privacy_level: privacy_from_str(&privacy_raw),
        page_count: row.get::<_, Option<i64>>("page_count")?.map(|v| v as u32),
        preview_image: row.get("preview_image")?,
        metadata,
        fast_stage: row.get("fast_stage")?,
        deep_stage: row.get("deep_stage")?,
        fast_text_at: row.get::<_, Option<DateTime<Utc>>>("fast_text_at")?,
        fast_embed_at: row.get::<_, Option<DateTime<Utc>>>("fast_embed_at")?,
        deep_text_at: row.get::<_, Option<DateTime<Utc>>>("deep_text_at")?,
        deep_embed_at: row.get::<_, Option<DateTime<Utc>>>("deep_embed_at")?,
    })
}

const FILE_COLUMNS: &str = "file_id, path, name, extension, kind, folder_id, privacy_level,
     page_count, preview_image, metadata, fast_stage, deep_stage,
     fast_text_at, fast_embed_at, deep_text_at, deep_embed_at";

impl Storage {
    pub fn upsert_file(&self, file: &FileRecord) -> Result<()> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let metadata = serde_json::to_string(&file.metadata)?;
        conn.execute(
            &format!(
                "INSERT INTO files ({FILE_COLUMNS})
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)
                 ON CONFLICT(file_id) DO UPDATE SET
                    path = excluded.path,
                    name = excluded.name,
                    extension = excluded.extension,
                    kind = excluded.kind,
                    folder_id = excluded.folder_id,
                    privacy_level = excluded.privacy_level,
                    page_count = excluded.page_count,
                    preview_image = excluded.preview_image,
                    metadata = excluded.metadata,
                    fast_stage = excluded.fast_stage,
                    deep_stage = excluded.deep_stage,
                    fast_text_at = excluded.fast_text_at,
                    fast_embed_at = excluded.fast_embed_at,
                    deep_text_at = excluded.deep_text_at,
                    deep_embed_at = excluded.deep_embed_at"
            ),
            params![
                file.file_id,
                file.path,
                file.name,
                file.extension,
                kind_to_str(file.kind)?,
                file.folder_id,
                privacy_to_str(file.privacy_level),
                file.page_count.map(|v| v as i64),
                file.preview_image,
                metadata,
                file.fast_stage,
                file.deep_stage,
                file.fast_text_at,
                file.fast_embed_at,
                file.deep_text_at,
                file.deep_embed_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_file(&self, file_id: &str) -> Result<Option<FileRecord>> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        conn.query_row(
            &format!("SELECT {FILE_COLUMNS} FROM files WHERE file_id = ?1"),
            params![file_id],
            row_to_file_record,
        )
        .optional()
        .map_err(StorageError::from)
    }

    pub fn require_file(&self, file_id: &str) -> Result<FileRecord> {
        self.get_file(file_id)?
            .ok_or_else(|| StorageError::FileNotFound(file_id.to_string()))
    }

    pub fn find_files_by_name(&self, name_query: &str) -> Result<Vec<FileRecord>> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let pattern = format!("%{name_query}%");
        let mut stmt =
            conn.prepare(&format!("SELECT {FILE_COLUMNS} FROM files WHERE name LIKE ?1 ORDER BY name"))?;
        let rows = stmt
            .query_map(params![pattern], row_to_file_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Files whose fast round has neither completed nor permanently
    /// failed, oldest (by discovery order) first — the scheduler's fast
    /// work queue (§4.6).
    pub fn list_pending_fast(&self) -> Result<Vec<FileRecord>> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE fast_stage < 2 AND fast_stage != -1 ORDER BY rowid"
        ))?;
        let rows = stmt
            .query_map([], row_to_file_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Files whose fast round is done and whose deep round has neither
    /// completed, been skipped, nor permanently failed, oldest first —
    /// the scheduler's deep work queue, always drained after the fast
    /// queue (§4.6 priority rule).
    pub fn list_pending_deep(&self) -> Result<Vec<FileRecord>> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {FILE_COLUMNS} FROM files
             WHERE fast_stage = 2 AND deep_stage < 2 AND deep_stage NOT IN (-1, -2)
             ORDER BY rowid"
        ))?;
        let rows = stmt
            .query_map([], row_to_file_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn get_files_in_folder(&self, folder_id: &str) -> Result<Vec<FileRecord>> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE folder_id = ?1 ORDER BY name"
        ))?;
        let rows = stmt
            .query_map(params![folder_id], row_to_file_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Advances `fast_stage` and stamps the matching timestamp column
    /// (§4.4 steps 5/8). `at` is omitted for the `-1` failure transition.
    pub fn update_fast_stage(
        &self,
        file_id: &str,
        stage: context_protocol::StageValue,
        at: Option<DateTime<Utc>>,
        is_embed: bool,
    ) -> Result<()> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        if is_embed {
            conn.execute(
                "UPDATE files SET fast_stage = ?1, fast_embed_at = ?2 WHERE file_id = ?3",
                params![stage, at, file_id],
            )?;
        } else {
            conn.execute(
                "UPDATE files SET fast_stage = ?1, fast_text_at = ?2 WHERE file_id = ?3",
                params![stage, at, file_id],
            )?;
        }
        Ok(())
    }

    pub fn update_deep_stage(
        &self,
        file_id: &str,
        stage: context_protocol::StageValue,
        at: Option<DateTime<Utc>>,
        is_embed: bool,
    ) -> Result<()> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        if is_embed {
            conn.execute(
                "UPDATE files SET deep_stage = ?1, deep_embed_at = ?2 WHERE file_id = ?3",
                params![stage, at, file_id],
            )?;
        } else {
            conn.execute(
                "UPDATE files SET deep_stage = ?1, deep_text_at = ?2 WHERE file_id = ?3",
                params![stage, at, file_id],
            )?;
        }
        Ok(())
    }

    pub fn update_parsed_metadata(
        &self,
        file_id: &str,
        page_count: Option<u32>,
        preview_image: Option<&[u8]>,
    ) -> Result<()> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        conn.execute(
            "UPDATE files SET page_count = ?1, preview_image = ?2 WHERE file_id = ?3",
            params![page_count.map(|v| v as i64), preview_image, file_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> Storage {
        Storage::open_in_memory().unwrap()
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let storage = storage();
        let record = FileRecord::new("f1", "/docs/report.pdf", FileKind::Document);
        storage.upsert_file(&record).unwrap();
        let fetched = storage.get_file("f1").unwrap().unwrap();
        assert_eq!(fetched.name, "report.pdf");
        assert_eq!(fetched.kind, FileKind::Document);
    }

    #[test]
    fn upsert_is_idempotent_and_updates_fields() {
        let storage = storage();
        let mut record = FileRecord::new("f1", "/docs/report.pdf", FileKind::Document);
        storage.upsert_file(&record).unwrap();
        record.fast_stage = 2;
        storage.upsert_file(&record).unwrap();
        let fetched = storage.get_file("f1").unwrap().unwrap();
        assert_eq!(fetched.fast_stage, 2);
        assert_eq!(storage.counts().unwrap().files, 1);
    }

    #[test]
    fn find_by_name_matches_substrings() {
        let storage = storage();
        storage
            .upsert_file(&FileRecord::new("f1", "quarterly_report.pdf", FileKind::Document))
            .unwrap();
        storage
            .upsert_file(&FileRecord::new("f2", "notes.txt", FileKind::Text))
            .unwrap();
        let hits = storage.find_files_by_name("report").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_id, "f1");
    }

    #[test]
    fn missing_file_returns_not_found_error() {
        let storage = storage();
        assert!(matches!(
            storage.require_file("missing"),
            Err(StorageError::FileNotFound(_))
        ));
    }
}
