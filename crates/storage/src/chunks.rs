use crate::connection::Storage;
use crate::error::Result;
use context_protocol::{ChunkSnapshot, ChunkVersion};
use rusqlite::{params, Row};
use std::collections::HashMap;

fn row_to_chunk(row: &Row<'_>) -> rusqlite::Result<ChunkSnapshot> {
    let version_raw: String = row.get("version")?;
    let version = if version_raw == "deep" {
        ChunkVersion::Deep
    } else {
        ChunkVersion::Fast
    };
    let metadata_raw: String = row.get("metadata")?;
    let metadata: HashMap<String, serde_json::Value> =
        serde_json::from_str(&metadata_raw).unwrap_or_default();

    Ok(ChunkSnapshot {
        chunk_id: row.get("chunk_id")?,
        file_id: row.get("file_id")?,
        ordinal: row.get("ordinal")?,
        text: row.get("text")?,
        snippet: row.get("snippet")?,
        token_count: row.get("token_count")?,
        char_count: row.get("char_count")?,
        section_path: row.get("section_path")?,
        metadata,
        created_at: row.get("created_at")?,
        version,
    })
}

/// A keyword search hit: the chunk plus its BM25 score. Lower raw BM25
/// scores mean a better match; callers that fuse with vector search
/// should rank on this as-is through the RRF combiner, not invert it.
#[derive(Debug, Clone)]
pub struct KeywordHit {
    pub chunk: ChunkSnapshot,
    pub bm25: f64,
}

impl Storage {
    /// Replaces every chunk for `(file_id, version)` as one set (§3
    /// lifecycle invariant: "failures do not partially update vectors").
    /// Runs inside a transaction so readers never observe a half-replaced
    /// chunk population.
    pub fn replace_chunks(
        &self,
        file_id: &str,
        version: ChunkVersion,
        chunks: &[ChunkSnapshot],
    ) -> Result<()> {
        let mut conn = self.conn.lock().expect("storage mutex poisoned");
        let tx = conn.transaction()?;
        {
            tx.execute(
                "DELETE FROM chunks_fts WHERE file_id = ?1 AND version = ?2",
                params![file_id, version.as_str()],
            )?;
            tx.execute(
                "DELETE FROM chunks WHERE file_id = ?1 AND version = ?2",
                params![file_id, version.as_str()],
            )?;

            for chunk in chunks {
                let metadata = serde_json::to_string(&chunk.metadata)?;
                tx.execute(
                    "INSERT INTO chunks
                        (chunk_id, file_id, version, ordinal, text, snippet,
                         token_count, char_count, section_path, metadata, created_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
                    params![
                        chunk.chunk_id,
                        chunk.file_id,
                        version.as_str(),
                        chunk.ordinal,
                        chunk.text,
                        chunk.snippet,
                        chunk.token_count,
                        chunk.char_count,
                        chunk.section_path,
                        metadata,
                        chunk.created_at,
                    ],
                )?;
                tx.execute(
                    "INSERT INTO chunks_fts (rowid, text, chunk_id, file_id, version)
                     VALUES (last_insert_rowid(), ?1, ?2, ?3, ?4)",
                    params![chunk.text, chunk.chunk_id, chunk.file_id, version.as_str()],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_chunks(&self, file_id: &str, version: ChunkVersion) -> Result<Vec<ChunkSnapshot>> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT chunk_id, file_id, version, ordinal, text, snippet, token_count,
                    char_count, section_path, metadata, created_at
             FROM chunks WHERE file_id = ?1 AND version = ?2 ORDER BY ordinal",
        )?;
        let rows = stmt
            .query_map(params![file_id, version.as_str()], row_to_chunk)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Fetches one chunk by its stable id, regardless of version. Used to
    /// resolve vector-only search hits (which carry only `doc_id`/score)
    /// back into full chunk text for reranking and verification.
    pub fn get_chunk(&self, chunk_id: &str) -> Result<Option<ChunkSnapshot>> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT chunk_id, file_id, version, ordinal, text, snippet, token_count,
                    char_count, section_path, metadata, created_at
             FROM chunks WHERE chunk_id = ?1",
        )?;
        let mut rows = stmt.query(params![chunk_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_chunk(row)?)),
            None => Ok(None),
        }
    }

    /// BM25 keyword search (§4.6 step 1), optionally restricted to an
    /// allowlist of `file_id`s (scope isolation). The allowlist is pushed
    /// into the `WHERE` clause so that `LIMIT` truncates only after
    /// scoping, not before — otherwise a scoped file ranking outside the
    /// unscoped top-K would be dropped even though it matches.
    pub fn keyword_search(
        &self,
        query: &str,
        limit: usize,
        file_ids: Option<&[String]>,
    ) -> Result<Vec<KeywordHit>> {
        let conn = self.conn.lock().expect("storage mutex poisoned");

        let base_select = "SELECT c.chunk_id, c.file_id, c.version, c.ordinal, c.text, c.snippet,
                          c.token_count, c.char_count, c.section_path, c.metadata, c.created_at,
                          bm25(chunks_fts) AS rank
                   FROM chunks_fts
                   JOIN chunks c ON c.chunk_id = chunks_fts.chunk_id AND c.version = chunks_fts.version
                   WHERE chunks_fts MATCH ?1";

        let mut hits = Vec::new();

        match file_ids {
            Some(allowlist) if allowlist.is_empty() => {}
            Some(allowlist) => {
                let placeholders = allowlist.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
                let sql = format!("{base_select} AND c.file_id IN ({placeholders}) ORDER BY rank LIMIT ?");
                let mut stmt = conn.prepare(&sql)?;

                let mut bound: Vec<Box<dyn rusqlite::ToSql>> = Vec::with_capacity(allowlist.len() + 2);
                bound.push(Box::new(query.to_string()));
                for id in allowlist {
                    bound.push(Box::new(id.clone()));
                }
                bound.push(Box::new(limit as i64));
                let bound_refs: Vec<&dyn rusqlite::ToSql> = bound.iter().map(|p| p.as_ref()).collect();

                let mut rows = stmt.query(bound_refs.as_slice())?;
                while let Some(row) = rows.next()? {
                    let chunk = row_to_chunk(row)?;
                    let bm25: f64 = row.get("rank")?;
                    hits.push(KeywordHit { chunk, bm25 });
                }
            }
            None => {
                let sql = format!("{base_select} ORDER BY rank LIMIT ?2");
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(params![query, limit as i64])?;
                while let Some(row) = rows.next()? {
                    let chunk = row_to_chunk(row)?;
                    let bm25: f64 = row.get("rank")?;
                    hits.push(KeywordHit { chunk, bm25 });
                }
            }
        }

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use context_protocol::{FileKind, FileRecord};

    fn sample_chunk(file_id: &str, ordinal: u32, text: &str) -> ChunkSnapshot {
        ChunkSnapshot {
            chunk_id: format!("{file_id}::fast::{ordinal}"),
            file_id: file_id.to_string(),
            ordinal,
            text: text.to_string(),
            snippet: ChunkSnapshot::snippet_of(text, 400),
            token_count: (text.len() / 4) as u32,
            char_count: text.len() as u32,
            section_path: None,
            metadata: HashMap::new(),
            created_at: Utc::now(),
            version: ChunkVersion::Fast,
        }
    }

    fn storage_with_file(file_id: &str) -> Storage {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .upsert_file(&FileRecord::new(file_id, format!("{file_id}.txt"), FileKind::Text))
            .unwrap();
        storage
    }

    #[test]
    fn replace_chunks_is_atomic_and_replaces_the_full_set() {
        let storage = storage_with_file("f1");
        let first = vec![sample_chunk("f1", 0, "alpha beta")];
        storage.replace_chunks("f1", ChunkVersion::Fast, &first).unwrap();
        assert_eq!(storage.get_chunks("f1", ChunkVersion::Fast).unwrap().len(), 1);

        let second = vec![
            sample_chunk("f1", 0, "gamma delta"),
            sample_chunk("f1", 1, "epsilon zeta"),
        ];
        storage.replace_chunks("f1", ChunkVersion::Fast, &second).unwrap();
        let chunks = storage.get_chunks("f1", ChunkVersion::Fast).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "gamma delta");
    }

    #[test]
    fn fast_and_deep_versions_coexist() {
        let storage = storage_with_file("f1");
        storage
            .replace_chunks("f1", ChunkVersion::Fast, &[sample_chunk("f1", 0, "fast text")])
            .unwrap();
        storage
            .replace_chunks("f1", ChunkVersion::Deep, &[sample_chunk("f1", 0, "deep text")])
            .unwrap();
        assert_eq!(storage.get_chunks("f1", ChunkVersion::Fast).unwrap().len(), 1);
        assert_eq!(storage.get_chunks("f1", ChunkVersion::Deep).unwrap().len(), 1);
    }

    #[test]
    fn get_chunk_resolves_by_id_across_versions() {
        let storage = storage_with_file("f1");
        storage
            .replace_chunks("f1", ChunkVersion::Deep, &[sample_chunk("f1", 0, "deep text")])
            .unwrap();
        let chunk = storage.get_chunk("f1::fast::0").unwrap();
        assert!(chunk.is_none());
        let deep_id = storage.get_chunks("f1", ChunkVersion::Deep).unwrap()[0].chunk_id.clone();
        assert!(storage.get_chunk(&deep_id).unwrap().is_some());
    }

    #[test]
    fn keyword_search_finds_matching_terms() {
        let storage = storage_with_file("f1");
        storage
            .replace_chunks(
                "f1",
                ChunkVersion::Fast,
                &[
                    sample_chunk("f1", 0, "the quarterly revenue report"),
                    sample_chunk("f1", 1, "unrelated text about cats"),
                ],
            )
            .unwrap();
        let hits = storage.keyword_search("revenue", 10, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].chunk.text.contains("revenue"));
    }

    #[test]
    fn keyword_search_honors_file_id_allowlist() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .upsert_file(&FileRecord::new("f1", "a.txt", FileKind::Text))
            .unwrap();
        storage
            .upsert_file(&FileRecord::new("f2", "b.txt", FileKind::Text))
            .unwrap();
        storage
            .replace_chunks("f1", ChunkVersion::Fast, &[sample_chunk("f1", 0, "budget plan")])
            .unwrap();
        storage
            .replace_chunks("f2", ChunkVersion::Fast, &[sample_chunk("f2", 0, "budget plan")])
            .unwrap();

        let hits = storage
            .keyword_search("budget", 10, Some(&["f1".to_string()]))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.file_id, "f1");
    }
}
