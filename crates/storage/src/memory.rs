use crate::connection::Storage;
use crate::error::Result;
use chrono::Utc;
use context_protocol::{
    EpisodeRecord, EventLogRecord, ForesightRecord, MemorySearchHit, MemoryType, ProfileRecord,
};
use rusqlite::{params, OptionalExtension, Row};
use std::collections::HashMap;

fn metadata_to_json(metadata: &HashMap<String, serde_json::Value>) -> Result<String> {
    Ok(serde_json::to_string(metadata)?)
}

fn metadata_from_json(raw: &str) -> HashMap<String, serde_json::Value> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn row_to_episode(row: &Row<'_>) -> rusqlite::Result<EpisodeRecord> {
    let metadata_raw: String = row.get("metadata")?;
    Ok(EpisodeRecord {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        summary: row.get("summary")?,
        episode: row.get("episode")?,
        subject: row.get("subject")?,
        timestamp: row.get("timestamp")?,
        metadata: metadata_from_json(&metadata_raw),
    })
}

fn row_to_event_log(row: &Row<'_>) -> rusqlite::Result<EventLogRecord> {
    let metadata_raw: String = row.get("metadata")?;
    Ok(EventLogRecord {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        atomic_fact: row.get("atomic_fact")?,
        timestamp: row.get("timestamp")?,
        parent_episode_id: row.get("parent_episode_id")?,
        metadata: metadata_from_json(&metadata_raw),
    })
}

fn row_to_foresight(row: &Row<'_>) -> rusqlite::Result<ForesightRecord> {
    let metadata_raw: String = row.get("metadata")?;
    Ok(ForesightRecord {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        content: row.get("content")?,
        evidence: row.get("evidence")?,
        parent_episode_id: row.get("parent_episode_id")?,
        metadata: metadata_from_json(&metadata_raw),
    })
}

fn row_to_profile(row: &Row<'_>) -> rusqlite::Result<ProfileRecord> {
    let personality: Option<String> = row.get("personality")?;
    let interests: Option<String> = row.get("interests")?;
    let hard_skills: Option<String> = row.get("hard_skills")?;
    let soft_skills: Option<String> = row.get("soft_skills")?;
    let metadata_raw: String = row.get("metadata")?;
    Ok(ProfileRecord {
        user_id: row.get("user_id")?,
        user_name: row.get("user_name")?,
        personality: personality.and_then(|raw| serde_json::from_str(&raw).ok()),
        interests: interests.and_then(|raw| serde_json::from_str(&raw).ok()),
        hard_skills: hard_skills.and_then(|raw| serde_json::from_str(&raw).ok()),
        soft_skills: soft_skills.and_then(|raw| serde_json::from_str(&raw).ok()),
        updated_at: row.get("updated_at")?,
        metadata: metadata_from_json(&metadata_raw),
    })
}

impl Storage {
    // ==================== Episodes ====================

    pub fn upsert_episode(&self, record: &EpisodeRecord) -> Result<()> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let metadata = metadata_to_json(&record.metadata)?;
        conn.execute(
            "INSERT INTO memory_episodes (id, user_id, summary, episode, subject, timestamp, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                summary = excluded.summary,
                episode = excluded.episode,
                subject = excluded.subject,
                timestamp = excluded.timestamp,
                metadata = excluded.metadata",
            params![
                record.id,
                record.user_id,
                record.summary,
                record.episode,
                record.subject,
                record.timestamp,
                metadata,
            ],
        )?;

        conn.execute(
            "DELETE FROM memory_fts WHERE memory_id = ?1 AND memory_type = 'episode'",
            params![record.id],
        )?;
        let fts_content = format!(
            "{} {} {}",
            record.summary,
            record.episode.as_deref().unwrap_or(""),
            record.subject.as_deref().unwrap_or("")
        );
        conn.execute(
            "INSERT INTO memory_fts (content, user_id, memory_type, memory_id) VALUES (?1, ?2, 'episode', ?3)",
            params![fts_content, record.user_id, record.id],
        )?;
        Ok(())
    }

    pub fn get_episodes(&self, user_id: &str, limit: usize, offset: usize) -> Result<Vec<EpisodeRecord>> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, user_id, summary, episode, subject, timestamp, metadata
             FROM memory_episodes WHERE user_id = ?1
             ORDER BY timestamp DESC LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt
            .query_map(params![user_id, limit as i64, offset as i64], row_to_episode)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn count_episodes(&self, user_id: &str) -> Result<usize> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM memory_episodes WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn delete_episode(&self, episode_id: &str) -> Result<()> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        conn.execute("DELETE FROM memory_episodes WHERE id = ?1", params![episode_id])?;
        conn.execute(
            "DELETE FROM memory_fts WHERE memory_id = ?1 AND memory_type = 'episode'",
            params![episode_id],
        )?;
        Ok(())
    }

    // ==================== Event logs ====================

    pub fn upsert_event_log(&self, record: &EventLogRecord) -> Result<()> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let metadata = metadata_to_json(&record.metadata)?;
        conn.execute(
            "INSERT INTO memory_event_logs (id, user_id, atomic_fact, timestamp, parent_episode_id, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                atomic_fact = excluded.atomic_fact,
                timestamp = excluded.timestamp,
                parent_episode_id = excluded.parent_episode_id,
                metadata = excluded.metadata",
            params![
                record.id,
                record.user_id,
                record.atomic_fact,
                record.timestamp,
                record.parent_episode_id,
                metadata,
            ],
        )?;

        conn.execute(
            "DELETE FROM memory_fts WHERE memory_id = ?1 AND memory_type = 'event_log'",
            params![record.id],
        )?;
        conn.execute(
            "INSERT INTO memory_fts (content, user_id, memory_type, memory_id) VALUES (?1, ?2, 'event_log', ?3)",
            params![record.atomic_fact, record.user_id, record.id],
        )?;
        Ok(())
    }

    pub fn get_event_logs(&self, user_id: &str, limit: usize, offset: usize) -> Result<Vec<EventLogRecord>> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, user_id, atomic_fact, timestamp, parent_episode_id, metadata
             FROM memory_event_logs WHERE user_id = ?1
             ORDER BY timestamp DESC LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt
            .query_map(params![user_id, limit as i64, offset as i64], row_to_event_log)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn count_event_logs(&self, user_id: &str) -> Result<usize> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM memory_event_logs WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // ==================== Foresights ====================

    pub fn upsert_foresight(&self, record: &ForesightRecord) -> Result<()> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let metadata = metadata_to_json(&record.metadata)?;
        conn.execute(
            "INSERT INTO memory_foresights (id, user_id, content, evidence, parent_episode_id, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                evidence = excluded.evidence,
                parent_episode_id = excluded.parent_episode_id,
                metadata = excluded.metadata",
            params![
                record.id,
                record.user_id,
                record.content,
                record.evidence,
                record.parent_episode_id,
                metadata,
            ],
        )?;

        conn.execute(
            "DELETE FROM memory_fts WHERE memory_id = ?1 AND memory_type = 'foresight'",
            params![record.id],
        )?;
        let fts_content = format!("{} {}", record.content, record.evidence.as_deref().unwrap_or(""));
        conn.execute(
            "INSERT INTO memory_fts (content, user_id, memory_type, memory_id) VALUES (?1, ?2, 'foresight', ?3)",
            params![fts_content, record.user_id, record.id],
        )?;
        Ok(())
    }

    pub fn get_foresights(&self, user_id: &str, limit: usize) -> Result<Vec<ForesightRecord>> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, user_id, content, evidence, parent_episode_id, metadata
             FROM memory_foresights WHERE user_id = ?1 LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![user_id, limit as i64], row_to_foresight)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn count_foresights(&self, user_id: &str) -> Result<usize> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM memory_foresights WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // ==================== Profiles ====================

    pub fn upsert_profile(&self, record: &ProfileRecord) -> Result<()> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let personality = record.personality.as_ref().map(serde_json::to_string).transpose()?;
        let interests = record.interests.as_ref().map(serde_json::to_string).transpose()?;
        let hard_skills = record.hard_skills.as_ref().map(serde_json::to_string).transpose()?;
        let soft_skills = record.soft_skills.as_ref().map(serde_json::to_string).transpose()?;
        let metadata = metadata_to_json(&record.metadata)?;

        conn.execute(
            "INSERT INTO memory_profiles
                (user_id, user_name, personality, interests, hard_skills, soft_skills, updated_at, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(user_id) DO UPDATE SET
                user_name = excluded.user_name,
                personality = excluded.personality,
                interests = excluded.interests,
                hard_skills = excluded.hard_skills,
                soft_skills = excluded.soft_skills,
                updated_at = excluded.updated_at,
                metadata = excluded.metadata",
            params![
                record.user_id,
                record.user_name,
                personality,
                interests,
                hard_skills,
                soft_skills,
                record.updated_at,
                metadata,
            ],
        )?;
        Ok(())
    }

    pub fn get_profile(&self, user_id: &str) -> Result<Option<ProfileRecord>> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        conn.query_row(
            "SELECT user_id, user_name, personality, interests, hard_skills, soft_skills, updated_at, metadata
             FROM memory_profiles WHERE user_id = ?1",
            params![user_id],
            row_to_profile,
        )
        .optional()
        .map_err(Into::into)
    }

    // ==================== Search ====================

    /// Full-text search across every memory type for one user (§3).
    pub fn search_memories(&self, user_id: &str, query: &str, limit: usize) -> Result<Vec<MemorySearchHit>> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT memory_id, memory_type, content, bm25(memory_fts) AS score
             FROM memory_fts
             WHERE memory_fts MATCH ?1 AND user_id = ?2
             ORDER BY score
             LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(params![query, user_id, limit as i64], |row| {
                let memory_type_raw: String = row.get("memory_type")?;
                Ok(MemorySearchHit {
                    memory_id: row.get("memory_id")?,
                    memory_type: parse_memory_type(&memory_type_raw),
                    content: row.get("content")?,
                    score: row.get("score")?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn parse_memory_type(raw: &str) -> MemoryType {
    match raw {
        "event_log" => MemoryType::EventLog,
        "foresight" => MemoryType::Foresight,
        "profile" => MemoryType::Profile,
        "group_profile" => MemoryType::GroupProfile,
        "core" => MemoryType::Core,
        _ => MemoryType::Episodic,
    }
}

/// Generates a new random memory record id, matching the teacher's
/// convention of UUIDv4 primary keys for storage-managed records.
#[must_use]
pub fn new_memory_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[must_use]
pub fn now() -> chrono::DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode(user_id: &str, summary: &str) -> EpisodeRecord {
        EpisodeRecord {
            id: new_memory_id(),
            user_id: user_id.to_string(),
            summary: summary.to_string(),
            episode: None,
            subject: None,
            timestamp: now(),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn upsert_and_fetch_episodes_orders_by_timestamp_desc() {
        let storage = Storage::open_in_memory().unwrap();
        let mut first = episode("u1", "met with the design team");
        first.timestamp = chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut second = episode("u1", "shipped the quarterly report");
        second.timestamp = chrono::DateTime::parse_from_rfc3339("2026-02-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        storage.upsert_episode(&first).unwrap();
        storage.upsert_episode(&second).unwrap();

        let episodes = storage.get_episodes("u1", 10, 0).unwrap();
        assert_eq!(episodes.len(), 2);
        assert_eq!(episodes[0].summary, "shipped the quarterly report");
        assert_eq!(storage.count_episodes("u1").unwrap(), 2);
    }

    #[test]
    fn delete_episode_removes_row_and_fts_entry() {
        let storage = Storage::open_in_memory().unwrap();
        let record = episode("u1", "annual review");
        storage.upsert_episode(&record).unwrap();
        storage.delete_episode(&record.id).unwrap();
        assert_eq!(storage.get_episodes("u1", 10, 0).unwrap().len(), 0);
        assert_eq!(storage.search_memories("u1", "review", 10).unwrap().len(), 0);
    }

    #[test]
    fn profile_round_trips_skill_lists() {
        let storage = Storage::open_in_memory().unwrap();
        let mut hard_skills = Vec::new();
        let mut skill = HashMap::new();
        skill.insert("name".to_string(), "rust".to_string());
        hard_skills.push(skill);

        let profile = ProfileRecord {
            user_id: "u1".to_string(),
            user_name: Some("Jordan".to_string()),
            personality: Some(vec!["curious".to_string()]),
            interests: None,
            hard_skills: Some(hard_skills),
            soft_skills: None,
            updated_at: now(),
            metadata: HashMap::new(),
        };
        storage.upsert_profile(&profile).unwrap();

        let fetched = storage.get_profile("u1").unwrap().unwrap();
        assert_eq!(fetched.user_name.as_deref(), Some("Jordan"));
        assert_eq!(fetched.hard_skills.unwrap()[0]["name"], "rust");
    }

    #[test]
    fn search_memories_finds_across_episode_and_event_log() {
        let storage = Storage::open_in_memory().unwrap();
        storage.upsert_episode(&episode("u1", "discussed the budget overrun")).unwrap();
        storage
            .upsert_event_log(&EventLogRecord {
                id: new_memory_id(),
                user_id: "u1".to_string(),
                atomic_fact: "budget increased by 10 percent".to_string(),
                timestamp: now(),
                parent_episode_id: None,
                metadata: HashMap::new(),
            })
            .unwrap();

        let hits = storage.search_memories("u1", "budget", 10).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn search_memories_is_scoped_to_user_id() {
        let storage = Storage::open_in_memory().unwrap();
        storage.upsert_episode(&episode("u1", "roadmap planning")).unwrap();
        storage.upsert_episode(&episode("u2", "roadmap planning")).unwrap();

        let hits = storage.search_memories("u1", "roadmap", 10).unwrap();
        assert_eq!(hits.len(), 1);
    }
}
