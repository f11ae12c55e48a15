use crate::error::{MemoryError, Result};
use context_protocol::{
    EpisodeRecord, EventLogRecord, ForesightRecord, MemorizeRequest, MemorizeResult, ProfileRecord,
    SearchMemoryRequest, SearchMemoryResult, UserMemorySummary,
};
use context_storage::Storage;
use std::sync::Arc;

const DEFAULT_EPISODE_LIMIT: usize = 50;
const MAX_EPISODE_LIMIT: usize = 200;
const DEFAULT_EVENT_LOG_LIMIT: usize = 100;
const MAX_EVENT_LOG_LIMIT: usize = 500;
const DEFAULT_FORESIGHT_LIMIT: usize = 50;
const MAX_FORESIGHT_LIMIT: usize = 200;
const DEFAULT_SEARCH_LIMIT: usize = 20;

/// Backs the `/memory/*` routes (§3, §6). Internals are intentionally
/// thin: every write is a direct CRUD call into the storage layer's
/// memory tables, and search is FTS5 keyword search regardless of the
/// requested [`context_protocol::RetrieveMethod`] — there is no vector
/// index over memory records (out of core detail per the original
/// design).
pub struct MemoryService {
    storage: Arc<Storage>,
}

impl MemoryService {
    #[must_use]
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// `POST /memory/memorize`. Accepts already-structured memory
    /// fragments rather than raw text requiring LLM extraction, since
    /// that extraction step is out of scope here.
    pub fn memorize(&self, request: MemorizeRequest) -> Result<MemorizeResult> {
        if request.episode.is_none()
            && request.event_logs.is_empty()
            && request.foresights.is_empty()
            && request.profile.is_none()
        {
            return Err(MemoryError::EmptyRequest(request.user_id));
        }

        let mut result = MemorizeResult::default();

        if let Some(draft) = request.episode {
            let record = EpisodeRecord {
                id: context_storage::new_memory_id(),
                user_id: request.user_id.clone(),
                summary: draft.summary,
                episode: draft.episode,
                subject: draft.subject,
                timestamp: context_storage::memory_now(),
                metadata: Default::default(),
            };
            self.storage.upsert_episode(&record)?;
            result.episode_id = Some(record.id);
        }

        for draft in request.event_logs {
            let record = EventLogRecord {
                id: context_storage::new_memory_id(),
                user_id: request.user_id.clone(),
                atomic_fact: draft.atomic_fact,
                timestamp: context_storage::memory_now(),
                parent_episode_id: draft.parent_episode_id,
                metadata: Default::default(),
            };
            self.storage.upsert_event_log(&record)?;
            result.event_log_ids.push(record.id);
        }

        for draft in request.foresights {
            let record = ForesightRecord {
                id: context_storage::new_memory_id(),
                user_id: request.user_id.clone(),
                content: draft.content,
                evidence: draft.evidence,
                parent_episode_id: draft.parent_episode_id,
                metadata: Default::default(),
            };
            self.storage.upsert_foresight(&record)?;
            result.foresight_ids.push(record.id);
        }

        if let Some(draft) = request.profile {
            let record = ProfileRecord {
                user_id: request.user_id.clone(),
                user_name: draft.user_name,
                personality: draft.personality,
                interests: draft.interests,
                hard_skills: draft.hard_skills,
                soft_skills: draft.soft_skills,
                updated_at: context_storage::memory_now(),
                metadata: Default::default(),
            };
            self.storage.upsert_profile(&record)?;
            result.profile_updated = true;
        }

        Ok(result)
    }

    /// `POST /memory/search`.
    pub fn search(&self, request: &SearchMemoryRequest) -> Result<SearchMemoryResult> {
        let limit = request.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        log::debug!("memory search for {} uses keyword FTS regardless of requested method", request.user_id);
        let hits = self.storage.search_memories(&request.user_id, &request.query, limit)?;
        Ok(SearchMemoryResult { hits })
    }

    /// `GET /memory/{user_id}`. Errors with [`MemoryError::UserNotFound`]
    /// when the user has no profile and no memory records at all, so the
    /// HTTP layer can map it to a 404.
    pub fn get_user_summary(&self, user_id: &str) -> Result<UserMemorySummary> {
        let profile = self.storage.get_profile(user_id)?;
        let episode_count = self.storage.count_episodes(user_id)?;
        let event_log_count = self.storage.count_event_logs(user_id)?;
        let foresight_count = self.storage.count_foresights(user_id)?;

        if profile.is_none() && episode_count == 0 && event_log_count == 0 && foresight_count == 0 {
            return Err(MemoryError::UserNotFound(user_id.to_string()));
        }

        Ok(UserMemorySummary {
            user_id: user_id.to_string(),
            profile,
            episode_count,
            event_log_count,
            foresight_count,
        })
    }

    /// `GET /memory/{user_id}/episodes`.
    pub fn get_episodes(&self, user_id: &str, limit: Option<usize>, offset: usize) -> Result<Vec<EpisodeRecord>> {
        let limit = limit.unwrap_or(DEFAULT_EPISODE_LIMIT).clamp(1, MAX_EPISODE_LIMIT);
        Ok(self.storage.get_episodes(user_id, limit, offset)?)
    }

    /// `GET /memory/{user_id}/events`.
    pub fn get_event_logs(&self, user_id: &str, limit: Option<usize>, offset: usize) -> Result<Vec<EventLogRecord>> {
        let limit = limit.unwrap_or(DEFAULT_EVENT_LOG_LIMIT).clamp(1, MAX_EVENT_LOG_LIMIT);
        Ok(self.storage.get_event_logs(user_id, limit, offset)?)
    }

    /// `GET /memory/{user_id}/foresights`.
    pub fn get_foresights(&self, user_id: &str, limit: Option<usize>) -> Result<Vec<ForesightRecord>> {
        let limit = limit.unwrap_or(DEFAULT_FORESIGHT_LIMIT).clamp(1, MAX_FORESIGHT_LIMIT);
        Ok(self.storage.get_foresights(user_id, limit)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_protocol::{EpisodeDraft, EventLogDraft, ForesightDraft, ProfileDraft};

    fn service() -> MemoryService {
        MemoryService::new(Arc::new(Storage::open_in_memory().unwrap()))
    }

    #[test]
    fn memorize_rejects_an_entirely_empty_request() {
        let service = service();
        let err = service
            .memorize(MemorizeRequest { user_id: "u1".to_string(), ..Default::default() })
            .unwrap_err();
        assert!(matches!(err, MemoryError::EmptyRequest(_)));
    }

    #[test]
    fn memorize_writes_every_supplied_fragment() {
        let service = service();
        let result = service
            .memorize(MemorizeRequest {
                user_id: "u1".to_string(),
                episode: Some(EpisodeDraft {
                    summary: "kicked off the migration project".to_string(),
                    episode: None,
                    subject: None,
                }),
                event_logs: vec![EventLogDraft {
                    atomic_fact: "migration deadline is March".to_string(),
                    parent_episode_id: None,
                }],
                foresights: vec![ForesightDraft {
                    content: "likely to need a rollback plan".to_string(),
                    evidence: None,
                    parent_episode_id: None,
                }],
                profile: Some(ProfileDraft {
                    user_name: Some("Alex".to_string()),
                    personality: None,
                    interests: None,
                    hard_skills: None,
                    soft_skills: None,
                }),
            })
            .unwrap();

        assert!(result.episode_id.is_some());
        assert_eq!(result.event_log_ids.len(), 1);
        assert_eq!(result.foresight_ids.len(), 1);
        assert!(result.profile_updated);

        let summary = service.get_user_summary("u1").unwrap();
        assert_eq!(summary.episode_count, 1);
        assert_eq!(summary.event_log_count, 1);
        assert_eq!(summary.foresight_count, 1);
        assert_eq!(summary.profile.unwrap().user_name.as_deref(), Some("Alex"));
    }

    #[test]
    fn unknown_user_summary_is_not_found() {
        let service = service();
        let err = service.get_user_summary("ghost").unwrap_err();
        assert!(matches!(err, MemoryError::UserNotFound(_)));
    }

    #[test]
    fn episode_limit_is_clamped_to_the_documented_range() {
        let service = service();
        let episodes = service.get_episodes("u1", Some(10_000), 0).unwrap();
        assert!(episodes.is_empty());
    }

    #[test]
    fn search_finds_memorized_content() {
        let service = service();
        service
            .memorize(MemorizeRequest {
                user_id: "u1".to_string(),
                episode: Some(EpisodeDraft {
                    summary: "reviewed the onboarding flow".to_string(),
                    episode: None,
                    subject: None,
                }),
                ..Default::default()
            })
            .unwrap();

        let results = service
            .search(&SearchMemoryRequest {
                user_id: "u1".to_string(),
                query: "onboarding".to_string(),
                limit: None,
                method: Default::default(),
            })
            .unwrap();
        assert_eq!(results.hits.len(), 1);
    }
}
