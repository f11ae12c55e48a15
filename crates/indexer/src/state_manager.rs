use arc_swap::ArcSwap;
use context_protocol::{IndexingState, IndexingStatus};
use std::sync::Arc;

/// Publishes the singleton indexing-progress record (§4.1 C1). Every read
/// returns one complete `Arc<IndexingState>` snapshot, so callers never
/// observe a torn update even while a worker is mid-merge.
#[derive(Default)]
pub struct StateManager {
    state: ArcSwap<IndexingState>,
}

impl StateManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ArcSwap::from_pointee(IndexingState::default()),
        }
    }

    #[must_use]
    pub fn status(&self) -> Arc<IndexingState> {
        self.state.load_full()
    }

    /// Merges the given fields into the current snapshot and publishes
    /// the result atomically. `status` becomes `Running` whenever this is
    /// called with an active stage, matching the teacher's "safe to call
    /// from background workers" contract.
    pub fn set_active_stage(&self, update: ActiveStageUpdate) {
        let current = self.state.load();
        let mut next = (**current).clone();
        next.status = IndexingStatus::Running;
        next.active_stage = Some(update.stage);
        next.message = Some(update.detail);
        if let Some(progress) = update.progress {
            next.progress = progress;
        }
        if let Some(step_current) = update.step_current {
            next.step_current = Some(step_current);
        }
        if let Some(step_total) = update.step_total {
            next.step_total = Some(step_total);
        }
        self.state.store(Arc::new(next.clamp_progress()));
    }

    /// Clears active-stage fields without disturbing `status`.
    pub fn reset_active_state(&self) {
        let current = self.state.load();
        let mut next = (**current).clone();
        next.active_stage = None;
        next.step_current = None;
        next.step_total = None;
        self.state.store(Arc::new(next));
    }

    pub fn mark_error(&self, message: impl Into<String>) {
        let current = self.state.load();
        let mut next = (**current).clone();
        next.status = IndexingStatus::Error;
        next.last_error = Some(message.into());
        self.state.store(Arc::new(next));
    }

    pub fn mark_idle(&self) {
        let current = self.state.load();
        let mut next = (**current).clone();
        next.status = IndexingStatus::Idle;
        next.active_stage = None;
        self.state.store(Arc::new(next));
    }

    pub fn mark_paused(&self) {
        let current = self.state.load();
        let mut next = (**current).clone();
        next.status = IndexingStatus::Paused;
        self.state.store(Arc::new(next));
    }
}

#[derive(Debug, Clone, Default)]
pub struct ActiveStageUpdate {
    pub stage: String,
    pub detail: String,
    pub progress: Option<f32>,
    pub step_current: Option<u64>,
    pub step_total: Option<u64>,
}

impl ActiveStageUpdate {
    #[must_use]
    pub fn new(stage: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            detail: detail.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: f32) -> Self {
        self.progress = Some(progress);
        self
    }

    #[must_use]
    pub fn with_step(mut self, current: u64, total: u64) -> Self {
        self.step_current = Some(current);
        self.step_total = Some(total);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_clamped_to_0_100() {
        let manager = StateManager::new();
        manager.set_active_stage(ActiveStageUpdate::new("fast_embed", "x").with_progress(150.0));
        assert_eq!(manager.status().progress, 100.0);
    }

    #[test]
    fn reset_clears_active_fields_but_keeps_status() {
        let manager = StateManager::new();
        manager.set_active_stage(ActiveStageUpdate::new("fast_parse", "x"));
        manager.reset_active_state();
        let status = manager.status();
        assert_eq!(status.status, IndexingStatus::Running);
        assert!(status.active_stage.is_none());
    }

    #[test]
    fn repeated_identical_snapshots_are_allowed() {
        let manager = StateManager::new();
        let update = ActiveStageUpdate::new("fast_parse", "x");
        manager.set_active_stage(update.clone());
        manager.set_active_stage(update);
        assert_eq!(manager.status().active_stage.as_deref(), Some("fast_parse"));
    }
}
