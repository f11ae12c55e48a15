//! Indexing pipeline (§4): the state manager, the fast and deep
//! processors, the discovery/watch loop, and the scheduler that drives
//! them over the pending-file queues.

mod deep;
mod discovery;
mod error;
mod fast;
mod prompts;
mod scheduler;
mod state_manager;

pub use deep::DeepProcessor;
pub use discovery::{DiscoveryConfig, FileDiscovery};
pub use error::{IndexerError, Result};
pub use fast::FastProcessor;
pub use scheduler::IndexerScheduler;
pub use state_manager::{ActiveStageUpdate, StateManager};
