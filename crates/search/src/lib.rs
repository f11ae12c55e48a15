//! Intent routing, scope isolation, retrieval fusion, and the streamed
//! QA engine (§4.7): the orchestrator that sits on top of storage,
//! the vector store, and the typed model clients.

mod engine;
mod error;
mod fusion;
mod intent;
mod multipath;
mod pipeline;
mod scope;
mod synthesis;
mod util;

pub use engine::SearchEngine;
pub use error::{Result, SearchError};
pub use fusion::{FusedHit, RrfFusion};
pub use intent::{analyze_query, classify_intent, Decomposition, Intent, IntentRouting};
pub use multipath::MultiPathPipeline;
pub use pipeline::{PipelineOutcome, StandardPipeline};
pub use scope::{resolve_scope, ScopedQuery};
pub use synthesis::{stream_simple_aggregation, SynthesisInput};
