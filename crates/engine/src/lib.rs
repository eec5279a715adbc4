//! Playsmith Engine
//!
//! Turns a manual test case into a runnable Playwright script:
//! - Grounds LLM prompts in a compressed application knowledge graph
//! - Synthesizes a script (fast path, step by step, heuristic fallback)
//! - Runs it on an external browser executor with retries
//! - Catches failures the executor reports as passes
//! - Repairs failing scripts with the LLM
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Engine                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  generate_draft(DraftRequest) -> AutomationDraft            │
//! │    ├── KnowledgeLoader -> KnowledgeGraph (cached, swapped)  │
//! │    ├── Synthesizer                                          │
//! │    │     ├── fast_path       (CompletionService)            │
//! │    │     ├── step_by_step    (CompletionService + snapshot) │
//! │    │     └── heuristic_script                               │
//! │    ├── ExecutionClient -> ExecutionOutcome (ExecutionBackend)│
//! │    ├── detector::effective_result -> EffectiveResult        │
//! │    └── repair loop (max 2)                                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  execute_adhoc(script) -> ExecutionReport                   │
//! │  compile_{actions,tool_calls,transcript}(..) -> script      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod cancel;
pub mod compile;
pub mod compressor;
pub mod detector;
pub mod error;
pub mod executor;
pub mod llm;
pub mod logging;
pub mod normalize;
pub mod pipeline;
pub mod store;
pub mod synthesis;
pub mod urls;

pub use compile::{ToolCall, TranscriptEntry};
pub use error::{EngineError, EngineResult};
pub use executor::{ExecuteRequest, ExecuteResponse, ExecutionBackend, ExecutionClient, RetryPolicy};
pub use llm::{CompletionService, OllamaClient};
pub use pipeline::{DraftRequest, Engine, PipelineState};
pub use store::{KnowledgeLoader, KnowledgeStore};
pub use urls::UrlRewriter;

pub use tokio_util::sync::CancellationToken;
