//! # Answer
//!
//! Grounded answer orchestration: evidence selection under a size budget,
//! generation over the selected evidence only, and citation validation.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       QaOrchestrator                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  query ──► Retrieve ──► GroundingPolicy::select                  │
//! │                                │                                 │
//! │                      empty ◄───┴───► SelectedContext             │
//! │                        │                    │                    │
//! │                        │                    ▼                    │
//! │                        │            AnswerGenerator              │
//! │                        │                    │                    │
//! │                        │                    ▼                    │
//! │                        │     GroundingPolicy::validate_citations │
//! │                        ▼                    │                    │
//! │                    Fallback ◄── invalid ────┴──► Answer          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod generator;
pub mod grounding;
pub mod ollama;
pub mod orchestrator;

pub use config::{
    BudgetUnit, DEFAULT_FALLBACK_MESSAGE, GroundingConfig, QaConfig, UngroundedPolicy,
};
pub use error::{AnswerError, Result};
pub use generator::{AnswerGenerator, ContextSnippet, ExtractiveGenerator, Generation};
pub use grounding::{GroundingPolicy, SelectedContext};
pub use ollama::{DEFAULT_GENERATION_MODEL, OllamaGenerator};
pub use orchestrator::{Answer, AnswerOutcome, QaOrchestrator, QaStage};
