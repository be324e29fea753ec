//! Library half of the `groundqa` binary: configuration loading and the
//! command handler.

pub mod config;
pub mod handler;

pub use config::AppConfig;
pub use handler::{AskResponse, CitationSummary, IndexResponse, QaHandler, SearchResponse};
