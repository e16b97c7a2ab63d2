//! Mender failure analysis
//!
//! Turns a [`FailureContext`](mender_types::FailureContext) and the tool
//! catalog into a validated [`FixPlan`](mender_types::FixPlan) by asking an
//! external reasoning provider, and keeps an audit trail of every call.

pub mod client;
pub mod error;
pub mod history;
pub mod http;
pub mod parse;
pub mod prompt;
pub mod provider;

pub use client::{Analysis, AnalysisClient, AnalysisConfig};
pub use error::{AnalysisError, AnalysisResult, ProviderError};
pub use history::{InteractionLog, DEFAULT_HISTORY_PAGE};
pub use http::{HttpLlmProvider, ProviderConfig, ProviderKind};
pub use parse::{parse_reply, ParseResult};
pub use provider::{Completion, CompletionRequest, LlmProvider};
