//! Dispatch core - routes free-text support requests to backend actions
//!
//! This crate is the "brain" of the redress system:
//! - Classifies natural language into a closed intent set (`classifier`)
//! - Grounds the classifier with retrieved policy snippets (`retriever`)
//! - Resolves which order the customer is talking about (`resolver`)
//! - Executes business-rule-guarded actions (`handlers`, `dispatch`)
//! - Ties the pipeline together per request (`runtime`)
//!
//! # Safety principle
//!
//! The LLM is strictly a classifier. It never decides eligibility, amounts,
//! or outcomes; those are deterministic decisions made by the action handlers
//! against the store.

pub mod classifier;
pub mod dispatch;
pub mod handlers;
pub mod llm;
pub mod lookup;
pub mod resolver;
pub mod retriever;
pub mod runtime;

pub use classifier::IntentClassifier;
pub use dispatch::{ActionParams, ActionRegistry};
pub use llm::{HttpLlmClient, LlmClient, LlmError};
pub use lookup::{ExternalLookup, HttpLookupClient, LookupError, LookupResponse, NullLookup};
pub use resolver::{OrderResolver, Resolution};
pub use retriever::{PolicyIndex, PolicySnippet, RetrieverError};
pub use runtime::AgentRuntime;
