//! Session-scoped retrieval-augmented generation: upload documents into an
//! ephemeral session, then ask questions answered only from what was retrieved.

pub mod config;
pub mod conversation;
pub mod docs;
pub mod embed;
pub mod error;
pub mod llm;
pub mod pack;
pub mod pipeline;
pub mod prompts;
pub mod retrieve;
pub mod session;

pub use config::Config;
pub use error::PipelineError;
pub use pipeline::{AnswerStream, QueryOutcome, QueryRequest, RagPipeline};
