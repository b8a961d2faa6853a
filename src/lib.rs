//! threadmind — a chat agent whose long-term memory lives in an external
//! graph memory service.
//!
//! Each turn stores the user's message, pulls a synthesized context block
//! from memory, asks the language model for a reply, and stores the reply in
//! the background. See [`agent::TurnOrchestrator`].

pub mod agent;
pub mod chunker;
pub mod config;
pub mod console;
pub mod error;
pub mod llm;
pub mod logger;
pub mod memory;
pub mod message;
pub mod runtime;
pub mod tasks;
