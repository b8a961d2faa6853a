//! Application-wide error types.
//!
//! Only startup paths (config, logger, client construction) return
//! [`AppError`]. A chat turn never fails: see `agent::TurnOrchestrator`.

use thiserror::Error;

use crate::llm::ProviderError;
use crate::memory::MemoryError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("llm error: {0}")]
    Llm(#[from] ProviderError),

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
