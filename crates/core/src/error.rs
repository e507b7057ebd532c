//! Error taxonomy for the engine. Each kind is surfaced distinctly; local
//! components never panic on an expected failure mode, they return one of
//! these (or fold it into a diagnostic/exit-reason field, per variant).

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    ConfigError(String),
}
