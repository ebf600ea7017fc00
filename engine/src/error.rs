//! Engine error kinds.
//!
//! Mirrors the four failure modes the patch engine can hit, plus
//! [`EngineError::UnsupportedCapability`] for patch tokens a given model
//! never implements. Every public entry point in this crate returns
//! `Result<_, EngineError>` — there is no panicking on attacker/user
//! controlled input (firmware bytes or patch tokens).

use thiserror::Error;

/// Failure modes of the patch engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A byte signature could not be located within the search window.
    #[error("pattern not found: {0}")]
    PatternNotFound(String),

    /// A patch parameter was out of its documented range or malformed.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A checksum range would read or write past the end of the buffer.
    #[error("checksum range exceeds buffer: offset {offset}, size {size}, buffer len {len}")]
    RangeError {
        offset: usize,
        size: usize,
        len: usize,
    },

    /// A synthesized instruction snippet could not be assembled.
    #[error("assembly error: {0}")]
    AssemblyError(String),

    /// The named capability is not implemented by the named model.
    #[error("unsupported capability '{capability}' on model '{model}'")]
    UnsupportedCapability {
        capability: &'static str,
        model: &'static str,
    },
}

pub type EngineResult<T> = Result<T, EngineError>;
