//! Error kinds for the lane selector.
//!
//! Callers need to branch on failure *kind* rather than just display a
//! message, so the public surface uses `thiserror` instead of a bare
//! `anyhow::Error`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SelectError {
    /// No transports satisfy requirements, a mandatory pass (AM) failed,
    /// or the final lane count was zero.
    #[error("no reachable transport for '{pass}': {reason}")]
    Unreachable { pass: String, reason: String },

    /// Input capability flags are inconsistent with declared features
    /// (e.g. TAG requested with no TAG-capable transport anywhere).
    #[error("invalid wireup parameters: {0}")]
    InvalidParam(String),
}

pub type SelectResult<T> = Result<T, SelectError>;
