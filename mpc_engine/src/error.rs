use thiserror::Error;

use crate::transport::TransportError;

/// Errors surfaced by openers, multipliers and preprocessing sources.
///
/// None of them is recoverable inside this crate: the caller has to abort the computation
/// (or, for [`ProtocolError::InsufficientPreprocessing`], refill and retry the whole
/// higher-level operation).
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Authenticated opening or redundant reconstruction check failed.
    #[error("MAC check failed")]
    MacFail,

    /// Shares or payloads received from other parties are malformed.
    #[error("invalid share set: {0}")]
    InvalidShareSet(String),

    #[error("preprocessing exhausted: no {kind} available")]
    InsufficientPreprocessing { kind: &'static str },

    /// Caller violated the open/multiply state machine.
    #[error("protocol misuse: {0}")]
    ProtocolMisuse(&'static str),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
