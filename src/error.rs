//! Error types for the query and normalization layers.
//!
//! | Error | Raised by | Policy |
//! |-------|-----------|--------|
//! | [`Rejected`] | [`normalize`](crate::normalize) | dropped and counted, never propagated |
//! | [`BackendError`] | backend adapters | wrapped by the gateway |
//! | [`GatewayError`] | [`QueryGateway`](crate::gateway::QueryGateway) | propagated to the caller |
//! | [`RegistryError`] | [`FieldRegistry::validate`](crate::fields::FieldRegistry::validate) | reported |
//!
//! Discovery catches gateway errors per candidate and records them in its
//! report instead of propagating them.

use thiserror::Error;

/// Failure reported by a backend adapter.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("backend returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body could not be decoded.
    #[error("malformed backend response: {0}")]
    Decode(String),

    /// The query could not be expressed for this backend (bad cursor, etc.).
    #[error("invalid query: {0}")]
    QueryBuild(String),

    /// The addressed source does not exist or refused access.
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

/// Failure of a whole gateway call.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to query {source_id}: {error}")]
    Backend {
        source_id: String,
        #[source]
        error: BackendError,
    },

    #[error("{source_id} is not a {expected} source")]
    WrongSourceKind {
        source_id: String,
        expected: &'static str,
    },
}

/// Why a raw record could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejected {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
}

/// Broken field-registry invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("duplicate field name `{0}`")]
    DuplicateName(String),

    #[error("field `{name}` has order {found:?}, expected {expected:?}")]
    OrderMismatch {
        name: String,
        expected: Option<usize>,
        found: Option<usize>,
    },
}
