//! Error types for the RTP session library.

use crate::session::SessionRole;

/// Errors that can occur while configuring or activating an RTP session.
///
/// Variants map to specific failure modes across the stack:
///
/// - **URI**: [`InvalidUri`](Self::InvalidUri) — malformed `rtp://` URIs,
///   rejected before any session state changes.
/// - **Activation**: [`MissingCapability`](Self::MissingCapability),
///   [`LinkFailure`](Self::LinkFailure), [`Io`](Self::Io) — all three abort
///   the transition and leave the session in `Idle` with nothing built.
/// - **Streams**: [`NotActivated`](Self::NotActivated),
///   [`RoleMismatch`](Self::RoleMismatch),
///   [`StreamNotFound`](Self::StreamNotFound).
///
/// Query-parameter coercion problems are deliberately *not* errors; see
/// [`config`](crate::config) for the lenient defaulting policy.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The URI scheme was not `rtp` or the authority could not be parsed.
    #[error("invalid rtp URI: {reason}")]
    InvalidUri { reason: String },

    /// A required collaborator (session multiplexer, endpoint factory)
    /// could not be instantiated. Activation aborts before any endpoint
    /// is created.
    #[error("{what} is not available")]
    MissingCapability { what: &'static str },

    /// An endpoint could not be wired to the named multiplexer pad.
    #[error("failed to link endpoint to pad {pad}")]
    LinkFailure { pad: String },

    /// Underlying socket error while binding or configuring an endpoint.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stream request/release before [`activate`](crate::RtpSession::activate)
    /// has built the endpoint graph.
    #[error("session has no endpoints built yet")]
    NotActivated,

    /// The operation is not available for this session role (e.g. stream
    /// slots on a receiver).
    #[error("{op} is not available on a {role:?} session")]
    RoleMismatch {
        op: &'static str,
        role: SessionRole,
    },

    /// Release of a stream pad that is not registered with this session.
    #[error("stream pad not found: {0}")]
    StreamNotFound(u32),
}

/// Convenience alias for `Result<T, SessionError>`.
pub type Result<T> = std::result::Result<T, SessionError>;
