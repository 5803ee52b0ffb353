//! Error types for the session layer.

/// Errors raised while admitting a client or resolving its identity.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The claimed credential failed verification (bad signature, wrong
    /// algorithm, expired, malformed).
    #[error("credential rejected: {0}")]
    InvalidCredential(String),

    /// The referenced account is banned.
    #[error("account {0} is banned")]
    Banned(String),

    /// The profile store could not be queried.
    #[error("profile lookup failed: {0}")]
    ProfileLookup(String),

    /// Geo-IP resolution failed. Never fatal.
    #[error("geo lookup failed: {0}")]
    GeoLookup(String),
}
