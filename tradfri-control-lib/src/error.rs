use thiserror::Error;

/// Errors surfaced by the gateway client.
///
/// Every failure is propagated to the caller as one of these variants; the
/// library never substitutes defaults, retries, or terminates the process.
/// Whether a [`Error::Handshake`] is fatal is the embedding application's
/// decision.
#[derive(Debug, Error)]
pub enum Error {
    /// The DTLS handshake with the gateway failed. Terminal for the session.
    #[error("DTLS handshake with {gateway} failed: {reason}")]
    Handshake { gateway: String, reason: String },

    /// A write or read failed after the session was established.
    #[error("gateway connection error: {0}")]
    Connection(String),

    /// No response arrived within the read window.
    #[error("timed out waiting for a gateway response")]
    ReadTimeout,

    /// Malformed bytes on encode or decode.
    #[error("malformed CoAP message: {0}")]
    Codec(String),

    /// The response carried a different message id than the request.
    #[error("response message id {actual} does not match request id {expected}")]
    Correlation { expected: u16, actual: u16 },

    /// The caller supplied a domain-invalid value.
    #[error("invalid value: {0}")]
    Validation(String),

    /// The response payload did not parse into the expected shape.
    #[error("unexpected response payload: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
