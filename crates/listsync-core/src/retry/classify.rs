//! Classify protocol status codes into retry kinds.

/// High-level classification of a response status for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Applied by the server (2xx).
    Success,
    /// Server asked us to slow down (429, 503). Retried with backoff.
    Throttled,
    /// Any other status. Surfaced immediately.
    Other,
}

/// Classify an HTTP status code.
///
/// Only 429 and 503 are throttling. Gateway timeouts and other 5xx are not
/// retried: the request may already have been applied.
pub fn classify_http_status(code: u32) -> ErrorKind {
    match code {
        200..=299 => ErrorKind::Success,
        429 | 503 => ErrorKind::Throttled,
        _ => ErrorKind::Other,
    }
}
