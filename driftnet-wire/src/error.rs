use thiserror::Error;

/// A decoding failure on the peer wire protocol (§4.1, §7 `MalformedFrame`).
///
/// Every variant is recoverable: the caller drops the offending frame and
/// keeps the connection (removal, if any, is a liveness decision made
/// elsewhere, not a consequence of a bad frame).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("bad protocol signature {0:#06x}")]
    BadSignature(u16),
    #[error("unknown message id {0}")]
    UnknownMessageId(u8),
    #[error("protocol version mismatch: got {0}")]
    VersionMismatch(u8),
    #[error("frame truncated: needed {needed} more byte(s)")]
    Truncated { needed: usize },
    #[error("string exceeds 255-byte limit")]
    StringTooLong,
    #[error("invalid utf-8 in frame")]
    InvalidUtf8,
}
