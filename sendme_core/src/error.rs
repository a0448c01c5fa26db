use std::path::PathBuf;

use thiserror::Error;

use crate::hash::BlobHash;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Coarse classification of [`Error`], used by callers that only care about
/// what kind of failure ended an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed path, name, ticket, key or config. Never retried.
    Input,
    /// Every addressing strategy for the peer was exhausted.
    ConnectionUnreachable,
    /// The peer authenticated with a different key than the ticket names.
    PeerMismatch,
    /// Received bytes did not hash to the claimed value.
    Integrity,
    /// Export destination collision.
    AlreadyExists,
    CorruptCollection,
    NotFound,
    Protocol,
    /// Local setup failed before any transfer started.
    Setup,
    Io,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("duplicate name {0:?} in collection")]
    DuplicateName(String),

    #[error("invalid path {}: {reason}", path.display())]
    InvalidPath { path: PathBuf, reason: String },

    #[error("unsupported entry {} (only regular files and directories can be shared)", path.display())]
    UnsupportedEntry { path: PathBuf },

    #[error("invalid hash {0:?}")]
    InvalidHash(String),

    #[error("invalid ticket: {0}")]
    InvalidTicket(String),

    #[error("invalid secret key: {0}")]
    InvalidSecretKey(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("peer {peer} unreachable: {}", attempts.join("; "))]
    ConnectionUnreachable { peer: String, attempts: Vec<String> },

    #[error("peer identity mismatch: expected {expected}, connected to {actual}")]
    PeerMismatch { expected: String, actual: String },

    #[error("integrity check failed for {hash}: data hashes to {actual}")]
    Integrity { hash: BlobHash, actual: BlobHash },

    #[error("size mismatch for {hash}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        hash: BlobHash,
        expected: u64,
        actual: u64,
    },

    #[error("destination already exists: {}", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("corrupt collection {hash}: {reason}")]
    CorruptCollection { hash: BlobHash, reason: String },

    #[error("blob {hash} not found")]
    NotFound { hash: BlobHash },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("frame of {len} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { len: u64, limit: u64 },

    #[error("remote error: {0}")]
    Remote(String),

    #[error("session directory {} already exists", path.display())]
    SessionExists { path: PathBuf },

    #[error("failed to bind endpoint: {0}")]
    Bind(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidName { .. }
            | Error::DuplicateName(_)
            | Error::InvalidPath { .. }
            | Error::UnsupportedEntry { .. }
            | Error::InvalidHash(_)
            | Error::InvalidTicket(_)
            | Error::InvalidSecretKey(_)
            | Error::InvalidConfig(_) => ErrorKind::Input,
            Error::ConnectionUnreachable { .. } => ErrorKind::ConnectionUnreachable,
            Error::PeerMismatch { .. } => ErrorKind::PeerMismatch,
            Error::Integrity { .. } | Error::SizeMismatch { .. } => ErrorKind::Integrity,
            Error::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Error::CorruptCollection { .. } => ErrorKind::CorruptCollection,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Protocol(_) | Error::FrameTooLarge { .. } | Error::Remote(_) => {
                ErrorKind::Protocol
            }
            Error::SessionExists { .. } | Error::Bind(_) => ErrorKind::Setup,
            Error::Connection(_) | Error::Io(_) | Error::Json(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn corrupt(hash: BlobHash, reason: impl Into<String>) -> Self {
        Error::CorruptCollection {
            hash,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let hash = BlobHash::new(b"x");
        assert_eq!(
            Error::InvalidTicket("bad".into()).kind(),
            ErrorKind::Input
        );
        assert_eq!(
            Error::AlreadyExists {
                path: PathBuf::from("a.txt")
            }
            .kind(),
            ErrorKind::AlreadyExists
        );
        assert_eq!(
            Error::Integrity { hash, actual: hash }.kind(),
            ErrorKind::Integrity
        );
        assert_eq!(
            Error::ConnectionUnreachable {
                peer: "p".into(),
                attempts: vec![]
            }
            .kind(),
            ErrorKind::ConnectionUnreachable
        );
    }

    #[test]
    fn test_unreachable_message_lists_attempts() {
        let err = Error::ConnectionUnreachable {
            peer: "abc".into(),
            attempts: vec!["direct: timed out".into(), "relay: invalid url".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("direct: timed out"));
        assert!(msg.contains("relay: invalid url"));
    }
}
