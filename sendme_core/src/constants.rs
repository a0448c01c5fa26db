/// Buffer size for hashing and copying blob data (1MB)
pub const BUFFER_SIZE: usize = 1024 * 1024;

/// Upper bound for a hash sequence (and its manifest) read into memory (32MB)
pub const MAX_HASH_SEQ_SIZE: u64 = 32 * 1024 * 1024;

/// Maximum length of a single path component in a collection name
pub const MAX_COMPONENT_LENGTH: usize = 255;

/// Maximum length of a full collection name
pub const MAX_NAME_LENGTH: usize = 4096;

/// Prefix of the send-side session directory
pub const SEND_DIR_PREFIX: &str = ".sendme-send-";

/// Prefix of the receive-side session directory
pub const RECV_DIR_PREFIX: &str = ".sendme-recv-";
