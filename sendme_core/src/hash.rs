//! BLAKE3 content hashes and blob formats.

use std::fmt;
use std::str::FromStr;

use data_encoding::BASE32_NOPAD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// CIDv1 prefix: version 1, `raw` codec, BLAKE3 multihash, 32 byte digest
const CID_PREFIX: [u8; 4] = [0x01, 0x55, 0x1e, 0x20];

/// A 32 byte BLAKE3 digest identifying immutable content.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobHash([u8; 32]);

impl BlobHash {
    pub const LEN: usize = 32;

    /// Hash a byte slice.
    pub fn new(data: impl AsRef<[u8]>) -> Self {
        Self(*blake3::hash(data.as_ref()).as_bytes())
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        blake3::Hash::from_bytes(self.0).to_hex().to_string()
    }

    /// Render as a CIDv1 string (multibase base32, lowercase).
    pub fn to_cid(&self) -> String {
        let mut bytes = Vec::with_capacity(CID_PREFIX.len() + Self::LEN);
        bytes.extend_from_slice(&CID_PREFIX);
        bytes.extend_from_slice(&self.0);
        format!("b{}", BASE32_NOPAD.encode(&bytes).to_ascii_lowercase())
    }

    fn from_cid(s: &str) -> Option<Self> {
        let body = s.strip_prefix('b')?;
        let bytes = BASE32_NOPAD
            .decode(body.to_ascii_uppercase().as_bytes())
            .ok()?;
        let digest = bytes.strip_prefix(&CID_PREFIX[..])?;
        let digest: [u8; 32] = digest.try_into().ok()?;
        Some(Self(digest))
    }
}

impl From<blake3::Hash> for BlobHash {
    fn from(hash: blake3::Hash) -> Self {
        Self(*hash.as_bytes())
    }
}

impl fmt::Display for BlobHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for BlobHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobHash({})", self.to_hex())
    }
}

impl FromStr for BlobHash {
    type Err = Error;

    /// Accepts both the hex and the CID rendering.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == Self::LEN * 2 {
            return blake3::Hash::from_hex(s)
                .map(Self::from)
                .map_err(|_| Error::InvalidHash(s.to_string()));
        }
        Self::from_cid(s).ok_or_else(|| Error::InvalidHash(s.to_string()))
    }
}

impl Serialize for BlobHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for BlobHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            <[u8; 32]>::deserialize(deserializer).map(Self)
        }
    }
}

/// How a receiver interprets a root hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BlobFormat {
    /// A single blob.
    Raw,
    /// A sequence of hashes: collection manifest first, then member blobs.
    HashSeq,
}

impl BlobFormat {
    pub fn is_raw(&self) -> bool {
        matches!(self, BlobFormat::Raw)
    }
}

impl fmt::Display for BlobFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobFormat::Raw => f.write_str("raw"),
            BlobFormat::HashSeq => f.write_str("hashseq"),
        }
    }
}

/// A hash together with the format it should be interpreted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HashAndFormat {
    pub hash: BlobHash,
    pub format: BlobFormat,
}

impl HashAndFormat {
    pub fn new(hash: BlobHash, format: BlobFormat) -> Self {
        Self { hash, format }
    }

    pub fn raw(hash: BlobHash) -> Self {
        Self::new(hash, BlobFormat::Raw)
    }

    pub fn hash_seq(hash: BlobHash) -> Self {
        Self::new(hash, BlobFormat::HashSeq)
    }
}

/// How hashes are printed to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashFormat {
    #[default]
    Hex,
    Cid,
}

impl HashFormat {
    pub fn render(&self, hash: &BlobHash) -> String {
        match self {
            HashFormat::Hex => hash.to_hex(),
            HashFormat::Cid => hash.to_cid(),
        }
    }
}

impl FromStr for HashFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hex" => Ok(HashFormat::Hex),
            "cid" => Ok(HashFormat::Cid),
            other => Err(Error::InvalidConfig(format!(
                "unknown hash format {other:?} (expected hex or cid)"
            ))),
        }
    }
}

/// Split a hash sequence blob into its member hashes.
///
/// Returns `None` when the length is not a multiple of the hash size.
pub fn parse_hash_seq(bytes: &[u8]) -> Option<Vec<BlobHash>> {
    if bytes.len() % BlobHash::LEN != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(BlobHash::LEN)
            .map(|chunk| {
                let mut digest = [0u8; 32];
                digest.copy_from_slice(chunk);
                BlobHash(digest)
            })
            .collect(),
    )
}

/// Encode member hashes as a hash sequence blob.
pub fn encode_hash_seq<'a>(hashes: impl IntoIterator<Item = &'a BlobHash>) -> Vec<u8> {
    hashes
        .into_iter()
        .flat_map(|h| h.as_bytes().iter().copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_roundtrip() {
        let hash = BlobHash::new(b"hello");
        let hex = hash.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(hex, blake3::hash(b"hello").to_hex().to_string());
        assert_eq!(hex.parse::<BlobHash>().unwrap(), hash);
    }

    #[test]
    fn test_cid_roundtrip() {
        let hash = BlobHash::new(b"world");
        let cid = hash.to_cid();
        assert!(cid.starts_with("bafkr4"));
        assert_eq!(cid.len(), 59);
        assert_eq!(cid.parse::<BlobHash>().unwrap(), hash);
    }

    #[test]
    fn test_invalid_hash_rejected() {
        assert!("not-a-hash".parse::<BlobHash>().is_err());
        assert!("zz".repeat(32).parse::<BlobHash>().is_err());
    }

    #[test]
    fn test_json_uses_hex() {
        let hash = BlobHash::new(b"json");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash.to_hex()));
        let back: BlobHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }

    #[test]
    fn test_bincode_uses_raw_bytes() {
        let hash = BlobHash::new(b"bin");
        let bytes = bincode::serialize(&hash).unwrap();
        assert_eq!(bytes.len(), 32);
        let back: BlobHash = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, hash);
    }

    #[test]
    fn test_hash_seq_encoding() {
        let hashes = vec![BlobHash::new(b"a"), BlobHash::new(b"b")];
        let encoded = encode_hash_seq(&hashes);
        assert_eq!(encoded.len(), 64);
        assert_eq!(parse_hash_seq(&encoded).unwrap(), hashes);
        assert!(parse_hash_seq(&encoded[..40]).is_none());
    }
}
