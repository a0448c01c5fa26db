use data_encoding::HEXLOWER_PERMISSIVE;
use iroh::SecretKey;

use crate::error::{Error, Result};

/// Parse a 64-character hex secret key, or generate a fresh one when none is
/// given. With `print` set, a generated key is written to stderr so the
/// identity can be reused.
pub fn get_or_create_secret(value: Option<&str>, print: bool) -> Result<SecretKey> {
    match value {
        Some(hex) => parse_secret(hex),
        None => {
            let key = SecretKey::generate(&mut rand::rng());
            if print {
                eprintln!("using secret key {}", secret_to_hex(&key));
            }
            Ok(key)
        }
    }
}

pub fn parse_secret(hex: &str) -> Result<SecretKey> {
    let hex = hex.trim();
    if hex.len() != 64 {
        return Err(Error::InvalidSecretKey(format!(
            "expected 64 hex characters, got {}",
            hex.len()
        )));
    }
    let bytes = HEXLOWER_PERMISSIVE
        .decode(hex.as_bytes())
        .map_err(|e| Error::InvalidSecretKey(e.to_string()))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::InvalidSecretKey("invalid key length".to_string()))?;
    Ok(SecretKey::from_bytes(&bytes))
}

pub fn secret_to_hex(key: &SecretKey) -> String {
    HEXLOWER_PERMISSIVE.encode(&key.to_bytes())
}
