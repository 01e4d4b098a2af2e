//! Signing and authentication utilities for the CLOB venue.
//!
//! This module provides utilities for:
//! - Creating signers from private keys
//! - Computing wallet addresses
//! - L1 authentication headers for private endpoints
//! - Cached signer for reduced latency

use std::collections::HashMap;
use std::sync::RwLock;

use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use once_cell::sync::Lazy;
use tracing::debug;

use crate::error::ExecutionError;
use crate::metrics;

/// How submitted orders are signed on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureType {
    /// Externally owned account, standard wallet.
    #[default]
    Eoa,
    /// Email/Magic proxy wallet.
    Proxy,
    /// Gnosis Safe multi-sig.
    GnosisSafe,
}

impl SignatureType {
    /// Wire value the venue expects.
    pub fn as_u8(self) -> u8 {
        match self {
            SignatureType::Eoa => 0,
            SignatureType::Proxy => 1,
            SignatureType::GnosisSafe => 2,
        }
    }

    /// Parse the numeric config value. Unknown values fall back to EOA.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => SignatureType::Proxy,
            2 => SignatureType::GnosisSafe,
            _ => SignatureType::Eoa,
        }
    }
}

/// Global signer cache, keyed by a hash of the private key so raw keys
/// are not held as map keys.
static SIGNER_CACHE: Lazy<RwLock<HashMap<u64, PrivateKeySigner>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

fn key_hash(private_key: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    private_key.hash(&mut hasher);
    hasher.finish()
}

/// Create a signer from a hex-encoded private key, with or without the
/// "0x" prefix.
pub fn create_signer(private_key: &str) -> Result<PrivateKeySigner, ExecutionError> {
    let key = private_key.strip_prefix("0x").unwrap_or(private_key);
    let bytes = hex::decode(key)
        .map_err(|e| ExecutionError::SigningError(format!("Invalid private key hex: {}", e)))?;

    if bytes.len() != 32 {
        return Err(ExecutionError::SigningError(format!(
            "Private key must be 32 bytes, got {}",
            bytes.len()
        )));
    }

    let mut key_bytes = [0u8; 32];
    key_bytes.copy_from_slice(&bytes);

    PrivateKeySigner::from_bytes(&key_bytes.into())
        .map_err(|e| ExecutionError::SigningError(format!("Failed to create signer: {}", e)))
}

/// Get or create a cached signer for the given private key.
///
/// Avoids signer recreation on every authenticated call.
pub fn get_or_create_signer(private_key: &str) -> Result<PrivateKeySigner, ExecutionError> {
    let hash = key_hash(private_key);

    {
        let cache = SIGNER_CACHE.read().map_err(|e| {
            ExecutionError::SigningError(format!("Failed to acquire cache read lock: {}", e))
        })?;

        if let Some(signer) = cache.get(&hash) {
            return Ok(signer.clone());
        }
    }

    let signer = create_signer(private_key)?;

    {
        let mut cache = SIGNER_CACHE.write().map_err(|e| {
            ExecutionError::SigningError(format!("Failed to acquire cache write lock: {}", e))
        })?;

        // Another thread may have raced us here.
        if let Some(existing) = cache.get(&hash) {
            return Ok(existing.clone());
        }

        debug!("Caching new signer");
        cache.insert(hash, signer.clone());
    }

    Ok(signer)
}

/// Clear the signer cache (for tests or key rotation).
pub fn clear_signer_cache() {
    if let Ok(mut cache) = SIGNER_CACHE.write() {
        cache.clear();
        debug!("Signer cache cleared");
    }
}

/// Get the wallet address from a private key.
pub fn address_from_private_key(private_key: &str) -> Result<String, ExecutionError> {
    let signer = create_signer(private_key)?;
    Ok(format!("{:?}", signer.address()))
}

/// Sign a message with the private key (cached signer).
pub async fn sign_message(private_key: &str, message: &[u8]) -> Result<Vec<u8>, ExecutionError> {
    let signer = get_or_create_signer(private_key)?;
    let signature = signer
        .sign_message(message)
        .await
        .map_err(|e| ExecutionError::SigningError(format!("Failed to sign message: {}", e)))?;
    Ok(signature.as_bytes().to_vec())
}

/// Generate CLOB authentication headers by signing the current
/// timestamp to prove key ownership.
pub async fn generate_auth_headers(
    private_key: &str,
) -> Result<Vec<(String, String)>, ExecutionError> {
    let start = std::time::Instant::now();
    let signer = get_or_create_signer(private_key)?;
    let address = format!("{:?}", signer.address());

    let timestamp = chrono::Utc::now().timestamp_millis().to_string();
    let message = format!("polymarket:{}", timestamp);

    let signature = signer
        .sign_message(message.as_bytes())
        .await
        .map_err(|e| ExecutionError::SigningError(format!("Failed to sign auth message: {}", e)))?;

    metrics::record_signing_latency(start);
    debug!(address = %address, "Generated auth headers");

    Ok(vec![
        ("POLY_ADDRESS".to_string(), address),
        (
            "POLY_SIGNATURE".to_string(),
            format!("0x{}", hex::encode(signature.as_bytes())),
        ),
        ("POLY_TIMESTAMP".to_string(), timestamp),
        ("POLY_NONCE".to_string(), "0".to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_type_round_trips() {
        assert_eq!(SignatureType::from_u8(0), SignatureType::Eoa);
        assert_eq!(SignatureType::from_u8(1), SignatureType::Proxy);
        assert_eq!(SignatureType::from_u8(2), SignatureType::GnosisSafe);
        // Unknown defaults to EOA
        assert_eq!(SignatureType::from_u8(99), SignatureType::Eoa);
        assert_eq!(SignatureType::Proxy.as_u8(), 1);
    }

    #[test]
    fn create_signer_valid_key() {
        // Not a real key, just 32 valid bytes
        let key = "0x0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
        assert!(create_signer(key).is_ok());
    }

    #[test]
    fn create_signer_without_prefix() {
        let key = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
        assert!(create_signer(key).is_ok());
    }

    #[test]
    fn create_signer_invalid_hex() {
        assert!(create_signer("0xnot_valid_hex").is_err());
    }

    #[test]
    fn create_signer_wrong_length() {
        assert!(create_signer("0x1234").is_err());
    }

    #[test]
    fn address_from_key() {
        let key = "0x0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
        let addr = address_from_private_key(key).unwrap();
        assert!(addr.starts_with("0x"));
        assert_eq!(addr.len(), 42);
    }

    #[tokio::test]
    async fn sign_message_produces_65_bytes() {
        let key = "0x0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
        let sig = sign_message(key, b"hello").await.unwrap();
        assert_eq!(sig.len(), 65);
    }
}
