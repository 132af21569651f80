//! Stable content hashing for sweep provenance.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::errors::{ErrorInfo, SweepError};

/// Computes a stable hexadecimal hash for the provided serializable
/// payload. Used to fingerprint a resolved sweep plan in the manifest.
pub fn stable_hash_string<T: Serialize>(value: &T) -> Result<String, SweepError> {
    let bytes = serde_json::to_vec(value).map_err(|err| {
        SweepError::Io(ErrorInfo::new("hash-encode", "failed to encode hash payload")
            .with_hint(err.to_string()))
    })?;
    let digest = Sha256::digest(bytes);
    Ok(format!("{:x}", digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_payloads_hash_identically() {
        let a = stable_hash_string(&("spots", vec![1, 2, 3])).unwrap();
        let b = stable_hash_string(&("spots", vec![1, 2, 3])).unwrap();
        assert_eq!(a, b);
        let c = stable_hash_string(&("spots", vec![1, 2, 4])).unwrap();
        assert_ne!(a, c);
    }
}
