use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of a cache signature in bytes.
pub const SIGNATURE_LEN: usize = 32;

/// Hash of everything that influences a computed fake view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Signature([u8; SIGNATURE_LEN]);

impl Signature {
    pub fn from_bytes(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; SIGNATURE_LEN] = bytes.get(..SIGNATURE_LEN)?.try_into().ok()?;
        Some(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Incremental signature hasher. Every field is length or tag prefixed so
/// that adjacent fields can not alias each other.
pub struct SignatureBuilder {
    hasher: Sha256,
}

impl SignatureBuilder {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.hasher.update((bytes.len() as u64).to_be_bytes());
        self.hasher.update(bytes);
        self
    }

    pub fn push_str(&mut self, value: &str) -> &mut Self {
        self.push_bytes(value.as_bytes())
    }

    pub fn push_u64(&mut self, value: u64) -> &mut Self {
        self.hasher.update(value.to_be_bytes());
        self
    }

    pub fn push_bool(&mut self, value: bool) -> &mut Self {
        self.hasher.update([value as u8]);
        self
    }

    /// Hashes the JSON encoding of a config value.
    pub fn push_json<T: Serialize>(&mut self, value: &T) -> &mut Self {
        match serde_json::to_vec(value) {
            Ok(json) => self.push_bytes(&json),
            // Unserializable configs still change the signature.
            Err(err) => self.push_str(&err.to_string()),
        }
    }

    pub fn finish(self) -> Signature {
        let digest = self.hasher.finalize();
        let mut bytes = [0u8; SIGNATURE_LEN];
        bytes.copy_from_slice(&digest);
        Signature(bytes)
    }
}

impl Default for SignatureBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Config {
        distance: u8,
    }

    #[test]
    fn test_signature_is_deterministic() {
        let mut a = SignatureBuilder::new();
        a.push_str("hide").push_json(&Config { distance: 4 }).push_bool(true);
        let mut b = SignatureBuilder::new();
        b.push_str("hide").push_json(&Config { distance: 4 }).push_bool(true);
        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn test_config_value_changes_signature() {
        let mut a = SignatureBuilder::new();
        a.push_json(&Config { distance: 4 });
        let mut b = SignatureBuilder::new();
        b.push_json(&Config { distance: 5 });
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn test_field_boundaries() {
        let mut a = SignatureBuilder::new();
        a.push_str("ab").push_str("c");
        let mut b = SignatureBuilder::new();
        b.push_str("a").push_str("bc");
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn test_display_and_slice() {
        let sig = SignatureBuilder::new().finish();
        assert_eq!(sig.to_string().len(), 64);
        assert_eq!(Signature::from_slice(sig.as_bytes()), Some(sig));
        assert_eq!(Signature::from_slice(&[0u8; 4]), None);
    }
}
