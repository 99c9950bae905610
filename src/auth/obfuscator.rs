//! Reversible obfuscation for tokens at rest
//!
//! XORs the input with a repeating embedded key and base64-encodes the result.
//! This only keeps bearer tokens out of plain sight in save files; it is not
//! encryption in any meaningful sense.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

const EMBEDDED_KEY: &[u8] = b"pl4ys3ss10n::l0cal-st0re::k3y";

/// Symmetric keyed byte transform with a printable encoding.
#[derive(Debug, Clone)]
pub struct Obfuscator {
    key: Vec<u8>,
}

impl Obfuscator {
    /// Build an obfuscator with a custom key. An empty key falls back to the
    /// embedded one.
    pub fn with_key(key: impl Into<Vec<u8>>) -> Self {
        let key = key.into();
        if key.is_empty() {
            return Self::default();
        }
        Self { key }
    }

    fn apply(&self, data: &[u8]) -> Vec<u8> {
        data.iter()
            .zip(self.key.iter().cycle())
            .map(|(b, k)| b ^ k)
            .collect()
    }

    /// Obfuscate `plaintext`. Empty input yields empty output.
    pub fn encrypt(&self, plaintext: &str) -> String {
        if plaintext.is_empty() {
            return String::new();
        }
        STANDARD.encode(self.apply(plaintext.as_bytes()))
    }

    /// Reverse [`encrypt`](Self::encrypt). Any failure yields an empty string.
    pub fn decrypt(&self, encoded: &str) -> String {
        if encoded.is_empty() {
            return String::new();
        }

        let bytes = match STANDARD.decode(encoded.trim()) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!("Stored token is not valid base64: {}", e);
                return String::new();
            }
        };

        match String::from_utf8(self.apply(&bytes)) {
            Ok(s) => s,
            Err(_) => {
                tracing::warn!("Stored token did not decode to UTF-8 (wrong key or corrupted)");
                String::new()
            }
        }
    }

    /// True if `encoded` decrypts to a non-empty string.
    pub fn is_valid_encoded(&self, encoded: &str) -> bool {
        !self.decrypt(encoded).is_empty()
    }
}

impl Default for Obfuscator {
    fn default() -> Self {
        Self {
            key: EMBEDDED_KEY.to_vec(),
        }
    }
}
