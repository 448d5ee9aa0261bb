use serde::{Deserialize, Serialize};

use super::error::{Error, Result};
use super::field::MAX_CHUNK_SIZE;

/// Parameters for creating and reading capsules.
///
/// Passed explicitly to [`crate::CapsuleCodec`] and [`crate::Vault`]; missing
/// fields fall back to the defaults when deserialized.
///
/// ```
/// use twinshare::CapsuleConfig;
///
/// let config: CapsuleConfig = serde_json::from_str(r#"{ "threshold": 4, "share_count": 7 }"#).unwrap();
/// assert_eq!(config.threshold, 4);
/// assert_eq!(config.chunk_size, CapsuleConfig::default().chunk_size);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapsuleConfig {
    /// Minimum number of shares needed to recover a chunk.
    pub threshold: u8,
    /// Shares produced per chunk and per document.
    pub share_count: u8,
    /// Plaintext bytes per field element, at most 15.
    pub chunk_size: u8,
    /// States in each derived state matrix.
    pub state_count: u16,
    /// Labels in the transition script walked on every decryption.
    pub script_len: u16,
    /// Largest plaintext accepted when creating a capsule, and the bound used
    /// to refuse oversized capsules when decoding.
    pub max_document_len: u64,
}

impl Default for CapsuleConfig {
    fn default() -> Self {
        Self {
            threshold: 3,
            share_count: 5,
            chunk_size: MAX_CHUNK_SIZE as u8,
            state_count: 64,
            script_len: 32,
            max_document_len: 16 * 1024 * 1024,
        }
    }
}

impl CapsuleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.threshold < 2 {
            return Err(Error::InvalidParameters("threshold must be at least 2"));
        }
        if self.share_count < self.threshold {
            return Err(Error::InvalidParameters("share count must be at least the threshold"));
        }
        if self.chunk_size == 0 || self.chunk_size as usize > MAX_CHUNK_SIZE {
            return Err(Error::InvalidParameters("chunk size must be between 1 and 15"));
        }
        if self.state_count < 2 {
            return Err(Error::InvalidParameters("state count must be at least 2"));
        }
        if self.script_len == 0 {
            return Err(Error::InvalidParameters("script must not be empty"));
        }
        let pool_len = self
            .max_chunks()
            .checked_mul(2 * u64::from(self.share_count))
            .filter(|len| *len <= u64::from(u32::MAX));
        if pool_len.is_none() {
            return Err(Error::InvalidParameters("maximum document length overflows the share pool"));
        }
        Ok(())
    }

    /// Largest chunk count a capsule may carry under this configuration.
    /// A zero chunk size counts as one byte per chunk.
    pub fn max_chunks(&self) -> u64 {
        self.max_document_len
            .div_ceil(u64::from(self.chunk_size.max(1)))
            .max(1)
    }
}
