//! Keyed deterministic pseudorandom stream.
//!
//! ChaCha20 seeded with `HMAC-SHA-256(key, domain || salt)`. The same key,
//! domain and salt always replay the same stream; anyone without the key sees
//! output indistinguishable from random. This stream only drives state matrix
//! derivation. Secret-affecting randomness (polynomial coefficients) never
//! comes from here.

use hmac::{Hmac, Mac};
use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::Sha256;

use super::error::{Error, Result};

pub(crate) type HmacSha256 = Hmac<Sha256>;

/// 2^-53, the spacing of the values returned by [`KeyedStream::next_unit`].
const UNIT_SCALE: f64 = 1.0 / (1u64 << 53) as f64;

/// Builds an HMAC-SHA-256 instance keyed with `key`.
pub(crate) fn keyed_mac(key: &[u8]) -> Result<HmacSha256> {
    <HmacSha256 as Mac>::new_from_slice(key).map_err(|_| Error::InvalidParameters("mac key"))
}

/// Uniform integer in `[0, bound)` by masking and rejection over whole
/// `next_u32` words. Depends only on the word stream, never on how `rand`
/// maps ranges.
pub(crate) fn sample_below<R: RngCore + ?Sized>(rng: &mut R, bound: u32) -> u32 {
    if bound <= 1 {
        return 0;
    }
    let mask = u32::MAX >> (bound - 1).leading_zeros();
    loop {
        let candidate = rng.next_u32() & mask;
        if candidate < bound {
            return candidate;
        }
    }
}

pub struct KeyedStream {
    rng: ChaCha20Rng,
}

impl KeyedStream {
    pub fn new(key: &[u8], domain: &[u8], salt: &[u8]) -> Result<Self> {
        let mut mac = keyed_mac(key)?;
        mac.update(domain);
        mac.update(salt);
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&mac.finalize().into_bytes());
        Ok(Self {
            rng: ChaCha20Rng::from_seed(seed),
        })
    }

    pub fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    pub fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    pub fn fill(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest);
    }

    /// Uniform integer in `[0, bound)`, or 0 when `bound` is 0.
    pub fn next_below(&mut self, bound: u32) -> u32 {
        sample_below(&mut self.rng, bound)
    }

    /// Uniform value in `[0, 1)` with 53 bits of precision.
    pub fn next_unit(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * UNIT_SCALE
    }

    /// Returns `true` with probability `p_true`.
    pub fn biased_choice(&mut self, p_true: f64) -> bool {
        self.next_unit() < p_true
    }
}
