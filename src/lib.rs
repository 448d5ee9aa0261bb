//! Deniable two-document capsules built on [Shamir's Secret Sharing](https://en.wikipedia.org/wiki/Shamir%27s_Secret_Sharing)
//! over the prime field GF(2^127 - 1).
//!
//! A capsule is a single artifact that opens to one of two documents depending
//! on the key supplied. Without a key its share pool looks uniformly random,
//! and one key gives no way to tell which other shares belong to a second
//! document.
//!
//! # Usage
//! ## (std)
//!
//! ```
//! use twinshare::{Key, KeyMaterial};
//!
//! let keys = KeyMaterial::from_master(&Key::from_bytes([0x42; 32])).unwrap();
//! # #[cfg(feature = "std")]
//! # {
//! let capsule = twinshare::create_capsule(b"HELLO", b"WORLD", &keys).unwrap();
//!
//! assert_eq!(twinshare::decrypt(&capsule, keys.true_key()).unwrap(), b"HELLO");
//! assert_eq!(twinshare::decrypt(&capsule, keys.false_key()).unwrap(), b"WORLD");
//! # }
//! ```
//!
//! ## Secret sharing on its own
//!
//! ```
//! use twinshare::{FieldElement, SecretSharing};
//! use rand_chacha::{rand_core::SeedableRng, ChaCha8Rng};
//!
//! // Set a minimum threshold of 3 shares
//! let sss = SecretSharing(3);
//! let mut rng = ChaCha8Rng::from_seed([0x90; 32]);
//! // Split the secret 42 into 5 shares
//! let shares = sss.split_rng(FieldElement::from(42u64), 5, &mut rng).unwrap();
//! // Any 3 of them recover the original secret!
//! let secret = sss.reconstruct(&shares[2..]).unwrap();
//! assert_eq!(secret, FieldElement::from(42u64));
//! ```
//!
//! # How a capsule is opened
//!
//! Every key deterministically derives a state matrix (a keyed finite
//! automaton) and two initial states, *true* and *false*. Walking the public
//! transition script from an initial state yields a path signature, and the
//! signature alone decides which capsule slot and which share ids belong to
//! the walk. Decryption walks both branches, reconstructs both candidates and
//! keeps the one whose checksum verifies.
//!
//! # Randomness
//!
//! - Polynomial coefficients, salts and scripts come from a caller-supplied
//!   cryptographically secure RNG (`rand::rngs::OsRng` in the `std` helpers).
//! - State matrices come from ChaCha20 seeded with HMAC-SHA-256 of the key,
//!   see [`KeyedStream`]. The two are never mixed.
//!
//! # Feature flags
//!
//! - `std` — enables the OS-randomness helpers such as [`create_capsule`] and
//!   [`SecretSharing::split`]. Without `std`, use the `_rng` variants.
//! - `zeroize_memory` — clears shares, polynomials, keys and matrices on drop.
//! - `fuzzing` — derives `Arbitrary` for share types.
#![cfg_attr(not(feature = "std"), no_std)]

mod capsule;
mod config;
mod error;
mod executor;
mod field;
mod keys;
mod math;
mod matrix;
mod partition;
mod share;
mod stream;
mod vault;

extern crate alloc;

use alloc::vec::Vec;
use hashbrown::HashSet;

pub use capsule::{Capsule, CapsuleCodec, SlotMetadata, CHECKSUM_LEN, MAGIC, VERSION};
pub use config::CapsuleConfig;
pub use error::{Error, Result};
pub use executor::{run, PathSignature, SIGNATURE_LEN};
pub use field::{FieldElement, MAX_CHUNK_SIZE, PRIME};
pub use keys::{Branch, Key, KeyMaterial, KEY_LEN};
pub use matrix::{
    derive_initial_states, generate, DerivationParams, InitialStatePair, Label, State,
    StateId, StateMatrix, Transition, LABEL_COUNT, SALT_LEN,
};
pub use partition::{IdSubset, Partitioner};
pub use share::{Share, ShareId, ShareSet, SHARE_LEN};
pub use stream::KeyedStream;
pub use vault::Vault;

/// Tuple struct which implements methods to split and reconstruct secrets over GF(2^127 - 1).
/// Its only parameter is the minimum shares threshold.
///
/// Usage example:
/// ```
/// # use twinshare::{FieldElement, SecretSharing};
/// # use rand_chacha::{rand_core::SeedableRng, ChaCha8Rng};
/// // Set a minimum threshold of 10 shares
/// let sss = SecretSharing(10);
/// let mut rng = ChaCha8Rng::from_seed([0x90; 32]);
/// // Obtain 10 shares of the secret 1234
/// let shares = sss.split_rng(FieldElement::from(1234u64), 10, &mut rng).unwrap();
/// // Recover the original secret!
/// let secret = sss.reconstruct(&shares).unwrap();
/// assert_eq!(secret, FieldElement::from(1234u64));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SecretSharing(pub u8);

impl SecretSharing {
    fn check_threshold(&self) -> Result<()> {
        if self.0 < 2 {
            Err(Error::InvalidParameters("threshold must be at least 2"))
        } else {
            Ok(())
        }
    }

    /// This method is useful when `std` is not available. For typical usage
    /// see the `split` method.
    ///
    /// Splits `secret` into `share_count` shares with ids `1..=share_count`.
    /// A cryptographically secure random number generator has to be provided.
    ///
    /// Example:
    /// ```
    /// # use twinshare::{FieldElement, SecretSharing};
    /// # use rand_chacha::{rand_core::SeedableRng, ChaCha8Rng};
    /// # let sss = SecretSharing(3);
    /// let mut rng = ChaCha8Rng::from_seed([0x90; 32]);
    /// let shares = sss.split_rng(FieldElement::from(7u64), 4, &mut rng).unwrap();
    /// assert_eq!(shares.iter().map(|s| s.id).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    /// // Fewer shares than the threshold is refused
    /// assert!(sss.split_rng(FieldElement::from(7u64), 2, &mut rng).is_err());
    /// ```
    pub fn split_rng<R: rand::RngCore + rand::CryptoRng>(
        &self,
        secret: FieldElement,
        share_count: u8,
        rng: &mut R,
    ) -> Result<ShareSet> {
        let ids: Vec<ShareId> = (1..=u64::from(share_count)).collect();
        self.split_at_rng(secret, &ids, rng)
    }

    /// Splits `secret` into one share per id in `ids`. Ids must be nonzero
    /// and distinct, and there must be at least as many as the threshold.
    /// Parameters are checked before any randomness is drawn.
    ///
    /// The polynomial behind the shares lives only inside this call:
    /// ```compile_fail
    /// use twinshare::SecretPolynomial;
    /// ```
    pub fn split_at_rng<R: rand::RngCore + rand::CryptoRng>(
        &self,
        secret: FieldElement,
        ids: &[ShareId],
        rng: &mut R,
    ) -> Result<ShareSet> {
        self.check_threshold()?;
        if ids.len() < self.0 as usize {
            return Err(Error::InvalidParameters("share count must be at least the threshold"));
        }
        let mut distinct: HashSet<ShareId> = HashSet::with_capacity(ids.len());
        if ids.iter().any(|id| *id == 0 || !distinct.insert(*id)) {
            return Err(Error::InvalidParameters("share ids must be nonzero and distinct"));
        }

        let poly = math::random_polynomial(secret, self.0, rng);
        Ok(math::evaluate_at(&poly, ids))
    }

    /// Splits `secret` into `share_count` shares using the operating system's RNG.
    ///
    /// Example:
    /// ```
    /// # use twinshare::{FieldElement, SecretSharing};
    /// # let sss = SecretSharing(3);
    /// let shares = sss.split(FieldElement::from(99u64), 5).unwrap();
    /// assert_eq!(sss.reconstruct(&shares[..3]).unwrap(), FieldElement::from(99u64));
    /// ```
    #[cfg(feature = "std")]
    pub fn split(&self, secret: FieldElement, share_count: u8) -> Result<ShareSet> {
        self.split_rng(secret, share_count, &mut rand::rngs::OsRng)
    }

    /// Given a collection of shares, recovers the original secret.
    /// Shares repeating an id already seen are ignored. If the number of
    /// distinct shares is less than the threshold an `Err` is returned,
    /// otherwise an `Ok` containing the secret.
    ///
    /// Example:
    /// ```
    /// # use twinshare::{Error, FieldElement, SecretSharing};
    /// # use rand_chacha::{rand_core::SeedableRng, ChaCha8Rng};
    /// # let sss = SecretSharing(3);
    /// # let mut rng = ChaCha8Rng::from_seed([0x90; 32]);
    /// let shares = sss.split_rng(FieldElement::from(1u64), 3, &mut rng).unwrap();
    /// // Secret correctly recovered
    /// assert!(sss.reconstruct(&shares).is_ok());
    /// // Not enough shares to recover secret
    /// assert_eq!(
    ///     sss.reconstruct(&shares[..2]),
    ///     Err(Error::InsufficientShares { needed: 3, got: 2 })
    /// );
    /// ```
    pub fn reconstruct(&self, shares: &[Share]) -> Result<FieldElement> {
        self.check_threshold()?;

        let mut seen: HashSet<ShareId> = HashSet::with_capacity(shares.len());
        let mut distinct: Vec<Share> = Vec::with_capacity(shares.len());
        for share in shares {
            if share.id == 0 {
                return Err(Error::InvalidParameters("share ids must be nonzero"));
            }
            if seen.insert(share.id) {
                distinct.push(share.clone());
            }
        }

        if distinct.len() < self.0 as usize {
            return Err(Error::InsufficientShares {
                needed: self.0 as usize,
                got: distinct.len(),
            });
        }
        math::interpolate(&distinct)
    }
}

/// Creates a capsule with the default [`CapsuleConfig`], using the operating system's RNG.
#[cfg(feature = "std")]
pub fn create_capsule(first: &[u8], second: &[u8], keys: &KeyMaterial) -> Result<Vec<u8>> {
    Vault::new(CapsuleConfig::default())?.create_capsule(first, second, keys)
}

/// Opens a capsule created with the default [`CapsuleConfig`].
pub fn decrypt(capsule: &[u8], key: &Key) -> Result<Vec<u8>> {
    Vault::new(CapsuleConfig::default())?.decrypt(capsule, key)
}

/// Lists the share ids of both slots of a capsule created with the default [`CapsuleConfig`].
pub fn extract_share_id_sets(capsule: &[u8]) -> Result<(Vec<ShareId>, Vec<ShareId>)> {
    Vault::new(CapsuleConfig::default())?.extract_share_id_sets(capsule)
}

#[cfg(test)]
mod tests {
    use super::{Error, FieldElement, SecretSharing, Share};
    use alloc::vec::Vec;
    use rand_chacha::rand_core::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use rstest::rstest;

    fn rng() -> ChaCha20Rng {
        ChaCha20Rng::from_seed([10; 32])
    }

    #[test]
    fn test_insufficient_shares_err() {
        let sss = SecretSharing(255);
        let shares = sss.split_rng(FieldElement::from(1u64), 255, &mut rng()).unwrap();
        let secret = sss.reconstruct(&shares[..254]);
        assert_eq!(secret, Err(Error::InsufficientShares { needed: 255, got: 254 }));
    }

    #[test]
    fn test_duplicate_shares_err() {
        let sss = SecretSharing(5);
        let mut shares = sss.split_rng(FieldElement::from(1u64), 5, &mut rng()).unwrap();
        shares[1] = shares[0].clone();
        let secret = sss.reconstruct(&shares);
        assert_eq!(secret, Err(Error::InsufficientShares { needed: 5, got: 4 }));
    }

    #[test]
    fn test_integration_works() {
        let sss = SecretSharing(255);
        let secret = FieldElement::new(crate::PRIME - 1).unwrap();
        let shares = sss.split_rng(secret, 255, &mut rng()).unwrap();
        assert_eq!(sss.reconstruct(&shares).unwrap(), secret);
    }

    #[rstest]
    #[case(2, 2)]
    #[case(2, 5)]
    #[case(3, 5)]
    #[case(4, 6)]
    #[case(5, 5)]
    fn test_k_of_n_every_subset(#[case] k: u8, #[case] n: u8) {
        let sss = SecretSharing(k);
        let secret = FieldElement::from(0x1234_5678_9abc_def0u64);
        let shares = sss.split_rng(secret, n, &mut rng()).unwrap();

        for mask in 0u32..(1 << n) {
            let subset: Vec<Share> = shares
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, s)| s.clone())
                .collect();
            let result = sss.reconstruct(&subset);
            if subset.len() >= k as usize {
                assert_eq!(result.unwrap(), secret);
            } else {
                assert!(matches!(result, Err(Error::InsufficientShares { .. })));
            }
        }
    }

    #[rstest]
    #[case(1, 5)]
    #[case(0, 5)]
    #[case(4, 3)]
    fn test_invalid_parameters(#[case] k: u8, #[case] n: u8) {
        let sss = SecretSharing(k);
        assert!(matches!(
            sss.split_rng(FieldElement::ONE, n, &mut rng()),
            Err(Error::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_split_at_rejects_bad_ids() {
        let sss = SecretSharing(2);
        assert!(sss.split_at_rng(FieldElement::ONE, &[0, 1, 2], &mut rng()).is_err());
        assert!(sss.split_at_rng(FieldElement::ONE, &[3, 3], &mut rng()).is_err());
        assert!(sss.split_at_rng(FieldElement::ONE, &[3, 9], &mut rng()).is_ok());
    }

    #[test]
    fn test_recover_order_independent() {
        let sss = SecretSharing(3);
        let secret = FieldElement::from(789u64);
        let shares = sss.split_rng(secret, 5, &mut rng()).unwrap();
        let shuffled = [shares[4].clone(), shares[0].clone(), shares[2].clone()];
        assert_eq!(sss.reconstruct(&shuffled).unwrap(), secret);
    }

    #[test]
    fn test_fewer_than_threshold_reveals_nothing() {
        // Interpolating t - 1 shares of a degree t - 1 polynomial lands on an
        // unrelated value, not on the secret.
        let sss = SecretSharing(3);
        let short = SecretSharing(2);
        let secret = FieldElement::from(42u64);
        let mut rng = rng();
        let mut hits = 0;
        for _ in 0..500 {
            let shares = sss.split_rng(secret, 5, &mut rng).unwrap();
            if short.reconstruct(&shares[1..3]).unwrap() == secret {
                hits += 1;
            }
        }
        assert_eq!(hits, 0);
    }

    #[test]
    fn test_altered_share_changes_result() {
        let sss = SecretSharing(3);
        let secret = FieldElement::from(5u64);
        let mut shares = sss.split_rng(secret, 5, &mut rng()).unwrap();
        shares[3].value = shares[3].value + FieldElement::ONE;
        assert_ne!(sss.reconstruct(&shares).unwrap(), secret);
    }
}
