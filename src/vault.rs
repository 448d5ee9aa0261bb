//! Creating and opening capsules.
//!
//! Creation splits both documents chunk by chunk, places each document's
//! shares at the ids its walk resolves to and seals everything into one
//! capsule. Opening re-derives both walks of the supplied key, reconstructs
//! both candidates and keeps the one whose checksum verifies. Right and wrong
//! keys go through the same steps.

use alloc::vec::Vec;
use hashbrown::HashMap;
use hmac::Mac;
use rand::{CryptoRng, RngCore};
use tracing::{debug, trace, warn};

use super::capsule::{Capsule, CapsuleCodec, SlotMetadata};
use super::config::CapsuleConfig;
use super::error::{Error, Result};
use super::executor::{self, PathSignature};
use super::field::{FieldElement, MAX_CHUNK_SIZE};
use super::keys::{Branch, Key, KeyMaterial};
use super::matrix::{self, DerivationParams, Label, LABEL_COUNT, SALT_LEN};
use super::partition::{IdSubset, Partitioner};
use super::share::{Share, ShareId};
use super::stream::{keyed_mac, sample_below};
use super::SecretSharing;

/// Salts tried before giving up on placing the two documents in different slots.
const MAX_SALT_ATTEMPTS: u32 = 64;

const CHECKSUM_DOMAIN: &[u8] = b"twinshare/v1/checksum";
const LENGTH_MASK_DOMAIN: &[u8] = b"twinshare/v1/length-mask";

/// Entry point for the capsule operations, bound to one configuration.
///
/// ```
/// use twinshare::{CapsuleConfig, Key, KeyMaterial, Vault};
/// # use rand_chacha::{rand_core::SeedableRng, ChaCha20Rng};
///
/// let vault = Vault::new(CapsuleConfig::default()).unwrap();
/// let keys = KeyMaterial::from_master(&Key::from_bytes([7; 32])).unwrap();
/// let mut rng = ChaCha20Rng::from_seed([0x90; 32]);
///
/// let capsule = vault
///     .create_capsule_rng(b"meet at noon", b"buy more milk", &keys, &mut rng)
///     .unwrap();
///
/// assert_eq!(vault.decrypt(&capsule, keys.true_key()).unwrap(), b"meet at noon");
/// assert_eq!(vault.decrypt(&capsule, keys.false_key()).unwrap(), b"buy more milk");
/// assert!(vault.decrypt(&capsule, &Key::from_bytes([8; 32])).is_err());
/// ```
#[derive(Clone, Debug)]
pub struct Vault {
    codec: CapsuleCodec,
}

impl Vault {
    pub fn new(config: CapsuleConfig) -> Result<Self> {
        Ok(Self {
            codec: CapsuleCodec::new(config)?,
        })
    }

    pub fn config(&self) -> &CapsuleConfig {
        self.codec.config()
    }

    /// Seals `first` behind the true walk of `keys.true_key()` and `second`
    /// behind the false walk of `keys.false_key()`.
    ///
    /// `rng` must be a cryptographically secure generator; it draws every
    /// polynomial coefficient as well as the public salt and script.
    pub fn create_capsule_rng<R: RngCore + CryptoRng>(
        &self,
        first: &[u8],
        second: &[u8],
        keys: &KeyMaterial,
        rng: &mut R,
    ) -> Result<Vec<u8>> {
        let config = self.codec.config();
        let longest = first.len().max(second.len());
        if longest as u64 > config.max_document_len {
            return Err(Error::InvalidParameters("document exceeds the configured maximum"));
        }

        let chunk_size = config.chunk_size as usize;
        let chunk_count = longest.div_ceil(chunk_size).max(1);
        let encoded_chunks = u32::try_from(chunk_count)
            .map_err(|_| Error::InvalidParameters("document has too many chunks"))?;
        let partitioner = Partitioner::new(chunk_count, config.share_count);
        let script: Vec<Label> = (0..config.script_len)
            .map(|_| sample_below(&mut *rng, LABEL_COUNT as u32) as Label)
            .collect();

        let mut attempt = 0;
        let (derivation, first_signature, second_signature) = loop {
            attempt += 1;
            let mut salt = [0u8; SALT_LEN];
            rng.fill_bytes(&mut salt);
            let derivation = DerivationParams {
                state_count: config.state_count,
                salt,
            };

            let first_signature = walk(keys.true_key(), Branch::True, &derivation, &script)?;
            let second_signature = walk(keys.false_key(), Branch::False, &derivation, &script)?;
            if first_signature.slot() != second_signature.slot() {
                break (derivation, first_signature, second_signature);
            }

            trace!(attempt, "both documents selected the same slot, drawing a new salt");
            if attempt >= MAX_SALT_ATTEMPTS {
                warn!(attempt, "no salt separated the two documents");
                return Err(Error::AmbiguousSignature);
            }
        };

        let (first_subset, second_subset) = partitioner
            .assign(&first_signature, &second_signature)
            .map_err(|e| {
                warn!("share id subsets overlap");
                e
            })?;

        let sss = SecretSharing(config.threshold);
        let mut pool: [Vec<Share>; 2] = [Vec::new(), Vec::new()];
        let mut slots = [SlotMetadata::default(), SlotMetadata::default()];
        for (document, signature, subset) in [
            (first, &first_signature, &first_subset),
            (second, &second_signature, &second_subset),
        ] {
            let mut shares = split_document(&sss, document, chunk_size, subset, rng)?;
            shares.sort_unstable_by_key(|s| s.id);
            pool[subset.slot] = shares;
            slots[subset.slot] = SlotMetadata {
                masked_length: document.len() as u64 ^ length_mask(signature)?,
                checksum: checksum(signature, document)?,
            };
        }

        let capsule = Capsule {
            threshold: config.threshold,
            share_count: config.share_count,
            chunk_size: config.chunk_size,
            derivation,
            script,
            chunk_count: encoded_chunks,
            slots,
            pool,
        };
        let bytes = self.codec.encode(&capsule)?;
        debug!(
            chunks = chunk_count,
            shares = 2 * capsule.shares_per_slot(),
            bytes = bytes.len(),
            attempts = attempt,
            "capsule created"
        );
        Ok(bytes)
    }

    /// Same as [`Vault::create_capsule_rng`], drawing randomness from the operating system.
    #[cfg(feature = "std")]
    pub fn create_capsule(&self, first: &[u8], second: &[u8], keys: &KeyMaterial) -> Result<Vec<u8>> {
        self.create_capsule_rng(first, second, keys, &mut rand::rngs::OsRng)
    }

    /// Opens `bytes` with `key`. A key that opens neither walk fails with
    /// [`Error::KeyMismatch`]; structural problems fail with
    /// [`Error::MalformedCapsule`].
    pub fn decrypt(&self, bytes: &[u8], key: &Key) -> Result<Vec<u8>> {
        let capsule = self.codec.decode(bytes)?;
        let partitioner = Partitioner::new(capsule.chunk_count as usize, capsule.share_count);
        let sss = SecretSharing(capsule.threshold);
        let lookup = [index(&capsule.pool[0]), index(&capsule.pool[1])];

        let mut candidates = Vec::with_capacity(Branch::BOTH.len());
        for branch in Branch::BOTH {
            let signature = walk(key, branch, &capsule.derivation, &capsule.script)?;
            let subset = partitioner.resolve(&signature)?;
            candidates.push(open_slot(
                &sss,
                &capsule,
                &lookup[subset.slot],
                &subset,
                &signature,
            )?);
        }

        let opened = candidates.into_iter().flatten().next();
        debug!(chunks = capsule.chunk_count, opened = opened.is_some(), "capsule decryption finished");
        opened.ok_or(Error::KeyMismatch)
    }

    /// Returns the ids of both slots without any key. The lists do not say
    /// which document they belong to.
    pub fn extract_share_id_sets(&self, bytes: &[u8]) -> Result<(Vec<ShareId>, Vec<ShareId>)> {
        Ok(self.codec.decode(bytes)?.share_id_sets())
    }
}

/// Derives `key`'s matrix and walks it from the initial state of `branch`.
/// The matrix is dropped before returning.
fn walk(
    key: &Key,
    branch: Branch,
    derivation: &DerivationParams,
    script: &[Label],
) -> Result<PathSignature> {
    let matrix = matrix::generate(key, derivation)?;
    let initial = matrix::derive_initial_states(key, derivation)?;
    executor::run(&matrix, initial.start(branch), script)
}

fn split_document<R: RngCore + CryptoRng>(
    sss: &SecretSharing,
    document: &[u8],
    chunk_size: usize,
    subset: &IdSubset,
    rng: &mut R,
) -> Result<Vec<Share>> {
    let mut shares = Vec::with_capacity(subset.ids.len() * sss.0 as usize);
    for (index, ids) in subset.ids.iter().enumerate() {
        let start = (index * chunk_size).min(document.len());
        let end = ((index + 1) * chunk_size).min(document.len());

        // Short and missing chunks are padded with trailing zeros.
        let mut chunk = [0u8; MAX_CHUNK_SIZE];
        chunk[..end - start].copy_from_slice(&document[start..end]);
        let secret = FieldElement::from_chunk(&chunk[..chunk_size])?;

        shares.extend(sss.split_at_rng(secret, ids, rng)?);
    }
    Ok(shares)
}

fn index(shares: &[Share]) -> HashMap<ShareId, FieldElement> {
    shares.iter().map(|s| (s.id, s.value)).collect()
}

/// Reconstructs the document `subset` points at and checks it against the
/// slot metadata. Ids missing from the slot are filled with zero so that a
/// wrong key costs the same work as a right one.
fn open_slot(
    sss: &SecretSharing,
    capsule: &Capsule,
    lookup: &HashMap<ShareId, FieldElement>,
    subset: &IdSubset,
    signature: &PathSignature,
) -> Result<Option<Vec<u8>>> {
    let chunk_size = capsule.chunk_size as usize;
    let mut plaintext = Vec::with_capacity(subset.ids.len() * chunk_size);
    let mut intact = true;

    for ids in &subset.ids {
        let shares: Vec<Share> = ids
            .iter()
            .map(|id| Share {
                id: *id,
                value: lookup.get(id).copied().unwrap_or(FieldElement::ZERO),
            })
            .collect();
        let secret = sss.reconstruct(&shares)?;
        match secret.to_chunk(chunk_size) {
            Some(bytes) => plaintext.extend_from_slice(&bytes),
            None => {
                intact = false;
                plaintext.resize(plaintext.len() + chunk_size, 0);
            }
        }
    }

    let metadata = &capsule.slots[subset.slot];
    let length = metadata.masked_length ^ length_mask(signature)?;
    let fits = length <= plaintext.len() as u64;
    plaintext.truncate(if fits { length as usize } else { 0 });

    let mut mac = checksum_mac(signature, plaintext.len() as u64)?;
    mac.update(&plaintext);
    let verified = mac.verify_slice(&metadata.checksum).is_ok();

    Ok((verified && intact && fits).then_some(plaintext))
}

fn checksum_mac(signature: &PathSignature, length: u64) -> Result<super::stream::HmacSha256> {
    let mut mac = keyed_mac(signature.as_bytes())?;
    mac.update(CHECKSUM_DOMAIN);
    mac.update(&length.to_be_bytes());
    Ok(mac)
}

fn checksum(signature: &PathSignature, document: &[u8]) -> Result<[u8; 32]> {
    let mut mac = checksum_mac(signature, document.len() as u64)?;
    mac.update(document);
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

fn length_mask(signature: &PathSignature) -> Result<u64> {
    let mut mac = keyed_mac(signature.as_bytes())?;
    mac.update(LENGTH_MASK_DOMAIN);
    let digest = mac.finalize().into_bytes();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    Ok(u64::from_be_bytes(head))
}
