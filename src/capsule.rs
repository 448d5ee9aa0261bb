//! Capsule wire format.
//!
//! All integers are big-endian:
//!
//! ```text
//! magic "TWSC" | version u8 | prime u128 | threshold u8 | share_count u8 | chunk_size u8
//! state_count u16 | salt [16] | script_len u16 | script [script_len] | chunk_count u32
//! 2 x { masked_length u64 | checksum [32] }
//! pool_len u32 | pool_len x { id u64 | value u128 }
//! ```
//!
//! The pool holds slot 0's shares and then slot 1's, each half sorted by id.
//! Nothing in the format names a document; which slot a key opens is decided
//! only by the signature of its walk.

use alloc::vec::Vec;
use core::convert::TryFrom;
use hashbrown::HashSet;

use super::config::CapsuleConfig;
use super::error::{Error, Result};
use super::field::{MAX_CHUNK_SIZE, PRIME};
use super::matrix::{DerivationParams, Label, LABEL_COUNT, SALT_LEN};
use super::share::{Share, ShareId, SHARE_LEN};

pub const MAGIC: &[u8; 4] = b"TWSC";
pub const VERSION: u8 = 1;
pub const CHECKSUM_LEN: usize = 32;

/// Per-document metadata. Opaque without the key of the walk that selects it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SlotMetadata {
    /// Plaintext length XORed with a mask derived from the path signature.
    pub masked_length: u64,
    /// HMAC over the plaintext keyed by the path signature.
    pub checksum: [u8; CHECKSUM_LEN],
}

/// A decoded capsule. Read-only; re-encryption produces a new one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Capsule {
    pub threshold: u8,
    pub share_count: u8,
    pub chunk_size: u8,
    pub derivation: DerivationParams,
    pub script: Vec<Label>,
    pub chunk_count: u32,
    pub slots: [SlotMetadata; 2],
    pub pool: [Vec<Share>; 2],
}

impl Capsule {
    /// Shares per slot implied by the header.
    pub fn shares_per_slot(&self) -> usize {
        self.chunk_count as usize * self.share_count as usize
    }

    /// The ids of both slots. Does not tell which slot holds which document.
    pub fn share_id_sets(&self) -> (Vec<ShareId>, Vec<ShareId>) {
        let ids = |slot: &Vec<Share>| -> Vec<ShareId> { slot.iter().map(|s| s.id).collect() };
        (ids(&self.pool[0]), ids(&self.pool[1]))
    }
}

/// Encodes and decodes capsules under an explicit configuration.
#[derive(Clone, Debug)]
pub struct CapsuleCodec {
    config: CapsuleConfig,
}

impl CapsuleCodec {
    pub fn new(config: CapsuleConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CapsuleConfig {
        &self.config
    }

    /// Serializes `capsule`. Either the whole capsule is produced or an error
    /// is returned; there is no partial output.
    pub fn encode(&self, capsule: &Capsule) -> Result<Vec<u8>> {
        self.check(capsule)?;

        let pool_len = capsule.pool[0].len() + capsule.pool[1].len();
        let encoded_pool_len = u32::try_from(pool_len)
            .map_err(|_| Error::InvalidParameters("share pool does not fit the wire format"))?;
        let mut bytes = Vec::with_capacity(
            64 + capsule.script.len() + 2 * (8 + CHECKSUM_LEN) + pool_len * SHARE_LEN,
        );
        bytes.extend_from_slice(MAGIC);
        bytes.push(VERSION);
        bytes.extend_from_slice(&PRIME.to_be_bytes());
        bytes.push(capsule.threshold);
        bytes.push(capsule.share_count);
        bytes.push(capsule.chunk_size);
        bytes.extend_from_slice(&capsule.derivation.state_count.to_be_bytes());
        bytes.extend_from_slice(&capsule.derivation.salt);
        bytes.extend_from_slice(&(capsule.script.len() as u16).to_be_bytes());
        bytes.extend_from_slice(&capsule.script);
        bytes.extend_from_slice(&capsule.chunk_count.to_be_bytes());
        for slot in &capsule.slots {
            bytes.extend_from_slice(&slot.masked_length.to_be_bytes());
            bytes.extend_from_slice(&slot.checksum);
        }
        bytes.extend_from_slice(&encoded_pool_len.to_be_bytes());
        for share in capsule.pool.iter().flatten() {
            bytes.extend_from_slice(&Vec::from(share));
        }
        Ok(bytes)
    }

    /// Parses and validates a capsule. Any structural violation is
    /// [`Error::MalformedCapsule`].
    pub fn decode(&self, bytes: &[u8]) -> Result<Capsule> {
        let mut reader = Reader::new(bytes);

        if reader.take(MAGIC.len())? != MAGIC {
            return Err(Error::MalformedCapsule("bad magic"));
        }
        if reader.u8()? != VERSION {
            return Err(Error::MalformedCapsule("unsupported version"));
        }
        if reader.u128()? != PRIME {
            return Err(Error::MalformedCapsule("unexpected field prime"));
        }

        let threshold = reader.u8()?;
        let share_count = reader.u8()?;
        let chunk_size = reader.u8()?;
        let state_count = reader.u16()?;
        let salt: [u8; SALT_LEN] = reader.array()?;
        let script_len = reader.u16()? as usize;
        let script = reader.take(script_len)?.to_vec();
        let chunk_count = reader.u32()?;

        let slots = [reader.slot()?, reader.slot()?];

        let pool_len = reader.u32()? as usize;
        if u64::from(chunk_count) > self.config.max_chunks()
            || pool_len != 2 * chunk_count as usize * share_count as usize
        {
            return Err(Error::MalformedCapsule("share count does not match header"));
        }
        if reader.remaining() != pool_len * SHARE_LEN {
            return Err(Error::MalformedCapsule("pool length does not match header"));
        }

        let mut shares = Vec::with_capacity(pool_len);
        for _ in 0..pool_len {
            shares.push(Share::try_from(reader.take(SHARE_LEN)?)?);
        }
        let second = shares.split_off(pool_len / 2);

        let capsule = Capsule {
            threshold,
            share_count,
            chunk_size,
            derivation: DerivationParams { state_count, salt },
            script,
            chunk_count,
            slots,
            pool: [shares, second],
        };
        self.check(&capsule)?;
        Ok(capsule)
    }

    fn check(&self, capsule: &Capsule) -> Result<()> {
        if capsule.threshold < 2 || capsule.share_count < capsule.threshold {
            return Err(Error::MalformedCapsule("invalid threshold"));
        }
        if capsule.chunk_size == 0 || capsule.chunk_size as usize > MAX_CHUNK_SIZE {
            return Err(Error::MalformedCapsule("invalid chunk size"));
        }
        if capsule.derivation.state_count < 2 {
            return Err(Error::MalformedCapsule("invalid state count"));
        }
        if capsule.script.is_empty() || capsule.script.len() > u16::MAX as usize {
            return Err(Error::MalformedCapsule("invalid script length"));
        }
        if capsule.script.iter().any(|label| *label as usize >= LABEL_COUNT) {
            return Err(Error::MalformedCapsule("unknown script label"));
        }
        if capsule.chunk_count == 0 {
            return Err(Error::MalformedCapsule("capsule holds no chunks"));
        }
        if capsule.pool.iter().any(|slot| slot.len() != capsule.shares_per_slot()) {
            return Err(Error::MalformedCapsule("share count does not match header"));
        }

        let mut seen = HashSet::with_capacity(2 * capsule.shares_per_slot());
        for share in capsule.pool.iter().flatten() {
            if share.id == 0 || !seen.insert(share.id) {
                return Err(Error::MalformedCapsule("share ids must be nonzero and unique"));
            }
        }
        Ok(())
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn remaining(&self) -> usize {
        self.bytes.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.bytes.len() < len {
            return Err(Error::MalformedCapsule("truncated"));
        }
        let (head, tail) = self.bytes.split_at(len);
        self.bytes = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    fn u128(&mut self) -> Result<u128> {
        Ok(u128::from_be_bytes(self.array()?))
    }

    fn slot(&mut self) -> Result<SlotMetadata> {
        Ok(SlotMetadata {
            masked_length: self.u64()?,
            checksum: self.array()?,
        })
    }
}
