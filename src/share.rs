use alloc::vec::Vec;

use super::error::{Error, Result};
use super::field::FieldElement;

#[cfg(feature = "fuzzing")]
use arbitrary::Arbitrary;

#[cfg(feature = "zeroize_memory")]
use zeroize::Zeroize;

/// Identifier of a share, and the x coordinate it was evaluated at. Never zero.
pub type ShareId = u64;

/// Length of a share in its fixed-width byte form.
pub const SHARE_LEN: usize = 8 + 16;

/// A share used to reconstruct one field-element secret.
///
/// Serialization format: `id` as 8 big-endian bytes followed by `value` as
/// 16 big-endian bytes.
///
/// Usage example:
/// ```
/// use twinshare::{SecretSharing, Share};
/// use core::convert::TryFrom;
/// # use rand_chacha::{rand_core::SeedableRng, ChaCha8Rng};
///
/// let sss = SecretSharing(3);
/// let mut rng = ChaCha8Rng::from_seed([0x90; 32]);
/// let secret = twinshare::FieldElement::from(1234u64);
/// let shares = sss.split_rng(secret, 5, &mut rng).unwrap();
///
/// // Move the shares through their byte form and recover the secret
/// let bytes: Vec<Vec<u8>> = shares.iter().map(Vec::from).collect();
/// let restored: Vec<Share> = bytes
///     .iter()
///     .map(|b| Share::try_from(b.as_slice()).unwrap())
///     .collect();
/// assert_eq!(sss.reconstruct(&restored[1..4]).unwrap(), secret);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "fuzzing", derive(Arbitrary))]
#[cfg_attr(feature = "zeroize_memory", derive(Zeroize))]
#[cfg_attr(feature = "zeroize_memory", zeroize(drop))]
pub struct Share {
    /// The x coordinate of the share.
    pub id: ShareId,
    /// The polynomial evaluated at `id`.
    pub value: FieldElement,
}

/// The shares of one secret chunk.
pub type ShareSet = Vec<Share>;

impl Share {
    pub fn x(&self) -> FieldElement {
        FieldElement::from(self.id)
    }
}

impl From<&Share> for Vec<u8> {
    fn from(s: &Share) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(SHARE_LEN);
        bytes.extend_from_slice(&s.id.to_be_bytes());
        bytes.extend_from_slice(&s.value.value().to_be_bytes());
        bytes
    }
}

impl core::convert::TryFrom<&[u8]> for Share {
    type Error = Error;

    fn try_from(s: &[u8]) -> Result<Share> {
        if s.len() != SHARE_LEN {
            return Err(Error::MalformedCapsule("a share must be exactly 24 bytes long"));
        }
        let (id, value) = s.split_at(8);
        let mut id_bytes = [0u8; 8];
        id_bytes.copy_from_slice(id);
        let mut value_bytes = [0u8; 16];
        value_bytes.copy_from_slice(value);

        let id = ShareId::from_be_bytes(id_bytes);
        if id == 0 {
            return Err(Error::MalformedCapsule("share id must be nonzero"));
        }
        let value = FieldElement::new(u128::from_be_bytes(value_bytes))
            .map_err(|_| Error::MalformedCapsule("share value outside the field"))?;
        Ok(Share { id, value })
    }
}
