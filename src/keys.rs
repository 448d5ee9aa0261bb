use hmac::Mac;

#[cfg(feature = "zeroize_memory")]
use zeroize::Zeroize;

use super::error::{Error, Result};
use super::stream::keyed_mac;

pub const KEY_LEN: usize = 32;

const TRUE_KEY_LABEL: &[u8] = b"twinshare/v1/key/true";
const FALSE_KEY_LABEL: &[u8] = b"twinshare/v1/key/false";

/// Secret key material. Never printed, cleared on drop.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "zeroize_memory", derive(Zeroize))]
#[cfg_attr(feature = "zeroize_memory", zeroize(drop))]
pub struct Key([u8; KEY_LEN]);

impl Key {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn random<R: rand::RngCore + rand::CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl core::fmt::Debug for Key {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Key(..)")
    }
}

impl core::convert::TryFrom<&[u8]> for Key {
    type Error = Error;

    fn try_from(s: &[u8]) -> Result<Key> {
        let bytes: [u8; KEY_LEN] = s
            .try_into()
            .map_err(|_| Error::InvalidParameters("a key must be exactly 32 bytes long"))?;
        Ok(Key(bytes))
    }
}

/// Which of the two walks of a key's state matrix a document is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Branch {
    True,
    False,
}

impl Branch {
    pub const BOTH: [Branch; 2] = [Branch::True, Branch::False];
}

/// The two decryption keys of a capsule.
///
/// The first document is bound to the true walk of `true_key`, the second to
/// the false walk of `false_key`. Holding one key tells nothing about the other.
#[derive(Clone, Debug)]
pub struct KeyMaterial {
    true_key: Key,
    false_key: Key,
}

impl KeyMaterial {
    pub fn new(true_key: Key, false_key: Key) -> Result<Self> {
        if true_key == false_key {
            return Err(Error::InvalidParameters("the two capsule keys must differ"));
        }
        Ok(Self {
            true_key,
            false_key,
        })
    }

    /// Derives both keys from a single master key.
    pub fn from_master(master: &Key) -> Result<Self> {
        Self::new(
            derive(master, TRUE_KEY_LABEL)?,
            derive(master, FALSE_KEY_LABEL)?,
        )
    }

    pub fn random<R: rand::RngCore + rand::CryptoRng>(rng: &mut R) -> Result<Self> {
        Self::new(Key::random(rng), Key::random(rng))
    }

    pub fn true_key(&self) -> &Key {
        &self.true_key
    }

    pub fn false_key(&self) -> &Key {
        &self.false_key
    }

    pub fn key(&self, branch: Branch) -> &Key {
        match branch {
            Branch::True => &self.true_key,
            Branch::False => &self.false_key,
        }
    }
}

fn derive(master: &Key, label: &[u8]) -> Result<Key> {
    let mut mac = keyed_mac(master.as_bytes())?;
    mac.update(label);
    let mut bytes = [0u8; KEY_LEN];
    bytes.copy_from_slice(&mac.finalize().into_bytes());
    Ok(Key(bytes))
}

#[cfg(test)]
mod tests {
    use super::{Branch, Key, KeyMaterial};
    use crate::error::Error;
    use alloc::format;
    use core::convert::TryFrom;

    #[test]
    fn from_master_is_deterministic_and_split() {
        let master = Key::from_bytes([0x11; 32]);
        let a = KeyMaterial::from_master(&master).unwrap();
        let b = KeyMaterial::from_master(&master).unwrap();
        assert_eq!(a.true_key(), b.true_key());
        assert_eq!(a.false_key(), b.false_key());
        assert_ne!(a.true_key(), a.false_key());
        assert_ne!(a.true_key(), &master);
        assert_eq!(a.key(Branch::False), a.false_key());
    }

    #[test]
    fn equal_keys_are_rejected() {
        let key = Key::from_bytes([1; 32]);
        assert!(matches!(
            KeyMaterial::new(key.clone(), key),
            Err(Error::InvalidParameters(_))
        ));
    }

    #[test]
    fn debug_output_is_redacted() {
        let key = Key::from_bytes([0xab; 32]);
        assert_eq!(format!("{key:?}"), "Key(..)");
    }

    #[test]
    fn key_from_slice_checks_length() {
        assert!(Key::try_from(&[0u8; 31][..]).is_err());
        assert_eq!(Key::try_from(&[2u8; 32][..]).unwrap(), Key::from_bytes([2; 32]));
    }
}
