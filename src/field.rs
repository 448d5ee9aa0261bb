// Arithmetic over the prime field GF(p) with p = 2^127 - 1.

use core::iter::{Product, Sum};
use core::ops::{Add, Mul, Neg, Sub};

#[cfg(feature = "zeroize_memory")]
use zeroize::Zeroize;

use super::error::{Error, Result};

/// The field modulus, the Mersenne prime 2^127 - 1. Public and fixed for every capsule.
pub const PRIME: u128 = (1 << 127) - 1;

/// Largest number of plaintext bytes that always fit below [`PRIME`].
pub const MAX_CHUNK_SIZE: usize = 15;

const LOW_64: u128 = u64::MAX as u128;

/// An integer in `[0, PRIME)`. Every operation returns a reduced value.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "zeroize_memory", derive(Zeroize))]
pub struct FieldElement(u128);

impl FieldElement {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(1);

    /// Wraps `value`, failing if it is not already reduced.
    pub fn new(value: u128) -> Result<Self> {
        if value >= PRIME {
            Err(Error::Arithmetic("value outside the field"))
        } else {
            Ok(Self(value))
        }
    }

    /// Reduces an arbitrary `u128` modulo [`PRIME`].
    pub fn reduce(value: u128) -> Self {
        Self(fold(value))
    }

    pub fn value(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Draws a uniformly distributed element by rejection sampling.
    pub fn random<R: rand::Rng>(rng: &mut R) -> Self {
        loop {
            let candidate = rng.gen::<u128>() >> 1;
            if candidate < PRIME {
                return Self(candidate);
            }
        }
    }

    pub fn pow(self, mut exponent: u128) -> Self {
        let mut base = self;
        let mut acc = Self::ONE;
        while exponent > 0 {
            if exponent & 1 == 1 {
                acc = acc * base;
            }
            base = base * base;
            exponent >>= 1;
        }
        acc
    }

    /// Multiplicative inverse via Fermat's little theorem.
    pub fn inverse(self) -> Result<Self> {
        if self.is_zero() {
            return Err(Error::Arithmetic("zero has no inverse"));
        }
        Ok(self.pow(PRIME - 2))
    }

    /// Reads up to [`MAX_CHUNK_SIZE`] big-endian bytes.
    pub fn from_chunk(chunk: &[u8]) -> Result<Self> {
        if chunk.len() > MAX_CHUNK_SIZE {
            return Err(Error::InvalidParameters("chunk larger than 15 bytes"));
        }
        Ok(Self(
            chunk
                .iter()
                .fold(0u128, |acc, byte| (acc << 8) | u128::from(*byte)),
        ))
    }

    /// Writes the element as exactly `len` big-endian bytes.
    /// Returns `None` when the value does not fit.
    pub fn to_chunk(&self, len: usize) -> Option<alloc::vec::Vec<u8>> {
        let bytes = self.0.to_be_bytes();
        let (high, low) = bytes.split_at(bytes.len().checked_sub(len)?);
        if high.iter().any(|b| *b != 0) {
            return None;
        }
        Some(low.to_vec())
    }
}

// Never prints the value.
impl core::fmt::Debug for FieldElement {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("FieldElement(..)")
    }
}

impl From<u64> for FieldElement {
    fn from(value: u64) -> Self {
        Self(u128::from(value))
    }
}

// 2^127 = 1 (mod p), so the bits above 127 fold back onto the low bits.
fn fold(value: u128) -> u128 {
    let folded = (value & PRIME) + (value >> 127);
    if folded >= PRIME {
        folded - PRIME
    } else {
        folded
    }
}

fn mul_mod(a: u128, b: u128) -> u128 {
    let (a_lo, a_hi) = (a & LOW_64, a >> 64);
    let (b_lo, b_hi) = (b & LOW_64, b >> 64);

    let low = a_lo * b_lo;
    let mid = a_lo * b_hi + a_hi * b_lo;
    let high = a_hi * b_hi;

    let (lo, carry) = low.overflowing_add(mid << 64);
    let hi = high + (mid >> 64) + u128::from(carry);

    // 2^128 = 2 (mod p)
    fold((lo & PRIME) + (lo >> 127) + (hi << 1))
}

impl Add for FieldElement {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        let sum = self.0 + other.0;
        if sum >= PRIME {
            Self(sum - PRIME)
        } else {
            Self(sum)
        }
    }
}

impl Sub for FieldElement {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        if self.0 >= other.0 {
            Self(self.0 - other.0)
        } else {
            Self(self.0 + PRIME - other.0)
        }
    }
}

impl Neg for FieldElement {
    type Output = Self;

    fn neg(self) -> Self {
        Self::ZERO - self
    }
}

impl Mul for FieldElement {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        Self(mul_mod(self.0, other.0))
    }
}

impl Sum for FieldElement {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, x| acc + x)
    }
}

impl Product for FieldElement {
    fn product<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ONE, |acc, x| acc * x)
    }
}

#[cfg(feature = "fuzzing")]
impl<'a> arbitrary::Arbitrary<'a> for FieldElement {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(Self::reduce(u128::arbitrary(u)?))
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldElement, PRIME};
    use crate::error::Error;
    use rand_chacha::rand_core::SeedableRng;

    fn fe(v: u128) -> FieldElement {
        FieldElement::new(v).unwrap()
    }

    #[test]
    fn add_wraps_around_prime() {
        assert_eq!(fe(PRIME - 1) + fe(1), FieldElement::ZERO);
        assert_eq!(fe(PRIME - 1) + fe(5), fe(4));
    }

    #[test]
    fn sub_wraps_around_prime() {
        assert_eq!(fe(3) - fe(5), fe(PRIME - 2));
        assert_eq!(-fe(1), fe(PRIME - 1));
    }

    #[test]
    fn mul_matches_small_integers() {
        assert_eq!(fe(12345) * fe(67890), fe(12345 * 67890));
        assert_eq!(fe(u64::MAX as u128) * fe(2), fe(2 * u64::MAX as u128));
    }

    #[test]
    fn mul_reduces_large_products() {
        // (-1) * (-1) = 1
        assert_eq!(fe(PRIME - 1) * fe(PRIME - 1), FieldElement::ONE);
        // 2^126 * 2 = 2^127 = 1
        assert_eq!(fe(1 << 126) * fe(2), FieldElement::ONE);
        // 2^100 * 2^100 = 2^200 = 2^(200 - 127) = 2^73
        assert_eq!(fe(1 << 100) * fe(1 << 100), fe(1 << 73));
    }

    #[test]
    fn reduce_folds_high_bit() {
        assert_eq!(FieldElement::reduce(PRIME), FieldElement::ZERO);
        assert_eq!(FieldElement::reduce(u128::MAX), fe(1));
    }

    #[test]
    fn new_rejects_values_outside_field() {
        assert!(matches!(FieldElement::new(PRIME), Err(Error::Arithmetic(_))));
    }

    #[test]
    fn inverse_roundtrip() {
        let mut rng = rand_chacha::ChaCha8Rng::from_seed([0x42; 32]);
        for _ in 0..200 {
            let a = FieldElement::random(&mut rng);
            if a.is_zero() {
                continue;
            }
            assert_eq!(a * a.inverse().unwrap(), FieldElement::ONE);
        }
    }

    #[test]
    fn inverse_of_zero_fails() {
        assert_eq!(
            FieldElement::ZERO.inverse(),
            Err(Error::Arithmetic("zero has no inverse"))
        );
    }

    #[test]
    fn pow_satisfies_fermat() {
        let a = fe(0xdead_beef_cafe);
        assert_eq!(a.pow(PRIME - 1), FieldElement::ONE);
        assert_eq!(a.pow(0), FieldElement::ONE);
        assert_eq!(a.pow(3), a * a * a);
    }

    #[test]
    fn debug_output_is_redacted() {
        assert_eq!(alloc::format!("{:?}", fe(123_456_789)), "FieldElement(..)");
    }

    #[test]
    fn chunk_roundtrip() {
        let chunk = b"HELLO";
        let element = FieldElement::from_chunk(chunk).unwrap();
        assert_eq!(element.to_chunk(5).unwrap(), chunk.to_vec());
        assert_eq!(element.to_chunk(8).unwrap(), [0, 0, 0, b'H', b'E', b'L', b'L', b'O']);
        assert!(element.to_chunk(4).is_none());
        assert!(FieldElement::from_chunk(&[0xff; 16]).is_err());
    }
}
