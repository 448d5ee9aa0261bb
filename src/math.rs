// A module which contains necessary algorithms to compute Shamir's shares and recover secrets

use alloc::vec::Vec;

#[cfg(feature = "zeroize_memory")]
use zeroize::Zeroize;

use super::error::{Error, Result};
use super::field::FieldElement;
use super::share::{Share, ShareId};

/// Coefficients of a secret polynomial, highest degree first, the last one being the secret.
/// Lives only while shares are being evaluated.
#[cfg_attr(feature = "zeroize_memory", derive(Zeroize))]
#[cfg_attr(feature = "zeroize_memory", zeroize(drop))]
pub struct SecretPolynomial {
    coefficients: Vec<FieldElement>,
}

#[cfg(test)]
impl SecretPolynomial {
    fn degree(&self) -> usize {
        self.coefficients.len() - 1
    }

    fn secret(&self) -> FieldElement {
        self.coefficients[self.coefficients.len() - 1]
    }
}

impl SecretPolynomial {
    // Horner's rule
    pub fn evaluate(&self, x: FieldElement) -> FieldElement {
        self.coefficients
            .iter()
            .fold(FieldElement::ZERO, |acc, c| acc * x + *c)
    }
}

// Generates `k` polynomial coefficients, being the last one `s` and the others drawn uniformly from the field.
// Coefficient degrees go from higher to lower in the returned vector order.
pub fn random_polynomial<R: rand::Rng>(s: FieldElement, k: u8, rng: &mut R) -> SecretPolynomial {
    let k = k as usize;
    let mut coefficients = Vec::with_capacity(k);

    for _ in 1..k {
        coefficients.push(FieldElement::random(rng));
    }
    coefficients.push(s);

    SecretPolynomial { coefficients }
}

// Evaluates `poly` at every id, producing one share per id.
pub fn evaluate_at(poly: &SecretPolynomial, ids: &[ShareId]) -> Vec<Share> {
    ids.iter()
        .map(|id| Share {
            id: *id,
            value: poly.evaluate(FieldElement::from(*id)),
        })
        .collect()
}

// Finds the [root of the Lagrange polynomial](https://en.wikipedia.org/wiki/Shamir%27s_Secret_Sharing#Computationally_efficient_approach).
// Every share must carry a distinct nonzero id; the caller enforces it.
// One inversion per share: the numerator and denominator products are accumulated separately.
pub fn interpolate(shares: &[Share]) -> Result<FieldElement> {
    let mut secret = FieldElement::ZERO;

    for s_i in shares {
        let x_i = s_i.x();
        let (num, den) = shares
            .iter()
            .filter(|s_j| s_j.id != s_i.id)
            .fold((FieldElement::ONE, FieldElement::ONE), |(num, den), s_j| {
                let x_j = s_j.x();
                (num * x_j, den * (x_j - x_i))
            });

        let basis = num * den.inverse().map_err(|_| Error::Arithmetic("repeated share id"))?;
        secret = secret + basis * s_i.value;
    }

    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::{evaluate_at, interpolate, random_polynomial, FieldElement};
    use alloc::{vec, vec::Vec};
    use rand_chacha::rand_core::SeedableRng;

    #[test]
    fn random_polynomial_works() {
        let mut rng = rand_chacha::ChaCha8Rng::from_seed([0x90; 32]);
        let poly = random_polynomial(FieldElement::from(1u64), 3, &mut rng);
        assert_eq!(poly.degree(), 2);
        assert_eq!(poly.secret(), FieldElement::from(1u64));
    }

    #[test]
    fn evaluator_works() {
        // 3x^2 + 2x + 5
        let poly = super::SecretPolynomial {
            coefficients: [3u64, 2, 5].iter().map(|c| FieldElement::from(*c)).collect(),
        };
        let values: Vec<_> = evaluate_at(&poly, &[1, 2])
            .iter()
            .map(|s| (s.id, s.value))
            .collect();
        assert_eq!(
            values,
            vec![(1u64, FieldElement::from(10u64)), (2u64, FieldElement::from(21u64))]
        );
    }

    #[test]
    fn interpolate_works() {
        let mut rng = rand_chacha::ChaCha8Rng::from_seed([0x90; 32]);
        let poly = random_polynomial(FieldElement::from(185u64), 10, &mut rng);
        let ids: Vec<u64> = (1..=10).collect();
        let shares = evaluate_at(&poly, &ids);
        assert_eq!(interpolate(&shares).unwrap(), FieldElement::from(185u64));
    }

    #[test]
    fn interpolate_works_at_sparse_ids() {
        let mut rng = rand_chacha::ChaCha8Rng::from_seed([0x17; 32]);
        let poly = random_polynomial(FieldElement::from(u64::MAX), 4, &mut rng);
        let shares = evaluate_at(&poly, &[u64::MAX >> 1, 77, 1 << 40, 3, 999_999]);
        assert_eq!(interpolate(&shares[1..]).unwrap(), FieldElement::from(u64::MAX));
        assert_eq!(interpolate(&shares[..4]).unwrap(), FieldElement::from(u64::MAX));
    }
}
