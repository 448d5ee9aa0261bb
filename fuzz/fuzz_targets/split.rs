#![no_main]
use libfuzzer_sys::fuzz_target;

use arbitrary::Arbitrary;
use rand_chacha::rand_core::SeedableRng;
use twinshare::{FieldElement, SecretSharing};

#[derive(Debug, Arbitrary)]
struct Parameters {
    pub threshold: u8,
    pub secret: FieldElement,
    pub ids: Vec<u64>,
    pub seed: [u8; 32],
}

fuzz_target!(|params: Parameters| {
    let sss = SecretSharing(params.threshold);
    let mut rng = rand_chacha::ChaCha20Rng::from_seed(params.seed);
    if let Ok(shares) = sss.split_at_rng(params.secret, &params.ids, &mut rng) {
        assert_eq!(sss.reconstruct(&shares), Ok(params.secret));
    }
});
