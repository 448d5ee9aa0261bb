// Walks a transition script over a state matrix and signs the visited path.

use hmac::Mac;

use super::error::{Error, Result};
use super::matrix::{Label, StateId, StateMatrix};
use super::stream::keyed_mac;

const SIGNATURE_DOMAIN: &[u8] = b"twinshare/v1/path";

pub const SIGNATURE_LEN: usize = 32;

/// Keyed digest of a walk through a state matrix.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PathSignature(pub [u8; SIGNATURE_LEN]);

impl core::fmt::Debug for PathSignature {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("PathSignature(..)")
    }
}

impl PathSignature {
    /// Which of the two capsule slots this signature selects: the parity of the last byte.
    pub fn slot(&self) -> usize {
        usize::from(self.0[SIGNATURE_LEN - 1] & 1)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }
}

/// Follows `script` from `start` and returns the signature of the walk.
///
/// The signature covers the start state and every (label, target, weight)
/// step, keyed with the matrix's own signature key.
pub fn run(matrix: &StateMatrix, start: StateId, script: &[Label]) -> Result<PathSignature> {
    if matrix.state(start).is_none() {
        return Err(Error::InvalidParameters("start state outside the matrix"));
    }

    let mut mac = keyed_mac(matrix.signature_key())?;
    mac.update(SIGNATURE_DOMAIN);
    mac.update(&start.to_be_bytes());

    let mut current = start;
    for &label in script {
        let transition = matrix
            .transition(current, label)
            .filter(|t| matrix.state(t.target).is_some())
            .ok_or(Error::DeadEndState {
                state: current,
                label,
            })?;
        mac.update(&[label]);
        mac.update(&transition.target.to_be_bytes());
        mac.update(&transition.weight.to_be_bytes());
        current = transition.target;
    }

    let mut signature = [0u8; SIGNATURE_LEN];
    signature.copy_from_slice(&mac.finalize().into_bytes());
    Ok(PathSignature(signature))
}
