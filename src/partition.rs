// Maps path signatures to share-id subsets.
//
// Ids are a pseudorandom function of the signature alone, so the subset a key
// selects is recomputed at decryption time and nothing about the partition is
// stored.

use alloc::vec::Vec;
use hashbrown::HashSet;
use hmac::Mac;

use super::error::{Error, Result};
use super::executor::PathSignature;
use super::share::ShareId;
use super::stream::keyed_mac;

const SHARE_ID_DOMAIN: &[u8] = b"twinshare/v1/share-id";

/// The share ids one signature resolves to: a capsule slot, and for every
/// chunk one id per share.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdSubset {
    pub slot: usize,
    pub ids: Vec<Vec<ShareId>>,
}

impl IdSubset {
    pub fn iter(&self) -> impl Iterator<Item = ShareId> + '_ {
        self.ids.iter().flatten().copied()
    }
}

/// Assigns share ids for capsules of a fixed shape.
#[derive(Clone, Copy, Debug)]
pub struct Partitioner {
    chunk_count: usize,
    share_count: u8,
}

impl Partitioner {
    pub fn new(chunk_count: usize, share_count: u8) -> Self {
        Self {
            chunk_count,
            share_count,
        }
    }

    /// Resolves the subset selected by `signature`. Ids are nonzero 63-bit
    /// values and unique within the subset.
    pub fn resolve(&self, signature: &PathSignature) -> Result<IdSubset> {
        let mut seen = HashSet::with_capacity(self.chunk_count * self.share_count as usize);
        let mut ids = Vec::with_capacity(self.chunk_count);

        for chunk in 0..self.chunk_count {
            let mut chunk_ids = Vec::with_capacity(self.share_count as usize);
            for index in 0..self.share_count {
                let id = derive_id(signature, chunk as u64, index)?;
                if !seen.insert(id) {
                    return Err(Error::AmbiguousSignature);
                }
                chunk_ids.push(id);
            }
            ids.push(chunk_ids);
        }

        Ok(IdSubset {
            slot: signature.slot(),
            ids,
        })
    }

    /// Resolves both documents' subsets and checks that they land in
    /// different slots and share no id.
    pub fn assign(
        &self,
        first: &PathSignature,
        second: &PathSignature,
    ) -> Result<(IdSubset, IdSubset)> {
        let first = self.resolve(first)?;
        let second = self.resolve(second)?;

        if first.slot == second.slot {
            return Err(Error::AmbiguousSignature);
        }
        let taken: HashSet<ShareId> = first.iter().collect();
        if second.iter().any(|id| taken.contains(&id)) {
            return Err(Error::AmbiguousSignature);
        }

        Ok((first, second))
    }
}

fn derive_id(signature: &PathSignature, chunk: u64, index: u8) -> Result<ShareId> {
    for counter in 0u32.. {
        let mut mac = keyed_mac(signature.as_bytes())?;
        mac.update(SHARE_ID_DOMAIN);
        mac.update(&chunk.to_be_bytes());
        mac.update(&[index]);
        mac.update(&counter.to_be_bytes());

        let digest = mac.finalize().into_bytes();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let id = u64::from_be_bytes(head) >> 1;
        if id != 0 {
            return Ok(id);
        }
    }
    Err(Error::AmbiguousSignature)
}

#[cfg(test)]
mod tests {
    use super::Partitioner;
    use crate::error::Error;
    use crate::executor::PathSignature;
    use hashbrown::HashSet;

    fn signature(fill: u8, last: u8) -> PathSignature {
        let mut bytes = [fill; 32];
        bytes[31] = last;
        PathSignature(bytes)
    }

    #[test]
    fn resolve_is_deterministic() {
        let partitioner = Partitioner::new(3, 5);
        let sig = signature(1, 2);
        assert_eq!(partitioner.resolve(&sig).unwrap(), partitioner.resolve(&sig).unwrap());
    }

    #[test]
    fn resolve_shape_and_slot() {
        let partitioner = Partitioner::new(3, 5);
        let subset = partitioner.resolve(&signature(1, 7)).unwrap();
        assert_eq!(subset.slot, 1);
        assert_eq!(subset.ids.len(), 3);
        assert!(subset.ids.iter().all(|chunk| chunk.len() == 5));
        assert!(subset.iter().all(|id| id != 0 && id < 1 << 63));
        assert_eq!(partitioner.resolve(&signature(1, 6)).unwrap().slot, 0);
    }

    #[test]
    fn assign_gives_disjoint_subsets() {
        let partitioner = Partitioner::new(4, 5);
        for fill in 0..50u8 {
            let (a, b) = partitioner
                .assign(&signature(fill, 0), &signature(fill.wrapping_add(100), 1))
                .unwrap();
            let a_ids: HashSet<u64> = a.iter().collect();
            let b_ids: HashSet<u64> = b.iter().collect();
            assert!(a_ids.is_disjoint(&b_ids));
            assert_eq!(a_ids.len(), 20);
            assert_eq!(b_ids.len(), 20);
        }
    }

    #[test]
    fn assign_rejects_same_slot() {
        let partitioner = Partitioner::new(1, 3);
        assert_eq!(
            partitioner.assign(&signature(1, 0), &signature(2, 2)),
            Err(Error::AmbiguousSignature)
        );
    }

    #[test]
    fn assign_rejects_identical_signatures() {
        let partitioner = Partitioner::new(1, 3);
        let sig = signature(9, 1);
        assert_eq!(partitioner.assign(&sig, &sig), Err(Error::AmbiguousSignature));
    }
}
