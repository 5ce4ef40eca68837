//! Canonical node digests.
//!
//! Every node hashes to a fixed 32-byte digest over the tagged canonical
//! encoding of its variant: the variant tag, followed by the packed segment
//! for extenders, the child digests, and the raw value bytes for leaves.
//! The digest of an absent subtree is all zeroes.

use primitive_types::H256;

use crate::segment::Segment;

/// Digest of the empty trie and of any absent child.
pub const EMPTY_DIGEST: H256 = H256::zero();

const TAG_INTERNAL: u8 = 0x01;
const TAG_EXTENDER: u8 = 0x02;
const TAG_BUD: u8 = 0x03;
const TAG_LEAF: u8 = 0x04;

fn finish(hasher: blake3::Hasher) -> H256 {
    H256::from_slice(hasher.finalize().as_bytes())
}

pub fn internal_digest(left: &H256, right: &H256) -> H256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[TAG_INTERNAL]);
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    finish(hasher)
}

pub fn extender_digest(segment: &Segment, child: &H256) -> H256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[TAG_EXTENDER]);
    hasher.update(&(segment.len() as u16).to_le_bytes());
    hasher.update(&segment.to_packed());
    hasher.update(child.as_bytes());
    finish(hasher)
}

pub fn bud_digest(child: &H256) -> H256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[TAG_BUD]);
    hasher.update(child.as_bytes());
    finish(hasher)
}

/// Digest of a leaf value; doubles as the leaf-store key.
pub fn leaf_digest(value: &[u8]) -> H256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[TAG_LEAF]);
    hasher.update(value);
    finish(hasher)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::segment::Side;

    #[test]
    fn digests_are_tagged() {
        // A bud over a child must not collide with a leaf of the child's
        // bytes, nor with an extender of an empty-ish segment.
        let child = leaf_digest(b"value");
        assert_ne!(bud_digest(&child), leaf_digest(child.as_bytes()));
        assert_ne!(
            internal_digest(&child, &EMPTY_DIGEST),
            internal_digest(&EMPTY_DIGEST, &child)
        );
    }

    #[test]
    fn extender_digest_depends_on_segment() {
        let child = leaf_digest(b"v");
        let a = extender_digest(&Segment::single(Side::Left), &child);
        let b = extender_digest(&Segment::single(Side::Right), &child);
        assert_ne!(a, b);
    }

    #[test]
    fn leaf_digest_is_stable() {
        assert_eq!(leaf_digest(b"v"), leaf_digest(b"v"));
        assert_ne!(leaf_digest(b"v"), leaf_digest(b"w"));
        assert_ne!(leaf_digest(b""), EMPTY_DIGEST);
    }
}
