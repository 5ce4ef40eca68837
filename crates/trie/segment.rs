use std::fmt;

use bitvec::prelude::{BitSlice, BitVec, Msb0};

use crate::error::TrieError;

/// Bit-sequence view used throughout the traversal code.
pub type Bits = BitSlice<u8, Msb0>;

/// Maximum number of bits a single path segment may hold.
///
/// A packed segment must fit the fixed-width extender cell together with its
/// length prefix, child index and digest (see `cell`), which leaves
/// [`SEGMENT_BYTES`] bytes of bit payload.
pub const MAX_SEGMENT_BITS: usize = SEGMENT_BYTES * 8;

/// Packed byte width of a segment inside an extender cell.
pub const SEGMENT_BYTES: usize = 21;

/// One bit of a key path: `Left` is 0, `Right` is 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// The opposite side.
    pub fn flip(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// Bit value of the side.
    pub fn bit(self) -> bool {
        matches!(self, Side::Right)
    }
}

impl From<bool> for Side {
    fn from(bit: bool) -> Self {
        if bit { Side::Right } else { Side::Left }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => write!(f, "L"),
            Side::Right => write!(f, "R"),
        }
    }
}

/// Splits off the head bit of a bit sequence.
pub(crate) fn cut(bits: &Bits) -> Option<(Side, &Bits)> {
    let (head, tail) = bits.split_first()?;
    Some((Side::from(*head), tail))
}

/// Splits `a` and `b` into their longest shared prefix and the two tails.
///
/// Either both tails are empty or their first bits differ.
pub(crate) fn split_common<'a>(a: &'a Bits, b: &'a Bits) -> (&'a Bits, &'a Bits, &'a Bits) {
    let shared = a
        .iter()
        .by_vals()
        .zip(b.iter().by_vals())
        .take_while(|(x, y)| x == y)
        .count();
    (&a[..shared], &a[shared..], &b[shared..])
}

/// An immutable, finite sequence of [`Side`]s: one fragment of a key path.
///
/// Bits are packed MSB-first, matching the on-disk encoding of extender
/// cells.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Segment {
    bits: BitVec<u8, Msb0>,
}

impl Segment {
    /// The empty segment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a segment from a sequence of sides.
    pub fn of_bits<I: IntoIterator<Item = Side>>(sides: I) -> Self {
        let mut bits = BitVec::new();
        for side in sides {
            bits.push(side.bit());
        }
        Segment { bits }
    }

    /// A single-bit segment.
    pub fn single(side: Side) -> Self {
        Segment::of_bits([side])
    }

    /// MSB-first expansion of raw key bytes, eight bits per byte.
    ///
    /// A convenience expansion for callers keying by byte strings; any other
    /// expansion can be expressed through [`Segment::of_bits`].
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Segment {
            bits: BitVec::from_slice(bytes),
        }
    }

    pub(crate) fn from_bits(bits: &Bits) -> Self {
        Segment {
            bits: bits.to_bitvec(),
        }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// The underlying bit sequence.
    pub fn as_bits(&self) -> &Bits {
        &self.bits
    }

    /// The side at position `i`. Panics when out of range.
    pub fn at(&self, i: usize) -> Side {
        Side::from(self.bits[i])
    }

    /// Splits off the head side, returning it and the tail.
    pub fn cut(&self) -> Option<(Side, Segment)> {
        let (side, tail) = cut(&self.bits)?;
        Some((side, Segment::from_bits(tail)))
    }

    /// `self ++ other`.
    pub fn concat(&self, other: &Segment) -> Segment {
        let mut bits = self.bits.clone();
        bits.extend_from_bitslice(&other.bits);
        Segment { bits }
    }

    /// Longest common prefix of two segments and their remaining tails.
    ///
    /// `a.common_prefix(&b)` returns `(p, a', b')` with `a = p ++ a'` and
    /// `b = p ++ b'`; either both tails are empty or their head bits differ.
    pub fn common_prefix(&self, other: &Segment) -> (Segment, Segment, Segment) {
        let (p, a, b) = split_common(&self.bits, &other.bits);
        (
            Segment::from_bits(p),
            Segment::from_bits(a),
            Segment::from_bits(b),
        )
    }

    /// Packs the segment into the fixed wire width, MSB-first.
    ///
    /// Callers must have checked the segment against [`MAX_SEGMENT_BITS`];
    /// `TriePath` construction enforces this for every reachable segment.
    pub(crate) fn to_packed(&self) -> [u8; SEGMENT_BYTES] {
        debug_assert!(self.bits.len() <= MAX_SEGMENT_BITS);
        let mut out = [0u8; SEGMENT_BYTES];
        for (i, bit) in self.bits.iter().by_vals().enumerate() {
            if bit {
                out[i / 8] |= 0x80 >> (i % 8);
            }
        }
        out
    }

    /// Reads `len` packed bits back out of the wire form.
    pub(crate) fn from_packed(bytes: &[u8; SEGMENT_BYTES], len: usize) -> Option<Segment> {
        if len == 0 || len > MAX_SEGMENT_BITS {
            return None;
        }
        let mut bits = BitVec::with_capacity(len);
        for i in 0..len {
            bits.push(bytes[i / 8] & (0x80 >> (i % 8)) != 0);
        }
        // Trailing bits beyond `len` must be zero, otherwise the cell was
        // not produced by `to_packed`.
        for i in len..MAX_SEGMENT_BITS {
            if bytes[i / 8] & (0x80 >> (i % 8)) != 0 {
                return None;
            }
        }
        Some(Segment { bits })
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in self.bits.iter().by_vals() {
            write!(f, "{}", Side::from(bit))?;
        }
        Ok(())
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// A key path: a non-empty sequence of segments.
///
/// Segments `s1 .. s(n-1)` each end at a bud (a sub-trie boundary); the last
/// segment ends at a leaf. Every segment is non-empty and at most
/// [`MAX_SEGMENT_BITS`] long; construction rejects anything else.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TriePath {
    segments: Vec<Segment>,
}

impl TriePath {
    pub fn new(segments: Vec<Segment>) -> Result<Self, TrieError> {
        if segments.is_empty() {
            return Err(TrieError::BadPath("path has no segments"));
        }
        for segment in &segments {
            if segment.is_empty() {
                return Err(TrieError::BadPath("path contains an empty segment"));
            }
            if segment.len() > MAX_SEGMENT_BITS {
                return Err(TrieError::BadPath("path segment exceeds the maximum length"));
            }
        }
        Ok(TriePath { segments })
    }

    /// A path of a single segment.
    pub fn single(segment: Segment) -> Result<Self, TrieError> {
        TriePath::new(vec![segment])
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        // Non-empty by construction.
        self.segments.is_empty()
    }

    /// Head segment and the remaining ones; the head drives the current
    /// traversal level, the rest continue below bud boundaries.
    pub(crate) fn split_first(&self) -> (&Segment, &[Segment]) {
        // Non-empty by construction.
        (&self.segments[0], &self.segments[1..])
    }
}

impl fmt::Display for TriePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for TriePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::{collection::vec, prelude::*, proptest};

    fn seg(s: &str) -> Segment {
        Segment::of_bits(s.chars().map(|c| match c {
            'L' => Side::Left,
            'R' => Side::Right,
            _ => panic!("bad side char {c}"),
        }))
    }

    #[test]
    fn cut_splits_head() {
        let s = seg("LRR");
        let (side, tail) = s.cut().unwrap();
        assert_eq!(side, Side::Left);
        assert_eq!(tail, seg("RR"));
        assert!(Segment::new().cut().is_none());
    }

    #[test]
    fn common_prefix_contract() {
        let a = seg("LLRL");
        let b = seg("LLLR");
        let (p, at, bt) = a.common_prefix(&b);
        assert_eq!(p, seg("LL"));
        assert_eq!(at, seg("RL"));
        assert_eq!(bt, seg("LR"));
        assert_eq!(p.concat(&at), a);
        assert_eq!(p.concat(&bt), b);

        let (p, at, bt) = a.common_prefix(&a);
        assert_eq!(p, a);
        assert!(at.is_empty() && bt.is_empty());
    }

    #[test]
    fn prefix_of_other_segment() {
        let a = seg("LL");
        let b = seg("LLRR");
        let (p, at, bt) = a.common_prefix(&b);
        assert_eq!(p, a);
        assert!(at.is_empty());
        assert_eq!(bt, seg("RR"));
    }

    #[test]
    fn from_bytes_is_msb_first() {
        let s = Segment::from_bytes(&hex_literal::hex!("a0"));
        assert_eq!(s.len(), 8);
        assert_eq!(s.at(0), Side::Right);
        assert_eq!(s.at(1), Side::Left);
        assert_eq!(s.at(2), Side::Right);
        assert_eq!(format!("{s}"), "RLRLLLLL");
    }

    #[test]
    fn packed_round_trip() {
        let s = seg("RLLRRRLLLLR");
        let packed = s.to_packed();
        assert_eq!(Segment::from_packed(&packed, s.len()).unwrap(), s);
        // A dirty trailing bit is rejected.
        let mut dirty = packed;
        dirty[SEGMENT_BYTES - 1] |= 1;
        assert!(Segment::from_packed(&dirty, s.len()).is_none());
        assert!(Segment::from_packed(&packed, 0).is_none());
    }

    #[test]
    fn path_validation() {
        assert!(TriePath::new(vec![]).is_err());
        assert!(TriePath::new(vec![seg("LL"), Segment::new()]).is_err());
        let long = Segment::of_bits(std::iter::repeat(Side::Left).take(MAX_SEGMENT_BITS + 1));
        assert!(TriePath::single(long).is_err());
        let p = TriePath::new(vec![seg("LL"), seg("R")]).unwrap();
        assert_eq!(p.len(), 2);
        assert_eq!(format!("{p}"), "LL/R");
    }

    proptest! {
        #[test]
        fn proptest_common_prefix_factors(a in vec(any::<bool>(), 0..64), b in vec(any::<bool>(), 0..64)) {
            let a = Segment::of_bits(a.into_iter().map(Side::from));
            let b = Segment::of_bits(b.into_iter().map(Side::from));
            let (p, at, bt) = a.common_prefix(&b);
            prop_assert_eq!(p.concat(&at), a);
            prop_assert_eq!(p.concat(&bt), b);
            match (at.cut(), bt.cut()) {
                (Some((x, _)), Some((y, _))) => prop_assert_ne!(x, y),
                (None, _) | (_, None) => {}
            }
        }

        #[test]
        fn proptest_packed_round_trip(bits in vec(any::<bool>(), 1..=MAX_SEGMENT_BITS)) {
            let s = Segment::of_bits(bits.into_iter().map(Side::from));
            let packed = s.to_packed();
            prop_assert_eq!(Segment::from_packed(&packed, s.len()).unwrap(), s);
        }
    }
}
