//! Position-keyed multi-hash tables, shared by the mesh simplifier and the
//! virtual geometry builder's cluster-boundary stitching.
//!
//! Every table in this crate keys on [`position_hash`], a 32-bit hash of a
//! `Point3<f32>` that treats `-0.0` and `+0.0` as identical so that
//! bit-for-bit equal positions emitted by unrelated triangles collide into
//! the same bucket.

use fxhash::FxHashMap;
use nalgebra::Point3;
use smallvec::SmallVec;

/// Inline capacity for a bucket's value list before it spills to the heap.
/// Most spatial buckets in a manifold mesh hold a small, fixed fan-out
/// (the triangles/edges touching one vertex), so four entries cover the
/// common case without allocating.
const INLINE_BUCKET_CAPACITY: usize = 4;

/// Normalize a single float so that `-0.0` hashes identically to `+0.0`.
#[inline]
fn normalize_zero(v: f32) -> f32 {
    if v == 0.0 {
        0.0
    } else {
        v
    }
}

/// Combine three already-normalized `f32` bit patterns with a Murmur-style
/// mix. Bit-identical positions (after zero normalization) always produce
/// the same hash.
#[inline]
fn murmur_mix3(mut a: u32, mut b: u32, mut c: u32) -> u32 {
    const M: u32 = 0x5bd1_e995;
    a = a.wrapping_mul(M);
    a ^= a >> 24;
    a = a.wrapping_mul(M);

    b = b.wrapping_mul(M);
    b ^= b >> 24;
    b = b.wrapping_mul(M);

    c = c.wrapping_mul(M);
    c ^= c >> 24;
    c = c.wrapping_mul(M);

    let mut h = 0u32;
    h = h.wrapping_mul(M) ^ a;
    h = h.wrapping_mul(M) ^ b;
    h = h.wrapping_mul(M) ^ c;
    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;
    h
}

/// Hash a position for use as a spatial table key. `-0.0` is folded into
/// `+0.0` before hashing, so positions that are bit-exact after that
/// normalization always collide.
pub fn position_hash(p: &Point3<f32>) -> u32 {
    let x = normalize_zero(p.x).to_bits();
    let y = normalize_zero(p.y).to_bits();
    let z = normalize_zero(p.z).to_bits();
    murmur_mix3(x, y, z)
}

/// An open-chaining multi-map from a spatial hash to a small set of owning
/// indices (vertex indices, index-array offsets, or edge indices depending
/// on which of the simplifier's four tables this backs).
#[derive(Debug, Default, Clone)]
pub struct PositionTable {
    buckets: FxHashMap<u32, SmallVec<[u32; INLINE_BUCKET_CAPACITY]>>,
}

impl PositionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `value` is associated with spatial hash `key`.
    pub fn insert(&mut self, key: u32, value: u32) {
        self.buckets.entry(key).or_default().push(value);
    }

    /// Remove a single `(key, value)` association, if present. Leaves the
    /// bucket in place (possibly empty) so a subsequent `insert` on the same
    /// key is cheap.
    pub fn remove(&mut self, key: u32, value: u32) {
        if let Some(bucket) = self.buckets.get_mut(&key) {
            if let Some(pos) = bucket.iter().position(|&v| v == value) {
                bucket.swap_remove(pos);
            }
        }
    }

    /// Iterate the values currently associated with `key`.
    pub fn iter(&self, key: u32) -> impl Iterator<Item = u32> + '_ {
        self.buckets
            .get(&key)
            .into_iter()
            .flat_map(|bucket| bucket.iter().copied())
    }

    /// Drop every value associated with `key`.
    pub fn clear_key(&mut self, key: u32) {
        self.buckets.remove(&key);
    }

    /// Insert at the hash of `position` directly.
    pub fn insert_at(&mut self, position: &Point3<f32>, value: u32) {
        self.insert(position_hash(position), value);
    }

    /// Iterate values at the hash of `position` directly.
    pub fn iter_at(&self, position: &Point3<f32>) -> impl Iterator<Item = u32> + '_ {
        self.iter(position_hash(position))
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn negative_zero_collides_with_positive_zero() {
        let a = Point3::new(0.0_f32, 1.0, -0.0);
        let b = Point3::new(-0.0_f32, 1.0, 0.0);
        assert_eq!(position_hash(&a), position_hash(&b));
    }

    #[test]
    fn distinct_positions_usually_diverge() {
        let a = Point3::new(0.0_f32, 0.0, 0.0);
        let b = Point3::new(1.0_f32, 0.0, 0.0);
        assert_ne!(position_hash(&a), position_hash(&b));
    }

    #[test]
    fn insert_iter_remove_round_trip() {
        let mut table = PositionTable::new();
        table.insert(42, 1);
        table.insert(42, 2);
        table.insert(42, 3);
        let mut values: Vec<u32> = table.iter(42).collect();
        values.sort_unstable();
        assert_eq!(values, vec![1, 2, 3]);

        table.remove(42, 2);
        let mut values: Vec<u32> = table.iter(42).collect();
        values.sort_unstable();
        assert_eq!(values, vec![1, 3]);

        table.clear_key(42);
        assert_eq!(table.iter(42).count(), 0);
    }

    #[test]
    fn position_helpers_match_manual_hash() {
        let mut table = PositionTable::new();
        let p = Point3::new(3.5_f32, -2.0, 9.25);
        table.insert_at(&p, 7);
        assert_eq!(table.iter_at(&p).collect::<Vec<_>>(), vec![7]);
        assert_eq!(table.iter(position_hash(&p)).collect::<Vec<_>>(), vec![7]);
    }
}
