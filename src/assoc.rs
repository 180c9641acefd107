//! Sparse association store.
//!
//! Maps a `(word, position, word, position)` key to a signed score. Absent
//! keys read as zero and an entry whose score returns to zero is removed, so
//! memory tracks the number of observed pairs instead of the dense
//! `|vocabulary|² × length²` space.
//!
//! Buckets are chained and indexed by a multiplicative avalanche hash of the
//! four key components. The table doubles once the load factor would exceed
//! 0.75.

use std::fmt;

use crate::vocabulary::TokenId;

const DEFAULT_BUCKETS: usize = 1024;
const HASH_SEED: u64 = 0x9e37_79b9_7f4a_7c15;

/// Key of one association: token `word` at `position` paired with token
/// `other` at `other_position`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssocKey {
    /// First token.
    pub word: TokenId,
    /// Position of the first token in its command.
    pub position: u32,
    /// Second token.
    pub other: TokenId,
    /// Position of the second token in its command.
    pub other_position: u32,
}

impl AssocKey {
    /// Creates a key.
    #[must_use]
    pub const fn new(word: TokenId, position: u32, other: TokenId, other_position: u32) -> Self {
        Self {
            word,
            position,
            other,
            other_position,
        }
    }

    /// The same pair seen from the other side.
    #[must_use]
    pub const fn reversed(self) -> Self {
        Self::new(self.other, self.other_position, self.word, self.position)
    }

    fn mixed_hash(self) -> u64 {
        let mut x = HASH_SEED;
        for part in [self.word, self.position, self.other, self.other_position] {
            x ^= u64::from(part);
            x = mix64(x);
        }
        x
    }
}

impl fmt::Display for AssocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}@{}, {}@{})",
            self.word, self.position, self.other, self.other_position
        )
    }
}

/// Three xor-shift/multiply rounds (the murmur3 finalizer).
const fn mix64(mut x: u64) -> u64 {
    x ^= x >> 33;
    x = x.wrapping_mul(0xff51_afd7_ed55_8ccd);
    x ^= x >> 33;
    x = x.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    x ^= x >> 33;
    x
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    key: AssocKey,
    value: i64,
}

/// Chained hash map from `AssocKey` to a nonzero score.
#[derive(Debug, Clone)]
pub struct AssocStore {
    buckets: Vec<Vec<Entry>>,
    len: usize,
}

impl Default for AssocStore {
    fn default() -> Self {
        Self::with_buckets(DEFAULT_BUCKETS)
    }
}

impl AssocStore {
    /// Creates an empty store with the default bucket count.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store; `hint` is rounded up to a power of two.
    #[must_use]
    pub fn with_buckets(hint: usize) -> Self {
        let cap = hint.max(1).next_power_of_two();
        Self {
            buckets: vec![Vec::new(); cap],
            len: 0,
        }
    }

    /// Number of live (nonzero) entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no entry is stored.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current bucket count.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Returns the score for `key`, zero when absent.
    #[must_use]
    pub fn get(&self, key: AssocKey) -> i64 {
        self.buckets[self.bucket_of(key)]
            .iter()
            .find(|e| e.key == key)
            .map_or(0, |e| e.value)
    }

    /// Sum of both directions of a pair.
    #[must_use]
    pub fn get_bidirectional(&self, key: AssocKey) -> i64 {
        self.get(key).saturating_add(self.get(key.reversed()))
    }

    /// Adds `delta` to the entry for `key`, creating it if needed and
    /// deleting it once it reaches zero. A zero delta is a no-op.
    pub fn add(&mut self, key: AssocKey, delta: i64) {
        if delta == 0 {
            return;
        }

        if (self.len + 1) * 4 > self.buckets.len() * 3 {
            self.resize(self.buckets.len() * 2);
        }

        let idx = self.bucket_of(key);
        let bucket = &mut self.buckets[idx];
        if let Some(pos) = bucket.iter().position(|e| e.key == key) {
            let value = bucket[pos].value.saturating_add(delta);
            if value == 0 {
                bucket.swap_remove(pos);
                self.len -= 1;
            } else {
                bucket[pos].value = value;
            }
            return;
        }

        bucket.push(Entry { key, value: delta });
        self.len += 1;
    }

    /// Iterates every live entry in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (AssocKey, i64)> + '_ {
        self.buckets
            .iter()
            .flat_map(|bucket| bucket.iter().map(|e| (e.key, e.value)))
    }

    /// Removes every entry while keeping the current bucket count.
    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.len = 0;
    }

    #[allow(clippy::cast_possible_truncation)]
    fn bucket_of(&self, key: AssocKey) -> usize {
        // Bucket count is a power of two, so masking keeps the low bits.
        (key.mixed_hash() as usize) & (self.buckets.len() - 1)
    }

    fn resize(&mut self, new_cap: usize) {
        let old = std::mem::replace(&mut self.buckets, vec![Vec::new(); new_cap]);
        for entry in old.into_iter().flatten() {
            let idx = self.bucket_of(entry.key);
            self.buckets[idx].push(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(i: u32, pi: u32, k: u32, pk: u32) -> AssocKey {
        AssocKey::new(i, pi, k, pk)
    }

    #[test]
    fn absent_key_reads_zero() {
        let store = AssocStore::new();
        assert_eq!(store.get(key(1, 0, 2, 1)), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn deltas_accumulate() {
        let mut store = AssocStore::new();
        store.add(key(1, 0, 2, 1), 10);
        store.add(key(1, 0, 2, 1), -3);
        assert_eq!(store.get(key(1, 0, 2, 1)), 7);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn reaching_zero_deletes_entry() {
        let mut store = AssocStore::new();
        store.add(key(4, 1, 9, 0), 5);
        store.add(key(4, 1, 9, 0), -5);
        assert_eq!(store.get(key(4, 1, 9, 0)), 0);
        assert_eq!(store.len(), 0);
        assert_eq!(store.iter().count(), 0);
    }

    #[test]
    fn zero_delta_is_noop() {
        let mut store = AssocStore::new();
        store.add(key(0, 0, 1, 1), 0);
        assert!(store.is_empty());
        assert_eq!(store.iter().count(), 0);
    }

    #[test]
    fn key_components_are_not_interchangeable() {
        let mut store = AssocStore::new();
        store.add(key(1, 2, 3, 4), 1);
        assert_eq!(store.get(key(2, 1, 3, 4)), 0);
        assert_eq!(store.get(key(3, 4, 1, 2)), 0);
        assert_eq!(store.get_bidirectional(key(3, 4, 1, 2)), 1);
    }

    #[test]
    fn grows_past_load_factor_and_keeps_entries() {
        let mut store = AssocStore::with_buckets(4);
        for i in 0..500u32 {
            store.add(key(i, i % 10, i + 1, (i + 1) % 10), i64::from(i) + 1);
        }
        assert_eq!(store.len(), 500);
        assert!(store.len() * 4 <= store.bucket_count() * 3);
        for i in 0..500u32 {
            assert_eq!(store.get(key(i, i % 10, i + 1, (i + 1) % 10)), i64::from(i) + 1);
        }
    }

    #[test]
    fn iteration_yields_every_live_entry_once() {
        let mut store = AssocStore::new();
        store.add(key(0, 0, 1, 1), 3);
        store.add(key(1, 1, 0, 0), 3);
        store.add(key(2, 0, 3, 1), -1);
        store.add(key(5, 0, 6, 1), 2);
        store.add(key(5, 0, 6, 1), -2);

        let mut rows: Vec<_> = store.iter().collect();
        rows.sort();
        assert_eq!(
            rows,
            vec![(key(0, 0, 1, 1), 3), (key(1, 1, 0, 0), 3), (key(2, 0, 3, 1), -1)]
        );
    }

    #[test]
    fn clear_empties_store() {
        let mut store = AssocStore::new();
        store.add(key(0, 0, 1, 1), 3);
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.get(key(0, 0, 1, 1)), 0);
    }
}
