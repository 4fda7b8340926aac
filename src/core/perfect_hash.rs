//! Minimal perfect hash index
//!
//! Maps a fixed set of string keys onto a dense table so that every lookup
//! costs one or two hash computations:
//!
//! 1. `h0 = hash(key, DEFAULT_SEED) % table_size`
//! 2. `r = redirect[h0]`
//! 3. `r < 0`: the key sits alone at `order[-r - 1]`
//! 4. `r > 0`: the key sits at `order[hash(key, r) % table_size]`
//! 5. `r == 0`: the key is absent
//!
//! A slot reached this way is only a candidate; callers compare the stored key
//! before trusting it.
//!
//! Construction buckets keys by primary hash and places the longest buckets
//! first, searching for a per-bucket seed that scatters the bucket into free
//! slots. Singleton buckets fill the remaining slots in order. When a bucket
//! exhausts its seed budget the table grows to `(size + 1) | 1` and
//! construction restarts. Both budgets are bounded; exceeding them is
//! [`ImageError::HashConstructionExhausted`].

use crate::error::{ImageError, Result};
use crate::strings::{image_hash, DEFAULT_SEED, HASH_MULTIPLIER};
use indexmap::IndexMap;
use tracing::debug;

/// Seeds tried per colliding bucket before the table grows
pub const RETRY_LIMIT: u32 = 1000;

/// Table regrowths tried before construction gives up
pub const MAX_REGROWS: u32 = 1024;

/// One key/value pair placed in the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<V> {
    key: String,
    value: V,
}

impl<V> Entry<V> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn hash(&self, seed: i32) -> i32 {
        image_hash(&self.key, seed)
    }

    pub fn into_parts(self) -> (String, V) {
        (self.key, self.value)
    }
}

/// Locate the candidate slot for `key` in a table of `table_size` slots.
///
/// `redirect_at` reads one redirect value, so this works over an in-memory
/// table as well as over serialized image bytes.
pub fn find_slot<F>(table_size: usize, key: &str, redirect_at: F) -> Option<usize>
where
    F: Fn(usize) -> Option<i32>,
{
    if table_size == 0 {
        return None;
    }
    let primary = image_hash(key, DEFAULT_SEED) as usize % table_size;
    let redirect = redirect_at(primary)?;
    if redirect < 0 {
        let slot = (-1 - redirect as i64) as usize;
        (slot < table_size).then_some(slot)
    } else if redirect > 0 {
        Some(image_hash(key, redirect) as usize % table_size)
    } else {
        None
    }
}

/// Collects keys and builds a [`PerfectHash`]
#[derive(Debug, Clone)]
pub struct PerfectHashBuilder<V> {
    entries: IndexMap<String, V>,
    retry_limit: u32,
    max_regrows: u32,
}

impl<V> PerfectHashBuilder<V> {
    pub fn new() -> Self {
        Self::with_limits(RETRY_LIMIT, MAX_REGROWS)
    }

    /// Builder with custom seed and regrowth budgets
    pub fn with_limits(retry_limit: u32, max_regrows: u32) -> Self {
        PerfectHashBuilder {
            entries: IndexMap::new(),
            retry_limit,
            max_regrows,
        }
    }

    /// Insert a key, replacing (and returning) any previous value
    pub fn put(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        self.entries.insert(key.into(), value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build the table. Same keys in the same insertion order always produce
    /// the same table.
    pub fn build(self) -> Result<PerfectHash<V>> {
        let count = self.entries.len();
        if count == 0 {
            return Ok(PerfectHash {
                redirect: Vec::new(),
                order: Vec::new(),
            });
        }

        let keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        let primary: Vec<usize> = keys
            .iter()
            .map(|key| image_hash(key, DEFAULT_SEED) as usize)
            .collect();

        let mut table_size = count;
        let mut regrows = 0;
        let (redirect, slots) = loop {
            if let Some(placed) = self.place(&keys, &primary, table_size) {
                break placed;
            }
            if regrows >= self.max_regrows {
                return Err(ImageError::HashConstructionExhausted {
                    keys: count,
                    table_size,
                });
            }
            regrows += 1;
            table_size = (table_size + 1) | 1;
            debug!("perfect hash regrow {} to table size {}", regrows, table_size);
        };

        let mut values: Vec<Option<(String, V)>> = self.entries.into_iter().map(Some).collect();
        let order = slots
            .into_iter()
            .map(|slot| {
                slot.and_then(|index| values[index].take())
                    .map(|(key, value)| Entry { key, value })
            })
            .collect();

        Ok(PerfectHash { redirect, order })
    }

    /// One placement attempt; `None` means the table must grow
    fn place(
        &self,
        keys: &[&str],
        primary: &[usize],
        table_size: usize,
    ) -> Option<(Vec<i32>, Vec<Option<usize>>)> {
        let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); table_size];
        for (index, hash) in primary.iter().enumerate() {
            buckets[hash % table_size].push(index);
        }

        let mut sorted: Vec<(usize, Vec<usize>)> = buckets
            .into_iter()
            .enumerate()
            .filter(|(_, bucket)| !bucket.is_empty())
            .collect();
        // Stable: equal lengths keep primary-slot order.
        sorted.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

        let mut redirect = vec![0i32; table_size];
        let mut order: Vec<Option<usize>> = vec![None; table_size];
        let mut free = 0;

        for (slot, bucket) in &sorted {
            if bucket.len() > 1 {
                let seed = self.place_collided(keys, bucket, &mut order)?;
                redirect[*slot] = seed;
            } else {
                while free < table_size && order[free].is_some() {
                    free += 1;
                }
                if free >= table_size {
                    return None;
                }
                order[free] = Some(bucket[0]);
                redirect[*slot] = -1 - free as i32;
                free += 1;
            }
        }

        Some((redirect, order))
    }

    /// Find a seed scattering `bucket` into free slots, claiming them
    fn place_collided(
        &self,
        keys: &[&str],
        bucket: &[usize],
        order: &mut [Option<usize>],
    ) -> Option<i32> {
        let table_size = order.len();
        let mut seed = HASH_MULTIPLIER.wrapping_add(1);
        let mut retry = 0;
        let mut claimed = Vec::with_capacity(bucket.len());

        'seeds: loop {
            for &index in bucket {
                let slot = image_hash(keys[index], seed) as usize % table_size;
                if order[slot].is_some() {
                    for undo in claimed.drain(..) {
                        order[undo] = None;
                    }
                    retry += 1;
                    if retry > self.retry_limit {
                        return None;
                    }
                    seed = seed.wrapping_add(1);
                    if seed <= 0 {
                        seed = 1;
                    }
                    continue 'seeds;
                }
                order[slot] = Some(index);
                claimed.push(slot);
            }
            return Some(seed);
        }
    }
}

impl<V> Default for PerfectHashBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// A built perfect hash table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerfectHash<V> {
    redirect: Vec<i32>,
    order: Vec<Option<Entry<V>>>,
}

impl<V> PerfectHash<V> {
    pub fn table_size(&self) -> usize {
        self.redirect.len()
    }

    pub fn redirect(&self) -> &[i32] {
        &self.redirect
    }

    pub fn order(&self) -> &[Option<Entry<V>>] {
        &self.order
    }

    /// Slot holding `key`, verified by key comparison
    pub fn slot_of(&self, key: &str) -> Option<usize> {
        let slot = find_slot(self.table_size(), key, |i| self.redirect.get(i).copied())?;
        match self.order.get(slot)? {
            Some(entry) if entry.key == key => Some(slot),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        let slot = self.slot_of(key)?;
        self.order[slot].as_ref().map(Entry::value)
    }

    /// Consume the table into its slot order
    pub fn into_order(self) -> Vec<Option<Entry<V>>> {
        self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(keys: &[String]) -> PerfectHash<usize> {
        let mut builder = PerfectHashBuilder::new();
        for (i, key) in keys.iter().enumerate() {
            builder.put(key.clone(), i);
        }
        builder.build().unwrap()
    }

    fn resource_keys(n: usize) -> Vec<String> {
        (0..n)
            .map(|i| format!("/mod{}/pkg{}/Class{}.class", i % 7, i % 13, i))
            .collect()
    }

    #[test]
    fn test_every_key_found() {
        let keys = resource_keys(2000);
        let table = build(&keys);
        assert!(table.table_size() >= keys.len());
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(table.get(key), Some(&i), "missing {}", key);
        }
    }

    #[test]
    fn test_absent_keys_not_found() {
        let keys = resource_keys(500);
        let table = build(&keys);
        for i in 0..500 {
            assert_eq!(table.get(&format!("/absent/Class{}.class", i)), None);
        }
    }

    #[test]
    fn test_deterministic() {
        let keys = resource_keys(1000);
        let first = build(&keys);
        let second = build(&keys);
        assert_eq!(first.redirect(), second.redirect());
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_and_single() {
        let empty: PerfectHash<u8> = PerfectHashBuilder::new().build().unwrap();
        assert_eq!(empty.table_size(), 0);
        assert_eq!(empty.get("x"), None);

        let mut builder = PerfectHashBuilder::new();
        builder.put("/only", 7u8);
        let single = builder.build().unwrap();
        assert_eq!(single.table_size(), 1);
        assert_eq!(single.redirect(), &[-1]);
        assert_eq!(single.get("/only"), Some(&7));
    }

    #[test]
    fn test_put_replaces_value() {
        let mut builder = PerfectHashBuilder::new();
        assert_eq!(builder.put("a", 1), None);
        assert_eq!(builder.put("a", 2), Some(1));
        assert_eq!(builder.len(), 1);
        let table = builder.build().unwrap();
        assert_eq!(table.get("a"), Some(&2));
    }

    #[test]
    fn test_redirect_encoding() {
        let keys = resource_keys(300);
        let table = build(&keys);
        let occupied = table.order().iter().filter(|slot| slot.is_some()).count();
        assert_eq!(occupied, keys.len());
        for &r in table.redirect() {
            if r < 0 {
                let slot = (-1 - r) as usize;
                assert!(table.order()[slot].is_some());
            }
        }
    }

    #[test]
    fn test_exhaustion_is_an_error() {
        let mut builder = PerfectHashBuilder::with_limits(0, 0);
        for key in resource_keys(2000) {
            builder.put(key, ());
        }
        assert!(matches!(
            builder.build(),
            Err(ImageError::HashConstructionExhausted { keys: 2000, .. })
        ));
    }

    #[test]
    fn test_find_slot_over_raw_table() {
        let keys = resource_keys(64);
        let table = build(&keys);
        let redirect = table.redirect().to_vec();
        for key in &keys {
            let slot = find_slot(redirect.len(), key, |i| redirect.get(i).copied()).unwrap();
            assert_eq!(table.order()[slot].as_ref().unwrap().key(), key);
        }
        assert_eq!(find_slot(0, "x", |_| Some(1)), None);
    }
}
