//! # Index — Arena-Chained Bucket Store
//!
//! The meet-in-the-middle index: a fixed number of buckets addressed by a
//! fingerprint residue, each holding a chain of payloads. Chains live in one
//! flat arena of slots with explicit `next` links, so inserting never
//! allocates once the arena has grown to its working size.
//!
//! ```text
//! heads[key] ──► slot 4 ──► slot 9 ──► slot 11 ──► NIL
//! tails[key] ─────────────────────────────┘
//! ```
//!
//! Links are stored 1-based (`0` is the empty marker). The store also
//! remembers which buckets were touched since the last reset, so
//! [`BucketStore::reset`] clears only those heads and [`BucketStore::keys`]
//! walks occupied buckets without scanning the whole key space. Both matter
//! when the key space is far larger than the number of payloads per round.

const NIL: u32 = 0;

#[derive(Debug, Clone)]
struct Slot<T> {
    next: u32,
    payload: T,
}

/// Chained bucket store keyed by `key < buckets`.
#[derive(Debug, Clone)]
pub struct BucketStore<T> {
    heads: Vec<u32>,
    tails: Vec<u32>,
    slots: Vec<Slot<T>>,
    occupied: Vec<u32>,
}

impl<T: Copy> BucketStore<T> {
    pub fn new(buckets: usize) -> Self {
        BucketStore {
            heads: vec![NIL; buckets],
            tails: vec![NIL; buckets],
            slots: Vec::new(),
            occupied: Vec::new(),
        }
    }

    /// Reserve arena room for `additional` more payloads.
    pub fn reserve(&mut self, additional: usize) {
        self.slots.reserve(additional);
    }

    /// Empty every bucket, keeping the arena allocation.
    pub fn reset(&mut self) {
        for &key in &self.occupied {
            self.heads[key as usize] = NIL;
        }
        self.occupied.clear();
        self.slots.clear();
    }

    /// Append `payload` to the chain for `key`.
    #[inline]
    pub fn insert(&mut self, key: usize, payload: T) {
        let slot = self.slots.len() as u32 + 1;
        self.slots.push(Slot { next: NIL, payload });
        if self.heads[key] == NIL {
            self.heads[key] = slot;
            self.occupied.push(key as u32);
        } else {
            let tail = self.tails[key] as usize - 1;
            self.slots[tail].next = slot;
        }
        self.tails[key] = slot;
    }

    /// Every payload stored under `key`, in insertion order.
    #[inline]
    pub fn probe(&self, key: usize) -> Chain<'_, T> {
        Chain {
            slots: &self.slots,
            cursor: self.heads[key],
        }
    }

    #[inline]
    pub fn is_occupied(&self, key: usize) -> bool {
        self.heads[key] != NIL
    }

    /// Occupied keys, in order of their first insertion.
    pub fn keys(&self) -> impl Iterator<Item = usize> + '_ {
        self.occupied.iter().map(|&k| k as usize)
    }

    pub fn buckets(&self) -> usize {
        self.heads.len()
    }

    /// Number of stored payloads.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Arena capacity currently allocated.
    #[cfg(test)]
    fn capacity(&self) -> usize {
        self.slots.capacity()
    }
}

/// Iterator over one bucket's chain.
pub struct Chain<'a, T> {
    slots: &'a [Slot<T>],
    cursor: u32,
}

impl<T: Copy> Iterator for Chain<'_, T> {
    type Item = T;

    #[inline]
    fn next(&mut self) -> Option<T> {
        if self.cursor == NIL {
            return None;
        }
        let slot = &self.slots[self.cursor as usize - 1];
        self.cursor = slot.next;
        Some(slot.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bucket_probes_nothing() {
        let store: BucketStore<u32> = BucketStore::new(8);
        assert_eq!(store.probe(3).count(), 0);
        assert!(!store.is_occupied(3));
        assert!(store.is_empty());
        assert_eq!(store.buckets(), 8);
    }

    /// Chains come back in insertion order, and keys never bleed into each
    /// other.
    #[test]
    fn chains_preserve_insertion_order() {
        let mut store = BucketStore::new(4);
        store.insert(1, 10u32);
        store.insert(2, 20);
        store.insert(1, 11);
        store.insert(1, 12);
        store.insert(2, 21);
        assert_eq!(store.probe(1).collect::<Vec<_>>(), vec![10, 11, 12]);
        assert_eq!(store.probe(2).collect::<Vec<_>>(), vec![20, 21]);
        assert_eq!(store.probe(0).count(), 0);
        assert_eq!(store.len(), 5);
    }

    /// Reset empties every bucket but the arena keeps its allocation, and
    /// stale tail pointers from the previous round are never followed.
    #[test]
    fn reset_reuses_arena() {
        let mut store = BucketStore::new(4);
        for i in 0..100u32 {
            store.insert((i % 4) as usize, i);
        }
        let cap = store.capacity();
        store.reset();
        assert!(store.is_empty());
        assert_eq!(store.probe(0).count(), 0);
        assert_eq!(store.capacity(), cap);

        store.insert(3, 7);
        store.insert(3, 8);
        assert_eq!(store.probe(3).collect::<Vec<_>>(), vec![7, 8]);
        assert_eq!(store.capacity(), cap);
        assert_eq!(store.keys().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn keys_list_each_occupied_bucket_once() {
        let mut store = BucketStore::new(1000);
        for (key, value) in [(700usize, 1u32), (3, 2), (700, 3), (42, 4)] {
            store.insert(key, value);
        }
        assert_eq!(store.keys().collect::<Vec<_>>(), vec![700, 3, 42]);
        store.reset();
        assert_eq!(store.keys().count(), 0);
        assert!(!store.is_occupied(700));
    }

    #[test]
    fn tuple_payloads() {
        let mut store = BucketStore::new(2);
        store.insert(0, (1117u32, 770u32));
        store.reserve(16);
        assert_eq!(store.probe(0).next(), Some((1117, 770)));
    }
}
