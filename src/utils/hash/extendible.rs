use parking_lot::Mutex;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};

#[derive(Debug)]
struct Bucket<K, V> {
    local_depth: u32,
    items: Vec<(K, V)>,
}

#[derive(Debug)]
struct Directory<K, V> {
    global_depth: u32,
    num_buckets: usize,
    // Directory slot -> bucket arena index. Slots whose low local_depth
    // bits agree reference the same bucket.
    slots: Vec<usize>,
    buckets: Vec<Bucket<K, V>>,
}

/// Extendible hash table: a directory of `2^global_depth` slots over
/// independently splitting buckets. The directory doubles when a full
/// bucket already sits at global depth; buckets are never merged.
///
/// Buckets live in an arena and slots hold indices into it; a split
/// reuses the old bucket's arena slot for the zero half and appends the
/// one half.
///
/// A single mutex serializes every public method, observers included.
#[derive(Debug)]
pub struct ExtendibleHashTable<K, V, S = RandomState> {
    bucket_size: usize,
    hasher: S,
    dir: Mutex<Directory<K, V>>,
}

impl<K: Hash + Eq, V: Clone> ExtendibleHashTable<K, V> {
    pub fn new(bucket_size: usize) -> Self {
        Self::with_hasher(bucket_size, RandomState::new())
    }
}

impl<K, V, S> ExtendibleHashTable<K, V, S>
where
    K: Hash + Eq,
    V: Clone,
    S: BuildHasher,
{
    pub fn with_hasher(bucket_size: usize, hasher: S) -> Self {
        assert!(bucket_size > 0, "bucket_size must be positive");
        Self {
            bucket_size,
            hasher,
            dir: Mutex::new(Directory {
                global_depth: 0,
                num_buckets: 1,
                slots: vec![0],
                buckets: vec![Bucket {
                    local_depth: 0,
                    items: Vec::with_capacity(bucket_size),
                }],
            }),
        }
    }

    fn slot_of(hash: u64, global_depth: u32) -> usize {
        (hash & ((1u64 << global_depth) - 1)) as usize
    }

    pub fn find(&self, key: &K) -> Option<V> {
        let hash = self.hasher.hash_one(key);
        let dir = self.dir.lock();
        let bucket = &dir.buckets[dir.slots[Self::slot_of(hash, dir.global_depth)]];
        bucket
            .items
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.clone())
    }

    /// Insert or replace. Splits the target bucket (growing the directory
    /// when needed) until the pair fits; the lock is held across retries.
    pub fn insert(&self, key: K, value: V) {
        let hash = self.hasher.hash_one(&key);
        let mut dir = self.dir.lock();
        loop {
            let bucket_idx = dir.slots[Self::slot_of(hash, dir.global_depth)];
            let bucket = &mut dir.buckets[bucket_idx];
            if let Some(pair) = bucket.items.iter_mut().find(|(existing, _)| *existing == key)
            {
                pair.1 = value;
                return;
            }
            if bucket.items.len() < self.bucket_size {
                bucket.items.push((key, value));
                return;
            }
            // A split may leave every entry on one side, so the loop may
            // split the same slot's bucket repeatedly.
            self.split(&mut dir, bucket_idx);
        }
    }

    pub fn remove(&self, key: &K) -> bool {
        let hash = self.hasher.hash_one(key);
        let mut dir = self.dir.lock();
        let bucket_idx = dir.slots[Self::slot_of(hash, dir.global_depth)];
        let bucket = &mut dir.buckets[bucket_idx];
        match bucket.items.iter().position(|(existing, _)| existing == key) {
            Some(pos) => {
                bucket.items.remove(pos);
                true
            }
            None => false,
        }
    }

    fn split(&self, dir: &mut Directory<K, V>, bucket_idx: usize) {
        let local_depth = dir.buckets[bucket_idx].local_depth;
        if local_depth == dir.global_depth {
            // Double the directory: the appended half mirrors the
            // existing slots, so no bucket moves yet.
            let len = dir.slots.len();
            dir.slots.extend_from_within(..len);
            dir.global_depth += 1;
        }

        let split_bit = 1u64 << local_depth;
        let old_items = std::mem::take(&mut dir.buckets[bucket_idx].items);
        dir.buckets[bucket_idx].local_depth = local_depth + 1;
        let new_idx = dir.buckets.len();
        dir.buckets.push(Bucket {
            local_depth: local_depth + 1,
            items: Vec::with_capacity(self.bucket_size),
        });

        for (key, value) in old_items {
            let target = if self.hasher.hash_one(&key) & split_bit != 0 {
                new_idx
            } else {
                bucket_idx
            };
            dir.buckets[target].items.push((key, value));
        }

        for (slot, target) in dir.slots.iter_mut().enumerate() {
            if *target == bucket_idx && (slot as u64) & split_bit != 0 {
                *target = new_idx;
            }
        }
        dir.num_buckets += 1;
    }

    pub fn global_depth(&self) -> u32 {
        self.dir.lock().global_depth
    }

    pub fn local_depth(&self, dir_idx: usize) -> u32 {
        let dir = self.dir.lock();
        dir.buckets[dir.slots[dir_idx]].local_depth
    }

    pub fn num_buckets(&self) -> usize {
        self.dir.lock().num_buckets
    }

    /// Total number of key-value pairs.
    pub fn len(&self) -> usize {
        let dir = self.dir.lock();
        dir.buckets.iter().map(|bucket| bucket.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn slots_snapshot(&self) -> Vec<usize> {
        self.dir.lock().slots.clone()
    }
}
