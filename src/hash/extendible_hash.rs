use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use parking_lot::Mutex;

struct Bucket<K, V> {
    depth: usize,
    items: HashMap<K, V>,
}

impl<K, V> Bucket<K, V> {
    fn new(depth: usize) -> Self {
        Self {
            depth,
            items: HashMap::new(),
        }
    }
}

/// Directory plus bucket arena. The directory holds `2^global_depth`
/// arena indices; several slots may reference the same bucket while its
/// local depth is below the global depth. Buckets are owned uniquely by
/// the arena, so splits only rewrite directory indices.
struct HashState<K, V> {
    global_depth: usize,
    directory: Vec<usize>,
    buckets: Vec<Bucket<K, V>>,
}

/// A latched map using directory-based extendible hashing.
///
/// The buffer pool uses this as its page table (page id to frame id).
/// A bucket that grows past `bucket_size` is split: its entries are
/// partitioned on one more hash bit, and the directory doubles whenever
/// a bucket's local depth would pass the global depth. The directory
/// never shrinks.
pub struct ExtendibleHashTable<K, V> {
    bucket_size: usize,
    state: Mutex<HashState<K, V>>,
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Creates an empty table with the given bucket capacity, a single
    /// bucket and a global depth of zero.
    pub fn new(bucket_size: usize) -> Self {
        assert!(bucket_size > 0, "bucket size must be positive");
        Self {
            bucket_size,
            state: Mutex::new(HashState {
                global_depth: 0,
                directory: vec![0],
                buckets: vec![Bucket::new(0)],
            }),
        }
    }

    fn hash_key(key: &K) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    fn dir_index(global_depth: usize, key: &K) -> usize {
        (Self::hash_key(key) & ((1u64 << global_depth) - 1)) as usize
    }

    /// Looks up the value stored for `key`.
    pub fn find(&self, key: &K) -> Option<V> {
        let state = self.state.lock();
        let slot = Self::dir_index(state.global_depth, key);
        state.buckets[state.directory[slot]].items.get(key).cloned()
    }

    /// Removes the entry for `key`, reporting whether one existed.
    pub fn remove(&self, key: &K) -> bool {
        let mut state = self.state.lock();
        let slot = Self::dir_index(state.global_depth, key);
        let bucket = state.directory[slot];
        state.buckets[bucket].items.remove(key).is_some()
    }

    /// Inserts or replaces the entry for `key`, splitting the target
    /// bucket as many times as the new entry requires.
    pub fn insert(&self, key: K, value: V) {
        let mut state = self.state.lock();

        let slot = Self::dir_index(state.global_depth, &key);
        let mut bucket_idx = state.directory[slot];
        state.buckets[bucket_idx].items.insert(key.clone(), value);

        // Colliding keys may keep the same bucket overfull under the
        // widened mask, so splitting repeats until the key's bucket fits.
        while state.buckets[bucket_idx].items.len() > self.bucket_size {
            state.split_bucket(bucket_idx);
            let slot = Self::dir_index(state.global_depth, &key);
            bucket_idx = state.directory[slot];
        }
    }

    /// Number of hash bits the directory indexes on.
    pub fn global_depth(&self) -> usize {
        self.state.lock().global_depth
    }

    /// Local depth of the bucket referenced by the given directory slot.
    pub fn local_depth(&self, dir_index: usize) -> usize {
        let state = self.state.lock();
        state.buckets[state.directory[dir_index]].depth
    }

    /// Number of distinct buckets.
    pub fn num_buckets(&self) -> usize {
        self.state.lock().buckets.len()
    }

    /// Total number of entries across all buckets.
    pub fn len(&self) -> usize {
        let state = self.state.lock();
        state.buckets.iter().map(|b| b.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> HashState<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Splits the bucket at `bucket_idx` once: entries whose hash has bit
    /// `depth` set move to a fresh sibling at depth + 1, and the directory
    /// either doubles or has the matching upper slots rewired.
    fn split_bucket(&mut self, bucket_idx: usize) {
        let depth = self.buckets[bucket_idx].depth;
        let sibling_idx = self.buckets.len();
        let mut sibling = Bucket::new(depth + 1);

        let moved: Vec<K> = self.buckets[bucket_idx]
            .items
            .keys()
            .filter(|k| ExtendibleHashTable::<K, V>::hash_key(k) & (1 << depth) != 0)
            .cloned()
            .collect();
        for k in moved {
            if let Some(v) = self.buckets[bucket_idx].items.remove(&k) {
                sibling.items.insert(k, v);
            }
        }

        self.buckets[bucket_idx].depth = depth + 1;
        self.buckets.push(sibling);

        if depth + 1 > self.global_depth {
            // Double the directory: every appended slot mirrors its twin
            // in the lower half, except the split pair diverges.
            for i in 0..(1 << self.global_depth) {
                if self.directory[i] == bucket_idx {
                    self.directory.push(sibling_idx);
                } else {
                    self.directory.push(self.directory[i]);
                }
            }
            self.global_depth += 1;
        } else {
            for i in 0..(1 << self.global_depth) {
                if self.directory[i] == bucket_idx && i & (1 << depth) != 0 {
                    self.directory[i] = sibling_idx;
                }
            }
        }
    }
}
