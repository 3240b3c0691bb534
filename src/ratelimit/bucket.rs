//! Per-caller admission records and the sharded store that holds them.

use std::collections::VecDeque;
use std::hash::Hash;
use std::time::Duration;

use dashmap::mapref::one::RefMut;
use dashmap::DashMap;

/// Time-ordered admission timestamps for a single caller.
///
/// Records are only ever appended with the current time and only ever
/// removed from the front, so the deque stays sorted oldest-first.
#[derive(Debug, Default, Clone)]
pub struct Bucket {
    records: VecDeque<Duration>,
}

impl Bucket {
    /// Number of records currently held. Only meaningful as a live count
    /// right after an eviction pass.
    pub fn len(&self) -> u64 {
        self.records.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append an admission at `at`.
    pub fn record(&mut self, at: Duration) {
        self.records.push_back(at);
    }

    /// Drop records from the front while `is_expired` holds.
    ///
    /// Returns the number of records removed.
    pub fn evict_while<F>(&mut self, mut is_expired: F) -> usize
    where
        F: FnMut(Duration) -> bool,
    {
        let mut evicted = 0;
        while let Some(&oldest) = self.records.front() {
            if !is_expired(oldest) {
                break;
            }
            self.records.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Release memory held by evicted records.
    pub fn shrink(&mut self) {
        self.records.shrink_to_fit();
    }
}

/// Caller → bucket map, sharded by caller hash.
///
/// Every mutation of a caller's bucket happens while holding the write lock
/// of the shard that caller hashes to, so the evict/check/append sequence
/// for one caller is atomic while unrelated callers on other shards proceed
/// in parallel.
pub struct BucketStore<K> {
    buckets: DashMap<K, Bucket>,
}

impl<K: Eq + Hash + Clone> BucketStore<K> {
    /// Create a store with `shards` independently locked shards.
    ///
    /// `shards` must be a power of two greater than one; the limiter
    /// configuration validates this before a store is built.
    pub fn with_shards(shards: usize) -> Self {
        Self {
            buckets: DashMap::with_shard_amount(shards),
        }
    }

    /// Lock the caller's shard and return its bucket, creating an empty one
    /// on first reference.
    ///
    /// The shard stays locked until the returned guard is dropped.
    pub fn entry(&self, caller: &K) -> RefMut<'_, K, Bucket> {
        if let Some(bucket) = self.buckets.get_mut(caller) {
            return bucket;
        }
        self.buckets.entry(caller.clone()).or_default()
    }

    /// Lock the caller's shard and return its bucket if one exists.
    pub fn get_mut(&self, caller: &K) -> Option<RefMut<'_, K, Bucket>> {
        self.buckets.get_mut(caller)
    }

    /// Visit every bucket, one shard lock at a time.
    pub fn for_each_mut<F>(&self, mut f: F)
    where
        F: FnMut(&K, &mut Bucket),
    {
        for mut entry in self.buckets.iter_mut() {
            let (caller, bucket) = entry.pair_mut();
            f(caller, bucket);
        }
    }

    /// Number of callers ever seen.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
