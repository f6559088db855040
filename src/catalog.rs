//! Fixed-bucket path index
//!
//! `ContentCatalog` maps a path to its [`ContentRecord`] using a fixed number
//! of buckets with per-bucket chaining. The bucket count never changes, so
//! iteration order (bucket by bucket, then chain position) is a pure function
//! of the insertion history. Diffing and snapshot encoding both rely on that
//! order being stable.
//!
//! ## Capacity
//!
//! With [`BUCKET_COUNT`] buckets, lookups stay O(1) on average up to a few
//! thousand paths. Past that, chains grow and lookups degrade linearly with
//! chain length. Results remain correct at any size.
//!
//! ## Example
//!
//! ```rust
//! use usbdiff::catalog::ContentCatalog;
//!
//! let mut catalog = ContentCatalog::new();
//! catalog.upsert("a.txt", "11".repeat(32), 10, 100);
//! catalog.upsert("a.txt", "22".repeat(32), 12, 101);
//!
//! assert_eq!(catalog.len(), 1);
//! assert_eq!(catalog.lookup("a.txt").unwrap().size, 12);
//! ```

use crate::types::ContentRecord;
use std::fmt;

/// Number of buckets in every catalog
pub const BUCKET_COUNT: usize = 4096;

const HASH_SEED: u64 = 5381;

/// Bucket index for a path: djb2 (`h * 33 + byte`) folded onto the bucket count
pub fn bucket_for(path: &str) -> usize {
    let hash = path
        .bytes()
        .fold(HASH_SEED, |h, b| h.wrapping_shl(5).wrapping_add(h).wrapping_add(u64::from(b)));
    (hash % BUCKET_COUNT as u64) as usize
}

/// In-memory path → record index for one snapshot
///
/// A catalog owns every record it holds. Each path appears at most once:
/// [`upsert`](Self::upsert) replaces an existing record in its original chain
/// position instead of appending a second node.
pub struct ContentCatalog {
    buckets: Box<[Vec<ContentRecord>]>,
    len: usize,
}

impl ContentCatalog {
    /// Create an empty catalog with all buckets empty
    pub fn new() -> Self {
        Self {
            buckets: (0..BUCKET_COUNT).map(|_| Vec::new()).collect(),
            len: 0,
        }
    }

    /// Insert or replace the record for `path`
    ///
    /// Returns the record that was replaced, if any.
    pub fn upsert(
        &mut self,
        path: impl Into<String>,
        content_hash: impl Into<String>,
        size: u64,
        mtime: i64,
    ) -> Option<ContentRecord> {
        self.insert_record(ContentRecord::new(path, content_hash, size, mtime))
    }

    /// Insert or replace a prebuilt record
    pub fn insert_record(&mut self, record: ContentRecord) -> Option<ContentRecord> {
        let chain = &mut self.buckets[bucket_for(&record.path)];
        match chain.iter_mut().find(|existing| existing.path == record.path) {
            Some(slot) => Some(std::mem::replace(slot, record)),
            None => {
                chain.push(record);
                self.len += 1;
                None
            }
        }
    }

    /// Find the record for `path`
    pub fn lookup(&self, path: &str) -> Option<&ContentRecord> {
        self.buckets[bucket_for(path)]
            .iter()
            .find(|record| record.path == path)
    }

    /// Whether a record exists for `path`
    pub fn contains(&self, path: &str) -> bool {
        self.lookup(path).is_some()
    }

    /// Visit every record exactly once in bucket-then-chain order
    pub fn for_each<F>(&self, mut visit: F)
    where
        F: FnMut(&ContentRecord),
    {
        for record in self.iter() {
            visit(record);
        }
    }

    /// Iterate records in bucket-then-chain order
    pub fn iter(&self) -> impl Iterator<Item = &ContentRecord> + '_ {
        self.buckets.iter().flat_map(|chain| chain.iter())
    }

    /// Records chained in bucket `index`, in chain order
    ///
    /// Out-of-range indices yield an empty slice.
    pub fn bucket(&self, index: usize) -> &[ContentRecord] {
        self.buckets.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Drop every record; the catalog stays usable
    pub fn clear(&mut self) {
        for chain in self.buckets.iter_mut() {
            chain.clear();
            chain.shrink_to_fit();
        }
        self.len = 0;
    }

    /// Number of distinct paths
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the catalog holds no records
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bucket a path hashes to
    pub fn bucket_index(&self, path: &str) -> usize {
        bucket_for(path)
    }

    /// Length of the longest chain
    pub fn max_chain_len(&self) -> usize {
        self.buckets.iter().map(Vec::len).max().unwrap_or(0)
    }
}

impl Default for ContentCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ContentCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentCatalog")
            .field("len", &self.len)
            .field("max_chain_len", &self.max_chain_len())
            .finish()
    }
}

impl Extend<ContentRecord> for ContentCatalog {
    fn extend<I: IntoIterator<Item = ContentRecord>>(&mut self, iter: I) {
        for record in iter {
            self.insert_record(record);
        }
    }
}

impl FromIterator<ContentRecord> for ContentCatalog {
    fn from_iter<I: IntoIterator<Item = ContentRecord>>(iter: I) -> Self {
        let mut catalog = Self::new();
        catalog.extend(iter);
        catalog
    }
}

impl<'a> IntoIterator for &'a ContentCatalog {
    type Item = &'a ContentRecord;
    type IntoIter = Box<dyn Iterator<Item = &'a ContentRecord> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}
