//! Property-based testing for usbdiff
//!
//! Uses proptest to check the catalog against a map model, the streaming
//! decoder against arbitrary chunk boundaries, and the diff engine against
//! a straightforward set computation.

use ::usbdiff::snapshot::{self, CodecOptions, StreamDecoder};
use ::usbdiff::*;
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Paths full of characters that matter to the fragment scanner
fn tricky_path_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z/._-]{1,24}",
        "[a-z{}\\[\\]\"\\\\ ]{1,16}",
        "[\\PC]{1,12}",
    ]
}

/// Entry value: (hash seed, size, mtime)
fn entry_strategy() -> impl Strategy<Value = (u64, u64, i64)> {
    (any::<u64>(), 0u64..u64::MAX / 2, any::<i32>().prop_map(i64::from))
}

fn catalog_strategy(max: usize) -> impl Strategy<Value = BTreeMap<String, (u64, u64, i64)>> {
    prop::collection::btree_map(tricky_path_strategy(), entry_strategy(), 0..max)
}

fn build_catalog(model: &BTreeMap<String, (u64, u64, i64)>) -> ContentCatalog {
    model
        .iter()
        .map(|(path, &(seed, size, mtime))| ContentRecord::new(path.as_str(), format!("{:064x}", seed), size, mtime))
        .collect()
}

fn tuples(catalog: &ContentCatalog) -> BTreeSet<(String, String, u64, i64)> {
    catalog
        .iter()
        .map(|r| (r.path.clone(), r.content_hash.clone(), r.size, r.mtime))
        .collect()
}

/// Encode `catalog` as several concatenated fragments
fn encode_fragments(catalog: &ContentCatalog, per_fragment: usize) -> Vec<u8> {
    let records: Vec<ContentRecord> = catalog.iter().cloned().collect();
    let mut bytes = Vec::new();
    for group in records.chunks(per_fragment.max(1)) {
        let part: ContentCatalog = group.iter().cloned().collect();
        snapshot::write_snapshot(&part, &mut bytes).unwrap();
    }
    bytes
}

/// Feed `bytes` to a fresh decoder split at the given chunk lengths
fn feed_in_chunks(bytes: &[u8], lengths: &[usize]) -> serde_json::Map<String, serde_json::Value> {
    let mut decoder = StreamDecoder::new(&CodecOptions::default());
    let mut offset = 0;
    let mut i = 0;
    while offset < bytes.len() {
        let len = lengths.get(i % lengths.len().max(1)).copied().unwrap_or(7).max(1);
        let end = (offset + len).min(bytes.len());
        decoder.feed(&bytes[offset..end]).unwrap();
        offset = end;
        i += 1;
    }
    decoder.finish().0
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Splitting input anywhere never changes what the streaming decoder sees
    #[test]
    fn chunk_boundaries_do_not_matter(
        model in catalog_strategy(40),
        per_fragment in 1usize..8,
        lengths in prop::collection::vec(1usize..64, 1..16),
    ) {
        let catalog = build_catalog(&model);
        let bytes = encode_fragments(&catalog, per_fragment);

        let whole = feed_in_chunks(&bytes, &[bytes.len().max(1)]);
        let split = feed_in_chunks(&bytes, &lengths);
        let single_bytes = feed_in_chunks(&bytes, &[1]);

        prop_assert_eq!(&whole, &split);
        prop_assert_eq!(&whole, &single_bytes);
        prop_assert_eq!(whole.len(), model.len());

        // A single fragment must match a one-shot parse of the whole input
        if !model.is_empty() && per_fragment >= model.len() {
            let parsed: serde_json::Map<String, serde_json::Value> =
                serde_json::from_slice(&bytes).unwrap();
            prop_assert_eq!(&split, &parsed);
        }
    }

    /// Both decoders restore exactly what was encoded
    #[test]
    fn snapshot_round_trip(model in catalog_strategy(300)) {
        let catalog = build_catalog(&model);
        let mut bytes = Vec::new();
        snapshot::write_snapshot(&catalog, &mut bytes).unwrap();

        let mut bulk = ContentCatalog::new();
        snapshot::decode_bulk(bytes.as_slice(), &mut bulk, &CodecOptions::default()).unwrap();
        let mut streamed = ContentCatalog::new();
        snapshot::decode_streaming(bytes.as_slice(), &mut streamed, &CodecOptions::default()).unwrap();

        prop_assert_eq!(tuples(&bulk), tuples(&catalog));
        prop_assert_eq!(tuples(&streamed), tuples(&catalog));
    }

    /// Later fragments win when the same key appears twice
    #[test]
    fn later_fragment_overrides_earlier(
        model in catalog_strategy(30),
        overrides in catalog_strategy(30),
    ) {
        let mut bytes = Vec::new();
        snapshot::write_snapshot(&build_catalog(&model), &mut bytes).unwrap();
        snapshot::write_snapshot(&build_catalog(&overrides), &mut bytes).unwrap();

        let mut decoded = ContentCatalog::new();
        snapshot::decode_streaming(bytes.as_slice(), &mut decoded, &CodecOptions::default()).unwrap();

        let mut expected = model.clone();
        expected.extend(overrides.clone());
        prop_assert_eq!(tuples(&decoded), tuples(&build_catalog(&expected)));
    }

    /// The catalog behaves like a map under any upsert sequence
    #[test]
    fn catalog_matches_map_model(
        ops in prop::collection::vec(("[a-d]{1,3}", any::<u64>()), 0..200)
    ) {
        let mut catalog = ContentCatalog::new();
        let mut model = BTreeMap::new();
        for (path, seed) in &ops {
            catalog.upsert(path.as_str(), format!("{:064x}", seed), *seed, 0);
            model.insert(path.clone(), *seed);
        }

        prop_assert_eq!(catalog.len(), model.len());
        prop_assert_eq!(catalog.iter().count(), model.len());
        for (path, seed) in &model {
            prop_assert_eq!(catalog.lookup(path).map(|r| r.size), Some(*seed));
        }
    }

    /// Diff output equals the set difference computed directly
    #[test]
    fn diff_matches_set_model(
        previous in prop::collection::btree_map("[a-f]{1,2}", 0u8..4, 0..30),
        current in prop::collection::btree_map("[a-f]{1,2}", 0u8..4, 0..30),
    ) {
        let catalog = |m: &BTreeMap<String, u8>| -> ContentCatalog {
            m.iter()
                .map(|(p, h)| ContentRecord::new(p.as_str(), format!("{:02x}", h).repeat(32), 1, 1))
                .collect()
        };
        let diffs = diff_catalogs(&catalog(&previous), &catalog(&current), &DiffPolicy::default());

        let mut expect_modified = BTreeSet::new();
        let mut expect_deleted = BTreeSet::new();
        for (path, hash) in &previous {
            match current.get(path) {
                None => { expect_deleted.insert(path.clone()); }
                Some(h) if h != hash => { expect_modified.insert(path.clone()); }
                Some(_) => {}
            }
        }
        for path in current.keys() {
            if !previous.contains_key(path) {
                expect_modified.insert(path.clone());
            }
        }

        match diffs {
            None => prop_assert!(expect_modified.is_empty() && expect_deleted.is_empty()),
            Some(records) => {
                let modified: BTreeSet<String> = records.iter()
                    .filter(|d| d.status == DiffStatus::Modified)
                    .map(|d| d.path.clone())
                    .collect();
                let deleted: BTreeSet<String> = records.iter()
                    .filter(|d| d.status == DiffStatus::Deleted)
                    .map(|d| d.path.clone())
                    .collect();
                prop_assert_eq!(records.len(), modified.len() + deleted.len());
                prop_assert_eq!(modified, expect_modified);
                prop_assert_eq!(deleted, expect_deleted);

                // Bucket order, and within a bucket known paths before new ones
                let keys: Vec<(usize, bool)> = records
                    .iter()
                    .map(|d| (::usbdiff::catalog::bucket_for(&d.path), !previous.contains_key(&d.path)))
                    .collect();
                prop_assert!(keys.windows(2).all(|w| w[0] <= w[1]));
            }
        }
    }

    /// The cap keeps a prefix of the uncapped output
    #[test]
    fn capped_diff_is_prefix(
        names in prop::collection::btree_set("[a-z]{1,6}", 1..60),
        cap in 1usize..40,
    ) {
        let current: ContentCatalog = names
            .iter()
            .map(|n| ContentRecord::new(n.as_str(), "ab".repeat(32), 1, 1))
            .collect();
        let empty = ContentCatalog::new();

        let full = diff_catalogs(&empty, &current, &DiffPolicy::default()).unwrap();
        let capped = diff_catalogs(&empty, &current, &DiffPolicy::with_max_diffs(cap)).unwrap();
        prop_assert_eq!(capped.len(), cap.min(full.len()));
        prop_assert_eq!(&full[..capped.len()], &capped[..]);
    }
}
