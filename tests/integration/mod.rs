//! End-to-end tests for usbdiff
//!
//! Each test drives a real directory through one or more sessions and checks
//! the reported changes, the snapshot on disk and replication output.

use ::usbdiff::snapshot::{self, CodecOptions};
use ::usbdiff::*;
use filetime::{set_file_mtime, FileTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A directory under test plus a snapshot stored outside it
pub struct UsbdiffTestHarness {
    pub root_dir: TempDir,
    pub state_dir: TempDir,
    pub file_generator: FileGenerator,
}

impl UsbdiffTestHarness {
    /// Create a new harness with an empty root
    pub fn new() -> Self {
        Self {
            root_dir: TempDir::new().unwrap(),
            state_dir: TempDir::new().unwrap(),
            file_generator: FileGenerator::new(42),
        }
    }

    pub fn root(&self) -> &Path {
        self.root_dir.path()
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.state_dir.path().join("usbdiff.json")
    }

    /// Builder preconfigured for this harness
    pub fn builder(&self) -> SessionBuilder {
        SessionBuilder::new(self.root())
            .snapshot_path(self.snapshot_path())
            .parallel_workers(4)
    }

    pub fn run(&self) -> RunReport {
        self.builder().build().unwrap().run().unwrap()
    }

    /// Write a file relative to the root, creating parent directories
    pub fn write(&self, relative: &str, content: &[u8]) -> PathBuf {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    /// Key the walker will produce for a relative path
    pub fn key(&self, relative: &str) -> String {
        self.root().join(relative).to_string_lossy().into_owned()
    }

    /// Populate a tree of `dirs` directories with `files_per_dir` files each
    pub fn generate_tree(&mut self, dirs: usize, files_per_dir: usize) -> Vec<String> {
        let mut created = Vec::new();
        for d in 0..dirs {
            for f in 0..files_per_dir {
                let relative = format!("dir_{d}/file_{f}.bin");
                let content = self.file_generator.generate_file_content(16..512);
                self.write(&relative, &content);
                created.push(relative);
            }
        }
        created
    }
}

/// Deterministic file content generator
pub struct FileGenerator {
    pub rng: StdRng,
}

impl FileGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn generate_file_content(&mut self, size_range: std::ops::Range<usize>) -> Vec<u8> {
        let size = self.rng.random_range(size_range);
        (0..size).map(|_| self.rng.random()).collect()
    }
}

fn changed_paths(report: &RunReport, status: DiffStatus) -> BTreeSet<String> {
    report
        .diffs
        .iter()
        .flatten()
        .filter(|d| d.status == status)
        .map(|d| d.path.clone())
        .collect()
}

#[test]
fn test_second_run_is_quiet() {
    let mut harness = UsbdiffTestHarness::new();
    let files = harness.generate_tree(5, 10);

    let first = harness.run();
    assert_eq!(first.summary().modified, files.len());
    assert!(first.persisted);

    let second = harness.run();
    assert!(second.diffs.is_none());
    assert_eq!(second.hashing.reused, files.len());
    assert_eq!(second.hashing.hashed, 0);
    assert!(!second.persisted);
}

#[test]
fn test_detects_modify_create_delete() {
    let mut harness = UsbdiffTestHarness::new();
    harness.generate_tree(3, 5);
    harness.run();

    let modified = harness.write("dir_0/file_0.bin", b"rewritten with new content");
    set_file_mtime(&modified, FileTime::from_unix_time(1_000_000, 0)).unwrap();
    harness.write("dir_9/brand_new.txt", b"hello");
    fs::remove_file(harness.root().join("dir_2/file_4.bin")).unwrap();

    let report = harness.run();
    assert_eq!(
        changed_paths(&report, DiffStatus::Modified),
        BTreeSet::from([harness.key("dir_0/file_0.bin"), harness.key("dir_9/brand_new.txt")])
    );
    assert_eq!(
        changed_paths(&report, DiffStatus::Deleted),
        BTreeSet::from([harness.key("dir_2/file_4.bin")])
    );

    // Output follows the bucket order of the changed paths
    let buckets: Vec<usize> = report
        .diffs
        .unwrap()
        .iter()
        .map(|d| ::usbdiff::catalog::bucket_for(&d.path))
        .collect();
    assert!(buckets.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_touch_without_content_change_is_not_reported() {
    let harness = UsbdiffTestHarness::new();
    let path = harness.write("doc.txt", b"stable");
    harness.run();

    set_file_mtime(&path, FileTime::from_unix_time(1_234_567_890, 0)).unwrap();
    let report = harness.run();
    assert!(report.diffs.is_none());
    assert_eq!(report.hashing.hashed, 1);
    assert!(report.persisted);

    // The new mtime was written back, so the file is reused from now on
    for _ in 0..2 {
        let settled = harness.run();
        assert!(settled.diffs.is_none());
        assert_eq!(settled.hashing.reused, 1);
        assert_eq!(settled.hashing.hashed, 0);
        assert!(!settled.persisted);
    }
}

#[test]
fn test_same_size_same_mtime_rewrite_needs_rehash() {
    let harness = UsbdiffTestHarness::new();
    let pinned = FileTime::from_unix_time(1_700_000_000, 0);
    let path = harness.write("data.bin", b"AAAA");
    set_file_mtime(&path, pinned).unwrap();
    harness.run();

    // Same length, mtime restored: the reuse heuristic cannot see this
    fs::write(&path, b"BBBB").unwrap();
    set_file_mtime(&path, pinned).unwrap();

    let dry = harness.builder().dry_run(true).build().unwrap().run().unwrap();
    assert!(dry.diffs.is_none());
    assert_eq!(dry.hashing.reused, 1);

    let forced = harness.builder().force_rehash(true).build().unwrap().run().unwrap();
    assert_eq!(
        forced.diffs.unwrap(),
        vec![DiffRecord::modified(harness.key("data.bin"))]
    );
}

#[test]
fn test_truncated_multi_fragment_snapshot_is_salvaged() {
    let mut harness = UsbdiffTestHarness::new();
    let files = harness.generate_tree(2, 10);
    harness.run();

    let (full, _) = snapshot::load_snapshot(
        &harness.snapshot_path(),
        DecodeMode::Streaming,
        &CodecOptions::default(),
    );
    assert_eq!(full.len(), files.len());

    // Rewrite the snapshot as one fragment per record, then lose the tail
    let records: Vec<ContentRecord> = full.iter().cloned().collect();
    let mut bytes = Vec::new();
    for record in &records {
        let single: ContentCatalog = std::iter::once(record.clone()).collect();
        snapshot::write_snapshot(&single, &mut bytes).unwrap();
    }
    bytes.truncate(bytes.len() - 10);
    fs::write(harness.snapshot_path(), &bytes).unwrap();

    let lost = records.last().unwrap().path.clone();
    let report = harness.run();
    assert_eq!(report.previous_records, files.len() - 1);
    assert_eq!(report.diffs.unwrap(), vec![DiffRecord::modified(lost)]);

    // The bulk decoder cannot parse the same file at all
    let mut bulk = ContentCatalog::new();
    snapshot::decode_bulk(bytes.as_slice(), &mut bulk, &CodecOptions::default()).unwrap();
    assert!(bulk.is_empty());
}

#[test]
fn test_bulk_and_streaming_agree() {
    let mut harness = UsbdiffTestHarness::new();
    harness.generate_tree(4, 25);
    harness.run();
    fs::remove_file(harness.root().join("dir_1/file_3.bin")).unwrap();

    let streaming = harness.builder().dry_run(true).build().unwrap().run().unwrap();
    let bulk = harness
        .builder()
        .dry_run(true)
        .decode_mode(DecodeMode::Bulk)
        .build()
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(streaming.diffs, bulk.diffs);
    assert_eq!(streaming.previous_records, bulk.previous_records);
}

#[test]
fn test_oversized_snapshot_under_bulk_falls_back_to_empty() {
    let mut harness = UsbdiffTestHarness::new();
    let files = harness.generate_tree(2, 20);
    harness.run();

    let report = harness
        .builder()
        .decode_mode(DecodeMode::Bulk)
        .codec_options(CodecOptions {
            bulk_ceiling: 256,
            ..CodecOptions::default()
        })
        .dry_run(true)
        .build()
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(report.previous_records, 0);
    assert_eq!(report.summary().modified, files.len());
}

#[test]
fn test_diff_cap_through_session() {
    let mut harness = UsbdiffTestHarness::new();
    harness.generate_tree(1, 20);

    let report = harness.builder().max_diffs(5).build().unwrap().run().unwrap();
    assert_eq!(report.diffs.unwrap().len(), 5);
    // The snapshot still holds every file
    assert_eq!(report.current_records, 20);
}

#[test]
fn test_replication_mirrors_changes() {
    let harness = UsbdiffTestHarness::new();
    let mirror = harness.state_dir.path().join("mirror");
    harness.write("a/one.txt", b"one");
    harness.write("b/c/two.txt", b"two");

    let session = harness.builder().replicate_to(&mirror).build().unwrap();
    let first = session.run().unwrap();
    let replication = first.replication.unwrap();
    assert_eq!(replication.files_copied, 2);
    assert_eq!(replication.bytes_copied, 6);
    assert_eq!(fs::read(mirror.join("b/c/two.txt")).unwrap(), b"two");

    let path = harness.write("a/one.txt", b"uno!");
    set_file_mtime(&path, FileTime::from_unix_time(42, 0)).unwrap();
    let second = session.run().unwrap();
    assert_eq!(second.replication.unwrap().files_copied, 1);
    assert_eq!(fs::read(mirror.join("a/one.txt")).unwrap(), b"uno!");
}

#[test]
fn test_random_mutations_are_all_reported() {
    let mut harness = UsbdiffTestHarness::new();
    let files = harness.generate_tree(6, 12);
    harness.run();

    let mut expect_modified = BTreeSet::new();
    let mut expect_deleted = BTreeSet::new();
    let mut rng = StdRng::seed_from_u64(7);

    for (i, relative) in files.iter().enumerate() {
        match rng.random_range(0..4) {
            0 => {
                let mut content = harness.file_generator.generate_file_content(16..512);
                content.push(0xff); // never equal to the old content by accident
                content.extend_from_slice(relative.as_bytes());
                let path = harness.write(relative, &content);
                set_file_mtime(&path, FileTime::from_unix_time(2_000_000 + i as i64, 0)).unwrap();
                expect_modified.insert(harness.key(relative));
            }
            1 => {
                fs::remove_file(harness.root().join(relative)).unwrap();
                expect_deleted.insert(harness.key(relative));
            }
            _ => {}
        }
    }
    for n in 0..5 {
        let relative = format!("fresh/new_{n}.dat");
        harness.write(&relative, format!("new file {n}").as_bytes());
        expect_modified.insert(harness.key(&relative));
    }

    let report = harness.run();
    assert_eq!(changed_paths(&report, DiffStatus::Modified), expect_modified);
    assert_eq!(changed_paths(&report, DiffStatus::Deleted), expect_deleted);

    // And the state is stable again afterwards
    assert!(harness.run().diffs.is_none());
}

#[test]
fn test_snapshot_file_format() {
    let harness = UsbdiffTestHarness::new();
    harness.write("x.txt", b"abc");
    harness.run();

    let text = fs::read_to_string(harness.snapshot_path()).unwrap();
    assert!(text.ends_with('\n'));
    let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
    let entry = &doc[harness.key("x.txt")];
    assert_eq!(
        entry["hash"],
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
    assert_eq!(entry["size"], 3);
    assert!(entry["mtime"].is_i64());
}

#[test]
fn test_large_catalog_round_trip() {
    let mut catalog = ContentCatalog::new();
    for i in 0..10_000u64 {
        catalog.upsert(format!("/media/usb/d{}/f{}.jpg", i % 97, i), format!("{:064x}", i), i, i as i64);
    }
    let mut bytes = Vec::new();
    snapshot::write_snapshot(&catalog, &mut bytes).unwrap();

    let mut restored = ContentCatalog::new();
    let stats = snapshot::decode_streaming(bytes.as_slice(), &mut restored, &CodecOptions::default()).unwrap();
    assert_eq!(stats.records, 10_000);
    assert!(diff_catalogs(&catalog, &restored, &DiffPolicy::default()).is_none());
}
