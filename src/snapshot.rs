//! Snapshot encoding and decoding
//!
//! A snapshot is the durable form of a [`ContentCatalog`]: a JSON object whose
//! keys are file paths and whose values are `{"hash", "size", "mtime"}`
//! objects.
//!
//! ```text
//! {
//!   "/media/usb/notes.txt": {
//!     "hash": "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08",
//!     "size": 4,
//!     "mtime": 1700000000
//!   }
//! }
//! ```
//!
//! ## Decoding
//!
//! Two decoders read the same format:
//!
//! - **Bulk** ([`decode_bulk`]) reads the whole input, up to
//!   [`CodecOptions::bulk_ceiling`] bytes, and parses it as one document. A
//!   parse failure leaves the catalog untouched.
//! - **Streaming** ([`StreamDecoder`], [`decode_streaming`]) reads fixed-size
//!   chunks, uses a [`FragmentScanner`] to cut complete top-level values out of
//!   a compacting buffer, parses each one on its own and merges object
//!   fragments into one document, with later keys overwriting earlier ones.
//!   Broken fragments and a truncated tail are logged and skipped, so a
//!   partially written snapshot still yields every complete fragment.
//!
//! Both decoders only upsert entries with a string `hash` and numeric `size`
//! and `mtime`. Any other entry is skipped.
//!
//! ## Example
//!
//! ```rust
//! use usbdiff::catalog::ContentCatalog;
//! use usbdiff::snapshot::{self, CodecOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut catalog = ContentCatalog::new();
//! catalog.upsert("a.txt", "ab".repeat(32), 3, 1_700_000_000);
//!
//! let mut bytes = Vec::new();
//! snapshot::write_snapshot(&catalog, &mut bytes)?;
//!
//! let mut restored = ContentCatalog::new();
//! snapshot::decode_streaming(bytes.as_slice(), &mut restored, &CodecOptions::default())?;
//! assert_eq!(restored.lookup("a.txt"), catalog.lookup("a.txt"));
//! # Ok(())
//! # }
//! ```

use crate::catalog::ContentCatalog;
use crate::error::{Result, UsbdiffError};
use crate::fragment::{FragmentScanner, Scan};
use crate::types::{DecodeMode, DecodeStats};
use serde_json::{json, Map, Value};
use std::fs::File;
use std::io::{self, BufWriter, ErrorKind, Read, Write};
use std::path::Path;
use tracing::{debug, info, trace, warn};

/// Bytes read from the input per streaming step
pub const CHUNK_SIZE: usize = 4 * 1024;

/// Starting capacity of the streaming buffer
pub const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Largest input the bulk decoder accepts
pub const BULK_READ_CEILING: usize = 1 << 20;

/// Tunables for snapshot decoding
#[derive(Debug, Clone)]
pub struct CodecOptions {
    /// Maximum number of bytes the bulk decoder reads
    pub bulk_ceiling: usize,
    /// Bytes requested from the reader per streaming step
    pub chunk_size: usize,
    /// Initial streaming buffer capacity
    pub initial_capacity: usize,
    /// Optional ceiling on unparsed bytes held by the streaming decoder
    pub max_buffer_bytes: Option<usize>,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            bulk_ceiling: BULK_READ_CEILING,
            chunk_size: CHUNK_SIZE,
            initial_capacity: INITIAL_BUFFER_CAPACITY,
            max_buffer_bytes: None,
        }
    }
}

/// Build the snapshot document for a catalog
///
/// Keys are visited in catalog iteration order.
pub fn encode(catalog: &ContentCatalog) -> Value {
    let mut files = Map::new();
    catalog.for_each(|record| {
        files.insert(
            record.path.clone(),
            json!({
                "hash": record.content_hash,
                "size": record.size,
                "mtime": record.mtime,
            }),
        );
    });
    Value::Object(files)
}

/// Write a catalog as pretty-printed JSON followed by a newline
pub fn write_snapshot<W: Write>(catalog: &ContentCatalog, mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, &encode(catalog))?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Write a catalog to `path`, replacing any existing file
///
/// The file is truncated and rewritten in place. A failure part-way through
/// can leave a truncated snapshot behind; the streaming decoder recovers the
/// complete part of such a file.
pub fn save_snapshot(catalog: &ContentCatalog, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    write_snapshot(catalog, BufWriter::new(file))?;
    debug!("Wrote {} records to {:?}", catalog.len(), path);
    Ok(())
}

/// Decode a whole document in one pass
///
/// Reads at most `options.bulk_ceiling` bytes. Larger input fails with
/// [`UsbdiffError::SnapshotTooLarge`]. A document that does not parse, or is
/// not an object, is logged and leaves `catalog` unchanged.
pub fn decode_bulk<R: Read>(
    reader: R,
    catalog: &mut ContentCatalog,
    options: &CodecOptions,
) -> Result<DecodeStats> {
    let mut stats = DecodeStats::default();
    let mut buf = Vec::new();
    reader
        .take(options.bulk_ceiling as u64 + 1)
        .read_to_end(&mut buf)?;

    if buf.len() > options.bulk_ceiling {
        return Err(UsbdiffError::SnapshotTooLarge {
            size: buf.len() as u64,
            limit: options.bulk_ceiling as u64,
        });
    }
    if buf.is_empty() {
        warn!("Snapshot is empty, nothing to load");
        return Ok(stats);
    }

    match serde_json::from_slice::<Value>(&buf) {
        Ok(Value::Object(document)) => {
            stats.fragments = 1;
            populate_catalog(&document, catalog, &mut stats);
        }
        Ok(_) => {
            warn!("Snapshot top level is not an object, ignoring it");
            stats.failed_fragments = 1;
        }
        Err(e) => {
            warn!("Failed to parse snapshot: {}", e);
            stats.failed_fragments = 1;
        }
    }

    Ok(stats)
}

/// Incremental decoder that merges complete JSON fragments as bytes arrive
///
/// Feed input with [`feed`](Self::feed) in pieces of any size, then call
/// [`finish`](Self::finish) to get the merged document. Consumed bytes are
/// dropped from the buffer after every feed, so the buffer only ever holds
/// the unparsed remainder.
#[derive(Debug)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
    scanner: FragmentScanner,
    document: Map<String, Value>,
    stats: DecodeStats,
    max_buffer: Option<usize>,
}

impl StreamDecoder {
    /// Create a decoder with the given buffer settings
    pub fn new(options: &CodecOptions) -> Self {
        Self {
            buffer: Vec::with_capacity(options.initial_capacity.max(1)),
            scanner: FragmentScanner::new(),
            document: Map::new(),
            stats: DecodeStats::default(),
            max_buffer: options.max_buffer_bytes,
        }
    }

    /// Append a chunk and merge every fragment it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.reserve_for(chunk.len())?;
        self.buffer.extend_from_slice(chunk);
        self.drain_fragments();
        self.compact();
        Ok(())
    }

    /// Finish decoding and return the merged document
    pub fn finish(mut self) -> (Map<String, Value>, DecodeStats) {
        self.drain_fragments();
        if self.scanner.is_mid_value() || self.scanner.pending_junk() > 0 {
            warn!(
                "Incomplete JSON data at end of snapshot ({} bytes ignored)",
                self.buffer.len() - self.buffer.len().min(self.scanner.consumed())
                    + self.scanner.pending_junk()
            );
            self.stats.trailing_garbage = true;
        }
        (self.document, self.stats)
    }

    /// Bytes currently held but not yet consumed
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Current buffer allocation
    pub fn buffer_capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Merged document so far
    pub fn document(&self) -> &Map<String, Value> {
        &self.document
    }

    fn reserve_for(&mut self, additional: usize) -> Result<()> {
        let needed = self.buffer.len() + additional;
        if let Some(limit) = self.max_buffer {
            if needed > limit {
                return Err(UsbdiffError::SnapshotTooLarge {
                    size: needed as u64,
                    limit: limit as u64,
                });
            }
        }

        let capacity = self.buffer.capacity();
        if needed > capacity {
            let mut new_capacity = capacity.max(1) * 2;
            while new_capacity < needed {
                new_capacity *= 2;
            }
            trace!("Growing snapshot buffer {} -> {} bytes", capacity, new_capacity);
            self.buffer.reserve_exact(new_capacity - self.buffer.len());
        }
        Ok(())
    }

    fn drain_fragments(&mut self) {
        while let Some(event) = self.scanner.next_event(&self.buffer) {
            match event {
                Scan::Fragment(range) => {
                    merge_fragment(&self.buffer[range], &mut self.document, &mut self.stats);
                }
                Scan::Malformed(range) => {
                    warn!("Skipping malformed snapshot fragment ({} bytes)", range.len());
                    self.stats.failed_fragments += 1;
                }
                Scan::Junk(len) => {
                    warn!("Skipping {} stray bytes between snapshot fragments", len);
                }
            }
        }
    }

    fn compact(&mut self) {
        let consumed = self.scanner.consumed();
        if consumed > 0 {
            self.buffer.drain(..consumed);
            self.scanner.rebase(consumed);
        }
    }
}

fn merge_fragment(bytes: &[u8], document: &mut Map<String, Value>, stats: &mut DecodeStats) {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(fragment)) => {
            stats.fragments += 1;
            trace!("Merging fragment with {} keys", fragment.len());
            for (key, value) in fragment {
                document.insert(key, value);
            }
        }
        Ok(_) => {
            stats.fragments += 1;
            debug!("Ignoring non-object snapshot fragment");
        }
        Err(e) => {
            warn!("Failed to parse snapshot fragment: {}", e);
            stats.failed_fragments += 1;
        }
    }
}

/// Decode from a reader in fixed-size chunks
///
/// The catalog is only touched after the whole input has been consumed, so a
/// buffer-limit error leaves it unchanged.
pub fn decode_streaming<R: Read>(
    mut reader: R,
    catalog: &mut ContentCatalog,
    options: &CodecOptions,
) -> Result<DecodeStats> {
    let mut decoder = StreamDecoder::new(options);
    let mut chunk = vec![0u8; options.chunk_size.max(1)];

    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        decoder.feed(&chunk[..n])?;
    }

    let (document, mut stats) = decoder.finish();
    populate_catalog(&document, catalog, &mut stats);
    Ok(stats)
}

/// Load the previous catalog from `path`
///
/// Never fails. A missing file means first run and yields an empty catalog.
/// Any other problem is logged as a warning and yields whatever was decoded
/// before it happened.
pub fn load_snapshot(path: &Path, mode: DecodeMode, options: &CodecOptions) -> (ContentCatalog, DecodeStats) {
    let mut catalog = ContentCatalog::new();

    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("No snapshot at {:?}, starting from an empty catalog", path);
            return (catalog, DecodeStats::default());
        }
        Err(e) => {
            warn!("Failed to open snapshot {:?}: {}", path, e);
            return (catalog, DecodeStats::default());
        }
    };

    let result = match mode {
        DecodeMode::Bulk => decode_bulk(file, &mut catalog, options),
        DecodeMode::Streaming => decode_streaming(file, &mut catalog, options),
    };

    match result {
        Ok(stats) => {
            debug!(
                "Loaded {} records from {:?} ({} fragments, {} failed)",
                stats.records, path, stats.fragments, stats.failed_fragments
            );
            (catalog, stats)
        }
        Err(e) => {
            warn!("Failed to load snapshot {:?}: {}", path, e.user_message());
            (catalog, DecodeStats::default())
        }
    }
}

/// Upsert every well-formed entry of a decoded document
fn populate_catalog(document: &Map<String, Value>, catalog: &mut ContentCatalog, stats: &mut DecodeStats) {
    for (path, value) in document {
        let entry = value.as_object().and_then(|obj| {
            let hash = obj.get("hash")?.as_str()?;
            let size = json_to_u64(obj.get("size")?)?;
            let mtime = json_to_i64(obj.get("mtime")?)?;
            Some((hash, size, mtime))
        });

        match entry {
            Some((hash, size, mtime)) => {
                catalog.upsert(path.as_str(), hash, size, mtime);
                stats.records += 1;
            }
            None => {
                trace!("Skipping malformed snapshot entry for {:?}", path);
                stats.skipped_entries += 1;
            }
        }
    }
}

fn json_to_u64(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0)
            .map(|f| f as u64)
    })
}

fn json_to_i64(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
}
