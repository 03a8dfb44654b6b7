//! zipstream is a ZIP archive reader for seekable byte sources.
//!
//! It reads a single-disk archive through anything implementing
//! `std::io::Read + Seek` (a file, a cursor over memory, a device),
//! listing entries and decompressing them into caller-supplied buffers.
//! All scratch space is bounded and owned per session, so the whole
//! archive is never resident in memory.
//!
//! ```no_run
//! # use std::fs::File;
//! # use zipstream::ZipArchive;
//! let mut archive = ZipArchive::new(File::open("foo.zip")?)?;
//!
//! // Walk the central directory. The visitor returns `true` to keep going;
//! // returning `false` stops the walk without touching later entries.
//! archive.for_each_entry(|index, header, name| {
//!     println!("{index}: {name} ({} bytes)", header.uncompressed_size);
//!     true
//! })?;
//!
//! // Extract one entry into memory.
//! if let Some(header) = archive.find_entry("hello/hi.txt")? {
//!     let contents = archive.read_file_to_vec(&header)?;
//!     assert_eq!(header.uncompressed_size as usize, contents.len());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! A ZIP archive is read back to front: a trailer (the end of central
//! directory record) locates the central directory, the directory lists
//! every entry's metadata and the offset of its local file header, and
//! the local header immediately precedes the entry's compressed bytes.
//! The [`read`] module exposes each of those stages separately for
//! callers that manage their own buffers, and [`inflate`] holds the
//! chunked decompressor that turns the compressed bytes into output.
//!
//! Known limitations, inherent to the format and deliberately not
//! papered over:
//!
//! - The end record is found by scanning backward for its signature.
//!   An archive comment that embeds those bytes at a probed offset can
//!   defeat the scan, as can a comment whose length isn't a multiple
//!   of four.
//! - General-purpose flag bit 3 ("a data descriptor follows the entry")
//!   is ignored; such entries may carry unreliable sizes.
//! - Multi-disk archives, Zip64, encrypted entries, and compression
//!   methods other than Store and Deflate are unsupported and reported
//!   as errors.

pub mod inflate;
pub mod read;
pub mod result;
pub mod spec;

pub use read::{CompressionMethod, FileHeader, ReaderOptions, ZipArchive};
pub use result::{CapacityError, FormatError, ZipError, ZipResult};

mod arch;
