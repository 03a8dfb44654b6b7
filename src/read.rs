//! Tools for reading a ZIP archive from a seekable byte source.
//!
//! Everything here works against `std::io::Read + Seek` and bounded scratch
//! buffers, so archives much larger than memory can be listed and extracted
//! one entry at a time.
//!
//! For most uses, create a [`ZipArchive`] and go through it; the lower-level
//! stages ([`locate_end_record`], [`read_central_directory`],
//! [`read_local_header`], [`extract`]) are public for callers that manage
//! their own buffers or probe archives speculatively.
//!
//! [`extract`]: crate::inflate::extract

use std::borrow::Cow;
use std::io::{Read, Seek, SeekFrom};

use chrono::NaiveDateTime;
use log::*;

use crate::arch;
use crate::inflate::extract;
use crate::result::*;
use crate::spec::{self, CentralDirectoryRecord, EndOfCentralDirectory, LocalFileHeader};

/// The compression method used to store a file
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CompressionMethod {
    /// The file is stored uncompressed
    Store,
    /// The file is [DEFLATE](https://en.wikipedia.org/wiki/DEFLATE)d,
    /// raw, with no zlib or gzip wrapper.
    /// This is the most common format used by ZIP archives.
    Deflate,
    /// The file is compressed with a yet-unsupported format.
    /// (The u16 indicates the internal format code.)
    Unsupported(u16),
}

/// Normalized per-entry metadata, projected from either a central directory
/// entry or a local file header.
///
/// The record it came from is transient; the file name lives in the scratch
/// buffer it was read into and is handed to callers separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Compression algorithm used to store the file
    pub compression_method: CompressionMethod,

    /// The CRC-32 of the decompressed file
    pub crc32: u32,

    /// Compressed size of the file in bytes
    pub compressed_size: u32,

    /// Uncompressed size of the file in bytes
    pub uncompressed_size: u32,

    /// Length of the entry's file name, in bytes as stored
    pub file_name_length: u16,

    /// Length of the entry's extra field (skipped, not parsed)
    pub extra_field_length: u16,

    /// The date and time the file was last modified
    pub last_modified: NaiveDateTime,

    /// True if the file is encrypted (decryption is unsupported)
    pub encrypted: bool,

    /// Offset of the entry's local file header in the archive.
    ///
    /// Meaningful only when this header came from the central directory;
    /// zero when projected from a local file header (we were just there).
    pub header_offset: u32,
}

/// Scratch buffer sizes for a [`ZipArchive`] session.
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// How many bytes of the archive's tail to search for the
    /// end of central directory record.
    /// An archive comment longer than this hides the record.
    pub end_record_search: usize,

    /// Capacity of the file name buffer.
    /// Entries with longer names fail with
    /// [`CapacityError::FileNameTooLong`].
    pub name_capacity: usize,

    /// Capacity of the compressed-chunk buffer used during extraction.
    pub chunk_capacity: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            end_record_search: 64 * 1024,
            name_capacity: 4 * 1024,
            chunk_capacity: 32 * 1024,
        }
    }
}

/// Finds, parses, and validates the end of central directory record.
///
/// Seeks to the end of the source, reads the last
/// `min(source size, scratch.len())` bytes into `scratch`,
/// and scans backward for the record (see [`spec::find_eocdr`]
/// for the heuristic and its limitations).
///
/// Fails with [`FormatError::NotAZip`] if the source can't hold the record,
/// and [`FormatError::MultiDiskUnsupported`] if the record says the archive
/// continues on other disks.
pub fn locate_end_record<R: Read + Seek>(
    source: &mut R,
    scratch: &mut [u8],
) -> ZipResult<EndOfCentralDirectory> {
    let size = source.seek(SeekFrom::End(0))?;
    if size <= spec::EOCDR_SIZE as u64 {
        return Err(FormatError::NotAZip.into());
    }

    let take = size.min(scratch.len() as u64);
    let window = &mut scratch[..arch::usize(take)?];
    source.seek(SeekFrom::End(-(take as i64)))?;
    source.read_exact(window)?;

    let posit = spec::find_eocdr(window)?;
    let eocdr = EndOfCentralDirectory::parse(&window[posit..])?;
    trace!("{:?}", eocdr);

    if eocdr.spans_disks() {
        return Err(FormatError::MultiDiskUnsupported.into());
    }
    Ok(eocdr)
}

/// Walks the central directory, handing each entry to `visitor`.
///
/// The visitor gets the entry's index, its projected [`FileHeader`]
/// (with `header_offset` pointing at the local file header), and its
/// decoded file name. Returning `false` stops the walk immediately;
/// that's a normal early exit, not an error, and nothing past that
/// entry is read.
///
/// The name is only valid for the duration of the call;
/// it lives in `name_scratch`, which the next entry overwrites.
pub fn read_central_directory<R, V>(
    source: &mut R,
    end_record: &EndOfCentralDirectory,
    name_scratch: &mut [u8],
    mut visitor: V,
) -> ZipResult<()>
where
    R: Read + Seek,
    V: FnMut(usize, &FileHeader, &str) -> bool,
{
    source.seek(SeekFrom::Start(end_record.central_directory_offset.into()))?;

    let mut fixed = [0u8; spec::CENTRAL_DIRECTORY_RECORD_SIZE];
    for i in 0..usize::from(end_record.entries) {
        source.read_exact(&mut fixed)?;
        let record = CentralDirectoryRecord::parse(&fixed, i)?;
        trace!("{:?}", record);

        if record.disk_number != 0 {
            return Err(FormatError::MultiDiskUnsupported.into());
        }

        let name_length = usize::from(record.file_name_length);
        if name_length >= name_scratch.len() {
            return Err(CapacityError::FileNameTooLong(Some(i)).into());
        }
        source.read_exact(&mut name_scratch[..name_length])?;

        // The extra field and comment don't interest us; step over them.
        let to_skip =
            i64::from(record.extra_field_length) + i64::from(record.file_comment_length);
        source.seek(SeekFrom::Current(to_skip))?;

        let name = spec::decode_file_name(&name_scratch[..name_length], record.flags)?;
        let header = FileHeader::from_central(&record);
        debug!("{}: {:?}", name, header);

        if !visitor(i, &header, &name) {
            return Ok(());
        }
    }
    Ok(())
}

/// Parses and validates the local file header at the source's current
/// position, leaving the source positioned at the entry's first
/// compressed byte.
///
/// With `Some(scratch)`, the entry's name is read into `scratch` and
/// returned; with `None` it's skipped by seeking.
///
/// This call is deliberately silent: it logs nothing and returns all
/// failures as values, so callers can probe speculative offsets and
/// decide fatality themselves.
///
/// Known limitation: general-purpose flags aren't validated. In
/// particular, bit 3 ("sizes unknown, data descriptor follows") is
/// ignored; if it's set, the recorded sizes may be unreliable and
/// downstream decompression may misbehave.
pub fn read_local_header<'a, R: Read + Seek>(
    source: &mut R,
    name_scratch: Option<&'a mut [u8]>,
) -> ZipResult<(FileHeader, Option<Cow<'a, str>>)> {
    let mut fixed = [0u8; spec::LOCAL_FILE_HEADER_SIZE];
    source.read_exact(&mut fixed)?;
    let local = LocalFileHeader::parse(&fixed)?;

    let name_length = usize::from(local.file_name_length);
    let name = match name_scratch {
        Some(scratch) => {
            if name_length >= scratch.len() {
                return Err(CapacityError::FileNameTooLong(None).into());
            }
            source.read_exact(&mut scratch[..name_length])?;
            Some(spec::decode_file_name(&scratch[..name_length], local.flags)?)
        }
        None => {
            source.seek(SeekFrom::Current(name_length as i64))?;
            None
        }
    };
    source.seek(SeekFrom::Current(i64::from(local.extra_field_length)))?;

    let header = FileHeader::from_local(&local);
    if header.compression_method == CompressionMethod::Store
        && local.compressed_size != local.uncompressed_size
    {
        return Err(ZipError::SizeMismatch {
            expected: local.uncompressed_size.into(),
            found: local.compressed_size.into(),
        });
    }
    Ok((header, name))
}

/// A ZIP archive read through a seekable byte source.
///
/// Owns the source plus the session's scratch buffers, so independent
/// archives can be driven from independent threads. A single `ZipArchive`
/// serializes its own operations through `&mut self`; the source's cursor
/// and the scratch buffers are never shared across in-flight calls.
pub struct ZipArchive<R> {
    source: R,
    end_record: EndOfCentralDirectory,
    name_scratch: Vec<u8>,
    chunk_scratch: Vec<u8>,
}

impl<R: Read + Seek> ZipArchive<R> {
    /// Opens an archive with [default](ReaderOptions::default) buffer sizes.
    ///
    /// ```no_run
    /// # use std::fs::File;
    /// # use zipstream::ZipArchive;
    /// let mut archive = ZipArchive::new(File::open("foo.zip")?)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(source: R) -> ZipResult<Self> {
        Self::with_options(source, ReaderOptions::default())
    }

    /// Opens an archive, locating and validating its end record.
    ///
    /// The search window is allocated for this call only;
    /// the name and chunk buffers persist for the session.
    pub fn with_options(mut source: R, options: ReaderOptions) -> ZipResult<Self> {
        let mut search_window = vec![0u8; options.end_record_search];
        let end_record = locate_end_record(&mut source, &mut search_window)?;
        Ok(Self {
            source,
            end_record,
            name_scratch: vec![0u8; options.name_capacity],
            chunk_scratch: vec![0u8; options.chunk_capacity],
        })
    }

    /// The archive's end of central directory record.
    pub fn end_record(&self) -> &EndOfCentralDirectory {
        &self.end_record
    }

    /// Number of entries in the archive's central directory.
    pub fn entry_count(&self) -> usize {
        usize::from(self.end_record.entries)
    }

    /// Walks the central directory with `visitor`;
    /// see [`read_central_directory`].
    pub fn for_each_entry<V>(&mut self, visitor: V) -> ZipResult<()>
    where
        V: FnMut(usize, &FileHeader, &str) -> bool,
    {
        read_central_directory(
            &mut self.source,
            &self.end_record,
            &mut self.name_scratch,
            visitor,
        )
    }

    /// Finds the first entry whose name matches `name` exactly,
    /// stopping the directory walk as soon as it's found.
    pub fn find_entry(&mut self, name: &str) -> ZipResult<Option<FileHeader>> {
        let mut found = None;
        self.for_each_entry(|_, header, entry_name| {
            if entry_name == name {
                found = Some(header.clone());
                false
            } else {
                true
            }
        })?;
        Ok(found)
    }

    /// Reads an entry's decompressed bytes into `output`,
    /// which must be exactly `header.uncompressed_size` long.
    ///
    /// `header` must have come from this archive's central directory.
    /// The entry's local header is validated first, then the contents are
    /// decompressed and checked against the central directory's CRC-32.
    /// On any error, `output`'s contents are unspecified and must be
    /// discarded; there are no partial results.
    pub fn read_file(&mut self, header: &FileHeader, output: &mut [u8]) -> ZipResult<()> {
        if header.encrypted {
            return Err(ZipError::Unsupported("encrypted entries"));
        }

        self.source
            .seek(SeekFrom::Start(header.header_offset.into()))?;
        let (local, _) = read_local_header(&mut self.source, None)?;

        if cfg!(feature = "check-local-metadata")
            && (local.compression_method != header.compression_method
                || local.crc32 != header.crc32
                || local.compressed_size != header.compressed_size
                || local.uncompressed_size != header.uncompressed_size)
        {
            return Err(FormatError::LocalHeaderMismatch.into());
        }

        extract(&mut self.source, header, &mut self.chunk_scratch, output)?;

        let actual = crc32fast::hash(output);
        if actual != header.crc32 {
            return Err(ZipError::ChecksumMismatch {
                expected: header.crc32,
                actual,
            });
        }
        Ok(())
    }

    /// Like [`read_file`](Self::read_file), but allocates the output.
    pub fn read_file_to_vec(&mut self, header: &FileHeader) -> ZipResult<Vec<u8>> {
        let mut output = vec![0u8; arch::usize(header.uncompressed_size)?];
        self.read_file(header, &mut output)?;
        Ok(output)
    }

    /// Gives the byte source back.
    pub fn into_inner(self) -> R {
        self.source
    }
}

impl<R> ZipArchive<R> {
    /// A shared reference to the underlying byte source.
    pub fn get_ref(&self) -> &R {
        &self.source
    }
}
