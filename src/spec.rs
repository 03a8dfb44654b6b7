//! Code specific to the ZIP file format specification.
//!
//! We try to keep the nitty gritty here,
//! and higher-level stuff in the [`read`] module.
//!
//! Unlike readers that get the whole archive as one slice,
//! everything here parses fixed-size windows that [`read`] pulled
//! from a seekable source, so records don't borrow from a mapping.
//!
//! Most comments quote the ZIP spec, [`APPNOTE.TXT`].
//!
//! [`read`]: ../read/index.html
//! [`APPNOTE.TXT`]: https://pkware.cachefly.net/webdocs/APPNOTE/APPNOTE-6.3.6.TXT

use std::borrow::Cow;
use std::convert::TryInto;

use chrono::{NaiveDate, NaiveDateTime};
use codepage_437::*;

use crate::read::{CompressionMethod, FileHeader};
use crate::result::*;

// Magic numbers denoting various sections of a ZIP archive

/// End of central directory magic number (0x06054b50, little-endian)
pub const EOCDR_MAGIC: [u8; 4] = [b'P', b'K', 5, 6];
/// Central directory magic number (0x02014b50, little-endian)
pub const CENTRAL_DIRECTORY_MAGIC: [u8; 4] = [b'P', b'K', 1, 2];
/// Local file header magic number (0x04034b50, little-endian)
pub const LOCAL_FILE_HEADER_MAGIC: [u8; 4] = [b'P', b'K', 3, 4];

/// Size of the end of central directory record, sans comment
pub const EOCDR_SIZE: usize = 22;
/// Size of the fixed portion of a central directory entry
pub const CENTRAL_DIRECTORY_RECORD_SIZE: usize = 46;
/// Size of the fixed portion of a local file header
pub const LOCAL_FILE_HEADER_SIZE: usize = 30;

// Straight from the Rust docs:

/// Reads a little-endian u32 from the front of the provided slice, shrinking it.
fn read_u32(input: &mut &[u8]) -> u32 {
    let (int_bytes, rest) = input.split_at(std::mem::size_of::<u32>());
    *input = rest;
    u32::from_le_bytes(int_bytes.try_into().expect("less than four bytes for u32"))
}

/// Reads a little-endian u16 from the front of the provided slice, shrinking it.
fn read_u16(input: &mut &[u8]) -> u16 {
    let (int_bytes, rest) = input.split_at(std::mem::size_of::<u16>());
    *input = rest;
    u16::from_le_bytes(int_bytes.try_into().expect("less than two bytes for u16"))
}

/// Data from the End of central directory record
///
/// Found at the back of the ZIP archive and provides offsets for finding
/// its central directory, along with lots of stuff that stopped being relevant
/// when we stopped breaking ZIP archives onto multiple floppies.
///
/// Read once per archive and held for the session.
#[derive(Debug, Clone)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_central_directory: u16,
    pub entries_on_this_disk: u16,
    pub entries: u16,
    pub central_directory_size: u32,
    pub central_directory_offset: u32,
    pub comment_length: u16,
}

impl EndOfCentralDirectory {
    /// Parses an end of central directory record from the front of `eocdr`.
    ///
    /// Fails with [`FormatError::EndRecordNotFound`] if the slice is too
    /// short for the record or doesn't start with its magic, so callers
    /// can hand us unscanned bytes safely.
    pub fn parse(mut eocdr: &[u8]) -> ZipResult<Self> {
        // 4.3.16  End of central directory record:
        //
        // end of central dir signature    4 bytes  (0x06054b50)
        // number of this disk             2 bytes
        // number of the disk with the
        // start of the central directory  2 bytes
        // total number of entries in
        // the central dir on this disk    2 bytes
        // total number of entries in
        // the central dir                 2 bytes
        // size of the central directory   4 bytes
        // offset of start of central
        // directory with respect to
        // the starting disk number        4 bytes
        // zipfile comment length          2 bytes
        if eocdr.len() < EOCDR_SIZE || eocdr[..4] != EOCDR_MAGIC {
            return Err(FormatError::EndRecordNotFound.into());
        }
        eocdr = &eocdr[4..];
        let disk_number = read_u16(&mut eocdr);
        let disk_with_central_directory = read_u16(&mut eocdr);
        let entries_on_this_disk = read_u16(&mut eocdr);
        let entries = read_u16(&mut eocdr);
        let central_directory_size = read_u32(&mut eocdr);
        let central_directory_offset = read_u32(&mut eocdr);
        let comment_length = read_u16(&mut eocdr);

        Ok(Self {
            disk_number,
            disk_with_central_directory,
            entries_on_this_disk,
            entries,
            central_directory_size,
            central_directory_offset,
            comment_length,
        })
    }

    /// True if any field claims the archive continues on another disk.
    pub fn spans_disks(&self) -> bool {
        self.disk_number != 0
            || self.disk_with_central_directory != 0
            || self.entries != self.entries_on_this_disk
    }
}

/// Searches backward through `window` for the End of central directory record.
///
/// It should be right at the end of the file,
/// but its variable-length comment means we can't jump to a known offset.
/// We probe at four-byte steps from the last place the record could start,
/// taking the first (highest) hit.
///
/// This is a positional heuristic: a comment that embeds the signature bytes
/// at a probed offset can defeat it, and a comment whose length isn't a
/// multiple of four hides the real record from the stepped scan.
/// Both are accepted limitations of the format and of this search.
pub fn find_eocdr(window: &[u8]) -> ZipResult<usize> {
    if window.len() < EOCDR_SIZE {
        return Err(FormatError::EndRecordNotFound.into());
    }
    let mut posit = window.len() - EOCDR_SIZE;
    loop {
        if window[posit..posit + 4] == EOCDR_MAGIC {
            return Ok(posit);
        }
        if posit < 4 {
            return Err(FormatError::EndRecordNotFound.into());
        }
        posit -= 4;
    }
}

/// Data from the fixed portion of a central directory entry
///
/// Each of these records contains information about a file or folder
/// stored in the ZIP archive. The variable-length name, extra field,
/// and comment follow it on disk; the reader handles those separately
/// so this can parse from a fixed-size window.
#[derive(Debug)]
pub struct CentralDirectoryRecord {
    pub source_version: u16,
    pub minimum_extract_version: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_modified_time: u16,
    pub last_modified_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name_length: u16,
    pub extra_field_length: u16,
    pub file_comment_length: u16,
    pub disk_number: u16,
    pub internal_file_attributes: u16,
    pub external_file_attributes: u32,
    pub header_offset: u32,
}

impl CentralDirectoryRecord {
    /// Parses the 46-byte fixed portion of a central directory entry.
    ///
    /// `index` is the entry's position in the directory; a slice that's
    /// too short or doesn't start with the entry magic fails with
    /// [`FormatError::EntryHeaderCorrupt`] carrying that index.
    pub fn parse(mut entry: &[u8], index: usize) -> ZipResult<Self> {
        // 4.3.12  Central directory structure:
        //
        //   central file header signature   4 bytes  (0x02014b50)
        //   version made by                 2 bytes
        //   version needed to extract       2 bytes
        //   general purpose bit flag        2 bytes
        //   compression method              2 bytes
        //   last mod file time              2 bytes
        //   last mod file date              2 bytes
        //   crc-32                          4 bytes
        //   compressed size                 4 bytes
        //   uncompressed size               4 bytes
        //   file name length                2 bytes
        //   extra field length              2 bytes
        //   file comment length             2 bytes
        //   disk number start               2 bytes
        //   internal file attributes        2 bytes
        //   external file attributes        4 bytes
        //   relative offset of local header 4 bytes
        //
        //   file name (variable size)
        //   extra field (variable size)
        //   file comment (variable size)
        if entry.len() < CENTRAL_DIRECTORY_RECORD_SIZE || entry[..4] != CENTRAL_DIRECTORY_MAGIC {
            return Err(FormatError::EntryHeaderCorrupt(index).into());
        }
        entry = &entry[4..];
        let source_version = read_u16(&mut entry);
        let minimum_extract_version = read_u16(&mut entry);
        let flags = read_u16(&mut entry);
        let compression_method = read_u16(&mut entry);
        let last_modified_time = read_u16(&mut entry);
        let last_modified_date = read_u16(&mut entry);
        let crc32 = read_u32(&mut entry);
        let compressed_size = read_u32(&mut entry);
        let uncompressed_size = read_u32(&mut entry);
        let file_name_length = read_u16(&mut entry);
        let extra_field_length = read_u16(&mut entry);
        let file_comment_length = read_u16(&mut entry);
        let disk_number = read_u16(&mut entry);
        let internal_file_attributes = read_u16(&mut entry);
        let external_file_attributes = read_u32(&mut entry);
        let header_offset = read_u32(&mut entry);

        Ok(Self {
            source_version,
            minimum_extract_version,
            flags,
            compression_method,
            last_modified_time,
            last_modified_date,
            crc32,
            compressed_size,
            uncompressed_size,
            file_name_length,
            extra_field_length,
            file_comment_length,
            disk_number,
            internal_file_attributes,
            external_file_attributes,
            header_offset,
        })
    }
}

/// Data from the fixed portion of a local file header
///
/// Each file's actual contents is preceded by one of these.
#[derive(Debug)]
pub struct LocalFileHeader {
    pub minimum_extract_version: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_modified_time: u16,
    pub last_modified_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name_length: u16,
    pub extra_field_length: u16,
}

impl LocalFileHeader {
    /// Parses the 30-byte fixed portion of a local file header.
    ///
    /// A slice that's too short or doesn't start with the header magic
    /// fails with [`FormatError::BadLocalSignature`], keeping this safe
    /// for speculative probes.
    pub fn parse(mut header: &[u8]) -> ZipResult<Self> {
        // 4.3.7  Local file header:
        //
        // local file header signature     4 bytes  (0x04034b50)
        // version needed to extract       2 bytes
        // general purpose bit flag        2 bytes
        // compression method              2 bytes
        // last mod file time              2 bytes
        // last mod file date              2 bytes
        // crc-32                          4 bytes
        // compressed size                 4 bytes
        // uncompressed size               4 bytes
        // file name length                2 bytes
        // extra field length              2 bytes
        //
        // file name (variable size)
        // extra field (variable size)
        if header.len() < LOCAL_FILE_HEADER_SIZE || header[..4] != LOCAL_FILE_HEADER_MAGIC {
            return Err(FormatError::BadLocalSignature.into());
        }
        header = &header[4..];
        let minimum_extract_version = read_u16(&mut header);
        let flags = read_u16(&mut header);
        let compression_method = read_u16(&mut header);
        let last_modified_time = read_u16(&mut header);
        let last_modified_date = read_u16(&mut header);
        let crc32 = read_u32(&mut header);
        let compressed_size = read_u32(&mut header);
        let uncompressed_size = read_u32(&mut header);
        let file_name_length = read_u16(&mut header);
        let extra_field_length = read_u16(&mut header);

        Ok(Self {
            minimum_extract_version,
            flags,
            compression_method,
            last_modified_time,
            last_modified_date,
            crc32,
            compressed_size,
            uncompressed_size,
            file_name_length,
            extra_field_length,
        })
    }
}

impl CompressionMethod {
    fn from_u16(u: u16) -> Self {
        match u {
            0 => CompressionMethod::Store,
            8 => CompressionMethod::Deflate,
            v => CompressionMethod::Unsupported(v),
        }
    }
}

impl FileHeader {
    /// Projects a `FileHeader` from a central directory entry.
    /// `header_offset` points at the entry's local file header.
    pub(crate) fn from_central(record: &CentralDirectoryRecord) -> Self {
        Self {
            compression_method: CompressionMethod::from_u16(record.compression_method),
            crc32: record.crc32,
            compressed_size: record.compressed_size,
            uncompressed_size: record.uncompressed_size,
            file_name_length: record.file_name_length,
            extra_field_length: record.extra_field_length,
            last_modified: parse_msdos(record.last_modified_time, record.last_modified_date),
            encrypted: is_encrypted(record.flags),
            header_offset: record.header_offset,
        }
    }

    /// Projects a `FileHeader` from a local file header.
    ///
    /// The local header doesn't know its own offset
    /// (we're at it already if we're reading the thing),
    /// so `header_offset` is zero here.
    pub(crate) fn from_local(local: &LocalFileHeader) -> Self {
        Self {
            compression_method: CompressionMethod::from_u16(local.compression_method),
            crc32: local.crc32,
            compressed_size: local.compressed_size,
            uncompressed_size: local.uncompressed_size,
            file_name_length: local.file_name_length,
            extra_field_length: local.extra_field_length,
            last_modified: parse_msdos(local.last_modified_time, local.last_modified_date),
            encrypted: is_encrypted(local.flags),
            header_offset: 0,
        }
    }
}

/// Extracts the "is this text UTF-8?" bit from the 16-bit flags field.
///
/// If false, text is assumed to be CP437.
pub fn is_utf8(flags: u16) -> bool {
    // Bit 11: Language encoding flag (EFS).  If this bit is set,
    //         the filename and comment fields for this file
    //         MUST be encoded using UTF-8. (see APPENDIX D)
    flags & (1 << 11) != 0
}

/// Extracts the "is this file encrypted?" bit from the 16-bit flags field.
pub fn is_encrypted(flags: u16) -> bool {
    // Bit 0: If set, indicates that the file is encrypted
    flags & 1 != 0
}

/// Decodes a file name per the entry's general-purpose flags:
/// UTF-8 if bit 11 is set, CP437 otherwise.
pub fn decode_file_name(raw: &[u8], flags: u16) -> ZipResult<Cow<'_, str>> {
    if is_utf8(flags) {
        let utf8 = std::str::from_utf8(raw).map_err(ZipError::Encoding)?;
        Ok(Cow::Borrowed(utf8))
    } else {
        Ok(Cow::borrow_from_cp437(raw, &CP437_CONTROL))
    }
}

/// Decodes an MS-DOS time/date pair.
///
/// Archivers write all sorts of nonsense here, so out-of-range fields
/// fall back to the DOS epoch instead of failing the whole entry.
pub fn parse_msdos(time: u16, date: u16) -> NaiveDateTime {
    let seconds = (0b0000_0000_0001_1111 & time) as u32 * 2; // MSDOS uses 2-second precision
    let minutes = (0b0000_0111_1110_0000 & time) as u32 >> 5;
    let hours = (0b1111_1000_0000_0000 & time) as u32 >> 11;

    let days = (0b0000_0000_0001_1111 & date) as u32;
    let months = (0b0000_0001_1110_0000 & date) as u32 >> 5;
    // MSDOS uses years since 1980; Always interpreted as a positive value
    let years = ((0b1111_1110_0000_0000 & date) >> 9) as i32 + 1980;

    NaiveDate::from_ymd_opt(years, months, days)
        .and_then(|d| d.and_hms_opt(hours, minutes, seconds))
        .unwrap_or_else(|| {
            NaiveDate::from_ymd_opt(1980, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        })
}
