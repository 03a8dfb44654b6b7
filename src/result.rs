//! Error types and the related `Result<T>`

use thiserror::Error;

pub type ZipResult<T> = Result<T, ZipError>;

#[derive(Debug, Error)]
pub enum ZipError {
    /// An error from underlying I/O
    #[error("I/O Error")]
    Io(#[from] std::io::Error),

    /// The archive's structure doesn't match the ZIP container format.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// A variable-length field didn't fit in the buffer provided for it.
    #[error(transparent)]
    Capacity(#[from] CapacityError),

    /// Decoding a UTF-8 file name failed
    #[error("Invalid UTF-8 in file name")]
    Encoding(#[from] std::str::Utf8Error),

    /// A stored (uncompressed) entry's sizes disagree, or an output buffer
    /// wasn't sized to the entry's uncompressed size.
    #[error("Size mismatch: expected {expected} bytes, found {found}")]
    SizeMismatch { expected: u64, found: u64 },

    /// The entry is compressed with a method we don't decode.
    /// (The u16 is the format's internal method code.)
    #[error("Unsupported compression method {0}")]
    UnsupportedMethod(u16),

    /// The Deflate stream was corrupt, truncated, or otherwise undecodable.
    #[error("Couldn't inflate entry: {0}")]
    Decompression(#[from] flate2::DecompressError),

    /// The decompressed bytes don't hash to the CRC-32 stored in the
    /// central directory.
    #[error("CRC-32 mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// The archive uses a feature this library doesn't support
    #[error("Unsupported Zip archive: {0}")]
    Unsupported(&'static str),

    /// A cast from a 64-bit int to a usize failed,
    /// probably on a 32-bit system.
    #[error("Zip archive too large for address space")]
    InsufficientAddressSpace,
}

/// Structural problems with the container itself.
///
/// These abort whatever operation found them; there's no point continuing
/// to parse an archive whose record framing is broken.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    /// The source is too small to hold even an end of central directory record.
    #[error("File too small to be a Zip archive")]
    NotAZip,

    /// No end of central directory signature in the search window.
    #[error("Couldn't find End Of Central Directory Record")]
    EndRecordNotFound,

    /// The end record claims the archive spans multiple disks.
    #[error("No support for multi-disk archives")]
    MultiDiskUnsupported,

    /// A central directory entry's signature didn't check out.
    /// Carries the index of the offending entry.
    #[error("Corrupt central directory entry at index {0}")]
    EntryHeaderCorrupt(usize),

    /// The bytes at a purported local file header don't start with its magic.
    #[error("Invalid local file header signature")]
    BadLocalSignature,

    /// A local file header disagrees with the central directory entry
    /// that pointed at it.
    #[error("Central directory entry doesn't match local file header")]
    LocalHeaderMismatch,
}

/// A variable-length field was larger than the scratch buffer set aside for it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CapacityError {
    /// A file name didn't fit in the name buffer.
    /// Carries the entry index when found during directory iteration.
    #[error("File name too long for the name buffer")]
    FileNameTooLong(Option<usize>),

    /// The compressed-chunk scratch buffer is empty.
    #[error("Chunk buffer has no capacity")]
    ChunkTooLarge,
}
