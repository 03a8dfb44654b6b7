//! The streaming decompression bridge: turns an entry's bounded-chunk
//! compressed byte stream into decoded output.
//!
//! This sits between [`read`]'s record parsing and `flate2`'s incremental
//! inflater. Compressed bytes are pulled from the source a scratch-buffer's
//! worth at a time and fed to the inflater with the entire remaining output
//! span as the write target, so decompression never over- or under-reads
//! across chunk boundaries.
//!
//! [`read`]: ../read/index.html

use std::io::{self, Read};

use flate2::{Decompress, FlushDecompress, Status};

use crate::arch;
use crate::read::{CompressionMethod, FileHeader};
use crate::result::*;

/// Decompresses an entry into `output`, which must be preallocated to
/// exactly `header.uncompressed_size` bytes. Nothing is allocated or
/// resized here.
///
/// The source must be positioned at the entry's first compressed byte
/// (i.e., just past its local file header; see
/// [`read_local_header`](crate::read::read_local_header)).
///
/// Stored entries are read straight through. Deflated entries run a raw
/// (headerless) inflater over chunks of at most `chunk_scratch.len()`
/// compressed bytes, stopping when the stream reports completion or
/// either the compressed or the decompressed byte budget runs out.
///
/// There are no partial results: on any error the contents of `output`
/// are unspecified and must be discarded. No CRC check happens here;
/// callers that want one get it from
/// [`ZipArchive::read_file`](crate::read::ZipArchive::read_file).
pub fn extract<R: Read>(
    source: &mut R,
    header: &FileHeader,
    chunk_scratch: &mut [u8],
    output: &mut [u8],
) -> ZipResult<()> {
    if output.len() != arch::usize(header.uncompressed_size)? {
        return Err(ZipError::SizeMismatch {
            expected: header.uncompressed_size.into(),
            found: output.len() as u64,
        });
    }

    match header.compression_method {
        CompressionMethod::Store => {
            source.read_exact(output)?;
            Ok(())
        }
        CompressionMethod::Deflate => {
            inflate_chunked(source, arch::usize(header.compressed_size)?, chunk_scratch, output)
        }
        CompressionMethod::Unsupported(code) => Err(ZipError::UnsupportedMethod(code)),
    }
}

/// The chunked inflate loop for [`extract`].
fn inflate_chunked<R: Read>(
    source: &mut R,
    compressed_size: usize,
    chunk_scratch: &mut [u8],
    output: &mut [u8],
) -> ZipResult<()> {
    let mut remaining_in = compressed_size;
    let mut out_posit = 0;

    if chunk_scratch.is_empty() && remaining_in > 0 {
        return Err(CapacityError::ChunkTooLarge.into());
    }

    // Raw deflate: ZIP entries carry no zlib wrapper.
    let mut inflater = Decompress::new(false);

    while remaining_in > 0 && out_posit < output.len() {
        let take = remaining_in.min(chunk_scratch.len());
        let got = source.read(&mut chunk_scratch[..take])?;
        if got == 0 {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }

        // One step: the whole chunk in, all remaining output capacity out.
        // A fatal inflater status surfaces as Err and drops the inflater.
        let produced_before = inflater.total_out();
        let status = inflater.decompress(
            &chunk_scratch[..got],
            &mut output[out_posit..],
            FlushDecompress::None,
        )?;

        out_posit += (inflater.total_out() - produced_before) as usize;
        remaining_in -= got;

        if status == Status::StreamEnd {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    use std::io::{Cursor, Write};

    use chrono::NaiveDate;
    use flate2::write::DeflateEncoder;
    use flate2::Compression;

    fn deflated(data: &[u8]) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn header_for(method: CompressionMethod, compressed: usize, uncompressed: usize) -> FileHeader {
        FileHeader {
            compression_method: method,
            crc32: 0,
            compressed_size: compressed as u32,
            uncompressed_size: uncompressed as u32,
            file_name_length: 0,
            extra_field_length: 0,
            last_modified: NaiveDate::from_ymd_opt(1980, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            encrypted: false,
            header_offset: 0,
        }
    }

    /// xorshift32; tests want incompressible-ish data without a rand dep.
    fn pseudo_random(len: usize) -> Vec<u8> {
        let mut state: u32 = 0x2545_f491;
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            out.push(state as u8);
        }
        out
    }

    fn inflate_roundtrip(data: &[u8], chunk_capacity: usize) {
        let compressed = deflated(data);
        let header = header_for(CompressionMethod::Deflate, compressed.len(), data.len());
        let mut scratch = vec![0u8; chunk_capacity];
        let mut output = vec![0u8; data.len()];
        extract(&mut Cursor::new(compressed), &header, &mut scratch, &mut output).unwrap();
        assert_eq!(output, data);
    }

    #[test]
    fn inflates_empty_entry() {
        inflate_roundtrip(&[], 64);
    }

    #[test]
    fn inflates_single_byte() {
        inflate_roundtrip(b"!", 64);
    }

    #[test]
    fn inflates_single_chunk() {
        // Compresses to well under one 4K chunk.
        inflate_roundtrip(b"hello hello hello hello", 4096);
    }

    #[test]
    fn inflates_across_chunk_boundaries() {
        // 10 KB of noise barely compresses, so a 64-byte scratch forces
        // the loop through many chunks.
        inflate_roundtrip(&pseudo_random(10 * 1024), 64);
    }

    #[test]
    fn reads_stored_entry_verbatim() {
        let data = b"stored, not compressed";
        let header = header_for(CompressionMethod::Store, data.len(), data.len());
        let mut scratch = vec![0u8; 64];
        let mut output = vec![0u8; data.len()];
        extract(&mut Cursor::new(&data[..]), &header, &mut scratch, &mut output).unwrap();
        assert_eq!(&output, data);
    }

    #[test]
    fn short_stored_entry_is_an_io_error() {
        let header = header_for(CompressionMethod::Store, 100, 100);
        let mut scratch = vec![0u8; 64];
        let mut output = vec![0u8; 100];
        let truncated = vec![0u8; 10];
        match extract(&mut Cursor::new(truncated), &header, &mut scratch, &mut output) {
            Err(ZipError::Io(_)) => {}
            other => panic!("expected an I/O error, got {:?}", other),
        }
    }

    #[test]
    fn truncated_deflate_stream_is_an_io_error() {
        let compressed = deflated(&pseudo_random(4096));
        let header = header_for(CompressionMethod::Deflate, compressed.len(), 4096);
        let truncated = &compressed[..compressed.len() / 2];
        let mut scratch = vec![0u8; 64];
        let mut output = vec![0u8; 4096];
        match extract(&mut Cursor::new(truncated), &header, &mut scratch, &mut output) {
            Err(ZipError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("expected an I/O error, got {:?}", other),
        }
    }

    #[test]
    fn corrupt_deflate_stream_fails() {
        let data = pseudo_random(1024);
        let mut compressed = deflated(&data);
        for byte in compressed.iter_mut().take(16) {
            *byte = !*byte;
        }
        let header = header_for(CompressionMethod::Deflate, compressed.len(), data.len());
        let mut scratch = vec![0u8; 64];
        let mut output = vec![0u8; data.len()];
        let result = extract(&mut Cursor::new(compressed), &header, &mut scratch, &mut output);
        // Bit flips either blow up the inflater or at least can't reproduce
        // the input.
        match result {
            Err(ZipError::Decompression(_)) => {}
            Ok(()) => assert_ne!(output, data),
            other => panic!("expected a decompression error, got {:?}", other),
        }
    }

    #[test]
    fn wrong_output_size_is_rejected() {
        let compressed = deflated(b"four");
        let header = header_for(CompressionMethod::Deflate, compressed.len(), 4);
        let mut scratch = vec![0u8; 64];
        let mut output = vec![0u8; 5];
        match extract(&mut Cursor::new(compressed), &header, &mut scratch, &mut output) {
            Err(ZipError::SizeMismatch { expected: 4, found: 5 }) => {}
            other => panic!("expected a size mismatch, got {:?}", other),
        }
    }

    #[test]
    fn empty_chunk_scratch_is_rejected() {
        let compressed = deflated(b"data");
        let header = header_for(CompressionMethod::Deflate, compressed.len(), 4);
        let mut output = vec![0u8; 4];
        match extract(&mut Cursor::new(compressed), &header, &mut [], &mut output) {
            Err(ZipError::Capacity(CapacityError::ChunkTooLarge)) => {}
            other => panic!("expected a capacity error, got {:?}", other),
        }
    }

    #[test]
    fn unsupported_method_is_rejected() {
        let header = header_for(CompressionMethod::Unsupported(12), 4, 4);
        let mut scratch = vec![0u8; 64];
        let mut output = vec![0u8; 4];
        match extract(&mut Cursor::new(vec![0u8; 4]), &header, &mut scratch, &mut output) {
            Err(ZipError::UnsupportedMethod(12)) => {}
            other => panic!("expected UnsupportedMethod, got {:?}", other),
        }
    }
}
