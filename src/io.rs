// Reader/writer and file helpers around the streaming decoder.
//
// The dictionary is always held in memory (the decoder addresses it at
// random). The delta is streamed in fixed-size chunks and target bytes go
// straight to the writer, one window at a time. With the `file-io` feature a
// SHA-256 of the output is computed as it is written.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

#[cfg(feature = "file-io")]
use sha2::Digest;

use crate::vcdiff::decoder::{DecoderOptions, StreamingDecoder};
use crate::vcdiff::error::DecodeError;
use crate::vcdiff::sink::{OutputSink, WriteSink};

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by `decode_stream()` and `decode_file()`.
#[derive(Debug, Clone)]
pub struct DecodeStats {
    /// Dictionary size in bytes.
    pub dictionary_size: u64,
    /// Delta bytes read.
    pub delta_size: u64,
    /// Reconstructed output size in bytes.
    pub output_size: u64,
    /// Number of VCDIFF windows decoded.
    pub windows: u64,
    /// SHA-256 of the reconstructed output (if `file-io` feature is enabled).
    pub output_sha256: Option<[u8; 32]>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error type for reader/writer and file operations.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// I/O error (file open, read, write).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Delta decoding error.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

// ---------------------------------------------------------------------------
// Default buffer size
// ---------------------------------------------------------------------------

/// Default delta chunk size (1 MiB).
pub const DEFAULT_BUFFER_SIZE: usize = 1 << 20;

const BUF_SIZE: usize = 64 * 1024; // 64 KiB

// ---------------------------------------------------------------------------
// decode_stream
// ---------------------------------------------------------------------------

/// Decode a delta read from `reader` against `dictionary`, writing the
/// target to `writer`.
///
/// The delta is fed to the decoder in chunks of `buffer_size` bytes. The
/// writer is flushed before returning.
pub fn decode_stream<R: Read, W: Write>(
    dictionary: &[u8],
    mut reader: R,
    writer: W,
    options: DecoderOptions,
    buffer_size: usize,
) -> Result<DecodeStats, IoError> {
    let mut decoder = StreamingDecoder::with_options(options);
    decoder.start_decoding(dictionary)?;

    let mut sink = WriteSink::new(writer);
    #[cfg(feature = "file-io")]
    let mut hasher = sha2::Sha256::new();

    let mut buf = vec![0u8; buffer_size.max(1)];
    let mut delta_size = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        delta_size += n as u64;

        #[cfg(feature = "file-io")]
        {
            let mut hashing = HashingSink {
                inner: &mut sink,
                hasher: &mut hasher,
            };
            decoder.decode_chunk(&buf[..n], &mut hashing)?;
        }
        #[cfg(not(feature = "file-io"))]
        decoder.decode_chunk(&buf[..n], &mut sink)?;
    }
    decoder.finish_decoding()?;
    sink.get_mut().flush()?;

    #[cfg(feature = "file-io")]
    let output_sha256 = Some(hasher.finalize().into());
    #[cfg(not(feature = "file-io"))]
    let output_sha256: Option<[u8; 32]> = None;

    Ok(DecodeStats {
        dictionary_size: dictionary.len() as u64,
        delta_size,
        output_size: sink.bytes_written(),
        windows: decoder.windows_decoded(),
        output_sha256,
    })
}

// ---------------------------------------------------------------------------
// decode_file
// ---------------------------------------------------------------------------

/// Decode the delta at `delta_path` against the dictionary at
/// `dictionary_path`, writing the target to `output_path`.
///
/// The dictionary is read fully into memory. The delta is streamed via
/// `BufReader` and the output uses `BufWriter`.
pub fn decode_file(
    dictionary_path: &Path,
    delta_path: &Path,
    output_path: &Path,
    options: DecoderOptions,
) -> Result<DecodeStats, IoError> {
    let dictionary = std::fs::read(dictionary_path)?;

    let delta_file = File::open(delta_path)?;
    let delta_reader = BufReader::with_capacity(BUF_SIZE, delta_file);

    let output_file = File::create(output_path)?;
    let output_writer = BufWriter::with_capacity(BUF_SIZE, output_file);

    decode_stream(
        &dictionary,
        delta_reader,
        output_writer,
        options,
        DEFAULT_BUFFER_SIZE,
    )
}

// ---------------------------------------------------------------------------
// decode_batch
// ---------------------------------------------------------------------------

/// Decode independent deltas against one shared dictionary in parallel.
/// Results are in the same order as `deltas`.
#[cfg(feature = "parallel")]
pub fn decode_batch<D: AsRef<[u8]> + Sync>(
    dictionary: &[u8],
    deltas: &[D],
    options: &DecoderOptions,
) -> Vec<Result<Vec<u8>, DecodeError>> {
    use rayon::prelude::*;

    let decoder = crate::vcdiff::decoder::VcdiffDecoder::with_options(options.clone());
    deltas
        .par_iter()
        .map(|delta| decoder.decode(dictionary, delta.as_ref()))
        .collect()
}

// ---------------------------------------------------------------------------
// Hashing sink (used with file-io feature)
// ---------------------------------------------------------------------------

#[cfg(feature = "file-io")]
struct HashingSink<'a, S: OutputSink> {
    inner: &'a mut S,
    hasher: &'a mut sha2::Sha256,
}

#[cfg(feature = "file-io")]
impl<S: OutputSink> OutputSink for HashingSink<'_, S> {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.append(bytes)?;
        self.hasher.update(bytes);
        Ok(())
    }

    fn reserve(&mut self, additional: usize) {
        self.inner.reserve(additional);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
