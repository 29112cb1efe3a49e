// Stream and file helpers for delta encoding/decoding.
//
// `encode_stream` / `decode_stream` run a whole session between any
// `Read` and `Write`; `encode_file` / `decode_file` wrap them with
// buffered files. The dictionary is always read fully into memory.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use thiserror::Error;

use crate::compress::decoder::DeltaDecoder;
use crate::compress::encoder::{EncodeError, EncoderOptions, StreamingEncoder};
use crate::vcdiff::decoder::{DecodeError, DecoderOptions};

/// Default target bytes per window, and delta bytes per decode read.
pub const DEFAULT_BUFFER_SIZE: usize = 1 << 20;

const IO_BUF_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeStats {
    pub dictionary_size: u64,
    pub target_size: u64,
    pub delta_size: u64,
    /// Number of non-empty windows written.
    pub windows: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeStats {
    pub dictionary_size: u64,
    pub delta_size: u64,
    pub target_size: u64,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum IoError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

// ---------------------------------------------------------------------------
// Streams
// ---------------------------------------------------------------------------

/// Fill `buf` from `reader`, stopping early only at end of input.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Encode everything `target` yields, one window per `buffer_size` bytes.
pub fn encode_stream<R: Read, W: Write>(
    dictionary: &[u8],
    target: &mut R,
    delta: &mut W,
    options: EncoderOptions,
    buffer_size: usize,
) -> Result<EncodeStats, IoError> {
    let mut encoder = StreamingEncoder::new(dictionary, options)?;
    let mut buf = vec![0u8; buffer_size.max(1)];
    let mut pending = Vec::new();
    let mut delta_size = 0u64;

    encoder.start(&mut pending)?;
    loop {
        let n = read_full(target, &mut buf)?;
        if n == 0 {
            break;
        }
        encoder.encode_chunk(&buf[..n], &mut pending)?;
        delta.write_all(&pending)?;
        delta_size += pending.len() as u64;
        pending.clear();
        if n < buf.len() {
            break;
        }
    }
    encoder.finish_encoding(&mut pending)?;
    delta.write_all(&pending)?;
    delta_size += pending.len() as u64;
    delta.flush()?;

    Ok(EncodeStats {
        dictionary_size: dictionary.len() as u64,
        target_size: encoder.bytes_in(),
        delta_size,
        windows: encoder.windows_written(),
    })
}

/// Decode the delta read from `delta`, writing the target to `target`.
pub fn decode_stream<R: Read, W: Write>(
    dictionary: &[u8],
    delta: &mut R,
    target: &mut W,
    options: DecoderOptions,
    buffer_size: usize,
) -> Result<DecodeStats, IoError> {
    let mut decoder = DeltaDecoder::with_options(dictionary, delta, options).chunk_size(buffer_size);
    let target_size = decoder.decode_to(target)?;
    target.flush()?;
    Ok(DecodeStats {
        dictionary_size: dictionary.len() as u64,
        delta_size: decoder.bytes_read(),
        target_size,
    })
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

pub fn encode_file(
    dictionary_path: &Path,
    target_path: &Path,
    delta_path: &Path,
    options: EncoderOptions,
    buffer_size: usize,
) -> Result<EncodeStats, IoError> {
    let dictionary = std::fs::read(dictionary_path)?;
    let mut target = BufReader::with_capacity(IO_BUF_SIZE, File::open(target_path)?);
    let mut delta = BufWriter::with_capacity(IO_BUF_SIZE, File::create(delta_path)?);
    encode_stream(&dictionary, &mut target, &mut delta, options, buffer_size)
}

pub fn decode_file(
    dictionary_path: &Path,
    delta_path: &Path,
    output_path: &Path,
    options: DecoderOptions,
    buffer_size: usize,
) -> Result<DecodeStats, IoError> {
    let dictionary = std::fs::read(dictionary_path)?;
    let mut delta = BufReader::with_capacity(IO_BUF_SIZE, File::open(delta_path)?);
    let mut output = BufWriter::with_capacity(IO_BUF_SIZE, File::create(output_path)?);
    decode_stream(&dictionary, &mut delta, &mut output, options, buffer_size)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
