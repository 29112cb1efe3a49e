// Reader-driven delta decoder.
//
// DeltaDecoder pulls a delta from any `Read` source in fixed-size chunks,
// feeds them to a StreamingDecoder and forwards each completed window to
// a `Write` sink. Only the undecoded tail of the delta and the current
// window's target are held in memory.

use std::io::{Read, Write};

use crate::vcdiff::decoder::{DecodeError, DecoderOptions, StreamingDecoder};

/// Default number of delta bytes read per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// DeltaDecoder
// ---------------------------------------------------------------------------

pub struct DeltaDecoder<'d, R: Read> {
    inner: StreamingDecoder<'d>,
    reader: R,
    chunk_size: usize,
    bytes_read: u64,
    bytes_decoded: u64,
    /// Reusable buffers, cleared between chunks.
    chunk_buf: Vec<u8>,
    output_buf: Vec<u8>,
}

impl<'d, R: Read> DeltaDecoder<'d, R> {
    pub fn new(dictionary: &'d [u8], reader: R) -> Self {
        Self::with_options(dictionary, reader, DecoderOptions::default())
    }

    pub fn with_options(dictionary: &'d [u8], reader: R, options: DecoderOptions) -> Self {
        Self {
            inner: StreamingDecoder::new(dictionary, options),
            reader,
            chunk_size: DEFAULT_CHUNK_SIZE,
            bytes_read: 0,
            bytes_decoded: 0,
            chunk_buf: Vec::new(),
            output_buf: Vec::new(),
        }
    }

    /// Read the delta in chunks of `size` bytes (at least 1).
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Decode the whole delta, writing target bytes to `writer`.
    ///
    /// Returns the number of target bytes written.
    pub fn decode_to<W: Write>(&mut self, writer: &mut W) -> Result<u64, DecodeError> {
        self.inner.start();
        self.bytes_read = 0;
        self.bytes_decoded = 0;
        self.chunk_buf.resize(self.chunk_size, 0);
        loop {
            let n = match self.reader.read(&mut self.chunk_buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            self.bytes_read += n as u64;
            self.output_buf.clear();
            self.inner
                .decode_chunk(&self.chunk_buf[..n], &mut self.output_buf)?;
            if !self.output_buf.is_empty() {
                writer.write_all(&self.output_buf)?;
                self.bytes_decoded += self.output_buf.len() as u64;
            }
        }
        self.inner.finish()?;
        log::debug!(
            "decoded {} delta bytes into {} target bytes",
            self.bytes_read,
            self.bytes_decoded
        );
        Ok(self.bytes_decoded)
    }

    /// Delta bytes consumed so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Target bytes written so far.
    pub fn bytes_decoded(&self) -> u64 {
        self.bytes_decoded
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Convenience: decode a complete in-memory delta.
pub fn decode_all(dictionary: &[u8], delta: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::new();
    DeltaDecoder::new(dictionary, delta).decode_to(&mut out)?;
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
