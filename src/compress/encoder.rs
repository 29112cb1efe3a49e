// Streaming delta encoder.
//
// StreamingEncoder drives one encoding session:
//   - The dictionary is indexed once, in a DiffEngine that may be shared
//     between sessions through an Arc
//   - start() writes the file header
//   - every encode_chunk() call becomes one delta window
//   - finish_encoding() closes the stream (a no-op for binary output,
//     the closing bracket for JSON)

use std::sync::Arc;

use thiserror::Error;

use crate::engine::{DiffEngine, EngineError};
use crate::vcdiff::decoder::compute_adler32;
use crate::vcdiff::header::FormatExtensions;
use crate::vcdiff::writer::{CodeTableWriter, JsonWriter, OutputSink, VcdiffWriter, WriterError};

use super::runs::RunSplitter;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for an encoding session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncoderOptions {
    /// Let COPY refer to earlier bytes of the same window.
    pub look_for_target_matches: bool,
    /// Single combined section per window (needs the extended header).
    pub interleaved: bool,
    /// Adler-32 of each window's target.
    pub checksum: bool,
    /// Human-readable JSON instead of VCDIFF. Excludes the other formats.
    pub json: bool,
    /// Rewrite repeated-byte stretches of ADD data as RUN.
    pub split_runs: bool,
}

impl EncoderOptions {
    pub fn format_extensions(&self) -> FormatExtensions {
        let mut extensions = FormatExtensions::empty();
        extensions.set(FormatExtensions::INTERLEAVED, self.interleaved);
        extensions.set(FormatExtensions::CHECKSUM, self.checksum);
        extensions.set(FormatExtensions::JSON, self.json);
        extensions
    }

    fn validate(&self) -> Result<(), EncodeError> {
        if self.json && (self.interleaved || self.checksum) {
            return Err(EncodeError::IncompatibleOptions(
                "JSON output cannot be combined with interleaved or checksum",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Writer(#[from] WriterError),
    #[error("incompatible options: {0}")]
    IncompatibleOptions(&'static str),
    #[error("{0} is not 7-bit ASCII, which JSON output requires")]
    NotAscii(&'static str),
    #[error("encoder misuse: {0}")]
    Usage(&'static str),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// StreamingEncoder
// ---------------------------------------------------------------------------

/// One encoding session against a dictionary.
///
/// # Example
/// ```
/// use vcdelta::compress::encoder::{EncoderOptions, StreamingEncoder};
/// let dictionary = b"a dictionary shared by many deltas";
/// let mut enc = StreamingEncoder::new(dictionary, EncoderOptions::default()).unwrap();
/// let mut delta = Vec::new();
/// enc.start(&mut delta).unwrap();
/// enc.encode_chunk(b"first chunk of target", &mut delta).unwrap();
/// enc.encode_chunk(b"second chunk", &mut delta).unwrap();
/// enc.finish_encoding(&mut delta).unwrap();
/// ```
pub struct StreamingEncoder {
    engine: Arc<DiffEngine>,
    options: EncoderOptions,
    writer: Box<dyn CodeTableWriter + Send>,
    started: bool,
    bytes_in: u64,
    windows_written: u64,
}

impl std::fmt::Debug for StreamingEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingEncoder")
            .field("dictionary_size", &self.engine.dictionary_size())
            .field("options", &self.options)
            .field("started", &self.started)
            .field("bytes_in", &self.bytes_in)
            .field("windows_written", &self.windows_written)
            .finish()
    }
}

impl StreamingEncoder {
    /// Index `dictionary` and prepare a session.
    pub fn new(dictionary: &[u8], options: EncoderOptions) -> Result<Self, EncodeError> {
        Self::with_engine(Arc::new(DiffEngine::new(dictionary)?), options)
    }

    /// Prepare a session on an already indexed dictionary.
    pub fn with_engine(engine: Arc<DiffEngine>, options: EncoderOptions) -> Result<Self, EncodeError> {
        options.validate()?;
        let base: Box<dyn CodeTableWriter + Send> = if options.json {
            Box::new(JsonWriter::new())
        } else {
            Box::new(VcdiffWriter::new(options.interleaved))
        };
        let writer = if options.split_runs {
            Box::new(RunSplitter::new(base))
        } else {
            base
        };
        Ok(Self {
            engine,
            options,
            writer,
            started: false,
            bytes_in: 0,
            windows_written: 0,
        })
    }

    pub fn options(&self) -> &EncoderOptions {
        &self.options
    }

    pub fn engine(&self) -> &Arc<DiffEngine> {
        &self.engine
    }

    /// Target bytes received so far.
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    /// Windows produced so far.
    pub fn windows_written(&self) -> u64 {
        self.windows_written
    }

    /// Write the stream header. Must precede `encode_chunk`.
    pub fn start(&mut self, out: &mut dyn OutputSink) -> Result<(), EncodeError> {
        self.writer.init(self.engine.dictionary_size())?;
        if !self.writer.verify_dictionary(self.engine.dictionary()) {
            return Err(EncodeError::NotAscii("dictionary"));
        }
        self.writer
            .write_header(out, self.options.format_extensions())?;
        self.started = true;
        self.bytes_in = 0;
        self.windows_written = 0;
        Ok(())
    }

    /// Encode `data` as the next target window.
    pub fn encode_chunk(&mut self, data: &[u8], out: &mut dyn OutputSink) -> Result<(), EncodeError> {
        if !self.started {
            log::error!("encode_chunk called before start");
            return Err(EncodeError::Usage("encode_chunk called before start"));
        }
        if !self.writer.verify_chunk(data) {
            return Err(EncodeError::NotAscii("target data"));
        }
        if self.options.checksum {
            self.writer.add_checksum(compute_adler32(data));
        }
        self.engine.encode(
            data,
            self.options.look_for_target_matches,
            out,
            &mut *self.writer,
        )?;
        self.bytes_in += data.len() as u64;
        if !data.is_empty() {
            self.windows_written += 1;
        }
        Ok(())
    }

    /// Close the stream. The session can be restarted with `start`.
    pub fn finish_encoding(&mut self, out: &mut dyn OutputSink) -> Result<(), EncodeError> {
        if !self.started {
            log::error!("finish_encoding called before start");
            return Err(EncodeError::Usage("finish_encoding called before start"));
        }
        self.writer.finish_encoding(out)?;
        self.started = false;
        log::debug!(
            "encoding finished: {} target bytes in {} windows",
            self.bytes_in,
            self.windows_written
        );
        Ok(())
    }
}

/// Convenience: encode an entire target as a single window.
pub fn encode(dictionary: &[u8], target: &[u8], options: EncoderOptions) -> Result<Vec<u8>, EncodeError> {
    let mut encoder = StreamingEncoder::new(dictionary, options)?;
    let mut delta = Vec::new();
    encoder.start(&mut delta)?;
    encoder.encode_chunk(target, &mut delta)?;
    encoder.finish_encoding(&mut delta)?;
    Ok(delta)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
