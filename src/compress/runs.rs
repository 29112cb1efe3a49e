// RUN splitting.
//
// The diff engine only produces ADD and COPY. `RunSplitter` sits between
// the engine and the real writer and rewrites long stretches of one
// repeated byte inside ADD payloads as RUN instructions. Everything else
// is forwarded unchanged.

use crate::vcdiff::header::FormatExtensions;
use crate::vcdiff::writer::{CodeTableWriter, OutputSink, WriterError};

/// Shortest repeat turned into a RUN. A RUN costs an opcode, a size and a
/// data byte, so shorter repeats are cheaper as literal bytes.
pub const MIN_RUN_LENGTH: usize = 8;

#[derive(Debug, Clone)]
pub struct RunSplitter<W> {
    inner: W,
    min_run: usize,
}

impl<W: CodeTableWriter> RunSplitter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_min_run(inner, MIN_RUN_LENGTH)
    }

    /// `min_run` is clamped to at least 2.
    pub fn with_min_run(inner: W, min_run: usize) -> Self {
        Self {
            inner,
            min_run: min_run.max(2),
        }
    }

    pub fn inner(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Length of the run of `data[0]` at the front of `data`.
fn run_length(data: &[u8]) -> usize {
    match data.first() {
        Some(&first) => data.iter().take_while(|&&b| b == first).count(),
        None => 0,
    }
}

impl<W: CodeTableWriter> CodeTableWriter for RunSplitter<W> {
    fn init(&mut self, dictionary_size: usize) -> Result<(), WriterError> {
        self.inner.init(dictionary_size)
    }

    fn write_header(
        &mut self,
        out: &mut dyn OutputSink,
        extensions: FormatExtensions,
    ) -> Result<(), WriterError> {
        self.inner.write_header(out, extensions)
    }

    fn add(&mut self, data: &[u8]) -> Result<(), WriterError> {
        let mut literal_start = 0;
        let mut pos = 0;
        while pos < data.len() {
            let run = run_length(&data[pos..]);
            if run >= self.min_run {
                if literal_start < pos {
                    self.inner.add(&data[literal_start..pos])?;
                }
                self.inner.run(run, data[pos])?;
                pos += run;
                literal_start = pos;
            } else {
                pos += run;
            }
        }
        if literal_start < data.len() {
            self.inner.add(&data[literal_start..])?;
        }
        Ok(())
    }

    fn copy(&mut self, offset: i32, size: usize) -> Result<(), WriterError> {
        self.inner.copy(offset, size)
    }

    fn run(&mut self, size: usize, byte: u8) -> Result<(), WriterError> {
        self.inner.run(size, byte)
    }

    fn add_checksum(&mut self, checksum: u32) {
        self.inner.add_checksum(checksum);
    }

    fn output(&mut self, out: &mut dyn OutputSink) -> Result<(), WriterError> {
        self.inner.output(out)
    }

    fn finish_encoding(&mut self, out: &mut dyn OutputSink) -> Result<(), WriterError> {
        self.inner.finish_encoding(out)
    }

    fn target_length(&self) -> usize {
        self.inner.target_length()
    }

    fn verify_dictionary(&self, dictionary: &[u8]) -> bool {
        self.inner.verify_dictionary(dictionary)
    }

    fn verify_chunk(&self, chunk: &[u8]) -> bool {
        self.inner.verify_chunk(chunk)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
