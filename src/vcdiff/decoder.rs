// VCDIFF decoder: window parsing, validation and reconstruction.
//
// `StreamingDecoder` accepts the delta in arbitrary chunks. A standard
// window is buffered until all of it (header plus sections) is available,
// then validated and executed into the target. An interleaved window is
// executed as far as its buffered bytes allow: completed instructions are
// handed to the caller and execution resumes at the first instruction that
// was cut short once more bytes arrive.
//
// Each window is checked before any of it is executed: the source segment
// must lie inside the dictionary (or the earlier target, for VCD_TARGET),
// the target window and running target file size must stay within the
// configured limits, and an interleaved window requires the extended
// format header. After execution all data and address bytes must have
// been consumed, the produced size must equal the declared size, and the
// optional Adler-32 must match.

use std::sync::LazyLock;

use thiserror::Error;

use super::address_cache::{AddressCache, AddressCacheError};
use super::code_table::{
    CodeTable, CodeTableError, InstructionType, SERIALIZED_CODE_TABLE_SIZE, default_code_table,
};
use super::header::{FILE_HEADER_SIZE, FileHeader, HdrIndicator, WinIndicator, WindowHeader};
use super::reader::CodeTableReader;

// ---------------------------------------------------------------------------
// Decoder error
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DecodeError {
    /// More input is needed.
    #[error("unexpected end of delta data")]
    EndOfData,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("checksum mismatch: expected {expected:#010X}, got {actual:#010X}")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("{what} of {size} bytes exceeds the limit of {limit} bytes")]
    LimitExceeded {
        what: &'static str,
        size: u64,
        limit: u64,
    },
    #[error("invalid code table: {0}")]
    CodeTable(#[from] CodeTableError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("decoder misuse: {0}")]
    Usage(&'static str),
}

impl From<AddressCacheError> for DecodeError {
    fn from(e: AddressCacheError) -> Self {
        match e {
            AddressCacheError::EndOfData => Self::EndOfData,
            other => Self::InvalidInput(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Default cap for both a single target window and the whole target.
pub const DEFAULT_MAX_TARGET_SIZE: usize = 1 << 26;

/// Delta bytes allowed per target byte of the window size limit. A
/// single-byte COPY with an explicit size and a five-byte address costs
/// seven.
const MAX_DELTA_EXPANSION: usize = 8;

/// Delta bytes allowed on top of the expansion, for headers and empty
/// windows.
const DELTA_WINDOW_SLACK: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderOptions {
    /// Accept windows whose source segment is earlier target data.
    pub allow_vcd_target: bool,
    pub max_target_file_size: usize,
    pub max_target_window_size: usize,
}

impl DecoderOptions {
    /// Largest header-plus-sections size accepted for one window. Bounds
    /// how much input is buffered before a window can be executed.
    pub fn max_window_delta_size(&self) -> usize {
        self.max_target_window_size
            .saturating_mul(MAX_DELTA_EXPANSION)
            .saturating_add(DELTA_WINDOW_SLACK)
    }
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            allow_vcd_target: false,
            max_target_file_size: DEFAULT_MAX_TARGET_SIZE,
            max_target_window_size: DEFAULT_MAX_TARGET_SIZE,
        }
    }
}

// ---------------------------------------------------------------------------
// Adler-32
// ---------------------------------------------------------------------------

/// Adler-32 of `data`, as carried in VCD_CHECKSUM windows.
pub fn compute_adler32(data: &[u8]) -> u32 {
    #[cfg(feature = "adler32")]
    {
        let mut hasher = simd_adler32::Adler32::new();
        hasher.write(data);
        hasher.finish()
    }
    #[cfg(not(feature = "adler32"))]
    {
        const MOD_ADLER: u32 = 65521;
        let mut a: u32 = 1;
        let mut b: u32 = 0;
        for &byte in data {
            a = (a + u32::from(byte)) % MOD_ADLER;
            b = (b + a) % MOD_ADLER;
        }
        (b << 16) | a
    }
}

// ---------------------------------------------------------------------------
// Streaming decoder
// ---------------------------------------------------------------------------

static DEFAULT_CODE_TABLE_BYTES: LazyLock<Vec<u8>> =
    LazyLock::new(|| default_code_table().to_bytes());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    FileHeader,
    CodeTable,
    Windows,
    Failed,
}

/// Source segment of one window, resolved against the dictionary or the
/// target decoded so far.
#[derive(Debug, Clone, Copy)]
enum Segment {
    None,
    Dictionary { start: usize, len: usize },
    Target { start: usize, len: usize },
}

impl Segment {
    fn len(self) -> usize {
        match self {
            Segment::None => 0,
            Segment::Dictionary { len, .. } | Segment::Target { len, .. } => len,
        }
    }
}

/// Read positions in the three sections. In an interleaved window data and
/// addresses are read from the instructions section.
struct SectionCursor<'a> {
    interleaved: bool,
    data: &'a [u8],
    data_pos: usize,
    inst: &'a [u8],
    inst_pos: usize,
    addr: &'a [u8],
    addr_pos: usize,
}

impl<'a> SectionCursor<'a> {
    fn data_stream(&mut self) -> (&'a [u8], &mut usize) {
        if self.interleaved {
            (self.inst, &mut self.inst_pos)
        } else {
            (self.data, &mut self.data_pos)
        }
    }

    fn addr_stream(&mut self) -> (&'a [u8], &mut usize) {
        if self.interleaved {
            (self.inst, &mut self.inst_pos)
        } else {
            (self.addr, &mut self.addr_pos)
        }
    }
}

/// An interleaved window whose tail has not arrived yet.
#[derive(Debug, Clone, Copy)]
struct PartialWindow {
    /// Offset of the window in `decoded_target`.
    window_start: usize,
    /// Next unread byte of the instructions section.
    inst_pos: usize,
    /// Window bytes already handed to the caller.
    emitted: usize,
}

/// A custom code table being read from the file header.
#[derive(Debug)]
struct PendingCodeTable {
    near_cache_size: u8,
    same_cache_size: u8,
    decoder: Box<StreamingDecoder<'static>>,
    table_bytes: Vec<u8>,
}

/// Incremental decoder for one delta stream against a fixed dictionary.
#[derive(Debug)]
pub struct StreamingDecoder<'d> {
    dictionary: &'d [u8],
    options: DecoderOptions,
    phase: Phase,
    file_header: Option<FileHeader>,
    unparsed: Vec<u8>,
    reader: CodeTableReader,
    address_cache: AddressCache,
    pending_code_table: Option<PendingCodeTable>,
    /// Current window's target, preceded by all earlier target data when
    /// VCD_TARGET is allowed.
    decoded_target: Vec<u8>,
    partial_window: Option<PartialWindow>,
    total_target: usize,
    planned_target_file_size: Option<usize>,
}

impl<'d> StreamingDecoder<'d> {
    pub fn new(dictionary: &'d [u8], options: DecoderOptions) -> Self {
        Self {
            dictionary,
            options,
            phase: Phase::Idle,
            file_header: None,
            unparsed: Vec::new(),
            reader: CodeTableReader::new(),
            address_cache: AddressCache::default(),
            pending_code_table: None,
            decoded_target: Vec::new(),
            partial_window: None,
            total_target: 0,
            planned_target_file_size: None,
        }
    }

    pub fn options(&self) -> &DecoderOptions {
        &self.options
    }

    /// Stop after exactly `size` target bytes; bytes past that point are
    /// left unparsed.
    pub fn set_planned_target_file_size(&mut self, size: usize) {
        self.planned_target_file_size = Some(size);
    }

    pub fn file_header(&self) -> Option<&FileHeader> {
        self.file_header.as_ref()
    }

    /// Target bytes produced so far.
    pub fn total_target_size(&self) -> usize {
        self.total_target
    }

    /// Begin a new stream, discarding any previous state.
    pub fn start(&mut self) {
        self.phase = Phase::FileHeader;
        self.file_header = None;
        self.unparsed.clear();
        self.reader = CodeTableReader::new();
        self.address_cache = AddressCache::default();
        self.pending_code_table = None;
        self.decoded_target.clear();
        self.partial_window = None;
        self.total_target = 0;
    }

    /// Feed the next piece of the delta, appending any completed target
    /// windows, and the decoded prefix of an interleaved window still in
    /// flight, to `output`.
    pub fn decode_chunk(&mut self, data: &[u8], output: &mut Vec<u8>) -> Result<(), DecodeError> {
        match self.phase {
            Phase::Idle => return Err(DecodeError::Usage("decode_chunk called before start")),
            Phase::Failed => {
                return Err(DecodeError::Usage(
                    "decoder failed earlier; call start to reset",
                ));
            }
            _ => {}
        }
        let mut buf = std::mem::take(&mut self.unparsed);
        buf.extend_from_slice(data);
        let mut pos = 0;
        match self.decode_buffered(&buf, &mut pos, output) {
            Ok(()) => {
                buf.drain(..pos);
                self.unparsed = buf;
                Ok(())
            }
            Err(e) => {
                log::error!("decoding failed: {e}");
                self.phase = Phase::Failed;
                Err(e)
            }
        }
    }

    /// Finish the stream. Fails if a partial header or window is pending.
    pub fn finish(&mut self) -> Result<(), DecodeError> {
        let complete = match self.phase {
            Phase::Idle => return Err(DecodeError::Usage("finish called before start")),
            Phase::Failed => {
                return Err(DecodeError::Usage(
                    "decoder failed earlier; call start to reset",
                ));
            }
            Phase::FileHeader => self.unparsed.is_empty(),
            Phase::CodeTable => false,
            Phase::Windows => self.unparsed.is_empty() || self.reached_planned_target_size(),
        };
        self.phase = Phase::Idle;
        if complete {
            Ok(())
        } else {
            let pending = self.unparsed.len();
            self.unparsed.clear();
            Err(DecodeError::InvalidInput(format!(
                "delta ended inside a header or window ({pending} bytes unparsed)"
            )))
        }
    }

    fn take_unparsed(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.unparsed)
    }

    fn reached_planned_target_size(&self) -> bool {
        self.planned_target_file_size
            .is_some_and(|planned| self.total_target >= planned)
    }

    fn decode_buffered(
        &mut self,
        buf: &[u8],
        pos: &mut usize,
        output: &mut Vec<u8>,
    ) -> Result<(), DecodeError> {
        loop {
            match self.phase {
                Phase::FileHeader => {
                    let header = match FileHeader::parse(&buf[*pos..]) {
                        Ok(header) => header,
                        Err(DecodeError::EndOfData) => return Ok(()),
                        Err(e) => return Err(e),
                    };
                    *pos += FILE_HEADER_SIZE;
                    self.phase = if header.indicator.contains(HdrIndicator::CODETABLE) {
                        Phase::CodeTable
                    } else {
                        Phase::Windows
                    };
                    self.file_header = Some(header);
                }
                Phase::CodeTable => {
                    if !self.read_custom_code_table(buf, pos)? {
                        return Ok(());
                    }
                    self.phase = Phase::Windows;
                }
                Phase::Windows => {
                    if *pos >= buf.len() || self.reached_planned_target_size() {
                        return Ok(());
                    }
                    match self.decode_window(&buf[*pos..], output) {
                        Ok(consumed) => *pos += consumed,
                        Err(DecodeError::EndOfData) => return Ok(()),
                        Err(e) => return Err(e),
                    }
                }
                Phase::Idle | Phase::Failed => {
                    return Err(DecodeError::Usage("decoder is not started"));
                }
            }
        }
    }

    /// Read near/same cache sizes and the embedded code table delta.
    /// Returns `false` while more input is needed.
    fn read_custom_code_table(&mut self, buf: &[u8], pos: &mut usize) -> Result<bool, DecodeError> {
        if self.pending_code_table.is_none() {
            if buf.len() - *pos < 2 {
                return Ok(false);
            }
            let near_cache_size = buf[*pos];
            let same_cache_size = buf[*pos + 1];
            *pos += 2;
            AddressCache::new(near_cache_size, same_cache_size).init()?;

            let mut decoder = StreamingDecoder::new(&DEFAULT_CODE_TABLE_BYTES, DecoderOptions::default());
            decoder.set_planned_target_file_size(SERIALIZED_CODE_TABLE_SIZE);
            decoder.start();
            self.pending_code_table = Some(PendingCodeTable {
                near_cache_size,
                same_cache_size,
                decoder: Box::new(decoder),
                table_bytes: Vec::with_capacity(SERIALIZED_CODE_TABLE_SIZE),
            });
        }

        let Some(pending) = self.pending_code_table.as_mut() else {
            return Ok(false);
        };
        let available = buf.len() - *pos;
        pending
            .decoder
            .decode_chunk(&buf[*pos..], &mut pending.table_bytes)?;
        if pending.table_bytes.len() < SERIALIZED_CODE_TABLE_SIZE {
            // The nested decoder has buffered everything it was given.
            *pos = buf.len();
            return Ok(false);
        }

        // Anything the nested decoder left unparsed belongs to us.
        let leftover = pending.decoder.take_unparsed().len().min(available);
        *pos = buf.len() - leftover;

        let near = pending.near_cache_size;
        let same = pending.same_cache_size;
        let table = CodeTable::from_bytes(&pending.table_bytes)?;
        self.pending_code_table = None;

        let max_mode = (near as usize + same as usize + 1) as u8;
        self.reader.use_code_table(table, max_mode)?;
        self.address_cache = AddressCache::new(near, same);
        log::debug!("custom code table installed (near {near}, same {same})");
        Ok(true)
    }

    /// Resolve and bounds-check the window's source segment. A VCD_TARGET
    /// segment indexes into the `prior_target` bytes decoded before this
    /// window.
    fn source_segment(
        &self,
        header: &WindowHeader,
        prior_target: usize,
    ) -> Result<Segment, DecodeError> {
        let (from_size, is_target) = if header.indicator.contains(WinIndicator::SOURCE) {
            (self.dictionary.len(), false)
        } else if header.indicator.contains(WinIndicator::TARGET) {
            if !self.options.allow_vcd_target {
                return Err(DecodeError::Unsupported(
                    "VCD_TARGET window; enable allow_vcd_target to accept it".into(),
                ));
            }
            (prior_target, true)
        } else {
            return Ok(Segment::None);
        };

        let len = header.source_segment_length as usize;
        let start = header.source_segment_position as usize;
        if start > from_size {
            return Err(DecodeError::InvalidInput(format!(
                "source segment position {start} beyond source size {from_size}"
            )));
        }
        if len > from_size {
            return Err(DecodeError::InvalidInput(format!(
                "source segment length {len} larger than source size {from_size}"
            )));
        }
        if start > from_size - len {
            return Err(DecodeError::InvalidInput(format!(
                "source segment end {} beyond source size {from_size}",
                start as u64 + len as u64
            )));
        }
        Ok(if is_target {
            Segment::Target { start, len }
        } else {
            Segment::Dictionary { start, len }
        })
    }

    /// Decode one window from the front of `data`. Returns the number of
    /// bytes consumed, or `EndOfData` if the window is not yet complete.
    fn decode_window(&mut self, data: &[u8], output: &mut Vec<u8>) -> Result<usize, DecodeError> {
        let (header, header_len) = WindowHeader::parse(data)?;
        let target_len = header.target_window_length as usize;

        if target_len > self.options.max_target_window_size {
            return Err(DecodeError::LimitExceeded {
                what: "target window",
                size: target_len as u64,
                limit: self.options.max_target_window_size as u64,
            });
        }
        let new_total = self.total_target + target_len;
        if let Some(planned) = self.planned_target_file_size
            && new_total > planned
        {
            return Err(DecodeError::InvalidInput(format!(
                "target window of {target_len} bytes runs past the planned target size {planned}"
            )));
        }
        if new_total > self.options.max_target_file_size {
            return Err(DecodeError::LimitExceeded {
                what: "target file",
                size: new_total as u64,
                limit: self.options.max_target_file_size as u64,
            });
        }

        let window_size = header.window_size(header_len);
        let delta_limit = self.options.max_window_delta_size();
        if window_size > delta_limit {
            return Err(DecodeError::LimitExceeded {
                what: "window delta encoding",
                size: window_size as u64,
                limit: delta_limit as u64,
            });
        }

        let resumed = self.partial_window.take();
        let prior_target = resumed.map_or(self.decoded_target.len(), |p| p.window_start);
        let segment = self.source_segment(&header, prior_target)?;

        let interleaved = header.data_length == 0
            && header.addresses_length == 0
            && header.instructions_length > 0;
        if interleaved && !self.file_header.is_some_and(|h| h.is_extended()) {
            return Err(DecodeError::InvalidInput(
                "interleaved sections require the extended format header".into(),
            ));
        }

        let complete = data.len() >= window_size;
        if !complete && !interleaved {
            return Err(DecodeError::EndOfData);
        }

        // Only an interleaved window is ever executed incomplete, and its
        // data and addresses sections are empty.
        let available = data.len().min(window_size);
        let data_end = header_len + header.data_length as usize;
        let inst_end = (data_end + header.instructions_length as usize).min(available);
        let mut cursor = SectionCursor {
            interleaved,
            data: &data[header_len..data_end],
            data_pos: 0,
            inst: &data[data_end..inst_end],
            inst_pos: 0,
            addr: &data[inst_end..available],
            addr_pos: 0,
        };

        let (window_start, emitted) = match resumed {
            Some(partial) => {
                cursor.inst_pos = partial.inst_pos;
                (partial.window_start, partial.emitted)
            }
            None => {
                if !self.options.allow_vcd_target {
                    self.decoded_target.clear();
                }
                self.reader.init();
                self.address_cache.init()?;
                self.decoded_target.reserve(target_len);
                (self.decoded_target.len(), 0)
            }
        };

        match self.execute_window(&mut cursor, segment, window_start, target_len) {
            Ok(()) | Err(DecodeError::EndOfData) if !complete => {
                let produced = self.decoded_target.len() - window_start;
                output.extend_from_slice(&self.decoded_target[window_start + emitted..]);
                self.partial_window = Some(PartialWindow {
                    window_start,
                    inst_pos: cursor.inst_pos,
                    emitted: produced,
                });
                return Err(DecodeError::EndOfData);
            }
            Err(DecodeError::EndOfData) => {
                return Err(DecodeError::InvalidInput(
                    "window sections end inside an instruction".into(),
                ));
            }
            Err(e) => return Err(e),
            Ok(()) => {}
        }

        if !interleaved {
            if cursor.data_pos != cursor.data.len() {
                return Err(DecodeError::InvalidInput(format!(
                    "{} unused bytes left in the data section",
                    cursor.data.len() - cursor.data_pos
                )));
            }
            if cursor.addr_pos != cursor.addr.len() {
                return Err(DecodeError::InvalidInput(format!(
                    "{} unused bytes left in the addresses section",
                    cursor.addr.len() - cursor.addr_pos
                )));
            }
        }
        let produced = self.decoded_target.len() - window_start;
        if produced != target_len {
            return Err(DecodeError::InvalidInput(format!(
                "window produced {produced} bytes but declares {target_len}"
            )));
        }
        let window = &self.decoded_target[window_start..];
        if let Some(expected) = header.checksum {
            let actual = compute_adler32(window);
            if actual != expected {
                return Err(DecodeError::ChecksumMismatch { expected, actual });
            }
        }

        output.extend_from_slice(&window[emitted..]);
        self.total_target = new_total;
        log::debug!(
            "decoded window: {target_len} target bytes from {window_size} delta bytes{}",
            if interleaved { " (interleaved)" } else { "" }
        );
        Ok(window_size)
    }

    /// Run the window's instructions until the instructions section is
    /// exhausted. An instruction whose size, data or address is cut short
    /// is rewound and reported as `EndOfData`.
    fn execute_window(
        &mut self,
        cursor: &mut SectionCursor<'_>,
        segment: Segment,
        window_start: usize,
        target_len: usize,
    ) -> Result<(), DecodeError> {
        let source_len = segment.len();
        let dictionary = self.dictionary;

        while let Some(instruction) = self
            .reader
            .next_instruction(cursor.inst, &mut cursor.inst_pos)?
        {
            let size = instruction.size;
            let produced = self.decoded_target.len() - window_start;
            if size > target_len - produced {
                return Err(DecodeError::InvalidInput(format!(
                    "{} of {size} bytes runs past the target window length {target_len}",
                    instruction.inst
                )));
            }

            match instruction.inst {
                InstructionType::Add => {
                    let (stream, pos) = cursor.data_stream();
                    let Some(bytes) = stream.get(*pos..*pos + size) else {
                        self.reader.unget_instruction(&mut cursor.inst_pos);
                        return Err(DecodeError::EndOfData);
                    };
                    self.decoded_target.extend_from_slice(bytes);
                    *pos += size;
                }
                InstructionType::Run => {
                    let (stream, pos) = cursor.data_stream();
                    let Some(&byte) = stream.get(*pos) else {
                        self.reader.unget_instruction(&mut cursor.inst_pos);
                        return Err(DecodeError::EndOfData);
                    };
                    *pos += 1;
                    let new_len = self.decoded_target.len() + size;
                    self.decoded_target.resize(new_len, byte);
                }
                InstructionType::Copy => {
                    let here = i32::try_from(source_len + produced).map_err(|_| {
                        DecodeError::InvalidInput("window address space exceeds 31 bits".into())
                    })?;
                    let (stream, pos) = cursor.addr_stream();
                    let address = match self.address_cache.decode_address(
                        here,
                        instruction.mode,
                        stream,
                        pos,
                    ) {
                        Ok(address) => address as usize,
                        Err(AddressCacheError::EndOfData) => {
                            self.reader.unget_instruction(&mut cursor.inst_pos);
                            return Err(DecodeError::EndOfData);
                        }
                        Err(e) => return Err(e.into()),
                    };
                    self.copy_bytes(dictionary, segment, window_start, address, size);
                }
                InstructionType::Noop => {
                    log::error!("instruction reader returned a NOOP");
                    return Err(DecodeError::InvalidInput(
                        "NOOP reached the instruction executor".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Append `size` bytes starting at `address` in the window's combined
    /// source + target address space. `address` is below `here`, so only
    /// already-produced bytes are read; a target copy may overlap its own
    /// output.
    fn copy_bytes(
        &mut self,
        dictionary: &[u8],
        segment: Segment,
        window_start: usize,
        address: usize,
        size: usize,
    ) {
        let mut remaining = size;
        let mut target_offset = 0;
        let source_len = segment.len();

        if address < source_len {
            let n = remaining.min(source_len - address);
            match segment {
                Segment::Dictionary { start, .. } => {
                    let from = start + address;
                    self.decoded_target
                        .extend_from_slice(&dictionary[from..from + n]);
                }
                Segment::Target { start, .. } => {
                    let from = start + address;
                    self.decoded_target.extend_from_within(from..from + n);
                }
                Segment::None => {}
            }
            remaining -= n;
        } else {
            target_offset = address - source_len;
        }
        if remaining == 0 {
            return;
        }

        let from = window_start + target_offset;
        if from + remaining <= self.decoded_target.len() {
            self.decoded_target
                .extend_from_within(from..from + remaining);
        } else {
            for i in 0..remaining {
                let byte = self.decoded_target[from + i];
                self.decoded_target.push(byte);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// High-level convenience: decode in memory
// ---------------------------------------------------------------------------

/// Decode a complete delta against `dictionary` with default options.
pub fn decode_memory(dictionary: &[u8], delta: &[u8]) -> Result<Vec<u8>, DecodeError> {
    decode_memory_with(dictionary, delta, DecoderOptions::default())
}

/// Decode a complete delta against `dictionary`.
pub fn decode_memory_with(
    dictionary: &[u8],
    delta: &[u8],
    options: DecoderOptions,
) -> Result<Vec<u8>, DecodeError> {
    let mut decoder = StreamingDecoder::new(dictionary, options);
    decoder.start();
    let mut output = Vec::new();
    decoder.decode_chunk(delta, &mut output)?;
    decoder.finish()?;
    Ok(output)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
