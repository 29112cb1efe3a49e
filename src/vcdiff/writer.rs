// Instruction writers.
//
// The diff engine reports ADD / COPY / RUN decisions through the
// `CodeTableWriter` trait. Two implementations exist:
//
// - `VcdiffWriter` packs instructions into RFC 3284 windows using a code
//   table, its instruction map and an address cache. Each window is
//   assembled in three section buffers (or one, when interleaved) and
//   flushed by `output`.
// - `JsonWriter` renders the same decisions as a JSON array: ADD and RUN
//   become strings, COPY becomes an `[offset, size]` pair. Only 7-bit
//   ASCII input can be represented.

use std::borrow::Cow;

use thiserror::Error;

use super::address_cache::{
    AddressCache, AddressCacheError, DEFAULT_NEAR_CACHE_SIZE, DEFAULT_SAME_CACHE_SIZE,
};
use super::code_table::{CodeTable, CodeTableError, VCD_ADD, VCD_COPY, VCD_RUN, default_code_table};
use super::header::{
    FileHeader, FormatExtensions, HdrIndicator, VCDIFF_VERSION_EXTENDED, VCDIFF_VERSION_STANDARD,
    WinIndicator, WindowHeader,
};
use super::instruction_map::{InstructionMap, default_instruction_map};
use super::varint;

// ---------------------------------------------------------------------------
// Output sink
// ---------------------------------------------------------------------------

/// Growable byte destination for encoded output.
pub trait OutputSink {
    fn append(&mut self, bytes: &[u8]);
    fn push_back(&mut self, byte: u8);
    fn clear(&mut self);
    fn size(&self) -> usize;
    /// Capacity hint for `n` more bytes.
    fn reserve_additional(&mut self, n: usize);
}

impl OutputSink for Vec<u8> {
    #[inline]
    fn append(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }

    #[inline]
    fn push_back(&mut self, byte: u8) {
        self.push(byte);
    }

    fn clear(&mut self) {
        Vec::clear(self);
    }

    #[inline]
    fn size(&self) -> usize {
        self.len()
    }

    fn reserve_additional(&mut self, n: usize) {
        self.reserve(n);
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("instruction writer used before init")]
    NotInitialized,
    #[error("instruction size {0} exceeds the 31-bit limit")]
    SizeTooLarge(usize),
    #[error("no opcode encodes instruction {inst} mode {mode}, even with size 0")]
    NoOpcode { inst: u8, mode: u8 },
    #[error(transparent)]
    AddressCache(#[from] AddressCacheError),
    #[error(transparent)]
    CodeTable(#[from] CodeTableError),
    #[error("failed to encode custom code table: {0}")]
    EmbeddedCodeTable(String),
    #[error("JSON output: {0}")]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Writer interface
// ---------------------------------------------------------------------------

/// Destination for the diff engine's instruction decisions.
pub trait CodeTableWriter {
    /// Prepare for a session against a dictionary of `dictionary_size`
    /// bytes. May be called again to reset.
    fn init(&mut self, dictionary_size: usize) -> Result<(), WriterError>;

    /// Write the stream header.
    fn write_header(
        &mut self,
        out: &mut dyn OutputSink,
        extensions: FormatExtensions,
    ) -> Result<(), WriterError>;

    fn add(&mut self, data: &[u8]) -> Result<(), WriterError>;

    /// Copy `size` bytes from `offset` in the dictionary + target space.
    fn copy(&mut self, offset: i32, size: usize) -> Result<(), WriterError>;

    fn run(&mut self, size: usize, byte: u8) -> Result<(), WriterError>;

    /// Attach an Adler-32 of the current window's target bytes.
    fn add_checksum(&mut self, checksum: u32);

    /// Flush the current window to `out` and reset per-window state.
    fn output(&mut self, out: &mut dyn OutputSink) -> Result<(), WriterError>;

    /// Called once after the last window.
    fn finish_encoding(&mut self, _out: &mut dyn OutputSink) -> Result<(), WriterError> {
        Ok(())
    }

    /// Target bytes described by the current window so far.
    fn target_length(&self) -> usize;

    /// Whether this writer can represent output against `dictionary`.
    fn verify_dictionary(&self, _dictionary: &[u8]) -> bool {
        true
    }

    /// Whether this writer can represent `chunk` of target data.
    fn verify_chunk(&self, _chunk: &[u8]) -> bool {
        true
    }
}

impl<W: CodeTableWriter + ?Sized> CodeTableWriter for Box<W> {
    fn init(&mut self, dictionary_size: usize) -> Result<(), WriterError> {
        (**self).init(dictionary_size)
    }

    fn write_header(
        &mut self,
        out: &mut dyn OutputSink,
        extensions: FormatExtensions,
    ) -> Result<(), WriterError> {
        (**self).write_header(out, extensions)
    }

    fn add(&mut self, data: &[u8]) -> Result<(), WriterError> {
        (**self).add(data)
    }

    fn copy(&mut self, offset: i32, size: usize) -> Result<(), WriterError> {
        (**self).copy(offset, size)
    }

    fn run(&mut self, size: usize, byte: u8) -> Result<(), WriterError> {
        (**self).run(size, byte)
    }

    fn add_checksum(&mut self, checksum: u32) {
        (**self).add_checksum(checksum)
    }

    fn output(&mut self, out: &mut dyn OutputSink) -> Result<(), WriterError> {
        (**self).output(out)
    }

    fn finish_encoding(&mut self, out: &mut dyn OutputSink) -> Result<(), WriterError> {
        (**self).finish_encoding(out)
    }

    fn target_length(&self) -> usize {
        (**self).target_length()
    }

    fn verify_dictionary(&self, dictionary: &[u8]) -> bool {
        (**self).verify_dictionary(dictionary)
    }

    fn verify_chunk(&self, chunk: &[u8]) -> bool {
        (**self).verify_chunk(chunk)
    }
}

fn checked_size(size: usize) -> Result<i32, WriterError> {
    i32::try_from(size).map_err(|_| {
        log::error!("instruction size {size} does not fit in 31 bits");
        WriterError::SizeTooLarge(size)
    })
}

// ---------------------------------------------------------------------------
// Binary VCDIFF writer
// ---------------------------------------------------------------------------

/// Packs instructions into VCDIFF windows.
#[derive(Debug, Clone)]
pub struct VcdiffWriter {
    code_table: Cow<'static, CodeTable>,
    instruction_map: Option<Cow<'static, InstructionMap>>,
    address_cache: AddressCache,
    max_mode: u8,
    interleaved: bool,
    dictionary_size: usize,
    target_length: usize,
    data: Vec<u8>,
    instructions: Vec<u8>,
    addresses: Vec<u8>,
    /// Position of the last opcode in `instructions` that may still be
    /// merged with the next instruction into a double opcode.
    last_opcode_index: Option<usize>,
    checksum: Option<u32>,
}

impl VcdiffWriter {
    /// Writer using the default code table.
    pub fn new(interleaved: bool) -> Self {
        Self::build(
            Cow::Borrowed(default_code_table()),
            DEFAULT_NEAR_CACHE_SIZE,
            DEFAULT_SAME_CACHE_SIZE,
            interleaved,
        )
    }

    /// Writer using a custom code table and cache sizes. The table is
    /// validated by `init`.
    pub fn with_code_table(
        code_table: CodeTable,
        near_cache_size: u8,
        same_cache_size: u8,
        interleaved: bool,
    ) -> Self {
        Self::build(Cow::Owned(code_table), near_cache_size, same_cache_size, interleaved)
    }

    fn build(
        code_table: Cow<'static, CodeTable>,
        near_cache_size: u8,
        same_cache_size: u8,
        interleaved: bool,
    ) -> Self {
        let max_mode = (near_cache_size as usize + same_cache_size as usize + 1).min(u8::MAX as usize);
        Self {
            code_table,
            instruction_map: None,
            address_cache: AddressCache::new(near_cache_size, same_cache_size),
            max_mode: max_mode as u8,
            interleaved,
            dictionary_size: 0,
            target_length: 0,
            data: Vec::new(),
            instructions: Vec::new(),
            addresses: Vec::new(),
            last_opcode_index: None,
            checksum: None,
        }
    }

    pub fn is_interleaved(&self) -> bool {
        self.interleaved
    }

    fn uses_default_table(&self) -> bool {
        self.address_cache.near_cache_size() == DEFAULT_NEAR_CACHE_SIZE
            && self.address_cache.same_cache_size() == DEFAULT_SAME_CACHE_SIZE
            && self.code_table.is_default()
    }

    /// Section that receives ADD/RUN data.
    #[inline]
    fn data_section(&mut self) -> &mut Vec<u8> {
        if self.interleaved {
            &mut self.instructions
        } else {
            &mut self.data
        }
    }

    /// Section that receives COPY addresses.
    #[inline]
    fn address_section(&mut self) -> &mut Vec<u8> {
        if self.interleaved {
            &mut self.instructions
        } else {
            &mut self.addresses
        }
    }

    fn reset_window(&mut self) -> Result<(), WriterError> {
        self.data.clear();
        self.instructions.clear();
        self.addresses.clear();
        self.target_length = 0;
        self.last_opcode_index = None;
        self.checksum = None;
        self.address_cache.init()?;
        Ok(())
    }

    /// Append one instruction to the instructions section, merging it into
    /// the previous opcode when the code table has a matching double.
    fn encode_instruction(&mut self, inst: u8, size: usize, mode: u8) -> Result<(), WriterError> {
        let map = self
            .instruction_map
            .as_deref()
            .ok_or(WriterError::NotInitialized)?;

        if let Some(last_index) = self.last_opcode_index {
            let last_opcode = self.instructions[last_index];
            if inst == VCD_ADD && self.code_table.inst1[last_opcode as usize] == VCD_ADD {
                log::warn!("two ADD instructions in a row");
            }
            if size <= u8::MAX as usize
                && let Some(compound) = map.lookup_second_opcode(last_opcode, inst, size, mode)
            {
                self.instructions[last_index] = compound;
                self.last_opcode_index = None;
                return Ok(());
            }
            if let Some(compound) = map.lookup_second_opcode(last_opcode, inst, 0, mode) {
                self.instructions[last_index] = compound;
                self.last_opcode_index = None;
                varint::write_i32(&mut self.instructions, checked_size(size)?);
                return Ok(());
            }
        }

        if size <= u8::MAX as usize
            && let Some(opcode) = map.lookup_first_opcode(inst, size, mode)
        {
            self.instructions.push(opcode);
            self.last_opcode_index = Some(self.instructions.len() - 1);
            return Ok(());
        }

        let Some(opcode) = map.lookup_first_opcode(inst, 0, mode) else {
            log::error!("no opcode for instruction {inst} mode {mode} with size 0");
            return Err(WriterError::NoOpcode { inst, mode });
        };
        self.instructions.push(opcode);
        self.last_opcode_index = Some(self.instructions.len() - 1);
        varint::write_i32(&mut self.instructions, checked_size(size)?);
        Ok(())
    }

    /// Encode this writer's custom code table as a VCDIFF delta against the
    /// default table.
    fn encode_code_table(&self) -> Result<Vec<u8>, WriterError> {
        use crate::engine::DiffEngine;

        let dictionary = default_code_table().to_bytes();
        let table = self.code_table.to_bytes();
        let engine = DiffEngine::new(&dictionary)
            .map_err(|e| WriterError::EmbeddedCodeTable(e.to_string()))?;
        let mut nested = VcdiffWriter::new(false);
        nested.init(dictionary.len())?;
        let mut embedded = Vec::new();
        nested.write_header(&mut embedded, FormatExtensions::empty())?;
        engine
            .encode(&table, false, &mut embedded, &mut nested)
            .map_err(|e| WriterError::EmbeddedCodeTable(e.to_string()))?;
        Ok(embedded)
    }
}

impl CodeTableWriter for VcdiffWriter {
    fn init(&mut self, dictionary_size: usize) -> Result<(), WriterError> {
        if self.instruction_map.is_none() {
            let map = if self.uses_default_table() {
                Cow::Borrowed(default_instruction_map())
            } else {
                self.code_table.validate(self.max_mode)?;
                Cow::Owned(InstructionMap::new(&self.code_table, self.max_mode))
            };
            self.instruction_map = Some(map);
        }
        self.dictionary_size = dictionary_size;
        self.reset_window()
    }

    fn write_header(
        &mut self,
        out: &mut dyn OutputSink,
        extensions: FormatExtensions,
    ) -> Result<(), WriterError> {
        let version = if extensions.needs_extended_version() {
            VCDIFF_VERSION_EXTENDED
        } else {
            VCDIFF_VERSION_STANDARD
        };
        let custom = !self.uses_default_table();
        let header = FileHeader {
            version,
            indicator: if custom {
                HdrIndicator::CODETABLE
            } else {
                HdrIndicator::empty()
            },
        };
        let mut bytes = Vec::new();
        header.encode(&mut bytes);
        if custom {
            bytes.push(self.address_cache.near_cache_size());
            bytes.push(self.address_cache.same_cache_size());
            bytes.extend_from_slice(&self.encode_code_table()?);
        }
        out.append(&bytes);
        Ok(())
    }

    fn add(&mut self, data: &[u8]) -> Result<(), WriterError> {
        if data.is_empty() {
            return Ok(());
        }
        self.encode_instruction(VCD_ADD, data.len(), 0)?;
        self.data_section().extend_from_slice(data);
        self.target_length += data.len();
        Ok(())
    }

    fn copy(&mut self, offset: i32, size: usize) -> Result<(), WriterError> {
        if self.instruction_map.is_none() {
            log::error!("copy called before init");
            return Err(WriterError::NotInitialized);
        }
        let here = checked_size(self.dictionary_size + self.target_length)?;
        let (mode, encoded) = self.address_cache.encode_address(offset, here)?;
        self.encode_instruction(VCD_COPY, size, mode)?;
        encoded.write_to(self.address_section());
        self.target_length += size;
        Ok(())
    }

    fn run(&mut self, size: usize, byte: u8) -> Result<(), WriterError> {
        self.encode_instruction(VCD_RUN, size, 0)?;
        self.data_section().push(byte);
        self.target_length += size;
        Ok(())
    }

    fn add_checksum(&mut self, checksum: u32) {
        self.checksum = Some(checksum);
    }

    fn output(&mut self, out: &mut dyn OutputSink) -> Result<(), WriterError> {
        if self.instructions.is_empty() {
            log::warn!("empty input; no delta window produced");
        } else {
            let indicator = if self.dictionary_size > 0 {
                WinIndicator::SOURCE
            } else {
                WinIndicator::empty()
            };
            let header = WindowHeader::for_sections(
                indicator,
                checked_size(self.dictionary_size)?,
                checked_size(self.target_length)?,
                checked_size(self.data.len())?,
                checked_size(self.instructions.len())?,
                checked_size(self.addresses.len())?,
                self.checksum,
            );
            let mut head = Vec::with_capacity(32);
            header.encode(&mut head);
            out.reserve_additional(
                head.len() + self.data.len() + self.instructions.len() + self.addresses.len(),
            );
            out.append(&head);
            out.append(&self.data);
            out.append(&self.instructions);
            out.append(&self.addresses);
            log::debug!(
                "window: target {} bytes, data {}, instructions {}, addresses {}",
                self.target_length,
                self.data.len(),
                self.instructions.len(),
                self.addresses.len()
            );
        }
        self.reset_window()
    }

    fn target_length(&self) -> usize {
        self.target_length
    }
}

// ---------------------------------------------------------------------------
// JSON writer
// ---------------------------------------------------------------------------

/// Renders instructions as a JSON array.
#[derive(Debug, Clone, Default)]
pub struct JsonWriter {
    /// Elements of the current window, already serialized.
    pending: Vec<String>,
    opened: bool,
    wrote_element: bool,
    target_length: usize,
}

impl JsonWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_string(&mut self, text: &[u8]) -> Result<(), WriterError> {
        let text = String::from_utf8_lossy(text);
        self.pending.push(serde_json::to_string(text.as_ref())?);
        Ok(())
    }
}

impl CodeTableWriter for JsonWriter {
    fn init(&mut self, _dictionary_size: usize) -> Result<(), WriterError> {
        self.pending.clear();
        self.target_length = 0;
        Ok(())
    }

    fn write_header(
        &mut self,
        _out: &mut dyn OutputSink,
        _extensions: FormatExtensions,
    ) -> Result<(), WriterError> {
        Ok(())
    }

    fn add(&mut self, data: &[u8]) -> Result<(), WriterError> {
        if data.is_empty() {
            return Ok(());
        }
        self.push_string(data)?;
        self.target_length += data.len();
        Ok(())
    }

    fn copy(&mut self, offset: i32, size: usize) -> Result<(), WriterError> {
        self.pending.push(serde_json::to_string(&(offset, size))?);
        self.target_length += size;
        Ok(())
    }

    fn run(&mut self, size: usize, byte: u8) -> Result<(), WriterError> {
        self.push_string(&vec![byte; size])?;
        self.target_length += size;
        Ok(())
    }

    fn add_checksum(&mut self, _checksum: u32) {}

    fn output(&mut self, out: &mut dyn OutputSink) -> Result<(), WriterError> {
        if !self.opened {
            out.push_back(b'[');
            self.opened = true;
        }
        for element in self.pending.drain(..) {
            if self.wrote_element {
                out.push_back(b',');
            }
            out.append(element.as_bytes());
            self.wrote_element = true;
        }
        self.target_length = 0;
        Ok(())
    }

    fn finish_encoding(&mut self, out: &mut dyn OutputSink) -> Result<(), WriterError> {
        if !self.opened {
            out.push_back(b'[');
            self.opened = true;
        }
        out.push_back(b']');
        self.opened = false;
        self.wrote_element = false;
        Ok(())
    }

    fn target_length(&self) -> usize {
        self.target_length
    }

    fn verify_dictionary(&self, dictionary: &[u8]) -> bool {
        let ok = dictionary.is_ascii();
        if !ok {
            log::warn!("JSON output requires a 7-bit ASCII dictionary");
        }
        ok
    }

    fn verify_chunk(&self, chunk: &[u8]) -> bool {
        let ok = chunk.is_ascii();
        if !ok {
            log::warn!("JSON output requires 7-bit ASCII target data");
        }
        ok
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
