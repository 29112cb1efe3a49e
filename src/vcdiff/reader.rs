// Decoder-side instruction reader.
//
// Walks an instructions-and-sizes section one instruction at a time. A
// double opcode yields two instructions: the second is held as pending
// and returned by the following call before any new opcode is read.
// Opcodes whose first half is NOOP are skipped over to their second half.

use std::borrow::Cow;

use super::code_table::{CodeTable, InstructionType, VCD_NOOP, default_code_table};
use super::decoder::DecodeError;
use super::varint;

/// One instruction read from the stream. `size` is already resolved from
/// the table or from the trailing varint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedInstruction {
    pub inst: InstructionType,
    pub size: usize,
    pub mode: u8,
}

#[derive(Debug, Clone)]
pub struct CodeTableReader {
    code_table: Cow<'static, CodeTable>,
    pending_second: Option<u8>,
    last_start: Option<usize>,
    last_pending_second: Option<u8>,
}

impl Default for CodeTableReader {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeTableReader {
    /// Reader using the default code table.
    pub fn new() -> Self {
        Self {
            code_table: Cow::Borrowed(default_code_table()),
            pending_second: None,
            last_start: None,
            last_pending_second: None,
        }
    }

    /// Switch to a custom code table after validating it against
    /// `max_mode`.
    pub fn use_code_table(&mut self, table: CodeTable, max_mode: u8) -> Result<(), DecodeError> {
        table.validate(max_mode)?;
        self.code_table = Cow::Owned(table);
        Ok(())
    }

    /// Forget any pending half of a double opcode. Called at the start of
    /// each window.
    pub fn init(&mut self) {
        self.pending_second = None;
        self.last_start = None;
        self.last_pending_second = None;
    }

    /// Read the next instruction from `stream` starting at `*pos`.
    ///
    /// `Ok(None)` means the stream is exhausted with no pending half.
    /// A size varint cut short rewinds to the start of the instruction and
    /// returns `EndOfData`.
    pub fn next_instruction(
        &mut self,
        stream: &[u8],
        pos: &mut usize,
    ) -> Result<Option<DecodedInstruction>, DecodeError> {
        self.last_start = Some(*pos);
        self.last_pending_second = self.pending_second;

        let table = &*self.code_table;
        let (inst, table_size, mode) = loop {
            if let Some(opcode) = self.pending_second.take() {
                let op = opcode as usize;
                break (table.inst2[op], table.size2[op], table.mode2[op]);
            }
            let Some(&opcode) = stream.get(*pos) else {
                return Ok(None);
            };
            *pos += 1;
            let op = opcode as usize;
            if table.inst2[op] != VCD_NOOP {
                self.pending_second = Some(opcode);
            }
            if table.inst1[op] != VCD_NOOP {
                break (table.inst1[op], table.size1[op], table.mode1[op]);
            }
        };

        let size = if table_size == 0 {
            match varint::read_i32(stream, pos) {
                Ok(size) => size as usize,
                Err(varint::VarintError::EndOfData) => {
                    self.unget_instruction(pos);
                    return Err(DecodeError::EndOfData);
                }
                Err(varint::VarintError::Overflow) => {
                    return Err(DecodeError::InvalidInput(
                        "instruction size is not a valid variable-length integer".into(),
                    ));
                }
            }
        } else {
            table_size as usize
        };

        let inst = InstructionType::from_u8(inst).ok_or_else(|| {
            DecodeError::InvalidInput(format!("code table names unknown instruction {inst}"))
        })?;
        Ok(Some(DecodedInstruction { inst, size, mode }))
    }

    /// Rewind to the start of the most recently read instruction.
    pub fn unget_instruction(&mut self, pos: &mut usize) {
        if let Some(start) = self.last_start.take() {
            *pos = start;
            self.pending_second = self.last_pending_second.take();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
