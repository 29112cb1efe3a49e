// VCDIFF code table (RFC 3284, Section 5.4 and 5.6).
//
// Each of the 256 opcodes expands to one or two (instruction, size, mode)
// triples, stored as six parallel byte arrays. A size of 0 means the real
// size follows the opcode as a variable-length integer. The second
// instruction is absent when `inst2` is NOOP.
//
// On the wire a custom table is the six arrays back to back, in the order
// inst1, inst2, size1, size2, mode1, mode2 (1536 bytes).

use std::sync::LazyLock;

use thiserror::Error;

use super::address_cache::{DEFAULT_NEAR_CACHE_SIZE, DEFAULT_SAME_CACHE_SIZE};

// ---------------------------------------------------------------------------
// Instruction types
// ---------------------------------------------------------------------------

pub const VCD_NOOP: u8 = 0;
pub const VCD_ADD: u8 = 1;
pub const VCD_RUN: u8 = 2;
pub const VCD_COPY: u8 = 3;
pub const VCD_LAST_INSTRUCTION_TYPE: u8 = VCD_COPY;

/// Number of opcodes.
pub const CODE_TABLE_SIZE: usize = 256;

/// Serialized size of a code table.
pub const SERIALIZED_CODE_TABLE_SIZE: usize = 6 * CODE_TABLE_SIZE;

/// Highest COPY mode used by the default table (SELF, HERE, 4 NEAR, 3 SAME).
pub const DEFAULT_MAX_MODE: u8 = DEFAULT_NEAR_CACHE_SIZE + DEFAULT_SAME_CACHE_SIZE + 1;

/// Logical instruction type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InstructionType {
    Noop = VCD_NOOP,
    Add = VCD_ADD,
    Run = VCD_RUN,
    Copy = VCD_COPY,
}

impl InstructionType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            VCD_NOOP => Some(Self::Noop),
            VCD_ADD => Some(Self::Add),
            VCD_RUN => Some(Self::Run),
            VCD_COPY => Some(Self::Copy),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Noop => "NOOP",
            Self::Add => "ADD",
            Self::Run => "RUN",
            Self::Copy => "COPY",
        }
    }
}

impl std::fmt::Display for InstructionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Which half of an opcode a validation problem was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    First,
    Second,
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Slot::First => "first",
            Slot::Second => "second",
        })
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// One problem found by `CodeTable::validate`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeTableViolation {
    #[error("opcode {opcode}: {slot} instruction type {inst} is out of range")]
    InvalidInstruction { opcode: u8, slot: Slot, inst: u8 },
    #[error("opcode {opcode}: {slot} mode {mode} exceeds maximum {max_mode}")]
    ModeTooLarge {
        opcode: u8,
        slot: Slot,
        mode: u8,
        max_mode: u8,
    },
    #[error("opcode {opcode}: {slot} instruction is NOOP with non-zero size {size}")]
    NoopWithSize { opcode: u8, slot: Slot, size: u8 },
    #[error("opcode {opcode}: {slot} instruction {inst} has non-zero mode {mode}")]
    ModeOnNonCopy {
        opcode: u8,
        slot: Slot,
        inst: u8,
        mode: u8,
    },
    #[error("no size-0 single-instruction opcode for {inst} mode {mode}")]
    MissingSizeZeroOpcode { inst: InstructionType, mode: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeTableError {
    #[error("invalid code table ({} problem(s)); first: {}", .0.len(), .0[0])]
    Invalid(Vec<CodeTableViolation>),
    #[error("serialized code table must be {SERIALIZED_CODE_TABLE_SIZE} bytes, got {0}")]
    WrongLength(usize),
}

// ---------------------------------------------------------------------------
// CodeTable
// ---------------------------------------------------------------------------

/// A 256-opcode instruction code table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeTable {
    pub inst1: [u8; CODE_TABLE_SIZE],
    pub inst2: [u8; CODE_TABLE_SIZE],
    pub size1: [u8; CODE_TABLE_SIZE],
    pub size2: [u8; CODE_TABLE_SIZE],
    pub mode1: [u8; CODE_TABLE_SIZE],
    pub mode2: [u8; CODE_TABLE_SIZE],
}

static DEFAULT_CODE_TABLE: LazyLock<CodeTable> = LazyLock::new(CodeTable::build_rfc_default);

/// The RFC 3284 default code table.
pub fn default_code_table() -> &'static CodeTable {
    &DEFAULT_CODE_TABLE
}

impl CodeTable {
    /// A table of 256 NOOP/NOOP opcodes.
    pub fn empty() -> Self {
        Self {
            inst1: [VCD_NOOP; CODE_TABLE_SIZE],
            inst2: [VCD_NOOP; CODE_TABLE_SIZE],
            size1: [0; CODE_TABLE_SIZE],
            size2: [0; CODE_TABLE_SIZE],
            mode1: [0; CODE_TABLE_SIZE],
            mode2: [0; CODE_TABLE_SIZE],
        }
    }

    /// Build the default table of RFC 3284 section 5.6.
    fn build_rfc_default() -> Self {
        const ADD_SIZES: u8 = 17;
        const COPY_MIN: u8 = 4;
        const COPY_SIZES: u8 = 15;
        const NEAR_MODES_END: u8 = 2 + DEFAULT_NEAR_CACHE_SIZE;

        let mut t = Self::empty();
        let mut op = 0usize;
        let set = |t: &mut Self, op: &mut usize, first: (u8, u8, u8), second: (u8, u8, u8)| {
            t.inst1[*op] = first.0;
            t.size1[*op] = first.1;
            t.mode1[*op] = first.2;
            t.inst2[*op] = second.0;
            t.size2[*op] = second.1;
            t.mode2[*op] = second.2;
            *op += 1;
        };
        let none = (VCD_NOOP, 0, 0);

        // 0: RUN, size follows.
        set(&mut t, &mut op, (VCD_RUN, 0, 0), none);
        // 1..18: ADD sizes 0, 1..17.
        for size in 0..=ADD_SIZES {
            set(&mut t, &mut op, (VCD_ADD, size, 0), none);
        }
        // 19..162: COPY per mode: size 0 then 4..18.
        for mode in 0..=DEFAULT_MAX_MODE {
            set(&mut t, &mut op, (VCD_COPY, 0, mode), none);
            for size in COPY_MIN..COPY_MIN + COPY_SIZES {
                set(&mut t, &mut op, (VCD_COPY, size, mode), none);
            }
        }
        // 163..246: ADD(1..4) + COPY; sizes 4..6 for SELF/HERE/NEAR, 4 for SAME.
        for mode in 0..=DEFAULT_MAX_MODE {
            let copy_max = if mode < NEAR_MODES_END { 6 } else { 4 };
            for add_size in 1..=4 {
                for copy_size in COPY_MIN..=copy_max {
                    set(
                        &mut t,
                        &mut op,
                        (VCD_ADD, add_size, 0),
                        (VCD_COPY, copy_size, mode),
                    );
                }
            }
        }
        // 247..255: COPY(4) + ADD(1) for every mode.
        for mode in 0..=DEFAULT_MAX_MODE {
            set(&mut t, &mut op, (VCD_COPY, COPY_MIN, mode), (VCD_ADD, 1, 0));
        }
        debug_assert_eq!(op, CODE_TABLE_SIZE);
        t
    }

    /// Whether this is byte-for-byte the default table.
    pub fn is_default(&self) -> bool {
        self == default_code_table()
    }

    /// Serialize to the 1536-byte wire layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SERIALIZED_CODE_TABLE_SIZE);
        for array in [
            &self.inst1,
            &self.inst2,
            &self.size1,
            &self.size2,
            &self.mode1,
            &self.mode2,
        ] {
            out.extend_from_slice(array);
        }
        out
    }

    /// Parse the 1536-byte wire layout. The result is not validated.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodeTableError> {
        if bytes.len() != SERIALIZED_CODE_TABLE_SIZE {
            return Err(CodeTableError::WrongLength(bytes.len()));
        }
        let mut t = Self::empty();
        for (i, array) in [
            &mut t.inst1,
            &mut t.inst2,
            &mut t.size1,
            &mut t.size2,
            &mut t.mode1,
            &mut t.mode2,
        ]
        .into_iter()
        .enumerate()
        {
            array.copy_from_slice(&bytes[i * CODE_TABLE_SIZE..(i + 1) * CODE_TABLE_SIZE]);
        }
        Ok(t)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    fn validate_opcode(
        opcode: u8,
        slot: Slot,
        inst: u8,
        size: u8,
        mode: u8,
        max_mode: u8,
        violations: &mut Vec<CodeTableViolation>,
    ) {
        if inst > VCD_LAST_INSTRUCTION_TYPE {
            violations.push(CodeTableViolation::InvalidInstruction { opcode, slot, inst });
        }
        if mode > max_mode {
            violations.push(CodeTableViolation::ModeTooLarge {
                opcode,
                slot,
                mode,
                max_mode,
            });
        }
        if inst == VCD_NOOP && size != 0 {
            violations.push(CodeTableViolation::NoopWithSize { opcode, slot, size });
        }
        if inst != VCD_COPY && mode != 0 {
            violations.push(CodeTableViolation::ModeOnNonCopy {
                opcode,
                slot,
                inst,
                mode,
            });
        }
    }

    /// Check every opcode against `max_mode`, and that every instruction
    /// type and COPY mode has a size-0 single-instruction opcode. All
    /// problems are reported, not just the first.
    pub fn validate(&self, max_mode: u8) -> Result<(), CodeTableError> {
        let mut violations = Vec::new();
        // Index: ADD=1, RUN=2, COPY mode m = 3 + m.
        let combos = VCD_LAST_INSTRUCTION_TYPE as usize + max_mode as usize + 1;
        let mut has_size_zero = vec![false; combos];

        for opcode in 0..CODE_TABLE_SIZE {
            let op = opcode as u8;
            Self::validate_opcode(
                op,
                Slot::First,
                self.inst1[opcode],
                self.size1[opcode],
                self.mode1[opcode],
                max_mode,
                &mut violations,
            );
            Self::validate_opcode(
                op,
                Slot::Second,
                self.inst2[opcode],
                self.size2[opcode],
                self.mode2[opcode],
                max_mode,
                &mut violations,
            );
            let index = self.inst1[opcode] as usize + self.mode1[opcode] as usize;
            if self.size1[opcode] == 0 && self.inst2[opcode] == VCD_NOOP && index < combos {
                has_size_zero[index] = true;
            }
        }

        for (index, &found) in has_size_zero.iter().enumerate().skip(1) {
            if !found {
                let (inst, mode) = if index >= VCD_COPY as usize {
                    (InstructionType::Copy, (index - VCD_COPY as usize) as u8)
                } else if index == VCD_ADD as usize {
                    (InstructionType::Add, 0)
                } else {
                    (InstructionType::Run, 0)
                };
                violations.push(CodeTableViolation::MissingSizeZeroOpcode { inst, mode });
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            for v in &violations {
                log::warn!("code table: {v}");
            }
            Err(CodeTableError::Invalid(violations))
        }
    }
}

impl Default for CodeTable {
    fn default() -> Self {
        default_code_table().clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn violations(table: &CodeTable, max_mode: u8) -> Vec<CodeTableViolation> {
        match table.validate(max_mode) {
            Err(CodeTableError::Invalid(v)) => v,
            other => panic!("expected invalid table, got {other:?}"),
        }
    }

    #[test]
    fn default_table_validates() {
        assert_eq!(default_code_table().validate(DEFAULT_MAX_MODE), Ok(()));
        assert!(CodeTable::default().is_default());
    }

    #[test]
    fn default_table_matches_rfc_layout() {
        let t = default_code_table();
        // 0: RUN 0
        assert_eq!((t.inst1[0], t.size1[0], t.inst2[0]), (VCD_RUN, 0, VCD_NOOP));
        // 1: ADD 0, 18: ADD 17
        assert_eq!((t.inst1[1], t.size1[1]), (VCD_ADD, 0));
        assert_eq!((t.inst1[18], t.size1[18]), (VCD_ADD, 17));
        // 19: COPY 0 mode 0, 20: COPY 4 mode 0, 34: COPY 18 mode 0
        assert_eq!((t.inst1[19], t.size1[19], t.mode1[19]), (VCD_COPY, 0, 0));
        assert_eq!((t.inst1[20], t.size1[20], t.mode1[20]), (VCD_COPY, 4, 0));
        assert_eq!((t.inst1[34], t.size1[34], t.mode1[34]), (VCD_COPY, 18, 0));
        // 147: COPY 0 mode 8, 162: COPY 18 mode 8
        assert_eq!((t.inst1[147], t.size1[147], t.mode1[147]), (VCD_COPY, 0, 8));
        assert_eq!((t.inst1[162], t.size1[162], t.mode1[162]), (VCD_COPY, 18, 8));
        // 163: ADD 1 + COPY 4 mode 0
        assert_eq!(
            (t.inst1[163], t.size1[163], t.inst2[163], t.size2[163], t.mode2[163]),
            (VCD_ADD, 1, VCD_COPY, 4, 0)
        );
        // 234: ADD 4 + COPY 6 mode 5
        assert_eq!(
            (t.inst1[234], t.size1[234], t.inst2[234], t.size2[234], t.mode2[234]),
            (VCD_ADD, 4, VCD_COPY, 6, 5)
        );
        // 235: ADD 1 + COPY 4 mode 6, 246: ADD 4 + COPY 4 mode 8
        assert_eq!((t.size1[235], t.size2[235], t.mode2[235]), (1, 4, 6));
        assert_eq!((t.size1[246], t.size2[246], t.mode2[246]), (4, 4, 8));
        // 247: COPY 4 mode 0 + ADD 1, 255: COPY 4 mode 8 + ADD 1
        assert_eq!(
            (t.inst1[247], t.size1[247], t.mode1[247], t.inst2[247], t.size2[247]),
            (VCD_COPY, 4, 0, VCD_ADD, 1)
        );
        assert_eq!((t.mode1[255], t.inst2[255]), (8, VCD_ADD));
    }

    #[test]
    fn serialization_layout() {
        let bytes = default_code_table().to_bytes();
        assert_eq!(bytes.len(), SERIALIZED_CODE_TABLE_SIZE);
        // inst1 first, inst2 second.
        assert_eq!(bytes[0], VCD_RUN);
        assert_eq!(bytes[256 + 163], VCD_COPY);
        // size1 third.
        assert_eq!(bytes[512 + 18], 17);
        // mode2 last.
        assert_eq!(bytes[1280 + 246], 8);
        assert_eq!(CodeTable::from_bytes(&bytes).unwrap(), *default_code_table());
        assert_eq!(
            CodeTable::from_bytes(&bytes[1..]),
            Err(CodeTableError::WrongLength(1535))
        );
    }

    #[test]
    fn missing_size_zero_copy_mode_is_reported() {
        let mut t = CodeTable::default();
        // Opcode for COPY size 0 mode 3 is 19 + 16 * 3.
        t.size1[19 + 16 * 3] = 5;
        assert_eq!(
            violations(&t, DEFAULT_MAX_MODE),
            vec![CodeTableViolation::MissingSizeZeroOpcode {
                inst: InstructionType::Copy,
                mode: 3
            }]
        );
    }

    #[test]
    fn missing_size_zero_add_and_run_are_reported() {
        let mut t = CodeTable::default();
        t.inst1[0] = VCD_ADD; // RUN 0 becomes a duplicate ADD 0
        t.size1[1] = 1;
        let v = violations(&t, DEFAULT_MAX_MODE);
        assert!(v.contains(&CodeTableViolation::MissingSizeZeroOpcode {
            inst: InstructionType::Run,
            mode: 0
        }));
        assert!(!v.contains(&CodeTableViolation::MissingSizeZeroOpcode {
            inst: InstructionType::Add,
            mode: 0
        }));
    }

    #[test]
    fn all_violations_are_collected() {
        let mut t = CodeTable::default();
        t.inst2[5] = 7; // bad instruction type
        t.size2[6] = 3; // NOOP with a size
        t.mode1[7] = 2; // mode on ADD
        t.mode1[19] = 20; // mode too large, and COPY mode 0 loses its size-0 opcode
        let v = violations(&t, DEFAULT_MAX_MODE);
        assert!(v.contains(&CodeTableViolation::InvalidInstruction {
            opcode: 5,
            slot: Slot::Second,
            inst: 7
        }));
        assert!(v.contains(&CodeTableViolation::NoopWithSize {
            opcode: 6,
            slot: Slot::Second,
            size: 3
        }));
        assert!(v.contains(&CodeTableViolation::ModeOnNonCopy {
            opcode: 7,
            slot: Slot::First,
            inst: VCD_ADD,
            mode: 2
        }));
        assert!(v.contains(&CodeTableViolation::ModeTooLarge {
            opcode: 19,
            slot: Slot::First,
            mode: 20,
            max_mode: DEFAULT_MAX_MODE
        }));
        assert!(v.contains(&CodeTableViolation::MissingSizeZeroOpcode {
            inst: InstructionType::Copy,
            mode: 0
        }));
    }

    #[test]
    fn smaller_max_mode_rejects_default_table() {
        // Default table uses modes up to 8.
        let v = violations(default_code_table(), 5);
        assert!(v
            .iter()
            .all(|e| matches!(e, CodeTableViolation::ModeTooLarge { .. })));
    }

    #[test]
    fn larger_max_mode_requires_more_copy_opcodes() {
        let v = violations(default_code_table(), 9);
        assert!(v.contains(&CodeTableViolation::MissingSizeZeroOpcode {
            inst: InstructionType::Copy,
            mode: 9
        }));
    }
}
