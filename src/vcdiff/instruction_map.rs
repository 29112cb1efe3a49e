// Encoder-side inverted index over a code table.
//
// `lookup_first_opcode(inst, size, mode)` finds the opcode that encodes a
// single instruction; `lookup_second_opcode(first, inst, size, mode)`
// finds a double opcode that encodes the instruction represented by the
// single opcode `first` followed by (inst, size, mode). Both return `None`
// when the exact size has no opcode; the caller retries with size 0,
// which a validated table always has.
//
// Instructions are keyed by `inst + mode`, so COPY in mode m lands on
// VCD_COPY + m while ADD and RUN (always mode 0) keep their own slots.

use std::sync::LazyLock;

use super::code_table::{
    CODE_TABLE_SIZE, CodeTable, DEFAULT_MAX_MODE, VCD_LAST_INSTRUCTION_TYPE, VCD_NOOP,
    default_code_table,
};

/// `(inst + mode, size) -> opcode` for one instruction slot.
#[derive(Debug, Clone)]
struct OpcodeGrid {
    max_size: usize,
    cells: Vec<Option<u8>>,
}

impl OpcodeGrid {
    fn new(inst_modes: usize, max_size: usize) -> Self {
        Self {
            max_size,
            cells: vec![None; inst_modes * (max_size + 1)],
        }
    }

    #[inline]
    fn index(&self, inst_mode: usize, size: usize) -> Option<usize> {
        if size > self.max_size {
            return None;
        }
        let i = inst_mode * (self.max_size + 1) + size;
        (i < self.cells.len()).then_some(i)
    }

    #[inline]
    fn get(&self, inst_mode: usize, size: usize) -> Option<u8> {
        self.index(inst_mode, size).and_then(|i| self.cells[i])
    }

    fn cell_mut(&mut self, inst_mode: usize, size: usize) -> Option<&mut Option<u8>> {
        let i = self.index(inst_mode, size)?;
        Some(&mut self.cells[i])
    }
}

/// Opcode lookup for one code table.
#[derive(Debug, Clone)]
pub struct InstructionMap {
    inst_modes: usize,
    first: OpcodeGrid,
    second_max_size: usize,
    /// Indexed by the single-instruction opcode of the first instruction.
    second: Vec<Option<OpcodeGrid>>,
}

static DEFAULT_INSTRUCTION_MAP: LazyLock<InstructionMap> =
    LazyLock::new(|| InstructionMap::new(default_code_table(), DEFAULT_MAX_MODE));

/// Instruction map for the default code table, built on first use.
pub fn default_instruction_map() -> &'static InstructionMap {
    &DEFAULT_INSTRUCTION_MAP
}

impl InstructionMap {
    /// Build the map for `table`, which should already have been validated
    /// against `max_mode`.
    pub fn new(table: &CodeTable, max_mode: u8) -> Self {
        let inst_modes = VCD_LAST_INSTRUCTION_TYPE as usize + max_mode as usize + 1;
        let first_max = table.size1.iter().copied().max().unwrap_or(0) as usize;
        let second_max = table.size2.iter().copied().max().unwrap_or(0) as usize;

        let mut map = Self {
            inst_modes,
            first: OpcodeGrid::new(inst_modes, first_max.max(second_max)),
            second_max_size: second_max,
            second: vec![None; CODE_TABLE_SIZE],
        };

        // Pass 1, descending: the lowest opcode ends up in each cell.
        for opcode in (0..CODE_TABLE_SIZE).rev() {
            let op = opcode as u8;
            if table.inst2[opcode] == VCD_NOOP {
                map.add_first(table.inst1[opcode], table.size1[opcode], table.mode1[opcode], op);
            } else if table.inst1[opcode] == VCD_NOOP {
                // NOOP first, real instruction second: index it as if swapped.
                map.add_first(table.inst2[opcode], table.size2[opcode], table.mode2[opcode], op);
            }
        }

        // Pass 2, ascending: the first double opcode found wins.
        for opcode in 0..CODE_TABLE_SIZE {
            if table.inst1[opcode] == VCD_NOOP || table.inst2[opcode] == VCD_NOOP {
                continue;
            }
            let Some(single) = map.lookup_first_opcode(
                table.inst1[opcode],
                table.size1[opcode] as usize,
                table.mode1[opcode],
            ) else {
                continue;
            };
            map.add_second(
                single,
                table.inst2[opcode],
                table.size2[opcode],
                table.mode2[opcode],
                opcode as u8,
            );
        }
        map
    }

    fn add_first(&mut self, inst: u8, size: u8, mode: u8, opcode: u8) {
        let inst_mode = inst as usize + mode as usize;
        match self.first.cell_mut(inst_mode, size as usize) {
            Some(cell) => *cell = Some(opcode),
            None => log::warn!("opcode {opcode}: instruction {inst} mode {mode} is out of map range"),
        }
    }

    fn add_second(&mut self, first_opcode: u8, inst: u8, size: u8, mode: u8, opcode: u8) {
        let inst_mode = inst as usize + mode as usize;
        if inst_mode >= self.inst_modes {
            log::warn!("opcode {opcode}: instruction {inst} mode {mode} is out of map range");
            return;
        }
        let (inst_modes, max_size) = (self.inst_modes, self.second_max_size);
        let grid = self.second[first_opcode as usize]
            .get_or_insert_with(|| OpcodeGrid::new(inst_modes, max_size));
        if let Some(cell) = grid.cell_mut(inst_mode, size as usize)
            && cell.is_none()
        {
            *cell = Some(opcode);
        }
    }

    /// Opcode encoding exactly (inst, size, mode) as a single instruction.
    #[inline]
    pub fn lookup_first_opcode(&self, inst: u8, size: usize, mode: u8) -> Option<u8> {
        self.first.get(inst as usize + mode as usize, size)
    }

    /// Double opcode whose first half is what `first_opcode` encodes and
    /// whose second half is (inst, size, mode).
    #[inline]
    pub fn lookup_second_opcode(
        &self,
        first_opcode: u8,
        inst: u8,
        size: usize,
        mode: u8,
    ) -> Option<u8> {
        self.second[first_opcode as usize]
            .as_ref()?
            .get(inst as usize + mode as usize, size)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcdiff::code_table::{VCD_ADD, VCD_COPY, VCD_RUN};

    #[test]
    fn default_single_opcodes() {
        let m = default_instruction_map();
        assert_eq!(m.lookup_first_opcode(VCD_RUN, 0, 0), Some(0));
        assert_eq!(m.lookup_first_opcode(VCD_RUN, 5, 0), None);
        assert_eq!(m.lookup_first_opcode(VCD_ADD, 0, 0), Some(1));
        assert_eq!(m.lookup_first_opcode(VCD_ADD, 1, 0), Some(2));
        assert_eq!(m.lookup_first_opcode(VCD_ADD, 17, 0), Some(18));
        assert_eq!(m.lookup_first_opcode(VCD_ADD, 18, 0), None);
        assert_eq!(m.lookup_first_opcode(VCD_COPY, 0, 0), Some(19));
        assert_eq!(m.lookup_first_opcode(VCD_COPY, 4, 0), Some(20));
        assert_eq!(m.lookup_first_opcode(VCD_COPY, 18, 0), Some(34));
        assert_eq!(m.lookup_first_opcode(VCD_COPY, 3, 0), None);
        assert_eq!(m.lookup_first_opcode(VCD_COPY, 0, 8), Some(147));
        assert_eq!(m.lookup_first_opcode(VCD_COPY, 19, 8), None);
        assert_eq!(m.lookup_first_opcode(VCD_COPY, 1000, 2), None);
    }

    #[test]
    fn default_double_opcodes() {
        let m = default_instruction_map();
        // ADD 1 (opcode 2) + COPY 4 mode 0.
        assert_eq!(m.lookup_second_opcode(2, VCD_COPY, 4, 0), Some(163));
        // ADD 3 (opcode 4) + COPY 6 mode 5.
        assert_eq!(m.lookup_second_opcode(4, VCD_COPY, 6, 5), Some(163 + 5 * 12 + 2 * 3 + 2));
        // ADD 4 (opcode 5) + COPY 4 mode 8.
        assert_eq!(m.lookup_second_opcode(5, VCD_COPY, 4, 8), Some(246));
        // ADD 4 + COPY 5 mode 8 does not exist.
        assert_eq!(m.lookup_second_opcode(5, VCD_COPY, 5, 8), None);
        // COPY 4 mode 0 (opcode 20) + ADD 1.
        assert_eq!(m.lookup_second_opcode(20, VCD_ADD, 1, 0), Some(247));
        // COPY 4 mode 8 (opcode 148) + ADD 1.
        assert_eq!(m.lookup_second_opcode(148, VCD_ADD, 1, 0), Some(255));
        // ADD 5 never starts a double.
        assert_eq!(m.lookup_second_opcode(6, VCD_COPY, 4, 0), None);
        assert_eq!(m.lookup_second_opcode(20, VCD_ADD, 2, 0), None);
    }

    #[test]
    fn every_default_single_is_found() {
        let t = default_code_table();
        let m = default_instruction_map();
        for opcode in 0..CODE_TABLE_SIZE {
            if t.inst2[opcode] == VCD_NOOP {
                assert_eq!(
                    m.lookup_first_opcode(t.inst1[opcode], t.size1[opcode] as usize, t.mode1[opcode]),
                    Some(opcode as u8)
                );
            }
        }
    }

    #[test]
    fn lowest_opcode_wins_for_duplicates() {
        let mut t = CodeTable::default();
        // Make opcode 200 a second single ADD size 3 (duplicates opcode 4).
        t.inst1[200] = VCD_ADD;
        t.size1[200] = 3;
        t.mode1[200] = 0;
        t.inst2[200] = VCD_NOOP;
        t.size2[200] = 0;
        t.mode2[200] = 0;
        let m = InstructionMap::new(&t, DEFAULT_MAX_MODE);
        assert_eq!(m.lookup_first_opcode(VCD_ADD, 3, 0), Some(4));
    }

    #[test]
    fn noop_first_slot_is_indexed_as_single() {
        let mut t = CodeTable::default();
        // Opcode 250 becomes NOOP + RUN size 7.
        t.inst1[250] = VCD_NOOP;
        t.size1[250] = 0;
        t.mode1[250] = 0;
        t.inst2[250] = VCD_RUN;
        t.size2[250] = 7;
        t.mode2[250] = 0;
        let m = InstructionMap::new(&t, DEFAULT_MAX_MODE);
        assert_eq!(m.lookup_first_opcode(VCD_RUN, 7, 0), Some(250));
        assert_eq!(m.lookup_first_opcode(VCD_RUN, 0, 0), Some(0));
    }

    #[test]
    fn first_double_wins_for_duplicates() {
        let mut t = CodeTable::default();
        // Opcode 254 (COPY 4 mode 7 + ADD 1) rewritten to duplicate opcode 247.
        t.mode1[254] = 0;
        let m = InstructionMap::new(&t, DEFAULT_MAX_MODE);
        assert_eq!(m.lookup_second_opcode(20, VCD_ADD, 1, 0), Some(247));
    }
}
