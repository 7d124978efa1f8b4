// VCDIFF instruction code tables (RFC 3284, Sections 5.4 and 7).
//
// Each of the 256 opcodes maps to one or two (type, size, mode) triples.
// The default table is the one defined in RFC 3284 Section 5.6; a delta may
// carry its own table, transmitted as a VCDIFF delta against the serialized
// default table (see `decoder`).

use std::sync::LazyLock;

use super::error::DecodeError;

/// Instruction codes as they appear in a serialized code table.
pub const VCD_NOOP: u8 = 0;
pub const VCD_ADD: u8 = 1;
pub const VCD_RUN: u8 = 2;
pub const VCD_COPY: u8 = 3;

/// Minimum match length for COPY instructions in the default table.
pub const MIN_MATCH: u8 = 4;

/// Length of a serialized code table: six arrays of 256 bytes.
pub const SERIALIZED_TABLE_LEN: usize = 6 * 256;

/// One row of the code table, in the raw form used for serialization.
///
/// `inst2 == VCD_NOOP` means the opcode encodes a single instruction.
/// A size of 0 means the size follows as a varint in the instruction stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CodeTableEntry {
    pub inst1: u8,
    pub size1: u8,
    pub mode1: u8,
    pub inst2: u8,
    pub size2: u8,
    pub mode2: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstructionType {
    Add,
    Run,
    Copy,
}

impl InstructionType {
    fn from_code(code: u8) -> Option<Self> {
        match code {
            VCD_ADD => Some(Self::Add),
            VCD_RUN => Some(Self::Run),
            VCD_COPY => Some(Self::Copy),
            _ => None,
        }
    }
}

/// One half of an opcode: what to do, the baked-in size (0 = explicit) and
/// the address mode (COPY only).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HalfInstruction {
    pub kind: InstructionType,
    pub size: u8,
    pub mode: u8,
}

/// A complete 256-entry code table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeTable {
    entries: [CodeTableEntry; 256],
}

impl CodeTable {
    /// The raw entry for an opcode.
    #[inline]
    pub fn entry(&self, opcode: u8) -> &CodeTableEntry {
        &self.entries[opcode as usize]
    }

    /// Decode an opcode into its first and (optional) second instruction.
    /// NOOP halves come back as `None`.
    #[inline]
    pub fn decode(&self, opcode: u8) -> [Option<HalfInstruction>; 2] {
        let e = self.entry(opcode);
        [
            half(e.inst1, e.size1, e.mode1),
            half(e.inst2, e.size2, e.mode2),
        ]
    }

    /// Serialize into the 1536-byte layout
    /// `inst1 | inst2 | size1 | size2 | mode1 | mode2`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; SERIALIZED_TABLE_LEN];
        for (i, e) in self.entries.iter().enumerate() {
            out[i] = e.inst1;
            out[256 + i] = e.inst2;
            out[512 + i] = e.size1;
            out[768 + i] = e.size2;
            out[1024 + i] = e.mode1;
            out[1280 + i] = e.mode2;
        }
        out
    }

    /// Parse a serialized table. The result must still be validated.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() != SERIALIZED_TABLE_LEN {
            return Err(DecodeError::InvalidCustomTable(format!(
                "expected {SERIALIZED_TABLE_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut entries = [CodeTableEntry::default(); 256];
        for (i, e) in entries.iter_mut().enumerate() {
            *e = CodeTableEntry {
                inst1: bytes[i],
                inst2: bytes[256 + i],
                size1: bytes[512 + i],
                size2: bytes[768 + i],
                mode1: bytes[1024 + i],
                mode2: bytes[1280 + i],
            };
        }
        Ok(Self { entries })
    }

    /// Check that every opcode is executable with an address cache whose
    /// highest mode is `max_mode`, and that every instruction type and mode
    /// has a single-instruction opcode with an explicit size.
    pub fn validate(&self, max_mode: u8) -> Result<(), DecodeError> {
        let invalid = |msg: String| Err(DecodeError::InvalidCustomTable(msg));
        // Index: ADD=1, RUN=2, COPY mode m = 3 + m.
        let mut has_explicit_size = vec![false; VCD_COPY as usize + max_mode as usize + 1];

        for (opcode, e) in self.entries.iter().enumerate() {
            for (inst, size, mode) in [(e.inst1, e.size1, e.mode1), (e.inst2, e.size2, e.mode2)] {
                if inst > VCD_COPY {
                    return invalid(format!("opcode {opcode}: unknown instruction type {inst}"));
                }
                if mode > max_mode {
                    return invalid(format!(
                        "opcode {opcode}: mode {mode} exceeds the highest cache mode {max_mode}"
                    ));
                }
                if inst == VCD_NOOP && size != 0 {
                    return invalid(format!("opcode {opcode}: NOOP with size {size}"));
                }
                if inst != VCD_COPY && mode != 0 {
                    return invalid(format!("opcode {opcode}: mode {mode} on a non-COPY instruction"));
                }
            }
            if e.inst1 != VCD_NOOP && e.inst2 == VCD_NOOP && e.size1 == 0 {
                has_explicit_size[e.inst1 as usize + e.mode1 as usize] = true;
            }
        }

        for (slot, present) in has_explicit_size.iter().enumerate().skip(1) {
            if !present {
                let what = match slot {
                    1 => "ADD".to_string(),
                    2 => "RUN".to_string(),
                    m => format!("COPY mode {}", m - VCD_COPY as usize),
                };
                return invalid(format!("no opcode encodes {what} with an explicit size"));
            }
        }
        Ok(())
    }
}

impl Default for CodeTable {
    fn default() -> Self {
        default_code_table().clone()
    }
}

#[inline]
fn half(inst: u8, size: u8, mode: u8) -> Option<HalfInstruction> {
    InstructionType::from_code(inst).map(|kind| HalfInstruction { kind, size, mode })
}

// ---------------------------------------------------------------------------
// Default table
// ---------------------------------------------------------------------------

/// Build the default RFC 3284 code table.
pub fn build_default_code_table() -> CodeTable {
    let mut tbl = [CodeTableEntry::default(); 256];
    let mut idx: usize = 0;

    const ADD_SIZES: u8 = 17;
    const NEAR_MODES: u8 = 4;
    const SAME_MODES: u8 = 3;
    const CPY_SIZES: u8 = 15;
    const ADDCOPY_ADD_MAX: u8 = 4;
    const ADDCOPY_NEAR_CPY_MAX: u8 = 6;
    const ADDCOPY_SAME_CPY_MAX: u8 = 4;
    const COPYADD_CPY: u8 = 4;
    const CPY_MODES: u8 = 2 + NEAR_MODES + SAME_MODES; // 9
    const FIRST_SAME_MODE: u8 = 2 + NEAR_MODES;

    let single = |inst1: u8, size1: u8, mode1: u8| CodeTableEntry {
        inst1,
        size1,
        mode1,
        ..CodeTableEntry::default()
    };

    // 0: RUN size 0
    tbl[idx] = single(VCD_RUN, 0, 0);
    idx += 1;

    // 1..=18: ADD size 0, then 1..=17
    for size in 0..=ADD_SIZES {
        tbl[idx] = single(VCD_ADD, size, 0);
        idx += 1;
    }

    // 19..=162: for each mode, COPY size 0 then 4..=18
    for mode in 0..CPY_MODES {
        tbl[idx] = single(VCD_COPY, 0, mode);
        idx += 1;
        for size in MIN_MATCH..MIN_MATCH + CPY_SIZES {
            tbl[idx] = single(VCD_COPY, size, mode);
            idx += 1;
        }
    }

    // 163..=246: ADD+COPY
    for mode in 0..CPY_MODES {
        let cpy_max = if mode < FIRST_SAME_MODE {
            ADDCOPY_NEAR_CPY_MAX
        } else {
            ADDCOPY_SAME_CPY_MAX
        };
        for add_size in 1..=ADDCOPY_ADD_MAX {
            for cpy_size in MIN_MATCH..=cpy_max {
                tbl[idx] = CodeTableEntry {
                    inst1: VCD_ADD,
                    size1: add_size,
                    mode1: 0,
                    inst2: VCD_COPY,
                    size2: cpy_size,
                    mode2: mode,
                };
                idx += 1;
            }
        }
    }

    // 247..=255: COPY+ADD
    for mode in 0..CPY_MODES {
        tbl[idx] = CodeTableEntry {
            inst1: VCD_COPY,
            size1: COPYADD_CPY,
            mode1: mode,
            inst2: VCD_ADD,
            size2: 1,
            mode2: 0,
        };
        idx += 1;
    }

    debug_assert_eq!(idx, 256, "code table must have exactly 256 entries");
    CodeTable { entries: tbl }
}

/// The lazily-initialized default code table.
pub fn default_code_table() -> &'static CodeTable {
    static TABLE: LazyLock<CodeTable> = LazyLock::new(build_default_code_table);
    &TABLE
}

/// The serialized default table: the dictionary a custom table is
/// delta-encoded against.
pub fn default_table_bytes() -> &'static [u8] {
    static BYTES: LazyLock<Vec<u8>> = LazyLock::new(|| default_code_table().to_bytes());
    &BYTES
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
