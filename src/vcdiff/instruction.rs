// Instruction decoding (RFC 3284, Section 5.5).
//
// Turns the opcode stream of one window into fully resolved instructions:
// sizes are read, ADD/RUN payloads sliced out of the data section and COPY
// addresses resolved through the address cache. In the interleaved layout
// sizes, payloads and addresses all follow their opcode inside the
// instruction section, so the three cursors collapse into one.

use super::address_cache::AddressCache;
use super::code_table::{CodeTable, HalfInstruction, InstructionType};
use super::error::DecodeError;
use super::varint;

/// A resolved instruction, borrowing its ADD payload from the window body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction<'a> {
    Add(&'a [u8]),
    Run { byte: u8, size: u32 },
    Copy { address: u64, size: u32, mode: u8 },
}

impl Instruction<'_> {
    /// Number of target bytes this instruction produces.
    pub fn size(&self) -> u64 {
        match *self {
            Instruction::Add(bytes) => bytes.len() as u64,
            Instruction::Run { size, .. } | Instruction::Copy { size, .. } => u64::from(size),
        }
    }
}

/// The sections of one window body.
#[derive(Debug, Clone, Copy)]
pub struct WindowSections<'a> {
    pub data: &'a [u8],
    pub inst: &'a [u8],
    pub addr: &'a [u8],
    /// Data and addresses live inside `inst`; `data` and `addr` are empty.
    pub interleaved: bool,
}

/// Streaming decoder over one window's instruction section.
pub struct InstructionDecoder<'a, 'c> {
    table: &'c CodeTable,
    cache: &'c mut AddressCache,
    sections: WindowSections<'a>,
    inst_pos: usize,
    data_pos: usize,
    addr_pos: usize,
    segment_len: u64,
    target_len: u64,
    produced: u64,
    /// Second half of a double opcode, not yet resolved.
    pending: Option<HalfInstruction>,
    failed: bool,
}

impl<'a, 'c> InstructionDecoder<'a, 'c> {
    /// `segment_len` is the size of the window's source segment, i.e. the
    /// address where the window's own target bytes begin.
    pub fn new(
        table: &'c CodeTable,
        cache: &'c mut AddressCache,
        sections: WindowSections<'a>,
        segment_len: u64,
        target_len: u64,
    ) -> Self {
        Self {
            table,
            cache,
            sections,
            inst_pos: 0,
            data_pos: 0,
            addr_pos: 0,
            segment_len,
            target_len,
            produced: 0,
            pending: None,
            failed: false,
        }
    }

    /// Decode the next instruction, or `None` at the end of the section.
    pub fn next_instruction(&mut self) -> Result<Option<Instruction<'a>>, DecodeError> {
        let half = loop {
            if let Some(h) = self.pending.take() {
                break h;
            }
            let Some(&opcode) = self.sections.inst.get(self.inst_pos) else {
                return Ok(None);
            };
            self.inst_pos += 1;
            let [first, second] = self.table.decode(opcode);
            self.pending = second;
            if let Some(h) = first {
                break h;
            }
        };
        self.resolve(half).map(Some)
    }

    /// Check that the window was decoded exactly: every section fully
    /// consumed and the declared target length reached.
    pub fn finish(&self) -> Result<(), DecodeError> {
        if self.produced != self.target_len {
            return Err(DecodeError::WindowLengthMismatch {
                expected: self.target_len,
                actual: self.produced,
            });
        }
        let unused = |what: &str, left: usize| {
            DecodeError::InvalidFormat(format!("{left} unused bytes left in the {what} section"))
        };
        if self.inst_pos != self.sections.inst.len() {
            return Err(unused("instructions", self.sections.inst.len() - self.inst_pos));
        }
        if self.data_pos != self.sections.data.len() {
            return Err(unused("data", self.sections.data.len() - self.data_pos));
        }
        if self.addr_pos != self.sections.addr.len() {
            return Err(unused("addresses", self.sections.addr.len() - self.addr_pos));
        }
        Ok(())
    }

    fn resolve(&mut self, half: HalfInstruction) -> Result<Instruction<'a>, DecodeError> {
        let size = if half.size == 0 {
            let (val, len) = varint::read_u32(&self.sections.inst[self.inst_pos..])
                .map_err(|e| DecodeError::from_section_varint(e, "instruction size"))?;
            self.inst_pos += len;
            val
        } else {
            u32::from(half.size)
        };

        let end = self.produced + u64::from(size);
        if end > self.target_len {
            return Err(DecodeError::WindowLengthMismatch {
                expected: self.target_len,
                actual: end,
            });
        }

        let inst = match half.kind {
            InstructionType::Add => Instruction::Add(self.take_data(size as usize, "ADD")?),
            InstructionType::Run => Instruction::Run {
                byte: self.take_data(1, "RUN")?[0],
                size,
            },
            InstructionType::Copy => {
                let here = self.segment_len + self.produced;
                let (buf, pos) = if self.sections.interleaved {
                    (self.sections.inst, &mut self.inst_pos)
                } else {
                    (self.sections.addr, &mut self.addr_pos)
                };
                let (address, len) = self.cache.decode(half.mode, &buf[*pos..], here)?;
                *pos += len;
                Instruction::Copy {
                    address,
                    size,
                    mode: half.mode,
                }
            }
        };

        self.produced = end;
        Ok(inst)
    }

    fn take_data(&mut self, len: usize, what: &str) -> Result<&'a [u8], DecodeError> {
        let (buf, pos) = if self.sections.interleaved {
            (self.sections.inst, &mut self.inst_pos)
        } else {
            (self.sections.data, &mut self.data_pos)
        };
        let end = pos
            .checked_add(len)
            .filter(|&end| end <= buf.len())
            .ok_or_else(|| {
                DecodeError::InvalidFormat(format!(
                    "{what} of {len} bytes runs past the end of the data section"
                ))
            })?;
        let out = &buf[*pos..end];
        *pos = end;
        Ok(out)
    }
}

impl<'a> Iterator for InstructionDecoder<'a, '_> {
    type Item = Result<Instruction<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.next_instruction().transpose();
        if matches!(item, Some(Err(_))) {
            self.failed = true;
        }
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcdiff::code_table::default_code_table;

    fn decode_all(
        sections: WindowSections<'_>,
        segment_len: u64,
        target_len: u64,
    ) -> Result<Vec<Instruction<'_>>, DecodeError> {
        let mut cache = AddressCache::new();
        let mut dec =
            InstructionDecoder::new(default_code_table(), &mut cache, sections, segment_len, target_len);
        let out: Result<Vec<_>, _> = dec.by_ref().collect();
        let out = out?;
        dec.finish()?;
        Ok(out)
    }

    #[test]
    fn separate_sections() {
        // COPY 4 @SELF 2, ADD 3, RUN 5 of 'z'.
        let sections = WindowSections {
            data: b"abcz",
            inst: &[20, 4, 0, 5],
            addr: &[2],
            interleaved: false,
        };
        let got = decode_all(sections, 10, 12).unwrap();
        assert_eq!(
            got,
            vec![
                Instruction::Copy { address: 2, size: 4, mode: 0 },
                Instruction::Add(b"abc"),
                Instruction::Run { byte: b'z', size: 5 },
            ]
        );
    }

    #[test]
    fn interleaved_double_opcode_order() {
        // 0xA3 = ADD 1 + COPY 4 @SELF: payload 'q', then the address.
        let sections = WindowSections {
            data: &[],
            inst: &[0xA3, b'q', 0x01],
            addr: &[],
            interleaved: true,
        };
        let got = decode_all(sections, 8, 5).unwrap();
        assert_eq!(
            got,
            vec![
                Instruction::Add(b"q"),
                Instruction::Copy { address: 1, size: 4, mode: 0 },
            ]
        );
    }

    #[test]
    fn here_is_measured_from_segment_plus_produced() {
        // ADD 2, then COPY 4 @HERE 1: here = 3 + 2, address 4.
        let sections = WindowSections {
            data: b"xy",
            inst: &[3, 36],
            addr: &[1],
            interleaved: false,
        };
        let got = decode_all(sections, 3, 6).unwrap();
        assert_eq!(got[1], Instruction::Copy { address: 4, size: 4, mode: 1 });
    }

    #[test]
    fn overshooting_target_length_fails() {
        let sections = WindowSections {
            data: b"abc",
            inst: &[4],
            addr: &[],
            interleaved: false,
        };
        assert!(matches!(
            decode_all(sections, 0, 2),
            Err(DecodeError::WindowLengthMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn short_target_and_leftovers_fail() {
        let sections = WindowSections {
            data: b"abcd",
            inst: &[4],
            addr: &[],
            interleaved: false,
        };
        // Three bytes produced, but four declared.
        assert!(matches!(
            decode_all(sections, 0, 4),
            Err(DecodeError::WindowLengthMismatch { expected: 4, actual: 3 })
        ));
        // Target met, but a data byte is left over.
        assert!(matches!(
            decode_all(sections, 0, 3),
            Err(DecodeError::InvalidFormat(_))
        ));
    }

    #[test]
    fn data_underflow_fails() {
        let sections = WindowSections {
            data: b"ab",
            inst: &[4],
            addr: &[],
            interleaved: false,
        };
        assert!(matches!(
            decode_all(sections, 0, 3),
            Err(DecodeError::InvalidFormat(_))
        ));
    }

    #[test]
    fn explicit_size_must_be_present() {
        let sections = WindowSections {
            data: b"ab",
            inst: &[1],
            addr: &[],
            interleaved: false,
        };
        assert!(decode_all(sections, 0, 2).is_err());
    }

    #[test]
    fn iterator_stops_after_error() {
        let mut cache = AddressCache::new();
        let sections = WindowSections {
            data: &[],
            inst: &[2, 2],
            addr: &[],
            interleaved: false,
        };
        let mut dec = InstructionDecoder::new(default_code_table(), &mut cache, sections, 0, 2);
        assert!(matches!(dec.next(), Some(Err(_))));
        assert!(dec.next().is_none());
    }
}
