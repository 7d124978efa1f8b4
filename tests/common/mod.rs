// Shared fixtures for the integration tests: the "Snark" vectors and a tiny
// delta builder that turns an explicit instruction list into VCDIFF bytes.
#![allow(dead_code)]

use oxipatch::vcdiff::checksum::adler32;
use oxipatch::vcdiff::varint;

// ===========================================================================
// Snark vectors
// ===========================================================================

pub const DICTIONARY: &[u8] = b"\"Just the place for a Snark!\" the Bellman cried,\n\
As he landed his crew with care;\n\
Supporting each man on the top of the tide\n\
By a finger entwined in his hair.\n";

pub const EXPECTED_TARGET: &[u8] = b"\"Just the place for a Snark! I have said it twice:\n\
That alone should encourage the crew.\n\
Just the place for a Snark! I have said it thrice:\n\
What I tell you three times is true.\"\n";

pub const STANDARD_FILE_HEADER: [u8; 5] = [0xD6, 0xC3, 0xC4, 0x00, 0x00];
pub const INTERLEAVED_FILE_HEADER: [u8; 5] = [0xD6, 0xC3, 0xC4, b'S', 0x00];

const ADD_1: &[u8] = b" I have said it twice:\nThat alone should encourage the crew.\n";
const ADD_2: &[u8] = b"hr";
const ADD_3: &[u8] = b"What I te";
const ADD_4: &[u8] = b" you three times is true.\"\n";

/// Standard window header: source = whole dictionary, 178-byte target.
pub const STANDARD_WINDOW_HEADER: [u8; 11] = [
    0x01, 0x81, 0x1F, 0x00, 0x79, 0x81, 0x32, 0x00, 0x64, 0x0C, 0x03,
];

/// Same window, interleaved: everything lives in the instructions section.
pub const INTERLEAVED_WINDOW_HEADER: [u8; 11] = [
    0x01, 0x81, 0x1F, 0x00, 0x79, 0x81, 0x32, 0x00, 0x00, 0x73, 0x00,
];

/// Body of the standard window: data, instructions, addresses.
pub fn standard_window_body() -> Vec<u8> {
    let mut b = Vec::new();
    b.extend_from_slice(ADD_1);
    b.extend_from_slice(ADD_2);
    b.extend_from_slice(ADD_3);
    b.push(b'l');
    b.extend_from_slice(ADD_4);
    b.extend_from_slice(&[
        0x13, 0x1C, // COPY 28, SELF
        0x01, 0x3D, // ADD 61
        0x23, 0x2C, // COPY 44, HERE
        0xCB, //       ADD 2 + COPY 5 NEAR(1)
        0x0A, //       ADD 9
        0x00, 0x02, // RUN 2
        0x01, 0x1B, // ADD 27
    ]);
    b.extend_from_slice(&[0x00, 0x58, 0x2D]);
    b
}

pub fn interleaved_window_body() -> Vec<u8> {
    let mut b = vec![0x13, 0x1C, 0x00, 0x01, 0x3D];
    b.extend_from_slice(ADD_1);
    b.extend_from_slice(&[0x23, 0x2C, 0x58, 0xCB]);
    b.extend_from_slice(ADD_2);
    b.extend_from_slice(&[0x2D, 0x0A]);
    b.extend_from_slice(ADD_3);
    b.extend_from_slice(&[0x00, 0x02, b'l', 0x01, 0x1B]);
    b.extend_from_slice(ADD_4);
    b
}

pub fn standard_delta() -> Vec<u8> {
    [
        &STANDARD_FILE_HEADER[..],
        &STANDARD_WINDOW_HEADER[..],
        &standard_window_body()[..],
    ]
    .concat()
}

pub fn interleaved_delta() -> Vec<u8> {
    [
        &INTERLEAVED_FILE_HEADER[..],
        &INTERLEAVED_WINDOW_HEADER[..],
        &interleaved_window_body()[..],
    ]
    .concat()
}

/// Add an Adler-32 of the expected target to a single-window header: set
/// `VCD_ADLER32`, append the checksum varint and grow the delta length.
pub fn with_checksum(window_header: &[u8], checksum: u32) -> Vec<u8> {
    let mut sum = Vec::new();
    varint::write_u64(&mut sum, u64::from(checksum)).unwrap();
    with_raw_checksum(window_header, &sum)
}

/// Like `with_checksum`, but appends `encoded` verbatim as the checksum
/// field. `window_header` must have a one-byte delta length at offset 4.
pub fn with_raw_checksum(window_header: &[u8], encoded: &[u8]) -> Vec<u8> {
    let mut h = window_header[..4].to_vec();
    h[0] |= 0x04;
    put(&mut h, u64::from(window_header[4]) + encoded.len() as u64);
    h.extend_from_slice(&window_header[5..]);
    h.extend_from_slice(encoded);
    h
}

pub fn standard_delta_with_checksum() -> Vec<u8> {
    let header = with_checksum(&STANDARD_WINDOW_HEADER, adler32(EXPECTED_TARGET));
    [&STANDARD_FILE_HEADER[..], &header[..], &standard_window_body()[..]].concat()
}

pub fn interleaved_delta_with_checksum() -> Vec<u8> {
    let header = with_checksum(&INTERLEAVED_WINDOW_HEADER, adler32(EXPECTED_TARGET));
    [
        &INTERLEAVED_FILE_HEADER[..],
        &header[..],
        &interleaved_window_body()[..],
    ]
    .concat()
}

/// The standard delta split into seven windows, one instruction each.
/// Windows 3 and 4 take their source from earlier target output.
pub fn seven_window_delta() -> Vec<u8> {
    let mut d = STANDARD_FILE_HEADER.to_vec();
    d.extend_from_slice(&[0x01, 0x81, 0x1F, 0x00, 0x08, 0x1C, 0x00, 0x00, 0x02, 0x01]);
    d.extend_from_slice(&[0x13, 0x1C, 0x00]);
    d.extend_from_slice(&[0x00, 0x44, 0x3D, 0x00, 0x3D, 0x02, 0x00]);
    d.extend_from_slice(ADD_1);
    d.extend_from_slice(&[0x01, 0x3D]);
    d.extend_from_slice(&[0x02, 0x59, 0x00, 0x08, 0x2C, 0x00, 0x00, 0x02, 0x01]);
    d.extend_from_slice(&[0x23, 0x2C, 0x58]);
    d.extend_from_slice(&[0x02, 0x05, 0x2E, 0x09, 0x07, 0x00, 0x02, 0x01, 0x01]);
    d.extend_from_slice(ADD_2);
    d.extend_from_slice(&[0xA7, 0x00]);
    d.extend_from_slice(&[0x00, 0x0F, 0x09, 0x00, 0x09, 0x01, 0x00]);
    d.extend_from_slice(ADD_3);
    d.push(0x0A);
    d.extend_from_slice(&[0x00, 0x08, 0x02, 0x00, 0x01, 0x02, 0x00, b'l', 0x00, 0x02]);
    d.extend_from_slice(&[0x00, 0x22, 0x1B, 0x00, 0x1B, 0x02, 0x00]);
    d.extend_from_slice(ADD_4);
    d.extend_from_slice(&[0x01, 0x1B]);
    d
}

pub const CROSS_TARGET: &[u8] = b"Spiders in his hair.\nSpiders in the air.\n";

/// One window whose COPYs read across the dictionary/target boundary.
pub fn cross_delta(interleaved: bool) -> Vec<u8> {
    if interleaved {
        let mut d = INTERLEAVED_FILE_HEADER.to_vec();
        d.extend_from_slice(&[0x01, 0x81, 0x1F, 0x00, 0x15, 0x29, 0x00, 0x00, 0x10, 0x00]);
        d.extend_from_slice(&[0x01, 0x07]);
        d.extend_from_slice(b"Spiders");
        d.extend_from_slice(&[0x23, 0x19, 0x15, 0x14, 0x06, 0x25, 0x14]);
        d
    } else {
        let mut d = STANDARD_FILE_HEADER.to_vec();
        d.extend_from_slice(&[0x01, 0x81, 0x1F, 0x00, 0x15, 0x29, 0x00, 0x07, 0x06, 0x03]);
        d.extend_from_slice(b"Spiders");
        d.extend_from_slice(&[0x01, 0x07, 0x23, 0x19, 0x14, 0x25]);
        d.extend_from_slice(&[0x15, 0x06, 0x14]);
        d
    }
}

/// Custom code table, delta-encoded against the default one. Changes: opcode
/// 3 becomes RUN 2, opcodes 17/18 become ADD 27/61, opcodes 34/50 become
/// COPY 28 (mode 0) and COPY 44 (mode 1).
pub const CUSTOM_CODE_TABLE: [u8; 41] = [
    0xD6, 0xC3, 0xC4, b'S', 0x00, //
    0x01, 0x8C, 0x00, 0x00, 0x1F, 0x8C, 0x00, 0x00, 0x00, 0x19, 0x00, //
    0x05, 0x02, 0x01, 0x01, 0x02, // ADD 4: RUN ADD ADD RUN
    0x13, 0x84, 0x0D, 0x04, //       COPY 525 from 4
    0x03, 0x1B, 0x3D, //             ADD 2: 27 61
    0x3F, 0x84, 0x0F, //             COPY 15 NEAR(0)
    0x02, 0x1C, //                   ADD 1: 28
    0x4F, 0x10, //                   COPY 15 NEAR(1)
    0x02, 0x2C, //                   ADD 1: 44
    0x53, 0x87, 0x4D, 0x10, //       COPY 973 NEAR(2)
];

/// The Snark target again, interleaved, using the custom table with a
/// one-entry NEAR cache and a six-row SAME cache.
pub fn custom_table_delta() -> Vec<u8> {
    let mut d = vec![0xD6, 0xC3, 0xC4, b'S', 0x02, 0x01, 0x06];
    d.extend_from_slice(&CUSTOM_CODE_TABLE);
    d.extend_from_slice(&[0x01, 0x81, 0x1F, 0x00, 0x74, 0x81, 0x32, 0x00, 0x00, 0x6E, 0x00]);
    d.extend_from_slice(&[0x22, 0x00, 0x12]);
    d.extend_from_slice(ADD_1);
    d.extend_from_slice(&[0x32, 0x58, 0xBF]);
    d.extend_from_slice(ADD_2);
    d.extend_from_slice(&[0x2D, 0x0A]);
    d.extend_from_slice(ADD_3);
    d.extend_from_slice(&[0x03, b'l', 0x11]);
    d.extend_from_slice(ADD_4);
    d
}

/// Interleaved window producing 64 MiB of 0xBE with one RUN.
pub const LARGE_RUN_WINDOW: [u8; 16] = [
    0x00, 0x0E, 0xA0, 0x80, 0x80, 0x00, 0x00, 0x00, 0x06, 0x00, //
    0x00, 0xA0, 0x80, 0x80, 0x00, 0xBE,
];
pub const LARGE_RUN_LEN: usize = 0x400_0000;

// ===========================================================================
// Fixture encoder
// ===========================================================================

/// One instruction of a fixture window. Addresses are in the window's
/// address space: the source segment followed by the window's own output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Add(Vec<u8>),
    Run(u8, u32),
    /// COPY with a VCD_SELF address.
    Copy { addr: u64, size: u32 },
    /// COPY with a VCD_HERE address.
    CopyHere { addr: u64, size: u32 },
    /// COPY addressed as an offset from NEAR slot `slot`. `addr` must not be
    /// below the address that slot holds.
    CopyNear { slot: usize, addr: u64, size: u32 },
    /// COPY through the SAME slot `addr` hashes to, which must hold `addr`.
    CopySame { addr: u64, size: u32 },
    /// ADD of 1..=4 bytes and a 4..=6 byte VCD_SELF COPY in one opcode.
    AddCopy { add: Vec<u8>, addr: u64, size: u32 },
}

impl Op {
    /// Target bytes the op produces.
    pub fn target_len(&self) -> u64 {
        match self {
            Op::Add(bytes) => bytes.len() as u64,
            Op::Run(_, size)
            | Op::Copy { size, .. }
            | Op::CopyHere { size, .. }
            | Op::CopyNear { size, .. }
            | Op::CopySame { size, .. } => u64::from(*size),
            Op::AddCopy { add, size, .. } => add.len() as u64 + u64::from(*size),
        }
    }
}

pub const NEAR_SLOTS: usize = 4;
const SAME_ROWS: usize = 3;

/// The default-sized NEAR/SAME address cache, kept the way a decoder keeps
/// it. Starts zeroed at each window.
#[derive(Debug, Clone)]
pub struct CacheMirror {
    near: [u64; NEAR_SLOTS],
    next_slot: usize,
    same: Vec<u64>,
}

impl Default for CacheMirror {
    fn default() -> Self {
        Self {
            near: [0; NEAR_SLOTS],
            next_slot: 0,
            same: vec![0; SAME_ROWS * 256],
        }
    }
}

impl CacheMirror {
    pub fn near(&self, slot: usize) -> u64 {
        self.near[slot]
    }

    /// The address held by the SAME slot that `addr` hashes to.
    pub fn same(&self, addr: u64) -> u64 {
        self.same[addr as usize % self.same.len()]
    }

    pub fn update(&mut self, addr: u64) {
        self.near[self.next_slot] = addr;
        self.next_slot = (self.next_slot + 1) % NEAR_SLOTS;
        let idx = addr as usize % self.same.len();
        self.same[idx] = addr;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    None,
    Dictionary { position: u64, length: u64 },
    Target { position: u64, length: u64 },
}

/// Builds a delta window by window and tracks the target it decodes to.
pub struct DeltaBuilder<'a> {
    dictionary: &'a [u8],
    interleaved: bool,
    delta: Vec<u8>,
    target: Vec<u8>,
}

impl<'a> DeltaBuilder<'a> {
    pub fn new(dictionary: &'a [u8]) -> Self {
        Self {
            dictionary,
            interleaved: false,
            delta: STANDARD_FILE_HEADER.to_vec(),
            target: Vec::new(),
        }
    }

    pub fn interleaved(dictionary: &'a [u8]) -> Self {
        Self {
            dictionary,
            interleaved: true,
            delta: INTERLEAVED_FILE_HEADER.to_vec(),
            target: Vec::new(),
        }
    }

    /// Append a window. Panics if an op reads outside the address space.
    pub fn window(&mut self, source: Source, ops: &[Op], checksum: bool) -> &mut Self {
        let segment: Vec<u8> = match source {
            Source::None => Vec::new(),
            Source::Dictionary { position, length } => {
                self.dictionary[position as usize..(position + length) as usize].to_vec()
            }
            Source::Target { position, length } => {
                self.target[position as usize..(position + length) as usize].to_vec()
            }
        };

        let mut out = Vec::new();
        let (mut data, mut inst, mut addr) = (Vec::new(), Vec::new(), Vec::new());
        let mut cache = CacheMirror::default();
        for op in ops {
            let here = (segment.len() + out.len()) as u64;
            let (a, size) = match op {
                Op::Add(bytes) => {
                    inst.push(0x01);
                    put(&mut inst, bytes.len() as u64);
                    self.section(&mut inst, &mut data).extend_from_slice(bytes);
                    out.extend_from_slice(bytes);
                    continue;
                }
                Op::Run(byte, size) => {
                    inst.push(0x00);
                    put(&mut inst, u64::from(*size));
                    self.section(&mut inst, &mut data).push(*byte);
                    out.resize(out.len() + *size as usize, *byte);
                    continue;
                }
                Op::AddCopy { add, addr: a, size } => {
                    assert!((1..=4).contains(&add.len()) && (4..=6).contains(size));
                    assert!(*a < here + add.len() as u64, "fixture COPY address {a} out of range");
                    inst.push(163 + (add.len() as u8 - 1) * 3 + (*size as u8 - 4));
                    self.section(&mut inst, &mut data).extend_from_slice(add);
                    out.extend_from_slice(add);
                    put(self.section(&mut inst, &mut addr), *a);
                    (*a, *size)
                }
                Op::Copy { addr: a, size } => {
                    assert!(*a < here, "fixture COPY address {a} not below {here}");
                    inst.push(0x13);
                    put(&mut inst, u64::from(*size));
                    put(self.section(&mut inst, &mut addr), *a);
                    (*a, *size)
                }
                Op::CopyHere { addr: a, size } => {
                    assert!(*a < here, "fixture COPY address {a} not below {here}");
                    inst.push(0x23);
                    put(&mut inst, u64::from(*size));
                    put(self.section(&mut inst, &mut addr), here - a);
                    (*a, *size)
                }
                Op::CopyNear { slot, addr: a, size } => {
                    let base = cache.near(*slot);
                    assert!(
                        base <= *a && *a < here,
                        "fixture NEAR address {a} outside {base}..{here}"
                    );
                    inst.push(19 + 16 * (2 + *slot as u8));
                    put(&mut inst, u64::from(*size));
                    put(self.section(&mut inst, &mut addr), a - base);
                    (*a, *size)
                }
                Op::CopySame { addr: a, size } => {
                    assert_eq!(cache.same(*a), *a, "fixture SAME address {a} is not cached");
                    assert!(*a < here, "fixture COPY address {a} not below {here}");
                    let idx = *a as usize % (SAME_ROWS * 256);
                    inst.push(19 + 16 * (2 + NEAR_SLOTS + idx / 256) as u8);
                    put(&mut inst, u64::from(*size));
                    self.section(&mut inst, &mut addr).push((idx % 256) as u8);
                    (*a, *size)
                }
            };
            cache.update(a);
            for i in 0..u64::from(size) {
                let at = (a + i) as usize;
                let b = if at < segment.len() {
                    segment[at]
                } else {
                    out[at - segment.len()]
                };
                out.push(b);
            }
        }

        let indicator = match source {
            Source::None => 0x00,
            Source::Dictionary { .. } => 0x01,
            Source::Target { .. } => 0x02,
        } | if checksum { 0x04 } else { 0x00 };

        let mut tail = Vec::new();
        put(&mut tail, out.len() as u64);
        tail.push(0x00);
        put(&mut tail, data.len() as u64);
        put(&mut tail, inst.len() as u64);
        put(&mut tail, addr.len() as u64);
        if checksum {
            put(&mut tail, u64::from(adler32(&out)));
        }
        tail.extend_from_slice(&data);
        tail.extend_from_slice(&inst);
        tail.extend_from_slice(&addr);

        self.delta.push(indicator);
        if let Source::Dictionary { position, length } | Source::Target { position, length } =
            source
        {
            put(&mut self.delta, length);
            put(&mut self.delta, position);
        }
        put(&mut self.delta, tail.len() as u64);
        self.delta.extend_from_slice(&tail);
        self.target.extend_from_slice(&out);
        self
    }

    /// Interleaved windows keep operands inline in the instructions section.
    fn section<'s>(&self, inst: &'s mut Vec<u8>, other: &'s mut Vec<u8>) -> &'s mut Vec<u8> {
        if self.interleaved { inst } else { other }
    }

    pub fn target(&self) -> &[u8] {
        &self.target
    }

    /// The finished delta and the target it decodes to.
    pub fn finish(&self) -> (Vec<u8>, Vec<u8>) {
        (self.delta.clone(), self.target.clone())
    }
}

fn put(buf: &mut Vec<u8>, value: u64) {
    varint::write_u64(buf, value).unwrap();
}

/// Split `data` at the given (sorted, deduplicated) cut points.
pub fn split_at_cuts<'d>(data: &'d [u8], cuts: &[usize]) -> Vec<&'d [u8]> {
    let mut chunks = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for &cut in cuts {
        let cut = cut.min(data.len());
        if cut > start {
            chunks.push(&data[start..cut]);
            start = cut;
        }
    }
    chunks.push(&data[start..]);
    chunks
}
