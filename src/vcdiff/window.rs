// Window decoding (RFC 3284, Sections 4.3 and 5).
//
// A window is decoded in two steps. Its header is parsed as soon as it is
// complete; then the body (data, instructions, addresses) is buffered until
// all of it has arrived and executed in one go. Output is staged in the
// window's own buffer and only handed to the caller once the whole window
// (including its checksum) has been verified.

use std::fmt;

use super::address_cache::AddressCache;
use super::checksum::adler32;
use super::code_table::CodeTable;
use super::error::DecodeError;
use super::header::{FormatVersion, WindowHeader, WindowIndicator, WindowLimits};
use super::instruction::{Instruction, InstructionDecoder, WindowSections};

/// Where a window is in its decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPhase {
    ReadingHeader,
    ReadingDataSection,
    ReadingInstructionsSection,
    ReadingAddressesSection,
    Executing,
    Done,
}

impl fmt::Display for WindowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ReadingHeader => "reading the window header",
            Self::ReadingDataSection => "reading the data section",
            Self::ReadingInstructionsSection => "reading the instructions section",
            Self::ReadingAddressesSection => "reading the addresses section",
            Self::Executing => "executing instructions",
            Self::Done => "done",
        })
    }
}

/// Origin of a run of target bytes, for annotated output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Copied from the dictionary.
    Dictionary,
    /// Copied from earlier target output, in this window or a previous one.
    Target,
    /// Added or run-length encoded by the delta itself.
    Literal,
}

impl Provenance {
    pub fn tag(self) -> &'static str {
        match self {
            Self::Dictionary => "dmatch",
            Self::Target => "bmatch",
            Self::Literal => "literal",
        }
    }
}

/// A run of `len` consecutive target bytes with a single provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub kind: Provenance,
    pub len: usize,
}

fn push_span(spans: &mut Vec<Span>, kind: Provenance, len: usize) {
    if len == 0 {
        return;
    }
    match spans.last_mut() {
        Some(last) if last.kind == kind => last.len += len,
        _ => spans.push(Span { kind, len }),
    }
}

/// Session state a window needs to execute.
pub(crate) struct WindowEnv<'e> {
    pub dictionary: &'e [u8],
    /// Target bytes of earlier windows, when `VCD_TARGET` is allowed.
    pub history: &'e [u8],
    pub table: &'e CodeTable,
    pub cache: &'e mut AddressCache,
    pub version: FormatVersion,
    pub verify_checksum: bool,
    pub annotate: bool,
}

/// Outcome of feeding buffered bytes to a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Progress {
    /// The window needs more input. `consumed` bytes (a complete header)
    /// were taken from the front of the buffer.
    NeedMore { consumed: usize },
    /// The window was decoded and verified; its target bytes are staged.
    Decoded { consumed: usize },
}

/// Decoder for one window at a time. Reused across the windows of a session.
#[derive(Debug)]
pub(crate) struct WindowDecoder {
    phase: WindowPhase,
    header: Option<WindowHeader>,
    out: Vec<u8>,
    spans: Vec<Span>,
}

impl WindowDecoder {
    pub fn new() -> Self {
        Self {
            phase: WindowPhase::ReadingHeader,
            header: None,
            out: Vec::new(),
            spans: Vec::new(),
        }
    }

    /// Feed the buffered input that follows everything consumed so far.
    pub fn advance(
        &mut self,
        input: &[u8],
        limits: &WindowLimits,
        env: WindowEnv<'_>,
    ) -> Result<Progress, DecodeError> {
        let mut consumed = 0;
        let header = match self.header.take() {
            Some(h) => h,
            None => {
                self.phase = WindowPhase::ReadingHeader;
                match WindowHeader::parse(input, limits)? {
                    None => return Ok(Progress::NeedMore { consumed: 0 }),
                    Some((h, len)) => {
                        consumed = len;
                        h
                    }
                }
            }
        };

        let available = (input.len() - consumed) as u64;
        let body_len = header.body_len();
        if available < body_len {
            self.phase = if available < header.data_len {
                WindowPhase::ReadingDataSection
            } else if available < header.data_len + header.inst_len {
                WindowPhase::ReadingInstructionsSection
            } else {
                WindowPhase::ReadingAddressesSection
            };
            self.header = Some(header);
            return Ok(Progress::NeedMore { consumed });
        }

        self.phase = WindowPhase::Executing;
        let body = &input[consumed..consumed + body_len as usize];
        self.execute(&header, body, env)?;
        self.phase = WindowPhase::Done;
        Ok(Progress::Decoded {
            consumed: consumed + body_len as usize,
        })
    }

    /// The phase a truncated delta stopped in, if a window was started but
    /// not finished.
    pub fn pending_phase(&self) -> Option<WindowPhase> {
        self.header.as_ref().map(|_| self.phase)
    }

    /// Target bytes of the window just decoded.
    pub fn output(&self) -> &[u8] {
        &self.out
    }

    /// Provenance of the window just decoded, in output order. Empty unless
    /// annotation was on.
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// Render the decoded window with provenance tags into `buf`.
    pub fn write_annotations(&self, buf: &mut Vec<u8>) {
        let mut pos = 0;
        for span in self.spans() {
            let tag = span.kind.tag();
            buf.push(b'<');
            buf.extend_from_slice(tag.as_bytes());
            buf.push(b'>');
            buf.extend_from_slice(&self.out[pos..pos + span.len]);
            buf.extend_from_slice(b"</");
            buf.extend_from_slice(tag.as_bytes());
            buf.push(b'>');
            pos += span.len;
        }
    }

    /// Prepare for the next window once the staged output has been taken.
    pub fn reset(&mut self) {
        self.phase = WindowPhase::ReadingHeader;
        self.header = None;
        self.out.clear();
        self.spans.clear();
    }

    fn execute(
        &mut self,
        header: &WindowHeader,
        body: &[u8],
        env: WindowEnv<'_>,
    ) -> Result<(), DecodeError> {
        let (segment, segment_kind) = match header.segment {
            None => (&[][..], Provenance::Literal),
            Some(seg) => {
                let (space, kind) = if header.indicator.contains(WindowIndicator::SOURCE) {
                    (env.dictionary, Provenance::Dictionary)
                } else {
                    (env.history, Provenance::Target)
                };
                let bytes = usize::try_from(seg.position)
                    .ok()
                    .zip(usize::try_from(seg.position + seg.length).ok())
                    .and_then(|(start, end)| space.get(start..end))
                    .ok_or_else(|| {
                        DecodeError::InvalidFormat(format!(
                            "source segment {}+{} is not available",
                            seg.position, seg.length
                        ))
                    })?;
                (bytes, kind)
            }
        };

        let (data, rest) = body.split_at(header.data_len as usize);
        let (inst, addr) = rest.split_at(header.inst_len as usize);
        let sections = WindowSections {
            data,
            inst,
            addr,
            interleaved: header.is_interleaved(env.version),
        };

        self.out.clear();
        self.spans.clear();
        self.out.reserve(header.target_len as usize);

        env.cache.init();
        let mut decoder = InstructionDecoder::new(
            env.table,
            env.cache,
            sections,
            segment.len() as u64,
            header.target_len,
        );
        while let Some(inst) = decoder.next_instruction()? {
            let spans = env.annotate.then_some(&mut self.spans);
            apply(inst, segment, segment_kind, &mut self.out, spans);
        }
        decoder.finish()?;

        if let Some(expected) = header.checksum
            && env.verify_checksum
        {
            let actual = adler32(&self.out);
            if actual != expected {
                return Err(DecodeError::ChecksumMismatch { expected, actual });
            }
        }
        Ok(())
    }
}

/// Append the bytes produced by one instruction to `out`.
///
/// COPY addresses below the segment length refer to the segment; the rest
/// refer to `out` itself. The address cache already guaranteed that every
/// address lies below the position the copy starts at.
fn apply(
    inst: Instruction<'_>,
    segment: &[u8],
    segment_kind: Provenance,
    out: &mut Vec<u8>,
    mut spans: Option<&mut Vec<Span>>,
) {
    let mut note = |kind: Provenance, len: usize| {
        if let Some(spans) = spans.as_deref_mut() {
            push_span(spans, kind, len);
        }
    };

    match inst {
        Instruction::Add(bytes) => {
            out.extend_from_slice(bytes);
            note(Provenance::Literal, bytes.len());
        }
        Instruction::Run { byte, size } => {
            out.resize(out.len() + size as usize, byte);
            note(Provenance::Literal, size as usize);
        }
        Instruction::Copy { address, size, .. } => {
            let mut addr = address as usize;
            let mut remaining = size as usize;

            if addr < segment.len() {
                let n = remaining.min(segment.len() - addr);
                out.extend_from_slice(&segment[addr..addr + n]);
                note(segment_kind, n);
                addr += n;
                remaining -= n;
            }

            if remaining > 0 {
                let start = addr - segment.len();
                let end = start + remaining;
                if end <= out.len() {
                    out.extend_from_within(start..end);
                } else {
                    // Overlapping copy: each byte may be one this copy wrote.
                    for i in start..end {
                        let b = out[i];
                        out.push(b);
                    }
                }
                note(Provenance::Target, remaining);
            }
        }
    }
}
