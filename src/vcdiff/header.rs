// VCDIFF file header and per-window header parsing (RFC 3284, Sections 4.1-4.3).
//
// Parsers work on the bytes buffered so far. They return `Ok(None)` when the
// header is not complete yet and consume nothing in that case, so the caller
// can simply retry with a longer buffer. Fields are validated as soon as
// their bytes are present: a bad indicator byte fails immediately even if the
// rest of the header has not arrived.

use bitflags::bitflags;

use super::error::DecodeError;
use super::varint::{self, VarintError};

// ---------------------------------------------------------------------------
// Magic and version
// ---------------------------------------------------------------------------

pub const VCDIFF_MAGIC: [u8; 3] = [0xD6, 0xC3, 0xC4];

/// Version byte of a plain RFC 3284 delta.
pub const VERSION_STANDARD: u8 = 0x00;
/// Version byte of the SDCH variant, which allows interleaved sections.
pub const VERSION_SDCH: u8 = b'S';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatVersion {
    Standard,
    Sdch,
}

impl FormatVersion {
    pub fn byte(self) -> u8 {
        match self {
            Self::Standard => VERSION_STANDARD,
            Self::Sdch => VERSION_SDCH,
        }
    }

    /// Whether windows may use the interleaved layout.
    pub fn allows_interleaved(self) -> bool {
        self == Self::Sdch
    }
}

// ---------------------------------------------------------------------------
// Indicator bytes
// ---------------------------------------------------------------------------

bitflags! {
    /// Hdr_Indicator.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HeaderIndicator: u8 {
        /// Secondary compressor present (unsupported).
        const DECOMPRESS = 0x01;
        /// Custom code table follows.
        const CODETABLE = 0x02;
        /// Application header follows (xdelta3 extension).
        const APPHEADER = 0x04;
    }

    /// Win_Indicator.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WindowIndicator: u8 {
        /// Source segment taken from the dictionary.
        const SOURCE = 0x01;
        /// Source segment taken from earlier target output.
        const TARGET = 0x02;
        /// An Adler-32 of the window's target follows the section lengths.
        const CHECKSUM = 0x04;
    }

    /// Delta_Indicator: per-section secondary compression.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeltaIndicator: u8 {
        const DATACOMP = 0x01;
        const INSTCOMP = 0x02;
        const ADDRCOMP = 0x04;
    }
}

// ---------------------------------------------------------------------------
// Field reader
// ---------------------------------------------------------------------------

/// Cursor over buffered header bytes. `None` from any read means "not
/// enough bytes yet".
struct FieldReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn byte(&mut self) -> Option<u8> {
        let b = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let out = self.data.get(self.pos..self.pos.checked_add(len)?)?;
        self.pos += len;
        Some(out)
    }

    fn u32(&mut self, field: &'static str) -> Result<Option<u64>, DecodeError> {
        self.varint(field, |d| varint::read_u32(d).map(|(v, n)| (u64::from(v), n)))
    }

    fn u64(&mut self, field: &'static str) -> Result<Option<u64>, DecodeError> {
        self.varint(field, varint::read_u64)
    }

    fn varint(
        &mut self,
        field: &'static str,
        read: impl Fn(&[u8]) -> Result<(u64, usize), VarintError>,
    ) -> Result<Option<u64>, DecodeError> {
        match read(&self.data[self.pos..]) {
            Ok((val, len)) => {
                self.pos += len;
                Ok(Some(val))
            }
            Err(VarintError::Incomplete) => Ok(None),
            Err(VarintError::Malformed) => Err(DecodeError::MalformedVarint { field }),
        }
    }
}

// ---------------------------------------------------------------------------
// File header
// ---------------------------------------------------------------------------

/// Fixed part of the file header, up to (not including) an embedded custom
/// code table or application header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub version: FormatVersion,
    pub indicator: HeaderIndicator,
    /// `(s_near, s_same)` when a custom code table follows.
    pub cache_sizes: Option<(u8, u8)>,
}

impl FileHeader {
    /// Parse the fixed file header. Returns the header and the bytes it used.
    pub fn parse(input: &[u8]) -> Result<Option<(Self, usize)>, DecodeError> {
        let mut r = FieldReader::new(input);

        for &expected in &VCDIFF_MAGIC {
            let Some(b) = r.byte() else { return Ok(None) };
            if b != expected {
                return Err(DecodeError::InvalidFormat(format!(
                    "bad magic byte {b:#04X} (expected {expected:#04X})"
                )));
            }
        }

        let Some(version) = r.byte() else { return Ok(None) };
        let version = match version {
            VERSION_STANDARD => FormatVersion::Standard,
            VERSION_SDCH => FormatVersion::Sdch,
            other => {
                return Err(DecodeError::UnsupportedFeature(format!(
                    "VCDIFF version byte {other:#04X}"
                )));
            }
        };

        let Some(ind) = r.byte() else { return Ok(None) };
        let Some(indicator) = HeaderIndicator::from_bits(ind) else {
            return Err(DecodeError::InvalidFormat(format!(
                "invalid header indicator bits {ind:#04X}"
            )));
        };
        if indicator.contains(HeaderIndicator::DECOMPRESS) {
            return Err(DecodeError::UnsupportedFeature(
                "secondary compression (VCD_DECOMPRESS)".into(),
            ));
        }

        let cache_sizes = if indicator.contains(HeaderIndicator::CODETABLE) {
            let Some(near) = r.byte() else { return Ok(None) };
            let Some(same) = r.byte() else { return Ok(None) };
            Some((near, same))
        } else {
            None
        };

        let header = Self {
            version,
            indicator,
            cache_sizes,
        };
        Ok(Some((header, r.pos)))
    }
}

/// Parse an application header: a varint length followed by that many bytes.
/// Returns the payload and the bytes used.
pub fn parse_app_header(input: &[u8]) -> Result<Option<(&[u8], usize)>, DecodeError> {
    let mut r = FieldReader::new(input);
    let Some(len) = r.u32("application header length")? else {
        return Ok(None);
    };
    let Some(data) = r.bytes(len as usize) else {
        return Ok(None);
    };
    Ok(Some((data, r.pos)))
}

// ---------------------------------------------------------------------------
// Window header
// ---------------------------------------------------------------------------

/// Source segment of a window: `length` bytes starting at `position` in the
/// dictionary (`VCD_SOURCE`) or in earlier target output (`VCD_TARGET`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSegment {
    pub length: u64,
    pub position: u64,
}

/// What a window header may reference and produce, given the session state.
#[derive(Debug, Clone, Copy)]
pub struct WindowLimits {
    pub dictionary_len: u64,
    /// Target bytes available to `VCD_TARGET` segments; `None` when such
    /// windows are not allowed.
    pub target_history_len: Option<u64>,
    pub max_window_size: u64,
    pub max_file_size: u64,
    /// Target bytes produced by earlier windows.
    pub decoded_so_far: u64,
    /// Exact target size the session stops at, if any.
    pub planned_file_size: Option<u64>,
}

impl WindowLimits {
    /// Limits that accept any well-formed header. Used for inspection.
    pub fn permissive() -> Self {
        Self {
            dictionary_len: u64::MAX,
            target_history_len: Some(u64::MAX),
            max_window_size: u64::MAX,
            max_file_size: u64::MAX,
            decoded_so_far: 0,
            planned_file_size: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowHeader {
    pub indicator: WindowIndicator,
    pub segment: Option<SourceSegment>,
    /// Length of everything after the delta-encoding-length field.
    pub delta_len: u64,
    pub target_len: u64,
    pub delta_indicator: DeltaIndicator,
    pub data_len: u64,
    pub inst_len: u64,
    pub addr_len: u64,
    pub checksum: Option<u32>,
}

impl WindowHeader {
    /// Parse a window header. Returns the header and the bytes it used; the
    /// three sections follow immediately.
    pub fn parse(
        input: &[u8],
        limits: &WindowLimits,
    ) -> Result<Option<(Self, usize)>, DecodeError> {
        let mut r = FieldReader::new(input);

        let Some(ind) = r.byte() else { return Ok(None) };
        let Some(indicator) = WindowIndicator::from_bits(ind) else {
            return Err(DecodeError::InvalidFormat(format!(
                "invalid window indicator bits {ind:#04X}"
            )));
        };
        if indicator.contains(WindowIndicator::SOURCE | WindowIndicator::TARGET) {
            return Err(DecodeError::InvalidFormat(
                "window sets both VCD_SOURCE and VCD_TARGET".into(),
            ));
        }
        if indicator.contains(WindowIndicator::TARGET) && limits.target_history_len.is_none() {
            return Err(DecodeError::UnsupportedFeature(
                "VCD_TARGET windows are disabled for this session".into(),
            ));
        }

        let segment = if indicator.intersects(WindowIndicator::SOURCE | WindowIndicator::TARGET) {
            let Some(length) = r.u32("source segment length")? else {
                return Ok(None);
            };
            let Some(position) = r.u32("source segment position")? else {
                return Ok(None);
            };
            let (available, what) = if indicator.contains(WindowIndicator::SOURCE) {
                (limits.dictionary_len, "dictionary")
            } else {
                (limits.target_history_len.unwrap_or(0), "decoded target")
            };
            if position + length > available {
                return Err(DecodeError::InvalidFormat(format!(
                    "source segment {position}+{length} lies outside the {what} ({available} bytes)"
                )));
            }
            Some(SourceSegment { length, position })
        } else {
            None
        };

        let Some(delta_len) = r.u32("delta encoding length")? else {
            return Ok(None);
        };
        let delta_start = r.pos;

        let Some(target_len) = r.u32("target window length")? else {
            return Ok(None);
        };
        check_target_len(target_len, limits)?;

        let Some(del) = r.byte() else { return Ok(None) };
        let delta_indicator = match DeltaIndicator::from_bits(del) {
            Some(d) if d.is_empty() => d,
            Some(_) => {
                return Err(DecodeError::UnsupportedFeature(format!(
                    "secondary compression of window sections (delta indicator {del:#04X})"
                )));
            }
            None => {
                return Err(DecodeError::InvalidFormat(format!(
                    "invalid delta indicator bits {del:#04X}"
                )));
            }
        };

        let Some(data_len) = r.u32("data section length")? else {
            return Ok(None);
        };
        let Some(inst_len) = r.u32("instructions section length")? else {
            return Ok(None);
        };
        let Some(addr_len) = r.u32("addresses section length")? else {
            return Ok(None);
        };

        let checksum = if indicator.contains(WindowIndicator::CHECKSUM) {
            let Some(sum) = r.u64("window checksum")? else {
                return Ok(None);
            };
            let sum = u32::try_from(sum).map_err(|_| DecodeError::MalformedVarint {
                field: "window checksum",
            })?;
            Some(sum)
        } else {
            None
        };

        let declared = (r.pos - delta_start) as u64 + data_len + inst_len + addr_len;
        if declared != delta_len {
            return Err(DecodeError::InvalidFormat(format!(
                "delta encoding length {delta_len} does not match the {declared} bytes declared by the window"
            )));
        }

        let header = Self {
            indicator,
            segment,
            delta_len,
            target_len,
            delta_indicator,
            data_len,
            inst_len,
            addr_len,
            checksum,
        };
        Ok(Some((header, r.pos)))
    }

    /// Bytes following the header: the three sections.
    pub fn body_len(&self) -> u64 {
        self.data_len + self.inst_len + self.addr_len
    }

    pub fn segment_len(&self) -> u64 {
        self.segment.map_or(0, |s| s.length)
    }

    /// Interleaved windows keep data and addresses inside the instruction
    /// section and declare the other two empty.
    pub fn is_interleaved(&self, version: FormatVersion) -> bool {
        version.allows_interleaved() && self.data_len == 0 && self.addr_len == 0
    }
}

fn check_target_len(target_len: u64, limits: &WindowLimits) -> Result<(), DecodeError> {
    if target_len > limits.max_window_size {
        return Err(DecodeError::SizeLimitExceeded {
            what: "target window",
            size: target_len,
            limit: limits.max_window_size,
        });
    }
    let total = limits.decoded_so_far + target_len;
    if total > limits.max_file_size {
        return Err(DecodeError::SizeLimitExceeded {
            what: "target file",
            size: total,
            limit: limits.max_file_size,
        });
    }
    if let Some(planned) = limits.planned_file_size
        && total > planned
    {
        return Err(DecodeError::SizeLimitExceeded {
            what: "planned target file",
            size: total,
            limit: planned,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
