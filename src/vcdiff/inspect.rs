// Structural inspection of a complete delta, without a dictionary.
//
// Walks the file header and every window header, optionally decoding the
// instruction stream too. Nothing is executed, so source segments and size
// limits are not checked against any real session.

use super::address_cache::AddressCache;
use super::code_table::{CodeTable, default_code_table};
use super::decoder::read_custom_code_table;
use super::error::DecodeError;
use super::header::{
    FileHeader, FormatVersion, HeaderIndicator, WindowHeader, WindowIndicator, WindowLimits,
    parse_app_header,
};
use super::instruction::{Instruction, InstructionDecoder, WindowSections};

/// Header-level view of a delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaSummary {
    pub version: FormatVersion,
    pub indicator: HeaderIndicator,
    /// `(s_near, s_same)` of an embedded custom code table.
    pub custom_code_table: Option<(u8, u8)>,
    pub app_header: Option<Vec<u8>>,
    /// Bytes before the first window.
    pub header_len: usize,
    pub windows: Vec<WindowSummary>,
}

impl DeltaSummary {
    pub fn target_len(&self) -> u64 {
        self.windows.iter().map(|w| w.header.target_len).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSummary {
    /// Offset of the window header within the delta.
    pub offset: usize,
    pub header_len: usize,
    /// Offset of the window's first byte within the target.
    pub target_offset: u64,
    pub interleaved: bool,
    pub header: WindowHeader,
}

impl WindowSummary {
    pub fn source_kind(&self) -> &'static str {
        if self.header.indicator.contains(WindowIndicator::SOURCE) {
            "dictionary"
        } else if self.header.indicator.contains(WindowIndicator::TARGET) {
            "target"
        } else {
            "none"
        }
    }
}

/// Decoded instruction stream of one window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInstructions<'a> {
    pub window: WindowSummary,
    pub instructions: Vec<Instruction<'a>>,
}

/// Summarize the headers of a complete delta.
pub fn inspect(delta: &[u8]) -> Result<DeltaSummary, DecodeError> {
    walk(delta, |_, _, _, _| Ok(()))
}

/// Decode the instruction stream of every window of a complete delta.
pub fn instructions(delta: &[u8]) -> Result<Vec<WindowInstructions<'_>>, DecodeError> {
    let mut out = Vec::new();
    walk(delta, |window, body, table, cache| {
        let header = &window.header;
        let (data, rest) = body.split_at(header.data_len as usize);
        let (inst, addr) = rest.split_at(header.inst_len as usize);
        let sections = WindowSections {
            data,
            inst,
            addr,
            interleaved: window.interleaved,
        };
        cache.init();
        let mut decoder =
            InstructionDecoder::new(table, cache, sections, header.segment_len(), header.target_len);
        let instructions = decoder.by_ref().collect::<Result<Vec<_>, _>>()?;
        decoder.finish()?;
        out.push(WindowInstructions {
            window: window.clone(),
            instructions,
        });
        Ok(())
    })?;
    Ok(out)
}

fn walk<'a, F>(delta: &'a [u8], mut visit: F) -> Result<DeltaSummary, DecodeError>
where
    F: FnMut(&WindowSummary, &'a [u8], &CodeTable, &mut AddressCache) -> Result<(), DecodeError>,
{
    let truncated = |what: &str| DecodeError::InvalidFormat(format!("delta ends inside {what}"));

    let (file_header, mut pos) =
        FileHeader::parse(delta)?.ok_or_else(|| truncated("the file header"))?;

    let custom;
    let (table, mut cache): (&CodeTable, AddressCache) = match file_header.cache_sizes {
        Some((near, same)) => {
            let (t, cache, used) = read_custom_code_table(&delta[pos..], near, same)?;
            pos += used;
            custom = t;
            (&custom, cache)
        }
        None => (default_code_table(), AddressCache::new()),
    };

    let app_header = if file_header.indicator.contains(HeaderIndicator::APPHEADER) {
        let (data, used) =
            parse_app_header(&delta[pos..])?.ok_or_else(|| truncated("the application header"))?;
        pos += used;
        Some(data.to_vec())
    } else {
        None
    };
    let header_len = pos;

    let limits = WindowLimits::permissive();
    let mut windows = Vec::new();
    let mut target_offset = 0u64;
    while pos < delta.len() {
        let (header, len) = WindowHeader::parse(&delta[pos..], &limits)?
            .ok_or_else(|| truncated("a window header"))?;
        let body_start = pos + len;
        let body = delta
            .get(body_start..body_start + header.body_len() as usize)
            .ok_or_else(|| truncated("a window body"))?;

        let summary = WindowSummary {
            offset: pos,
            header_len: len,
            target_offset,
            interleaved: header.is_interleaved(file_header.version),
            header,
        };
        visit(&summary, body, table, &mut cache)?;

        target_offset += summary.header.target_len;
        pos = body_start + body.len();
        windows.push(summary);
    }

    Ok(DeltaSummary {
        version: file_header.version,
        indicator: file_header.indicator,
        custom_code_table: file_header.cache_sizes,
        app_header,
        header_len,
        windows,
    })
}
