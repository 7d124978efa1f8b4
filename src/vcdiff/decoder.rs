// Streaming VCDIFF decoder.
//
// A session walks the delta through a fixed sequence of stages: file header,
// optional custom code table, optional application header, then windows
// until the input ends. Input arrives in arbitrary chunks. Bytes that do not
// yet form a complete header or window body stay buffered inside the decoder
// and are re-examined when the next chunk arrives; nothing is ever parsed
// twice once a stage has consumed it.
//
// A custom code table is itself a tiny VCDIFF delta whose dictionary is the
// serialized default table. It is decoded by a nested session fed directly
// from the outer session's input.

use std::borrow::Cow;

use super::address_cache::AddressCache;
use super::code_table::{
    CodeTable, SERIALIZED_TABLE_LEN, default_code_table, default_table_bytes,
};
use super::error::DecodeError;
use super::header::{FileHeader, FormatVersion, HeaderIndicator, WindowLimits, parse_app_header};
use super::sink::OutputSink;
use super::window::{Progress, WindowDecoder, WindowEnv};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Default cap on the total target size of one delta (64 MiB).
pub const DEFAULT_MAX_TARGET_FILE_SIZE: usize = 1 << 26;
/// Default cap on the target size of a single window (64 MiB).
pub const DEFAULT_MAX_TARGET_WINDOW_SIZE: usize = 1 << 26;
/// Largest value any size option accepts.
pub const MAX_CONFIGURABLE_SIZE: usize = i32::MAX as usize;

/// Per-session decoder settings. Snapshotted by `start_decoding`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderOptions {
    /// Total target bytes a delta may produce (inclusive).
    pub max_target_file_size: usize,
    /// Target bytes a single window may produce (inclusive).
    pub max_target_window_size: usize,
    /// Accept `VCD_TARGET` windows. Keeps every decoded byte in memory.
    pub allow_vcd_target: bool,
    /// Verify Adler-32 checksums of windows that carry one.
    pub verify_checksum: bool,
    /// Stop once exactly this many target bytes have been produced.
    pub planned_target_file_size: Option<usize>,
    /// Record a tagged copy of the output showing where each byte came from.
    pub annotated_output: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            max_target_file_size: DEFAULT_MAX_TARGET_FILE_SIZE,
            max_target_window_size: DEFAULT_MAX_TARGET_WINDOW_SIZE,
            allow_vcd_target: true,
            verify_checksum: true,
            planned_target_file_size: None,
            annotated_output: false,
        }
    }
}

impl DecoderOptions {
    /// Check every size against `MAX_CONFIGURABLE_SIZE`.
    pub fn validate(&self) -> Result<(), DecodeError> {
        check_size("maximum target file size", self.max_target_file_size)?;
        check_size("maximum target window size", self.max_target_window_size)?;
        if let Some(planned) = self.planned_target_file_size {
            check_size("planned target file size", planned)?;
        }
        Ok(())
    }

    /// Settings for the nested session that decodes a custom code table.
    fn for_code_table() -> Self {
        Self {
            planned_target_file_size: Some(SERIALIZED_TABLE_LEN),
            ..Self::default()
        }
    }
}

fn check_size(what: &str, size: usize) -> Result<(), DecodeError> {
    if size > MAX_CONFIGURABLE_SIZE {
        return Err(DecodeError::InvalidConfiguration(format!(
            "{what} {size} exceeds {MAX_CONFIGURABLE_SIZE}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

enum Stage {
    FileHeader,
    CodeTable(Box<TableBootstrap>),
    AppHeader,
    Windows,
    /// The planned target size has been reached.
    Complete,
}

/// State of one decode, from the first delta byte to the last.
struct Session<'d> {
    dictionary: &'d [u8],
    options: DecoderOptions,
    allow_custom_table: bool,
    stage: Stage,
    version: FormatVersion,
    has_app_header: bool,
    code_table: Cow<'static, CodeTable>,
    cache: AddressCache,
    window: WindowDecoder,
    /// Every target byte decoded so far, kept only for `VCD_TARGET`.
    history: Vec<u8>,
    decoded: u64,
    windows: u64,
}

impl<'d> Session<'d> {
    fn new(dictionary: &'d [u8], options: DecoderOptions, allow_custom_table: bool) -> Self {
        Self {
            dictionary,
            options,
            allow_custom_table,
            stage: Stage::FileHeader,
            version: FormatVersion::Standard,
            has_app_header: false,
            code_table: Cow::Borrowed(default_code_table()),
            cache: AddressCache::new(),
            window: WindowDecoder::new(),
            history: Vec::new(),
            decoded: 0,
            windows: 0,
        }
    }

    /// Decode as much of `input` as possible. Returns the number of bytes
    /// consumed; the rest must be offered again, followed by more input.
    fn decode<S: OutputSink + ?Sized>(
        &mut self,
        input: &[u8],
        sink: &mut S,
        mut annotated: Option<&mut Vec<u8>>,
    ) -> Result<usize, DecodeError> {
        let mut pos = 0;
        loop {
            match &mut self.stage {
                Stage::FileHeader => {
                    let Some((header, len)) = FileHeader::parse(&input[pos..])? else {
                        return Ok(pos);
                    };
                    pos += len;
                    self.begin(&header)?;
                }
                Stage::CodeTable(bootstrap) => {
                    let (used, table) = bootstrap.feed(&input[pos..])?;
                    pos += used;
                    let Some((table, cache)) = table else {
                        return Ok(pos);
                    };
                    log::debug!(
                        "custom code table loaded (near={}, same={})",
                        cache.s_near(),
                        cache.s_same()
                    );
                    self.code_table = Cow::Owned(table);
                    self.cache = cache;
                    self.stage = self.after_code_table();
                }
                Stage::AppHeader => {
                    let Some((data, len)) = parse_app_header(&input[pos..])? else {
                        return Ok(pos);
                    };
                    log::debug!("skipping {}-byte application header", data.len());
                    pos += len;
                    self.stage = Stage::Windows;
                }
                Stage::Windows => {
                    if self.planned_size_reached() {
                        self.stage = Stage::Complete;
                        continue;
                    }
                    if pos == input.len() {
                        return Ok(pos);
                    }
                    match self.step_window(&input[pos..])? {
                        Progress::NeedMore { consumed } => return Ok(pos + consumed),
                        Progress::Decoded { consumed } => {
                            pos += consumed;
                            self.commit_window(sink, annotated.as_deref_mut())?;
                        }
                    }
                }
                Stage::Complete => return Ok(pos),
            }
        }
    }

    fn begin(&mut self, header: &FileHeader) -> Result<(), DecodeError> {
        log::debug!(
            "VCDIFF file header: version {:#04X}, indicator {:?}",
            header.version.byte(),
            header.indicator
        );
        self.version = header.version;
        self.has_app_header = header.indicator.contains(HeaderIndicator::APPHEADER);
        self.stage = match header.cache_sizes {
            Some(_) if !self.allow_custom_table => {
                return Err(DecodeError::InvalidCustomTable(
                    "a custom code table may not itself use a custom code table".into(),
                ));
            }
            Some((near, same)) => Stage::CodeTable(Box::new(TableBootstrap::new(near, same)?)),
            None => self.after_code_table(),
        };
        Ok(())
    }

    fn after_code_table(&self) -> Stage {
        if self.has_app_header {
            Stage::AppHeader
        } else {
            Stage::Windows
        }
    }

    fn planned_size_reached(&self) -> bool {
        self.options
            .planned_target_file_size
            .is_some_and(|planned| self.decoded >= planned as u64)
    }

    fn step_window(&mut self, input: &[u8]) -> Result<Progress, DecodeError> {
        let limits = WindowLimits {
            dictionary_len: self.dictionary.len() as u64,
            target_history_len: self
                .options
                .allow_vcd_target
                .then_some(self.history.len() as u64),
            max_window_size: self.options.max_target_window_size as u64,
            max_file_size: self.options.max_target_file_size as u64,
            decoded_so_far: self.decoded,
            planned_file_size: self.options.planned_target_file_size.map(|p| p as u64),
        };
        let env = WindowEnv {
            dictionary: self.dictionary,
            history: &self.history,
            table: &self.code_table,
            cache: &mut self.cache,
            version: self.version,
            verify_checksum: self.options.verify_checksum,
            annotate: self.options.annotated_output,
        };
        self.window.advance(input, &limits, env)
    }

    fn commit_window<S: OutputSink + ?Sized>(
        &mut self,
        sink: &mut S,
        annotated: Option<&mut Vec<u8>>,
    ) -> Result<(), DecodeError> {
        let out = self.window.output();
        if !out.is_empty() {
            sink.reserve(out.len());
            sink.append(out)?;
        }
        if self.options.allow_vcd_target {
            self.history.extend_from_slice(out);
        }
        if let Some(buf) = annotated {
            self.window.write_annotations(buf);
        }
        self.decoded += out.len() as u64;
        self.windows += 1;
        log::trace!(
            "window {} decoded: {} bytes, {} total",
            self.windows,
            out.len(),
            self.decoded
        );
        self.window.reset();
        Ok(())
    }

    /// Check that the delta ended on a clean boundary. `unparsed` is the
    /// number of buffered bytes no stage has consumed.
    fn finish(&self, unparsed: usize) -> Result<(), DecodeError> {
        let truncated = |what: String| Err(DecodeError::InvalidFormat(format!("delta ends {what}")));
        match self.stage {
            Stage::FileHeader => return truncated("inside the file header".into()),
            Stage::CodeTable(_) => return truncated("inside the custom code table".into()),
            Stage::AppHeader => return truncated("inside the application header".into()),
            Stage::Windows | Stage::Complete => {}
        }
        if let Some(phase) = self.window.pending_phase() {
            return truncated(format!("while {phase} of window {}", self.windows + 1));
        }
        if unparsed > 0 {
            return match self.stage {
                Stage::Complete => Err(DecodeError::InvalidFormat(format!(
                    "{unparsed} bytes follow the planned end of the target"
                ))),
                _ => truncated(format!(
                    "inside the header of window {} ({unparsed} bytes left)",
                    self.windows + 1
                )),
            };
        }
        if let Some(planned) = self.options.planned_target_file_size
            && self.decoded < planned as u64
        {
            return truncated(format!(
                "after {} of {planned} planned target bytes",
                self.decoded
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Custom code table
// ---------------------------------------------------------------------------

/// Decodes an embedded custom code table.
struct TableBootstrap {
    session: Session<'static>,
    table: Vec<u8>,
    near: u8,
    same: u8,
}

impl TableBootstrap {
    fn new(near: u8, same: u8) -> Result<Self, DecodeError> {
        // Reject impossible cache sizes before reading the table.
        AddressCache::with_sizes(near, same)?;
        Ok(Self {
            session: Session::new(default_table_bytes(), DecoderOptions::for_code_table(), false),
            table: Vec::with_capacity(SERIALIZED_TABLE_LEN),
            near,
            same,
        })
    }

    /// Feed input following what was consumed so far. Once the table is
    /// complete, returns it with a cache of the announced sizes.
    fn feed(
        &mut self,
        input: &[u8],
    ) -> Result<(usize, Option<(CodeTable, AddressCache)>), DecodeError> {
        let used = self
            .session
            .decode(input, &mut self.table, None)
            .map_err(|e| DecodeError::InvalidCustomTable(e.to_string()))?;
        if !matches!(self.session.stage, Stage::Complete) {
            return Ok((used, None));
        }
        let cache = AddressCache::with_sizes(self.near, self.same)?;
        let table = CodeTable::from_bytes(&self.table)?;
        table.validate(cache.last_mode())?;
        Ok((used, Some((table, cache))))
    }
}

/// Decode a complete custom code table from the front of `input`.
pub(crate) fn read_custom_code_table(
    input: &[u8],
    near: u8,
    same: u8,
) -> Result<(CodeTable, AddressCache, usize), DecodeError> {
    let mut bootstrap = TableBootstrap::new(near, same)?;
    match bootstrap.feed(input)? {
        (used, Some((table, cache))) => Ok((table, cache, used)),
        (_, None) => Err(DecodeError::InvalidFormat(
            "delta ends inside the custom code table".into(),
        )),
    }
}

// ---------------------------------------------------------------------------
// Streaming decoder
// ---------------------------------------------------------------------------

/// Chunked VCDIFF decoder.
///
/// ```
/// use oxipatch::vcdiff::StreamingDecoder;
///
/// // A delta with one window: RUN of 4 'z' bytes, no source segment.
/// let delta = [
///     0xD6, 0xC3, 0xC4, 0x00, 0x00, // file header
///     0x00, 0x08, 0x04, 0x00, 0x01, 0x02, 0x00, b'z', 0x00, 0x04,
/// ];
///
/// let mut decoder = StreamingDecoder::new();
/// let mut target = Vec::new();
/// decoder.start_decoding(b"").unwrap();
/// for chunk in delta.chunks(3) {
///     decoder.decode_chunk(chunk, &mut target).unwrap();
/// }
/// decoder.finish_decoding().unwrap();
/// assert_eq!(target, b"zzzz");
/// ```
pub struct StreamingDecoder<'d> {
    options: DecoderOptions,
    session: Option<Session<'d>>,
    /// Input received but not yet consumed by the session.
    unparsed: Vec<u8>,
    annotated: Vec<u8>,
    bytes_decoded: u64,
    windows_decoded: u64,
}

impl<'d> StreamingDecoder<'d> {
    pub fn new() -> Self {
        Self::with_options(DecoderOptions::default())
    }

    pub fn with_options(options: DecoderOptions) -> Self {
        Self {
            options,
            session: None,
            unparsed: Vec::new(),
            annotated: Vec::new(),
            bytes_decoded: 0,
            windows_decoded: 0,
        }
    }

    pub fn options(&self) -> &DecoderOptions {
        &self.options
    }

    /// Begin a session against `dictionary`. Options are fixed from here
    /// until the session ends.
    pub fn start_decoding(&mut self, dictionary: &'d [u8]) -> Result<(), DecodeError> {
        if self.session.is_some() {
            return Err(DecodeError::InvalidLifecycleCall(
                "start_decoding called while a decode is in progress",
            ));
        }
        self.options.validate()?;
        self.unparsed.clear();
        self.annotated.clear();
        self.bytes_decoded = 0;
        self.windows_decoded = 0;
        self.session = Some(Session::new(dictionary, self.options.clone(), true));
        log::debug!("decode started with a {}-byte dictionary", dictionary.len());
        Ok(())
    }

    /// Feed the next piece of the delta. Target bytes of every window that
    /// is now complete are appended to `output`; earlier contents of
    /// `output` are left alone.
    ///
    /// Any error ends the session.
    pub fn decode_chunk<S: OutputSink + ?Sized>(
        &mut self,
        data: &[u8],
        output: &mut S,
    ) -> Result<(), DecodeError> {
        let Some(session) = self.session.as_mut() else {
            return Err(DecodeError::InvalidLifecycleCall(
                "decode_chunk called before start_decoding",
            ));
        };
        let annotated = session.options.annotated_output.then_some(&mut self.annotated);

        let result = if self.unparsed.is_empty() {
            // Common case: decode straight from the caller's chunk.
            session.decode(data, output, annotated).map(|used| {
                self.unparsed.extend_from_slice(&data[used..]);
            })
        } else {
            self.unparsed.extend_from_slice(data);
            session.decode(&self.unparsed, output, annotated).map(|used| {
                self.unparsed.drain(..used);
            })
        };
        self.bytes_decoded = session.decoded;
        self.windows_decoded = session.windows;

        if let Err(e) = result {
            log::warn!("VCDIFF decode failed: {e}");
            self.abort();
            return Err(e);
        }
        Ok(())
    }

    /// End the session, failing if the delta stopped partway through.
    pub fn finish_decoding(&mut self) -> Result<(), DecodeError> {
        let Some(session) = self.session.take() else {
            return Err(DecodeError::InvalidLifecycleCall(
                "finish_decoding called without a decode in progress",
            ));
        };
        let result = session.finish(self.unparsed.len());
        self.unparsed.clear();
        match &result {
            Ok(()) => log::debug!(
                "decode finished: {} windows, {} bytes",
                self.windows_decoded,
                self.bytes_decoded
            ),
            Err(e) => log::warn!("VCDIFF decode failed: {e}"),
        }
        result
    }

    pub fn is_decoding(&self) -> bool {
        self.session.is_some()
    }

    /// Target bytes produced by the current (or last) session.
    pub fn target_bytes_decoded(&self) -> u64 {
        self.bytes_decoded
    }

    /// Windows decoded by the current (or last) session.
    pub fn windows_decoded(&self) -> u64 {
        self.windows_decoded
    }

    pub fn set_maximum_target_file_size(&mut self, size: usize) -> Result<(), DecodeError> {
        check_size("maximum target file size", size)?;
        self.options.max_target_file_size = size;
        Ok(())
    }

    pub fn set_maximum_target_window_size(&mut self, size: usize) -> Result<(), DecodeError> {
        check_size("maximum target window size", size)?;
        self.options.max_target_window_size = size;
        Ok(())
    }

    pub fn set_allow_vcd_target(&mut self, allow: bool) {
        self.options.allow_vcd_target = allow;
    }

    pub fn set_verify_checksum(&mut self, verify: bool) {
        self.options.verify_checksum = verify;
    }

    pub fn set_planned_target_file_size(&mut self, size: Option<usize>) -> Result<(), DecodeError> {
        if let Some(size) = size {
            check_size("planned target file size", size)?;
        }
        self.options.planned_target_file_size = size;
        Ok(())
    }

    /// Start annotating. A running session picks this up from the next
    /// window it decodes.
    pub fn enable_annotated_output(&mut self) {
        self.set_annotated_output(true);
    }

    /// Stop annotating and drop what was recorded, including in a running
    /// session.
    pub fn disable_annotated_output(&mut self) {
        self.set_annotated_output(false);
        self.annotated.clear();
    }

    fn set_annotated_output(&mut self, on: bool) {
        self.options.annotated_output = on;
        if let Some(session) = self.session.as_mut() {
            session.options.annotated_output = on;
        }
    }

    /// Output recorded since the session started, with each run of bytes
    /// wrapped in `<dmatch>`, `<bmatch>` or `<literal>` tags.
    pub fn annotated_output(&self) -> &[u8] {
        &self.annotated
    }

    fn abort(&mut self) {
        self.session = None;
        self.unparsed.clear();
    }
}

impl Default for StreamingDecoder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// One-shot decoding
// ---------------------------------------------------------------------------

/// Whole-buffer decoder with fixed options.
#[derive(Debug, Clone, Default)]
pub struct VcdiffDecoder {
    options: DecoderOptions,
}

impl VcdiffDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: DecoderOptions) -> Self {
        Self { options }
    }

    /// Decode a complete delta, appending the target to `output`.
    pub fn decode_to<S: OutputSink + ?Sized>(
        &self,
        dictionary: &[u8],
        delta: &[u8],
        output: &mut S,
    ) -> Result<(), DecodeError> {
        let mut decoder = StreamingDecoder::with_options(self.options.clone());
        decoder.start_decoding(dictionary)?;
        decoder.decode_chunk(delta, output)?;
        decoder.finish_decoding()
    }

    pub fn decode(&self, dictionary: &[u8], delta: &[u8]) -> Result<Vec<u8>, DecodeError> {
        let mut target = Vec::new();
        self.decode_to(dictionary, delta, &mut target)?;
        Ok(target)
    }
}

/// Decode a complete delta against `dictionary` with default options.
pub fn decode(dictionary: &[u8], delta: &[u8]) -> Result<Vec<u8>, DecodeError> {
    VcdiffDecoder::new().decode(dictionary, delta)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
