// Command-line front end for oxipatch.
//
// Explicit subcommands with long-form options. Decoding streams the delta
// through the chunked decoder; the inspection commands read the whole delta
// and never need the dictionary.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};

use crate::io::{DEFAULT_BUFFER_SIZE, DecodeStats, decode_stream};
use crate::vcdiff::decoder::{
    DEFAULT_MAX_TARGET_FILE_SIZE, DEFAULT_MAX_TARGET_WINDOW_SIZE, DecoderOptions,
    MAX_CONFIGURABLE_SIZE,
};
use crate::vcdiff::header::{DeltaIndicator, HeaderIndicator, WindowIndicator};
use crate::vcdiff::inspect::{self, DeltaSummary, WindowSummary};
use crate::vcdiff::Instruction;

const BUF_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Byte size parsing (supports K, M, G suffixes)
// ---------------------------------------------------------------------------

fn parse_byte_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".into());
    }
    let (num_part, multiplier) = match s.as_bytes().last() {
        Some(b'k' | b'K') => (&s[..s.len() - 1], 1024u64),
        Some(b'm' | b'M') => (&s[..s.len() - 1], 1024 * 1024),
        Some(b'g' | b'G') => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1u64),
    };
    let num: u64 = num_part
        .trim()
        .parse()
        .map_err(|e| format!("invalid size '{s}': {e}"))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size overflow: '{s}'"))
}

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Streaming VCDIFF (RFC 3284) delta decoder.
#[derive(Parser, Debug)]
#[command(
    name = "oxipatch",
    version,
    about = "Streaming VCDIFF delta decoder",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output stats as JSON to stderr.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Apply a delta to a dictionary and write the target.
    Decode(DecodeArgs),
    /// Decode a delta and compare the result with an expected target.
    Test(TestArgs),
    /// Print the file header and every window header.
    Headers(PrintArgs),
    /// Print headers and the instruction stream of every window.
    Delta(PrintArgs),
    /// Print build/configuration details.
    Config,
}

#[derive(Args, Debug)]
struct DecodeLimitArgs {
    /// Largest total target size accepted (supports K/M/G suffix).
    #[arg(long = "max-target-file-size", value_parser = parse_byte_size, default_value_t = DEFAULT_MAX_TARGET_FILE_SIZE as u64)]
    max_target_file_size: u64,

    /// Largest target window accepted (supports K/M/G suffix).
    #[arg(long = "max-target-window-size", value_parser = parse_byte_size, default_value_t = DEFAULT_MAX_TARGET_WINDOW_SIZE as u64)]
    max_target_window_size: u64,

    /// Reject windows that copy from earlier target output.
    #[arg(long = "no-vcd-target")]
    no_vcd_target: bool,

    /// Disable Adler-32 verification.
    #[arg(long = "no-checksum")]
    no_checksum: bool,

    /// Delta bytes fed to the decoder at a time (supports K/M/G suffix).
    #[arg(long = "buffer-size", value_parser = parse_byte_size, default_value_t = DEFAULT_BUFFER_SIZE as u64)]
    buffer_size: u64,
}

#[derive(Args, Debug)]
struct DecodeArgs {
    /// Dictionary the delta was made against (default: empty).
    #[arg(long, short = 'd', value_hint = ValueHint::FilePath)]
    dictionary: Option<PathBuf>,

    /// Input delta file (default: stdin).
    #[arg(long, value_hint = ValueHint::FilePath, conflicts_with = "input_pos")]
    input: Option<PathBuf>,

    /// Output file (default: stdout).
    #[arg(long, value_hint = ValueHint::FilePath, conflicts_with = "output_pos")]
    output: Option<PathBuf>,

    /// Write output to stdout.
    #[arg(short = 'c', long)]
    stdout: bool,

    /// Check/compute only (do not write output).
    #[arg(long = "check-only")]
    no_output: bool,

    #[command(flatten)]
    limits: DecodeLimitArgs,

    /// Input file (positional form).
    #[arg(value_hint = ValueHint::FilePath)]
    input_pos: Option<PathBuf>,

    /// Output file (positional form).
    #[arg(value_hint = ValueHint::FilePath)]
    output_pos: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct TestArgs {
    /// Dictionary the delta was made against (default: empty).
    #[arg(long, short = 'd', value_hint = ValueHint::FilePath)]
    dictionary: Option<PathBuf>,

    /// Expected target.
    #[arg(long, short = 't', value_hint = ValueHint::FilePath)]
    target: PathBuf,

    /// Input delta file (default: stdin).
    #[arg(long, value_hint = ValueHint::FilePath, conflicts_with = "input_pos")]
    input: Option<PathBuf>,

    #[command(flatten)]
    limits: DecodeLimitArgs,

    /// Input file (positional form).
    #[arg(value_hint = ValueHint::FilePath)]
    input_pos: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PrintArgs {
    /// VCDIFF input file.
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,
}

// ---------------------------------------------------------------------------
// Resolved command + options (flattened from Cli)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Decode,
    Test,
    PrintHdrs,
    PrintDelta,
    Config,
}

struct Options {
    command: Command,
    use_stdout: bool,
    force: bool,
    quiet: bool,
    verbose: u8,
    no_output: bool,
    json_output: bool,
    dictionary_file: Option<PathBuf>,
    input_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
    target_file: Option<PathBuf>,
    decoder: DecoderOptions,
    buffer_size: usize,
}

fn clamp_size(size: u64) -> usize {
    usize::try_from(size).unwrap_or(usize::MAX)
}

fn decoder_options(limits: &DecodeLimitArgs) -> DecoderOptions {
    DecoderOptions {
        max_target_file_size: clamp_size(limits.max_target_file_size),
        max_target_window_size: clamp_size(limits.max_target_window_size),
        allow_vcd_target: !limits.no_vcd_target,
        verify_checksum: !limits.no_checksum,
        ..DecoderOptions::default()
    }
}

fn resolve_options(cli: Cli) -> Options {
    let mut opts = Options {
        command: Command::Config,
        use_stdout: false,
        force: cli.force,
        quiet: cli.quiet,
        verbose: cli.verbose.min(2),
        no_output: false,
        json_output: cli.json_output,
        dictionary_file: None,
        input_file: None,
        output_file: None,
        target_file: None,
        decoder: DecoderOptions::default(),
        buffer_size: DEFAULT_BUFFER_SIZE,
    };

    match cli.command {
        Cmd::Decode(args) => {
            opts.command = Command::Decode;
            opts.use_stdout = args.stdout;
            opts.no_output = args.no_output;
            opts.dictionary_file = args.dictionary;
            opts.input_file = args.input.or(args.input_pos);
            opts.output_file = args.output.or(args.output_pos);
            opts.decoder = decoder_options(&args.limits);
            opts.buffer_size = clamp_size(args.limits.buffer_size);
        }
        Cmd::Test(args) => {
            opts.command = Command::Test;
            opts.no_output = true;
            opts.dictionary_file = args.dictionary;
            opts.target_file = Some(args.target);
            opts.input_file = args.input.or(args.input_pos);
            opts.decoder = decoder_options(&args.limits);
            opts.buffer_size = clamp_size(args.limits.buffer_size);
        }
        Cmd::Headers(args) => {
            opts.command = Command::PrintHdrs;
            opts.input_file = Some(args.input);
        }
        Cmd::Delta(args) => {
            opts.command = Command::PrintDelta;
            opts.input_file = Some(args.input);
        }
        Cmd::Config => {}
    }
    opts
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("oxipatch".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let opts = resolve_options(cli);
        let _ = opts.decoder.validate();
    }
}

// ---------------------------------------------------------------------------
// Config command
// ---------------------------------------------------------------------------

fn cmd_config() -> i32 {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!("oxipatch version {version} (Rust), Copyright (C) oxipatch contributors");
    eprintln!("Licensed under the MIT License");

    let adler32 = cfg!(feature = "adler32") as u8;
    let file_io = cfg!(feature = "file-io") as u8;
    let parallel = cfg!(feature = "parallel") as u8;
    let ptr_size = std::mem::size_of::<*const ()>();

    eprintln!("ADLER32_SIMD={adler32}");
    eprintln!("FILE_IO={file_io}");
    eprintln!("PARALLEL={parallel}");
    eprintln!("DEFAULT_MAX_TARGET_FILE_SIZE={DEFAULT_MAX_TARGET_FILE_SIZE}");
    eprintln!("DEFAULT_MAX_TARGET_WINDOW_SIZE={DEFAULT_MAX_TARGET_WINDOW_SIZE}");
    eprintln!("MAX_CONFIGURABLE_SIZE={MAX_CONFIGURABLE_SIZE}");
    eprintln!("DEFAULT_BUFFER_SIZE={DEFAULT_BUFFER_SIZE}");
    eprintln!("sizeof(usize)={ptr_size}");

    0
}

// ---------------------------------------------------------------------------
// Shared input helpers
// ---------------------------------------------------------------------------

fn read_dictionary(opts: &Options) -> Result<Vec<u8>, i32> {
    match &opts.dictionary_file {
        Some(path) => std::fs::read(path).map_err(|e| {
            eprintln!("oxipatch: dictionary file: {}: {e}", path.display());
            1
        }),
        None => Ok(Vec::new()),
    }
}

fn open_delta(opts: &Options) -> Result<Box<dyn Read>, i32> {
    match &opts.input_file {
        Some(path) => match File::open(path) {
            Ok(f) => Ok(Box::new(BufReader::with_capacity(BUF_SIZE, f))),
            Err(e) => {
                eprintln!("oxipatch: input file: {}: {e}", path.display());
                Err(1)
            }
        },
        None => Ok(Box::new(BufReader::new(io::stdin()))),
    }
}

fn report_stats(opts: &Options, command: &str, stats: &DecodeStats) {
    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "oxipatch: {command}: output size: {}, windows: {}, delta size: {}",
            stats.output_size, stats.windows, stats.delta_size
        );
    }
    if opts.json_output {
        let sha256 = stats
            .output_sha256
            .map(|digest| digest.iter().map(|b| format!("{b:02x}")).collect::<String>());
        let json = serde_json::json!({
            "command": command,
            "dictionary_size": stats.dictionary_size,
            "delta_size": stats.delta_size,
            "output_size": stats.output_size,
            "windows": stats.windows,
            "output_sha256": sha256,
        });
        eprintln!("{json:#}");
    }
}

// ---------------------------------------------------------------------------
// Decode command
// ---------------------------------------------------------------------------

fn cmd_decode(opts: &Options) -> i32 {
    let dictionary = match read_dictionary(opts) {
        Ok(d) => d,
        Err(code) => return code,
    };
    let delta_reader = match open_delta(opts) {
        Ok(r) => r,
        Err(code) => return code,
    };

    let output_writer: Box<dyn Write> = match &opts.output_file {
        _ if opts.no_output => Box::new(io::sink()),
        Some(path) if !opts.use_stdout => {
            if path.exists() && !opts.force {
                eprintln!(
                    "oxipatch: output file exists, use -f to overwrite: {}",
                    path.display()
                );
                return 1;
            }
            match File::create(path) {
                Ok(f) => Box::new(BufWriter::with_capacity(BUF_SIZE, f)),
                Err(e) => {
                    eprintln!("oxipatch: output file: {}: {e}", path.display());
                    return 1;
                }
            }
        }
        _ => Box::new(BufWriter::with_capacity(BUF_SIZE, io::stdout().lock())),
    };

    match decode_stream(
        &dictionary,
        delta_reader,
        output_writer,
        opts.decoder.clone(),
        opts.buffer_size,
    ) {
        Ok(stats) => {
            report_stats(opts, "decode", &stats);
            0
        }
        Err(e) => {
            eprintln!("oxipatch: {e}");
            1
        }
    }
}

// ---------------------------------------------------------------------------
// Test command
// ---------------------------------------------------------------------------

fn cmd_test(opts: &Options) -> i32 {
    let dictionary = match read_dictionary(opts) {
        Ok(d) => d,
        Err(code) => return code,
    };
    let Some(target_path) = &opts.target_file else {
        eprintln!("oxipatch: test requires --target");
        return 1;
    };
    let expected = match std::fs::read(target_path) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("oxipatch: target file: {}: {e}", target_path.display());
            return 1;
        }
    };
    let delta_reader = match open_delta(opts) {
        Ok(r) => r,
        Err(code) => return code,
    };

    let mut decoded = Vec::with_capacity(expected.len());
    let stats = match decode_stream(
        &dictionary,
        delta_reader,
        &mut decoded,
        opts.decoder.clone(),
        opts.buffer_size,
    ) {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!("oxipatch: {e}");
            return 1;
        }
    };
    report_stats(opts, "test", &stats);

    if let Some(offset) = first_difference(&decoded, &expected) {
        eprintln!(
            "oxipatch: test failed: output differs from {} at byte {offset} ({} vs {} bytes)",
            target_path.display(),
            decoded.len(),
            expected.len()
        );
        return 1;
    }
    if !opts.quiet {
        eprintln!("oxipatch: test passed ({} bytes)", decoded.len());
    }
    0
}

fn first_difference(a: &[u8], b: &[u8]) -> Option<usize> {
    a.iter()
        .zip(b)
        .position(|(x, y)| x != y)
        .or_else(|| (a.len() != b.len()).then(|| a.len().min(b.len())))
}

// ---------------------------------------------------------------------------
// Print commands (headers, delta)
// ---------------------------------------------------------------------------

fn flag_names<const N: usize>(set: [(bool, &str); N]) -> String {
    let names: Vec<&str> = set
        .iter()
        .filter(|(on, _)| *on)
        .map(|(_, name)| *name)
        .collect();
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(" ")
    }
}

fn print_file_header(summary: &DeltaSummary) {
    let ind = summary.indicator;
    println!("VCDIFF version:               {:#04X}", summary.version.byte());
    println!("VCDIFF header size:           {}", summary.header_len);
    println!(
        "VCDIFF header indicator:      {}",
        flag_names([
            (ind.contains(HeaderIndicator::DECOMPRESS), "VCD_DECOMPRESS"),
            (ind.contains(HeaderIndicator::CODETABLE), "VCD_CODETABLE"),
            (ind.contains(HeaderIndicator::APPHEADER), "VCD_APPHEADER"),
        ])
    );
    if let Some((near, same)) = summary.custom_code_table {
        println!("VCDIFF code table cache:      near={near} same={same}");
    }
    if let Some(data) = summary.app_header.as_deref().filter(|d| !d.is_empty()) {
        println!(
            "VCDIFF application header:    {}",
            String::from_utf8_lossy(data)
        );
    }
}

fn print_window(number: usize, window: &WindowSummary) {
    let wh = &window.header;
    println!("VCDIFF window number:         {number}");
    println!(
        "VCDIFF window indicator:      {}",
        flag_names([
            (wh.indicator.contains(WindowIndicator::SOURCE), "VCD_SOURCE"),
            (wh.indicator.contains(WindowIndicator::TARGET), "VCD_TARGET"),
            (wh.indicator.contains(WindowIndicator::CHECKSUM), "VCD_CHECKSUM"),
        ])
    );
    if let Some(cksum) = wh.checksum {
        println!("VCDIFF adler32 checksum:      {cksum:08X}");
    }
    if !wh.delta_indicator.is_empty() {
        println!(
            "VCDIFF delta indicator:       {}",
            flag_names([
                (wh.delta_indicator.contains(DeltaIndicator::DATACOMP), "VCD_DATACOMP"),
                (wh.delta_indicator.contains(DeltaIndicator::INSTCOMP), "VCD_INSTCOMP"),
                (wh.delta_indicator.contains(DeltaIndicator::ADDRCOMP), "VCD_ADDRCOMP"),
            ])
        );
    }
    if window.target_offset > 0 {
        println!("VCDIFF window at offset:      {}", window.target_offset);
    }
    if let Some(seg) = wh.segment {
        println!("VCDIFF copy window source:    {}", window.source_kind());
        println!("VCDIFF copy window length:    {}", seg.length);
        println!("VCDIFF copy window offset:    {}", seg.position);
    }
    println!("VCDIFF delta encoding length: {}", wh.delta_len);
    println!("VCDIFF target window length:  {}", wh.target_len);
    if window.interleaved {
        println!("VCDIFF interleaved length:    {}", wh.inst_len);
    } else {
        println!("VCDIFF data section length:   {}", wh.data_len);
        println!("VCDIFF inst section length:   {}", wh.inst_len);
        println!("VCDIFF addr section length:   {}", wh.addr_len);
    }
}

fn print_instructions(window: &WindowSummary, instructions: &[Instruction<'_>]) {
    let segment = window.header.segment;
    let segment_len = window.header.segment_len();

    println!("  Offset Type   Size  @Addr");
    let mut offset = window.target_offset;
    for inst in instructions {
        match *inst {
            Instruction::Add(bytes) => println!("  {offset:06} ADD  {:6}", bytes.len()),
            Instruction::Run { byte, size } => {
                println!("  {offset:06} RUN  {size:6} {byte:#04X}")
            }
            Instruction::Copy { address, size, mode } => {
                let addr_str = match segment {
                    Some(seg) if address < segment_len => {
                        format!("S@{:<6}", seg.position + address)
                    }
                    _ => format!("T@{:<6}", address - segment_len),
                };
                println!("  {offset:06} CPY{mode} {size:6} {addr_str}");
            }
        }
        offset += inst.size();
    }
}

fn read_whole(path: &Path) -> Result<Vec<u8>, i32> {
    std::fs::read(path).map_err(|e| {
        eprintln!("oxipatch: {}: {e}", path.display());
        1
    })
}

fn cmd_print(opts: &Options) -> i32 {
    let Some(input_file) = &opts.input_file else {
        eprintln!("oxipatch: print commands require an input file");
        return 1;
    };
    let delta = match read_whole(input_file) {
        Ok(d) => d,
        Err(code) => return code,
    };

    let summary = match inspect::inspect(&delta) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("oxipatch: invalid VCDIFF delta: {e}");
            return 1;
        }
    };
    print_file_header(&summary);

    if opts.command == Command::PrintDelta {
        let windows = match inspect::instructions(&delta) {
            Ok(w) => w,
            Err(e) => {
                eprintln!("oxipatch: instruction decode: {e}");
                return 1;
            }
        };
        for (number, window) in windows.iter().enumerate() {
            println!();
            print_window(number, &window.window);
            print_instructions(&window.window, &window.instructions);
        }
    } else {
        for (number, window) in summary.windows.iter().enumerate() {
            println!();
            print_window(number, window);
        }
    }

    0
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    let cli = Cli::parse();
    let level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let mut opts = resolve_options(cli);

    if let Err(e) = opts.decoder.validate() {
        eprintln!("oxipatch: {e}");
        process::exit(1);
    }

    // Warn if -c overrides output filename.
    if opts.use_stdout && !opts.quiet
        && let Some(path) = opts.output_file.take()
    {
        eprintln!(
            "oxipatch: warning: -c option overrides output filename: {}",
            path.display()
        );
    }

    let exit_code = match opts.command {
        Command::Decode => cmd_decode(&opts),
        Command::Test => cmd_test(&opts),
        Command::PrintHdrs | Command::PrintDelta => cmd_print(&opts),
        Command::Config => cmd_config(),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
