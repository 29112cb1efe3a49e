// Command-line front end for vcdelta.
//
// Thin layer over `io::encode_stream` / `io::decode_stream`: argument
// parsing with clap, logger setup, file/stdio plumbing and stats output.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};

use crate::compress::encoder::{EncoderOptions, encode};
use crate::hash::{BLOCK_SIZE, MIN_MATCH_SIZE, MatchLimits};
use crate::io::{DEFAULT_BUFFER_SIZE, decode_stream, encode_stream};
use crate::vcdiff::decoder::{DEFAULT_MAX_TARGET_SIZE, DecoderOptions, decode_memory_with};

const IO_BUF_SIZE: usize = 64 * 1024;

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

fn parse_buffer_size(s: &str) -> Result<u64, String> {
    match parse_byte_size(s)? {
        0 => Err("buffer size must be at least 1 byte".into()),
        n if n > usize::MAX as u64 => Err(format!("buffer size {n} does not fit in memory")),
        n => Ok(n),
    }
}

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// VCDIFF (RFC 3284) delta encoder/decoder.
#[derive(Parser, Debug)]
#[command(
    name = "vcdelta",
    version,
    about = "VCDIFF delta encoder/decoder",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (errors only).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use twice for debug output).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Print stats as JSON to stderr.
    #[arg(long = "json-stats", global = true)]
    json_stats: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Encode a target against a dictionary.
    Encode(EncodeArgs),
    /// Rebuild a target from a dictionary and a delta.
    Decode(DecodeArgs),
    /// Encode then decode in memory and compare with the target.
    Test(TestArgs),
    /// Print build features and tunables.
    Config,
}

#[derive(Args, Debug, Clone, Copy, Default)]
struct EncodeFlags {
    /// Write all sections interleaved in one (open-vcdiff extension).
    #[arg(long)]
    interleaved: bool,

    /// Add an Adler-32 checksum to every window (open-vcdiff extension).
    #[arg(long)]
    checksum: bool,

    /// Write the delta as human-readable JSON instead of VCDIFF.
    #[arg(long, conflicts_with_all = ["interleaved", "checksum"])]
    json: bool,

    /// Also look for matches in earlier parts of each window.
    #[arg(long = "target-matches")]
    target_matches: bool,

    /// Encode runs of repeated bytes as RUN instructions.
    #[arg(long)]
    runs: bool,
}

impl EncodeFlags {
    fn options(self) -> EncoderOptions {
        EncoderOptions {
            look_for_target_matches: self.target_matches,
            interleaved: self.interleaved,
            checksum: self.checksum,
            json: self.json,
            split_runs: self.runs,
        }
    }
}

#[derive(Args, Debug)]
struct EncodeArgs {
    /// Dictionary file that COPY instructions refer to.
    #[arg(long, short = 'd', value_hint = ValueHint::FilePath)]
    dictionary: PathBuf,

    /// Target file (default: stdin).
    #[arg(long, short = 't', value_hint = ValueHint::FilePath)]
    target: Option<PathBuf>,

    /// Delta output file (default: stdout).
    #[arg(long, short = 'o', value_hint = ValueHint::FilePath)]
    delta: Option<PathBuf>,

    #[command(flatten)]
    flags: EncodeFlags,

    /// Target bytes per window (supports K/M/G suffix).
    #[arg(long = "buffer-size", value_parser = parse_buffer_size, default_value_t = DEFAULT_BUFFER_SIZE as u64)]
    buffer_size: u64,
}

#[derive(Args, Debug)]
struct DecodeArgs {
    /// Dictionary file the delta was encoded against.
    #[arg(long, short = 'd', value_hint = ValueHint::FilePath)]
    dictionary: PathBuf,

    /// Delta input file (default: stdin).
    #[arg(long, short = 'i', value_hint = ValueHint::FilePath)]
    delta: Option<PathBuf>,

    /// Target output file (default: stdout).
    #[arg(long, short = 't', value_hint = ValueHint::FilePath)]
    target: Option<PathBuf>,

    /// Accept windows that copy from earlier target data (VCD_TARGET).
    #[arg(long = "allow-vcd-target")]
    allow_vcd_target: bool,

    /// Largest total target size (supports K/M/G suffix).
    #[arg(long = "max-target-file-size", value_parser = parse_byte_size, default_value_t = DEFAULT_MAX_TARGET_SIZE as u64)]
    max_target_file_size: u64,

    /// Largest single target window (supports K/M/G suffix).
    #[arg(long = "max-target-window-size", value_parser = parse_byte_size, default_value_t = DEFAULT_MAX_TARGET_SIZE as u64)]
    max_target_window_size: u64,

    /// Delta bytes read per chunk (supports K/M/G suffix).
    #[arg(long = "buffer-size", value_parser = parse_buffer_size, default_value_t = DEFAULT_BUFFER_SIZE as u64)]
    buffer_size: u64,
}

impl DecodeArgs {
    fn options(&self) -> DecoderOptions {
        let clamp = |n: u64| usize::try_from(n).unwrap_or(usize::MAX);
        DecoderOptions {
            allow_vcd_target: self.allow_vcd_target,
            max_target_file_size: clamp(self.max_target_file_size),
            max_target_window_size: clamp(self.max_target_window_size),
        }
    }
}

#[derive(Args, Debug)]
struct TestArgs {
    /// Dictionary file.
    #[arg(long, short = 'd', value_hint = ValueHint::FilePath)]
    dictionary: PathBuf,

    /// Target file.
    #[arg(long, short = 't', value_hint = ValueHint::FilePath)]
    target: PathBuf,

    #[command(flatten)]
    flags: EncodeFlags,
}

// ---------------------------------------------------------------------------
// Resolved options
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Options {
    command: Cmd,
    force: bool,
    quiet: bool,
    verbose: u8,
    json_stats: bool,
}

fn resolve_options(cli: Cli) -> Options {
    Options {
        command: cli.command,
        force: cli.force,
        quiet: cli.quiet,
        verbose: cli.verbose.min(2),
        json_stats: cli.json_stats,
    }
}

fn log_filter(opts: &Options) -> &'static str {
    match (opts.quiet, opts.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    }
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("vcdelta".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let opts = resolve_options(cli);
        let _ = log_filter(&opts);
        if let Cmd::Decode(args) = &opts.command {
            let _ = args.options();
        }
    }
}

// ---------------------------------------------------------------------------
// File plumbing
// ---------------------------------------------------------------------------

fn read_file(what: &str, path: &Path) -> Result<Vec<u8>, String> {
    std::fs::read(path).map_err(|e| format!("{what} file: {}: {e}", path.display()))
}

fn open_input(what: &str, path: Option<&Path>) -> Result<Box<dyn Read>, String> {
    match path {
        Some(path) => File::open(path)
            .map(|f| Box::new(BufReader::with_capacity(IO_BUF_SIZE, f)) as Box<dyn Read>)
            .map_err(|e| format!("{what} file: {}: {e}", path.display())),
        None => Ok(Box::new(BufReader::with_capacity(IO_BUF_SIZE, io::stdin().lock()))),
    }
}

fn open_output(what: &str, path: Option<&Path>, force: bool) -> Result<Box<dyn Write>, String> {
    match path {
        Some(path) => {
            if path.exists() && !force {
                return Err(format!(
                    "output file exists, use -f to overwrite: {}",
                    path.display()
                ));
            }
            File::create(path)
                .map(|f| Box::new(BufWriter::with_capacity(IO_BUF_SIZE, f)) as Box<dyn Write>)
                .map_err(|e| format!("{what} file: {}: {e}", path.display()))
        }
        None => Ok(Box::new(BufWriter::with_capacity(IO_BUF_SIZE, io::stdout().lock()))),
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_config() -> Result<(), String> {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!("vcdelta version {version}");
    let limits = MatchLimits::default();
    eprintln!("ADLER32_SIMD={}", cfg!(feature = "adler32") as u8);
    eprintln!("BLOCK_SIZE={BLOCK_SIZE}");
    eprintln!("MIN_MATCH_SIZE={MIN_MATCH_SIZE}");
    eprintln!("MAX_PROBES={}", limits.max_probes);
    eprintln!("MAX_MATCHES_TO_CHECK={}", limits.max_matches_to_check);
    eprintln!("DEFAULT_BUFFER_SIZE={DEFAULT_BUFFER_SIZE}");
    eprintln!("DEFAULT_MAX_TARGET_SIZE={DEFAULT_MAX_TARGET_SIZE}");
    Ok(())
}

fn cmd_encode(args: &EncodeArgs, opts: &Options) -> Result<(), String> {
    let dictionary = read_file("dictionary", &args.dictionary)?;
    let mut target = open_input("target", args.target.as_deref())?;
    let mut delta = open_output("delta", args.delta.as_deref(), opts.force)?;

    let stats = encode_stream(
        &dictionary,
        &mut target,
        &mut delta,
        args.flags.options(),
        args.buffer_size as usize,
    )
    .map_err(|e| e.to_string())?;

    log::info!(
        "encoder: dictionary size: {}, target size: {}, delta size: {}, windows: {}",
        stats.dictionary_size,
        stats.target_size,
        stats.delta_size,
        stats.windows
    );
    if opts.json_stats {
        let json = serde_json::json!({
            "command": "encode",
            "dictionary_size": stats.dictionary_size,
            "target_size": stats.target_size,
            "delta_size": stats.delta_size,
            "windows": stats.windows,
        });
        eprintln!("{json}");
    }
    Ok(())
}

fn cmd_decode(args: &DecodeArgs, opts: &Options) -> Result<(), String> {
    let dictionary = read_file("dictionary", &args.dictionary)?;
    let mut delta = open_input("delta", args.delta.as_deref())?;
    let mut target = open_output("target", args.target.as_deref(), opts.force)?;

    let stats = decode_stream(
        &dictionary,
        &mut delta,
        &mut target,
        args.options(),
        args.buffer_size as usize,
    )
    .map_err(|e| e.to_string())?;

    log::info!(
        "decoder: dictionary size: {}, delta size: {}, target size: {}",
        stats.dictionary_size,
        stats.delta_size,
        stats.target_size
    );
    if opts.json_stats {
        let json = serde_json::json!({
            "command": "decode",
            "dictionary_size": stats.dictionary_size,
            "delta_size": stats.delta_size,
            "target_size": stats.target_size,
        });
        eprintln!("{json}");
    }
    Ok(())
}

fn cmd_test(args: &TestArgs, opts: &Options) -> Result<(), String> {
    let dictionary = read_file("dictionary", &args.dictionary)?;
    let target = read_file("target", &args.target)?;
    let options = args.flags.options();
    if options.json {
        return Err("test: JSON output cannot be decoded".into());
    }

    let delta = encode(&dictionary, &target, options).map_err(|e| format!("test: {e}"))?;
    let decoder_options = DecoderOptions {
        max_target_file_size: target.len().max(DEFAULT_MAX_TARGET_SIZE),
        max_target_window_size: target.len().max(DEFAULT_MAX_TARGET_SIZE),
        ..DecoderOptions::default()
    };
    let decoded = decode_memory_with(&dictionary, &delta, decoder_options)
        .map_err(|e| format!("test: decode failed: {e}"))?;
    if decoded != target {
        let first_diff = decoded
            .iter()
            .zip(&target)
            .position(|(a, b)| a != b)
            .unwrap_or(decoded.len().min(target.len()));
        return Err(format!(
            "test: decoded target differs from original at byte {first_diff} \
             (decoded {} bytes, expected {})",
            decoded.len(),
            target.len()
        ));
    }

    if !opts.quiet {
        eprintln!(
            "vcdelta: test passed: target {} bytes, delta {} bytes",
            target.len(),
            delta.len()
        );
    }
    if opts.json_stats {
        let json = serde_json::json!({
            "command": "test",
            "dictionary_size": dictionary.len(),
            "target_size": target.len(),
            "delta_size": delta.len(),
            "passed": true,
        });
        eprintln!("{json}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    let opts = resolve_options(Cli::parse());

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_filter(&opts)))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let result = match &opts.command {
        Cmd::Encode(args) => cmd_encode(args, &opts),
        Cmd::Decode(args) => cmd_decode(args, &opts),
        Cmd::Test(args) => cmd_test(args, &opts),
        Cmd::Config => cmd_config(),
    };

    match result {
        Ok(()) => process::exit(0),
        Err(msg) => {
            eprintln!("vcdelta: {msg}");
            process::exit(1);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
