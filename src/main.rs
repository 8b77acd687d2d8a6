use anyhow::{bail, Context, Result};
use bytepatch::{CommitOutcome, Engine, EngineConfig, Outcome, ReadOnlyFallback};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "bytepatch")]
#[command(about = "Patch bytes of a file in place or into a new file", long_about = None)]
#[command(version)]
struct Args {
    /// File to edit
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Overwrite one byte: OFFSET=HEX (offsets accept 0x prefixes)
    #[arg(long = "set", value_name = "OFFSET=HEX")]
    sets: Vec<String>,

    /// Delete bytes: START:LEN
    #[arg(long = "delete", value_name = "START:LEN")]
    deletes: Vec<String>,

    /// Fill a range with one byte: START:LEN:HEX
    #[arg(long, value_name = "START:LEN:HEX")]
    fill: Option<String>,

    /// Replace one byte value by another within a range: START:LEN:FROM:TO
    #[arg(long, value_name = "START:LEN:FROM:TO")]
    replace: Option<String>,

    /// Print offsets of a hex byte pattern in the original file
    #[arg(long, value_name = "HEX")]
    find: Option<String>,

    /// Print byte-value counts of the original file
    #[arg(long)]
    histogram: bool,

    /// Write the result to PATH instead of the input file
    #[arg(long, short, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Allow --output to replace an existing file
    #[arg(long)]
    force: bool,

    /// Apply edits without committing them
    #[arg(long)]
    dry_run: bool,

    /// Engine configuration (JSON)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log engine activity to stderr
    #[arg(long, short)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let mut engine = Engine::with_config(config);

    // A read-only input is still fine when the result goes elsewhere
    let fallback = if args.output.is_some() || args.dry_run {
        ReadOnlyFallback::Accept
    } else {
        ReadOnlyFallback::Refuse
    };
    engine
        .open_path(&args.file, fallback)
        .with_context(|| format!("opening {}", args.file.display()))?;

    if let Some(pattern) = &args.find {
        let needle = parse_hex_bytes(pattern)?;
        for offset in engine.find_all(&needle, 0) {
            println!("match at 0x{:08x}", offset);
        }
    }

    if args.histogram {
        let counts = engine
            .byte_histogram()
            .context("histogram was not computed")?;
        for (value, count) in counts.iter().enumerate().filter(|(_, c)| **c > 0) {
            println!("{:02x}: {}", value, count);
        }
    }

    apply_edits(&mut engine, &args)?;

    if !engine.has_changes() || args.dry_run {
        eprintln!(
            "{} pending edit(s), {} -> {} bytes, nothing written",
            engine.edits().len(),
            engine.len(),
            engine.effective_len()
        );
        return Ok(());
    }

    let outcome = match &args.output {
        Some(path) => engine.commit_to(path, args.force)?,
        None => engine.commit()?,
    };
    match outcome {
        CommitOutcome::Completed(report) => {
            eprintln!(
                "committed {} edit(s) ({:?}), new length {} bytes",
                report.edits_applied, report.strategy, report.new_len
            );
        }
        CommitOutcome::Cancelled => bail!("commit cancelled"),
        CommitOutcome::DestinationExists => {
            bail!("output exists, pass --force to overwrite")
        }
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn apply_edits(engine: &mut Engine, args: &Args) -> Result<()> {
    for set in &args.sets {
        let (offset, value) = set
            .split_once('=')
            .with_context(|| format!("--set expects OFFSET=HEX, got {:?}", set))?;
        engine.modify_byte(parse_number(offset)?, parse_byte(value)?);
    }

    for delete in &args.deletes {
        let fields = split_fields(delete, 2)?;
        engine.delete_bytes(parse_number(fields[0])?, parse_number(fields[1])?);
    }

    if let Some(fill) = &args.fill {
        let fields = split_fields(fill, 3)?;
        let outcome = engine.fill(
            parse_number(fields[0])?,
            parse_number(fields[1])?,
            parse_byte(fields[2])?,
        );
        report("fill", outcome);
    }

    if let Some(replace) = &args.replace {
        let fields = split_fields(replace, 4)?;
        let outcome = engine.replace(
            parse_number(fields[0])?,
            parse_number(fields[1])?,
            parse_byte(fields[2])?,
            parse_byte(fields[3])?,
        );
        report("replace", outcome);
    }
    Ok(())
}

fn report(what: &str, outcome: Outcome<u64>) {
    match outcome {
        Outcome::Completed(n) => eprintln!("{}: {} byte(s) changed", what, n),
        Outcome::Cancelled(n) => eprintln!("{}: cancelled after {} byte(s)", what, n),
    }
}

fn split_fields(text: &str, count: usize) -> Result<Vec<&str>> {
    let fields: Vec<&str> = text.split(':').collect();
    if fields.len() != count {
        bail!("expected {} ':'-separated fields, got {:?}", count, text);
    }
    Ok(fields)
}

fn parse_number(text: &str) -> Result<u64> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.with_context(|| format!("invalid number {:?}", text))
}

fn parse_byte(text: &str) -> Result<u8> {
    let text = text.trim();
    let hex = text.strip_prefix("0x").unwrap_or(text);
    u8::from_str_radix(hex, 16).with_context(|| format!("invalid hex byte {:?}", text))
}

fn parse_hex_bytes(text: &str) -> Result<Vec<u8>> {
    let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("hex pattern has non-hex characters: {:?}", text);
    }
    if digits.is_empty() || digits.len() % 2 != 0 {
        bail!("hex pattern needs an even, non-zero number of digits: {:?}", text);
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| parse_byte(&digits[i..i + 2]))
        .collect()
}
