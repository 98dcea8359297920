//! # CLI - store file inspection and upgrade tool
//!
//! Operator front end for the store codecs. The first argument selects the
//! store kind, the second the operation:
//!
//! ```text
//! cli <journal|sow|ack|queue> dump    [options] <file>...
//! cli <journal|sow|ack|queue> version <file>...
//! cli <journal|sow|ack|queue> check   <file>...
//! cli <journal|sow|ack>       upgrade [options] <old-file> <new-file>
//! ```
//!
//! ## Options
//!
//! ```text
//! --limit N           print at most N records (sow/ack/queue dumps)
//! --start N           first entry index to print (journal dumps)
//! --stop N            last entry index to print (journal dumps)
//! --localtime         render timestamps in the local timezone
//! --data-only         print record data without field breakdowns (sow)
//! --omit-data         suppress message payloads in journal dumps
//! --extents           print replication extents after a journal dump
//! --exclude-expired   hide expired records in sow dumps
//! --sow-expiration-iso  render journal SOW expirations as ISO-8601
//! --record-size N     record size for sow upgrades      (default 512)
//! --increment-size N  records per slab for sow upgrades (default 10000)
//! ```
//!
//! Files ending in `.gz` are read (and, for upgrades, written) through
//! gzip. Diagnostics go to stderr via `env_logger`; set `RUST_LOG=debug`
//! for more detail.
//!
//! `check` exits 1 when any file still needs an upgrade, making it usable
//! from maintenance scripts.

use anyhow::{bail, Context, Result};
use common::DumpOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

const USAGE: &str = "\
usage: cli <journal|sow|ack|queue> <dump|version|check|upgrade> [options] <file>...

commands:
  dump     render records and the file summary to stdout
  version  print the on-disk format version of each file
  check    report whether each file is at the latest version (exit 1 if not)
  upgrade  rewrite <old-file> into a latest-version <new-file>

options:
  --limit N             print at most N records (sow/ack/queue dumps)
  --start N             first entry index to print (journal dumps)
  --stop N              last entry index to print (journal dumps)
  --localtime           render timestamps in the local timezone
  --data-only           print record data without field breakdowns (sow)
  --omit-data           suppress message payloads in journal dumps
  --extents             print replication extents after a journal dump
  --exclude-expired     hide expired records in sow dumps
  --sow-expiration-iso  render journal SOW expirations as ISO-8601
  --record-size N       record size for sow upgrades      (default 512)
  --increment-size N    records per slab for sow upgrades (default 10000)

Files ending in .gz are read (and written, for upgrades) through gzip.
Set RUST_LOG=debug for diagnostics on stderr.
";

struct Args {
    files: Vec<PathBuf>,
    opts: DumpOptions,
    record_size: u64,
    increment_size: u64,
}

fn parse_args(raw: &[String]) -> Result<Args> {
    let mut args = Args {
        files: Vec::new(),
        opts: DumpOptions::default(),
        record_size: sow::DEFAULT_RECORD_SIZE,
        increment_size: sow::DEFAULT_INCREMENT_SIZE,
    };
    let mut iter = raw.iter();
    while let Some(arg) = iter.next() {
        let mut numeric = |name: &str| -> Result<u64> {
            iter.next()
                .with_context(|| format!("{} requires a value", name))?
                .parse::<u64>()
                .with_context(|| format!("{} requires a number", name))
        };
        match arg.as_str() {
            "--limit" => args.opts.limit = Some(numeric("--limit")?),
            "--start" => args.opts.start = numeric("--start")?,
            "--stop" => args.opts.stop = Some(numeric("--stop")?),
            "--record-size" => args.record_size = numeric("--record-size")?,
            "--increment-size" => args.increment_size = numeric("--increment-size")?,
            "--localtime" => args.opts.localtime = true,
            "--data-only" => args.opts.verbose = false,
            "--omit-data" => args.opts.omit_data = true,
            "--extents" => args.opts.extents = true,
            "--exclude-expired" => args.opts.include_expired = false,
            "--sow-expiration-iso" => args.opts.sow_expiration_iso = true,
            other if other.starts_with("--") => bail!("unknown option: {}", other),
            other => args.files.push(PathBuf::from(other)),
        }
    }
    if args.files.is_empty() {
        bail!("no files given");
    }
    Ok(args)
}

fn check(store: &str, path: &Path) -> Result<bool> {
    Ok(match store {
        "journal" => journal::is_up_to_date(path)?,
        "sow" => sow::is_up_to_date(path)?,
        "ack" => ack::is_up_to_date(path)?,
        // only one queue store version has ever shipped
        "queue" => {
            queue::version(path)?;
            true
        }
        other => bail!("unknown store kind: {}", other),
    })
}

fn run() -> Result<()> {
    let raw: Vec<String> = std::env::args().skip(1).collect();
    if raw.iter().any(|arg| arg == "--help" || arg == "-h") {
        print!("{}", USAGE);
        return Ok(());
    }
    if raw.len() < 2 {
        bail!("missing arguments\n\n{}", USAGE);
    }
    let store = raw[0].as_str();
    let command = raw[1].as_str();
    let args = parse_args(&raw[2..])?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match command {
        "dump" => {
            for path in &args.files {
                match store {
                    "journal" => journal::dump(path, &args.opts, &mut out)?,
                    "sow" => sow::dump(path, &args.opts, &mut out)?,
                    "ack" => ack::dump(path, &args.opts, &mut out)?,
                    "queue" => queue::dump(path, &args.opts, &mut out)?,
                    other => bail!("unknown store kind: {}", other),
                }
            }
        }
        "version" => {
            for path in &args.files {
                let version = match store {
                    "journal" => journal::version(path)?,
                    "sow" => sow::version(path)?.to_string(),
                    "ack" => ack::version(path)?.to_string(),
                    "queue" => queue::version(path)?,
                    other => bail!("unknown store kind: {}", other),
                };
                writeln!(out, "{}: {}", path.display(), version)?;
            }
        }
        "check" => {
            let mut all_current = true;
            for path in &args.files {
                let current = check(store, path)?;
                all_current &= current;
                writeln!(
                    out,
                    "{}: {}",
                    path.display(),
                    if current { "up to date" } else { "needs upgrade" }
                )?;
            }
            if !all_current {
                std::process::exit(1);
            }
        }
        "upgrade" => {
            if args.files.len() != 2 {
                bail!("upgrade needs exactly <old-file> <new-file>");
            }
            let (old, new) = (&args.files[0], &args.files[1]);
            match store {
                "journal" => journal::upgrade(old, new)?,
                "sow" => sow::upgrade(old, new, args.record_size, args.increment_size)?,
                "ack" => ack::upgrade(old, new)?,
                "queue" => bail!("queue stores have a single version; nothing to upgrade"),
                other => bail!("unknown store kind: {}", other),
            }
            log::info!("upgraded {} -> {}", old.display(), new.display());
            writeln!(out, "upgraded {} -> {}", old.display(), new.display())?;
        }
        other => bail!("unknown command: {}", other),
    }
    Ok(())
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(2);
    }
}
