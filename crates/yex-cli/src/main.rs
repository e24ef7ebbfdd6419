#![forbid(unsafe_code)]

use std::env;
use std::fs::File;
use std::io::Read;

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;
use yex_extract::{detect_layout, extract, list, ChunkReader};
use yex_host::{clear_umask, LocalHost};
use yex_types::Layout;

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        print_usage();
        return Ok(());
    };

    match command.as_str() {
        "extract" => cmd_extract(&args[1..]),
        "list" => cmd_list(&args[1..]),
        "detect" => cmd_detect(&args[1..]),
        "--version" | "-V" => {
            println!("yex {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "--help" | "-h" | "help" => {
            print_usage();
            Ok(())
        }
        _ => {
            print_usage();
            bail!("unknown command: {command}")
        }
    }
}

fn print_usage() {
    println!("yex - yaffs2 flash image extractor\n");
    println!("USAGE:");
    println!("  yex extract <image> [dest] [--layout N] [--verbose]");
    println!("  yex list <image> [--long] [--json] [--layout N]");
    println!("  yex detect <image> [--json]");
    println!("  yex --version | --help");
    println!();
    println!("Pass - as <image> to read from stdin. --layout forces a");
    println!("chunk/spare geometry (1..=4, smallest first) instead of probing.");
}

fn cmd_extract(args: &[String]) -> Result<()> {
    let mut image = None;
    let mut dest = None;
    let mut forced = None;
    let mut verbose = false;

    let mut words = args.iter();
    while let Some(word) = words.next() {
        match word.as_str() {
            "--layout" => forced = Some(parse_layout(words.next())?),
            "--verbose" | "-v" => verbose = true,
            other if image.is_none() => image = Some(other.to_owned()),
            other if dest.is_none() => dest = Some(other.to_owned()),
            other => bail!("unexpected argument: {other}"),
        }
    }
    let image = image.context("extract requires an image path, or - for stdin")?;
    let dest = dest.unwrap_or_else(|| ".".to_owned());
    init_logging(if verbose { "info" } else { "warn" });

    std::fs::create_dir_all(&dest).with_context(|| format!("create {dest}"))?;
    clear_umask();

    let reader = attach(open_source(&image)?, forced)?;
    extract(reader, LocalHost::new(&dest)).with_context(|| format!("extract {image}"))?;
    Ok(())
}

fn cmd_list(args: &[String]) -> Result<()> {
    let mut image = None;
    let mut forced = None;
    let mut long = false;
    let mut json = false;

    let mut words = args.iter();
    while let Some(word) = words.next() {
        match word.as_str() {
            "--layout" => forced = Some(parse_layout(words.next())?),
            "--long" => long = true,
            "--json" => json = true,
            other if image.is_none() => image = Some(other.to_owned()),
            other => bail!("unexpected argument: {other}"),
        }
    }
    let image = image.context("list requires an image path, or - for stdin")?;
    init_logging("warn");

    let reader = attach(open_source(&image)?, forced)?;
    let (entries, _) = list(reader).with_context(|| format!("list {image}"))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&entries).context("serialize listing")?
        );
    } else {
        for entry in &entries {
            if long {
                println!("{}", entry.long_line());
            } else {
                println!("{}", entry.path);
            }
        }
    }
    Ok(())
}

fn cmd_detect(args: &[String]) -> Result<()> {
    let mut image = None;
    let mut json = false;

    for word in args {
        match word.as_str() {
            "--json" => json = true,
            other if image.is_none() => image = Some(other.to_owned()),
            other => bail!("unexpected argument: {other}"),
        }
    }
    let image = image.context("detect requires an image path, or - for stdin")?;
    init_logging("warn");

    let mut source = open_source(&image)?;
    let (layout, _) =
        detect_layout(&mut source).with_context(|| format!("detect layout of {image}"))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&layout).context("serialize layout")?
        );
    } else {
        println!("{layout}");
    }
    Ok(())
}

fn open_source(image: &str) -> Result<Box<dyn Read>> {
    if image == "-" {
        return Ok(Box::new(std::io::stdin()));
    }
    let file = File::open(image).with_context(|| format!("open {image}"))?;
    Ok(Box::new(file))
}

/// Wrap the raw stream in a record reader, probing for the layout unless
/// the caller forced one.
fn attach(mut source: Box<dyn Read>, forced: Option<Layout>) -> Result<ChunkReader<Box<dyn Read>>> {
    match forced {
        Some(layout) => Ok(ChunkReader::new(source, layout)),
        None => {
            let (layout, prefix) = detect_layout(&mut source)?;
            Ok(ChunkReader::with_prefix(source, layout, prefix))
        }
    }
}

fn parse_layout(value: Option<&String>) -> Result<Layout> {
    let value = value.context("--layout needs a value")?;
    let index: usize = value
        .parse()
        .with_context(|| format!("bad --layout value {value:?}"))?;
    Layout::candidate(index).with_context(|| format!("no layout candidate {index}, expected 1..=4"))
}

fn init_logging(default: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
