use anyhow::{bail, Context, Result};
use yex_harness::{HeaderSpec, ImageBuilder};
use yex_types::Layout;

const USAGE: &str = "\
yex-harness - build synthetic flash images for testing

Usage:
  yex-harness gen <path> [--layout N]

Options:
  --layout N   chunk/spare geometry, 1..=4 (default 1: 2048/64)
";

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut words = args.iter();

    let Some(command) = words.next() else {
        print!("{USAGE}");
        return Ok(());
    };
    if command == "--help" || command == "-h" {
        print!("{USAGE}");
        return Ok(());
    }
    if command != "gen" {
        bail!("unknown command {command:?}, try --help");
    }

    let mut path = None;
    let mut layout = Layout::detection_candidates()[0];
    while let Some(word) = words.next() {
        match word.as_str() {
            "--layout" => {
                let n: usize = words
                    .next()
                    .context("--layout needs a value")?
                    .parse()
                    .context("--layout needs a number")?;
                layout = Layout::candidate(n)
                    .with_context(|| format!("no layout candidate {n}, expected 1..=4"))?;
            }
            other if path.is_none() => path = Some(other.to_owned()),
            other => bail!("unexpected argument {other:?}"),
        }
    }
    let path = path.context("gen needs an output path")?;

    let image = sample_image(layout);
    std::fs::write(&path, image).with_context(|| format!("write {path}"))?;
    println!("wrote {path} ({} layout)", layout);
    Ok(())
}

/// A small but representative tree: nested directories, a multi-chunk file,
/// an empty file, links, and device nodes.
fn sample_image(layout: Layout) -> Vec<u8> {
    let mut busybox = vec![0_u8; 3 * layout.chunk_size() + 513];
    for (index, byte) in busybox.iter_mut().enumerate() {
        *byte = (index % 251) as u8;
    }

    let mut image = ImageBuilder::new(layout);
    image
        .push_header(1, &HeaderSpec::root().times(1_650_000_000, 1_650_000_000))
        .push_header(2, &HeaderSpec::dir(1, "bin").times(1_650_000_001, 1_650_000_001))
        .push_header(3, &HeaderSpec::dir(1, "dev").times(1_650_000_002, 1_650_000_002))
        .push_header(4, &HeaderSpec::dir(1, "etc").times(1_650_000_003, 1_650_000_003))
        .push_file(
            5,
            &HeaderSpec::file(4, "hostname").times(1_650_000_004, 1_650_000_004),
            b"device\n",
        )
        .push_file(
            6,
            &HeaderSpec::file(2, "busybox")
                .mode(0o100_755)
                .times(1_650_000_005, 1_650_000_005),
            &busybox,
        )
        .push_header(7, &HeaderSpec::hardlink(2, "sh", 6))
        .push_header(
            8,
            &HeaderSpec::symlink(4, "mtab", "/proc/mounts").times(1_650_000_006, 1_650_000_006),
        )
        .push_header(9, &HeaderSpec::special(3, "null", 0o020_666, 0x0103))
        .push_header(10, &HeaderSpec::special(3, "fifo", 0o010_644, 0))
        .push_file(11, &HeaderSpec::file(4, "empty"), b"")
        .push_file(
            12,
            &HeaderSpec::file(2, "su").mode(0o104_755).times(1_650_000_007, 1_650_000_007),
            b"#!/bin/sh\nexec real-su \"$@\"\n",
        )
        .push_empty();
    image.build()
}
