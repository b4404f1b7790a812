//! Convert access traces between the text and binary formats.
//!
//! Usage:
//!   convert_trace [--base=ADDR --size=N] <INPUT> <OUTPUT>
//!
//! The input format is detected; the output format is binary when OUTPUT ends in `.mtrc`,
//! text otherwise (`-` writes text to stdout). `--base`/`--size` describe the message when
//! a text input uses absolute `@` addresses.

use anyhow::Context;
use protoinfer::trace;
use protoinfer::MemRegion;
use std::io::Write;
use std::path::Path;

fn take_value(args: &mut Vec<String>, prefix: &str) -> Option<String> {
    let pos = args.iter().position(|a| a.starts_with(prefix))?;
    let arg = args.remove(pos);
    Some(arg[prefix.len()..].to_string())
}

fn parse_u32(s: &str) -> anyhow::Result<u32> {
    let v = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse::<u32>(),
    };
    v.with_context(|| format!("bad number {:?}", s))
}

fn main() -> anyhow::Result<()> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let base = take_value(&mut args, "--base=").map(|s| parse_u32(&s)).transpose()?;
    let size = take_value(&mut args, "--size=").map(|s| parse_u32(&s)).transpose()?;
    let level = take_value(&mut args, "--log-level=").unwrap_or_else(|| "warn".to_string());
    let [input, output] = args.as_slice() else {
        eprintln!("Usage: convert_trace [--base=ADDR --size=N] [--log-level=LVL] <INPUT> <OUTPUT>");
        std::process::exit(2);
    };

    tracing_subscriber::fmt()
        .with_max_level(protoinfer::config::parse_level(&level))
        .with_writer(std::io::stderr)
        .init();

    let region = match (base, size) {
        (Some(b), Some(s)) => Some(MemRegion::new(b, s)),
        (None, None) => None,
        _ => anyhow::bail!("--base and --size go together"),
    };
    let log = trace::load(Path::new(input), region).with_context(|| format!("{}: bad trace", input))?;
    tracing::info!(events = log.len(), "trace loaded");

    if output == "-" {
        std::io::stdout().write_all(trace::format_text(&log).as_bytes())?;
    } else if output.ends_with(".mtrc") {
        let mut f = std::io::BufWriter::new(
            std::fs::File::create(output).with_context(|| format!("{}: create failed", output))?,
        );
        trace::write_binary(&mut f, &log)?;
        f.flush()?;
    } else {
        std::fs::write(output, trace::format_text(&log))
            .with_context(|| format!("{}: write failed", output))?;
    }
    Ok(())
}
