//! Infer the field tree of one message from its access trace.
//!
//! Usage:
//!   infer_tree [OPTIONS] <MESSAGE.bin> <TRACE>
//!
//! MESSAGE.bin holds the raw message bytes. TRACE is a text or binary access trace (see
//! `protoinfer::trace`); the format is detected from the file.
//!
//! Options:
//!   --config=FILE     JSON analysis config (flags below override it)
//!   --base=ADDR       Address of the first message byte (decimal or 0x hex)
//!   --name=NAME       Message name used in outputs (default: message)
//!   --text            Print the indented tree dump to stdout
//!   --dot=PATH        Write Graphviz DOT to PATH (`-` for stdout)
//!   --json=PATH       Write a JSON snapshot to PATH (`-` for stdout)
//!   --refine          Run the padding refiner after construction
//!   --log-level=LVL   trace, debug, info, warn or error (default: info)
//!
//! With no output option the text dump is printed.

use anyhow::Context;
use protoinfer::trace;
use protoinfer::{
    dot_string, text_dump, AnalysisConfig, Message, MessageSet, PaddingRefiner,
    StackHashComparator, TreeSnapshot,
};
use std::io::Write;
use std::path::{Path, PathBuf};

fn take_value(args: &mut Vec<String>, prefix: &str) -> Option<String> {
    let pos = args.iter().position(|a| a.starts_with(prefix))?;
    let arg = args.remove(pos);
    Some(arg[prefix.len()..].to_string())
}

fn take_flag(args: &mut Vec<String>, flag: &str) -> bool {
    if let Some(pos) = args.iter().position(|a| a == flag) {
        args.remove(pos);
        true
    } else {
        false
    }
}

fn parse_addr(s: &str) -> anyhow::Result<u32> {
    let v = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse::<u32>(),
    };
    v.with_context(|| format!("bad address {:?}", s))
}

fn write_output(path: &Path, content: &str) -> anyhow::Result<()> {
    if path == Path::new("-") {
        std::io::stdout().write_all(content.as_bytes())?;
    } else {
        std::fs::write(path, content).with_context(|| format!("{}: write failed", path.display()))?;
    }
    Ok(())
}

fn usage() -> ! {
    eprintln!(
        "Usage: infer_tree [--config=FILE] [--base=ADDR] [--name=NAME] [--text] [--dot=PATH] \
         [--json=PATH] [--refine] [--log-level=LVL] <MESSAGE.bin> <TRACE>"
    );
    std::process::exit(2);
}

fn main() -> anyhow::Result<()> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    if take_flag(&mut args, "--help") || take_flag(&mut args, "-h") {
        usage();
    }

    let mut cfg = match take_value(&mut args, "--config=") {
        Some(path) => AnalysisConfig::from_file(Path::new(&path))
            .with_context(|| format!("{}: bad config", path))?,
        None => AnalysisConfig::default(),
    };
    if let Some(base) = take_value(&mut args, "--base=") {
        cfg.base_address = parse_addr(&base)?;
    }
    if let Some(name) = take_value(&mut args, "--name=") {
        cfg.message_name = name;
    }
    if take_flag(&mut args, "--text") {
        cfg.outputs.text = true;
    }
    if let Some(dot) = take_value(&mut args, "--dot=") {
        cfg.outputs.dot = Some(PathBuf::from(dot));
    }
    if let Some(json) = take_value(&mut args, "--json=") {
        cfg.outputs.json = Some(PathBuf::from(json));
    }
    if take_flag(&mut args, "--refine") {
        cfg.refine_padding = true;
    }
    if let Some(level) = take_value(&mut args, "--log-level=") {
        cfg.log_level = level;
    }
    if let Some(unknown) = args.iter().find(|a| a.starts_with("--")) {
        eprintln!("unknown option {}", unknown);
        usage();
    }
    let [message_path, trace_path] = args.as_slice() else {
        usage();
    };

    tracing_subscriber::fmt()
        .with_max_level(cfg.tracing_level())
        .with_writer(std::io::stderr)
        .init();

    let raw = std::fs::read(message_path).with_context(|| format!("{}: read failed", message_path))?;
    let mut msg = Message::new(cfg.message_name.clone(), cfg.base_address, raw)?;
    let log = trace::load(Path::new(trace_path), Some(msg.region()))
        .with_context(|| format!("{}: bad trace", trace_path))?;
    tracing::info!(
        path = %message_path,
        bytes = msg.size(),
        events = log.len(),
        "loaded message and trace"
    );

    msg.construct_tree(&log, &StackHashComparator)?;
    msg.update_history(&log);
    if cfg.refine_padding {
        let mut refiner = PaddingRefiner::new();
        msg.refine(&mut refiner)?;
        tracing::info!(marked = refiner.marked(), "padding refined");
    }
    let diagnostics = msg.tree().diagnostics().len();
    tracing::info!(
        nodes = msg.tree().node_count(),
        leaves = msg.tree().leaves().len(),
        diagnostics,
        "tree built"
    );

    let no_output = !cfg.outputs.text && cfg.outputs.dot.is_none() && cfg.outputs.json.is_none();
    if cfg.outputs.text || no_output {
        print!("{}", text_dump(&msg));
    }
    if let Some(path) = &cfg.outputs.json {
        let json = TreeSnapshot::capture(&msg).to_json()?;
        write_output(path, &json)?;
    }
    if let Some(path) = &cfg.outputs.dot {
        let mut set = MessageSet::new();
        let id = set.add(msg);
        let dot = dot_string(&set, id)?;
        write_output(path, &dot)?;
    }
    Ok(())
}
