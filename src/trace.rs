//! Reading and writing access traces.
//!
//! Two formats are supported:
//!
//! - **Text** (`src/trace.pest`): one event per line, `<offset> #<fingerprint>` or
//!   `<offset> [<frame> ...]`; offsets are decimal or `0x` hex, `@<addr>` marks an absolute
//!   address. `;` starts a comment.
//! - **Binary**: `b"MTRC"`, version (u32 LE, currently 1), event count (u32 LE), then one
//!   `(offset: u32 LE, fingerprint: u32 LE)` record per event.
//!
//! [`load`] picks the format from the file's first bytes.

use crate::access::{proc_stack_hash, AccessEvent, AccessLog, Fingerprint};
use crate::region::MemRegion;
use crate::tree::TreeError;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use pest::Parser;
use pest_derive::Parser as PestParser;
use std::io::{Read, Write};
use std::path::Path;

#[derive(PestParser)]
#[grammar = "trace.pest"]
struct TraceParser;

pub const MAGIC: [u8; 4] = *b"MTRC";
pub const VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Bad magic: {0:02x?}")]
    BadMagic([u8; 4]),
    #[error("Unsupported trace version {0}")]
    Version(u32),
    #[error("Value: {0}")]
    Value(String),
    #[error(transparent)]
    Tree(#[from] TreeError),
}

fn parse_number(s: &str) -> Result<u64, TraceError> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|e| TraceError::Value(format!("{}: {}", s, e)))
}

fn parse_hex_u32(s: &str) -> Result<u32, TraceError> {
    u32::from_str_radix(s, 16).map_err(|e| TraceError::Value(format!("{}: {}", s, e)))
}

/// Parse a text trace. `message` is needed only when the trace uses absolute addresses.
pub fn parse_text(source: &str, message: Option<MemRegion>) -> Result<AccessLog, TraceError> {
    let pairs = TraceParser::parse(Rule::trace, source)
        .map_err(|e| TraceError::Parse(e.to_string()))?;
    let trace = pairs
        .into_iter()
        .next()
        .ok_or_else(|| TraceError::Parse("empty parse".to_string()))?;

    let mut log = AccessLog::new();
    for event in trace.into_inner() {
        if event.as_rule() != Rule::event {
            continue;
        }
        let mut it = event.into_inner();
        let position = it
            .next()
            .ok_or_else(|| TraceError::Parse("event: position".to_string()))?;
        let context = it
            .next()
            .ok_or_else(|| TraceError::Parse("event: context".to_string()))?;

        let value = position
            .clone()
            .into_inner()
            .next()
            .ok_or_else(|| TraceError::Parse("position: number".to_string()))?;
        let value = parse_number(value.as_str())?;
        let offset = match position.as_rule() {
            Rule::absolute => {
                let msg = message.ok_or_else(|| {
                    TraceError::Value(format!(
                        "absolute address {:#x} needs a message base",
                        value
                    ))
                })?;
                let addr = u32::try_from(value)
                    .map_err(|_| TraceError::Value(format!("address {:#x} too large", value)))?;
                MemRegion::new(addr, 1).relative_to(&msg)?.offset
            }
            _ => usize::try_from(value)
                .map_err(|_| TraceError::Value(format!("offset {} too large", value)))?,
        };

        let fingerprint = match context.as_rule() {
            Rule::fingerprint => {
                let digits = context
                    .into_inner()
                    .next()
                    .ok_or_else(|| TraceError::Parse("fingerprint: digits".to_string()))?;
                Fingerprint(parse_hex_u32(digits.as_str())?)
            }
            Rule::call_stack => {
                let frames = context
                    .into_inner()
                    .map(|f| parse_hex_u32(f.as_str()))
                    .collect::<Result<Vec<_>, _>>()?;
                proc_stack_hash(&frames)
            }
            other => return Err(TraceError::Parse(format!("unexpected context {:?}", other))),
        };
        log.push(AccessEvent {
            offset,
            fingerprint,
        });
    }
    Ok(log)
}

/// Render `log` in the text format (relative offsets, precomputed fingerprints).
pub fn format_text(log: &AccessLog) -> String {
    let mut out = String::new();
    for e in log {
        out.push_str(&format!("{} #{}\n", e.offset, e.fingerprint));
    }
    out
}

pub fn read_binary<R: Read>(r: &mut R) -> Result<AccessLog, TraceError> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(TraceError::BadMagic(magic));
    }
    let version = r.read_u32::<LittleEndian>()?;
    if version != VERSION {
        return Err(TraceError::Version(version));
    }
    let count = r.read_u32::<LittleEndian>()? as usize;
    let mut log = AccessLog::new();
    for _ in 0..count {
        let offset = r.read_u32::<LittleEndian>()? as usize;
        let fingerprint = Fingerprint(r.read_u32::<LittleEndian>()?);
        log.push(AccessEvent {
            offset,
            fingerprint,
        });
    }
    Ok(log)
}

pub fn write_binary<W: Write>(w: &mut W, log: &AccessLog) -> Result<(), TraceError> {
    let count = u32::try_from(log.len())
        .map_err(|_| TraceError::Value(format!("{} events do not fit a u32 count", log.len())))?;
    w.write_all(&MAGIC)?;
    w.write_u32::<LittleEndian>(VERSION)?;
    w.write_u32::<LittleEndian>(count)?;
    for e in log {
        let offset = u32::try_from(e.offset)
            .map_err(|_| TraceError::Value(format!("offset {} too large", e.offset)))?;
        w.write_u32::<LittleEndian>(offset)?;
        w.write_u32::<LittleEndian>(e.fingerprint.0)?;
    }
    Ok(())
}

/// True when `bytes` start with the binary trace magic.
pub fn is_binary(bytes: &[u8]) -> bool {
    bytes.starts_with(&MAGIC)
}

/// Load a trace file in either format.
pub fn load(path: &Path, message: Option<MemRegion>) -> Result<AccessLog, TraceError> {
    let bytes = std::fs::read(path)?;
    if is_binary(&bytes) {
        return read_binary(&mut bytes.as_slice());
    }
    let text = String::from_utf8(bytes)
        .map_err(|e| TraceError::Parse(format!("{}: not UTF-8 ({})", path.display(), e)))?;
    parse_text(&text, message)
}
