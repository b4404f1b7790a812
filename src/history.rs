//! Text form of execution histories: fingerprints as 8-digit hex tokens separated by spaces.
//!
//! This is the form used by the text dump and by JSON snapshots.

use crate::access::Fingerprint;
use crate::tree::TreeError;
use std::collections::BTreeSet;

pub fn encode<'a>(history: impl IntoIterator<Item = &'a Fingerprint>) -> String {
    history
        .into_iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decode a strict (ordered, duplicates kept) history.
pub fn decode(s: &str) -> Result<Vec<Fingerprint>, TreeError> {
    s.split_whitespace().map(|tok| decode_token(tok, s)).collect()
}

/// Decode a history set; duplicates collapse.
pub fn decode_set(s: &str) -> Result<BTreeSet<Fingerprint>, TreeError> {
    s.split_whitespace().map(|tok| decode_token(tok, s)).collect()
}

fn decode_token(tok: &str, input: &str) -> Result<Fingerprint, TreeError> {
    let tok = tok.strip_prefix("0x").unwrap_or(tok);
    let bad = tok
        .char_indices()
        .find(|&(i, c)| i >= 8 || !c.is_ascii_hexdigit());
    if let Some((_, symbol)) = bad {
        return Err(TreeError::UnrecognizedSymbol {
            symbol,
            input: input.to_string(),
        });
    }
    u32::from_str_radix(tok, 16)
        .map(Fingerprint)
        .map_err(|_| TreeError::UnrecognizedSymbol {
            symbol: ' ',
            input: input.to_string(),
        })
}
