//! Trace fuzz target: feed arbitrary bytes to the trace readers and build a tree from
//! whatever loads. Nothing may panic; bad input must come back as an error.
//! Build with: cargo fuzz run trace_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    use protoinfer::{trace, MemRegion, MsgTree, StackHashComparator};

    let log = if trace::is_binary(data) {
        trace::read_binary(&mut &data[..])
    } else {
        match std::str::from_utf8(data) {
            Ok(s) => trace::parse_text(s, Some(MemRegion::new(0x1000, 256))),
            Err(_) => return,
        }
    };
    let Ok(log) = log else { return };
    let Some(max) = log.max_offset() else { return };
    if max >= 4096 {
        return;
    }
    let tree = MsgTree::construct(max + 1, &log, &StackHashComparator);
    assert!(tree.is_ok(), "construct failed on valid log: {:?}", tree.err());
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run trace_fuzz");
}
