//! Access events: which byte of a message was touched, and under which call-stack context.
//!
//! An [`AccessLog`] is produced by the tracer for one message instance and is consumed
//! read-only by tree construction. Events stay in temporal order; they are never sorted by
//! offset.

use std::fmt;

/// Derived identifier of a call-stack snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Fingerprint(pub u32);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl From<u32> for Fingerprint {
    fn from(v: u32) -> Self {
        Fingerprint(v)
    }
}

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Hash a call stack (innermost frame first) into a [`Fingerprint`].
///
/// FNV-1a over the little-endian bytes of every frame address. An empty stack hashes to the
/// FNV offset basis.
pub fn proc_stack_hash(frames: &[u32]) -> Fingerprint {
    let mut h = FNV_OFFSET;
    for frame in frames {
        for b in frame.to_le_bytes() {
            h ^= b as u32;
            h = h.wrapping_mul(FNV_PRIME);
        }
    }
    Fingerprint(h)
}

/// One observation: the target touched `offset` (relative to the message base) under `fingerprint`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessEvent {
    pub offset: usize,
    pub fingerprint: Fingerprint,
}

impl AccessEvent {
    pub fn new(offset: usize, fingerprint: impl Into<Fingerprint>) -> Self {
        AccessEvent {
            offset,
            fingerprint: fingerprint.into(),
        }
    }

    /// Build an event from a raw call stack; the fingerprint is [`proc_stack_hash`] of `frames`.
    pub fn from_call_stack(offset: usize, frames: &[u32]) -> Self {
        AccessEvent {
            offset,
            fingerprint: proc_stack_hash(frames),
        }
    }
}

/// Temporally ordered access events for one message instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessLog {
    events: Vec<AccessEvent>,
}

impl AccessLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: AccessEvent) {
        self.events.push(event);
    }

    pub fn get(&self, i: usize) -> Option<&AccessEvent> {
        self.events.get(i)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AccessEvent> {
        self.events.iter()
    }

    pub fn events(&self) -> &[AccessEvent] {
        &self.events
    }

    /// Largest offset touched, if any.
    pub fn max_offset(&self) -> Option<usize> {
        self.events.iter().map(|e| e.offset).max()
    }
}

impl FromIterator<AccessEvent> for AccessLog {
    fn from_iter<I: IntoIterator<Item = AccessEvent>>(iter: I) -> Self {
        AccessLog {
            events: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a AccessLog {
    type Item = &'a AccessEvent;
    type IntoIter = std::slice::Iter<'a, AccessEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

/// Decides whether two accesses are the same logical visit.
pub trait AccessComparator {
    fn equals(&self, a: &AccessEvent, b: &AccessEvent) -> bool;
}

/// Two accesses are the same visit iff their call-stack fingerprints are equal.
#[derive(Debug, Clone, Copy, Default)]
pub struct StackHashComparator;

impl AccessComparator for StackHashComparator {
    fn equals(&self, a: &AccessEvent, b: &AccessEvent) -> bool {
        a.fingerprint == b.fingerprint
    }
}
