//! # protoinfer: Protocol Field Inference from Access Traces
//!
//! Given the bytes of one protocol message and a log of which byte offsets a program read
//! (and from which call-stack context), build a tree of candidate fields: a nested partition
//! of `[0, size-1]` in which each node is a contiguous byte range.
//!
//! ## Pipeline
//!
//! - **Trace**: load an [`AccessLog`] from text or binary ([`trace`])
//! - **Construct**: segment the log into runs of consecutive offsets with the same context
//!   and insert each run into the tree ([`MsgTree::construct`], [`insert`])
//! - **Refine**: optional bottom-up passes over the finished tree ([`refine`])
//! - **Export**: indented text, Graphviz DOT ([`dump`]) and JSON snapshots ([`snapshot`])
//!
//! ## Example
//!
//! ```
//! use protoinfer::{AccessEvent, AccessLog, Message, StackHashComparator, Span};
//!
//! let log: AccessLog = (0..4).map(|o| AccessEvent::new(o, 0x11u32)).collect();
//! let mut msg = Message::new("req", 0x1000, vec![0xaa; 8])?;
//! msg.construct_tree(&log, &StackHashComparator)?;
//! assert_eq!(msg.tree().leaf_spans(), vec![Span::new(0, 3), Span::new(4, 7)]);
//! # Ok::<(), protoinfer::TreeError>(())
//! ```
//!
//! Insertion never fails on noisy input: near-duplicate and off-by-one candidates are dropped
//! or absorbed and reported as [`Diagnostic`]s on the tree (and through `tracing`).

pub mod access;
pub mod config;
pub mod diag;
pub mod dump;
pub mod history;
pub mod insert;
pub mod message;
pub mod node;
pub mod refine;
pub mod region;
pub mod snapshot;
pub mod trace;
pub mod tree;
pub mod validate;

pub use access::{
    proc_stack_hash, AccessComparator, AccessEvent, AccessLog, Fingerprint, StackHashComparator,
};
pub use config::{AnalysisConfig, ConfigError};
pub use diag::Diagnostic;
pub use dump::{dot_string, text_dump, write_dot, write_text};
pub use message::{Message, MessageId, MessageSet, MessageSetError};
pub use node::{Link, LinkDirection, NodeFlags, NodeId, Span, TreeNode};
pub use refine::{MessageTreeRefiner, PaddingRefiner};
pub use region::{MemRegion, Region};
pub use snapshot::TreeSnapshot;
pub use trace::TraceError;
pub use tree::{MsgTree, TreeError, MINIMUM_SEQUENCE_LENGTH};
pub use validate::{ValidityIssue, ValidityRule};
