//! Tree nodes: an inclusive byte range of a message plus what was learned about it.
//!
//! Nodes live in the arena of their [`MsgTree`](crate::tree::MsgTree) and are addressed by
//! [`NodeId`]. A node owns its children through the `children` list; `parent` is a plain back
//! index that is never used to free anything.

use crate::access::Fingerprint;
use crate::message::MessageId;
use std::collections::BTreeSet;
use std::fmt;

/// Index of a node in its tree's arena. Ids are never reused within one tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Inclusive byte range `[l, r]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub l: usize,
    pub r: usize,
}

impl Span {
    pub fn new(l: usize, r: usize) -> Self {
        Span { l, r }
    }

    pub fn len(&self) -> usize {
        self.r + 1 - self.l
    }

    pub fn is_empty(&self) -> bool {
        self.l > self.r
    }

    pub fn contains(&self, other: Span) -> bool {
        self.l <= other.l && self.r >= other.r
    }

    pub fn contains_offset(&self, offset: usize) -> bool {
        self.l <= offset && offset <= self.r
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.l, self.r)
    }
}

/// Per-node markers set by refiners and the linking stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NodeFlags(u32);

impl NodeFlags {
    pub const NONE: NodeFlags = NodeFlags(0);
    /// Field belongs to a group processed in parallel (e.g. an array element).
    pub const PARALLEL: NodeFlags = NodeFlags(1);
    /// Field acts as a delimiter between neighbours.
    pub const SEPARATOR: NodeFlags = NodeFlags(1 << 1);
    /// Zero bytes treated as padding.
    pub const PADDING: NodeFlags = NodeFlags(1 << 2);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn from_bits(bits: u32) -> Self {
        NodeFlags(bits & (Self::PARALLEL.0 | Self::SEPARATOR.0 | Self::PADDING.0))
    }

    pub fn contains(self, other: NodeFlags) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: NodeFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: NodeFlags) {
        self.0 &= !other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Arrow direction of a link edge, as understood by Graphviz `dir=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDirection {
    Forward,
    Back,
    Both,
    None,
}

impl LinkDirection {
    pub fn as_dot_str(self) -> &'static str {
        match self {
            LinkDirection::Forward => "forward",
            LinkDirection::Back => "back",
            LinkDirection::Both => "both",
            LinkDirection::None => "none",
        }
    }
}

/// Directed, labelled relation from the owning node to a node of (possibly) another message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub target_message: MessageId,
    pub target: NodeId,
    pub description: String,
    pub direction: LinkDirection,
}

/// One candidate field.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub(crate) l: usize,
    pub(crate) r: usize,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) exec_history: BTreeSet<Fingerprint>,
    pub(crate) exec_history_strict: Vec<Fingerprint>,
    pub(crate) flags: NodeFlags,
    pub(crate) sub_messages: Vec<MessageId>,
    pub(crate) links: Vec<Link>,
}

impl TreeNode {
    pub(crate) fn new(l: usize, r: usize, parent: Option<NodeId>) -> Self {
        debug_assert!(l <= r);
        TreeNode {
            l,
            r,
            parent,
            children: Vec::new(),
            exec_history: BTreeSet::new(),
            exec_history_strict: Vec::new(),
            flags: NodeFlags::NONE,
            sub_messages: Vec::new(),
            links: Vec::new(),
        }
    }

    pub fn l(&self) -> usize {
        self.l
    }

    pub fn r(&self) -> usize {
        self.r
    }

    pub fn span(&self) -> Span {
        Span::new(self.l, self.r)
    }

    pub fn len(&self) -> usize {
        self.r + 1 - self.l
    }

    pub fn is_empty(&self) -> bool {
        self.l > self.r
    }

    pub fn contains(&self, span: Span) -> bool {
        self.l <= span.l && self.r >= span.r
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    pub fn has_flag(&self, flag: NodeFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn set_flag(&mut self, flag: NodeFlags) {
        self.flags.insert(flag);
    }

    pub fn clear_flag(&mut self, flag: NodeFlags) {
        self.flags.remove(flag);
    }

    pub fn exec_history(&self) -> &BTreeSet<Fingerprint> {
        &self.exec_history
    }

    pub fn exec_history_strict(&self) -> &[Fingerprint] {
        &self.exec_history_strict
    }

    pub fn sub_messages(&self) -> &[MessageId] {
        &self.sub_messages
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn add_link(&mut self, link: Link) {
        self.links.push(link);
    }
}
