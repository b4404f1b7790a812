//! Message field tree: construction from an access log, lookup, and maintenance.
//!
//! The tree partitions a message `[0, size-1]` into nested candidate fields. It is built by
//! segmenting the access log into runs of consecutive offsets touched under the same
//! call-stack context and inserting every committed run (see [`insert`](crate::insert)).
//!
//! ## Ownership
//!
//! Nodes live in an arena owned by the [`MsgTree`]. Each node is reachable from the root
//! through exactly one `children` list; `parent` indices are only back references and are
//! refreshed by [`MsgTree::fix_parents`]. Dropping the tree drops every node, including any
//! fragment that was detached while a failing operation was in flight.
//!
//! ## Validity
//!
//! After every public mutation the tree is checked with [`MsgTree::validate`]. A failure is
//! an algorithmic bug, reported as [`TreeError::InvariantViolation`]; callers usually drop
//! the tree (or skip the message) rather than continue with it.

use crate::access::{AccessComparator, AccessLog, Fingerprint};
use crate::diag::Diagnostic;
use crate::message::MessageId;
use crate::node::{Link, NodeId, Span, TreeNode};
use crate::region::Region;
use std::collections::HashMap;
use std::ops::{Index, IndexMut};

/// Runs shorter than this (but longer than one byte) are dropped during segmentation.
pub const MINIMUM_SEQUENCE_LENGTH: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("Invariant violation: {detail}")]
    InvariantViolation { detail: String },
    #[error("Region {addr:#x}+{len} outside message {base:#x}+{size}")]
    RegionOutOfRange { addr: u32, len: u32, base: u32, size: u32 },
    #[error("Offset {offset} outside message of {size} bytes")]
    OffsetOutOfRange { offset: usize, size: usize },
    #[error("Empty region")]
    EmptyRegion,
    #[error("Access log is empty")]
    EmptyLog,
    #[error("Message has no bytes")]
    EmptyMessage,
    #[error("Message of {len} bytes does not fit a 32-bit address range")]
    MessageTooLarge { len: usize },
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),
    #[error("Unrecognized symbol {symbol:?} in {input:?}")]
    UnrecognizedSymbol { symbol: char, input: String },
}

/// Arena-backed field tree of one message.
///
/// Removed nodes leave an empty slot behind and ids are never reused, so a tree that is
/// restructured many times keeps growing; [`MsgTree::free_slots`] reports the dead slots.
/// Restoring a [`TreeSnapshot`](crate::TreeSnapshot) yields a compact arena.
#[derive(Debug, Clone)]
pub struct MsgTree {
    nodes: Vec<Option<TreeNode>>,
    root: NodeId,
    size: usize,
    diagnostics: Vec<Diagnostic>,
}

impl Index<NodeId> for MsgTree {
    type Output = TreeNode;

    /// Panics if `id` was freed; ids handed out by the tree stay valid while their node is attached.
    fn index(&self, id: NodeId) -> &TreeNode {
        match self.nodes.get(id.0).and_then(Option::as_ref) {
            Some(n) => n,
            None => panic!("stale node id {}", id),
        }
    }
}

impl IndexMut<NodeId> for MsgTree {
    fn index_mut(&mut self, id: NodeId) -> &mut TreeNode {
        match self.nodes.get_mut(id.0).and_then(Option::as_mut) {
            Some(n) => n,
            None => panic!("stale node id {}", id),
        }
    }
}

impl MsgTree {
    /// A tree whose root is a single leaf spanning `[0, size-1]`.
    pub fn new(size: usize) -> Result<Self, TreeError> {
        if size == 0 {
            return Err(TreeError::EmptyMessage);
        }
        Ok(MsgTree {
            nodes: vec![Some(TreeNode::new(0, size - 1, None))],
            root: NodeId(0),
            size,
            diagnostics: Vec::new(),
        })
    }

    /// Build the tree of a `size`-byte message from its access log.
    ///
    /// Consecutive offsets visited under equal contexts form a run; a re-visit of the same
    /// offset under the same context is ignored. A run is inserted when it is a single byte or
    /// at least [`MINIMUM_SEQUENCE_LENGTH`] long; anything in between is dropped.
    pub fn construct(
        size: usize,
        log: &AccessLog,
        cmp: &dyn AccessComparator,
    ) -> Result<Self, TreeError> {
        let mut tree = MsgTree::new(size)?;
        let first = log.get(0).ok_or(TreeError::EmptyLog)?;
        if let Some(max) = log.max_offset() {
            if max >= size {
                return Err(TreeError::OffsetOutOfRange { offset: max, size });
            }
        }
        tracing::debug!(size, events = log.len(), "constructing message tree");

        let mut prev = first;
        let mut run = Span::new(prev.offset, prev.offset);
        for curr in log.iter().skip(1) {
            if curr.offset == prev.offset && cmp.equals(curr, prev) {
                // local re-visit
                continue;
            }
            if curr.offset == prev.offset + 1 && cmp.equals(curr, prev) {
                run.r = curr.offset;
            } else {
                tree.commit_run(run);
                run = Span::new(curr.offset, curr.offset);
            }
            prev = curr;
        }
        tree.commit_run(run);

        tree.fix_parents();
        tree.validate()?;
        tracing::debug!(nodes = tree.node_count(), "message tree constructed");
        Ok(tree)
    }

    fn commit_run(&mut self, run: Span) {
        let len = run.len();
        if len >= MINIMUM_SEQUENCE_LENGTH || len == 1 {
            tracing::trace!(run = %run, "inserting run");
            let root = self.root;
            self.insert_at(root, run);
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Message size in bytes; the root spans `[0, size-1]`.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut TreeNode> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn get(&self, id: NodeId) -> Result<&TreeNode, TreeError> {
        self.node(id).ok_or(TreeError::UnknownNode(id))
    }

    pub fn get_mut(&mut self, id: NodeId) -> Result<&mut TreeNode, TreeError> {
        self.node_mut(id).ok_or(TreeError::UnknownNode(id))
    }

    pub fn child(&self, id: NodeId, n: usize) -> Option<NodeId> {
        self.node(id).and_then(|node| node.children.get(n).copied())
    }

    /// Arena slots left behind by removed nodes.
    pub fn free_slots(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_none()).count()
    }

    /// Number of live nodes reachable from the root.
    pub fn node_count(&self) -> usize {
        self.preorder().len()
    }

    /// All nodes in depth-first pre-order (parent before children, children by offset).
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self[id].children.iter().rev().copied());
        }
        out
    }

    /// Leaves in offset order.
    pub fn leaves(&self) -> Vec<NodeId> {
        self.preorder()
            .into_iter()
            .filter(|&id| self[id].is_leaf())
            .collect()
    }

    /// Spans of all leaves in offset order.
    pub fn leaf_spans(&self) -> Vec<Span> {
        self.leaves().into_iter().map(|id| self[id].span()).collect()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub(crate) fn record(&mut self, diag: Diagnostic) {
        diag.emit();
        self.diagnostics.push(diag);
    }

    pub(crate) fn alloc(&mut self, node: TreeNode) -> NodeId {
        self.nodes.push(Some(node));
        NodeId(self.nodes.len() - 1)
    }

    /// Drop `id` and everything it owns.
    pub(crate) fn free_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(n.0).and_then(Option::take) {
                stack.extend(node.children);
            }
        }
    }

    /// Replace the children of `id`, keeping them sorted by start offset and pointing back at `id`.
    pub(crate) fn set_children(&mut self, id: NodeId, mut children: Vec<NodeId>) {
        children.sort_by_key(|&c| self[c].l);
        for &c in &children {
            self[c].parent = Some(id);
        }
        self[id].children = children;
    }

    /// Refresh every parent back reference from the owning `children` lists.
    pub fn fix_parents(&mut self) {
        let root = self.root;
        self[root].parent = None;
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let children = self[id].children.clone();
            for c in children {
                self[c].parent = Some(id);
                stack.push(c);
            }
        }
    }

    fn region_span(&self, region: Region) -> Result<Span, TreeError> {
        let (l, r) = region.bounds().ok_or(TreeError::EmptyRegion)?;
        if r >= self.size {
            return Err(TreeError::OffsetOutOfRange {
                offset: r,
                size: self.size,
            });
        }
        Ok(Span::new(l, r))
    }

    /// Insert a candidate field and re-validate the tree.
    pub fn insert(&mut self, span: Span) -> Result<(), TreeError> {
        if span.is_empty() {
            return Err(TreeError::EmptyRegion);
        }
        if span.r >= self.size {
            return Err(TreeError::OffsetOutOfRange {
                offset: span.r,
                size: self.size,
            });
        }
        let root = self.root;
        self.insert_at(root, span);
        self.fix_parents();
        self.validate()
    }

    /// Insert a candidate field below `id` (which must contain it) and re-validate the tree.
    pub fn insert_under(&mut self, id: NodeId, span: Span) -> Result<(), TreeError> {
        let container = self.get(id)?.span();
        if span.is_empty() {
            return Err(TreeError::EmptyRegion);
        }
        if !container.contains(span) {
            return Err(TreeError::InvariantViolation {
                detail: format!("{} does not contain {}", container, span),
            });
        }
        self.insert_at(id, span);
        self.fix_parents();
        self.validate()
    }

    /// The leaf containing `offset`.
    pub fn find_node(&self, offset: usize) -> Result<NodeId, TreeError> {
        if offset >= self.size {
            return Err(TreeError::OffsetOutOfRange {
                offset,
                size: self.size,
            });
        }
        let mut n = self.root;
        while !self[n].is_leaf() {
            let next = self[n]
                .children
                .iter()
                .copied()
                .find(|&c| self[c].span().contains_offset(offset));
            n = next.ok_or_else(|| TreeError::InvariantViolation {
                detail: format!("offset {} falls in a gap under {}", offset, self[n].span()),
            })?;
        }
        Ok(n)
    }

    /// The node whose range is exactly `region`, if one exists.
    pub fn find_region(&self, region: Region) -> Option<NodeId> {
        let span = self.region_span(region).ok()?;
        let mut n = self.root;
        loop {
            let node = &self[n];
            if node.span() == span {
                return Some(n);
            }
            n = node.children.iter().copied().find(|&c| self[c].contains(span))?;
        }
    }

    /// Resolve `region` to a node, inserting it first when no exact node exists.
    ///
    /// When the insertion is dropped as noise the deepest node containing `region` is returned.
    pub fn find_or_create_node(&mut self, region: Region) -> Result<NodeId, TreeError> {
        let span = self.region_span(region)?;
        let root = self.root;
        self.insert_at(root, span);
        self.fix_parents();
        self.validate()?;

        let mut n = self.root;
        loop {
            if self[n].span() == span {
                return Ok(n);
            }
            if self[n].is_leaf() {
                self.insert_at(n, span);
                self.fix_parents();
                self.validate()?;
                let exact = self[n].children.iter().copied().find(|&c| self[c].span() == span);
                return Ok(exact.unwrap_or(n));
            }
            match self[n].children.iter().copied().find(|&c| self[c].contains(span)) {
                Some(c) => n = c,
                None => return Ok(n),
            }
        }
    }

    /// Record, for every node, the fingerprints of events that touched its first byte.
    pub fn update_history(&mut self, log: &AccessLog) {
        let mut by_offset: HashMap<usize, Vec<Fingerprint>> = HashMap::new();
        for e in log {
            by_offset.entry(e.offset).or_default().push(e.fingerprint);
        }
        for id in self.preorder() {
            let l = self[id].l;
            if let Some(fps) = by_offset.get(&l) {
                let node = &mut self[id];
                node.exec_history.extend(fps.iter().copied());
                node.exec_history_strict.extend(fps.iter().copied());
            }
        }
    }

    /// Whether any leaf below (or at) `id` anchors a sub-message.
    pub fn has_sub_message(&self, id: NodeId) -> bool {
        let node = &self[id];
        if node.is_leaf() {
            return !node.sub_messages.is_empty();
        }
        node.children.iter().any(|&c| self.has_sub_message(c))
    }

    /// Collapse the structure under `id`.
    ///
    /// If a child subtree anchors a sub-message only the grandchildren go, so every child
    /// survives as a leaf; otherwise `id` itself becomes a leaf.
    pub fn clear_children(&mut self, id: NodeId) {
        if self[id].is_leaf() {
            return;
        }
        let children = self[id].children.clone();
        if children.iter().any(|&c| self.has_sub_message(c)) {
            for c in children {
                self.drop_children(c);
            }
        } else {
            self.drop_children(id);
        }
    }

    fn drop_children(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self[id].children);
        for c in children {
            self.free_subtree(c);
        }
    }

    /// Append a new child `span` to `id` without any restructuring.
    pub(crate) fn append_child(&mut self, id: NodeId, span: Span) -> NodeId {
        let child = self.alloc(TreeNode::new(span.l, span.r, Some(id)));
        self[id].children.push(child);
        child
    }

    /// Anchor `message` on leaf `id`. Cycle checks live in [`MessageSet`](crate::MessageSet).
    pub(crate) fn attach_sub_message(&mut self, id: NodeId, message: MessageId) -> Result<(), TreeError> {
        let node = self.get_mut(id)?;
        if !node.is_leaf() {
            return Err(TreeError::InvariantViolation {
                detail: format!("sub-message anchor {} is not a leaf", node.span()),
            });
        }
        node.sub_messages.push(message);
        Ok(())
    }

    pub fn add_link(&mut self, id: NodeId, link: Link) -> Result<(), TreeError> {
        self.get_mut(id)?.add_link(link);
        Ok(())
    }
}
