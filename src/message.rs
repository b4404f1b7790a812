//! Messages: raw bytes observed at a base address, plus the field tree inferred for them.
//!
//! [`MessageSet`] owns every message of an analysis session and hands out [`MessageId`]s.
//! Trees refer to other messages (sub-messages, link targets) only through these ids, so no
//! tree ever owns another message.

use crate::access::{AccessComparator, AccessLog};
use crate::node::{Link, LinkDirection, NodeId, Span};
use crate::refine::MessageTreeRefiner;
use crate::region::{MemRegion, Region};
use crate::tree::{MsgTree, TreeError};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub(crate) usize);

impl MessageId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg#{}", self.0)
    }
}

/// One instance of protocol data.
#[derive(Debug, Clone)]
pub struct Message {
    name: String,
    base: u32,
    raw: Vec<u8>,
    len: u32,
    tree: MsgTree,
    /// How this message was derived when it is a sub-message (e.g. "rc4 decrypt").
    tag: Option<String>,
}

/// Message lengths must fit the 32-bit address space of traces.
fn message_len(len: usize) -> Result<u32, TreeError> {
    u32::try_from(len).map_err(|_| TreeError::MessageTooLarge { len })
}

impl Message {
    /// A message whose tree is a single leaf over all bytes.
    pub fn new(name: impl Into<String>, base: u32, raw: Vec<u8>) -> Result<Self, TreeError> {
        let len = message_len(raw.len())?;
        let tree = MsgTree::new(raw.len())?;
        Ok(Message {
            name: name.into(),
            base,
            raw,
            len,
            tree,
            tag: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn size(&self) -> usize {
        self.raw.len()
    }

    /// Absolute address range covered by the message.
    pub fn region(&self) -> MemRegion {
        MemRegion::new(self.base, self.len)
    }

    pub fn tree(&self) -> &MsgTree {
        &self.tree
    }

    #[cfg(test)]
    pub(crate) fn tree_mut(&mut self) -> &mut MsgTree {
        &mut self.tree
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn set_tag(&mut self, tag: impl Into<String>) {
        self.tag = Some(tag.into());
    }

    /// Rebuild the tree from `log`. The previous tree is kept if construction fails.
    pub fn construct_tree(
        &mut self,
        log: &AccessLog,
        cmp: &dyn AccessComparator,
    ) -> Result<(), TreeError> {
        self.tree = MsgTree::construct(self.size(), log, cmp)?;
        Ok(())
    }

    /// Insert a candidate field given in message-relative offsets.
    pub fn insert(&mut self, span: Span) -> Result<(), TreeError> {
        self.tree.insert(span)
    }

    /// Fold `log` into the execution histories of the tree.
    pub fn update_history(&mut self, log: &AccessLog) {
        self.tree.update_history(log);
    }

    /// Drop the subtree below `id`, as [`MsgTree::clear_children`] does.
    pub fn clear_children(&mut self, id: NodeId) -> Result<(), TreeError> {
        self.tree.get(id)?;
        self.tree.clear_children(id);
        Ok(())
    }

    /// Run `refiner` over the tree against this message's bytes.
    pub fn refine(&mut self, refiner: &mut dyn MessageTreeRefiner) -> Result<(), TreeError> {
        refiner.refine_tree(&mut self.tree, &self.raw)
    }

    /// Translate an absolute region into message-relative offsets.
    pub fn relative(&self, r: MemRegion) -> Result<Region, TreeError> {
        r.relative_to(&self.region())
    }

    /// The leaf holding the byte at absolute address `addr`.
    pub fn find_node_at(&self, addr: u32) -> Result<NodeId, TreeError> {
        let region = self.relative(MemRegion::new(addr, 1))?;
        self.tree.find_node(region.offset)
    }

    pub fn find_node(&self, r: MemRegion) -> Result<Option<NodeId>, TreeError> {
        Ok(self.tree.find_region(self.relative(r)?))
    }

    pub fn find_or_create_node(&mut self, r: MemRegion) -> Result<NodeId, TreeError> {
        let region = self.relative(r)?;
        self.tree.find_or_create_node(region)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MessageSetError {
    #[error("Unknown message: {0}")]
    UnknownMessage(MessageId),
    #[error("Attaching {child} under {parent} would create a cycle")]
    Cycle { parent: MessageId, child: MessageId },
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Owner of all messages in one analysis.
#[derive(Debug, Default)]
pub struct MessageSet {
    messages: Vec<Message>,
}

impl MessageSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, message: Message) -> MessageId {
        self.messages.push(message);
        MessageId(self.messages.len() - 1)
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.get(id.0)
    }

    pub fn get_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages.get_mut(id.0)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MessageId, &Message)> {
        self.messages.iter().enumerate().map(|(i, m)| (MessageId(i), m))
    }

    pub fn find_by_name(&self, name: &str) -> Option<MessageId> {
        self.messages
            .iter()
            .position(|m| m.name == name)
            .map(MessageId)
    }

    fn message(&self, id: MessageId) -> Result<&Message, MessageSetError> {
        self.get(id).ok_or(MessageSetError::UnknownMessage(id))
    }

    /// Whether `to` is `from` or one of its (transitive) sub-messages.
    fn reaches(&self, from: MessageId, to: MessageId) -> bool {
        let mut stack = vec![from];
        let mut seen = vec![false; self.messages.len()];
        while let Some(m) = stack.pop() {
            if m == to {
                return true;
            }
            let Some(message) = self.messages.get(m.0) else {
                continue;
            };
            if std::mem::replace(&mut seen[m.0], true) {
                continue;
            }
            let tree = message.tree();
            for id in tree.preorder() {
                stack.extend(tree[id].sub_messages().iter().copied());
            }
        }
        false
    }

    /// Record that leaf `node` of `parent` decodes to `child`.
    pub fn attach_sub_message(
        &mut self,
        parent: MessageId,
        node: NodeId,
        child: MessageId,
    ) -> Result<(), MessageSetError> {
        self.message(parent)?;
        self.message(child)?;
        if self.reaches(child, parent) {
            return Err(MessageSetError::Cycle { parent, child });
        }
        self.messages[parent.0].tree.attach_sub_message(node, child)?;
        Ok(())
    }

    /// Add a labelled edge from `from` to `to`; both nodes must exist.
    pub fn add_link(
        &mut self,
        from: (MessageId, NodeId),
        to: (MessageId, NodeId),
        description: impl Into<String>,
        direction: LinkDirection,
    ) -> Result<(), MessageSetError> {
        self.message(to.0)?.tree().get(to.1)?;
        let link = Link {
            target_message: to.0,
            target: to.1,
            description: description.into(),
            direction,
        };
        let source = self
            .get_mut(from.0)
            .ok_or(MessageSetError::UnknownMessage(from.0))?;
        source.tree.add_link(from.1, link)?;
        Ok(())
    }
}
