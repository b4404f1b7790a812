//! Bottom-up rewrite passes over a constructed tree.
//!
//! A refiner sees every node after all of its children, together with the message bytes,
//! and may change the node's flags or split it. After the pass parents are re-fixed and the
//! tree is re-validated.

use crate::node::{NodeFlags, NodeId, Span};
use crate::tree::{MsgTree, TreeError};

pub trait MessageTreeRefiner {
    /// Transform `node`; its children have already been refined.
    fn refine_node(&mut self, tree: &mut MsgTree, raw: &[u8], node: NodeId);

    /// Refine the subtree at `node`, children first.
    fn refine(&mut self, tree: &mut MsgTree, raw: &[u8], node: NodeId) {
        let children = tree[node].children().to_vec();
        for c in children {
            self.refine(tree, raw, c);
        }
        self.refine_node(tree, raw, node);
    }

    /// Refine the whole tree of a message whose bytes are `raw`.
    fn refine_tree(&mut self, tree: &mut MsgTree, raw: &[u8]) -> Result<(), TreeError> {
        if raw.len() != tree.size() {
            return Err(TreeError::InvariantViolation {
                detail: format!("{} bytes for a tree of {}", raw.len(), tree.size()),
            });
        }
        let root = tree.root();
        self.refine(tree, raw, root);
        tree.fix_parents();
        tree.validate().map_err(|e| {
            tracing::error!("tree validity failed after refining");
            e
        })
    }
}

/// Trailing zero runs shorter than this are left alone.
pub const MIN_PADDING_RUN: usize = 2;

/// Marks trailing zero bytes of leaf fields as padding.
///
/// An all-zero leaf is flagged [`NodeFlags::PADDING`]; a leaf that merely ends in zeros is
/// split so the zero tail becomes its own flagged leaf. Leaves anchoring a sub-message are
/// not touched. Running the pass again changes nothing.
#[derive(Debug, Default)]
pub struct PaddingRefiner {
    marked: usize,
}

impl PaddingRefiner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of padding leaves flagged so far (re-flagging counts again).
    pub fn marked(&self) -> usize {
        self.marked
    }
}

fn trailing_zeros(bytes: &[u8]) -> usize {
    bytes.iter().rev().take_while(|&&b| b == 0).count()
}

impl MessageTreeRefiner for PaddingRefiner {
    fn refine_node(&mut self, tree: &mut MsgTree, raw: &[u8], node: NodeId) {
        let n = &tree[node];
        if !n.is_leaf() || !n.sub_messages().is_empty() {
            return;
        }
        let span = n.span();
        let zeros = trailing_zeros(&raw[span.l..=span.r]);
        if zeros < MIN_PADDING_RUN {
            return;
        }
        let target = if zeros == span.len() {
            node
        } else {
            let z = span.r + 1 - zeros;
            tree.insert_at(node, Span::new(span.l, z - 1));
            match tree[node].children().last() {
                Some(&tail) => tail,
                None => return,
            }
        };
        tree[target].set_flag(NodeFlags::PADDING);
        self.marked += 1;
    }
}
