//! JSON snapshots of a message tree.
//!
//! A snapshot keeps ranges, flags and both execution histories (in the [`history`](crate::history)
//! text form). Sub-message anchors and links refer to other messages of a session and are not
//! part of a snapshot.

use crate::history;
use crate::message::Message;
use crate::node::{NodeFlags, NodeId, Span};
use crate::tree::{MsgTree, TreeError};
use serde::{Deserialize, Serialize};

fn is_zero(v: &u32) -> bool {
    *v == 0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub l: usize,
    pub r: usize,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub flags: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub exec_history: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub exec_history_strict: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub message: String,
    pub base: u32,
    pub size: usize,
    pub root: NodeSnapshot,
}

fn capture_node(tree: &MsgTree, id: NodeId) -> NodeSnapshot {
    let node = &tree[id];
    NodeSnapshot {
        l: node.l(),
        r: node.r(),
        flags: node.flags().bits(),
        exec_history: history::encode(node.exec_history()),
        exec_history_strict: history::encode(node.exec_history_strict()),
        children: node
            .children()
            .iter()
            .map(|&c| capture_node(tree, c))
            .collect(),
    }
}

impl TreeSnapshot {
    pub fn capture(msg: &Message) -> Self {
        let tree = msg.tree();
        TreeSnapshot {
            message: msg.name().to_string(),
            base: msg.base(),
            size: tree.size(),
            root: capture_node(tree, tree.root()),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Rebuild the tree; fails on undecodable histories or a malformed partition.
    pub fn restore(&self) -> Result<MsgTree, TreeError> {
        let mut tree = MsgTree::new(self.size)?;
        let root = tree.root();
        let mut stack = vec![(&self.root, root)];
        while let Some((snap, id)) = stack.pop() {
            if snap.l > snap.r {
                return Err(TreeError::InvariantViolation {
                    detail: format!("snapshot node [{},{}] is inverted", snap.l, snap.r),
                });
            }
            let node = &mut tree[id];
            node.l = snap.l;
            node.r = snap.r;
            node.flags = NodeFlags::from_bits(snap.flags);
            node.exec_history = history::decode_set(&snap.exec_history)?;
            node.exec_history_strict = history::decode(&snap.exec_history_strict)?;
            for child in &snap.children {
                let child_id = tree.append_child(id, Span::new(child.l, child.l));
                stack.push((child, child_id));
            }
        }
        tree.fix_parents();
        tree.validate()?;
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{AccessEvent, AccessLog, StackHashComparator};

    fn sample() -> Message {
        let mut msg = Message::new("sample", 0x1000, (0u8..16).collect()).expect("message");
        let log: AccessLog = (0..4)
            .map(|o| AccessEvent::new(o, 0x11u32))
            .chain((8..13).map(|o| AccessEvent::new(o, 0x22u32)))
            .collect();
        msg.construct_tree(&log, &StackHashComparator).expect("construct");
        msg.update_history(&log);
        msg
    }

    #[test]
    fn snapshot_restores_same_structure() {
        let msg = sample();
        let snap = TreeSnapshot::capture(&msg);
        let json = snap.to_json().expect("json");
        let back = TreeSnapshot::from_json(&json).expect("parse");
        assert_eq!(back, snap);
        let tree = back.restore().expect("restore");
        assert_eq!(tree.leaf_spans(), msg.tree().leaf_spans());
        let leaf = tree.find_node(8).expect("leaf");
        assert_eq!(tree[leaf].exec_history_strict().len(), 1);
    }

    #[test]
    fn restore_compacts_the_arena() {
        let mut msg = sample();
        let root = msg.tree().root();
        msg.clear_children(root).expect("clear");
        msg.insert(Span::new(4, 7)).expect("insert");
        assert!(msg.tree().free_slots() > 0);
        let tree = TreeSnapshot::capture(&msg).restore().expect("restore");
        assert_eq!(tree.free_slots(), 0);
        assert_eq!(tree.leaf_spans(), msg.tree().leaf_spans());
    }

    #[test]
    fn bad_history_symbol_fails_restore() {
        let mut snap = TreeSnapshot::capture(&sample());
        snap.root.children[0].exec_history_strict = "0000zz11".to_string();
        assert!(matches!(
            snap.restore(),
            Err(TreeError::UnrecognizedSymbol { symbol: 'z', .. })
        ));
    }

    #[test]
    fn broken_partition_fails_restore() {
        let mut snap = TreeSnapshot::capture(&sample());
        snap.root.children[1].l += 1;
        assert!(matches!(
            snap.restore(),
            Err(TreeError::InvariantViolation { .. })
        ));
    }
}
