//! Structural checks for message trees.
//!
//! ## Rules
//!
//! - **Root span**: the root covers exactly `[0, size-1]`.
//! - **Leaf bounds**: every node has `l <= r`.
//! - **No single child**: a node never has exactly one child (it would equal its parent).
//! - **Partition**: children are sorted, contiguous, non-overlapping and cover their parent.
//! - **Parent link**: each child's back reference names the node that owns it.
//!
//! [`MsgTree::check_validity`] is the cheap yes/no form; [`MsgTree::validity_issues`] lists every
//! finding, in pre-order, for diagnostics and tests.

use crate::node::{NodeId, Span};
use crate::tree::{MsgTree, TreeError};
use std::fmt;

/// Identifies which structural rule a finding violates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidityRule {
    RootSpan,
    LeafBounds,
    SingleChild,
    Partition,
    ParentLink,
}

/// A single violation with the node it was found on.
#[derive(Debug, Clone)]
pub struct ValidityIssue {
    pub node: NodeId,
    pub span: Span,
    pub rule: ValidityRule,
    pub message: String,
}

impl fmt::Display for ValidityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {} ({:?})", self.node, self.span, self.message, self.rule)
    }
}

impl MsgTree {
    /// Run all structural rules. Returns findings in pre-order.
    pub fn validity_issues(&self) -> Vec<ValidityIssue> {
        let mut out = Vec::new();
        let root = self.root();
        let root_span = self[root].span();
        if root_span != Span::new(0, self.size() - 1) {
            out.push(ValidityIssue {
                node: root,
                span: root_span,
                rule: ValidityRule::RootSpan,
                message: format!("root must span [0,{}]", self.size() - 1),
            });
        }

        for id in self.preorder() {
            let node = &self[id];
            let span = node.span();
            if node.l() > node.r() {
                out.push(ValidityIssue {
                    node: id,
                    span,
                    rule: ValidityRule::LeafBounds,
                    message: "left bound past right bound".to_string(),
                });
            }
            match node.children().len() {
                0 => continue,
                1 => {
                    out.push(ValidityIssue {
                        node: id,
                        span,
                        rule: ValidityRule::SingleChild,
                        message: "exactly one child".to_string(),
                    });
                }
                _ => {}
            }

            let mut expected = node.l();
            for &c in node.children() {
                let child = &self[c];
                if child.l() != expected {
                    out.push(ValidityIssue {
                        node: id,
                        span,
                        rule: ValidityRule::Partition,
                        message: format!("child {} should start at {}", child.span(), expected),
                    });
                }
                if child.parent() != Some(id) {
                    out.push(ValidityIssue {
                        node: c,
                        span: child.span(),
                        rule: ValidityRule::ParentLink,
                        message: format!("parent should be {}", id),
                    });
                }
                expected = child.r() + 1;
            }
            if expected != node.r() + 1 {
                out.push(ValidityIssue {
                    node: id,
                    span,
                    rule: ValidityRule::Partition,
                    message: format!("children end at {} instead of {}", expected - 1, node.r()),
                });
            }
        }
        out
    }

    /// True when the whole tree is a well-formed partition.
    pub fn check_validity(&self) -> bool {
        self.validity_issues().is_empty()
    }

    /// [`MsgTree::check_validity`] as a `Result`, carrying the first finding.
    pub fn validate(&self) -> Result<(), TreeError> {
        match self.validity_issues().into_iter().next() {
            None => Ok(()),
            Some(issue) => {
                tracing::error!(%issue, "message tree validity check failed");
                Err(TreeError::InvariantViolation {
                    detail: issue.to_string(),
                })
            }
        }
    }
}
