//! Insertion of a candidate field into a [`MsgTree`].
//!
//! A candidate is a byte range `X` contained in a node `N`. The first matching rule wins, so
//! the order below is also the tie-break policy:
//!
//! 1. `X == N`: nothing to do.
//! 2. `X` is `N` minus its last byte: measurement noise, dropped with a diagnostic.
//! 3. `N` is a leaf: `N` splits into `[N.l, X.l-1]`, `X`, `[X.r+1, N.r]` (empty parts omitted).
//! 4. Near duplicates among the children are absorbed, possibly moving a leaf/leaf boundary
//!    one byte to the left.
//! 5. A contiguous run of children spanning exactly `X` is regrouped under a new node `X`.
//! 6. A single child containing `X` either receives `X` recursively or, for a leaf sharing one
//!    of `X`'s bounds, is cut at `X`'s bounds in place.
//! 7. Otherwise `X` straddles several children: the overlapping parts are pushed down into the
//!    children that own them and the children fully inside the rest of `X` move under it.
//!
//! The candidate is consumed on every path: it ends up as a node of the tree or is dropped.

use crate::diag::Diagnostic;
use crate::node::{NodeId, Span, TreeNode};
use crate::tree::MsgTree;

/// Candidates longer than this are confident enough to be compared one byte off.
pub const CONFIDENT_LENGTH: usize = 8;

impl MsgTree {
    /// Insert `x` below `n`. `n` must contain `x`.
    pub(crate) fn insert_at(&mut self, n: NodeId, x: Span) {
        debug_assert!(self[n].contains(x), "{} does not contain {}", self[n].span(), x);
        let container = self[n].span();

        if container == x {
            return;
        }
        if container.l == x.l && container.r == x.r + 1 {
            self.record(Diagnostic::OffByOneIgnored {
                container,
                candidate: x,
            });
            return;
        }
        if self[n].is_leaf() {
            self.split_leaf(n, x);
            return;
        }
        if self.absorb_near_duplicate(n, x) {
            return;
        }
        if self.adopt_children_span(n, x) {
            return;
        }
        if self.insert_into_containing_child(n, x) {
            return;
        }
        self.insert_across_children(n, x);
    }

    /// Rule 3.
    fn split_leaf(&mut self, n: NodeId, x: Span) {
        let container = self[n].span();
        let mut parts = Vec::with_capacity(3);
        if container.l < x.l {
            parts.push(self.alloc(TreeNode::new(container.l, x.l - 1, Some(n))));
        }
        parts.push(self.alloc(TreeNode::new(x.l, x.r, Some(n))));
        if container.r > x.r {
            parts.push(self.alloc(TreeNode::new(x.r + 1, container.r, Some(n))));
        }
        self.set_children(n, parts);
    }

    /// Rule 4. Returns true when `x` has been fully absorbed.
    ///
    /// Scans children left to right:
    /// - a child equal to `x`, or a child one byte shorter than a confident `x`, wins;
    /// - a leaf child one byte longer than a confident `x`, followed by a leaf, gives its last
    ///   byte to the follower and then equals `x`;
    /// - a leaf child ending where `x` starts, followed by a leaf, gives its last byte to the
    ///   follower; if the follower now ends where `x` ends it equals `x`, otherwise the scan
    ///   stops and the later rules see the moved boundary.
    fn absorb_near_duplicate(&mut self, n: NodeId, x: Span) -> bool {
        let children = self[n].children.clone();
        for (i, &c) in children.iter().enumerate() {
            let cs = self[c].span();
            if cs == x {
                return true;
            }
            if cs.l == x.l && cs.r + 1 == x.r && x.len() > CONFIDENT_LENGTH {
                self.record(Diagnostic::NearDuplicateDiscarded {
                    existing: cs,
                    candidate: x,
                });
                return true;
            }
            if !self[c].is_leaf() || cs.r <= cs.l {
                continue;
            }
            let next = match children.get(i + 1) {
                Some(&s) if self[s].is_leaf() => s,
                _ => continue,
            };
            if cs.l == x.l && cs.r == x.r + 1 && x.len() > CONFIDENT_LENGTH {
                self.shift_boundary_left(c, next, x);
                return true;
            }
            if cs.r == x.l {
                self.shift_boundary_left(c, next, x);
                if self[next].r == x.r {
                    return true;
                }
                break;
            }
        }
        false
    }

    fn shift_boundary_left(&mut self, left: NodeId, right: NodeId, x: Span) {
        self[left].r -= 1;
        self[right].l -= 1;
        let (left, right) = (self[left].span(), self[right].span());
        self.record(Diagnostic::BoundaryShifted {
            left,
            right,
            candidate: x,
        });
    }

    /// Rule 5. Children `[i..=j]` with `children[i].l == x.l` and `children[j].r == x.r` move
    /// under a new node `x`, which takes their place.
    fn adopt_children_span(&mut self, n: NodeId, x: Span) -> bool {
        let children = self[n].children.clone();
        let Some(i) = children.iter().position(|&c| self[c].l >= x.l) else {
            return false;
        };
        if self[children[i]].l != x.l {
            return false;
        }
        for j in i..children.len() {
            let r = self[children[j]].r;
            if r > x.r {
                break;
            }
            if r != x.r {
                continue;
            }
            if i == j {
                // single child equal to x: nothing to regroup
                return true;
            }
            let group = self.alloc(TreeNode::new(x.l, x.r, Some(n)));
            self.set_children(group, children[i..=j].to_vec());
            let mut rest = children[..i].to_vec();
            rest.push(group);
            rest.extend_from_slice(&children[j + 1..]);
            self.set_children(n, rest);
            return true;
        }
        false
    }

    /// Rule 6.
    fn insert_into_containing_child(&mut self, n: NodeId, x: Span) -> bool {
        let children = self[n].children.clone();
        let Some(i) = children.iter().position(|&c| self[c].contains(x)) else {
            return false;
        };
        let c = children[i];
        let cs = self[c].span();
        if cs == x {
            return true;
        }
        let interior = cs.l < x.l && cs.r > x.r;
        if !self[c].is_leaf() || interior || !self[c].sub_messages.is_empty() {
            self.insert_at(c, x);
            return true;
        }

        // Leaf sharing a bound with x: c keeps the x part, the rest becomes new siblings.
        let mut replaced = Vec::with_capacity(children.len() + 1);
        replaced.extend_from_slice(&children[..i]);
        if cs.l < x.l {
            replaced.push(self.alloc(TreeNode::new(cs.l, x.l - 1, Some(n))));
            self[c].l = x.l;
        }
        replaced.push(c);
        if cs.r > x.r {
            replaced.push(self.alloc(TreeNode::new(x.r + 1, cs.r, Some(n))));
            self[c].r = x.r;
        }
        replaced.extend_from_slice(&children[i + 1..]);
        self.set_children(n, replaced);
        true
    }

    /// Rule 7.
    fn insert_across_children(&mut self, n: NodeId, mut x: Span) {
        let children = self[n].children.clone();
        let mut kept = Vec::with_capacity(children.len() + 1);
        let mut adopted = Vec::new();
        for c in children {
            let cs = self[c].span();
            if cs.r < x.l || cs.l > x.r {
                kept.push(c);
                continue;
            }
            if cs.l < x.l {
                // left overlap
                self.insert_at(c, Span::new(x.l, cs.r));
                kept.push(c);
                x.l = cs.r + 1;
            } else if cs.r > x.r {
                // right overlap; cs.l > 0 because an earlier sibling ends before it
                debug_assert!(cs.l > 0);
                self.insert_at(c, Span::new(cs.l, x.r));
                kept.push(c);
                x.r = cs.l - 1;
            } else {
                adopted.push(c);
            }
        }

        if x.is_empty() {
            kept.extend(adopted);
        } else if let [only] = adopted[..] {
            debug_assert_eq!(self[only].span(), x);
            kept.push(only);
        } else {
            let group = self.alloc(TreeNode::new(x.l, x.r, Some(n)));
            self.set_children(group, adopted);
            kept.push(group);
        }
        self.set_children(n, kept);
    }
}
