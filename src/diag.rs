//! Recoverable findings raised while inserting candidate fields.
//!
//! Every diagnostic is kept on the tree (see [`MsgTree::diagnostics`](crate::tree::MsgTree::diagnostics))
//! and mirrored to `tracing` at warn level when recorded.

use crate::node::Span;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Candidate is its container shrunk by one byte on the right; dropped as noise.
    OffByOneIgnored { container: Span, candidate: Span },
    /// Candidate is an existing child grown by one byte on the right; the child wins.
    NearDuplicateDiscarded { existing: Span, candidate: Span },
    /// The boundary between two leaf siblings moved one byte left to fit the candidate.
    BoundaryShifted { left: Span, right: Span, candidate: Span },
}

impl Diagnostic {
    pub fn candidate(&self) -> Span {
        match self {
            Diagnostic::OffByOneIgnored { candidate, .. }
            | Diagnostic::NearDuplicateDiscarded { candidate, .. }
            | Diagnostic::BoundaryShifted { candidate, .. } => *candidate,
        }
    }

    pub(crate) fn emit(&self) {
        tracing::warn!(candidate = %self.candidate(), "{}", self);
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::OffByOneIgnored { container, candidate } => {
                write!(f, "ignoring -1 tree node {} inside {}", candidate, container)
            }
            Diagnostic::NearDuplicateDiscarded { existing, candidate } => {
                write!(f, "discarding {} in favour of existing {}", candidate, existing)
            }
            Diagnostic::BoundaryShifted { left, right, candidate } => write!(
                f,
                "shifted boundary to {} {} for candidate {}",
                left, right, candidate
            ),
        }
    }
}
