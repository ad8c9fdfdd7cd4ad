use crate::diagnostics::DiagnosticKind;
use thiserror::Error;

/// Everything that can go wrong while turning a file tree into a graph.
///
/// `Parse`, `DuplicateSymbol` and `UnresolvedReference` are recovered inside the
/// run and surface as [`crate::Diagnostic`]s on the finished graph. The remaining
/// variants are fatal and abort the build.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("duplicate symbol {qualname}: kept {kept}, rejected {rejected}")]
    DuplicateSymbol {
        qualname: String,
        kept: String,
        rejected: String,
    },

    #[error("unresolved reference `{reference}` in {module}: {reason}")]
    UnresolvedReference {
        module: String,
        reference: String,
        reason: String,
    },

    #[error("node {node} has no incident edges after the orphan audit")]
    OrphanPolicyViolation { node: String },

    #[error("edge {from} -> {to} references a node that is not in the graph")]
    DanglingEdge { from: String, to: String },

    #[error("python grammar unavailable: {0}")]
    Grammar(String),
}

impl GraphError {
    pub(crate) fn unresolved(
        module: &str,
        reference: &str,
        reason: impl Into<String>,
    ) -> Self {
        GraphError::UnresolvedReference {
            module: module.to_string(),
            reference: reference.to_string(),
            reason: reason.into(),
        }
    }

    /// Fatal errors abort the run instead of becoming diagnostics.
    pub fn is_fatal(&self) -> bool {
        self.diagnostic_kind().is_none()
    }

    pub fn diagnostic_kind(&self) -> Option<DiagnosticKind> {
        match self {
            GraphError::Parse { .. } => Some(DiagnosticKind::ParseError),
            GraphError::DuplicateSymbol { .. } => Some(DiagnosticKind::DuplicateSymbol),
            GraphError::UnresolvedReference { .. } => Some(DiagnosticKind::UnresolvedReference),
            GraphError::OrphanPolicyViolation { .. }
            | GraphError::DanglingEdge { .. }
            | GraphError::Grammar(_) => None,
        }
    }
}

impl From<tree_sitter::LanguageError> for GraphError {
    fn from(err: tree_sitter::LanguageError) -> Self {
        GraphError::Grammar(err.to_string())
    }
}
