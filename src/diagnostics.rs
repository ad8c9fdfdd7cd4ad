use crate::error::GraphError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    ParseError,
    DuplicateSymbol,
    UnresolvedReference,
}

impl DiagnosticKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticKind::ParseError => "parse_error",
            DiagnosticKind::DuplicateSymbol => "duplicate_symbol",
            DiagnosticKind::UnresolvedReference => "unresolved_reference",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            DiagnosticKind::ParseError => Severity::Error,
            DiagnosticKind::DuplicateSymbol => Severity::Warning,
            DiagnosticKind::UnresolvedReference => Severity::Info,
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

/// A recovered problem recorded during a build and attached to the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    /// Converts a recoverable error. Fatal errors have no diagnostic form.
    pub fn from_error(err: &GraphError) -> Option<Self> {
        let kind = err.diagnostic_kind()?;
        let (path, module) = match err {
            GraphError::Parse { path, .. } => (Some(path.clone()), None),
            GraphError::UnresolvedReference { module, .. } => (None, Some(module.clone())),
            _ => (None, None),
        };
        Some(Diagnostic {
            kind,
            severity: kind.severity(),
            path,
            module,
            line: None,
            message: err.to_string(),
        })
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = Some(path.to_string());
        self
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticsSummary {
    pub total: usize,
    pub by_kind: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<String, usize>,
}

pub fn summarize(diagnostics: &[Diagnostic]) -> DiagnosticsSummary {
    let mut summary = DiagnosticsSummary {
        total: diagnostics.len(),
        ..Default::default()
    };
    for diagnostic in diagnostics {
        *summary
            .by_kind
            .entry(diagnostic.kind.as_str().to_string())
            .or_default() += 1;
        *summary
            .by_severity
            .entry(diagnostic.severity.as_str().to_string())
            .or_default() += 1;
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_have_no_diagnostic() {
        let err = GraphError::DanglingEdge {
            from: "a.a".into(),
            to: "a.missing".into(),
        };
        assert!(Diagnostic::from_error(&err).is_none());
    }

    #[test]
    fn summary_groups_by_kind_and_severity() {
        let parse = Diagnostic::from_error(&GraphError::Parse {
            path: "broken.py".into(),
            reason: "syntax error at 2:1".into(),
        })
        .unwrap();
        assert_eq!(parse.path.as_deref(), Some("broken.py"));
        assert_eq!(parse.severity, Severity::Error);

        let unresolved =
            Diagnostic::from_error(&GraphError::unresolved("c", "missing", "not found")).unwrap();
        let summary = summarize(&[parse, unresolved.clone(), unresolved]);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.by_kind.get("unresolved_reference"), Some(&2));
        assert_eq!(summary.by_severity.get("error"), Some(&1));
        assert_eq!(summary.by_severity.get("info"), Some(&2));
    }
}
