pub mod builder;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod graph;
pub mod model;
pub mod util;

pub use builder::classify::{DefaultClassifier, ModuleClassifier};
pub use builder::scan::{ScanOptions, load_file_tree};
pub use builder::{ResolvedGraph, SourceGraphBuilder};
pub use config::{BuilderConfig, OrphanPolicy};
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticsSummary, Severity};
pub use error::GraphError;
pub use graph::{Edge, EdgeKind, ImportOrigin, Node, NodeId, NodeKind, SourceGraph};
pub use model::{BuildStats, FileTree, Folder, SourceFile};
