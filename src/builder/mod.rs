use crate::config::{BuilderConfig, OrphanPolicy};
use crate::diagnostics::Diagnostic;
use crate::error::GraphError;
use crate::graph::SourceGraph;
use crate::model::{BuildStats, FileTree};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub mod classify;
pub mod orphans;
pub mod outline;
pub mod python;
pub mod registry;
pub mod resolve;
pub mod scan;

use classify::{DefaultClassifier, ModuleClassifier};
use orphans::OrphanAuditor;
use outline::FileOutline;
use python::PythonVisitor;
use registry::SymbolRegistry;
use resolve::CrossModuleResolver;

/// A Python file picked out of the tree, with its derived module name.
struct SourceUnit<'t> {
    rel_path: String,
    module: String,
    text: &'t str,
}

/// Runs the per-file pass and cross-module resolution over a [`FileTree`].
pub struct SourceGraphBuilder {
    config: BuilderConfig,
    classifier: Box<dyn ModuleClassifier>,
}

impl SourceGraphBuilder {
    pub fn new(config: BuilderConfig) -> Self {
        let classifier = Box::new(DefaultClassifier::from_config(&config));
        Self { config, classifier }
    }

    /// Builder configured from `SRCGRAPH_*` environment variables.
    pub fn from_env() -> Self {
        Self::new(BuilderConfig::get().clone())
    }

    pub fn with_classifier(mut self, classifier: impl ModuleClassifier + 'static) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Resolves the tree and audits orphans with the configured policy.
    pub fn build(&self, tree: &FileTree) -> Result<SourceGraph, GraphError> {
        self.resolve(tree)?.audit(self.config.orphan_policy)
    }

    /// Runs both phases but leaves orphans untouched, so the result can be
    /// audited under any policy without rebuilding.
    pub fn resolve(&self, tree: &FileTree) -> Result<ResolvedGraph, GraphError> {
        let started = Instant::now();
        let files = tree.files();
        let mut stats = BuildStats {
            files_seen: files.len(),
            ..Default::default()
        };

        let mut units = Vec::new();
        for (rel_path, file) in &files {
            if scan::is_python_path(Path::new(rel_path)) {
                units.push(SourceUnit {
                    module: crate::util::module_name_from_rel_path(rel_path),
                    rel_path: rel_path.clone(),
                    text: &file.raw_text,
                });
            } else {
                stats.files_ignored += 1;
            }
        }
        info!(
            files = units.len(),
            ignored = stats.files_ignored,
            parallel = self.config.parallel,
            "visiting python files"
        );

        let results = self.visit_units(&units);

        let mut graph = SourceGraph::new();
        let mut registry = SymbolRegistry::new();
        let mut owners: BTreeMap<String, String> = BTreeMap::new();
        let mut outlines: Vec<FileOutline> = Vec::with_capacity(units.len());
        for (unit, result) in units.iter().zip(results) {
            let mut outline = match result {
                Ok(outline) => outline,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!("skipping {}: {err}", unit.rel_path);
                    record(&mut graph, &err, Some(unit.rel_path.as_str()));
                    stats.files_skipped += 1;
                    continue;
                }
            };
            if let Some(kept) = owners.get(&outline.module) {
                let err = GraphError::DuplicateSymbol {
                    qualname: outline.module.clone(),
                    kept: kept.clone(),
                    rejected: unit.rel_path.clone(),
                };
                warn!("skipping {}: {err}", unit.rel_path);
                record(&mut graph, &err, Some(unit.rel_path.as_str()));
                stats.files_skipped += 1;
                continue;
            }
            owners.insert(outline.module.clone(), unit.rel_path.clone());

            let placement = graph.add_subtree(&outline.nodes);
            for err in &placement.errors {
                warn!("{}: {err}", unit.rel_path);
                record(&mut graph, err, Some(unit.rel_path.as_str()));
            }
            outline.forget(&placement.rejected);
            for err in registry.register_outline(&outline) {
                record(&mut graph, &err, Some(unit.rel_path.as_str()));
            }
            debug!(
                path = %unit.rel_path,
                module = %outline.module,
                nodes = outline.nodes.len(),
                calls = outline.call_sites.len(),
                "registered outline"
            );
            stats.files_parsed += 1;
            outlines.push(outline);
        }
        stats.modules = outlines.len();

        let resolved = CrossModuleResolver::new(&mut registry, self.classifier.as_ref(), &mut graph)
            .run(&outlines);
        stats.calls_resolved = resolved.calls_resolved;
        stats.calls_unresolved = resolved.calls_unresolved;
        graph.set_stats(stats);

        Ok(ResolvedGraph {
            graph,
            elapsed: started.elapsed(),
        })
    }

    fn visit_units(&self, units: &[SourceUnit<'_>]) -> Vec<Result<FileOutline, GraphError>> {
        let max = self.config.const_label_max;
        let visit = |visitor: &mut Result<PythonVisitor, GraphError>, unit: &SourceUnit<'_>| {
            match visitor {
                Ok(visitor) => visitor.visit_file(unit.text, &unit.module, &unit.rel_path),
                Err(err) => Err(err.clone()),
            }
        };
        let new_visitor = || PythonVisitor::new().map(|v| v.with_const_label_max(max));
        if self.config.parallel {
            units
                .par_iter()
                .map_init(new_visitor, |visitor, unit| visit(visitor, unit))
                .collect()
        } else {
            let mut visitor = new_visitor();
            units.iter().map(|unit| visit(&mut visitor, unit)).collect()
        }
    }
}

impl Default for SourceGraphBuilder {
    fn default() -> Self {
        Self::new(BuilderConfig::default())
    }
}

fn record(graph: &mut SourceGraph, err: &GraphError, path: Option<&str>) {
    if let Some(mut diagnostic) = Diagnostic::from_error(err) {
        if let Some(path) = path {
            diagnostic = diagnostic.with_path(path);
        }
        graph.push_diagnostic(diagnostic);
    }
}

/// Output of both phases before the orphan audit.
#[derive(Debug, Clone)]
pub struct ResolvedGraph {
    graph: SourceGraph,
    elapsed: Duration,
}

impl ResolvedGraph {
    /// The resolved graph as is, orphans included and not yet attached.
    pub fn graph(&self) -> &SourceGraph {
        &self.graph
    }

    /// Audits a copy under `policy`; `self` stays reusable.
    pub fn audit(&self, policy: OrphanPolicy) -> Result<SourceGraph, GraphError> {
        let started = Instant::now();
        let mut graph = self.graph.clone();
        let orphans = OrphanAuditor::new(policy).audit(&mut graph)?;

        let mut stats = graph.stats().clone();
        stats.orphans = orphans;
        stats.nodes = graph.node_count();
        stats.edges = graph.edge_count();
        stats.edges_by_kind = graph.edge_counts_by_kind();
        stats.duration_ms = (self.elapsed + started.elapsed()).as_millis() as u64;
        graph.set_stats(stats);
        Ok(graph)
    }
}
