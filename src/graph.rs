use crate::diagnostics::{self, Diagnostic, DiagnosticsSummary};
use crate::error::GraphError;
use crate::model::BuildStats;
use blake3::Hasher;
use serde::Serialize;
use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Module name of synthetic nodes for stdlib and third-party imports.
pub const EXTERNAL_MODULE: &str = "External";
/// Module name of synthetic nodes for imports nothing could classify.
pub const UNRESOLVED_MODULE: &str = "Unresolved";
/// Module and label of the orphan sentinel.
pub const DETACHED_MODULE: &str = "Detached";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(module: &str, label: &str) -> Self {
        NodeId(format!("{module}.{label}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Module,
    Class,
    Function,
    Argument,
    Call,
    Name,
    Constant,
    Import,
    For,
    JoinedStr,
    FormattedValue,
    External,
    Detached,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Module => "module",
            NodeKind::Class => "class",
            NodeKind::Function => "function",
            NodeKind::Argument => "argument",
            NodeKind::Call => "call",
            NodeKind::Name => "name",
            NodeKind::Constant => "constant",
            NodeKind::Import => "import",
            NodeKind::For => "for",
            NodeKind::JoinedStr => "joined_str",
            NodeKind::FormattedValue => "formatted_value",
            NodeKind::External => "external",
            NodeKind::Detached => "detached",
        }
    }

    /// Roots have no containment parent.
    pub fn is_root(self) -> bool {
        matches!(self, NodeKind::Module | NodeKind::External | NodeKind::Detached)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Containment must stay first: outgoing() seeds its range scan with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Containment,
    Import,
    Inherits,
    Calls,
    Orphan,
}

impl EdgeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeKind::Containment => "containment",
            EdgeKind::Import => "import",
            EdgeKind::Inherits => "inherits",
            EdgeKind::Calls => "calls",
            EdgeKind::Orphan => "orphan",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportOrigin {
    StandardLibrary,
    ThirdParty,
    Unresolved,
}

impl ImportOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            ImportOrigin::StandardLibrary => "standard_library",
            ImportOrigin::ThirdParty => "third_party",
            ImportOrigin::Unresolved => "unresolved",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub label: String,
    pub kind: NodeKind,
    pub module: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<ImportOrigin>,
}

impl Node {
    pub fn new(module: &str, label: &str, kind: NodeKind) -> Self {
        Node {
            id: NodeId::new(module, label),
            label: label.to_string(),
            kind,
            module: module.to_string(),
            parent: None,
            line: None,
            origin: None,
        }
    }

    pub fn with_parent(mut self, parent: NodeId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_origin(mut self, origin: ImportOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn external(module: &str, origin: ImportOrigin) -> Self {
        let namespace = match origin {
            ImportOrigin::Unresolved => UNRESOLVED_MODULE,
            ImportOrigin::StandardLibrary | ImportOrigin::ThirdParty => EXTERNAL_MODULE,
        };
        Node::new(namespace, module, NodeKind::External).with_origin(origin)
    }

    pub fn detached_sentinel() -> Self {
        Node::new(DETACHED_MODULE, DETACHED_MODULE, NodeKind::Detached)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
}

impl Edge {
    pub fn new(source: NodeId, target: NodeId, kind: EdgeKind) -> Self {
        Edge {
            source,
            target,
            kind,
        }
    }
}

/// The unified program graph: typed nodes, a set of typed edges, and the
/// diagnostics and statistics of the run that produced it.
///
/// Read-only outside the crate; the builder and auditor are the only writers.
/// Outcome of [`SourceGraph::add_subtree`].
#[derive(Debug, Default)]
pub(crate) struct Placement {
    /// Every node left out, including descendants of a rejected node.
    pub rejected: BTreeSet<NodeId>,
    pub errors: Vec<GraphError>,
}

#[derive(Debug, Clone, Default)]
pub struct SourceGraph {
    nodes: BTreeMap<NodeId, Node>,
    edges: BTreeSet<Edge>,
    parents: BTreeMap<NodeId, NodeId>,
    diagnostics: Vec<Diagnostic>,
    stats: BuildStats,
}

impl SourceGraph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Inserts a node unless its id is taken; either way returns the id.
    pub(crate) fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id.clone();
        self.nodes.entry(id.clone()).or_insert(node);
        id
    }

    /// Inserts a node together with the containment edge from its parent.
    ///
    /// Re-adding a node under the same parent is a no-op. A different parent
    /// is rejected and the existing placement kept. The parent must already be
    /// in the graph and belong to the same module.
    pub(crate) fn add_contained(&mut self, node: Node) -> Result<NodeId, GraphError> {
        let Some(parent) = node.parent.clone() else {
            return Ok(self.add_node(node));
        };
        let Some(parent_node) = self.nodes.get(&parent) else {
            return Err(GraphError::DanglingEdge {
                from: parent.to_string(),
                to: node.id.to_string(),
            });
        };
        if parent_node.module != node.module {
            return Err(GraphError::DuplicateSymbol {
                qualname: parent.to_string(),
                kept: format!("{} in {}", parent_node.kind, parent_node.module),
                rejected: format!("{} in {}", node.kind, node.module),
            });
        }
        if let Some(existing) = self.parents.get(&node.id) {
            if *existing != parent {
                return Err(GraphError::DuplicateSymbol {
                    qualname: node.id.to_string(),
                    kept: existing.to_string(),
                    rejected: parent.to_string(),
                });
            }
            return Ok(node.id);
        }
        if let Some(existing) = self.nodes.get(&node.id) {
            // Taken by a root.
            return Err(GraphError::DuplicateSymbol {
                qualname: node.id.to_string(),
                kept: format!("{} root", existing.kind),
                rejected: parent.to_string(),
            });
        }
        let id = self.add_node(node);
        self.parents.insert(id.clone(), parent.clone());
        self.edges
            .insert(Edge::new(parent, id.clone(), EdgeKind::Containment));
        Ok(id)
    }

    /// Adds nodes listed parents first. A rejected node takes its whole
    /// subtree with it; only the top of each rejected subtree is reported.
    pub(crate) fn add_subtree<'n>(
        &mut self,
        nodes: impl IntoIterator<Item = &'n Node>,
    ) -> Placement {
        let mut placement = Placement::default();
        for node in nodes {
            if let Some(parent) = &node.parent {
                if placement.rejected.contains(parent) || !self.nodes.contains_key(parent) {
                    placement.rejected.insert(node.id.clone());
                    continue;
                }
            }
            if let Err(err) = self.add_contained(node.clone()) {
                placement.rejected.insert(node.id.clone());
                placement.errors.push(err);
            }
        }
        placement
    }

    /// Adds a resolution edge. Containment goes through `add_contained`.
    pub(crate) fn add_edge(&mut self, source: NodeId, target: NodeId, kind: EdgeKind) -> bool {
        debug_assert!(kind != EdgeKind::Containment);
        self.edges.insert(Edge::new(source, target, kind))
    }

    /// Removes nodes and every edge touching them.
    pub(crate) fn remove_nodes(&mut self, ids: &BTreeSet<NodeId>) {
        if ids.is_empty() {
            return;
        }
        for id in ids {
            self.nodes.remove(id);
            self.parents.remove(id);
        }
        self.parents.retain(|_, parent| !ids.contains(parent));
        self.edges
            .retain(|edge| !ids.contains(&edge.source) && !ids.contains(&edge.target));
    }

    pub(crate) fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub(crate) fn set_stats(&mut self, stats: BuildStats) {
        self.stats = stats;
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn has_edge(&self, source: &str, target: &str, kind: EdgeKind) -> bool {
        self.outgoing(source)
            .any(|edge| edge.target.as_str() == target && edge.kind == kind)
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(move |node| node.kind == kind)
    }

    pub fn edges_of_kind(&self, kind: EdgeKind) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |edge| edge.kind == kind)
    }

    pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        let start = Edge::new(
            NodeId(id.to_string()),
            NodeId(String::new()),
            EdgeKind::Containment,
        );
        self.edges
            .range(start..)
            .take_while(move |edge| edge.source.as_str() == id)
    }

    pub fn incoming<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges
            .iter()
            .filter(move |edge| edge.target.as_str() == id)
    }

    pub fn parent_of(&self, id: &str) -> Option<&Node> {
        self.parents
            .get(id)
            .and_then(|parent| self.nodes.get(parent))
    }

    pub fn children<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.outgoing(id)
            .filter(|edge| edge.kind == EdgeKind::Containment)
            .filter_map(|edge| self.nodes.get(&edge.target))
    }

    pub fn degree(&self, id: &str) -> usize {
        self.outgoing(id).count() + self.incoming(id).count()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn diagnostics_summary(&self) -> DiagnosticsSummary {
        diagnostics::summarize(&self.diagnostics)
    }

    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    pub fn edge_counts_by_kind(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for edge in &self.edges {
            *counts.entry(edge.kind.as_str().to_string()).or_default() += 1;
        }
        counts
    }

    /// Nodes with no incident edge, in id order.
    pub fn edgeless_nodes(&self) -> Vec<NodeId> {
        let mut touched: BTreeSet<&str> = BTreeSet::new();
        for edge in &self.edges {
            touched.insert(edge.source.as_str());
            touched.insert(edge.target.as_str());
        }
        self.nodes
            .keys()
            .filter(|id| !touched.contains(id.as_str()))
            .cloned()
            .collect()
    }

    /// Content hash over nodes, edges and diagnostics. Timing is excluded, so
    /// two builds of the same tree produce the same value.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Hasher::new();
        for node in self.nodes.values() {
            hasher.update(node.id.as_str().as_bytes());
            hasher.update(b"\x00");
            hasher.update(node.kind.as_str().as_bytes());
            hasher.update(b"\x00");
            if let Some(parent) = &node.parent {
                hasher.update(parent.as_str().as_bytes());
            }
            hasher.update(b"\x00");
            if let Some(line) = node.line {
                hasher.update(&(line as u64).to_le_bytes());
            }
            hasher.update(b"\x00");
            if let Some(origin) = node.origin {
                hasher.update(origin.as_str().as_bytes());
            }
            hasher.update(b"\x01");
        }
        for edge in &self.edges {
            hasher.update(edge.source.as_str().as_bytes());
            hasher.update(b"\x00");
            hasher.update(edge.target.as_str().as_bytes());
            hasher.update(b"\x00");
            hasher.update(edge.kind.as_str().as_bytes());
            hasher.update(b"\x01");
        }
        for diagnostic in &self.diagnostics {
            hasher.update(diagnostic.kind.as_str().as_bytes());
            hasher.update(b"\x00");
            hasher.update(diagnostic.message.as_bytes());
            hasher.update(b"\x01");
        }
        let hash = hasher.finalize();
        format!("graph_{}", &hash.to_hex()[..16])
    }

    /// Every edge endpoint exists and no node is edgeless.
    pub fn check_invariants(&self) -> Result<(), GraphError> {
        for edge in &self.edges {
            if !self.nodes.contains_key(&edge.source) || !self.nodes.contains_key(&edge.target) {
                return Err(GraphError::DanglingEdge {
                    from: edge.source.to_string(),
                    to: edge.target.to_string(),
                });
            }
        }
        if let Some(node) = self.edgeless_nodes().into_iter().next() {
            return Err(GraphError::OrphanPolicyViolation {
                node: node.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(name: &str) -> Node {
        Node::new(name, name, NodeKind::Module)
    }

    #[test]
    fn node_ids_join_module_and_label() {
        let node = Node::new("pkg.mod", "Base.greet", NodeKind::Function);
        assert_eq!(node.id.as_str(), "pkg.mod.Base.greet");
        assert_eq!(module("a").id.as_str(), "a.a");
        assert_eq!(Node::detached_sentinel().id.as_str(), "Detached.Detached");
        assert_eq!(
            Node::external("os", ImportOrigin::StandardLibrary).id.as_str(),
            "External.os"
        );
        assert_eq!(
            Node::external("ghost", ImportOrigin::Unresolved).id.as_str(),
            "Unresolved.ghost"
        );
    }

    #[test]
    fn add_node_is_idempotent() {
        let mut graph = SourceGraph::new();
        let first = graph.add_node(module("a"));
        let second = graph.add_node(module("a").with_line(7));
        assert_eq!(first, second);
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.node("a.a").and_then(|n| n.line), None);
    }

    #[test]
    fn second_parent_is_rejected() {
        let mut graph = SourceGraph::new();
        let root = graph.add_node(module("a"));
        let class = graph
            .add_contained(Node::new("a", "Base", NodeKind::Class).with_parent(root.clone()))
            .unwrap();
        let func = Node::new("a", "Base.greet", NodeKind::Function);
        graph
            .add_contained(func.clone().with_parent(class.clone()))
            .unwrap();
        graph
            .add_contained(func.clone().with_parent(class.clone()))
            .unwrap();

        let err = graph.add_contained(func.with_parent(root)).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateSymbol { .. }));
        assert_eq!(graph.parent_of("a.Base.greet").map(|n| n.id.clone()), Some(class));
        assert_eq!(graph.edges_of_kind(EdgeKind::Containment).count(), 2);
    }

    #[test]
    fn containment_never_crosses_modules() {
        let mut graph = SourceGraph::new();
        let pkg = graph.add_node(module("pkg"));
        let sub = graph.add_node(module("pkg.sub"));
        graph
            .add_contained(Node::new("pkg", "sub", NodeKind::Class).with_parent(pkg))
            .unwrap();
        graph
            .add_contained(
                Node::new("pkg", "sub.run", NodeKind::Function).with_parent(NodeId::new("pkg", "sub")),
            )
            .unwrap();

        let run = Node::new("pkg.sub", "run", NodeKind::Function).with_parent(sub);
        let arg = Node::new("pkg.sub", "run.x", NodeKind::Argument).with_parent(run.id.clone());
        let name = Node::new("pkg.sub", "run.name(x)", NodeKind::Name).with_parent(run.id.clone());
        let placement = graph.add_subtree([&run, &arg, &name]);

        assert_eq!(placement.errors.len(), 1);
        assert_eq!(placement.rejected.len(), 3);
        assert!(!graph.contains("pkg.sub.run.x"));
        for edge in graph.edges_of_kind(EdgeKind::Containment) {
            let source = graph.node(edge.source.as_str()).unwrap();
            let target = graph.node(edge.target.as_str()).unwrap();
            assert_eq!(source.module, target.module, "{} -> {}", edge.source, edge.target);
        }

        let stray = Node::new("pkg.sub", "run.y", NodeKind::Argument)
            .with_parent(NodeId::new("pkg", "sub.run"));
        assert!(matches!(
            graph.add_contained(stray),
            Err(GraphError::DuplicateSymbol { .. })
        ));
    }

    #[test]
    fn contained_node_needs_its_parent() {
        let mut graph = SourceGraph::new();
        let orphan = Node::new("a", "f.x", NodeKind::Argument).with_parent(NodeId::new("a", "f"));
        assert!(matches!(
            graph.add_contained(orphan),
            Err(GraphError::DanglingEdge { .. })
        ));
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn outgoing_only_yields_edges_of_that_source() {
        let mut graph = SourceGraph::new();
        let a = graph.add_node(module("a"));
        let ab = graph.add_node(module("ab"));
        let b = graph.add_node(module("b"));
        graph.add_edge(a.clone(), b.clone(), EdgeKind::Import);
        graph.add_edge(ab.clone(), b.clone(), EdgeKind::Import);

        let targets: Vec<_> = graph.outgoing("a.a").map(|e| e.target.as_str()).collect();
        assert_eq!(targets, vec!["b.b"]);
        assert_eq!(graph.incoming("b.b").count(), 2);
        assert_eq!(graph.degree("b.b"), 2);
        assert!(graph.has_edge("ab.ab", "b.b", EdgeKind::Import));
    }

    #[test]
    fn invariants_catch_edgeless_and_dangling() {
        let mut graph = SourceGraph::new();
        let a = graph.add_node(module("a"));
        assert!(matches!(
            graph.check_invariants(),
            Err(GraphError::OrphanPolicyViolation { .. })
        ));

        graph.add_edge(a, NodeId::new("b", "b"), EdgeKind::Import);
        assert!(matches!(
            graph.check_invariants(),
            Err(GraphError::DanglingEdge { .. })
        ));
    }

    #[test]
    fn remove_nodes_drops_incident_edges() {
        let mut graph = SourceGraph::new();
        let a = graph.add_node(module("a"));
        let b = graph.add_node(module("b"));
        graph.add_edge(a.clone(), b.clone(), EdgeKind::Import);
        graph.remove_nodes(&BTreeSet::from([b]));
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.edgeless_nodes(), vec![a]);
    }

    #[test]
    fn fingerprint_ignores_stats() {
        let mut graph = SourceGraph::new();
        graph.add_node(module("a"));
        let before = graph.fingerprint();
        graph.set_stats(BuildStats {
            duration_ms: 42,
            ..Default::default()
        });
        assert_eq!(before, graph.fingerprint());
        assert!(before.starts_with("graph_"));
    }
}
