use crate::builder::classify::ModuleClassifier;
use crate::builder::outline::{CallSite, CallTarget, FileOutline};
use crate::builder::registry::{ImportBinding, SymbolRegistry};
use crate::diagnostics::Diagnostic;
use crate::error::GraphError;
use crate::graph::{EdgeKind, ImportOrigin, Node, NodeId, SourceGraph};
use std::collections::{BTreeMap, BTreeSet};
use std::iter;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Resolved {
    Class { qualname: String, id: NodeId },
    Function(NodeId),
    Module { name: String, id: NodeId },
    /// Inside a project module, but not a declared class or function.
    ProjectMember { module: String },
    External { module: String, origin: ImportOrigin },
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum MethodSlot {
    Own(NodeId),
    Inherited(NodeId),
    Ambiguous,
}

type MethodTable = BTreeMap<String, MethodSlot>;

enum CallOutcome {
    Resolved(NodeId),
    Unresolved(Option<GraphError>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStats {
    pub imports_linked: usize,
    pub bases_linked: usize,
    pub calls_resolved: usize,
    pub calls_unresolved: usize,
}

struct ImportLink {
    module: String,
    target: String,
    import_module: String,
    line: Option<usize>,
}

/// Whole-corpus pass: import linking, inheritance linking with method merge,
/// then call resolution. Only adds edges, inherited registry entries and
/// External/Call nodes.
pub struct CrossModuleResolver<'a> {
    registry: &'a mut SymbolRegistry,
    classifier: &'a dyn ModuleClassifier,
    graph: &'a mut SourceGraph,
    paths: BTreeMap<String, String>,
    /// Classes with a base outside the corpus; missing methods there are expected.
    open_classes: BTreeSet<String>,
    stats: ResolveStats,
}

impl<'a> CrossModuleResolver<'a> {
    pub fn new(
        registry: &'a mut SymbolRegistry,
        classifier: &'a dyn ModuleClassifier,
        graph: &'a mut SourceGraph,
    ) -> Self {
        Self {
            registry,
            classifier,
            graph,
            paths: BTreeMap::new(),
            open_classes: BTreeSet::new(),
            stats: ResolveStats::default(),
        }
    }

    pub fn run(mut self, outlines: &[FileOutline]) -> ResolveStats {
        self.paths = outlines
            .iter()
            .map(|outline| (outline.module.clone(), outline.rel_path.clone()))
            .collect();

        self.link_imports();
        let bases = self.link_inheritance(outlines);
        self.merge_inherited_methods(&bases);
        for outline in outlines {
            self.resolve_calls(outline);
        }

        info!(
            imports = self.stats.imports_linked,
            bases = self.stats.bases_linked,
            calls_resolved = self.stats.calls_resolved,
            calls_unresolved = self.stats.calls_unresolved,
            "cross-module resolution finished"
        );
        self.stats
    }

    fn report(&mut self, err: GraphError, module: &str, line: Option<usize>) {
        debug!("{err}");
        let Some(mut diagnostic) = Diagnostic::from_error(&err) else {
            return;
        };
        if let Some(path) = self.paths.get(module) {
            diagnostic = diagnostic.with_path(path);
        }
        if let Some(line) = line {
            diagnostic = diagnostic.with_line(line);
        }
        self.graph.push_diagnostic(diagnostic);
    }

    /// Self-edges are kept only for calls, where they mean recursion.
    fn link(&mut self, source: &NodeId, target: NodeId, kind: EdgeKind) -> bool {
        if *source == target && kind != EdgeKind::Calls {
            return false;
        }
        self.graph.add_edge(source.clone(), target, kind)
    }

    fn external_node(&mut self, module: &str, origin: ImportOrigin) -> NodeId {
        self.graph.add_node(Node::external(module, origin))
    }

    // ---- lookups ----

    /// Resolves a fully dotted path against the project, falling back to the
    /// classifier for `import_module`.
    fn lookup_qualified(&self, full: &str, import_module: &str) -> Resolved {
        if let Some(id) = self.registry.class(full) {
            return Resolved::Class {
                qualname: full.to_string(),
                id: id.clone(),
            };
        }
        if let Some(id) = self.registry.module(full) {
            return Resolved::Module {
                name: full.to_string(),
                id: id.clone(),
            };
        }
        if let Some((owner, name)) = full.rsplit_once('.') {
            if let Some(id) = self.registry.function(owner, name) {
                return Resolved::Function(id.clone());
            }
        }
        if let Some((module, _)) = self.registry.module_prefix(full) {
            return Resolved::ProjectMember {
                module: module.to_string(),
            };
        }
        let top_level = import_module.split('.').next().unwrap_or_default();
        Resolved::External {
            module: import_module.to_string(),
            origin: self.classifier.classify(top_level),
        }
    }

    /// Import binding whose alias is the longest dotted prefix of `dotted`.
    fn binding_for(&self, module: &str, dotted: &str) -> Option<(&str, &ImportBinding)> {
        let bindings = self.registry.imports_for(module)?;
        let mut candidate = dotted;
        loop {
            if let Some((alias, binding)) = bindings.get_key_value(candidate) {
                return Some((alias.as_str(), binding));
            }
            let (head, _) = candidate.rsplit_once('.')?;
            candidate = head;
        }
    }

    /// Resolves a name as written in `module`: imports, then local
    /// declarations, then wildcard imports.
    fn resolve_reference(&self, module: &str, dotted: &str) -> Resolved {
        if let Some((alias, binding)) = self.binding_for(module, dotted) {
            let full = format!("{}{}", binding.target, &dotted[alias.len()..]);
            return self.lookup_qualified(&full, &binding.module);
        }
        if let Some(found) = self.resolve_local(module, dotted) {
            return found;
        }
        for wildcard in self.registry.wildcards_for(module) {
            let found = self.lookup_qualified(&format!("{wildcard}.{dotted}"), wildcard);
            if matches!(
                found,
                Resolved::Class { .. } | Resolved::Function(_) | Resolved::Module { .. }
            ) {
                return found;
            }
        }
        Resolved::Unknown
    }

    fn resolve_local(&self, module: &str, dotted: &str) -> Option<Resolved> {
        let local = format!("{module}.{dotted}");
        if let Some(id) = self.registry.class(&local) {
            return Some(Resolved::Class {
                qualname: local,
                id: id.clone(),
            });
        }
        if !dotted.contains('.') {
            if let Some(id) = self.registry.function(module, dotted) {
                return Some(Resolved::Function(id.clone()));
            }
        }
        None
    }

    // ---- pass 1: imports ----

    fn link_imports(&mut self) {
        let mut links = Vec::new();
        for (module, bindings) in self.registry.imports() {
            for binding in bindings.values() {
                links.push(ImportLink {
                    module: module.to_string(),
                    target: binding.target.clone(),
                    import_module: binding.module.clone(),
                    line: Some(binding.line),
                });
            }
        }
        for (module, targets) in self.registry.wildcards() {
            for target in targets {
                links.push(ImportLink {
                    module: module.to_string(),
                    target: target.clone(),
                    import_module: target.clone(),
                    line: None,
                });
            }
        }

        for link in links {
            let Some(source) = self.registry.module(&link.module).cloned() else {
                continue;
            };
            let target = match self.lookup_qualified(&link.target, &link.import_module) {
                Resolved::Class { id, .. }
                | Resolved::Function(id)
                | Resolved::Module { id, .. } => Some(id),
                Resolved::ProjectMember { module } => self.registry.module(&module).cloned(),
                Resolved::External {
                    module,
                    origin: ImportOrigin::Unresolved,
                } => {
                    self.external_node(&module, ImportOrigin::Unresolved);
                    let err = GraphError::unresolved(
                        &link.module,
                        &link.target,
                        "import is not in the project, the standard library or the third-party list",
                    );
                    self.report(err, &link.module, link.line);
                    None
                }
                Resolved::External { module, origin } => Some(self.external_node(&module, origin)),
                Resolved::Unknown => None,
            };
            if let Some(target) = target {
                if self.link(&source, target, EdgeKind::Import) {
                    self.stats.imports_linked += 1;
                }
            }
        }
    }

    // ---- pass 2: inheritance ----

    /// Adds Inherits edges and returns each class's project bases in
    /// declaration order.
    fn link_inheritance(&mut self, outlines: &[FileOutline]) -> BTreeMap<String, Vec<String>> {
        let mut hierarchy: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for outline in outlines {
            let module = outline.module.as_str();
            for class in &outline.classes {
                if self.registry.class(&class.qualname) != Some(&class.id) {
                    continue;
                }
                let mut project_bases = Vec::new();
                for base in &class.bases {
                    let resolved = self.resolve_reference(module, base);
                    let reason = match resolved {
                        Resolved::Class { qualname, id } => {
                            if self.link(&class.id, id, EdgeKind::Inherits) {
                                self.stats.bases_linked += 1;
                            }
                            project_bases.push(qualname);
                            continue;
                        }
                        Resolved::External {
                            module: external,
                            origin: ImportOrigin::Unresolved,
                        } => {
                            self.external_node(&external, ImportOrigin::Unresolved);
                            self.open_classes.insert(class.qualname.clone());
                            "base class comes from an unresolved import"
                        }
                        Resolved::External {
                            module: external,
                            origin,
                        } => {
                            let target = self.external_node(&external, origin);
                            if self.link(&class.id, target, EdgeKind::Inherits) {
                                self.stats.bases_linked += 1;
                            }
                            self.open_classes.insert(class.qualname.clone());
                            continue;
                        }
                        Resolved::Unknown if self.classifier.is_builtin(base) => {
                            if base != "object" {
                                self.open_classes.insert(class.qualname.clone());
                            }
                            continue;
                        }
                        Resolved::Unknown => {
                            self.open_classes.insert(class.qualname.clone());
                            "base class not found"
                        }
                        Resolved::Function(_)
                        | Resolved::Module { .. }
                        | Resolved::ProjectMember { .. } => {
                            self.open_classes.insert(class.qualname.clone());
                            "base does not name a class"
                        }
                    };
                    let err = GraphError::unresolved(module, base, reason);
                    self.report(err, module, Some(class.line));
                }
                hierarchy.insert(class.qualname.clone(), project_bases);
            }
        }

        let mut changed = true;
        while changed {
            changed = false;
            for (class, bases) in &hierarchy {
                if !self.open_classes.contains(class)
                    && bases.iter().any(|base| self.open_classes.contains(base))
                {
                    self.open_classes.insert(class.clone());
                    changed = true;
                }
            }
        }
        hierarchy
    }

    fn merge_inherited_methods(&mut self, hierarchy: &BTreeMap<String, Vec<String>>) {
        let mut memo: BTreeMap<String, MethodTable> = BTreeMap::new();
        for class in hierarchy.keys() {
            let mut visiting = BTreeSet::new();
            method_table(&*self.registry, class, hierarchy, &mut memo, &mut visiting);
        }

        let mut merged = 0usize;
        for (class, table) in &memo {
            for (name, slot) in table {
                match slot {
                    MethodSlot::Own(_) => {}
                    MethodSlot::Inherited(id) => {
                        if self.registry.merge_inherited(class, name, id.clone()) {
                            merged += 1;
                        }
                    }
                    MethodSlot::Ambiguous => self.registry.mark_ambiguous(class, name),
                }
            }
        }
        debug!(classes = memo.len(), merged, "merged inherited methods");
    }

    // ---- pass 3: calls ----

    fn resolve_calls(&mut self, outline: &FileOutline) {
        let module = outline.module.as_str();
        let mut materialized = vec![false; outline.call_sites.len()];
        for (index, site) in outline.call_sites.iter().enumerate() {
            match self.resolve_call(module, site) {
                CallOutcome::Resolved(target) => {
                    self.link(&site.scope, target, EdgeKind::Calls);
                    self.stats.calls_resolved += 1;
                }
                CallOutcome::Unresolved(problem) => {
                    self.stats.calls_unresolved += 1;
                    // Argument subtrees of a resolved call are not kept.
                    let parent_kept = site.enclosing.is_none_or(|parent| materialized[parent]);
                    if parent_kept {
                        let placement = self
                            .graph
                            .add_subtree(iter::once(&site.fallback).chain(&site.fragment));
                        for err in placement.errors {
                            self.report(err, module, Some(site.line));
                        }
                        materialized[index] = !placement.rejected.contains(&site.fallback.id);
                    }
                    if let Some(err) = problem {
                        self.report(err, module, Some(site.line));
                    }
                }
            }
        }
    }

    fn resolve_call(&self, module: &str, site: &CallSite) -> CallOutcome {
        match &site.target {
            CallTarget::Opaque => CallOutcome::Unresolved(None),
            CallTarget::Attribute { object, method } => {
                let reference = format!("{object}.{method}");
                if object == "self" || object == "cls" {
                    return match &site.class_scope {
                        Some(class) => self.method_call(module, class, method, &reference),
                        None => CallOutcome::Unresolved(None),
                    };
                }
                match self.resolve_reference(module, object) {
                    Resolved::Class { qualname, .. } => {
                        self.method_call(module, &qualname, method, &reference)
                    }
                    Resolved::Module { name, .. } => {
                        self.module_call(module, &name, method, &reference)
                    }
                    _ => CallOutcome::Unresolved(None),
                }
            }
            CallTarget::Name(name) => {
                for owner in &site.owners {
                    if let Some(id) = self.registry.function(owner, name) {
                        return CallOutcome::Resolved(id.clone());
                    }
                }
                let found = match self.resolve_local(module, name) {
                    Some(found) => found,
                    None => self.resolve_reference(module, name),
                };
                match found {
                    Resolved::Class { id, .. } | Resolved::Function(id) => {
                        CallOutcome::Resolved(id)
                    }
                    _ => CallOutcome::Unresolved(None),
                }
            }
        }
    }

    fn method_call(&self, module: &str, class: &str, method: &str, reference: &str) -> CallOutcome {
        if self.registry.is_ambiguous(class, method) {
            return CallOutcome::Unresolved(Some(GraphError::unresolved(
                module,
                reference,
                format!("`{method}` is inherited from several bases of {class}"),
            )));
        }
        if let Some(id) = self.registry.function(class, method) {
            return CallOutcome::Resolved(id.clone());
        }
        if let Some(id) = self.registry.class(&format!("{class}.{method}")) {
            return CallOutcome::Resolved(id.clone());
        }
        if self.open_classes.contains(class) {
            return CallOutcome::Unresolved(None);
        }
        CallOutcome::Unresolved(Some(GraphError::unresolved(
            module,
            reference,
            format!("class {class} has no method `{method}`"),
        )))
    }

    fn module_call(&self, module: &str, target: &str, member: &str, reference: &str) -> CallOutcome {
        if let Some(id) = self.registry.function(target, member) {
            return CallOutcome::Resolved(id.clone());
        }
        if let Some(id) = self.registry.class(&format!("{target}.{member}")) {
            return CallOutcome::Resolved(id.clone());
        }
        CallOutcome::Unresolved(Some(GraphError::unresolved(
            module,
            reference,
            format!("module {target} has no function or class `{member}`"),
        )))
    }
}

/// Own methods plus everything reachable through project bases. Own methods
/// win; the same name from different bases with different targets is
/// ambiguous. A class seen again while its table is being built contributes
/// only its own methods.
fn method_table(
    registry: &SymbolRegistry,
    class: &str,
    hierarchy: &BTreeMap<String, Vec<String>>,
    memo: &mut BTreeMap<String, MethodTable>,
    visiting: &mut BTreeSet<String>,
) -> MethodTable {
    if let Some(table) = memo.get(class) {
        return table.clone();
    }
    let mut table: MethodTable = registry
        .functions_of(class)
        .map(|(name, id)| (name.to_string(), MethodSlot::Own(id.clone())))
        .collect();
    if !visiting.insert(class.to_string()) {
        return table;
    }
    for base in hierarchy.get(class).into_iter().flatten() {
        for (name, slot) in method_table(registry, base, hierarchy, memo, visiting) {
            let incoming = match slot {
                MethodSlot::Own(id) | MethodSlot::Inherited(id) => MethodSlot::Inherited(id),
                MethodSlot::Ambiguous => MethodSlot::Ambiguous,
            };
            let merged = match table.get(&name) {
                None => Some(incoming),
                Some(MethodSlot::Own(_)) => None,
                Some(existing) if *existing == incoming => None,
                Some(_) => Some(MethodSlot::Ambiguous),
            };
            if let Some(slot) = merged {
                table.insert(name, slot);
            }
        }
    }
    visiting.remove(class);
    memo.insert(class.to_string(), table.clone());
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::classify::DefaultClassifier;
    use crate::builder::python::PythonVisitor;
    use crate::graph::NodeKind;
    use crate::util;

    fn resolve(files: &[(&str, &str)]) -> (SourceGraph, ResolveStats) {
        let mut visitor = PythonVisitor::new().unwrap();
        let outlines: Vec<FileOutline> = files
            .iter()
            .map(|(path, source)| {
                let module = util::module_name_from_rel_path(path);
                visitor.visit_file(source, &module, path).unwrap()
            })
            .collect();
        let mut graph = SourceGraph::new();
        let mut registry = SymbolRegistry::new();
        for outline in &outlines {
            for node in &outline.nodes {
                graph.add_contained(node.clone()).unwrap();
            }
            assert!(registry.register_outline(outline).is_empty());
        }
        let classifier = DefaultClassifier::new(vec!["requests".into()], false);
        let stats = CrossModuleResolver::new(&mut registry, &classifier, &mut graph).run(&outlines);
        (graph, stats)
    }

    #[test]
    fn diamond_inheritance_is_not_ambiguous() {
        let (graph, _) = resolve(&[(
            "m.py",
            r#"
class A:
    def f(self): pass
class B(A): pass
class C(A): pass
class D(B, C):
    def g(self):
        self.f()
"#,
        )]);
        assert!(graph.has_edge("m.D.g", "m.A.f", EdgeKind::Calls));
        assert!(graph.diagnostics().is_empty());
    }

    #[test]
    fn conflicting_bases_make_method_ambiguous() {
        let (graph, stats) = resolve(&[(
            "m.py",
            r#"
class A:
    def f(self): pass
class B:
    def f(self): pass
class C(A, B):
    def g(self):
        self.f()
"#,
        )]);
        assert_eq!(stats.calls_unresolved, 1);
        assert!(graph.contains("m.C.g.call(self.f)"));
        assert_eq!(graph.diagnostics().len(), 1);
        assert!(graph.diagnostics()[0].message.contains("several bases"));
    }

    #[test]
    fn inheritance_cycles_terminate() {
        let (graph, _) = resolve(&[(
            "m.py",
            "class A(B):\n    def f(self): pass\nclass B(A):\n    def g(self):\n        self.f()\n",
        )]);
        assert!(graph.has_edge("m.A", "m.B", EdgeKind::Inherits));
        assert!(graph.has_edge("m.B", "m.A", EdgeKind::Inherits));
        assert!(graph.has_edge("m.B.g", "m.A.f", EdgeKind::Calls));
    }

    #[test]
    fn module_attribute_calls_and_nested_functions() {
        let (graph, stats) = resolve(&[
            ("pkg/__init__.py", ""),
            ("pkg/tools.py", "def run(x):\n    return x\nclass Job:\n    pass\n"),
            (
                "main.py",
                r#"
import pkg.tools as t
from pkg import tools

def outer():
    def inner():
        pass
    inner()
    t.run(1)
    tools.Job()
    tools.missing()
"#,
            ),
        ]);
        assert!(graph.has_edge("main.outer", "main.outer.inner", EdgeKind::Calls));
        assert!(graph.has_edge("main.outer", "pkg.tools.run", EdgeKind::Calls));
        assert!(graph.has_edge("main.outer", "pkg.tools.Job", EdgeKind::Calls));
        assert!(graph.has_edge("main.main", "pkg.tools.pkg.tools", EdgeKind::Import));
        assert_eq!(stats.calls_resolved, 3);
        assert!(graph.contains("main.outer.call(tools.missing)"));
        let messages: Vec<&str> = graph
            .diagnostics()
            .iter()
            .map(|d| d.message.as_str())
            .collect();
        assert_eq!(
            messages,
            vec!["unresolved reference `tools.missing` in main: module pkg.tools has no function or class `missing`"]
        );
    }

    #[test]
    fn resolved_call_drops_unresolved_arguments() {
        let (graph, stats) = resolve(&[(
            "m.py",
            "def f(x):\n    pass\ndef g():\n    f(print(1))\n",
        )]);
        assert!(graph.has_edge("m.g", "m.f", EdgeKind::Calls));
        assert_eq!(stats.calls_resolved, 1);
        assert_eq!(stats.calls_unresolved, 1);
        assert_eq!(graph.nodes_of_kind(NodeKind::Call).count(), 0);
    }

    #[test]
    fn calls_nested_in_resolved_arguments_still_resolve() {
        let (graph, stats) = resolve(&[(
            "m.py",
            r#"
def load():
    return 1

def save(value):
    pass

def main():
    save(load())
    print(save(load()))
"#,
        )]);
        assert!(graph.has_edge("m.main", "m.save", EdgeKind::Calls));
        assert!(graph.has_edge("m.main", "m.load", EdgeKind::Calls));
        assert!(graph.incoming("m.load").any(|edge| edge.kind == EdgeKind::Calls));
        assert!(graph.contains("m.main.call(print)"));
        assert_eq!(stats.calls_resolved, 4);
        assert_eq!(stats.calls_unresolved, 1);
    }

    #[test]
    fn recursion_keeps_its_self_call() {
        let (graph, _) = resolve(&[("m.py", "def walk(n):\n    walk(n - 1)\n")]);
        assert!(graph.has_edge("m.walk", "m.walk", EdgeKind::Calls));
    }

    #[test]
    fn unresolved_call_keeps_argument_subtree() {
        let (graph, _) = resolve(&[("m.py", "def g(items):\n    print(len(items))\n")]);
        assert!(graph.contains("m.g.call(print)"));
        assert!(graph.contains("m.g.call(print).call(len)"));
        assert!(graph.contains("m.g.call(print).call(len).name(items)"));
        assert!(graph.diagnostics().is_empty());
    }

    #[test]
    fn imports_classify_outside_modules() {
        let (graph, _) = resolve(&[(
            "c.py",
            "import os\nimport requests\nimport numpy\nfrom ..up import thing\n",
        )]);
        let os = graph.node("External.os").unwrap();
        assert_eq!(os.origin, Some(ImportOrigin::StandardLibrary));
        assert!(graph.has_edge("c.c", "External.os", EdgeKind::Import));
        assert!(graph.has_edge("c.c", "External.requests", EdgeKind::Import));
        let numpy = graph.node("Unresolved.numpy").unwrap();
        assert_eq!(numpy.kind, NodeKind::External);
        assert_eq!(graph.degree("Unresolved.numpy"), 0);
        assert!(graph.contains("Unresolved...up"));
        assert_eq!(graph.diagnostics().len(), 2);
    }

    #[test]
    fn missing_self_method_only_reported_for_closed_hierarchies() {
        let (graph, _) = resolve(&[(
            "m.py",
            r#"
import threading
class Worker(threading.Thread):
    def go(self):
        self.start()
class Plain:
    def go(self):
        self.nothing()
"#,
        )]);
        assert!(graph.has_edge("m.Worker", "External.threading", EdgeKind::Inherits));
        assert_eq!(graph.diagnostics().len(), 1);
        assert!(graph.diagnostics()[0].message.contains("class m.Plain has no method `nothing`"));
        assert_eq!(graph.diagnostics()[0].line, Some(8));
    }
}
