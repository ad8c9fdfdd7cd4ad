use crate::graph::{Node, NodeId};
use std::collections::BTreeSet;

/// One name bound by an import statement. `alias` is `None` for `from m import *`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    pub alias: Option<String>,
    /// Dotted path the alias stands for (`m.n` for `from m import n`).
    pub target: String,
    /// Module the statement imports from.
    pub module: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDecl {
    pub id: NodeId,
    pub qualname: String,
    /// Base expressions as written, e.g. `Base` or `models.Model`.
    pub bases: Vec<String>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDecl {
    pub id: NodeId,
    /// Qualified name of the class, module or function the def appears in.
    pub owner: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTarget {
    /// `object.method(...)` where `object` is a dotted name.
    Attribute { object: String, method: String },
    /// `name(...)`.
    Name(String),
    /// Anything else: subscripts, calls of calls, lambdas.
    Opaque,
}

/// A call whose target is decided once every file is registered.
#[derive(Debug, Clone)]
pub struct CallSite {
    /// Declaration the call is made from; source of the `Calls` edge.
    pub scope: NodeId,
    /// Enclosing class, for `self.m()` and `cls.m()`.
    pub class_scope: Option<String>,
    /// Enclosing function qualnames, innermost first.
    pub owners: Vec<String>,
    pub target: CallTarget,
    /// Call node kept when the target cannot be resolved.
    pub fallback: Node,
    /// Nodes visited inside the argument list, materialized with the fallback.
    pub fragment: Vec<Node>,
    /// Call site whose arguments contain this one.
    pub enclosing: Option<usize>,
    pub line: usize,
}

/// Everything the per-file pass learned about one module.
#[derive(Debug, Clone)]
pub struct FileOutline {
    pub rel_path: String,
    pub module: String,
    pub module_id: NodeId,
    /// Local nodes, parents before children. The module root comes first.
    pub nodes: Vec<Node>,
    pub imports: Vec<ImportEntry>,
    pub classes: Vec<ClassDecl>,
    pub functions: Vec<FunctionDecl>,
    pub call_sites: Vec<CallSite>,
}

impl FileOutline {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id.as_str() == id)
    }

    /// Drops nodes the graph rejected, together with the declarations and
    /// call sites that live inside them.
    pub fn forget(&mut self, rejected: &BTreeSet<NodeId>) {
        if rejected.is_empty() {
            return;
        }
        self.nodes.retain(|node| !rejected.contains(&node.id));
        self.classes.retain(|class| !rejected.contains(&class.id));
        self.functions.retain(|function| !rejected.contains(&function.id));

        // Old index -> new index; `enclosing` always points backwards.
        let mut remap: Vec<Option<usize>> = Vec::with_capacity(self.call_sites.len());
        let mut kept = Vec::with_capacity(self.call_sites.len());
        for mut site in std::mem::take(&mut self.call_sites) {
            let inside_rejected = rejected.contains(&site.scope)
                || site
                    .fallback
                    .parent
                    .as_ref()
                    .is_some_and(|parent| rejected.contains(parent))
                || site.enclosing.is_some_and(|index| remap[index].is_none());
            if inside_rejected {
                remap.push(None);
                continue;
            }
            site.enclosing = site.enclosing.and_then(|index| remap[index]);
            remap.push(Some(kept.len()));
            kept.push(site);
        }
        self.call_sites = kept;
    }
}
