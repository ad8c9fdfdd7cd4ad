use crate::builder::outline::FileOutline;
use crate::error::GraphError;
use crate::graph::NodeId;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    /// Dotted path the alias stands for.
    pub target: String,
    /// Module the import statement names.
    pub module: String,
    pub line: usize,
}

impl ImportBinding {
    fn same_binding(&self, other: &ImportBinding) -> bool {
        self.target == other.target && self.module == other.module
    }
}

impl fmt::Display for ImportBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.target == self.module {
            write!(f, "import {}", self.target)
        } else {
            write!(f, "from {} import {}", self.module, self.target)
        }
    }
}

/// Corpus-wide symbol tables filled from file outlines.
///
/// Append-only: a second insert under a key keeps the first value and reports
/// the conflict.
#[derive(Debug, Default)]
pub struct SymbolRegistry {
    imports: BTreeMap<String, BTreeMap<String, ImportBinding>>,
    wildcards: BTreeMap<String, BTreeSet<String>>,
    modules: BTreeMap<String, NodeId>,
    classes: BTreeMap<String, NodeId>,
    functions: BTreeMap<String, BTreeMap<String, NodeId>>,
    ambiguous: BTreeSet<(String, String)>,
}

fn conflict(qualname: String, kept: &dyn fmt::Display, rejected: &dyn fmt::Display) -> GraphError {
    GraphError::DuplicateSymbol {
        qualname,
        kept: kept.to_string(),
        rejected: rejected.to_string(),
    }
}

impl SymbolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a whole outline, returning every rejected entry.
    pub fn register_outline(&mut self, outline: &FileOutline) -> Vec<GraphError> {
        let mut errors = Vec::new();
        let module = outline.module.as_str();
        if let Err(err) = self.insert_module(module, outline.module_id.clone()) {
            errors.push(err);
        }
        for import in &outline.imports {
            match &import.alias {
                Some(alias) => {
                    let binding = ImportBinding {
                        target: import.target.clone(),
                        module: import.module.clone(),
                        line: import.line,
                    };
                    if let Err(err) = self.insert_import(module, alias, binding) {
                        errors.push(err);
                    }
                }
                None => self.insert_wildcard(module, &import.module),
            }
        }
        for class in &outline.classes {
            if let Err(err) = self.insert_class(&class.qualname, class.id.clone()) {
                errors.push(err);
            }
        }
        for function in &outline.functions {
            if let Err(err) =
                self.insert_function(&function.owner, &function.name, function.id.clone())
            {
                errors.push(err);
            }
        }
        errors
    }

    pub fn insert_module(&mut self, module: &str, id: NodeId) -> Result<(), GraphError> {
        match self.modules.get(module) {
            Some(existing) if *existing != id => Err(conflict(module.to_string(), existing, &id)),
            Some(_) => Ok(()),
            None => {
                self.modules.insert(module.to_string(), id);
                Ok(())
            }
        }
    }

    pub fn insert_import(
        &mut self,
        module: &str,
        alias: &str,
        binding: ImportBinding,
    ) -> Result<(), GraphError> {
        let bindings = self.imports.entry(module.to_string()).or_default();
        match bindings.get(alias) {
            Some(existing) if !existing.same_binding(&binding) => Err(conflict(
                format!("{module}.{alias}"),
                existing,
                &binding,
            )),
            Some(_) => Ok(()),
            None => {
                bindings.insert(alias.to_string(), binding);
                Ok(())
            }
        }
    }

    pub fn insert_wildcard(&mut self, module: &str, target: &str) {
        self.wildcards
            .entry(module.to_string())
            .or_default()
            .insert(target.to_string());
    }

    pub fn insert_class(&mut self, qualname: &str, id: NodeId) -> Result<(), GraphError> {
        match self.classes.get(qualname) {
            Some(existing) if *existing != id => {
                Err(conflict(qualname.to_string(), existing, &id))
            }
            Some(_) => Ok(()),
            None => {
                self.classes.insert(qualname.to_string(), id);
                Ok(())
            }
        }
    }

    pub fn insert_function(
        &mut self,
        owner: &str,
        name: &str,
        id: NodeId,
    ) -> Result<(), GraphError> {
        let members = self.functions.entry(owner.to_string()).or_default();
        match members.get(name) {
            Some(existing) if *existing != id => {
                Err(conflict(format!("{owner}.{name}"), existing, &id))
            }
            Some(_) => Ok(()),
            None => {
                members.insert(name.to_string(), id);
                Ok(())
            }
        }
    }

    /// Adds an inherited method unless the class already has that name.
    pub fn merge_inherited(&mut self, class: &str, name: &str, id: NodeId) -> bool {
        let members = self.functions.entry(class.to_string()).or_default();
        if members.contains_key(name) {
            return false;
        }
        members.insert(name.to_string(), id);
        true
    }

    pub fn mark_ambiguous(&mut self, class: &str, name: &str) {
        self.ambiguous.insert((class.to_string(), name.to_string()));
    }

    pub fn is_ambiguous(&self, class: &str, name: &str) -> bool {
        self.ambiguous
            .contains(&(class.to_string(), name.to_string()))
    }

    pub fn module(&self, name: &str) -> Option<&NodeId> {
        self.modules.get(name)
    }

    pub fn modules(&self) -> impl Iterator<Item = (&str, &NodeId)> {
        self.modules.iter().map(|(name, id)| (name.as_str(), id))
    }

    pub fn class(&self, qualname: &str) -> Option<&NodeId> {
        self.classes.get(qualname)
    }

    pub fn function(&self, owner: &str, name: &str) -> Option<&NodeId> {
        self.functions.get(owner).and_then(|members| members.get(name))
    }

    pub fn functions_of(&self, owner: &str) -> impl Iterator<Item = (&str, &NodeId)> {
        self.functions
            .get(owner)
            .into_iter()
            .flat_map(|members| members.iter().map(|(name, id)| (name.as_str(), id)))
    }

    pub fn imports(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, ImportBinding>)> {
        self.imports
            .iter()
            .map(|(module, bindings)| (module.as_str(), bindings))
    }

    pub fn imports_for(&self, module: &str) -> Option<&BTreeMap<String, ImportBinding>> {
        self.imports.get(module)
    }

    pub fn wildcards(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.wildcards
            .iter()
            .map(|(module, targets)| (module.as_str(), targets))
    }

    pub fn wildcards_for(&self, module: &str) -> impl Iterator<Item = &str> {
        self.wildcards
            .get(module)
            .into_iter()
            .flat_map(|targets| targets.iter().map(String::as_str))
    }

    /// Longest project module equal to `dotted` or a dotted prefix of it.
    pub fn module_prefix(&self, dotted: &str) -> Option<(&str, &NodeId)> {
        let mut candidate = dotted;
        loop {
            if let Some((name, id)) = self.modules.get_key_value(candidate) {
                return Some((name.as_str(), id));
            }
            let (head, _) = candidate.rsplit_once('.')?;
            candidate = head;
        }
    }
}
