use crate::builder::outline::{
    CallSite, CallTarget, ClassDecl, FileOutline, FunctionDecl, ImportEntry,
};
use crate::error::GraphError;
use crate::graph::{Node, NodeId, NodeKind};
use crate::util;
use tree_sitter::{Node as SyntaxNode, Parser};

pub const DEFAULT_CONST_LABEL_MAX: usize = 48;

/// Per-file pass: parses one Python file and records its local structure.
///
/// Holds its own parser, so each worker thread needs its own visitor.
pub struct PythonVisitor {
    parser: Parser,
    const_label_max: usize,
}

impl PythonVisitor {
    pub fn new() -> Result<Self, GraphError> {
        let mut parser = Parser::new();
        let language = tree_sitter_python::LANGUAGE;
        parser.set_language(&language.into())?;
        Ok(Self {
            parser,
            const_label_max: DEFAULT_CONST_LABEL_MAX,
        })
    }

    pub fn with_const_label_max(mut self, max_bytes: usize) -> Self {
        self.const_label_max = max_bytes.max(1);
        self
    }

    pub fn visit_file(
        &mut self,
        source: &str,
        module: &str,
        rel_path: &str,
    ) -> Result<FileOutline, GraphError> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| GraphError::Parse {
                path: rel_path.to_string(),
                reason: "parser produced no tree".to_string(),
            })?;
        let root = tree.root_node();
        if root.has_error() {
            let reason = match first_error(root) {
                Some(node) => {
                    let pos = node.start_position();
                    format!("syntax error at {}:{}", pos.row + 1, pos.column + 1)
                }
                None => "syntax error".to_string(),
            };
            return Err(GraphError::Parse {
                path: rel_path.to_string(),
                reason,
            });
        }

        let mut walker = Walker::new(source, module, rel_path, self.const_label_max);
        let scope = walker.module_scope();
        walker.visit(root, &scope);
        Ok(walker.outline)
    }
}

fn first_error<'t>(node: SyntaxNode<'t>) -> Option<SyntaxNode<'t>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error() {
            if let Some(found) = first_error(child) {
                return Some(found);
            }
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Syntax {
    Module,
    ClassDef,
    FunctionDef,
    Decorated,
    Call,
    Identifier,
    Attribute,
    KeywordArgument,
    String,
    ConcatenatedString,
    Literal,
    For,
    Import,
    ImportFrom,
    FutureImport,
    Annotation,
    Comment,
    Other,
}

impl Syntax {
    fn of(kind: &str) -> Self {
        match kind {
            "module" => Syntax::Module,
            "class_definition" => Syntax::ClassDef,
            "function_definition" | "async_function_definition" => Syntax::FunctionDef,
            "decorated_definition" => Syntax::Decorated,
            "call" => Syntax::Call,
            "identifier" => Syntax::Identifier,
            "attribute" => Syntax::Attribute,
            "keyword_argument" => Syntax::KeywordArgument,
            "string" => Syntax::String,
            "concatenated_string" => Syntax::ConcatenatedString,
            "integer" | "float" | "true" | "false" | "none" | "ellipsis" => Syntax::Literal,
            "for_statement" => Syntax::For,
            "import_statement" => Syntax::Import,
            "import_from_statement" => Syntax::ImportFrom,
            "future_import_statement" => Syntax::FutureImport,
            "type" => Syntax::Annotation,
            "comment" => Syntax::Comment,
            _ => Syntax::Other,
        }
    }
}

#[derive(Debug, Clone)]
struct Scope {
    /// Parent for expression nodes.
    container: NodeId,
    /// Label of `container`; empty at module level.
    path: String,
    /// Parent for declarations.
    decl: NodeId,
    decl_path: String,
    /// Dotted declaration names below the module, without label suffixes.
    qualpath: String,
    class_qualname: Option<String>,
    /// Enclosing function qualnames, innermost first.
    owners: Vec<String>,
}

impl Scope {
    fn within(&self, node: &Node) -> Scope {
        Scope {
            container: node.id.clone(),
            path: node.label.clone(),
            ..self.clone()
        }
    }
}

fn join_label(path: &str, tag: &str) -> String {
    if path.is_empty() {
        tag.to_string()
    } else {
        format!("{path}.{tag}")
    }
}

fn line_of(node: SyntaxNode<'_>) -> usize {
    node.start_position().row + 1
}

fn position_tag(prefix: &str, node: SyntaxNode<'_>) -> String {
    let pos = node.start_position();
    format!("{prefix}@{}:{}", pos.row + 1, pos.column + 1)
}

fn is_dotted_chain(node: SyntaxNode<'_>) -> bool {
    match node.kind() {
        "identifier" => true,
        "attribute" => node
            .child_by_field_name("object")
            .map(is_dotted_chain)
            .unwrap_or(false),
        _ => false,
    }
}

struct Walker<'s> {
    source: &'s str,
    const_label_max: usize,
    base_package: Vec<String>,
    /// Call sites whose argument lists are being walked, innermost last.
    open_calls: Vec<usize>,
    outline: FileOutline,
}

impl<'s> Walker<'s> {
    fn new(source: &'s str, module: &str, rel_path: &str, const_label_max: usize) -> Self {
        let root = Node::new(module, module, NodeKind::Module).with_line(1);
        let outline = FileOutline {
            rel_path: rel_path.to_string(),
            module: module.to_string(),
            module_id: root.id.clone(),
            nodes: vec![root],
            imports: Vec::new(),
            classes: Vec::new(),
            functions: Vec::new(),
            call_sites: Vec::new(),
        };
        Self {
            source,
            const_label_max,
            base_package: util::base_package_parts(rel_path, module),
            open_calls: Vec::new(),
            outline,
        }
    }

    fn module_scope(&self) -> Scope {
        Scope {
            container: self.outline.module_id.clone(),
            path: String::new(),
            decl: self.outline.module_id.clone(),
            decl_path: String::new(),
            qualpath: String::new(),
            class_qualname: None,
            owners: Vec::new(),
        }
    }

    fn text(&self, node: SyntaxNode<'_>) -> String {
        self.source
            .get(node.start_byte()..node.end_byte())
            .unwrap_or("")
            .trim()
            .to_string()
    }

    fn dotted_text(&self, node: SyntaxNode<'_>) -> String {
        self.text(node).split_whitespace().collect()
    }

    fn label_text(&self, raw: &str) -> String {
        util::truncate_str_bytes(&util::squash_whitespace(raw), self.const_label_max)
    }

    /// Qualified name of the declaration scope, as used for FunctionMap owners.
    fn owner_of(&self, scope: &Scope) -> String {
        self.qualname(&scope.qualpath)
    }

    fn qualname(&self, qualpath: &str) -> String {
        if qualpath.is_empty() {
            self.outline.module.clone()
        } else {
            format!("{}.{qualpath}", self.outline.module)
        }
    }

    fn push(&mut self, node: Node) {
        match self.open_calls.last() {
            Some(&index) => self.outline.call_sites[index].fragment.push(node),
            None => self.outline.nodes.push(node),
        }
    }

    fn emit(&mut self, scope: &Scope, kind: NodeKind, tag: &str, at: SyntaxNode<'_>) -> Node {
        let label = join_label(&scope.path, tag);
        let node = Node::new(&self.outline.module, &label, kind)
            .with_parent(scope.container.clone())
            .with_line(line_of(at));
        self.push(node.clone());
        node
    }

    /// A declaration labelled like its module (`def main()` in `main.py`)
    /// would take the root's id, so its label gets a `@kind` suffix.
    fn declare(&mut self, scope: &Scope, kind: NodeKind, name: &str, at: SyntaxNode<'_>) -> Node {
        let mut label = join_label(&scope.decl_path, name);
        if label == self.outline.module {
            label = format!("{label}@{kind}");
        }
        let node = Node::new(&self.outline.module, &label, kind)
            .with_parent(scope.decl.clone())
            .with_line(line_of(at));
        self.push(node.clone());
        node
    }

    fn visit(&mut self, node: SyntaxNode<'_>, scope: &Scope) {
        match Syntax::of(node.kind()) {
            Syntax::Module | Syntax::Other => self.visit_children(node, scope),
            Syntax::ClassDef => self.visit_class(node, scope),
            Syntax::FunctionDef => self.visit_function(node, scope),
            Syntax::Decorated => self.visit_decorated(node, scope),
            Syntax::Call => self.visit_call(node, scope),
            Syntax::Identifier => {
                let name = self.text(node);
                self.emit(scope, NodeKind::Name, &format!("name({name})"), node);
            }
            Syntax::Attribute => {
                if let Some(object) = node.child_by_field_name("object") {
                    self.visit(object, scope);
                }
            }
            Syntax::KeywordArgument => {
                if let Some(value) = node.child_by_field_name("value") {
                    self.visit(value, scope);
                }
            }
            Syntax::String => self.visit_string(node, scope),
            Syntax::ConcatenatedString => {
                if self.has_fstring_part(node) {
                    self.visit_children(node, scope);
                } else {
                    self.emit_constant(node, scope);
                }
            }
            Syntax::Literal => self.emit_constant(node, scope),
            Syntax::For => {
                let tag = position_tag("for", node);
                let for_node = self.emit(scope, NodeKind::For, &tag, node);
                let inner = scope.within(&for_node);
                self.visit_children(node, &inner);
            }
            Syntax::Import => self.visit_import(node, scope),
            Syntax::ImportFrom => self.visit_import_from(node, scope),
            Syntax::FutureImport | Syntax::Annotation | Syntax::Comment => {}
        }
    }

    fn visit_children(&mut self, node: SyntaxNode<'_>, scope: &Scope) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.visit(child, scope);
        }
    }

    fn visit_class(&mut self, node: SyntaxNode<'_>, scope: &Scope) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node);
        let class = self.declare(scope, NodeKind::Class, &name, node);
        let qualpath = join_label(&scope.qualpath, &name);
        let qualname = self.qualname(&qualpath);

        let mut bases = Vec::new();
        if let Some(superclasses) = node.child_by_field_name("superclasses") {
            let mut cursor = superclasses.walk();
            for base in superclasses.named_children(&mut cursor) {
                if is_dotted_chain(base) {
                    bases.push(self.dotted_text(base));
                }
            }
        }
        self.outline.classes.push(ClassDecl {
            id: class.id.clone(),
            qualname: qualname.clone(),
            bases,
            line: line_of(node),
        });

        let inner = Scope {
            container: class.id.clone(),
            path: class.label.clone(),
            decl: class.id.clone(),
            decl_path: class.label.clone(),
            qualpath,
            class_qualname: Some(qualname),
            owners: scope.owners.clone(),
        };
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_children(body, &inner);
        }
    }

    fn visit_function(&mut self, node: SyntaxNode<'_>, scope: &Scope) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node);
        let owner = self.owner_of(scope);
        let function = self.declare(scope, NodeKind::Function, &name, node);
        let qualpath = join_label(&scope.qualpath, &name);
        self.outline.functions.push(FunctionDecl {
            id: function.id.clone(),
            owner,
            name,
        });

        let mut owners = Vec::with_capacity(scope.owners.len() + 1);
        owners.push(self.qualname(&qualpath));
        owners.extend(scope.owners.iter().cloned());
        let inner = Scope {
            container: function.id.clone(),
            path: function.label.clone(),
            decl: function.id.clone(),
            decl_path: function.label.clone(),
            qualpath,
            class_qualname: scope.class_qualname.clone(),
            owners,
        };
        if let Some(parameters) = node.child_by_field_name("parameters") {
            self.visit_parameters(parameters, scope, &inner);
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_children(body, &inner);
        }
    }

    /// Parameters become arguments of the function; defaults are evaluated in
    /// the enclosing scope.
    fn visit_parameters(&mut self, parameters: SyntaxNode<'_>, outer: &Scope, inner: &Scope) {
        let mut cursor = parameters.walk();
        for parameter in parameters.named_children(&mut cursor) {
            if let Some(name) = self.parameter_name(parameter) {
                self.emit(inner, NodeKind::Argument, &name, parameter);
            }
            if let Some(value) = parameter.child_by_field_name("value") {
                self.visit(value, outer);
            }
        }
    }

    fn parameter_name(&self, parameter: SyntaxNode<'_>) -> Option<String> {
        match parameter.kind() {
            "identifier" => Some(self.text(parameter)),
            "default_parameter" | "typed_default_parameter" => parameter
                .child_by_field_name("name")
                .and_then(|name| self.parameter_name(name)),
            "typed_parameter" | "list_splat_pattern" | "dictionary_splat_pattern" => {
                let mut cursor = parameter.walk();
                let inner = parameter
                    .named_children(&mut cursor)
                    .find(|child| child.kind() != "type");
                inner.and_then(|child| self.parameter_name(child))
            }
            _ => None,
        }
    }

    fn visit_decorated(&mut self, node: SyntaxNode<'_>, scope: &Scope) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() == "decorator" {
                self.visit_children(child, scope);
            } else {
                self.visit(child, scope);
            }
        }
    }

    fn call_target(&self, callee: SyntaxNode<'_>) -> CallTarget {
        match callee.kind() {
            "identifier" => CallTarget::Name(self.text(callee)),
            "attribute" => {
                let object = callee.child_by_field_name("object");
                let method = callee.child_by_field_name("attribute");
                match (object, method) {
                    (Some(object), Some(method)) if is_dotted_chain(object) => {
                        CallTarget::Attribute {
                            object: self.dotted_text(object),
                            method: self.text(method),
                        }
                    }
                    _ => CallTarget::Opaque,
                }
            }
            _ => CallTarget::Opaque,
        }
    }

    fn visit_call(&mut self, node: SyntaxNode<'_>, scope: &Scope) {
        let callee = node.child_by_field_name("function");
        let target = callee
            .map(|callee| self.call_target(callee))
            .unwrap_or(CallTarget::Opaque);
        let callee_text = callee
            .map(|callee| self.label_text(&self.text(callee)))
            .unwrap_or_default();
        let label = join_label(&scope.path, &format!("call({callee_text})"));
        let fallback = Node::new(&self.outline.module, &label, NodeKind::Call)
            .with_parent(scope.container.clone())
            .with_line(line_of(node));

        let index = self.outline.call_sites.len();
        self.outline.call_sites.push(CallSite {
            scope: scope.decl.clone(),
            class_scope: scope.class_qualname.clone(),
            owners: scope.owners.clone(),
            target: target.clone(),
            fallback: fallback.clone(),
            fragment: Vec::new(),
            enclosing: self.open_calls.last().copied(),
            line: line_of(node),
        });

        let inner = scope.within(&fallback);
        self.open_calls.push(index);
        if let (Some(callee), CallTarget::Opaque) = (callee, &target) {
            self.visit(callee, &inner);
        }
        if let Some(arguments) = node.child_by_field_name("arguments") {
            self.visit_children(arguments, &inner);
        }
        self.open_calls.pop();
    }

    fn is_fstring(&self, node: SyntaxNode<'_>) -> bool {
        let mut cursor = node.walk();
        let start = node
            .children(&mut cursor)
            .find(|child| child.kind() == "string_start");
        match start {
            Some(start) => self
                .text(start)
                .chars()
                .take_while(|ch| ch.is_ascii_alphabetic())
                .any(|ch| ch == 'f' || ch == 'F'),
            None => false,
        }
    }

    fn has_fstring_part(&self, node: SyntaxNode<'_>) -> bool {
        let mut cursor = node.walk();
        node.named_children(&mut cursor)
            .any(|child| child.kind() == "string" && self.is_fstring(child))
    }

    fn visit_string(&mut self, node: SyntaxNode<'_>, scope: &Scope) {
        if !self.is_fstring(node) {
            self.emit_constant(node, scope);
            return;
        }
        let joined = self.emit(scope, NodeKind::JoinedStr, &position_tag("fstring", node), node);
        let inner = scope.within(&joined);
        let mut cursor = node.walk();
        for part in node.named_children(&mut cursor) {
            match part.kind() {
                "string_content" => {
                    let text = self.label_text(&self.text(part));
                    if !text.is_empty() {
                        self.emit(&inner, NodeKind::Constant, &format!("const({text})"), part);
                    }
                }
                "interpolation" => {
                    let tag = position_tag("format", part);
                    let formatted = self.emit(&inner, NodeKind::FormattedValue, &tag, part);
                    let value_scope = inner.within(&formatted);
                    if let Some(expression) = part.child_by_field_name("expression") {
                        self.visit(expression, &value_scope);
                    }
                }
                _ => {}
            }
        }
    }

    fn emit_constant(&mut self, node: SyntaxNode<'_>, scope: &Scope) {
        let text = self.label_text(&self.text(node));
        self.emit(scope, NodeKind::Constant, &format!("const({text})"), node);
    }

    fn visit_import(&mut self, node: SyntaxNode<'_>, scope: &Scope) {
        let mut cursor = node.walk();
        let names: Vec<SyntaxNode<'_>> = node.children_by_field_name("name", &mut cursor).collect();
        for name in names {
            match name.kind() {
                "dotted_name" => {
                    let target = self.dotted_text(name);
                    self.add_import(scope, Some(target.clone()), target.clone(), target, node);
                }
                "aliased_import" => {
                    let target = name
                        .child_by_field_name("name")
                        .map(|n| self.dotted_text(n));
                    let alias = name.child_by_field_name("alias").map(|n| self.text(n));
                    if let (Some(target), Some(alias)) = (target, alias) {
                        self.add_import(scope, Some(alias), target.clone(), target, node);
                    }
                }
                _ => {}
            }
        }
    }

    fn visit_import_from(&mut self, node: SyntaxNode<'_>, scope: &Scope) {
        let Some(module_node) = node.child_by_field_name("module_name") else {
            return;
        };
        let raw = self.dotted_text(module_node);
        // Relative imports that climb past the tree keep their dotted text.
        let module = if raw.starts_with('.') {
            util::absolutize_module(&raw, &self.base_package).unwrap_or(raw)
        } else {
            raw
        };

        let mut cursor = node.walk();
        let wildcard = node
            .named_children(&mut cursor)
            .any(|child| child.kind() == "wildcard_import");
        if wildcard {
            self.add_import(scope, None, module.clone(), module, node);
            return;
        }

        let names: Vec<SyntaxNode<'_>> = node.children_by_field_name("name", &mut cursor).collect();
        for name in names {
            let (member, alias) = match name.kind() {
                "dotted_name" => {
                    let member = self.dotted_text(name);
                    (member.clone(), member)
                }
                "aliased_import" => {
                    let member = name.child_by_field_name("name").map(|n| self.dotted_text(n));
                    let alias = name.child_by_field_name("alias").map(|n| self.text(n));
                    match (member, alias) {
                        (Some(member), Some(alias)) => (member, alias),
                        _ => continue,
                    }
                }
                _ => continue,
            };
            let target = if module.ends_with('.') {
                format!("{module}{member}")
            } else {
                format!("{module}.{member}")
            };
            self.add_import(scope, Some(alias), target, module.clone(), node);
        }
    }

    fn add_import(
        &mut self,
        scope: &Scope,
        alias: Option<String>,
        target: String,
        module: String,
        at: SyntaxNode<'_>,
    ) {
        let tag = match &alias {
            Some(alias) => format!("import({alias})"),
            None => format!("import({module}.*)"),
        };
        self.emit(scope, NodeKind::Import, &tag, at);
        self.outline.imports.push(ImportEntry {
            alias,
            target,
            module,
            line: line_of(at),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outline(source: &str, rel_path: &str) -> FileOutline {
        let module = util::module_name_from_rel_path(rel_path);
        PythonVisitor::new()
            .unwrap()
            .visit_file(source, &module, rel_path)
            .unwrap()
    }

    fn parent_of<'a>(outline: &'a FileOutline, id: &str) -> Option<&'a str> {
        outline
            .node(id)
            .and_then(|node| node.parent.as_ref())
            .map(|parent| parent.as_str())
    }

    #[test]
    fn declaration_named_like_its_module_keeps_own_node() {
        let outline = outline("def main(argv):\n    pass\n", "main.py");
        assert_eq!(outline.module_id.as_str(), "main.main");
        let function = outline.node("main.main@function").unwrap();
        assert_eq!(function.kind, NodeKind::Function);
        assert_eq!(parent_of(&outline, "main.main@function"), Some("main.main"));
        assert_eq!(parent_of(&outline, "main.main@function.argv"), Some("main.main@function"));
        assert_eq!(outline.functions[0].owner, "main");
        assert_eq!(outline.functions[0].name, "main");
    }

    #[test]
    fn declarations_and_arguments_nest_by_scope() {
        let source = r#"
class Base:
    def greet(self, name: str, greeting="hi", *args, **kwargs):
        def inner():
            pass
        return name
"#;
        let out = outline(source, "a.py");
        assert_eq!(out.module_id.as_str(), "a.a");
        assert_eq!(parent_of(&out, "a.Base"), Some("a.a"));
        assert_eq!(parent_of(&out, "a.Base.greet"), Some("a.Base"));
        assert_eq!(parent_of(&out, "a.Base.greet.inner"), Some("a.Base.greet"));
        for arg in ["self", "name", "greeting", "args", "kwargs"] {
            let id = format!("a.Base.greet.{arg}");
            let node = out.node(&id).unwrap_or_else(|| panic!("missing {id}"));
            assert_eq!(node.kind, NodeKind::Argument);
        }
        assert!(out.node("a.Base.const(\"hi\")").is_some());
        assert!(out.node("a.Base.greet.name(name)").is_some());

        let owners: Vec<(&str, &str)> = out
            .functions
            .iter()
            .map(|f| (f.owner.as_str(), f.name.as_str()))
            .collect();
        assert_eq!(owners, vec![("a.Base", "greet"), ("a.Base.greet", "inner")]);
    }

    #[test]
    fn class_bases_skip_keywords() {
        let out = outline(
            "import abc\nclass Child(base.Base, Mixin, metaclass=abc.ABCMeta):\n    pass\n",
            "b.py",
        );
        assert_eq!(out.classes.len(), 1);
        assert_eq!(out.classes[0].qualname, "b.Child");
        assert_eq!(out.classes[0].bases, vec!["base.Base", "Mixin"]);
    }

    #[test]
    fn imports_are_absolutized() {
        let source = r#"
import os.path
import numpy as np
from . import sibling
from ..core import Engine as E
from .models import *
"#;
        let out = outline(source, "pkg/sub/mod.py");
        let entries: Vec<(Option<&str>, &str, &str)> = out
            .imports
            .iter()
            .map(|i| (i.alias.as_deref(), i.target.as_str(), i.module.as_str()))
            .collect();
        assert_eq!(
            entries,
            vec![
                (Some("os.path"), "os.path", "os.path"),
                (Some("np"), "numpy", "numpy"),
                (Some("sibling"), "pkg.sub.sibling", "pkg.sub"),
                (Some("E"), "pkg.core.Engine", "pkg.core"),
                (None, "pkg.sub.models", "pkg.sub.models"),
            ]
        );
        assert!(out.node("pkg.sub.mod.import(np)").is_some());
        assert!(out.node("pkg.sub.mod.import(pkg.sub.models.*)").is_some());

        let top = outline("from ..up import thing\n", "top.py");
        assert_eq!(top.imports[0].target, "..up.thing");
        assert_eq!(top.imports[0].module, "..up");
    }

    #[test]
    fn call_sites_record_targets_and_fragments() {
        let source = r#"
class Child(Base):
    def hello(self, x):
        self.greet(len(x), key=x)
        helper()
        handlers[0](x)
"#;
        let out = outline(source, "b.py");
        assert_eq!(out.call_sites.len(), 4);

        let greet = &out.call_sites[0];
        assert_eq!(
            greet.target,
            CallTarget::Attribute {
                object: "self".into(),
                method: "greet".into()
            }
        );
        assert_eq!(greet.scope.as_str(), "b.Child.hello");
        assert_eq!(greet.class_scope.as_deref(), Some("b.Child"));
        assert_eq!(greet.owners, vec!["b.Child.hello"]);
        assert_eq!(greet.fallback.id.as_str(), "b.Child.hello.call(self.greet)");
        let fragment: Vec<&str> = greet.fragment.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(fragment, vec!["b.Child.hello.call(self.greet).name(x)"]);

        let len = &out.call_sites[1];
        assert_eq!(len.target, CallTarget::Name("len".into()));
        assert_eq!(len.enclosing, Some(0));
        assert_eq!(
            len.fallback.parent.as_ref().map(|p| p.as_str()),
            Some("b.Child.hello.call(self.greet)")
        );
        assert_eq!(len.fragment.len(), 1);

        assert_eq!(out.call_sites[2].target, CallTarget::Name("helper".into()));
        assert_eq!(out.call_sites[2].enclosing, None);

        let opaque = &out.call_sites[3];
        assert_eq!(opaque.target, CallTarget::Opaque);
        assert!(
            opaque
                .fragment
                .iter()
                .any(|n| n.label.ends_with("name(handlers)"))
        );
        assert!(out.node("b.Child.hello.call(self.greet)").is_none());
    }

    #[test]
    fn fstrings_and_loops_become_containers() {
        let source = "for item in items:\n    msg = f\"value {item}\"\n";
        let out = outline(source, "c.py");
        let for_node = out
            .nodes
            .iter()
            .find(|n| n.kind == NodeKind::For)
            .unwrap();
        assert_eq!(for_node.label, "for@1:1");
        assert!(out.node("c.for@1:1.name(items)").is_some());

        let joined = out
            .nodes
            .iter()
            .find(|n| n.kind == NodeKind::JoinedStr)
            .unwrap();
        assert_eq!(joined.parent.as_ref(), Some(&for_node.id));
        let children: Vec<&Node> = out
            .nodes
            .iter()
            .filter(|n| n.parent.as_ref() == Some(&joined.id))
            .collect();
        assert!(children.iter().any(|n| n.kind == NodeKind::Constant));
        let formatted = children
            .iter()
            .find(|n| n.kind == NodeKind::FormattedValue)
            .unwrap();
        assert!(
            out.nodes
                .iter()
                .any(|n| n.parent.as_ref() == Some(&formatted.id) && n.label.ends_with("name(item)"))
        );
    }

    #[test]
    fn annotations_are_not_visited() {
        let out = outline("def f(x: Widget) -> Gadget:\n    y: Sprocket = 1\n", "d.py");
        assert!(!out.nodes.iter().any(|n| n.label.contains("Widget")));
        assert!(!out.nodes.iter().any(|n| n.label.contains("Gadget")));
        assert!(!out.nodes.iter().any(|n| n.label.contains("Sprocket")));
        assert!(out.node("d.f.name(y)").is_some());
    }

    #[test]
    fn long_constants_are_truncated() {
        let mut visitor = PythonVisitor::new().unwrap().with_const_label_max(8);
        let out = visitor
            .visit_file("x = 'abcdefghijklmnop'\n", "e", "e.py")
            .unwrap();
        assert!(out.node("e.const('abcdefg)").is_some());
    }

    #[test]
    fn syntax_errors_fail_the_file() {
        let err = PythonVisitor::new()
            .unwrap()
            .visit_file("def broken(:\n    pass\n", "bad", "bad.py")
            .unwrap_err();
        match err {
            GraphError::Parse { path, reason } => {
                assert_eq!(path, "bad.py");
                assert!(reason.starts_with("syntax error"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
