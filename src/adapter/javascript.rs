//! JavaScript language adapter
//!
//! Extracts functions, classes, methods, arrow functions bound to names,
//! imports (`import` and `require`), calls and Express-style route
//! registrations. The walker also understands the TypeScript node kinds
//! (interfaces, abstract members, access modifiers, `implements`) and is
//! shared with the TypeScript adapter.

use super::extract::{FileExtractor, parameter_names};
use super::framework::{LanguageAdapter, ParseOptions, ParseResult};
use super::syntax::{self, text};
use crate::Result;
use crate::language::Language;
use crate::relationship::RelationshipKind;
use crate::symbol::{SymbolId, SymbolKind, Visibility};
use tree_sitter::Node;

const ROUTE_METHODS: &[&str] = &["get", "post", "put", "delete", "patch", "all", "use"];

#[derive(Debug, Default)]
pub struct JavaScriptAdapter;

impl JavaScriptAdapter {
    pub fn new() -> Self {
        Self
    }
}

/// Per-file walk state.
struct Walker<'a, 's> {
    ex: &'a mut FileExtractor<'s>,
    source: &'s str,
    /// (handler name, route path, http method)
    routes: Vec<(String, String, String)>,
}

impl<'a, 's> Walker<'a, 's> {
    fn walk(&mut self, node: Node, exported: bool) {
        for child in syntax::named_children(node) {
            self.visit(child, exported);
        }
    }

    fn visit(&mut self, node: Node, exported: bool) {
        match node.kind() {
            "export_statement" => self.walk(node, true),
            "function_declaration" | "generator_function_declaration" => {
                if let Some(name) = syntax::field_text(node, "name", self.source) {
                    self.function(node, name, SymbolKind::Function, exported);
                }
            }
            "class_declaration" | "class" | "abstract_class_declaration" => self.class(node, exported),
            "interface_declaration" => self.interface(node, exported),
            "enum_declaration" => {
                if let Some(name) = syntax::field_text(node, "name", self.source) {
                    let id = self.ex.add_symbol(SymbolKind::Enum, name, syntax::span(node));
                    self.ex.symbol_mut(id).is_exported = exported;
                }
            }
            "method_definition" => {
                if let Some(name) = syntax::field_text(node, "name", self.source) {
                    let kind = if name == "constructor" { SymbolKind::Constructor } else { SymbolKind::Method };
                    let id = self.function(node, name, kind, false);
                    if let Some(vis) = accessibility(node, self.source) {
                        self.ex.symbol_mut(id).visibility = vis;
                    }
                }
            }
            // Overload signatures inside a class body are not separate members.
            "method_signature" if self.ex.current_scope_kind() != SymbolKind::Interface => {}
            "method_signature" | "abstract_method_signature" => {
                if let Some(name) = syntax::field_text(node, "name", self.source) {
                    let id = self.function(node, name, SymbolKind::Method, false);
                    let symbol = self.ex.symbol_mut(id);
                    symbol.is_abstract = true;
                    if let Some(vis) = accessibility(node, self.source) {
                        symbol.visibility = vis;
                    }
                }
            }
            "public_field_definition" | "property_signature" => {
                if let Some(name) = syntax::field_text(node, "name", self.source) {
                    let id = self.ex.add_symbol(SymbolKind::Field, name, syntax::span(node));
                    let return_type = type_annotation(node, self.source);
                    let symbol = self.ex.symbol_mut(id);
                    symbol.return_type = return_type;
                    if let Some(vis) = accessibility(node, self.source) {
                        symbol.visibility = vis;
                    } else if name.starts_with('#') {
                        symbol.visibility = Visibility::Private;
                    }
                }
                if let Some(value) = node.child_by_field_name("value") {
                    self.visit(value, false);
                }
            }
            "field_definition" => {
                if let Some(prop) = node.child_by_field_name("property") {
                    let id = self.ex.add_symbol(SymbolKind::Field, text(prop, self.source), syntax::span(node));
                    if text(prop, self.source).starts_with('#') {
                        self.ex.symbol_mut(id).visibility = Visibility::Private;
                    }
                }
                if let Some(value) = node.child_by_field_name("value") {
                    self.visit(value, false);
                }
            }
            "variable_declarator" => self.declarator(node, exported),
            "import_statement" => {
                if let Some(source) = node.child_by_field_name("source") {
                    let module = text(source, self.source).trim_matches(['"', '\'', '`']);
                    self.ex
                        .add_reference(RelationshipKind::Imports, module, syntax::line(node), syntax::column(node));
                }
            }
            "call_expression" => {
                self.call(node);
                self.walk(node, false);
            }
            "new_expression" => {
                if let Some(ctor) = node.child_by_field_name("constructor") {
                    let args = node
                        .child_by_field_name("arguments")
                        .map(|a| syntax::call_arguments(a, self.source))
                        .unwrap_or_default();
                    let assigned = syntax::assigned_variable(node, self.source);
                    self.ex.add_call(
                        text(ctor, self.source),
                        syntax::line(node),
                        syntax::column(node),
                        args,
                        assigned,
                    );
                }
                self.walk(node, false);
            }
            _ => self.walk(node, exported),
        }
    }

    fn function(&mut self, node: Node, name: &str, kind: SymbolKind, exported: bool) -> SymbolId {
        let id = self.ex.add_symbol(kind, name, syntax::span(node));
        let params = node
            .child_by_field_name("parameters")
            .or_else(|| node.child_by_field_name("parameter"))
            .map(|p| text(p, self.source))
            .unwrap_or("()");
        let is_async = syntax::has_token(node, "async");
        let is_static = syntax::has_token(node, "static");
        let return_type = type_annotation(node, self.source);

        let symbol = self.ex.symbol_mut(id);
        symbol.return_type = return_type;
        symbol.parameters = parameter_names(params);
        symbol.signature = Some(if params.starts_with('(') {
            format!("{}{}", name, params)
        } else {
            format!("{}({})", name, params)
        });
        symbol.is_async = is_async;
        symbol.is_exported = exported;
        if name.starts_with('#') {
            symbol.visibility = Visibility::Private;
        }
        if is_static {
            symbol.language_features.insert("static".to_string(), "true".to_string());
        }
        if node.kind().starts_with("generator") {
            symbol.language_features.insert("generator".to_string(), "true".to_string());
        }

        self.ex.enter(id);
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_body(body);
        }
        self.ex.exit();
        id
    }

    /// Arrow bodies may be a bare expression rather than a block.
    fn visit_body(&mut self, body: Node) {
        if body.kind() == "statement_block" {
            self.walk(body, false);
        } else {
            self.visit(body, false);
        }
    }

    fn class(&mut self, node: Node, exported: bool) {
        let Some(name) = syntax::field_text(node, "name", self.source) else {
            self.walk(node, false);
            return;
        };
        let id = self.ex.add_symbol(SymbolKind::Class, name, syntax::span(node));
        let symbol = self.ex.symbol_mut(id);
        symbol.is_exported = exported;
        symbol.is_abstract = node.kind() == "abstract_class_declaration";

        let heritage = syntax::named_children(node)
            .into_iter()
            .find(|c| c.kind() == "class_heritage");
        if let Some(heritage) = heritage {
            for clause in syntax::named_children(heritage) {
                // TypeScript wraps bases in clauses; JavaScript names them directly.
                let (kind, bases) = match clause.kind() {
                    "extends_clause" => (RelationshipKind::Inherits, syntax::named_children(clause)),
                    "implements_clause" => (RelationshipKind::Implements, syntax::named_children(clause)),
                    _ => (RelationshipKind::Inherits, vec![clause]),
                };
                for base in bases.into_iter().filter(|b| b.kind() != "type_arguments") {
                    self.base(id, kind, base);
                }
            }
        }

        self.ex.enter(id);
        if let Some(body) = node.child_by_field_name("body") {
            self.walk(body, false);
        }
        self.ex.exit();
    }

    fn interface(&mut self, node: Node, exported: bool) {
        let Some(name) = syntax::field_text(node, "name", self.source) else {
            return;
        };
        let id = self.ex.add_symbol(SymbolKind::Interface, name, syntax::span(node));
        self.ex.symbol_mut(id).is_exported = exported;
        for clause in syntax::named_children(node)
            .into_iter()
            .filter(|c| matches!(c.kind(), "extends_type_clause" | "extends_clause"))
        {
            for base in syntax::named_children(clause) {
                self.base(id, RelationshipKind::Inherits, base);
            }
        }

        self.ex.enter(id);
        if let Some(body) = node.child_by_field_name("body") {
            self.walk(body, false);
        }
        self.ex.exit();
    }

    /// `Base<T>` reduces to `Base`.
    fn base(&mut self, from: SymbolId, kind: RelationshipKind, base: Node) {
        let raw = text(base, self.source);
        let name = raw.split('<').next().unwrap_or(raw).trim();
        if name.is_empty() {
            return;
        }
        self.ex
            .add_reference_from(from, kind, name, syntax::line(base), syntax::column(base));
    }

    fn declarator(&mut self, node: Node, exported: bool) {
        let source = self.source;
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let value = node.child_by_field_name("value");
        let name = text(name_node, source);

        match value.map(|v| v.kind()) {
            Some("arrow_function" | "function_expression" | "function" | "generator_function") => {
                if let Some(value) = value {
                    if name_node.kind() == "identifier" {
                        self.function(value, name, SymbolKind::Function, exported);
                    } else {
                        self.visit(value, false);
                    }
                }
            }
            Some("class") => {
                if let Some(value) = value {
                    self.class(value, exported);
                }
            }
            _ => {
                if let Some(value) = value {
                    if let Some(module) = require_target(value, source) {
                        self.ex.add_reference(
                            RelationshipKind::Imports,
                            &module,
                            syntax::line(node),
                            syntax::column(node),
                        );
                        return;
                    }
                }
                let scope = self.ex.current_scope_kind();
                if scope == SymbolKind::Module && name_node.kind() == "identifier" {
                    let is_const = node.parent().is_some_and(|p| text(p, source).starts_with("const"));
                    let kind = if is_const && name.chars().all(|c| c.is_uppercase() || c == '_' || c.is_ascii_digit()) {
                        SymbolKind::Constant
                    } else {
                        SymbolKind::Variable
                    };
                    let id = self.ex.add_symbol(kind, name, syntax::span(node));
                    self.ex.symbol_mut(id).is_exported = exported;
                }
                if let Some(value) = value {
                    self.visit(value, false);
                }
            }
        }
    }

    fn call(&mut self, node: Node) {
        let source = self.source;
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };
        if !matches!(function.kind(), "identifier" | "member_expression") {
            return;
        }
        let target = text(function, source);
        if target == "require" {
            return;
        }
        let arguments = node.child_by_field_name("arguments");
        let args = arguments
            .map(|a| syntax::call_arguments(a, source))
            .unwrap_or_default();
        let assigned = syntax::assigned_variable(node, source);
        self.ex
            .add_call(target, syntax::line(node), syntax::column(node), args, assigned);

        // app.get('/users', listUsers)
        if let (Some(arguments), Some(method)) = (arguments, target.rsplit('.').next()) {
            if function.kind() == "member_expression" && ROUTE_METHODS.contains(&method) {
                let argv = syntax::named_children(arguments);
                let path = argv
                    .first()
                    .filter(|a| a.kind() == "string")
                    .map(|a| text(*a, source).trim_matches(['"', '\'', '`']).to_string());
                if let Some(path) = path.filter(|p| p.starts_with('/')) {
                    for handler in argv.iter().skip(1).filter(|a| a.kind() == "identifier") {
                        self.routes
                            .push((text(*handler, source).to_string(), path.clone(), method.to_uppercase()));
                    }
                }
            }
        }
    }
}

/// `private` / `protected` / `public` on a TypeScript member.
fn accessibility(node: Node, source: &str) -> Option<Visibility> {
    let modifier = syntax::named_children(node)
        .into_iter()
        .find(|c| c.kind() == "accessibility_modifier")?;
    match text(modifier, source) {
        "private" => Some(Visibility::Private),
        "protected" => Some(Visibility::Protected),
        _ => Some(Visibility::Public),
    }
}

/// Declared type of a member or function result, without the leading `:`.
fn type_annotation(node: Node, source: &str) -> Option<String> {
    let annotation = node
        .child_by_field_name("return_type")
        .or_else(|| node.child_by_field_name("type"))?;
    let ty = text(annotation, source).trim_start_matches(':').trim();
    (!ty.is_empty()).then(|| ty.to_string())
}

fn require_target(value: Node, source: &str) -> Option<String> {
    let value = if value.kind() == "await_expression" { value.named_child(0)? } else { value };
    if value.kind() != "call_expression" {
        return None;
    }
    if syntax::field_text(value, "function", source)? != "require" {
        return None;
    }
    let args = value.child_by_field_name("arguments")?;
    let first = args.named_child(0).filter(|a| a.kind() == "string")?;
    Some(text(first, source).trim_matches(['"', '\'', '`']).to_string())
}

impl LanguageAdapter for JavaScriptAdapter {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    fn parse(&self, path: &str, content: &str, options: &ParseOptions) -> Result<ParseResult> {
        extract(Language::JavaScript, tree_sitter_javascript::LANGUAGE.into(), path, content, options)
    }
}

/// Walk a JavaScript-family tree into a parse result.
pub(super) fn extract(
    language: Language,
    grammar: tree_sitter::Language,
    path: &str,
    content: &str,
    options: &ParseOptions,
) -> Result<ParseResult> {
    let tree = syntax::parse_tree(grammar, path, content, options.parse_timeout)?;
    let root = tree.root_node();

    let mut ex = FileExtractor::new(language, path, content, 1.0);
    syntax::report_syntax_errors(root, &mut ex);

    let mut walker = Walker {
        ex: &mut ex,
        source: content,
        routes: Vec::new(),
    };
    walker.walk(root, false);
    let routes = std::mem::take(&mut walker.routes);

    for (handler, path, method) in routes {
        if let Some(id) = ex.find_callable(&handler) {
            let symbol = ex.symbol_mut(id);
            symbol.semantic_tags.insert(format!("route:{}", path));
            if method != "USE" && method != "ALL" {
                symbol.language_features.insert("http_method".to_string(), method);
            }
        }
    }
    Ok(ex.finish(options))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> ParseResult {
        JavaScriptAdapter::new()
            .parse("web/src/orders.js", source, &ParseOptions::default())
            .unwrap()
    }

    #[test]
    fn test_classes_functions_and_imports() {
        let source = r#"
import axios from 'axios';
const db = require('./db');

export class OrderClient extends BaseClient {
    constructor(base) {
        super(base);
    }

    async fetchOrder(id) {
        const order = await this.http.get(id);
        return normalize(order);
    }
}

export const normalize = (order) => ({ ...order });

function helper(a, b) {
    return a + b;
}
"#;
        let result = parse(source);

        let class = result.symbol_named("OrderClient").unwrap();
        assert_eq!(class.qualified_name, "web.src.orders.OrderClient");
        assert!(class.is_exported);
        assert_eq!(result.symbol_named("constructor").unwrap().kind, SymbolKind::Constructor);

        let fetch = result.symbol_named("fetchOrder").unwrap();
        assert!(fetch.is_async);
        assert_eq!(fetch.parameters, vec!["id"]);
        assert_eq!(fetch.parent_symbol_id, Some(class.id));

        let normalize = result.symbol_named("normalize").unwrap();
        assert_eq!(normalize.kind, SymbolKind::Function);
        assert!(normalize.is_exported);
        assert!(!result.symbol_named("helper").unwrap().is_exported);

        let call = result
            .relationships
            .iter()
            .find(|r| r.target_name.as_deref() == Some("normalize"))
            .unwrap();
        assert_eq!(call.from_symbol_id, fetch.id);
        assert_eq!(call.metadata_strings("args"), vec!["order"]);

        let imports: Vec<_> = result
            .relationships
            .iter()
            .filter(|r| r.kind == RelationshipKind::Imports)
            .filter_map(|r| r.target_name.as_deref())
            .collect();
        assert_eq!(imports, vec!["axios", "./db"]);
        assert!(result.relationships.iter().any(|r| r.kind == RelationshipKind::Inherits
            && r.target_name.as_deref() == Some("BaseClient")));
    }

    #[test]
    fn test_express_routes_tag_handlers() {
        let source = "function listUsers(req, res) {\n  res.json([]);\n}\napp.get('/api/users', listUsers);\n";
        let result = parse(source);
        let handler = result.symbol_named("listUsers").unwrap();
        assert!(handler.semantic_tags.contains("route:/api/users"));
    }
}
