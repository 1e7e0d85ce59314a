//! Python language adapter
//!
//! Extracts symbols from Python source files using tree-sitter.

use super::extract::{FileExtractor, parameter_names};
use super::framework::{LanguageAdapter, ParseOptions, ParseResult};
use super::syntax::{self, text};
use crate::Result;
use crate::language::Language;
use crate::relationship::RelationshipKind;
use crate::symbol::{SymbolKind, Visibility};
use tree_sitter::Node;

/// Decorator methods that register an HTTP route (`@app.get("/x")`).
const ROUTE_DECORATORS: &[&str] = &["route", "get", "post", "put", "delete", "patch", "api_route", "websocket"];

/// Python language adapter
#[derive(Debug, Default)]
pub struct PythonAdapter;

impl PythonAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Walk the AST and extract all symbols
    fn walk_tree(&self, node: Node, ex: &mut FileExtractor) {
        for child in syntax::named_children(node) {
            match child.kind() {
                "function_definition" => self.extract_function(child, ex, &[]),
                "class_definition" => self.extract_class(child, ex, &[]),
                "decorated_definition" => {
                    let decorators: Vec<Node> = syntax::named_children(child)
                        .into_iter()
                        .filter(|n| n.kind() == "decorator")
                        .collect();
                    for decorator in &decorators {
                        self.walk_tree(*decorator, ex);
                    }
                    match child.child_by_field_name("definition") {
                        Some(def) if def.kind() == "function_definition" => self.extract_function(def, ex, &decorators),
                        Some(def) if def.kind() == "class_definition" => self.extract_class(def, ex, &decorators),
                        _ => {}
                    }
                }
                "import_statement" | "import_from_statement" => self.extract_import(child, ex),
                "assignment" => {
                    self.extract_assignment(child, ex);
                    self.walk_tree(child, ex);
                }
                "call" => {
                    self.extract_call(child, ex);
                    self.walk_tree(child, ex);
                }
                _ => self.walk_tree(child, ex),
            }
        }
    }

    fn extract_function(&self, node: Node, ex: &mut FileExtractor, decorators: &[Node]) {
        let source = ex.source();
        let Some(name) = syntax::field_text(node, "name", source) else {
            return;
        };
        let in_class = ex.current_scope_kind() == SymbolKind::Class;
        let kind = match (in_class, name) {
            (true, "__init__") => SymbolKind::Constructor,
            (true, _) => SymbolKind::Method,
            (false, _) => SymbolKind::Function,
        };
        let at_module = ex.current_scope() == ex.module_id();

        let id = ex.add_symbol(kind, name, syntax::span(node));
        let params = syntax::field_text(node, "parameters", source).unwrap_or("()");
        let return_type = syntax::field_text(node, "return_type", source).map(str::to_string);

        let symbol = ex.symbol_mut(id);
        symbol.parameters = parameter_names(params);
        symbol.signature = Some(match &return_type {
            Some(ret) => format!("def {}{} -> {}", name, params, ret),
            None => format!("def {}{}", name, params),
        });
        symbol.return_type = return_type;
        symbol.is_async = syntax::has_token(node, "async");
        symbol.visibility = visibility(name);
        symbol.is_exported = at_module && !name.starts_with('_');
        if let Some(doc) = docstring(node, source) {
            symbol.language_features.insert("docstring".to_string(), doc);
        }
        if name.starts_with("test_") {
            symbol.semantic_tags.insert("test".to_string());
        }
        for decorator in decorators {
            apply_decorator(symbol, *decorator, source);
        }

        ex.enter(id);
        if let Some(body) = node.child_by_field_name("body") {
            self.walk_tree(body, ex);
        }
        ex.exit();
    }

    fn extract_class(&self, node: Node, ex: &mut FileExtractor, decorators: &[Node]) {
        let source = ex.source();
        let Some(name) = syntax::field_text(node, "name", source) else {
            return;
        };
        let at_module = ex.current_scope() == ex.module_id();
        let bases: Vec<Node> = node
            .child_by_field_name("superclasses")
            .map(syntax::named_children)
            .unwrap_or_default()
            .into_iter()
            .filter(|b| matches!(b.kind(), "identifier" | "attribute"))
            .collect();
        let base_names: Vec<&str> = bases.iter().map(|b| text(*b, source)).collect();
        let kind = if base_names.iter().any(|b| *b == "Protocol" || b.ends_with(".Protocol")) {
            SymbolKind::Interface
        } else {
            SymbolKind::Class
        };

        let id = ex.add_symbol(kind, name, syntax::span(node));
        let symbol = ex.symbol_mut(id);
        symbol.visibility = visibility(name);
        symbol.is_exported = at_module && !name.starts_with('_');
        symbol.is_abstract = base_names.iter().any(|b| matches!(*b, "ABC" | "abc.ABC"));
        if let Some(doc) = docstring(node, source) {
            symbol.language_features.insert("docstring".to_string(), doc);
        }
        for decorator in decorators {
            apply_decorator(symbol, *decorator, source);
        }

        for (base, base_name) in bases.iter().zip(&base_names) {
            if matches!(*base_name, "object" | "ABC" | "abc.ABC" | "Protocol" | "typing.Protocol") {
                continue;
            }
            ex.add_reference_from(id, RelationshipKind::Inherits, base_name, syntax::line(*base), syntax::column(*base));
        }

        ex.enter(id);
        if let Some(body) = node.child_by_field_name("body") {
            self.walk_tree(body, ex);
        }
        ex.exit();
    }

    /// Module constants/variables and class fields.
    fn extract_assignment(&self, node: Node, ex: &mut FileExtractor) {
        let scope = ex.current_scope_kind();
        if !matches!(scope, SymbolKind::Module | SymbolKind::Class | SymbolKind::Interface) {
            return;
        }
        let source = ex.source();
        let Some(left) = node.child_by_field_name("left").filter(|l| l.kind() == "identifier") else {
            return;
        };
        let name = text(left, source);
        let kind = match scope {
            SymbolKind::Module if name.chars().all(|c| c.is_uppercase() || c == '_' || c.is_ascii_digit()) => {
                SymbolKind::Constant
            }
            SymbolKind::Module => SymbolKind::Variable,
            _ => SymbolKind::Field,
        };
        let id = ex.add_symbol(kind, name, syntax::span(node));
        let symbol = ex.symbol_mut(id);
        symbol.visibility = visibility(name);
        symbol.is_exported = scope == SymbolKind::Module && !name.starts_with('_');
        if let Some(ty) = syntax::field_text(node, "type", source) {
            symbol.return_type = Some(ty.to_string());
        }
    }

    fn extract_import(&self, node: Node, ex: &mut FileExtractor) {
        let source = ex.source();
        match node.kind() {
            "import_statement" => {
                // import foo, bar.baz as b
                for child in syntax::named_children(node) {
                    let target = match child.kind() {
                        "dotted_name" => child,
                        "aliased_import" => match child.child_by_field_name("name") {
                            Some(n) => n,
                            None => continue,
                        },
                        _ => continue,
                    };
                    ex.add_reference(RelationshipKind::Imports, text(target, source), syntax::line(child), syntax::column(child));
                }
            }
            "import_from_statement" => {
                // from foo import bar, baz
                let module = syntax::field_text(node, "module_name", source)
                    .unwrap_or("")
                    .trim_start_matches('.');
                let names: Vec<Node> = syntax::named_children(node)
                    .into_iter()
                    .filter(|c| c.start_byte() > node.child_by_field_name("module_name").map(|m| m.end_byte()).unwrap_or(0))
                    .collect();
                let mut any = false;
                for child in names {
                    let name = match child.kind() {
                        "dotted_name" => text(child, source),
                        "aliased_import" => syntax::field_text(child, "name", source).unwrap_or(""),
                        _ => continue,
                    };
                    if name.is_empty() {
                        continue;
                    }
                    let target = if module.is_empty() { name.to_string() } else { format!("{}.{}", module, name) };
                    ex.add_reference(RelationshipKind::Imports, &target, syntax::line(child), syntax::column(child));
                    any = true;
                }
                if !any && !module.is_empty() {
                    ex.add_reference(RelationshipKind::Imports, module, syntax::line(node), syntax::column(node));
                }
            }
            _ => {}
        }
    }

    fn extract_call(&self, node: Node, ex: &mut FileExtractor) {
        let source = ex.source();
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };
        if !matches!(function.kind(), "identifier" | "attribute") {
            return;
        }
        let args = node
            .child_by_field_name("arguments")
            .map(|a| syntax::call_arguments(a, source))
            .unwrap_or_default();
        let assigned = syntax::assigned_variable(node, source);
        ex.add_call(text(function, source), syntax::line(node), syntax::column(node), args, assigned);
    }
}

impl LanguageAdapter for PythonAdapter {
    fn language(&self) -> Language {
        Language::Python
    }

    fn parse(&self, path: &str, content: &str, options: &ParseOptions) -> Result<ParseResult> {
        let tree = syntax::parse_tree(tree_sitter_python::LANGUAGE.into(), path, content, options.parse_timeout)?;
        let root = tree.root_node();

        let mut ex = FileExtractor::new(Language::Python, path, content, 1.0);
        syntax::report_syntax_errors(root, &mut ex);
        self.walk_tree(root, &mut ex);
        Ok(ex.finish(options))
    }
}

fn visibility(name: &str) -> Visibility {
    if name.starts_with("__") && !name.ends_with("__") {
        Visibility::Private
    } else if name.starts_with('_') && !name.starts_with("__") {
        Visibility::Protected
    } else {
        Visibility::Public
    }
}

/// Extract docstring from a node
fn docstring(node: Node, source: &str) -> Option<String> {
    let body = node.child_by_field_name("body")?;
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let expr = first.named_child(0)?;
    if expr.kind() != "string" {
        return None;
    }
    let doc = text(expr, source).trim_matches(|c| c == '"' || c == '\'').trim();
    let first_line = doc.lines().next().unwrap_or("").trim();
    (!first_line.is_empty()).then(|| first_line.to_string())
}

/// Record a decorator as a tag; route decorators also yield `route:<path>`.
fn apply_decorator(symbol: &mut crate::symbol::Symbol, decorator: Node, source: &str) {
    let raw = text(decorator, source).trim_start_matches('@').trim();
    let callee = raw.split('(').next().unwrap_or(raw).trim();
    symbol.semantic_tags.insert(format!("decorator:{}", callee));

    match crate::qualified::simple_name(callee) {
        "abstractmethod" => symbol.is_abstract = true,
        "staticmethod" => {
            symbol.language_features.insert("static".to_string(), "true".to_string());
        }
        "property" => {
            symbol.language_features.insert("property".to_string(), "true".to_string());
        }
        "fixture" => {
            symbol.semantic_tags.insert("test".to_string());
        }
        method if ROUTE_DECORATORS.contains(&method) && callee.contains('.') => {
            if let Some(path) = first_string_argument(raw) {
                symbol.semantic_tags.insert(format!("route:{}", path));
                if method != "route" && method != "api_route" {
                    symbol.language_features.insert("http_method".to_string(), method.to_uppercase());
                }
            }
        }
        _ => {}
    }
}

fn first_string_argument(call: &str) -> Option<String> {
    let open = call.find('(')?;
    let rest = call[open + 1..].trim_start();
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let inner = &rest[1..];
    let close = inner.find(quote)?;
    Some(inner[..close].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> ParseResult {
        PythonAdapter::new()
            .parse("shop/orders.py", source, &ParseOptions::default())
            .unwrap()
    }

    #[test]
    fn test_classes_methods_and_calls() {
        let source = r#"
import logging
from shop.models import Order, Customer

class OrderService(BaseService):
    """Places orders."""

    def __init__(self, repo):
        self.repo = repo

    async def place(self, order, qty=1):
        total = compute_total(order, qty)
        return await self.repo.save(total)
"#;
        let result = parse(source);

        let class = result.symbol_named("OrderService").unwrap();
        assert_eq!(class.qualified_name, "shop.orders.OrderService");
        assert_eq!(class.language_features.get("docstring").map(String::as_str), Some("Places orders."));
        assert!(class.is_exported);

        let init = result.symbol_named("__init__").unwrap();
        assert_eq!(init.kind, SymbolKind::Constructor);

        let place = result.symbol_named("place").unwrap();
        assert_eq!(place.kind, SymbolKind::Method);
        assert!(place.is_async);
        assert_eq!(place.parameters, vec!["order", "qty"]);
        assert_eq!(place.parent_symbol_id, Some(class.id));

        let compute = result
            .relationships
            .iter()
            .find(|r| r.target_name.as_deref() == Some("compute_total"))
            .unwrap();
        assert_eq!(compute.from_symbol_id, place.id);
        assert_eq!(compute.metadata_strings("args"), vec!["order", "qty"]);
        assert_eq!(compute.metadata_str("assigned_to"), Some("total"));

        assert!(result.relationships.iter().any(|r| r.kind == RelationshipKind::Inherits
            && r.target_name.as_deref() == Some("BaseService")));
        assert!(result.relationships.iter().any(|r| r.kind == RelationshipKind::Imports
            && r.target_name.as_deref() == Some("shop.models.Order")));
        assert!(!result.stats.used_fallback);
        assert!(!result.stats.has_errors());
    }

    #[test]
    fn test_route_decorator_tags() {
        let source = "@app.get(\"/api/orders\")\ndef list_orders():\n    return []\n";
        let result = parse(source);
        let handler = result.symbol_named("list_orders").unwrap();
        assert!(handler.semantic_tags.contains("route:/api/orders"));
        assert_eq!(handler.language_features.get("http_method").map(String::as_str), Some("GET"));
    }

    #[test]
    fn test_syntax_error_gives_partial_result() {
        let source = "def ok(a):\n    return a\n\ndef broken(:\n    pass\n";
        let result = parse(source);
        assert!(result.stats.has_errors());
        let ok = result.symbol_named("ok").unwrap();
        assert_eq!(ok.confidence, 1.0);
    }

    #[test]
    fn test_constants_and_fields() {
        let source = "MAX_RETRIES = 3\nclass Config:\n    timeout = 30\n";
        let result = parse(source);
        assert_eq!(result.symbol_named("MAX_RETRIES").unwrap().kind, SymbolKind::Constant);
        assert_eq!(result.symbol_named("timeout").unwrap().kind, SymbolKind::Field);
    }
}
