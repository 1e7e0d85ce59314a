//! Go language adapter
//!
//! Names are rooted at the declared package. Type declarations are visited
//! before functions so methods can attach to their receiver type regardless
//! of declaration order; methods on a receiver from another file are still
//! qualified by the receiver type.

use super::extract::{FileExtractor, parameter_names};
use super::framework::{LanguageAdapter, ParseOptions, ParseResult};
use super::syntax::{self, text};
use crate::Result;
use crate::language::Language;
use crate::relationship::RelationshipKind;
use crate::symbol::{SymbolKind, Visibility};
use tree_sitter::Node;

#[derive(Debug, Default)]
pub struct GoAdapter;

impl GoAdapter {
    pub fn new() -> Self {
        Self
    }

    fn type_spec(&self, spec: Node, ex: &mut FileExtractor) {
        let source = ex.source();
        let Some(name) = syntax::field_text(spec, "name", source) else {
            return;
        };
        let ty = spec.child_by_field_name("type");
        let kind = if ty.is_some_and(|t| t.kind() == "interface_type") {
            SymbolKind::Interface
        } else {
            SymbolKind::Struct
        };
        let id = ex.add_symbol(kind, name, syntax::span(spec));
        {
            let symbol = ex.symbol_mut(id);
            set_exported(symbol, name);
            if let Some(ty) = ty.filter(|t| !matches!(t.kind(), "interface_type" | "struct_type")) {
                symbol.language_features.insert("underlying".to_string(), text(ty, source).to_string());
            }
        }

        let Some(ty) = ty else { return };
        ex.enter(id);
        match ty.kind() {
            "struct_type" => {
                let fields = syntax::named_children(ty)
                    .into_iter()
                    .find(|c| c.kind() == "field_declaration_list")
                    .map(syntax::named_children)
                    .unwrap_or_default();
                for field in fields.into_iter().filter(|f| f.kind() == "field_declaration") {
                    let type_text = syntax::field_text(field, "type", source).unwrap_or("");
                    let names: Vec<Node> = syntax::named_children(field)
                        .into_iter()
                        .filter(|c| c.kind() == "field_identifier")
                        .collect();
                    if names.is_empty() {
                        // Embedded type: struct composition
                        let embedded = type_text.trim_start_matches('*');
                        let rel = ex.add_reference_from(
                            id,
                            RelationshipKind::Inherits,
                            crate::qualified::simple_name(embedded),
                            syntax::line(field),
                            syntax::column(field),
                        );
                        rel.metadata.insert("embedded".to_string(), serde_json::Value::Bool(true));
                        continue;
                    }
                    for field_name in names {
                        let name = text(field_name, source);
                        let field_id = ex.add_symbol(SymbolKind::Field, name, syntax::span(field));
                        let symbol = ex.symbol_mut(field_id);
                        set_exported(symbol, name);
                        symbol.return_type = Some(type_text.to_string()).filter(|t| !t.is_empty());
                    }
                }
            }
            "interface_type" => {
                for elem in syntax::named_children(ty) {
                    match elem.kind() {
                        "method_elem" | "method_spec" => {
                            let Some(method) = syntax::field_text(elem, "name", source) else { continue };
                            let params = syntax::field_text(elem, "parameters", source).unwrap_or("()");
                            let method_id = ex.add_symbol(SymbolKind::Method, method, syntax::span(elem));
                            let symbol = ex.symbol_mut(method_id);
                            set_exported(symbol, method);
                            symbol.is_abstract = true;
                            symbol.parameters = parameter_names(params);
                            symbol.return_type = syntax::field_text(elem, "result", source).map(str::to_string);
                            symbol.signature = Some(format!("{}{}", method, params));
                        }
                        // Embedded interface
                        "type_elem" | "constraint_elem" | "type_identifier" | "qualified_type" => {
                            let embedded = text(elem, source).trim();
                            if syntax::is_identifier(crate::qualified::simple_name(embedded)) {
                                ex.add_reference_from(
                                    id,
                                    RelationshipKind::Inherits,
                                    crate::qualified::simple_name(embedded),
                                    syntax::line(elem),
                                    syntax::column(elem),
                                );
                            }
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
        ex.exit();
    }

    fn function(&self, node: Node, ex: &mut FileExtractor) {
        let source = ex.source();
        let Some(name) = syntax::field_text(node, "name", source) else {
            return;
        };
        let receiver = node
            .child_by_field_name("receiver")
            .and_then(|r| receiver_type(r, source));
        let owner = receiver.and_then(|r| ex.find_type(r));

        let kind = if receiver.is_some() { SymbolKind::Method } else { SymbolKind::Function };
        let id = match (owner, receiver) {
            (Some(owner), _) => ex.add_symbol_under(kind, name, syntax::span(node), owner),
            // Receiver declared in another file of the package
            (None, Some(receiver)) => {
                let qualified = ex.module_qualified().child(receiver).child(name);
                let module = ex.module_id();
                ex.add_symbol_qualified(kind, name, syntax::span(node), module, qualified)
            }
            (None, None) => ex.add_symbol(kind, name, syntax::span(node)),
        };

        let params = syntax::field_text(node, "parameters", source).unwrap_or("()");
        let result = syntax::field_text(node, "result", source).map(str::to_string);
        let symbol = ex.symbol_mut(id);
        set_exported(symbol, name);
        symbol.parameters = parameter_names(params);
        symbol.signature = Some(match &result {
            Some(ret) => format!("func {}{} {}", name, params, ret),
            None => format!("func {}{}", name, params),
        });
        symbol.return_type = result;
        if let Some(receiver) = receiver {
            symbol.language_features.insert("receiver".to_string(), receiver.to_string());
            if owner.is_none() {
                symbol.language_features.insert("impl_for".to_string(), receiver.to_string());
            }
        }
        if name.starts_with("Test") && params.contains("testing.T") {
            symbol.semantic_tags.insert("test".to_string());
        }

        if let Some(body) = node.child_by_field_name("body") {
            ex.enter(id);
            self.walk_body(body, ex, false);
            ex.exit();
        }
    }

    fn walk_body(&self, node: Node, ex: &mut FileExtractor, in_go: bool) {
        for child in syntax::named_children(node) {
            match child.kind() {
                "call_expression" => {
                    self.call(child, ex, in_go);
                    self.walk_body(child, ex, false);
                }
                "go_statement" => self.walk_body(child, ex, true),
                "func_literal" => self.walk_body(child, ex, false),
                _ => self.walk_body(child, ex, in_go),
            }
        }
    }

    fn call(&self, node: Node, ex: &mut FileExtractor, goroutine: bool) {
        let source = ex.source();
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };
        if !matches!(function.kind(), "identifier" | "selector_expression") {
            return;
        }
        let args = node
            .child_by_field_name("arguments")
            .map(|a| syntax::call_arguments(a, source))
            .unwrap_or_default();
        let assigned = syntax::assigned_variable(node, source);
        let target = text(function, source);
        if goroutine {
            let rel = ex.add_reference(RelationshipKind::Calls, target, syntax::line(node), syntax::column(node));
            rel.metadata.insert("goroutine".to_string(), serde_json::Value::Bool(true));
            if !args.is_empty() {
                rel.metadata.insert("args".to_string(), serde_json::json!(args));
            }
        } else {
            ex.add_call(target, syntax::line(node), syntax::column(node), args, assigned);
        }
    }

    fn import(&self, node: Node, ex: &mut FileExtractor) {
        let source = ex.source();
        let specs: Vec<Node> = match node.kind() {
            "import_spec" => vec![node],
            _ => syntax::named_children(node)
                .into_iter()
                .flat_map(|c| if c.kind() == "import_spec_list" { syntax::named_children(c) } else { vec![c] })
                .filter(|c| c.kind() == "import_spec")
                .collect(),
        };
        for spec in specs {
            if let Some(path) = syntax::field_text(spec, "path", source) {
                ex.add_reference(
                    RelationshipKind::Imports,
                    path.trim_matches(['"', '`']),
                    syntax::line(spec),
                    syntax::column(spec),
                );
            }
        }
    }
}

impl LanguageAdapter for GoAdapter {
    fn language(&self) -> Language {
        Language::Go
    }

    fn parse(&self, path: &str, content: &str, options: &ParseOptions) -> Result<ParseResult> {
        let tree = syntax::parse_tree(tree_sitter_go::LANGUAGE.into(), path, content, options.parse_timeout)?;
        let root = tree.root_node();

        let mut ex = FileExtractor::new(Language::Go, path, content, 1.0);
        syntax::report_syntax_errors(root, &mut ex);

        let top = syntax::named_children(root);
        for node in &top {
            match node.kind() {
                "package_clause" => {
                    if let Some(pkg) = syntax::named_children(*node).first() {
                        ex.set_package(text(*pkg, content));
                    }
                }
                "import_declaration" => self.import(*node, &mut ex),
                "type_declaration" => {
                    for spec in syntax::named_children(*node).into_iter().filter(|s| s.kind() == "type_spec") {
                        self.type_spec(spec, &mut ex);
                    }
                }
                _ => {}
            }
        }
        for node in &top {
            match node.kind() {
                "function_declaration" | "method_declaration" => self.function(*node, &mut ex),
                "const_declaration" | "var_declaration" => {
                    let kind = if node.kind() == "const_declaration" { SymbolKind::Constant } else { SymbolKind::Variable };
                    for spec in syntax::named_children(*node) {
                        for name in syntax::named_children(spec).into_iter().filter(|n| n.kind() == "identifier") {
                            let value = text(name, content);
                            let id = ex.add_symbol(kind, value, syntax::span(spec));
                            set_exported(ex.symbol_mut(id), value);
                        }
                        self.walk_body(spec, &mut ex, false);
                    }
                }
                _ => {}
            }
        }
        Ok(ex.finish(options))
    }
}

fn set_exported(symbol: &mut crate::symbol::Symbol, name: &str) {
    let exported = name.chars().next().is_some_and(char::is_uppercase);
    symbol.is_exported = exported;
    symbol.visibility = if exported { Visibility::Public } else { Visibility::Internal };
}

/// `(s *Server)` -> `Server`, `(l List[T])` -> `List`
fn receiver_type<'s>(receiver: Node, source: &'s str) -> Option<&'s str> {
    let param = syntax::named_children(receiver)
        .into_iter()
        .find(|c| c.kind() == "parameter_declaration")?;
    let ty = syntax::field_text(param, "type", source)?;
    let ty = ty.trim_start_matches('*');
    let ty = ty.split('[').next().unwrap_or(ty).trim();
    (!ty.is_empty()).then_some(ty)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> ParseResult {
        GoAdapter::new()
            .parse("services/checkout/server.go", source, &ParseOptions::default())
            .unwrap()
    }

    #[test]
    fn test_methods_attach_to_receiver_type() {
        let source = r#"package checkout

import (
	"context"
	pb "example.com/shop/proto"
)

func (s *Server) PlaceOrder(ctx context.Context, req *pb.Req) (*pb.Resp, error) {
	total, err := s.pricing.Quote(ctx, req)
	go s.audit(req)
	return finalize(total), err
}

type Server struct {
	Base
	pricing Pricer
}
"#;
        let result = parse(source);
        let server = result.symbol_named("Server").unwrap();
        assert_eq!(server.qualified_name, "checkout.Server");

        let place = result.symbol_named("PlaceOrder").unwrap();
        assert_eq!(place.qualified_name, "checkout.Server.PlaceOrder");
        assert_eq!(place.kind, SymbolKind::Method);
        assert_eq!(place.parameters, vec!["ctx", "req"]);
        assert!(place.is_exported);

        let quote = result
            .relationships
            .iter()
            .find(|r| r.target_name.as_deref() == Some("s.pricing.Quote"))
            .unwrap();
        assert_eq!(quote.from_symbol_id, place.id);
        assert_eq!(quote.metadata_str("assigned_to"), Some("total"));
        assert_eq!(quote.metadata_strings("args"), vec!["ctx", "req"]);

        let audit = result
            .relationships
            .iter()
            .find(|r| r.target_name.as_deref() == Some("s.audit"))
            .unwrap();
        assert_eq!(audit.metadata.get("goroutine"), Some(&serde_json::Value::Bool(true)));

        assert!(result.relationships.iter().any(|r| r.kind == RelationshipKind::Inherits
            && r.target_name.as_deref() == Some("Base")));
        let imports: Vec<_> = result
            .relationships
            .iter()
            .filter(|r| r.kind == RelationshipKind::Imports)
            .filter_map(|r| r.target_name.as_deref())
            .collect();
        assert_eq!(imports, vec!["context", "example.com/shop/proto"]);
        assert_eq!(result.symbol_named("pricing").unwrap().visibility, Visibility::Internal);
    }

    #[test]
    fn test_foreign_receivers_keep_distinct_names() {
        let source = r#"package shop

func (o *Order) Close() error { return nil }

func (c Cart) Close() error { return nil }
"#;
        let result = GoAdapter::new()
            .parse("shop/close.go", source, &ParseOptions::default())
            .unwrap();

        let closes: Vec<_> = result.symbols.iter().filter(|s| s.name == "Close").collect();
        assert_eq!(closes.len(), 2);
        assert_eq!(closes[0].qualified_name, "shop.Order.Close");
        assert_eq!(closes[1].qualified_name, "shop.Cart.Close");
        assert_eq!(closes[0].language_features.get("impl_for").map(String::as_str), Some("Order"));
        assert_eq!(closes[0].parent_symbol_id, Some(result.symbols[0].id));
    }

    #[test]
    fn test_module_symbol_is_per_file() {
        let result = parse("package checkout

type Server struct{}
");
        let module = &result.symbols[0];
        assert_eq!(module.kind, SymbolKind::Module);
        assert_eq!(module.name, "checkout");
        assert_eq!(module.qualified_name, "services/checkout/server.go");
        assert_eq!(result.symbol_named("Server").unwrap().qualified_name, "checkout.Server");
    }

    #[test]
    fn test_interface_methods_are_abstract() {
        let source = "package store\n\ntype Repo interface {\n\tLoad(id string) (Item, error)\n}\n";
        let result = parse(source);
        let repo = result.symbol_named("Repo").unwrap();
        assert_eq!(repo.kind, SymbolKind::Interface);
        let load = result.symbol_named("Load").unwrap();
        assert!(load.is_abstract);
        assert_eq!(load.parent_symbol_id, Some(repo.id));
    }
}
