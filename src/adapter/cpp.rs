//! C++ language adapter
//!
//! Namespaces, classes and structs become scopes. Member access follows the
//! `public:`/`private:` sections (classes default to private, structs to
//! public). Out-of-class definitions such as `void Order::total()` attach to
//! the class when it is declared in the same file and are otherwise
//! qualified by the written owner.

use super::extract::FileExtractor;
use super::framework::{LanguageAdapter, ParseOptions, ParseResult};
use super::syntax::{self, text};
use crate::Result;
use crate::language::Language;
use crate::relationship::RelationshipKind;
use crate::symbol::{Symbol, SymbolKind, Visibility};
use tree_sitter::Node;

#[derive(Debug, Default)]
pub struct CppAdapter;

impl CppAdapter {
    pub fn new() -> Self {
        Self
    }

    /// `access` is the active member visibility inside a class body.
    fn walk(&self, node: Node, ex: &mut FileExtractor, access: Option<Visibility>) {
        for child in syntax::named_children(node) {
            self.visit(child, ex, access);
        }
    }

    fn visit(&self, node: Node, ex: &mut FileExtractor, access: Option<Visibility>) {
        let source = ex.source();
        match node.kind() {
            "namespace_definition" => {
                let body = node.child_by_field_name("body");
                match syntax::field_text(node, "name", source) {
                    Some(name) => {
                        let id = ex.add_symbol(SymbolKind::Namespace, name, syntax::span(node));
                        ex.enter(id);
                        if let Some(body) = body {
                            self.walk(body, ex, None);
                        }
                        ex.exit();
                    }
                    // Anonymous namespace
                    None => {
                        if let Some(body) = body {
                            self.walk(body, ex, None);
                        }
                    }
                }
            }
            "class_specifier" | "struct_specifier" if node.child_by_field_name("body").is_some() => {
                self.class(node, ex, access)
            }
            "enum_specifier" if node.child_by_field_name("body").is_some() => {
                if let Some(name) = syntax::field_text(node, "name", source) {
                    let id = ex.add_symbol(SymbolKind::Enum, type_name(name), syntax::span(node));
                    ex.symbol_mut(id).visibility = access.unwrap_or_default();
                }
            }
            "function_definition" => self.function(node, ex, access),
            "field_declaration" => self.member(node, ex, access),
            "declaration" if access.is_some() => self.member(node, ex, access),
            "preproc_include" => {
                if let Some(path) = syntax::field_text(node, "path", source) {
                    ex.add_reference(
                        RelationshipKind::Imports,
                        path.trim_matches(['"', '<', '>']),
                        syntax::line(node),
                        syntax::column(node),
                    );
                }
            }
            "linkage_specification" => {
                if let Some(body) = node.child_by_field_name("body") {
                    self.visit(body, ex, access);
                }
            }
            "template_declaration" | "declaration_list" | "preproc_if" | "preproc_ifdef" | "preproc_else"
            | "preproc_elif" => self.walk(node, ex, access),
            // Top-level initializers
            "declaration" => self.body(node, ex),
            _ => {}
        }
    }

    fn class(&self, node: Node, ex: &mut FileExtractor, access: Option<Visibility>) {
        let source = ex.source();
        let Some(name) = syntax::field_text(node, "name", source) else {
            return;
        };
        let is_struct = node.kind() == "struct_specifier";
        let kind = if is_struct { SymbolKind::Struct } else { SymbolKind::Class };
        let id = ex.add_symbol(kind, type_name(name), syntax::span(node));
        ex.symbol_mut(id).visibility = access.unwrap_or_default();

        if let Some(clause) = syntax::named_children(node)
            .into_iter()
            .find(|c| c.kind() == "base_class_clause")
        {
            for base in syntax::named_children(clause) {
                if !matches!(base.kind(), "type_identifier" | "qualified_identifier" | "template_type") {
                    continue;
                }
                let base_name = crate::qualified::simple_name(type_name(text(base, source)));
                ex.add_reference_from(
                    id,
                    RelationshipKind::Inherits,
                    base_name,
                    syntax::line(base),
                    syntax::column(base),
                );
            }
        }

        let Some(body) = node.child_by_field_name("body") else { return };
        let mut current = if is_struct { Visibility::Public } else { Visibility::Private };
        ex.enter(id);
        for member in syntax::named_children(body) {
            if member.kind() == "access_specifier" {
                current = match text(member, source).trim_end_matches(':').trim() {
                    "public" => Visibility::Public,
                    "protected" => Visibility::Protected,
                    _ => Visibility::Private,
                };
                continue;
            }
            self.visit(member, ex, Some(current));
        }
        ex.exit();
        if syntax::named_children(node)
            .into_iter()
            .any(|c| c.kind() == "virtual_specifier" && text(c, source) == "final")
        {
            ex.symbol_mut(id)
                .language_features
                .insert("final".to_string(), "true".to_string());
        }
    }

    /// Member declared inside a class body: a data member or a method
    /// declaration without a body.
    fn member(&self, node: Node, ex: &mut FileExtractor, access: Option<Visibility>) {
        let source = ex.source();
        let Some(declarator) = node.child_by_field_name("declarator") else {
            return;
        };
        let declarator = unwrap_declarator(declarator);
        let visibility = access.unwrap_or_default();

        if declarator.kind() == "function_declarator" {
            let Some(name) = declarator.child_by_field_name("declarator").map(|d| text(d, source)) else {
                return;
            };
            let kind = member_kind(ex, name);
            let id = ex.add_symbol(kind, name, syntax::span(node));
            let squashed: String = text(node, source).split_whitespace().collect();
            set_function_details(ex.symbol_mut(id), node, declarator, name, source);
            let symbol = ex.symbol_mut(id);
            symbol.visibility = visibility;
            symbol.is_abstract = squashed.ends_with("=0;");
            return;
        }

        let name = text(declarator, source).trim_start_matches(['*', '&']);
        let name = name.split(['[', '=', '{']).next().unwrap_or(name).trim();
        if !syntax::is_identifier(name) {
            return;
        }
        let id = ex.add_symbol(SymbolKind::Field, name, syntax::span(node));
        let is_static = has_storage_class(node, "static", source);
        let symbol = ex.symbol_mut(id);
        symbol.visibility = visibility;
        symbol.return_type = syntax::field_text(node, "type", source).map(str::to_string);
        if is_static {
            symbol.language_features.insert("static".to_string(), "true".to_string());
        }
    }

    fn function(&self, node: Node, ex: &mut FileExtractor, access: Option<Visibility>) {
        let source = ex.source();
        let Some(declarator) = node.child_by_field_name("declarator").map(unwrap_declarator) else {
            return;
        };
        if declarator.kind() != "function_declarator" {
            return;
        }
        let Some(name_node) = declarator.child_by_field_name("declarator") else {
            return;
        };
        let written = text(name_node, source);
        // `ns::Order::total` -> owner `ns::Order`, name `total`
        let (owner, name) = match (name_node.kind(), written.rsplit_once("::")) {
            ("qualified_identifier", Some((owner, name))) => (Some(owner.trim()), name.trim()),
            _ => (None, written),
        };
        let name = type_name(name);
        let span = syntax::span(node);

        let id = match owner {
            Some(owner) => {
                let owner_name = crate::qualified::simple_name(type_name(owner));
                let kind = if owner_name == name { SymbolKind::Constructor } else { SymbolKind::Method };
                match ex.find_type(owner_name) {
                    Some(owner_id) => ex.add_symbol_under(kind, name, span, owner_id),
                    None => {
                        let mut qualified = ex.current_qualified().clone();
                        for segment in owner.split("::").map(|s| type_name(s.trim())) {
                            qualified = qualified.child(segment);
                        }
                        let qualified = qualified.child(name);
                        let parent = ex.current_scope();
                        let id = ex.add_symbol_qualified(kind, name, span, parent, qualified);
                        ex.symbol_mut(id)
                            .language_features
                            .insert("impl_for".to_string(), owner_name.to_string());
                        id
                    }
                }
            }
            None if access.is_some() => {
                let kind = member_kind(ex, name);
                ex.add_symbol(kind, name, span)
            }
            None => ex.add_symbol(SymbolKind::Function, name, span),
        };

        set_function_details(ex.symbol_mut(id), node, declarator, name, source);
        let is_static = has_storage_class(node, "static", source);
        let symbol = ex.symbol_mut(id);
        if let Some(access) = access {
            symbol.visibility = access;
        } else if is_static && owner.is_none() {
            // File-local linkage
            symbol.visibility = Visibility::Internal;
        }
        symbol.is_abstract = syntax::named_children(node)
            .into_iter()
            .any(|c| c.kind() == "pure_virtual_clause");
        if name == "main" && owner.is_none() && access.is_none() {
            symbol.semantic_tags.insert("entrypoint".to_string());
        }

        if let Some(body) = node.child_by_field_name("body") {
            ex.enter(id);
            self.body(body, ex);
            ex.exit();
        }
    }

    fn body(&self, node: Node, ex: &mut FileExtractor) {
        for child in syntax::named_children(node) {
            match child.kind() {
                "call_expression" => {
                    self.call(child, ex);
                    self.body(child, ex);
                }
                "new_expression" => {
                    let source = ex.source();
                    if let Some(ty) = syntax::field_text(child, "type", source) {
                        let args = child
                            .child_by_field_name("arguments")
                            .map(|a| syntax::call_arguments(a, source))
                            .unwrap_or_default();
                        let assigned = syntax::assigned_variable(child, source);
                        ex.add_call(type_name(ty), syntax::line(child), syntax::column(child), args, assigned);
                    }
                    self.body(child, ex);
                }
                _ => self.body(child, ex),
            }
        }
    }

    fn call(&self, node: Node, ex: &mut FileExtractor) {
        let source = ex.source();
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };
        if !matches!(
            function.kind(),
            "identifier" | "qualified_identifier" | "field_expression" | "template_function"
        ) {
            return;
        }
        let target = type_name(text(function, source)).replace("->", ".");
        let args = node
            .child_by_field_name("arguments")
            .map(|a| syntax::call_arguments(a, source))
            .unwrap_or_default();
        let assigned = syntax::assigned_variable(node, source);
        ex.add_call(&target, syntax::line(node), syntax::column(node), args, assigned);
    }
}

impl LanguageAdapter for CppAdapter {
    fn language(&self) -> Language {
        Language::Cpp
    }

    fn parse(&self, path: &str, content: &str, options: &ParseOptions) -> Result<ParseResult> {
        let tree = syntax::parse_tree(tree_sitter_cpp::LANGUAGE.into(), path, content, options.parse_timeout)?;
        let root = tree.root_node();

        let mut ex = FileExtractor::new(Language::Cpp, path, content, 1.0);
        syntax::report_syntax_errors(root, &mut ex);
        self.walk(root, &mut ex, None);
        Ok(ex.finish(options))
    }
}

/// Constructor when the name matches the enclosing class.
fn member_kind(ex: &FileExtractor, name: &str) -> SymbolKind {
    let scope = ex.symbol(ex.current_scope());
    if scope.kind.is_type() && scope.name == name {
        SymbolKind::Constructor
    } else {
        SymbolKind::Method
    }
}

/// Look through `*`, `&` and `&&` declarators to the named one.
fn unwrap_declarator(mut node: Node) -> Node {
    loop {
        let inner = match node.kind() {
            "pointer_declarator" => node.child_by_field_name("declarator"),
            "reference_declarator" => syntax::named_children(node).into_iter().next(),
            _ => None,
        };
        match inner {
            Some(inner) => node = inner,
            None => return node,
        }
    }
}

/// `Repo<T>` -> `Repo`
fn type_name(name: &str) -> &str {
    name.split('<').next().unwrap_or(name).trim()
}

fn has_storage_class(node: Node, class: &str, source: &str) -> bool {
    syntax::named_children(node)
        .into_iter()
        .any(|c| c.kind() == "storage_class_specifier" && text(c, source) == class)
}

fn set_function_details(symbol: &mut Symbol, node: Node, declarator: Node, name: &str, source: &str) {
    let params = declarator.child_by_field_name("parameters");
    symbol.parameters = params.map(|p| parameter_names(p, source)).unwrap_or_default();
    let params_text = params.map(|p| text(p, source)).unwrap_or("()");
    let return_type = syntax::field_text(node, "type", source).map(str::to_string);
    symbol.signature = Some(match &return_type {
        Some(ret) => format!("{} {}{}", ret, name, params_text),
        None => format!("{}{}", name, params_text),
    });
    symbol.return_type = return_type;
    if syntax::has_token(node, "virtual") {
        symbol.language_features.insert("virtual".to_string(), "true".to_string());
    }
    for specifier in syntax::named_children(declarator)
        .into_iter()
        .filter(|c| c.kind() == "virtual_specifier")
    {
        symbol
            .language_features
            .insert(text(specifier, source).to_string(), "true".to_string());
    }
    if syntax::named_children(declarator)
        .into_iter()
        .any(|c| c.kind() == "type_qualifier" && text(c, source) == "const")
    {
        symbol.language_features.insert("const".to_string(), "true".to_string());
    }
}

/// `(const std::string& id, int* out, size_t n = 0)` -> `[id, out, n]`
fn parameter_names(params: Node, source: &str) -> Vec<String> {
    syntax::named_children(params)
        .into_iter()
        .filter(|p| matches!(p.kind(), "parameter_declaration" | "optional_parameter_declaration"))
        .filter_map(|p| {
            let declarator = unwrap_declarator(p.child_by_field_name("declarator")?);
            let name = text(declarator, source).trim_start_matches(['*', '&']);
            let name = name.split('[').next().unwrap_or(name).trim();
            syntax::is_identifier(name).then(|| name.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(path: &str, source: &str) -> ParseResult {
        CppAdapter::new().parse(path, source, &ParseOptions::default()).unwrap()
    }

    #[test]
    fn test_classes_members_and_access() {
        let source = r#"
#include <string>
#include "shape.h"

namespace geo {

class Circle : public Shape, private Named<Circle> {
public:
    Circle(double radius);
    virtual double area() const override;
    static int count;

protected:
    virtual void draw(Canvas& canvas) = 0;

private:
    double radius_;
};

struct Point {
    int x;
};

}
"#;
        let result = parse("include/geo/circle.h", source);
        assert!(!result.stats.used_fallback);

        let ns = result.symbol_named("geo").unwrap();
        assert_eq!(ns.kind, SymbolKind::Namespace);
        let circle = result.symbol_named("Circle").unwrap();
        assert_eq!(circle.kind, SymbolKind::Class);
        assert_eq!(circle.qualified_name, "geo::Circle");
        assert_eq!(circle.parent_symbol_id, Some(ns.id));

        let bases: Vec<_> = result
            .relationships
            .iter()
            .filter(|r| r.from_symbol_id == circle.id && r.kind == RelationshipKind::Inherits)
            .filter_map(|r| r.target_name.as_deref())
            .collect();
        assert_eq!(bases, vec!["Shape", "Named"]);

        let ctor = result
            .symbols
            .iter()
            .find(|s| s.kind == SymbolKind::Constructor)
            .unwrap();
        assert_eq!(ctor.name, "Circle");
        assert_eq!(ctor.parameters, vec!["radius"]);

        let area = result.symbol_named("area").unwrap();
        assert_eq!(area.qualified_name, "geo::Circle::area");
        assert_eq!(area.visibility, Visibility::Public);
        assert_eq!(area.language_features.get("override").map(String::as_str), Some("true"));
        assert!(!area.is_abstract);

        let draw = result.symbol_named("draw").unwrap();
        assert!(draw.is_abstract);
        assert_eq!(draw.visibility, Visibility::Protected);
        assert_eq!(draw.parameters, vec!["canvas"]);

        let radius = result.symbol_named("radius_").unwrap();
        assert_eq!(radius.kind, SymbolKind::Field);
        assert_eq!(radius.visibility, Visibility::Private);
        assert_eq!(
            result.symbol_named("count").unwrap().language_features.get("static").map(String::as_str),
            Some("true")
        );
        assert_eq!(result.symbol_named("x").unwrap().visibility, Visibility::Public);

        let includes: Vec<_> = result
            .relationships
            .iter()
            .filter(|r| r.kind == RelationshipKind::Imports)
            .filter_map(|r| r.target_name.as_deref())
            .collect();
        assert_eq!(includes, vec!["string", "shape.h"]);
    }

    #[test]
    fn test_out_of_class_definitions_and_calls() {
        let source = r#"
#include "circle.h"

namespace geo {

Circle::Circle(double radius) : radius_(radius) {}

double Circle::area() const {
    double r2 = square(radius_);
    return kPi * r2;
}

static void log_area(const Circle& c) {
    auto total = c.area();
    registry->record(total);
}

}

int main(int argc, char** argv) {
    auto c = new geo::Circle(2.0);
    return 0;
}
"#;
        let result = parse("src/geo/circle.cpp", source);

        let area = result.symbol_named("area").unwrap();
        assert_eq!(area.kind, SymbolKind::Method);
        assert_eq!(area.qualified_name, "geo::Circle::area");
        assert_eq!(area.language_features.get("impl_for").map(String::as_str), Some("Circle"));
        assert_eq!(area.parent_symbol_id, Some(result.symbol_named("geo").unwrap().id));

        let ctor = result
            .symbols
            .iter()
            .find(|s| s.kind == SymbolKind::Constructor)
            .unwrap();
        assert_eq!(ctor.qualified_name, "geo::Circle::Circle");

        let square = result
            .relationships
            .iter()
            .find(|r| r.target_name.as_deref() == Some("square"))
            .unwrap();
        assert_eq!(square.from_symbol_id, area.id);
        assert_eq!(square.metadata_strings("args"), vec!["radius_"]);

        let log_area = result.symbol_named("log_area").unwrap();
        assert_eq!(log_area.visibility, Visibility::Internal);
        assert_eq!(log_area.parameters, vec!["c"]);
        let targets: Vec<_> = result
            .relationships
            .iter()
            .filter(|r| r.kind == RelationshipKind::Calls && r.from_symbol_id == log_area.id)
            .filter_map(|r| r.target_name.as_deref())
            .collect();
        assert_eq!(targets, vec!["c.area", "registry.record"]);

        let main = result.symbol_named("main").unwrap();
        assert!(main.semantic_tags.contains("entrypoint"));
        assert_eq!(main.parameters, vec!["argc", "argv"]);
        assert!(result.relationships.iter().any(|r| r.from_symbol_id == main.id
            && r.target_name.as_deref() == Some("geo::Circle")));
    }
}
