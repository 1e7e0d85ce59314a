//! Rust language adapter
//!
//! Walks items in declaration order, except that `impl` blocks are visited
//! after the types of the same module so methods attach to their type.

use super::extract::{FileExtractor, parameter_names};
use super::framework::{LanguageAdapter, ParseOptions, ParseResult};
use super::syntax::{self, text};
use crate::Result;
use crate::language::Language;
use crate::relationship::RelationshipKind;
use crate::symbol::{SymbolId, SymbolKind, Visibility};
use tree_sitter::Node;

const ROUTE_ATTRIBUTES: &[&str] = &["get", "post", "put", "delete", "patch", "route"];

#[derive(Debug, Default)]
pub struct RustAdapter;

impl RustAdapter {
    pub fn new() -> Self {
        Self
    }

    fn walk_items(&self, container: Node, ex: &mut FileExtractor) {
        let items = syntax::named_children(container);
        for item in items.iter().filter(|i| i.kind() != "impl_item") {
            self.item(*item, ex);
        }
        for item in items.iter().filter(|i| i.kind() == "impl_item") {
            self.impl_block(*item, ex);
        }
    }

    fn item(&self, node: Node, ex: &mut FileExtractor) {
        let source = ex.source();
        match node.kind() {
            "function_item" | "function_signature_item" => {
                self.function(node, ex);
            }
            "struct_item" | "union_item" => {
                let Some(id) = self.named_item(node, SymbolKind::Struct, ex) else {
                    return;
                };
                if let Some(body) = node.child_by_field_name("body") {
                    ex.enter(id);
                    for field in syntax::named_children(body).into_iter().filter(|f| f.kind() == "field_declaration") {
                        if let Some(name) = syntax::field_text(field, "name", source) {
                            let field_id = ex.add_symbol(SymbolKind::Field, name, syntax::span(field));
                            let symbol = ex.symbol_mut(field_id);
                            symbol.visibility = visibility(field, source);
                            symbol.return_type = syntax::field_text(field, "type", source).map(str::to_string);
                        }
                    }
                    ex.exit();
                }
            }
            "enum_item" => {
                self.named_item(node, SymbolKind::Enum, ex);
            }
            "trait_item" => {
                let Some(id) = self.named_item(node, SymbolKind::Trait, ex) else {
                    return;
                };
                if let Some(bounds) = node.child_by_field_name("bounds") {
                    for bound in syntax::named_children(bounds) {
                        let name = text(bound, source);
                        if matches!(bound.kind(), "type_identifier" | "scoped_type_identifier" | "generic_type")
                            && name != "Sized"
                        {
                            ex.add_reference_from(id, RelationshipKind::Inherits, base_type_name(name), syntax::line(bound), syntax::column(bound));
                        }
                    }
                }
                if let Some(body) = node.child_by_field_name("body") {
                    ex.enter(id);
                    self.walk_items(body, ex);
                    ex.exit();
                }
            }
            "mod_item" => {
                let Some(id) = self.named_item(node, SymbolKind::Module, ex) else {
                    return;
                };
                if let Some(body) = node.child_by_field_name("body") {
                    ex.enter(id);
                    self.walk_items(body, ex);
                    ex.exit();
                }
            }
            "const_item" | "static_item" => {
                if let Some(id) = self.named_item(node, SymbolKind::Constant, ex) {
                    ex.symbol_mut(id).return_type = syntax::field_text(node, "type", source).map(str::to_string);
                }
                if let Some(value) = node.child_by_field_name("value") {
                    self.walk_expressions(value, ex);
                }
            }
            "use_declaration" => {
                if let Some(argument) = node.child_by_field_name("argument") {
                    let mut paths = Vec::new();
                    use_paths(argument, source, "", &mut paths);
                    for path in paths {
                        ex.add_reference(RelationshipKind::Imports, &path, syntax::line(node), syntax::column(node));
                    }
                }
            }
            _ => {}
        }
    }

    fn named_item(&self, node: Node, kind: SymbolKind, ex: &mut FileExtractor) -> Option<SymbolId> {
        let source = ex.source();
        let name = syntax::field_text(node, "name", source)?;
        let id = ex.add_symbol(kind, name, syntax::span(node));
        let vis = visibility(node, source);
        let symbol = ex.symbol_mut(id);
        symbol.visibility = vis;
        symbol.is_exported = vis == Visibility::Public;
        apply_attributes(symbol, node, source);
        Some(id)
    }

    fn function(&self, node: Node, ex: &mut FileExtractor) -> Option<SymbolId> {
        let source = ex.source();
        let name = syntax::field_text(node, "name", source)?;
        let scope = ex.current_scope_kind();
        let kind = match scope {
            SymbolKind::Struct | SymbolKind::Enum | SymbolKind::Trait if name == "new" => SymbolKind::Constructor,
            SymbolKind::Struct | SymbolKind::Enum | SymbolKind::Trait => SymbolKind::Method,
            _ => SymbolKind::Function,
        };
        let id = self.named_item(node, kind, ex)?;

        let params = syntax::field_text(node, "parameters", source).unwrap_or("()");
        let return_type = syntax::field_text(node, "return_type", source).map(str::to_string);
        let modifiers = syntax::named_children(node)
            .into_iter()
            .find(|c| c.kind() == "function_modifiers")
            .map(|m| text(m, source))
            .unwrap_or("");

        let symbol = ex.symbol_mut(id);
        symbol.parameters = parameter_names(params);
        symbol.signature = Some(match &return_type {
            Some(ret) => format!("fn {}{} -> {}", name, params, ret),
            None => format!("fn {}{}", name, params),
        });
        symbol.return_type = return_type;
        symbol.is_async = modifiers.contains("async");
        if modifiers.contains("unsafe") {
            symbol.language_features.insert("unsafe".to_string(), "true".to_string());
        }
        if params.contains("self") {
            symbol.language_features.insert("receiver".to_string(), "self".to_string());
        }
        symbol.is_abstract = node.kind() == "function_signature_item";

        if let Some(body) = node.child_by_field_name("body") {
            ex.enter(id);
            self.walk_expressions(body, ex);
            ex.exit();
        }
        Some(id)
    }

    fn impl_block(&self, node: Node, ex: &mut FileExtractor) {
        let source = ex.source();
        let Some(type_node) = node.child_by_field_name("type") else {
            return;
        };
        let type_name = base_type_name(text(type_node, source));
        let owner = ex.find_type(type_name);
        let trait_name = syntax::field_text(node, "trait", source).map(base_type_name);

        if let (Some(owner), Some(trait_name)) = (owner, trait_name) {
            ex.add_reference_from(owner, RelationshipKind::Implements, trait_name, syntax::line(node), syntax::column(node));
        }

        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        // `impl Display for X` and `impl Debug for X` both define `fmt`;
        // the trait becomes a scope segment: `X::<Display>::fmt`.
        let mut scope = match owner {
            Some(owner) => ex.symbol(owner).qualified_name.clone(),
            None => ex.module_qualified().child(type_name).to_qualified_string(),
        };
        if let Some(trait_name) = trait_name {
            scope = format!("{}::<{}>", scope, trait_name);
        }
        let scope = crate::qualified::QualifiedName::parse(Language::Rust, &scope);
        let module = ex.module_id();
        ex.enter_qualified(owner.unwrap_or(module), scope);
        for item in syntax::named_children(body).into_iter().filter(|i| i.kind() == "function_item") {
            let Some(id) = self.function(item, ex) else { continue };
            let symbol = ex.symbol_mut(id);
            if owner.is_none() {
                symbol.kind = if symbol.name == "new" { SymbolKind::Constructor } else { SymbolKind::Method };
                symbol.language_features.insert("impl_for".to_string(), type_name.to_string());
            }
            if let Some(trait_name) = trait_name {
                symbol.language_features.insert("trait_impl".to_string(), trait_name.to_string());
            }
        }
        ex.exit();
    }

    /// Calls and nested items inside a function body or initializer.
    fn walk_expressions(&self, node: Node, ex: &mut FileExtractor) {
        for child in syntax::named_children(node) {
            match child.kind() {
                "call_expression" => {
                    self.call(child, ex);
                    self.walk_expressions(child, ex);
                }
                "function_item" | "struct_item" | "enum_item" | "trait_item" | "impl_item" | "mod_item" => {}
                _ => self.walk_expressions(child, ex),
            }
        }
    }

    fn call(&self, node: Node, ex: &mut FileExtractor) {
        let source = ex.source();
        let Some(mut function) = node.child_by_field_name("function") else {
            return;
        };
        if function.kind() == "generic_function" {
            match function.child_by_field_name("function") {
                Some(inner) => function = inner,
                None => return,
            }
        }
        if !matches!(function.kind(), "identifier" | "scoped_identifier" | "field_expression") {
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

impl LanguageAdapter for RustAdapter {
    fn language(&self) -> Language {
        Language::Rust
    }

    fn parse(&self, path: &str, content: &str, options: &ParseOptions) -> Result<ParseResult> {
        let tree = syntax::parse_tree(tree_sitter_rust::LANGUAGE.into(), path, content, options.parse_timeout)?;
        let root = tree.root_node();

        let mut ex = FileExtractor::new(Language::Rust, path, content, 1.0);
        syntax::report_syntax_errors(root, &mut ex);
        self.walk_items(root, &mut ex);
        Ok(ex.finish(options))
    }
}

fn visibility(node: Node, source: &str) -> Visibility {
    let modifier = syntax::named_children(node)
        .into_iter()
        .find(|c| c.kind() == "visibility_modifier")
        .map(|m| text(m, source));
    match modifier {
        Some("pub") => Visibility::Public,
        Some(_) => Visibility::Internal,
        None => Visibility::Private,
    }
}

/// `Repo<T>` / `crate::store::Repo` / `&mut Repo` -> `Repo`
fn base_type_name(ty: &str) -> &str {
    let ty = ty.trim_start_matches('&').trim_start_matches("mut ").trim();
    let ty = ty.split('<').next().unwrap_or(ty);
    crate::qualified::simple_name(ty)
}

/// Attributes directly above an item: `#[test]`, `#[get("/x")]`.
fn apply_attributes(symbol: &mut crate::symbol::Symbol, node: Node, source: &str) {
    let mut sibling = node.prev_named_sibling();
    while let Some(attr) = sibling.filter(|s| s.kind() == "attribute_item") {
        let raw = text(attr, source).trim_start_matches("#[").trim_end_matches(']').trim();
        let name = raw.split('(').next().unwrap_or(raw).trim();
        symbol.semantic_tags.insert(format!("attribute:{}", name));
        match crate::qualified::simple_name(name) {
            "test" => {
                symbol.semantic_tags.insert("test".to_string());
            }
            method if ROUTE_ATTRIBUTES.contains(&method) => {
                if let Some(path) = raw.split('"').nth(1).filter(|p| p.starts_with('/')) {
                    symbol.semantic_tags.insert(format!("route:{}", path));
                }
            }
            _ => {}
        }
        sibling = attr.prev_named_sibling();
    }
}

/// Flatten a use tree into full paths.
fn use_paths(node: Node, source: &str, prefix: &str, out: &mut Vec<String>) {
    let join = |p: &str| if prefix.is_empty() { p.to_string() } else { format!("{}::{}", prefix, p) };
    match node.kind() {
        "identifier" | "scoped_identifier" | "crate" | "self" | "super" => out.push(join(text(node, source))),
        "use_as_clause" => {
            if let Some(path) = node.child_by_field_name("path") {
                out.push(join(text(path, source)));
            }
        }
        "use_wildcard" => {
            let path = text(node, source).trim_end_matches("::*").trim_end_matches('*');
            out.push(join(path));
        }
        "scoped_use_list" => {
            let nested = match node.child_by_field_name("path") {
                Some(path) => join(text(path, source)),
                None => prefix.to_string(),
            };
            if let Some(list) = node.child_by_field_name("list") {
                use_paths(list, source, &nested, out);
            }
        }
        "use_list" => {
            for child in syntax::named_children(node) {
                use_paths(child, source, prefix, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> ParseResult {
        RustAdapter::new()
            .parse("src/store/orders.rs", source, &ParseOptions::default())
            .unwrap()
    }

    #[test]
    fn test_impl_methods_attach_to_type() {
        let source = r#"
use crate::db::{Pool, Row as DbRow};

impl Display for OrderStore {
    fn fmt(&self, f: &mut Formatter) -> Result { Ok(()) }
}

pub struct OrderStore {
    pool: Pool,
}

impl OrderStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn save(&self, order: Order) -> Result<i64> {
        let id = self.pool.insert(order).await?;
        Ok(id)
    }
}
"#;
        let result = parse(source);

        let store = result.symbol_named("OrderStore").unwrap();
        assert_eq!(store.kind, SymbolKind::Struct);
        assert_eq!(store.qualified_name, "crate::store::orders::OrderStore");
        assert!(store.is_exported);

        let save = result.symbol_named("save").unwrap();
        assert_eq!(save.kind, SymbolKind::Method);
        assert_eq!(save.qualified_name, "crate::store::orders::OrderStore::save");
        assert!(save.is_async);
        assert_eq!(save.parameters, vec!["order"]);
        assert_eq!(result.symbol_named("new").unwrap().kind, SymbolKind::Constructor);
        assert_eq!(result.symbol_named("fmt").unwrap().parent_symbol_id, Some(store.id));

        let insert = result
            .relationships
            .iter()
            .find(|r| r.target_name.as_deref() == Some("self.pool.insert"))
            .unwrap();
        assert_eq!(insert.from_symbol_id, save.id);
        assert_eq!(insert.metadata_str("assigned_to"), Some("id"));

        assert!(result.relationships.iter().any(|r| r.kind == RelationshipKind::Implements
            && r.target_name.as_deref() == Some("Display")
            && r.from_symbol_id == store.id));

        let imports: Vec<_> = result
            .relationships
            .iter()
            .filter(|r| r.kind == RelationshipKind::Imports)
            .filter_map(|r| r.target_name.as_deref())
            .collect();
        assert_eq!(imports, vec!["crate::db::Pool", "crate::db::Row"]);
    }

    #[test]
    fn test_trait_impls_get_distinct_names() {
        let source = r#"
pub struct Money(i64);

impl Display for Money {
    fn fmt(&self, f: &mut Formatter) -> Result { Ok(()) }
}

impl Debug for Money {
    fn fmt(&self, f: &mut Formatter) -> Result { Ok(()) }
}

impl Ledger {
    pub fn new() -> Self { Ledger }
}
"#;
        let result = parse(source);
        let money = result.symbol_named("Money").unwrap();

        let fmts: Vec<&str> = result
            .symbols
            .iter()
            .filter(|s| s.name == "fmt")
            .map(|s| s.qualified_name.as_str())
            .collect();
        assert_eq!(
            fmts,
            vec!["crate::store::orders::Money::<Display>::fmt", "crate::store::orders::Money::<Debug>::fmt"]
        );
        assert!(result.symbols.iter().filter(|s| s.name == "fmt").all(|s| s.parent_symbol_id == Some(money.id)));

        // Type declared in another file
        let new = result.symbol_named("new").unwrap();
        assert_eq!(new.qualified_name, "crate::store::orders::Ledger::new");
        assert_eq!(new.kind, SymbolKind::Constructor);
        assert_eq!(new.parent_symbol_id, Some(result.symbols[0].id));
        assert_eq!(new.language_features.get("impl_for").map(String::as_str), Some("Ledger"));
    }

    #[test]
    fn test_trait_and_test_attribute() {
        let source = "pub trait Repo: Send {\n    fn load(&self, id: u64) -> Item;\n}\n\n#[test]\nfn loads() {}\n";
        let result = parse(source);
        let load = result.symbol_named("load").unwrap();
        assert!(load.is_abstract);
        assert_eq!(load.kind, SymbolKind::Method);
        assert!(result.symbol_named("loads").unwrap().semantic_tags.contains("test"));
        assert!(result.relationships.iter().any(|r| r.kind == RelationshipKind::Inherits
            && r.target_name.as_deref() == Some("Send")));
    }
}
