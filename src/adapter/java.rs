//! Java language adapter
//!
//! Names are rooted at the declared package. Annotations become
//! `annotation:<Name>` tags; `@Test` marks tests and Spring mapping
//! annotations yield `route:<path>` tags joined with the class-level
//! `@RequestMapping` prefix.

use super::extract::FileExtractor;
use super::framework::{LanguageAdapter, ParseOptions, ParseResult};
use super::syntax::{self, text};
use crate::Result;
use crate::language::Language;
use crate::relationship::RelationshipKind;
use crate::symbol::{Symbol, SymbolKind, Visibility};
use tree_sitter::Node;

/// Spring mapping annotation -> HTTP method (`None` for `@RequestMapping`).
const MAPPINGS: &[(&str, Option<&str>)] = &[
    ("GetMapping", Some("GET")),
    ("PostMapping", Some("POST")),
    ("PutMapping", Some("PUT")),
    ("DeleteMapping", Some("DELETE")),
    ("PatchMapping", Some("PATCH")),
    ("RequestMapping", None),
];

#[derive(Debug, Default)]
pub struct JavaAdapter;

impl JavaAdapter {
    pub fn new() -> Self {
        Self
    }

    fn type_declaration(&self, node: Node, ex: &mut FileExtractor, route_prefix: &str) {
        let source = ex.source();
        let Some(name) = syntax::field_text(node, "name", source) else {
            return;
        };
        let kind = match node.kind() {
            "interface_declaration" | "annotation_type_declaration" => SymbolKind::Interface,
            "enum_declaration" => SymbolKind::Enum,
            _ => SymbolKind::Class,
        };
        let in_interface = ex.current_scope_kind() == SymbolKind::Interface;
        let id = ex.add_symbol(kind, name, syntax::span(node));
        let modifiers = modifiers_of(node);
        apply_modifiers(ex.symbol_mut(id), modifiers, source, in_interface);
        if node.kind() == "record_declaration" {
            ex.symbol_mut(id)
                .language_features
                .insert("record".to_string(), "true".to_string());
        }

        if let Some(superclass) = node.child_by_field_name("superclass") {
            for base in syntax::named_children(superclass) {
                add_base(ex, id, RelationshipKind::Inherits, base);
            }
        }
        let interfaces = node.child_by_field_name("interfaces").map(|i| (RelationshipKind::Implements, i));
        let extended = syntax::named_children(node)
            .into_iter()
            .find(|c| c.kind() == "extends_interfaces")
            .map(|e| (RelationshipKind::Inherits, e));
        for (rel, clause) in interfaces.into_iter().chain(extended) {
            for list in syntax::named_children(clause).into_iter().filter(|c| c.kind() == "type_list") {
                for base in syntax::named_children(list) {
                    add_base(ex, id, rel, base);
                }
            }
        }

        let prefix = modifiers
            .and_then(|m| mapping_path(m, source).map(|(path, _)| path))
            .map(|path| join_route(route_prefix, &path))
            .unwrap_or_else(|| route_prefix.to_string());

        let Some(body) = node.child_by_field_name("body") else { return };
        ex.enter(id);
        if let Some(params) = node.child_by_field_name("parameters") {
            // Record components are fields.
            for param in syntax::named_children(params).into_iter().filter(|p| p.kind() == "formal_parameter") {
                if let Some(component) = syntax::field_text(param, "name", source) {
                    let field_id = ex.add_symbol(SymbolKind::Field, component, syntax::span(param));
                    let field = ex.symbol_mut(field_id);
                    field.visibility = Visibility::Private;
                    field.return_type = syntax::field_text(param, "type", source).map(str::to_string);
                }
            }
        }
        self.body(body, ex, &prefix);
        ex.exit();
    }

    fn body(&self, body: Node, ex: &mut FileExtractor, route_prefix: &str) {
        let source = ex.source();
        for member in syntax::named_children(body) {
            match member.kind() {
                "class_declaration" | "interface_declaration" | "enum_declaration" | "record_declaration"
                | "annotation_type_declaration" => self.type_declaration(member, ex, route_prefix),
                "method_declaration" | "constructor_declaration" => self.method(member, ex, route_prefix),
                "field_declaration" | "constant_declaration" => self.field(member, ex),
                "enum_constant" => {
                    if let Some(name) = syntax::field_text(member, "name", source) {
                        let id = ex.add_symbol(SymbolKind::Constant, name, syntax::span(member));
                        ex.symbol_mut(id).language_features.insert("static".to_string(), "true".to_string());
                    }
                }
                "enum_body_declarations" => self.body(member, ex, route_prefix),
                "static_initializer" | "block" => self.calls(member, ex),
                _ => {}
            }
        }
    }

    fn method(&self, node: Node, ex: &mut FileExtractor, route_prefix: &str) {
        let source = ex.source();
        let Some(name) = syntax::field_text(node, "name", source) else {
            return;
        };
        let kind = if node.kind() == "constructor_declaration" {
            SymbolKind::Constructor
        } else {
            SymbolKind::Method
        };
        let in_interface = ex.current_scope_kind() == SymbolKind::Interface;
        let id = ex.add_symbol(kind, name, syntax::span(node));

        let params = node.child_by_field_name("parameters");
        let params_text = params.map(|p| text(p, source)).unwrap_or("()");
        let return_type = syntax::field_text(node, "type", source).map(str::to_string);
        let modifiers = modifiers_of(node);
        let has_body = node.child_by_field_name("body").is_some();

        let symbol = ex.symbol_mut(id);
        symbol.parameters = params.map(|p| parameter_names(p, source)).unwrap_or_default();
        symbol.signature = Some(match &return_type {
            Some(ret) => format!("{} {}{}", ret, name, params_text),
            None => format!("{}{}", name, params_text),
        });
        symbol.return_type = return_type;
        apply_modifiers(symbol, modifiers, source, in_interface);
        // Interface methods without a body (and not `default`) are abstract.
        if in_interface && !has_body {
            symbol.is_abstract = true;
        }
        if let Some((path, method)) = modifiers.and_then(|m| mapping_path(m, source)) {
            symbol.semantic_tags.insert(format!("route:{}", join_route(route_prefix, &path)));
            if let Some(method) = method {
                symbol.language_features.insert("http_method".to_string(), method.to_string());
            }
        }
        if name == "main" && symbol.language_features.contains_key("static") {
            symbol.semantic_tags.insert("entrypoint".to_string());
        }

        if let Some(body) = node.child_by_field_name("body") {
            ex.enter(id);
            self.calls(body, ex);
            ex.exit();
        }
    }

    fn field(&self, node: Node, ex: &mut FileExtractor) {
        let source = ex.source();
        let in_interface = ex.current_scope_kind() == SymbolKind::Interface;
        let modifiers = modifiers_of(node);
        let ty = syntax::field_text(node, "type", source).map(str::to_string);
        let declarators: Vec<Node> = syntax::named_children(node)
            .into_iter()
            .filter(|c| c.kind() == "variable_declarator")
            .collect();
        for declarator in declarators {
            let Some(name) = syntax::field_text(declarator, "name", source) else { continue };
            let id = ex.add_symbol(SymbolKind::Field, name, syntax::span(node));
            let symbol = ex.symbol_mut(id);
            symbol.return_type = ty.clone();
            apply_modifiers(symbol, modifiers, source, in_interface);
            // Interface fields are implicitly static final.
            let constant = in_interface
                || (symbol.language_features.contains_key("static") && symbol.language_features.contains_key("final"));
            if constant {
                symbol.kind = SymbolKind::Constant;
            }
            if let Some(value) = declarator.child_by_field_name("value") {
                self.calls(value, ex);
            }
        }
    }

    /// Method invocations and `new T(...)` under `node`.
    fn calls(&self, node: Node, ex: &mut FileExtractor) {
        let source = ex.source();
        for child in syntax::named_children(node) {
            match child.kind() {
                "method_invocation" => {
                    if let Some(name) = syntax::field_text(child, "name", source) {
                        // Chained and constructed receivers reduce to the method name.
                        let target = match child.child_by_field_name("object") {
                            Some(object)
                                if matches!(object.kind(), "identifier" | "field_access" | "this" | "super") =>
                            {
                                format!("{}.{}", text(object, source), name)
                            }
                            _ => name.to_string(),
                        };
                        self.add_call(child, &target, ex);
                    }
                    self.calls(child, ex);
                }
                "object_creation_expression" => {
                    if let Some(ty) = syntax::field_text(child, "type", source) {
                        let ty = ty.split('<').next().unwrap_or(ty).trim();
                        self.add_call(child, ty, ex);
                    }
                    self.calls(child, ex);
                }
                // Local and anonymous classes keep their own scope.
                "class_declaration" | "class_body" => {}
                _ => self.calls(child, ex),
            }
        }
    }

    fn add_call(&self, node: Node, target: &str, ex: &mut FileExtractor) {
        let source = ex.source();
        let args = node
            .child_by_field_name("arguments")
            .map(|a| syntax::call_arguments(a, source))
            .unwrap_or_default();
        let assigned = syntax::assigned_variable(node, source);
        ex.add_call(target, syntax::line(node), syntax::column(node), args, assigned);
    }
}

impl LanguageAdapter for JavaAdapter {
    fn language(&self) -> Language {
        Language::Java
    }

    fn parse(&self, path: &str, content: &str, options: &ParseOptions) -> Result<ParseResult> {
        let tree = syntax::parse_tree(tree_sitter_java::LANGUAGE.into(), path, content, options.parse_timeout)?;
        let root = tree.root_node();

        let mut ex = FileExtractor::new(Language::Java, path, content, 1.0);
        syntax::report_syntax_errors(root, &mut ex);

        for node in syntax::named_children(root) {
            match node.kind() {
                "package_declaration" => {
                    if let Some(name) = syntax::named_children(node)
                        .into_iter()
                        .find(|c| matches!(c.kind(), "scoped_identifier" | "identifier"))
                    {
                        ex.set_package(text(name, content));
                    }
                }
                "import_declaration" => {
                    let target = text(node, content)
                        .trim_start_matches("import")
                        .trim()
                        .trim_start_matches("static ")
                        .trim_end_matches(';')
                        .trim();
                    ex.add_reference(RelationshipKind::Imports, target, syntax::line(node), syntax::column(node));
                }
                "class_declaration" | "interface_declaration" | "enum_declaration" | "record_declaration"
                | "annotation_type_declaration" => self.type_declaration(node, &mut ex, ""),
                _ => {}
            }
        }
        Ok(ex.finish(options))
    }
}

fn modifiers_of(node: Node) -> Option<Node> {
    syntax::named_children(node)
        .into_iter()
        .find(|c| c.kind() == "modifiers")
}

fn apply_modifiers(symbol: &mut Symbol, modifiers: Option<Node>, source: &str, in_interface: bool) {
    symbol.visibility = if in_interface { Visibility::Public } else { Visibility::Internal };
    let Some(modifiers) = modifiers else {
        symbol.is_exported = symbol.visibility == Visibility::Public;
        return;
    };
    if syntax::has_token(modifiers, "public") {
        symbol.visibility = Visibility::Public;
    } else if syntax::has_token(modifiers, "protected") {
        symbol.visibility = Visibility::Protected;
    } else if syntax::has_token(modifiers, "private") {
        symbol.visibility = Visibility::Private;
    }
    symbol.is_exported = symbol.visibility == Visibility::Public;
    symbol.is_abstract = syntax::has_token(modifiers, "abstract");
    for flag in ["static", "final", "synchronized", "default"] {
        if syntax::has_token(modifiers, flag) {
            symbol.language_features.insert(flag.to_string(), "true".to_string());
        }
    }

    for annotation in syntax::named_children(modifiers)
        .into_iter()
        .filter(|a| matches!(a.kind(), "annotation" | "marker_annotation"))
    {
        let Some(name) = syntax::field_text(annotation, "name", source) else { continue };
        symbol.semantic_tags.insert(format!("annotation:{}", name));
        match crate::qualified::simple_name(name) {
            "Test" | "ParameterizedTest" => {
                symbol.semantic_tags.insert("test".to_string());
            }
            "Override" => {
                symbol.language_features.insert("override".to_string(), "true".to_string());
            }
            _ => {}
        }
    }
}

/// Path and HTTP method of the first Spring mapping annotation.
fn mapping_path(modifiers: Node, source: &str) -> Option<(String, Option<&'static str>)> {
    syntax::named_children(modifiers).into_iter().find_map(|annotation| {
        let name = syntax::field_text(annotation, "name", source)?;
        let (_, method) = MAPPINGS
            .iter()
            .find(|(mapping, _)| *mapping == crate::qualified::simple_name(name))?;
        let path = annotation
            .child_by_field_name("arguments")
            .and_then(|args| first_string(text(args, source)))
            .unwrap_or_default();
        Some((path, *method))
    })
}

fn first_string(raw: &str) -> Option<String> {
    let start = raw.find('"')? + 1;
    let len = raw[start..].find('"')?;
    Some(raw[start..start + len].to_string())
}

/// `/api` + `orders/{id}` -> `/api/orders/{id}`
fn join_route(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    match (prefix.is_empty(), path.is_empty()) {
        (true, _) => format!("/{}", path),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{}/{}", prefix, path),
    }
}

fn add_base(ex: &mut FileExtractor, from: crate::symbol::SymbolId, kind: RelationshipKind, base: Node) {
    let raw = text(base, ex.source());
    let name = crate::qualified::simple_name(raw.split('<').next().unwrap_or(raw).trim());
    if name.is_empty() {
        return;
    }
    ex.add_reference_from(from, kind, name, syntax::line(base), syntax::column(base));
}

/// `(final String id, int... counts)` -> `[id, counts]`
fn parameter_names(params: Node, source: &str) -> Vec<String> {
    syntax::named_children(params)
        .into_iter()
        .filter_map(|p| match p.kind() {
            "formal_parameter" => syntax::field_text(p, "name", source).map(str::to_string),
            "spread_parameter" => syntax::named_children(p)
                .into_iter()
                .find(|c| c.kind() == "variable_declarator")
                .and_then(|d| syntax::field_text(d, "name", source))
                .map(str::to_string),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> ParseResult {
        JavaAdapter::new()
            .parse("src/main/java/com/shop/OrderController.java", source, &ParseOptions::default())
            .unwrap()
    }

    #[test]
    fn test_package_classes_and_members() {
        let source = r#"
package com.shop;

import java.util.List;
import com.shop.repo.OrderRepository;

public abstract class BaseController implements Auditable {
    protected abstract void audit(String action);
}

interface Auditable extends Named<Order> {
    int VERSION = 2;
    void audit(String action);
}

public class OrderController extends BaseController {
    private static final int PAGE_SIZE = 50;
    private final OrderRepository repo;

    public OrderController(OrderRepository repo) {
        this.repo = repo;
    }

    @Override
    protected void audit(String action) {
        Logger log = LoggerFactory.getLogger(action);
        log.info(action);
    }

    public List<Order> list(final int page, String... tags) {
        return repo.findAll(page);
    }

    public static void main(String[] args) {
        new OrderController(new InMemoryRepository()).list(0);
    }
}
"#;
        let result = parse(source);
        assert!(!result.stats.used_fallback);
        assert_eq!(result.symbols[0].name, "com.shop");

        let controller = result.symbol_named("OrderController").unwrap();
        assert_eq!(controller.qualified_name, "com.shop.OrderController");
        assert!(controller.is_exported);

        let base = result.symbol_named("BaseController").unwrap();
        assert!(base.is_abstract);
        assert!(result.relationships.iter().any(|r| r.from_symbol_id == base.id
            && r.kind == RelationshipKind::Implements
            && r.target_name.as_deref() == Some("Auditable")));
        assert!(result.relationships.iter().any(|r| r.from_symbol_id == controller.id
            && r.kind == RelationshipKind::Inherits
            && r.target_name.as_deref() == Some("BaseController")));

        let auditable = result.symbol_named("Auditable").unwrap();
        assert_eq!(auditable.kind, SymbolKind::Interface);
        assert_eq!(auditable.visibility, Visibility::Internal);
        assert!(result.relationships.iter().any(|r| r.from_symbol_id == auditable.id
            && r.kind == RelationshipKind::Inherits
            && r.target_name.as_deref() == Some("Named")));
        let version = result.symbol_named("VERSION").unwrap();
        assert_eq!(version.kind, SymbolKind::Constant);

        let ctor = result
            .symbols
            .iter()
            .find(|s| s.kind == SymbolKind::Constructor)
            .unwrap();
        assert_eq!(ctor.parameters, vec!["repo"]);
        assert_eq!(ctor.qualified_name, "com.shop.OrderController.OrderController");

        assert_eq!(result.symbol_named("PAGE_SIZE").unwrap().kind, SymbolKind::Constant);
        let repo = result.symbol_named("repo").unwrap();
        assert_eq!(repo.kind, SymbolKind::Field);
        assert_eq!(repo.visibility, Visibility::Private);

        let audits: Vec<_> = result.symbols.iter().filter(|s| s.name == "audit").collect();
        assert_eq!(audits.len(), 3);
        assert!(audits[0].is_abstract);
        assert!(audits[1].is_abstract);
        assert!(!audits[2].is_abstract);
        assert_eq!(audits[2].visibility, Visibility::Protected);
        assert_eq!(audits[2].language_features.get("override").map(String::as_str), Some("true"));

        let list = result.symbol_named("list").unwrap();
        assert_eq!(list.parameters, vec!["page", "tags"]);
        assert_eq!(list.return_type.as_deref(), Some("List<Order>"));
        let find_all = result
            .relationships
            .iter()
            .find(|r| r.target_name.as_deref() == Some("repo.findAll"))
            .unwrap();
        assert_eq!(find_all.from_symbol_id, list.id);
        assert_eq!(find_all.metadata_strings("args"), vec!["page"]);

        let main = result.symbol_named("main").unwrap();
        assert!(main.semantic_tags.contains("entrypoint"));
        let created: Vec<_> = result
            .relationships
            .iter()
            .filter(|r| r.from_symbol_id == main.id)
            .filter_map(|r| r.target_name.as_deref())
            .collect();
        assert!(created.contains(&"OrderController"));
        assert!(created.contains(&"InMemoryRepository"));

        let imports: Vec<_> = result
            .relationships
            .iter()
            .filter(|r| r.kind == RelationshipKind::Imports)
            .filter_map(|r| r.target_name.as_deref())
            .collect();
        assert_eq!(imports, vec!["java.util.List", "com.shop.repo.OrderRepository"]);
    }

    #[test]
    fn test_spring_routes_and_tests() {
        let source = r#"
package com.shop;

@RestController
@RequestMapping("/api/orders")
public class OrderController {
    @GetMapping("/{id}")
    public Order get(@PathVariable String id) {
        return service.find(id);
    }

    @PostMapping
    public Order create(@RequestBody Order order) {
        return service.save(order);
    }

    @Test
    void rejectsEmptyOrder() {}
}
"#;
        let result = parse(source);
        let class = result.symbol_named("OrderController").unwrap();
        assert!(class.semantic_tags.contains("annotation:RestController"));

        let get = result.symbol_named("get").unwrap();
        assert!(get.semantic_tags.contains("route:/api/orders/{id}"));
        assert_eq!(get.language_features.get("http_method").map(String::as_str), Some("GET"));
        assert_eq!(get.parameters, vec!["id"]);

        let create = result.symbol_named("create").unwrap();
        assert!(create.semantic_tags.contains("route:/api/orders"));
        assert_eq!(create.language_features.get("http_method").map(String::as_str), Some("POST"));

        let test = result.symbol_named("rejectsEmptyOrder").unwrap();
        assert!(test.semantic_tags.contains("test"));
        assert_eq!(test.visibility, Visibility::Internal);
    }
}
