//! Language-agnostic pattern recognition over extracted symbols.

use super::framework::{Pattern, PatternKind};
use crate::symbol::{Symbol, SymbolKind};

const SINGLETON_MEMBERS: &[&str] = &["instance", "_instance", "get_instance", "getInstance", "shared", "INSTANCE", "default_instance"];
const OBSERVER_MEMBERS: &[&str] = &[
    "subscribe",
    "unsubscribe",
    "notify",
    "emit",
    "on",
    "off",
    "add_listener",
    "remove_listener",
    "addEventListener",
    "removeEventListener",
    "attach",
    "detach",
];

pub fn detect_patterns(symbols: &[Symbol]) -> Vec<Pattern> {
    let mut out = Vec::new();

    for symbol in symbols.iter().filter(|s| s.kind.is_type()) {
        let members: Vec<&Symbol> = symbols
            .iter()
            .filter(|s| s.parent_symbol_id == Some(symbol.id))
            .collect();
        let names: Vec<&str> = members.iter().map(|m| m.name.as_str()).collect();

        let singleton: Vec<String> = names
            .iter()
            .filter(|n| SINGLETON_MEMBERS.contains(n))
            .map(|n| format!("member `{}`", n))
            .collect();
        if !singleton.is_empty() {
            out.push(pattern(PatternKind::Singleton, symbol, 0.8, singleton));
        }

        if symbol.name.ends_with("Factory") {
            out.push(pattern(PatternKind::Factory, symbol, 0.75, vec![format!("type name `{}`", symbol.name)]));
        }

        let fluent = names
            .iter()
            .filter(|n| n.starts_with("with_") || (n.starts_with("with") && n.len() > 4) || n.starts_with("set"))
            .count();
        if symbol.name.ends_with("Builder") || (names.contains(&"build") && fluent >= 2) {
            let mut evidence = vec![format!("{} fluent setters", fluent)];
            if names.contains(&"build") {
                evidence.push("`build` method".to_string());
            }
            out.push(pattern(PatternKind::Builder, symbol, 0.75, evidence));
        }

        let observer: Vec<String> = names
            .iter()
            .filter(|n| OBSERVER_MEMBERS.contains(n))
            .map(|n| format!("method `{}`", n))
            .collect();
        if observer.len() >= 2 {
            out.push(pattern(PatternKind::Observer, symbol, 0.7, observer));
        }
    }

    for symbol in symbols.iter().filter(|s| s.kind.is_callable()) {
        let lower = symbol.name.to_lowercase();
        if symbol.kind == SymbolKind::Function
            && (lower.starts_with("create_") || lower.starts_with("make_") || (symbol.name.starts_with("create") && symbol.name.len() > 6))
        {
            out.push(pattern(PatternKind::Factory, symbol, 0.6, vec![format!("function `{}`", symbol.name)]));
        }

        for route in symbol.semantic_tags.iter().filter_map(|t| t.strip_prefix("route:")) {
            out.push(Pattern {
                kind: PatternKind::RouteHandler,
                name: route.to_string(),
                confidence: 0.9,
                evidence: vec![format!("handler `{}`", symbol.qualified_name)],
                symbol_id: Some(symbol.id),
            });
        }
    }

    let tests: Vec<&Symbol> = symbols
        .iter()
        .filter(|s| s.kind.is_callable() && (s.name.starts_with("test_") || s.name.starts_with("Test") || s.semantic_tags.contains("test")))
        .collect();
    if let Some(module) = symbols.first().filter(|_| !tests.is_empty()) {
        out.push(Pattern {
            kind: PatternKind::TestSuite,
            name: module.name.clone(),
            confidence: 0.85,
            evidence: tests.iter().take(5).map(|t| format!("test `{}`", t.name)).collect(),
            symbol_id: Some(module.id),
        });
    }

    let async_fns: Vec<&Symbol> = symbols.iter().filter(|s| s.is_async).collect();
    if async_fns.len() >= 3 {
        if let Some(module) = symbols.first() {
            out.push(Pattern {
                kind: PatternKind::AsyncApi,
                name: module.name.clone(),
                confidence: 0.6,
                evidence: async_fns.iter().take(5).map(|s| format!("async `{}`", s.name)).collect(),
                symbol_id: Some(module.id),
            });
        }
    }

    out
}

fn pattern(kind: PatternKind, symbol: &Symbol, confidence: f32, evidence: Vec<String>) -> Pattern {
    Pattern {
        kind,
        name: symbol.name.clone(),
        confidence,
        evidence,
        symbol_id: Some(symbol.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;
    use crate::symbol::SymbolId;

    fn sym(id: i64, kind: SymbolKind, name: &str, parent: Option<i64>) -> Symbol {
        let mut s = Symbol::new(Language::Python, kind, name, name, "m.py", 1, 2);
        s.id = SymbolId(id);
        s.parent_symbol_id = parent.map(SymbolId);
        s
    }

    #[test]
    fn test_singleton_and_builder() {
        let symbols = vec![
            sym(0, SymbolKind::Module, "m", None),
            sym(1, SymbolKind::Class, "Config", Some(0)),
            sym(2, SymbolKind::Method, "get_instance", Some(1)),
            sym(3, SymbolKind::Class, "RequestBuilder", Some(0)),
            sym(4, SymbolKind::Method, "with_header", Some(3)),
            sym(5, SymbolKind::Method, "build", Some(3)),
        ];

        let found = detect_patterns(&symbols);
        assert!(found.iter().any(|p| p.kind == PatternKind::Singleton && p.name == "Config"));
        assert!(found.iter().any(|p| p.kind == PatternKind::Builder && p.name == "RequestBuilder"));
    }

    #[test]
    fn test_route_and_tests() {
        let mut handler = sym(1, SymbolKind::Function, "list_users", Some(0));
        handler.semantic_tags.insert("route:/api/users".to_string());
        let symbols = vec![
            sym(0, SymbolKind::Module, "api", None),
            handler,
            sym(2, SymbolKind::Function, "test_list_users", Some(0)),
        ];

        let found = detect_patterns(&symbols);
        let route = found.iter().find(|p| p.kind == PatternKind::RouteHandler).unwrap();
        assert_eq!(route.name, "/api/users");
        assert_eq!(route.symbol_id, Some(SymbolId(1)));
        assert!(found.iter().any(|p| p.kind == PatternKind::TestSuite));
    }
}
