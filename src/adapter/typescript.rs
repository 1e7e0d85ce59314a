//! TypeScript language adapter
//!
//! Shares the JavaScript walker; `.tsx` files use the TSX grammar.

use super::framework::{LanguageAdapter, ParseOptions, ParseResult};
use super::javascript;
use crate::Result;
use crate::language::Language;

#[derive(Debug, Default)]
pub struct TypeScriptAdapter;

impl TypeScriptAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl LanguageAdapter for TypeScriptAdapter {
    fn language(&self) -> Language {
        Language::TypeScript
    }

    fn parse(&self, path: &str, content: &str, options: &ParseOptions) -> Result<ParseResult> {
        let grammar = if path.to_ascii_lowercase().ends_with(".tsx") {
            tree_sitter_typescript::LANGUAGE_TSX
        } else {
            tree_sitter_typescript::LANGUAGE_TYPESCRIPT
        };
        javascript::extract(Language::TypeScript, grammar.into(), path, content, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationship::RelationshipKind;
    use crate::symbol::{SymbolKind, Visibility};

    fn parse(path: &str, source: &str) -> ParseResult {
        TypeScriptAdapter::new()
            .parse(path, source, &ParseOptions::default())
            .unwrap()
    }

    #[test]
    fn test_classes_interfaces_and_modifiers() {
        let source = r#"
import { Repo } from './repo';

export interface Store extends Closeable {
    load(id: string): Promise<Order>;
    name: string;
}

export abstract class BaseStore {
    abstract load(id: string): Promise<Order>;
}

export class OrderStore extends BaseStore implements Store, Auditable<Order> {
    name: string = 'orders';
    private cache: Map<string, Order>;

    constructor(private readonly repo: Repo) {
        super();
    }

    async load(id: string): Promise<Order> {
        return this.repo.find(id);
    }

    protected evict(id: string): void {
        this.cache.delete(id);
    }
}

export enum Status { Open, Closed }
"#;
        let result = parse("web/src/store.ts", source);
        assert!(!result.stats.used_fallback);

        let store = result
            .symbols
            .iter()
            .find(|s| s.kind == SymbolKind::Interface && s.name == "Store")
            .unwrap();
        assert_eq!(store.qualified_name, "web.src.store.Store");
        assert!(store.is_exported);
        let signature = result
            .symbols
            .iter()
            .find(|s| s.name == "load" && s.parent_symbol_id == Some(store.id))
            .unwrap();
        assert!(signature.is_abstract);
        assert_eq!(signature.return_type.as_deref(), Some("Promise<Order>"));

        let base = result.symbol_named("BaseStore").unwrap();
        assert!(base.is_abstract);

        let class = result.symbol_named("OrderStore").unwrap();
        let implemented: Vec<_> = result
            .relationships
            .iter()
            .filter(|r| r.from_symbol_id == class.id && r.kind == RelationshipKind::Implements)
            .filter_map(|r| r.target_name.as_deref())
            .collect();
        assert_eq!(implemented, vec!["Store", "Auditable"]);
        assert!(result.relationships.iter().any(|r| r.from_symbol_id == class.id
            && r.kind == RelationshipKind::Inherits
            && r.target_name.as_deref() == Some("BaseStore")));

        let ctor = result
            .symbols
            .iter()
            .find(|s| s.kind == SymbolKind::Constructor)
            .unwrap();
        assert_eq!(ctor.parameters, vec!["repo"]);

        let load = result
            .symbols
            .iter()
            .find(|s| s.name == "load" && s.parent_symbol_id == Some(class.id))
            .unwrap();
        assert!(load.is_async);
        assert_eq!(load.qualified_name, "web.src.store.OrderStore.load");

        assert_eq!(result.symbol_named("evict").unwrap().visibility, Visibility::Protected);
        let cache = result.symbol_named("cache").unwrap();
        assert_eq!(cache.kind, SymbolKind::Field);
        assert_eq!(cache.visibility, Visibility::Private);
        assert_eq!(result.symbol_named("Status").unwrap().kind, SymbolKind::Enum);

        assert!(result.relationships.iter().any(|r| r.kind == RelationshipKind::Imports
            && r.target_name.as_deref() == Some("./repo")));
    }

    #[test]
    fn test_tsx_components() {
        let source = "export function OrderList(props: Props) {\n  return <ul>{props.items.map(renderItem)}</ul>;\n}\n";
        let result = parse("web/src/OrderList.tsx", source);
        assert!(!result.stats.used_fallback);
        let component = result.symbol_named("OrderList").unwrap();
        assert_eq!(component.kind, SymbolKind::Function);
        assert_eq!(component.parameters, vec!["props"]);
    }
}
