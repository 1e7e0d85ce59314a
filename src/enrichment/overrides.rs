//! Virtual override discovery
//!
//! For every type, each of its methods is matched by name and arity against
//! the methods of its declared ancestors, nearest first. The first match
//! per method becomes an `overrides` edge.

use super::{EnrichmentConfig, PassOutcome, sync_derived_edges};
use crate::graph::SymbolGraph;
use crate::relationship::{Relationship, RelationshipKind};
use crate::storage::GraphStore;
use crate::symbol::{Symbol, SymbolKind};
use crate::{ProjectId, Result};
use rusqlite::Connection;

pub fn discover_virtual_overrides(conn: &Connection, project: ProjectId, config: &EnrichmentConfig) -> Result<PassOutcome> {
    let store = GraphStore::new(conn);
    let graph = store.load_graph(project)?;
    let desired = find_overrides(&graph, config);
    let changes = sync_derived_edges(&store, project, RelationshipKind::Overrides, desired)?;
    Ok(PassOutcome { changes, misses: 0 })
}

fn is_overridable(symbol: &Symbol) -> bool {
    symbol.kind == SymbolKind::Method && !symbol.language_features.contains_key("static")
}

pub fn find_overrides(graph: &SymbolGraph, config: &EnrichmentConfig) -> Vec<Relationship> {
    let mut out = Vec::new();
    let mut types: Vec<&Symbol> = graph.symbols().iter().filter(|s| s.kind.is_type()).collect();
    types.sort_by_key(|s| s.id);

    for ty in types {
        let ancestors = graph.ancestors(ty.id, config.max_hierarchy_depth);
        if ancestors.is_empty() {
            continue;
        }
        let mut methods = graph.children(ty.id);
        methods.retain(|m| is_overridable(m));
        methods.sort_by_key(|m| m.id);

        for method in methods {
            let base_method = ancestors.iter().find_map(|(base, distance)| {
                graph
                    .children(*base)
                    .into_iter()
                    .filter(|m| is_overridable(m))
                    .filter(|m| m.name == method.name && m.arity() == method.arity())
                    .min_by_key(|m| m.id)
                    .map(|m| (graph.get(*base), m, *distance))
            });
            let Some((Some(base), base_method, distance)) = base_method else {
                continue;
            };

            let interface = matches!(base.kind, SymbolKind::Interface | SymbolKind::Trait) || base_method.is_abstract;
            let confidence = if interface {
                config.interface_override_confidence
            } else {
                config.override_confidence
            };
            out.push(
                Relationship::new(method.id, base_method.id, RelationshipKind::Overrides)
                    .with_confidence(confidence)
                    .with_metadata("base_type", base.qualified_name.clone())
                    .with_metadata("distance", distance as u64),
            );
        }
    }
    out
}
