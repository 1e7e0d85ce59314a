//! Data-flow inference
//!
//! Two sources of `dataflow` edges, both read from call metadata recorded by
//! the adapters (`args`, `assigned_to`):
//!
//! - parameter propagation: a caller passes one of its own parameters to a
//!   callee, giving `caller -> callee`
//! - return propagation: inside one caller, the result of `f()` is assigned
//!   to a variable later passed to `g()`, giving `f -> g`

use super::{EnrichmentConfig, PassOutcome, sync_derived_edges};
use crate::graph::SymbolGraph;
use crate::relationship::{Relationship, RelationshipKind};
use crate::storage::GraphStore;
use crate::symbol::SymbolId;
use crate::{ProjectId, Result};
use rusqlite::Connection;
use std::collections::{BTreeMap, HashMap};

pub fn infer_data_flow(conn: &Connection, project: ProjectId, config: &EnrichmentConfig) -> Result<PassOutcome> {
    let store = GraphStore::new(conn);
    let graph = store.load_graph(project)?;
    let desired = derive_flows(&graph, config);
    let changes = sync_derived_edges(&store, project, RelationshipKind::DataFlow, desired)?;
    Ok(PassOutcome { changes, misses: 0 })
}

pub fn derive_flows(graph: &SymbolGraph, config: &EnrichmentConfig) -> Vec<Relationship> {
    // (from, to) -> (flow kind, variables)
    let mut flows: BTreeMap<(SymbolId, SymbolId), (&'static str, Vec<String>)> = BTreeMap::new();
    let mut record = |from: SymbolId, to: SymbolId, kind: &'static str, variable: &str| {
        let entry = flows.entry((from, to)).or_insert((kind, Vec::new()));
        if !entry.1.iter().any(|v| v == variable) {
            entry.1.push(variable.to_string());
        }
    };

    for caller in graph.symbols().iter().filter(|s| s.kind.is_callable()) {
        let mut calls: Vec<&Relationship> = graph
            .edges_from(caller.id)
            .filter(|r| r.kind == RelationshipKind::Calls)
            .collect();
        calls.sort_by_key(|r| (r.context_line.unwrap_or(0), r.id));

        for call in &calls {
            let Some(callee) = call.to_symbol_id else { continue };
            for arg in call.metadata_strings("args") {
                if callee != caller.id && caller.parameters.contains(&arg) {
                    record(caller.id, callee, "parameter", &arg);
                }
            }
        }

        // Variables holding a call result, and which callee produced them.
        let mut produced: HashMap<String, SymbolId> = HashMap::new();
        for call in &calls {
            let Some(callee) = call.to_symbol_id else { continue };
            for arg in call.metadata_strings("args") {
                if let Some(&producer) = produced.get(&arg) {
                    if producer != callee {
                        record(producer, callee, "return", &arg);
                    }
                }
            }
            if let Some(var) = call.metadata_str("assigned_to") {
                produced.insert(var.to_string(), callee);
            }
        }
    }

    flows
        .into_iter()
        .map(|((from, to), (kind, variables))| {
            let confidence = if kind == "parameter" {
                config.parameter_flow_confidence
            } else {
                config.return_flow_confidence
            };
            Relationship::new(from, to, RelationshipKind::DataFlow)
                .with_confidence(confidence)
                .with_metadata("flow", kind)
                .with_metadata("variables", variables)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;
    use crate::symbol::{Symbol, SymbolKind};

    fn func(id: i64, name: &str, params: &[&str]) -> Symbol {
        let mut s = Symbol::new(Language::Python, SymbolKind::Function, name, name, "m.py", 1, 9);
        s.id = SymbolId(id);
        s.parameters = params.iter().map(|p| p.to_string()).collect();
        s
    }

    fn call(from: i64, to: i64, line: u32, args: &[&str], assigned: Option<&str>) -> Relationship {
        let mut rel = Relationship::new(SymbolId(from), SymbolId(to), RelationshipKind::Calls).with_context(line, 0, "");
        if !args.is_empty() {
            rel = rel.with_metadata("args", args.to_vec());
        }
        if let Some(var) = assigned {
            rel = rel.with_metadata("assigned_to", var);
        }
        rel
    }

    #[test]
    fn test_parameter_and_return_flows() {
        // def handle(order): total = compute(order); send(total)
        let graph = SymbolGraph::from_parts(
            vec![func(1, "handle", &["order"]), func(2, "compute", &["o"]), func(3, "send", &["v"])],
            vec![
                call(1, 2, 2, &["order"], Some("total")),
                call(1, 3, 3, &["total"], None),
            ],
        );

        let flows = derive_flows(&graph, &EnrichmentConfig::default());
        assert_eq!(flows.len(), 2);

        let param = flows.iter().find(|r| r.metadata_str("flow") == Some("parameter")).unwrap();
        assert_eq!((param.from_symbol_id, param.to_symbol_id), (SymbolId(1), Some(SymbolId(2))));
        assert_eq!(param.confidence, 0.7);

        let ret = flows.iter().find(|r| r.metadata_str("flow") == Some("return")).unwrap();
        assert_eq!((ret.from_symbol_id, ret.to_symbol_id), (SymbolId(2), Some(SymbolId(3))));
        assert_eq!(ret.metadata_strings("variables"), vec!["total".to_string()]);
    }

    #[test]
    fn test_unrelated_arguments_produce_nothing() {
        let graph = SymbolGraph::from_parts(
            vec![func(1, "a", &["x"]), func(2, "b", &[])],
            vec![call(1, 2, 2, &["y"], None)],
        );
        assert!(derive_flows(&graph, &EnrichmentConfig::default()).is_empty());
    }
}
