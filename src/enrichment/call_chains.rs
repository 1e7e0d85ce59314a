//! Call chain materialization
//!
//! A chain is a maximal path over resolved call-like edges, starting at an
//! entry point: a callable nobody calls, or the lowest member of a call
//! cycle that nothing outside the cycle reaches. A symbol already on the
//! current path is never entered again.

use super::{EnrichmentConfig, PassOutcome};
use crate::graph::SymbolGraph;
use crate::storage::GraphStore;
use crate::symbol::SymbolId;
use crate::{ProjectId, Result};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallChain {
    pub id: i64,
    pub project_id: ProjectId,
    pub entry_symbol_id: SymbolId,
    /// Number of call edges in the path
    pub depth: usize,
    pub path: Vec<SymbolId>,
}

impl CallChain {
    fn from_path(project: ProjectId, path: Vec<SymbolId>) -> Self {
        Self {
            id: 0,
            project_id: project,
            entry_symbol_id: path[0],
            depth: path.len() - 1,
            path,
        }
    }

    /// Identity of the chain: its path.
    pub fn key(&self) -> String {
        self.path
            .iter()
            .map(|id| id.0.to_string())
            .collect::<Vec<_>>()
            .join(">")
    }
}

pub fn build_call_chains(conn: &Connection, project: ProjectId, config: &EnrichmentConfig) -> Result<PassOutcome> {
    let store = GraphStore::new(conn);
    let graph = store.load_graph(project)?;
    let chains = compute_chains(&graph, project, config);
    let changes = store.replace_call_chains(project, &chains)?;
    tracing::debug!(project, chains = chains.len(), changes, "call chains rebuilt");
    Ok(PassOutcome { changes, misses: 0 })
}

pub fn compute_chains(graph: &SymbolGraph, project: ProjectId, config: &EnrichmentConfig) -> Vec<CallChain> {
    let mut chains = Vec::new();
    for entry in entry_points(graph) {
        let mut walker = ChainWalker {
            graph,
            max_depth: config.max_chain_depth.max(1),
            limit: config.max_chains_per_entry,
            found: Vec::new(),
        };
        let mut path = vec![entry];
        let mut on_path = HashSet::from([entry]);
        walker.walk(&mut path, &mut on_path);
        chains.extend(walker.found.into_iter().map(|p| CallChain::from_path(project, p)));
    }
    chains
}

fn entry_points(graph: &SymbolGraph) -> Vec<SymbolId> {
    let mut entries: BTreeSet<SymbolId> = graph
        .symbols()
        .iter()
        .filter(|s| s.kind.is_callable())
        .map(|s| s.id)
        .filter(|id| graph.callers(*id).is_empty() && !graph.call_targets(*id).is_empty())
        .collect();

    for cycle in graph.call_cycles() {
        let members: HashSet<SymbolId> = cycle.iter().copied().collect();
        let reached_from_outside = cycle
            .iter()
            .any(|id| graph.callers(*id).iter().any(|c| !members.contains(c)));
        if !reached_from_outside {
            entries.insert(cycle[0]);
        }
    }
    entries.into_iter().collect()
}

struct ChainWalker<'g> {
    graph: &'g SymbolGraph,
    max_depth: usize,
    limit: usize,
    found: Vec<Vec<SymbolId>>,
}

impl ChainWalker<'_> {
    fn walk(&mut self, path: &mut Vec<SymbolId>, on_path: &mut HashSet<SymbolId>) {
        if self.found.len() >= self.limit {
            return;
        }
        let Some(&current) = path.last() else { return };

        let next: Vec<SymbolId> = if path.len() > self.max_depth {
            Vec::new()
        } else {
            self.graph
                .call_targets(current)
                .into_iter()
                .filter(|t| !on_path.contains(t))
                .collect()
        };

        if next.is_empty() {
            if path.len() > 1 {
                self.found.push(path.clone());
            }
            return;
        }

        for target in next {
            path.push(target);
            on_path.insert(target);
            self.walk(path, on_path);
            on_path.remove(&target);
            path.pop();
            if self.found.len() >= self.limit {
                break;
            }
        }
    }
}
