//! Symbol Graph - in-memory arena over one project's symbols
//!
//! Symbols live in a flat arena addressed by `SymbolId`; relationships are
//! id-to-id edges held in a separate list with adjacency indexes. The
//! enrichment passes and the insight generator load a project into this
//! structure, compute over it, and write results back through the store.

use crate::relationship::{Relationship, RelationshipKind};
use crate::symbol::{Symbol, SymbolId};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

#[derive(Debug, Default)]
pub struct SymbolGraph {
    symbols: Vec<Symbol>,
    index: HashMap<SymbolId, usize>,
    relationships: Vec<Relationship>,
    /// Outgoing resolved edges (indexes into `relationships`)
    edges_from: HashMap<SymbolId, Vec<usize>>,
    /// Incoming resolved edges
    edges_to: HashMap<SymbolId, Vec<usize>>,
    by_name: HashMap<String, Vec<SymbolId>>,
    by_qualified: HashMap<String, Vec<SymbolId>>,
    by_file: HashMap<String, Vec<SymbolId>>,
    children: HashMap<SymbolId, Vec<SymbolId>>,
}

impl SymbolGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from rows already loaded from the store.
    pub fn from_parts(symbols: Vec<Symbol>, relationships: Vec<Relationship>) -> Self {
        let mut graph = Self::new();
        for symbol in symbols {
            graph.add_symbol(symbol);
        }
        for rel in relationships {
            graph.add_relationship(rel);
        }
        graph
    }

    pub fn add_symbol(&mut self, symbol: Symbol) {
        let id = symbol.id;
        self.by_name.entry(symbol.name.clone()).or_default().push(id);
        self.by_qualified
            .entry(symbol.qualified_name.clone())
            .or_default()
            .push(id);
        self.by_file.entry(symbol.file_path.clone()).or_default().push(id);
        if let Some(parent) = symbol.parent_symbol_id {
            self.children.entry(parent).or_default().push(id);
        }
        self.index.insert(id, self.symbols.len());
        self.symbols.push(symbol);
    }

    pub fn add_relationship(&mut self, rel: Relationship) {
        let slot = self.relationships.len();
        if let Some(to) = rel.to_symbol_id {
            self.edges_from.entry(rel.from_symbol_id).or_default().push(slot);
            self.edges_to.entry(to).or_default().push(slot);
        }
        self.relationships.push(rel);
    }

    pub fn get(&self, id: SymbolId) -> Option<&Symbol> {
        self.index.get(&id).map(|&i| &self.symbols[i])
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.iter().filter(|r| !r.is_resolved())
    }

    pub fn by_name(&self, name: &str) -> Vec<&Symbol> {
        self.lookup(self.by_name.get(name))
    }

    pub fn by_qualified_name(&self, qualified: &str) -> Vec<&Symbol> {
        self.lookup(self.by_qualified.get(qualified))
    }

    pub fn in_file(&self, path: &str) -> Vec<&Symbol> {
        self.lookup(self.by_file.get(path))
    }

    pub fn children(&self, id: SymbolId) -> Vec<&Symbol> {
        self.lookup(self.children.get(&id))
    }

    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.by_file.keys().map(String::as_str)
    }

    fn lookup(&self, ids: Option<&Vec<SymbolId>>) -> Vec<&Symbol> {
        ids.map(|ids| ids.iter().filter_map(|id| self.get(*id)).collect())
            .unwrap_or_default()
    }

    pub fn edges_from(&self, id: SymbolId) -> impl Iterator<Item = &Relationship> {
        self.edges_from
            .get(&id)
            .into_iter()
            .flatten()
            .map(|&i| &self.relationships[i])
    }

    pub fn edges_to(&self, id: SymbolId) -> impl Iterator<Item = &Relationship> {
        self.edges_to
            .get(&id)
            .into_iter()
            .flatten()
            .map(|&i| &self.relationships[i])
    }

    /// Resolved edges from `id` of a given kind.
    pub fn edges_from_by_kind(&self, id: SymbolId, kind: RelationshipKind) -> Vec<&Relationship> {
        self.edges_from(id).filter(|r| r.kind == kind).collect()
    }

    pub fn has_edge(&self, from: SymbolId, to: SymbolId, kind: RelationshipKind) -> bool {
        self.edges_from(from)
            .any(|r| r.kind == kind && r.to_symbol_id == Some(to))
    }

    /// Distinct targets of call-like edges, in ascending id order.
    pub fn call_targets(&self, id: SymbolId) -> Vec<SymbolId> {
        let targets: BTreeSet<SymbolId> = self
            .edges_from(id)
            .filter(|r| r.kind.is_call_like())
            .filter_map(|r| r.to_symbol_id)
            .collect();
        targets.into_iter().collect()
    }

    pub fn callers(&self, id: SymbolId) -> Vec<SymbolId> {
        let sources: BTreeSet<SymbolId> = self
            .edges_to(id)
            .filter(|r| r.kind.is_call_like())
            .map(|r| r.from_symbol_id)
            .collect();
        sources.into_iter().collect()
    }

    /// Ancestors along inherits/implements edges, nearest first, each with
    /// its distance. Cycles in declared hierarchies are tolerated.
    pub fn ancestors(&self, id: SymbolId, max_depth: usize) -> Vec<(SymbolId, usize)> {
        let mut visited = HashSet::from([id]);
        let mut queue = VecDeque::from([(id, 0usize)]);
        let mut out = Vec::new();

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let mut bases: Vec<SymbolId> = self
                .edges_from(current)
                .filter(|r| r.kind.is_hierarchy())
                .filter_map(|r| r.to_symbol_id)
                .collect();
            bases.sort();
            bases.dedup();
            for base in bases {
                if visited.insert(base) {
                    out.push((base, depth + 1));
                    queue.push_back((base, depth + 1));
                }
            }
        }
        out
    }

    /// Strongly connected components of the call-like subgraph that contain
    /// a real cycle (two or more members, or a self call).
    pub fn call_cycles(&self) -> Vec<Vec<SymbolId>> {
        let mut ids: Vec<SymbolId> = self.symbols.iter().map(|s| s.id).collect();
        ids.sort();

        let mut tarjan = Tarjan::default();
        for id in &ids {
            if !tarjan.index.contains_key(id) {
                tarjan.visit(self, *id);
            }
        }

        tarjan
            .components
            .into_iter()
            .filter(|c| c.len() > 1 || self.call_targets(c[0]).contains(&c[0]))
            .map(|mut c| {
                c.sort();
                c
            })
            .collect()
    }

    pub fn stats(&self) -> GraphStats {
        let resolved = self.relationships.iter().filter(|r| r.is_resolved()).count();
        GraphStats {
            total_symbols: self.symbols.len(),
            total_relationships: self.relationships.len(),
            resolved_relationships: resolved,
            unresolved_relationships: self.relationships.len() - resolved,
            files: self.by_file.len(),
        }
    }
}

/// Iterative Tarjan SCC over call-like edges.
#[derive(Default)]
struct Tarjan {
    counter: usize,
    index: HashMap<SymbolId, usize>,
    lowlink: HashMap<SymbolId, usize>,
    stack: Vec<SymbolId>,
    on_stack: HashSet<SymbolId>,
    components: Vec<Vec<SymbolId>>,
}

impl Tarjan {
    fn visit(&mut self, graph: &SymbolGraph, root: SymbolId) {
        // (node, successors, next successor position)
        let mut work: Vec<(SymbolId, Vec<SymbolId>, usize)> = Vec::new();
        self.open(root);
        work.push((root, graph.call_targets(root), 0));

        while let Some((node, succs, pos)) = work.last_mut() {
            let node = *node;
            if *pos < succs.len() {
                let next = succs[*pos];
                *pos += 1;
                if !self.index.contains_key(&next) {
                    self.open(next);
                    work.push((next, graph.call_targets(next), 0));
                } else if self.on_stack.contains(&next) {
                    let low = self.lowlink[&node].min(self.index[&next]);
                    self.lowlink.insert(node, low);
                }
                continue;
            }

            work.pop();
            if let Some((parent, _, _)) = work.last() {
                let low = self.lowlink[parent].min(self.lowlink[&node]);
                self.lowlink.insert(*parent, low);
            }
            if self.lowlink[&node] == self.index[&node] {
                let mut component = Vec::new();
                while let Some(member) = self.stack.pop() {
                    self.on_stack.remove(&member);
                    component.push(member);
                    if member == node {
                        break;
                    }
                }
                self.components.push(component);
            }
        }
    }

    fn open(&mut self, id: SymbolId) {
        self.index.insert(id, self.counter);
        self.lowlink.insert(id, self.counter);
        self.counter += 1;
        self.stack.push(id);
        self.on_stack.insert(id);
    }
}

#[derive(Debug, Clone)]
pub struct GraphStats {
    pub total_symbols: usize,
    pub total_relationships: usize,
    pub resolved_relationships: usize,
    pub unresolved_relationships: usize,
    pub files: usize,
}

impl std::fmt::Display for GraphStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Symbol Graph Statistics:")?;
        writeln!(f, "  Files: {}", self.files)?;
        writeln!(f, "  Symbols: {}", self.total_symbols)?;
        writeln!(
            f,
            "  Relationships: {} (resolved: {}, unresolved: {})",
            self.total_relationships, self.resolved_relationships, self.unresolved_relationships
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;
    use crate::symbol::SymbolKind;

    fn sym(id: i64, name: &str, kind: SymbolKind) -> Symbol {
        let mut s = Symbol::new(Language::Python, kind, name, format!("m.{}", name), "m.py", 1, 3);
        s.id = SymbolId(id);
        s
    }

    fn call(from: i64, to: i64) -> Relationship {
        Relationship::new(SymbolId(from), SymbolId(to), RelationshipKind::Calls)
    }

    #[test]
    fn test_callers_and_callees() {
        let graph = SymbolGraph::from_parts(
            vec![sym(1, "caller", SymbolKind::Function), sym(2, "callee", SymbolKind::Function)],
            vec![call(1, 2), call(1, 2)],
        );

        assert_eq!(graph.call_targets(SymbolId(1)), vec![SymbolId(2)]);
        assert_eq!(graph.callers(SymbolId(2)), vec![SymbolId(1)]);
        assert_eq!(graph.by_name("callee").len(), 1);
    }

    #[test]
    fn test_ancestors_tolerate_cycles() {
        let graph = SymbolGraph::from_parts(
            vec![
                sym(1, "A", SymbolKind::Class),
                sym(2, "B", SymbolKind::Class),
                sym(3, "C", SymbolKind::Class),
            ],
            vec![
                Relationship::new(SymbolId(1), SymbolId(2), RelationshipKind::Inherits),
                Relationship::new(SymbolId(2), SymbolId(3), RelationshipKind::Inherits),
                Relationship::new(SymbolId(3), SymbolId(1), RelationshipKind::Inherits),
            ],
        );

        let ancestors = graph.ancestors(SymbolId(1), 10);
        assert_eq!(ancestors, vec![(SymbolId(2), 1), (SymbolId(3), 2)]);
    }

    #[test]
    fn test_call_cycles() {
        let graph = SymbolGraph::from_parts(
            vec![
                sym(1, "a", SymbolKind::Function),
                sym(2, "b", SymbolKind::Function),
                sym(3, "c", SymbolKind::Function),
                sym(4, "d", SymbolKind::Function),
            ],
            vec![call(1, 2), call(2, 3), call(3, 1), call(3, 4)],
        );

        let cycles = graph.call_cycles();
        assert_eq!(cycles, vec![vec![SymbolId(1), SymbolId(2), SymbolId(3)]]);
    }

    #[test]
    fn test_unresolved_edges_stay_out_of_adjacency() {
        let graph = SymbolGraph::from_parts(
            vec![sym(1, "a", SymbolKind::Function)],
            vec![Relationship::unresolved(SymbolId(1), "missing", RelationshipKind::Calls)],
        );

        assert_eq!(graph.unresolved().count(), 1);
        assert!(graph.call_targets(SymbolId(1)).is_empty());
        assert_eq!(graph.stats().unresolved_relationships, 1);
    }
}
