//! Reference resolution
//!
//! Binds relationships that only carry a `target_name` to a concrete symbol.
//! Strategies run from most to least specific; each candidate is scored by
//! the strategy that found it and the best one wins, ties going to the
//! lowest symbol id. Bridge edges resolve across languages; everything else
//! stays within the source symbol's language.

use super::{EnrichmentConfig, PassOutcome};
use crate::graph::SymbolGraph;
use crate::qualified::{is_self_receiver, receiver, simple_name, split_segments};
use crate::relationship::{Relationship, RelationshipKind};
use crate::storage::{BindOutcome, GraphStore};
use crate::symbol::{Symbol, SymbolId, SymbolKind};
use crate::{ProjectId, Result};
use rusqlite::Connection;

/// Strategy used to resolve a reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStrategy {
    /// Target text equals a qualified name
    QualifiedName,
    /// Found in the same file
    SameFile,
    /// `self.x()` / `this.x()` on the enclosing type
    SelfReceiver,
    /// `Type.x()` / `Type::x()`
    ReceiverClass,
    /// Declared on a base type of the enclosing type
    Inheritance,
    /// Target text is a suffix of a qualified name (imports)
    QualifiedSuffix,
    /// gRPC service, script path or HTTP route in another language
    Bridge,
    /// Project-wide name match
    GlobalName,
}

impl ResolutionStrategy {
    /// Get the confidence score for this strategy
    pub fn confidence(&self) -> f32 {
        match self {
            Self::QualifiedName => 1.0,
            Self::SameFile => 0.95,
            Self::SelfReceiver => 0.95,
            Self::ReceiverClass => 0.9,
            Self::QualifiedSuffix => 0.9,
            Self::Inheritance => 0.85,
            Self::Bridge => 0.8,
            Self::GlobalName => 0.7,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QualifiedName => "qualified_name",
            Self::SameFile => "same_file",
            Self::SelfReceiver => "self_receiver",
            Self::ReceiverClass => "receiver_class",
            Self::Inheritance => "inheritance",
            Self::QualifiedSuffix => "qualified_suffix",
            Self::Bridge => "bridge",
            Self::GlobalName => "global_name",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    symbol: SymbolId,
    strategy: ResolutionStrategy,
    confidence: f32,
}

/// Bind every unresolved relationship of the project that can be bound.
///
/// Hierarchy edges go first so that self-receiver calls can already see
/// the base classes resolved in this same run.
pub fn resolve_symbol_references(conn: &Connection, project: ProjectId, config: &EnrichmentConfig) -> Result<PassOutcome> {
    let store = GraphStore::new(conn);
    let mut graph = store.load_graph(project)?;

    let mut pending = store.unresolved_relationships(project)?;
    pending.sort_by_key(|r| (!r.kind.is_hierarchy(), r.id));

    let mut outcome = PassOutcome::default();
    for rel in pending {
        let Some(candidate) = Resolver::new(&graph, config).resolve(&rel) else {
            outcome.misses += 1;
            continue;
        };
        let confidence = rel.confidence.min(candidate.confidence);
        match store.bind_relationship(rel.id, candidate.symbol, confidence, candidate.strategy.as_str())? {
            BindOutcome::Bound => {
                outcome.changes += 1;
                let mut bound = rel.clone();
                bound.to_symbol_id = Some(candidate.symbol);
                bound.confidence = confidence;
                graph.add_relationship(bound);
            }
            BindOutcome::Merged => outcome.changes += 1,
            BindOutcome::Missing => {}
        }
    }

    tracing::debug!(project, resolved = outcome.changes, misses = outcome.misses, "references resolved");
    Ok(outcome)
}

struct Resolver<'g> {
    graph: &'g SymbolGraph,
    config: &'g EnrichmentConfig,
}

impl<'g> Resolver<'g> {
    fn new(graph: &'g SymbolGraph, config: &'g EnrichmentConfig) -> Self {
        Self { graph, config }
    }

    fn resolve(&self, rel: &Relationship) -> Option<Candidate> {
        let target = rel.target_name.as_deref()?.trim();
        let from = self.graph.get(rel.from_symbol_id)?;
        if target.is_empty() {
            return None;
        }

        if rel.kind.is_bridge() {
            return self.resolve_bridge(rel, from, target);
        }

        let mut candidates = Vec::new();
        // Recursion is the only edge allowed to point back at its source.
        let accepts = |s: &Symbol| {
            s.language == from.language
                && accepts_kind(rel.kind, s.kind)
                && (s.id != from.id || rel.kind == RelationshipKind::Calls)
        };

        // Exact qualified name.
        for symbol in self.graph.by_qualified_name(target) {
            if accepts(symbol) {
                candidates.push(self.candidate(symbol, ResolutionStrategy::QualifiedName));
            }
        }
        if let Some(best) = best(&candidates) {
            return Some(best);
        }

        let name = simple_name(target);
        let receiver = receiver(target);

        match receiver {
            Some(recv) if is_self_receiver(recv) => {
                if let Some(owner) = self.enclosing_type(from) {
                    candidates.extend(self.members_named(owner, name, ResolutionStrategy::SelfReceiver, &accepts));
                    for (base, _) in self.graph.ancestors(owner, self.config.max_hierarchy_depth) {
                        candidates.extend(self.members_named(base, name, ResolutionStrategy::Inheritance, &accepts));
                    }
                }
            }
            Some(recv) => {
                for owner in self.graph.by_name(recv).into_iter().filter(|s| s.kind.is_type() && s.language == from.language) {
                    candidates.extend(self.members_named(owner.id, name, ResolutionStrategy::ReceiverClass, &accepts));
                }
            }
            None => {}
        }
        if let Some(best) = best(&candidates) {
            return Some(best);
        }

        // Same file, by simple name.
        for symbol in self.graph.in_file(&from.file_path) {
            if symbol.name == name && accepts(symbol) {
                candidates.push(self.candidate(symbol, ResolutionStrategy::SameFile));
            }
        }
        if let Some(best) = best(&candidates) {
            return Some(best);
        }

        // Imports and dotted references: match the tail of qualified names.
        let segments = split_segments(target);
        if segments.len() > 1 {
            for symbol in self.graph.by_name(name) {
                if accepts(symbol) && ends_with_segments(&symbol.qualified_name, &segments) {
                    candidates.push(self.candidate(symbol, ResolutionStrategy::QualifiedSuffix));
                }
            }
            if let Some(best) = best(&candidates) {
                return Some(best);
            }
        }

        if rel.kind == RelationshipKind::Imports {
            // Module imports resolve to the module symbol, never to a same-named member.
            // Go import paths: `example.com/shop/proto` -> `proto`
            let module = target.rsplit('/').next().unwrap_or(target);
            let module = split_segments(module).last().copied().unwrap_or(module);
            for symbol in self.graph.by_name(module) {
                if symbol.kind == SymbolKind::Module && symbol.language == from.language {
                    candidates.push(self.candidate(symbol, ResolutionStrategy::QualifiedSuffix));
                }
            }
            return best(&candidates);
        }

        if self.config.global_name_fallback {
            for symbol in self.graph.by_name(name) {
                if accepts(symbol) {
                    candidates.push(self.candidate(symbol, ResolutionStrategy::GlobalName));
                }
            }
        }
        best(&candidates)
    }

    fn resolve_bridge(&self, rel: &Relationship, from: &Symbol, target: &str) -> Option<Candidate> {
        let mut candidates = Vec::new();
        let foreign_first = |s: &Symbol| if s.language != from.language { 0.0 } else { 0.1 };

        match rel.kind {
            RelationshipKind::GrpcCalls => {
                let service = rel.metadata_str("service").unwrap_or(target);
                let names = [
                    format!("{}Service", service),
                    format!("{}ServiceServer", service),
                    format!("{}Servicer", service),
                    format!("{}Server", service),
                    format!("{}ServiceImpl", service),
                    service.to_string(),
                ];
                for name in &names {
                    for symbol in self.graph.by_name(name) {
                        if symbol.kind.is_type() && !symbol.is_abstract {
                            let mut c = self.candidate(symbol, ResolutionStrategy::Bridge);
                            c.confidence -= foreign_first(symbol);
                            candidates.push(c);
                        }
                    }
                }
            }
            RelationshipKind::InvokesScript => {
                let script = target.trim_start_matches("./");
                for symbol in self.graph.symbols().iter().filter(|s| s.kind == SymbolKind::Module) {
                    if symbol.file_path == script || symbol.file_path.ends_with(&format!("/{}", script)) {
                        candidates.push(self.candidate(symbol, ResolutionStrategy::Bridge));
                    }
                }
            }
            RelationshipKind::HttpCalls => {
                let method = rel.metadata_str("method");
                for symbol in self.graph.symbols().iter().filter(|s| s.kind.is_callable()) {
                    let routes = symbol.semantic_tags.iter().filter_map(|t| t.strip_prefix("route:"));
                    for route in routes {
                        if !route_matches(route, target) {
                            continue;
                        }
                        let mut c = self.candidate(symbol, ResolutionStrategy::Bridge);
                        c.confidence -= foreign_first(symbol);
                        let handler_method = symbol.language_features.get("http_method").map(String::as_str);
                        if let (Some(want), Some(have)) = (method, handler_method) {
                            if !want.eq_ignore_ascii_case(have) {
                                c.confidence -= 0.2;
                            }
                        }
                        candidates.push(c);
                    }
                }
            }
            RelationshipKind::Spawns => {
                let program = simple_name(target.rsplit('/').next().unwrap_or(target));
                for symbol in self.graph.symbols().iter().filter(|s| s.kind == SymbolKind::Module) {
                    let stem = symbol
                        .file_path
                        .rsplit('/')
                        .next()
                        .and_then(|f| f.split('.').next())
                        .unwrap_or("");
                    if stem == program && symbol.language != from.language {
                        candidates.push(self.candidate(symbol, ResolutionStrategy::Bridge));
                    }
                }
            }
            _ => {}
        }
        best(&candidates)
    }

    fn candidate(&self, symbol: &Symbol, strategy: ResolutionStrategy) -> Candidate {
        Candidate {
            symbol: symbol.id,
            strategy,
            confidence: strategy.confidence(),
        }
    }

    /// Type that owns `symbol`: its nearest type ancestor, or the type
    /// named by an out-of-line `impl_for` feature.
    fn enclosing_type(&self, symbol: &Symbol) -> Option<SymbolId> {
        let mut current = symbol.parent_symbol_id;
        while let Some(id) = current {
            let parent = self.graph.get(id)?;
            if parent.kind.is_type() {
                return Some(id);
            }
            current = parent.parent_symbol_id;
        }
        let owner = symbol.language_features.get("impl_for")?;
        self.graph
            .by_name(owner)
            .into_iter()
            .filter(|s| s.kind.is_type() && s.language == symbol.language)
            .map(|s| s.id)
            .min()
    }

    fn members_named(
        &self,
        owner: SymbolId,
        name: &str,
        strategy: ResolutionStrategy,
        accepts: &dyn Fn(&Symbol) -> bool,
    ) -> Vec<Candidate> {
        let mut members: Vec<Candidate> = self
            .graph
            .children(owner)
            .into_iter()
            .filter(|s| s.name == name && accepts(s))
            .map(|s| self.candidate(s, strategy))
            .collect();
        // Methods declared in another file than their type
        if let Some(owner) = self.graph.get(owner) {
            members.extend(
                self.graph
                    .by_name(name)
                    .into_iter()
                    .filter(|s| s.language == owner.language && accepts(s))
                    .filter(|s| s.language_features.get("impl_for") == Some(&owner.name))
                    .map(|s| self.candidate(s, strategy)),
            );
        }
        members
    }
}

/// Highest confidence, then lowest id.
fn best(candidates: &[Candidate]) -> Option<Candidate> {
    candidates.iter().copied().min_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.symbol.cmp(&b.symbol))
    })
}

fn accepts_kind(rel: RelationshipKind, kind: SymbolKind) -> bool {
    match rel {
        // Constructor calls name the type.
        RelationshipKind::Calls => kind.is_callable() || kind.is_type(),
        RelationshipKind::Inherits | RelationshipKind::Implements => kind.is_type(),
        RelationshipKind::Imports => kind != SymbolKind::Variable,
        _ => true,
    }
}

fn ends_with_segments(qualified: &str, segments: &[&str]) -> bool {
    let own = split_segments(qualified);
    // `crate::` and `self.` prefixes never appear in stored names.
    let wanted: Vec<&str> = segments
        .iter()
        .copied()
        .filter(|s| !matches!(*s, "crate" | "self" | "super"))
        .collect();
    !wanted.is_empty() && own.len() >= wanted.len() && own[own.len() - wanted.len()..] == wanted[..]
}

/// Compare a declared route with a called path; parameter segments
/// (`:id`, `{id}`, `<int:id>`, `${id}`) match anything.
pub fn route_matches(route: &str, target: &str) -> bool {
    let is_param = |s: &str| {
        s.starts_with(':') || (s.starts_with('{') && s.ends_with('}')) || (s.starts_with('<') && s.ends_with('>')) || s.starts_with("${")
    };
    let split = |p: &str| -> Vec<String> {
        p.trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    };
    let route = split(route);
    let target = split(target);
    route.len() == target.len()
        && route
            .iter()
            .zip(&target)
            .all(|(r, t)| r == t || is_param(r) || is_param(t))
}
