//! Architectural insights from clusters and the relationship graph.

use super::SemanticConfig;
use super::types::{Insight, InsightCategory, InsightSeverity, SemanticCluster};
use crate::graph::SymbolGraph;
use crate::relationship::RelationshipKind;
use crate::symbol::{Symbol, SymbolId, SymbolKind, Visibility};
use crate::ProjectId;

pub fn generate_insights(
    project: ProjectId,
    graph: &SymbolGraph,
    clusters: &[SemanticCluster],
    config: &SemanticConfig,
) -> Vec<Insight> {
    let created_at = chrono::Utc::now().to_rfc3339();
    let mut out = Vec::new();
    let mut push = |found: Vec<Insight>| {
        out.extend(found.into_iter().take(config.max_insights_per_category));
    };

    push(duplication(graph, clusters, config));
    push(god_classes(graph, config));
    push(long_functions(graph, config));
    push(high_fan_out(graph, config));
    push(circular_calls(graph));
    push(unused_code(graph));

    for insight in &mut out {
        insight.project_id = project;
        insight.created_at = created_at.clone();
    }
    out
}

fn insight(
    severity: InsightSeverity,
    category: InsightCategory,
    title: String,
    description: String,
    affected: Vec<SymbolId>,
    recommendations: &[&str],
    confidence: f32,
) -> Insight {
    Insight {
        id: 0,
        project_id: 0,
        severity,
        category,
        title,
        description,
        affected_symbols: affected,
        recommendations: recommendations.iter().map(|r| r.to_string()).collect(),
        confidence: confidence.clamp(0.0, 1.0),
        created_at: String::new(),
    }
}

fn names(graph: &SymbolGraph, ids: &[SymbolId]) -> String {
    ids.iter()
        .filter_map(|id| graph.get(*id))
        .map(|s| s.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn duplication(graph: &SymbolGraph, clusters: &[SemanticCluster], config: &SemanticConfig) -> Vec<Insight> {
    clusters
        .iter()
        .filter(|c| c.cohesion >= config.duplicate_threshold)
        .filter_map(|cluster| {
            let ids: Vec<SymbolId> = cluster
                .members
                .iter()
                .map(|m| m.symbol_id)
                .filter(|id| graph.get(*id).is_some_and(|s| s.kind.is_callable()))
                .collect();
            if ids.len() < 2 {
                return None;
            }
            Some(insight(
                InsightSeverity::Warning,
                InsightCategory::Duplication,
                format!("{} near-duplicate functions ({})", ids.len(), cluster.label),
                format!("These functions are nearly identical: {}", names(graph, &ids)),
                ids,
                &["Extract the shared logic into one function", "Delete copies that are no longer used"],
                cluster.cohesion,
            ))
        })
        .collect()
}

fn god_classes(graph: &SymbolGraph, config: &SemanticConfig) -> Vec<Insight> {
    graph
        .symbols()
        .iter()
        .filter(|s| s.kind.is_type())
        .filter_map(|ty| {
            let methods = graph.children(ty.id).into_iter().filter(|c| c.kind.is_callable()).count();
            if methods < config.god_class_methods {
                return None;
            }
            let severity = if methods >= config.god_class_methods * 2 {
                InsightSeverity::Critical
            } else {
                InsightSeverity::Warning
            };
            Some(insight(
                severity,
                InsightCategory::GodClass,
                format!("{} has {} methods", ty.name, methods),
                format!("{} ({}) concentrates too many responsibilities", ty.qualified_name, ty.file_path),
                vec![ty.id],
                &["Split the type along its responsibilities", "Move helpers into collaborating types"],
                0.8,
            ))
        })
        .collect()
}

fn long_functions(graph: &SymbolGraph, config: &SemanticConfig) -> Vec<Insight> {
    graph
        .symbols()
        .iter()
        .filter(|s| s.kind.is_callable() && s.span_lines() as usize >= config.long_function_lines)
        .map(|s| {
            let lines = s.span_lines() as usize;
            let severity = if lines >= config.long_function_lines * 2 {
                InsightSeverity::Warning
            } else {
                InsightSeverity::Info
            };
            insight(
                severity,
                InsightCategory::LongFunction,
                format!("{} is {} lines long", s.name, lines),
                format!("{} spans {}:{}-{}", s.qualified_name, s.file_path, s.line, s.end_line),
                vec![s.id],
                &["Break the function into smaller steps"],
                0.9,
            )
        })
        .collect()
}

fn high_fan_out(graph: &SymbolGraph, config: &SemanticConfig) -> Vec<Insight> {
    graph
        .symbols()
        .iter()
        .filter(|s| s.kind.is_callable())
        .filter_map(|s| {
            let targets = graph.call_targets(s.id);
            if targets.len() < config.fan_out_threshold {
                return None;
            }
            let mut affected = vec![s.id];
            affected.extend(targets.iter().copied());
            Some(insight(
                InsightSeverity::Warning,
                InsightCategory::HighFanOut,
                format!("{} calls {} different functions", s.name, targets.len()),
                format!("{} depends on many collaborators", s.qualified_name),
                affected,
                &["Introduce an intermediate abstraction", "Split orchestration from the work it delegates"],
                0.75,
            ))
        })
        .collect()
}

fn circular_calls(graph: &SymbolGraph) -> Vec<Insight> {
    graph
        .call_cycles()
        .into_iter()
        .filter(|cycle| cycle.len() > 1)
        .map(|cycle| {
            insight(
                InsightSeverity::Warning,
                InsightCategory::CircularDependency,
                format!("Call cycle between {} functions", cycle.len()),
                format!("These functions call each other in a cycle: {}", names(graph, &cycle)),
                cycle,
                &["Break the cycle by inverting one dependency"],
                0.85,
            )
        })
        .collect()
}

/// Private callables nothing refers to.
fn unused_code(graph: &SymbolGraph) -> Vec<Insight> {
    let entry_like = |s: &Symbol| {
        matches!(s.name.as_str(), "main" | "init" | "__init__" | "setup" | "teardown")
            || s.kind == SymbolKind::Constructor
            || s.name.starts_with("__")
            || s.semantic_tags.iter().any(|t| t == "test" || t.starts_with("route:") || t.starts_with("decorator:"))
    };

    graph
        .symbols()
        .iter()
        .filter(|s| s.kind.is_callable())
        .filter(|s| matches!(s.visibility, Visibility::Private | Visibility::Internal) || s.name.starts_with('_'))
        .filter(|s| !s.is_exported && !entry_like(s))
        .filter(|s| graph.edges_to(s.id).all(|r| r.kind == RelationshipKind::Contains))
        .filter(|s| graph.edges_from_by_kind(s.id, RelationshipKind::Overrides).is_empty())
        .map(|s| {
            insight(
                InsightSeverity::Info,
                InsightCategory::UnusedCode,
                format!("{} appears unused", s.name),
                format!("No reference to {} ({}:{}) was found", s.qualified_name, s.file_path, s.line),
                vec![s.id],
                &["Remove the function or add a caller"],
                0.6,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;
    use crate::relationship::Relationship;

    fn func(id: i64, name: &str, lines: u32) -> Symbol {
        let mut s = Symbol::new(Language::Go, SymbolKind::Function, name, format!("main.{}", name), "main.go", 1, lines);
        s.id = SymbolId(id);
        s
    }

    #[test]
    fn test_graph_insights() {
        let mut helper = func(4, "helper", 3);
        helper.visibility = Visibility::Internal;
        let graph = SymbolGraph::from_parts(
            vec![func(1, "a", 5), func(2, "b", 5), func(3, "big", 400), helper],
            vec![
                Relationship::new(SymbolId(1), SymbolId(2), RelationshipKind::Calls),
                Relationship::new(SymbolId(2), SymbolId(1), RelationshipKind::Calls),
            ],
        );
        let insights = generate_insights(9, &graph, &[], &SemanticConfig::default());

        let cycle = insights.iter().find(|i| i.category == InsightCategory::CircularDependency).unwrap();
        assert_eq!(cycle.affected_symbols, vec![SymbolId(1), SymbolId(2)]);

        let long = insights.iter().find(|i| i.category == InsightCategory::LongFunction).unwrap();
        assert_eq!(long.affected_symbols, vec![SymbolId(3)]);
        assert_eq!(long.severity, InsightSeverity::Warning);

        let unused = insights.iter().find(|i| i.category == InsightCategory::UnusedCode).unwrap();
        assert_eq!(unused.affected_symbols, vec![SymbolId(4)]);
        assert!(insights.iter().all(|i| i.project_id == 9 && !i.created_at.is_empty()));
    }
}
