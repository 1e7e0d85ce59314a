//! Relationship Enrichment Pipeline
//!
//! Four ordered passes run over a fully parsed project:
//!
//! 1. [`resolve`] binds unresolved references to symbols
//! 2. [`call_chains`] materializes transitive call paths
//! 3. [`data_flow`] derives `dataflow` edges from call arguments
//! 4. [`overrides`] links methods across the class hierarchy
//!
//! Each pass is a plain function over a connection. The pipeline runs each
//! one in its own transaction, strictly in order. Re-running over an
//! unchanged graph changes nothing.

pub mod call_chains;
pub mod data_flow;
pub mod overrides;
pub mod resolve;

pub use call_chains::CallChain;

use crate::relationship::{Relationship, RelationshipKind};
use crate::storage::{ConnectionPool, GraphStore};
use crate::{ProjectId, Result};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Longest call chain, in edges
    pub max_chain_depth: usize,
    pub max_chains_per_entry: usize,
    /// Depth limit when walking the class hierarchy
    pub max_hierarchy_depth: usize,
    pub parameter_flow_confidence: f32,
    pub return_flow_confidence: f32,
    /// Override of a concrete base class method
    pub override_confidence: f32,
    /// Implementation of an interface or trait method
    pub interface_override_confidence: f32,
    /// Let references fall back to a project-wide name match
    pub global_name_fallback: bool,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            max_chain_depth: 10,
            max_chains_per_entry: 50,
            max_hierarchy_depth: 16,
            parameter_flow_confidence: 0.7,
            return_flow_confidence: 0.6,
            override_confidence: 0.9,
            interface_override_confidence: 0.85,
            global_name_fallback: true,
        }
    }
}

/// What one pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassOutcome {
    /// Rows inserted, updated or deleted
    pub changes: usize,
    /// References the pass could not bind
    pub misses: usize,
}

pub type PassFn = fn(&Connection, ProjectId, &EnrichmentConfig) -> Result<PassOutcome>;

/// Passes in execution order.
pub const PASSES: [(&str, PassFn); 4] = [
    ("resolve_references", resolve::resolve_symbol_references),
    ("build_call_chains", call_chains::build_call_chains),
    ("infer_data_flow", data_flow::infer_data_flow),
    ("discover_overrides", overrides::discover_virtual_overrides),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassReport {
    pub name: String,
    pub outcome: PassOutcome,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichmentReport {
    pub passes: Vec<PassReport>,
}

impl EnrichmentReport {
    pub fn total_changes(&self) -> usize {
        self.passes.iter().map(|p| p.outcome.changes).sum()
    }

    pub fn resolution_misses(&self) -> usize {
        self.passes
            .iter()
            .find(|p| p.name == "resolve_references")
            .map(|p| p.outcome.misses)
            .unwrap_or(0)
    }
}

impl std::fmt::Display for EnrichmentReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Enrichment:")?;
        for pass in &self.passes {
            writeln!(
                f,
                "  {}: {} changes, {} misses ({}ms)",
                pass.name, pass.outcome.changes, pass.outcome.misses, pass.duration_ms
            )?;
        }
        Ok(())
    }
}

pub struct EnrichmentPipeline {
    pool: ConnectionPool,
    config: EnrichmentConfig,
}

impl EnrichmentPipeline {
    pub fn new(pool: ConnectionPool, config: EnrichmentConfig) -> Self {
        Self { pool, config }
    }

    /// Run every pass in order, each in its own transaction. A failing pass
    /// rolls back and stops the run.
    pub async fn run(&self, project: ProjectId) -> Result<EnrichmentReport> {
        let mut report = EnrichmentReport::default();
        for (name, pass) in PASSES {
            let started = Instant::now();
            let config = self.config.clone();
            let outcome = self
                .pool
                .with_transaction(move |tx| pass(tx, project, &config))
                .await?;
            let duration_ms = started.elapsed().as_millis() as u64;
            tracing::info!(
                pass = name,
                project,
                changes = outcome.changes,
                misses = outcome.misses,
                duration_ms,
                "enrichment pass finished"
            );
            report.passes.push(PassReport {
                name: name.to_string(),
                outcome,
                duration_ms,
            });
        }
        Ok(report)
    }
}

/// Make the derived edges of `kind` equal `desired`: stale rows are deleted,
/// missing ones inserted. Returns the number of rows touched.
pub(crate) fn sync_derived_edges(
    store: &GraphStore<'_>,
    project: ProjectId,
    kind: RelationshipKind,
    desired: Vec<Relationship>,
) -> Result<usize> {
    let mut wanted: HashMap<(i64, i64), Relationship> = HashMap::new();
    for rel in desired {
        let Some(to) = rel.to_symbol_id else { continue };
        wanted.entry((rel.from_symbol_id.0, to.0)).or_insert(rel);
    }

    let mut changes = 0;
    for existing in store.derived_relationships(project, kind)? {
        let key = (existing.from_symbol_id.0, existing.to_symbol_id.map(|t| t.0).unwrap_or(-1));
        if wanted.remove(&key).is_none() && store.delete_relationship(existing.id)? {
            changes += 1;
        }
    }

    let mut inserts: Vec<Relationship> = wanted.into_values().collect();
    inserts.sort_by_key(|r| (r.from_symbol_id, r.to_symbol_id));
    for mut rel in inserts {
        rel.project_id = project;
        rel.kind = kind;
        rel.source_file = None;
        rel.target_name = None;
        if store.insert_relationship(&rel)? {
            changes += 1;
        }
    }
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{ParseOptions, default_registry};
    use crate::language::Language;
    use crate::storage::{PoolConfig, initialize_database};

    #[tokio::test]
    async fn test_pipeline_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");
        let conn = initialize_database(&path).unwrap();
        let store = GraphStore::new(&conn);
        let project = store.ensure_project("shop").unwrap();

        let registry = default_registry();
        let source = "\
class Base:
    def save(self, item):
        pass

class Repo(Base):
    def save(self, item):
        return self.validate(item)

    def validate(self, item):
        return item

def handle(order):
    repo = Repo()
    saved = repo.save(order)
    publish(saved)

def publish(event):
    pass
";
        let result = registry.parse(Language::Python, "shop.py", source, &ParseOptions::default());
        store.replace_file(project, Language::Python, &result, "h").unwrap();
        drop(conn);

        let pool = ConnectionPool::open(&path, PoolConfig::default()).unwrap();
        let pipeline = EnrichmentPipeline::new(pool.clone(), EnrichmentConfig::default());

        let first = pipeline.run(project).await.unwrap();
        assert_eq!(first.passes.len(), 4);
        assert!(first.total_changes() > 0);

        let second = pipeline.run(project).await.unwrap();
        assert_eq!(second.total_changes(), 0);

        let rels = pool
            .with_connection(move |conn| GraphStore::new(conn).project_relationships(project))
            .await
            .unwrap();
        assert!(rels.iter().any(|r| r.kind == RelationshipKind::Overrides));
        assert!(rels.iter().any(|r| r.kind == RelationshipKind::DataFlow));
    }
}
