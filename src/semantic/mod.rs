//! Semantic Intelligence
//!
//! Runs after enrichment over a batch of indexed files:
//!
//! 1. context extraction around each symbol ([`context`])
//! 2. local embeddings, versioned and recomputed only when stale ([`embedding`])
//! 3. clustering by cosine proximity ([`cluster`])
//! 4. architectural insights from clusters and the graph ([`insight`])
//!
//! Files are embedded in parallel, at most `batch_size` at a time, and each
//! file's embedding work runs under a timeout. A file that fails or times
//! out lands in the report's error list; the rest of the batch goes on.
//! Clustering and insight generation run under their own timeout outside
//! any write transaction; if they overrun, the previous clusters and
//! insights are kept.

pub mod cluster;
pub mod context;
pub mod embedding;
pub mod insight;
pub mod types;

pub use types::{
    ALGORITHM_VERSION, EMBEDDING_DIMENSION, Insight, InsightCategory, InsightSeverity, SemanticCluster,
    SemanticError, SemanticInsights, SemanticReport,
};

use crate::graph::SymbolGraph;
use crate::indexer::SourceFile;
use crate::storage::{ConnectionPool, GraphStore};
use crate::symbol::{Symbol, SymbolId};
use crate::{Error, ProjectId, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticConfig {
    pub enabled: bool,
    /// Files embedded concurrently
    pub batch_size: usize,
    /// Budget for one file's embedding work
    pub file_timeout_ms: u64,
    /// Budget for project-wide clustering and insight generation
    pub analysis_timeout_ms: u64,
    /// Body lines read per symbol
    pub context_lines: usize,
    pub cluster_threshold: f32,
    pub min_cluster_size: usize,
    /// Cluster cohesion from which members count as duplicates
    pub duplicate_threshold: f32,
    pub god_class_methods: usize,
    pub long_function_lines: usize,
    pub fan_out_threshold: usize,
    pub max_insights_per_category: usize,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: 8,
            file_timeout_ms: 5_000,
            analysis_timeout_ms: 30_000,
            context_lines: 12,
            cluster_threshold: 0.85,
            min_cluster_size: 2,
            duplicate_threshold: 0.95,
            god_class_methods: 20,
            long_function_lines: 80,
            fan_out_threshold: 15,
            max_insights_per_category: 50,
        }
    }
}

impl SemanticConfig {
    pub fn file_timeout(&self) -> Duration {
        Duration::from_millis(self.file_timeout_ms)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_millis(self.analysis_timeout_ms)
    }
}

/// Symbols worth embedding: code, not data.
fn embeddable(symbol: &Symbol) -> bool {
    symbol.kind.is_callable() || symbol.kind.is_type()
}

/// Embed every symbol of one file.
pub fn embed_file(symbols: &[Symbol], source: &str, context_lines: usize) -> Vec<(SymbolId, Vec<f32>)> {
    symbols
        .iter()
        .map(|s| {
            let ctx = context::extract_context(s, source, context_lines);
            (s.id, embedding::embed(&ctx))
        })
        .collect()
}

/// Run blocking semantic work for `path` under `timeout`.
pub async fn run_with_timeout<T, F>(path: &str, timeout: Duration, work: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(work)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(Error::SemanticStage {
            path: path.to_string(),
            message: err.to_string(),
        }),
        Err(_) => Err(Error::SemanticStage {
            path: path.to_string(),
            message: format!("timed out after {}ms", timeout.as_millis()),
        }),
    }
}

pub struct SemanticOrchestrator {
    pool: ConnectionPool,
    config: SemanticConfig,
}

impl SemanticOrchestrator {
    pub fn new(pool: ConnectionPool, config: SemanticConfig) -> Self {
        Self { pool, config }
    }

    pub async fn analyze(&self, project: ProjectId, files: &[SourceFile]) -> Result<SemanticReport> {
        let started = Instant::now();
        let (graph, versions) = self
            .pool
            .with_connection(move |conn| {
                let store = GraphStore::new(conn);
                Ok((store.load_graph(project)?, store.embedding_versions(project)?))
            })
            .await?;
        let graph = Arc::new(graph);

        let mut report = SemanticReport::default();
        let permits = Arc::new(Semaphore::new(self.config.batch_size.max(1)));
        let mut tasks = JoinSet::new();
        let mut pending: HashMap<tokio::task::Id, String> = HashMap::new();

        for file in files {
            let in_file: Vec<&Symbol> = graph.in_file(&file.path).into_iter().filter(|s| embeddable(s)).collect();
            report.symbols_analyzed += in_file.len();
            let stale: Vec<Symbol> = in_file
                .into_iter()
                .filter(|s| versions.get(&s.id).is_none_or(|v| *v < ALGORITHM_VERSION))
                .cloned()
                .collect();
            if stale.is_empty() {
                continue;
            }

            let permits = Arc::clone(&permits);
            let path = file.path.clone();
            let content = file.content.clone();
            let timeout = self.config.file_timeout();
            let window = self.config.context_lines;
            let handle = tasks.spawn(async move {
                match permits.acquire_owned().await {
                    Ok(_permit) => run_with_timeout(&path, timeout, move || embed_file(&stale, &content, window)).await,
                    Err(err) => Err(Error::Task(err.to_string())),
                }
            });
            pending.insert(handle.id(), file.path.clone());
        }

        let mut computed = Vec::new();
        while let Some(joined) = tasks.join_next_with_id().await {
            let (path, result) = match joined {
                Ok((id, result)) => (pending.remove(&id).unwrap_or_default(), result),
                Err(err) => (pending.remove(&err.id()).unwrap_or_default(), Err(Error::from(err))),
            };
            match result {
                Ok(vectors) => computed.extend(vectors),
                Err(err) => {
                    tracing::warn!(path = %path, error = %err, "semantic stage failed for file");
                    report.errors.push(SemanticError {
                        file_path: path,
                        message: err.to_string(),
                    });
                }
            }
        }
        computed.sort_by_key(|(id, _)| *id);
        report.embeddings_generated = computed.len();

        let embeddings = self
            .pool
            .with_transaction(move |tx| {
                let store = GraphStore::new(tx);
                for (id, vector) in &computed {
                    store.upsert_embedding(project, *id, vector, ALGORITHM_VERSION)?;
                }
                store.embeddings(project)
            })
            .await?;

        let config = self.config.clone();
        let shared = Arc::clone(&graph);
        let analysis = run_with_timeout("", self.config.analysis_timeout(), move || {
            let names = name_tokens(&shared, &embeddings);
            let clusters = cluster::cluster_embeddings(
                project,
                &embeddings,
                &names,
                config.cluster_threshold,
                config.min_cluster_size,
            );
            let insights = insight::generate_insights(project, &shared, &clusters, &config);
            (clusters, insights)
        })
        .await;

        match analysis {
            Ok((clusters, insights)) => {
                let (clusters, insights) = self
                    .pool
                    .with_transaction(move |tx| {
                        let store = GraphStore::new(tx);
                        Ok((store.replace_clusters(project, &clusters)?, store.replace_insights(project, &insights)?))
                    })
                    .await?;
                report.clusters_created = clusters;
                report.insights_generated = insights;
            }
            Err(err) => {
                tracing::warn!(project, error = %err, "clustering and insights skipped");
                report.errors.push(SemanticError {
                    file_path: String::new(),
                    message: format!("clustering: {}", err),
                });
            }
        }
        report.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(project, %report, "semantic analysis finished");
        Ok(report)
    }

    pub async fn insights(&self, project: ProjectId) -> Result<SemanticInsights> {
        self.pool
            .with_connection(move |conn| {
                let store = GraphStore::new(conn);
                Ok(SemanticInsights {
                    clusters: store.clusters(project)?,
                    insights: store.insights(project)?,
                })
            })
            .await
    }
}

fn name_tokens(graph: &SymbolGraph, embeddings: &[(SymbolId, Vec<f32>)]) -> HashMap<SymbolId, Vec<String>> {
    embeddings
        .iter()
        .filter_map(|(id, _)| graph.get(*id).map(|s| (*id, context::identifier_tokens(&s.name))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{ParseOptions, default_registry};
    use crate::language::Language;
    use crate::storage::{PoolConfig, initialize_database};

    #[tokio::test]
    async fn test_timeout_becomes_semantic_stage_error() {
        let err = run_with_timeout("slow.py", Duration::from_millis(10), || {
            std::thread::sleep(Duration::from_millis(300));
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::SemanticStage { ref path, .. } if path == "slow.py"));
    }

    #[tokio::test]
    async fn test_clustering_overrun_keeps_embeddings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");
        let conn = initialize_database(&path).unwrap();
        let store = GraphStore::new(&conn);
        let project = store.ensure_project("p").unwrap();
        let source = "def load_user(user_id):\n    return db.fetch(user_id)\n";
        let result = default_registry().parse(Language::Python, "users.py", source, &ParseOptions::default());
        store.replace_file(project, Language::Python, &result, "h").unwrap();
        drop(conn);

        let pool = ConnectionPool::open(&path, PoolConfig::default()).unwrap();
        let config = SemanticConfig {
            analysis_timeout_ms: 0,
            ..SemanticConfig::default()
        };
        let orchestrator = SemanticOrchestrator::new(pool.clone(), config);
        let files = vec![SourceFile::new("users.py", Language::Python, source)];

        let report = orchestrator.analyze(project, &files).await.unwrap();
        assert_eq!(report.embeddings_generated, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].message.contains("timed out"));

        let stored = pool
            .with_connection(move |conn| GraphStore::new(conn).embeddings(project))
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_analyze_embeds_and_clusters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");
        let conn = initialize_database(&path).unwrap();
        let store = GraphStore::new(&conn);
        let project = store.ensure_project("p").unwrap();

        let source = "\
def load_user(user_id):
    return db.fetch(user_id)

def load_user_record(user_id):
    return db.fetch(user_id)

def render_chart(points):
    canvas.draw(points)
";
        let result = default_registry().parse(Language::Python, "users.py", source, &ParseOptions::default());
        store.replace_file(project, Language::Python, &result, "h").unwrap();
        drop(conn);

        let pool = ConnectionPool::open(&path, PoolConfig::default()).unwrap();
        let orchestrator = SemanticOrchestrator::new(pool, SemanticConfig::default());
        let files = vec![SourceFile::new("users.py", Language::Python, source)];

        let report = orchestrator.analyze(project, &files).await.unwrap();
        assert_eq!(report.symbols_analyzed, 3);
        assert_eq!(report.embeddings_generated, 3);
        assert!(report.errors.is_empty());

        // Current embeddings are not recomputed.
        let again = orchestrator.analyze(project, &files).await.unwrap();
        assert_eq!(again.embeddings_generated, 0);

        let found = orchestrator.insights(project).await.unwrap();
        assert_eq!(found.clusters.len(), again.clusters_created);
    }
}
