//! Project indexing facade
//!
//! `ProjectIndexer` is the public surface of the library: it parses a batch
//! of files on a bounded worker pool, writes each file in its own
//! transaction, runs the enrichment pipeline and, optionally, the semantic
//! stage. Unchanged files (same blake3 content hash) are skipped.

use crate::adapter::{AdapterRegistry, ParseOptions, ParseResult, default_registry};
use crate::config::SymgraphConfig;
use crate::enrichment::{CallChain, EnrichmentConfig, EnrichmentPipeline, EnrichmentReport};
use crate::language::Language;
use crate::relationship::Relationship;
use crate::semantic::{SemanticConfig, SemanticInsights, SemanticOrchestrator, SemanticReport};
use crate::storage::{ConnectionPool, DbStats, FileWrite, GraphFilter, GraphStore};
use crate::symbol::Symbol;
use crate::{Error, ProjectId, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Extra attempts for a file write that hit `PoolExhausted`.
const POOL_RETRIES: usize = 2;

/// One input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Repository-relative path
    pub path: String,
    pub language: Language,
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, language: Language, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            language,
            content: content.into(),
        }
    }

    pub fn content_hash(&self) -> String {
        blake3::hash(self.content.as_bytes()).to_hex().to_string()
    }
}

#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Re-parse files whose content hash is unchanged
    pub force: bool,
    /// Delete indexed files that are not part of this batch
    pub prune_missing: bool,
    pub enrich: bool,
    pub semantic: bool,
    pub parse_workers: usize,
    pub max_reported_errors: usize,
    pub parse: ParseOptions,
    pub cancel: CancellationToken,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            force: false,
            prune_missing: false,
            enrich: true,
            semantic: true,
            parse_workers: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            max_reported_errors: 50,
            parse: ParseOptions::default(),
            cancel: CancellationToken::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileError {
    pub path: String,
    pub message: String,
}

/// Summary of one indexing run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub files_processed: usize,
    pub files_succeeded: usize,
    pub files_failed: usize,
    pub files_skipped: usize,
    pub files_removed: usize,
    pub symbols_found: usize,
    pub relationships_found: usize,
    pub patterns_found: usize,
    pub fallback_files: usize,
    /// Sampled; see `error_count` for the exact number
    pub errors: Vec<FileError>,
    pub error_count: usize,
    pub cancelled: bool,
    pub enrichment: Option<EnrichmentReport>,
    pub semantic: Option<SemanticReport>,
    pub duration_ms: u64,
}

impl IndexStats {
    fn record_error(&mut self, path: impl Into<String>, message: impl Into<String>, limit: usize) {
        self.error_count += 1;
        if self.errors.len() < limit {
            self.errors.push(FileError {
                path: path.into(),
                message: message.into(),
            });
        }
    }
}

impl std::fmt::Display for IndexStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Indexing Stats:")?;
        writeln!(
            f,
            "  Files: {} processed ({} ok, {} failed, {} unchanged, {} removed)",
            self.files_processed, self.files_succeeded, self.files_failed, self.files_skipped, self.files_removed
        )?;
        writeln!(f, "  Symbols: {}", self.symbols_found)?;
        writeln!(f, "  Relationships: {}", self.relationships_found)?;
        writeln!(f, "  Patterns: {}", self.patterns_found)?;
        writeln!(f, "  Errors: {}", self.error_count)?;
        if let Some(semantic) = &self.semantic {
            writeln!(f, "  Semantic: {}", semantic)?;
        }
        write!(f, "  Duration: {}ms", self.duration_ms)
    }
}

/// Symbols and relationships matching a [`GraphFilter`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub symbols: Vec<Symbol>,
    pub relationships: Vec<Relationship>,
}

/// What happened to one file task.
enum FileOutcome {
    Written { parse: ParseResult, write: FileWrite },
    Failed(Error),
    Cancelled,
}

pub struct ProjectIndexer {
    pool: ConnectionPool,
    registry: Arc<AdapterRegistry>,
    enrichment: EnrichmentConfig,
    semantic: SemanticConfig,
}

impl ProjectIndexer {
    pub fn new(pool: ConnectionPool) -> Self {
        Self {
            pool,
            registry: Arc::new(default_registry()),
            enrichment: EnrichmentConfig::default(),
            semantic: SemanticConfig::default(),
        }
    }

    pub fn from_config(pool: ConnectionPool, config: &SymgraphConfig) -> Self {
        Self::new(pool)
            .with_enrichment_config(config.enrichment.clone())
            .with_semantic_config(config.semantic.clone())
    }

    pub fn with_registry(mut self, registry: AdapterRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn with_enrichment_config(mut self, config: EnrichmentConfig) -> Self {
        self.enrichment = config;
        self
    }

    pub fn with_semantic_config(mut self, config: SemanticConfig) -> Self {
        self.semantic = config;
        self
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Index a batch of files into `project`.
    ///
    /// File-level failures are collected into the returned stats; only
    /// project-level failures (missing schema, closed or exhausted pool,
    /// cancellation before any work) are returned as `Err`.
    pub async fn index_project(&self, project: ProjectId, files: Vec<SourceFile>, options: &IndexOptions) -> Result<IndexStats> {
        let started = Instant::now();
        if options.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let known: HashMap<String, String> = self
            .pool
            .with_transaction(move |tx| {
                let store = GraphStore::new(tx);
                store.ensure_project_id(project)?;
                Ok(store
                    .indexed_files(project)?
                    .into_iter()
                    .map(|f| (f.path, f.content_hash))
                    .collect())
            })
            .await?;

        // Last occurrence of a path wins.
        let mut by_path: HashMap<String, SourceFile> = HashMap::new();
        for file in files {
            by_path.insert(file.path.clone(), file);
        }
        let mut files: Vec<SourceFile> = by_path.into_values().collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let mut stats = IndexStats {
            files_processed: files.len(),
            ..IndexStats::default()
        };
        tracing::info!(project, files = files.len(), force = options.force, "indexing started");

        let permits = Arc::new(Semaphore::new(options.parse_workers.max(1)));
        let mut tasks = JoinSet::new();
        // A task that panics or is aborted only reports its id.
        let mut pending: HashMap<tokio::task::Id, String> = HashMap::new();
        for file in &files {
            let hash = file.content_hash();
            if !options.force && known.get(&file.path) == Some(&hash) {
                stats.files_skipped += 1;
                continue;
            }
            let job = FileJob {
                project,
                file: file.clone(),
                hash,
                pool: self.pool.clone(),
                registry: Arc::clone(&self.registry),
                options: options.parse.clone(),
                cancel: options.cancel.clone(),
            };
            let permits = Arc::clone(&permits);
            let handle = tasks.spawn(async move {
                match permits.acquire_owned().await {
                    Ok(_permit) => job.run().await,
                    Err(err) => FileOutcome::Failed(Error::Task(err.to_string())),
                }
            });
            pending.insert(handle.id(), file.path.clone());
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            let (path, outcome) = match joined {
                Ok((id, outcome)) => (pending.remove(&id).unwrap_or_default(), outcome),
                Err(err) => {
                    let path = pending.remove(&err.id()).unwrap_or_default();
                    tracing::warn!(path = %path, error = %err, "file task did not complete");
                    stats.files_failed += 1;
                    stats.record_error(path, Error::from(err).to_string(), options.max_reported_errors);
                    continue;
                }
            };
            match outcome {
                FileOutcome::Written { parse, write } => {
                    stats.files_succeeded += 1;
                    stats.symbols_found += write.symbols;
                    stats.relationships_found += write.relationships;
                    stats.patterns_found += write.patterns;
                    if parse.stats.used_fallback {
                        stats.fallback_files += 1;
                    }
                    if let Some(first) = parse.stats.errors().next() {
                        let count = parse.stats.errors().count();
                        let message = if count > 1 {
                            format!("{} (and {} more syntax errors)", first, count - 1)
                        } else {
                            first.to_string()
                        };
                        stats.record_error(path, message, options.max_reported_errors);
                    }
                }
                FileOutcome::Cancelled => stats.cancelled = true,
                FileOutcome::Failed(err) if err.is_project_level() => {
                    tasks.abort_all();
                    tracing::error!(project, error = %err, "indexing aborted");
                    return Err(err);
                }
                FileOutcome::Failed(err) => {
                    tracing::warn!(path = %path, error = %err, "file failed to index");
                    stats.files_failed += 1;
                    stats.record_error(path, err.to_string(), options.max_reported_errors);
                }
            }
        }

        if options.prune_missing && !stats.cancelled {
            let keep: HashSet<String> = files.iter().map(|f| f.path.clone()).collect();
            let stale: Vec<String> = known.into_keys().filter(|p| !keep.contains(p)).collect();
            if !stale.is_empty() {
                stats.files_removed = self.remove_files(project, stale).await?;
            }
        }

        if options.enrich && !stats.cancelled {
            let pipeline = EnrichmentPipeline::new(self.pool.clone(), self.enrichment.clone());
            match pipeline.run(project).await {
                Ok(report) => stats.enrichment = Some(report),
                Err(err) if err.is_project_level() => return Err(err),
                Err(err) => stats.record_error("", format!("enrichment failed: {}", err), options.max_reported_errors),
            }
        }

        if options.semantic && self.semantic.enabled && !stats.cancelled {
            let orchestrator = SemanticOrchestrator::new(self.pool.clone(), self.semantic.clone());
            match orchestrator.analyze(project, &files).await {
                Ok(report) => stats.semantic = Some(report),
                Err(err) if err.is_project_level() => return Err(err),
                Err(err) => stats.record_error("", format!("semantic analysis failed: {}", err), options.max_reported_errors),
            }
        }

        stats.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            project,
            succeeded = stats.files_succeeded,
            failed = stats.files_failed,
            skipped = stats.files_skipped,
            symbols = stats.symbols_found,
            errors = stats.error_count,
            duration_ms = stats.duration_ms,
            "indexing finished"
        );
        Ok(stats)
    }

    pub async fn get_symbol_graph(&self, project: ProjectId, filter: GraphFilter) -> Result<GraphSnapshot> {
        self.pool
            .with_connection(move |conn| {
                let graph = GraphStore::new(conn).query_graph(project, &filter)?;
                Ok(GraphSnapshot {
                    symbols: graph.symbols().to_vec(),
                    relationships: graph.relationships().to_vec(),
                })
            })
            .await
    }

    pub async fn get_semantic_insights(&self, project: ProjectId) -> Result<SemanticInsights> {
        SemanticOrchestrator::new(self.pool.clone(), self.semantic.clone())
            .insights(project)
            .await
    }

    /// Delete files and everything they contributed. Returns how many were indexed.
    pub async fn remove_files(&self, project: ProjectId, paths: Vec<String>) -> Result<usize> {
        let removed = self
            .pool
            .with_transaction(move |tx| {
                let store = GraphStore::new(tx);
                let mut removed = 0;
                for path in &paths {
                    if store.remove_file(project, path)? {
                        removed += 1;
                    }
                }
                Ok(removed)
            })
            .await?;
        tracing::debug!(project, removed, "files removed");
        Ok(removed)
    }

    pub async fn get_call_chains(&self, project: ProjectId) -> Result<Vec<CallChain>> {
        self.pool
            .with_connection(move |conn| GraphStore::new(conn).call_chains(project))
            .await
    }

    pub async fn project_stats(&self, project: ProjectId) -> Result<DbStats> {
        self.pool
            .with_connection(move |conn| GraphStore::new(conn).stats(project))
            .await
    }
}

/// Parse and persist one file.
struct FileJob {
    project: ProjectId,
    file: SourceFile,
    hash: String,
    pool: ConnectionPool,
    registry: Arc<AdapterRegistry>,
    options: ParseOptions,
    cancel: CancellationToken,
}

impl FileJob {
    async fn run(self) -> FileOutcome {
        if self.cancel.is_cancelled() {
            return FileOutcome::Cancelled;
        }

        let registry = Arc::clone(&self.registry);
        let file = self.file.clone();
        let options = self.options.clone();
        let parsed = tokio::task::spawn_blocking(move || {
            registry.parse(file.language, &file.path, &file.content, &options)
        })
        .await;
        let parse = match parsed {
            Ok(parse) => parse,
            Err(err) => return FileOutcome::Failed(err.into()),
        };

        if self.cancel.is_cancelled() {
            return FileOutcome::Cancelled;
        }

        let shared = Arc::new(parse);
        let mut attempt = 0;
        loop {
            let result = Arc::clone(&shared);
            let (project, language, hash) = (self.project, self.file.language, self.hash.clone());
            let written = self
                .pool
                .with_transaction(move |tx| GraphStore::new(tx).replace_file(project, language, &result, &hash))
                .await;
            match written {
                Ok(write) => {
                    let parse = Arc::try_unwrap(shared).unwrap_or_else(|arc| (*arc).clone());
                    return FileOutcome::Written { parse, write };
                }
                Err(Error::PoolExhausted { waited_ms, .. }) if attempt < POOL_RETRIES => {
                    attempt += 1;
                    tracing::debug!(path = %self.file.path, attempt, waited_ms, "pool exhausted, retrying file write");
                    tokio::time::sleep(Duration::from_millis(50 * attempt as u64)).await;
                }
                Err(err) => return FileOutcome::Failed(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::LanguageAdapter;
    use crate::relationship::RelationshipKind;
    use crate::storage::{PoolConfig, initialize_database};
    use crate::symbol::SymbolKind;

    fn setup() -> (tempfile::TempDir, ProjectIndexer) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");
        initialize_database(&path).unwrap();
        let pool = ConnectionPool::open(&path, PoolConfig::default()).unwrap();
        (dir, ProjectIndexer::new(pool))
    }

    fn batch() -> Vec<SourceFile> {
        let mut files: Vec<SourceFile> = (0..9)
            .map(|i| {
                SourceFile::new(
                    format!("pkg/mod_{}.py", i),
                    Language::Python,
                    format!("def func_{i}(value):\n    return helper_{i}(value)\n\ndef helper_{i}(value):\n    return value\n"),
                )
            })
            .collect();
        files.push(SourceFile::new("pkg/broken.py", Language::Python, "def broken(:\n    pass\n"));
        files
    }

    #[tokio::test]
    async fn test_nine_good_files_and_one_broken() {
        let (_dir, indexer) = setup();
        let stats = indexer.index_project(1, batch(), &IndexOptions::default()).await.unwrap();

        assert_eq!(stats.files_processed, 10);
        assert_eq!(stats.errors.len(), 1);
        assert_eq!(stats.errors[0].path, "pkg/broken.py");
        assert!(stats.enrichment.is_some());

        let graph = indexer.get_symbol_graph(1, GraphFilter::default()).await.unwrap();
        for i in 0..9 {
            let name = format!("func_{}", i);
            assert!(graph.symbols.iter().any(|s| s.name == name), "missing {}", name);
        }
    }

    #[tokio::test]
    async fn test_unchanged_files_are_skipped() {
        let (_dir, indexer) = setup();
        let options = IndexOptions {
            semantic: false,
            ..IndexOptions::default()
        };
        indexer.index_project(1, batch(), &options).await.unwrap();
        let before = indexer.project_stats(1).await.unwrap();

        let again = indexer.index_project(1, batch(), &options).await.unwrap();
        assert_eq!(again.files_skipped, 10);
        assert_eq!(indexer.project_stats(1).await.unwrap(), before);

        let forced = IndexOptions {
            force: true,
            ..options.clone()
        };
        let third = indexer.index_project(1, batch(), &forced).await.unwrap();
        assert_eq!(third.files_skipped, 0);
        assert_eq!(indexer.project_stats(1).await.unwrap().symbols, before.symbols);
    }

    #[tokio::test]
    async fn test_prune_and_remove() {
        let (_dir, indexer) = setup();
        let options = IndexOptions {
            semantic: false,
            ..IndexOptions::default()
        };
        indexer.index_project(1, batch(), &options).await.unwrap();

        let prune = IndexOptions {
            prune_missing: true,
            ..options.clone()
        };
        let stats = indexer.index_project(1, batch().into_iter().take(3).collect(), &prune).await.unwrap();
        assert_eq!(stats.files_removed, 7);
        assert_eq!(indexer.project_stats(1).await.unwrap().files, 3);

        let removed = indexer
            .remove_files(1, vec!["pkg/mod_0.py".to_string(), "pkg/nope.py".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn test_call_chains_and_filters() {
        let (_dir, indexer) = setup();
        let options = IndexOptions {
            semantic: false,
            ..IndexOptions::default()
        };
        indexer.index_project(1, batch(), &options).await.unwrap();

        let chains = indexer.get_call_chains(1).await.unwrap();
        assert_eq!(chains.len(), 9);
        assert!(chains.iter().all(|c| c.depth == 1));

        let filter = GraphFilter {
            file_path: Some("pkg/mod_3.py".to_string()),
            ..GraphFilter::default()
        };
        let graph = indexer.get_symbol_graph(1, filter).await.unwrap();
        assert!(graph.symbols.iter().all(|s| s.file_path == "pkg/mod_3.py"));
        assert!(graph.symbols.iter().any(|s| s.name == "helper_3"));
    }

    fn structural() -> IndexOptions {
        IndexOptions {
            semantic: false,
            ..IndexOptions::default()
        }
    }

    #[tokio::test]
    async fn test_go_package_spread_over_files() {
        let (_dir, indexer) = setup();
        let files = vec![
            SourceFile::new(
                "shop/order.go",
                Language::Go,
                "package shop\n\ntype Order struct {\n\tID string\n}\n\nfunc (o *Order) Total() int { return 0 }\n",
            ),
            SourceFile::new(
                "shop/cart.go",
                Language::Go,
                "package shop\n\ntype Cart struct{}\n\nfunc (c *Cart) Close() error { return nil }\n\nfunc (o *Order) Close() error { return nil }\n",
            ),
        ];
        let stats = indexer.index_project(1, files, &structural()).await.unwrap();
        assert_eq!(stats.files_succeeded, 2);
        // 2 modules, Order, ID, Total, Cart, 2 x Close
        assert_eq!(indexer.project_stats(1).await.unwrap().symbols, 8);

        let graph = indexer.get_symbol_graph(1, GraphFilter::default()).await.unwrap();
        let module_of = |path: &str| {
            graph
                .symbols
                .iter()
                .find(|s| s.kind == SymbolKind::Module && s.file_path == path)
                .map(|s| s.id)
                .unwrap()
        };
        let (order_module, cart_module) = (module_of("shop/order.go"), module_of("shop/cart.go"));
        assert_ne!(order_module, cart_module);

        let order = graph.symbols.iter().find(|s| s.name == "Order").unwrap();
        assert_eq!(order.parent_symbol_id, Some(order_module));
        let foreign_close = graph
            .symbols
            .iter()
            .find(|s| s.qualified_name == "shop.Order.Close")
            .unwrap();
        assert_eq!(foreign_close.parent_symbol_id, Some(cart_module));
        assert!(graph.symbols.iter().any(|s| s.qualified_name == "shop.Cart.Close"));

        indexer.remove_files(1, vec!["shop/cart.go".to_string()]).await.unwrap();
        let graph = indexer.get_symbol_graph(1, GraphFilter::default()).await.unwrap();
        assert_eq!(graph.symbols.len(), 4);
        assert!(graph.symbols.iter().all(|s| s.file_path == "shop/order.go"));
        let order = graph.symbols.iter().find(|s| s.name == "Order").unwrap();
        assert_eq!(order.parent_symbol_id, Some(order_module));
        let contains = graph
            .relationships
            .iter()
            .filter(|r| r.kind == RelationshipKind::Contains && r.from_symbol_id == order_module)
            .count();
        assert_eq!(contains, 1);
    }

    #[tokio::test]
    async fn test_rust_trait_impls_and_out_of_file_methods() {
        let (_dir, indexer) = setup();
        let files = vec![
            SourceFile::new(
                "src/money.rs",
                Language::Rust,
                "pub struct Money(i64);\n\nimpl Display for Money {\n    fn fmt(&self) -> Result {\n        self.zero();\n        Ok(())\n    }\n}\n\nimpl Debug for Money {\n    fn fmt(&self) -> Result {\n        Ok(())\n    }\n}\n",
            ),
            SourceFile::new(
                "src/ledger.rs",
                Language::Rust,
                "impl Money {\n    pub fn zero(&self) -> i64 {\n        0\n    }\n}\n",
            ),
        ];
        indexer.index_project(1, files, &structural()).await.unwrap();
        // 2 modules, Money, 2 x fmt, zero
        assert_eq!(indexer.project_stats(1).await.unwrap().symbols, 6);

        let graph = indexer.get_symbol_graph(1, GraphFilter::default()).await.unwrap();
        let money = graph.symbols.iter().find(|s| s.name == "Money").unwrap();
        let mut fmts: Vec<&Symbol> = graph.symbols.iter().filter(|s| s.name == "fmt").collect();
        fmts.sort_by(|a, b| a.qualified_name.cmp(&b.qualified_name));
        assert_eq!(fmts[0].qualified_name, "crate::money::Money::<Debug>::fmt");
        assert_eq!(fmts[1].qualified_name, "crate::money::Money::<Display>::fmt");
        assert!(fmts.iter().all(|f| f.parent_symbol_id == Some(money.id)));

        // `self.zero()` reaches the method declared next to another module.
        let zero = graph.symbols.iter().find(|s| s.name == "zero").unwrap();
        assert_eq!(zero.qualified_name, "crate::ledger::Money::zero");
        assert!(graph.relationships.iter().any(|r| r.kind == RelationshipKind::Calls
            && r.from_symbol_id == fmts[1].id
            && r.to_symbol_id == Some(zero.id)));

        indexer.remove_files(1, vec!["src/ledger.rs".to_string()]).await.unwrap();
        let graph = indexer.get_symbol_graph(1, GraphFilter::default()).await.unwrap();
        assert_eq!(graph.symbols.iter().filter(|s| s.name == "fmt").count(), 2);
        assert!(graph.symbols.iter().all(|s| s.name != "zero"));
    }

    struct PanickingAdapter;

    impl LanguageAdapter for PanickingAdapter {
        fn language(&self) -> Language {
            Language::Python
        }

        fn parse(&self, _path: &str, _content: &str, _options: &ParseOptions) -> Result<ParseResult> {
            panic!("adapter crashed");
        }
    }

    #[tokio::test]
    async fn test_crashed_task_reports_its_path() {
        let (_dir, indexer) = setup();
        let mut registry = AdapterRegistry::new();
        registry.register(PanickingAdapter);
        let indexer = indexer.with_registry(registry);

        let files = vec![SourceFile::new("pkg/boom.py", Language::Python, "x = 1\n")];
        let stats = indexer.index_project(1, files, &structural()).await.unwrap();
        assert_eq!(stats.files_failed, 1);
        assert_eq!(stats.errors[0].path, "pkg/boom.py");
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (_dir, indexer) = setup();
        let options = IndexOptions::default();
        options.cancel.cancel();
        let err = indexer.index_project(1, batch(), &options).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
