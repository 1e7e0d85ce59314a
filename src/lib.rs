//! # symgraph - polyglot symbol graph indexer
//!
//! Indexes source code written in several languages into one symbol graph
//! stored in SQLite.
//!
//! symgraph provides:
//! - Tree-sitter language adapters behind a single `LanguageAdapter` trait,
//!   with a regex fallback for oversized or unsupported files
//! - Cross-language bridge detection (gRPC clients, HTTP calls, process spawns)
//! - An ordered enrichment pipeline (reference resolution, call chains,
//!   data flow, virtual overrides)
//! - Local deterministic embeddings, clustering and architectural insights
//! - A bounded SQLite connection pool shared by every writer

pub mod language;
pub mod qualified;
pub mod symbol;
pub mod relationship;
pub mod graph;
pub mod storage;
pub mod adapter;
pub mod bridge;
pub mod enrichment;
pub mod semantic;
pub mod indexer;
pub mod config;
pub mod logging;
pub mod discover;

// Re-exports for convenient access
pub use language::Language;
pub use symbol::{Symbol, SymbolId, SymbolKind, Visibility};
pub use relationship::{Relationship, RelationshipKind};
pub use graph::SymbolGraph;
pub use storage::{ConnectionPool, GraphStore, PoolConfig, PooledConnection};
pub use adapter::{AdapterRegistry, LanguageAdapter, ParseOptions, ParseResult};
pub use bridge::{BridgeCandidate, BridgeKind, detect};
pub use indexer::{IndexOptions, IndexStats, ProjectIndexer, SourceFile};
pub use config::SymgraphConfig;

/// Project identifier shared by every persisted row.
pub type ProjectId = i64;

/// Result type alias for symgraph operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for symgraph operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Parse error in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Connection pool exhausted: no connection free after {waited_ms}ms (max {max_connections})")]
    PoolExhausted { waited_ms: u64, max_connections: usize },

    #[error("Connection pool is closed")]
    PoolClosed,

    #[error("Database schema missing: {0}")]
    SchemaMissing(String),

    #[error("Semantic stage failed for {path}: {message}")]
    SemanticStage { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("Indexing run cancelled")]
    Cancelled,
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Task(err.to_string())
    }
}

impl Error {
    /// Errors that abort a whole indexing run rather than a single file.
    pub fn is_project_level(&self) -> bool {
        matches!(
            self,
            Error::PoolExhausted { .. } | Error::PoolClosed | Error::SchemaMissing(_) | Error::Cancelled
        )
    }
}
