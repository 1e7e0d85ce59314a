//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with tables:
//! - files(path, language, content_hash) for incremental re-indexing
//! - symbols / relationships: the graph itself
//! - patterns, call_chains: per-file and derived analysis results
//! - embeddings, clusters, cluster_members, insights: semantic output
//!
//! Every writer goes through the bounded [`ConnectionPool`].

pub mod pool;
pub mod schema;
pub mod store;

pub use pool::{ConnectionPool, PoolConfig, PoolStatus, PooledConnection};
pub use schema::{initialize_database, schema_exists};
pub use store::{BindOutcome, DbStats, FileWrite, GraphFilter, GraphStore, IndexedFile};
