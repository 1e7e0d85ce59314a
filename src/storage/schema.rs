//! Database schema definitions
//!
//! `initialize_database` is the boundary to schema management: it creates
//! every table idempotently. The pool only checks that the schema exists.

use crate::Result;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

pub const SCHEMA_VERSION: i64 = 1;

pub const CREATE_PROJECTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL
)
"#;

/// Per-file bookkeeping for incremental re-indexing
pub const CREATE_FILES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    path TEXT NOT NULL,
    language TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    symbol_count INTEGER NOT NULL DEFAULT 0,
    used_fallback INTEGER NOT NULL DEFAULT 0,
    indexed_at TEXT NOT NULL,
    PRIMARY KEY (project_id, path)
)
"#;

pub const CREATE_SYMBOLS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS symbols (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    language TEXT NOT NULL,
    name TEXT NOT NULL,
    qualified_name TEXT NOT NULL,
    kind TEXT NOT NULL,
    file_path TEXT NOT NULL,
    line INTEGER NOT NULL,
    start_column INTEGER NOT NULL DEFAULT 0,
    end_line INTEGER NOT NULL,
    end_column INTEGER NOT NULL DEFAULT 0,
    signature TEXT,
    return_type TEXT,
    visibility TEXT NOT NULL DEFAULT 'public',
    namespace TEXT,
    parent_symbol_id INTEGER REFERENCES symbols(id) ON DELETE SET NULL,
    parameters TEXT NOT NULL DEFAULT '[]',
    is_exported INTEGER NOT NULL DEFAULT 0,
    is_async INTEGER NOT NULL DEFAULT 0,
    is_abstract INTEGER NOT NULL DEFAULT 0,
    confidence REAL NOT NULL DEFAULT 1.0,
    semantic_tags TEXT NOT NULL DEFAULT '[]',
    language_features TEXT NOT NULL DEFAULT '{}',
    UNIQUE(project_id, language, qualified_name)
)
"#;

/// Unresolved targets keep `to_symbol_id` NULL; NULLs never collide in the
/// natural-key UNIQUE constraint.
pub const CREATE_RELATIONSHIPS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS relationships (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    from_symbol_id INTEGER NOT NULL REFERENCES symbols(id) ON DELETE CASCADE,
    to_symbol_id INTEGER REFERENCES symbols(id) ON DELETE SET NULL,
    target_name TEXT,
    type TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 1.0,
    context_line INTEGER,
    context_column INTEGER,
    context_snippet TEXT,
    metadata TEXT NOT NULL DEFAULT '{}',
    cross_language INTEGER NOT NULL DEFAULT 0,
    source_file TEXT,
    UNIQUE(project_id, from_symbol_id, to_symbol_id, type)
)
"#;

pub const CREATE_PATTERNS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS patterns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    file_path TEXT NOT NULL,
    symbol_id INTEGER REFERENCES symbols(id) ON DELETE CASCADE,
    pattern_type TEXT NOT NULL,
    name TEXT NOT NULL,
    confidence REAL NOT NULL,
    evidence TEXT NOT NULL DEFAULT '[]'
)
"#;

pub const CREATE_CALL_CHAINS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS call_chains (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    entry_symbol_id INTEGER NOT NULL REFERENCES symbols(id) ON DELETE CASCADE,
    depth INTEGER NOT NULL,
    path TEXT NOT NULL,
    chain_key TEXT NOT NULL,
    UNIQUE(project_id, chain_key)
)
"#;

pub const CREATE_EMBEDDINGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS embeddings (
    symbol_id INTEGER PRIMARY KEY REFERENCES symbols(id) ON DELETE CASCADE,
    project_id INTEGER NOT NULL,
    vector BLOB NOT NULL,
    dimension INTEGER NOT NULL,
    algorithm_version INTEGER NOT NULL
)
"#;

pub const CREATE_CLUSTERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS clusters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    label TEXT NOT NULL,
    cohesion REAL NOT NULL
)
"#;

pub const CREATE_CLUSTER_MEMBERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS cluster_members (
    cluster_id INTEGER NOT NULL REFERENCES clusters(id) ON DELETE CASCADE,
    symbol_id INTEGER NOT NULL REFERENCES symbols(id) ON DELETE CASCADE,
    score REAL NOT NULL,
    PRIMARY KEY (cluster_id, symbol_id)
)
"#;

pub const CREATE_INSIGHTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS insights (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    severity TEXT NOT NULL,
    category TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    affected_symbols TEXT NOT NULL DEFAULT '[]',
    recommendations TEXT NOT NULL DEFAULT '[]',
    confidence REAL NOT NULL,
    created_at TEXT NOT NULL
)
"#;

pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(project_id, file_path)",
    "CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(project_id, name)",
    "CREATE INDEX IF NOT EXISTS idx_symbols_kind ON symbols(project_id, kind)",
    "CREATE INDEX IF NOT EXISTS idx_symbols_parent ON symbols(parent_symbol_id)",
    "CREATE INDEX IF NOT EXISTS idx_rel_from ON relationships(from_symbol_id)",
    "CREATE INDEX IF NOT EXISTS idx_rel_to ON relationships(to_symbol_id)",
    "CREATE INDEX IF NOT EXISTS idx_rel_unresolved ON relationships(project_id) WHERE to_symbol_id IS NULL",
    "CREATE INDEX IF NOT EXISTS idx_rel_source ON relationships(project_id, source_file)",
    "CREATE INDEX IF NOT EXISTS idx_patterns_file ON patterns(project_id, file_path)",
    "CREATE INDEX IF NOT EXISTS idx_embeddings_project ON embeddings(project_id)",
    "CREATE INDEX IF NOT EXISTS idx_insights_project ON insights(project_id)",
];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_PROJECTS_TABLE,
        CREATE_FILES_TABLE,
        CREATE_SYMBOLS_TABLE,
        CREATE_RELATIONSHIPS_TABLE,
        CREATE_PATTERNS_TABLE,
        CREATE_CALL_CHAINS_TABLE,
        CREATE_EMBEDDINGS_TABLE,
        CREATE_CLUSTERS_TABLE,
        CREATE_CLUSTER_MEMBERS_TABLE,
        CREATE_INSIGHTS_TABLE,
    ];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}

/// Connection settings every handle gets: WAL, foreign keys, busy timeout.
pub fn configure_connection(conn: &Connection, busy_timeout: Duration) -> Result<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        ",
    )?;
    Ok(())
}

/// Open (creating if needed) a database file and make sure every table exists.
pub fn initialize_database(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    configure_connection(&conn, Duration::from_secs(5))?;
    for stmt in all_schema_statements() {
        conn.execute(stmt, [])?;
    }
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tracing::debug!(path = %path.display(), version = SCHEMA_VERSION, "database schema ready");
    Ok(conn)
}

/// Whether the core tables are present.
pub fn schema_exists(conn: &Connection) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('symbols', 'relationships', 'files')",
        [],
        |row| row.get(0),
    )?;
    Ok(count == 3)
}
