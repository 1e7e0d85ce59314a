//! SQLite-backed graph store
//!
//! `GraphStore` borrows a connection (or a transaction, which derefs to one)
//! and exposes typed reads and writes over the schema. It never opens
//! transactions itself; callers decide the unit of work through
//! [`ConnectionPool::with_transaction`](super::ConnectionPool::with_transaction).

use crate::adapter::{ParseResult, Pattern, PatternKind};
use crate::enrichment::CallChain;
use crate::graph::SymbolGraph;
use crate::language::Language;
use crate::relationship::{Relationship, RelationshipKind};
use crate::semantic::types::{ClusterMember, Insight, SemanticCluster};
use crate::symbol::{Symbol, SymbolId, SymbolKind};
use crate::{Error, ProjectId, Result};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

const SYMBOL_COLUMNS: &str = "id, project_id, language, name, qualified_name, kind, file_path, line, start_column, \
     end_line, end_column, signature, return_type, visibility, namespace, parent_symbol_id, parameters, \
     is_exported, is_async, is_abstract, confidence, semantic_tags, language_features";

const RELATIONSHIP_COLUMNS: &str = "id, project_id, from_symbol_id, to_symbol_id, target_name, type, confidence, \
     context_line, context_column, context_snippet, metadata, cross_language, source_file";

/// Bookkeeping row for one indexed file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedFile {
    pub path: String,
    pub language: Language,
    pub content_hash: String,
    pub symbol_count: usize,
    pub used_fallback: bool,
    pub indexed_at: String,
}

/// What a file replacement wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileWrite {
    pub symbols: usize,
    pub relationships: usize,
    pub patterns: usize,
    pub removed_symbols: usize,
}

/// How an attempt to bind an unresolved relationship ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    Bound,
    /// An identical resolved edge already existed; the unresolved row was dropped
    Merged,
    /// Row no longer exists
    Missing,
}

/// Filters for [`GraphStore::query_graph`]. Empty filters select everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphFilter {
    pub file_path: Option<String>,
    pub language: Option<Language>,
    #[serde(default)]
    pub kinds: Vec<SymbolKind>,
    /// Substring match on the symbol name
    pub name_contains: Option<String>,
    #[serde(default)]
    pub relationship_kinds: Vec<RelationshipKind>,
    pub min_confidence: Option<f32>,
    #[serde(default)]
    pub include_unresolved: bool,
    pub limit: Option<usize>,
}

/// Row counts for one project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbStats {
    pub files: usize,
    pub symbols: usize,
    pub relationships: usize,
    pub unresolved: usize,
    pub cross_language: usize,
    pub patterns: usize,
    pub call_chains: usize,
    pub embeddings: usize,
    pub clusters: usize,
    pub insights: usize,
    pub symbols_by_language: BTreeMap<String, usize>,
    pub relationships_by_type: BTreeMap<String, usize>,
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  Files: {}", self.files)?;
        writeln!(f, "  Symbols: {}", self.symbols)?;
        for (language, count) in &self.symbols_by_language {
            writeln!(f, "    {}: {}", language, count)?;
        }
        writeln!(f, "  Relationships: {} ({} unresolved, {} cross-language)", self.relationships, self.unresolved, self.cross_language)?;
        for (kind, count) in &self.relationships_by_type {
            writeln!(f, "    {}: {}", kind, count)?;
        }
        writeln!(f, "  Patterns: {}", self.patterns)?;
        writeln!(f, "  Call chains: {}", self.call_chains)?;
        writeln!(f, "  Embeddings: {}", self.embeddings)?;
        writeln!(f, "  Clusters: {}", self.clusters)?;
        write!(f, "  Insights: {}", self.insights)
    }
}

pub struct GraphStore<'c> {
    conn: &'c Connection,
}

impl<'c> GraphStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &'c Connection {
        self.conn
    }

    // ========== Project Operations ==========

    /// Id of the project called `name`, creating it if needed.
    pub fn ensure_project(&self, name: &str) -> Result<ProjectId> {
        if let Some(id) = self.project_by_name(name)? {
            return Ok(id);
        }
        self.conn.execute(
            "INSERT INTO projects (name, created_at) VALUES (?1, ?2)",
            params![name, now()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Make sure a project row exists for an externally chosen id.
    pub fn ensure_project_id(&self, project: ProjectId) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO projects (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![project, format!("project-{}", project), now()],
        )?;
        Ok(())
    }

    pub fn project_by_name(&self, name: &str) -> Result<Option<ProjectId>> {
        self.conn
            .query_row("SELECT id FROM projects WHERE name = ?1", [name], |row| row.get(0))
            .optional()
            .map_err(Into::into)
    }

    // ========== File Operations ==========

    pub fn file_hash(&self, project: ProjectId, path: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT content_hash FROM files WHERE project_id = ?1 AND path = ?2",
                params![project, path],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn indexed_files(&self, project: ProjectId) -> Result<Vec<IndexedFile>> {
        let mut stmt = self.conn.prepare(
            "SELECT path, language, content_hash, symbol_count, used_fallback, indexed_at
             FROM files WHERE project_id = ?1 ORDER BY path",
        )?;
        let files = stmt
            .query_map([project], |row| {
                let language: String = row.get(1)?;
                Ok(IndexedFile {
                    path: row.get(0)?,
                    language: parse_column(&language, 1)?,
                    content_hash: row.get(2)?,
                    symbol_count: row.get::<_, i64>(3)? as usize,
                    used_fallback: row.get(4)?,
                    indexed_at: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(files)
    }

    /// Replace everything a file contributed with a fresh parse result.
    ///
    /// Symbols are upserted on (project, language, qualified_name) so ids of
    /// unchanged symbols survive a re-index; symbols that disappeared are
    /// deleted (cascading their edges, embeddings and memberships). Parse
    /// edges of the file are rewritten; resolution happens later. Surviving
    /// symbols lose their embeddings since their source text changed.
    pub fn replace_file(
        &self,
        project: ProjectId,
        language: Language,
        result: &ParseResult,
        content_hash: &str,
    ) -> Result<FileWrite> {
        let path = result.file_path.as_str();
        let previous: HashSet<i64> = self.symbol_ids_in_file(project, path)?.into_iter().collect();
        self.conn.execute(
            "DELETE FROM embeddings WHERE project_id = ?1
             AND symbol_id IN (SELECT id FROM symbols WHERE project_id = ?1 AND file_path = ?2)",
            params![project, path],
        )?;

        self.conn.execute(
            "DELETE FROM relationships WHERE project_id = ?1 AND source_file = ?2",
            params![project, path],
        )?;
        self.conn.execute(
            "DELETE FROM patterns WHERE project_id = ?1 AND file_path = ?2",
            params![project, path],
        )?;

        // Parents precede children, so a parent is always remapped first.
        let mut remap: Vec<SymbolId> = Vec::with_capacity(result.symbols.len());
        for symbol in &result.symbols {
            let mut row = symbol.clone();
            row.project_id = project;
            row.language = language;
            row.parent_symbol_id = symbol
                .parent_symbol_id
                .and_then(|p| remap.get(p.index()).copied());
            remap.push(self.insert_symbol(&row)?);
        }
        let current: HashSet<i64> = remap.iter().map(|id| id.0).collect();

        // Only rows this file still owns.
        let stale: Vec<i64> = previous.difference(&current).copied().collect();
        for id in &stale {
            self.conn.execute(
                "DELETE FROM symbols WHERE id = ?1 AND project_id = ?2 AND file_path = ?3",
                params![id, project, path],
            )?;
        }

        let mut relationships = 0;
        for rel in &result.relationships {
            let Some(from) = remap.get(rel.from_symbol_id.index()).copied() else {
                continue;
            };
            let mut row = rel.clone();
            row.project_id = project;
            row.from_symbol_id = from;
            row.to_symbol_id = match rel.to_symbol_id {
                Some(to) => match remap.get(to.index()) {
                    Some(id) => Some(*id),
                    None => continue,
                },
                None => None,
            };
            row.source_file = Some(path.to_string());
            if self.insert_relationship(&row)? {
                relationships += 1;
            }
        }

        for pattern in &result.patterns {
            let symbol_id = pattern.symbol_id.and_then(|id| remap.get(id.index()).copied());
            self.insert_pattern(project, path, symbol_id, pattern)?;
        }

        self.drop_orphaned_derived_edges(project)?;

        self.conn.execute(
            "INSERT INTO files (project_id, path, language, content_hash, symbol_count, used_fallback, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(project_id, path) DO UPDATE SET
                language = excluded.language,
                content_hash = excluded.content_hash,
                symbol_count = excluded.symbol_count,
                used_fallback = excluded.used_fallback,
                indexed_at = excluded.indexed_at",
            params![
                project,
                path,
                language.as_str(),
                content_hash,
                result.symbols.len() as i64,
                result.stats.used_fallback,
                now()
            ],
        )?;

        Ok(FileWrite {
            symbols: current.len(),
            relationships,
            patterns: result.patterns.len(),
            removed_symbols: stale.len(),
        })
    }

    /// Delete a file and everything it contributed. Returns whether it was indexed.
    pub fn remove_file(&self, project: ProjectId, path: &str) -> Result<bool> {
        self.conn.execute(
            "DELETE FROM relationships WHERE project_id = ?1 AND source_file = ?2",
            params![project, path],
        )?;
        self.conn.execute(
            "DELETE FROM patterns WHERE project_id = ?1 AND file_path = ?2",
            params![project, path],
        )?;
        self.conn.execute(
            "DELETE FROM symbols WHERE project_id = ?1 AND file_path = ?2",
            params![project, path],
        )?;
        self.drop_orphaned_derived_edges(project)?;
        let removed = self.conn.execute(
            "DELETE FROM files WHERE project_id = ?1 AND path = ?2",
            params![project, path],
        )?;
        Ok(removed > 0)
    }

    /// Derived edges whose target was deleted have nothing left to resolve by.
    fn drop_orphaned_derived_edges(&self, project: ProjectId) -> Result<usize> {
        let n = self.conn.execute(
            "DELETE FROM relationships WHERE project_id = ?1 AND to_symbol_id IS NULL AND target_name IS NULL",
            [project],
        )?;
        Ok(n)
    }

    // ========== Symbol Operations ==========

    /// Upsert a symbol keyed on (project, language, qualified_name); the
    /// latest write wins. Returns the stored id.
    pub fn insert_symbol(&self, symbol: &Symbol) -> Result<SymbolId> {
        let id: i64 = self.conn.query_row(
            r#"
            INSERT INTO symbols (project_id, language, name, qualified_name, kind, file_path, line, start_column,
                end_line, end_column, signature, return_type, visibility, namespace, parent_symbol_id, parameters,
                is_exported, is_async, is_abstract, confidence, semantic_tags, language_features)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)
            ON CONFLICT(project_id, language, qualified_name) DO UPDATE SET
                name = excluded.name,
                kind = excluded.kind,
                file_path = excluded.file_path,
                line = excluded.line,
                start_column = excluded.start_column,
                end_line = excluded.end_line,
                end_column = excluded.end_column,
                signature = excluded.signature,
                return_type = excluded.return_type,
                visibility = excluded.visibility,
                namespace = excluded.namespace,
                parent_symbol_id = excluded.parent_symbol_id,
                parameters = excluded.parameters,
                is_exported = excluded.is_exported,
                is_async = excluded.is_async,
                is_abstract = excluded.is_abstract,
                confidence = excluded.confidence,
                semantic_tags = excluded.semantic_tags,
                language_features = excluded.language_features
            RETURNING id
            "#,
            params![
                symbol.project_id,
                symbol.language.as_str(),
                symbol.name,
                symbol.qualified_name,
                symbol.kind.as_str(),
                symbol.file_path,
                symbol.line,
                symbol.column,
                symbol.end_line,
                symbol.end_column,
                symbol.signature,
                symbol.return_type,
                symbol.visibility.as_str(),
                symbol.namespace,
                symbol.parent_symbol_id.map(|p| p.0),
                serde_json::to_string(&symbol.parameters)?,
                symbol.is_exported,
                symbol.is_async,
                symbol.is_abstract,
                symbol.confidence as f64,
                serde_json::to_string(&symbol.semantic_tags)?,
                serde_json::to_string(&symbol.language_features)?,
            ],
            |row| row.get(0),
        )?;
        Ok(SymbolId(id))
    }

    pub fn get_symbol(&self, id: SymbolId) -> Result<Option<Symbol>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM symbols WHERE id = ?1", SYMBOL_COLUMNS),
                [id.0],
                row_to_symbol,
            )
            .optional()
            .map_err(Into::into)
    }

    fn symbol_ids_in_file(&self, project: ProjectId, path: &str) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM symbols WHERE project_id = ?1 AND file_path = ?2")?;
        let ids = stmt
            .query_map(params![project, path], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    pub fn symbols_in_file(&self, project: ProjectId, path: &str) -> Result<Vec<Symbol>> {
        self.query_symbols_where("project_id = ?1 AND file_path = ?2 ORDER BY line, id", params![project, path])
    }

    pub fn project_symbols(&self, project: ProjectId) -> Result<Vec<Symbol>> {
        self.query_symbols_where("project_id = ?1 ORDER BY id", params![project])
    }

    pub fn find_symbols_by_name(&self, project: ProjectId, name: &str) -> Result<Vec<Symbol>> {
        self.query_symbols_where("project_id = ?1 AND name = ?2 ORDER BY id", params![project, name])
    }

    fn query_symbols_where(&self, clause: &str, params: impl rusqlite::Params) -> Result<Vec<Symbol>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM symbols WHERE {}", SYMBOL_COLUMNS, clause))?;
        let symbols = stmt
            .query_map(params, row_to_symbol)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(symbols)
    }

    pub fn count_symbols(&self, project: ProjectId) -> Result<usize> {
        self.count("SELECT COUNT(*) FROM symbols WHERE project_id = ?1", project)
    }

    // ========== Relationship Operations ==========

    /// Insert unless an edge with the same natural key exists. Returns
    /// whether a row was written.
    pub fn insert_relationship(&self, rel: &Relationship) -> Result<bool> {
        let n = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO relationships (project_id, from_symbol_id, to_symbol_id, target_name, type,
                confidence, context_line, context_column, context_snippet, metadata, cross_language, source_file)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                rel.project_id,
                rel.from_symbol_id.0,
                rel.to_symbol_id.map(|t| t.0),
                rel.target_name,
                rel.kind.as_str(),
                rel.confidence as f64,
                rel.context_line,
                rel.context_column,
                rel.context_snippet,
                serde_json::to_string(&rel.metadata)?,
                rel.cross_language,
                rel.source_file,
            ],
        )?;
        Ok(n > 0)
    }

    pub fn project_relationships(&self, project: ProjectId) -> Result<Vec<Relationship>> {
        self.query_relationships_where("project_id = ?1 ORDER BY id", params![project])
    }

    pub fn unresolved_relationships(&self, project: ProjectId) -> Result<Vec<Relationship>> {
        self.query_relationships_where(
            "project_id = ?1 AND to_symbol_id IS NULL AND target_name IS NOT NULL ORDER BY id",
            params![project],
        )
    }

    pub fn relationships_of_kind(&self, project: ProjectId, kind: RelationshipKind) -> Result<Vec<Relationship>> {
        self.query_relationships_where(
            "project_id = ?1 AND type = ?2 ORDER BY id",
            params![project, kind.as_str()],
        )
    }

    /// Edges of one kind written by enrichment rather than by a file parse.
    pub fn derived_relationships(&self, project: ProjectId, kind: RelationshipKind) -> Result<Vec<Relationship>> {
        self.query_relationships_where(
            "project_id = ?1 AND type = ?2 AND source_file IS NULL ORDER BY id",
            params![project, kind.as_str()],
        )
    }

    fn query_relationships_where(&self, clause: &str, params: impl rusqlite::Params) -> Result<Vec<Relationship>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM relationships WHERE {}",
            RELATIONSHIP_COLUMNS, clause
        ))?;
        let rels = stmt
            .query_map(params, row_to_relationship)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rels)
    }

    /// Bind an unresolved relationship to a target symbol.
    ///
    /// When the bound edge would duplicate an existing one (same natural
    /// key) the unresolved row is deleted instead.
    pub fn bind_relationship(&self, rel_id: i64, to: SymbolId, confidence: f32, strategy: &str) -> Result<BindOutcome> {
        let updated = self.conn.execute(
            "UPDATE relationships
             SET to_symbol_id = ?2, confidence = ?3, metadata = json_set(metadata, '$.resolved_by', ?4)
             WHERE id = ?1 AND to_symbol_id IS NULL",
            params![rel_id, to.0, confidence as f64, strategy],
        );
        match updated {
            Ok(0) => Ok(BindOutcome::Missing),
            Ok(_) => Ok(BindOutcome::Bound),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
                self.conn.execute("DELETE FROM relationships WHERE id = ?1", [rel_id])?;
                Ok(BindOutcome::Merged)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn delete_relationship(&self, rel_id: i64) -> Result<bool> {
        Ok(self.conn.execute("DELETE FROM relationships WHERE id = ?1", [rel_id])? > 0)
    }

    /// Whole project as an in-memory graph.
    pub fn load_graph(&self, project: ProjectId) -> Result<SymbolGraph> {
        Ok(SymbolGraph::from_parts(
            self.project_symbols(project)?,
            self.project_relationships(project)?,
        ))
    }

    /// Filtered subgraph: matching symbols plus relationships between them
    /// (and, on request, unresolved relationships leaving them).
    pub fn query_graph(&self, project: ProjectId, filter: &GraphFilter) -> Result<SymbolGraph> {
        let symbols: Vec<Symbol> = self
            .project_symbols(project)?
            .into_iter()
            .filter(|s| filter.file_path.as_deref().is_none_or(|p| s.file_path == p))
            .filter(|s| filter.language.is_none_or(|l| s.language == l))
            .filter(|s| filter.kinds.is_empty() || filter.kinds.contains(&s.kind))
            .filter(|s| filter.name_contains.as_deref().is_none_or(|n| s.name.contains(n)))
            .filter(|s| filter.min_confidence.is_none_or(|c| s.confidence >= c))
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect();
        let ids: HashSet<SymbolId> = symbols.iter().map(|s| s.id).collect();

        let relationships = self
            .project_relationships(project)?
            .into_iter()
            .filter(|r| ids.contains(&r.from_symbol_id))
            .filter(|r| match r.to_symbol_id {
                Some(to) => ids.contains(&to),
                None => filter.include_unresolved,
            })
            .filter(|r| filter.relationship_kinds.is_empty() || filter.relationship_kinds.contains(&r.kind))
            .filter(|r| filter.min_confidence.is_none_or(|c| r.confidence >= c))
            .collect();

        Ok(SymbolGraph::from_parts(symbols, relationships))
    }

    // ========== Pattern Operations ==========

    fn insert_pattern(&self, project: ProjectId, path: &str, symbol_id: Option<SymbolId>, pattern: &Pattern) -> Result<()> {
        self.conn.execute(
            "INSERT INTO patterns (project_id, file_path, symbol_id, pattern_type, name, confidence, evidence)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                project,
                path,
                symbol_id.map(|s| s.0),
                pattern.kind.as_str(),
                pattern.name,
                pattern.confidence as f64,
                serde_json::to_string(&pattern.evidence)?,
            ],
        )?;
        Ok(())
    }

    pub fn patterns(&self, project: ProjectId) -> Result<Vec<(String, Pattern)>> {
        let mut stmt = self.conn.prepare(
            "SELECT file_path, symbol_id, pattern_type, name, confidence, evidence
             FROM patterns WHERE project_id = ?1 ORDER BY file_path, id",
        )?;
        let rows = stmt
            .query_map([project], |row| {
                let kind: String = row.get(2)?;
                let evidence: String = row.get(5)?;
                Ok((
                    row.get::<_, String>(0)?,
                    Pattern {
                        kind: parse_column::<PatternKind>(&kind, 2)?,
                        name: row.get(3)?,
                        confidence: row.get::<_, f64>(4)? as f32,
                        evidence: parse_json(&evidence, 5)?,
                        symbol_id: row.get::<_, Option<i64>>(1)?.map(SymbolId),
                    },
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ========== Call Chain Operations ==========

    /// Make the stored chains equal `chains`. Returns inserted + deleted rows.
    pub fn replace_call_chains(&self, project: ProjectId, chains: &[CallChain]) -> Result<usize> {
        let wanted: HashMap<String, &CallChain> = chains.iter().map(|c| (c.key(), c)).collect();
        let existing: BTreeSet<String> = {
            let mut stmt = self.conn.prepare("SELECT chain_key FROM call_chains WHERE project_id = ?1")?;
            stmt.query_map([project], |row| row.get(0))?
                .collect::<rusqlite::Result<BTreeSet<String>>>()?
        };

        let mut changes = 0;
        for key in existing.iter().filter(|k| !wanted.contains_key(*k)) {
            changes += self.conn.execute(
                "DELETE FROM call_chains WHERE project_id = ?1 AND chain_key = ?2",
                params![project, key],
            )?;
        }
        let mut inserts: Vec<(&String, &&CallChain)> = wanted.iter().filter(|(k, _)| !existing.contains(*k)).collect();
        inserts.sort_by(|a, b| a.0.cmp(b.0));
        for (key, chain) in inserts {
            let path: Vec<i64> = chain.path.iter().map(|s| s.0).collect();
            changes += self.conn.execute(
                "INSERT OR IGNORE INTO call_chains (project_id, entry_symbol_id, depth, path, chain_key)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![project, chain.entry_symbol_id.0, chain.depth as i64, serde_json::to_string(&path)?, key],
            )?;
        }
        Ok(changes)
    }

    pub fn call_chains(&self, project: ProjectId) -> Result<Vec<CallChain>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, entry_symbol_id, depth, path FROM call_chains WHERE project_id = ?1 ORDER BY entry_symbol_id, id",
        )?;
        let chains = stmt
            .query_map([project], |row| {
                let path: String = row.get(3)?;
                let path: Vec<i64> = parse_json(&path, 3)?;
                Ok(CallChain {
                    id: row.get(0)?,
                    project_id: project,
                    entry_symbol_id: SymbolId(row.get(1)?),
                    depth: row.get::<_, i64>(2)? as usize,
                    path: path.into_iter().map(SymbolId).collect(),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(chains)
    }

    // ========== Embedding Operations ==========

    pub fn upsert_embedding(&self, project: ProjectId, symbol: SymbolId, vector: &[f32], version: u32) -> Result<()> {
        let blob: Vec<u8> = vector.iter().flat_map(|f| f.to_le_bytes()).collect();
        self.conn.execute(
            "INSERT OR REPLACE INTO embeddings (symbol_id, project_id, vector, dimension, algorithm_version)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![symbol.0, project, blob, vector.len() as i64, version],
        )?;
        Ok(())
    }

    /// Algorithm version of each stored embedding.
    pub fn embedding_versions(&self, project: ProjectId) -> Result<HashMap<SymbolId, u32>> {
        let mut stmt = self
            .conn
            .prepare("SELECT symbol_id, algorithm_version FROM embeddings WHERE project_id = ?1")?;
        let rows = stmt
            .query_map([project], |row| Ok((SymbolId(row.get(0)?), row.get::<_, u32>(1)?)))?
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;
        Ok(rows)
    }

    pub fn embeddings(&self, project: ProjectId) -> Result<Vec<(SymbolId, Vec<f32>)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT symbol_id, vector FROM embeddings WHERE project_id = ?1 ORDER BY symbol_id")?;
        let rows = stmt
            .query_map([project], |row| {
                let blob: Vec<u8> = row.get(1)?;
                let vector = blob
                    .chunks_exact(4)
                    .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                    .collect();
                Ok((SymbolId(row.get(0)?), vector))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ========== Cluster / Insight Operations ==========

    /// Replace the project's clusters. Returns how many were written.
    pub fn replace_clusters(&self, project: ProjectId, clusters: &[SemanticCluster]) -> Result<usize> {
        self.conn.execute("DELETE FROM clusters WHERE project_id = ?1", [project])?;
        for cluster in clusters {
            self.conn.execute(
                "INSERT INTO clusters (project_id, label, cohesion) VALUES (?1, ?2, ?3)",
                params![project, cluster.label, cluster.cohesion as f64],
            )?;
            let cluster_id = self.conn.last_insert_rowid();
            for member in &cluster.members {
                self.conn.execute(
                    "INSERT OR IGNORE INTO cluster_members (cluster_id, symbol_id, score) VALUES (?1, ?2, ?3)",
                    params![cluster_id, member.symbol_id.0, member.score as f64],
                )?;
            }
        }
        Ok(clusters.len())
    }

    pub fn clusters(&self, project: ProjectId) -> Result<Vec<SemanticCluster>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, label, cohesion FROM clusters WHERE project_id = ?1 ORDER BY id")?;
        let mut clusters = stmt
            .query_map([project], |row| {
                Ok(SemanticCluster {
                    id: row.get(0)?,
                    project_id: project,
                    label: row.get(1)?,
                    cohesion: row.get::<_, f64>(2)? as f32,
                    members: Vec::new(),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut members = self.conn.prepare(
            "SELECT symbol_id, score FROM cluster_members WHERE cluster_id = ?1 ORDER BY score DESC, symbol_id",
        )?;
        for cluster in &mut clusters {
            cluster.members = members
                .query_map([cluster.id], |row| {
                    Ok(ClusterMember {
                        symbol_id: SymbolId(row.get(0)?),
                        score: row.get::<_, f64>(1)? as f32,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
        }
        Ok(clusters)
    }

    pub fn replace_insights(&self, project: ProjectId, insights: &[Insight]) -> Result<usize> {
        self.conn.execute("DELETE FROM insights WHERE project_id = ?1", [project])?;
        for insight in insights {
            let affected: Vec<i64> = insight.affected_symbols.iter().map(|s| s.0).collect();
            self.conn.execute(
                "INSERT INTO insights (project_id, severity, category, title, description, affected_symbols,
                    recommendations, confidence, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    project,
                    insight.severity.as_str(),
                    insight.category.as_str(),
                    insight.title,
                    insight.description,
                    serde_json::to_string(&affected)?,
                    serde_json::to_string(&insight.recommendations)?,
                    insight.confidence as f64,
                    insight.created_at,
                ],
            )?;
        }
        Ok(insights.len())
    }

    pub fn insights(&self, project: ProjectId) -> Result<Vec<Insight>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, severity, category, title, description, affected_symbols, recommendations, confidence, created_at
             FROM insights WHERE project_id = ?1 ORDER BY id",
        )?;
        let insights = stmt
            .query_map([project], |row| {
                let severity: String = row.get(1)?;
                let category: String = row.get(2)?;
                let affected: String = row.get(5)?;
                let recommendations: String = row.get(6)?;
                let affected: Vec<i64> = parse_json(&affected, 5)?;
                Ok(Insight {
                    id: row.get(0)?,
                    project_id: project,
                    severity: parse_column(&severity, 1)?,
                    category: parse_column(&category, 2)?,
                    title: row.get(3)?,
                    description: row.get(4)?,
                    affected_symbols: affected.into_iter().map(SymbolId).collect(),
                    recommendations: parse_json(&recommendations, 6)?,
                    confidence: row.get::<_, f64>(7)? as f32,
                    created_at: row.get(8)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(insights)
    }

    // ========== Statistics ==========

    fn count(&self, sql: &str, project: ProjectId) -> Result<usize> {
        let count: i64 = self.conn.query_row(sql, [project], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn grouped(&self, sql: &str, project: ProjectId) -> Result<BTreeMap<String, usize>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map([project], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize)))?
            .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;
        Ok(rows)
    }

    pub fn stats(&self, project: ProjectId) -> Result<DbStats> {
        Ok(DbStats {
            files: self.count("SELECT COUNT(*) FROM files WHERE project_id = ?1", project)?,
            symbols: self.count_symbols(project)?,
            relationships: self.count("SELECT COUNT(*) FROM relationships WHERE project_id = ?1", project)?,
            unresolved: self.count(
                "SELECT COUNT(*) FROM relationships WHERE project_id = ?1 AND to_symbol_id IS NULL",
                project,
            )?,
            cross_language: self.count(
                "SELECT COUNT(*) FROM relationships WHERE project_id = ?1 AND cross_language = 1",
                project,
            )?,
            patterns: self.count("SELECT COUNT(*) FROM patterns WHERE project_id = ?1", project)?,
            call_chains: self.count("SELECT COUNT(*) FROM call_chains WHERE project_id = ?1", project)?,
            embeddings: self.count("SELECT COUNT(*) FROM embeddings WHERE project_id = ?1", project)?,
            clusters: self.count("SELECT COUNT(*) FROM clusters WHERE project_id = ?1", project)?,
            insights: self.count("SELECT COUNT(*) FROM insights WHERE project_id = ?1", project)?,
            symbols_by_language: self.grouped(
                "SELECT language, COUNT(*) FROM symbols WHERE project_id = ?1 GROUP BY language",
                project,
            )?,
            relationships_by_type: self.grouped(
                "SELECT type, COUNT(*) FROM relationships WHERE project_id = ?1 GROUP BY type",
                project,
            )?,
        })
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn conversion_error(column: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

fn parse_column<T>(value: &str, column: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = Error>,
{
    value.parse().map_err(|e: Error| conversion_error(column, e))
}

fn parse_json<T: serde::de::DeserializeOwned>(value: &str, column: usize) -> rusqlite::Result<T> {
    serde_json::from_str(value).map_err(|e| conversion_error(column, e))
}

/// Helper to convert a row to a Symbol
fn row_to_symbol(row: &Row) -> rusqlite::Result<Symbol> {
    let language: String = row.get(2)?;
    let kind: String = row.get(5)?;
    let visibility: String = row.get(13)?;
    let parameters: String = row.get(16)?;
    let tags: String = row.get(21)?;
    let features: String = row.get(22)?;

    Ok(Symbol {
        id: SymbolId(row.get(0)?),
        project_id: row.get(1)?,
        language: parse_column(&language, 2)?,
        name: row.get(3)?,
        qualified_name: row.get(4)?,
        kind: parse_column(&kind, 5)?,
        file_path: row.get(6)?,
        line: row.get(7)?,
        column: row.get(8)?,
        end_line: row.get(9)?,
        end_column: row.get(10)?,
        signature: row.get(11)?,
        return_type: row.get(12)?,
        visibility: parse_column(&visibility, 13)?,
        namespace: row.get(14)?,
        parent_symbol_id: row.get::<_, Option<i64>>(15)?.map(SymbolId),
        parameters: parse_json(&parameters, 16)?,
        is_exported: row.get(17)?,
        is_async: row.get(18)?,
        is_abstract: row.get(19)?,
        confidence: row.get::<_, f64>(20)? as f32,
        semantic_tags: parse_json(&tags, 21)?,
        language_features: parse_json(&features, 22)?,
    })
}

fn row_to_relationship(row: &Row) -> rusqlite::Result<Relationship> {
    let kind: String = row.get(5)?;
    let metadata: String = row.get(10)?;
    Ok(Relationship {
        id: row.get(0)?,
        project_id: row.get(1)?,
        from_symbol_id: SymbolId(row.get(2)?),
        to_symbol_id: row.get::<_, Option<i64>>(3)?.map(SymbolId),
        target_name: row.get(4)?,
        kind: parse_column(&kind, 5)?,
        confidence: row.get::<_, f64>(6)? as f32,
        context_line: row.get(7)?,
        context_column: row.get(8)?,
        context_snippet: row.get(9)?,
        metadata: parse_json(&metadata, 10)?,
        cross_language: row.get(11)?,
        source_file: row.get(12)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{ParseOptions, default_registry};
    use crate::storage::schema::initialize_database;

    fn setup() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = initialize_database(&dir.path().join("graph.db")).unwrap();
        (dir, conn)
    }

    fn parse(path: &str, source: &str) -> ParseResult {
        parse_as(Language::Python, path, source)
    }

    fn parse_as(language: Language, path: &str, source: &str) -> ParseResult {
        default_registry().parse(language, path, source, &ParseOptions::default())
    }

    #[test]
    fn test_package_files_keep_their_own_module_rows() {
        let (_dir, conn) = setup();
        let store = GraphStore::new(&conn);
        let project = store.ensure_project("shop").unwrap();

        let a = parse_as(Language::Go, "shop/a.go", "package shop

type A struct{}
");
        let b = parse_as(Language::Go, "shop/b.go", "package shop

type B struct{}
");
        store.replace_file(project, Language::Go, &a, "ha").unwrap();
        store.replace_file(project, Language::Go, &b, "hb").unwrap();

        let modules: Vec<Symbol> = store
            .project_symbols(project)
            .unwrap()
            .into_iter()
            .filter(|s| s.kind == SymbolKind::Module)
            .collect();
        assert_eq!(modules.len(), 2);

        assert!(store.remove_file(project, "shop/b.go").unwrap());
        let symbols = store.symbols_in_file(project, "shop/a.go").unwrap();
        let module = symbols.iter().find(|s| s.kind == SymbolKind::Module).unwrap();
        let a_type = symbols.iter().find(|s| s.name == "A").unwrap();
        assert_eq!(a_type.parent_symbol_id, Some(module.id));
        assert_eq!(a_type.qualified_name, "shop.A");

        let contains = store.relationships_of_kind(project, RelationshipKind::Contains).unwrap();
        assert!(contains.iter().any(|r| r.from_symbol_id == module.id && r.to_symbol_id == Some(a_type.id)));
        assert!(store.find_symbols_by_name(project, "B").unwrap().is_empty());
    }

    #[test]
    fn test_same_method_name_on_foreign_receivers_stores_both() {
        let (_dir, conn) = setup();
        let store = GraphStore::new(&conn);
        let project = store.ensure_project("shop").unwrap();

        let source = "package shop

func (o *Order) Close() error { return nil }

func (c *Cart) Close() error { return nil }
";
        let result = parse_as(Language::Go, "shop/close.go", source);
        store.replace_file(project, Language::Go, &result, "h").unwrap();

        let closes = store.find_symbols_by_name(project, "Close").unwrap();
        assert_eq!(closes.len(), 2);
        let mut names: Vec<&str> = closes.iter().map(|s| s.qualified_name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["shop.Cart.Close", "shop.Order.Close"]);
    }

    #[test]
    fn test_trait_impl_methods_store_separately() {
        let (_dir, conn) = setup();
        let store = GraphStore::new(&conn);
        let project = store.ensure_project("shop").unwrap();

        let source = "pub struct X;

impl Display for X {
    fn fmt(&self) {}
}

impl Debug for X {
    fn fmt(&self) {}
}
";
        let result = parse_as(Language::Rust, "src/x.rs", source);
        store.replace_file(project, Language::Rust, &result, "h").unwrap();

        let fmts = store.find_symbols_by_name(project, "fmt").unwrap();
        assert_eq!(fmts.len(), 2);
        assert_ne!(fmts[0].qualified_name, fmts[1].qualified_name);
    }

    #[test]
    fn test_replace_file_remaps_ids() {
        let (_dir, conn) = setup();
        let store = GraphStore::new(&conn);
        let project = store.ensure_project("shop").unwrap();

        let result = parse("shop/orders.py", "class Order:\n    def total(self):\n        return tax(1)\n");
        let write = store.replace_file(project, Language::Python, &result, "h1").unwrap();
        assert_eq!(write.symbols, 3);

        let symbols = store.symbols_in_file(project, "shop/orders.py").unwrap();
        let class = symbols.iter().find(|s| s.name == "Order").unwrap();
        let method = symbols.iter().find(|s| s.name == "total").unwrap();
        assert_eq!(method.parent_symbol_id, Some(class.id));
        assert!(symbols.iter().all(|s| s.project_id == project));

        let unresolved = store.unresolved_relationships(project).unwrap();
        let call = unresolved.iter().find(|r| r.target_name.as_deref() == Some("tax")).unwrap();
        assert_eq!(call.from_symbol_id, method.id);
        assert_eq!(call.source_file.as_deref(), Some("shop/orders.py"));
        assert_eq!(store.file_hash(project, "shop/orders.py").unwrap().as_deref(), Some("h1"));
    }

    #[test]
    fn test_reindex_keeps_ids_and_drops_stale_symbols() {
        let (_dir, conn) = setup();
        let store = GraphStore::new(&conn);
        let project = store.ensure_project("shop").unwrap();

        let first = parse("a.py", "def keep():\n    pass\n\ndef gone():\n    pass\n");
        store.replace_file(project, Language::Python, &first, "h1").unwrap();
        let keep_id = store.find_symbols_by_name(project, "keep").unwrap()[0].id;

        let second = parse("a.py", "def keep():\n    return 1\n");
        let write = store.replace_file(project, Language::Python, &second, "h2").unwrap();
        assert_eq!(write.removed_symbols, 1);
        assert_eq!(store.find_symbols_by_name(project, "keep").unwrap()[0].id, keep_id);
        assert!(store.find_symbols_by_name(project, "gone").unwrap().is_empty());

        // Contains edges are rewritten, not duplicated.
        let contains = store.relationships_of_kind(project, RelationshipKind::Contains).unwrap();
        assert_eq!(contains.len(), 1);
    }

    #[test]
    fn test_bind_merges_duplicate_edges() {
        let (_dir, conn) = setup();
        let store = GraphStore::new(&conn);
        let project = store.ensure_project("p").unwrap();
        let result = parse("m.py", "def a():\n    b()\n    b()\n\ndef b():\n    pass\n");
        store.replace_file(project, Language::Python, &result, "h").unwrap();

        let b = store.find_symbols_by_name(project, "b").unwrap()[0].id;
        let calls: Vec<_> = store
            .unresolved_relationships(project)
            .unwrap()
            .into_iter()
            .filter(|r| r.target_name.as_deref() == Some("b"))
            .collect();
        assert_eq!(calls.len(), 2);

        assert_eq!(store.bind_relationship(calls[0].id, b, 0.95, "same_file").unwrap(), BindOutcome::Bound);
        assert_eq!(store.bind_relationship(calls[1].id, b, 0.95, "same_file").unwrap(), BindOutcome::Merged);
        let resolved = store.relationships_of_kind(project, RelationshipKind::Calls).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].metadata_str("resolved_by"), Some("same_file"));
    }

    #[test]
    fn test_remove_file_and_stats() {
        let (_dir, conn) = setup();
        let store = GraphStore::new(&conn);
        let project = store.ensure_project("p").unwrap();
        store
            .replace_file(project, Language::Python, &parse("x.py", "def f():\n    pass\n"), "h")
            .unwrap();
        assert_eq!(store.stats(project).unwrap().files, 1);

        assert!(store.remove_file(project, "x.py").unwrap());
        let stats = store.stats(project).unwrap();
        assert_eq!(stats.files, 0);
        assert_eq!(stats.symbols, 0);
        assert_eq!(stats.relationships, 0);
        assert!(!store.remove_file(project, "x.py").unwrap());
    }

    #[test]
    fn test_embedding_roundtrip() {
        let (_dir, conn) = setup();
        let store = GraphStore::new(&conn);
        let project = store.ensure_project("p").unwrap();
        store
            .replace_file(project, Language::Python, &parse("x.py", "def f():\n    pass\n"), "h")
            .unwrap();
        let f = store.find_symbols_by_name(project, "f").unwrap()[0].id;

        store.upsert_embedding(project, f, &[0.1, 0.2, 0.3, 0.4], 1).unwrap();
        let stored = store.embeddings(project).unwrap();
        assert_eq!(stored.len(), 1);
        assert!((stored[0].1[0] - 0.1).abs() < 0.001);
        assert_eq!(store.embedding_versions(project).unwrap().get(&f), Some(&1));

        // A changed file keeps the symbol id but drops the old vector.
        store
            .replace_file(project, Language::Python, &parse("x.py", "def f():\n    return 1\n"), "h2")
            .unwrap();
        assert_eq!(store.find_symbols_by_name(project, "f").unwrap()[0].id, f);
        assert!(store.embeddings(project).unwrap().is_empty());
    }
}
