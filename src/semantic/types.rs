//! Semantic result types shared by the orchestrator and the store.

use crate::symbol::SymbolId;
use crate::{Error, ProjectId, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Embedding width.
pub const EMBEDDING_DIMENSION: usize = 128;

/// Bump when the embedding function changes; stored vectors with an older
/// version are recomputed.
pub const ALGORITHM_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightSeverity {
    Info,
    Warning,
    Critical,
}

impl InsightSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightSeverity::Info => "info",
            InsightSeverity::Warning => "warning",
            InsightSeverity::Critical => "critical",
        }
    }
}

impl FromStr for InsightSeverity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "info" => Ok(InsightSeverity::Info),
            "warning" => Ok(InsightSeverity::Warning),
            "critical" => Ok(InsightSeverity::Critical),
            _ => Err(Error::InvalidValue(format!("Unknown insight severity: {}", s))),
        }
    }
}

impl std::fmt::Display for InsightSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightCategory {
    Duplication,
    GodClass,
    LongFunction,
    HighFanOut,
    CircularDependency,
    UnusedCode,
}

impl InsightCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightCategory::Duplication => "duplication",
            InsightCategory::GodClass => "god_class",
            InsightCategory::LongFunction => "long_function",
            InsightCategory::HighFanOut => "high_fan_out",
            InsightCategory::CircularDependency => "circular_dependency",
            InsightCategory::UnusedCode => "unused_code",
        }
    }
}

impl FromStr for InsightCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "duplication" => Ok(InsightCategory::Duplication),
            "god_class" => Ok(InsightCategory::GodClass),
            "long_function" => Ok(InsightCategory::LongFunction),
            "high_fan_out" => Ok(InsightCategory::HighFanOut),
            "circular_dependency" => Ok(InsightCategory::CircularDependency),
            "unused_code" => Ok(InsightCategory::UnusedCode),
            _ => Err(Error::InvalidValue(format!("Unknown insight category: {}", s))),
        }
    }
}

/// An architectural finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub id: i64,
    pub project_id: ProjectId,
    pub severity: InsightSeverity,
    pub category: InsightCategory,
    pub title: String,
    pub description: String,
    pub affected_symbols: Vec<SymbolId>,
    pub recommendations: Vec<String>,
    pub confidence: f32,
    /// RFC 3339
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterMember {
    pub symbol_id: SymbolId,
    /// Cosine similarity to the cluster centroid
    pub score: f32,
}

/// Symbols whose embeddings sit close together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticCluster {
    pub id: i64,
    pub project_id: ProjectId,
    pub label: String,
    /// Mean member score
    pub cohesion: f32,
    pub members: Vec<ClusterMember>,
}

/// Clusters and insights for one project, as served to callers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SemanticInsights {
    pub clusters: Vec<SemanticCluster>,
    pub insights: Vec<Insight>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticError {
    /// Empty for project-wide stages (clustering, insights)
    pub file_path: String,
    pub message: String,
}

/// Outcome of one semantic run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SemanticReport {
    pub symbols_analyzed: usize,
    pub embeddings_generated: usize,
    pub clusters_created: usize,
    pub insights_generated: usize,
    pub duration_ms: u64,
    pub errors: Vec<SemanticError>,
}

impl std::fmt::Display for SemanticReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} symbols analyzed, {} embeddings, {} clusters, {} insights in {}ms ({} errors)",
            self.symbols_analyzed,
            self.embeddings_generated,
            self.clusters_created,
            self.insights_generated,
            self.duration_ms,
            self.errors.len()
        )
    }
}
