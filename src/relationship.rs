//! Relationship types - typed, scored edges between symbols
//!
//! A relationship always has a source symbol. The target may be missing
//! (`to_symbol_id == None`) until the resolution pass binds `target_name`
//! to a symbol.

use crate::symbol::SymbolId;
use crate::{Error, ProjectId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    /// Parent scope contains a child symbol
    Contains,
    Calls,
    /// Class extends class
    Inherits,
    /// Type implements interface/trait
    Implements,
    /// Any other reference (type usage, embedding)
    Uses,
    Imports,
    DataFlow,
    Overrides,
    GrpcCalls,
    HttpCalls,
    Spawns,
    InvokesScript,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::Contains => "contains",
            RelationshipKind::Calls => "calls",
            RelationshipKind::Inherits => "inherits",
            RelationshipKind::Implements => "implements",
            RelationshipKind::Uses => "uses",
            RelationshipKind::Imports => "imports",
            RelationshipKind::DataFlow => "dataflow",
            RelationshipKind::Overrides => "overrides",
            RelationshipKind::GrpcCalls => "grpc_calls",
            RelationshipKind::HttpCalls => "http_calls",
            RelationshipKind::Spawns => "spawns",
            RelationshipKind::InvokesScript => "invokes_script",
        }
    }

    pub fn all() -> &'static [RelationshipKind] {
        &[
            RelationshipKind::Contains,
            RelationshipKind::Calls,
            RelationshipKind::Inherits,
            RelationshipKind::Implements,
            RelationshipKind::Uses,
            RelationshipKind::Imports,
            RelationshipKind::DataFlow,
            RelationshipKind::Overrides,
            RelationshipKind::GrpcCalls,
            RelationshipKind::HttpCalls,
            RelationshipKind::Spawns,
            RelationshipKind::InvokesScript,
        ]
    }

    /// Edges followed when building call chains.
    pub fn is_call_like(&self) -> bool {
        matches!(
            self,
            RelationshipKind::Calls
                | RelationshipKind::GrpcCalls
                | RelationshipKind::HttpCalls
                | RelationshipKind::Spawns
                | RelationshipKind::InvokesScript
        )
    }

    /// Edges produced by the bridge detector.
    pub fn is_bridge(&self) -> bool {
        matches!(
            self,
            RelationshipKind::GrpcCalls
                | RelationshipKind::HttpCalls
                | RelationshipKind::Spawns
                | RelationshipKind::InvokesScript
        )
    }

    /// Class-hierarchy edges.
    pub fn is_hierarchy(&self) -> bool {
        matches!(self, RelationshipKind::Inherits | RelationshipKind::Implements)
    }
}

impl FromStr for RelationshipKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "contains" => Ok(RelationshipKind::Contains),
            "calls" | "call" => Ok(RelationshipKind::Calls),
            "inherits" | "extends" => Ok(RelationshipKind::Inherits),
            "implements" => Ok(RelationshipKind::Implements),
            "uses" | "references" => Ok(RelationshipKind::Uses),
            "imports" | "import" => Ok(RelationshipKind::Imports),
            "dataflow" | "data_flow" => Ok(RelationshipKind::DataFlow),
            "overrides" => Ok(RelationshipKind::Overrides),
            "grpc_calls" | "grpc" => Ok(RelationshipKind::GrpcCalls),
            "http_calls" | "http" => Ok(RelationshipKind::HttpCalls),
            "spawns" | "spawn" => Ok(RelationshipKind::Spawns),
            "invokes_script" | "script_invoke" => Ok(RelationshipKind::InvokesScript),
            _ => Err(Error::InvalidValue(format!("Unknown relationship kind: {}", s))),
        }
    }
}

impl std::fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A directed, typed edge in the symbol graph.
///
/// - **Syntactic** (`confidence = 1.0`): read straight off the syntax tree
/// - **Inferred** (`confidence < 1.0`): produced by heuristics, fallback
///   parsing or cross-language bridge detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: i64,
    pub project_id: ProjectId,
    pub from_symbol_id: SymbolId,
    pub to_symbol_id: Option<SymbolId>,
    /// Textual reference used to resolve `to_symbol_id`
    pub target_name: Option<String>,
    pub kind: RelationshipKind,
    pub confidence: f32,
    pub context_line: Option<u32>,
    pub context_column: Option<u32>,
    pub context_snippet: Option<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub cross_language: bool,
    /// File whose parse produced this edge; `None` for derived edges
    pub source_file: Option<String>,
}

impl Relationship {
    /// Edge to a known target (confidence = 1.0)
    pub fn new(from: SymbolId, to: SymbolId, kind: RelationshipKind) -> Self {
        Self {
            id: 0,
            project_id: 0,
            from_symbol_id: from,
            to_symbol_id: Some(to),
            target_name: None,
            kind,
            confidence: 1.0,
            context_line: None,
            context_column: None,
            context_snippet: None,
            metadata: BTreeMap::new(),
            cross_language: false,
            source_file: None,
        }
    }

    /// Edge whose target is only known by name
    pub fn unresolved(from: SymbolId, target_name: impl Into<String>, kind: RelationshipKind) -> Self {
        Self {
            to_symbol_id: None,
            target_name: Some(target_name.into()),
            ..Self::new(from, from, kind)
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_context(mut self, line: u32, column: u32, snippet: impl Into<String>) -> Self {
        self.context_line = Some(line);
        self.context_column = Some(column);
        let snippet: String = snippet.into();
        self.context_snippet = Some(truncate_snippet(snippet.trim()));
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn cross_language(mut self) -> Self {
        self.cross_language = true;
        self
    }

    pub fn is_resolved(&self) -> bool {
        self.to_symbol_id.is_some()
    }

    /// Natural key used for de-duplication.
    pub fn natural_key(&self) -> (ProjectId, SymbolId, Option<SymbolId>, RelationshipKind) {
        (self.project_id, self.from_symbol_id, self.to_symbol_id, self.kind)
    }

    /// String list stored under `key` in the metadata.
    pub fn metadata_strings(&self, key: &str) -> Vec<String> {
        match self.metadata.get(key) {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(serde_json::Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

const MAX_SNIPPET_CHARS: usize = 160;

fn truncate_snippet(snippet: &str) -> String {
    if snippet.chars().count() <= MAX_SNIPPET_CHARS {
        return snippet.to_string();
    }
    let mut out: String = snippet.chars().take(MAX_SNIPPET_CHARS).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_kind_roundtrip() {
        for kind in RelationshipKind::all() {
            let parsed: RelationshipKind = kind.as_str().parse().unwrap();
            assert_eq!(*kind, parsed);
        }
    }

    #[test]
    fn test_unresolved_relationship() {
        let rel = Relationship::unresolved(SymbolId(3), "self.repo.save", RelationshipKind::Calls)
            .with_confidence(0.75)
            .with_metadata("args", vec!["order"]);

        assert!(!rel.is_resolved());
        assert_eq!(rel.target_name.as_deref(), Some("self.repo.save"));
        assert_eq!(rel.metadata_strings("args"), vec!["order".to_string()]);
        assert_eq!(rel.confidence, 0.75);
    }

    #[test]
    fn test_snippet_truncation() {
        let long = "x".repeat(400);
        let rel = Relationship::new(SymbolId(1), SymbolId(2), RelationshipKind::Calls).with_context(4, 2, long);
        assert!(rel.context_snippet.unwrap().ends_with("..."));
    }

    #[test]
    fn test_kind_groups() {
        assert!(RelationshipKind::GrpcCalls.is_bridge());
        assert!(RelationshipKind::GrpcCalls.is_call_like());
        assert!(!RelationshipKind::Contains.is_call_like());
        assert!(RelationshipKind::Implements.is_hierarchy());
    }
}
