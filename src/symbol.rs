//! Symbol types - the universal schema every adapter projects into
//!
//! Language-specific constructs map onto a fixed set of kinds; idioms that
//! don't fit a kind (decorators, receivers, generics, async markers) are kept
//! as `semantic_tags` and `language_features`.

use crate::language::Language;
use crate::{Error, ProjectId, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

/// Integer identity of a symbol.
///
/// Inside a `ParseResult` the id is file-local (the symbol's index in the
/// result); once persisted it is the database row id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolId(pub i64);

impl SymbolId {
    pub fn local(index: usize) -> Self {
        SymbolId(index as i64)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for SymbolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Module,
    Namespace,
    Class,
    Struct,
    Interface,
    Trait,
    Enum,
    Function,
    Method,
    Constructor,
    Field,
    Variable,
    Constant,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Module => "module",
            SymbolKind::Namespace => "namespace",
            SymbolKind::Class => "class",
            SymbolKind::Struct => "struct",
            SymbolKind::Interface => "interface",
            SymbolKind::Trait => "trait",
            SymbolKind::Enum => "enum",
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Constructor => "constructor",
            SymbolKind::Field => "field",
            SymbolKind::Variable => "variable",
            SymbolKind::Constant => "constant",
        }
    }

    pub fn all() -> &'static [SymbolKind] {
        &[
            SymbolKind::Module,
            SymbolKind::Namespace,
            SymbolKind::Class,
            SymbolKind::Struct,
            SymbolKind::Interface,
            SymbolKind::Trait,
            SymbolKind::Enum,
            SymbolKind::Function,
            SymbolKind::Method,
            SymbolKind::Constructor,
            SymbolKind::Field,
            SymbolKind::Variable,
            SymbolKind::Constant,
        ]
    }

    /// Executable code: functions, methods, constructors.
    pub fn is_callable(&self) -> bool {
        matches!(self, SymbolKind::Function | SymbolKind::Method | SymbolKind::Constructor)
    }

    /// Types that can hold methods and take part in a class hierarchy.
    pub fn is_type(&self) -> bool {
        matches!(
            self,
            SymbolKind::Class | SymbolKind::Struct | SymbolKind::Interface | SymbolKind::Trait | SymbolKind::Enum
        )
    }
}

impl FromStr for SymbolKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "module" | "file" | "package" => Ok(SymbolKind::Module),
            "namespace" | "ns" => Ok(SymbolKind::Namespace),
            "class" => Ok(SymbolKind::Class),
            "struct" => Ok(SymbolKind::Struct),
            "interface" => Ok(SymbolKind::Interface),
            "trait" => Ok(SymbolKind::Trait),
            "enum" => Ok(SymbolKind::Enum),
            "function" | "fn" | "def" | "func" => Ok(SymbolKind::Function),
            "method" => Ok(SymbolKind::Method),
            "constructor" | "ctor" => Ok(SymbolKind::Constructor),
            "field" | "property" => Ok(SymbolKind::Field),
            "variable" | "var" | "let" => Ok(SymbolKind::Variable),
            "constant" | "const" | "static" => Ok(SymbolKind::Constant),
            _ => Err(Error::InvalidValue(format!("Unknown symbol kind: {}", s))),
        }
    }
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
    Internal,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::Private => "private",
            Visibility::Internal => "internal",
        }
    }
}

impl FromStr for Visibility {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "public" | "pub" => Ok(Visibility::Public),
            "protected" => Ok(Visibility::Protected),
            "private" => Ok(Visibility::Private),
            "internal" | "crate" | "package" => Ok(Visibility::Internal),
            _ => Err(Error::InvalidValue(format!("Unknown visibility: {}", s))),
        }
    }
}

/// A named entity in the graph: function, class, module, field...
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub project_id: ProjectId,
    pub language: Language,
    /// Bare identifier
    pub name: String,
    /// Canonical name, unique within (project, language)
    pub qualified_name: String,
    pub kind: SymbolKind,
    /// Repository-relative path
    pub file_path: String,
    /// 1-indexed
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    pub end_column: u32,
    pub signature: Option<String>,
    pub return_type: Option<String>,
    pub visibility: Visibility,
    pub namespace: Option<String>,
    pub parent_symbol_id: Option<SymbolId>,
    /// Parameter names in declaration order, receiver excluded
    pub parameters: Vec<String>,
    pub is_exported: bool,
    pub is_async: bool,
    pub is_abstract: bool,
    /// Heuristic certainty in [0, 1]
    pub confidence: f32,
    pub semantic_tags: BTreeSet<String>,
    pub language_features: BTreeMap<String, String>,
}

impl Symbol {
    /// Create a symbol with the required fields; everything else defaults.
    pub fn new(
        language: Language,
        kind: SymbolKind,
        name: impl Into<String>,
        qualified_name: impl Into<String>,
        file_path: impl Into<String>,
        line: u32,
        end_line: u32,
    ) -> Self {
        Self {
            id: SymbolId(0),
            project_id: 0,
            language,
            name: name.into(),
            qualified_name: qualified_name.into(),
            kind,
            file_path: file_path.into(),
            line,
            column: 0,
            end_line: end_line.max(line),
            end_column: 0,
            signature: None,
            return_type: None,
            visibility: Visibility::Public,
            namespace: None,
            parent_symbol_id: None,
            parameters: Vec::new(),
            is_exported: false,
            is_async: false,
            is_abstract: false,
            confidence: 1.0,
            semantic_tags: BTreeSet::new(),
            language_features: BTreeMap::new(),
        }
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.semantic_tags.insert(tag.into());
        self
    }

    pub fn with_feature(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.language_features.insert(key.into(), value.into());
        self
    }

    /// Number of lines the symbol spans.
    pub fn span_lines(&self) -> u32 {
        self.end_line.saturating_sub(self.line) + 1
    }

    pub fn contains_line(&self, line: u32) -> bool {
        self.line <= line && line <= self.end_line
    }

    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    /// Get a short description for display
    pub fn short_description(&self) -> String {
        match &self.signature {
            Some(sig) => format!("{} {}{}", self.kind, self.name, sig),
            None => format!("{} {}", self.kind, self.name),
        }
    }
}
