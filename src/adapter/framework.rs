//! Core adapter framework
//!
//! Defines the trait every language adapter implements, the result type it
//! produces, and the registry that dispatches files to adapters.

use super::fallback::PatternAdapter;
use crate::Result;
use crate::bridge::BridgeConfidence;
use crate::language::Language;
use crate::relationship::Relationship;
use crate::symbol::{Symbol, SymbolId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MAX_FILE_SIZE: usize = 1024 * 1024;
pub const DEFAULT_PARSE_TIMEOUT_MS: u64 = 10_000;

/// Knobs every adapter honours.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Files larger than this (bytes) go straight to the pattern fallback
    pub max_file_size: usize,
    /// Budget handed to the tree-sitter parser
    pub parse_timeout: Duration,
    pub detect_bridges: bool,
    pub detect_patterns: bool,
    pub bridge_confidence: BridgeConfidence,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            parse_timeout: Duration::from_millis(DEFAULT_PARSE_TIMEOUT_MS),
            detect_bridges: true,
            detect_patterns: true,
            bridge_confidence: BridgeConfidence::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Note,
    Warning,
    Error,
}

/// Something worth reporting about a parse that still produced a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

/// Per-file parse statistics. Carries no timings so results stay
/// deterministic for identical input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseStats {
    pub lines: usize,
    pub symbols: usize,
    pub relationships: usize,
    pub bridges: usize,
    pub patterns: usize,
    pub error_nodes: usize,
    pub used_fallback: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl ParseStats {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.level == DiagnosticLevel::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.level == DiagnosticLevel::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Singleton,
    Factory,
    Builder,
    Observer,
    RouteHandler,
    TestSuite,
    AsyncApi,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::Singleton => "singleton",
            PatternKind::Factory => "factory",
            PatternKind::Builder => "builder",
            PatternKind::Observer => "observer",
            PatternKind::RouteHandler => "route_handler",
            PatternKind::TestSuite => "test_suite",
            PatternKind::AsyncApi => "async_api",
        }
    }
}

impl FromStr for PatternKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "singleton" => Ok(PatternKind::Singleton),
            "factory" => Ok(PatternKind::Factory),
            "builder" => Ok(PatternKind::Builder),
            "observer" => Ok(PatternKind::Observer),
            "route_handler" => Ok(PatternKind::RouteHandler),
            "test_suite" => Ok(PatternKind::TestSuite),
            "async_api" => Ok(PatternKind::AsyncApi),
            _ => Err(crate::Error::InvalidValue(format!("Unknown pattern: {}", s))),
        }
    }
}

/// A recognised design or usage pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub kind: PatternKind,
    pub name: String,
    pub confidence: f32,
    pub evidence: Vec<String>,
    /// Symbol the pattern was found on (file-local id inside a ParseResult)
    pub symbol_id: Option<SymbolId>,
}

/// Output of parsing one file.
///
/// Symbol ids are file-local: `symbols[i].id == SymbolId(i)`, and parents
/// always precede their children. The store remaps them on write.
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    pub file_path: String,
    pub symbols: Vec<Symbol>,
    pub relationships: Vec<Relationship>,
    pub patterns: Vec<Pattern>,
    pub stats: ParseStats,
}

impl ParseResult {
    pub fn symbol_named(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.name == name)
    }
}

/// A language front-end.
///
/// `parse` returns `Err` only when the grammar could not produce a tree at
/// all; syntax errors inside a tree are reported as diagnostics on a
/// partial result. The registry answers `Err` with the pattern fallback.
pub trait LanguageAdapter: Send + Sync {
    fn language(&self) -> Language;

    fn parse(&self, path: &str, content: &str, options: &ParseOptions) -> Result<ParseResult>;
}

/// Language -> adapter map plus the pattern fallback.
pub struct AdapterRegistry {
    adapters: HashMap<Language, Box<dyn LanguageAdapter>>,
    fallback: PatternAdapter,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterRegistry {
    /// Registry with no grammar adapters; everything uses the fallback.
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
            fallback: PatternAdapter::new(),
        }
    }

    /// Register (or replace) the adapter for its language.
    pub fn register(&mut self, adapter: impl LanguageAdapter + 'static) {
        self.adapters.insert(adapter.language(), Box::new(adapter));
    }

    pub fn get(&self, language: Language) -> Option<&dyn LanguageAdapter> {
        self.adapters.get(&language).map(|a| a.as_ref())
    }

    pub fn languages(&self) -> Vec<Language> {
        let mut langs: Vec<Language> = self.adapters.keys().copied().collect();
        langs.sort();
        langs
    }

    /// Parse a file. Never fails: grammar failures, oversized files and
    /// unregistered languages all degrade to the pattern fallback.
    pub fn parse(&self, language: Language, path: &str, content: &str, options: &ParseOptions) -> ParseResult {
        if content.len() > options.max_file_size {
            tracing::debug!(path, size = content.len(), "file over size threshold, using pattern fallback");
            return self.fallback.parse_with_note(
                language,
                path,
                content,
                options,
                format!("file is {} bytes (limit {}); parsed with pattern fallback", content.len(), options.max_file_size),
            );
        }

        let Some(adapter) = self.get(language) else {
            return self.fallback.parse_with_note(
                language,
                path,
                content,
                options,
                format!("no grammar adapter for {}; parsed with pattern fallback", language),
            );
        };

        match adapter.parse(path, content, options) {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(path, error = %err, "grammar parse failed, using pattern fallback");
                let mut result = self.fallback.parse_lang(language, path, content, options);
                result.stats.diagnostics.insert(
                    0,
                    Diagnostic {
                        level: DiagnosticLevel::Warning,
                        line: 1,
                        column: 0,
                        message: format!("grammar parse failed ({}); parsed with pattern fallback", err),
                    },
                );
                result
            }
        }
    }
}

/// Registry with every built-in grammar adapter
pub fn default_registry() -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();
    registry.register(super::python::PythonAdapter::new());
    registry.register(super::javascript::JavaScriptAdapter::new());
    registry.register(super::typescript::TypeScriptAdapter::new());
    registry.register(super::rust::RustAdapter::new());
    registry.register(super::go::GoAdapter::new());
    registry.register(super::cpp::CppAdapter::new());
    registry.register(super::java::JavaAdapter::new());
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    struct BrokenAdapter;

    impl LanguageAdapter for BrokenAdapter {
        fn language(&self) -> Language {
            Language::Python
        }

        fn parse(&self, path: &str, _content: &str, _options: &ParseOptions) -> Result<ParseResult> {
            Err(Error::Parse {
                path: path.to_string(),
                message: "no tree".to_string(),
            })
        }
    }

    #[test]
    fn test_registry_dispatch() {
        let registry = default_registry();
        assert_eq!(registry.languages(), Language::all().to_vec());
        assert_eq!(registry.get(Language::Java).map(|a| a.language()), Some(Language::Java));

        let result = registry.parse(
            Language::Cpp,
            "src/engine.cpp",
            "int run(int n) { return n; }\n",
            &ParseOptions::default(),
        );
        assert!(!result.stats.used_fallback);
        assert_eq!(result.symbol_named("run").unwrap().parameters, vec!["n"]);
    }

    #[test]
    fn test_unregistered_language_uses_fallback() {
        let mut registry = AdapterRegistry::new();
        registry.register(crate::adapter::python::PythonAdapter::new());

        let result = registry.parse(
            Language::Java,
            "src/Main.java",
            "public class Main {\n    public static void main(String[] args) {}\n}\n",
            &ParseOptions::default(),
        );
        assert!(result.stats.used_fallback);
        assert!(result.symbol_named("Main").is_some());
    }

    #[test]
    fn test_grammar_failure_falls_back() {
        let mut registry = AdapterRegistry::new();
        registry.register(BrokenAdapter);

        let result = registry.parse(
            Language::Python,
            "svc/app.py",
            "def handler(event):\n    return event\n",
            &ParseOptions::default(),
        );

        assert!(result.stats.used_fallback);
        assert!(result.symbol_named("handler").is_some());
        assert_eq!(result.stats.diagnostics[0].level, DiagnosticLevel::Warning);
    }

    #[test]
    fn test_oversized_file_uses_fallback() {
        let registry = default_registry();
        let options = ParseOptions {
            max_file_size: 16,
            ..ParseOptions::default()
        };
        let result = registry.parse(Language::Go, "main.go", "package main\n\nfunc main() {}\n", &options);

        assert!(result.stats.used_fallback);
        assert!(!result.stats.has_errors());
        assert!(result.symbols.iter().all(|s| s.confidence <= 0.8));
    }
}
