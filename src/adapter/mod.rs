//! Language Adapter Framework
//!
//! Each grammar-backed language has an adapter that walks its tree-sitter
//! syntax tree and feeds a shared [`FileExtractor`]. Oversized files, files
//! whose grammar fails, and languages with no registered adapter all go
//! through the regex [`PatternAdapter`], so every file yields a result.

pub mod framework;
pub mod extract;
pub mod syntax;
pub mod patterns;
pub mod fallback;
pub mod python;
pub mod javascript;
pub mod typescript;
pub mod rust;
pub mod go;
pub mod cpp;
pub mod java;

pub use framework::{
    AdapterRegistry, Diagnostic, DiagnosticLevel, LanguageAdapter, ParseOptions, ParseResult, ParseStats, Pattern,
    PatternKind, default_registry,
};
pub use extract::{FileExtractor, Span};
pub use fallback::{FALLBACK_CONFIDENCE, PatternAdapter};
