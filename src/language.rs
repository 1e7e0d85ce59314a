//! Source languages known to the indexer.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Rust,
    Go,
    Cpp,
    Java,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Rust => "rust",
            Language::Go => "go",
            Language::Cpp => "cpp",
            Language::Java => "java",
        }
    }

    pub fn all() -> &'static [Language] {
        &[
            Language::Python,
            Language::JavaScript,
            Language::TypeScript,
            Language::Rust,
            Language::Go,
            Language::Cpp,
            Language::Java,
        ]
    }

    /// File extensions (without the dot) mapped to this language.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Language::Python => &["py", "pyi"],
            Language::JavaScript => &["js", "jsx", "mjs", "cjs"],
            Language::TypeScript => &["ts", "tsx", "mts", "cts"],
            Language::Rust => &["rs"],
            Language::Go => &["go"],
            Language::Cpp => &["cpp", "cc", "cxx", "hpp", "hh", "hxx", "h"],
            Language::Java => &["java"],
        }
    }

    pub fn from_extension(ext: &str) -> Option<Language> {
        let ext = ext.to_ascii_lowercase();
        Language::all()
            .iter()
            .copied()
            .find(|lang| lang.extensions().contains(&ext.as_str()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Option<Language> {
        path.as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Language::from_extension)
    }

    /// Separator used when joining scopes into a qualified name.
    pub fn scope_separator(&self) -> &'static str {
        match self {
            Language::Rust | Language::Cpp => "::",
            _ => ".",
        }
    }

    /// Whether every file of a directory shares one package scope.
    pub fn package_scoped(&self) -> bool {
        matches!(self, Language::Go | Language::Java)
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "python" | "py" => Ok(Language::Python),
            "javascript" | "js" | "node" => Ok(Language::JavaScript),
            "typescript" | "ts" => Ok(Language::TypeScript),
            "rust" | "rs" => Ok(Language::Rust),
            "go" | "golang" => Ok(Language::Go),
            "cpp" | "c++" | "cxx" => Ok(Language::Cpp),
            "java" => Ok(Language::Java),
            _ => Err(Error::InvalidValue(format!("Unknown language: {}", s))),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_from_path() {
        assert_eq!(Language::from_path("svc/main.go"), Some(Language::Go));
        assert_eq!(Language::from_path("web/App.TSX"), Some(Language::TypeScript));
        assert_eq!(Language::from_path("include/engine.hpp"), Some(Language::Cpp));
        assert_eq!(Language::from_path("README.md"), None);
    }

    #[test]
    fn test_language_aliases() {
        assert_eq!(Language::from_str("golang").unwrap(), Language::Go);
        assert_eq!(Language::from_str("C++").unwrap(), Language::Cpp);
        assert!(Language::from_str("cobol").is_err());
    }
}
