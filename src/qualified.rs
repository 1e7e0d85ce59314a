//! Qualified names - per-language canonical identity of a symbol
//!
//! A qualified name is a module path followed by the chain of enclosing
//! scopes and the symbol name, joined with the language separator:
//!
//! - Python `src/billing/invoice.py` method `Invoice.total` -> `src.billing.invoice.Invoice.total`
//! - Rust `src/store/mod.rs` fn `open` -> `crate::store::open`
//! - Go package `checkout` method `(*Service).PlaceOrder` -> `checkout.Service.PlaceOrder`
//! - JavaScript `web/api/index.js` class `Client` -> `web.api.Client`

use crate::language::Language;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    pub language: Language,
    pub segments: Vec<String>,
}

impl QualifiedName {
    /// Qualified name of the module a file defines.
    pub fn for_module(language: Language, file_path: &str) -> Self {
        Self {
            language,
            segments: module_segments(language, file_path),
        }
    }

    /// Qualified name rooted at an explicit module (Go package, Java package).
    pub fn for_package(language: Language, package: &str) -> Self {
        let segments = package
            .split(['.', '/'])
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self { language, segments }
    }

    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Self {
            language: self.language,
            segments,
        }
    }

    /// Last segment, or empty for an anonymous root.
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    pub fn to_qualified_string(&self) -> String {
        self.segments.join(self.language.scope_separator())
    }

    pub fn parse(language: Language, qualified: &str) -> Self {
        let segments = split_segments(qualified)
            .into_iter()
            .map(str::to_string)
            .collect();
        Self { language, segments }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_qualified_string())
    }
}

/// Module path segments derived from a repository-relative file path.
pub fn module_segments(language: Language, file_path: &str) -> Vec<String> {
    let normalized = file_path.replace('\\', "/");
    let trimmed = normalized.trim_start_matches("./");
    let without_ext = match trimmed.rsplit_once('.') {
        Some((stem, ext)) if !ext.contains('/') => stem,
        _ => trimmed,
    };
    let mut parts: Vec<String> = without_ext
        .split('/')
        .filter(|p| !p.is_empty())
        .map(|p| p.replace(['-', ' '], "_"))
        .collect();

    match language {
        Language::Python => {
            if parts.last().is_some_and(|p| p == "__init__") {
                parts.pop();
            }
        }
        Language::JavaScript | Language::TypeScript => {
            if parts.last().is_some_and(|p| p == "index") && parts.len() > 1 {
                parts.pop();
            }
        }
        Language::Rust => {
            if parts.first().is_some_and(|p| p == "src") {
                parts.remove(0);
            }
            if parts
                .last()
                .is_some_and(|p| p == "mod" || p == "lib" || p == "main")
            {
                parts.pop();
            }
            parts.insert(0, "crate".to_string());
        }
        Language::Go | Language::Java => {
            // Package comes from the directory; the file name is not a scope.
            parts.pop();
            if parts.is_empty() {
                parts.push("main".to_string());
            }
        }
        Language::Cpp => parts.clear(),
    }
    parts
}

/// Split a qualified or member-access reference into its segments.
///
/// Accepts `.`, `::` and `->` as separators so references taken from any
/// language can be compared against stored qualified names.
pub fn split_segments(reference: &str) -> Vec<&str> {
    reference
        .split("::")
        .flat_map(|s| s.split("->"))
        .flat_map(|s| s.split('.'))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Last identifier of a reference: `self.repo.save` -> `save`.
pub fn simple_name(reference: &str) -> &str {
    split_segments(reference).last().copied().unwrap_or(reference)
}

/// Receiver immediately before the simple name: `self.repo.save` -> `repo`.
pub fn receiver(reference: &str) -> Option<&str> {
    let segments = split_segments(reference);
    if segments.len() < 2 {
        return None;
    }
    segments.get(segments.len() - 2).copied()
}

/// Whether a receiver names the enclosing instance.
pub fn is_self_receiver(receiver: &str) -> bool {
    matches!(receiver, "self" | "this" | "Self" | "cls" | "super")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_module_path() {
        let q = QualifiedName::for_module(Language::Python, "src/billing/invoice.py");
        assert_eq!(q.to_string(), "src.billing.invoice");
        let pkg = QualifiedName::for_module(Language::Python, "billing/__init__.py");
        assert_eq!(pkg.to_string(), "billing");
    }

    #[test]
    fn test_rust_module_path() {
        let q = QualifiedName::for_module(Language::Rust, "src/store/mod.rs");
        assert_eq!(q.child("open").to_string(), "crate::store::open");
        let root = QualifiedName::for_module(Language::Rust, "src/lib.rs");
        assert_eq!(root.to_string(), "crate");
    }

    #[test]
    fn test_go_package_and_js_index() {
        let go = QualifiedName::for_package(Language::Go, "checkout");
        assert_eq!(go.child("Service").child("PlaceOrder").to_string(), "checkout.Service.PlaceOrder");
        let js = QualifiedName::for_module(Language::JavaScript, "web/api/index.js");
        assert_eq!(js.child("Client").to_string(), "web.api.Client");
    }

    #[test]
    fn test_reference_helpers() {
        assert_eq!(simple_name("self.repo.save"), "save");
        assert_eq!(receiver("self.repo.save"), Some("repo"));
        assert_eq!(simple_name("std::fs::read"), "read");
        assert_eq!(receiver("helper"), None);
        assert!(is_self_receiver("this"));
    }
}
