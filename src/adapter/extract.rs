//! Shared extraction state for one file
//!
//! Adapters walk their syntax (tree or regex matches) and feed symbols and
//! references into a `FileExtractor`, which assigns file-local ids, keeps the
//! scope stack, builds qualified names, and finally attaches bridges and
//! patterns.

use super::framework::{Diagnostic, DiagnosticLevel, ParseOptions, ParseResult, ParseStats};
use super::patterns;
use crate::bridge;
use crate::language::Language;
use crate::qualified::QualifiedName;
use crate::relationship::{Relationship, RelationshipKind};
use crate::symbol::{Symbol, SymbolId, SymbolKind};
use std::collections::{BTreeSet, HashMap};

/// Confidence cap for symbols overlapping a syntax error.
pub const PARTIAL_CONFIDENCE: f32 = 0.6;

const MAX_DIAGNOSTICS: usize = 20;

/// 1-indexed line/column range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl Span {
    pub fn lines(line: u32, end_line: u32) -> Self {
        Self {
            line,
            column: 0,
            end_line: end_line.max(line),
            end_column: 0,
        }
    }

    pub fn contains(&self, line: u32) -> bool {
        self.line <= line && line <= self.end_line
    }
}

pub struct FileExtractor<'s> {
    language: Language,
    path: String,
    source: &'s str,
    /// Byte offset where each line starts
    line_starts: Vec<usize>,
    confidence: f32,
    symbols: Vec<Symbol>,
    relationships: Vec<Relationship>,
    scopes: Vec<(SymbolId, QualifiedName)>,
    diagnostics: Vec<Diagnostic>,
    error_lines: BTreeSet<u32>,
    error_nodes: usize,
    used_fallback: bool,
}

impl<'s> FileExtractor<'s> {
    /// Start extraction; creates the module symbol as the root scope.
    pub fn new(language: Language, path: &str, source: &'s str, confidence: f32) -> Self {
        let module = QualifiedName::for_module(language, path);
        let line_count = source.lines().count().max(1) as u32;
        let name = module_display_name(&module, path);
        // Go and Java files share their package scope, so the module row
        // itself is keyed by path.
        let qualified = if module.segments.is_empty() || language.package_scoped() {
            path.to_string()
        } else {
            module.to_qualified_string()
        };
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();

        let mut symbol = Symbol::new(language, SymbolKind::Module, name, qualified, path, 1, line_count)
            .with_confidence(confidence);
        symbol.is_exported = true;

        Self {
            language,
            path: path.to_string(),
            source,
            line_starts,
            confidence,
            symbols: vec![symbol],
            relationships: Vec::new(),
            scopes: vec![(SymbolId::local(0), module)],
            diagnostics: Vec::new(),
            error_lines: BTreeSet::new(),
            error_nodes: 0,
            used_fallback: false,
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn source(&self) -> &'s str {
        self.source
    }

    pub fn module_id(&self) -> SymbolId {
        SymbolId::local(0)
    }

    /// Re-root the module scope at a declared package (Go `package x`,
    /// Java `package a.b`). The module symbol keeps its per-file identity.
    pub fn set_package(&mut self, package: &str) {
        let qualified = QualifiedName::for_package(self.language, package);
        if qualified.segments.is_empty() {
            return;
        }
        self.symbols[0].name = package.to_string();
        self.scopes[0].1 = qualified;
    }

    /// Qualified name that members of the module scope are built from.
    pub fn module_qualified(&self) -> &QualifiedName {
        &self.scopes[0].1
    }

    /// Qualified name of the innermost scope.
    pub fn current_qualified(&self) -> &QualifiedName {
        self.scopes.last().map(|(_, q)| q).unwrap_or(&self.scopes[0].1)
    }

    pub fn mark_fallback(&mut self) {
        self.used_fallback = true;
    }

    pub fn current_scope(&self) -> SymbolId {
        self.scopes.last().map(|(id, _)| *id).unwrap_or(SymbolId::local(0))
    }

    /// Kind of the innermost scope symbol.
    pub fn current_scope_kind(&self) -> SymbolKind {
        self.symbols[self.current_scope().index()].kind
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.index()]
    }

    /// Most recent type symbol with this simple name.
    pub fn find_type(&self, name: &str) -> Option<SymbolId> {
        self.symbols
            .iter()
            .rev()
            .find(|s| s.kind.is_type() && s.name == name)
            .map(|s| s.id)
    }

    /// Most recent callable with this simple name.
    pub fn find_callable(&self, name: &str) -> Option<SymbolId> {
        self.symbols
            .iter()
            .rev()
            .find(|s| s.kind.is_callable() && s.name == name)
            .map(|s| s.id)
    }

    /// Add a symbol under the current scope and a `contains` edge to it.
    pub fn add_symbol(&mut self, kind: SymbolKind, name: &str, span: Span) -> SymbolId {
        let parent = self.current_scope();
        let qualified = self
            .scopes
            .last()
            .map(|(_, q)| q.child(name))
            .unwrap_or_else(|| QualifiedName::parse(self.language, name));
        self.add_symbol_at(kind, name, span, parent, qualified)
    }

    /// Add a symbol under an explicit parent (Go methods, Rust impl blocks).
    pub fn add_symbol_under(&mut self, kind: SymbolKind, name: &str, span: Span, parent: SymbolId) -> SymbolId {
        let qualified = self.scope_name(parent).child(name);
        self.add_symbol_at(kind, name, span, parent, qualified)
    }

    /// Add a symbol whose qualified name does not follow from its parent,
    /// e.g. a Go method on a receiver declared in another file.
    pub fn add_symbol_qualified(
        &mut self,
        kind: SymbolKind,
        name: &str,
        span: Span,
        parent: SymbolId,
        qualified: QualifiedName,
    ) -> SymbolId {
        self.add_symbol_at(kind, name, span, parent, qualified)
    }

    fn scope_name(&self, id: SymbolId) -> QualifiedName {
        if id == self.module_id() {
            return self.scopes[0].1.clone();
        }
        QualifiedName::parse(self.language, &self.symbols[id.index()].qualified_name)
    }

    fn add_symbol_at(
        &mut self,
        kind: SymbolKind,
        name: &str,
        span: Span,
        parent: SymbolId,
        qualified: QualifiedName,
    ) -> SymbolId {
        let id = SymbolId::local(self.symbols.len());
        let mut symbol = Symbol::new(
            self.language,
            kind,
            name,
            qualified.to_qualified_string(),
            self.path.clone(),
            span.line,
            span.end_line,
        )
        .with_confidence(self.confidence);
        symbol.id = id;
        symbol.column = span.column;
        symbol.end_column = span.end_column;
        symbol.parent_symbol_id = Some(parent);
        let namespace = QualifiedName {
            language: self.language,
            segments: qualified.segments[..qualified.segments.len().saturating_sub(1)].to_vec(),
        };
        if !namespace.segments.is_empty() {
            symbol.namespace = Some(namespace.to_qualified_string());
        }
        self.symbols.push(symbol);

        self.relationships.push(
            Relationship::new(parent, id, RelationshipKind::Contains).with_confidence(self.confidence),
        );
        id
    }

    /// Make `id` the current scope for symbols added next.
    pub fn enter(&mut self, id: SymbolId) {
        let qualified = self.scope_name(id);
        self.scopes.push((id, qualified));
    }

    /// Enter `id` but build the names of the symbols added next from
    /// `qualified` (Rust trait impls, impls of types from other files).
    pub fn enter_qualified(&mut self, id: SymbolId, qualified: QualifiedName) {
        self.scopes.push((id, qualified));
    }

    pub fn exit(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Unresolved reference from the current scope.
    pub fn add_reference(&mut self, kind: RelationshipKind, target: &str, line: u32, column: u32) -> &mut Relationship {
        let from = self.current_scope();
        self.add_reference_from(from, kind, target, line, column)
    }

    pub fn add_reference_from(
        &mut self,
        from: SymbolId,
        kind: RelationshipKind,
        target: &str,
        line: u32,
        column: u32,
    ) -> &mut Relationship {
        let snippet = self.line_text(line).to_string();
        let rel = Relationship::unresolved(from, target.trim(), kind)
            .with_confidence(self.confidence)
            .with_context(line, column, snippet);
        self.relationships.push(rel);
        let last = self.relationships.len() - 1;
        &mut self.relationships[last]
    }

    /// Call site with the data-flow hints the enrichment passes consume.
    pub fn add_call(&mut self, target: &str, line: u32, column: u32, args: Vec<String>, assigned_to: Option<String>) {
        let rel = self.add_reference(RelationshipKind::Calls, target, line, column);
        if !args.is_empty() {
            rel.metadata.insert("args".to_string(), serde_json::json!(args));
        }
        if let Some(var) = assigned_to {
            rel.metadata.insert("assigned_to".to_string(), serde_json::Value::String(var));
        }
    }

    /// Record a syntax error region.
    pub fn syntax_error(&mut self, span: Span, message: String) {
        self.error_nodes += 1;
        for line in span.line..=span.end_line.min(span.line + 200) {
            self.error_lines.insert(line);
        }
        if self.diagnostics.len() < MAX_DIAGNOSTICS {
            self.diagnostics.push(Diagnostic {
                level: DiagnosticLevel::Error,
                line: span.line,
                column: span.column,
                message,
            });
        }
    }

    pub fn note(&mut self, level: DiagnosticLevel, line: u32, message: String) {
        if self.diagnostics.len() < MAX_DIAGNOSTICS {
            self.diagnostics.push(Diagnostic {
                level,
                line,
                column: 0,
                message,
            });
        }
    }

    pub fn line_text(&self, line: u32) -> &'s str {
        let Some(&start) = (line as usize).checked_sub(1).and_then(|i| self.line_starts.get(i)) else {
            return "";
        };
        let end = self.line_starts.get(line as usize).map_or(self.source.len(), |next| next - 1);
        self.source[start..end].trim_end_matches('\r')
    }

    /// Innermost callable containing `line`, else innermost type, else the module.
    pub fn enclosing_symbol(&self, line: u32) -> SymbolId {
        let innermost = |pred: &dyn Fn(&Symbol) -> bool| {
            self.symbols
                .iter()
                .skip(1)
                .filter(|s| pred(s) && s.contains_line(line))
                .min_by_key(|s| (s.span_lines(), std::cmp::Reverse(s.id)))
                .map(|s| s.id)
        };
        innermost(&|s| s.kind.is_callable())
            .or_else(|| innermost(&|s| s.kind.is_type()))
            .unwrap_or(SymbolId::local(0))
    }

    /// Attach bridges and patterns, cap confidence in error regions, and
    /// produce the result.
    pub fn finish(mut self, options: &ParseOptions) -> ParseResult {
        let mut bridges = 0;
        if options.detect_bridges {
            let found: Vec<bridge::BridgeCandidate> = self
                .source
                .lines()
                .enumerate()
                .flat_map(|(idx, line)| {
                    bridge::detect_with(line, idx as u32 + 1, self.language, &self.path, &options.bridge_confidence)
                })
                .collect();
            for candidate in found {
                let from = self.enclosing_symbol(candidate.line);
                let line_text = self.line_text(candidate.line).to_string();
                let mut rel = Relationship::unresolved(
                    from,
                    candidate.target_endpoint.clone(),
                    candidate.kind.relationship_kind(),
                )
                .with_confidence(candidate.confidence)
                .with_context(candidate.line, candidate.column, line_text)
                .cross_language();
                for (key, value) in candidate.metadata {
                    rel.metadata.insert(key, serde_json::Value::String(value));
                }
                self.relationships.push(rel);
                bridges += 1;
            }
        }

        for symbol in self.symbols.iter_mut().skip(1) {
            if self.error_lines.range(symbol.line..=symbol.end_line.max(symbol.line)).next().is_some() {
                symbol.confidence = symbol.confidence.min(PARTIAL_CONFIDENCE);
                symbol.semantic_tags.insert("partial".to_string());
            }
        }

        for rel in &mut self.relationships {
            rel.source_file = Some(self.path.clone());
        }

        disambiguate_duplicates(&mut self.symbols);

        let patterns = if options.detect_patterns {
            patterns::detect_patterns(&self.symbols)
        } else {
            Vec::new()
        };

        let stats = ParseStats {
            lines: self.source.lines().count(),
            symbols: self.symbols.len(),
            relationships: self.relationships.len(),
            bridges,
            patterns: patterns.len(),
            error_nodes: self.error_nodes,
            used_fallback: self.used_fallback,
            diagnostics: self.diagnostics,
        };

        ParseResult {
            file_path: self.path,
            symbols: self.symbols,
            relationships: self.relationships,
            patterns,
            stats,
        }
    }
}

/// Overloads and redefinitions share a qualified name; later ones get a
/// `#n` suffix so each keeps its own row.
fn disambiguate_duplicates(symbols: &mut [Symbol]) {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for symbol in symbols.iter_mut() {
        let count = seen.entry(symbol.qualified_name.clone()).or_insert(0);
        *count += 1;
        if *count > 1 {
            symbol.qualified_name = format!("{}#{}", symbol.qualified_name, count);
        }
    }
}

fn module_display_name(module: &QualifiedName, path: &str) -> String {
    match module.segments.last() {
        Some(last) => last.clone(),
        None => path
            .rsplit('/')
            .next()
            .and_then(|f| f.split('.').next())
            .unwrap_or(path)
            .to_string(),
    }
}

const PARAMETER_MODIFIERS: &[&str] = &["mut", "&", "&mut", "private", "protected", "public", "readonly", "final"];

/// Parameter names from a parenthesised list, dropping receivers, types and defaults.
pub fn parameter_names(params: &str) -> Vec<String> {
    let inner = params.trim().trim_start_matches('(').trim_end_matches(')');
    split_top_level(inner)
        .into_iter()
        .filter_map(|p| {
            let p = p.trim();
            let p = p.split('=').next().unwrap_or(p).trim();
            let name = p
                .split([':', ' '])
                .find(|s| !s.is_empty() && !PARAMETER_MODIFIERS.contains(s))?;
            let name = name.trim_start_matches(['*', '&']).trim_start_matches("...");
            if name.is_empty() || crate::qualified::is_self_receiver(name) || name == "&self" {
                None
            } else {
                Some(name.to_string())
            }
        })
        .collect()
}

/// Split on commas that are not nested inside brackets.
pub(crate) fn split_top_level(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' | '[' | '{' | '<' => depth += 1,
            ')' | ']' | '}' | '>' => depth -= 1,
            ',' if depth <= 0 => {
                out.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if !s[start..].trim().is_empty() {
        out.push(&s[start..]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scopes_build_qualified_names() {
        let source = "class A:\n    def run(self):\n        pass\n";
        let mut ex = FileExtractor::new(Language::Python, "pkg/mod.py", source, 1.0);
        let class = ex.add_symbol(SymbolKind::Class, "A", Span::lines(1, 3));
        ex.enter(class);
        let method = ex.add_symbol(SymbolKind::Method, "run", Span::lines(2, 3));
        ex.exit();

        let result = ex.finish(&ParseOptions::default());
        assert_eq!(result.symbols[method.index()].qualified_name, "pkg.mod.A.run");
        assert_eq!(result.symbols[method.index()].parent_symbol_id, Some(class));
        assert_eq!(result.symbols[0].kind, SymbolKind::Module);
        assert!(result.symbols.iter().enumerate().all(|(i, s)| s.id.index() == i));
    }

    #[test]
    fn test_bridges_attach_to_enclosing_function() {
        let source = "package main\n\nfunc dial() {\n\tcl := pb.NewCartServiceClient(conn)\n}\n";
        let mut ex = FileExtractor::new(Language::Go, "main.go", source, 1.0);
        let func = ex.add_symbol(SymbolKind::Function, "dial", Span::lines(3, 5));

        let result = ex.finish(&ParseOptions::default());
        let bridge = result
            .relationships
            .iter()
            .find(|r| r.kind == RelationshipKind::GrpcCalls)
            .unwrap();
        assert_eq!(bridge.from_symbol_id, func);
        assert_eq!(bridge.target_name.as_deref(), Some("Cart"));
        assert!(bridge.cross_language);
        assert_eq!(result.stats.bridges, 1);
    }

    #[test]
    fn test_error_region_caps_confidence() {
        let source = "def ok():\n    pass\ndef broken(:\n    pass\n";
        let mut ex = FileExtractor::new(Language::Python, "a.py", source, 1.0);
        let ok = ex.add_symbol(SymbolKind::Function, "ok", Span::lines(1, 2));
        let broken = ex.add_symbol(SymbolKind::Function, "broken", Span::lines(3, 4));
        ex.syntax_error(Span::lines(3, 3), "syntax error".to_string());

        let result = ex.finish(&ParseOptions::default());
        assert_eq!(result.symbols[ok.index()].confidence, 1.0);
        assert_eq!(result.symbols[broken.index()].confidence, PARTIAL_CONFIDENCE);
        assert!(result.stats.has_errors());
    }

    #[test]
    fn test_line_text_uses_offsets() {
        let source = "first\r\nsecond\n\nfourth";
        let ex = FileExtractor::new(Language::Python, "a.py", source, 1.0);
        assert_eq!(ex.line_text(1), "first");
        assert_eq!(ex.line_text(2), "second");
        assert_eq!(ex.line_text(3), "");
        assert_eq!(ex.line_text(4), "fourth");
        assert_eq!(ex.line_text(0), "");
        assert_eq!(ex.line_text(9), "");
    }

    #[test]
    fn test_duplicate_names_are_suffixed() {
        let source = "def load():\n    pass\n\ndef load():\n    pass\n";
        let mut ex = FileExtractor::new(Language::Python, "repo.py", source, 1.0);
        ex.add_symbol(SymbolKind::Function, "load", Span::lines(1, 2));
        ex.add_symbol(SymbolKind::Function, "load", Span::lines(4, 5));

        let result = ex.finish(&ParseOptions::default());
        assert_eq!(result.symbols[1].qualified_name, "repo.load");
        assert_eq!(result.symbols[2].qualified_name, "repo.load#2");
    }

    #[test]
    fn test_package_scope_keeps_module_per_file() {
        let mut ex = FileExtractor::new(Language::Java, "src/com/shop/Order.java", "package com.shop;\n", 1.0);
        ex.set_package("com.shop");
        let order = ex.add_symbol(SymbolKind::Class, "Order", Span::lines(1, 1));

        let result = ex.finish(&ParseOptions::default());
        assert_eq!(result.symbols[0].name, "com.shop");
        assert_eq!(result.symbols[0].qualified_name, "src/com/shop/Order.java");
        assert_eq!(result.symbols[order.index()].qualified_name, "com.shop.Order");
    }

    #[test]
    fn test_parameter_names() {
        assert_eq!(parameter_names("(self, order, qty: int = 1)"), vec!["order", "qty"]);
        assert_eq!(parameter_names("(&self, items: &[Item], mut n: usize)"), vec!["items", "n"]);
        assert_eq!(parameter_names("(ctx context.Context, req *pb.Req)"), vec!["ctx", "req"]);
        assert_eq!(parameter_names("(a, b = 2, ...rest)"), vec!["a", "b", "rest"]);
    }
}
