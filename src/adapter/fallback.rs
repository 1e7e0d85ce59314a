//! Regex-driven pattern adapter
//!
//! Used for files over the size threshold, whenever a grammar fails to
//! produce a tree, and for languages with no registered adapter.
//! It works line by line, finds block ends by indentation or brace
//! counting, and never panics on malformed input. Everything it emits
//! carries [`FALLBACK_CONFIDENCE`].

use super::extract::{FileExtractor, Span, parameter_names, split_top_level};
use super::framework::{DiagnosticLevel, ParseOptions, ParseResult};
use crate::bridge::is_comment;
use crate::language::Language;
use crate::relationship::RelationshipKind;
use crate::symbol::{SymbolId, SymbolKind, Visibility};
use regex::Regex;
use std::sync::LazyLock;

pub const FALLBACK_CONFIDENCE: f32 = 0.75;

/// Longest block the brace counter will scan before giving up.
const MAX_BLOCK_SCAN: usize = 5_000;

const CALL_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "return", "catch", "def", "function", "fn", "func", "match", "sizeof",
    "elif", "with", "print", "super", "typeof", "new", "await", "assert", "lambda", "class", "struct", "impl",
    "else", "loop", "throw", "delete", "yield", "in", "not", "and", "or", "defer", "go", "select",
];

/// One definition recognised on a line.
#[derive(Debug, Default)]
struct Definition {
    kind: Option<SymbolKind>,
    name: String,
    params: Option<String>,
    return_type: Option<String>,
    bases: Vec<(RelationshipKind, String)>,
    is_async: bool,
    exported: bool,
    is_abstract: bool,
    /// Type a method belongs to when declared outside it (Go receivers, `impl X`, `X::f`)
    owner: Option<String>,
    /// Block opens a scope without being a symbol (Rust `impl`)
    scope_only: bool,
}

struct Rules {
    py_def: Regex,
    py_class: Regex,
    js_function: Regex,
    js_arrow: Regex,
    js_class: Regex,
    js_interface: Regex,
    js_method: Regex,
    rs_fn: Regex,
    rs_type: Regex,
    rs_impl: Regex,
    go_func: Regex,
    go_type: Regex,
    go_package: Regex,
    java_type: Regex,
    java_method: Regex,
    java_package: Regex,
    cpp_namespace: Regex,
    cpp_type: Regex,
    cpp_function: Regex,
    call: Regex,
    assignment: Regex,
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("fallback pattern is valid")
}

static RULES: LazyLock<Rules> = LazyLock::new(|| Rules {
    py_def: re(r"^(\s*)(async\s+)?def\s+([A-Za-z_]\w*)\s*(\([^)]*\)?)?\s*(?:->\s*([^:]+))?"),
    py_class: re(r"^(\s*)class\s+([A-Za-z_]\w*)\s*(?:\(([^)]*)\))?"),
    js_function: re(
        r"^\s*(export\s+)?(?:default\s+)?(async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)\s*(?:<[^>]*>)?\s*(\([^)]*\)?)?",
    ),
    js_arrow: re(
        r"^\s*(export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*(?::[^=]+)?=\s*(async\s+)?(\([^)]*\)|[A-Za-z_$][\w$]*)\s*(?::[^=]+)?=>",
    ),
    js_class: re(
        r"^\s*(export\s+)?(?:default\s+)?(abstract\s+)?class\s+([A-Za-z_$][\w$]*)(?:<[^>]*>)?(?:\s+extends\s+([\w$.]+))?(?:\s+implements\s+([\w$.,\s]+?))?\s*\{?\s*$",
    ),
    js_interface: re(r"^\s*(export\s+)?interface\s+([A-Za-z_$][\w$]*)(?:<[^>]*>)?(?:\s+extends\s+([\w$.,\s]+?))?\s*\{?\s*$"),
    js_method: re(
        r"^\s*(?:(?:public|private|protected|static|readonly|override|abstract)\s+)*(async\s+)?\*?([A-Za-z_$][\w$]*)\s*(\([^)]*\))\s*(?::\s*([^{]+))?\{\s*$",
    ),
    rs_fn: re(
        r"^\s*(pub(?:\([^)]*\))?\s+)?(?:const\s+)?(async\s+)?(?:unsafe\s+)?(?:extern\s+\S+\s+)?fn\s+([A-Za-z_]\w*)\s*(?:<[^>]*>)?\s*(\([^)]*\)?)?\s*(?:->\s*([^{;]+?))?\s*(?:where\b.*)?[{;]?\s*$",
    ),
    rs_type: re(r"^\s*(pub(?:\([^)]*\))?\s+)?(struct|enum|trait|union)\s+([A-Za-z_]\w*)(?:\s*:\s*([\w:+\s]+?))?"),
    rs_impl: re(r"^\s*(?:unsafe\s+)?impl(?:<[^>]*>)?\s+(?:([\w:]+)(?:<[^>]*>)?\s+for\s+)?&?([\w:]+)"),
    go_func: re(r"^func\s+(?:\(\s*(?:\w+\s+)?\*?([A-Za-z_]\w*)[^)]*\)\s*)?([A-Za-z_]\w*)\s*(?:\[[^\]]*\])?\s*(\([^)]*\))\s*([^{]*)"),
    go_type: re(r"^type\s+([A-Za-z_]\w*)(?:\[[^\]]*\])?\s+(struct|interface)\b"),
    go_package: re(r"^package\s+([A-Za-z_]\w*)"),
    java_type: re(
        r"^\s*(?:(public|protected|private)\s+)?(?:(?:abstract|final|static|sealed)\s+)*(class|interface|enum|record)\s+([A-Za-z_]\w*)(?:<[^>]*>)?(?:\s*\([^)]*\))?(?:\s+extends\s+([\w.]+)(?:<[^>]*>)?)?(?:\s+implements\s+([\w.,<>\s]+?))?\s*\{?\s*$",
    ),
    java_method: re(
        r"^\s*(?:(public|protected|private)\s+)?(?:(?:static|final|abstract|synchronized|native|default)\s+)*(?:<[^>]*>\s+)?([\w.<>\[\],?\s]+?)\s+([A-Za-z_]\w*)\s*(\([^)]*\)?)\s*(?:throws\s+[\w.,\s]+)?\s*[{;]?\s*$",
    ),
    java_package: re(r"^\s*package\s+([\w.]+)\s*;"),
    cpp_namespace: re(r"^\s*namespace\s+([A-Za-z_][\w:]*)\s*\{?\s*$"),
    cpp_type: re(r"^\s*(?:template\s*<[^>]*>\s*)?(class|struct)\s+([A-Za-z_]\w*)(?:\s+final)?(?:\s*:\s*(?:(?:public|protected|private|virtual)\s+)*([\w:]+))?\s*\{?\s*$"),
    cpp_function: re(
        r"^\s*(?:(?:virtual|static|inline|explicit|constexpr)\s+)*(?:([\w:<>,\*&\s]+?)\s+)?\*?&?(~?[A-Za-z_][\w]*(?:::~?[A-Za-z_]\w*)*)\s*(\([^;{)]*\))\s*(?:const\s*)?(?:noexcept\s*)?(?:override\s*)?(?:=\s*0\s*;)?\s*\{?\s*$",
    ),
    call: re(r"([A-Za-z_$][\w$]*(?:(?:\.|::|->)[A-Za-z_$][\w$]*)*)\s*\(([^()]*)\)?"),
    assignment: re(r"(?:let\s+(?:mut\s+)?|const\s+|var\s+)?([A-Za-z_$][\w$]*)\s*(?::=|=)\s*(?:await\s+)?(?:try\s+)?$"),
});

/// Regex-based adapter for any language.
#[derive(Debug, Default)]
pub struct PatternAdapter;

impl PatternAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Parse with the fallback and note why it was chosen.
    pub fn parse_with_note(
        &self,
        language: Language,
        path: &str,
        content: &str,
        options: &ParseOptions,
        note: String,
    ) -> ParseResult {
        self.extract(language, path, content, options, Some(note))
    }

    pub fn parse_lang(&self, language: Language, path: &str, content: &str, options: &ParseOptions) -> ParseResult {
        self.extract(language, path, content, options, None)
    }

    fn extract(
        &self,
        language: Language,
        path: &str,
        content: &str,
        options: &ParseOptions,
        note: Option<String>,
    ) -> ParseResult {
        let mut ex = FileExtractor::new(language, path, content, FALLBACK_CONFIDENCE);
        ex.mark_fallback();
        if let Some(note) = note {
            ex.note(DiagnosticLevel::Note, 1, note);
        }

        let lines: Vec<&str> = content.lines().collect();
        let mut open: Vec<(SymbolId, u32)> = Vec::new();
        let mut definition_lines = Vec::new();

        for (idx, raw) in lines.iter().enumerate() {
            let line_no = idx as u32 + 1;
            if is_comment(raw, language) {
                continue;
            }
            if let Some(package) = package_of(language, raw) {
                ex.set_package(&package);
                continue;
            }

            while let Some((_, end)) = open.last() {
                if *end < line_no {
                    open.pop();
                    ex.exit();
                } else {
                    break;
                }
            }

            let Some(def) = definition(language, raw, ex.current_scope_kind()) else {
                continue;
            };
            definition_lines.push(line_no);
            let end = block_end(language, &lines, idx);

            if def.scope_only {
                if let Some(owner) = def.owner.as_deref().and_then(|o| ex.find_type(o)) {
                    for (kind, target) in &def.bases {
                        ex.add_reference_from(owner, *kind, target, line_no, 1);
                    }
                    ex.enter(owner);
                    open.push((owner, end));
                }
                continue;
            }

            let Some(kind) = def.kind else { continue };
            let span = Span::lines(line_no, end);
            let owner = def.owner.as_deref().and_then(|o| ex.find_type(o));
            let id = match owner {
                Some(owner) => ex.add_symbol_under(kind, &def.name, span, owner),
                None => ex.add_symbol(kind, &def.name, span),
            };

            let symbol = ex.symbol_mut(id);
            symbol.is_async = def.is_async;
            symbol.is_exported = def.exported;
            symbol.is_abstract = def.is_abstract;
            symbol.visibility = visibility_of(language, &def.name, def.exported);
            symbol.return_type = def.return_type.clone().filter(|r| !r.is_empty());
            if let Some(params) = &def.params {
                symbol.parameters = match language {
                    Language::Java | Language::Cpp => type_first_parameter_names(params),
                    _ => parameter_names(params),
                };
                symbol.signature = Some(match &symbol.return_type {
                    Some(ret) => format!("{} -> {}", params, ret),
                    None => params.clone(),
                });
            }
            symbol.language_features.insert("extraction".to_string(), "pattern".to_string());

            for (rel_kind, target) in &def.bases {
                ex.add_reference_from(id, *rel_kind, target, line_no, 1);
            }

            if kind.is_type() || kind == SymbolKind::Namespace {
                ex.enter(id);
                open.push((id, end));
            }
        }
        while open.pop().is_some() {
            ex.exit();
        }

        for (idx, raw) in lines.iter().enumerate() {
            let line_no = idx as u32 + 1;
            if definition_lines.binary_search(&line_no).is_ok() || is_comment(raw, language) {
                continue;
            }
            for (target, column, args, assigned) in calls_on_line(raw) {
                let from = ex.enclosing_symbol(line_no);
                let rel = ex.add_reference_from(from, RelationshipKind::Calls, &target, line_no, column);
                if !args.is_empty() {
                    rel.metadata.insert("args".to_string(), serde_json::json!(args));
                }
                if let Some(var) = assigned {
                    rel.metadata.insert("assigned_to".to_string(), serde_json::Value::String(var));
                }
            }
        }

        ex.finish(options)
    }
}

fn package_of(language: Language, line: &str) -> Option<String> {
    let rules = &*RULES;
    let regex = match language {
        Language::Go => &rules.go_package,
        Language::Java => &rules.java_package,
        _ => return None,
    };
    regex.captures(line).and_then(|c| c.get(1)).map(|m| m.as_str().to_string())
}

fn cap(caps: &regex::Captures, i: usize) -> Option<String> {
    caps.get(i).map(|m| m.as_str().trim().to_string()).filter(|s| !s.is_empty())
}

fn split_list(list: Option<String>) -> Vec<String> {
    list.map(|l| {
        l.split(',')
            .map(|s| s.trim().split('<').next().unwrap_or("").trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

fn definition(language: Language, line: &str, scope: SymbolKind) -> Option<Definition> {
    let rules = &*RULES;
    let in_type = scope.is_type();
    match language {
        Language::Python => {
            if let Some(c) = rules.py_def.captures(line) {
                let name = cap(&c, 3)?;
                let indented = c.get(1).is_some_and(|m| !m.as_str().is_empty());
                let kind = match (in_type && indented, name.as_str()) {
                    (true, "__init__") => SymbolKind::Constructor,
                    (true, _) => SymbolKind::Method,
                    _ => SymbolKind::Function,
                };
                return Some(Definition {
                    kind: Some(kind),
                    exported: !name.starts_with('_') && !indented,
                    name,
                    params: cap(&c, 4),
                    return_type: cap(&c, 5),
                    is_async: c.get(2).is_some(),
                    ..Default::default()
                });
            }
            let c = rules.py_class.captures(line)?;
            let name = cap(&c, 2)?;
            let bases = split_list(cap(&c, 3))
                .into_iter()
                .filter(|b| b != "object" && !b.contains('='))
                .map(|b| (RelationshipKind::Inherits, b))
                .collect();
            Some(Definition {
                kind: Some(SymbolKind::Class),
                exported: !name.starts_with('_'),
                name,
                bases,
                ..Default::default()
            })
        }
        Language::JavaScript | Language::TypeScript => {
            if let Some(c) = rules.js_class.captures(line) {
                let mut bases: Vec<_> = cap(&c, 4).map(|b| (RelationshipKind::Inherits, b)).into_iter().collect();
                bases.extend(split_list(cap(&c, 5)).into_iter().map(|b| (RelationshipKind::Implements, b)));
                return Some(Definition {
                    kind: Some(SymbolKind::Class),
                    name: cap(&c, 3)?,
                    exported: c.get(1).is_some(),
                    is_abstract: c.get(2).is_some(),
                    bases,
                    ..Default::default()
                });
            }
            if let Some(c) = rules.js_interface.captures(line) {
                return Some(Definition {
                    kind: Some(SymbolKind::Interface),
                    name: cap(&c, 2)?,
                    exported: c.get(1).is_some(),
                    bases: split_list(cap(&c, 3)).into_iter().map(|b| (RelationshipKind::Inherits, b)).collect(),
                    ..Default::default()
                });
            }
            if let Some(c) = rules.js_function.captures(line) {
                return Some(Definition {
                    kind: Some(SymbolKind::Function),
                    name: cap(&c, 3)?,
                    exported: c.get(1).is_some(),
                    is_async: c.get(2).is_some(),
                    params: cap(&c, 4),
                    ..Default::default()
                });
            }
            if let Some(c) = rules.js_arrow.captures(line) {
                let params = cap(&c, 4).map(|p| if p.starts_with('(') { p } else { format!("({})", p) });
                return Some(Definition {
                    kind: Some(SymbolKind::Function),
                    name: cap(&c, 2)?,
                    exported: c.get(1).is_some(),
                    is_async: c.get(3).is_some(),
                    params,
                    ..Default::default()
                });
            }
            if in_type {
                let c = rules.js_method.captures(line)?;
                let name = cap(&c, 2)?;
                if CALL_KEYWORDS.contains(&name.as_str()) {
                    return None;
                }
                let kind = if name == "constructor" { SymbolKind::Constructor } else { SymbolKind::Method };
                return Some(Definition {
                    kind: Some(kind),
                    name,
                    is_async: c.get(1).is_some(),
                    params: cap(&c, 3),
                    return_type: cap(&c, 4),
                    ..Default::default()
                });
            }
            None
        }
        Language::Rust => {
            if let Some(c) = rules.rs_impl.captures(line) {
                let target = cap(&c, 2)?;
                let owner = crate::qualified::simple_name(&target).to_string();
                return Some(Definition {
                    owner: Some(owner),
                    scope_only: true,
                    bases: cap(&c, 1).map(|t| (RelationshipKind::Implements, t)).into_iter().collect(),
                    ..Default::default()
                });
            }
            if let Some(c) = rules.rs_type.captures(line) {
                let kind = match c.get(2).map(|m| m.as_str()) {
                    Some("enum") => SymbolKind::Enum,
                    Some("trait") => SymbolKind::Trait,
                    _ => SymbolKind::Struct,
                };
                let bases = if kind == SymbolKind::Trait {
                    cap(&c, 4)
                        .map(|b| {
                            b.split('+')
                                .map(|s| s.trim().to_string())
                                .filter(|s| !s.is_empty() && s != "Sized" && !s.starts_with('\''))
                                .map(|s| (RelationshipKind::Inherits, s))
                                .collect()
                        })
                        .unwrap_or_default()
                } else {
                    Vec::new()
                };
                return Some(Definition {
                    kind: Some(kind),
                    name: cap(&c, 3)?,
                    exported: c.get(1).is_some(),
                    bases,
                    ..Default::default()
                });
            }
            let c = rules.rs_fn.captures(line)?;
            let kind = if in_type { SymbolKind::Method } else { SymbolKind::Function };
            Some(Definition {
                kind: Some(kind),
                name: cap(&c, 3)?,
                exported: c.get(1).is_some(),
                is_async: c.get(2).is_some(),
                params: cap(&c, 4),
                return_type: cap(&c, 5),
                is_abstract: line.trim_end().ends_with(';'),
                ..Default::default()
            })
        }
        Language::Go => {
            if let Some(c) = rules.go_type.captures(line) {
                let name = cap(&c, 1)?;
                let kind = if c.get(2).map(|m| m.as_str()) == Some("interface") {
                    SymbolKind::Interface
                } else {
                    SymbolKind::Struct
                };
                return Some(Definition {
                    kind: Some(kind),
                    exported: starts_upper(&name),
                    name,
                    ..Default::default()
                });
            }
            let c = rules.go_func.captures(line)?;
            let name = cap(&c, 2)?;
            let owner = cap(&c, 1);
            Some(Definition {
                kind: Some(if owner.is_some() { SymbolKind::Method } else { SymbolKind::Function }),
                exported: starts_upper(&name),
                name,
                params: cap(&c, 3),
                return_type: cap(&c, 4),
                owner,
                ..Default::default()
            })
        }
        Language::Java => {
            if let Some(c) = rules.java_type.captures(line) {
                let kind = match c.get(2).map(|m| m.as_str()) {
                    Some("interface") => SymbolKind::Interface,
                    Some("enum") => SymbolKind::Enum,
                    _ => SymbolKind::Class,
                };
                let mut bases: Vec<_> = cap(&c, 4).map(|b| (RelationshipKind::Inherits, b)).into_iter().collect();
                bases.extend(split_list(cap(&c, 5)).into_iter().map(|b| (RelationshipKind::Implements, b)));
                return Some(Definition {
                    kind: Some(kind),
                    name: cap(&c, 3)?,
                    exported: c.get(1).is_some_and(|m| m.as_str() == "public"),
                    is_abstract: line.contains("abstract "),
                    bases,
                    ..Default::default()
                });
            }
            if !in_type {
                return None;
            }
            let c = rules.java_method.captures(line)?;
            let name = cap(&c, 3)?;
            let return_type = cap(&c, 2)?;
            if CALL_KEYWORDS.contains(&name.as_str()) || return_type.contains('=') || return_type == "return" {
                return None;
            }
            let constructor = return_type.split_whitespace().last() == Some("new");
            Some(Definition {
                kind: Some(if constructor { SymbolKind::Constructor } else { SymbolKind::Method }),
                exported: c.get(1).is_some_and(|m| m.as_str() == "public"),
                name,
                params: cap(&c, 4),
                return_type: Some(return_type),
                is_abstract: line.contains("abstract ") || line.trim_end().ends_with(';'),
                ..Default::default()
            })
        }
        Language::Cpp => {
            if let Some(c) = rules.cpp_namespace.captures(line) {
                return Some(Definition {
                    kind: Some(SymbolKind::Namespace),
                    name: cap(&c, 1)?,
                    exported: true,
                    ..Default::default()
                });
            }
            if let Some(c) = rules.cpp_type.captures(line) {
                return Some(Definition {
                    kind: Some(if c.get(1).map(|m| m.as_str()) == Some("struct") {
                        SymbolKind::Struct
                    } else {
                        SymbolKind::Class
                    }),
                    name: cap(&c, 2)?,
                    exported: true,
                    bases: cap(&c, 3).map(|b| (RelationshipKind::Inherits, b)).into_iter().collect(),
                    ..Default::default()
                });
            }
            let c = rules.cpp_function.captures(line)?;
            let full = cap(&c, 2)?;
            let return_type = cap(&c, 1);
            let name = crate::qualified::simple_name(&full).to_string();
            if CALL_KEYWORDS.contains(&name.as_str()) || return_type.as_deref().is_some_and(|r| r.contains("return")) {
                return None;
            }
            // A bare call statement has no return type and no class qualifier.
            if return_type.is_none() && !full.contains("::") && !in_type {
                return None;
            }
            let owner = crate::qualified::receiver(&full).map(str::to_string);
            let kind = if owner.as_deref() == Some(name.trim_start_matches('~')) || (in_type && return_type.is_none()) {
                SymbolKind::Constructor
            } else if owner.is_some() || in_type {
                SymbolKind::Method
            } else {
                SymbolKind::Function
            };
            Some(Definition {
                kind: Some(kind),
                name,
                params: cap(&c, 3),
                return_type,
                exported: true,
                is_abstract: line.contains("= 0"),
                owner,
                ..Default::default()
            })
        }
    }
}

/// `(String id, int count)` -> `[id, count]`
fn type_first_parameter_names(params: &str) -> Vec<String> {
    let inner = params.trim().trim_start_matches('(').trim_end_matches(')');
    split_top_level(inner)
        .into_iter()
        .filter_map(|p| {
            let p = p.split('=').next().unwrap_or(p).trim();
            let last = p.split_whitespace().last()?;
            let name = last.trim_start_matches(['*', '&']).trim_end_matches("[]");
            (super::syntax::is_identifier(name) && p.split_whitespace().count() > 1).then(|| name.to_string())
        })
        .collect()
}

fn starts_upper(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

fn visibility_of(language: Language, name: &str, exported: bool) -> Visibility {
    match language {
        Language::Python if name.starts_with("__") && !name.ends_with("__") => Visibility::Private,
        Language::Python if name.starts_with('_') => Visibility::Protected,
        Language::Python => Visibility::Public,
        Language::JavaScript | Language::TypeScript if name.starts_with('#') => Visibility::Private,
        Language::JavaScript | Language::TypeScript | Language::Cpp => Visibility::Public,
        _ if exported => Visibility::Public,
        _ => Visibility::Private,
    }
}

/// Last line (1-indexed) of the block opened on `lines[start]`.
fn block_end(language: Language, lines: &[&str], start: usize) -> u32 {
    if language == Language::Python {
        return indentation_block_end(lines, start);
    }

    let mut depth = 0i64;
    let mut opened = false;
    for (offset, line) in lines.iter().enumerate().skip(start).take(MAX_BLOCK_SCAN) {
        for c in strip_strings(line).chars() {
            match c {
                '{' => {
                    depth += 1;
                    opened = true;
                }
                '}' => depth -= 1,
                ';' if !opened => return offset as u32 + 1,
                _ => {}
            }
        }
        if opened && depth <= 0 {
            return offset as u32 + 1;
        }
    }
    if opened {
        (start + MAX_BLOCK_SCAN).min(lines.len()) as u32
    } else {
        start as u32 + 1
    }
}

fn indentation_block_end(lines: &[&str], start: usize) -> u32 {
    let indent = |l: &str| l.len() - l.trim_start().len();
    let base = lines.get(start).map(|l| indent(l)).unwrap_or(0);
    let mut end = start;
    for (offset, line) in lines.iter().enumerate().skip(start + 1) {
        if line.trim().is_empty() {
            continue;
        }
        if indent(line) <= base {
            break;
        }
        end = offset;
    }
    end as u32 + 1
}

/// Drop quoted string contents and trailing `//` comments so braces inside
/// them are not counted. A quote with no partner on the line is kept as is
/// (Rust lifetimes).
fn strip_strings(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(c) = rest.chars().next() {
        let after = &rest[c.len_utf8()..];
        if matches!(c, '"' | '\'' | '`') {
            if let Some(close) = closing_quote(after, c) {
                rest = &after[close + 1..];
                continue;
            }
        } else if c == '/' && after.starts_with('/') {
            break;
        }
        out.push(c);
        rest = after;
    }
    out
}

fn closing_quote(s: &str, quote: char) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Some(i);
        }
    }
    None
}

type CallSite = (String, u32, Vec<String>, Option<String>);

fn calls_on_line(line: &str) -> Vec<CallSite> {
    let rules = &*RULES;
    let code = strip_strings(line);
    let mut out = Vec::new();
    for caps in rules.call.captures_iter(&code) {
        let Some(whole) = caps.get(1) else { continue };
        let target = whole.as_str();
        let name = crate::qualified::simple_name(target);
        if CALL_KEYWORDS.contains(&name) || CALL_KEYWORDS.contains(&target) {
            continue;
        }
        let args = caps
            .get(2)
            .map(|m| {
                m.as_str()
                    .split(',')
                    .map(|a| a.trim().trim_start_matches(['&', '*']).trim())
                    .filter(|a| super::syntax::is_identifier(a))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let prefix = &code[..whole.start()];
        let assigned = rules
            .assignment
            .captures(prefix)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());
        out.push((target.to_string(), whole.start() as u32 + 1, args, assigned));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(language: Language, path: &str, source: &str) -> ParseResult {
        PatternAdapter::new().parse_lang(language, path, source, &ParseOptions::default())
    }

    #[test]
    fn test_typescript_class_and_methods() {
        let source = r#"
export class OrderService extends BaseService implements Auditable {
    async placeOrder(order: Order): Promise<Receipt> {
        const receipt = await this.repo.save(order);
        return receipt;
    }
}

export const helper = (x) => x + 1;
"#;
        let result = parse(Language::TypeScript, "src/order.ts", source);

        let class = result.symbol_named("OrderService").unwrap();
        assert_eq!(class.kind, SymbolKind::Class);
        assert!(class.is_exported);
        let method = result.symbol_named("placeOrder").unwrap();
        assert_eq!(method.kind, SymbolKind::Method);
        assert_eq!(method.parent_symbol_id, Some(class.id));
        assert!(method.is_async);
        assert_eq!(method.parameters, vec!["order"]);
        assert!(result.symbol_named("helper").is_some());

        assert!(result.relationships.iter().any(|r| r.kind == RelationshipKind::Inherits
            && r.target_name.as_deref() == Some("BaseService")));
        let save = result
            .relationships
            .iter()
            .find(|r| r.target_name.as_deref() == Some("this.repo.save"))
            .unwrap();
        assert_eq!(save.from_symbol_id, method.id);
        assert_eq!(save.metadata_str("assigned_to"), Some("receipt"));
        assert!(result.symbols.iter().all(|s| s.confidence <= FALLBACK_CONFIDENCE));
        assert!(result.stats.used_fallback);
    }

    #[test]
    fn test_java_package_and_methods() {
        let source = r#"package com.shop.orders;

public class OrderController implements Controller {
    public Order find(String id) {
        return repository.lookup(id);
    }
}
"#;
        let result = parse(Language::Java, "src/main/java/com/shop/orders/OrderController.java", source);
        let class = result.symbol_named("OrderController").unwrap();
        assert_eq!(class.qualified_name, "com.shop.orders.OrderController");
        let find = result.symbol_named("find").unwrap();
        assert_eq!(find.qualified_name, "com.shop.orders.OrderController.find");
        assert_eq!(find.parameters, vec!["id"]);
        assert!(result.relationships.iter().any(|r| r.kind == RelationshipKind::Implements));
        assert!(result
            .relationships
            .iter()
            .any(|r| r.target_name.as_deref() == Some("repository.lookup") && r.from_symbol_id == find.id));
    }

    #[test]
    fn test_cpp_out_of_line_method() {
        let source = "class Engine {\npublic:\n    void start();\n};\n\nvoid Engine::start() {\n    ignite(fuel);\n}\n";
        let result = parse(Language::Cpp, "engine.cpp", source);
        let class = result.symbol_named("Engine").unwrap();
        let starts: Vec<_> = result.symbols.iter().filter(|s| s.name == "start").collect();
        assert!(!starts.is_empty());
        assert!(starts.iter().all(|s| s.parent_symbol_id == Some(class.id)));
    }

    #[test]
    fn test_python_indentation_blocks() {
        let source = "class A:\n    def run(self, job):\n        return job\n\ndef main():\n    A().run(1)\n";
        let result = parse(Language::Python, "a.py", source);
        let run = result.symbol_named("run").unwrap();
        assert_eq!((run.line, run.end_line), (2, 3));
        assert_eq!(run.kind, SymbolKind::Method);
        let main = result.symbol_named("main").unwrap();
        assert_eq!(main.kind, SymbolKind::Function);
    }

    #[test]
    fn test_garbage_never_panics() {
        let source = "}}}{{{ fn ( class ::: def\n\u{0}\u{feff}é(((\n\"unterminated";
        for language in Language::all() {
            let result = parse(*language, "weird.txt", source);
            assert_eq!(result.symbols[0].kind, SymbolKind::Module);
        }
    }

    #[test]
    fn test_strip_strings() {
        assert_eq!(strip_strings(r#"x = "{"; // }"#), "x = ; ");
        assert_eq!(strip_strings("fn f(s: &'static str) {"), "fn f(s: &'static str) {");
    }
}
