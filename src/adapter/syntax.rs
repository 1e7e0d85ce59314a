//! Tree-sitter helpers shared by the grammar adapters.

use super::extract::{FileExtractor, Span};
use crate::{Error, Result};
use std::time::Duration;
use tree_sitter::{Node, Parser, Tree};

/// Parse `source` with a fresh parser bounded by `timeout`.
///
/// A parser is created per call so adapters stay `Sync` and files can be
/// parsed concurrently.
pub fn parse_tree(grammar: tree_sitter::Language, path: &str, source: &str, timeout: Duration) -> Result<Tree> {
    let mut parser = Parser::new();
    parser.set_language(&grammar).map_err(|e| Error::Parse {
        path: path.to_string(),
        message: format!("grammar rejected: {}", e),
    })?;
    parser.set_timeout_micros(timeout.as_micros().min(u64::MAX as u128) as u64);
    parser.parse(source, None).ok_or_else(|| Error::Parse {
        path: path.to_string(),
        message: format!("no tree produced within {}ms", timeout.as_millis()),
    })
}

pub fn text<'s>(node: Node, source: &'s str) -> &'s str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

pub fn field_text<'s>(node: Node, field: &str, source: &'s str) -> Option<&'s str> {
    node.child_by_field_name(field).map(|n| text(n, source))
}

/// 1-indexed span of a node.
pub fn span(node: Node) -> Span {
    let start = node.start_position();
    let end = node.end_position();
    Span {
        line: start.row as u32 + 1,
        column: start.column as u32 + 1,
        end_line: end.row as u32 + 1,
        end_column: end.column as u32 + 1,
    }
}

pub fn line(node: Node) -> u32 {
    node.start_position().row as u32 + 1
}

pub fn column(node: Node) -> u32 {
    node.start_position().column as u32 + 1
}

pub fn named_children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

/// Whether an unnamed child token (`async`, `pub`, `static`...) is present.
pub fn has_token(node: Node, token: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| c.kind() == token);
    found
}

/// Report every ERROR and MISSING node as a diagnostic.
pub fn report_syntax_errors(root: Node, ex: &mut FileExtractor) {
    if !root.has_error() {
        return;
    }
    let source = ex.source();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_missing() {
            ex.syntax_error(span(node), format!("missing `{}`", node.kind()));
            continue;
        }
        if node.is_error() {
            let snippet: String = text(node, source).chars().take(40).collect();
            ex.syntax_error(span(node), format!("syntax error near `{}`", snippet.trim()));
            continue;
        }
        if node.has_error() {
            let mut children = all_children(node);
            children.reverse();
            stack.extend(children);
        }
    }
}

fn all_children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

/// Plain identifiers passed as call arguments; `&x`, `*x` and keyword
/// arguments are reduced to the identifier.
pub fn call_arguments(args: Node, source: &str) -> Vec<String> {
    named_children(args)
        .into_iter()
        .filter_map(|arg| {
            let arg = match arg.kind() {
                "keyword_argument" => arg.child_by_field_name("value")?,
                _ => arg,
            };
            let raw = text(arg, source)
                .trim()
                .trim_start_matches(['&', '*'])
                .trim_start_matches("mut ")
                .trim();
            is_identifier(raw).then(|| raw.to_string())
        })
        .collect()
}

pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Variable a call's result is bound to, looking through `await`, `?` and
/// parentheses.
pub fn assigned_variable(call: Node, source: &str) -> Option<String> {
    let mut node = call;
    let mut parent = node.parent()?;
    while matches!(
        parent.kind(),
        "await" | "await_expression" | "try_expression" | "parenthesized_expression" | "expression_list"
    ) {
        node = parent;
        parent = node.parent()?;
    }

    let target = match parent.kind() {
        "assignment" | "assignment_expression" | "assignment_statement" | "short_var_declaration" => {
            parent.child_by_field_name("left")?
        }
        "variable_declarator" => parent.child_by_field_name("name")?,
        "init_declarator" => parent.child_by_field_name("declarator")?,
        "let_declaration" => parent.child_by_field_name("pattern")?,
        _ => return None,
    };
    if target.id() == node.id() {
        return None;
    }

    let name = if target.kind() == "identifier" {
        text(target, source)
    } else {
        let first = named_children(target)
            .into_iter()
            .find(|n| n.kind() == "identifier")?;
        text(first, source)
    };
    is_identifier(name).then(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;

    fn python(source: &str) -> Tree {
        parse_tree(tree_sitter_python::LANGUAGE.into(), "t.py", source, Duration::from_secs(5)).unwrap()
    }

    fn find<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
        if node.kind() == kind {
            return Some(node);
        }
        named_children(node).into_iter().find_map(|c| find(c, kind))
    }

    #[test]
    fn test_call_arguments_and_assignment() {
        let source = "total = compute(order, 3, qty=count)\n";
        let tree = python(source);
        let call = find(tree.root_node(), "call").unwrap();

        let args = call.child_by_field_name("arguments").unwrap();
        assert_eq!(call_arguments(args, source), vec!["order", "count"]);
        assert_eq!(assigned_variable(call, source).as_deref(), Some("total"));
    }

    #[test]
    fn test_syntax_errors_reported() {
        let source = "def broken(:\n    pass\n";
        let tree = python(source);
        let mut ex = FileExtractor::new(Language::Python, "t.py", source, 1.0);
        report_syntax_errors(tree.root_node(), &mut ex);

        let result = ex.finish(&Default::default());
        assert!(result.stats.has_errors());
        assert!(result.stats.error_nodes >= 1);
    }
}
