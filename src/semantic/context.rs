//! Context extraction: the text window around a symbol and its identifier
//! tokens.

use crate::symbol::Symbol;

/// Words too common in source code to say anything about a symbol.
const STOP_WORDS: &[&str] = &[
    "self", "this", "def", "fn", "func", "function", "return", "let", "var", "const", "pub", "async", "await",
    "if", "else", "for", "while", "in", "of", "new", "the", "and", "or", "not", "none", "null", "nil", "true",
    "false", "mut", "impl", "struct", "class", "import", "from", "package", "err", "ok", "str", "int",
];

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolContext {
    pub name_tokens: Vec<String>,
    pub signature_tokens: Vec<String>,
    pub body_tokens: Vec<String>,
}

/// Tokens for `symbol`, reading at most `window` lines of its body from `source`.
pub fn extract_context(symbol: &Symbol, source: &str, window: usize) -> SymbolContext {
    let start = symbol.line.saturating_sub(1) as usize;
    let span = (symbol.span_lines() as usize).min(window.max(1));
    let body: String = source
        .lines()
        .skip(start)
        .take(span)
        .collect::<Vec<_>>()
        .join("\n");

    SymbolContext {
        name_tokens: identifier_tokens(&symbol.name),
        signature_tokens: symbol
            .signature
            .as_deref()
            .map(identifier_tokens)
            .unwrap_or_default(),
        body_tokens: identifier_tokens(&body),
    }
}

/// Split text into lowercase identifier words: `parseHTTPRequest_v2` ->
/// `parse`, `http`, `request`, `v2`.
pub fn identifier_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        split_case(word, &mut tokens);
    }
    tokens.retain(|t| t.len() > 1 && !t.chars().all(|c| c.is_ascii_digit()) && !STOP_WORDS.contains(&t.as_str()));
    tokens
}

fn split_case(word: &str, out: &mut Vec<String>) {
    let chars: Vec<char> = word.chars().collect();
    let mut current = String::new();
    for (i, &c) in chars.iter().enumerate() {
        let boundary = c.is_uppercase()
            && !current.is_empty()
            && (chars[i - 1].is_lowercase()
                || chars[i - 1].is_ascii_digit()
                || chars.get(i + 1).is_some_and(|n| n.is_lowercase()));
        if boundary {
            out.push(std::mem::take(&mut current).to_lowercase());
        }
        current.push(c);
    }
    if !current.is_empty() {
        out.push(current.to_lowercase());
    }
}
