//! Statement classification: assignment, import, or exception.
//!
//! Malformed source always becomes `ParsedStatement::Exception`; the parser
//! itself never fails a notebook operation.

use crate::expr;
use crate::lexer::is_identifier;
use rill_core::{ImportBinding, NotebookId, ParsedStatement, Parser};

#[derive(Clone, Copy, Debug, Default)]
pub struct StatementParser;

impl StatementParser {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Parser for StatementParser {
    async fn parse(&self, source: &str) -> ParsedStatement {
        parse_statement(source)
    }
}

pub fn parse_statement(source: &str) -> ParsedStatement {
    let s = source.trim();
    if s.is_empty() {
        return ParsedStatement::exception("empty cell");
    }
    if s.strip_prefix("import")
        .is_some_and(|rest| rest.starts_with(char::is_whitespace) || rest.starts_with('{'))
    {
        return parse_import(s["import".len()..].trim_start());
    }

    let (viewof, rest) = match s.strip_prefix("viewof ") {
        Some(rest) => (true, rest.trim_start()),
        None => (false, s),
    };
    let (has_let, rest) = if viewof {
        (false, rest)
    } else {
        match rest.strip_prefix("let ") {
            Some(rest) => (true, rest.trim_start()),
            None => (false, rest),
        }
    };

    let (name, body) = match split_assignment(rest) {
        Some((name, body)) => (Some(name.to_string()), body),
        None if viewof => return ParsedStatement::exception("viewof requires an assignment"),
        None if has_let => return ParsedStatement::exception("let requires an assignment"),
        None => (None, rest),
    };

    let body = body.trim();
    let dependencies = match expr::parse(body) {
        Ok(ast) => expr::free_variables(&ast),
        Err(message) => return ParsedStatement::exception(message),
    };
    ParsedStatement::Assignment {
        name,
        dependencies,
        body: body.to_string(),
        viewof,
    }
}

/// `ident = expr` where the `=` is not part of `==`, `!=`, `<=`, `>=`.
fn split_assignment(source: &str) -> Option<(&str, &str)> {
    let bytes = source.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b != b'=' {
            continue;
        }
        if bytes.get(i + 1) == Some(&b'=') {
            return None; // first '=' belongs to '=='; lhs is no identifier
        }
        if i > 0 && matches!(bytes[i - 1], b'=' | b'!' | b'<' | b'>') {
            return None;
        }
        let lhs = source[..i].trim();
        let rhs = &source[i + 1..];
        if is_identifier(lhs) {
            return Some((lhs, rhs));
        }
        return None;
    }
    None
}

/// `{ a, b as c } from "notebook-id"` (the `import` keyword is consumed).
fn parse_import(rest: &str) -> ParsedStatement {
    let Some(rest) = rest.strip_prefix('{') else {
        return ParsedStatement::exception("import expects '{'");
    };
    let Some(close) = rest.find('}') else {
        return ParsedStatement::exception("import expects '}'");
    };
    let mut names = Vec::new();
    for part in rest[..close].split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let words: Vec<&str> = part.split_whitespace().collect();
        match words.as_slice() {
            [name] if is_identifier(name) => names.push(ImportBinding::new(*name)),
            [name, "as", alias] if is_identifier(name) && is_identifier(alias) => {
                names.push(ImportBinding::aliased(*name, *alias));
            }
            _ => {
                return ParsedStatement::exception(format!("bad import binding: {:?}", part));
            }
        }
    }
    if names.is_empty() {
        return ParsedStatement::exception("import lists no names");
    }

    let after = rest[close + 1..].trim_start();
    let Some(after) = after.strip_prefix("from") else {
        return ParsedStatement::exception("import expects 'from'");
    };
    let after = after.trim();
    let id = after
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| after.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')));
    match id {
        Some(id) if !id.is_empty() => ParsedStatement::Import {
            notebook: NotebookId::new(id),
            names,
        },
        _ => ParsedStatement::exception("import expects a quoted notebook id"),
    }
}
