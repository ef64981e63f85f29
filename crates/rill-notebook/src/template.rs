//! Template interpolation for markdown and markup cells.
//!
//! Embedded expressions (`{expr}` in markdown, `${expr}` in markup) are
//! extracted and replaced by placeholders; the template compiles into one
//! synthetic assignment whose dependencies are the union of the embedded
//! expressions' free variables. A failing embedded expression degrades to an
//! inline `[Error: message]` marker instead of failing the whole cell.

use rill_core::{CompiledBody, Compiler, Result};
use serde_json::Value;
use std::sync::Arc;

/// Which placeholder syntax a cell kind uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Marker {
    /// `{expr}` (markdown cells)
    Brace,
    /// `${expr}` (markup cells)
    DollarBrace,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Segment {
    Text(String),
    /// Index into the extracted expression list.
    Expr(usize),
}

/// Split a template into literal text and embedded expression sources.
pub fn extract(source: &str, marker: Marker) -> (Vec<Segment>, Vec<String>) {
    let mut segments = Vec::new();
    let mut exprs = Vec::new();
    let mut text = String::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let open = match marker {
            Marker::Brace => chars[i] == '{',
            Marker::DollarBrace => chars[i] == '$' && chars.get(i + 1) == Some(&'{'),
        };
        if !open {
            text.push(chars[i]);
            i += 1;
            continue;
        }
        let body_start = i + if marker == Marker::Brace { 1 } else { 2 };
        let close = (body_start..chars.len()).find(|&j| chars[j] == '}');
        match close {
            None => {
                // Unbalanced opener: treat as literal text.
                text.push(chars[i]);
                i += 1;
            }
            Some(close) => {
                if !text.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut text)));
                }
                segments.push(Segment::Expr(exprs.len()));
                exprs.push(chars[body_start..close].iter().collect());
                i = close + 1;
            }
        }
    }
    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    (segments, exprs)
}

struct TemplateExpr {
    body: Arc<dyn CompiledBody>,
    /// Indices into the union dependency list for this expression's params.
    arg_indices: Vec<usize>,
}

/// The synthetic assignment body of a template cell: re-interpolates the
/// evaluated embedded expressions into the template at render time.
pub struct TemplateBody {
    segments: Vec<Segment>,
    exprs: Vec<TemplateExpr>,
}

impl CompiledBody for TemplateBody {
    fn call(&self, args: &[Value]) -> Result<Value> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Expr(index) => {
                    let expr = &self.exprs[*index];
                    let sub_args: Vec<Value> = expr
                        .arg_indices
                        .iter()
                        .map(|&i| args.get(i).cloned().unwrap_or(Value::Null))
                        .collect();
                    match expr.body.call(&sub_args) {
                        Ok(value) => out.push_str(&render_inline(&value)),
                        Err(error) => out.push_str(&format!("[Error: {}]", error)),
                    }
                }
            }
        }
        Ok(Value::String(out))
    }
}

fn render_inline(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A body that always renders an inline error marker, used when an embedded
/// expression does not even compile.
struct StaticError(String);

impl CompiledBody for StaticError {
    fn call(&self, _args: &[Value]) -> Result<Value> {
        Ok(Value::String(format!("[Error: {}]", self.0)))
    }
}

/// Compile a template into its dependency list and synthetic body.
pub fn compile(
    source: &str,
    marker: Marker,
    compiler: &Arc<dyn Compiler>,
) -> (Vec<String>, Arc<dyn CompiledBody>) {
    let (segments, sources) = extract(source, marker);
    let mut deps: Vec<String> = Vec::new();
    let mut exprs = Vec::with_capacity(sources.len());
    for expr_source in &sources {
        let compiled = compiler
            .free_variables(expr_source)
            .and_then(|params| {
                compiler
                    .compile(expr_source, &params)
                    .map(|body| (params, body))
            });
        match compiled {
            Ok((params, body)) => {
                let mut arg_indices = Vec::with_capacity(params.len());
                for param in params {
                    let index = match deps.iter().position(|d| d == &param) {
                        Some(index) => index,
                        None => {
                            deps.push(param.clone());
                            deps.len() - 1
                        }
                    };
                    arg_indices.push(index);
                }
                exprs.push(TemplateExpr { body, arg_indices });
            }
            Err(error) => {
                // Degrade to an inline error; the cell itself still renders.
                exprs.push(TemplateExpr {
                    body: Arc::new(StaticError(error.to_string())),
                    arg_indices: Vec::new(),
                });
            }
        }
    }
    (deps, Arc::new(TemplateBody { segments, exprs }))
}
