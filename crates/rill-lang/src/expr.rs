//! Expression parsing and evaluation.
//!
//! Expressions compile once into a [`CompiledBody`] closure over named
//! parameters; evaluation is pure over `serde_json::Value` arguments, which
//! keeps cell bodies sandboxed (no host code, no ambient state).

use crate::lexer::{tokenize, Token};
use rill_core::{CompiledBody, Compiler, Error, Result};
use serde_json::{Number, Value};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Ident(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Array(Vec<Expr>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Parse an expression source into an AST.
pub fn parse(source: &str) -> std::result::Result<Expr, String> {
    let tokens = tokenize(source)?;
    let mut parser = ExprParser { tokens, pos: 0 };
    let expr = parser.expression()?;
    match parser.peek() {
        None => Ok(expr),
        Some(tok) => Err(format!("unexpected token after expression: {:?}", tok)),
    }
}

/// Free identifiers of an expression, in first-appearance order.
pub fn free_variables(expr: &Expr) -> Vec<String> {
    let mut out = Vec::new();
    collect_idents(expr, &mut out);
    out
}

fn collect_idents(expr: &Expr, out: &mut Vec<String>) {
    match expr {
        Expr::Ident(name) => {
            if !out.iter().any(|n| n == name) {
                out.push(name.clone());
            }
        }
        Expr::Unary(_, inner) => collect_idents(inner, out),
        Expr::Binary(_, lhs, rhs) => {
            collect_idents(lhs, out);
            collect_idents(rhs, out);
        }
        Expr::Array(items) => {
            for item in items {
                collect_idents(item, out);
            }
        }
        Expr::Number(_) | Expr::Str(_) | Expr::Bool(_) | Expr::Null => {}
    }
}

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expression(&mut self) -> std::result::Result<Expr, String> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> std::result::Result<Expr, String> {
        let mut lhs = self.and_expr()?;
        while self.eat(&Token::OrOr) {
            let rhs = self.and_expr()?;
            lhs = Expr::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> std::result::Result<Expr, String> {
        let mut lhs = self.equality()?;
        while self.eat(&Token::AndAnd) {
            let rhs = self.equality()?;
            lhs = Expr::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> std::result::Result<Expr, String> {
        let mut lhs = self.comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::Ne,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.comparison()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> std::result::Result<Expr, String> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> std::result::Result<Expr, String> {
        let mut lhs = self.factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.factor()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn factor(&mut self) -> std::result::Result<Expr, String> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> std::result::Result<Expr, String> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.unary()?)))
            }
            Some(Token::Bang) => {
                self.pos += 1;
                Ok(Expr::Unary(UnaryOp::Not, Box::new(self.unary()?)))
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> std::result::Result<Expr, String> {
        match self.bump() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::True) => Ok(Expr::Bool(true)),
            Some(Token::False) => Ok(Expr::Bool(false)),
            Some(Token::Null) => Ok(Expr::Null),
            Some(Token::Ident(name)) => Ok(Expr::Ident(name)),
            Some(Token::LParen) => {
                let inner = self.expression()?;
                if self.eat(&Token::RParen) {
                    Ok(inner)
                } else {
                    Err("expected ')'".to_string())
                }
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if self.eat(&Token::RBracket) {
                    return Ok(Expr::Array(items));
                }
                loop {
                    items.push(self.expression()?);
                    if self.eat(&Token::Comma) {
                        continue;
                    }
                    if self.eat(&Token::RBracket) {
                        return Ok(Expr::Array(items));
                    }
                    return Err("expected ',' or ']'".to_string());
                }
            }
            other => Err(format!("unexpected token: {:?}", other)),
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    value.as_f64()
}

/// Re-integerize where possible so `1 + 2` compares equal to `json!(3)`.
fn number(f: f64) -> Result<Value> {
    if !f.is_finite() {
        return Err(Error::evaluation("result is not a finite number"));
    }
    const SAFE: f64 = 9_007_199_254_740_992.0; // 2^53
    if f.fract() == 0.0 && f.abs() <= SAFE {
        return Ok(Value::from(f as i64));
    }
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| Error::evaluation("result is not a finite number"))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn eval(expr: &Expr, env: &HashMap<&str, &Value>) -> Result<Value> {
    match expr {
        Expr::Number(n) => number(*n),
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Null => Ok(Value::Null),
        Expr::Ident(name) => match env.get(name.as_str()) {
            Some(value) => Ok((*value).clone()),
            None => Err(Error::undefined(name.clone())),
        },
        Expr::Unary(op, inner) => {
            let value = eval(inner, env)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!truthy(&value))),
                UnaryOp::Neg => match as_number(&value) {
                    Some(n) => number(-n),
                    None => Err(Error::evaluation(format!(
                        "cannot negate {}",
                        type_name(&value)
                    ))),
                },
            }
        }
        Expr::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval(item, env)?);
            }
            Ok(Value::Array(out))
        }
        Expr::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, env),
    }
}

fn eval_binary(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    env: &HashMap<&str, &Value>,
) -> Result<Value> {
    // Short-circuit forms first.
    if op == BinaryOp::And {
        let left = eval(lhs, env)?;
        return if truthy(&left) { eval(rhs, env) } else { Ok(left) };
    }
    if op == BinaryOp::Or {
        let left = eval(lhs, env)?;
        return if truthy(&left) { Ok(left) } else { eval(rhs, env) };
    }

    let left = eval(lhs, env)?;
    let right = eval(rhs, env)?;
    match op {
        BinaryOp::Add => match (as_number(&left), as_number(&right)) {
            (Some(a), Some(b)) => number(a + b),
            _ if left.is_string() || right.is_string() => {
                Ok(Value::String(format!("{}{}", stringify(&left), stringify(&right))))
            }
            _ => Err(Error::evaluation(format!(
                "cannot add {} and {}",
                type_name(&left),
                type_name(&right)
            ))),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            let (a, b) = match (as_number(&left), as_number(&right)) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    return Err(Error::evaluation(format!(
                        "arithmetic on {} and {}",
                        type_name(&left),
                        type_name(&right)
                    )))
                }
            };
            if b == 0.0 && matches!(op, BinaryOp::Div | BinaryOp::Rem) {
                return Err(Error::evaluation("division by zero"));
            }
            match op {
                BinaryOp::Sub => number(a - b),
                BinaryOp::Mul => number(a * b),
                BinaryOp::Div => number(a / b),
                BinaryOp::Rem => number(a % b),
                _ => unreachable!(),
            }
        }
        BinaryOp::Eq => Ok(Value::Bool(loose_eq(&left, &right))),
        BinaryOp::Ne => Ok(Value::Bool(!loose_eq(&left, &right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (&left, &right) {
                (Value::String(a), Value::String(b)) => a.cmp(b),
                _ => match (as_number(&left), as_number(&right)) {
                    (Some(a), Some(b)) => a
                        .partial_cmp(&b)
                        .ok_or_else(|| Error::evaluation("incomparable numbers"))?,
                    _ => {
                        return Err(Error::evaluation(format!(
                            "cannot compare {} and {}",
                            type_name(&left),
                            type_name(&right)
                        )))
                    }
                },
            };
            let ok = match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                BinaryOp::Ge => ordering.is_ge(),
                _ => unreachable!(),
            };
            Ok(Value::Bool(ok))
        }
        BinaryOp::And | BinaryOp::Or => unreachable!(),
    }
}

/// Numbers compare numerically regardless of integer/float representation;
/// everything else is structural.
fn loose_eq(left: &Value, right: &Value) -> bool {
    match (as_number(left), as_number(right)) {
        (Some(a), Some(b)) => a == b,
        _ => left == right,
    }
}

/// An expression compiled against a fixed parameter list.
pub struct CompiledExpr {
    params: Vec<String>,
    ast: Expr,
}

impl CompiledBody for CompiledExpr {
    fn call(&self, args: &[Value]) -> Result<Value> {
        if args.len() != self.params.len() {
            return Err(Error::evaluation(format!(
                "expected {} arguments, got {}",
                self.params.len(),
                args.len()
            )));
        }
        let env: HashMap<&str, &Value> = self
            .params
            .iter()
            .map(String::as_str)
            .zip(args.iter())
            .collect();
        eval(&self.ast, &env)
    }
}

/// Compiles expression bodies once into reusable closures.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExprCompiler;

impl ExprCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl Compiler for ExprCompiler {
    fn compile(&self, body: &str, params: &[String]) -> Result<Arc<dyn CompiledBody>> {
        let ast = parse(body).map_err(Error::parse)?;
        Ok(Arc::new(CompiledExpr {
            params: params.to_vec(),
            ast,
        }))
    }

    fn free_variables(&self, body: &str) -> Result<Vec<String>> {
        let ast = parse(body).map_err(Error::parse)?;
        Ok(free_variables(&ast))
    }
}
