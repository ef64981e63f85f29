//! Tests for rill-lang: lexer, expression evaluation, statement classification

use rill_core::{Compiler, ParsedStatement, Result};
use rill_lang::lexer::{tokenize, Token};
use rill_lang::statement::parse_statement;
use rill_lang::{expr, ExprCompiler};
use serde_json::{json, Value};

fn eval(source: &str, env: &[(&str, Value)]) -> Result<Value> {
    let params: Vec<String> = env.iter().map(|(name, _)| name.to_string()).collect();
    let args: Vec<Value> = env.iter().map(|(_, value)| value.clone()).collect();
    let body = ExprCompiler.compile(source, &params)?;
    body.call(&args)
}

// ===========================================================================
// Lexer
// ===========================================================================

#[test]
fn tokenize_arithmetic() {
    let tokens = tokenize("1 + 2 * x").unwrap();
    assert_eq!(
        tokens,
        vec![
            Token::Number(1.0),
            Token::Plus,
            Token::Number(2.0),
            Token::Star,
            Token::Ident("x".to_string()),
        ]
    );
}

#[test]
fn tokenize_two_char_operators() {
    let tokens = tokenize("a == b != c <= d >= e && f || g").unwrap();
    assert!(tokens.contains(&Token::EqEq));
    assert!(tokens.contains(&Token::NotEq));
    assert!(tokens.contains(&Token::Le));
    assert!(tokens.contains(&Token::Ge));
    assert!(tokens.contains(&Token::AndAnd));
    assert!(tokens.contains(&Token::OrOr));
}

#[test]
fn tokenize_string_escapes() {
    let tokens = tokenize(r#" "a\nb" 'c\'d' "#).unwrap();
    assert_eq!(
        tokens,
        vec![
            Token::Str("a\nb".to_string()),
            Token::Str("c'd".to_string()),
        ]
    );
}

#[test]
fn tokenize_rejects_unknown_characters() {
    assert!(tokenize("1 @ 2").is_err());
    assert!(tokenize("\"unterminated").is_err());
}

// ===========================================================================
// Expressions
// ===========================================================================

#[test]
fn arithmetic_and_precedence() {
    assert_eq!(eval("1 + 2", &[]).unwrap(), json!(3));
    assert_eq!(eval("1 + 2 * 3", &[]).unwrap(), json!(7));
    assert_eq!(eval("(1 + 2) * 3", &[]).unwrap(), json!(9));
    assert_eq!(eval("10 % 4", &[]).unwrap(), json!(2));
    assert_eq!(eval("-3 + 1", &[]).unwrap(), json!(-2));
}

#[test]
fn whole_floats_settle_as_integers() {
    assert_eq!(eval("1.5 * 2", &[]).unwrap(), json!(3));
    assert_eq!(eval("7 / 2", &[]).unwrap(), json!(3.5));
}

#[test]
fn string_concatenation() {
    assert_eq!(eval("'a' + 'b'", &[]).unwrap(), json!("ab"));
    assert_eq!(eval("'n = ' + 1", &[]).unwrap(), json!("n = 1"));
}

#[test]
fn division_by_zero_fails() {
    let err = eval("1 / 0", &[]).unwrap_err();
    assert!(err.to_string().contains("division by zero"));
    assert!(eval("1 % 0", &[]).is_err());
}

#[test]
fn comparisons_and_loose_equality() {
    assert_eq!(eval("1 < 2", &[]).unwrap(), json!(true));
    assert_eq!(eval("2 <= 2", &[]).unwrap(), json!(true));
    assert_eq!(eval("'a' < 'b'", &[]).unwrap(), json!(true));
    assert_eq!(eval("1 == 1.0", &[]).unwrap(), json!(true));
    assert_eq!(eval("1 != 2", &[]).unwrap(), json!(true));
}

#[test]
fn logic_returns_operands() {
    assert_eq!(eval("0 || 5", &[]).unwrap(), json!(5));
    assert_eq!(eval("1 && 2", &[]).unwrap(), json!(2));
    assert_eq!(eval("'' && 1", &[]).unwrap(), json!(""));
    assert_eq!(eval("!0", &[]).unwrap(), json!(true));
    assert_eq!(eval("!null", &[]).unwrap(), json!(true));
}

#[test]
fn array_literals() {
    assert_eq!(
        eval("[1, 'a', true, null]", &[]).unwrap(),
        json!([1, "a", true, null])
    );
    assert_eq!(eval("[]", &[]).unwrap(), json!([]));
}

#[test]
fn identifiers_resolve_from_parameters() {
    assert_eq!(
        eval("a + b", &[("a", json!(1)), ("b", json!(2))]).unwrap(),
        json!(3)
    );
}

#[test]
fn arity_mismatch_fails() {
    let body = ExprCompiler
        .compile("a + 1", &["a".to_string()])
        .unwrap();
    assert!(body.call(&[]).is_err());
}

#[test]
fn free_variables_dedupe_in_order() {
    assert_eq!(
        ExprCompiler.free_variables("a + b * a").unwrap(),
        vec!["a".to_string(), "b".to_string()]
    );
    assert!(ExprCompiler.free_variables("1 + 2").unwrap().is_empty());
}

#[test]
fn parse_reports_trailing_tokens() {
    assert!(expr::parse("1 +").is_err());
    assert!(expr::parse("1 2").is_err());
    assert!(expr::parse("(1").is_err());
}

// ===========================================================================
// Statements
// ===========================================================================

#[test]
fn bare_expression_has_no_name() {
    match parse_statement("a + 1") {
        ParsedStatement::Assignment {
            name,
            dependencies,
            body,
            viewof,
        } => {
            assert_eq!(name, None);
            assert_eq!(dependencies, vec!["a".to_string()]);
            assert_eq!(body, "a + 1");
            assert!(!viewof);
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn assignment_splits_on_first_equals() {
    match parse_statement("x = 1 + 2") {
        ParsedStatement::Assignment { name, body, .. } => {
            assert_eq!(name.as_deref(), Some("x"));
            assert_eq!(body, "1 + 2");
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn let_prefix_is_accepted() {
    match parse_statement("let y = x * 2") {
        ParsedStatement::Assignment {
            name, dependencies, ..
        } => {
            assert_eq!(name.as_deref(), Some("y"));
            assert_eq!(dependencies, vec!["x".to_string()]);
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn viewof_marks_the_assignment() {
    match parse_statement("viewof gain = 3") {
        ParsedStatement::Assignment { name, viewof, .. } => {
            assert_eq!(name.as_deref(), Some("gain"));
            assert!(viewof);
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn comparison_is_not_an_assignment() {
    match parse_statement("a == b") {
        ParsedStatement::Assignment {
            name, dependencies, ..
        } => {
            assert_eq!(name, None);
            assert_eq!(dependencies, vec!["a".to_string(), "b".to_string()]);
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn malformed_statements_become_exceptions() {
    assert!(matches!(parse_statement(""), ParsedStatement::Exception { .. }));
    assert!(matches!(parse_statement("   "), ParsedStatement::Exception { .. }));
    assert!(matches!(parse_statement("let x"), ParsedStatement::Exception { .. }));
    assert!(matches!(parse_statement("viewof s"), ParsedStatement::Exception { .. }));
    assert!(matches!(parse_statement("x = 1 +"), ParsedStatement::Exception { .. }));
}

#[test]
fn import_with_aliases() {
    match parse_statement(r#"import { a, b as c } from "lib""#) {
        ParsedStatement::Import { notebook, names } => {
            assert_eq!(notebook.as_str(), "lib");
            assert_eq!(names.len(), 2);
            assert_eq!(names[0].local_name(), "a");
            assert_eq!(names[1].name, "b");
            assert_eq!(names[1].local_name(), "c");
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn import_accepts_single_quotes() {
    match parse_statement("import { a } from 'lib'") {
        ParsedStatement::Import { notebook, .. } => assert_eq!(notebook.as_str(), "lib"),
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn malformed_imports_become_exceptions() {
    assert!(matches!(
        parse_statement("import {} from \"lib\""),
        ParsedStatement::Exception { .. }
    ));
    assert!(matches!(
        parse_statement("import { a }"),
        ParsedStatement::Exception { .. }
    ));
    assert!(matches!(
        parse_statement("import { a } from lib"),
        ParsedStatement::Exception { .. }
    ));
    assert!(matches!(
        parse_statement("import { 1bad } from \"lib\""),
        ParsedStatement::Exception { .. }
    ));
}

// An identifier named `import` on the lhs still parses as an import keyword,
// so the grammar reserves it; everything else assigns normally.
#[test]
fn importlike_identifier_still_assigns() {
    match parse_statement("imports = 1") {
        ParsedStatement::Assignment { name, .. } => assert_eq!(name.as_deref(), Some("imports")),
        other => panic!("unexpected: {:?}", other),
    }
}
