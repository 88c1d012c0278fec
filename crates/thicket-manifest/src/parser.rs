//! Manifest parsing on top of the Starlark syntax
//!
//! A manifest is a sequence of call expressions:
//!
//! ```text
//! python_library(
//!   name='strutil',
//!   sources=globs('*.py', exclude=['test_*.py']),
//!   dependencies=['3rdparty/python:six', ':helpers'],
//!   tags=['partially_type_checked'],
//! )
//! ```
//!
//! `starlark_syntax` lexes and parses the file under a dialect without
//! `def`, `lambda` or `load`. The AST is then lowered to [`Value`]s:
//! strings, integers, `True`/`False`/`None`, lists, tuples, dicts, nested
//! calls and `+` concatenation. Anything else is rejected.

use std::iter::Peekable;
use std::path::Path;
use std::str::Chars;

use starlark_syntax::codemap::{CodeMap, Span};
use starlark_syntax::dialect::Dialect;
use starlark_syntax::syntax::AstModule;
use starlark_syntax::syntax::ast::{ArgumentP, AstArgument, AstExpr, AstLiteral, AstStmt, BinOp, ExprP, StmtP};
use starlark_syntax::syntax::module::AstModuleFields;
use thicket_core::{Call, Value};

use crate::error::ParseError;

/// Deepest bracket nesting accepted in a manifest.
pub const MAX_NESTING: usize = 64;

/// Most `+`/`-` operators accepted in one top-level statement.
pub const MAX_OPERATORS: usize = 256;

/// A top-level call and the line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSite {
    pub call: Call,
    pub line: u32,
}

fn manifest_dialect() -> Dialect {
    Dialect {
        enable_def: false,
        enable_lambda: false,
        enable_load: false,
        enable_top_level_stmt: false,
        ..Dialect::Standard
    }
}

/// Parse a whole manifest. `file` is only used in error messages.
pub fn parse_manifest(source: &str, file: &Path) -> Result<Vec<CallSite>, ParseError> {
    // the AST is walked recursively, so bound its depth before building it
    NestingCheck::new(source, file).run()?;

    let module = AstModule::parse(&file.to_string_lossy(), source.to_owned(), &manifest_dialect()).map_err(|err| {
        let (line, column) = err
            .span()
            .map(|span| {
                let begin = span.resolve_span().begin;
                (begin.line as u32 + 1, begin.column as u32 + 1)
            })
            .unwrap_or((1, 1));
        ParseError {
            file: file.to_path_buf(),
            line,
            column,
            message: format!("{}", err.without_diagnostic()),
        }
    })?;

    let lowering = Lowering {
        codemap: module.codemap(),
        file,
    };
    let mut calls = Vec::new();
    lowering.statement(module.statement(), &mut calls)?;
    Ok(calls)
}

/// Turns Starlark AST nodes into manifest values.
struct Lowering<'a> {
    codemap: &'a CodeMap,
    file: &'a Path,
}

impl Lowering<'_> {
    fn line_of(&self, span: Span) -> u32 {
        self.codemap.resolve_span(span).begin.line as u32 + 1
    }

    fn error(&self, span: Span, message: impl Into<String>) -> ParseError {
        let begin = self.codemap.resolve_span(span).begin;
        ParseError {
            file: self.file.to_path_buf(),
            line: begin.line as u32 + 1,
            column: begin.column as u32 + 1,
            message: message.into(),
        }
    }

    fn statement(&self, stmt: &AstStmt, calls: &mut Vec<CallSite>) -> Result<(), ParseError> {
        match &stmt.node {
            StmtP::Statements(stmts) => {
                for stmt in stmts {
                    self.statement(stmt, calls)?;
                }
                Ok(())
            }
            StmtP::Expression(expr) => match self.value(expr)? {
                Value::Call(call) => {
                    calls.push(CallSite {
                        call,
                        line: self.line_of(stmt.span),
                    });
                    Ok(())
                }
                other => Err(self.error(
                    expr.span,
                    format!("expected a target declaration, found a {}", other.type_name()),
                )),
            },
            _ => Err(self.error(stmt.span, "expected a target declaration, found a statement")),
        }
    }

    fn value(&self, expr: &AstExpr) -> Result<Value, ParseError> {
        match &expr.node {
            ExprP::Literal(AstLiteral::String(s)) => Ok(Value::Str(s.node.clone())),
            ExprP::Literal(AstLiteral::Int(n)) => self.int(expr.span, &n.node.to_string(), false),
            ExprP::Minus(inner) => match &inner.node {
                ExprP::Literal(AstLiteral::Int(n)) => self.int(expr.span, &n.node.to_string(), true),
                _ => Err(self.error(expr.span, "`-` only applies to integer literals")),
            },
            ExprP::Identifier(ident) => match ident.node.ident.as_str() {
                "True" => Ok(Value::Bool(true)),
                "False" => Ok(Value::Bool(false)),
                "None" => Ok(Value::None),
                name => Err(self.error(
                    expr.span,
                    format!("unknown name `{}`: only literals and calls are allowed", name),
                )),
            },
            ExprP::List(items) => Ok(Value::List(self.values(items)?)),
            ExprP::Tuple(items) => Ok(Value::Tuple(self.values(items)?)),
            ExprP::Dict(entries) => {
                let mut dict = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    dict.push((self.value(key)?, self.value(value)?));
                }
                Ok(Value::Dict(dict))
            }
            ExprP::Call(callee, args) => self.call(callee, &args.args),
            ExprP::Op(lhs, BinOp::Add, rhs) => {
                let lhs = self.value(lhs)?;
                let rhs = self.value(rhs)?;
                self.concat(expr.span, lhs, rhs)
            }
            _ => Err(self.error(
                expr.span,
                "unsupported expression: only literals, collections, calls and `+` are allowed",
            )),
        }
    }

    fn values(&self, items: &[AstExpr]) -> Result<Vec<Value>, ParseError> {
        items.iter().map(|item| self.value(item)).collect()
    }

    fn int(&self, span: Span, digits: &str, negative: bool) -> Result<Value, ParseError> {
        digits
            .parse::<i64>()
            .ok()
            .and_then(|n| if negative { n.checked_neg() } else { Some(n) })
            .map(Value::Int)
            .ok_or_else(|| self.error(span, format!("integer {}{} is out of range", if negative { "-" } else { "" }, digits)))
    }

    fn concat(&self, span: Span, lhs: Value, rhs: Value) -> Result<Value, ParseError> {
        match (lhs, rhs) {
            (Value::List(mut a), Value::List(b)) => {
                a.extend(b);
                Ok(Value::List(a))
            }
            (Value::Tuple(mut a), Value::Tuple(b)) => {
                a.extend(b);
                Ok(Value::Tuple(a))
            }
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.saturating_add(b))),
            (a, b) => Err(self.error(
                span,
                format!("cannot concatenate {} and {}", a.type_name(), b.type_name()),
            )),
        }
    }

    fn call(&self, callee: &AstExpr, args: &[AstArgument]) -> Result<Value, ParseError> {
        let ExprP::Identifier(ident) = &callee.node else {
            return Err(self.error(callee.span, "only named functions can be called"));
        };

        let mut call = Call {
            alias: ident.node.ident.clone(),
            args: Vec::new(),
            kwargs: Vec::new(),
        };
        // ordering and repeated keywords are already checked by the parser
        for arg in args {
            match &arg.node {
                ArgumentP::Positional(expr) => call.args.push(self.value(expr)?),
                ArgumentP::Named(name, expr) => call.kwargs.push((name.node.clone(), self.value(expr)?)),
                _ => {
                    return Err(self.error(
                        arg.span,
                        format!("{}() does not accept `*args` or `**kwargs`", call.alias),
                    ));
                }
            }
        }
        Ok(Value::Call(call))
    }
}

/// Scans brackets and operators outside strings and comments.
struct NestingCheck<'a> {
    chars: Peekable<Chars<'a>>,
    file: &'a Path,
    line: u32,
    column: u32,
}

impl<'a> NestingCheck<'a> {
    fn new(source: &'a str, file: &'a Path) -> Self {
        NestingCheck {
            chars: source.chars().peekable(),
            file,
            line: 1,
            column: 0,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn too_deep(&self) -> ParseError {
        ParseError {
            file: self.file.to_path_buf(),
            line: self.line,
            column: self.column,
            message: "nesting too deep".to_string(),
        }
    }

    fn run(mut self) -> Result<(), ParseError> {
        let mut depth = 0usize;
        let mut operators = 0usize;
        while let Some(c) = self.bump() {
            match c {
                '\n' if depth == 0 => operators = 0,
                '#' => {
                    while self.chars.peek().is_some_and(|&c| c != '\n') {
                        self.bump();
                    }
                }
                '\'' | '"' => self.skip_string(c),
                '(' | '[' | '{' => {
                    depth += 1;
                    if depth > MAX_NESTING {
                        return Err(self.too_deep());
                    }
                }
                ')' | ']' | '}' => depth = depth.saturating_sub(1),
                '+' | '-' => {
                    operators += 1;
                    if operators > MAX_OPERATORS {
                        return Err(self.too_deep());
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Skip to the end of a string whose opening quote was just consumed.
    /// Malformed strings are left for the parser to report.
    fn skip_string(&mut self, quote: char) {
        let triple = {
            let mut ahead = self.chars.clone();
            ahead.next() == Some(quote) && ahead.next() == Some(quote)
        };
        if triple {
            self.bump();
            self.bump();
        } else if self.chars.peek() == Some(&quote) {
            // empty string
            self.bump();
            return;
        }

        let mut closing = 0;
        while let Some(c) = self.bump() {
            match c {
                '\\' => {
                    self.bump();
                    closing = 0;
                }
                c if c == quote => {
                    closing += 1;
                    if !triple || closing == 3 {
                        return;
                    }
                }
                '\n' if !triple => return,
                _ => closing = 0,
            }
        }
    }
}
