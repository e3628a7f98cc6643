//! JavaScript parse events
//!
//! The bundler never needs the syntax tree itself. Dependency collection and
//! source patching only look at `define(...)`/`require(...)` call sites and at
//! `"use strict"` statements, so the parser collaborator is reduced to the
//! [`SourceParser`] trait that reports those as [`ParseEvent`]s in source
//! order. [`JsParser`] is the built-in implementation on top of `oxc`.

use std::fmt::Write as _;

use log::{trace, warn};
use oxc_allocator::Allocator;
use oxc_ast::ast::{self, CallExpression, Directive, Expression, ExpressionStatement, Program};
use oxc_ast_visit::{Visit, walk};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType};

use crate::error::{AmdError, Result};

/// Line/column location inside a module's source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    /// 1-based line
    pub line: usize,
    /// 0-based byte column
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// Position of the byte `offset` of `source`
    pub fn locate(source: &str, offset: usize) -> Self {
        let offset = offset.min(source.len());
        let before = source.as_bytes().get(..offset).unwrap_or_default();
        let line_start = before
            .iter()
            .rposition(|byte| *byte == b'\n')
            .map_or(0, |idx| idx + 1);
        let line = before.iter().filter(|byte| **byte == b'\n').count() + 1;
        Self::new(line, offset - line_start)
    }
}

/// Half-open source range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callee {
    Define,
    Require,
}

impl Callee {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "define" => Some(Self::Define),
            "require" => Some(Self::Require),
            _ => None,
        }
    }
}

/// What an argument of a call site looks like
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentKind {
    /// A single string literal
    String(String),
    /// An array literal; only its string elements are kept
    Array(Vec<String>),
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub kind: ArgumentKind,
    pub span: Span,
}

impl Argument {
    pub fn is_string(&self) -> bool {
        matches!(self.kind, ArgumentKind::String(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, ArgumentKind::Array(_))
    }
}

/// A call to `define` or `require` through a plain identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub callee: Callee,
    /// Position of the callee identifier
    pub position: Position,
    /// Position of the opening parenthesis
    pub open_paren: Position,
    pub arguments: Vec<Argument>,
    /// The call is the whole expression of a statement in the module body
    pub top_level: bool,
}

impl CallSite {
    /// First array literal among the arguments
    pub fn dependency_array(&self) -> Option<&[String]> {
        self.arguments.iter().find_map(|arg| match &arg.kind {
            ArgumentKind::Array(elements) => Some(elements.as_slice()),
            _ => None,
        })
    }
}

/// A string literal forming a whole expression statement or directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringStatement {
    pub value: String,
    /// The statement, including its `;` when there is one
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEvent {
    Call(CallSite),
    StringStatement(StringStatement),
}

/// Parser collaborator reporting call sites and string statements in source
/// order.
pub trait SourceParser {
    fn parse(&self, source: &str, name: &str) -> Result<Vec<ParseEvent>>;
}

/// [`SourceParser`] backed by `oxc_parser`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsParser;

impl SourceParser for JsParser {
    fn parse(&self, source: &str, name: &str) -> Result<Vec<ParseEvent>> {
        let allocator = Allocator::default();
        let program = parse_script(&allocator, source, name)?;
        let mut collector = EventCollector::new(source, &program);
        collector.visit_program(&program);
        trace!("{name}: {} parse events", collector.events.len());
        Ok(collector.events)
    }
}

/// Parse `source` as a classic (non-module) script.
///
/// The first diagnostic becomes an [`AmdError::Parse`] naming `name`.
pub fn parse_script<'a>(
    allocator: &'a Allocator,
    source: &'a str,
    name: &str,
) -> Result<Program<'a>> {
    let ret = Parser::new(allocator, source, SourceType::default().with_script(true)).parse();
    if let Some(error) = ret.errors.first() {
        let offset = error
            .labels
            .as_ref()
            .and_then(|labels| labels.first())
            .map_or(0, |label| label.offset());
        return Err(parse_error(source, name, offset, error.message.to_string()));
    }
    if ret.panicked {
        return Err(parse_error(source, name, 0, "Unrecoverable syntax error".to_owned()));
    }
    Ok(ret.program)
}

fn parse_error(source: &str, name: &str, offset: usize, message: String) -> AmdError {
    let position = Position::locate(source, offset);
    AmdError::Parse {
        name: name.to_owned(),
        line: position.line,
        column: position.column,
        message,
    }
}

/// Escape `text` for a single quoted JavaScript string. Anything outside
/// printable ASCII becomes a `\uXXXX` escape.
pub fn escape_single_quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for ch in text.chars() {
        match ch {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\u{8}' => out.push_str("\\b"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\u{c}' => out.push_str("\\f"),
            '\r' => out.push_str("\\r"),
            ' '..='\u{7f}' => out.push(ch),
            _ => {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{unit:04X}");
                }
            }
        }
    }
    out
}

/// Byte offsets of line starts
struct LineStarts(Vec<usize>);

impl LineStarts {
    fn new(source: &str) -> Self {
        Self(
            std::iter::once(0)
                .chain(source.match_indices('\n').map(|(idx, _)| idx + 1))
                .collect(),
        )
    }

    fn position(&self, offset: u32) -> Position {
        let offset = offset as usize;
        let line = self.0.partition_point(|start| *start <= offset).max(1);
        Position::new(line, offset - self.0[line - 1])
    }
}

struct EventCollector<'s> {
    source: &'s str,
    lines: LineStarts,
    /// Calls forming a statement of the module body
    top_level: Vec<oxc_span::Span>,
    events: Vec<ParseEvent>,
}

impl<'s> EventCollector<'s> {
    fn new(source: &'s str, program: &Program<'_>) -> Self {
        let top_level = program
            .body
            .iter()
            .filter_map(|statement| match statement {
                ast::Statement::ExpressionStatement(statement) => match &statement.expression {
                    Expression::CallExpression(call) => Some(call.span),
                    _ => None,
                },
                _ => None,
            })
            .collect();
        Self {
            source,
            lines: LineStarts::new(source),
            top_level,
            events: Vec::new(),
        }
    }

    fn span(&self, span: oxc_span::Span) -> Span {
        Span {
            start: self.lines.position(span.start),
            end: self.lines.position(span.end),
        }
    }

    fn call_site(&self, call: &CallExpression<'_>) -> Option<CallSite> {
        let Expression::Identifier(ident) = &call.callee else {
            return None;
        };
        let callee = Callee::from_name(ident.name.as_str())?;
        let open_paren = self.open_paren(ident.span.end)?;
        Some(CallSite {
            callee,
            position: self.lines.position(ident.span.start),
            open_paren: self.lines.position(open_paren),
            arguments: call
                .arguments
                .iter()
                .map(|argument| self.argument(argument))
                .collect(),
            top_level: self.top_level.contains(&call.span),
        })
    }

    /// First `(` after the callee, skipping comments in between
    fn open_paren(&self, from: u32) -> Option<u32> {
        let mut offset = from as usize;
        loop {
            let rest = self.source.get(offset..)?;
            let trimmed = rest.trim_start();
            offset += rest.len() - trimmed.len();
            if let Some(comment) = trimmed.strip_prefix("/*") {
                offset += comment.find("*/")? + 4;
            } else if trimmed.starts_with("//") {
                offset += trimmed.find('\n')?;
            } else if trimmed.starts_with("?.") {
                offset += 2;
            } else if trimmed.starts_with('(') {
                return u32::try_from(offset).ok();
            } else {
                return None;
            }
        }
    }

    fn argument(&self, argument: &ast::Argument<'_>) -> Argument {
        let kind = match argument {
            ast::Argument::StringLiteral(literal) => ArgumentKind::String(literal.value.to_string()),
            ast::Argument::ArrayExpression(array) => ArgumentKind::Array(
                array
                    .elements
                    .iter()
                    .filter_map(|element| self.array_element(element))
                    .collect(),
            ),
            _ => ArgumentKind::Other,
        };
        Argument {
            kind,
            span: self.span(argument.span()),
        }
    }

    fn array_element(&self, element: &ast::ArrayExpressionElement<'_>) -> Option<String> {
        match element {
            ast::ArrayExpressionElement::StringLiteral(literal) => Some(literal.value.to_string()),
            other => {
                let position = self.lines.position(other.span().start);
                warn!(
                    "Ignoring non-literal dependency at {}:{}",
                    position.line, position.column
                );
                None
            }
        }
    }

    fn string_statement(&mut self, value: &str, span: oxc_span::Span) {
        let statement = StringStatement {
            value: value.to_owned(),
            span: self.span(span),
        };
        self.events.push(ParseEvent::StringStatement(statement));
    }
}

impl<'a> Visit<'a> for EventCollector<'_> {
    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        if let Some(call) = self.call_site(it) {
            self.events.push(ParseEvent::Call(call));
        }
        walk::walk_call_expression(self, it);
    }

    fn visit_directive(&mut self, it: &Directive<'a>) {
        self.string_statement(it.expression.value.as_str(), it.span);
    }

    fn visit_expression_statement(&mut self, it: &ExpressionStatement<'a>) {
        if let Expression::StringLiteral(literal) = &it.expression {
            self.string_statement(literal.value.as_str(), it.span);
        }
        walk::walk_expression_statement(self, it);
    }
}
