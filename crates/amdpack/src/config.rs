//! Build configuration
//!
//! A build profile is usually written the way require.js users write them: a
//! JavaScript object literal, optionally wrapped in `require.config(...)` or
//! friends, with unquoted keys, single-quoted strings and inline `init`
//! functions. [`Config::parse`] reads that object literal through the
//! JavaScript parser into JSON and decodes it with serde. TOML profiles are
//! decoded directly.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::debug;
use oxc_allocator::Allocator;
use oxc_ast::ast::{Expression, ObjectExpression, ObjectPropertyKind, Statement};
use oxc_span::GetSpan;
use oxc_syntax::operator::UnaryOperator;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AmdError, Result},
    js::{Position, parse_script},
    shim::Shim,
};

/// Path value marking a module as resolved elsewhere and excluded from output.
pub const EMPTY: &str = "empty:";

/// Pseudo modules provided by the loader itself
const RESERVED_PATHS: [&str; 2] = ["module", "require"];

/// Target of a `paths` entry: a single location or an ordered list of
/// fallbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathValue {
    Single(String),
    Fallbacks(Vec<String>),
}

impl PathValue {
    pub fn candidates(&self) -> &[String] {
        match self {
            Self::Single(path) => std::slice::from_ref(path),
            Self::Fallbacks(paths) => paths,
        }
    }
}

impl From<&str> for PathValue {
    fn from(path: &str) -> Self {
        Self::Single(path.to_owned())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Directory all module paths are relative to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Module name or path prefix to location
    pub paths: IndexMap<String, PathValue>,
    /// Wrappers for scripts that do not call `define`
    pub shim: IndexMap<String, Shim>,
    /// Keep `"use strict"` statements
    pub use_strict: bool,
    /// Inline `text!` resources as string modules
    pub inline_text: bool,
    /// Follow `require([...])` calls nested inside functions
    pub find_nested_dependencies: bool,
    /// Entry module
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Bundle destination
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out: Option<PathBuf>,
    /// Minifier applied to the bundle
    pub optimize: String,
}

impl Default for Config {
    fn default() -> Self {
        let mut config = Self {
            base_url: None,
            paths: IndexMap::new(),
            shim: IndexMap::new(),
            use_strict: false,
            inline_text: true,
            find_nested_dependencies: false,
            name: None,
            out: None,
            optimize: "none".to_owned(),
        };
        config.seed_reserved_paths();
        config
    }
}

impl Config {
    pub fn new(base_url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            name: Some(name.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_path(mut self, alias: impl Into<String>, path: impl Into<PathValue>) -> Self {
        self.paths.insert(alias.into(), path.into());
        self
    }

    #[must_use]
    pub fn with_shim(mut self, name: impl Into<String>, shim: Shim) -> Self {
        self.shim.insert(name.into(), shim);
        self
    }

    #[must_use]
    pub fn with_out(mut self, out: impl Into<PathBuf>) -> Self {
        self.out = Some(out.into());
        self
    }

    #[must_use]
    pub fn with_use_strict(mut self, use_strict: bool) -> Self {
        self.use_strict = use_strict;
        self
    }

    #[must_use]
    pub fn with_inline_text(mut self, inline_text: bool) -> Self {
        self.inline_text = inline_text;
        self
    }

    #[must_use]
    pub fn with_find_nested_dependencies(mut self, find_nested_dependencies: bool) -> Self {
        self.find_nested_dependencies = find_nested_dependencies;
        self
    }

    #[must_use]
    pub fn with_optimize(mut self, optimize: impl Into<String>) -> Self {
        self.optimize = optimize.into();
        self
    }

    /// Base url, defaulting to the root marker
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .unwrap_or(".")
    }

    /// Entry module name
    pub fn name(&self) -> Result<&str> {
        self.name
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                AmdError::InvalidConfig("The following option is required: name".to_owned())
            })
    }

    /// Map `path` through `paths`, returning it unchanged when no alias is
    /// registered. The result may be [`EMPTY`].
    pub fn resolve_path<'a>(&'a self, path: &'a str) -> &'a str {
        self.path_candidates(path).first().copied().unwrap_or(path)
    }

    /// Every configured location for `path`, in fallback order.
    pub fn path_candidates<'a>(&'a self, path: &'a str) -> Vec<&'a str> {
        let candidates: Vec<&str> = self
            .paths
            .get(path)
            .map(|value| {
                value
                    .candidates()
                    .iter()
                    .map(String::as_str)
                    .filter(|candidate| !candidate.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        if candidates.is_empty() {
            vec![path]
        } else {
            candidates
        }
    }

    /// Whether `path` is mapped to the empty sentinel.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.resolve_path(path) == EMPTY
    }

    pub fn shim_for(&self, name: &str) -> Option<&Shim> {
        self.shim.get(name)
    }

    fn seed_reserved_paths(&mut self) {
        for reserved in RESERVED_PATHS {
            self.paths
                .entry(reserved.to_owned())
                .or_insert_with(|| PathValue::Single(EMPTY.to_owned()));
        }
    }

    /// Parse a JavaScript or JSON build profile. `file` only names the
    /// source in error messages.
    pub fn parse(source: &str, file: &str) -> Result<Self> {
        let value = ProfileReader::read(source, file)?;
        debug!("Normalized build profile {file}: {value}");
        let mut config: Self =
            serde_json::from_value(value).map_err(|err| AmdError::ConfigParse {
                file: file.to_owned(),
                line: 1,
                column: 1,
                message: err.to_string(),
            })?;
        config.seed_reserved_paths();
        Ok(config)
    }

    /// Parse a TOML build profile.
    pub fn parse_toml(source: &str, file: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(source).map_err(|err| {
            let (line, column) = err
                .span()
                .map_or((1, 1), |span| line_column(source, span.start));
            AmdError::ConfigParse {
                file: file.to_owned(),
                line,
                column,
                message: err.message().to_owned(),
            }
        })?;
        config.seed_reserved_paths();
        Ok(config)
    }

    /// Read a build profile from disk. Without an explicit `baseUrl` modules
    /// are looked up next to the profile.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        let file = path.display().to_string();
        let mut config = if path.extension().is_some_and(|ext| ext == "toml") {
            Self::parse_toml(&source, &file)?
        } else {
            Self::parse(&source, &file)?
        };
        if config.base_url.as_deref().is_none_or(str::is_empty) {
            let parent = path
                .canonicalize()
                .ok()
                .and_then(|path| path.parent().map(Path::to_path_buf))
                .unwrap_or_else(|| PathBuf::from("."));
            config.base_url = Some(parent.display().to_string());
        }
        Ok(config)
    }

    /// Pretty JSON rendering of the effective options
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}

/// 1-based line and column of a byte offset
fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let position = Position::locate(source, offset);
    (position.line, position.column + 1)
}

/// Reads the first object literal of a JavaScript build profile into a JSON
/// value.
struct ProfileReader<'s> {
    /// Parsed text, possibly with a leading `(`
    text: &'s str,
    /// Bytes prepended to the original source
    shift: usize,
    file: &'s str,
}

impl ProfileReader<'_> {
    fn read(source: &str, file: &str) -> Result<serde_json::Value> {
        // a leading `{` would start a block statement
        let wrapped;
        let (text, shift) = if source.trim_start().starts_with('{') {
            wrapped = format!("({source}\n)");
            (wrapped.as_str(), 1)
        } else {
            (source, 0)
        };
        let reader = ProfileReader { text, shift, file };

        let allocator = Allocator::default();
        let program = parse_script(&allocator, text, file).map_err(|err| match err {
            AmdError::Parse {
                line,
                column,
                message,
                ..
            } => reader.error_at_position(line, column, message),
            other => other,
        })?;
        let object = program
            .body
            .iter()
            .find_map(|statement| match statement {
                Statement::ExpressionStatement(statement) => object_in(&statement.expression),
                _ => None,
            })
            .ok_or_else(|| reader.error(0, "expected: an object literal".to_owned()))?;
        reader.object(object)
    }

    fn error_at_position(&self, line: usize, column: usize, message: String) -> AmdError {
        let column = if line == 1 {
            column.saturating_sub(self.shift)
        } else {
            column
        };
        AmdError::ConfigParse {
            file: self.file.to_owned(),
            line,
            column: column + 1,
            message,
        }
    }

    fn error(&self, offset: u32, message: String) -> AmdError {
        let position = Position::locate(self.text, offset as usize);
        self.error_at_position(position.line, position.column, message)
    }

    fn source_of(&self, span: oxc_span::Span) -> &str {
        self.text
            .get(span.start as usize..span.end as usize)
            .unwrap_or_default()
    }

    fn object(&self, object: &ObjectExpression<'_>) -> Result<serde_json::Value> {
        let mut map = serde_json::Map::new();
        for property in &object.properties {
            let ObjectPropertyKind::ObjectProperty(property) = property else {
                return Err(self.error(property.span().start, "unexpected spread".to_owned()));
            };
            let key = property.key.static_name().ok_or_else(|| {
                self.error(
                    property.key.span().start,
                    format!("unsupported key: {}", self.source_of(property.key.span())),
                )
            })?;
            map.insert(key.into_owned(), self.value(&property.value)?);
        }
        Ok(serde_json::Value::Object(map))
    }

    fn value(&self, expression: &Expression<'_>) -> Result<serde_json::Value> {
        use serde_json::Value;

        let value = match expression {
            Expression::ObjectExpression(object) => self.object(object)?,
            Expression::ArrayExpression(array) => Value::Array(
                array
                    .elements
                    .iter()
                    .map(|element| match element.as_expression() {
                        Some(element) => self.value(element),
                        None => Err(self.unexpected(element.span())),
                    })
                    .collect::<Result<_>>()?,
            ),
            Expression::StringLiteral(literal) => Value::from(literal.value.as_str()),
            Expression::NumericLiteral(literal) => number(literal.value),
            Expression::BooleanLiteral(literal) => Value::Bool(literal.value),
            Expression::NullLiteral(_) => Value::Null,
            Expression::Identifier(ident) if ident.name.as_str() == "undefined" => Value::Null,
            Expression::TemplateLiteral(template) if template.expressions.is_empty() => {
                Value::String(
                    template
                        .quasis
                        .iter()
                        .map(|quasi| quasi.value.cooked.unwrap_or(quasi.value.raw).as_str())
                        .collect(),
                )
            }
            Expression::UnaryExpression(unary)
                if unary.operator == UnaryOperator::UnaryNegation =>
            {
                match &unary.argument {
                    Expression::NumericLiteral(literal) => number(-literal.value),
                    _ => return Err(self.unexpected(unary.span)),
                }
            }
            // kept as source text, `shim.init` in particular
            Expression::FunctionExpression(_)
            | Expression::ArrowFunctionExpression(_)
            | Expression::RegExpLiteral(_) => Value::from(self.source_of(expression.span())),
            Expression::ParenthesizedExpression(inner) => self.value(&inner.expression)?,
            other => return Err(self.unexpected(other.span())),
        };
        Ok(value)
    }

    fn unexpected(&self, span: oxc_span::Span) -> AmdError {
        self.error(
            span.start,
            format!("unexpected value: '{}'", self.source_of(span)),
        )
    }
}

/// The object literal a profile statement holds, directly, in parentheses or
/// as an argument of a `require.config(...)` style call.
fn object_in<'b, 'a>(expression: &'b Expression<'a>) -> Option<&'b ObjectExpression<'a>> {
    match expression {
        Expression::ObjectExpression(object) => Some(&**object),
        Expression::ParenthesizedExpression(inner) => object_in(&inner.expression),
        Expression::CallExpression(call) => call
            .arguments
            .iter()
            .find_map(|argument| argument.as_expression().and_then(object_in)),
        _ => None,
    }
}

/// Integral values decode as integers so they fit integer fields.
#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn number(value: f64) -> serde_json::Value {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        serde_json::Value::from(value as i64)
    } else {
        serde_json::Number::from_f64(value).map_or(serde_json::Value::Null, serde_json::Value::Number)
    }
}
