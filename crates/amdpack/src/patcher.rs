//! AMD source patching
//!
//! Anonymous or dependency-less `define` calls get the module name and an
//! empty dependency array spliced in, and `"use strict"` statements are
//! removed unless the build keeps them. Every change is recorded as an
//! [`Edit`] against the original text and the list is applied in a single
//! pass, so positions reported by the parser never drift.

use log::debug;

use crate::{
    config::Config,
    error::Result,
    js::{
        Callee, CallSite, ParseEvent, Position, SourceParser, StringStatement, escape_single_quoted,
    },
};

const USE_STRICT: &str = "use strict";

/// Outcome of [`patch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patched {
    pub content: String,
    /// At least one `define` call exists; otherwise the module is a shim
    /// candidate.
    pub define_found: bool,
}

/// Replace `original[start..end]` with `text`. Inserts have `start == end`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Edit {
    start: usize,
    end: usize,
    text: String,
}

impl Edit {
    fn insert(at: usize, text: impl Into<String>) -> Self {
        Self {
            start: at,
            end: at,
            text: text.into(),
        }
    }

    fn delete(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            text: String::new(),
        }
    }
}

/// Line start offsets, computed up to the highest line requested so far.
#[derive(Debug)]
struct LineIndex<'a> {
    source: &'a str,
    starts: Vec<usize>,
    scanned: usize,
}

impl<'a> LineIndex<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            starts: vec![0],
            scanned: 0,
        }
    }

    /// Byte offset of a 1-based line, 0-based column position
    fn offset(&mut self, position: Position) -> usize {
        let line = position.line.saturating_sub(1);
        let bytes = self.source.as_bytes();
        while self.starts.len() <= line && self.scanned < bytes.len() {
            if bytes[self.scanned] == b'\n' {
                self.starts.push(self.scanned + 1);
            }
            self.scanned += 1;
        }
        match self.starts.get(line) {
            Some(start) => (start + position.column).min(self.source.len()),
            None => self.source.len(),
        }
    }
}

/// Normalize every `define` call of `content` and strip disallowed
/// `"use strict"` statements.
pub fn patch(
    config: &Config,
    name: &str,
    content: &str,
    parser: &dyn SourceParser,
) -> Result<Patched> {
    let mut lines = LineIndex::new(content);
    let mut edits = Vec::new();
    let mut define_found = false;

    for event in parser.parse(content, name)? {
        match event {
            ParseEvent::Call(call) if call.callee == Callee::Define => {
                define_found = true;
                define_edits(&call, name, content, &mut lines, &mut edits);
            }
            ParseEvent::StringStatement(statement) if !config.use_strict => {
                strict_edits(&statement, &mut lines, &mut edits);
            }
            _ => {}
        }
    }

    if !edits.is_empty() {
        debug!("{name}: applying {} edit(s)", edits.len());
    }
    Ok(Patched {
        content: apply(content, edits),
        define_found,
    })
}

fn define_edits(
    call: &CallSite,
    name: &str,
    content: &str,
    lines: &mut LineIndex<'_>,
    edits: &mut Vec<Edit>,
) {
    let after_paren = lines.offset(call.open_paren) + 1;
    let quoted = format!("'{}'", escape_single_quoted(name));
    let args = &call.arguments;
    let has_name = matches!(args.first(), Some(arg) if arg.is_string());
    let dependencies = if has_name { args.get(1) } else { args.first() };
    let has_dependencies = dependencies.is_some_and(|arg| arg.is_array());

    if args.is_empty() {
        edits.push(Edit::insert(after_paren, format!("{quoted},[]")));
        return;
    }

    if !has_name {
        let mut chunk = format!("{quoted},");
        if !has_dependencies {
            chunk.push_str("[],");
        }
        edits.push(Edit::insert(after_paren, chunk));
    } else if !has_dependencies {
        let name_end = lines.offset(args[0].span.end);
        if let Some(comma) = content[name_end..].find(',') {
            edits.push(Edit::insert(name_end + comma + 1, "[],"));
        }
    }
}

fn strict_edits(statement: &StringStatement, lines: &mut LineIndex<'_>, edits: &mut Vec<Edit>) {
    if statement.value != USE_STRICT {
        return;
    }
    let start = lines.offset(statement.span.start);
    let end = lines.offset(statement.span.end);
    edits.push(Edit::delete(start, end));
}

fn apply(content: &str, mut edits: Vec<Edit>) -> String {
    if edits.is_empty() {
        return content.to_owned();
    }
    edits.sort_by_key(|edit| edit.start);

    let growth: usize = edits.iter().map(|edit| edit.text.len()).sum();
    let mut out = String::with_capacity(content.len() + growth);
    let mut cursor = 0;
    for edit in edits {
        if edit.start < cursor || !content.is_char_boundary(edit.start) {
            debug!("Dropping overlapping edit at {}", edit.start);
            continue;
        }
        out.push_str(&content[cursor..edit.start]);
        out.push_str(&edit.text);
        cursor = edit.end;
    }
    out.push_str(&content[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::js::JsParser;

    fn patched(config: &Config, name: &str, content: &str) -> Patched {
        patch(config, name, content, &JsParser).expect("valid script")
    }

    fn run(name: &str, content: &str) -> String {
        patched(&Config::new(".", name), name, content).content
    }

    #[test]
    fn test_anonymous_define_gets_name_and_dependencies() {
        assert_eq!(
            run("z", "define(function(){ console.log(1); });"),
            "define('z',[],function(){ console.log(1); });"
        );
    }

    #[test]
    fn test_anonymous_define_with_dependencies_gets_name() {
        assert_eq!(
            run("a", "define(['b'], function (b) {});"),
            "define('a',['b'], function (b) {});"
        );
    }

    #[test]
    fn test_named_define_without_dependencies() {
        assert_eq!(
            run("a", "define('a', function () {});"),
            "define('a',[], function () {});"
        );
        assert_eq!(run("a", "define(\"a\")"), "define(\"a\")");
    }

    #[test]
    fn test_empty_define() {
        assert_eq!(run("a", "define();"), "define('a',[]);");
    }

    #[test]
    fn test_well_formed_module_is_untouched() {
        let source = "define(\"x\", [\"y\"], function (y) {\n  return y;\n});\n";
        assert_eq!(run("x", source), source);
    }

    #[test]
    fn test_patching_is_idempotent() {
        let once = run("m", "define({\n  a: 1\n});");
        assert_eq!(once, "define('m',[],{\n  a: 1\n});");
        assert_eq!(run("m", &once), once);
    }

    #[test]
    fn test_edits_on_later_lines_do_not_drift() {
        let source = "\"use strict\";\ndefine(function () {\n  \"use strict\";\n  return 1;\n});\n\
                      define(function () {});\n";
        assert_eq!(
            run("m", source),
            "\ndefine('m',[],function () {\n  \n  return 1;\n});\ndefine('m',[],function () {});\n"
        );
    }

    #[test]
    fn test_use_strict_is_kept_when_allowed() {
        let config = Config::new(".", "m").with_use_strict(true);
        let source = "'use strict';\ndefine('m', [], function () {});";
        assert_eq!(patched(&config, "m", source).content, source);
    }

    #[test]
    fn test_use_strict_argument_is_not_a_statement() {
        let source = "define('m', [], function () { log(\"use strict\"); });";
        assert_eq!(run("m", source), source);
    }

    #[test]
    fn test_non_amd_module_is_reported() {
        let result = patched(&Config::new(".", "foo"), "foo", "window.Foo = {};");
        assert!(!result.define_found);
        assert_eq!(result.content, "window.Foo = {};");

        let result = patched(&Config::new(".", "foo"), "foo", "x.define(function(){});");
        assert!(!result.define_found);
    }

    #[test]
    fn test_multibyte_text_before_define() {
        assert_eq!(
            run("ü", "// größe\ndefine(function () { return 'ñ'; });"),
            "// größe\ndefine('\\u00FC',[],function () { return 'ñ'; });"
        );
    }

    #[test]
    fn test_inserted_name_is_escaped() {
        assert_eq!(
            run("it's\\x", "define(function () {});"),
            "define('it\\'s\\\\x',[],function () {});"
        );
    }

    #[test]
    fn test_line_index_is_lazy() {
        let mut lines = LineIndex::new("a\nbc\ndef");
        assert_eq!(lines.offset(Position::new(1, 0)), 0);
        assert_eq!(lines.starts, [0]);
        assert_eq!(lines.offset(Position::new(2, 1)), 3);
        assert_eq!(lines.offset(Position::new(3, 2)), 7);
        assert_eq!(lines.offset(Position::new(9, 0)), 8);
    }
}
