//! Bundle minifiers and their registry

use std::fmt;

use indexmap::IndexMap;
use log::debug;
use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_minifier::{Minifier as Compressor, MinifierOptions};

use crate::{
    config::Config,
    error::{AmdError, Result},
    js::parse_script,
};

/// Post-processing step applied to the whole bundle.
pub trait Minifier {
    /// Registry key, matched case-insensitively
    fn name(&self) -> &str;

    fn minify(&self, config: &Config, content: &str) -> Result<String>;
}

/// Leaves the bundle untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct NoneMinifier;

impl Minifier for NoneMinifier {
    fn name(&self) -> &'static str {
        "none"
    }

    fn minify(&self, _config: &Config, content: &str) -> Result<String> {
        Ok(content.to_owned())
    }
}

/// Reprints the bundle without comments and insignificant whitespace.
///
/// Identifiers and statements are left as written.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhiteMinifier;

impl Minifier for WhiteMinifier {
    fn name(&self) -> &'static str {
        "white"
    }

    fn minify(&self, _config: &Config, content: &str) -> Result<String> {
        let allocator = Allocator::default();
        let program = parse_script(&allocator, content, BUNDLE)?;
        let code = Codegen::new()
            .with_options(CodegenOptions::minify())
            .build(&program)
            .code;
        Ok(finish(content, code))
    }
}

/// Compresses the bundle and mangles local names.
///
/// Globals such as `define` keep their names, so every module stays
/// registered under the name the patcher gave it.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptimizingMinifier;

impl Minifier for OptimizingMinifier {
    fn name(&self) -> &'static str {
        "oxc"
    }

    fn minify(&self, _config: &Config, content: &str) -> Result<String> {
        let allocator = Allocator::default();
        let mut program = parse_script(&allocator, content, BUNDLE)?;
        let ret = Compressor::new(MinifierOptions::default()).minify(&allocator, &mut program);
        let code = Codegen::new()
            .with_options(CodegenOptions::minify())
            .with_scoping(ret.scoping)
            .build(&program)
            .code;
        Ok(finish(content, code))
    }
}

/// Name used in parse errors raised while minifying
const BUNDLE: &str = "bundle";

/// Keep the bundle's trailing newline, if it had one.
fn finish(content: &str, code: String) -> String {
    let mut out = code.trim_end().to_owned();
    if content.ends_with('\n') && !out.is_empty() {
        out.push('\n');
    }
    debug!("Minified {} bytes to {}", content.len(), out.len());
    out
}

/// Named minification strategies available to a build.
pub struct Minifiers {
    strategies: IndexMap<String, Box<dyn Minifier>>,
}

impl fmt::Debug for Minifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.strategies.keys()).finish()
    }
}

impl Default for Minifiers {
    fn default() -> Self {
        let mut minifiers = Self::empty();
        minifiers.register(Box::new(NoneMinifier));
        minifiers.register(Box::new(WhiteMinifier));
        minifiers.register(Box::new(OptimizingMinifier));
        minifiers
    }
}

impl Minifiers {
    /// Registry with no strategies at all
    pub fn empty() -> Self {
        Self {
            strategies: IndexMap::new(),
        }
    }

    /// Add or replace a strategy.
    pub fn register(&mut self, minifier: Box<dyn Minifier>) {
        let key = minifier.name().to_lowercase();
        debug!("Registering minifier: {key}");
        self.strategies.insert(key, minifier);
    }

    pub fn get(&self, name: &str) -> Result<&dyn Minifier> {
        self.strategies
            .get(&name.to_lowercase())
            .map(Box::as_ref)
            .ok_or_else(|| AmdError::UnknownStrategy(name.to_owned()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.strategies.keys().map(String::as_str)
    }
}
