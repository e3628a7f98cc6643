//! Per-module content transformers
//!
//! The bundler runs a fixed chain over every module right before it is
//! written: caller supplied transformers first, then [`SemicolonAppender`],
//! then [`AmdTransformer`].

use std::fmt;

use log::debug;

use crate::{
    config::Config,
    error::Result,
    js::{SourceParser, escape_single_quoted},
    patcher::patch,
    resource::ResourceId,
};

pub trait Transformer {
    /// Whether this transformer handles the resource at all
    fn applies_to(&self, _id: &ResourceId) -> bool {
        true
    }

    fn transform(&self, config: &Config, name: &str, content: String) -> Result<String>;
}

/// Makes sure a non-empty module ends with `;` so concatenated modules cannot
/// run into each other.
#[derive(Debug, Clone, Copy, Default)]
pub struct SemicolonAppender;

impl Transformer for SemicolonAppender {
    fn transform(&self, _config: &Config, _name: &str, mut content: String) -> Result<String> {
        if content.trim_end().chars().last().is_some_and(|ch| ch != ';') {
            content.push(';');
        }
        Ok(content)
    }
}

/// Names anonymous modules and turns shimmed scripts into AMD modules.
pub struct AmdTransformer<'a> {
    parser: &'a dyn SourceParser,
}

impl fmt::Debug for AmdTransformer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmdTransformer").finish_non_exhaustive()
    }
}

impl<'a> AmdTransformer<'a> {
    pub fn new(parser: &'a dyn SourceParser) -> Self {
        Self { parser }
    }
}

impl Transformer for AmdTransformer<'_> {
    fn transform(&self, config: &Config, name: &str, content: String) -> Result<String> {
        if content.is_empty() {
            return Ok(content);
        }
        let patched = patch(config, name, &content, self.parser)?;
        let mut content = patched.content;
        if !patched.define_found {
            if let Some(shim) = config.shim_for(name) {
                debug!("Shimming: {name}");
                content.push_str(&shim.shim(name));
            }
        }
        Ok(content)
    }
}

/// Turns `text!` resources into modules returning the resource as a string,
/// or drops their content when text inlining is off.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextTransformer;

impl Transformer for TextTransformer {
    fn applies_to(&self, id: &ResourceId) -> bool {
        id.schema() == Some("text")
    }

    fn transform(&self, config: &Config, name: &str, content: String) -> Result<String> {
        if !config.inline_text {
            debug!("Dropping text resource: {name}");
            return Ok(String::new());
        }
        Ok(format!(
            "define([],function () {{ return '{}';}});\n",
            escape_single_quoted(&content)
        ))
    }
}
