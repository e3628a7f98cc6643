//! Bundle writer
//!
//! Modules are emitted dependency first, each exactly once, after running
//! through the transformer chain. The concatenated text then goes through the
//! configured minifier and, when `out` is set, replaces the destination file
//! atomically.

use std::{fmt, io::Write as _, path::Path, time::Instant};

use log::{debug, info};
use tempfile::NamedTempFile;

use crate::{
    config::Config,
    error::{AmdError, Result},
    graph::{ModuleGraph, analyze},
    js::SourceParser,
    minify::Minifiers,
    resource::ResourceLoader,
    transformer::{AmdTransformer, SemicolonAppender, Transformer},
};

/// Result of [`Optimizer::optimize`]
#[derive(Debug)]
pub struct Bundle {
    /// Resolved modules holding their transformed text
    pub graph: ModuleGraph,
    /// Minified bundle text
    pub output: String,
}

/// Builds bundles for one configuration.
pub struct Optimizer<'a> {
    config: &'a Config,
    transformers: Vec<Box<dyn Transformer + 'a>>,
    minifiers: Minifiers,
}

impl fmt::Debug for Optimizer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Optimizer")
            .field("config", &self.config)
            .field("transformers", &self.transformers.len())
            .field("minifiers", &self.minifiers)
            .finish()
    }
}

impl<'a> Optimizer<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            transformers: Vec::new(),
            minifiers: Minifiers::default(),
        }
    }

    /// Append a transformer that runs before the built-in ones.
    #[must_use]
    pub fn with_transformer(mut self, transformer: impl Transformer + 'a) -> Self {
        self.transformers.push(Box::new(transformer));
        self
    }

    #[must_use]
    pub fn with_minifiers(mut self, minifiers: Minifiers) -> Self {
        self.minifiers = minifiers;
        self
    }

    /// Resolve, transform and concatenate every module reachable from the
    /// entry module.
    pub fn optimize(
        &self,
        loader: &dyn ResourceLoader,
        parser: &dyn SourceParser,
    ) -> Result<Bundle> {
        let minifier = self.minifiers.get(&self.config.optimize)?;
        let mut graph = analyze(self.config, loader, parser)?;

        let start = Instant::now();
        let amd = AmdTransformer::new(parser);
        let chain: Vec<&dyn Transformer> = self
            .transformers
            .iter()
            .map(Box::as_ref)
            .chain([&SemicolonAppender as &dyn Transformer, &amd])
            .collect();

        let mut buffer = String::new();
        for id in graph.post_order() {
            let module = graph.module(id);
            let mut content = module.content.clone();
            for transformer in chain.iter().filter(|t| t.applies_to(&module.resource)) {
                content = transformer
                    .transform(self.config, &module.name, content)
                    .map_err(|err| err.within(&module.name))?;
            }
            debug!("Writing {}", module.resource);
            buffer.push('\n');
            buffer.push_str(&content);
            graph.set_content(id, content);
        }

        let output = minifier.minify(self.config, &buffer)?;
        if let Some(out) = &self.config.out {
            write_atomic(out, &output)?;
            info!("Bundle written to {}", out.display());
        }
        info!(
            "Optimized {} module(s) with '{}' in {:.2?}",
            graph.len(),
            minifier.name(),
            start.elapsed()
        );
        Ok(Bundle { graph, output })
    }
}

/// Replace `path` with `content` through a temporary file in the same
/// directory. Nothing is left behind when writing fails.
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(content.as_bytes())?;
    file.flush()?;
    file.persist(path).map_err(|err| AmdError::Io(err.error))?;
    Ok(())
}
