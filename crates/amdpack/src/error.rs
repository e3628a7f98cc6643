//! Error types for amdpack
//!
//! Every failure inside the module walker is funnelled into [`AmdError::Build`],
//! which carries the chain of module names from the entry module down to the
//! module that failed. Leaf errors (missing resources, parser failures, I/O)
//! stay available as the boxed `source`.

use std::fmt::Write as _;

use thiserror::Error;

/// Result type for amdpack operations.
pub type Result<T> = std::result::Result<T, AmdError>;

#[derive(Error, Debug)]
pub enum AmdError {
    /// No candidate for a dependency exists in the loader
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// A build profile could not be normalised or decoded
    #[error("{file}:{line}:{column}: {message}")]
    ConfigParse {
        file: String,
        line: usize,
        column: usize,
        message: String,
    },

    /// The requested minifier is not registered
    #[error("No minifier/optimizer found for: {0}")]
    UnknownStrategy(String),

    /// A required option is missing or malformed
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The parser collaborator rejected a module
    #[error("{name}:{line}:{column}: {message}")]
    Parse {
        name: String,
        line: usize,
        column: usize,
        message: String,
    },

    /// Failure while walking the module graph
    #[error("{}", render_chain(.path, .source))]
    Build {
        path: Vec<String>,
        source: Box<AmdError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AmdError {
    /// Record that this error happened while processing `module`.
    ///
    /// Build errors get the module prepended to their chain, anything else is
    /// wrapped in a new single-element chain.
    #[must_use]
    pub fn within(self, module: &str) -> Self {
        match self {
            Self::Build { path, source } => {
                let mut chain = Vec::with_capacity(path.len() + 1);
                chain.push(module.to_owned());
                chain.extend(path);
                Self::Build {
                    path: chain,
                    source,
                }
            }
            other => Self::Build {
                path: vec![module.to_owned()],
                source: Box::new(other),
            },
        }
    }

    /// Module chain from the entry module to the failing one; empty for
    /// errors raised outside the walker.
    pub fn module_path(&self) -> &[String] {
        match self {
            Self::Build { path, .. } => path,
            _ => &[],
        }
    }

    /// The innermost error, skipping any build chain wrappers.
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Build { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

fn render_chain(path: &[String], source: &AmdError) -> String {
    let mut message = String::new();
    if let Some(entry) = path.first() {
        let _ = writeln!(message, "Execution of: {entry} resulted in exception:");
    }
    for (depth, segment) in path.iter().enumerate() {
        let _ = writeln!(message, "{:indent$}{segment}", "", indent = depth * 2 + 1);
    }
    message.push_str(&source.to_string());
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_builds_chain_outermost_first() {
        let err = AmdError::ResourceNotFound("/c.js".into())
            .within("c")
            .within("b")
            .within("a");

        assert_eq!(err.module_path(), ["a", "b", "c"]);
        assert!(matches!(err.root_cause(), AmdError::ResourceNotFound(id) if id == "/c.js"));
    }

    #[test]
    fn test_build_error_renders_chain_then_cause() {
        let err = AmdError::ResourceNotFound("/missing".into())
            .within("lib")
            .within("main");

        assert_eq!(
            err.to_string(),
            "Execution of: main resulted in exception:\n main\n   lib\nResource not found: /missing"
        );
    }
}
