//! Resource identifiers and loaders
//!
//! A dependency string such as `text!templates/row.html` or `jquery` is turned
//! into a [`ResourceId`] relative to the configured `baseUrl`, then matched
//! against a [`ResourceLoader`] trying the `.js` filename fallback.

use std::{
    borrow::Cow,
    fmt,
    hash::{Hash, Hasher},
    path::{Path, PathBuf},
};

use log::{debug, trace};
use rustc_hash::FxHashMap;

use crate::error::{AmdError, Result};

/// Separator used inside resource identifiers, independent of the host OS.
const SEPARATOR: char = '/';

/// Suffix tried when a dependency is written without a filename extension.
const JS_EXTENSION: &str = ".js";

/// Canonical identifier of a loadable resource.
///
/// Identity (`Eq`/`Hash`) only looks at the normalised `(base_url, path)`
/// pair; the plugin schema is carried along for loaders and transformers.
#[derive(Debug, Clone)]
pub struct ResourceId {
    schema: Option<String>,
    base_url: String,
    path: String,
}

impl ResourceId {
    /// Build an identifier from a base url and a dependency path that may
    /// carry a `plugin!` prefix.
    ///
    /// The base url always ends up wrapped in single separators (`.` means the
    /// root) and a leading separator on the path is dropped.
    pub fn new(base_url: &str, path: &str) -> Self {
        let (schema, path) = split_schema(path);
        Self {
            schema: schema.map(str::to_owned),
            base_url: normalize_base_url(base_url),
            path: path.trim_start_matches(SEPARATOR).to_owned(),
        }
    }

    /// Plugin name without the trailing `!`
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// `base_url` and `path` joined, without the schema.
    pub fn full_path(&self) -> String {
        format!("{}{}", self.base_url, self.path)
    }

    /// Whether the last path segment has a filename extension.
    pub fn has_extension(&self) -> bool {
        Path::new(&self.path).extension().is_some()
    }

    /// Same identifier with `suffix` appended to its path.
    #[must_use]
    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self {
            schema: self.schema.clone(),
            base_url: self.base_url.clone(),
            path: format!("{}{suffix}", self.path),
        }
    }
}

impl PartialEq for ResourceId {
    fn eq(&self, other: &Self) -> bool {
        self.base_url == other.base_url && self.path == other.path
    }
}

impl Eq for ResourceId {}

impl Hash for ResourceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.base_url.hash(state);
        self.path.hash(state);
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(schema) = &self.schema {
            write!(f, "{schema}!")?;
        }
        write!(f, "{}{}", self.base_url, self.path)
    }
}

/// Split a leading `schema!` prefix. The `!` must come before any separator,
/// otherwise it is part of a file name.
pub fn split_schema(path: &str) -> (Option<&str>, &str) {
    match path.find('!') {
        Some(idx) if idx > 0 && !path[..idx].contains(SEPARATOR) => {
            (Some(&path[..idx]), &path[idx + 1..])
        }
        _ => (None, path),
    }
}

fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim_matches(SEPARATOR);
    if trimmed.is_empty() || trimmed == "." {
        return SEPARATOR.to_string();
    }
    let trimmed = trimmed.strip_prefix("./").unwrap_or(trimmed);
    format!("{SEPARATOR}{trimmed}{SEPARATOR}")
}

/// Source of module content.
pub trait ResourceLoader {
    /// Whether `id` can be loaded.
    fn exists(&self, id: &ResourceId) -> Result<bool>;

    /// Load the text behind `id`, failing with [`AmdError::ResourceNotFound`]
    /// when it is absent.
    fn load(&self, id: &ResourceId) -> Result<String>;
}

/// Pick the existing variant of `id`, trying `<path>.js` first when the path
/// has no extension and last otherwise.
pub fn resolve_existing(loader: &dyn ResourceLoader, id: &ResourceId) -> Result<ResourceId> {
    let alternative = id.with_suffix(JS_EXTENSION);
    let candidates = if id.has_extension() {
        [id.clone(), alternative]
    } else {
        [alternative, id.clone()]
    };

    for candidate in candidates {
        trace!("Probing {candidate}");
        if loader.exists(&candidate)? {
            return Ok(candidate);
        }
    }
    Err(AmdError::ResourceNotFound(id.to_string()))
}

/// Loads resources from a directory on disk.
#[derive(Debug, Clone)]
pub struct FileResourceLoader {
    base_dir: PathBuf,
}

impl FileResourceLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        if !base_dir.is_dir() {
            return Err(AmdError::InvalidConfig(format!(
                "Directory not found: {}",
                base_dir.display()
            )));
        }
        debug!("Loading resources from {}", base_dir.display());
        Ok(Self { base_dir })
    }

    /// Loader rooted at the current working directory
    pub fn current_dir() -> Result<Self> {
        Self::new(std::env::current_dir()?)
    }

    fn to_file(&self, id: &ResourceId) -> PathBuf {
        id.full_path()
            .split(SEPARATOR)
            .filter(|segment| !segment.is_empty())
            .fold(self.base_dir.clone(), |path, segment| path.join(segment))
    }
}

impl ResourceLoader for FileResourceLoader {
    fn exists(&self, id: &ResourceId) -> Result<bool> {
        Ok(self.to_file(id).is_file())
    }

    fn load(&self, id: &ResourceId) -> Result<String> {
        let file = self.to_file(id);
        match std::fs::read_to_string(&file) {
            Ok(content) => Ok(content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(AmdError::ResourceNotFound(id.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Resources bundled into the binary or registered in memory, keyed by their
/// full path (`/lib/jquery.js`).
#[derive(Debug, Clone, Default)]
pub struct EmbeddedResourceLoader {
    resources: FxHashMap<String, Cow<'static, str>>,
}

impl EmbeddedResourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `content` under `path`; a missing leading `/` is added.
    #[must_use]
    pub fn with(mut self, path: &str, content: impl Into<Cow<'static, str>>) -> Self {
        self.insert(path, content);
        self
    }

    pub fn insert(&mut self, path: &str, content: impl Into<Cow<'static, str>>) {
        let key = format!("{SEPARATOR}{}", path.trim_start_matches(SEPARATOR));
        self.resources.insert(key, content.into());
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl ResourceLoader for EmbeddedResourceLoader {
    fn exists(&self, id: &ResourceId) -> Result<bool> {
        Ok(self.resources.contains_key(&id.full_path()))
    }

    fn load(&self, id: &ResourceId) -> Result<String> {
        self.resources
            .get(&id.full_path())
            .map(|content| content.clone().into_owned())
            .ok_or_else(|| AmdError::ResourceNotFound(id.to_string()))
    }
}
