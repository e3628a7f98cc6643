//! Module dependency graph and the resolver that builds it
//!
//! [`analyze`] walks from the entry module depth first. Every resource is
//! registered before its dependencies are expanded, so a module that is
//! reached again (through a cycle or a second alias) resolves to the existing
//! node instead of being loaded twice.

use std::{fmt::Write as _, time::Instant};

use indexmap::IndexSet;
use log::{debug, info, warn};
use petgraph::{algo::tarjan_scc, graph::DiGraph};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    collector,
    config::{Config, EMPTY},
    error::{AmdError, Result},
    js::SourceParser,
    resource::{ResourceId, ResourceLoader, resolve_existing, split_schema},
};

/// Indentation per tree level in [`ModuleGraph::to_string_tree`]
const TREE_INDENT: usize = 3;

/// Unique identifier for a module within one graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u32);

impl ModuleId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub struct Module {
    pub id: ModuleId,
    /// Logical name the module was first reached by
    pub name: String,
    pub resource: ResourceId,
    /// Source text as loaded; in a [`crate::bundler::Bundle`] the text as
    /// written to the bundle
    pub content: String,
    /// Raw dependency strings in declaration order
    pub dependencies: IndexSet<String>,
    /// Resolved dependencies in declaration order; excluded ones are absent
    edges: IndexSet<ModuleId>,
}

/// Resolved modules of one build, rooted at the entry module.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    modules: Vec<Module>,
    registry: FxHashMap<ResourceId, ModuleId>,
    root: Option<ModuleId>,
}

impl ModuleGraph {
    /// Entry module; `None` when the entry itself is excluded
    pub fn root(&self) -> Option<&Module> {
        self.root.map(|id| &self.modules[id.index()])
    }

    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.index()]
    }

    /// Replace the text of `id`, used once the module has been transformed.
    pub(crate) fn set_content(&mut self, id: ModuleId, content: String) {
        self.modules[id.index()].content = content;
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Direct dependencies of `id`
    pub fn dependencies(&self, id: ModuleId) -> impl Iterator<Item = &Module> {
        self.modules[id.index()]
            .edges
            .iter()
            .map(|&dep| self.module(dep))
    }

    /// Every module reachable from `id` in pre-order, `id` included, each
    /// listed once.
    pub fn transitive_dependencies(&self, id: ModuleId) -> Vec<&Module> {
        let mut seen = FxHashSet::default();
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            order.push(self.module(current));
            stack.extend(self.modules[current.index()].edges.iter().rev());
        }
        order
    }

    /// Modules in dependency-first order starting from the root: every module
    /// appears after all of its dependencies, except where a cycle makes that
    /// impossible.
    pub fn post_order(&self) -> Vec<ModuleId> {
        let mut visited = FxHashSet::default();
        let mut order = Vec::with_capacity(self.modules.len());
        if let Some(root) = self.root {
            self.post_order_from(root, &mut visited, &mut order);
        }
        order
    }

    fn post_order_from(
        &self,
        id: ModuleId,
        visited: &mut FxHashSet<ModuleId>,
        order: &mut Vec<ModuleId>,
    ) {
        if !visited.insert(id) {
            return;
        }
        for &dependency in &self.modules[id.index()].edges {
            self.post_order_from(dependency, visited, order);
        }
        order.push(id);
    }

    /// Indented listing of resources below the root. A subtree is expanded
    /// the first time it is reached only.
    pub fn to_string_tree(&self) -> String {
        let mut buffer = String::new();
        if let Some(root) = self.root {
            let mut expanded = FxHashSet::default();
            self.write_tree(root, 0, &mut expanded, &mut buffer);
        }
        buffer
    }

    fn write_tree(
        &self,
        id: ModuleId,
        level: usize,
        expanded: &mut FxHashSet<ModuleId>,
        buffer: &mut String,
    ) {
        let module = self.module(id);
        let _ = writeln!(buffer, "{:level$}{}", "", module.resource);
        if !expanded.insert(id) {
            return;
        }
        for &dependency in &module.edges {
            self.write_tree(dependency, level + TREE_INDENT, expanded, buffer);
        }
    }

    /// Groups of modules that depend on each other, including modules that
    /// depend on themselves.
    pub fn cycles(&self) -> Vec<Vec<&Module>> {
        let mut graph = DiGraph::<ModuleId, ()>::with_capacity(self.modules.len(), 0);
        let nodes: Vec<_> = self.modules.iter().map(|m| graph.add_node(m.id)).collect();
        for module in &self.modules {
            for dependency in &module.edges {
                graph.add_edge(nodes[module.id.index()], nodes[dependency.index()], ());
            }
        }

        tarjan_scc(&graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component
                        .first()
                        .is_some_and(|&node| graph.contains_edge(node, node))
            })
            .map(|component| {
                let mut modules: Vec<_> =
                    component.into_iter().map(|node| self.module(graph[node])).collect();
                modules.sort_by_key(|module| module.id);
                modules
            })
            .collect()
    }

    fn register(&mut self, name: &str, resource: ResourceId, content: String) -> ModuleId {
        let id = ModuleId(self.modules.len() as u32);
        self.registry.insert(resource.clone(), id);
        self.modules.push(Module {
            id,
            name: name.to_owned(),
            resource,
            content,
            dependencies: IndexSet::new(),
            edges: IndexSet::new(),
        });
        id
    }
}

/// Resolve the dependency graph of `config.name`.
pub fn analyze(
    config: &Config,
    loader: &dyn ResourceLoader,
    parser: &dyn SourceParser,
) -> Result<ModuleGraph> {
    let name = config.name()?;
    let start = Instant::now();
    debug!("Tracing dependencies for: {name}");

    let mut graph = ModuleGraph::default();
    let walker = Walker {
        config,
        loader,
        parser,
    };
    graph.root = walker.walk(&mut graph, name, name)?;

    for cycle in graph.cycles() {
        let names: Vec<_> = cycle.iter().map(|module| module.name.as_str()).collect();
        warn!("Circular dependency detected: {}", names.join(" -> "));
    }
    info!(
        "Resolved {} module(s) for {name} in {:.2?}",
        graph.len(),
        start.elapsed()
    );
    Ok(graph)
}

struct Walker<'a> {
    config: &'a Config,
    loader: &'a dyn ResourceLoader,
    parser: &'a dyn SourceParser,
}

impl Walker<'_> {
    /// Resolve the module reached as `path` under the logical name `name`.
    fn walk(&self, graph: &mut ModuleGraph, path: &str, name: &str) -> Result<Option<ModuleId>> {
        self.visit(graph, path, name).map_err(|err| err.within(name))
    }

    fn visit(&self, graph: &mut ModuleGraph, path: &str, name: &str) -> Result<Option<ModuleId>> {
        let candidates = self.config.path_candidates(path);
        if candidates.first() == Some(&EMPTY) {
            debug!("skipped: {path}");
            return Ok(None);
        }

        let (resolved_path, resource) = self.locate(&candidates)?;
        if let Some(&existing) = graph.registry.get(&resource) {
            debug!("included already: {path}");
            return Ok(Some(existing));
        }

        let content = self.loader.load(&resource)?;
        let dependencies =
            collector::collect(self.config, name, &resource, &content, self.parser)?;
        debug!("{resource}");
        let id = graph.register(name, resource, content);
        graph.modules[id.index()].dependencies.clone_from(&dependencies);

        for dependency in &dependencies {
            let dependency_name = relative_to(name, dependency);
            let dependency_path = relative_to(resolved_path, dependency);
            if let Some(child) = self.walk(graph, &dependency_path, &dependency_name)? {
                graph.modules[id.index()].edges.insert(child);
            }
        }
        Ok(Some(id))
    }

    /// First candidate location that exists, with its resource identifier
    fn locate<'p>(&self, candidates: &[&'p str]) -> Result<(&'p str, ResourceId)> {
        let base_url = self.config.base_url();
        let mut first_error = None;
        for &candidate in candidates {
            match resolve_existing(self.loader, &ResourceId::new(base_url, candidate)) {
                Ok(resource) => return Ok((candidate, resource)),
                Err(err @ AmdError::ResourceNotFound(_)) => {
                    debug!("Falling back from {candidate}");
                    first_error.get_or_insert(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(first_error
            .unwrap_or_else(|| AmdError::ResourceNotFound(candidates.join(", "))))
    }
}

/// Rewrite a `./` or `../` dependency against the directory of `referrer`.
/// Plugin prefixes on the referrer are ignored and the dependency keeps its
/// own.
pub fn relative_to(referrer: &str, dependency: &str) -> String {
    let (schema, path) = split_schema(dependency);
    if !(path.starts_with("./") || path.starts_with("../")) {
        return dependency.to_owned();
    }

    let (_, referrer_path) = split_schema(referrer);
    let mut segments: Vec<&str> = referrer_path.split('/').collect();
    segments.pop();
    for segment in path.split('/') {
        match segment {
            "." => {}
            ".." if segments.last().is_some_and(|last| *last != "..") => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    let joined = segments.join("/");
    match schema {
        Some(schema) => format!("{schema}!{joined}"),
        None => joined,
    }
}
