//! Static dependency discovery for a single module

use indexmap::IndexSet;
use log::trace;

use crate::{
    config::Config,
    error::Result,
    js::{Callee, ParseEvent, SourceParser},
    resource::ResourceId,
};

/// Collect the raw dependency strings of the module `name` stored at `id`.
///
/// The plugin schema comes first, then every array literal passed to a
/// `define` call and to top level `require` calls (any `require` call with
/// `findNestedDependencies`), then shim dependencies. Plugin resources are
/// not scripts and are never scanned. First occurrence wins.
pub fn collect(
    config: &Config,
    name: &str,
    id: &ResourceId,
    content: &str,
    parser: &dyn SourceParser,
) -> Result<IndexSet<String>> {
    let mut dependencies = IndexSet::new();

    if let Some(schema) = id.schema() {
        dependencies.insert(schema.to_owned());
    } else {
        for event in parser.parse(content, name)? {
            let ParseEvent::Call(call) = event else {
                continue;
            };
            let wanted = match call.callee {
                Callee::Define => true,
                Callee::Require => {
                    config.find_nested_dependencies || call.top_level
                }
            };
            if !wanted {
                trace!("{name}: ignoring nested require at {:?}", call.position);
                continue;
            }
            if let Some(elements) = call.dependency_array() {
                dependencies.extend(elements.iter().cloned());
            }
        }
    }

    if let Some(shim) = config.shim_for(name) {
        dependencies.extend(shim.dependencies().map(str::to_owned));
    }
    Ok(dependencies)
}
