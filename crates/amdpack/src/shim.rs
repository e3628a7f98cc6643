//! Shim configuration and the synthetic `define` wrapper for non-AMD scripts

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// How to expose a "browser globals" script as an AMD module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ShimValue")]
pub struct Shim {
    /// Modules the script needs loaded first
    pub deps: Option<IndexSet<String>>,
    /// Global variable holding the module value
    pub exports: Option<String>,
    /// Source text of a function called with the dependencies; treated as
    /// opaque text
    pub init: Option<String>,
}

/// Accepted shapes of a shim entry: the full object or the short form
/// listing only dependencies.
#[derive(Deserialize)]
#[serde(untagged)]
enum ShimValue {
    Deps(Vec<String>),
    Full {
        #[serde(default)]
        deps: Option<Vec<String>>,
        #[serde(default)]
        exports: Option<String>,
        #[serde(default)]
        init: Option<String>,
    },
}

impl From<ShimValue> for Shim {
    fn from(value: ShimValue) -> Self {
        match value {
            ShimValue::Deps(deps) => Self {
                deps: Some(deps.into_iter().collect()),
                ..Self::default()
            },
            ShimValue::Full {
                deps,
                exports,
                init,
            } => Self {
                deps: deps.map(|deps| deps.into_iter().collect()),
                exports,
                init,
            },
        }
    }
}

impl Shim {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_deps<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deps = Some(deps.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_exports(mut self, exports: impl Into<String>) -> Self {
        self.exports = Some(exports.into());
        self
    }

    #[must_use]
    pub fn with_init(mut self, init: impl Into<String>) -> Self {
        self.init = Some(init.into());
        self
    }

    /// Declared dependencies in declaration order
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.deps.iter().flatten().map(String::as_str)
    }

    /// Render the `define` call that turns the script named `name` into an
    /// AMD module. The text is meant to be appended after the script body.
    pub fn shim(&self, name: &str) -> String {
        let name = string_literal(name);
        if self.exports.is_none() && self.init.is_none() {
            return format!("\ndefine({name}, function(){{}});\n");
        }

        let mut buffer = format!(
            "\ndefine({name}, {}, (function (global) {{\n",
            self.deps_to_string()
        );
        buffer.push_str("    return function () {\n");
        buffer.push_str("        var ret, fn;\n");
        if let Some(init) = &self.init {
            buffer.push_str(&format!("fn = {init};\n"));
            buffer.push_str("        ret = fn.apply(global, arguments);\n");
        }
        match &self.exports {
            Some(exports) => buffer.push_str(&format!("        return ret || global.{exports};\n")),
            None => buffer.push_str("        return ret;\n"),
        }
        buffer.push_str("    };\n");
        buffer.push_str("}(this)));\n");
        buffer
    }

    fn deps_to_string(&self) -> String {
        let deps: Vec<_> = self.dependencies().map(string_literal).collect();
        format!("[{}]", deps.join(", "))
    }
}

/// Double quoted JavaScript string literal for `value`
fn string_literal(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}
