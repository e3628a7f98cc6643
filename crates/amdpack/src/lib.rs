//! AMD module bundler
//!
//! Resolves the dependency graph of an entry module, names every anonymous
//! `define`, wraps shimmed browser-globals scripts and concatenates the result
//! dependency first into a single script.

pub mod bundler;
pub mod collector;
pub mod config;
pub mod error;
pub mod graph;
pub mod js;
pub mod minify;
pub mod patcher;
pub mod resource;
pub mod shim;
pub mod transformer;

pub use bundler::{Bundle, Optimizer};
pub use config::Config;
pub use error::{AmdError, Result};
pub use graph::{Module, ModuleGraph, analyze};
