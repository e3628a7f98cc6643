#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    time::Instant,
};

use amdpack::{
    Config, Optimizer, analyze,
    config::PathValue,
    js::JsParser,
    resource::FileResourceLoader,
    transformer::TextTransformer,
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

/// Options written the requirejs way: `name=main`, `-name=main`,
/// `paths.jquery=empty:`
static REQUIREJS_OPTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^-?(name|baseUrl|out|optimize|findNestedDependencies|inlineText|useStrict|paths\.[^=]+)(=.*)?$",
    )
    .expect("option pattern is valid")
});

#[derive(Parser, Debug)]
#[command(name = "amdpack", author, version, about, long_about = None)]
struct Cli {
    /// Print debug output
    #[arg(short = 'X', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the dependency tree of a module
    Analyze(BuildArgs),
    /// Bundle a module and its dependencies into one script
    Optimize(BuildArgs),
}

#[derive(Args, Debug)]
struct BuildArgs {
    /// Build profile (.js, .json or .toml)
    profile: Option<PathBuf>,

    /// Entry module
    #[arg(long)]
    name: Option<String>,

    /// Directory module paths are relative to
    #[arg(long = "baseUrl")]
    base_url: Option<String>,

    /// Path mapping for a module, repeatable
    #[arg(long = "path", value_name = "ALIAS=PATH", value_parser = parse_path_mapping)]
    paths: Vec<(String, String)>,

    /// Follow require calls nested inside functions
    #[arg(long = "findNestedDependencies", num_args = 0..=1, default_missing_value = "true")]
    find_nested_dependencies: Option<bool>,

    /// Output file; the bundle goes to stdout without it
    #[arg(long)]
    out: Option<PathBuf>,

    /// Inline text! resources
    #[arg(long = "inlineText", num_args = 0..=1, default_missing_value = "true")]
    inline_text: Option<bool>,

    /// Keep "use strict" statements
    #[arg(long = "useStrict", num_args = 0..=1, default_missing_value = "true")]
    use_strict: Option<bool>,

    /// Minifier: none, white or oxc
    #[arg(long)]
    optimize: Option<String>,
}

fn parse_path_mapping(value: &str) -> Result<(String, String), String> {
    value
        .split_once('=')
        .filter(|(alias, _)| !alias.is_empty())
        .map(|(alias, path)| (alias.to_owned(), path.to_owned()))
        .ok_or_else(|| format!("expected ALIAS=PATH, found: {value}"))
}

/// Rewrite requirejs style options into long options.
fn normalize_args(args: impl IntoIterator<Item = String>) -> Vec<String> {
    args.into_iter()
        .enumerate()
        .map(|(idx, arg)| {
            if idx == 0 {
                return arg;
            }
            let Some(captures) = REQUIREJS_OPTION.captures(&arg) else {
                return arg;
            };
            let key = &captures[1];
            let value = captures.get(2).map_or("", |value| value.as_str());
            match key.strip_prefix("paths.") {
                Some(alias) => format!("--path={alias}{value}"),
                // A bare `name` is a profile path, not an option
                None if value.is_empty() && !arg.starts_with('-') => arg,
                None => format!("--{key}{value}"),
            }
        })
        .collect()
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn build_config(args: &BuildArgs) -> Result<Config> {
    let mut config = match &args.profile {
        Some(profile) => Config::load(profile)
            .with_context(|| format!("Failed to read build profile {}", profile.display()))?,
        None => Config::default(),
    };

    if let Some(name) = &args.name {
        config.name = Some(name.clone());
    }
    if let Some(base_url) = &args.base_url {
        config.base_url = Some(base_url.clone());
    }
    for (alias, path) in &args.paths {
        config
            .paths
            .insert(alias.clone(), PathValue::Single(path.clone()));
    }
    if let Some(find_nested_dependencies) = args.find_nested_dependencies {
        config.find_nested_dependencies = find_nested_dependencies;
    }
    if let Some(out) = &args.out {
        config.out = Some(out.clone());
    }
    if let Some(inline_text) = args.inline_text {
        config.inline_text = inline_text;
    }
    if let Some(use_strict) = args.use_strict {
        config.use_strict = use_strict;
    }
    if let Some(optimize) = &args.optimize {
        config.optimize.clone_from(optimize);
    }

    config.name()?;
    Ok(config)
}

/// Loader for `config.base_url()`: absolute base urls are looked up from the
/// filesystem root, relative ones from the working directory.
fn loader_for(config: &Config) -> Result<FileResourceLoader> {
    let loader = if Path::new(config.base_url()).is_absolute() {
        FileResourceLoader::new("/")?
    } else {
        FileResourceLoader::current_dir()?
    };
    Ok(loader)
}

fn run(command: Command) -> Result<()> {
    let start = Instant::now();
    match command {
        Command::Analyze(args) => {
            let config = build_config(&args)?;
            debug!("Options: {}", config.to_pretty_json());
            let loader = loader_for(&config)?;
            let graph = analyze(&config, &loader, &JsParser)
                .context("Failed to analyze module dependencies")?;
            print!("{}", graph.to_string_tree());
        }
        Command::Optimize(args) => {
            let config = build_config(&args)?;
            debug!("Options: {}", config.to_pretty_json());
            let loader = loader_for(&config)?;
            let bundle = Optimizer::new(&config)
                .with_transformer(TextTransformer)
                .optimize(&loader, &JsParser)
                .context("Failed to optimize bundle")?;
            match &config.out {
                Some(out) => {
                    print!("{}", bundle.graph.to_string_tree());
                    println!("Written to: {}", out.display());
                }
                None => {
                    eprint!("{}", bundle.graph.to_string_tree());
                    print!("{}", bundle.output);
                }
            }
        }
    }
    eprintln!("Total time: {:.2?}", start.elapsed());
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse_from(normalize_args(std::env::args()));
    init_logging(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn normalized(args: &[&str]) -> Vec<String> {
        normalize_args(args.iter().map(ToString::to_string))
    }

    #[test]
    fn test_requirejs_options_become_long_options() {
        assert_eq!(
            normalized(&[
                "amdpack",
                "optimize",
                "name=main",
                "-baseUrl=js",
                "paths.jquery=empty:",
                "-findNestedDependencies",
                "-X",
                "build.js",
            ]),
            [
                "amdpack",
                "optimize",
                "--name=main",
                "--baseUrl=js",
                "--path=jquery=empty:",
                "--findNestedDependencies",
                "-X",
                "build.js",
            ]
        );
    }

    #[test]
    fn test_profile_named_like_an_option_is_kept() {
        assert_eq!(normalized(&["amdpack", "analyze", "name"]), ["amdpack", "analyze", "name"]);
    }

    #[test]
    fn test_cli_options_override_profile() -> Result<()> {
        let cli = Cli::try_parse_from(normalized(&[
            "amdpack",
            "optimize",
            "name=app",
            "--path",
            "jquery=empty:",
            "-useStrict=true",
            "--inlineText=false",
            "--optimize",
            "white",
        ]))?;
        let Command::Optimize(args) = cli.command else {
            panic!("expected optimize");
        };
        let config = build_config(&args)?;
        assert_eq!(config.name()?, "app");
        assert!(config.is_excluded("jquery"));
        assert!(config.use_strict);
        assert!(!config.inline_text);
        assert_eq!(config.optimize, "white");
        Ok(())
    }

    #[test]
    fn test_name_is_required() -> Result<()> {
        let cli = Cli::try_parse_from(["amdpack", "analyze"])?;
        let Command::Analyze(args) = cli.command else {
            panic!("expected analyze");
        };
        assert!(build_config(&args).is_err());
        Ok(())
    }

    #[test]
    fn test_path_mapping_parser() {
        assert_eq!(
            parse_path_mapping("a=b=c"),
            Ok(("a".to_owned(), "b=c".to_owned()))
        );
        assert!(parse_path_mapping("=x").is_err());
        assert!(parse_path_mapping("nothing").is_err());
    }
}
