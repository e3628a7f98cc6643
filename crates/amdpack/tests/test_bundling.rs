#![allow(clippy::disallowed_methods)]

use std::{fs, path::Path};

use amdpack::{
    AmdError, Config, Optimizer, analyze,
    js::JsParser,
    resource::FileResourceLoader,
    shim::Shim,
    transformer::TextTransformer,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const MAIN: &str = "define(['app/util', 'jquery', 'text!tpl/row.html', 'legacy'], function (util, \
                    $, row) {\n  return util.render(row);\n});\n";
const UTIL: &str = "define(['./helpers'], function (helpers) {\n  return { render: helpers.wrap \
                    };\n});\n";
const HELPERS: &str =
    "\"use strict\";\ndefine(function () {\n  return { wrap: function (s) { return s; } };\n});\n";

fn write(root: &Path, path: &str, content: &str) {
    let file = root.join(path);
    fs::create_dir_all(file.parent().unwrap()).unwrap();
    fs::write(file, content).unwrap();
}

/// A small application under `js/`
fn fixture() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write(root, "js/main.js", MAIN);
    write(root, "js/app/util.js", UTIL);
    write(root, "js/app/helpers.js", HELPERS);
    write(root, "js/tpl/row.html", "<li>{{name}}</li>\n");
    write(root, "js/text.js", "define({ load: function () {} });\n");
    write(root, "js/legacy.js", "window.Legacy = { version: 1 }\n");
    temp_dir
}

fn config() -> Config {
    Config::new("js", "main")
        .with_path("jquery", "empty:")
        .with_shim(
            "legacy",
            Shim::new().with_deps(["app/helpers"]).with_exports("Legacy"),
        )
}

#[test]
fn test_analyze_prints_dependency_tree() {
    let temp_dir = fixture();
    let loader = FileResourceLoader::new(temp_dir.path()).unwrap();

    let graph = analyze(&config(), &loader, &JsParser).unwrap();
    insta::assert_snapshot!(graph.to_string_tree().trim_end(), @r"
/js/main.js
   /js/app/util.js
      /js/app/helpers.js
   text!/js/tpl/row.html
      /js/text.js
   /js/legacy.js
      /js/app/helpers.js
");
    assert!(graph.cycles().is_empty());
}

#[test]
fn test_optimize_emits_modules_dependency_first() {
    let temp_dir = fixture();
    let loader = FileResourceLoader::new(temp_dir.path()).unwrap();

    let bundle = Optimizer::new(&config())
        .with_transformer(TextTransformer)
        .optimize(&loader, &JsParser)
        .unwrap();

    let expected: String = [
        "\ndefine('app/helpers',[],function () {\n  return { wrap: function (s) { return s; } \
         };\n});\n",
        "define('app/util',['./helpers'], function (helpers) {\n  return { render: helpers.wrap \
         };\n});\n",
        "define('text',[],{ load: function () {} });\n",
        "define('text!tpl/row.html',[],function () { return '<li>{{name}}</li>\\n';});\n",
        "window.Legacy = { version: 1 }\n;\ndefine(\"legacy\", [\"app/helpers\"], (function \
         (global) {\n    return function () {\n        var ret, fn;\n        return ret || \
         global.Legacy;\n    };\n}(this)));\n",
        "define('main',['app/util', 'jquery', 'text!tpl/row.html', 'legacy'], function (util, $, \
         row) {\n  return util.render(row);\n});\n",
    ]
    .iter()
    .map(|module| format!("\n{module}"))
    .collect();
    assert_eq!(bundle.output, expected);
    assert_eq!(bundle.graph.len(), 6);
}

#[test]
fn test_optimize_writes_out_file() {
    let temp_dir = fixture();
    let loader = FileResourceLoader::new(temp_dir.path()).unwrap();
    let out = temp_dir.path().join("dist/main.js");

    let config = config().with_out(&out).with_optimize("white");
    let bundle = Optimizer::new(&config)
        .with_transformer(TextTransformer)
        .optimize(&loader, &JsParser)
        .unwrap();

    let written = fs::read_to_string(&out).unwrap();
    assert_eq!(written, bundle.output);
    assert!(
        written.starts_with("define(\"app/helpers\",[],function(){return{wrap:function(s){"),
        "{written}"
    );
    assert!(!written.contains("use strict"));
}

#[test]
fn test_build_profile_drives_the_build() {
    let temp_dir = fixture();
    write(
        temp_dir.path(),
        "build.js",
        r"({
  baseUrl: 'js',
  name: 'main',
  paths: {
    jquery: 'empty:'
  },
  shim: {
    legacy: {
      deps: ['app/helpers'],
      exports: 'Legacy'
    }
  },
  inlineText: false,
  useStrict: true,
})",
    );

    let config = Config::load(&temp_dir.path().join("build.js")).unwrap();
    let loader = FileResourceLoader::new(temp_dir.path()).unwrap();
    let bundle = Optimizer::new(&config)
        .with_transformer(TextTransformer)
        .optimize(&loader, &JsParser)
        .unwrap();

    assert!(bundle.output.starts_with("\n\"use strict\";\ndefine('app/helpers',[],"));
    assert!(!bundle.output.contains("{{name}}"));
    assert!(bundle.output.contains("global.Legacy"));
}

#[test]
fn test_toml_profile() {
    let temp_dir = fixture();
    write(
        temp_dir.path(),
        "amdpack.toml",
        "baseUrl = \"js\"\nname = \"app/util\"\n",
    );

    let config = Config::load(&temp_dir.path().join("amdpack.toml")).unwrap();
    let loader = FileResourceLoader::new(temp_dir.path()).unwrap();
    let graph = analyze(&config, &loader, &JsParser).unwrap();
    insta::assert_snapshot!(graph.to_string_tree().trim_end(), @r"
/js/app/util.js
   /js/app/helpers.js
");
}

#[test]
fn test_missing_module_reports_full_chain() {
    let temp_dir = fixture();
    write(
        temp_dir.path(),
        "js/app/util.js",
        "define(['./helpers', './nope'], function () {});",
    );
    let loader = FileResourceLoader::new(temp_dir.path()).unwrap();

    let err = analyze(&config(), &loader, &JsParser).unwrap_err();
    assert!(matches!(err, AmdError::Build { .. }));
    assert_eq!(
        err.to_string(),
        "Execution of: main resulted in exception:\n main\n   app/util\n     app/nope\nResource \
         not found: /js/app/nope"
    );
}

#[test]
fn test_cyclic_application_terminates() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "a.js", "define(['b'], function (b) {});");
    write(temp_dir.path(), "b.js", "define(['c'], function (c) {});");
    write(temp_dir.path(), "c.js", "define(['a'], function (a) {});");
    let loader = FileResourceLoader::new(temp_dir.path()).unwrap();

    let config = Config::new(".", "a");
    let bundle = Optimizer::new(&config).optimize(&loader, &JsParser).unwrap();
    assert_eq!(
        bundle.output,
        "\ndefine('c',['a'], function (a) {});\ndefine('b',['c'], function (c) {});\ndefine('a',\
         ['b'], function (b) {});"
    );
    assert_eq!(bundle.graph.cycles().len(), 1);
}
