use std::{hint::black_box, time::Duration};

use amdpack::{
    Config, Optimizer, analyze,
    js::{JsParser, SourceParser},
    resource::EmbeddedResourceLoader,
};
use criterion::{Criterion, criterion_group, criterion_main};

/// Layered application: every module of a layer depends on every module of
/// the layer below it.
fn synthetic_application(layers: usize, width: usize) -> EmbeddedResourceLoader {
    let mut loader = EmbeddedResourceLoader::new();
    for layer in 0..layers {
        for idx in 0..width {
            let deps: Vec<String> = if layer + 1 == layers {
                Vec::new()
            } else {
                (0..width)
                    .map(|dep| format!("'layer{}/m{dep}'", layer + 1))
                    .collect()
            };
            let content = format!(
                "/* layer {layer} */\ndefine([{}], function () {{\n  \"use strict\";\n  var \
                 value = {idx};\n  return {{ value: value, name: 'm{idx}' }};\n}});\n",
                deps.join(", ")
            );
            loader.insert(&format!("layer{layer}/m{idx}.js"), content);
        }
    }
    let entry: Vec<String> = (0..width).map(|idx| format!("'layer0/m{idx}'")).collect();
    loader.insert(
        "main.js",
        format!("require([{}], function () {{}});\n", entry.join(", ")),
    );
    loader
}

fn benchmark_bundling(c: &mut Criterion) {
    let mut group = c.benchmark_group("bundling");
    group.sample_size(20);
    group.measurement_time(Duration::from_secs(10));

    let loader = synthetic_application(8, 16);
    let config = Config::new(".", "main");

    group.bench_function("analyze", |b| {
        b.iter(|| analyze(black_box(&config), &loader, &JsParser).map(|graph| graph.len()));
    });

    for optimize in ["none", "white", "oxc"] {
        let config = Config::new(".", "main").with_optimize(optimize);
        group.bench_function(format!("optimize_{optimize}"), |b| {
            b.iter(|| {
                Optimizer::new(black_box(&config))
                    .optimize(&loader, &JsParser)
                    .map(|bundle| bundle.output.len())
            });
        });
    }

    group.finish();
}

fn benchmark_parse(c: &mut Criterion) {
    let source = "define(['a', 'b'], function (a, b) {\n  // comment\n  return a.x / b.y + \
                  /re/g.test(`t${a}`);\n});\n"
        .repeat(500);
    c.bench_function("parse", |b| {
        b.iter(|| JsParser.parse(black_box(&source), "bench").map(|events| events.len()));
    });
}

criterion_group!(benches, benchmark_bundling, benchmark_parse);
criterion_main!(benches);
