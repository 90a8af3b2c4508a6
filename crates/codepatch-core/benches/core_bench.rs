//! Criterion benchmarks for codepatch-core.
//!
//! ## Benchmark groups
//!
//! 1. **identifiers** — Instruction tokenizing and token estimation.
//! 2. **symbols** — Regex symbol extraction per language.
//! 3. **resolve** — File resolution over a synthetic index, cold and cached.
//! 4. **parse** — Model reply interpretation for the common reply shapes.
//! 5. **patch** — Function location and line numbering.
//!
//! ## Running
//!
//! ```sh
//! cargo bench -p codepatch-core
//! # Run only the resolver group:
//! cargo bench -p codepatch-core -- resolve
//! ```

use std::path::PathBuf;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use codepatch_core::config::{ParseContext, ResolveOptions};
use codepatch_core::indexer::pipeline::IndexSnapshot;
use codepatch_core::indexer::symbols::{extract_symbols, summarize};
use codepatch_core::models::FileRecord;
use codepatch_core::patch::function::find_function_in_code;
use codepatch_core::query::context::number_lines;
use codepatch_core::query::identifiers::extract_identifiers;
use codepatch_core::query::resolver::FileResolver;
use codepatch_core::query::tokenizer::estimate_tokens;
use codepatch_core::response::parser::parse_response;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn module_source(i: usize) -> String {
    format!(
        "import {{ shared }} from \"./shared\";\n\n\
export class Service{i} {{\n  run() {{\n    return shared({i});\n  }}\n}}\n\n\
export function handler{i}(input: string) {{\n  return input.length + {i};\n}}\n\n\
export const helper{i} = (x: number) => x * 2;\n"
    )
}

/// Snapshot with `n` TypeScript modules spread over a few directories.
fn synthetic_snapshot(n: usize) -> IndexSnapshot {
    let mut snapshot = IndexSnapshot {
        generation: 1,
        ..IndexSnapshot::default()
    };
    for i in 0..n {
        let rel = format!("src/area{}/module{i}.ts", i % 8);
        let source = module_source(i);
        let symbols = extract_symbols(&source, "typescript");
        let line_count = source.lines().count();
        let record = FileRecord {
            path: PathBuf::from(&rel),
            summary: summarize("typescript", &symbols, line_count),
            relative_path: rel,
            functions: symbols.functions,
            classes: symbols.classes,
            exports: symbols.exports,
            imports: symbols.imports,
            line_count,
            language: "typescript".to_string(),
            last_modified_ms: 0,
            content_hash: String::new(),
            size_bytes: source.len() as u64,
        };
        snapshot.records.insert(record.file_name(), record);
    }
    snapshot
}

const MULTI_FILE_REPLY: &str = "I updated both files.\n\n\
File: src/auth.ts (lines 3-5)\n```ts\nexport function login(user: User) {\n  return session.start(user);\n}\n```\n\n\
File: src/session.ts (lines 10-12)\n```ts\nexport function start(user: User) {\n  return new Session(user);\n}\n```\n";

const ALTERNATIVES_REPLY: &str = "Here is the fix.\n\nOption 1:\n```ts\nconst total = items.reduce((a, b) => a + b, 0);\n```\n\n\
Alternative 2\n```ts\nlet total = 0;\nfor (const item of items) {\n  total += item;\n}\n```\n\n\
The first version is shorter and avoids mutation.";

// ---------------------------------------------------------------------------
// 1. Identifiers
// ---------------------------------------------------------------------------

fn bench_identifiers(c: &mut Criterion) {
    let mut group = c.benchmark_group("identifiers");

    group.bench_function("extract_short_instruction", |b| {
        b.iter(|| extract_identifiers(black_box("fix the login handler in AuthService")));
    });

    group.bench_function("extract_with_filenames", |b| {
        b.iter(|| {
            extract_identifiers(black_box(
                "move parseConfig from src/config/loader.ts into utils.ts and update fetch_user_data",
            ))
        });
    });

    group.bench_function("estimate_tokens_1000_lines", |b| {
        let text = module_source(7).repeat(70);
        b.iter(|| estimate_tokens(black_box(&text)));
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// 2. Symbols
// ---------------------------------------------------------------------------

fn bench_symbols(c: &mut Criterion) {
    let mut group = c.benchmark_group("symbols");

    let ts = module_source(3).repeat(20);
    group.bench_function("typescript_module", |b| {
        b.iter(|| extract_symbols(black_box(&ts), "typescript"));
    });

    let py = "import os\n\nclass Loader:\n    def load(self, path):\n        return open(path).read()\n\nasync def fetch(url):\n    pass\n".repeat(20);
    group.bench_function("python_module", |b| {
        b.iter(|| extract_symbols(black_box(&py), "python"));
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// 3. Resolve
// ---------------------------------------------------------------------------

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");
    let options = ResolveOptions {
        enable_fuzzy_matching: true,
        ..ResolveOptions::default()
    };

    for size in [100usize, 1_000] {
        let snapshot = synthetic_snapshot(size);
        let resolver = FileResolver::new();

        group.bench_with_input(BenchmarkId::new("filename_uncached", size), &snapshot, |b, snap| {
            b.iter(|| resolver.resolve_uncached(snap, black_box("update module42.ts"), &options));
        });

        group.bench_with_input(BenchmarkId::new("symbol_and_fuzzy_uncached", size), &snapshot, |b, snap| {
            b.iter(|| resolver.resolve_uncached(snap, black_box("make Service42 retry handler7"), &options));
        });

        group.bench_with_input(BenchmarkId::new("cached", size), &snapshot, |b, snap| {
            b.iter(|| resolver.resolve(snap, black_box("make Service42 retry handler7"), &options));
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// 4. Parse
// ---------------------------------------------------------------------------

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    let context = ParseContext {
        expected_language: Some("typescript".to_string()),
        expect_multi_file: false,
        instruction: "fix the total".to_string(),
    };

    group.bench_function("multi_file_reply", |b| {
        b.iter(|| parse_response(black_box(MULTI_FILE_REPLY), &context));
    });

    group.bench_function("alternatives_reply", |b| {
        b.iter(|| parse_response(black_box(ALTERNATIVES_REPLY), &context));
    });

    group.bench_function("explanation_only_reply", |b| {
        b.iter(|| {
            parse_response(
                black_box("The function already handles empty input, so no change is needed here."),
                &context,
            )
        });
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// 5. Patch
// ---------------------------------------------------------------------------

fn bench_patch(c: &mut Criterion) {
    let mut group = c.benchmark_group("patch");
    let document = (0..200).map(module_source).collect::<String>();

    group.bench_function("find_function_late_in_file", |b| {
        b.iter(|| find_function_in_code(black_box(&document), black_box("handler190")));
    });

    group.bench_function("number_lines_2000", |b| {
        b.iter(|| number_lines(black_box(&document), 2000, 4));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_identifiers,
    bench_symbols,
    bench_resolve,
    bench_parse,
    bench_patch,
);
criterion_main!(benches);
