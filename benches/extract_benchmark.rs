//! Benchmarks for matching and deduplication.
//!
//! Run with: cargo bench
//!
//! Trees are built in memory, so these measure the matcher and the
//! fingerprinting without package I/O.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use solvex::model::{DocumentKind, DocumentTree, TreeBuilder};
use solvex::{deduplicate, ProposalMatcher};

/// A key/value table with `count` observation/proposal pairs.
fn key_value_tree(count: usize) -> DocumentTree {
    TreeBuilder::new(DocumentKind::Flow)
        .table(|t| {
            for i in 0..count {
                t.row(&[
                    "Observación".to_string(),
                    format!("Hallazgo {} sobre pólizas de seguro no integradas", i),
                ]);
                t.row(&[
                    "Propuesta de solventación".to_string(),
                    format!("Integrar las pólizas del expediente {}", i),
                ]);
            }
        })
        .build()
}

/// A column-layout sheet with `count` data rows.
fn column_tree(count: usize) -> DocumentTree {
    TreeBuilder::new(DocumentKind::Grid)
        .section("Cédula")
        .table(|t| {
            t.row(&["No.", "Observación", "Propuesta de solventación", "Responsable"]);
            for i in 0..count {
                t.row(&[
                    format!("{}.1", i + 1),
                    format!("Conciliación {} sin firma", i),
                    "Recabar firmas".to_string(),
                    "Tesorería".to_string(),
                ]);
            }
        })
        .build()
}

/// Paragraph layout with `count` records.
fn block_tree(count: usize) -> DocumentTree {
    let mut builder = TreeBuilder::new(DocumentKind::Flow);
    for i in 0..count {
        builder = builder
            .paragraph(&format!("Observación: faltan soportes del contrato {}", i))
            .paragraph("Se revisó el expediente completo.")
            .paragraph(&format!("Propuesta de solventación: anexar soportes {}", i));
    }
    builder.build()
}

fn bench_matcher(c: &mut Criterion) {
    let matcher = ProposalMatcher::default();
    let mut group = c.benchmark_group("matcher");

    for count in [10, 100, 500].iter() {
        let tree = key_value_tree(*count);
        group.bench_function(format!("key_value_{}", count), |b| {
            b.iter(|| matcher.extract(black_box(&tree)));
        });

        let tree = column_tree(*count);
        group.bench_function(format!("columns_{}", count), |b| {
            b.iter(|| matcher.extract(black_box(&tree)));
        });

        let tree = block_tree(*count);
        group.bench_function(format!("blocks_{}", count), |b| {
            b.iter(|| matcher.extract(black_box(&tree)));
        });
    }

    group.finish();
}

fn bench_dedup(c: &mut Criterion) {
    let matcher = ProposalMatcher::default();
    let mut records = matcher.extract(&key_value_tree(500)).records;
    records.extend(records.clone());

    c.bench_function("deduplicate_1000", |b| {
        b.iter(|| deduplicate(black_box(records.clone())));
    });
}

criterion_group!(benches, bench_matcher, bench_dedup);
criterion_main!(benches);
