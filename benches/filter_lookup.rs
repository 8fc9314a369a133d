//! Hot-path lookup benchmarks
//!
//! Measures `match_address` cost on stores of increasing size. The call
//! interceptor performs one lookup per traced function entry, so this is
//! the latency that bounds tracing overhead.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use trazar::{FilterSession, HostProbes, Symbol, SymbolTable, SymbolTables};

fn build_session(num_symbols: u64) -> FilterSession {
    let syms = (0..num_symbols)
        .map(|i| Symbol::new(0x1000 + i * 0x100, 0x100, format!("func_{i:05}")))
        .collect();

    let stabs = SymbolTables {
        filename: "/bin/bench".to_string(),
        symtab: SymbolTable::new(syms),
        dsymtab: SymbolTable::default(),
        maps: Vec::new(),
    };

    let mut sess = FilterSession::with_probes(HostProbes::fixed(false, false));
    let mut mode = None;
    sess.setup_filter("func_.*@depth=3", &stabs, &mut mode);
    assert_eq!(sess.store().len() as u64, num_symbols);
    sess
}

fn bench_match_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_address_hit");

    for size in [16u64, 256, 4096] {
        let sess = build_session(size);
        let ip = 0x1000 + (size / 2) * 0x100 + 0x40;

        group.bench_with_input(BenchmarkId::from_parameter(size), &ip, |b, &ip| {
            b.iter(|| black_box(sess.match_address(black_box(ip))));
        });
    }

    group.finish();
}

fn bench_match_miss(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_address_miss");

    for size in [16u64, 256, 4096] {
        let sess = build_session(size);
        // below the first interval
        let ip = 0x10u64;

        group.bench_with_input(BenchmarkId::from_parameter(size), &ip, |b, &ip| {
            b.iter(|| black_box(sess.match_address(black_box(ip))));
        });
    }

    group.finish();
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("setup_filter");
    group.sample_size(30);

    group.bench_function("regex_4096_symbols", |b| {
        b.iter(|| black_box(build_session(4096)));
    });

    group.finish();
}

criterion_group!(benches, bench_match_hit, bench_match_miss, bench_build);
criterion_main!(benches);
