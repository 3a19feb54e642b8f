use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use vmci_engine::{ProfilingInfo, RuntimeOptions, VmBoundary, VmciRuntime};
use vmci_sdk::MemoryVm;

const BLOCK: u16 = 16;

/// A method whose profile repeats a branch, a receiver check, a counter and
/// a switch once per block
fn profiled_method(blocks: u16) -> (Arc<MemoryVm>, Arc<VmciRuntime>, u64) {
    let vm = Arc::new(MemoryVm::new());
    let a = vm.klass("bench/A").build().unwrap();
    let b = vm.klass("bench/B").build().unwrap();

    let mut cp = vm.constant_pool();
    let name = cp.utf8("hot");
    let signature = cp.utf8("()V");
    let pool = cp.build().unwrap();
    vm.klass("bench/Holder").constant_pool(pool).build().unwrap();
    let method = vm
        .method(pool)
        .name_and_signature(name, signature)
        .code(&vec![0u8; usize::from(blocks) * usize::from(BLOCK)])
        .build().unwrap();

    let mut builder = vm.method_data(method);
    for block in 0..u64::from(blocks) {
        let base = block as u16 * BLOCK;
        builder
            .branch(base, block + 1, 3)
            .receiver_type(base + 4, 0, 0, 1, &[(a, block + 10), (b, 5)])
            .counter(base + 8, block)
            .multi_branch(base + 12, 1, &[block, 2, 3]);
    }
    builder.build().unwrap();

    let boundary: Arc<dyn VmBoundary> = vm.clone();
    let runtime = VmciRuntime::new(boundary, RuntimeOptions::default()).unwrap();
    (vm, runtime, method)
}

fn profile(runtime: &Arc<VmciRuntime>, method: u64) -> ProfilingInfo {
    runtime
        .resolve_method(method)
        .unwrap()
        .profiling_info()
        .unwrap()
}

fn bench_record_walk(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_walk");

    for blocks in [8u16, 64, 256] {
        let (_vm, runtime, method) = profiled_method(blocks);
        let info = profile(&runtime, method);
        group.bench_with_input(BenchmarkId::new("normal_records", blocks), &info, |b, info| {
            b.iter(|| {
                let data = info.method_data().unwrap();
                black_box(data.normal_records().unwrap().len())
            });
        });
    }

    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let (_vm, runtime, method) = profiled_method(64);
    let info = profile(&runtime, method);
    let last = 63 * BLOCK;

    c.bench_function("branch_taken_probability_last", |b| {
        b.iter(|| info.branch_taken_probability(black_box(last)).unwrap());
    });

    c.bench_function("type_profile_last", |b| {
        b.iter(|| info.type_profile(black_box(last + 4)).unwrap());
    });

    c.bench_function("switch_probabilities_last", |b| {
        b.iter(|| info.switch_probabilities(black_box(last + 12)).unwrap());
    });

    c.bench_function("exception_seen_missing", |b| {
        b.iter(|| info.exception_seen(black_box(last + 2)).unwrap());
    });
}

fn bench_profile_load(c: &mut Criterion) {
    let (_vm, runtime, method) = profiled_method(64);

    c.bench_function("profiling_info_load", |b| {
        b.iter(|| profile(&runtime, black_box(method)));
    });
}

criterion_group!(benches, bench_record_walk, bench_queries, bench_profile_load);
criterion_main!(benches);
