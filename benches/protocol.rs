use criterion::{BenchmarkId, Criterion, Throughput};
use yao_sets::{msg::Operation, protocol::simulate};

pub fn protocol_benchmark(c: &mut Criterion) {
    let mut g = c.benchmark_group("protocol");
    for set_len in [4, 32] {
        let alice: Vec<u64> = (0..set_len).map(|v| v * 7).collect();
        let bob: Vec<u64> = (0..set_len).map(|v| v * 5).collect();
        g.throughput(Throughput::Elements(set_len));
        g.bench_function(BenchmarkId::new("sum", set_len), |b| {
            b.iter(|| simulate(Operation::Sum, &alice, &bob).expect("session failed"))
        });
        g.bench_function(BenchmarkId::new("compare", set_len), |b| {
            b.iter(|| simulate(Operation::Compare, &alice, &bob).expect("session failed"))
        });
    }
}
