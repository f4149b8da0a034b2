//! Signal emission benchmarks
//!
//! Measures dispatch cost as the number of connections on one signal grows.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use metatype::{signal, Builtin, Instance, TypeFlags, TypeInfo, Variant};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

fn bench_emit(c: &mut Criterion) {
    metatype::init();
    let ty = metatype::register(
        "bench.Emitter",
        Some(Builtin::Instance.ty()),
        TypeInfo::new().with_class_size(16).with_instance_size(16),
        TypeFlags::NONE,
    )
    .expect("register emitter type");
    signal::install(ty, "value", None, &[Builtin::Int.ty()]).expect("install signal");

    let mut group = c.benchmark_group("emit");
    for connections in [0usize, 1, 8, 64] {
        let emitter = Instance::create(ty).expect("emitter");
        let receiver = Instance::create(ty).expect("receiver");
        let total = Arc::new(AtomicU64::new(0));
        for _ in 0..connections {
            let total = total.clone();
            signal::connect(&emitter, "value", &receiver, move |args| {
                let value = args[1].as_int().unwrap_or(0);
                total.fetch_add(value as u64, Ordering::Relaxed);
                Ok(())
            })
            .expect("connect");
        }

        group.throughput(Throughput::Elements(connections.max(1) as u64));
        group.bench_with_input(
            BenchmarkId::new("connections", connections),
            &emitter,
            |b, emitter| {
                b.iter(|| signal::emit(emitter, "value", black_box(&[Variant::Int(1)])));
            },
        );

        let _ = emitter.destroy();
        let _ = receiver.destroy();
    }
    group.finish();
}

fn bench_connect(c: &mut Criterion) {
    metatype::init();
    let ty = metatype::register(
        "bench.Connector",
        Some(Builtin::Instance.ty()),
        TypeInfo::new().with_class_size(16).with_instance_size(16),
        TypeFlags::NONE,
    )
    .expect("register connector type");
    signal::install(ty, "ping", None, &[]).expect("install signal");
    let emitter = Instance::create(ty).expect("emitter");

    c.bench_function("connect_disconnect", |b| {
        b.iter(|| {
            signal::connect(&emitter, "ping", &emitter, |_| Ok(())).expect("connect");
            signal::disconnect(Some(&emitter), Some("ping"), None, None)
        });
    });

    let _ = emitter.destroy();
}

criterion_group!(benches, bench_emit, bench_connect);
criterion_main!(benches);
