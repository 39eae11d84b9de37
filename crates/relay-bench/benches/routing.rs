//! Router benchmarks over a counting transport.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use relay_bench::{populate, CountingTransport};
use relay_core::{IdentityGenerator, Router};
use relay_protocol::Envelope;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

/// Addressed delivery to one recipient.
fn bench_addressed(c: &mut Criterion) {
    let rt = runtime();
    let router = Router::new();
    let transport = CountingTransport::new();
    let users = populate(&router, &transport, 1000);
    let payload =
        relay_protocol::encode(&Envelope::direct(users[0].as_str(), users[999].as_str(), "hi"))
            .unwrap();

    c.bench_function("route/addressed", |b| {
        b.iter(|| rt.block_on(router.route(&transport, black_box(payload.clone()))))
    });
}

/// Room delivery for growing rooms.
fn bench_room_fanout(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("route/room");

    for size in [10, 100, 1000] {
        let router = Router::new();
        let transport = CountingTransport::new();
        let users = populate(&router, &transport, size);
        for user in &users {
            router.join_room("bench", user).unwrap();
        }
        let payload =
            relay_protocol::encode(&Envelope::room(users[0].as_str(), "bench", "hello")).unwrap();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| rt.block_on(router.route(&transport, black_box(payload.clone()))))
        });
    }

    group.finish();
}

/// Registry and generator operations.
fn bench_identity(c: &mut Criterion) {
    let mut group = c.benchmark_group("identity");

    let generator = IdentityGenerator::from_seed(42);
    group.bench_function("generate", |b| b.iter(|| generator.generate()));

    group.bench_function("allocate_release", |b| {
        let router = Router::new();
        let handle = "conn-bench".into();
        b.iter(|| {
            let identity = router.allocate_identity(&handle).unwrap();
            router.identities().remove_if_handle(&identity, &handle);
        });
    });

    group.bench_function("join_leave", |b| {
        let router = Router::new();
        let transport = CountingTransport::new();
        let users = populate(&router, &transport, 1);
        b.iter(|| {
            router.join_room("bench", &users[0]).unwrap();
            router.leave_room("bench", &users[0]);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_addressed, bench_room_fanout, bench_identity);
criterion_main!(benches);
