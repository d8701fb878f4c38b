//! Benchmarks for replica wire encoding

use bytes::{Bytes, BytesMut};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use replica_core::{ComponentType, MsgAddObjects, MsgSceneClock, NetworkId, ObjectSnapshot};
use replica_wire::WireMessage;

fn bench_scene_clock_decode(c: &mut Criterion) {
    let msg = MsgSceneClock::new(123_456)
        .with_sub_frame(0.25)
        .with_round_trip_ms(80);
    let bytes = msg.to_bytes().unwrap();

    c.bench_function("scene_clock_decode", |b| {
        b.iter(|| MsgSceneClock::decode(black_box(&bytes)))
    });
}

fn bench_scene_clock_encode(c: &mut Criterion) {
    let msg = MsgSceneClock::new(123_456)
        .with_sub_frame(0.25)
        .with_round_trip_ms(80);

    c.bench_function("scene_clock_encode", |b| {
        let mut buf = BytesMut::with_capacity(64);
        b.iter(|| {
            buf.clear();
            black_box(&msg).encode(&mut buf).unwrap();
        })
    });
}

fn bench_add_objects_decode(c: &mut Criterion) {
    let msg = MsgAddObjects {
        frame: 1000,
        objects: (0..64)
            .map(|i| ObjectSnapshot {
                network_id: NetworkId::new(i, 1),
                component_type: ComponentType::from_name("RigidBody"),
                is_owned: i == 0,
                payload: Bytes::from(vec![i as u8; 48]),
            })
            .collect(),
    };
    let bytes = msg.to_bytes().unwrap();

    c.bench_function("add_objects_decode_64", |b| {
        b.iter(|| {
            let parsed = MsgAddObjects::decode(black_box(&bytes)).unwrap();
            black_box(parsed)
        })
    });
}

criterion_group!(
    benches,
    bench_scene_clock_decode,
    bench_scene_clock_encode,
    bench_add_objects_decode
);
criterion_main!(benches);
