//! Benchmarks for replica clock operations

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use replica_core::{MsgSceneClock, NetworkTime};
use replica_time::{
    ClientReplicaClock, ClockSettings, LatencyModel, PhysicsTickAligner, SoftNetworkTime,
};

const STEP: f32 = 1.0 / 60.0;

fn bench_clock_step(c: &mut Criterion) {
    let settings = ClockSettings::default().to_server_settings();
    let mut clock = ClientReplicaClock::new(&MsgSceneClock::new(1000), &settings).unwrap();
    let mut pending = Vec::new();

    c.bench_function("clock_apply_time_step", |b| {
        b.iter(|| black_box(clock.apply_time_step(black_box(STEP), &mut pending)))
    });
}

fn bench_clock_step_with_update(c: &mut Criterion) {
    let settings = ClockSettings::default().to_server_settings();
    let mut clock = ClientReplicaClock::new(&MsgSceneClock::new(1000), &settings).unwrap();
    let mut pending = Vec::with_capacity(1);

    c.bench_function("clock_apply_time_step_with_update", |b| {
        b.iter(|| {
            let frame = clock.server_time().frame().max(0) as u64;
            pending.push(MsgSceneClock::new(frame).with_round_trip_ms(60));
            black_box(clock.apply_time_step(black_box(STEP), &mut pending))
        })
    });
}

fn bench_soft_time_update(c: &mut Criterion) {
    let mut track = SoftNetworkTime::new(30, NetworkTime::ZERO);
    let mut target = NetworkTime::from_frame(2);

    c.bench_function("soft_time_update_to", |b| {
        b.iter(|| {
            target += 0.5;
            black_box(track.update_to(black_box(target), STEP, 0.9, 1.1, 1.0))
        })
    });
}

fn bench_physics_align(c: &mut Criterion) {
    let mut aligner = PhysicsTickAligner::new(120);
    let mut input = NetworkTime::from_frame(10);

    c.bench_function("physics_tick_align", |b| {
        b.iter(|| {
            let previous = input;
            input += 0.5;
            black_box(aligner.align(previous, input, STEP))
        })
    });
}

fn bench_latency_update(c: &mut Criterion) {
    let mut model = LatencyModel::new();

    c.bench_function("latency_model_update", |b| {
        let mut i = 0u32;
        b.iter(|| {
            i = i.wrapping_add(1);
            model.update(black_box(0.05 + (i % 7) as f64 * 0.002));
        })
    });
}

criterion_group!(
    benches,
    bench_clock_step,
    bench_clock_step_with_update,
    bench_soft_time_update,
    bench_physics_align,
    bench_latency_update,
);
criterion_main!(benches);
