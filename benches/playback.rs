//! Playback engine benchmarks
//!
//! Measures per-tick cost of the clock, mapper, cache and scheduler at
//! various window sizes, so the render loop stays far under its frame budget.
//!
//! Run with: cargo bench --bench playback

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use replay_viewer::net::protocol::{GameId, GameInfo};
use replay_viewer::net::provider::RecordingProvider;
use replay_viewer::playback::{
    EngineConfig, FrameCache, FrameIndexMapper, LogicalClock, ManualTime, PlaybackEngine,
    RetentionWindow,
};

const GAME_LENGTH: usize = 5000;

fn game_info() -> GameInfo {
    GameInfo {
        game_id: GameId(1),
        frame_count: GAME_LENGTH,
        board_width: 40,
        board_height: 40,
        game_params: "{}".to_string(),
    }
}

/// Engine playing at 10x with every request answered immediately
fn playing_engine(back: usize, forward: usize) -> (ManualTime, PlaybackEngine<ManualTime>, RecordingProvider) {
    let time = ManualTime::new();
    let config = EngineConfig {
        window: RetentionWindow::new(back, forward),
        autoplay: true,
        ..EngineConfig::default()
    };
    let engine = PlaybackEngine::new(game_info(), config, time.clone()).unwrap();
    (time, engine, RecordingProvider::default())
}

/// Benchmark a full engine tick while playing with the window filled
fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_tick");
    group.sample_size(50);

    for window in [20, 80, 200, 800] {
        let (time, mut engine, mut provider) = playing_engine(window, window);
        engine.set_rate(10.0).unwrap();

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("playing", window), &window, |b, _| {
            b.iter(|| {
                time.advance(16.0);
                if engine.is_at_end() {
                    engine.queue_reset();
                    engine.queue_start();
                }
                let report = engine.tick(&mut provider);
                for (game_id, frame) in provider.take_frame_requests() {
                    engine.on_frame_arrived(game_id, frame, vec![0u8; 256]);
                }
                black_box(report)
            })
        });
    }
    group.finish();
}

/// Benchmark a long backward seek, which walks the mapper and evicts the
/// whole window
fn bench_seek(c: &mut Criterion) {
    let mut group = c.benchmark_group("seek");
    group.sample_size(50);

    for window in [80, 800] {
        let (_, mut engine, mut provider) = playing_engine(window, window);
        let mut forward = true;

        group.bench_with_input(BenchmarkId::new("jump", window), &window, |b, _| {
            b.iter(|| {
                let target = if forward { 4_000_000.0 } else { 0.0 };
                forward = !forward;
                engine.queue_set_time(target);
                let report = engine.tick(&mut provider);
                for (game_id, frame) in provider.take_frame_requests() {
                    engine.on_frame_arrived(game_id, frame, Vec::new());
                }
                black_box(report)
            })
        });
    }
    group.finish();
}

/// Benchmark mapping alone, one frame boundary per call
fn bench_mapper(c: &mut Criterion) {
    let mut group = c.benchmark_group("mapper");
    group.sample_size(100);

    let mapper = FrameIndexMapper::new(1000.0, GAME_LENGTH).unwrap();
    let time = ManualTime::new();
    let mut clock = LogicalClock::new(time.clone());
    clock.queue_start();
    clock.update();
    let mut index = 0;

    group.bench_function("advance", |b| {
        b.iter(|| {
            time.advance(1000.0);
            clock.update();
            if clock.is_paused() {
                clock.queue_reset();
                clock.queue_start();
                clock.update();
            }
            let position = mapper.map(index, &mut clock);
            index = position.frame_index;
            black_box(position)
        })
    });
    group.finish();
}

/// Benchmark eviction of a full window after a jump
fn bench_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("eviction");
    group.sample_size(50);

    for count in [200, 1000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("full_window", count), &count, |b, &count| {
            let everything = RetentionWindow::new(usize::MAX, usize::MAX);
            b.iter(|| {
                let mut cache: FrameCache = FrameCache::new();
                for index in 0..count {
                    cache.mark_pending(index);
                    cache.admit(index, Vec::new(), index, everything);
                }
                black_box(cache.evict_outside(count * 10, RetentionWindow::default()))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_tick, bench_seek, bench_mapper, bench_eviction);
criterion_main!(benches);
