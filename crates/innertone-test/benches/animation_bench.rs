//! Benchmarks for per-frame avatar and visualizer work

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use innertone_core::{DialogueUpdate, SessionState};
use innertone_visual::{AnimationConfig, AvatarAnimator, CharacterRig};
use innertone_voice::{split_sentences, FrequencyVisualizer};

fn bench_animator_tick_speaking(c: &mut Criterion) {
    let mut animator = AvatarAnimator::seeded(AnimationConfig::default(), CharacterRig::full(), 42);
    let mut t = 0.0f32;

    c.bench_function("animator_tick_speaking", |b| {
        b.iter(|| {
            t += 1.0 / 60.0;
            black_box(animator.tick(black_box(t), Some(SessionState::Speaking), Some(0.4)))
        })
    });
}

fn bench_animator_tick_fallback(c: &mut Criterion) {
    let mut animator = AvatarAnimator::seeded(AnimationConfig::default(), CharacterRig::basic(), 42);
    let mut t = 0.0f32;

    c.bench_function("animator_tick_fallback", |b| {
        b.iter(|| {
            t += 1.0 / 60.0;
            black_box(animator.tick(black_box(t), Some(SessionState::Speaking), None))
        })
    });
}

fn bench_animator_pose(c: &mut Criterion) {
    let mut animator = AvatarAnimator::seeded(AnimationConfig::default(), CharacterRig::full(), 42);
    animator.tick(1.0, Some(SessionState::Listening), Some(0.5));

    c.bench_function("animator_pose", |b| b.iter(|| black_box(animator.pose())));
}

fn bench_visualizer_snapshot(c: &mut Criterion) {
    let mut visualizer = FrequencyVisualizer::default();
    let tap = visualizer.tap();
    let samples: Vec<f32> = (0..256).map(|i| (i as f32 * 0.2).sin() * 0.5).collect();

    c.bench_function("visualizer_snapshot", |b| {
        b.iter(|| {
            tap.push(black_box(&samples));
            black_box(visualizer.snapshot())
        })
    });
}

fn bench_dialogue_decode(c: &mut Criterion) {
    let raw = r#"{"state":"speaking","transcript":"That's understandable. Let's take it slowly."}"#;

    c.bench_function("dialogue_decode", |b| {
        b.iter(|| DialogueUpdate::parse(black_box(raw)))
    });
}

fn bench_split_sentences(c: &mut Criterion) {
    let text = "Take a breath. You are safe here! Shall we continue? We can go slowly...";

    c.bench_function("split_sentences", |b| {
        b.iter(|| split_sentences(black_box(text)))
    });
}

criterion_group!(
    benches,
    bench_animator_tick_speaking,
    bench_animator_tick_fallback,
    bench_animator_pose,
    bench_visualizer_snapshot,
    bench_dialogue_decode,
    bench_split_sentences,
);
criterion_main!(benches);
