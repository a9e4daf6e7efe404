use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use earwatch::dsp::{ExtractorConfig, FeatureExtractor, FrameRing};

/// One second of synthetic audio: a 440 Hz tone with a touch of harmonic
/// content so the spectrum is not trivially sparse.
fn tone_fixture(sample_rate: u32) -> Vec<f32> {
    (0..sample_rate)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            0.5 * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
                + 0.2 * (2.0 * std::f32::consts::PI * 1_320.0 * t).sin()
        })
        .collect()
}

fn bench_extractor(c: &mut Criterion) {
    let config = ExtractorConfig::default();
    let audio = tone_fixture(config.sample_rate);

    let mut group = c.benchmark_group("extractor");
    for chunk_samples in [320usize, 1_600, 16_000] {
        group.bench_with_input(
            BenchmarkId::new("one_second", chunk_samples),
            &chunk_samples,
            |b, &chunk_samples| {
                let mut extractor = FeatureExtractor::new(config).unwrap();
                let mut frames = Vec::new();
                b.iter(|| {
                    extractor.reset();
                    let mut total = 0;
                    for chunk in audio.chunks(chunk_samples) {
                        total += extractor.process(black_box(chunk), &mut frames);
                    }
                    black_box(total)
                });
            },
        );
    }
    group.finish();
}

fn bench_ring(c: &mut Criterion) {
    let config = ExtractorConfig::default();
    let frame = vec![0.5f32; config.n_mels];

    c.bench_function("ring_push_snapshot", |b| {
        let ring = FrameRing::new(config.n_mels, 1_500).unwrap();
        b.iter(|| {
            for _ in 0..100 {
                ring.push_frame(black_box(&frame));
            }
            black_box(ring.snapshot_last(600).frames)
        });
    });
}

criterion_group!(benches, bench_extractor, bench_ring);
criterion_main!(benches);
