//! Benchmarks for the synthesis hot paths
//!
//! Run with: cargo bench

use candle_core::{Device, Tensor};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::path::Path;
use std::time::Duration;

use voxhost::audio::FilterOptions;
use voxhost::inference::{regulate, regulate_tensor, repeat_counts};
use voxhost::models::{FastPitch, FastPitchDims, SymbolAlphabet};
use voxhost::models::Checkpoint;
use voxhost::AcousticModel;

/// Benchmark duration rounding
fn bench_repeat_counts(c: &mut Criterion) {
    let mut group = c.benchmark_group("repeat_counts");
    for len in [32, 128, 512] {
        let durations: Vec<f32> = (0..len).map(|i| (i % 17) as f32 * 0.73).collect();
        group.bench_with_input(BenchmarkId::new("symbols", len), &durations, |b, d| {
            b.iter(|| repeat_counts(black_box(d), 1.1, 75.0))
        });
    }
    group.finish();
}

/// Benchmark expansion of plain sequences
fn bench_regulate(c: &mut Criterion) {
    let mut group = c.benchmark_group("regulate");
    for batch in [1, 8, 32] {
        let sequences: Vec<Vec<f32>> = (0..batch).map(|_| (0..100).map(|i| i as f32).collect()).collect();
        let counts: Vec<Vec<usize>> = (0..batch).map(|b| (0..100).map(|i| (i + b) % 6).collect()).collect();
        group.bench_with_input(BenchmarkId::new("batch", batch), &batch, |b, _| {
            b.iter(|| regulate(black_box(&sequences), black_box(&counts), 0.0, None).unwrap())
        });
    }
    group.finish();
}

/// Benchmark tensor expansion
fn bench_regulate_tensor(c: &mut Criterion) {
    let device = Device::Cpu;

    let mut group = c.benchmark_group("regulate_tensor");
    group.measurement_time(Duration::from_secs(10));

    for seq_len in [50, 100, 200] {
        let features = Tensor::randn(0.0f32, 1.0, (4, seq_len, 384), &device).unwrap();
        let counts: Vec<Vec<usize>> = (0..4).map(|_| (0..seq_len).map(|i| 1 + i % 7).collect()).collect();
        group.bench_with_input(BenchmarkId::new("seq_len", seq_len), &seq_len, |b, _| {
            b.iter(|| regulate_tensor(black_box(&features), black_box(&counts), None).unwrap())
        });
    }
    group.finish();
}

/// Benchmark text-to-symbol encoding
fn bench_symbol_encoding(c: &mut Criterion) {
    let text = "The quick brown fox jumps over the lazy dog. How are you doing today?";

    let mut group = c.benchmark_group("symbol_encoding");
    for alphabet in [
        SymbolAlphabet::EnglishBasic,
        SymbolAlphabet::EnglishBasicLowercase,
        SymbolAlphabet::EnglishExpanded,
    ] {
        group.bench_function(alphabet.name(), |b| b.iter(|| alphabet.encode(black_box(text))));
    }
    group.finish();
}

/// Benchmark filter-chain construction
fn bench_filter_args(c: &mut Criterion) {
    let options = FilterOptions {
        hz: Some(44100),
        pad_start: Some(250.0),
        pad_end: Some(500.0),
        pitch_mult: Some(1.1),
        tempo: Some(1.25),
        amplitude: Some(0.8),
        bit_depth: Some("pcm_s16le".to_string()),
    };
    c.bench_function("filter_tool_args", |b| {
        b.iter(|| {
            options
                .tool_args(Path::new("in.wav"), Path::new("out.wav"), black_box(22050))
                .unwrap()
        })
    });
}

/// Benchmark the acoustic encoder with random weights
fn bench_fastpitch_encode(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bench.safetensors");
    FastPitch::init_checkpoint(&path, &FastPitchDims::default()).unwrap();
    let ckpt = Checkpoint::read("bench", &path, &Device::Cpu).unwrap();
    let model = FastPitch::from_checkpoint("bench", ckpt, 0).unwrap();

    let mut group = c.benchmark_group("fastpitch_encode");
    group.sample_size(20);
    for len in [16, 64, 256] {
        let ids: Vec<u32> = (0..len).map(|i| 1 + (i as u32 % 60)).collect();
        let symbols = Tensor::from_vec(ids, (1, len), &Device::Cpu).unwrap();
        group.bench_with_input(BenchmarkId::new("symbols", len), &symbols, |b, s| {
            b.iter(|| model.encode(black_box(s), None).unwrap())
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_repeat_counts,
    bench_regulate,
    bench_symbol_encoding,
    bench_filter_args,
);

criterion_group!(
    name = slow_benches;
    config = Criterion::default().sample_size(10);
    targets = bench_regulate_tensor, bench_fastpitch_encode
);

criterion_main!(benches, slow_benches);
