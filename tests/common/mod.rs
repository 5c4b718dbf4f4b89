//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use voxhost::inference::paired_vocoder_path;
use voxhost::models::{FastPitch, FastPitchDims, FrameVocoder, SymbolAlphabet};
use voxhost::{ServiceConfig, SynthesisService};

pub const MEL_CHANNELS: usize = 4;
pub const HOP_LENGTH: usize = 16;

/// Write a small acoustic checkpoint plus its paired vocoder
pub fn acoustic_checkpoint(dir: &Path, stem: &str, speakers: usize) -> PathBuf {
    let path = dir.join(format!("{}.safetensors", stem));
    let dims = FastPitchDims {
        alphabet: SymbolAlphabet::EnglishBasic,
        hidden_dim: 8,
        mel_channels: MEL_CHANNELS,
        speakers,
        ..Default::default()
    };
    FastPitch::init_checkpoint(&path, &dims).unwrap();
    FrameVocoder::init_checkpoint(paired_vocoder_path(&path), MEL_CHANNELS, HOP_LENGTH).unwrap();
    path
}

/// Write the shared vocoder checkpoint used by the bundled choice
pub fn bundled_vocoder(dir: &Path) -> PathBuf {
    let path = dir.join("hifi.safetensors");
    FrameVocoder::init_checkpoint(&path, MEL_CHANNELS, HOP_LENGTH).unwrap();
    path
}

pub fn service_config(dir: &Path) -> ServiceConfig {
    ServiceConfig {
        bundled_vocoder: bundled_vocoder(dir),
        ..Default::default()
    }
}

/// A service with a single-speaker model named `narrator` already loaded
pub fn loaded_service(dir: &Path) -> (SynthesisService, PathBuf) {
    let service = SynthesisService::new(service_config(dir)).unwrap();
    let model = acoustic_checkpoint(dir, "narrator", 0);
    assert!(service.load_model("FastPitch 1.1", &model, 0).unwrap());
    (service, model)
}

pub fn symbols(text: &str) -> Vec<u32> {
    SymbolAlphabet::EnglishBasic.encode(text)
}

/// Samples of a 16-bit WAV file
pub fn read_wav(path: &Path) -> (hound::WavSpec, Vec<i16>) {
    let mut reader = hound::WavReader::open(path).unwrap();
    let spec = reader.spec();
    let samples = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    (spec, samples)
}
