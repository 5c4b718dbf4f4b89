//! # voxhost - resident speech synthesis host
//!
//! Keeps duration-based acoustic models and vocoders resident on one compute
//! device and turns symbol sequences into waveform files.
//!
//! ## Features
//!
//! - **Model Registry**: lazy, idempotent checkpoint loading keyed by model type
//! - **Length Regulation**: duration-driven symbol-to-frame expansion
//! - **Synthesis Pipeline**: encode, predict prosody, expand, decode and vocode,
//!   with a single fallback to predicted prosody when user edits fail
//! - **Batch Post-Processing**: parallel resample/pad/pitch/tempo/gain through
//!   an external audio tool
//! - **GPU Acceleration**: CUDA and Metal support via Candle
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use voxhost::sdk::SynthesisService;
//! use voxhost::{ServiceConfig, SynthesisRequest};
//!
//! let service = SynthesisService::new(ServiceConfig::default())?;
//! service.load_model("fastpitch1_1", "models/narrator.safetensors", 0)?;
//!
//! let request = SynthesisRequest::new(vec![19, 46, 2]).with_pace(0.9);
//! let outcome = service.synthesize(&request, Path::new("out.wav"))?;
//! println!("{} frames", outcome.prosody.frame_count);
//! ```
//!
//! ## Post-Processing
//!
//! ```rust,ignore
//! use voxhost::audio::{FilterOptions, PostExecutor, PostJob};
//!
//! let options = FilterOptions { tempo: Some(1.25), ..Default::default() };
//! let jobs = vec![PostJob::new("in.wav", "out.mp3", options)];
//! let outcomes = PostExecutor::new("ffmpeg").run(&jobs)?;
//! ```

#![allow(rustdoc::missing_crate_level_docs)]

pub mod audio;
pub mod config;
pub mod core;
pub mod engine;
pub mod inference;
pub mod models;
pub mod sdk;

// Core re-exports
pub use crate::core::{
    format_legacy, AcousticModel, ComputeDevice, JobOutcome, ModelComponent, Result, ResultExt,
    TtsError, Vocoder, SUCCESS_SENTINEL,
};

pub use audio::{FilterOptions, PostExecutor, PostJob};
pub use config::{AudioPostConfig, ServiceConfig};
pub use engine::{ModelRegistry, FASTPITCH_KEY, HIFIGAN_KEY};
pub use inference::{SynthesisOutcome, SynthesisPipeline, SynthesisRequest, VocoderChoice};
pub use models::SymbolAlphabet;
pub use sdk::SynthesisService;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default sample rate for output audio (22050 Hz)
pub const DEFAULT_SAMPLE_RATE: u32 = 22050;

/// Symbol id used to pad batched sequences; masked out by the encoder
pub const PAD_SYMBOL: u32 = 0;
