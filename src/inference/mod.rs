//! Inference module for text-to-speech synthesis
//!
//! This module provides the synthesis orchestration:
//! - Length regulation: symbol-to-frame expansion
//! - SynthesisPipeline: single requests with the edits fallback
//! - Batch synthesis: padded multi-request rendering

mod batch;
pub mod length_regulator;
mod pipeline;

pub use batch::BatchStats;
pub use length_regulator::{
    clamp_duration, frame_total, regulate, regulate_tensor, repeat_counts, Regulated,
};
pub use pipeline::{
    paired_vocoder_path, with_single_fallback, DurationPitchFrame, PipelineConfig,
    SynthesisOutcome, SynthesisPipeline, SynthesisRequest, VocoderChoice,
    PAIRED_VOCODER_SUFFIX,
};
