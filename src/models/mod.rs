//! Reference numeric models
//!
//! This module contains the candle-backed implementations of the model
//! contract in [`crate::core::traits`]:
//! - Checkpoint reading with strict structural validation
//! - Symbol alphabets
//! - FastPitch-style acoustic model
//! - Frame-projection vocoder with bias denoiser

pub mod checkpoint;
mod layers;
pub mod fastpitch;
pub mod symbols;
pub mod vocoder;

pub use checkpoint::{Checkpoint, CheckpointMetadata};
pub use fastpitch::{FastPitch, FastPitchDims};
pub use symbols::SymbolAlphabet;
pub use vocoder::{FrameVocoder, DEFAULT_HOP_LENGTH};
