//! SDK Module - the request surface for embedding applications
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use voxhost::sdk::SynthesisService;
//!
//! let service = SynthesisService::new(ServiceConfig::load("voxhost.yaml")?)?;
//! service.load_model("fastpitch1_1", "models/narrator.safetensors", 0)?;
//! let outcome = service.synthesize(&request, Path::new("line_001.wav"))?;
//! ```

pub mod facade;

pub use facade::SynthesisService;

/// Re-export commonly used types
pub use crate::audio::{FilterOptions, PostJob};
pub use crate::core::outcome::{format_legacy, JobOutcome};
pub use crate::inference::{SynthesisOutcome, SynthesisRequest, VocoderChoice};
