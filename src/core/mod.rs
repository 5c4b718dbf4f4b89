//! Core infrastructure: errors, devices and the numeric model contract

pub mod device;
pub mod error;
pub mod outcome;
pub mod traits;

pub use device::ComputeDevice;
pub use error::{AudioOperation, InferenceStage, Result, ResultExt, TtsError};
pub use outcome::{format_legacy, JobOutcome, SUCCESS_SENTINEL};
pub use traits::{AcousticModel, ModelComponent, Vocoder};
