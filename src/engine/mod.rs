//! Model lifecycle
//!
//! The [`ModelRegistry`] decides which checkpoint is resident under each
//! model key and on which device, and hands out per-key handles to the
//! synthesis pipeline.

pub mod registry;

pub use registry::{
    normalize_model_key, DeviceChangeReport, ModelEntry, ModelFactory, ModelHandle,
    ModelRegistry, RegistryStats, ResidentModel, FASTPITCH_KEY, HIFIGAN_KEY,
};
