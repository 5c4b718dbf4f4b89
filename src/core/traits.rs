//! Numeric model contract
//!
//! The neural layers are opaque to the orchestration code: it only moves
//! tensors through these traits. Shapes use `B` for batch, `T` for symbols,
//! `F` for acoustic frames, `D` for the hidden width and `M` for mel bins.

use candle_core::{Device, Tensor};

use super::error::Result;

/// Base trait for all resident model components
pub trait ModelComponent: Send + Sync {
    /// Component name for identification and logging
    fn name(&self) -> &str;

    /// Device the weights currently live on
    fn device(&self) -> &Device;
}

/// Text-to-acoustic-frame model (FastPitch-style)
pub trait AcousticModel: ModelComponent {
    /// Hidden feature width `D`
    fn hidden_dim(&self) -> usize;

    /// Mel bins `M` produced by [`AcousticModel::decode`]
    fn mel_channels(&self) -> usize;

    /// Number of rows in the speaker table, 0 when disabled
    fn speaker_count(&self) -> usize;

    /// `(B, T)` u32 symbols -> `(B, T, D)` features and a `(B, T, 1)` validity mask
    fn encode(&self, symbols: &Tensor, speaker: Option<u32>) -> Result<(Tensor, Tensor)>;

    /// Features -> `(B, T)` log-durations, zero at masked positions
    fn predict_duration(&self, features: &Tensor, mask: &Tensor) -> Result<Tensor>;

    /// Features -> `(B, T)` per-symbol pitch, zero at masked positions
    fn predict_pitch(&self, features: &Tensor, mask: &Tensor) -> Result<Tensor>;

    /// `(B, T)` pitch -> `(B, T, D)` embedding added to the features
    fn embed_pitch(&self, pitch: &Tensor) -> Result<Tensor>;

    /// `(B, F, D)` regulated frames with true lengths -> `(B, M, F)` acoustic frames
    fn decode(&self, frames: &Tensor, lengths: &[usize]) -> Result<Tensor>;

    /// Copy of this model with every weight on `device`
    fn migrated(&self, device: &Device) -> Result<Box<dyn AcousticModel>>;
}

/// Acoustic-frame-to-waveform model
pub trait Vocoder: ModelComponent {
    /// Mel bins `M` expected on input
    fn mel_channels(&self) -> usize;

    /// Waveform samples produced per acoustic frame
    fn hop_length(&self) -> usize;

    /// `(B, M, F)` acoustic frames -> `(B, F * hop)` samples
    fn vocode(&self, mel: &Tensor) -> Result<Tensor>;

    /// Remove model bias from vocoded audio
    fn denoise(&self, audio: &Tensor, _strength: f32) -> Result<Tensor> {
        Ok(audio.clone())
    }

    /// Copy of this vocoder with every weight on `device`
    fn migrated(&self, device: &Device) -> Result<Box<dyn Vocoder>>;
}
