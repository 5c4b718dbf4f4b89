//! Frame-projection vocoder
//!
//! Projects every acoustic frame onto `hop` waveform samples. Its bias
//! denoiser follows the usual recipe: vocode an all-zero frame, treat the
//! result as the model's noise floor and subtract a fraction of it per hop.

use candle_core::{DType, Device, Tensor};
use candle_nn::{Linear, Module};
use std::collections::HashMap;
use std::path::Path;

use super::checkpoint::Checkpoint;
use super::layers::{init_linear, load_linear, migrate_linear};
use crate::core::error::{Result, TtsError};
use crate::core::traits::{ModelComponent, Vocoder};

/// Samples produced per acoustic frame by the 22050 Hz models
pub const DEFAULT_HOP_LENGTH: usize = 256;

/// Resident vocoder weights: `upsample.weight [hop, M]`, `upsample.bias [hop]`
pub struct FrameVocoder {
    name: String,
    device: Device,
    mel_channels: usize,
    hop_length: usize,
    upsample: Linear,
}

impl FrameVocoder {
    pub fn from_checkpoint(name: &str, mut ckpt: Checkpoint) -> Result<Self> {
        let (hop_length, mel_channels) = match ckpt.peek_dims("upsample.weight") {
            Some(&[hop, mel]) => (hop, mel),
            Some(_) => return Err(ckpt.mismatch("'upsample.weight' must be two-dimensional")),
            None => return Err(ckpt.mismatch("missing tensor 'upsample.weight'")),
        };

        let upsample = load_linear(&mut ckpt, "upsample", hop_length, mel_channels)?;
        let device = upsample.weight().device().clone();
        ckpt.finish()?;

        tracing::debug!("Built '{}': M={}, hop={}", name, mel_channels, hop_length);

        Ok(Self {
            name: name.to_string(),
            device,
            mel_channels,
            hop_length,
            upsample,
        })
    }

    /// Write a randomly initialized vocoder checkpoint
    pub fn init_checkpoint<P: AsRef<Path>>(path: P, mel_channels: usize, hop_length: usize) -> Result<()> {
        let mut tensors = HashMap::new();
        init_linear(&mut tensors, "upsample", hop_length, mel_channels, 0.0)?;
        Checkpoint::save(path, &tensors, None)
    }
}

impl ModelComponent for FrameVocoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

impl Vocoder for FrameVocoder {
    fn mel_channels(&self) -> usize {
        self.mel_channels
    }

    fn hop_length(&self) -> usize {
        self.hop_length
    }

    fn vocode(&self, mel: &Tensor) -> Result<Tensor> {
        let (batch, channels, frames) = mel.dims3()?;
        if channels != self.mel_channels {
            return Err(TtsError::Internal {
                message: format!(
                    "vocoder '{}' expects {} mel channels, got {}",
                    self.name, self.mel_channels, channels
                ),
                location: Some("FrameVocoder::vocode".to_string()),
            });
        }
        let x = mel.transpose(1, 2)?.contiguous()?;
        let samples = self.upsample.forward(&x)?.tanh()?;
        Ok(samples.reshape((batch, frames * self.hop_length))?)
    }

    fn denoise(&self, audio: &Tensor, strength: f32) -> Result<Tensor> {
        let (_, len) = audio.dims2()?;
        if len == 0 || strength == 0.0 {
            return Ok(audio.clone());
        }
        let silence = Tensor::zeros((1, self.mel_channels, 1), DType::F32, &self.device)?;
        let bias = self.vocode(&silence)?;
        let reps = len.div_ceil(self.hop_length);
        let bias = bias.repeat((1, reps))?.narrow(1, 0, len)?;
        Ok(audio.broadcast_sub(&(bias * strength as f64)?)?)
    }

    fn migrated(&self, device: &Device) -> Result<Box<dyn Vocoder>> {
        Ok(Box::new(Self {
            name: self.name.clone(),
            device: device.clone(),
            mel_channels: self.mel_channels,
            hop_length: self.hop_length,
            upsample: migrate_linear(&self.upsample, device)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(mel: usize, hop: usize) -> FrameVocoder {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hifi.safetensors");
        FrameVocoder::init_checkpoint(&path, mel, hop).unwrap();
        let ckpt = Checkpoint::read("hifigan", &path, &Device::Cpu).unwrap();
        FrameVocoder::from_checkpoint("hifigan", ckpt).unwrap()
    }

    #[test]
    fn test_vocode_length() {
        let vocoder = build(4, 16);
        let mel = Tensor::ones((2, 4, 3), DType::F32, &Device::Cpu).unwrap();
        let audio = vocoder.vocode(&mel).unwrap();
        assert_eq!(audio.dims(), &[2, 48]);
    }

    #[test]
    fn test_denoise_preserves_shape() {
        let vocoder = build(4, 16);
        let audio = Tensor::zeros((1, 40), DType::F32, &Device::Cpu).unwrap();
        let cleaned = vocoder.denoise(&audio, 0.01).unwrap();
        assert_eq!(cleaned.dims(), &[1, 40]);
    }

    #[test]
    fn test_rejects_wrong_channel_count() {
        let vocoder = build(4, 16);
        let mel = Tensor::ones((1, 5, 3), DType::F32, &Device::Cpu).unwrap();
        assert!(vocoder.vocode(&mel).is_err());
    }
}
