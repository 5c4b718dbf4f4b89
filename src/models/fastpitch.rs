//! FastPitch-style acoustic model
//!
//! A compact, parallel (non-autoregressive) text-to-frame model:
//!
//! ```text
//! symbols ─► word_emb (+ speaker_emb) ─► encoder.proj ─► features
//!                                          │
//!                          duration_predictor / pitch_predictor
//!                                          │
//! features + pitch_emb(pitch) ─► length regulation ─► decoder.proj ─► proj ─► mel
//! ```
//!
//! Tensor names and shapes (`D` hidden width, `M` mel bins):
//!
//! | name                           | shape            |
//! |--------------------------------|------------------|
//! | `encoder.word_emb.weight`      | `[n_symbols, D]` |
//! | `encoder.proj.{weight,bias}`   | `[D, D]`, `[D]`  |
//! | `speaker_emb.weight`           | `[speakers, D]`, only when speakers > 0 |
//! | `duration_predictor.fc.*`      | `[1, D]`, `[1]`  |
//! | `pitch_predictor.fc.*`         | `[1, D]`, `[1]`  |
//! | `pitch_emb.*`                  | `[D, 1]`, `[D]`  |
//! | `decoder.proj.*`               | `[D, D]`, `[D]`  |
//! | `proj.*`                       | `[M, D]`, `[M]`  |

use candle_core::{DType, Device, Tensor};
use candle_nn::{Embedding, Linear, Module};
use std::collections::HashMap;
use std::path::Path;

use super::checkpoint::{Checkpoint, CheckpointMetadata};
use super::layers::{init_linear, load_embedding, load_linear, migrate_embedding, migrate_linear};
use super::symbols::SymbolAlphabet;
use crate::core::error::{Result, TtsError};
use crate::core::traits::{AcousticModel, ModelComponent};
use crate::PAD_SYMBOL;

/// Dimensions of a freshly initialized checkpoint
#[derive(Debug, Clone)]
pub struct FastPitchDims {
    pub alphabet: SymbolAlphabet,
    pub hidden_dim: usize,
    pub mel_channels: usize,
    pub speakers: usize,
    /// Initial log(1 + frames) bias of the duration predictor
    pub duration_bias: f64,
}

impl Default for FastPitchDims {
    fn default() -> Self {
        Self {
            alphabet: SymbolAlphabet::default(),
            hidden_dim: 32,
            mel_channels: 80,
            speakers: 0,
            duration_bias: 5f64.ln(),
        }
    }
}

/// Resident FastPitch weights
pub struct FastPitch {
    name: String,
    device: Device,
    alphabet: SymbolAlphabet,
    hidden_dim: usize,
    mel_channels: usize,
    word_emb: Embedding,
    encoder_proj: Linear,
    speaker_emb: Option<Embedding>,
    duration_fc: Linear,
    pitch_fc: Linear,
    pitch_emb: Linear,
    decoder_proj: Linear,
    proj: Linear,
}

impl FastPitch {
    /// Build from a checkpoint, sizing the speaker table to `speaker_count`
    pub fn from_checkpoint(name: &str, mut ckpt: Checkpoint, speaker_count: usize) -> Result<Self> {
        let alphabet = match ckpt.metadata().symbols_alphabet.as_deref() {
            Some(alphabet) => alphabet.parse::<SymbolAlphabet>().map_err(|e| TtsError::ModelLoad {
                key: name.to_string(),
                message: e.to_string(),
                path: Some(ckpt.path().to_path_buf()),
            })?,
            None => SymbolAlphabet::default(),
        };
        let n_symbols = alphabet.vocab_size();

        let hidden_dim = ckpt
            .leading_dim("encoder.proj.weight")
            .ok_or_else(|| ckpt.mismatch("missing tensor 'encoder.proj.weight'"))?;
        let mel_channels = ckpt
            .leading_dim("proj.weight")
            .ok_or_else(|| ckpt.mismatch("missing tensor 'proj.weight'"))?;

        let word_emb = load_embedding(&mut ckpt, "encoder.word_emb", n_symbols, hidden_dim)?;
        let encoder_proj = load_linear(&mut ckpt, "encoder.proj", hidden_dim, hidden_dim)?;
        let speaker_emb = if speaker_count > 0 {
            Some(load_embedding(&mut ckpt, "speaker_emb", speaker_count, hidden_dim)?)
        } else {
            None
        };
        let duration_fc = load_linear(&mut ckpt, "duration_predictor.fc", 1, hidden_dim)?;
        let pitch_fc = load_linear(&mut ckpt, "pitch_predictor.fc", 1, hidden_dim)?;
        let pitch_emb = load_linear(&mut ckpt, "pitch_emb", hidden_dim, 1)?;
        let decoder_proj = load_linear(&mut ckpt, "decoder.proj", hidden_dim, hidden_dim)?;
        let proj = load_linear(&mut ckpt, "proj", mel_channels, hidden_dim)?;

        let device = encoder_proj.weight().device().clone();
        ckpt.finish()?;

        tracing::debug!(
            "Built '{}': {} symbols ({}), D={}, M={}, speakers={}",
            name,
            n_symbols,
            alphabet,
            hidden_dim,
            mel_channels,
            speaker_count
        );

        Ok(Self {
            name: name.to_string(),
            device,
            alphabet,
            hidden_dim,
            mel_channels,
            word_emb,
            encoder_proj,
            speaker_emb,
            duration_fc,
            pitch_fc,
            pitch_emb,
            decoder_proj,
            proj,
        })
    }

    pub fn alphabet(&self) -> SymbolAlphabet {
        self.alphabet
    }

    /// Write a randomly initialized checkpoint with the given dimensions
    pub fn init_checkpoint<P: AsRef<Path>>(path: P, dims: &FastPitchDims) -> Result<()> {
        let device = Device::Cpu;
        let d = dims.hidden_dim;
        let mut tensors = HashMap::new();

        tensors.insert(
            "encoder.word_emb.weight".to_string(),
            Tensor::randn(0f32, 1.0, (dims.alphabet.vocab_size(), d), &device)?,
        );
        init_linear(&mut tensors, "encoder.proj", d, d, 0.0)?;
        if dims.speakers > 0 {
            tensors.insert(
                "speaker_emb.weight".to_string(),
                Tensor::randn(0f32, 0.1, (dims.speakers, d), &device)?,
            );
        }
        init_linear(&mut tensors, "duration_predictor.fc", 1, d, dims.duration_bias)?;
        // Keep the duration head near its bias so fresh models render stable lengths
        let fc = "duration_predictor.fc.weight".to_string();
        if let Some(w) = tensors.get(&fc) {
            let scaled = (w * 0.01)?;
            tensors.insert(fc, scaled);
        }
        init_linear(&mut tensors, "pitch_predictor.fc", 1, d, 0.0)?;
        init_linear(&mut tensors, "pitch_emb", d, 1, 0.0)?;
        init_linear(&mut tensors, "decoder.proj", d, d, 0.0)?;
        init_linear(&mut tensors, "proj", dims.mel_channels, d, 0.0)?;

        let metadata = CheckpointMetadata {
            symbols_alphabet: Some(dims.alphabet.name().to_string()),
        };
        Checkpoint::save(path, &tensors, Some(&metadata))
    }

    /// Zero out masked positions of a `(B, T)` prediction
    fn masked_head(&self, head: &Linear, features: &Tensor, mask: &Tensor) -> Result<Tensor> {
        let out = head.forward(features)?.broadcast_mul(mask)?;
        Ok(out.squeeze(2)?)
    }
}

impl ModelComponent for FastPitch {
    fn name(&self) -> &str {
        &self.name
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

impl AcousticModel for FastPitch {
    fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    fn mel_channels(&self) -> usize {
        self.mel_channels
    }

    fn speaker_count(&self) -> usize {
        self.speaker_emb
            .as_ref()
            .map(|e| e.embeddings().dims()[0])
            .unwrap_or(0)
    }

    fn encode(&self, symbols: &Tensor, speaker: Option<u32>) -> Result<(Tensor, Tensor)> {
        let mask = symbols
            .ne(PAD_SYMBOL)?
            .to_dtype(DType::F32)?
            .unsqueeze(2)?;

        let mut emb = self.word_emb.forward(symbols)?;
        match (speaker, &self.speaker_emb) {
            (Some(index), Some(table)) => {
                let rows = self.speaker_count();
                if index as usize >= rows {
                    return Err(TtsError::Validation {
                        message: format!("speaker {} out of range for {} speakers", index, rows),
                        field: Some("speaker".to_string()),
                    });
                }
                let ids = Tensor::new(&[index], &self.device)?;
                let spk = table.forward(&ids)?.unsqueeze(0)?;
                emb = emb.broadcast_add(&spk)?;
            }
            (Some(index), None) => {
                tracing::debug!("'{}' has no speaker table, ignoring speaker {}", self.name, index);
            }
            (None, _) => {}
        }

        let features = self.encoder_proj.forward(&emb)?.tanh()?.broadcast_mul(&mask)?;
        Ok((features, mask))
    }

    fn predict_duration(&self, features: &Tensor, mask: &Tensor) -> Result<Tensor> {
        self.masked_head(&self.duration_fc, features, mask)
    }

    fn predict_pitch(&self, features: &Tensor, mask: &Tensor) -> Result<Tensor> {
        self.masked_head(&self.pitch_fc, features, mask)
    }

    fn embed_pitch(&self, pitch: &Tensor) -> Result<Tensor> {
        Ok(self.pitch_emb.forward(&pitch.unsqueeze(2)?)?)
    }

    fn decode(&self, frames: &Tensor, lengths: &[usize]) -> Result<Tensor> {
        let (batch, max_len, _) = frames.dims3()?;
        let mut mask = Vec::with_capacity(batch * max_len);
        for &len in lengths {
            mask.extend((0..max_len).map(|f| if f < len { 1f32 } else { 0f32 }));
        }
        let mask = Tensor::from_vec(mask, (batch, max_len, 1), &self.device)?;

        let hidden = self
            .decoder_proj
            .forward(frames)?
            .tanh()?
            .broadcast_mul(&mask)?;
        let mel = self.proj.forward(&hidden)?.broadcast_mul(&mask)?;
        Ok(mel.transpose(1, 2)?.contiguous()?)
    }

    fn migrated(&self, device: &Device) -> Result<Box<dyn AcousticModel>> {
        Ok(Box::new(Self {
            name: self.name.clone(),
            device: device.clone(),
            alphabet: self.alphabet,
            hidden_dim: self.hidden_dim,
            mel_channels: self.mel_channels,
            word_emb: migrate_embedding(&self.word_emb, device)?,
            encoder_proj: migrate_linear(&self.encoder_proj, device)?,
            speaker_emb: match &self.speaker_emb {
                Some(e) => Some(migrate_embedding(e, device)?),
                None => None,
            },
            duration_fc: migrate_linear(&self.duration_fc, device)?,
            pitch_fc: migrate_linear(&self.pitch_fc, device)?,
            pitch_emb: migrate_linear(&self.pitch_emb, device)?,
            decoder_proj: migrate_linear(&self.decoder_proj, device)?,
            proj: migrate_linear(&self.proj, device)?,
        }))
    }
}
