//! Synthesis pipeline
//!
//! Drives one request through the acoustic model and vocoder:
//! 1. Symbol encoding
//! 2. Duration prediction (or caller-supplied durations)
//! 3. Pitch prediction (or caller-supplied pitch)
//! 4. Length regulation
//! 5. Frame decoding
//! 6. Vocoding, trimming, denoising and peak limiting
//!
//! When a request carries duration/pitch edits, rendering is attempted with
//! them first and retried exactly once from fresh predictions if that attempt
//! fails during inference. Malformed edits are rejected up front and never
//! reach the retry.

use candle_core::Tensor;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::length_regulator::{clamp_duration, frame_total, regulate_tensor, repeat_counts};
use crate::audio::{normalize_peak, AudioOutput};
use crate::config::ServiceConfig;
use crate::core::error::{AudioOperation, InferenceStage, Result, TtsError};
use crate::core::traits::{AcousticModel, ModelComponent, Vocoder};
use crate::engine::ModelRegistry;

/// Extension of the paired vocoder checkpoint next to an acoustic checkpoint
pub const PAIRED_VOCODER_SUFFIX: &str = "hg.safetensors";

/// One synthesis request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisRequest {
    /// Symbol ids, one per input token
    pub symbols: Vec<u32>,
    /// Row of the speaker table, if the model has one
    #[serde(default)]
    pub speaker: Option<u32>,
    /// Frame-duration scale
    #[serde(default = "default_pace")]
    pub pace: f32,
    /// Per-symbol pitch edits
    #[serde(default)]
    pub pitch: Option<Vec<f32>>,
    /// Per-symbol duration edits, in frames
    #[serde(default)]
    pub durations: Option<Vec<f32>>,
    /// Per-request duration ceiling, overriding the configured one
    #[serde(default)]
    pub max_duration: Option<f32>,
}

fn default_pace() -> f32 {
    1.0
}

impl SynthesisRequest {
    pub fn new(symbols: Vec<u32>) -> Self {
        Self {
            symbols,
            speaker: None,
            pace: default_pace(),
            pitch: None,
            durations: None,
            max_duration: None,
        }
    }

    pub fn with_pace(mut self, pace: f32) -> Self {
        self.pace = pace;
        self
    }

    pub fn with_speaker(mut self, speaker: u32) -> Self {
        self.speaker = Some(speaker);
        self
    }

    pub fn with_pitch(mut self, pitch: Vec<f32>) -> Self {
        self.pitch = Some(pitch);
        self
    }

    pub fn with_durations(mut self, durations: Vec<f32>) -> Self {
        self.durations = Some(durations);
        self
    }

    /// Whether the caller supplied duration or pitch edits
    pub fn has_edits(&self) -> bool {
        self.pitch.is_some() || self.durations.is_some()
    }

    /// Reject malformed requests before any rendering starts
    pub fn validate(&self) -> Result<()> {
        let n = self.symbols.len();
        if n == 0 {
            return Err(TtsError::Validation {
                message: "symbol sequence is empty".to_string(),
                field: Some("symbols".to_string()),
            });
        }
        if !(self.pace.is_finite() && self.pace > 0.0) {
            return Err(TtsError::Validation {
                message: format!("pace must be positive, got {}", self.pace),
                field: Some("pace".to_string()),
            });
        }
        if let Some(max) = self.max_duration {
            if !(max.is_finite() && max > 0.0) {
                return Err(TtsError::Validation {
                    message: format!("max_duration must be positive, got {}", max),
                    field: Some("max_duration".to_string()),
                });
            }
        }
        if let Some(pitch) = &self.pitch {
            if pitch.len() != n {
                return Err(TtsError::ShapeMismatch {
                    field: "pitch override".to_string(),
                    expected: n,
                    actual: pitch.len(),
                });
            }
        }
        if let Some(durations) = &self.durations {
            if durations.len() != n {
                return Err(TtsError::ShapeMismatch {
                    field: "duration override".to_string(),
                    expected: n,
                    actual: durations.len(),
                });
            }
        }
        Ok(())
    }
}

/// Which vocoder checkpoint renders the waveform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VocoderChoice {
    /// The shared checkpoint from the service configuration
    #[default]
    Bundled,
    /// `<stem>.hg.safetensors` next to the acoustic checkpoint
    Paired,
}

impl std::str::FromStr for VocoderChoice {
    type Err = TtsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bundled" | "qnd" => Ok(VocoderChoice::Bundled),
            "paired" => Ok(VocoderChoice::Paired),
            other => Err(TtsError::Validation {
                message: format!("unknown vocoder '{}'", other),
                field: Some("vocoder".to_string()),
            }),
        }
    }
}

/// Resolved per-symbol prosody of a render
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DurationPitchFrame {
    /// Integer repeat count per symbol
    pub durations: Vec<usize>,
    /// Pitch per symbol
    pub pitch: Vec<f32>,
    /// Sum of the repeat counts
    pub frame_count: usize,
}

/// Result of a successful synthesis
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisOutcome {
    pub path: PathBuf,
    pub prosody: DurationPitchFrame,
    /// Clamped per-symbol durations before pace and rounding
    pub raw_durations: Vec<f32>,
    /// Whether the edits were discarded in favour of predictions
    pub used_fallback: bool,
    pub sample_count: usize,
    pub sample_rate: u32,
}

/// Pipeline settings
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub sample_rate: u32,
    pub max_duration: f32,
    pub max_frames: usize,
    pub denoise_strength: Option<f32>,
    pub acoustic_key: String,
    pub vocoder_key: String,
    pub bundled_vocoder: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&ServiceConfig::default())
    }
}

impl From<&ServiceConfig> for PipelineConfig {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            max_duration: config.max_duration,
            max_frames: config.max_frames,
            denoise_strength: config.denoise_strength,
            acoustic_key: config.acoustic_model.clone(),
            vocoder_key: config.vocoder_model.clone(),
            bundled_vocoder: config.bundled_vocoder.clone(),
        }
    }
}

/// Waveform and prosody of one rendered item
#[derive(Debug)]
pub(super) struct Rendered {
    pub samples: Vec<f32>,
    pub prosody: DurationPitchFrame,
    pub raw_durations: Vec<f32>,
}

/// Caller-supplied prosody applied to one render attempt
#[derive(Clone, Copy)]
pub(super) struct Edits<'a> {
    pub pitch: Option<&'a [f32]>,
    pub durations: Option<&'a [f32]>,
}

/// Tag tensor-level failures with the stage they happened in
pub(super) trait AtStage<T> {
    fn at(self, stage: InferenceStage) -> Result<T>;
}

impl<T, E: Into<TtsError>> AtStage<T> for std::result::Result<T, E> {
    fn at(self, stage: InferenceStage) -> Result<T> {
        self.map_err(|e| e.into().at_stage(stage))
    }
}

/// Try `edited`; on a retryable failure run `predicted` exactly once.
///
/// Returns the value and whether the fallback produced it. When both
/// attempts fail, the returned render error carries the first diagnostic.
pub fn with_single_fallback<T>(
    edited: impl FnOnce() -> Result<T>,
    predicted: impl FnOnce() -> Result<T>,
) -> Result<(T, bool)> {
    match edited() {
        Ok(value) => Ok((value, false)),
        Err(first) if first.is_retryable() => {
            tracing::warn!("Edited render failed, retrying from predictions: {}", first);
            predicted().map(|value| (value, true)).map_err(|retry| match retry {
                TtsError::Render { stage, message, .. } => TtsError::Render {
                    stage,
                    message,
                    first_attempt: Some(first.to_string()),
                },
                other => other,
            })
        }
        Err(first) => Err(first),
    }
}

/// Synthesis pipeline over a shared registry
pub struct SynthesisPipeline {
    pub(super) registry: Arc<ModelRegistry>,
    pub(super) config: PipelineConfig,
}

impl SynthesisPipeline {
    pub fn new(registry: Arc<ModelRegistry>, config: PipelineConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Make the chosen vocoder checkpoint resident, returning its path
    pub fn ensure_vocoder(&self, choice: VocoderChoice) -> Result<PathBuf> {
        let path = match choice {
            VocoderChoice::Bundled => self.config.bundled_vocoder.clone(),
            VocoderChoice::Paired => {
                let handle = self.registry.get(&self.config.acoustic_key)?;
                let entry = handle.lock()?;
                let acoustic = entry.checkpoint_path().ok_or_else(|| TtsError::ModelNotLoaded {
                    key: self.config.acoustic_key.clone(),
                })?;
                paired_vocoder_path(acoustic)
            }
        };
        self.registry.ensure_loaded(&self.config.vocoder_key, &path, 0)?;
        Ok(path)
    }

    /// Render one request and write it to `output`
    pub fn synthesize(
        &self,
        request: &SynthesisRequest,
        output: &Path,
        vocoder: VocoderChoice,
    ) -> Result<SynthesisOutcome> {
        request.validate()?;
        self.ensure_vocoder(vocoder)?;

        let acoustic_handle = self.registry.get(&self.config.acoustic_key)?;
        let vocoder_handle = self.registry.get(&self.config.vocoder_key)?;
        let acoustic_entry = acoustic_handle.lock()?;
        let vocoder_entry = vocoder_handle.lock()?;
        let model = acoustic_entry.acoustic()?;
        let vocoder = vocoder_entry.vocoder()?;

        let max_duration = request.max_duration.unwrap_or(self.config.max_duration);
        let render = |edits: Option<Edits<'_>>| {
            self.render_one(model, vocoder, request, max_duration, edits)
        };

        let (mut rendered, used_fallback) = if request.has_edits() {
            let edits = Edits {
                pitch: request.pitch.as_deref(),
                durations: request.durations.as_deref(),
            };
            with_single_fallback(|| render(Some(edits)), || render(None))?
        } else {
            (render(None)?, false)
        };

        normalize_peak(&mut rendered.samples);
        self.write(&rendered.samples, output)?;

        tracing::info!(
            "Synthesized {} symbols -> {} frames, {} samples to {:?}",
            request.symbols.len(),
            rendered.prosody.frame_count,
            rendered.samples.len(),
            output
        );

        Ok(SynthesisOutcome {
            path: output.to_path_buf(),
            sample_count: rendered.samples.len(),
            sample_rate: self.config.sample_rate,
            prosody: rendered.prosody,
            raw_durations: rendered.raw_durations,
            used_fallback,
        })
    }

    pub(super) fn render_one(
        &self,
        model: &dyn AcousticModel,
        vocoder: &dyn Vocoder,
        request: &SynthesisRequest,
        max_duration: f32,
        edits: Option<Edits<'_>>,
    ) -> Result<Rendered> {
        let device = model.device();
        let symbols = Tensor::new(request.symbols.as_slice(), device)
            .and_then(|t| t.unsqueeze(0))
            .at(InferenceStage::Encoding)?;
        let (features, mask) = model
            .encode(&symbols, request.speaker)
            .at(InferenceStage::Encoding)?;

        let raw_durations = match edits.and_then(|e| e.durations) {
            Some(durations) => durations
                .iter()
                .map(|&d| clamp_duration(d, max_duration))
                .collect(),
            None => {
                let log_durations = model
                    .predict_duration(&features, &mask)
                    .and_then(|t| Ok(first_row(&t)?))
                    .at(InferenceStage::DurationPrediction)?;
                durations_from_log(&log_durations, max_duration)
            }
        };
        let counts = repeat_counts(&raw_durations, request.pace, max_duration);
        let frame_count = frame_total(&counts, self.config.max_frames)?;
        if frame_count == 0 {
            return Err(TtsError::render(
                InferenceStage::LengthRegulation,
                "every symbol expanded to zero frames",
            ));
        }

        let (pitch, pitch_tensor) = match edits.and_then(|e| e.pitch) {
            Some(pitch) => {
                let tensor = Tensor::new(pitch, device)
                    .and_then(|t| t.unsqueeze(0))
                    .at(InferenceStage::PitchResolution)?;
                (pitch.to_vec(), tensor)
            }
            None => {
                let tensor = model
                    .predict_pitch(&features, &mask)
                    .at(InferenceStage::PitchResolution)?;
                (first_row(&tensor).at(InferenceStage::PitchResolution)?, tensor)
            }
        };
        let features = model
            .embed_pitch(&pitch_tensor)
            .and_then(|emb| Ok(features.broadcast_add(&emb)?.broadcast_mul(&mask)?))
            .at(InferenceStage::PitchResolution)?;

        let (frames, lengths) =
            regulate_tensor(&features, &[counts.clone()], None).at(InferenceStage::LengthRegulation)?;
        tracing::debug!("Regulated {:?} -> {:?}", features.dims(), frames.dims());

        let mel = model.decode(&frames, &lengths).at(InferenceStage::Decoding)?;
        let audio = vocoder.vocode(&mel).at(InferenceStage::Vocoding)?;
        let samples = self
            .finish_waveform(vocoder, &audio, 0, lengths[0])
            .at(InferenceStage::Vocoding)?;

        Ok(Rendered {
            samples,
            prosody: DurationPitchFrame {
                durations: counts,
                pitch,
                frame_count,
            },
            raw_durations,
        })
    }

    /// Trim row `index` of `(B, S)` audio to `frames * hop` samples and denoise it
    pub(super) fn finish_waveform(
        &self,
        vocoder: &dyn Vocoder,
        audio: &Tensor,
        index: usize,
        frames: usize,
    ) -> Result<Vec<f32>> {
        let samples = frames * vocoder.hop_length();
        let row = audio.narrow(0, index, 1)?.narrow(1, 0, samples)?;
        let row = match self.config.denoise_strength {
            Some(strength) if strength > 0.0 => vocoder.denoise(&row, strength).map_err(|e| {
                TtsError::Audio {
                    message: e.to_string(),
                    operation: AudioOperation::Denoising,
                }
            })?,
            _ => row,
        };
        Ok(row.squeeze(0)?.to_vec1::<f32>()?)
    }

    pub(super) fn write(&self, samples: &[f32], output: &Path) -> Result<()> {
        AudioOutput::save(samples, self.config.sample_rate, output).map_err(|e| TtsError::Audio {
            message: format!("{:#}", e),
            operation: AudioOperation::Saving,
        })
    }
}

/// `<stem>.hg.safetensors` next to an acoustic checkpoint
pub fn paired_vocoder_path(acoustic: &Path) -> PathBuf {
    acoustic.with_extension(PAIRED_VOCODER_SUFFIX)
}

/// Log-durations to clamped frame durations: `clamp(exp(x) - 1, 0, max)`
pub(super) fn durations_from_log(log_durations: &[f32], max_duration: f32) -> Vec<f32> {
    log_durations
        .iter()
        .map(|&x| clamp_duration(x.exp() - 1.0, max_duration))
        .collect()
}

pub(super) fn first_row(t: &Tensor) -> candle_core::Result<Vec<f32>> {
    t.get(0)?.to_vec1::<f32>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::InferenceStage;

    fn render_failure() -> TtsError {
        TtsError::render(InferenceStage::Decoding, "NaN in frames")
    }

    #[test]
    fn test_fallback_not_used_on_success() {
        let mut calls = 0;
        let (value, fell_back) = with_single_fallback(|| Ok(1), || {
            calls += 1;
            Ok(2)
        })
        .unwrap();
        assert_eq!((value, fell_back), (1, false));
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_fallback_runs_once_on_render_failure() {
        let (value, fell_back) =
            with_single_fallback(|| Err::<i32, _>(render_failure()), || Ok(2)).unwrap();
        assert_eq!((value, fell_back), (2, true));
    }

    #[test]
    fn test_fallback_failure_keeps_first_diagnostic() {
        let err = with_single_fallback(
            || Err::<i32, _>(render_failure()),
            || Err(TtsError::render(InferenceStage::Vocoding, "still broken")),
        )
        .unwrap_err();
        match err {
            TtsError::Render { stage, first_attempt, .. } => {
                assert_eq!(stage, InferenceStage::Vocoding);
                assert!(first_attempt.unwrap().contains("NaN in frames"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_shape_mismatch_is_not_retried() {
        let mut retried = false;
        let err = with_single_fallback(
            || {
                Err::<i32, _>(TtsError::ShapeMismatch {
                    field: "pitch override".into(),
                    expected: 3,
                    actual: 2,
                })
            },
            || {
                retried = true;
                Ok(0)
            },
        )
        .unwrap_err();
        assert!(matches!(err, TtsError::ShapeMismatch { .. }));
        assert!(!retried);
    }

    #[test]
    fn test_request_validation() {
        let ok = SynthesisRequest::new(vec![1, 2, 3]).with_pitch(vec![0.0; 3]);
        assert!(ok.validate().is_ok());

        let short_pitch = SynthesisRequest::new(vec![1, 2, 3]).with_pitch(vec![0.0; 2]);
        assert!(matches!(
            short_pitch.validate(),
            Err(TtsError::ShapeMismatch { expected: 3, actual: 2, .. })
        ));

        let long_durations = SynthesisRequest::new(vec![1, 2]).with_durations(vec![1.0; 3]);
        assert!(matches!(long_durations.validate(), Err(TtsError::ShapeMismatch { .. })));

        assert!(SynthesisRequest::new(vec![1]).with_pace(0.0).validate().is_err());
        assert!(SynthesisRequest::new(vec![]).validate().is_err());
    }

    #[test]
    fn test_durations_from_log() {
        let durations = durations_from_log(&[0.0, 2f32.ln(), 100.0, -10.0], 75.0);
        assert_eq!(durations[0], 0.0);
        assert!((durations[1] - 1.0).abs() < 1e-6);
        assert_eq!(durations[2], 75.0);
        assert_eq!(durations[3], 0.0);
    }

    #[test]
    fn test_paired_vocoder_path() {
        assert_eq!(
            paired_vocoder_path(Path::new("/models/narrator.safetensors")),
            PathBuf::from("/models/narrator.hg.safetensors")
        );
    }

    #[test]
    fn test_parse_request() {
        let request: SynthesisRequest =
            serde_json::from_str(r#"{"symbols": [12, 13], "speaker": 1}"#).unwrap();
        assert_eq!(request.pace, 1.0);
        assert_eq!(request.speaker, Some(1));
        assert!(!request.has_edits());
    }
}
