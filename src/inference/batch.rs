//! Batch synthesis
//!
//! Renders many independent requests in as few model passes as possible.
//! Items sharing a speaker go through one padded forward pass; each item
//! keeps its own pace and is trimmed to its own length before being written
//! to its own file. Items carrying prosody edits are rendered one by one so
//! they keep the single-request fallback behaviour. When a shared pass fails,
//! its items are rendered alone so one bad item only fails itself.

use candle_core::Tensor;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::length_regulator::{frame_total, regulate_tensor, repeat_counts};
use super::pipeline::{
    durations_from_log, AtStage, DurationPitchFrame, Rendered, SynthesisOutcome,
    SynthesisPipeline, SynthesisRequest, VocoderChoice,
};
use crate::audio::normalize_peak;
use crate::core::error::{InferenceStage, Result, TtsError};
use crate::core::outcome::JobOutcome;
use crate::core::traits::{AcousticModel, ModelComponent, Vocoder};
use crate::PAD_SYMBOL;

/// Counters of a finished batch
#[derive(Debug, Clone, Default)]
pub struct BatchStats {
    pub requests: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_time_ms: u64,
}

impl BatchStats {
    pub fn from_outcomes<T>(outcomes: &[JobOutcome<T>], total_time_ms: u64) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        Self {
            requests: outcomes.len(),
            succeeded,
            failed: outcomes.len() - succeeded,
            total_time_ms,
        }
    }
}

impl SynthesisPipeline {
    /// Render `requests[i]` into `outputs[i]`, one outcome per item in order
    pub fn synthesize_batch(
        &self,
        requests: &[SynthesisRequest],
        outputs: &[PathBuf],
        vocoder: VocoderChoice,
    ) -> Result<Vec<JobOutcome<SynthesisOutcome>>> {
        if requests.len() != outputs.len() {
            return Err(TtsError::Validation {
                message: format!(
                    "{} requests but {} output paths",
                    requests.len(),
                    outputs.len()
                ),
                field: Some("outputs".to_string()),
            });
        }
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        self.ensure_vocoder(vocoder)?;

        let mut outcomes: Vec<Option<JobOutcome<SynthesisOutcome>>> =
            (0..requests.len()).map(|_| None).collect();
        let mut groups: BTreeMap<Option<u32>, Vec<usize>> = BTreeMap::new();

        for (i, request) in requests.iter().enumerate() {
            if let Err(e) = request.validate() {
                outcomes[i] = Some(JobOutcome::Failure(e.to_string()));
            } else if request.has_edits() {
                outcomes[i] = Some(self.synthesize(request, &outputs[i], vocoder).into());
            } else {
                groups.entry(request.speaker).or_default().push(i);
            }
        }

        if !groups.is_empty() {
            let acoustic_handle = self.registry.get(&self.config.acoustic_key)?;
            let vocoder_handle = self.registry.get(&self.config.vocoder_key)?;
            let acoustic_entry = acoustic_handle.lock()?;
            let vocoder_entry = vocoder_handle.lock()?;
            let model = acoustic_entry.acoustic()?;
            let vocoder = vocoder_entry.vocoder()?;

            for (speaker, indices) in groups {
                let items: Vec<&SynthesisRequest> = indices.iter().map(|&i| &requests[i]).collect();
                match self.render_group(model, vocoder, &items, speaker) {
                    Ok(rendered) => {
                        for (&i, result) in indices.iter().zip(rendered) {
                            outcomes[i] = Some(self.write_item(result, &outputs[i]).into());
                        }
                    }
                    Err(e) if indices.len() > 1 => {
                        tracing::warn!(
                            "Batch group for speaker {:?} failed, rendering {} items alone: {}",
                            speaker,
                            indices.len(),
                            e
                        );
                        for &i in &indices {
                            let outcome =
                                self.render_alone(model, vocoder, &requests[i], &outputs[i]);
                            outcomes[i] = Some(outcome.into());
                        }
                    }
                    Err(e) => {
                        for &i in &indices {
                            outcomes[i] = Some(JobOutcome::Failure(e.to_string()));
                        }
                    }
                }
            }
        }

        let outcomes: Vec<JobOutcome<SynthesisOutcome>> = outcomes
            .into_iter()
            .map(|o| o.unwrap_or_else(|| JobOutcome::Failure("item was not rendered".to_string())))
            .collect();

        let stats = BatchStats::from_outcomes(&outcomes, start.elapsed().as_millis() as u64);
        tracing::info!(
            "Batch synthesis: {}/{} succeeded in {} ms",
            stats.succeeded,
            stats.requests,
            stats.total_time_ms
        );
        Ok(outcomes)
    }

    fn render_alone(
        &self,
        model: &dyn AcousticModel,
        vocoder: &dyn Vocoder,
        request: &SynthesisRequest,
        output: &Path,
    ) -> Result<SynthesisOutcome> {
        let max_duration = request.max_duration.unwrap_or(self.config.max_duration);
        let rendered = self
            .render_one(model, vocoder, request, max_duration, None)
            .map(|mut rendered| {
                normalize_peak(&mut rendered.samples);
                rendered
            });
        self.write_item(rendered, output)
    }

    fn write_item(&self, rendered: Result<Rendered>, output: &Path) -> Result<SynthesisOutcome> {
        let rendered = rendered?;
        self.write(&rendered.samples, output)?;
        Ok(SynthesisOutcome {
            path: output.to_path_buf(),
            sample_count: rendered.samples.len(),
            sample_rate: self.config.sample_rate,
            prosody: rendered.prosody,
            raw_durations: rendered.raw_durations,
            used_fallback: false,
        })
    }

    /// One padded forward pass over items sharing a speaker.
    ///
    /// The outer error fails the whole group; inner errors fail one item.
    fn render_group(
        &self,
        model: &dyn AcousticModel,
        vocoder: &dyn Vocoder,
        items: &[&SynthesisRequest],
        speaker: Option<u32>,
    ) -> Result<Vec<Result<Rendered>>> {
        let device = model.device();
        let batch = items.len();
        let max_symbols = items.iter().map(|r| r.symbols.len()).max().unwrap_or(0);

        let mut flat = Vec::with_capacity(batch * max_symbols);
        for item in items {
            flat.extend_from_slice(&item.symbols);
            flat.extend(std::iter::repeat(PAD_SYMBOL).take(max_symbols - item.symbols.len()));
        }
        let symbols =
            Tensor::from_vec(flat, (batch, max_symbols), device).at(InferenceStage::Encoding)?;
        let (features, mask) = model.encode(&symbols, speaker).at(InferenceStage::Encoding)?;

        let log_durations = model
            .predict_duration(&features, &mask)
            .and_then(|t| Ok(t.to_vec2::<f32>()?))
            .at(InferenceStage::DurationPrediction)?;

        let mut raw_durations = Vec::with_capacity(batch);
        let mut counts = Vec::with_capacity(batch);
        for (item, row) in items.iter().zip(&log_durations) {
            let max_duration = item.max_duration.unwrap_or(self.config.max_duration);
            let raw = durations_from_log(&row[..item.symbols.len()], max_duration);
            let mut reps = repeat_counts(&raw, item.pace, max_duration);
            frame_total(&reps, self.config.max_frames)?;
            reps.resize(max_symbols, 0);
            raw_durations.push(raw);
            counts.push(reps);
        }

        let pitch = model
            .predict_pitch(&features, &mask)
            .at(InferenceStage::PitchResolution)?;
        let pitch_rows = pitch.to_vec2::<f32>().at(InferenceStage::PitchResolution)?;
        let features = model
            .embed_pitch(&pitch)
            .and_then(|emb| Ok(features.broadcast_add(&emb)?.broadcast_mul(&mask)?))
            .at(InferenceStage::PitchResolution)?;

        let (frames, lengths) =
            regulate_tensor(&features, &counts, None).at(InferenceStage::LengthRegulation)?;

        let any_frames = lengths.iter().any(|&l| l > 0);
        let audio = if any_frames {
            let mel = model.decode(&frames, &lengths).at(InferenceStage::Decoding)?;
            Some(vocoder.vocode(&mel).at(InferenceStage::Vocoding)?)
        } else {
            None
        };

        let mut rendered = Vec::with_capacity(batch);
        for (i, item) in items.iter().enumerate() {
            let n = item.symbols.len();
            let result = match (&audio, lengths[i]) {
                (Some(audio), frames) if frames > 0 => self
                    .finish_waveform(vocoder, audio, i, frames)
                    .at(InferenceStage::Vocoding)
                    .map(|mut samples| {
                        normalize_peak(&mut samples);
                        let mut durations = counts[i].clone();
                        durations.truncate(n);
                        Rendered {
                            samples,
                            prosody: DurationPitchFrame {
                                durations,
                                pitch: pitch_rows[i][..n].to_vec(),
                                frame_count: frames,
                            },
                            raw_durations: raw_durations[i].clone(),
                        }
                    }),
                _ => Err(TtsError::render(
                    InferenceStage::LengthRegulation,
                    "every symbol expanded to zero frames",
                )),
            };
            rendered.push(result);
        }

        Ok(rendered)
    }
}
