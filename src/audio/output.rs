//! Audio file output
//!
//! Provides:
//! - WAV file saving (16-bit PCM)
//! - Peak limiting before quantization

use anyhow::{Context, Result};
use std::path::Path;

/// Audio output handler for saving rendered waveforms
pub struct AudioOutput;

impl AudioOutput {
    /// Save audio samples to a WAV file (16-bit PCM, mono)
    ///
    /// # Arguments
    /// * `samples` - Audio samples (f32, normalized to [-1, 1])
    /// * `sample_rate` - Sample rate in Hz
    /// * `path` - Output file path
    pub fn save<P: AsRef<Path>>(samples: &[f32], sample_rate: u32, path: P) -> Result<()> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(path.as_ref(), spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", path.as_ref()))?;

        for &sample in samples {
            let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer.write_sample(scaled)?;
        }

        writer.finalize()?;
        Ok(())
    }
}

/// Scale samples down so the peak magnitude is at most 1.0.
///
/// Quiet audio is left untouched; only clipping peaks are attenuated.
/// Returns the applied gain.
pub fn normalize_peak(samples: &mut [f32]) -> f32 {
    let peak = samples
        .iter()
        .filter(|s| s.is_finite())
        .fold(0f32, |acc, s| acc.max(s.abs()));

    for s in samples.iter_mut() {
        if !s.is_finite() {
            *s = 0.0;
        }
    }

    if peak > 1.0 {
        let gain = 1.0 / peak;
        for s in samples.iter_mut() {
            *s *= gain;
        }
        gain
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");

        let samples: Vec<f32> = (0..2205)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 22050.0).sin() * 0.5)
            .collect();
        AudioOutput::save(&samples, 22050, &path).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 22050);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len(), 2205);
    }

    #[test]
    fn test_normalize_attenuates_only() {
        let mut loud = vec![0.5, -2.0, 1.0];
        let gain = normalize_peak(&mut loud);
        assert_eq!(gain, 0.5);
        assert_eq!(loud, vec![0.25, -1.0, 0.5]);

        let mut quiet = vec![0.1, -0.2];
        assert_eq!(normalize_peak(&mut quiet), 1.0);
        assert_eq!(quiet, vec![0.1, -0.2]);
    }

    #[test]
    fn test_normalize_drops_non_finite() {
        let mut samples = vec![f32::NAN, 0.5, f32::INFINITY];
        normalize_peak(&mut samples);
        assert_eq!(samples, vec![0.0, 0.5, 0.0]);
    }
}
