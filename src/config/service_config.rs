//! Service configuration loaded from `voxhost.yaml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::device::ComputeDevice;
use crate::core::error::{Result, TtsError};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Device new models are created on
    #[serde(default)]
    pub device: ComputeDevice,

    /// Output sample rate of synthesized audio
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Ceiling on a predicted per-symbol duration, in frames
    #[serde(default = "default_max_duration")]
    pub max_duration: f32,

    /// Ceiling on the expanded frame count of one item
    #[serde(default = "default_max_frames")]
    pub max_frames: usize,

    /// Vocoder bias removal strength (None disables the denoiser)
    #[serde(default = "default_denoise_strength")]
    pub denoise_strength: Option<f32>,

    /// Registry key of the acoustic model
    #[serde(default = "default_acoustic_model")]
    pub acoustic_model: String,

    /// Registry key of the vocoder
    #[serde(default = "default_vocoder_model")]
    pub vocoder_model: String,

    /// Shared vocoder checkpoint used by the "bundled" vocoder choice
    #[serde(default = "default_bundled_vocoder")]
    pub bundled_vocoder: PathBuf,

    /// Batch post-processing settings
    #[serde(default)]
    pub audio_post: AudioPostConfig,
}

/// Batch post-processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioPostConfig {
    /// Audio filtering tool invoked per job
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Worker count (0 = available cores minus one)
    #[serde(default)]
    pub workers: usize,

    /// Sample rate pitch shifting is expressed against
    #[serde(default = "default_sample_rate")]
    pub base_rate: u32,
}

impl Default for AudioPostConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            workers: 0,
            base_rate: default_sample_rate(),
        }
    }
}

fn default_sample_rate() -> u32 {
    crate::DEFAULT_SAMPLE_RATE
}

fn default_max_duration() -> f32 {
    75.0
}

fn default_max_frames() -> usize {
    40_000
}

fn default_denoise_strength() -> Option<f32> {
    Some(0.01)
}

fn default_acoustic_model() -> String {
    "fastpitch1_1".to_string()
}

fn default_vocoder_model() -> String {
    "hifigan".to_string()
}

fn default_bundled_vocoder() -> PathBuf {
    PathBuf::from("resources/hifigan/hifi.safetensors")
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            device: ComputeDevice::default(),
            sample_rate: default_sample_rate(),
            max_duration: default_max_duration(),
            max_frames: default_max_frames(),
            denoise_strength: default_denoise_strength(),
            acoustic_model: default_acoustic_model(),
            vocoder_model: default_vocoder_model(),
            bundled_vocoder: default_bundled_vocoder(),
            audio_post: AudioPostConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| TtsError::Config {
            message: format!("failed to read config file: {}", e),
            path: Some(path.to_path_buf()),
        })?;

        let config = Self::from_yaml(&content).map_err(|e| match e {
            TtsError::Config { message, .. } => TtsError::Config {
                message,
                path: Some(path.to_path_buf()),
            },
            other => other,
        })?;
        Ok(config)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content).map_err(|e| TtsError::Config {
            message: format!("failed to parse config YAML: {}", e),
            path: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self).map_err(|e| TtsError::Config {
            message: format!("failed to serialize config: {}", e),
            path: Some(path.as_ref().to_path_buf()),
        })?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str, field: &str| TtsError::Config {
            message: format!("{}: {}", field, message),
            path: None,
        };

        if self.sample_rate == 0 {
            return Err(invalid("must be positive", "sample_rate"));
        }
        if !(self.max_duration.is_finite() && self.max_duration > 0.0) {
            return Err(invalid("must be a positive number of frames", "max_duration"));
        }
        if self.max_frames == 0 {
            return Err(invalid("must be a positive number of frames", "max_frames"));
        }
        if let Some(strength) = self.denoise_strength {
            if !(strength.is_finite() && strength >= 0.0) {
                return Err(invalid("must not be negative", "denoise_strength"));
            }
        }
        if self.acoustic_model.trim().is_empty() {
            return Err(invalid("must not be empty", "acoustic_model"));
        }
        if self.vocoder_model.trim().is_empty() {
            return Err(invalid("must not be empty", "vocoder_model"));
        }
        if self.acoustic_model == self.vocoder_model {
            return Err(invalid("must differ from acoustic_model", "vocoder_model"));
        }
        if self.audio_post.base_rate == 0 {
            return Err(invalid("must be positive", "audio_post.base_rate"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.sample_rate, 22050);
        assert_eq!(config.max_duration, 75.0);
        assert_eq!(config.max_frames, 40_000);
        assert_eq!(config.denoise_strength, Some(0.01));
        assert_eq!(config.acoustic_model, "fastpitch1_1");
        assert_eq!(config.audio_post.workers, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
device: gpu
max_duration: 40
denoise_strength: null
audio_post:
    ffmpeg_path: /opt/ffmpeg/bin/ffmpeg
    workers: 3
"#;
        let config = ServiceConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.device, ComputeDevice::Gpu);
        assert_eq!(config.max_duration, 40.0);
        assert_eq!(config.denoise_strength, None);
        assert_eq!(config.audio_post.workers, 3);
        assert_eq!(config.audio_post.base_rate, 22050);
        assert_eq!(config.vocoder_model, "hifigan");
    }

    #[test]
    fn test_rejects_bad_ceiling() {
        let err = ServiceConfig::from_yaml("max_duration: -1").unwrap_err();
        assert!(err.to_string().contains("max_duration"));

        let err = ServiceConfig::from_yaml("max_frames: 0").unwrap_err();
        assert!(err.to_string().contains("max_frames"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voxhost.yaml");
        let mut config = ServiceConfig::default();
        config.sample_rate = 44100;
        config.save(&path).unwrap();

        let loaded = ServiceConfig::load(&path).unwrap();
        assert_eq!(loaded.sample_rate, 44100);
    }

    #[test]
    fn test_missing_file_reports_path() {
        match ServiceConfig::load("/nonexistent/voxhost.yaml") {
            Err(TtsError::Config { path, .. }) => {
                assert_eq!(path, Some(PathBuf::from("/nonexistent/voxhost.yaml")))
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
