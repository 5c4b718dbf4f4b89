//! Service facade - the request surface of a running synthesis host
//!
//! [`SynthesisService`] bundles the model registry, the synthesis pipeline
//! and the post-processing executor behind one object that callers pass
//! around by reference.
//!
//! # Example
//!
//! ```rust,ignore
//! use voxhost::sdk::SynthesisService;
//! use voxhost::inference::SynthesisRequest;
//!
//! let service = SynthesisService::new(ServiceConfig::default())?;
//! service.load_model("FastPitch 1.1", "models/narrator.safetensors", 0)?;
//! service.set_vocoder(VocoderChoice::Paired)?;
//!
//! let request = SynthesisRequest::new(vec![19, 46, 2]).with_pace(1.1);
//! let outcome = service.synthesize(&request, Path::new("out.wav"))?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::audio::{PostExecutor, PostJob};
use crate::config::ServiceConfig;
use crate::core::device::ComputeDevice;
use crate::core::error::{Result, TtsError};
use crate::core::outcome::JobOutcome;
use crate::engine::{normalize_model_key, DeviceChangeReport, ModelRegistry, RegistryStats};
use crate::inference::{
    PipelineConfig, SynthesisOutcome, SynthesisPipeline, SynthesisRequest, VocoderChoice,
};

/// Long-lived synthesis host
pub struct SynthesisService {
    config: ServiceConfig,
    registry: Arc<ModelRegistry>,
    pipeline: SynthesisPipeline,
    post: PostExecutor,
    vocoder: RwLock<VocoderChoice>,
}

impl SynthesisService {
    /// Create a service with the reference model kinds registered
    pub fn new(config: ServiceConfig) -> Result<Self> {
        config.validate()?;
        let registry = ModelRegistry::with_defaults(config.device)?;
        Ok(Self::with_registry(config, Arc::new(registry)))
    }

    /// Create a service over an existing registry
    pub fn with_registry(config: ServiceConfig, registry: Arc<ModelRegistry>) -> Self {
        let pipeline = SynthesisPipeline::new(Arc::clone(&registry), PipelineConfig::from(&config));
        let post = PostExecutor::from_config(&config.audio_post);
        Self {
            config,
            registry,
            pipeline,
            post,
            vocoder: RwLock::new(VocoderChoice::default()),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Load a checkpoint under a model type name such as `"FastPitch 1.1"`
    pub fn load_model<P: AsRef<Path>>(
        &self,
        model_type: &str,
        path: P,
        speaker_count: usize,
    ) -> Result<bool> {
        let key = normalize_model_key(model_type);
        self.registry.ensure_loaded(&key, path, speaker_count)
    }

    /// Move every loaded model to `device`
    pub fn set_device(&self, device: ComputeDevice) -> Result<DeviceChangeReport> {
        self.registry.set_device(device)
    }

    /// Select and preload the vocoder used by later requests
    pub fn set_vocoder(&self, choice: VocoderChoice) -> Result<PathBuf> {
        let path = self.pipeline.ensure_vocoder(choice)?;
        *self.vocoder.write().map_err(|_| TtsError::Internal {
            message: "Failed to acquire write lock on vocoder choice".to_string(),
            location: Some("SynthesisService::set_vocoder".to_string()),
        })? = choice;
        Ok(path)
    }

    /// Currently selected vocoder
    pub fn vocoder(&self) -> Result<VocoderChoice> {
        self.vocoder.read().map(|v| *v).map_err(|_| TtsError::Internal {
            message: "Failed to acquire read lock on vocoder choice".to_string(),
            location: Some("SynthesisService::vocoder".to_string()),
        })
    }

    /// Render one request into `output`
    pub fn synthesize(&self, request: &SynthesisRequest, output: &Path) -> Result<SynthesisOutcome> {
        self.pipeline.synthesize(request, output, self.vocoder()?)
    }

    /// Render many requests, one file and one outcome each
    pub fn synthesize_batch(
        &self,
        requests: &[SynthesisRequest],
        outputs: &[PathBuf],
    ) -> Result<Vec<JobOutcome<SynthesisOutcome>>> {
        self.pipeline.synthesize_batch(requests, outputs, self.vocoder()?)
    }

    /// Run post-processing jobs on the worker pool
    pub fn post_process_batch(&self, jobs: &[PostJob]) -> Result<Vec<JobOutcome<PathBuf>>> {
        self.post.run(jobs)
    }

    /// Registry statistics
    pub fn stats(&self) -> Result<RegistryStats> {
        self.registry.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_starts_empty() {
        let service = SynthesisService::new(ServiceConfig::default()).unwrap();
        let stats = service.stats().unwrap();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.active_device, ComputeDevice::Cpu);
        assert_eq!(service.vocoder().unwrap(), VocoderChoice::Bundled);
    }

    #[test]
    fn test_synthesize_before_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServiceConfig::default();
        config.bundled_vocoder = dir.path().join("missing.safetensors");
        let service = SynthesisService::new(config).unwrap();

        let out = dir.path().join("out.wav");
        let result = service.synthesize(&SynthesisRequest::new(vec![12, 13]), &out);
        assert!(result.is_err());
        assert!(!out.exists());
    }

    #[test]
    fn test_poisoned_vocoder_choice_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let service = SynthesisService::new(ServiceConfig::default()).unwrap();
        std::thread::scope(|s| {
            let poisoner = s.spawn(|| {
                let _guard = service.vocoder.write().unwrap();
                panic!("writer died holding the choice");
            });
            assert!(poisoner.join().is_err());
        });

        assert!(matches!(service.vocoder(), Err(TtsError::Internal { .. })));
        let out = dir.path().join("out.wav");
        assert!(matches!(
            service.synthesize(&SynthesisRequest::new(vec![12, 13]), &out),
            Err(TtsError::Internal { .. })
        ));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = ServiceConfig::default();
        config.sample_rate = 0;
        assert!(SynthesisService::new(config).is_err());
    }
}
