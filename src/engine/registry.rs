//! Model registry
//!
//! The registry owns every resident model, keyed by model name. Entries are
//! created lazily on first load and never evicted. Each entry sits behind its
//! own mutex, so loads, device moves and inference on one key are serialized
//! while other keys proceed independently.
//!
//! Checkpoint identity is the path: loading the path an entry already holds
//! is a no-op. A replace builds the new model completely before swapping it
//! in, so a failed load leaves the previous weights untouched.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use candle_core::Device;

use crate::core::device::ComputeDevice;
use crate::core::error::{Result, TtsError};
use crate::core::traits::{AcousticModel, ModelComponent, Vocoder};
use crate::models::{Checkpoint, FastPitch, FrameVocoder};

/// Registry key of the reference acoustic model
pub const FASTPITCH_KEY: &str = "fastpitch1_1";
/// Registry key of the reference vocoder
pub const HIFIGAN_KEY: &str = "hifigan";

/// Factory turning a deserialized checkpoint into a resident model
pub type ModelFactory =
    Arc<dyn Fn(&str, Checkpoint, usize) -> Result<ResidentModel> + Send + Sync>;

/// A built model of either kind
pub enum ResidentModel {
    Acoustic(Box<dyn AcousticModel>),
    Vocoder(Box<dyn Vocoder>),
}

impl ResidentModel {
    pub fn device(&self) -> &Device {
        match self {
            ResidentModel::Acoustic(m) => m.device(),
            ResidentModel::Vocoder(v) => v.device(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ResidentModel::Acoustic(_) => "acoustic",
            ResidentModel::Vocoder(_) => "vocoder",
        }
    }

    /// Fresh copy with all weights on `device`
    fn migrated(&self, device: &Device) -> Result<ResidentModel> {
        Ok(match self {
            ResidentModel::Acoustic(m) => ResidentModel::Acoustic(m.migrated(device)?),
            ResidentModel::Vocoder(v) => ResidentModel::Vocoder(v.migrated(device)?),
        })
    }
}

/// One registry slot
pub struct ModelEntry {
    key: String,
    checkpoint_path: Option<PathBuf>,
    speaker_count: usize,
    device: ComputeDevice,
    model: Option<ResidentModel>,
}

impl ModelEntry {
    fn new(key: &str, device: ComputeDevice) -> Self {
        Self {
            key: key.to_string(),
            checkpoint_path: None,
            speaker_count: 0,
            device,
            model: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn checkpoint_path(&self) -> Option<&Path> {
        self.checkpoint_path.as_deref()
    }

    pub fn speaker_count(&self) -> usize {
        self.speaker_count
    }

    pub fn device(&self) -> ComputeDevice {
        self.device
    }

    pub fn is_ready(&self) -> bool {
        self.model.is_some()
    }

    /// The resident acoustic model
    pub fn acoustic(&self) -> Result<&dyn AcousticModel> {
        match &self.model {
            Some(ResidentModel::Acoustic(m)) => Ok(m.as_ref()),
            Some(other) => Err(TtsError::Config {
                message: format!("model '{}' is a {} model, not acoustic", self.key, other.kind()),
                path: None,
            }),
            None => Err(TtsError::ModelNotLoaded { key: self.key.clone() }),
        }
    }

    /// The resident vocoder
    pub fn vocoder(&self) -> Result<&dyn Vocoder> {
        match &self.model {
            Some(ResidentModel::Vocoder(v)) => Ok(v.as_ref()),
            Some(other) => Err(TtsError::Config {
                message: format!("model '{}' is a {} model, not a vocoder", self.key, other.kind()),
                path: None,
            }),
            None => Err(TtsError::ModelNotLoaded { key: self.key.clone() }),
        }
    }
}

/// Shared handle to a loaded entry.
///
/// Locking the handle always observes the entry's current weights, so a
/// handle taken before a replace sees the new model afterwards.
#[derive(Clone)]
pub struct ModelHandle {
    entry: Arc<Mutex<ModelEntry>>,
}

impl ModelHandle {
    /// Acquire exclusive use of the entry
    pub fn lock(&self) -> Result<MutexGuard<'_, ModelEntry>> {
        self.entry.lock().map_err(|_| TtsError::Internal {
            message: "Failed to acquire model entry lock".to_string(),
            location: Some("ModelHandle::lock".to_string()),
        })
    }
}

/// Outcome of a device change
#[derive(Debug, Default)]
pub struct DeviceChangeReport {
    /// Keys whose weights moved to the new device
    pub migrated: Vec<String>,
    /// Entries that stayed where they were
    pub failures: Vec<TtsError>,
}

impl DeviceChangeReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Registry statistics
#[derive(Debug, Clone)]
pub struct RegistryStats {
    pub entries: usize,
    pub ready: usize,
    pub active_device: ComputeDevice,
    pub checkpoint_reads: usize,
}

/// Normalize a model type name to a registry key
/// (`"FastPitch 1.1"` becomes `"fastpitch1_1"`)
pub fn normalize_model_key(name: &str) -> String {
    name.to_lowercase().replace('.', "_").replace(' ', "")
}

/// Registry of resident models
pub struct ModelRegistry {
    factories: RwLock<HashMap<String, ModelFactory>>,
    entries: RwLock<HashMap<String, Arc<Mutex<ModelEntry>>>>,
    active_device: RwLock<ComputeDevice>,
    checkpoint_reads: AtomicUsize,
}

impl ModelRegistry {
    /// Create an empty registry with no known model kinds
    pub fn new(device: ComputeDevice) -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
            entries: RwLock::new(HashMap::new()),
            active_device: RwLock::new(device),
            checkpoint_reads: AtomicUsize::new(0),
        }
    }

    /// Create a registry that knows the reference models
    pub fn with_defaults(device: ComputeDevice) -> Result<Self> {
        let registry = Self::new(device);
        registry.register(FASTPITCH_KEY, |key, ckpt, speakers| {
            Ok(ResidentModel::Acoustic(Box::new(FastPitch::from_checkpoint(
                key, ckpt, speakers,
            )?)))
        })?;
        registry.register(HIFIGAN_KEY, |key, ckpt, _| {
            Ok(ResidentModel::Vocoder(Box::new(FrameVocoder::from_checkpoint(
                key, ckpt,
            )?)))
        })?;
        Ok(registry)
    }

    /// Register how to build the model stored under `key`
    pub fn register<F>(&self, key: &str, factory: F) -> Result<()>
    where
        F: Fn(&str, Checkpoint, usize) -> Result<ResidentModel> + Send + Sync + 'static,
    {
        self.factories
            .write()
            .map_err(|_| TtsError::Internal {
                message: "Failed to acquire write lock on factories".to_string(),
                location: Some("ModelRegistry::register".to_string()),
            })?
            .insert(key.to_string(), Arc::new(factory));
        Ok(())
    }

    pub fn active_device(&self) -> Result<ComputeDevice> {
        self.active_device
            .read()
            .map(|d| *d)
            .map_err(|_| TtsError::Internal {
                message: "Failed to acquire read lock on active device".to_string(),
                location: Some("ModelRegistry::active_device".to_string()),
            })
    }

    fn factory(&self, key: &str) -> Result<ModelFactory> {
        let factories = self.factories.read().map_err(|_| TtsError::Internal {
            message: "Failed to acquire read lock on factories".to_string(),
            location: Some("ModelRegistry::factory".to_string()),
        })?;
        factories.get(key).cloned().ok_or_else(|| TtsError::Config {
            message: format!("Unknown model '{}'", key),
            path: None,
        })
    }

    fn entry_or_insert(&self, key: &str) -> Result<Arc<Mutex<ModelEntry>>> {
        let device = self.active_device()?;
        let mut entries = self.entries.write().map_err(|_| TtsError::Internal {
            message: "Failed to acquire write lock on entries".to_string(),
            location: Some("ModelRegistry::entry_or_insert".to_string()),
        })?;
        Ok(Arc::clone(entries.entry(key.to_string()).or_insert_with(|| {
            tracing::debug!("Creating registry entry '{}' on {}", key, device);
            Arc::new(Mutex::new(ModelEntry::new(key, device)))
        })))
    }

    fn snapshot(&self) -> Result<Vec<Arc<Mutex<ModelEntry>>>> {
        let entries = self.entries.read().map_err(|_| TtsError::Internal {
            message: "Failed to acquire read lock on entries".to_string(),
            location: Some("ModelRegistry::snapshot".to_string()),
        })?;
        let mut keyed: Vec<_> = entries.iter().collect();
        keyed.sort_by(|a, b| a.0.cmp(b.0));
        Ok(keyed.into_iter().map(|(_, e)| Arc::clone(e)).collect())
    }

    /// Make sure `key` holds the checkpoint at `path`.
    ///
    /// Returns `true` when a checkpoint was read and swapped in, `false` when
    /// the entry already held this path.
    pub fn ensure_loaded<P: AsRef<Path>>(
        &self,
        key: &str,
        path: P,
        speaker_count: usize,
    ) -> Result<bool> {
        let path = path.as_ref();
        let factory = self.factory(key)?;
        let entry = self.entry_or_insert(key)?;
        let mut entry = entry.lock().map_err(|_| TtsError::Internal {
            message: "Failed to acquire model entry lock".to_string(),
            location: Some("ModelRegistry::ensure_loaded".to_string()),
        })?;

        if entry.is_ready() && entry.checkpoint_path.as_deref() == Some(path) {
            return Ok(false);
        }

        let device = entry.device.resolve().map_err(|e| TtsError::ModelLoad {
            key: key.to_string(),
            message: e.to_string(),
            path: Some(path.to_path_buf()),
        })?;

        self.checkpoint_reads.fetch_add(1, Ordering::Relaxed);
        let checkpoint = Checkpoint::read(key, path, &device)?;
        let model = factory(key, checkpoint, speaker_count)?;

        let previous = entry.checkpoint_path.replace(path.to_path_buf());
        entry.model = Some(model);
        entry.speaker_count = speaker_count;

        match previous {
            Some(old) => tracing::info!("Replaced '{}' checkpoint {:?} -> {:?}", key, old, path),
            None => tracing::info!("Loaded '{}' from {:?} on {}", key, path, entry.device),
        }
        Ok(true)
    }

    /// Move every entry to `device`.
    ///
    /// Each entry moves all-or-nothing; one failure does not stop the others.
    pub fn set_device(&self, device: ComputeDevice) -> Result<DeviceChangeReport> {
        *self.active_device.write().map_err(|_| TtsError::Internal {
            message: "Failed to acquire write lock on active device".to_string(),
            location: Some("ModelRegistry::set_device".to_string()),
        })? = device;
        tracing::info!("Active device set to {}", device);

        let target = device.resolve();
        let mut report = DeviceChangeReport::default();

        for entry in self.snapshot()? {
            let mut entry = entry.lock().map_err(|_| TtsError::Internal {
                message: "Failed to acquire model entry lock".to_string(),
                location: Some("ModelRegistry::set_device".to_string()),
            })?;
            if entry.device == device {
                continue;
            }

            let moved = match (&entry.model, &target) {
                (None, _) => Ok(None),
                (Some(model), Ok(target)) => model.migrated(target).map(Some),
                (Some(_), Err(e)) => Err(e.clone()),
            };

            match moved {
                Ok(model) => {
                    if model.is_some() {
                        entry.model = model;
                        report.migrated.push(entry.key.clone());
                    }
                    entry.device = device;
                }
                Err(e) => {
                    tracing::warn!("'{}' stays on {}: {}", entry.key, entry.device, e);
                    report.failures.push(TtsError::DeviceMigration {
                        key: entry.key.clone(),
                        device: device.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Handle to a loaded model
    pub fn get(&self, key: &str) -> Result<ModelHandle> {
        let entries = self.entries.read().map_err(|_| TtsError::Internal {
            message: "Failed to acquire read lock on entries".to_string(),
            location: Some("ModelRegistry::get".to_string()),
        })?;
        let entry = entries
            .get(key)
            .cloned()
            .ok_or_else(|| TtsError::ModelNotLoaded { key: key.to_string() })?;
        drop(entries);

        let handle = ModelHandle { entry };
        if !handle.lock()?.is_ready() {
            return Err(TtsError::ModelNotLoaded { key: key.to_string() });
        }
        Ok(handle)
    }

    /// Get registry statistics
    pub fn stats(&self) -> Result<RegistryStats> {
        let entries = self.snapshot()?;
        let mut ready = 0;
        for entry in &entries {
            let entry = entry.lock().map_err(|_| TtsError::Internal {
                message: "Failed to acquire model entry lock".to_string(),
                location: Some("ModelRegistry::stats".to_string()),
            })?;
            if entry.is_ready() {
                ready += 1;
            }
        }
        Ok(RegistryStats {
            entries: entries.len(),
            ready,
            active_device: self.active_device()?,
            checkpoint_reads: self.checkpoint_reads.load(Ordering::Relaxed),
        })
    }
}
