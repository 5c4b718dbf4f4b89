//! Checkpoint files
//!
//! A checkpoint is a safetensors file, optionally accompanied by a sidecar
//! `<stem>.json` describing how the model was trained. Loading is strict:
//! builders [`Checkpoint::take`] every tensor they expect and
//! [`Checkpoint::finish`] rejects anything left over.

use candle_core::{safetensors, Device, Tensor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::core::error::{Result, TtsError};

/// Sidecar metadata stored next to a checkpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Symbol alphabet the acoustic model was trained on
    #[serde(default)]
    pub symbols_alphabet: Option<String>,
}

/// Deserialized checkpoint awaiting structural validation
pub struct Checkpoint {
    key: String,
    path: PathBuf,
    tensors: HashMap<String, Tensor>,
    metadata: CheckpointMetadata,
}

impl Checkpoint {
    /// Read a checkpoint for the model `key` onto `device`.
    ///
    /// Missing or undecodable files are a [`TtsError::ModelLoad`].
    pub fn read<P: AsRef<Path>>(key: &str, path: P, device: &Device) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(TtsError::ModelLoad {
                key: key.to_string(),
                message: "checkpoint file not found".to_string(),
                path: Some(path.to_path_buf()),
            });
        }

        tracing::debug!("Reading checkpoint {:?} for '{}'", path, key);
        let tensors = safetensors::load(path, device).map_err(|e| TtsError::ModelLoad {
            key: key.to_string(),
            message: format!("checkpoint is corrupt: {}", e),
            path: Some(path.to_path_buf()),
        })?;

        let metadata = Self::read_sidecar(key, path)?;

        Ok(Self {
            key: key.to_string(),
            path: path.to_path_buf(),
            tensors,
            metadata,
        })
    }

    fn read_sidecar(key: &str, path: &Path) -> Result<CheckpointMetadata> {
        let sidecar = sidecar_path(path);
        if !sidecar.is_file() {
            return Ok(CheckpointMetadata::default());
        }
        let content = std::fs::read_to_string(&sidecar).map_err(|e| TtsError::ModelLoad {
            key: key.to_string(),
            message: format!("failed to read sidecar metadata: {}", e),
            path: Some(sidecar.clone()),
        })?;
        serde_json::from_str(&content).map_err(|e| TtsError::ModelLoad {
            key: key.to_string(),
            message: format!("invalid sidecar metadata: {}", e),
            path: Some(sidecar),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> &CheckpointMetadata {
        &self.metadata
    }

    /// Shape of a tensor without taking it
    pub fn peek_dims(&self, name: &str) -> Option<&[usize]> {
        self.tensors.get(name).map(|t| t.dims())
    }

    /// Leading dimension of a tensor, if present
    pub fn leading_dim(&self, name: &str) -> Option<usize> {
        self.peek_dims(name).and_then(|dims| dims.first().copied())
    }

    /// Remove a tensor and check its shape
    pub fn take(&mut self, name: &str, shape: &[usize]) -> Result<Tensor> {
        let tensor = self.tensors.remove(name).ok_or_else(|| {
            self.mismatch(format!("missing tensor '{}'", name))
        })?;
        if tensor.dims() != shape {
            return Err(self.mismatch(format!(
                "tensor '{}' has shape {:?}, expected {:?}",
                name,
                tensor.dims(),
                shape
            )));
        }
        tensor
            .to_dtype(candle_core::DType::F32)
            .map_err(|e| self.mismatch(format!("tensor '{}' is not numeric: {}", name, e)))
    }

    /// Reject tensors no builder asked for
    pub fn finish(self) -> Result<()> {
        if self.tensors.is_empty() {
            return Ok(());
        }
        let mut names: Vec<&String> = self.tensors.keys().collect();
        names.sort();
        let listed = names
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        Err(self.mismatch(format!("unexpected tensors: {}", listed)))
    }

    /// Build a structural mismatch error for this checkpoint
    pub fn mismatch(&self, message: impl Into<String>) -> TtsError {
        TtsError::CheckpointMismatch {
            key: self.key.clone(),
            message: message.into(),
            path: Some(self.path.clone()),
        }
    }

    /// Write tensors (and optional metadata) as a checkpoint
    pub fn save<P: AsRef<Path>>(
        path: P,
        tensors: &HashMap<String, Tensor>,
        metadata: Option<&CheckpointMetadata>,
    ) -> Result<()> {
        let path = path.as_ref();
        safetensors::save(tensors, path).map_err(|e| TtsError::Io {
            message: format!("failed to write checkpoint: {}", e),
            path: Some(path.to_path_buf()),
        })?;
        if let Some(metadata) = metadata {
            let json = serde_json::to_string_pretty(metadata).map_err(|e| TtsError::Internal {
                message: format!("failed to serialize metadata: {}", e),
                location: Some("Checkpoint::save".to_string()),
            })?;
            std::fs::write(sidecar_path(path), json)?;
        }
        Ok(())
    }
}

/// `<stem>.json` next to a checkpoint
pub fn sidecar_path(path: &Path) -> PathBuf {
    path.with_extension("json")
}
