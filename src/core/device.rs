//! Compute device selection

use std::fmt;
use std::str::FromStr;

use candle_core::Device;
use serde::{Deserialize, Serialize};

use super::error::{Result, TtsError};

/// Compute target a model's weights are resident on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDevice {
    #[default]
    Cpu,
    Gpu,
}

impl ComputeDevice {
    /// Resolve to a candle device.
    ///
    /// GPU resolution fails when no accelerator backend is compiled in or
    /// none is present; it never silently falls back to the CPU.
    pub fn resolve(&self) -> Result<Device> {
        match self {
            ComputeDevice::Cpu => Ok(Device::Cpu),
            ComputeDevice::Gpu => {
                if cfg!(feature = "metal") {
                    Device::new_metal(0)
                } else {
                    Device::new_cuda(0)
                }
                .map_err(|e| TtsError::Internal {
                    message: format!("accelerator unavailable: {}", e),
                    location: Some("ComputeDevice::resolve".to_string()),
                })
            }
        }
    }

    /// Classify a candle device
    pub fn of(device: &Device) -> Self {
        if device.is_cpu() {
            ComputeDevice::Cpu
        } else {
            ComputeDevice::Gpu
        }
    }
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeDevice::Cpu => write!(f, "cpu"),
            ComputeDevice::Gpu => write!(f, "gpu"),
        }
    }
}

impl FromStr for ComputeDevice {
    type Err = TtsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(ComputeDevice::Cpu),
            "gpu" | "cuda" | "metal" => Ok(ComputeDevice::Gpu),
            other => Err(TtsError::Validation {
                message: format!("unknown device '{}'", other),
                field: Some("device".to_string()),
            }),
        }
    }
}
