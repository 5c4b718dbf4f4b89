//! Layer loading and device migration helpers

use candle_core::{DType, Device, Tensor};
use candle_nn::{Embedding, Linear};
use std::collections::HashMap;

use super::checkpoint::Checkpoint;
use crate::core::error::Result;

/// Load `{prefix}.weight` `[out, in]` and `{prefix}.bias` `[out]`
pub(crate) fn load_linear(
    ckpt: &mut Checkpoint,
    prefix: &str,
    out_dim: usize,
    in_dim: usize,
) -> Result<Linear> {
    let weight = ckpt.take(&format!("{}.weight", prefix), &[out_dim, in_dim])?;
    let bias = ckpt.take(&format!("{}.bias", prefix), &[out_dim])?;
    Ok(Linear::new(weight, Some(bias)))
}

/// Load an embedding table `{prefix}.weight` `[rows, dim]`
pub(crate) fn load_embedding(
    ckpt: &mut Checkpoint,
    prefix: &str,
    rows: usize,
    dim: usize,
) -> Result<Embedding> {
    let weight = ckpt.take(&format!("{}.weight", prefix), &[rows, dim])?;
    Ok(Embedding::new(weight, dim))
}

pub(crate) fn migrate_linear(layer: &Linear, device: &Device) -> Result<Linear> {
    let weight = layer.weight().to_device(device)?;
    let bias = match layer.bias() {
        Some(b) => Some(b.to_device(device)?),
        None => None,
    };
    Ok(Linear::new(weight, bias))
}

pub(crate) fn migrate_embedding(layer: &Embedding, device: &Device) -> Result<Embedding> {
    let table = layer.embeddings().to_device(device)?;
    let dim = table.dim(1)?;
    Ok(Embedding::new(table, dim))
}

/// Random `[out, in]` weight and constant bias for initializing fresh checkpoints
pub(crate) fn init_linear(
    tensors: &mut HashMap<String, Tensor>,
    prefix: &str,
    out_dim: usize,
    in_dim: usize,
    bias: f64,
) -> Result<()> {
    let device = Device::Cpu;
    let std = (1.0 / in_dim as f64).sqrt();
    tensors.insert(
        format!("{}.weight", prefix),
        Tensor::randn(0f32, std as f32, (out_dim, in_dim), &device)?,
    );
    tensors.insert(
        format!("{}.bias", prefix),
        (Tensor::ones(out_dim, DType::F32, &device)? * bias)?,
    );
    Ok(())
}
