//! Length regulation
//!
//! Expands a symbol-level sequence into a frame-level one by repeating each
//! symbol `count[i]` times. Batches are padded to the longest item with a
//! neutral value and optionally truncated to a frame ceiling; the true length
//! of every item is reported alongside.

use candle_core::Tensor;

use crate::core::error::{InferenceStage, Result, TtsError};

/// Clamp a duration into `[0, max_duration]`, mapping NaN to 0
pub fn clamp_duration(duration: f32, max_duration: f32) -> f32 {
    if duration.is_nan() {
        0.0
    } else {
        duration.clamp(0.0, max_duration)
    }
}

/// Convert per-symbol durations into repeat counts.
///
/// Every duration is clamped first, so an unbounded or negative prediction
/// can never reach the expansion step. Rounding is half-to-even.
pub fn repeat_counts(durations: &[f32], pace: f32, max_duration: f32) -> Vec<usize> {
    durations
        .iter()
        .map(|&d| (clamp_duration(d, max_duration) * pace).round_ties_even() as usize)
        .collect()
}

/// Sum of repeat counts, `None` when it does not fit in `usize`
fn checked_total(counts: &[usize]) -> Option<usize> {
    counts.iter().try_fold(0usize, |acc, &n| acc.checked_add(n))
}

/// Frame count of one item, rejected above `max_frames`
pub fn frame_total(counts: &[usize], max_frames: usize) -> Result<usize> {
    match checked_total(counts) {
        Some(total) if total <= max_frames => Ok(total),
        _ => Err(TtsError::Validation {
            message: format!(
                "expansion exceeds the ceiling of {} frames; lower the pace",
                max_frames
            ),
            field: Some("pace".to_string()),
        }),
    }
}

/// Output of a batch expansion
#[derive(Debug, Clone, PartialEq)]
pub struct Regulated<T> {
    /// One padded row per item, all of equal length
    pub frames: Vec<Vec<T>>,
    /// True (unpadded, ceiling-clamped) length of every item
    pub lengths: Vec<usize>,
}

impl<T> Regulated<T> {
    /// Padded frame count shared by every row
    pub fn max_len(&self) -> usize {
        self.frames.first().map(Vec::len).unwrap_or(0)
    }
}

/// Expand every sequence by its repeat counts
pub fn regulate<T: Clone>(
    sequences: &[Vec<T>],
    counts: &[Vec<usize>],
    pad: T,
    max_len: Option<usize>,
) -> Result<Regulated<T>> {
    if sequences.len() != counts.len() {
        return Err(TtsError::ShapeMismatch {
            field: "duration batch".to_string(),
            expected: sequences.len(),
            actual: counts.len(),
        });
    }

    let mut frames = Vec::with_capacity(sequences.len());
    for (sequence, reps) in sequences.iter().zip(counts) {
        if sequence.len() != reps.len() {
            return Err(TtsError::ShapeMismatch {
                field: "durations".to_string(),
                expected: sequence.len(),
                actual: reps.len(),
            });
        }
        let budget = match (checked_total(reps), max_len) {
            (Some(total), ceiling) => ceiling.map_or(total, |c| total.min(c)),
            (None, Some(ceiling)) => ceiling,
            (None, None) => {
                return Err(TtsError::render(
                    InferenceStage::LengthRegulation,
                    "frame count overflows",
                ))
            }
        };
        let mut expanded = Vec::with_capacity(budget);
        for (value, &n) in sequence.iter().zip(reps) {
            let room = budget - expanded.len();
            if room == 0 {
                break;
            }
            expanded.extend(std::iter::repeat(value.clone()).take(n.min(room)));
        }
        frames.push(expanded);
    }

    let mut lengths: Vec<usize> = frames.iter().map(Vec::len).collect();
    let mut longest = lengths.iter().copied().max().unwrap_or(0);
    if let Some(ceiling) = max_len {
        longest = longest.min(ceiling);
        for len in lengths.iter_mut() {
            *len = (*len).min(ceiling);
        }
    }

    for row in frames.iter_mut() {
        row.truncate(longest);
        row.resize(longest, pad.clone());
    }

    Ok(Regulated { frames, lengths })
}

/// Expand `(B, T, D)` features into `(B, F, D)` frames, zero-padded
pub fn regulate_tensor(
    features: &Tensor,
    counts: &[Vec<usize>],
    max_len: Option<usize>,
) -> Result<(Tensor, Vec<usize>)> {
    let (batch, symbols, dim) = features.dims3()?;
    let positions: Vec<Vec<u32>> = (0..batch).map(|_| (0..symbols as u32).collect()).collect();
    let plan = regulate(&positions, counts, 0u32, max_len)?;
    let total = plan.max_len();
    let device = features.device();

    if total == 0 {
        return Ok((
            Tensor::zeros((batch, 0, dim), features.dtype(), device)?,
            plan.lengths,
        ));
    }

    let mut rows = Vec::with_capacity(batch);
    for (b, (indices, &len)) in plan.frames.iter().zip(&plan.lengths).enumerate() {
        let item = features.get(b)?;
        let row = if len == 0 {
            Tensor::zeros((total, dim), features.dtype(), device)?
        } else {
            let ids = Tensor::new(&indices[..len], device)?;
            let body = item.index_select(&ids, 0)?;
            if len < total {
                let padding = Tensor::zeros((total - len, dim), features.dtype(), device)?;
                Tensor::cat(&[&body, &padding], 0)?
            } else {
                body
            }
        };
        rows.push(row);
    }

    Ok((Tensor::stack(&rows, 0)?, plan.lengths))
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_negative_and_nan_durations_clamp_to_zero() {
        assert_eq!(repeat_counts(&[-5.0, f32::NAN, 2.0], 1.0, 75.0), vec![0, 0, 2]);
    }

    #[test]
    fn test_ceiling_applies_before_pace() {
        assert_eq!(repeat_counts(&[1000.0], 2.0, 75.0), vec![150]);
    }

    #[test]
    fn test_round_half_to_even() {
        assert_eq!(repeat_counts(&[0.5, 1.5, 2.5], 1.0, 75.0), vec![0, 2, 2]);
    }

    #[test]
    fn test_frame_count_is_sum_of_rounded_counts() {
        let durations = [1.2f32, 3.7, 0.4, 2.0];
        let pace = 1.3;
        let counts = repeat_counts(&durations, pace, 75.0);
        let expected: usize = durations
            .iter()
            .map(|d| (d * pace).round_ties_even() as usize)
            .sum();

        let out = regulate(&[vec!['a', 'b', 'c', 'd']], &[counts], '_', None).unwrap();
        assert_eq!(out.lengths, vec![expected]);
    }

    #[test]
    fn test_pads_to_longest() {
        let out = regulate(
            &[vec![1, 2], vec![3]],
            &[vec![2, 1], vec![1]],
            0,
            None,
        )
        .unwrap();
        assert_eq!(out.frames, vec![vec![1, 1, 2], vec![3, 0, 0]]);
        assert_eq!(out.lengths, vec![3, 1]);
    }

    #[test]
    fn test_ceiling_truncates_and_clamps_lengths() {
        let out = regulate(
            &[vec![1, 2], vec![3]],
            &[vec![3, 3], vec![2]],
            0,
            Some(4),
        )
        .unwrap();
        assert_eq!(out.frames, vec![vec![1, 1, 1, 2], vec![3, 3, 0, 0]]);
        assert_eq!(out.lengths, vec![4, 2]);
    }

    #[test]
    fn test_huge_pace_saturates_without_panicking() {
        let counts = repeat_counts(&[3.0, 4.0], 1e30, 75.0);
        assert_eq!(counts, vec![usize::MAX, usize::MAX]);

        let err = frame_total(&counts, 40_000).unwrap_err();
        assert!(matches!(err, TtsError::Validation { field: Some(ref f), .. } if f == "pace"));

        let err = regulate(&[vec![1, 2]], &[counts.clone()], 0, None).unwrap_err();
        assert!(matches!(
            err,
            TtsError::Render { stage: InferenceStage::LengthRegulation, .. }
        ));

        let out = regulate(&[vec![1, 2]], &[counts], 0, Some(3)).unwrap();
        assert_eq!(out.frames, vec![vec![1, 1, 1]]);
        assert_eq!(out.lengths, vec![3]);
    }

    #[test]
    fn test_frame_total_within_ceiling() {
        assert_eq!(frame_total(&[2, 0, 5], 7).unwrap(), 7);
        assert!(frame_total(&[2, 0, 6], 7).is_err());
    }

    #[test]
    fn test_count_length_mismatch() {
        let err = regulate(&[vec![1, 2, 3]], &[vec![1, 1]], 0, None).unwrap_err();
        assert!(matches!(err, TtsError::ShapeMismatch { expected: 3, actual: 2, .. }));
    }

    #[test]
    fn test_tensor_expansion() {
        let device = Device::Cpu;
        // (B=2, T=2, D=1)
        let features = Tensor::new(&[[[1f32], [2.0]], [[3.0], [4.0]]], &device).unwrap();
        let (frames, lengths) =
            regulate_tensor(&features, &[vec![1, 2], vec![0, 1]], None).unwrap();

        assert_eq!(lengths, vec![3, 1]);
        let values = frames.squeeze(2).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(values, vec![vec![1.0, 2.0, 2.0], vec![4.0, 0.0, 0.0]]);
    }
}
