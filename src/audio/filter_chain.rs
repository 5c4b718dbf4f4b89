//! Filter-chain construction for the external audio tool
//!
//! [`FilterOptions`] mirrors the option object accepted by the request
//! surface. [`FilterOptions::stages`] turns it into an ordered list of
//! [`FilterStage`]s, always in the same order:
//!
//! ```text
//! resample → pad start → pad end → pitch shift → tempo scale → gain
//! ```

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::Path;

use crate::core::error::{Result, TtsError};

/// Options of one post-processing job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterOptions {
    /// Output sample rate
    #[serde(default)]
    pub hz: Option<u32>,

    /// Leading silence in milliseconds
    #[serde(default, rename = "padStart")]
    pub pad_start: Option<f64>,

    /// Trailing silence in milliseconds
    #[serde(default, rename = "padEnd")]
    pub pad_end: Option<f64>,

    /// Pitch-shift ratio; duration is preserved
    #[serde(default, rename = "pitchMult")]
    pub pitch_mult: Option<f64>,

    /// Tempo-scale ratio
    #[serde(default)]
    pub tempo: Option<f64>,

    /// Linear gain multiplier
    #[serde(default)]
    pub amplitude: Option<f64>,

    /// Output sample format handed to the tool as the audio codec
    #[serde(default)]
    pub bit_depth: Option<String>,
}

/// One step of the filter chain
#[derive(Debug, Clone, PartialEq)]
pub enum FilterStage {
    Resample(u32),
    PadStart(f64),
    PadEnd(f64),
    /// Resample-based shift followed by a tempo correction of `1 / ratio`
    PitchShift { ratio: f64, base_rate: u32 },
    TempoScale(f64),
    Gain(f64),
}

impl FilterStage {
    /// Filter graph expression, `None` for stages applied as output options
    pub fn expression(&self) -> Option<String> {
        match self {
            FilterStage::Resample(_) => None,
            FilterStage::PadStart(ms) => Some(format!("adelay={}", ms)),
            FilterStage::PadEnd(ms) => Some(format!("apad=pad_dur={}ms", ms)),
            FilterStage::PitchShift { ratio, base_rate } => Some(format!(
                "asetrate={},atempo={}",
                *base_rate as f64 * ratio,
                1.0 / ratio
            )),
            FilterStage::TempoScale(t) => Some(format!("atempo={}", t)),
            FilterStage::Gain(g) => Some(format!("volume={}", g)),
        }
    }
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterStage::Resample(hz) => write!(f, "resample to {} Hz", hz),
            other => write!(f, "{}", other.expression().unwrap_or_default()),
        }
    }
}

fn invalid(field: &str, message: &str) -> TtsError {
    TtsError::Validation {
        message: format!("{} {}", field, message),
        field: Some(field.to_string()),
    }
}

fn check_positive(field: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(invalid(field, "must be a positive number"))
    }
}

fn check_non_negative(field: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(invalid(field, "must not be negative"))
    }
}

impl FilterOptions {
    /// Ordered filter stages. Unset options and zero pads add no stage.
    pub fn stages(&self, base_rate: u32) -> Result<Vec<FilterStage>> {
        let mut stages = Vec::new();

        if let Some(hz) = self.hz {
            if hz == 0 {
                return Err(invalid("hz", "must be a positive sample rate"));
            }
            stages.push(FilterStage::Resample(hz));
        }
        if let Some(ms) = self.pad_start {
            if check_non_negative("padStart", ms)? > 0.0 {
                stages.push(FilterStage::PadStart(ms));
            }
        }
        if let Some(ms) = self.pad_end {
            if check_non_negative("padEnd", ms)? > 0.0 {
                stages.push(FilterStage::PadEnd(ms));
            }
        }
        if let Some(ratio) = self.pitch_mult {
            stages.push(FilterStage::PitchShift {
                ratio: check_positive("pitchMult", ratio)?,
                base_rate,
            });
        }
        if let Some(tempo) = self.tempo {
            stages.push(FilterStage::TempoScale(check_positive("tempo", tempo)?));
        }
        if let Some(gain) = self.amplitude {
            stages.push(FilterStage::Gain(check_non_negative("amplitude", gain)?));
        }

        Ok(stages)
    }

    /// Comma-joined filter graph, `None` when no filter applies
    pub fn filter_graph(&self, base_rate: u32) -> Result<Option<String>> {
        let parts: Vec<String> = self
            .stages(base_rate)?
            .iter()
            .filter_map(FilterStage::expression)
            .collect();
        Ok(if parts.is_empty() {
            None
        } else {
            Some(parts.join(","))
        })
    }

    /// Full argument list for one invocation of the audio tool
    pub fn tool_args(&self, input: &Path, output: &Path, base_rate: u32) -> Result<Vec<OsString>> {
        let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), input.into()];

        for stage in self.stages(base_rate)? {
            if let FilterStage::Resample(hz) = stage {
                args.push("-ar".into());
                args.push(hz.to_string().into());
            }
        }
        if let Some(graph) = self.filter_graph(base_rate)? {
            args.push("-af".into());
            args.push(graph.into());
        }
        if let Some(codec) = self.bit_depth.as_deref().filter(|c| !c.is_empty()) {
            args.push("-acodec".into());
            args.push(codec.into());
        }
        if is_mp3(output) {
            args.push("-c:a".into());
            args.push("libmp3lame".into());
        }

        args.push(output.into());
        Ok(args)
    }
}

fn is_mp3(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("mp3"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_options() -> FilterOptions {
        FilterOptions {
            hz: Some(44100),
            pad_start: Some(250.0),
            pad_end: Some(500.0),
            pitch_mult: Some(2.0),
            tempo: Some(1.25),
            amplitude: Some(0.8),
            bit_depth: Some("pcm_s16le".to_string()),
        }
    }

    #[test]
    fn test_stage_order_is_fixed() {
        let stages = full_options().stages(22050).unwrap();
        assert_eq!(
            stages,
            vec![
                FilterStage::Resample(44100),
                FilterStage::PadStart(250.0),
                FilterStage::PadEnd(500.0),
                FilterStage::PitchShift { ratio: 2.0, base_rate: 22050 },
                FilterStage::TempoScale(1.25),
                FilterStage::Gain(0.8),
            ]
        );
    }

    #[test]
    fn test_filter_graph() {
        let graph = full_options().filter_graph(22050).unwrap().unwrap();
        assert_eq!(
            graph,
            "adelay=250,apad=pad_dur=500ms,asetrate=44100,atempo=0.5,atempo=1.25,volume=0.8"
        );
    }

    #[test]
    fn test_zero_pads_are_skipped() {
        let options = FilterOptions {
            pad_start: Some(0.0),
            pad_end: Some(0.0),
            ..Default::default()
        };
        assert!(options.stages(22050).unwrap().is_empty());
        assert_eq!(options.filter_graph(22050).unwrap(), None);
    }

    #[test]
    fn test_rejects_non_positive_ratios() {
        let options = FilterOptions {
            tempo: Some(0.0),
            ..Default::default()
        };
        assert!(matches!(options.stages(22050), Err(TtsError::Validation { .. })));
    }

    #[test]
    fn test_mp3_output_selects_codec() {
        let args = FilterOptions::default()
            .tool_args(Path::new("in.wav"), Path::new("out.MP3"), 22050)
            .unwrap();
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, vec!["-y", "-i", "in.wav", "-c:a", "libmp3lame", "out.MP3"]);
    }

    #[test]
    fn test_parse_request_options() {
        let json = r#"{"hz": 48000, "padStart": 0, "padEnd": 120, "pitchMult": 1.0,
                       "tempo": 1.0, "amplitude": 1.0, "bit_depth": "pcm_s32le"}"#;
        let options: FilterOptions = serde_json::from_str(json).unwrap();
        assert_eq!(options.hz, Some(48000));
        assert_eq!(options.pad_end, Some(120.0));
        assert_eq!(options.bit_depth.as_deref(), Some("pcm_s32le"));
    }
}
