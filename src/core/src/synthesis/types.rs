//! Core types used by the synthesis subsystem.

use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

pub const DEFAULT_SAMPLE: u32 = 1;
pub const DEFAULT_SCALE: f64 = 2.0;

/// Caller-supplied generation parameters, passed to the collaborator unchanged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    /// Number of images to generate.
    pub sample: u32,
    /// Guidance scale of the synthesis model.
    pub scale: f64,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            sample: DEFAULT_SAMPLE,
            scale: DEFAULT_SCALE,
        }
    }
}

impl GenerationParams {
    /// Checks that `sample` is in `1..=max_samples` and `scale` is a positive
    /// finite number.
    pub fn validate(&self, max_samples: u32) -> Result<(), String> {
        if self.sample == 0 || self.sample > max_samples {
            return Err(format!(
                "sample must be between 1 and {}, got {}",
                max_samples, self.sample
            ));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(format!("scale must be a positive number, got {}", self.scale));
        }
        Ok(())
    }
}

/// Which backend produces the images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisRuntime {
    /// The external collaborator process.
    External,
    /// Local placeholder images after an artificial delay.
    Simulation,
}

/// Everything one synthesis run needs.
#[derive(Debug, Clone)]
pub struct SynthesisJob {
    pub session_id: Uuid,
    pub model_path: PathBuf,
    pub cloth_path: PathBuf,
    pub params: GenerationParams,
    /// Directory the run writes `out_hd_<i>.png` files to.
    pub output_dir: PathBuf,
}

/// Aggregate counters describing synthesis runs since start-up.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SynthesisStats {
    /// Runs currently in progress.
    pub running: usize,
    /// Runs that exited successfully.
    pub succeeded: u64,
    /// Runs that failed, timed out or were cancelled.
    pub failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_form_defaults() {
        let params = GenerationParams::default();
        assert_eq!(params.sample, 1);
        assert_eq!(params.scale, 2.0);
        assert!(params.validate(1).is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let zero = GenerationParams {
            sample: 0,
            ..Default::default()
        };
        assert!(zero.validate(4).is_err());

        let too_many = GenerationParams {
            sample: 5,
            ..Default::default()
        };
        assert!(too_many.validate(4).is_err());

        for scale in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let params = GenerationParams {
                sample: 1,
                scale,
            };
            assert!(params.validate(4).is_err(), "scale {} accepted", scale);
        }
    }
}
