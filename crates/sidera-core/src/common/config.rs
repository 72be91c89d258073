use super::constants::{DEFAULT_FLUX_THRESHOLD, DEFAULT_MINIMUM_OBSERVATIONS};
use crate::domain::{TemplateError, TemplateResult};
use serde::{Deserialize, Serialize};

/// User-facing knobs of a template build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Number of worker threads interpolating orders in parallel.
    pub workers: usize,
    /// Minimum number of eligible observations required to start a build.
    pub minimum_observations: usize,
    /// Pixels whose combined flux falls below this value are masked.
    pub flux_threshold: f64,
    /// Release each observation's arrays right after its barrier completes.
    pub memory_save: bool,
    /// Force every alignment RV to zero.
    pub constant_rv_guess: bool,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            minimum_observations: DEFAULT_MINIMUM_OBSERVATIONS,
            flux_threshold: DEFAULT_FLUX_THRESHOLD,
            memory_save: false,
            constant_rv_guess: false,
        }
    }
}

impl TemplateConfig {
    /// Checked before any buffer is allocated or worker spawned.
    pub fn validate(&self) -> TemplateResult<()> {
        if self.workers == 0 {
            return Err(TemplateError::Configuration(
                "worker count must be at least 1".into(),
            ));
        }
        if self.minimum_observations == 0 {
            return Err(TemplateError::Configuration(
                "minimum observation count must be at least 1".into(),
            ));
        }
        if !self.flux_threshold.is_finite() {
            return Err(TemplateError::Configuration(format!(
                "flux threshold must be finite, got {}",
                self.flux_threshold
            )));
        }
        Ok(())
    }
}
