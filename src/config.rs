//! Tunable parameters of the demand model and the DP engine.

use crate::error::{OptimizerError, Result};

/// Length of one DP epoch. Durations and hours are whole epochs.
pub const EPOCH_MINUTES: u32 = 60;

/// Epochs per day
pub const EPOCHS_PER_DAY: u32 = 24 * 60 / EPOCH_MINUTES;

/// Longest shift the surface accepts, in hours
pub const MAX_SHIFT_HOURS: u32 = 24;

/// Optimizer configuration
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Laplace smoothing added to hourly trip counts
    pub epsilon: f64,
    /// Minimum demand rate (trips per epoch) assumed for any cluster
    pub lambda_floor: f64,
    /// Cost charged per minute of relocation driving
    pub relocation_cost_per_minute: f64,
    /// Share of the origin's rate still earned while relocating (0 = nothing)
    pub relocation_earning_share: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            epsilon: 0.1,
            lambda_floor: 0.5,
            relocation_cost_per_minute: 0.0,
            relocation_earning_share: 0.0,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<()> {
        let non_negative = [
            ("epsilon", self.epsilon),
            ("lambda_floor", self.lambda_floor),
            ("relocation_cost_per_minute", self.relocation_cost_per_minute),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(OptimizerError::InvalidConfig(format!("{} must be >= 0 (got {})", name, value)));
            }
        }
        if !(0.0..=1.0).contains(&self.relocation_earning_share) {
            return Err(OptimizerError::InvalidConfig(format!(
                "relocation_earning_share must be within [0, 1] (got {})",
                self.relocation_earning_share
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OptimizerConfig::default();
        assert_eq!(config.epsilon, 0.1);
        assert_eq!(config.lambda_floor, 0.5);
        assert_eq!(EPOCHS_PER_DAY, 24);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let negative = OptimizerConfig { lambda_floor: -1.0, ..Default::default() };
        assert!(negative.validate().is_err());

        let share = OptimizerConfig { relocation_earning_share: 1.5, ..Default::default() };
        assert!(share.validate().is_err());
    }
}
