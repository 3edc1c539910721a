//! Search configuration.

use std::time::Duration;

/// Knobs of one tree search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    /// Total number of simulations from the root.
    pub power: u32,

    /// Weight of the exploration term in PUCT selection.
    pub exploration: f32,

    /// Mixing weight between the model prior and the uniform distribution
    /// at the root: `P_root = (1 - d) · P + d · U_legal`.
    ///
    /// This deterministic dilution takes the place Dirichlet noise has in
    /// the canonical setup. It is its own knob, not a Dirichlet sample; `0`
    /// trusts the prior entirely, `1` discards it.
    pub dilution: f32,

    /// Cooling of the root visit counts into the improved policy:
    /// `π[a] ∝ N[a]^(1/temperature)`. `0` means argmax.
    pub temperature: f32,

    /// Optional wall-clock bound. Whichever of `power` and the deadline is
    /// reached first ends the search; pending simulations finish their
    /// backup, no new ones start.
    pub deadline: Option<Duration>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            power: 800,
            exploration: 1.25,
            dilution: 0.25,
            temperature: 1.0,
            deadline: None,
        }
    }
}

impl SearchConfig {
    /// Exploratory settings for self-play data collection.
    pub fn for_training() -> Self {
        Self::default()
    }

    /// Greedy settings for competitive play: no dilution, argmax policy.
    pub fn for_evaluation() -> Self {
        Self {
            dilution: 0.0,
            temperature: 0.0,
            ..Self::default()
        }
    }

    /// A small, fast search for tests.
    pub fn for_testing() -> Self {
        Self {
            power: 50,
            dilution: 0.0,
            temperature: 0.0,
            ..Self::default()
        }
    }

    pub fn with_power(mut self, power: u32) -> Self {
        self.power = power;
        self
    }

    pub fn with_exploration(mut self, exploration: f32) -> Self {
        self.exploration = exploration;
        self
    }

    pub fn with_dilution(mut self, dilution: f32) -> Self {
        self.dilution = dilution;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.power == 0 {
            return Err("power must be at least 1".into());
        }
        if !self.exploration.is_finite() || self.exploration < 0.0 {
            return Err(format!("exploration must be finite and non-negative, got {}", self.exploration));
        }
        if !self.dilution.is_finite() || !(0.0..=1.0).contains(&self.dilution) {
            return Err(format!("dilution must lie in [0, 1], got {}", self.dilution));
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(format!("temperature must be finite and non-negative, got {}", self.temperature));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SearchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.power, 800);
        assert!((config.exploration - 1.25).abs() < 1e-6);
    }

    #[test]
    fn evaluation_config_is_greedy() {
        let config = SearchConfig::for_evaluation();
        assert_eq!(config.dilution, 0.0);
        assert_eq!(config.temperature, 0.0);
    }

    #[test]
    fn builders_override_fields() {
        let config = SearchConfig::default()
            .with_power(100)
            .with_temperature(0.5)
            .with_dilution(1.0)
            .with_deadline(Duration::from_millis(20));

        assert_eq!(config.power, 100);
        assert_eq!(config.temperature, 0.5);
        assert_eq!(config.dilution, 1.0);
        assert_eq!(config.deadline, Some(Duration::from_millis(20)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_settings_are_rejected() {
        assert!(SearchConfig::default().with_power(0).validate().is_err());
        assert!(SearchConfig::default().with_dilution(1.5).validate().is_err());
        assert!(SearchConfig::default()
            .with_temperature(-1.0)
            .validate()
            .is_err());
        assert!(SearchConfig::default()
            .with_exploration(f32::NAN)
            .validate()
            .is_err());
    }
}
