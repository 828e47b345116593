//! Engine configuration.
//!
//! Configuration enters as a plain value from the embedder (the subsystem has
//! no file or network surface of its own). A builder with validation keeps
//! the curve factors and pool sizing inside sane bounds.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Configuration error type
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid age factors: {0}")]
    InvalidAgeFactors(String),

    #[error("invalid token pool sizing: {0}")]
    InvalidPool(String),
}

/// Factors over species life expectancy for the synthesized-parent age curve.
///
/// A synthesized parent is `oldest_child_age + offset` years old, where the
/// offset is an asymmetric Gaussian centered at `mean_factor × life_expectancy`
/// with spreads `(mean_factor − left_factor) × life_expectancy` below and
/// `(right_factor − mean_factor) × life_expectancy` above, clamped to `[0, ∞)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgeSynthesisConfig {
    pub mean_factor: f32,
    pub left_factor: f32,
    pub right_factor: f32,
}

impl Default for AgeSynthesisConfig {
    fn default() -> Self {
        Self {
            mean_factor: 0.325,
            left_factor: 0.1625,
            right_factor: 0.625,
        }
    }
}

/// Sizing for the compatibility identity-token pool:
/// `max(per_edge × edge_count, min)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPoolConfig {
    pub per_edge: usize,
    pub min: usize,
}

impl TokenPoolConfig {
    pub fn size_for(&self, edge_count: usize) -> usize {
        (self.per_edge * edge_count).max(self.min)
    }
}

impl Default for TokenPoolConfig {
    fn default() -> Self {
        Self { per_edge: 6, min: 50 }
    }
}

/// Session-wide engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Explicit inverse-type table, consulted before empirical probing.
    /// Keyed by relation type name.
    #[serde(default)]
    pub inverse_overrides: BTreeMap<String, String>,

    /// Relation types barred from manual assignment on top of the
    /// blood-derived filter (e.g. animal-only bonds).
    #[serde(default)]
    pub excluded_types: BTreeSet<String>,

    #[serde(default)]
    pub age: AgeSynthesisConfig,

    #[serde(default)]
    pub pool: TokenPoolConfig,

    /// Fixed seed for deterministic synthesis; entropy-seeded when absent.
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let age = &self.age;
        if !(age.left_factor > 0.0 && age.left_factor < age.mean_factor) {
            return Err(ConfigError::InvalidAgeFactors(format!(
                "left_factor {} must be in (0, mean_factor {})",
                age.left_factor, age.mean_factor
            )));
        }
        if age.right_factor <= age.mean_factor {
            return Err(ConfigError::InvalidAgeFactors(format!(
                "right_factor {} must exceed mean_factor {}",
                age.right_factor, age.mean_factor
            )));
        }
        if self.pool.per_edge == 0 {
            return Err(ConfigError::InvalidPool(
                "per_edge must be at least 1".to_string(),
            ));
        }
        if self.pool.min == 0 {
            return Err(ConfigError::InvalidPool(
                "min must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`EngineConfig`] with validation on `build()`.
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Record an explicit inverse for a relation type, bypassing probing.
    pub fn with_inverse_override(
        mut self,
        ty: impl Into<String>,
        inverse: impl Into<String>,
    ) -> Self {
        self.config
            .inverse_overrides
            .insert(ty.into(), inverse.into());
        self
    }

    /// Bar a relation type from manual assignment.
    pub fn with_excluded_type(mut self, ty: impl Into<String>) -> Self {
        self.config.excluded_types.insert(ty.into());
        self
    }

    pub fn with_age(mut self, age: AgeSynthesisConfig) -> Self {
        self.config.age = age;
        self
    }

    pub fn with_pool(mut self, pool: TokenPoolConfig) -> Self {
        self.config.pool = pool;
        self
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.config.rng_seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_builder_collects_overrides_and_exclusions() {
        let config = EngineConfig::builder()
            .with_inverse_override("mentor", "mentee")
            .with_excluded_type("bond")
            .with_rng_seed(7)
            .build()
            .unwrap();

        assert_eq!(
            config.inverse_overrides.get("mentor"),
            Some(&"mentee".to_string())
        );
        assert!(config.excluded_types.contains("bond"));
        assert_eq!(config.rng_seed, Some(7));
    }

    #[test]
    fn test_invalid_age_factors_rejected() {
        let result = EngineConfig::builder()
            .with_age(AgeSynthesisConfig {
                mean_factor: 0.3,
                left_factor: 0.4,
                right_factor: 0.6,
            })
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidAgeFactors(_))));

        let result = EngineConfig::builder()
            .with_age(AgeSynthesisConfig {
                mean_factor: 0.3,
                left_factor: 0.1,
                right_factor: 0.2,
            })
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidAgeFactors(_))));
    }

    #[test]
    fn test_invalid_pool_rejected() {
        let result = EngineConfig::builder()
            .with_pool(TokenPoolConfig { per_edge: 0, min: 50 })
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidPool(_))));
    }

    #[test]
    fn test_pool_sizing_formula() {
        let pool = TokenPoolConfig::default();
        assert_eq!(pool.size_for(0), 50);
        assert_eq!(pool.size_for(5), 50);
        assert_eq!(pool.size_for(9), 54);
        assert_eq!(pool.size_for(100), 600);
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = EngineConfig::builder()
            .with_inverse_override("mentor", "mentee")
            .with_excluded_type("bond")
            .build()
            .unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.inverse_overrides, config.inverse_overrides);
        assert_eq!(back.excluded_types, config.excluded_types);
    }
}
