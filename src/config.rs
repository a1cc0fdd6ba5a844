// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! A value-object alternative to configuring a [`DynamicThrottle`] through its
//! chained setters one at a time.

use crate::throttle::DynamicThrottle;
use crate::{clock::Clock, policy::StaticThrottlePolicy};
use core::fmt;

/// Tunables for a [`DynamicThrottle`], applied atomically.
///
/// Every field here has the same meaning, and the same default, as the
/// corresponding `DynamicThrottle::set_*` setter. `ThrottleConfig` exists for
/// callers who would rather build a complete configuration once (from a
/// parsed config file, for example) than mutate a live throttle field by
/// field.
#[derive(Clone, Copy, Debug, PartialEq)]
#[non_exhaustive]
pub struct ThrottleConfig {
    pub window_size_increment: f64,
    pub min_window_size: f64,
    pub max_window_size: f64,
    pub resize_rate: f64,
    pub efficiency_threshold: f64,
    pub window_size_decrement_factor: f64,
    pub window_size_back_off: f64,
    pub weight: f64,
    pub max_throughput: f64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            window_size_increment: 20.0,
            min_window_size: 20.0,
            max_window_size: f64::MAX,
            resize_rate: 3.0,
            efficiency_threshold: 1.0,
            window_size_decrement_factor: 2.0,
            window_size_back_off: 0.9,
            weight: 1.0,
            max_throughput: 0.0,
        }
    }
}

impl ThrottleConfig {
    /// Checks the configuration for combinations that are incoherent rather
    /// than merely unusual.
    ///
    /// `DynamicThrottle`'s own setters never fail -- they clamp or coerce
    /// (see its module docs) -- so this is a courtesy for callers assembling
    /// a `ThrottleConfig` from an external source (a config file, a CLI flag)
    /// who would rather catch a typo at load time than silently run with a
    /// clamped value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.window_size_increment > 0.0) {
            return Err(ConfigError::NonPositiveIncrement {
                value: self.window_size_increment,
            });
        }
        if !(self.resize_rate > 0.0) {
            return Err(ConfigError::NonPositiveResizeRate {
                value: self.resize_rate,
            });
        }
        if self.min_window_size > self.max_window_size {
            return Err(ConfigError::MinWindowExceedsMaxWindow {
                min: self.min_window_size,
                max: self.max_window_size,
            });
        }
        if self.max_throughput < 0.0 {
            return Err(ConfigError::NegativeMaxThroughput {
                value: self.max_throughput,
            });
        }
        Ok(())
    }

    /// Applies this configuration to an existing throttle, in the same order
    /// as, and with the same effects as, calling each `set_*` setter in turn.
    pub fn apply<C: Clock, B: StaticThrottlePolicy>(&self, throttle: &mut DynamicThrottle<C, B>) {
        throttle
            .set_window_size_increment(self.window_size_increment)
            .set_min_window_size(self.min_window_size)
            .set_max_window_size(self.max_window_size)
            .set_resize_rate(self.resize_rate)
            .set_efficiency_threshold(self.efficiency_threshold)
            .set_window_size_decrement_factor(self.window_size_decrement_factor)
            .set_window_size_back_off(self.window_size_back_off)
            .set_weight(self.weight)
            .set_max_throughput(self.max_throughput);
    }
}

/// An incoherent [`ThrottleConfig`], caught by [`ThrottleConfig::validate`].
///
/// This is the only fallible surface in the crate; the controller's hot path
/// (`can_send`, `process_message`, `process_reply`) never returns a `Result`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[non_exhaustive]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
pub enum ConfigError {
    /// `window_size_increment` must be positive, got {value}
    NonPositiveIncrement { value: f64 },
    /// `resize_rate` must be positive, got {value}
    NonPositiveResizeRate { value: f64 },
    /// `min_window_size` ({min}) must not exceed `max_window_size` ({max})
    MinWindowExceedsMaxWindow { min: f64, max: f64 },
    /// `max_throughput` must not be negative, got {value}
    NegativeMaxThroughput { value: f64 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NonPositiveIncrement { value } => {
                write!(f, "`window_size_increment` must be positive, got {value}")
            }
            ConfigError::NonPositiveResizeRate { value } => {
                write!(f, "`resize_rate` must be positive, got {value}")
            }
            ConfigError::MinWindowExceedsMaxWindow { min, max } => write!(
                f,
                "`min_window_size` ({min}) must not exceed `max_window_size` ({max})"
            ),
            ConfigError::NegativeMaxThroughput { value } => {
                write!(f, "`max_throughput` must not be negative, got {value}")
            }
        }
    }
}

#[cfg(not(feature = "thiserror"))]
impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ThrottleConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_increment() {
        let config = ThrottleConfig {
            window_size_increment: 0.0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonPositiveIncrement { value: 0.0 })
        );
    }

    #[test]
    fn rejects_inverted_window_bounds() {
        let config = ThrottleConfig {
            min_window_size: 100.0,
            max_window_size: 10.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MinWindowExceedsMaxWindow { .. })
        ));
    }
}
