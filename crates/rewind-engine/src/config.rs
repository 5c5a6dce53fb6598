//! Timeline configuration.
//!
//! [`RewindConfig`] bounds the retention window: how many ticks per second
//! are worth keeping and for how many seconds. The history capacity is their
//! product, rounded up, and is fixed for the session unless the timeline is
//! explicitly [reconfigured](crate::timeline::Timeline::reconfigure).
//!
//! Configurations are serde-serializable so hosts can load them from JSON:
//!
//! ```
//! use rewind_engine::config::RewindConfig;
//!
//! let config = RewindConfig::from_json_str(r#"{ "max_record_duration": 5.0 }"#).unwrap();
//! assert_eq!(config.max_ticks_per_second, 60);
//! assert_eq!(config.capacity(), 300);
//! ```

use serde::{Deserialize, Serialize};

use crate::timeline::MIN_TICKS_TO_PAUSE;
use crate::RewindError;

/// Largest history the timeline will allocate: a little over three days at
/// 60 ticks per second.
pub const MAX_CAPACITY: usize = 1 << 24;

/// Slack absorbed before rounding up, so `60 * 0.1` is 6 slots, not 7.
const CAPACITY_ROUNDING_SLACK: f64 = 1e-9;

// ---------------------------------------------------------------------------
// RewindConfig
// ---------------------------------------------------------------------------

/// Retention limits for the timeline and every recorder attached to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewindConfig {
    /// Upper bound on recorded ticks per second. Caps retention granularity.
    pub max_ticks_per_second: u32,
    /// Length of the retention window in seconds.
    pub max_record_duration: f64,
}

impl Default for RewindConfig {
    /// Defaults to 60 ticks per second over a 30 second window.
    fn default() -> Self {
        Self {
            max_ticks_per_second: 60,
            max_record_duration: 30.0,
        }
    }
}

impl RewindConfig {
    /// Number of ticks the history retains: `ceil(tps * duration)`.
    ///
    /// Products within floating-point noise of a whole number round to that
    /// number. Only meaningful for a configuration that passes
    /// [`validate`](Self::validate); larger windows saturate.
    pub fn capacity(&self) -> usize {
        (self.slots() - CAPACITY_ROUNDING_SLACK).ceil() as usize
    }

    fn slots(&self) -> f64 {
        f64::from(self.max_ticks_per_second) * self.max_record_duration
    }

    /// Check that the limits describe a usable retention window.
    ///
    /// # Errors
    ///
    /// Returns [`RewindError::InvalidConfig`] if the tick rate is zero, the
    /// duration is not a positive finite number, or the resulting capacity
    /// cannot hold enough ticks to pause or exceeds [`MAX_CAPACITY`].
    pub fn validate(&self) -> Result<(), RewindError> {
        if self.max_ticks_per_second == 0 {
            return Err(RewindError::InvalidConfig(
                "max_ticks_per_second must be positive".to_owned(),
            ));
        }
        if !(self.max_record_duration.is_finite() && self.max_record_duration > 0.0) {
            return Err(RewindError::InvalidConfig(format!(
                "max_record_duration must be positive and finite, got {}",
                self.max_record_duration
            )));
        }
        if self.slots() > MAX_CAPACITY as f64 {
            return Err(RewindError::InvalidConfig(format!(
                "retention window needs {:.0} ticks, at most {MAX_CAPACITY} are supported",
                self.slots()
            )));
        }
        let capacity = self.capacity();
        if capacity < MIN_TICKS_TO_PAUSE {
            return Err(RewindError::InvalidConfig(format!(
                "retention window holds {capacity} ticks, at least {MIN_TICKS_TO_PAUSE} are required"
            )));
        }
        Ok(())
    }

    /// Parse and validate a configuration from JSON. Missing fields take
    /// their default values.
    ///
    /// # Errors
    ///
    /// Returns [`RewindError::ConfigParse`] for malformed JSON and
    /// [`RewindError::InvalidConfig`] if validation fails.
    pub fn from_json_str(json: &str) -> Result<Self, RewindError> {
        let config: RewindConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
