// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Sequencer configuration.
//
// Defaults:
// - flush_threshold: 100 collected events per auto-flush
// - retry backoff: 5 ms doubling up to 250 ms

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SequenceError, SequenceResult};

/// Tuning knobs shared by every sequencer of a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Collected events that trigger an automatic checkpoint flush.
    pub flush_threshold: usize,
    /// First delay after a failed checkpoint write or recovery attempt.
    pub retry_base_delay_ms: u64,
    /// Upper bound of the retry delay.
    pub retry_max_delay_ms: u64,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            flush_threshold: 100,
            retry_base_delay_ms: 5,
            retry_max_delay_ms: 250,
        }
    }
}

impl SequencerConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> SequenceResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SequenceError::Config(format!("malformed config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SequenceResult<()> {
        if self.flush_threshold == 0 {
            return Err(SequenceError::Config(
                "flush_threshold must be at least 1".into(),
            ));
        }
        if self.retry_base_delay_ms == 0 {
            return Err(SequenceError::Config(
                "retry_base_delay_ms must be at least 1".into(),
            ));
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(SequenceError::Config(format!(
                "retry_base_delay_ms ({}) exceeds retry_max_delay_ms ({})",
                self.retry_base_delay_ms, self.retry_max_delay_ms
            )));
        }
        Ok(())
    }

    /// Delay before retry number `attempt` (1-based): the base delay doubled
    /// per attempt, capped at the maximum.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let millis = self
            .retry_base_delay_ms
            .saturating_mul(1u64 << shift)
            .min(self.retry_max_delay_ms);
        Duration::from_millis(millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SequencerConfig::default();
        assert_eq!(config.flush_threshold, 100);
        assert_eq!(config.retry_base_delay_ms, 5);
        assert_eq!(config.retry_max_delay_ms, 250);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_delay_is_bounded() {
        let config = SequencerConfig::default();
        assert_eq!(config.retry_delay(1), Duration::from_millis(5));
        assert_eq!(config.retry_delay(2), Duration::from_millis(10));
        assert_eq!(config.retry_delay(6), Duration::from_millis(160));
        assert_eq!(config.retry_delay(7), Duration::from_millis(250));
        assert_eq!(config.retry_delay(u32::MAX), Duration::from_millis(250));
    }

    #[test]
    fn test_from_json_partial() {
        let config = SequencerConfig::from_json(r#"{"flush_threshold": 10}"#).unwrap();
        assert_eq!(config.flush_threshold, 10);
        assert_eq!(config.retry_max_delay_ms, 250);
    }

    #[test]
    fn test_from_json_rejects_invalid() {
        assert!(matches!(
            SequencerConfig::from_json(r#"{"flush_threshold": 0}"#),
            Err(SequenceError::Config(_))
        ));
        assert!(SequencerConfig::from_json(
            r#"{"retry_base_delay_ms": 500, "retry_max_delay_ms": 100}"#
        )
        .is_err());
        assert!(SequencerConfig::from_json("not json").is_err());
    }
}
