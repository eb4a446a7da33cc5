// SPDX-License-Identifier: PMPL-1.0-or-later
//! Store options.
//!
//! Defaults:
//! - table_name: "data-store"
//! - failure_policy: halt
//! - ignore_unknown_rows: false

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Table used when no name is configured.
pub const DEFAULT_TABLE_NAME: &str = "data-store";

/// What the write queue does when a backing-store operation fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop executing tasks; later writes are rejected and `flush` reports
    /// the failure.
    #[default]
    Halt,
    /// Log and drop the failing task, then continue with the next one.
    Skip,
    /// Retry the failing task up to `attempts` more times, waiting
    /// `backoff_ms` between tries, then halt.
    Retry { attempts: u32, backoff_ms: u64 },
}

impl FailurePolicy {
    /// Extra attempts after the first failure.
    pub fn retries(self) -> u32 {
        match self {
            FailurePolicy::Retry { attempts, .. } => attempts,
            FailurePolicy::Halt | FailurePolicy::Skip => 0,
        }
    }

    pub fn backoff(self) -> Duration {
        match self {
            FailurePolicy::Retry { backoff_ms, .. } => Duration::from_millis(backoff_ms),
            FailurePolicy::Halt | FailurePolicy::Skip => Duration::ZERO,
        }
    }
}

/// Options accepted by [`crate::StoreController::initialize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Backing table holding the rows.
    pub table_name: String,
    /// Write queue failure handling.
    pub failure_policy: FailurePolicy,
    /// Skip stored rows whose key is not declared instead of failing.
    pub ignore_unknown_rows: bool,
}

impl StoreOptions {
    /// Parse options from JSON; missing fields take their defaults.
    pub fn from_json_str(text: &str) -> StoreResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| StoreError::Parse(format!("invalid store options: {e}")))
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_ignore_unknown_rows(mut self, ignore: bool) -> Self {
        self.ignore_unknown_rows = ignore;
        self
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            failure_policy: FailurePolicy::default(),
            ignore_unknown_rows: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = StoreOptions::default();
        assert_eq!(options.table_name, "data-store");
        assert_eq!(options.failure_policy, FailurePolicy::Halt);
        assert!(!options.ignore_unknown_rows);
    }

    #[test]
    fn test_from_json_fills_missing_fields() {
        let options = StoreOptions::from_json_str(r#"{"table_name": "settings"}"#).unwrap();
        assert_eq!(options.table_name, "settings");
        assert_eq!(options.failure_policy, FailurePolicy::Halt);

        let options = StoreOptions::from_json_str(
            r#"{"failure_policy": {"mode": "retry", "attempts": 3, "backoff_ms": 50}}"#,
        )
        .unwrap();
        assert_eq!(options.table_name, DEFAULT_TABLE_NAME);
        assert_eq!(options.failure_policy.retries(), 3);
        assert_eq!(options.failure_policy.backoff(), Duration::from_millis(50));
    }

    #[test]
    fn test_from_json_rejects_bad_policy() {
        let err = StoreOptions::from_json_str(r#"{"failure_policy": {"mode": "panic"}}"#)
            .unwrap_err();
        assert_eq!(err.code(), "PARSE_ERR");
    }

    #[test]
    fn test_builders() {
        let options = StoreOptions::default()
            .with_table_name("t")
            .with_failure_policy(FailurePolicy::Skip)
            .with_ignore_unknown_rows(true);
        assert_eq!(options.table_name, "t");
        assert_eq!(options.failure_policy, FailurePolicy::Skip);
        assert!(options.ignore_unknown_rows);
        assert_eq!(FailurePolicy::Skip.retries(), 0);
        assert_eq!(FailurePolicy::Halt.backoff(), Duration::ZERO);
    }

    #[test]
    fn test_policy_serde_shape() {
        let json = serde_json::to_value(FailurePolicy::Retry {
            attempts: 2,
            backoff_ms: 10,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"mode": "retry", "attempts": 2, "backoff_ms": 10})
        );
        assert_eq!(
            serde_json::to_value(FailurePolicy::Skip).unwrap(),
            serde_json::json!({"mode": "skip"})
        );
    }
}
