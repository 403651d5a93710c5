//! Settings writes
//!
//! The only mutation the monitor makes to the store: the expected flow rate,
//! always written together with a fresh `lastUpdate` in one atomic update.

use serde_json::{json, Map, Value};
use std::sync::Arc;
use thiserror::Error;

use crate::clock::Clock;
use crate::store::{StoreError, StorePath, StorePtr};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Expected flow rate must be a finite, non-negative number (got {0})")]
    InvalidFlowRate(f64),

    #[error("Failed to write settings: {0}")]
    Store(#[from] StoreError),
}

/// Result of a successful write
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub expected_flow_rate: f64,
    /// Unix seconds
    pub last_update: i64,
}

pub struct SettingsWriter {
    store: StorePtr,
    system_path: StorePath,
    clock: Arc<dyn Clock>,
}

impl SettingsWriter {
    pub fn new(store: StorePtr, system_path: impl Into<StorePath>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            system_path: system_path.into(),
            clock,
        }
    }

    /// Write the expected flow rate, rounded to two decimals
    pub async fn set_expected_flow(&self, rate: f64) -> Result<SettingsUpdate, SettingsError> {
        if !rate.is_finite() || rate < 0.0 {
            return Err(SettingsError::InvalidFlowRate(rate));
        }

        let update = SettingsUpdate {
            expected_flow_rate: round_to_cents(rate),
            last_update: self.clock.now_secs(),
        };

        let mut fields = Map::new();
        fields.insert("expectedFlowRate".to_string(), json!(update.expected_flow_rate));
        fields.insert("lastUpdate".to_string(), Value::from(update.last_update));

        self.store.update(&self.system_path, fields).await?;

        tracing::info!(
            expected_flow_rate = update.expected_flow_rate,
            last_update = update.last_update,
            "Expected flow rate updated"
        );
        Ok(update)
    }
}

fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
