//! Configuration for the binding layer.
//!
//! Settings can be built in code or loaded from JSON (camelCase keys, every
//! field optional).

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::error::BindResult;

/// Binding layer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Maximum number of undelivered change events.
    /// Default: None (unbounded)
    pub notification_capacity: Option<NonZeroUsize>,

    /// Maximum number of change events delivered per `deliver_pending` call.
    /// Default: None (drain everything queued)
    pub delivery_batch_limit: Option<NonZeroUsize>,

    /// Synthesize `"0".."length-1"` keys when enumerating indexed classes.
    /// Default: true
    pub enumerate_indices: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            notification_capacity: None,
            delivery_batch_limit: None,
            enumerate_indices: true,
        }
    }
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON.
    ///
    /// A zero capacity or batch limit is rejected.
    ///
    /// # Example
    ///
    /// ```
    /// use otter_bind::BridgeConfig;
    ///
    /// let config = BridgeConfig::from_json(r#"{"notificationCapacity": 64}"#).unwrap();
    /// assert_eq!(config.notification_capacity.map(|n| n.get()), Some(64));
    /// assert!(config.enumerate_indices);
    /// ```
    pub fn from_json(json: &str) -> BindResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Bound the notification queue. Zero removes the bound.
    pub fn notification_capacity(mut self, capacity: usize) -> Self {
        self.notification_capacity = NonZeroUsize::new(capacity);
        self
    }

    /// Limit how many events a single delivery pass handles. Zero removes
    /// the limit.
    pub fn delivery_batch_limit(mut self, limit: usize) -> Self {
        self.delivery_batch_limit = NonZeroUsize::new(limit);
        self
    }

    /// Enable or disable index key synthesis during enumeration.
    pub fn enumerate_indices(mut self, enabled: bool) -> Self {
        self.enumerate_indices = enabled;
        self
    }
}
