use serde::{Deserialize, Serialize};

/// Process-wide taint switches, read at block-instrumentation time.
///
/// Everything defaults to off. With `taint_tracking_enabled` cleared, blocks pass through the
/// instrumenter untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaintConfig {
    pub taint_tracking_enabled: bool,
    /// A load through a tainted address yields a fully tainted value.
    pub pointer_tainting_for_loads: bool,
    /// A store through a tainted address fully taints the stored bytes.
    pub pointer_tainting_for_stores: bool,
}

impl TaintConfig {
    /// Tracking on, pointer tainting off.
    pub fn enabled() -> Self {
        Self {
            taint_tracking_enabled: true,
            ..Self::default()
        }
    }

    pub fn with_pointer_tainting(mut self, loads: bool, stores: bool) -> Self {
        self.pointer_tainting_for_loads = loads;
        self.pointer_tainting_for_stores = stores;
        self
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
