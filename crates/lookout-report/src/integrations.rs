//! Integration fan-out
//!
//! Accepted error payloads are forwarded fire-and-forget to every
//! registered [`IIntegration`] whose name is enabled in
//! `report.integrations`. Failures are logged and never reach the caller.

use std::collections::BTreeMap;
use std::sync::Arc;

use lookout_core::config::ReportConfig;
use lookout_core::domain::Payload;
use lookout_core::ports::IIntegration;
use serde_json::Value;
use tracing::{debug, error, info};

/// Registered integrations filtered by configuration
#[derive(Clone, Default)]
pub struct IntegrationSet {
    sinks: Vec<Arc<dyn IIntegration>>,
}

impl std::fmt::Debug for IntegrationSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.sinks.iter().map(|s| s.name().to_string()))
            .finish()
    }
}

impl IntegrationSet {
    /// Keeps only the integrations enabled in `config`.
    pub fn new(config: &ReportConfig, registered: Vec<Arc<dyn IIntegration>>) -> Self {
        let sinks: Vec<_> = registered
            .into_iter()
            .filter(|sink| {
                let enabled = config.integration_enabled(sink.name());
                if !enabled {
                    debug!(integration = sink.name(), "Integration registered but disabled");
                }
                enabled
            })
            .collect();
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Forwards `payload` to every enabled sink, logging failures.
    pub fn forward(&self, payload: &Payload) {
        for sink in &self.sinks {
            if let Err(e) = sink.forward(payload) {
                error!(integration = sink.name(), error = %e, "Failed to forward report to integration");
            }
        }
    }
}

// ============================================================================
// LogIntegration
// ============================================================================

/// Writes every forwarded payload as a flat key/value log line
///
/// Registered under the name `"log"`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogIntegration;

impl LogIntegration {
    pub const NAME: &'static str = "log";
}

impl IIntegration for LogIntegration {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn forward(&self, payload: &Payload) -> anyhow::Result<()> {
        let fields = flatten_payload(payload);
        let line = fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        info!(target: "lookout::integration", fields = %line, "Forwarded report");
        Ok(())
    }
}

/// Flattens nested objects and arrays into dotted keys with string values.
pub fn flatten_payload(payload: &Payload) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for (key, value) in payload {
        flatten_into(&mut out, key, value);
    }
    out
}

fn flatten_into(out: &mut BTreeMap<String, String>, prefix: &str, value: &Value) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                flatten_into(out, &format!("{prefix}.{key}"), nested);
            }
        }
        Value::Array(items) => {
            for (index, nested) in items.iter().enumerate() {
                flatten_into(out, &format!("{prefix}.{index}"), nested);
            }
        }
        Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        other => {
            out.insert(prefix.to_string(), other.to_string());
        }
    }
}
