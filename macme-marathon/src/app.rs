//! Marathon app views, per §3 (Data Model) and §4.3.

use std::collections::HashMap;

use serde::Deserialize;

/// A single entry in an app's `portDefinitions` array.
#[derive(Debug, Clone, Deserialize)]
pub struct PortDefinition {
    pub port: u32,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// An immutable snapshot of a Marathon app, as returned by `/v2/apps`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppView {
    pub id: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub port_definitions: Vec<PortDefinition>,
}

impl AppView {
    /// The effective HAPROXY group for port index `n`: `HAPROXY_<n>_GROUP`
    /// if set, else the app-level `HAPROXY_GROUP`, else absent.
    pub fn effective_group(&self, port_index: usize) -> Option<&str> {
        self.labels
            .get(&format!("HAPROXY_{port_index}_GROUP"))
            .or_else(|| self.labels.get("HAPROXY_GROUP"))
            .map(|s| s.as_str())
    }

    /// The raw `MARATHON_ACME_<n>_DOMAIN` value for port index `n`, if set.
    pub fn domain_label(&self, port_index: usize) -> Option<&str> {
        self.labels
            .get(&format!("MARATHON_ACME_{port_index}_DOMAIN"))
            .map(|s| s.as_str())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AppsResponse {
    pub apps: Vec<AppView>,
}

/// Splits a `MARATHON_ACME_<n>_DOMAIN` label on `,`, trims whitespace, and
/// drops empty segments.
pub fn parse_domains(label: &str) -> Vec<String> {
    label
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
