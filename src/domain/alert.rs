//! Inbound alert shape.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of an alert as reported by the monitoring stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Firing,
    Resolved,
}

/// A single event from the monitoring stack, keyed by `fingerprint`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub fingerprint: String,
    pub status: AlertStatus,
    pub severity: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    pub starts_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator_url: Option<String>,
}

impl Alert {
    /// Natural-language description used both to embed at write time and to
    /// build the query vector at read time — the two must stay identical or
    /// `similar()` won't match its own writes.
    pub fn describe(&self) -> String {
        let mut labels: Vec<_> = self.labels.iter().collect();
        labels.sort_by_key(|(k, _)| k.clone());
        let labels_str = labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");

        let mut annotations: Vec<_> = self.annotations.iter().collect();
        annotations.sort_by_key(|(k, _)| k.clone());
        let annotations_str = annotations
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "fingerprint={} severity={} labels=[{}] annotations=[{}]",
            self.fingerprint, self.severity, labels_str, annotations_str
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_is_order_independent() {
        let mut a = Alert {
            fingerprint: "abc".into(),
            status: AlertStatus::Firing,
            severity: "warning".into(),
            labels: HashMap::from([
                ("service".to_string(), "web".to_string()),
                ("instance".to_string(), "test-ap".to_string()),
            ]),
            annotations: HashMap::new(),
            starts_at: Utc::now(),
            ends_at: None,
            generator_url: None,
        };
        let d1 = a.describe();
        // HashMap iteration order varies; describe() must sort internally.
        a.labels = HashMap::from([
            ("instance".to_string(), "test-ap".to_string()),
            ("service".to_string(), "web".to_string()),
        ]);
        let d2 = a.describe();
        assert_eq!(d1, d2);
    }
}
