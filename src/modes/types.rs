//! Mode bundle types.
//!
//! A mode is a named industry persona (theme, tabs, prompt, metrics) the
//! assistant adopts. Bundles are immutable once constructed; company-name
//! overrides and regeneration replace them wholesale.

use serde::{Deserialize, Serialize};

/// Six-color UI theme for a mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeTheme {
    pub primary: String,
    pub secondary: String,
    pub background: String,
    pub surface: String,
    pub text: String,
    pub text_muted: String,
}

/// A dashboard tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeTab {
    pub id: String,
    pub label: String,
    pub icon: String,
}

/// A metric value: pre-formatted text ("$1,234") or a plain number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl From<&str> for MetricValue {
    fn from(s: &str) -> Self {
        MetricValue::Text(s.to_string())
    }
}

impl From<f64> for MetricValue {
    fn from(n: f64) -> Self {
        MetricValue::Number(n)
    }
}

/// A default KPI shown in the metrics panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeMetric {
    pub label: String,
    pub value: MetricValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// A complete industry mode bundle.
///
/// Serialized form matches the client contract: `defaultMetrics` is
/// camelCase, everything else snake_case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mode {
    pub id: String,
    pub name: String,
    pub company_name: String,
    pub tagline: String,
    pub theme: ModeTheme,
    pub tabs: Vec<ModeTab>,
    pub system_prompt: String,
    #[serde(rename = "defaultMetrics")]
    pub default_metrics: Vec<ModeMetric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hero_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_image: Option<String>,
}

impl Mode {
    /// Clone this mode with the company name replaced.
    ///
    /// Every occurrence of the old company name in the system prompt is
    /// substituted too, so the assistant introduces itself correctly. The
    /// original bundle is untouched.
    pub fn with_company_name(&self, company_name: &str) -> Mode {
        let mut mode = self.clone();
        mode.system_prompt = mode
            .system_prompt
            .replace(&self.company_name, company_name);
        mode.company_name = company_name.to_string();
        mode
    }

    /// The client-facing view of this bundle for `mode_switch` payloads.
    ///
    /// Everything except the system prompt, which stays server-side.
    pub fn client_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "name": self.name,
            "company_name": self.company_name,
            "tagline": self.tagline,
            "theme": self.theme,
            "tabs": self.tabs,
            "defaultMetrics": self.default_metrics,
            "background_image": self.background_image,
            "hero_image": self.hero_image,
            "chat_image": self.chat_image,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::builtin;

    #[test]
    fn test_metric_value_untagged_serde() {
        let m = ModeMetric {
            label: "Revenue".into(),
            value: MetricValue::Text("$1,234".into()),
            unit: None,
        };
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["value"], "$1,234");

        let m2: ModeMetric =
            serde_json::from_value(serde_json::json!({"label": "Users", "value": 42.0}))
                .unwrap();
        assert_eq!(m2.value, MetricValue::Number(42.0));
    }

    #[test]
    fn test_mode_serializes_default_metrics_camel_case() {
        let mode = builtin::banking_mode();
        let json = serde_json::to_value(&mode).unwrap();
        assert!(json.get("defaultMetrics").is_some());
        assert!(json.get("default_metrics").is_none());
        assert!(json.get("company_name").is_some());
    }

    #[test]
    fn test_client_payload_omits_system_prompt() {
        let mode = builtin::banking_mode();
        let payload = mode.client_payload();
        assert!(payload.get("system_prompt").is_none());
        assert_eq!(payload["id"], "banking");
        assert!(payload.get("defaultMetrics").is_some());
        assert!(payload.get("theme").is_some());
    }

    #[test]
    fn test_with_company_name_replaces_prompt_occurrences() {
        let mode = builtin::banking_mode();
        let old_name = mode.company_name.clone();
        assert!(mode.system_prompt.contains(&old_name));

        let renamed = mode.with_company_name("Wells Fargo");
        assert_eq!(renamed.company_name, "Wells Fargo");
        assert!(!renamed.system_prompt.contains(&old_name));
        assert!(renamed.system_prompt.contains("Wells Fargo"));

        // The source bundle is unchanged.
        assert_eq!(mode.company_name, old_name);
        assert!(mode.system_prompt.contains(&old_name));
    }
}
