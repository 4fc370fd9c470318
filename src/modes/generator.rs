//! Mode generation for arbitrary industries.
//!
//! The LLM makes the creative decisions (name, tagline, tabs, metrics,
//! personality) as a single JSON reply; the six-color palette is derived
//! algorithmically from its suggested primary color, which is faster and
//! harmonizes better than asking for every color.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{error, info};

use crate::modes::theme::derive_theme_palette;
use crate::modes::types::{MetricValue, Mode, ModeMetric, ModeTab};
use crate::prompt::CHAT_TOOLS_CONTEXT;
use crate::providers::ChatProvider;

const GENERATION_SYSTEM_PROMPT: &str = r##"You are a mode configuration generator for a multi-industry dashboard app.
Generate a complete configuration for the requested industry.

You MUST respond with valid JSON only. No other text. Use this exact structure:
{
  "industry_name": "Display Name",
  "industry_id": "snake_case_id",
  "company_name": "Company Name",
  "tagline": "Company tagline/slogan",
  "primary_color": "#HexColor",
  "personality_traits": ["trait1", "trait2", "trait3"],
  "tabs": [
    {"id": "dashboard", "label": "Dashboard", "icon": "📊"},
    {"id": "tab2", "label": "Tab 2", "icon": "📋"},
    {"id": "settings", "label": "Settings", "icon": "⚙️"}
  ],
  "default_metrics": [
    {"label": "Metric 1", "value": "$1,234", "unit": null},
    {"label": "Metric 2", "value": "567", "unit": "/day"}
  ],
  "welcome_message": "Welcome message here",
  "system_prompt_fragment": "AI context for this industry"
}

Guidelines:
- company_name: IMPORTANT - If the user specifies a company name (like "H-E-B", "Walmart", "Joe's Tacos"), use EXACTLY that name. Only make up a fictional name if no company name was provided.
- primary_color: Choose a color that represents this industry (hex format, e.g., "#4CAF50"). If it's a real company, try to use their brand color.
- tabs: Include 4-5 relevant tabs. Always include "dashboard" as the first tab and "settings" as the last tab.
- default_metrics: Include exactly 4 key metrics/KPIs relevant to this industry with realistic pre-formatted values.
- personality_traits: 3-5 traits that define how the AI assistant should behave for this industry.
- system_prompt_fragment: Additional context for the AI including industry jargon, common questions, and domain knowledge. 2-3 sentences.
- welcome_message: Friendly greeting when entering this mode. Should feel warm and industry-appropriate.

Be creative but realistic. The dashboard should feel purpose-built for this industry.
Choose colors that have industry associations (e.g., green for eco/health, blue for finance/trust, purple for luxury)."##;

/// Strip a markdown code fence wrapper if the reply came back fenced.
pub fn strip_code_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let without_open = match trimmed.find('\n') {
        Some(pos) => &trimmed[pos + 1..],
        None => return trimmed,
    };
    without_open
        .trim_end()
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

/// Assemble the complete assistant system prompt for a generated mode.
fn build_full_system_prompt(config: &Value) -> String {
    let traits = config
        .get("personality_traits")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();
    let industry_name = config
        .get("industry_name")
        .and_then(Value::as_str)
        .unwrap_or("general")
        .to_lowercase();
    let fragment = config
        .get("system_prompt_fragment")
        .and_then(Value::as_str)
        .unwrap_or("");

    format!(
        "You are a helpful assistant for a {} dashboard. {}\n\n\
         Your personality: {}\n\n\
         Keep responses clear, professional, and concise. Speak naturally like a friendly {} expert.\n\n{}",
        industry_name, fragment, traits, industry_name, CHAT_TOOLS_CONTEXT
    )
}

/// Generates complete [`Mode`] bundles for arbitrary industries via the LLM.
pub struct ModeGenerator {
    provider: Arc<dyn ChatProvider>,
}

impl ModeGenerator {
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self { provider }
    }

    /// Generate a mode for `industry`.
    ///
    /// `full_request` is the user's original text (it may carry an explicit
    /// company name the generation prompt must honor). Returns `None` on any
    /// failure; callers keep the previous mode active.
    pub async fn generate(&self, industry: &str, full_request: &str) -> Option<Mode> {
        info!("Generating mode for industry: {}", industry);

        let user_prompt = if full_request.is_empty() {
            format!("Generate a dashboard configuration for: {}", industry)
        } else {
            full_request.to_string()
        };

        let messages = vec![
            json!({"role": "system", "content": GENERATION_SYSTEM_PROMPT}),
            json!({"role": "user", "content": user_prompt}),
        ];

        let response = match self.provider.chat(&messages, None).await {
            Ok(r) => r,
            Err(e) => {
                error!("Mode generation LLM call failed for '{}': {}", industry, e);
                return None;
            }
        };

        let content = response.content.unwrap_or_default();
        if content.is_empty() {
            error!("Mode generation returned empty response for '{}'", industry);
            return None;
        }

        let config: Value = match serde_json::from_str(strip_code_fences(&content)) {
            Ok(v) => v,
            Err(e) => {
                error!("Failed to parse generated mode JSON for '{}': {}", industry, e);
                return None;
            }
        };

        let mode = self.build_mode(industry, &config);
        info!("Mode generation complete: {} (id={})", mode.name, mode.id);
        Some(mode)
    }

    fn build_mode(&self, industry: &str, config: &Value) -> Mode {
        let fallback_id = industry.to_lowercase().replace(' ', "_");
        let primary_color = config
            .get("primary_color")
            .and_then(Value::as_str)
            .unwrap_or("#4CAF50");

        let tabs = config
            .get("tabs")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .map(|t| ModeTab {
                        id: t.get("id").and_then(Value::as_str).unwrap_or("tab").to_string(),
                        label: t
                            .get("label")
                            .and_then(Value::as_str)
                            .unwrap_or("Tab")
                            .to_string(),
                        icon: t.get("icon").and_then(Value::as_str).unwrap_or("📋").to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let default_metrics = config
            .get("default_metrics")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .map(|m| ModeMetric {
                        label: m
                            .get("label")
                            .and_then(Value::as_str)
                            .unwrap_or("Metric")
                            .to_string(),
                        value: match m.get("value") {
                            Some(Value::Number(n)) => {
                                MetricValue::Number(n.as_f64().unwrap_or(0.0))
                            }
                            Some(Value::String(s)) => MetricValue::Text(s.clone()),
                            _ => MetricValue::Text(String::new()),
                        },
                        unit: m.get("unit").and_then(Value::as_str).map(str::to_string),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Mode {
            id: config
                .get("industry_id")
                .and_then(Value::as_str)
                .unwrap_or(&fallback_id)
                .to_string(),
            name: config
                .get("industry_name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| industry.to_string()),
            company_name: config
                .get("company_name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("{} Co.", industry)),
            tagline: config
                .get("tagline")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Your trusted {} partner", industry)),
            theme: derive_theme_palette(primary_color),
            tabs,
            system_prompt: build_full_system_prompt(config),
            default_metrics,
            background_image: None,
            hero_image: None,
            chat_image: None,
        }
    }
}
