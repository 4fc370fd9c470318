//! Mode-switch detection.
//!
//! A cheap local wake-word check gates an LLM intent classification; the
//! extracted industry is resolved against the built-in families, previously
//! generated modes, or handed to the generator. Detection never raises past
//! this module; every failure degrades to "no switch happened".

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::modes::generator::{strip_code_fences, ModeGenerator};
use crate::modes::{Mode, ModeStore};
use crate::providers::ChatProvider;

/// The trigger phrase inviting a mode-switch classification.
pub const WAKE_WORD: &str = "presto";

static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").unwrap());

const CLASSIFY_SYSTEM_PROMPT: &str = "\
You classify messages for a multi-industry dashboard assistant. The user may be asking \
the assistant to switch to a different industry (\"Presto, you're a bank\", \
\"presto change-o, become Joe's Tacos\").\n\n\
Respond with valid JSON only, no other text:\n\
- If the message requests an industry switch: {\"industry\": \"<industry>\", \"company_name\": \"<name>\" or null}\n\
  company_name is ONLY set when the user names a specific company.\n\
- Otherwise: {\"industry\": null, \"company_name\": null}";

/// Lowercase and strip punctuation so spacing/punctuation variants of the
/// trigger phrase all match.
pub fn normalize_text(text: &str) -> String {
    PUNCTUATION.replace_all(&text.to_lowercase(), "").to_string()
}

/// Cheap local test for the trigger phrase.
pub fn contains_wake_word(text: &str) -> bool {
    normalize_text(text).contains(WAKE_WORD)
}

/// Normalize an industry string to a mode identifier ("Pet store" -> "pet_store").
fn industry_to_id(industry: &str) -> String {
    normalize_text(industry)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Map an extracted industry to a built-in family by keyword containment.
fn builtin_family(industry: &str) -> Option<&'static str> {
    let lower = industry.to_lowercase();
    if lower.contains("bank") || lower.contains("financ") {
        return Some("banking");
    }
    if lower.contains("insur") || lower.contains("claim") {
        return Some("insurance");
    }
    if ["health", "medical", "hospital", "doctor", "clinic"]
        .iter()
        .any(|kw| lower.contains(kw))
    {
        return Some("healthcare");
    }
    None
}

/// Loading-indicator callbacks, fired to mask classification/generation
/// latency. Each channel surfaces these in its own envelope shape.
#[async_trait]
pub trait SwitchSignals: Send + Sync {
    /// The detector believes a switch is underway (wake word matched, or
    /// generation started for `industry`).
    async fn generating(&self, industry: &str);
    /// The switch did not happen after all; hide the indicator.
    async fn cancel_generating(&self);
}

/// No-op signals for callers without a loading UI.
pub struct NoSignals;

#[async_trait]
impl SwitchSignals for NoSignals {
    async fn generating(&self, _industry: &str) {}
    async fn cancel_generating(&self) {}
}

/// The classifier's verdict.
struct Classification {
    industry: String,
    company_name: Option<String>,
}

/// Detects and resolves industry switches.
pub struct ModeSwitchDetector {
    provider: Arc<dyn ChatProvider>,
    generator: ModeGenerator,
    store: Arc<ModeStore>,
}

impl ModeSwitchDetector {
    pub fn new(provider: Arc<dyn ChatProvider>, store: Arc<ModeStore>) -> Self {
        Self {
            generator: ModeGenerator::new(provider.clone()),
            provider,
            store,
        }
    }

    /// Decide whether `text` requests an industry switch and resolve the
    /// target mode. Returns `None` when no switch should happen, including
    /// on every classification, parsing, or generation failure.
    pub async fn detect(&self, text: &str, signals: &dyn SwitchSignals) -> Option<Mode> {
        if !contains_wake_word(text) {
            return None;
        }

        // Fire the loading indicator immediately; the classification call
        // below is the slow part.
        signals.generating("").await;

        let classification = match self.classify(text).await {
            Some(c) => c,
            None => {
                signals.cancel_generating().await;
                return None;
            }
        };

        let Classification {
            industry,
            company_name,
        } = classification;

        // Resolve against built-in families, then previously generated modes.
        let base = builtin_family(&industry)
            .and_then(|family| self.store.get(family))
            .or_else(|| self.store.find_generated(&industry_to_id(&industry)));

        if let Some(base) = base {
            info!("Mode switch resolved: {} -> {}", industry, base.id);
            return match company_name {
                Some(name) if !name.is_empty() => Some(base.with_company_name(&name)),
                _ => Some(base),
            };
        }

        // Unknown industry: generate a new mode.
        signals.generating(&industry).await;
        match self.generator.generate(&industry, text).await {
            Some(mode) => {
                self.store.insert_generated(mode.clone());
                Some(mode)
            }
            None => {
                warn!("Mode generation failed for '{}', keeping current mode", industry);
                signals.cancel_generating().await;
                None
            }
        }
    }

    /// Run the LLM intent classification. `None` means "no switch": the
    /// verdict, a malformed reply declaring nothing, or a transport error.
    async fn classify(&self, text: &str) -> Option<Classification> {
        let messages = vec![
            json!({"role": "system", "content": CLASSIFY_SYSTEM_PROMPT}),
            json!({"role": "user", "content": text}),
        ];

        let reply = match self.provider.chat(&messages, None).await {
            Ok(response) => response.content.unwrap_or_default(),
            Err(e) => {
                warn!("Mode-switch classification failed: {}", e);
                return None;
            }
        };
        if reply.is_empty() {
            return None;
        }

        let cleaned = strip_code_fences(&reply);
        match serde_json::from_str::<Value>(cleaned) {
            Ok(parsed) => {
                let industry = parsed
                    .get("industry")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .trim()
                    .to_string();
                if industry.is_empty() || industry.eq_ignore_ascii_case("null") {
                    return None;
                }
                let company_name = parsed
                    .get("company_name")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);
                Some(Classification {
                    industry,
                    company_name,
                })
            }
            Err(_) => {
                // Malformed reply: treat the raw text as the industry string.
                let raw = cleaned.trim();
                if raw.is_empty() || raw.len() > 80 {
                    return None;
                }
                Some(Classification {
                    industry: raw.to_string(),
                    company_name: None,
                })
            }
        }
    }
}
