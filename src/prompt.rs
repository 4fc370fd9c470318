//! System prompt assembly.
//!
//! Combines a mode's base prompt with the active persona's profile fields,
//! and rewrites chat-tool instructions into the lightweight voice-tool form
//! for realtime sessions.

use serde_json::Value;

use crate::modes::Mode;
use crate::persona::Persona;

/// Visualization tool instructions appended to every chat-mode system prompt.
///
/// `build_voice_prompt` keys off this exact block, so generated and built-in
/// prompts must embed it verbatim.
pub const CHAT_TOOLS_CONTEXT: &str = "\
You have access to visualization tools to display data in the dashboard:
- show_chart: Display charts (line, bar, pie, area) with data points
- show_metrics: Display key metrics/KPIs in the metrics panel

IMPORTANT: When you use a visualization tool, you MUST ALWAYS also provide a brief text response describing what you're showing.

For historical data (trends over time, usage patterns, etc.), generate plausible data going back 12 months with monthly data points, showing realistic patterns. This is a demo app - create compelling visualizations!

CHART PREFERENCE: For time-series data (anything \"over time\"), always use LINE charts with 12 monthly data points. Use BAR charts only for comparing discrete categories. Use PIE charts for showing composition/breakdown.";

/// Replacement block for realtime voice sessions: one lightweight tool, and
/// the model keeps talking instead of waiting for the heavy render.
pub const VOICE_TOOLS_CONTEXT: &str = "\
You have access to one visualization tool:
- request_visualization: Ask the dashboard to prepare a chart or metrics panel. Pass vis_type (\"chart\" or \"metrics\") and a one-sentence description of what to show.

IMPORTANT: After calling request_visualization, keep speaking naturally - the visualization is prepared in the background and you will be told when it is ready. Never wait silently for it.";

const UNIVERSAL_RULES: &str = "\
Universal rules: Treat every profile value above as this customer's real data - never call it fake, sample, or generated. Keep responses terse and conversational. Never report a metric as zero or empty; if a value is missing, use a plausible one instead.";

/// Format a dollar amount with thousands separators and two decimals.
fn format_currency(value: f64) -> String {
    let negative = value < 0.0;
    let cents = (value.abs() * 100.0).round() as u64;
    let whole = cents / 100;
    let frac = cents % 100;

    let digits = whole.to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    format!("{}{}.{:02}", if negative { "-" } else { "" }, grouped, frac)
}

fn field_str<'a>(persona: &'a Persona, key: &str) -> &'a str {
    persona.get(key).and_then(Value::as_str).unwrap_or("")
}

fn field_f64(persona: &Persona, key: &str) -> f64 {
    persona.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn field_len(persona: &Persona, key: &str) -> usize {
    persona
        .get(key)
        .and_then(Value::as_array)
        .map(|a| a.len())
        .unwrap_or(0)
}

fn banking_context(persona: &Persona) -> String {
    format!(
        "Current Customer Profile:\n\
         - Name: {}\n\
         - Member Since: {}\n\
         - Checking Balance: ${}\n\
         - Savings Balance: ${}\n\
         - Credit Score: {}\n\n\
         Reference this customer's information naturally in your responses.",
        field_str(persona, "name"),
        field_str(persona, "member_since"),
        format_currency(field_f64(persona, "checking_balance")),
        format_currency(field_f64(persona, "savings_balance")),
        persona
            .get("credit_score")
            .and_then(Value::as_i64)
            .unwrap_or(0),
    )
}

fn insurance_context(persona: &Persona) -> String {
    let policies = persona
        .get("active_policies")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .map(|p| {
                    format!(
                        "{} (${} coverage)",
                        p.get("type").and_then(Value::as_str).unwrap_or("Policy"),
                        format_currency(p.get("coverage").and_then(Value::as_f64).unwrap_or(0.0)),
                    )
                })
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();

    let pending_claims = persona
        .get("claims_history")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter(|c| {
                    matches!(
                        c.get("status").and_then(Value::as_str),
                        Some("pending") | Some("in_review")
                    )
                })
                .count()
        })
        .unwrap_or(0);

    format!(
        "Current Customer Profile:\n\
         - Name: {}\n\
         - Member Since: {}\n\
         - Active Policies: {}\n\
         - Pending Claims: {}\n\
         - Total Coverage: ${}\n\
         - Monthly Premium: ${}\n\n\
         Reference this customer's information naturally in your responses.",
        field_str(persona, "name"),
        field_str(persona, "member_since"),
        policies,
        pending_claims,
        format_currency(field_f64(persona, "total_coverage")),
        format_currency(field_f64(persona, "monthly_premium")),
    )
}

fn healthcare_context(persona: &Persona) -> String {
    format!(
        "Current Patient Profile:\n\
         - Name: {}\n\
         - Member ID: {}\n\
         - Primary Care Provider: {}\n\
         - Deductible Progress: ${} of ${}\n\
         - Upcoming Appointments: {}\n\
         - Active Prescriptions: {}\n\n\
         Reference this patient's information naturally in your responses.",
        field_str(persona, "name"),
        field_str(persona, "member_id"),
        field_str(persona, "primary_care_provider"),
        format_currency(field_f64(persona, "deductible_met")),
        format_currency(field_f64(persona, "deductible")),
        field_len(persona, "upcoming_appointments"),
        field_len(persona, "active_prescriptions"),
    )
}

fn generic_context(persona: &Persona) -> String {
    format!(
        "Current Customer Profile:\n\
         - Name: {}\n\
         - Customer Since: {}\n\
         - Account Value: ${}\n\
         - Loyalty Points: {}\n\
         - Status Tier: {}\n\n\
         Reference this customer's information naturally in your responses.",
        field_str(persona, "name"),
        field_str(persona, "customer_since"),
        format_currency(field_f64(persona, "account_value")),
        persona
            .get("loyalty_points")
            .and_then(Value::as_i64)
            .unwrap_or(0),
        field_str(persona, "status"),
    )
}

/// Build the full system prompt for a mode with the active persona appended.
///
/// An empty persona returns the mode's base prompt unchanged.
pub fn build_system_prompt(mode: &Mode, persona: &Persona) -> String {
    if persona.is_empty() {
        return mode.system_prompt.clone();
    }

    let context = match mode.id.as_str() {
        "banking" => banking_context(persona),
        "insurance" => insurance_context(persona),
        "healthcare" => healthcare_context(persona),
        _ => generic_context(persona),
    };

    format!("{}\n\n{}\n\n{}", mode.system_prompt, context, UNIVERSAL_RULES)
}

/// Rewrite a chat-mode system prompt for the realtime voice channel.
///
/// Swaps the heavy visualization-tool instruction block for the lightweight
/// `request_visualization` one. Prompts without the marker block (e.g. hand
/// edited) get the voice instructions appended instead.
pub fn build_voice_prompt(base_prompt: &str) -> String {
    if base_prompt.contains(CHAT_TOOLS_CONTEXT) {
        base_prompt.replace(CHAT_TOOLS_CONTEXT, VOICE_TOOLS_CONTEXT)
    } else {
        format!("{}\n\n{}", base_prompt, VOICE_TOOLS_CONTEXT)
    }
}
