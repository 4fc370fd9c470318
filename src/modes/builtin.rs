//! Pre-built industry modes: banking, insurance, healthcare.
//!
//! These three families ship with the app; everything else is generated on
//! demand. Prompts embed the chat tools-context block so the voice rewrite
//! in `prompt::build_voice_prompt` has its marker.

use crate::modes::types::{Mode, ModeMetric, ModeTab, ModeTheme};
use crate::prompt::CHAT_TOOLS_CONTEXT;

fn tab(id: &str, label: &str, icon: &str) -> ModeTab {
    ModeTab {
        id: id.to_string(),
        label: label.to_string(),
        icon: icon.to_string(),
    }
}

fn metric(label: &str, value: &str, unit: Option<&str>) -> ModeMetric {
    ModeMetric {
        label: label.to_string(),
        value: value.into(),
        unit: unit.map(str::to_string),
    }
}

/// The built-in banking mode.
pub fn banking_mode() -> Mode {
    let system_prompt = format!(
        "You are a helpful virtual banker for First Meridian Bank. You help customers \
         understand their accounts, balances, transactions, and credit. Speak like a \
         friendly, knowledgeable personal banker: clear, professional, and concise. \
         Use everyday language rather than banking jargon, and surface concrete numbers \
         from the customer's profile whenever they are relevant.\n\n{}",
        CHAT_TOOLS_CONTEXT
    );

    Mode {
        id: "banking".to_string(),
        name: "Banking".to_string(),
        company_name: "First Meridian Bank".to_string(),
        tagline: "Banking that moves with you".to_string(),
        theme: ModeTheme {
            primary: "#1e88e5".to_string(),
            secondary: "#e5881e".to_string(),
            background: "#f8fafc".to_string(),
            surface: "#ffffff".to_string(),
            text: "#0f172a".to_string(),
            text_muted: "#64748b".to_string(),
        },
        tabs: vec![
            tab("dashboard", "Dashboard", "📊"),
            tab("accounts", "Accounts", "💳"),
            tab("transfers", "Transfers", "💸"),
            tab("credit", "Credit", "📈"),
            tab("settings", "Settings", "⚙️"),
        ],
        system_prompt,
        default_metrics: vec![
            metric("Checking Balance", "$4,820", None),
            metric("Savings Balance", "$18,450", None),
            metric("Credit Score", "742", None),
            metric("Monthly Spend", "$2,310", None),
        ],
        background_image: None,
        hero_image: None,
        chat_image: None,
    }
}

/// The built-in insurance mode.
pub fn insurance_mode() -> Mode {
    let system_prompt = format!(
        "You are a helpful insurance advisor for Safeguard Mutual Insurance. You help \
         customers understand their policies, coverage, premiums, and claims. Be \
         reassuring and precise: insurance is stressful, so explain terms plainly and \
         reference the customer's actual policies and claim history where relevant.\n\n{}",
        CHAT_TOOLS_CONTEXT
    );

    Mode {
        id: "insurance".to_string(),
        name: "Insurance".to_string(),
        company_name: "Safeguard Mutual Insurance".to_string(),
        tagline: "Cover what matters".to_string(),
        theme: ModeTheme {
            primary: "#2e7d32".to_string(),
            secondary: "#7d2e79".to_string(),
            background: "#f8fafc".to_string(),
            surface: "#ffffff".to_string(),
            text: "#0f172a".to_string(),
            text_muted: "#64748b".to_string(),
        },
        tabs: vec![
            tab("dashboard", "Dashboard", "📊"),
            tab("policies", "Policies", "📋"),
            tab("claims", "Claims", "📝"),
            tab("coverage", "Coverage", "🛡️"),
            tab("settings", "Settings", "⚙️"),
        ],
        system_prompt,
        default_metrics: vec![
            metric("Active Policies", "3", None),
            metric("Total Coverage", "$850K", None),
            metric("Monthly Premium", "$412", None),
            metric("Open Claims", "1", None),
        ],
        background_image: None,
        hero_image: None,
        chat_image: None,
    }
}

/// The built-in healthcare mode.
pub fn healthcare_mode() -> Mode {
    let system_prompt = format!(
        "You are a helpful care coordinator for Lakeside Health Network. You help \
         patients with appointments, prescriptions, deductibles, and plan benefits. \
         Be warm and clear, avoid clinical jargon, and never give medical advice - \
         direct diagnosis or treatment questions to the patient's provider.\n\n{}",
        CHAT_TOOLS_CONTEXT
    );

    Mode {
        id: "healthcare".to_string(),
        name: "Healthcare".to_string(),
        company_name: "Lakeside Health Network".to_string(),
        tagline: "Care, close to home".to_string(),
        theme: ModeTheme {
            primary: "#00897b".to_string(),
            secondary: "#891c00".to_string(),
            background: "#f8fafc".to_string(),
            surface: "#ffffff".to_string(),
            text: "#0f172a".to_string(),
            text_muted: "#64748b".to_string(),
        },
        tabs: vec![
            tab("dashboard", "Dashboard", "📊"),
            tab("appointments", "Appointments", "📅"),
            tab("prescriptions", "Prescriptions", "💊"),
            tab("benefits", "Benefits", "🏥"),
            tab("settings", "Settings", "⚙️"),
        ],
        system_prompt,
        default_metrics: vec![
            metric("Deductible Met", "$1,120", None),
            metric("Next Appointment", "Mar 14", None),
            metric("Active Prescriptions", "2", None),
            metric("Out-of-Pocket Spent", "$1,870", None),
        ],
        background_image: None,
        hero_image: None,
        chat_image: None,
    }
}

/// All built-in modes, banking first (the startup default).
pub fn builtin_modes() -> Vec<Mode> {
    vec![banking_mode(), insurance_mode(), healthcare_mode()]
}
