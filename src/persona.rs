//! Seeded synthetic persona generation.
//!
//! Produces the demo customer/patient profile for the active mode. Generation
//! is deterministic from `(mode_id, seed)` so the same session always sees
//! the same balances, policies, and appointments.

use chrono::{Datelike, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

/// A flat profile-field mapping, shape depends on the mode family.
pub type Persona = Map<String, Value>;

/// Fixed demo customer for the three built-in families.
const DEMO_CUSTOMER_NAME: &str = "Marco Casalaina";

const FIRST_NAMES: [&str; 8] = [
    "Avery", "Jordan", "Riley", "Casey", "Morgan", "Quinn", "Dana", "Reese",
];
const LAST_NAMES: [&str; 10] = [
    "Alvarez", "Chen", "Okafor", "Patel", "Nguyen", "Kowalski", "Haddad", "Ferreira",
    "Lindqvist", "Morrison",
];
const CITIES: [&str; 6] = [
    "Riverton", "Fairview", "Oakdale", "Brookfield", "Cedar Falls", "Lakewood",
];
const MERCHANTS: [&str; 10] = [
    "Northside Grocery", "Transit Authority", "Blue Bottle Cafe", "City Utilities",
    "Corner Hardware", "Streamline Fitness", "Pagewood Books", "Metro Fuel",
    "Garden Supply Co", "Daily Market",
];

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn days_ago(days: i64) -> String {
    (Utc::now().date_naive() - Duration::days(days)).to_string()
}

fn days_ahead(days: i64) -> String {
    (Utc::now().date_naive() + Duration::days(days)).to_string()
}

/// Derive the stable per-session persona seed.
///
/// First 8 hex digits of a digest over a fixed session marker; a
/// multi-connection deployment would hash the connection id instead.
pub fn session_seed() -> u64 {
    let digest = Sha256::digest(b"demo-session");
    let hex: String = digest.iter().take(4).map(|b| format!("{:02x}", b)).collect();
    u64::from_str_radix(&hex, 16).unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Family generators
// ---------------------------------------------------------------------------

fn generate_banking(rng: &mut StdRng) -> Persona {
    let num_transactions = rng.gen_range(5..=10);
    let mut transactions: Vec<(String, Value)> = Vec::new();
    for _ in 0..num_transactions {
        let is_debit = rng.gen_bool(0.5);
        let date = days_ago(rng.gen_range(0..=30));
        let entry = if is_debit {
            json!({
                "date": date,
                "description": MERCHANTS[rng.gen_range(0..MERCHANTS.len())],
                "amount": round2(rng.gen_range(5.0..500.0)),
                "category": "debit",
            })
        } else {
            json!({
                "date": date,
                "description": "Direct Deposit",
                "amount": round2(rng.gen_range(100.0..3000.0)),
                "category": "credit",
            })
        };
        transactions.push((date.clone(), entry));
    }
    // Most recent first.
    transactions.sort_by(|a, b| b.0.cmp(&a.0));

    let mut persona = Persona::new();
    persona.insert("name".into(), json!(DEMO_CUSTOMER_NAME));
    persona.insert(
        "member_since".into(),
        json!((Utc::now().date_naive().year() - rng.gen_range(1..=15)).to_string()),
    );
    persona.insert(
        "checking_balance".into(),
        json!(round2(rng.gen_range(500.0..15000.0))),
    );
    persona.insert(
        "savings_balance".into(),
        json!(round2(rng.gen_range(1000.0..50000.0))),
    );
    persona.insert(
        "account_number_last4".into(),
        json!(format!("{:04}", rng.gen_range(0..10000))),
    );
    persona.insert("credit_score".into(), json!(rng.gen_range(620..=820)));
    persona.insert(
        "credit_limit".into(),
        json!(round2(rng.gen_range(2000.0..25000.0))),
    );
    persona.insert(
        "recent_transactions".into(),
        Value::Array(transactions.into_iter().map(|(_, v)| v).collect()),
    );
    persona
}

fn generate_insurance(rng: &mut StdRng) -> Persona {
    let policy_types = ["Auto", "Home", "Life", "Umbrella"];
    let num_policies = rng.gen_range(1..=3);

    // Sample distinct policy types.
    let mut available: Vec<&str> = policy_types.to_vec();
    let mut policies = Vec::new();
    let mut total_coverage = 0.0;
    let mut total_premium = 0.0;

    for _ in 0..num_policies {
        let idx = rng.gen_range(0..available.len());
        let policy_type = available.remove(idx);

        let (coverage, premium, deductible) = match policy_type {
            "Auto" => (
                rng.gen_range(25_000..=100_000) as f64,
                round2(rng.gen_range(80.0..250.0)),
                [250.0, 500.0, 1000.0][rng.gen_range(0..3)],
            ),
            "Home" => (
                rng.gen_range(200_000..=750_000) as f64,
                round2(rng.gen_range(100.0..400.0)),
                [500.0, 1000.0, 2500.0][rng.gen_range(0..3)],
            ),
            "Life" => (
                rng.gen_range(100_000..=1_000_000) as f64,
                round2(rng.gen_range(30.0..150.0)),
                0.0,
            ),
            _ => (
                rng.gen_range(1_000_000..=5_000_000) as f64,
                round2(rng.gen_range(20.0..80.0)),
                0.0,
            ),
        };

        total_coverage += coverage;
        total_premium += premium;

        policies.push(json!({
            "type": policy_type,
            "coverage": coverage,
            "premium": premium,
            "deductible": deductible,
            "policy_number": format!("POL-{:04}-{:04X}", rng.gen_range(0..10000), rng.gen_range(0u32..0xFFFF)),
            "renewal_date": days_ahead(rng.gen_range(30..=365)),
        }));
    }

    let claim_types = ["Collision", "Property Damage", "Medical", "Theft", "Weather"];
    let claim_statuses = ["approved", "pending", "in_review", "denied"];
    let num_claims = rng.gen_range(0..=2);
    let mut claims = Vec::new();
    for _ in 0..num_claims {
        claims.push(json!({
            "claim_id": format!("CLM-{:08}", rng.gen_range(0..100_000_000u64)),
            "date": days_ago(rng.gen_range(30..=730)),
            "type": claim_types[rng.gen_range(0..claim_types.len())],
            "amount": round2(rng.gen_range(500.0..15000.0)),
            "status": claim_statuses[rng.gen_range(0..claim_statuses.len())],
        }));
    }

    let risk_score = match num_claims {
        0 => "low",
        1 => ["low", "medium"][rng.gen_range(0..2)],
        _ => ["medium", "high"][rng.gen_range(0..2)],
    };

    let mut persona = Persona::new();
    persona.insert("name".into(), json!(DEMO_CUSTOMER_NAME));
    persona.insert(
        "member_since".into(),
        json!((Utc::now().date_naive().year() - rng.gen_range(1..=20)).to_string()),
    );
    persona.insert("active_policies".into(), Value::Array(policies));
    persona.insert("claims_history".into(), Value::Array(claims));
    persona.insert("total_coverage".into(), json!(total_coverage));
    persona.insert("monthly_premium".into(), json!(round2(total_premium)));
    persona.insert("risk_score".into(), json!(risk_score));
    persona
}

fn generate_healthcare(rng: &mut StdRng) -> Persona {
    let specialties = [
        "Primary Care", "Cardiology", "Dermatology", "Orthopedics", "Ophthalmology",
        "Dentistry",
    ];
    let times = ["9:00 AM", "10:30 AM", "1:00 PM", "2:30 PM", "4:00 PM"];

    let num_appointments = rng.gen_range(0..=2);
    let mut appointments: Vec<(String, Value)> = Vec::new();
    for _ in 0..num_appointments {
        let date = days_ahead(rng.gen_range(1..=90));
        let entry = json!({
            "date": date,
            "time": times[rng.gen_range(0..times.len())],
            "provider": format!("Dr. {}", LAST_NAMES[rng.gen_range(0..LAST_NAMES.len())]),
            "specialty": specialties[rng.gen_range(0..specialties.len())],
            "location": format!("{} Medical Center", CITIES[rng.gen_range(0..CITIES.len())]),
        });
        appointments.push((date.clone(), entry));
    }
    appointments.sort_by(|a, b| a.0.cmp(&b.0));

    let medications: [(&str, &str, &str); 8] = [
        ("Lisinopril", "10mg", "Once daily"),
        ("Metformin", "500mg", "Twice daily"),
        ("Atorvastatin", "20mg", "Once daily at bedtime"),
        ("Omeprazole", "20mg", "Once daily before breakfast"),
        ("Amlodipine", "5mg", "Once daily"),
        ("Levothyroxine", "50mcg", "Once daily on empty stomach"),
        ("Sertraline", "50mg", "Once daily"),
        ("Gabapentin", "300mg", "Three times daily"),
    ];
    let num_prescriptions = rng.gen_range(1..=3);
    let mut med_pool: Vec<usize> = (0..medications.len()).collect();
    let mut prescriptions = Vec::new();
    for _ in 0..num_prescriptions {
        let idx = med_pool.remove(rng.gen_range(0..med_pool.len()));
        let (name, dosage, frequency) = medications[idx];
        prescriptions.push(json!({
            "medication": name,
            "dosage": dosage,
            "frequency": frequency,
            "refills_remaining": rng.gen_range(0..=5),
        }));
    }

    let deductible = [500.0, 1000.0, 1500.0, 2500.0, 3000.0, 5000.0][rng.gen_range(0..6)];
    let deductible_met = round2(rng.gen_range(0.0..deductible));
    let out_of_pocket_max = [3000.0, 5000.0, 6500.0, 8000.0][rng.gen_range(0..4)];
    let out_of_pocket_spent = round2(rng.gen_range(0.0..out_of_pocket_max * 0.6));

    let mut persona = Persona::new();
    persona.insert("name".into(), json!(DEMO_CUSTOMER_NAME));
    persona.insert(
        "member_id".into(),
        json!(format!("MBR-{:09}", rng.gen_range(0..1_000_000_000u64))),
    );
    persona.insert("date_of_birth".into(), json!(days_ago(rng.gen_range(25 * 365..75 * 365))));
    persona.insert(
        "primary_care_provider".into(),
        json!(format!("Dr. {}", LAST_NAMES[rng.gen_range(0..LAST_NAMES.len())])),
    );
    persona.insert(
        "plan_name".into(),
        json!(["Gold PPO", "Silver HMO", "Bronze HDHP", "Platinum PPO"][rng.gen_range(0..4)]),
    );
    persona.insert("deductible".into(), json!(deductible));
    persona.insert("deductible_met".into(), json!(deductible_met));
    persona.insert("out_of_pocket_max".into(), json!(out_of_pocket_max));
    persona.insert("out_of_pocket_spent".into(), json!(out_of_pocket_spent));
    persona.insert(
        "upcoming_appointments".into(),
        Value::Array(appointments.into_iter().map(|(_, v)| v).collect()),
    );
    persona.insert("active_prescriptions".into(), Value::Array(prescriptions));
    persona
}

/// Generic profile for dynamically generated industries.
fn generate_generic(rng: &mut StdRng, mode_name: &str) -> Persona {
    let name = format!(
        "{} {}",
        FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())],
        LAST_NAMES[rng.gen_range(0..LAST_NAMES.len())],
    );

    let mut persona = Persona::new();
    persona.insert("name".into(), json!(name));
    persona.insert(
        "customer_since".into(),
        json!(days_ago(rng.gen_range(365..=5 * 365))),
    );
    persona.insert(
        "account_value".into(),
        json!(round2(rng.gen_range(1000.0..50000.0))),
    );
    persona.insert(
        "recent_activity_count".into(),
        json!(rng.gen_range(5..=30)),
    );
    persona.insert("loyalty_points".into(), json!(rng.gen_range(100..=10000)));
    persona.insert(
        "status".into(),
        json!(["Bronze", "Silver", "Gold", "Platinum"][rng.gen_range(0..4)]),
    );
    persona.insert(
        "context_hint".into(),
        json!(format!("This is a {} customer dashboard.", mode_name)),
    );
    persona
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Generate an industry-appropriate persona for a mode.
///
/// Unknown mode ids fall back to the generic profile, with the id turned
/// into a display name ("pet_store" -> "Pet Store").
pub fn generate_persona(mode_id: &str, seed: u64) -> Persona {
    let mut rng = StdRng::seed_from_u64(seed);

    match mode_id.to_lowercase().as_str() {
        "banking" => generate_banking(&mut rng),
        "insurance" => generate_insurance(&mut rng),
        "healthcare" => generate_healthcare(&mut rng),
        other => {
            let mode_name = other
                .split('_')
                .filter(|part| !part.is_empty())
                .map(|part| {
                    let mut chars = part.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                        None => String::new(),
                    }
                })
                .collect::<Vec<_>>()
                .join(" ");
            generate_generic(&mut rng, &mode_name)
        }
    }
}
