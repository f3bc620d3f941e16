use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::extract::{
    combine, extract_dscr, extract_multiple, extract_percent_near, find_owner_hours,
};
use crate::underwriting::clamp;

const MAX_DRIVERS: usize = 6;

static RECURRING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(recurring|subscription|maintenance\s+contract|annual\s+contract|contracted|reoccurring)\b")
        .unwrap()
});
static CONTRACTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(contract|renewal|retention|renew)\b").unwrap());
static LEASE_MONTHS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"lease\s+expires?\s+in\s+(?:\d{1,2})\s+months").unwrap());
static NET_INCOME_NEGATIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"net income\s*[:=]?\s*\(\$?").unwrap());
static LOSS_MAKING: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bloss[-\s]?making\b").unwrap());
static PAREN_DOLLARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\$\s*\d[\d,]*").unwrap());

const WEAK_ADDBACKS: &[&str] = &[
    "lost revenue opportunity",
    "lost opportunity",
    "pro forma",
    "run-rate",
    "synergy",
    "management fee",
    "family payroll",
    "owner salary addback",
    "discretionary travel",
    "meals & entertainment",
    "meals and entertainment",
    "one-time",
    "non-recurring",
];

const STRONG_ADDBACKS: &[&str] = &[
    "one-time legal",
    "one-time lawsuit",
    "insurance claim",
    "owner personal expenses",
    "non-operating",
];

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RatingDrivers {
    pub positives: Vec<String>,
    pub negatives: Vec<String>,
    pub neutrals: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CimRating {
    /// 0..=100
    pub score: u32,
    pub grade: &'static str,
    pub verdict: &'static str,
    pub summary: &'static str,
    pub drivers: RatingDrivers,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddbackRisk {
    pub risk: f64,
    pub note: Option<&'static str>,
}

fn has_any(lower: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| lower.contains(needle))
}

fn count_hits(lower: &str, pattern: &Regex) -> usize {
    pattern.find_iter(lower).count()
}

pub fn detect_addbacks_risk(text: &str) -> AddbackRisk {
    let t = text.to_lowercase();

    let weak = WEAK_ADDBACKS.iter().filter(|w| t.contains(*w)).count() as f64;
    let strong = STRONG_ADDBACKS.iter().filter(|w| t.contains(*w)).count() as f64;

    let risk = clamp(0.15 * weak - 0.05 * strong, 0.0, 1.0);

    let note = if risk >= 0.55 {
        Some("Add-backs look aggressive / pro-forma heavy.")
    } else if risk >= 0.25 {
        Some("Some add-backs need verification.")
    } else {
        None
    };

    AddbackRisk { risk, note }
}

pub fn grade_for(score: u32) -> &'static str {
    match score {
        97.. => "A+",
        93..=96 => "A",
        89..=92 => "A-",
        85..=88 => "B+",
        80..=84 => "B",
        75..=79 => "B-",
        70..=74 => "C+",
        64..=69 => "C",
        58..=63 => "C-",
        50..=57 => "D",
        _ => "F",
    }
}

pub fn verdict_for(score: u32) -> (&'static str, &'static str) {
    match score {
        90.. => (
            "Strong \u{2014} pursue",
            "Strong overall profile across cashflow, durability, operations, and financing.",
        ),
        78..=89 => (
            "Good \u{2014} diligence",
            "Solid deal signals \u{2014} validate diligence items and keep structure tight.",
        ),
        65..=77 => (
            "Mixed \u{2014} structure",
            "Mixed signals \u{2014} you\u{2019}ll need downside protection and clean verification.",
        ),
        52..=64 => (
            "High risk \u{2014} price dependent",
            "Higher risk \u{2014} proceed only with favorable pricing/structure and clear fixes.",
        ),
        _ => (
            "Avoid \u{2014} do not pursue",
            "Weak profile \u{2014} risk of value erosion without major deal/operational changes.",
        ),
    }
}

fn uniq(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
        if out.len() == MAX_DRIVERS {
            break;
        }
    }
    out
}

/// Deterministic underwriting score for a CIM and, optionally, the model's memo about it.
pub fn rate_cim(input_text: &str, model_output: Option<&str>) -> CimRating {
    let combined = combine(input_text, model_output);
    let t = combined.to_lowercase();

    let recurring = count_hits(&t, &RECURRING) as f64;
    let contracts = count_hits(&t, &CONTRACTS) as f64;

    let diversification = has_any(
        &t,
        &[
            "diversif",
            "broad customer base",
            "no single customer",
            "top 10 customers",
            "customer concentration below",
        ],
    );
    let concentration = has_any(
        &t,
        &["concentration", "top customer", "single customer", "key customer"],
    );
    let seasonality = has_any(&t, &["seasonal", "weather-dependent", "highly seasonal"]);
    let lawsuits = has_any(&t, &["lawsuit", "litigation", "claim", "settlement"]);
    let union = has_any(&t, &["union"]);
    let churn = has_any(&t, &["churn", "cancellation", "declining renewals"]);
    let capex_heavy = has_any(
        &t,
        &[
            "capex heavy",
            "fleet replacement",
            "equipment replacement",
            "significant capex",
            "large capital expenditure",
        ],
    );

    let owner_hours = find_owner_hours(&combined);

    let owner_dependent = has_any(
        &t,
        &[
            "owner handles",
            "owner-managed",
            "owner is the",
            "no manager",
            "no operations manager",
            "all handled by owner",
            "owner works",
            "owner runs",
        ],
    );

    let lease_short = LEASE_MONTHS.is_match(&t)
        || has_any(&t, &["month-to-month", "no renewal terms", "short lease term"]);

    let has_loss_years = NET_INCOME_NEGATIVE.is_match(&t)
        || LOSS_MAKING.is_match(&t)
        || count_hits(&t, &PAREN_DOLLARS) >= 1;

    let dscr = extract_dscr(&combined);
    let multiple = extract_multiple(&combined);

    let seller_note_pct = extract_percent_near(&combined, r"seller\s+(?:note|financing)");
    let down_payment_pct = extract_percent_near(&combined, r"\bdown\s*payment\b");

    let sba_mentioned = has_any(&t, &["sba", "7(a)", "504"]);
    let sba_eligible_language = has_any(&t, &["sba eligible", "sba-financeable", "financeable"]);

    let addbacks = detect_addbacks_risk(&combined);

    let mut positives: Vec<String> = Vec::new();
    let mut negatives: Vec<String> = Vec::new();
    let mut neutrals: Vec<String> = Vec::new();

    // Cash-flow quality
    let mut cashflow_q = 0.55;
    if has_loss_years {
        cashflow_q -= 0.18;
    }
    cashflow_q -= 0.22 * addbacks.risk;
    cashflow_q += clamp((contracts + recurring) / 10.0, 0.0, 0.18);
    let cashflow_q = clamp(cashflow_q, 0.05, 0.95);

    if has_loss_years {
        negatives.push("Loss / negative income appears in the materials.".to_string());
    } else {
        positives.push("No explicit loss years detected.".to_string());
    }
    if let Some(note) = addbacks.note {
        negatives.push(note.to_string());
    }
    if contracts + recurring >= 3.0 {
        positives.push("Contract/recurring language shows up repeatedly.".to_string());
    }

    // Durability
    let mut durability = 0.55;
    durability += clamp(recurring / 8.0, 0.0, 0.18);
    durability += if diversification { 0.10 } else { -0.04 };
    if concentration {
        durability -= 0.12;
    }
    if seasonality {
        durability -= 0.08;
    }
    if churn {
        durability -= 0.10;
    }
    let durability = clamp(durability, 0.05, 0.95);

    if diversification {
        positives.push("Customer base appears diversified.".to_string());
    }
    if concentration {
        negatives.push("Customer concentration risk mentioned.".to_string());
    }
    if seasonality {
        negatives.push("Seasonality risk mentioned.".to_string());
    }
    if churn {
        negatives.push("Churn / cancellations mentioned.".to_string());
    }

    // Operations
    let mut ops = 0.60;
    match owner_hours {
        Some(hours) => {
            let hrs = clamp(hours, 0.0, 80.0);
            let penalty = clamp((hrs - 35.0) / 45.0, 0.0, 1.0) * 0.22;
            let boost = clamp((25.0 - hrs) / 25.0, 0.0, 1.0) * 0.10;
            ops = ops - penalty + boost;
        }
        None => neutrals.push("Owner hours not specified.".to_string()),
    }
    if owner_dependent {
        ops -= 0.12;
    }
    if lease_short {
        ops -= 0.08;
    }
    if capex_heavy {
        ops -= 0.08;
    }
    if union {
        ops -= 0.06;
    }
    if lawsuits {
        ops -= 0.08;
    }
    let ops = clamp(ops, 0.05, 0.95);

    if let Some(hours) = owner_hours {
        neutrals.push(format!("Owner time: ~{} hrs/wk (if accurate).", hours.round()));
    }
    if owner_dependent {
        negatives.push("Owner dependency language appears.".to_string());
    } else {
        neutrals.push("Owner dependency not clearly flagged.".to_string());
    }
    if lease_short {
        negatives.push("Lease horizon appears short / uncertain.".to_string());
    }
    if capex_heavy {
        negatives.push("Capex replacement burden mentioned.".to_string());
    }
    if lawsuits {
        negatives.push("Legal / litigation language appears.".to_string());
    }

    // Financing
    let mut finance = 0.58;
    if sba_mentioned {
        finance += 0.06;
    }
    if sba_eligible_language {
        finance += 0.05;
    }

    match dscr {
        Some(dscr) => {
            finance += if dscr >= 1.6 {
                0.18
            } else if dscr >= 1.4 {
                0.14
            } else if dscr >= 1.25 {
                0.08
            } else if dscr >= 1.1 {
                -0.06
            } else {
                -0.16
            };
            neutrals.push(format!(
                "DSCR cited: {dscr:.2}x (if consistent with lender calc)."
            ));
        }
        None => neutrals.push("DSCR not detected.".to_string()),
    }

    match seller_note_pct {
        Some(pct) => {
            if pct >= 0.1 {
                finance += 0.06;
            }
            if pct >= 0.2 {
                finance += 0.04;
            }
            positives.push(format!("Seller financing mentioned ({:.0}%).", pct * 100.0));
        }
        None => neutrals.push("Seller financing not specified.".to_string()),
    }

    if let Some(pct) = down_payment_pct {
        if pct <= 0.1 {
            finance -= 0.03;
        }
        if pct >= 0.15 {
            finance += 0.02;
        }
    }
    let finance = clamp(finance, 0.05, 0.95);

    // Valuation
    let mut valuation = 0.56;
    match multiple {
        Some(multiple) => {
            valuation += if multiple <= 3.0 {
                0.16
            } else if multiple <= 3.8 {
                0.10
            } else if multiple <= 4.5 {
                0.03
            } else if multiple <= 5.25 {
                -0.08
            } else {
                -0.14
            };
            neutrals.push(format!("SDE multiple cited: ~{multiple:.1}x (if correct)."));
        }
        None => neutrals.push("Multiple not detected.".to_string()),
    }

    let no_seller_fin = has_any(
        &t,
        &["seller financing: none", "no seller financing", "seller note: none"],
    );
    if no_seller_fin {
        valuation -= 0.06;
    }

    let asset_sale = has_any(&t, &["asset sale preferred", "asset sale"]);
    if asset_sale {
        valuation += 0.04;
    }
    let valuation = clamp(valuation, 0.05, 0.95);

    if asset_sale {
        positives.push("Asset sale language present (usually cleaner risk profile).".to_string());
    }
    if no_seller_fin {
        negatives.push("Seller financing appears unavailable.".to_string());
    }

    let weighted = cashflow_q * 0.30
        + durability * 0.20
        + ops * 0.15
        + finance * 0.20
        + valuation * 0.15;

    let missing_core = [dscr.is_none(), multiple.is_none(), owner_hours.is_none()]
        .iter()
        .filter(|missing| **missing)
        .count() as f64;
    let confidence = 1.0 - clamp(missing_core * 0.03, 0.0, 0.09);

    let score = clamp((weighted * 100.0 * confidence).round(), 0.0, 100.0) as u32;
    let (verdict, summary) = verdict_for(score);

    CimRating {
        score,
        grade: grade_for(score),
        verdict,
        summary,
        drivers: RatingDrivers {
            positives: uniq(positives),
            negatives: uniq(negatives),
            neutrals: uniq(neutrals),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_and_verdict_thresholds() {
        assert_eq!(grade_for(97), "A+");
        assert_eq!(grade_for(93), "A");
        assert_eq!(grade_for(64), "C");
        assert_eq!(grade_for(49), "F");
        assert_eq!(verdict_for(90).0, "Strong \u{2014} pursue");
        assert_eq!(verdict_for(65).0, "Mixed \u{2014} structure");
        assert_eq!(verdict_for(51).0, "Avoid \u{2014} do not pursue");
        assert_eq!(
            verdict_for(70).1,
            "Mixed signals \u{2014} you\u{2019}ll need downside protection and clean verification."
        );
        assert_eq!(verdict_for(80).0, "Good \u{2014} diligence");
    }

    #[test]
    fn addback_risk_notes() {
        let risk = detect_addbacks_risk("Pro forma run-rate with synergy and a management fee");
        assert!((risk.risk - 0.6).abs() < 1e-9);
        assert_eq!(risk.note, Some("Add-backs look aggressive / pro-forma heavy."));

        let risk = detect_addbacks_risk("One-time legal costs, one-time lawsuit");
        // one weak hit, two strong hits
        assert!((risk.risk - 0.05).abs() < 1e-9);
        assert_eq!(risk.note, None);
    }

    #[test]
    fn empty_text_scores_baseline() {
        let rating = rate_cim("", None);
        // All base sub-scores with the full 9% confidence haircut.
        let weighted: f64 = 0.55 * 0.30 + 0.51 * 0.20 + 0.60 * 0.15 + 0.58 * 0.20 + 0.56 * 0.15;
        assert_eq!(rating.score, (weighted * 100.0 * 0.91).round() as u32);
        assert_eq!(rating.score, 51);
        assert_eq!(rating.grade, "D");
        assert!(rating.drivers.neutrals.contains(&"DSCR not detected.".to_string()));
        assert_eq!(
            rating.drivers.positives,
            vec!["No explicit loss years detected.".to_string()]
        );
    }

    #[test]
    fn strong_cim_outscores_risky_cim() {
        let strong = "Recurring maintenance contract revenue with annual contract renewals. \
                      Diversified, broad customer base. Owner works 20 hours per week with a GM. \
                      DSCR: 1.8x. SDE multiple 2.8x. Seller note 20% of price. SBA eligible. \
                      Asset sale.";
        let risky = "Top customer is 45% of sales (concentration). Highly seasonal. \
                     Owner handles everything, 60-70 hours a week. Net income: ($120,000). \
                     Pending litigation. Month-to-month lease. DSCR 1.05x. Multiple 5.8x. \
                     No seller financing. Pro forma run-rate synergy management fee.";

        let good = rate_cim(strong, None);
        let bad = rate_cim(risky, None);

        assert!(good.score > bad.score);
        assert_eq!(bad.drivers.negatives.len(), MAX_DRIVERS);
        assert!(
            bad.drivers
                .negatives
                .contains(&"Customer concentration risk mentioned.".to_string())
        );
        assert!(good.drivers.positives.contains(&"Seller financing mentioned (20%).".to_string()));
        assert_eq!(bad.grade, "F");
    }

    #[test]
    fn memo_text_is_part_of_the_signal() {
        let without = rate_cim("Plumbing company.", None);
        let with = rate_cim("Plumbing company.", Some("DSCR: 1.7x and SDE multiple 3.0x"));
        assert!(with.score > without.score);
    }
}
