use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Magnitude suffixes, longest first so `mm` and `million` win over `m`.
const SUFFIX: &str = r"(?:million|billion|mm|bn|k|m|b)";

static MONEY_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)^(-?\d+(?:\.\d+)?)(?:\s*({SUFFIX}))?$")).unwrap()
});
static HAS_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?i)\b{SUFFIX}\b")).unwrap());

static PRICE_LABELS: Lazy<Vec<Regex>> = Lazy::new(|| {
    money_patterns(&[r"asking\s+price", r"purchase\s+price", r"\btransaction\s+value\b"])
});
static SDE_LABELS: Lazy<Vec<Regex>> = Lazy::new(|| {
    money_patterns(&[
        r"\bttm\s+sde\b",
        r"\bsde\b",
        r"seller[’']s discretionary earnings",
    ])
});
static REVENUE_LABELS: Lazy<Vec<Regex>> =
    Lazy::new(|| money_patterns(&[r"\bttm\s+revenue\b", r"\brevenue\b"]));
static SBA_LOAN_LABELS: Lazy<Vec<Regex>> = Lazy::new(|| {
    money_patterns(&[r"\bestimated\s+sba\s+loan\b", r"\bsba\s+loan\b"])
});

static HOURS_RANGE: Lazy<[Regex; 2]> = Lazy::new(|| {
    [
        Regex::new(r"(?i)(\d{1,3})\s*(?:–|-|to)\s*(\d{1,3})\s*(?:hours|hrs)").unwrap(),
        Regex::new(r"(?i)(\d{1,3})\s*(?:–|-|to)\s*(\d{1,3})\s*h\b").unwrap(),
    ]
});
static HOURS_SINGLE: Lazy<[Regex; 2]> = Lazy::new(|| {
    [
        Regex::new(r"(?i)(\d{1,3})\s*(?:hours|hrs)\s*(?:/|per)?\s*(?:week|wk)").unwrap(),
        Regex::new(r"(?i)works?\s*(?:~|about)?\s*(\d{1,3})\s*(?:hours|hrs)").unwrap(),
    ]
});
static DSCR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bdscr\b\s*[:=]?\s*(\d+(?:\.\d+)?)\s*x?").unwrap());
static MULTIPLE: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        Regex::new(r"(?i)\bmultiple\b[^\d]{0,20}(\d+(?:\.\d+)?)\s*x").unwrap(),
        Regex::new(r"(?i)\bprice\s*/\s*sde\b[^\d]{0,20}(\d+(?:\.\d+)?)\s*x").unwrap(),
        Regex::new(r"(?i)\bsde\s*multiple\b[^\d]{0,20}(\d+(?:\.\d+)?)\s*x").unwrap(),
    ]
});

fn money_patterns(labels: &[&str]) -> Vec<Regex> {
    labels
        .iter()
        .map(|label| {
            Regex::new(&format!(
                r"(?i){label}[\s\S]{{0,140}}?(\$\s*-?\d[\d,]*(?:\.\d+)?(?:\s*{SUFFIX}\b)?|\b-?\d[\d,]*(?:\.\d+)?\s*{SUFFIX}\b)"
            ))
            .unwrap()
        })
        .collect()
}

/// Inclusive bounds a figure must fall in to be believed.
#[derive(Debug, Clone, Copy)]
pub struct Plausible {
    pub min: f64,
    pub max: f64,
}

pub const PRICE_RANGE: Plausible = Plausible { min: 50_000.0, max: 50_000_000.0 };
pub const SDE_RANGE: Plausible = Plausible { min: 10_000.0, max: 20_000_000.0 };
pub const REVENUE_RANGE: Plausible = Plausible { min: 50_000.0, max: 200_000_000.0 };
pub const SBA_LOAN_RANGE: Plausible = Plausible { min: 50_000.0, max: 100_000_000.0 };

/// Share of the price an SBA loan usually covers; used to back out a price.
pub const SBA_LOAN_TO_PRICE: f64 = 0.85;

#[derive(Debug, Clone, PartialEq)]
pub struct MoneyHit {
    pub raw: String,
    pub value: f64,
    pub has_dollar: bool,
    pub has_suffix: bool,
    pub comma_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CimFigures {
    pub price: Option<f64>,
    pub revenue: Option<f64>,
    pub sde: Option<f64>,
    pub sba_loan: Option<f64>,
}

pub fn norm_text(s: &str) -> String {
    s.replace('\u{00A0}', " ").trim().to_string()
}

/// Joins the submitted CIM text with the model's memo, skipping empty parts.
pub fn combine(input_text: &str, model_output: Option<&str>) -> String {
    let parts: Vec<&str> = [Some(input_text), model_output]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect();
    norm_text(&parts.join("\n\n"))
}

/// Parses a money token, rejecting percentages and small bare numbers.
pub fn parse_money_strict(raw: &str) -> Option<MoneyHit> {
    let s = raw.trim();
    if s.contains('%') {
        return None;
    }

    let has_dollar = s.contains('$');
    let has_suffix = HAS_SUFFIX.is_match(s);
    let comma_count = s.matches(',').count();

    let cleaned = s.replace(['$', ','], "").trim().to_lowercase();
    let caps = MONEY_TOKEN.captures(&cleaned)?;

    let base: f64 = caps.get(1)?.as_str().parse().ok()?;
    if !base.is_finite() {
        return None;
    }

    let mult = match caps.get(2).map(|m| m.as_str()) {
        Some("k") => 1_000.0,
        Some("m" | "mm" | "million") => 1_000_000.0,
        Some("b" | "bn" | "billion") => 1_000_000_000.0,
        _ => 1.0,
    };
    let value = base * mult;

    let looks_like_money = has_dollar || has_suffix || comma_count >= 1 || value.abs() >= 1_000.0;
    if !looks_like_money {
        return None;
    }

    Some(MoneyHit {
        raw: s.to_string(),
        value,
        has_dollar,
        has_suffix,
        comma_count,
    })
}

/// First money token within 140 chars after the label.
pub fn find_money_after_label(text: &str, pattern: &Regex) -> Option<MoneyHit> {
    let t = norm_text(text);
    let caps = pattern.captures(&t)?;
    parse_money_strict(caps.get(1)?.as_str())
}

/// Largest candidate inside the plausible range.
pub fn best_money_for_field(hits: &[Option<MoneyHit>], range: Plausible) -> Option<f64> {
    hits.iter()
        .flatten()
        .map(|hit| hit.value)
        .filter(|v| v.is_finite() && *v >= range.min && *v <= range.max)
        .fold(None, |best: Option<f64>, v| Some(best.map_or(v, |b| b.max(v))))
}

fn best_for_labels(text: &str, labels: &[Regex], range: Plausible) -> Option<f64> {
    let hits: Vec<Option<MoneyHit>> = labels
        .iter()
        .map(|pattern| find_money_after_label(text, pattern))
        .collect();
    best_money_for_field(&hits, range)
}

pub fn extract_figures(blob: &str) -> CimFigures {
    let price = best_for_labels(blob, &PRICE_LABELS, PRICE_RANGE);
    let sde = best_for_labels(blob, &SDE_LABELS, SDE_RANGE);
    let revenue = best_for_labels(blob, &REVENUE_LABELS, REVENUE_RANGE);
    let sba_loan = best_for_labels(blob, &SBA_LOAN_LABELS, SBA_LOAN_RANGE);

    CimFigures {
        price: price.or_else(|| sba_loan.map(|loan| loan / SBA_LOAN_TO_PRICE)),
        revenue,
        sde,
        sba_loan,
    }
}

/// Percentage within 120 chars after the label, as a decimal.
pub fn extract_percent_near(text: &str, label: &str) -> Option<f64> {
    let pattern = Regex::new(&format!(r"(?i){label}[\s\S]{{0,120}}?(\d+(?:\.\d+)?)\s*%")).ok()?;
    let t = norm_text(text);
    let caps = pattern.captures(&t)?;
    let n: f64 = caps.get(1)?.as_str().parse().ok()?;
    n.is_finite().then_some(n / 100.0)
}

pub fn find_owner_hours(text: &str) -> Option<f64> {
    let t = norm_text(text).to_lowercase();

    for pattern in HOURS_RANGE.iter() {
        if let Some(caps) = pattern.captures(&t) {
            let a = caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok());
            let b = caps.get(2).and_then(|m| m.as_str().parse::<f64>().ok());
            if let (Some(a), Some(b)) = (a, b) {
                return Some((a + b) / 2.0);
            }
        }
    }

    HOURS_SINGLE.iter().find_map(|pattern| {
        pattern
            .captures(&t)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
    })
}

pub fn extract_dscr(text: &str) -> Option<f64> {
    let t = norm_text(text);
    DSCR.captures(&t)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

pub fn extract_multiple(text: &str) -> Option<f64> {
    let t = norm_text(text);
    MULTIPLE.iter().find_map(|pattern| {
        pattern
            .captures(&t)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_money_parsing() {
        assert_eq!(parse_money_strict("$1,250,000").map(|h| h.value), Some(1_250_000.0));
        assert_eq!(parse_money_strict("2.4M").map(|h| h.value), Some(2_400_000.0));
        assert_eq!(parse_money_strict("$1.1 million").map(|h| h.value), Some(1_100_000.0));
        assert_eq!(parse_money_strict("850k").map(|h| h.value), Some(850_000.0));
        assert_eq!(parse_money_strict("3 bn").map(|h| h.value), Some(3_000_000_000.0));
    }

    #[test]
    fn strict_money_rejects_non_money() {
        assert_eq!(parse_money_strict("12%"), None);
        assert_eq!(parse_money_strict("42"), None);
        assert_eq!(parse_money_strict("abc"), None);
        assert!(parse_money_strict("4200").is_some());
    }

    #[test]
    fn finds_labelled_figures() {
        let blob = "Asking Price: $1,200,000 (includes inventory). TTM Revenue of $3.1M and \
                    SDE: $410,000. Estimated SBA loan $1,020,000.";
        let figures = extract_figures(blob);

        assert_eq!(figures.price, Some(1_200_000.0));
        assert_eq!(figures.revenue, Some(3_100_000.0));
        assert_eq!(figures.sde, Some(410_000.0));
        assert_eq!(figures.sba_loan, Some(1_020_000.0));
    }

    #[test]
    fn price_falls_back_to_sba_loan() {
        let figures = extract_figures("The SBA loan is expected at $850,000.");
        assert_eq!(figures.price, Some(1_000_000.0));
    }

    #[test]
    fn dollar_followed_by_word_is_not_a_suffix() {
        let figures = extract_figures("Asking price is $500 more than last year, revenue 2 m");
        assert_eq!(figures.price, None);
        assert_eq!(figures.revenue, Some(2_000_000.0));
    }

    #[test]
    fn out_of_range_values_are_dropped() {
        let figures = extract_figures("Revenue: $12,000. SDE: $90 billion");
        assert_eq!(figures.revenue, None);
        assert_eq!(figures.sde, None);
    }

    #[test]
    fn owner_hours_range_and_single() {
        assert_eq!(find_owner_hours("Owner works 40-50 hours per week"), Some(45.0));
        assert_eq!(find_owner_hours("owner puts in 20 hrs/week"), Some(20.0));
        assert_eq!(find_owner_hours("semi-absentee"), None);
    }

    #[test]
    fn dscr_multiple_and_percent() {
        assert_eq!(extract_dscr("Projected DSCR: 1.45x"), Some(1.45));
        assert_eq!(extract_multiple("SDE multiple of 3.2x"), Some(3.2));
        assert_eq!(extract_multiple("priced at 3.8 times"), None);
        assert_eq!(
            extract_percent_near("Seller note for 15% of the price", r"seller\s+(?:note|financing)"),
            Some(0.15)
        );
    }
}
