use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::hostname::safe_hostname;

pub const SCORING_SYSTEM_PROMPT: &str = r#"You are a blunt, professional small-business underwriting assistant.
Score deals from 1-10 using a STRICT rubric.

CALIBRATION:
- 10/10 must be RARE (<5% of deals).
- Most deals should score 4-7.

HARD CAPS (must follow):
- If dscr is null: cap score at 6.
- If dscr < 1.00: score MUST be 1-2.
- If 1.00 <= dscr < 1.15: score MUST be <= 3.
- If 1.15 <= dscr < 1.25: score MUST be <= 6.
- If dscr >= 1.25: score can exceed 6 ONLY if valuation and structure are strong.

VALUATION (use benchmark when present):
- If cashflowMultiple > benchmark by 20%+: subtract 2 points.
- If cashflowMultiple > benchmark by 40%+: subtract 4 points.
- If cashflowMultiple below benchmark by 10%+: add 1 point (still obey DSCR caps).
- If benchmark is missing: include a weakness about missing comps.

MARGIN QUALITY (profitMarginPct):
- <10% => -2
- 10-20% => -1
- 20-30% => 0
- >30% => +1

MISSING DATA:
- If revenue is null: -1 and include a weakness about incomplete revenue/margin.

Return ONLY valid JSON with:
{
  "score": integer 1-10,
  "scoreBreakdown": {
    "debtService": number 0-10,
    "valuation": number 0-10,
    "marginQuality": number 0-10,
    "structure": number 0-10,
    "dataQuality": number 0-10
  },
  "topWeaknesses": [3-5 short bullets],
  "summary": "one short paragraph; include DSCR and multiples when available"
}"#;

pub const MAX_WEAKNESSES: usize = 5;

/// Calculator snapshot posted by the client for AI scoring.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ScoringRequest {
    pub industry: Option<String>,
    pub listing_url: Option<String>,
    #[serde(deserialize_with = "optional_number")]
    pub asking_price: Option<f64>,
    #[serde(deserialize_with = "optional_number")]
    pub revenue: Option<f64>,
    #[serde(deserialize_with = "optional_number")]
    pub sde: Option<f64>,
    #[serde(deserialize_with = "optional_number")]
    pub dscr: Option<f64>,
    #[serde(deserialize_with = "optional_number")]
    pub cashflow_multiple: Option<f64>,
    #[serde(deserialize_with = "optional_number")]
    pub revenue_multiple: Option<f64>,
    #[serde(deserialize_with = "optional_number")]
    pub profit_margin_pct: Option<f64>,
    #[serde(deserialize_with = "optional_number")]
    pub upfront_cash: Option<f64>,
    pub benchmark: Option<BenchmarkInput>,
}

/// Benchmark row as the client holds it (margin as a decimal).
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct BenchmarkInput {
    #[serde(deserialize_with = "optional_number")]
    pub price_to_sde_multiple: Option<f64>,
    #[serde(deserialize_with = "optional_number")]
    pub price_to_revenue_multiple: Option<f64>,
    #[serde(deserialize_with = "optional_number")]
    pub cashflow_margin_pct: Option<f64>,
    #[serde(deserialize_with = "optional_number")]
    pub median_sde: Option<f64>,
    #[serde(deserialize_with = "optional_number")]
    pub median_revenue: Option<f64>,
    #[serde(deserialize_with = "optional_number")]
    pub median_asking_price: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoringPrompt {
    pub industry: String,
    pub listing_host: Option<String>,
    pub asking_price: Option<f64>,
    pub revenue: Option<f64>,
    pub sde: Option<f64>,
    pub dscr: Option<f64>,
    pub cashflow_multiple: Option<f64>,
    pub revenue_multiple: Option<f64>,
    pub profit_margin_pct: Option<f64>,
    pub upfront_cash: Option<f64>,
    pub benchmark: Option<PromptBenchmark>,
    pub derived: PromptDerived,
}

/// Benchmark as sent to the model; margin converted to whole percent.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PromptBenchmark {
    pub price_to_sde_multiple: Option<f64>,
    pub price_to_revenue_multiple: Option<f64>,
    pub cashflow_margin_pct: Option<f64>,
    pub median_sde: Option<f64>,
    pub median_revenue: Option<f64>,
    pub median_asking_price: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PromptDerived {
    #[serde(rename = "cfMultiple_vs_benchmark_pct")]
    pub cf_multiple_vs_benchmark_pct: Option<i64>,
    #[serde(rename = "revMultiple_vs_benchmark_pct")]
    pub rev_multiple_vs_benchmark_pct: Option<i64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DealScore {
    pub score: i32,
    pub score_breakdown: Option<Value>,
    pub top_weaknesses: Vec<String>,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScoreParseError {
    Empty,
    InvalidJson,
}

impl ScoringRequest {
    /// Asking price and SDE are the minimum for a meaningful score.
    pub fn has_required_inputs(&self) -> bool {
        self.asking_price.is_some() && self.sde.is_some()
    }

    pub fn to_prompt(&self) -> ScoringPrompt {
        let bench_cf = self
            .benchmark
            .as_ref()
            .and_then(|b| b.price_to_sde_multiple);
        let bench_rev = self
            .benchmark
            .as_ref()
            .and_then(|b| b.price_to_revenue_multiple);

        let delta_pct = |value: Option<f64>, bench: Option<f64>| {
            pct_delta(value?, bench?).map(|delta| (delta * 100.0).round() as i64)
        };

        ScoringPrompt {
            industry: self
                .industry
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
            listing_host: safe_hostname(self.listing_url.as_deref()),
            asking_price: self.asking_price,
            revenue: self.revenue,
            sde: self.sde,
            dscr: self.dscr,
            cashflow_multiple: self.cashflow_multiple,
            revenue_multiple: self.revenue_multiple,
            profit_margin_pct: self.profit_margin_pct,
            upfront_cash: self.upfront_cash,
            benchmark: self.benchmark.as_ref().map(|b| PromptBenchmark {
                price_to_sde_multiple: b.price_to_sde_multiple,
                price_to_revenue_multiple: b.price_to_revenue_multiple,
                cashflow_margin_pct: b.cashflow_margin_pct.map(|dec| dec * 100.0),
                median_sde: b.median_sde,
                median_revenue: b.median_revenue,
                median_asking_price: b.median_asking_price,
            }),
            derived: PromptDerived {
                cf_multiple_vs_benchmark_pct: delta_pct(self.cashflow_multiple, bench_cf),
                rev_multiple_vs_benchmark_pct: delta_pct(self.revenue_multiple, bench_rev),
            },
        }
    }
}

fn pct_delta(a: f64, b: f64) -> Option<f64> {
    if !a.is_finite() || !b.is_finite() || b == 0.0 {
        return None;
    }
    Some((a - b) / b)
}

pub fn missing_inputs_score() -> DealScore {
    DealScore {
        score: 1,
        score_breakdown: None,
        top_weaknesses: vec![
            "Missing required inputs (Asking Price and/or SDE).".to_string(),
            "Add at least Asking Price + SDE to generate a real score.".to_string(),
            "Without SDE, debt coverage and valuation can't be assessed.".to_string(),
        ],
        summary: "Enter Asking Price and SDE to generate an underwriting score and top weaknesses."
            .to_string(),
    }
}

pub fn fallback_score(message: &str) -> DealScore {
    DealScore {
        score: 1,
        score_breakdown: None,
        top_weaknesses: vec![
            message.to_string(),
            "Try again in a moment, or refresh the page.".to_string(),
            "If this keeps happening, check the server logs for the AI summary endpoint."
                .to_string(),
        ],
        summary: message.to_string(),
    }
}

/// Normalizes the model's JSON: score clamped to 1..=10, at most five weaknesses.
pub fn parse_model_output(raw: &str) -> Result<DealScore, ScoreParseError> {
    if raw.trim().is_empty() {
        return Err(ScoreParseError::Empty);
    }

    let parsed: Value = serde_json::from_str(raw).map_err(|_| ScoreParseError::InvalidJson)?;

    let score = clamp_score(parsed.get("score"));

    let score_breakdown = parsed
        .get("scoreBreakdown")
        .filter(|value| value.is_object())
        .cloned();

    let top_weaknesses = match parsed.get("topWeaknesses").and_then(Value::as_array) {
        Some(items) => items
            .iter()
            .take(MAX_WEAKNESSES)
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        None => vec!["No weaknesses returned (AI output missing topWeaknesses).".to_string()],
    };

    let summary = parsed
        .get("summary")
        .map(|value| match value {
            Value::String(s) => s.trim().to_string(),
            Value::Null => String::new(),
            other => other.to_string(),
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "No summary returned by AI.".to_string());

    Ok(DealScore {
        score,
        score_breakdown,
        top_weaknesses,
        summary,
    })
}

fn clamp_score(value: Option<&Value>) -> i32 {
    let n = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
    .unwrap_or(1.0);

    (n.round() as i64).clamp(1, 10) as i32
}

fn optional_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) if !s.trim().is_empty() => {
            s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
        }
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_prompt_with_benchmark_deltas() {
        let request: ScoringRequest = serde_json::from_value(json!({
            "industry": "HVAC",
            "listingUrl": "bizbuysell.com/listing/1",
            "askingPrice": 1200000,
            "sde": "400000",
            "cashflowMultiple": 3.0,
            "revenueMultiple": 0.5,
            "benchmark": {
                "price_to_sde_multiple": 2.5,
                "price_to_revenue_multiple": 0.5,
                "cashflow_margin_pct": 0.18
            }
        }))
        .unwrap();

        assert!(request.has_required_inputs());

        let prompt = request.to_prompt();
        assert_eq!(prompt.listing_host.as_deref(), Some("bizbuysell.com"));
        assert_eq!(prompt.derived.cf_multiple_vs_benchmark_pct, Some(20));
        assert_eq!(prompt.derived.rev_multiple_vs_benchmark_pct, Some(0));

        let bench = prompt.benchmark.unwrap();
        assert!((bench.cashflow_margin_pct.unwrap() - 18.0).abs() < 1e-9);

        let json = serde_json::to_value(request.to_prompt()).unwrap();
        assert!(json["derived"].get("cfMultiple_vs_benchmark_pct").is_some());
        assert_eq!(json["listingHost"], "bizbuysell.com");
    }

    #[test]
    fn blank_numbers_are_missing() {
        let request: ScoringRequest =
            serde_json::from_value(json!({ "askingPrice": "", "sde": null })).unwrap();
        assert!(!request.has_required_inputs());
        assert_eq!(request.to_prompt().industry, "Unknown");
    }

    #[test]
    fn parses_and_clamps_model_output() {
        let raw = json!({
            "score": 14,
            "scoreBreakdown": { "debtService": 7 },
            "topWeaknesses": ["a", "b", "c", "d", "e", "f"],
            "summary": "  DSCR 1.4x  "
        })
        .to_string();

        let score = parse_model_output(&raw).unwrap();
        assert_eq!(score.score, 10);
        assert_eq!(score.top_weaknesses.len(), MAX_WEAKNESSES);
        assert_eq!(score.summary, "DSCR 1.4x");
        assert!(score.score_breakdown.is_some());
    }

    #[test]
    fn fills_defaults_for_sparse_output() {
        let score = parse_model_output(r#"{"score": "0"}"#).unwrap();
        assert_eq!(score.score, 1);
        assert_eq!(score.score_breakdown, None);
        assert_eq!(score.summary, "No summary returned by AI.");
        assert_eq!(score.top_weaknesses.len(), 1);
    }

    #[test]
    fn rejects_empty_and_invalid_output() {
        assert_eq!(parse_model_output("  "), Err(ScoreParseError::Empty));
        assert_eq!(parse_model_output("not json"), Err(ScoreParseError::InvalidJson));
    }
}
