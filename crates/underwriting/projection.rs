use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const DEFAULT_PROJECTION_YEARS: u32 = 5;
pub const MAX_PROJECTION_YEARS: u32 = 30;

/// Multi-year cash-flow assumptions. Numbers arrive from browser forms, so unparseable
/// values deserialize to NaN and absent ones to zero.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectionInput {
    #[serde(deserialize_with = "lenient_f64")]
    pub sde_year1: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub annual_debt: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub upfront_cash: f64,
    #[serde(deserialize_with = "lenient_opt_f64")]
    pub years: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub sde_growth_pct: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub capex_annual: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub tax_rate_pct: f64,
}

impl ProjectionInput {
    /// The figures that must be finite before a metered analysis runs.
    pub fn has_finite_core(&self) -> bool {
        self.sde_year1.is_finite() && self.annual_debt.is_finite() && self.upfront_cash.is_finite()
    }

    /// Replaces every non-finite figure with zero.
    pub fn sanitized(&self) -> Self {
        let fix = |v: f64| if v.is_finite() { v } else { 0.0 };
        Self {
            sde_year1: fix(self.sde_year1),
            annual_debt: fix(self.annual_debt),
            upfront_cash: fix(self.upfront_cash),
            years: self.years.filter(|v| v.is_finite()),
            sde_growth_pct: fix(self.sde_growth_pct),
            capex_annual: fix(self.capex_annual),
            tax_rate_pct: fix(self.tax_rate_pct),
        }
    }

    pub fn year_count(&self) -> u32 {
        match self.years {
            Some(years) if years.is_finite() => {
                (years.round() as i64).clamp(1, MAX_PROJECTION_YEARS as i64) as u32
            }
            _ => DEFAULT_PROJECTION_YEARS,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProjectionRow {
    pub year: u32,
    pub sde: f64,
    pub debt: f64,
    pub capex: f64,
    pub tax: f64,
    pub net: f64,
    pub cumulative: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionResult {
    pub rows: Vec<ProjectionRow>,
    pub break_even_year: Option<u32>,
    pub payback_years: Option<f64>,
}

pub fn project_years(input: &ProjectionInput) -> ProjectionResult {
    let growth = input.sde_growth_pct / 100.0;
    let tax_rate = input.tax_rate_pct / 100.0;
    let capex = input.capex_annual.max(0.0);

    let mut cumulative = 0.0;
    let rows: Vec<ProjectionRow> = (1..=input.year_count())
        .map(|year| {
            let sde = input.sde_year1 * (1.0 + growth).powi(year as i32 - 1);
            let pre_tax = sde - input.annual_debt - capex;
            let tax = pre_tax.max(0.0) * tax_rate;
            let net = pre_tax - tax;
            cumulative += net;

            ProjectionRow {
                year,
                sde,
                debt: input.annual_debt,
                capex,
                tax,
                net,
                cumulative,
            }
        })
        .collect();

    let break_even_year = rows.iter().find(|row| row.net > 0.0).map(|row| row.year);
    let payback_years = rows
        .first()
        .filter(|row| row.net > 0.0)
        .map(|row| input.upfront_cash / row.net);

    ProjectionResult {
        rows,
        break_even_year,
        payback_years,
    }
}

fn value_to_f64(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::String(s) if s.trim().is_empty() => 0.0,
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_f64(&value))
}

fn lenient_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => None,
        other => Some(value_to_f64(&other)),
    })
}
