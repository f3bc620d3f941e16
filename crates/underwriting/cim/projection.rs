use serde::{Deserialize, Serialize};

use crate::underwriting::{clamp, financing::monthly_payment};

const PROJECTION_YEARS: u32 = 5;
/// SDE proxy when a CIM states revenue but no earnings.
const FALLBACK_SDE_MARGIN: f64 = 0.12;

/// Buyer assumptions for the CIM projection. Percent fields are whole percents.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectionAssumptions {
    pub growth_pct: f64,
    /// Share of the price financed, as a decimal.
    pub debt_pct: f64,
    pub interest_pct: f64,
    pub term_years: f64,
    pub margin_ramp_pct: f64,
    pub capex_pct: f64,
}

impl Default for ProjectionAssumptions {
    fn default() -> Self {
        Self {
            growth_pct: 6.0,
            debt_pct: 0.85,
            interest_pct: 10.5,
            term_years: 10.0,
            margin_ramp_pct: 0.0,
            capex_pct: 1.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CimProjectionRow {
    pub year: u32,
    pub revenue: Option<f64>,
    /// `None` when neither SDE nor revenue is known.
    pub sde: Option<f64>,
    pub debt_service: f64,
    pub dscr: Option<f64>,
    pub cash_to_equity: Option<f64>,
    pub cum_cash_to_equity: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CimProjection {
    pub equity_invested: f64,
    pub break_even_year: Option<u32>,
    pub rows: Vec<CimProjectionRow>,
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}

/// Five-year levered cash flow for an acquisition at `price`.
pub fn build_projection(
    price: f64,
    revenue0: Option<f64>,
    sde0: Option<f64>,
    assumptions: &ProjectionAssumptions,
) -> CimProjection {
    let growth = finite_or(assumptions.growth_pct, 0.0).max(-20.0) / 100.0;
    let debt_pct = clamp(finite_or(assumptions.debt_pct, 0.0), 0.0, 0.95);
    let interest_pct = finite_or(assumptions.interest_pct, 0.0).max(0.0);
    let term_years = finite_or(assumptions.term_years, 1.0).max(1.0);
    let ramp = clamp(finite_or(assumptions.margin_ramp_pct, 0.0) / 100.0, -0.2, 0.2);
    let capex_pct = clamp(finite_or(assumptions.capex_pct, 0.0) / 100.0, 0.0, 0.25);

    let debt = price * debt_pct;
    let equity = (price - debt).max(0.0);
    let debt_service = monthly_payment(debt, interest_pct, term_years) * 12.0;

    let revenue0 = revenue0.filter(|v| v.is_finite() && *v > 0.0);
    let sde0 = sde0.filter(|v| v.is_finite() && *v > 0.0);

    let mut rows = Vec::with_capacity(PROJECTION_YEARS as usize);
    let mut cumulative = 0.0;
    let mut break_even_year = None;

    for year in 1..=PROJECTION_YEARS {
        let exponent = (year - 1) as i32;
        let growth_factor = (1.0 + growth).powi(exponent);

        let revenue = revenue0.map(|rev| rev * growth_factor);
        let base_sde = match (sde0, revenue) {
            (Some(sde), _) => Some(sde * growth_factor),
            (None, Some(rev)) => Some(rev * FALLBACK_SDE_MARGIN),
            (None, None) => None,
        };
        let sde = base_sde.map(|sde| sde * (1.0 + ramp).powi(exponent));
        let capex = revenue.map(|rev| rev * capex_pct).unwrap_or(0.0);

        let cash_to_equity = sde.map(|sde| (sde - debt_service - capex).max(0.0));
        let dscr = sde.filter(|_| debt_service > 0.0).map(|sde| sde / debt_service);

        let cum_cash_to_equity = cash_to_equity.map(|cash| {
            cumulative += cash;
            if break_even_year.is_none() && equity > 0.0 && cumulative >= equity {
                break_even_year = Some(year);
            }
            cumulative
        });

        rows.push(CimProjectionRow {
            year,
            revenue,
            sde,
            debt_service,
            dscr,
            cash_to_equity,
            cum_cash_to_equity,
        });
    }

    CimProjection {
        equity_invested: equity,
        break_even_year,
        rows,
    }
}
