use serde::{Deserialize, Serialize};

use super::safe_div;

/// Equity share assumed for SBA 7(a) deals, in percent.
pub const SBA_EQUITY_PCT: f64 = 10.0;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum FinancingMode {
    #[default]
    #[serde(rename = "SBA", alias = "sba")]
    Sba,
    #[serde(rename = "Custom", alias = "custom")]
    Custom,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtraExpense {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DealInput {
    pub asking_price: Option<f64>,
    pub revenue: Option<f64>,
    pub sde: Option<f64>,
    pub financing_mode: FinancingMode,
    pub loan_term_years: f64,
    pub interest_rate_pct: f64,
    pub closing_costs: f64,
    pub include_closing_in_loan: bool,
    pub down_payment_pct: f64,
    pub extra_expenses: Vec<ExtraExpense>,
}

impl Default for DealInput {
    fn default() -> Self {
        Self {
            asking_price: None,
            revenue: None,
            sde: None,
            financing_mode: FinancingMode::Sba,
            loan_term_years: 10.0,
            interest_rate_pct: 10.0,
            closing_costs: 0.0,
            include_closing_in_loan: true,
            down_payment_pct: 10.0,
            extra_expenses: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DealComputation {
    pub sde_adjusted: Option<f64>,
    pub cf_multiple: Option<f64>,
    pub rev_multiple: Option<f64>,
    pub margin: Option<f64>,
    pub equity: f64,
    pub loan_amt: f64,
    pub monthly_pay: f64,
    pub annual_debt: f64,
    pub dscr: Option<f64>,
    pub total_acquisition_cost: f64,
    pub upfront_cash: f64,
    pub extra_expenses_total: f64,
}

/// Level monthly payment of a fully amortizing loan.
pub fn monthly_payment(principal: f64, annual_rate_pct: f64, term_years: f64) -> f64 {
    let r = annual_rate_pct / 100.0 / 12.0;
    let n = term_years * 12.0;

    if principal <= 0.0 || n <= 0.0 {
        return 0.0;
    }
    if r == 0.0 {
        return principal / n;
    }

    principal * (r / (1.0 - (1.0 + r).powf(-n)))
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

pub fn compute_deal(input: &DealInput) -> DealComputation {
    let extra: f64 = input
        .extra_expenses
        .iter()
        .map(|expense| finite_or_zero(expense.amount))
        .sum();

    let sde = input.sde.map(|sde| (sde - extra).max(0.0));

    let cf_multiple = safe_div(input.asking_price, sde);
    let rev_multiple = safe_div(input.asking_price, input.revenue);
    let margin = safe_div(sde, input.revenue);

    let closing = finite_or_zero(input.closing_costs);
    let asking = input.asking_price.map(finite_or_zero).unwrap_or(0.0);
    let base_cost = asking + if input.include_closing_in_loan { closing } else { 0.0 };

    let equity_pct = match input.financing_mode {
        FinancingMode::Sba => SBA_EQUITY_PCT,
        FinancingMode::Custom => input.down_payment_pct,
    } / 100.0;

    let equity = base_cost * equity_pct;
    let loan_amt = (base_cost - equity).max(0.0);

    let monthly_pay = monthly_payment(loan_amt, input.interest_rate_pct, input.loan_term_years);
    let annual_debt = monthly_pay * 12.0;

    let dscr = safe_div(sde, Some(annual_debt));

    DealComputation {
        sde_adjusted: sde,
        cf_multiple,
        rev_multiple,
        margin,
        equity,
        loan_amt,
        monthly_pay,
        annual_debt,
        dscr,
        total_acquisition_cost: base_cost,
        upfront_cash: if input.include_closing_in_loan {
            equity
        } else {
            equity + closing
        },
        extra_expenses_total: extra,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 0.01
    }

    #[test]
    fn monthly_payment_matches_annuity_formula() {
        // 900k over 10 years at 10%.
        assert!((monthly_payment(900_000.0, 10.0, 10.0) - 11_893.57).abs() < 0.5);
    }

    #[test]
    fn monthly_payment_edge_cases() {
        assert_eq!(monthly_payment(0.0, 10.0, 10.0), 0.0);
        assert_eq!(monthly_payment(100_000.0, 10.0, 0.0), 0.0);
        assert!(approx(monthly_payment(120_000.0, 0.0, 10.0), 1_000.0));
    }

    #[test]
    fn sba_mode_uses_ten_percent_equity() {
        let input = DealInput {
            asking_price: Some(1_000_000.0),
            revenue: Some(2_000_000.0),
            sde: Some(300_000.0),
            financing_mode: FinancingMode::Sba,
            down_payment_pct: 25.0,
            ..Default::default()
        };

        let out = compute_deal(&input);
        assert!(approx(out.equity, 100_000.0));
        assert!(approx(out.loan_amt, 900_000.0));
        assert!(approx(out.upfront_cash, 100_000.0));
        assert!(approx(out.cf_multiple.unwrap(), 3.333));
        assert!(approx(out.margin.unwrap(), 0.15));
        let annual_debt = monthly_payment(900_000.0, 10.0, 10.0) * 12.0;
        assert!(approx(out.annual_debt, annual_debt));
        assert!(approx(out.dscr.unwrap(), 300_000.0 / annual_debt));
    }

    #[test]
    fn extra_expenses_reduce_sde_and_closing_adds_to_upfront() {
        let input = DealInput {
            asking_price: Some(500_000.0),
            sde: Some(100_000.0),
            financing_mode: FinancingMode::Custom,
            down_payment_pct: 20.0,
            closing_costs: 15_000.0,
            include_closing_in_loan: false,
            extra_expenses: vec![
                ExtraExpense { label: "Manager".into(), amount: 60_000.0 },
                ExtraExpense { label: "Bad".into(), amount: f64::NAN },
            ],
            ..Default::default()
        };

        let out = compute_deal(&input);
        assert_eq!(out.sde_adjusted, Some(40_000.0));
        assert!(approx(out.extra_expenses_total, 60_000.0));
        assert!(approx(out.equity, 100_000.0));
        assert!(approx(out.upfront_cash, 115_000.0));
        assert_eq!(out.rev_multiple, None);
    }

    #[test]
    fn missing_sde_leaves_ratios_empty() {
        let out = compute_deal(&DealInput {
            asking_price: Some(400_000.0),
            ..Default::default()
        });
        assert_eq!(out.sde_adjusted, None);
        assert_eq!(out.dscr, None);
        assert_eq!(out.cf_multiple, None);
    }

    #[test]
    fn deserializes_camel_case_with_defaults() {
        let input: DealInput = serde_json::from_value(serde_json::json!({
            "askingPrice": 750000,
            "financingMode": "Custom",
            "downPaymentPct": 15
        }))
        .unwrap();

        assert_eq!(input.financing_mode, FinancingMode::Custom);
        assert_eq!(input.loan_term_years, 10.0);
        assert!(input.include_closing_in_loan);
    }
}
