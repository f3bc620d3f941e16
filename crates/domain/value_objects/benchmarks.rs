use serde::{Deserialize, Serialize};

/// One industry line of a yearly benchmark dataset. Percent columns are decimals
/// (0.12 means 12%).
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct BenchmarkRow {
    pub industry: String,
    pub median_asking_price: Option<f64>,
    pub median_sold_price: Option<f64>,
    pub median_sde: Option<f64>,
    pub price_to_sde_multiple: Option<f64>,
    pub median_revenue: Option<f64>,
    pub price_to_revenue_multiple: Option<f64>,
    pub cashflow_margin_pct: Option<f64>,
    pub listings_count: Option<f64>,
    pub days_on_market: Option<f64>,
    pub median_sba_loan: Option<f64>,
    pub sba_default_rate_pct: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkSortKey {
    #[default]
    MedianRevenue,
    MedianSde,
    CashflowMarginPct,
    MedianSoldPrice,
    MedianAskingPrice,
    PriceToSdeMultiple,
    PriceToRevenueMultiple,
    DaysOnMarket,
    ListingsCount,
    MedianSbaLoan,
    SbaDefaultRatePct,
}

impl BenchmarkSortKey {
    pub fn value_of(&self, row: &BenchmarkRow) -> Option<f64> {
        let value = match self {
            BenchmarkSortKey::MedianRevenue => row.median_revenue,
            BenchmarkSortKey::MedianSde => row.median_sde,
            BenchmarkSortKey::CashflowMarginPct => row.cashflow_margin_pct,
            BenchmarkSortKey::MedianSoldPrice => row.median_sold_price,
            BenchmarkSortKey::MedianAskingPrice => row.median_asking_price,
            BenchmarkSortKey::PriceToSdeMultiple => row.price_to_sde_multiple,
            BenchmarkSortKey::PriceToRevenueMultiple => row.price_to_revenue_multiple,
            BenchmarkSortKey::DaysOnMarket => row.days_on_market,
            BenchmarkSortKey::ListingsCount => row.listings_count,
            BenchmarkSortKey::MedianSbaLoan => row.median_sba_loan,
            BenchmarkSortKey::SbaDefaultRatePct => row.sba_default_rate_pct,
        };
        value.filter(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Desc,
    Asc,
}

/// Query string accepted by the benchmark endpoint. Ignored for free callers.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct BenchmarkQuery {
    pub search: Option<String>,
    pub sort: BenchmarkSortKey,
    pub dir: SortDirection,
    pub top_n: usize,
    pub min_listings: f64,
    pub min_revenue: f64,
    pub min_sde: f64,
    /// Whole percent (10 means 10%).
    pub min_margin_pct: f64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkSnapshots {
    pub top_revenue: Option<BenchmarkRow>,
    pub top_sde: Option<BenchmarkRow>,
    pub top_margin: Option<BenchmarkRow>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkResponse {
    pub year: i32,
    pub limited: bool,
    pub total_rows: usize,
    pub rows: Vec<BenchmarkRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshots: Option<BenchmarkSnapshots>,
}
