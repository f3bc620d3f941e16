use std::cmp::Ordering;

use crate::domain::value_objects::benchmarks::{
    BenchmarkQuery, BenchmarkRow, BenchmarkSnapshots, BenchmarkSortKey, SortDirection,
};

/// Rows a free or signed-out visitor gets to see.
pub const FREE_PREVIEW_ROWS: usize = 3;

pub fn free_preview(rows: &[BenchmarkRow]) -> Vec<BenchmarkRow> {
    rows.iter().take(FREE_PREVIEW_ROWS).cloned().collect()
}

/// Search, minimum filters, sort and top-N. A missing sort value ranks below every number,
/// so it lands last when descending and first when ascending. Ties fall back to the
/// industry name.
pub fn apply_query(rows: &[BenchmarkRow], query: &BenchmarkQuery) -> Vec<BenchmarkRow> {
    let needle = query
        .search
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_default();

    let min_margin = query.min_margin_pct / 100.0;
    let at_least = |value: Option<f64>, min: f64| min <= 0.0 || value.unwrap_or(0.0) >= min;

    let mut out: Vec<BenchmarkRow> = rows
        .iter()
        .filter(|row| needle.is_empty() || row.industry.to_lowercase().contains(&needle))
        .filter(|row| at_least(row.listings_count, query.min_listings))
        .filter(|row| at_least(row.median_revenue, query.min_revenue))
        .filter(|row| at_least(row.median_sde, query.min_sde))
        .filter(|row| at_least(row.cashflow_margin_pct, min_margin))
        .cloned()
        .collect();

    let key = query.sort;
    out.sort_by(|a, b| compare_rows(a, b, key, query.dir));

    if query.top_n > 0 {
        out.truncate(query.top_n);
    }

    out
}

fn compare_rows(
    a: &BenchmarkRow,
    b: &BenchmarkRow,
    key: BenchmarkSortKey,
    dir: SortDirection,
) -> Ordering {
    let sort_value = |row: &BenchmarkRow| {
        key.value_of(row)
            .filter(|value| value.is_finite())
            .unwrap_or(f64::NEG_INFINITY)
    };
    let ord = sort_value(a)
        .partial_cmp(&sort_value(b))
        .unwrap_or(Ordering::Equal);
    let by_value = match dir {
        SortDirection::Asc => ord,
        SortDirection::Desc => ord.reverse(),
    };

    by_value.then_with(|| a.industry.cmp(&b.industry))
}

fn top_by(rows: &[BenchmarkRow], key: BenchmarkSortKey) -> Option<BenchmarkRow> {
    rows.iter()
        .filter_map(|row| key.value_of(row).map(|value| (value, row)))
        .fold(None, |best: Option<(f64, &BenchmarkRow)>, (value, row)| match best {
            Some((best_value, _)) if best_value >= value => best,
            _ => Some((value, row)),
        })
        .map(|(_, row)| row.clone())
}

pub fn snapshots(rows: &[BenchmarkRow]) -> BenchmarkSnapshots {
    BenchmarkSnapshots {
        top_revenue: top_by(rows, BenchmarkSortKey::MedianRevenue),
        top_sde: top_by(rows, BenchmarkSortKey::MedianSde),
        top_margin: top_by(rows, BenchmarkSortKey::CashflowMarginPct),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(
        industry: &str,
        revenue: Option<f64>,
        sde: Option<f64>,
        margin: Option<f64>,
    ) -> BenchmarkRow {
        BenchmarkRow {
            industry: industry.to_string(),
            median_revenue: revenue,
            median_sde: sde,
            cashflow_margin_pct: margin,
            listings_count: Some(10.0),
            ..Default::default()
        }
    }

    fn dataset() -> Vec<BenchmarkRow> {
        vec![
            row("Plumbing", Some(1_500_000.0), Some(300_000.0), Some(0.2)),
            row("Car Wash", None, Some(500_000.0), Some(0.35)),
            row("Bakery", Some(600_000.0), Some(90_000.0), Some(0.15)),
            row("Auto Repair", Some(1_500_000.0), Some(250_000.0), None),
        ]
    }

    fn names(rows: &[BenchmarkRow]) -> Vec<&str> {
        rows.iter().map(|r| r.industry.as_str()).collect()
    }

    #[test]
    fn default_sort_is_revenue_desc_missing_last_ties_by_name() {
        let out = apply_query(&dataset(), &BenchmarkQuery::default());
        assert_eq!(names(&out), vec!["Auto Repair", "Plumbing", "Bakery", "Car Wash"]);
    }

    #[test]
    fn ascending_puts_missing_first() {
        let query = BenchmarkQuery {
            dir: SortDirection::Asc,
            ..Default::default()
        };
        let out = apply_query(&dataset(), &query);
        assert_eq!(names(&out), vec!["Car Wash", "Bakery", "Auto Repair", "Plumbing"]);

        let query = BenchmarkQuery {
            dir: SortDirection::Asc,
            sort: BenchmarkSortKey::CashflowMarginPct,
            ..Default::default()
        };
        let out = apply_query(&dataset(), &query);
        assert_eq!(names(&out), vec!["Auto Repair", "Bakery", "Plumbing", "Car Wash"]);
    }

    #[test]
    fn search_filters_and_top_n() {
        let query = BenchmarkQuery {
            search: Some("  AR ".to_string()),
            ..Default::default()
        };
        assert_eq!(names(&apply_query(&dataset(), &query)), vec!["Car Wash"]);

        let query = BenchmarkQuery {
            min_margin_pct: 18.0,
            top_n: 1,
            sort: BenchmarkSortKey::MedianSde,
            ..Default::default()
        };
        assert_eq!(names(&apply_query(&dataset(), &query)), vec!["Car Wash"]);
    }

    #[test]
    fn snapshots_pick_first_maximum() {
        let snaps = snapshots(&dataset());
        assert_eq!(snaps.top_revenue.unwrap().industry, "Plumbing");
        assert_eq!(snaps.top_sde.unwrap().industry, "Car Wash");
        assert_eq!(snaps.top_margin.unwrap().industry, "Car Wash");
    }

    #[test]
    fn preview_is_three_rows() {
        assert_eq!(free_preview(&dataset()).len(), FREE_PREVIEW_ROWS);
    }
}
