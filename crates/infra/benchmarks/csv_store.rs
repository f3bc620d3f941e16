use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::{
    repositories::benchmarks::BenchmarkRepository, value_objects::benchmarks::BenchmarkRow,
};

static DATASET_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^industry_metrics_(\d{4})\.csv$").unwrap());

/// Yearly benchmark datasets stored as `industry_metrics_<year>.csv` in one directory.
pub struct CsvBenchmarkStore {
    data_dir: PathBuf,
}

impl CsvBenchmarkStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn dataset_path(&self, year: i32) -> PathBuf {
        self.data_dir.join(format!("industry_metrics_{year}.csv"))
    }
}

#[async_trait]
impl BenchmarkRepository for CsvBenchmarkStore {
    async fn list_years(&self) -> Result<Vec<i32>> {
        let mut entries = match tokio::fs::read_dir(&self.data_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(data_dir = %self.data_dir.display(), "benchmark data directory missing");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err.into()),
        };

        let mut years = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if let Some(year) = DATASET_FILE
                .captures(name)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<i32>().ok())
            {
                years.push(year);
            }
        }

        years.sort_unstable_by(|a, b| b.cmp(a));
        years.dedup();
        Ok(years)
    }

    async fn load_year(&self, year: i32) -> Result<Option<Vec<BenchmarkRow>>> {
        let path = self.dataset_path(year);

        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("read {}", path.display()));
            }
        };

        let rows =
            parse_benchmark_csv(&text).with_context(|| format!("parse {}", path_name(&path)))?;
        debug!(year, rows = rows.len(), "benchmark dataset loaded");

        Ok(Some(rows))
    }
}

fn path_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawBenchmarkRecord {
    industry: Option<String>,
    median_asking_price: Option<String>,
    median_sold_price: Option<String>,
    median_sde: Option<String>,
    price_to_sde_multiple: Option<String>,
    median_revenue: Option<String>,
    price_to_revenue_multiple: Option<String>,
    cashflow_margin_pct: Option<String>,
    listings_count: Option<String>,
    days_on_market: Option<String>,
    median_sba_loan: Option<String>,
    sba_default_rate_pct: Option<String>,
}

impl From<RawBenchmarkRecord> for BenchmarkRow {
    fn from(raw: RawBenchmarkRecord) -> Self {
        let cell = |value: &Option<String>| value.as_deref().and_then(parse_number);

        Self {
            industry: raw.industry.clone().unwrap_or_default().trim().to_string(),
            median_asking_price: cell(&raw.median_asking_price),
            median_sold_price: cell(&raw.median_sold_price),
            median_sde: cell(&raw.median_sde),
            price_to_sde_multiple: cell(&raw.price_to_sde_multiple),
            median_revenue: cell(&raw.median_revenue),
            price_to_revenue_multiple: cell(&raw.price_to_revenue_multiple),
            cashflow_margin_pct: cell(&raw.cashflow_margin_pct),
            listings_count: cell(&raw.listings_count),
            days_on_market: cell(&raw.days_on_market),
            median_sba_loan: cell(&raw.median_sba_loan),
            sba_default_rate_pct: cell(&raw.sba_default_rate_pct),
        }
    }
}

pub fn parse_benchmark_csv(text: &str) -> Result<Vec<BenchmarkRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.deserialize::<RawBenchmarkRecord>() {
        rows.push(BenchmarkRow::from(record?));
    }

    Ok(rows)
}

/// Tolerates `$`, `,`, `%` and whitespace. Dashes and blanks are missing values.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '%') && !c.is_whitespace())
        .collect();

    if cleaned.is_empty() || cleaned == "-" || cleaned == "\u{2014}" {
        return None;
    }

    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}
