use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::domain::value_objects::benchmarks::BenchmarkRow;

#[automock]
#[async_trait]
pub trait BenchmarkRepository {
    /// Years with a dataset present, newest first.
    async fn list_years(&self) -> Result<Vec<i32>>;

    /// `None` when no dataset exists for the year.
    async fn load_year(&self, year: i32) -> Result<Option<Vec<BenchmarkRow>>>;
}
