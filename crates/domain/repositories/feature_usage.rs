use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use mockall::automock;

use crate::domain::value_objects::enums::features::Feature;

#[automock]
#[async_trait]
pub trait FeatureUsageRepository {
    async fn count_for_day(&self, user_id: &str, feature: Feature, day: NaiveDate) -> Result<i32>;

    /// Atomically bumps the counter and returns the new value.
    async fn increment(&self, user_id: &str, feature: Feature, day: NaiveDate) -> Result<i32>;
}
