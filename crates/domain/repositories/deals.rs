use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::deals::{DealEntity, InsertDealEntity};

#[automock]
#[async_trait]
pub trait DealRepository {
    async fn create(&self, insert_deal_entity: InsertDealEntity) -> Result<Uuid>;

    /// Newest first.
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<DealEntity>>;

    /// Deletes the deal only when owned by `user_id`. Returns rows deleted.
    async fn delete_owned(&self, user_id: &str, deal_id: Uuid) -> Result<usize>;
}
