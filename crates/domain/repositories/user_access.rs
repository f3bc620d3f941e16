use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::domain::entities::user_access::{BillingChangeset, UserAccessEntity};

#[automock]
#[async_trait]
pub trait UserAccessRepository {
    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<UserAccessEntity>>;

    /// Returns the stored row, inserting a free one when missing.
    async fn get_or_create(&self, user_id: &str) -> Result<UserAccessEntity>;

    /// Upserts the row and records the identity email. A `None` email keeps the stored one.
    async fn upsert_identity(
        &self,
        user_id: &str,
        email: Option<String>,
        email_verified: bool,
    ) -> Result<UserAccessEntity>;

    async fn find_by_stripe_customer_id(
        &self,
        stripe_customer_id: &str,
    ) -> Result<Option<UserAccessEntity>>;

    async fn set_stripe_customer_id(&self, user_id: &str, stripe_customer_id: &str)
    -> Result<()>;

    /// Applies a billing changeset, creating the row when it does not exist yet.
    async fn apply_billing_update(&self, user_id: &str, changeset: BillingChangeset)
    -> Result<()>;

    /// Applies a changeset to every row linked to the Stripe customer. Returns rows touched.
    async fn apply_billing_update_by_customer(
        &self,
        stripe_customer_id: &str,
        changeset: BillingChangeset,
    ) -> Result<usize>;
}
