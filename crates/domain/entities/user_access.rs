use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::{
    domain::value_objects::enums::{plans::Plan, subscription_statuses::SubscriptionStatus},
    infra::db::postgres::schema::user_access,
};

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = user_access, primary_key(user_id))]
pub struct UserAccessEntity {
    pub user_id: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub plan: String,
    pub is_admin: bool,
    pub subscription_status: String,
    pub has_used_trial: bool,
    pub trial_started_at: Option<DateTime<Utc>>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub stripe_price_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAccessEntity {
    pub fn plan(&self) -> Plan {
        Plan::parse(&self.plan)
    }

    pub fn status(&self) -> SubscriptionStatus {
        SubscriptionStatus::parse(&self.subscription_status)
    }

    /// Fresh free row, used for tests and for signed-in users without a stored record.
    pub fn free(user_id: &str) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.to_string(),
            email: None,
            email_verified: false,
            plan: Plan::Free.to_string(),
            is_admin: false,
            subscription_status: SubscriptionStatus::None.to_string(),
            has_used_trial: false,
            trial_started_at: None,
            trial_ends_at: None,
            current_period_end: None,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            stripe_price_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = user_access)]
pub struct InsertUserAccessEntity {
    pub user_id: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub plan: String,
    pub subscription_status: String,
}

impl InsertUserAccessEntity {
    pub fn free(user_id: &str, email: Option<String>, email_verified: bool) -> Self {
        Self {
            user_id: user_id.to_string(),
            email,
            email_verified,
            plan: Plan::Free.to_string(),
            subscription_status: SubscriptionStatus::None.to_string(),
        }
    }
}

/// Partial write applied by billing flows. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq, AsChangeset)]
#[diesel(table_name = user_access)]
pub struct BillingChangeset {
    pub plan: Option<String>,
    pub subscription_status: Option<String>,
    pub has_used_trial: Option<bool>,
    pub trial_started_at: Option<Option<DateTime<Utc>>>,
    pub trial_ends_at: Option<Option<DateTime<Utc>>>,
    pub current_period_end: Option<Option<DateTime<Utc>>>,
    pub stripe_customer_id: Option<Option<String>>,
    pub stripe_subscription_id: Option<Option<String>>,
    pub stripe_price_id: Option<Option<String>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl BillingChangeset {
    /// Downgrade to free after a cancellation. Subscription references are cleared and the
    /// trial stays burned.
    pub fn downgraded(now: DateTime<Utc>) -> Self {
        Self {
            plan: Some(Plan::Free.to_string()),
            subscription_status: Some(SubscriptionStatus::Canceled.to_string()),
            has_used_trial: Some(true),
            trial_started_at: Some(None),
            trial_ends_at: Some(None),
            current_period_end: Some(None),
            stripe_subscription_id: Some(None),
            stripe_price_id: Some(None),
            updated_at: Some(now),
            ..Default::default()
        }
    }
}
