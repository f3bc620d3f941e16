//! Maps Stripe subscription state onto the local access record.

use chrono::{DateTime, TimeZone, Utc};
use underwrite_core::{
    domain::{
        entities::user_access::BillingChangeset,
        value_objects::enums::{plans::Plan, subscription_statuses::SubscriptionStatus},
    },
    payments::stripe_client::StripeSubscription,
};

/// Configured Stripe price ids for the paid tiers.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceBook {
    pub pro: String,
    pub pro_plus: String,
}

impl PriceBook {
    pub fn plan_for_price(&self, price_id: Option<&str>) -> Plan {
        match price_id {
            Some(price_id) if price_id == self.pro => Plan::Pro,
            Some(price_id) if price_id == self.pro_plus => Plan::ProPlus,
            _ => Plan::Free,
        }
    }

    pub fn price_for_plan(&self, plan: Plan) -> Option<&str> {
        match plan {
            Plan::Pro => Some(&self.pro),
            Plan::ProPlus => Some(&self.pro_plus),
            Plan::Free => None,
        }
    }
}

fn is_terminal(status: &str) -> bool {
    matches!(status, "canceled" | "unpaid" | "incomplete_expired")
}

/// Access drops to free as soon as a cancellation is scheduled.
pub fn effective_plan(subscription: &StripeSubscription, prices: &PriceBook) -> Plan {
    if subscription.cancel_at_period_end || is_terminal(&subscription.status) {
        return Plan::Free;
    }
    prices.plan_for_price(subscription.price_id())
}

pub fn effective_status(subscription: &StripeSubscription) -> SubscriptionStatus {
    if subscription.cancel_at_period_end {
        return SubscriptionStatus::Canceled;
    }
    status_from_stripe(&subscription.status)
}

pub fn status_from_stripe(status: &str) -> SubscriptionStatus {
    match status {
        "trialing" => SubscriptionStatus::Trialing,
        "active" => SubscriptionStatus::Active,
        "past_due" => SubscriptionStatus::PastDue,
        s if is_terminal(s) => SubscriptionStatus::Canceled,
        _ => SubscriptionStatus::None,
    }
}

pub fn has_trial(subscription: &StripeSubscription) -> bool {
    if subscription.status == "trialing" {
        return true;
    }
    matches!(
        (subscription.trial_start, subscription.trial_end),
        (Some(start), Some(end)) if end > start
    )
}

pub fn from_unix(ts: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(ts, 0).single()
}

/// Full refresh from a subscription. Granting a trial burns it for good.
pub fn subscription_changeset(
    subscription: &StripeSubscription,
    prices: &PriceBook,
    now: DateTime<Utc>,
) -> BillingChangeset {
    let plan = effective_plan(subscription, prices);
    let trial = has_trial(subscription);

    let trial_started_at = subscription.trial_start.filter(|_| trial).and_then(from_unix);
    let trial_ends_at = subscription.trial_end.filter(|_| trial).and_then(from_unix);
    let current_period_end = match plan {
        Plan::Free => None,
        _ => subscription.period_end().and_then(from_unix),
    };

    BillingChangeset {
        plan: Some(plan.to_string()),
        subscription_status: Some(effective_status(subscription).to_string()),
        has_used_trial: trial.then_some(true),
        trial_started_at: Some(trial_started_at),
        trial_ends_at: Some(trial_ends_at),
        current_period_end: Some(current_period_end),
        stripe_subscription_id: Some(Some(subscription.id.clone())),
        stripe_price_id: Some(subscription.price_id().map(str::to_string)),
        updated_at: Some(now),
        ..Default::default()
    }
}

/// Refresh after a paid invoice: plan, status and references only.
pub fn invoice_paid_changeset(
    subscription: &StripeSubscription,
    prices: &PriceBook,
    now: DateTime<Utc>,
) -> BillingChangeset {
    BillingChangeset {
        plan: Some(effective_plan(subscription, prices).to_string()),
        subscription_status: Some(effective_status(subscription).to_string()),
        has_used_trial: Some(true),
        stripe_subscription_id: Some(Some(subscription.id.clone())),
        stripe_price_id: Some(subscription.price_id().map(str::to_string)),
        updated_at: Some(now),
        ..Default::default()
    }
}

/// Subscription removed on Stripe's side. The trial flag is left alone.
pub fn subscription_deleted_changeset(now: DateTime<Utc>) -> BillingChangeset {
    BillingChangeset {
        has_used_trial: None,
        ..BillingChangeset::downgraded(now)
    }
}

pub fn past_due_changeset(now: DateTime<Utc>) -> BillingChangeset {
    BillingChangeset {
        subscription_status: Some(SubscriptionStatus::PastDue.to_string()),
        updated_at: Some(now),
        ..Default::default()
    }
}

/// Post-checkout sync. Any price other than Pro+ is treated as Pro.
pub fn checkout_sync_changeset(
    customer_id: &str,
    subscription: &StripeSubscription,
    prices: &PriceBook,
    now: DateTime<Utc>,
) -> BillingChangeset {
    let plan = if subscription.price_id() == Some(prices.pro_plus.as_str()) {
        Plan::ProPlus
    } else {
        Plan::Pro
    };

    BillingChangeset {
        plan: Some(plan.to_string()),
        subscription_status: Some(status_from_stripe(&subscription.status).to_string()),
        current_period_end: Some(subscription.period_end().and_then(from_unix)),
        stripe_customer_id: Some(Some(customer_id.to_string())),
        stripe_subscription_id: Some(Some(subscription.id.clone())),
        stripe_price_id: Some(subscription.price_id().map(str::to_string)),
        updated_at: Some(now),
        ..Default::default()
    }
}
