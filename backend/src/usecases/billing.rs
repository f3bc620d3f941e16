use std::sync::Arc;

use axum::http::StatusCode;
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use underwrite_core::{
    domain::{
        entities::user_access::BillingChangeset,
        repositories::user_access::UserAccessRepository,
        value_objects::enums::plans::Plan,
    },
    payments::stripe_client::{
        StripeCheckoutSession, StripeEvent, StripeGateway, StripeInvoice, StripeSubscription,
        SubscriptionCheckoutRequest,
    },
};

use crate::{
    auth::AuthUser,
    axum_http::error_responses::UseCaseError,
    usecases::billing_state::{
        PriceBook, checkout_sync_changeset, invoice_paid_changeset, past_due_changeset,
        subscription_changeset, subscription_deleted_changeset,
    },
};

/// Subscription statuses that still hold a live Stripe subscription.
const CANCELLABLE_STATUSES: [&str; 4] = ["active", "trialing", "past_due", "unpaid"];

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Missing stripe-signature")]
    MissingSignature,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("UserAccess missing")]
    NoAccessRecord,
    #[error("No subscription on session")]
    NoSubscription,
    #[error("Checkout session has no customer")]
    NoCustomer,
    #[error("Unsupported plan: {0}")]
    UnsupportedPlan(Plan),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl UseCaseError for BillingError {
    fn status_code(&self) -> StatusCode {
        match self {
            BillingError::MissingSignature
            | BillingError::InvalidSignature
            | BillingError::NoAccessRecord
            | BillingError::NoSubscription
            | BillingError::NoCustomer
            | BillingError::UnsupportedPlan(_) => StatusCode::BAD_REQUEST,
            BillingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, BillingError>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOutcome {
    pub cancelled_in_stripe: bool,
    pub attempted_sub_id: Option<String>,
    pub stripe_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BillingSettings {
    pub prices: PriceBook,
    pub trial_days: u32,
    pub app_url: String,
}

pub struct BillingUseCase<U, S>
where
    U: UserAccessRepository + Send + Sync + 'static,
    S: StripeGateway + Send + Sync + 'static,
{
    user_access_repo: Arc<U>,
    stripe: Arc<S>,
    settings: BillingSettings,
}

impl<U, S> BillingUseCase<U, S>
where
    U: UserAccessRepository + Send + Sync + 'static,
    S: StripeGateway + Send + Sync + 'static,
{
    pub fn new(user_access_repo: Arc<U>, stripe: Arc<S>, settings: BillingSettings) -> Self {
        Self {
            user_access_repo,
            stripe,
            settings,
        }
    }

    /// Opens a subscription checkout and returns its hosted URL.
    pub async fn checkout(&self, user: &AuthUser, plan: Plan) -> UseCaseResult<String> {
        let price_id = self
            .settings
            .prices
            .price_for_plan(plan)
            .ok_or(BillingError::UnsupportedPlan(plan))?
            .to_string();

        let access = self
            .user_access_repo
            .upsert_identity(&user.user_id, user.email.clone(), user.email_verified)
            .await?;

        let customer_id = match access.stripe_customer_id.clone() {
            Some(customer_id) => customer_id,
            None => {
                let customer_id = self
                    .stripe
                    .create_customer(user.email.clone(), &user.user_id)
                    .await?;
                self.user_access_repo
                    .set_stripe_customer_id(&user.user_id, &customer_id)
                    .await?;
                customer_id
            }
        };

        let trial_days = (!access.has_used_trial && self.settings.trial_days > 0)
            .then_some(self.settings.trial_days);

        info!(
            user_id = %user.user_id,
            %plan,
            trial_days = trial_days.unwrap_or(0),
            "billing: creating checkout session"
        );

        let url = self
            .stripe
            .create_subscription_checkout(SubscriptionCheckoutRequest {
                customer_id,
                price_id,
                user_id: user.user_id.clone(),
                trial_days,
            })
            .await?;

        Ok(url)
    }

    /// Customer portal session. Reuses a customer with the same email before creating one.
    pub async fn portal(&self, user_id: &str) -> UseCaseResult<String> {
        let access = self
            .user_access_repo
            .find_by_user_id(user_id)
            .await?
            .ok_or(BillingError::NoAccessRecord)?;

        let customer_id = match access.stripe_customer_id {
            Some(customer_id) => customer_id,
            None => {
                let existing = match access.email.as_deref() {
                    Some(email) => self.stripe.find_customer_by_email(email).await?,
                    None => None,
                };
                let customer_id = match existing {
                    Some(customer_id) => customer_id,
                    None => {
                        self.stripe
                            .create_customer(access.email.clone(), user_id)
                            .await?
                    }
                };
                self.user_access_repo
                    .set_stripe_customer_id(user_id, &customer_id)
                    .await?;
                customer_id
            }
        };

        let return_url = format!("{}/account", self.settings.app_url);
        Ok(self
            .stripe
            .create_billing_portal_session(&customer_id, &return_url)
            .await?)
    }

    /// Portal URL for users that already have a Stripe customer, `None` otherwise.
    pub async fn billing_portal(&self, user_id: &str) -> UseCaseResult<Option<String>> {
        let customer_id = self
            .user_access_repo
            .find_by_user_id(user_id)
            .await?
            .and_then(|access| access.stripe_customer_id);

        let Some(customer_id) = customer_id else {
            return Ok(None);
        };

        let return_url = format!("{}/billing", self.settings.app_url);
        let url = self
            .stripe
            .create_billing_portal_session(&customer_id, &return_url)
            .await?;
        Ok(Some(url))
    }

    /// Cancels on Stripe when possible, then downgrades the local row unconditionally.
    pub async fn cancel(&self, user_id: &str) -> UseCaseResult<CancelOutcome> {
        let access = self.user_access_repo.find_by_user_id(user_id).await?;

        let mut outcome = CancelOutcome {
            cancelled_in_stripe: false,
            attempted_sub_id: access
                .as_ref()
                .and_then(|access| access.stripe_subscription_id.clone()),
            stripe_error: None,
        };

        if let Some(customer_id) = access
            .as_ref()
            .and_then(|access| access.stripe_customer_id.as_deref())
        {
            self.cancel_in_stripe(customer_id, &mut outcome).await;
        }

        self.user_access_repo
            .apply_billing_update(user_id, BillingChangeset::downgraded(Utc::now()))
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "billing: failed to downgrade access");
                BillingError::Internal(err)
            })?;

        info!(
            %user_id,
            cancelled_in_stripe = outcome.cancelled_in_stripe,
            attempted_sub_id = ?outcome.attempted_sub_id,
            "billing: subscription cancelled"
        );
        Ok(outcome)
    }

    async fn cancel_in_stripe(&self, customer_id: &str, outcome: &mut CancelOutcome) {
        if let Some(subscription_id) = outcome.attempted_sub_id.clone() {
            match self.stripe.cancel_subscription_now(&subscription_id).await {
                Ok(()) => {
                    outcome.cancelled_in_stripe = true;
                    return;
                }
                Err(err) => {
                    warn!(
                        %subscription_id,
                        error = %err,
                        "billing: stored subscription cancel failed"
                    );
                    outcome.stripe_error = Some(err.to_string());
                }
            }
        }

        let subscriptions = match self
            .stripe
            .list_customer_subscriptions(customer_id, 10)
            .await
        {
            Ok(subscriptions) => subscriptions,
            Err(err) => {
                outcome.stripe_error = Some(err.to_string());
                return;
            }
        };

        let Some(live) = subscriptions
            .into_iter()
            .find(|sub| CANCELLABLE_STATUSES.contains(&sub.status.as_str()))
        else {
            return;
        };

        outcome.attempted_sub_id = Some(live.id.clone());
        match self.stripe.cancel_subscription_now(&live.id).await {
            Ok(()) => {
                outcome.cancelled_in_stripe = true;
                outcome.stripe_error = None;
            }
            Err(err) => outcome.stripe_error = Some(err.to_string()),
        }
    }

    /// Pulls the result of a finished checkout without waiting for the webhook.
    pub async fn sync(&self, user_id: &str, session_id: &str) -> UseCaseResult<()> {
        let session = self.stripe.retrieve_checkout_session(session_id).await?;

        let subscription_id = session
            .subscription
            .as_ref()
            .map(|sub| sub.id().to_string())
            .ok_or(BillingError::NoSubscription)?;
        let customer_id = session
            .customer
            .as_ref()
            .map(|customer| customer.id().to_string())
            .ok_or(BillingError::NoCustomer)?;

        let subscription = self.stripe.retrieve_subscription(&subscription_id).await?;
        let changeset = checkout_sync_changeset(
            &customer_id,
            &subscription,
            &self.settings.prices,
            Utc::now(),
        );

        self.user_access_repo
            .apply_billing_update(user_id, changeset)
            .await?;
        info!(%user_id, %subscription_id, "billing: checkout synced");
        Ok(())
    }

    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> UseCaseResult<()> {
        let signature = signature.ok_or(BillingError::MissingSignature)?;
        let event = self
            .stripe
            .verify_webhook_signature(payload, signature)
            .map_err(|err| {
                warn!(error = %err, "billing: webhook signature rejected");
                BillingError::InvalidSignature
            })?;

        info!(event_type = %event.type_, event_id = ?event.id, "billing: webhook received");

        self.dispatch(event).await.map_err(|err| {
            error!(error = ?err, "billing: webhook handler failed");
            BillingError::Internal(err)
        })
    }

    async fn dispatch(&self, event: StripeEvent) -> anyhow::Result<()> {
        let object = event.data.object;
        let now = Utc::now();

        match event.type_.as_str() {
            "checkout.session.completed" => {
                let session: StripeCheckoutSession = serde_json::from_value(object)?;
                let (Some(customer), Some(subscription)) = (session.customer, session.subscription)
                else {
                    return Ok(());
                };
                let subscription = self.stripe.retrieve_subscription(subscription.id()).await?;
                self.upsert_from_subscription(customer.id(), &subscription)
                    .await?;
            }
            "customer.subscription.created" | "customer.subscription.updated" => {
                let event_subscription: StripeSubscription = serde_json::from_value(object)?;
                let subscription = self
                    .stripe
                    .retrieve_subscription(&event_subscription.id)
                    .await?;
                let customer_id = subscription
                    .customer_id()
                    .or(event_subscription.customer_id())
                    .map(str::to_string);
                if let Some(customer_id) = customer_id {
                    self.upsert_from_subscription(&customer_id, &subscription)
                        .await?;
                }
            }
            "customer.subscription.deleted" => {
                let subscription: StripeSubscription = serde_json::from_value(object)?;
                if let Some(customer_id) = subscription.customer_id() {
                    let touched = self
                        .user_access_repo
                        .apply_billing_update_by_customer(
                            customer_id,
                            subscription_deleted_changeset(now),
                        )
                        .await?;
                    info!(%customer_id, touched, "billing: subscription deleted");
                }
            }
            "invoice.payment_succeeded" => {
                let invoice: StripeInvoice = serde_json::from_value(object)?;
                let (Some(customer_id), Some(subscription_id)) =
                    (invoice.customer_id(), invoice.subscription_id())
                else {
                    return Ok(());
                };
                let Some(access) = self
                    .user_access_repo
                    .find_by_stripe_customer_id(customer_id)
                    .await?
                else {
                    warn!(%customer_id, "billing: invoice for unknown customer");
                    return Ok(());
                };
                let subscription = self.stripe.retrieve_subscription(subscription_id).await?;
                self.user_access_repo
                    .apply_billing_update(
                        &access.user_id,
                        invoice_paid_changeset(&subscription, &self.settings.prices, now),
                    )
                    .await?;
            }
            "invoice.payment_failed" => {
                let invoice: StripeInvoice = serde_json::from_value(object)?;
                if let Some(customer_id) = invoice.customer_id() {
                    self.user_access_repo
                        .apply_billing_update_by_customer(customer_id, past_due_changeset(now))
                        .await?;
                }
            }
            other => info!(event_type = %other, "billing: webhook event ignored"),
        }

        Ok(())
    }

    async fn upsert_from_subscription(
        &self,
        customer_id: &str,
        subscription: &StripeSubscription,
    ) -> anyhow::Result<()> {
        let Some(access) = self
            .user_access_repo
            .find_by_stripe_customer_id(customer_id)
            .await?
        else {
            warn!(%customer_id, "billing: subscription for unknown customer");
            return Ok(());
        };

        let changeset = subscription_changeset(subscription, &self.settings.prices, Utc::now());
        info!(
            user_id = %access.user_id,
            subscription_id = %subscription.id,
            plan = ?changeset.plan,
            status = ?changeset.subscription_status,
            "billing: access updated from subscription"
        );
        self.user_access_repo
            .apply_billing_update(&access.user_id, changeset)
            .await
    }
}
