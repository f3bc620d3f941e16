use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use mockall::automock;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use sha2::Sha256;
use tracing::error;

type HmacSha256 = Hmac<Sha256>;

const STRIPE_API: &str = "https://api.stripe.com/v1";

/// Seconds a signed webhook stays valid.
pub const WEBHOOK_TOLERANCE_SECS: i64 = 300;

#[automock]
#[async_trait]
pub trait StripeGateway {
    async fn create_customer(&self, email: Option<String>, user_id: &str) -> Result<String>;

    async fn find_customer_by_email(&self, email: &str) -> Result<Option<String>>;

    /// Returns the hosted checkout URL.
    async fn create_subscription_checkout(
        &self,
        request: SubscriptionCheckoutRequest,
    ) -> Result<String>;

    async fn retrieve_checkout_session(&self, session_id: &str) -> Result<StripeCheckoutSession>;

    /// Retrieves the subscription with `items.data.price` expanded.
    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<StripeSubscription>;

    async fn list_customer_subscriptions(
        &self,
        customer_id: &str,
        limit: u32,
    ) -> Result<Vec<StripeSubscription>>;

    /// Cancels immediately (not at period end).
    async fn cancel_subscription_now(&self, subscription_id: &str) -> Result<()>;

    /// Returns the portal URL.
    async fn create_billing_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<String>;

    fn verify_webhook_signature(&self, payload: &[u8], signature_header: &str)
    -> Result<StripeEvent>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionCheckoutRequest {
    pub customer_id: String,
    pub price_id: String,
    pub user_id: String,
    pub trial_days: Option<u32>,
}

/// Minimal Stripe client built on reqwest.
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    webhook_secret: String,
    success_url: String,
    cancel_url: String,
}

#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub type_: String,
    pub created: Option<i64>,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

/// A reference that Stripe returns either as a bare id or as an expanded object.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Expandable {
    Id(String),
    Object { id: String },
}

impl Expandable {
    pub fn id(&self) -> &str {
        match self {
            Expandable::Id(id) => id,
            Expandable::Object { id } => id,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: Option<String>,
    pub mode: Option<String>,
    pub url: Option<String>,
    pub subscription: Option<Expandable>,
    pub customer: Option<Expandable>,
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorDetails,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetails {
    #[serde(rename = "type")]
    type_: Option<String>,
    code: Option<String>,
    message: Option<String>,
    param: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub customer: Option<Expandable>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    pub trial_start: Option<i64>,
    pub trial_end: Option<i64>,
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub items: StripeSubscriptionItems,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StripeSubscriptionItems {
    pub data: Vec<StripeSubscriptionItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StripeSubscriptionItem {
    pub current_period_end: Option<i64>,
    pub price: Option<StripePrice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePrice {
    pub id: String,
}

impl StripeSubscription {
    pub fn price_id(&self) -> Option<&str> {
        self.items
            .data
            .first()
            .and_then(|item| item.price.as_ref())
            .map(|price| price.id.as_str())
    }

    /// Newer API versions move the period end onto the first item.
    pub fn period_end(&self) -> Option<i64> {
        self.current_period_end.or_else(|| {
            self.items
                .data
                .first()
                .and_then(|item| item.current_period_end)
        })
    }

    pub fn customer_id(&self) -> Option<&str> {
        self.customer.as_ref().map(Expandable::id)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StripeInvoice {
    pub customer: Option<Expandable>,
    pub subscription: Option<Expandable>,
    pub parent: Option<StripeInvoiceParent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StripeInvoiceParent {
    pub subscription_details: Option<StripeInvoiceSubscriptionDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StripeInvoiceSubscriptionDetails {
    pub subscription: Option<Expandable>,
}

impl StripeInvoice {
    pub fn customer_id(&self) -> Option<&str> {
        self.customer.as_ref().map(Expandable::id)
    }

    /// Older payloads carry `subscription` at the top level, newer ones under `parent`.
    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription
            .as_ref()
            .or_else(|| {
                self.parent
                    .as_ref()
                    .and_then(|parent| parent.subscription_details.as_ref())
                    .and_then(|details| details.subscription.as_ref())
            })
            .map(Expandable::id)
    }
}

#[derive(Debug, Deserialize)]
struct StripeList<T> {
    data: Vec<T>,
}

#[derive(Deserialize)]
struct IdResp {
    id: String,
}

#[derive(Deserialize)]
struct UrlResp {
    url: Option<String>,
}

impl StripeClient {
    pub fn new(
        secret_key: String,
        webhook_secret: String,
        success_url: String,
        cancel_url: String,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key,
            webhook_secret,
            success_url,
            cancel_url,
        }
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.secret_key)
    }

    async fn ensure_success(
        resp: reqwest::Response,
        context: &str,
    ) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let request_id = resp
            .headers()
            .get("request-id")
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let body = match resp.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => "<empty response body>".to_string(),
            Err(err) => format!("<failed to read response body: {err}>"),
        };

        let details = serde_json::from_str::<StripeErrorEnvelope>(&body)
            .ok()
            .map(|envelope| envelope.error);

        error!(
            status = %status,
            stripe_request_id = ?request_id,
            stripe_error_type = ?details.as_ref().and_then(|d| d.type_.as_deref()),
            stripe_error_code = ?details.as_ref().and_then(|d| d.code.as_deref()),
            stripe_error_param = ?details.as_ref().and_then(|d| d.param.as_deref()),
            context = %context,
            "stripe api request failed"
        );

        let message = details
            .and_then(|d| d.message)
            .unwrap_or_else(|| format!("status {status}"));

        anyhow::bail!("Stripe {context} failed: {message}");
    }

    async fn post_form(
        &self,
        path: &str,
        body: &[(String, String)],
        context: &str,
    ) -> Result<reqwest::Response> {
        let resp = self
            .http
            .post(format!("{STRIPE_API}/{path}"))
            .header(AUTHORIZATION, self.bearer())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(body)
            .send()
            .await?;
        Self::ensure_success(resp, context).await
    }

    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, String)],
        context: &str,
    ) -> Result<reqwest::Response> {
        let resp = self
            .http
            .get(format!("{STRIPE_API}/{path}"))
            .header(AUTHORIZATION, self.bearer())
            .query(query)
            .send()
            .await?;
        Self::ensure_success(resp, context).await
    }
}

fn pair(key: &str, value: impl Into<String>) -> (String, String) {
    (key.to_string(), value.into())
}

#[async_trait]
impl StripeGateway for StripeClient {
    async fn create_customer(&self, email: Option<String>, user_id: &str) -> Result<String> {
        let mut body = vec![pair("metadata[userId]", user_id)];
        if let Some(email) = email {
            body.push(pair("email", email));
        }

        let resp = self.post_form("customers", &body, "create customer").await?;
        let parsed: IdResp = resp.json().await?;
        Ok(parsed.id)
    }

    async fn find_customer_by_email(&self, email: &str) -> Result<Option<String>> {
        let resp = self
            .get_json(
                "customers",
                &[("email", email.to_string()), ("limit", "1".to_string())],
                "list customers",
            )
            .await?;

        let parsed: StripeList<IdResp> = resp.json().await?;
        Ok(parsed.data.into_iter().next().map(|customer| customer.id))
    }

    async fn create_subscription_checkout(
        &self,
        request: SubscriptionCheckoutRequest,
    ) -> Result<String> {
        let mut body = vec![
            pair("mode", "subscription"),
            pair("customer", request.customer_id),
            pair("line_items[0][price]", request.price_id),
            pair("line_items[0][quantity]", "1"),
            pair("payment_method_collection", "always"),
            pair("subscription_data[metadata][userId]", request.user_id.clone()),
            pair("metadata[userId]", request.user_id),
            pair("success_url", self.success_url.clone()),
            pair("cancel_url", self.cancel_url.clone()),
        ];

        if let Some(days) = request.trial_days.filter(|days| *days > 0) {
            body.push(pair("subscription_data[trial_period_days]", days.to_string()));
        }

        let resp = self
            .post_form("checkout/sessions", &body, "create checkout session")
            .await?;

        let parsed: UrlResp = resp.json().await?;
        parsed
            .url
            .ok_or_else(|| anyhow::anyhow!("Stripe Checkout session URL is missing"))
    }

    async fn retrieve_checkout_session(&self, session_id: &str) -> Result<StripeCheckoutSession> {
        let resp = self
            .get_json(
                &format!("checkout/sessions/{session_id}"),
                &[],
                "retrieve checkout session",
            )
            .await?;

        Ok(resp.json().await?)
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<StripeSubscription> {
        let resp = self
            .get_json(
                &format!("subscriptions/{subscription_id}"),
                &[("expand[]", "items.data.price".to_string())],
                "retrieve subscription",
            )
            .await?;

        Ok(resp.json().await?)
    }

    async fn list_customer_subscriptions(
        &self,
        customer_id: &str,
        limit: u32,
    ) -> Result<Vec<StripeSubscription>> {
        let resp = self
            .get_json(
                "subscriptions",
                &[
                    ("customer", customer_id.to_string()),
                    ("status", "all".to_string()),
                    ("limit", limit.to_string()),
                ],
                "list subscriptions",
            )
            .await?;

        let parsed: StripeList<StripeSubscription> = resp.json().await?;
        Ok(parsed.data)
    }

    async fn cancel_subscription_now(&self, subscription_id: &str) -> Result<()> {
        let resp = self
            .http
            .delete(format!("{STRIPE_API}/subscriptions/{subscription_id}"))
            .header(AUTHORIZATION, self.bearer())
            .send()
            .await?;
        Self::ensure_success(resp, "cancel subscription").await?;

        Ok(())
    }

    async fn create_billing_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<String> {
        let body = vec![pair("customer", customer_id), pair("return_url", return_url)];

        let resp = self
            .post_form("billing_portal/sessions", &body, "create billing portal session")
            .await?;

        let parsed: UrlResp = resp.json().await?;
        parsed
            .url
            .ok_or_else(|| anyhow::anyhow!("Stripe billing portal URL is missing"))
    }

    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<StripeEvent> {
        verify_webhook_payload(
            &self.webhook_secret,
            payload,
            signature_header,
            Utc::now().timestamp(),
        )
    }
}

/// Checks a `Stripe-Signature` header (`t=<ts>,v1=<hex>[,v1=..]`) and parses the event.
/// https://stripe.com/docs/webhooks/signatures
pub fn verify_webhook_payload(
    webhook_secret: &str,
    payload: &[u8],
    signature_header: &str,
    now_ts: i64,
) -> Result<StripeEvent> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<Vec<u8>> = Vec::new();

    for part in signature_header.split(',') {
        let part = part.trim();
        if let Some(rest) = part.strip_prefix("t=") {
            timestamp = rest.parse::<i64>().ok();
        } else if let Some(rest) = part.strip_prefix("v1=") {
            if let Ok(bytes) = hex::decode(rest) {
                signatures.push(bytes);
            }
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| anyhow::anyhow!("missing timestamp in stripe-signature"))?;
    if signatures.is_empty() {
        anyhow::bail!("missing v1 in stripe-signature");
    }
    if now_ts.abs_diff(timestamp) > WEBHOOK_TOLERANCE_SECS.unsigned_abs() {
        anyhow::bail!("stripe-signature timestamp outside tolerance");
    }

    let mut mac = HmacSha256::new_from_slice(webhook_secret.as_bytes())?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    let matched = signatures
        .iter()
        .any(|signature| mac.clone().verify_slice(signature).is_ok());
    if !matched {
        anyhow::bail!("invalid webhook signature");
    }

    let event: StripeEvent = serde_json::from_slice(payload)?;
    Ok(event)
}
