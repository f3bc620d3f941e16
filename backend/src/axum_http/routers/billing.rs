use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use underwrite_core::{
    domain::{
        repositories::user_access::UserAccessRepository, value_objects::enums::plans::Plan,
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad, repositories::user_access::UserAccessPostgres,
    },
    payments::stripe_client::{StripeClient, StripeGateway},
};

use crate::{
    auth::{AuthUser, MaybeAuthUser},
    axum_http::error_responses::ApiError,
    usecases::billing::{BillingSettings, BillingUseCase, CancelOutcome},
};

const STRIPE_SIGNATURE: &str = "stripe-signature";

#[derive(Debug, Default, Deserialize)]
pub struct CheckoutQuery {
    plan: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SyncBody {
    session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    ok: bool,
    downgraded: bool,
    #[serde(flatten)]
    outcome: CancelOutcome,
}

pub fn routes(
    db_pool: Arc<PgPoolSquad>,
    stripe: Arc<StripeClient>,
    settings: BillingSettings,
) -> Router {
    let user_access_repository = UserAccessPostgres::new(Arc::clone(&db_pool));
    let usecase = BillingUseCase::new(Arc::new(user_access_repository), stripe, settings);

    Router::new()
        .route("/stripe/checkout", get(checkout))
        .route("/stripe/portal", post(portal))
        .route("/stripe/cancel", post(cancel))
        .route("/stripe/sync", post(sync))
        .route("/stripe/webhook", post(webhook))
        .route(
            "/billing-portal",
            get(billing_portal_redirect).post(billing_portal_json),
        )
        .with_state(Arc::new(usecase))
}

pub async fn checkout<U, S>(
    State(usecase): State<Arc<BillingUseCase<U, S>>>,
    MaybeAuthUser(auth): MaybeAuthUser,
    Query(query): Query<CheckoutQuery>,
) -> Result<Response, ApiError>
where
    U: UserAccessRepository + Send + Sync + 'static,
    S: StripeGateway + Send + Sync + 'static,
{
    let Some(auth) = auth else {
        return Ok(Redirect::to("/login?redirect_url=/pricing").into_response());
    };

    let plan = match query.plan.as_deref() {
        Some("pro") => Plan::Pro,
        Some("pro_plus") => Plan::ProPlus,
        _ => return Ok(Redirect::to("/pricing").into_response()),
    };

    let url = usecase.checkout(&auth, plan).await?;
    Ok(Redirect::to(&url).into_response())
}

pub async fn portal<U, S>(
    State(usecase): State<Arc<BillingUseCase<U, S>>>,
    AuthUser { user_id, .. }: AuthUser,
) -> Result<impl IntoResponse, ApiError>
where
    U: UserAccessRepository + Send + Sync + 'static,
    S: StripeGateway + Send + Sync + 'static,
{
    let url = usecase.portal(&user_id).await?;
    Ok(Json(json!({ "url": url })))
}

pub async fn billing_portal_redirect<U, S>(
    State(usecase): State<Arc<BillingUseCase<U, S>>>,
    MaybeAuthUser(auth): MaybeAuthUser,
) -> Result<Redirect, ApiError>
where
    U: UserAccessRepository + Send + Sync + 'static,
    S: StripeGateway + Send + Sync + 'static,
{
    let Some(auth) = auth else {
        return Ok(Redirect::to("/login"));
    };

    Ok(match usecase.billing_portal(&auth.user_id).await? {
        Some(url) => Redirect::to(&url),
        None => Redirect::to("/pricing"),
    })
}

pub async fn billing_portal_json<U, S>(
    State(usecase): State<Arc<BillingUseCase<U, S>>>,
    AuthUser { user_id, .. }: AuthUser,
) -> Result<Response, ApiError>
where
    U: UserAccessRepository + Send + Sync + 'static,
    S: StripeGateway + Send + Sync + 'static,
{
    let response = match usecase.billing_portal(&user_id).await? {
        Some(url) => Json(json!({ "ok": true, "url": url })).into_response(),
        None => (
            StatusCode::FORBIDDEN,
            Json(json!({ "ok": false, "error": "NO_SUBSCRIPTION", "redirectTo": "/pricing" })),
        )
            .into_response(),
    };
    Ok(response)
}

pub async fn cancel<U, S>(
    State(usecase): State<Arc<BillingUseCase<U, S>>>,
    AuthUser { user_id, .. }: AuthUser,
) -> Result<impl IntoResponse, ApiError>
where
    U: UserAccessRepository + Send + Sync + 'static,
    S: StripeGateway + Send + Sync + 'static,
{
    let outcome = usecase.cancel(&user_id).await?;
    Ok(Json(CancelResponse {
        ok: true,
        downgraded: true,
        outcome,
    }))
}

pub async fn sync<U, S>(
    State(usecase): State<Arc<BillingUseCase<U, S>>>,
    AuthUser { user_id, .. }: AuthUser,
    Json(body): Json<SyncBody>,
) -> Result<impl IntoResponse, ApiError>
where
    U: UserAccessRepository + Send + Sync + 'static,
    S: StripeGateway + Send + Sync + 'static,
{
    let session_id = body
        .session_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing session_id"))?;

    usecase.sync(&user_id, &session_id).await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn webhook<U, S>(
    State(usecase): State<Arc<BillingUseCase<U, S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError>
where
    U: UserAccessRepository + Send + Sync + 'static,
    S: StripeGateway + Send + Sync + 'static,
{
    let signature = headers
        .get(STRIPE_SIGNATURE)
        .and_then(|value| value.to_str().ok());

    usecase.handle_webhook(&body, signature).await?;
    info!(bytes = body.len(), "billing: webhook processed");
    Ok(Json(json!({ "received": true })))
}
