use std::sync::Arc;

use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use serde_json::json;
use tracing::info;
use underwrite_core::{
    domain::repositories::{
        feature_usage::FeatureUsageRepository, user_access::UserAccessRepository,
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{feature_usage::FeatureUsagePostgres, user_access::UserAccessPostgres},
    },
};

use crate::{
    auth::{AuthUser, MaybeAuthUser},
    axum_http::error_responses::ApiError,
    usecases::access::AccessUseCase,
};

pub fn routes(db_pool: Arc<PgPoolSquad>) -> Router {
    let user_access_repository = UserAccessPostgres::new(Arc::clone(&db_pool));
    let feature_usage_repository = FeatureUsagePostgres::new(Arc::clone(&db_pool));
    let usecase = AccessUseCase::new(
        Arc::new(user_access_repository),
        Arc::new(feature_usage_repository),
    );

    Router::new()
        .route("/access", get(access))
        .route("/me/access", get(me_access))
        .route("/me/usage", get(me_usage))
        .route("/debug/whoami", get(whoami))
        .with_state(Arc::new(usecase))
}

pub async fn access<U, F>(
    State(usecase): State<Arc<AccessUseCase<U, F>>>,
    AuthUser { user_id, .. }: AuthUser,
) -> Result<impl IntoResponse, ApiError>
where
    U: UserAccessRepository + Send + Sync + 'static,
    F: FeatureUsageRepository + Send + Sync + 'static,
{
    let dto = usecase.get_access(&user_id).await?;
    Ok(Json(dto))
}

pub async fn me_access<U, F>(
    State(usecase): State<Arc<AccessUseCase<U, F>>>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError>
where
    U: UserAccessRepository + Send + Sync + 'static,
    F: FeatureUsageRepository + Send + Sync + 'static,
{
    let dto = usecase.me_access(&auth).await?;
    Ok(Json(dto))
}

pub async fn me_usage<U, F>(
    State(usecase): State<Arc<AccessUseCase<U, F>>>,
    MaybeAuthUser(auth): MaybeAuthUser,
) -> Result<impl IntoResponse, ApiError>
where
    U: UserAccessRepository + Send + Sync + 'static,
    F: FeatureUsageRepository + Send + Sync + 'static,
{
    let meter = usecase.deal_usage(auth.as_ref()).await?;
    Ok(Json(meter))
}

pub async fn whoami(MaybeAuthUser(auth): MaybeAuthUser) -> impl IntoResponse {
    let user_id = auth.map(|auth| auth.user_id);
    info!(signed_in = user_id.is_some(), "access: whoami");
    Json(json!({ "userId": user_id }))
}
