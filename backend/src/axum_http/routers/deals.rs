use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, post},
};
use serde_json::{Value, json};
use underwrite_core::{
    domain::repositories::{deals::DealRepository, user_access::UserAccessRepository},
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{deals::DealPostgres, user_access::UserAccessPostgres},
    },
};
use uuid::Uuid;

use crate::{auth::AuthUser, axum_http::error_responses::ApiError, usecases::deals::DealsUseCase};

pub fn routes(db_pool: Arc<PgPoolSquad>) -> Router {
    let deal_repository = DealPostgres::new(Arc::clone(&db_pool));
    let user_access_repository = UserAccessPostgres::new(Arc::clone(&db_pool));
    let usecase = DealsUseCase::new(Arc::new(deal_repository), Arc::new(user_access_repository));

    Router::new()
        .route("/deals", post(save_deal).get(list_deals))
        .route("/deals/:id", delete(delete_deal))
        .with_state(Arc::new(usecase))
}

pub async fn save_deal<D, U>(
    State(usecase): State<Arc<DealsUseCase<D, U>>>,
    AuthUser { user_id, .. }: AuthUser,
    Json(payload): Json<Value>,
) -> Result<impl IntoResponse, ApiError>
where
    D: DealRepository + Send + Sync + 'static,
    U: UserAccessRepository + Send + Sync + 'static,
{
    let id = usecase.save(&user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

pub async fn list_deals<D, U>(
    State(usecase): State<Arc<DealsUseCase<D, U>>>,
    AuthUser { user_id, .. }: AuthUser,
) -> Result<impl IntoResponse, ApiError>
where
    D: DealRepository + Send + Sync + 'static,
    U: UserAccessRepository + Send + Sync + 'static,
{
    let deals = usecase.list(&user_id).await?;
    Ok(Json(json!({ "deals": deals })))
}

pub async fn delete_deal<D, U>(
    State(usecase): State<Arc<DealsUseCase<D, U>>>,
    AuthUser { user_id, .. }: AuthUser,
    Path(deal_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError>
where
    D: DealRepository + Send + Sync + 'static,
    U: UserAccessRepository + Send + Sync + 'static,
{
    usecase.delete(&user_id, deal_id).await?;
    Ok(Json(json!({ "ok": true })))
}
