use std::sync::Arc;

use axum::{Json, Router, extract::State, response::IntoResponse, routing::post};
use serde::Serialize;
use underwrite_core::{
    domain::repositories::{
        feature_usage::FeatureUsageRepository, user_access::UserAccessRepository,
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{feature_usage::FeatureUsagePostgres, user_access::UserAccessPostgres},
    },
    llm::openai_client::{LlmGateway, OpenAiClient},
    underwriting::{
        deal_score::ScoringRequest,
        financing::DealInput,
        projection::{ProjectionInput, ProjectionResult},
    },
};

use crate::{
    auth::AuthUser, axum_http::error_responses::ApiError,
    usecases::deal_calculator::DealCalculatorUseCase,
};

#[derive(Debug, Serialize)]
pub struct ProjectionResponse {
    ok: bool,
    #[serde(flatten)]
    result: ProjectionResult,
}

impl From<ProjectionResult> for ProjectionResponse {
    fn from(result: ProjectionResult) -> Self {
        Self { ok: true, result }
    }
}

pub fn routes(db_pool: Arc<PgPoolSquad>, llm: Option<Arc<OpenAiClient>>) -> Router {
    let user_access_repository = UserAccessPostgres::new(Arc::clone(&db_pool));
    let feature_usage_repository = FeatureUsagePostgres::new(Arc::clone(&db_pool));
    let usecase = DealCalculatorUseCase::new(
        Arc::new(user_access_repository),
        Arc::new(feature_usage_repository),
        llm,
    );

    Router::new()
        .route("/deal-calculator/compute", post(compute))
        .route("/deal-calculator/analyze", post(analyze))
        .route("/deal-calculator/projection", post(projection))
        .route("/deal-calculator/ai-summary", post(ai_summary))
        .with_state(Arc::new(usecase))
}

pub async fn compute<U, F, L>(
    State(usecase): State<Arc<DealCalculatorUseCase<U, F, L>>>,
    _auth: AuthUser,
    Json(input): Json<DealInput>,
) -> impl IntoResponse
where
    U: UserAccessRepository + Send + Sync + 'static,
    F: FeatureUsageRepository + Send + Sync + 'static,
    L: LlmGateway + Send + Sync + 'static,
{
    Json(usecase.compute(&input))
}

pub async fn analyze<U, F, L>(
    State(usecase): State<Arc<DealCalculatorUseCase<U, F, L>>>,
    AuthUser { user_id, .. }: AuthUser,
    Json(input): Json<ProjectionInput>,
) -> Result<impl IntoResponse, ApiError>
where
    U: UserAccessRepository + Send + Sync + 'static,
    F: FeatureUsageRepository + Send + Sync + 'static,
    L: LlmGateway + Send + Sync + 'static,
{
    let result = usecase.analyze(&user_id, &input).await?;
    Ok(Json(ProjectionResponse::from(result)))
}

pub async fn projection<U, F, L>(
    State(usecase): State<Arc<DealCalculatorUseCase<U, F, L>>>,
    AuthUser { user_id, .. }: AuthUser,
    Json(input): Json<ProjectionInput>,
) -> Result<impl IntoResponse, ApiError>
where
    U: UserAccessRepository + Send + Sync + 'static,
    F: FeatureUsageRepository + Send + Sync + 'static,
    L: LlmGateway + Send + Sync + 'static,
{
    let result = usecase.projection(&user_id, &input).await?;
    Ok(Json(ProjectionResponse::from(result)))
}

/// Always answers with a renderable score; the status tells the client whether it is real.
pub async fn ai_summary<U, F, L>(
    State(usecase): State<Arc<DealCalculatorUseCase<U, F, L>>>,
    AuthUser { user_id, .. }: AuthUser,
    Json(request): Json<ScoringRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    U: UserAccessRepository + Send + Sync + 'static,
    F: FeatureUsageRepository + Send + Sync + 'static,
    L: LlmGateway + Send + Sync + 'static,
{
    let summary = usecase.ai_summary(&user_id, &request).await?;
    Ok((summary.status_code(), Json(summary.into_score())))
}
