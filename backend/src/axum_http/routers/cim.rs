use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRequest, Multipart, Request, State},
    http::header::{CACHE_CONTROL, CONTENT_TYPE},
    response::IntoResponse,
    routing::post,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use underwrite_core::{
    domain::repositories::{
        feature_usage::FeatureUsageRepository, user_access::UserAccessRepository,
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{feature_usage::FeatureUsagePostgres, user_access::UserAccessPostgres},
    },
    llm::openai_client::{LlmGateway, OpenAiClient},
    underwriting::cim::{
        projection::ProjectionAssumptions,
        prompt::{MAX_CIM_CHARS, MemoMode, truncate_chars},
    },
};

use crate::{
    auth::AuthUser,
    axum_http::error_responses::ApiError,
    usecases::cim::CimUseCase,
};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CimTextBody {
    text: String,
    mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CimRatingBody {
    text: String,
    output: Option<String>,
    assumptions: ProjectionAssumptions,
}

pub fn routes(db_pool: Arc<PgPoolSquad>, llm: Option<Arc<OpenAiClient>>) -> Router {
    let user_access_repository = UserAccessPostgres::new(Arc::clone(&db_pool));
    let feature_usage_repository = FeatureUsagePostgres::new(Arc::clone(&db_pool));
    let usecase = CimUseCase::new(
        Arc::new(user_access_repository),
        Arc::new(feature_usage_repository),
        llm,
    );

    Router::new()
        .route("/cim", post(analyze))
        .route("/cim/rating", post(rating))
        .with_state(Arc::new(usecase))
}

/// Reads the CIM from a JSON body or an uploaded file. Uploads always run the deep memo.
async fn read_cim_input(request: Request) -> Result<(String, MemoMode), ApiError> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    if content_type.contains("application/json") {
        let Json(body) = Json::<CimTextBody>::from_request(request, &())
            .await
            .map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
        let mode = body
            .mode
            .as_deref()
            .map(MemoMode::parse)
            .unwrap_or_default();
        return Ok((body.text, mode));
    }

    if content_type.contains("multipart/form-data") {
        let mut multipart = Multipart::from_request(request, &())
            .await
            .map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|err| ApiError::bad_request(err.body_text()))?
        {
            if field.name() != Some("file") {
                continue;
            }
            let bytes = field
                .bytes()
                .await
                .map_err(|err| ApiError::bad_request(err.body_text()))?;
            let text = String::from_utf8_lossy(&bytes);
            let text = truncate_chars(&text, MAX_CIM_CHARS).to_string();
            if text.trim().is_empty() {
                return Err(ApiError::bad_request(
                    "Could not read text from file (empty/unsupported)",
                ));
            }
            return Ok((text, MemoMode::Deep));
        }

        return Err(ApiError::bad_request("Missing file"));
    }

    warn!(%content_type, "cim: unsupported content type");
    Err(ApiError::new(
        axum::http::StatusCode::UNSUPPORTED_MEDIA_TYPE,
        format!("Content-Type not supported: {content_type}"),
    ))
}

pub async fn analyze<U, F, L>(
    State(usecase): State<Arc<CimUseCase<U, F, L>>>,
    AuthUser { user_id, .. }: AuthUser,
    request: Request,
) -> Result<impl IntoResponse, ApiError>
where
    U: UserAccessRepository + Send + Sync + 'static,
    F: FeatureUsageRepository + Send + Sync + 'static,
    L: LlmGateway + Send + Sync + 'static,
{
    let (text, mode) = read_cim_input(request).await?;
    let memo = usecase.analyze(&user_id, &text, mode).await?;

    info!(%user_id, chars = memo.len(), "cim: memo delivered");
    Ok((
        [(CACHE_CONTROL, "no-store")],
        Json(json!({ "result": memo })),
    ))
}

pub async fn rating<U, F, L>(
    State(usecase): State<Arc<CimUseCase<U, F, L>>>,
    _auth: AuthUser,
    Json(body): Json<CimRatingBody>,
) -> Result<impl IntoResponse, ApiError>
where
    U: UserAccessRepository + Send + Sync + 'static,
    F: FeatureUsageRepository + Send + Sync + 'static,
    L: LlmGateway + Send + Sync + 'static,
{
    let report = usecase.rating(&body.text, body.output.as_deref(), &body.assumptions)?;
    Ok(Json(report))
}
