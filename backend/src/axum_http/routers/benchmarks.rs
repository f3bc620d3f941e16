use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
};
use serde_json::json;
use underwrite_core::{
    domain::{
        repositories::{benchmarks::BenchmarkRepository, user_access::UserAccessRepository},
        value_objects::benchmarks::BenchmarkQuery,
    },
    infra::{
        benchmarks::csv_store::CsvBenchmarkStore,
        db::{
            postgres::postgres_connection::PgPoolSquad,
            repositories::user_access::UserAccessPostgres,
        },
    },
};

use crate::{
    auth::MaybeAuthUser,
    axum_http::error_responses::ApiError,
    usecases::benchmarks::BenchmarksUseCase,
};

pub fn routes(db_pool: Arc<PgPoolSquad>, data_dir: &str) -> Router {
    let benchmark_store = CsvBenchmarkStore::new(data_dir);
    let user_access_repository = UserAccessPostgres::new(Arc::clone(&db_pool));
    let usecase =
        BenchmarksUseCase::new(Arc::new(benchmark_store), Arc::new(user_access_repository));

    Router::new()
        .route("/benchmarks/years", get(years))
        .route("/benchmarks/:year", get(year))
        .with_state(Arc::new(usecase))
}

pub async fn years<B, U>(
    State(usecase): State<Arc<BenchmarksUseCase<B, U>>>,
) -> Result<impl IntoResponse, ApiError>
where
    B: BenchmarkRepository + Send + Sync + 'static,
    U: UserAccessRepository + Send + Sync + 'static,
{
    let years = usecase.years().await?;
    Ok(Json(json!({ "years": years })))
}

pub async fn year<B, U>(
    State(usecase): State<Arc<BenchmarksUseCase<B, U>>>,
    MaybeAuthUser(auth): MaybeAuthUser,
    Path(year): Path<i32>,
    Query(query): Query<BenchmarkQuery>,
) -> Result<impl IntoResponse, ApiError>
where
    B: BenchmarkRepository + Send + Sync + 'static,
    U: UserAccessRepository + Send + Sync + 'static,
{
    let response = usecase.year(auth.as_ref(), year, &query).await?;
    Ok(Json(response))
}
