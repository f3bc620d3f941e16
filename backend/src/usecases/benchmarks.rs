use std::sync::Arc;

use axum::http::StatusCode;
use chrono::Utc;
use thiserror::Error;
use tracing::{error, info};
use underwrite_core::{
    domain::{
        repositories::{benchmarks::BenchmarkRepository, user_access::UserAccessRepository},
        value_objects::{
            benchmarks::{BenchmarkQuery, BenchmarkResponse},
            entitlements::get_entitlements,
        },
    },
    underwriting::benchmarks::{apply_query, free_preview, snapshots},
};

use crate::{
    auth::AuthUser, axum_http::error_responses::UseCaseError, usecases::access::effective_plan,
};

#[derive(Debug, Error)]
pub enum BenchmarkError {
    #[error("No benchmark data for {0}")]
    YearNotFound(i32),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl UseCaseError for BenchmarkError {
    fn status_code(&self) -> StatusCode {
        match self {
            BenchmarkError::YearNotFound(_) => StatusCode::NOT_FOUND,
            BenchmarkError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, BenchmarkError>;

pub struct BenchmarksUseCase<B, U>
where
    B: BenchmarkRepository + Send + Sync + 'static,
    U: UserAccessRepository + Send + Sync + 'static,
{
    benchmark_repo: Arc<B>,
    user_access_repo: Arc<U>,
}

impl<B, U> BenchmarksUseCase<B, U>
where
    B: BenchmarkRepository + Send + Sync + 'static,
    U: UserAccessRepository + Send + Sync + 'static,
{
    pub fn new(benchmark_repo: Arc<B>, user_access_repo: Arc<U>) -> Self {
        Self {
            benchmark_repo,
            user_access_repo,
        }
    }

    pub async fn years(&self) -> UseCaseResult<Vec<i32>> {
        self.benchmark_repo.list_years().await.map_err(|err| {
            error!(error = ?err, "benchmarks: failed to list years");
            BenchmarkError::Internal(err)
        })
    }

    async fn is_subscribed(&self, user: Option<&AuthUser>) -> UseCaseResult<bool> {
        let Some(user) = user else {
            return Ok(false);
        };
        let access = self
            .user_access_repo
            .find_by_user_id(&user.user_id)
            .await
            .map_err(|err| {
                error!(
                    user_id = %user.user_id,
                    db_error = ?err,
                    "benchmarks: failed to load access row"
                );
                BenchmarkError::Internal(err)
            })?;

        Ok(access.is_some_and(|access| {
            get_entitlements(effective_plan(&access, Utc::now()), access.is_admin).is_subscribed()
        }))
    }

    /// Subscribers get the full, queryable dataset. Everyone else gets a fixed preview.
    pub async fn year(
        &self,
        user: Option<&AuthUser>,
        year: i32,
        query: &BenchmarkQuery,
    ) -> UseCaseResult<BenchmarkResponse> {
        let rows = self
            .benchmark_repo
            .load_year(year)
            .await
            .map_err(|err| {
                error!(year, error = ?err, "benchmarks: failed to load dataset");
                BenchmarkError::Internal(err)
            })?
            .ok_or(BenchmarkError::YearNotFound(year))?;

        let total_rows = rows.len();

        if !self.is_subscribed(user).await? {
            return Ok(BenchmarkResponse {
                year,
                limited: true,
                total_rows,
                rows: free_preview(&rows),
                snapshots: None,
            });
        }

        let filtered = apply_query(&rows, query);
        info!(year, total_rows, returned = filtered.len(), "benchmarks: dataset queried");

        Ok(BenchmarkResponse {
            year,
            limited: false,
            total_rows,
            rows: filtered,
            snapshots: Some(snapshots(&rows)),
        })
    }
}
