use std::sync::Arc;

use axum::http::StatusCode;
use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, warn};
use underwrite_core::{
    domain::{
        repositories::{feature_usage::FeatureUsageRepository, user_access::UserAccessRepository},
        value_objects::{
            entitlements::{get_entitlements, usage_day},
            enums::features::Feature,
        },
    },
    llm::openai_client::LlmGateway,
    underwriting::cim::{
        CimReport, build_report,
        projection::ProjectionAssumptions,
        prompt::{MemoMode, build_memo_prompt},
        sections::strip_rating_json,
    },
};

use crate::{
    axum_http::error_responses::UseCaseError,
    usecases::access::{effective_plan, feature_limit},
};

#[derive(Debug, Error)]
pub enum CimError {
    #[error("Upgrade required to use the CIM analyzer")]
    NotEntitled,
    #[error("Missing CIM text")]
    EmptyText,
    #[error("Daily limit reached ({0}/day).")]
    DailyLimit(i32),
    #[error("OPENAI_API_KEY is not configured")]
    NotConfigured,
    #[error("The AI provider failed to produce a memo. Please try again.")]
    Upstream(#[source] anyhow::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl UseCaseError for CimError {
    fn status_code(&self) -> StatusCode {
        match self {
            CimError::NotEntitled => StatusCode::FORBIDDEN,
            CimError::EmptyText => StatusCode::BAD_REQUEST,
            CimError::DailyLimit(_) => StatusCode::TOO_MANY_REQUESTS,
            CimError::NotConfigured | CimError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CimError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn code(&self) -> Option<&'static str> {
        match self {
            CimError::DailyLimit(_) => Some("DAILY_LIMIT"),
            _ => None,
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, CimError>;

pub struct CimUseCase<U, F, L>
where
    U: UserAccessRepository + Send + Sync + 'static,
    F: FeatureUsageRepository + Send + Sync + 'static,
    L: LlmGateway + Send + Sync + 'static,
{
    user_access_repo: Arc<U>,
    feature_usage_repo: Arc<F>,
    llm: Option<Arc<L>>,
}

impl<U, F, L> CimUseCase<U, F, L>
where
    U: UserAccessRepository + Send + Sync + 'static,
    F: FeatureUsageRepository + Send + Sync + 'static,
    L: LlmGateway + Send + Sync + 'static,
{
    pub fn new(user_access_repo: Arc<U>, feature_usage_repo: Arc<F>, llm: Option<Arc<L>>) -> Self {
        Self {
            user_access_repo,
            feature_usage_repo,
            llm,
        }
    }

    /// Writes the underwriting memo for a CIM. Usage is only counted for a delivered memo.
    pub async fn analyze(
        &self,
        user_id: &str,
        text: &str,
        mode: MemoMode,
    ) -> UseCaseResult<String> {
        let access = self
            .user_access_repo
            .get_or_create(user_id)
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "cim: failed to load access row");
                CimError::Internal(err)
            })?;

        let now = Utc::now();
        let entitlements = get_entitlements(effective_plan(&access, now), access.is_admin);
        if !entitlements.can_use_cim_analyzer {
            return Err(CimError::NotEntitled);
        }

        if text.trim().is_empty() {
            return Err(CimError::EmptyText);
        }

        if !access.is_admin {
            let limit = feature_limit(
                self.feature_usage_repo.as_ref(),
                &access,
                Feature::CimAnalyzer,
                now,
            )
            .await?;
            if let Some(daily_limit) = limit.daily_limit {
                if limit.is_exhausted() {
                    warn!(%user_id, daily_limit, "cim: daily limit reached");
                    return Err(CimError::DailyLimit(daily_limit));
                }
            }
        }

        let llm = self.llm.as_ref().ok_or(CimError::NotConfigured)?;

        info!(%user_id, mode = mode.as_str(), chars = text.len(), "cim: generating memo");
        let memo = llm
            .generate_memo(build_memo_prompt(text, mode))
            .await
            .map_err(|err| {
                error!(%user_id, error = ?err, "cim: memo generation failed");
                CimError::Upstream(err)
            })?;
        let memo = strip_rating_json(&memo);

        if !access.is_admin {
            let count = self
                .feature_usage_repo
                .increment(user_id, Feature::CimAnalyzer, usage_day(now))
                .await
                .map_err(|err| {
                    error!(%user_id, db_error = ?err, "cim: failed to record usage");
                    CimError::Internal(err)
                })?;
            info!(%user_id, count, "cim: usage recorded");
        }

        Ok(memo)
    }

    pub fn rating(
        &self,
        text: &str,
        output: Option<&str>,
        assumptions: &ProjectionAssumptions,
    ) -> UseCaseResult<CimReport> {
        if text.trim().is_empty() && output.is_none_or(|o| o.trim().is_empty()) {
            return Err(CimError::EmptyText);
        }
        Ok(build_report(text, output, assumptions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::{always, eq};
    use underwrite_core::{
        domain::{
            entities::user_access::UserAccessEntity,
            repositories::{
                feature_usage::MockFeatureUsageRepository, user_access::MockUserAccessRepository,
            },
            value_objects::enums::plans::Plan,
        },
        llm::openai_client::MockLlmGateway,
    };

    fn access_repo(plan: Plan) -> MockUserAccessRepository {
        let mut repo = MockUserAccessRepository::new();
        repo.expect_get_or_create().returning(move |user_id| {
            let mut access = UserAccessEntity::free(user_id);
            access.plan = plan.to_string();
            Ok(access)
        });
        repo
    }

    fn usecase(
        access: MockUserAccessRepository,
        usage: MockFeatureUsageRepository,
        llm: Option<MockLlmGateway>,
    ) -> CimUseCase<MockUserAccessRepository, MockFeatureUsageRepository, MockLlmGateway> {
        CimUseCase::new(Arc::new(access), Arc::new(usage), llm.map(Arc::new))
    }

    #[tokio::test]
    async fn free_plan_is_not_entitled() {
        let usecase = usecase(access_repo(Plan::Free), MockFeatureUsageRepository::new(), None);
        let err = usecase
            .analyze("user_1", "CIM text", MemoMode::Deep)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn empty_text_is_bad_request() {
        let usecase = usecase(access_repo(Plan::Pro), MockFeatureUsageRepository::new(), None);
        let err = usecase.analyze("user_1", "   ", MemoMode::Fast).await.unwrap_err();
        assert!(matches!(err, CimError::EmptyText));
    }

    #[tokio::test]
    async fn pro_plus_limit_is_ten_per_day() {
        let mut usage = MockFeatureUsageRepository::new();
        usage.expect_count_for_day().returning(|_, _, _| Ok(10));

        let usecase = usecase(access_repo(Plan::ProPlus), usage, Some(MockLlmGateway::new()));
        let err = usecase
            .analyze("user_1", "CIM text", MemoMode::Deep)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Daily limit reached (10/day).");
        assert_eq!(err.code(), Some("DAILY_LIMIT"));
    }

    #[tokio::test]
    async fn memo_is_cleaned_and_usage_counted() {
        let mut usage = MockFeatureUsageRepository::new();
        usage.expect_count_for_day().returning(|_, _, _| Ok(0));
        usage
            .expect_increment()
            .with(eq("user_1"), eq(Feature::CimAnalyzer), always())
            .times(1)
            .returning(|_, _, _| Ok(1));

        let mut llm = MockLlmGateway::new();
        llm.expect_generate_memo()
            .withf(|prompt| prompt.contains("Mode: fast") && prompt.ends_with("Dental practice"))
            .times(1)
            .returning(|_| {
                Ok("RATING_JSON: {\"score\": 90}\n---\n## Executive Summary\nGood.".to_string())
            });

        let usecase = usecase(access_repo(Plan::Pro), usage, Some(llm));
        let memo = usecase
            .analyze("user_1", "Dental practice", MemoMode::Fast)
            .await
            .unwrap();

        assert_eq!(memo, "## Executive Summary\nGood.");
    }

    #[tokio::test]
    async fn failed_memo_does_not_count_usage() {
        let mut usage = MockFeatureUsageRepository::new();
        usage.expect_count_for_day().returning(|_, _, _| Ok(0));
        usage.expect_increment().never();

        let mut llm = MockLlmGateway::new();
        llm.expect_generate_memo()
            .returning(|_| Err(anyhow::anyhow!("upstream timeout")));

        let usecase = usecase(access_repo(Plan::Pro), usage, Some(llm));
        let err = usecase
            .analyze("user_1", "Dental practice", MemoMode::Deep)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn missing_api_key_is_server_error() {
        let mut usage = MockFeatureUsageRepository::new();
        usage.expect_count_for_day().returning(|_, _, _| Ok(0));

        let usecase = usecase(access_repo(Plan::Pro), usage, None);
        let err = usecase
            .analyze("user_1", "Dental practice", MemoMode::Deep)
            .await
            .unwrap_err();
        assert!(matches!(err, CimError::NotConfigured));
    }

    #[test]
    fn rating_requires_some_text() {
        let usecase = usecase(
            MockUserAccessRepository::new(),
            MockFeatureUsageRepository::new(),
            None,
        );
        assert!(matches!(
            usecase.rating(" ", None, &ProjectionAssumptions::default()),
            Err(CimError::EmptyText)
        ));

        let report = usecase
            .rating(
                "Asking price $900,000. SDE $300,000.",
                None,
                &ProjectionAssumptions::default(),
            )
            .unwrap();
        assert_eq!(report.figures.price, Some(900_000.0));
        assert!(report.projection.is_some());
    }
}
