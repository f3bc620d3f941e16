use std::sync::Arc;

use axum::http::StatusCode;
use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, warn};
use underwrite_core::{
    domain::{
        entities::user_access::UserAccessEntity,
        repositories::{feature_usage::FeatureUsageRepository, user_access::UserAccessRepository},
        value_objects::{
            entitlements::{Entitlements, get_entitlements, usage_day},
            enums::{features::Feature, plans::Plan},
        },
    },
    llm::openai_client::LlmGateway,
    underwriting::{
        deal_score::{
            DealScore, SCORING_SYSTEM_PROMPT, ScoringRequest, fallback_score,
            missing_inputs_score, parse_model_output,
        },
        financing::{DealComputation, DealInput, compute_deal},
        projection::{ProjectionInput, ProjectionResult, project_years},
    },
};

use crate::{
    axum_http::error_responses::UseCaseError,
    usecases::access::{effective_plan, feature_limit},
};

#[derive(Debug, Error)]
pub enum DealCalculatorError {
    #[error("Subscription required")]
    SubscriptionRequired,
    #[error("Upgrade to Pro+ to unlock the 5-year projection")]
    ProjectionLocked,
    #[error("{0}")]
    InvalidInput(String),
    #[error("Daily limit reached ({limit}/day).{}", upgrade_suffix(.upgrade_hint))]
    DailyLimit { limit: i32, upgrade_hint: bool },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

fn upgrade_suffix(upgrade_hint: &bool) -> &'static str {
    if *upgrade_hint {
        " Upgrade to Pro+ for unlimited analyses."
    } else {
        ""
    }
}

impl UseCaseError for DealCalculatorError {
    fn status_code(&self) -> StatusCode {
        match self {
            DealCalculatorError::SubscriptionRequired | DealCalculatorError::ProjectionLocked => {
                StatusCode::FORBIDDEN
            }
            DealCalculatorError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            DealCalculatorError::DailyLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            DealCalculatorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> Option<&'static str> {
        match self {
            DealCalculatorError::ProjectionLocked => Some("PROJECTION_LOCKED"),
            DealCalculatorError::DailyLimit { .. } => Some("DAILY_LIMIT"),
            _ => None,
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, DealCalculatorError>;

/// Outcome of an AI deal score. Every variant carries a renderable score.
#[derive(Debug, Clone, PartialEq)]
pub enum AiSummary {
    Scored(DealScore),
    MissingInputs(DealScore),
    NotConfigured(DealScore),
    UpstreamFailed(DealScore),
}

impl AiSummary {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AiSummary::Scored(_) | AiSummary::MissingInputs(_) => StatusCode::OK,
            AiSummary::NotConfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AiSummary::UpstreamFailed(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn into_score(self) -> DealScore {
        match self {
            AiSummary::Scored(score)
            | AiSummary::MissingInputs(score)
            | AiSummary::NotConfigured(score)
            | AiSummary::UpstreamFailed(score) => score,
        }
    }
}

pub struct DealCalculatorUseCase<U, F, L>
where
    U: UserAccessRepository + Send + Sync + 'static,
    F: FeatureUsageRepository + Send + Sync + 'static,
    L: LlmGateway + Send + Sync + 'static,
{
    user_access_repo: Arc<U>,
    feature_usage_repo: Arc<F>,
    llm: Option<Arc<L>>,
}

impl<U, F, L> DealCalculatorUseCase<U, F, L>
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

    pub fn compute(&self, input: &DealInput) -> DealComputation {
        compute_deal(input)
    }

    async fn load_entitlements(
        &self,
        user_id: &str,
    ) -> UseCaseResult<(UserAccessEntity, Plan, Entitlements)> {
        let access = self
            .user_access_repo
            .get_or_create(user_id)
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "deal_calculator: failed to load access row");
                DealCalculatorError::Internal(err)
            })?;
        let plan = effective_plan(&access, Utc::now());
        let entitlements = get_entitlements(plan, access.is_admin);
        Ok((access, plan, entitlements))
    }

    /// Metered projection for subscribers.
    pub async fn analyze(
        &self,
        user_id: &str,
        input: &ProjectionInput,
    ) -> UseCaseResult<ProjectionResult> {
        let (access, plan, entitlements) = self.load_entitlements(user_id).await?;
        if !entitlements.is_subscribed() {
            return Err(DealCalculatorError::SubscriptionRequired);
        }

        if !input.has_finite_core() {
            return Err(DealCalculatorError::InvalidInput(
                "SDE, annual debt and upfront cash must be numbers".to_string(),
            ));
        }

        if !access.is_admin {
            let now = Utc::now();
            let limit = feature_limit(
                self.feature_usage_repo.as_ref(),
                &access,
                Feature::DealAnalyze,
                now,
            )
            .await?;

            if let Some(daily_limit) = limit.daily_limit {
                if limit.is_exhausted() {
                    warn!(%user_id, daily_limit, "deal_calculator: daily analyze limit reached");
                    return Err(DealCalculatorError::DailyLimit {
                        limit: daily_limit,
                        upgrade_hint: plan == Plan::Pro,
                    });
                }
            }

            let count = self
                .feature_usage_repo
                .increment(user_id, Feature::DealAnalyze, usage_day(now))
                .await
                .map_err(|err| {
                    error!(%user_id, db_error = ?err, "deal_calculator: failed to record usage");
                    DealCalculatorError::Internal(err)
                })?;
            info!(%user_id, count, "deal_calculator: analyze usage recorded");
        }

        Ok(project_years(input))
    }

    /// Multi-year projection for Pro+ (and admins). Garbage inputs coerce to zero.
    pub async fn projection(
        &self,
        user_id: &str,
        input: &ProjectionInput,
    ) -> UseCaseResult<ProjectionResult> {
        let (_, _, entitlements) = self.load_entitlements(user_id).await?;
        if !entitlements.can_use_5_year_projection {
            return Err(DealCalculatorError::ProjectionLocked);
        }
        Ok(project_years(&input.sanitized()))
    }

    pub async fn ai_summary(
        &self,
        user_id: &str,
        request: &ScoringRequest,
    ) -> UseCaseResult<AiSummary> {
        let (_, _, entitlements) = self.load_entitlements(user_id).await?;
        if !entitlements.is_subscribed() {
            return Err(DealCalculatorError::SubscriptionRequired);
        }

        if !request.has_required_inputs() {
            return Ok(AiSummary::MissingInputs(missing_inputs_score()));
        }

        let Some(llm) = self.llm.as_ref() else {
            error!("deal_calculator: OPENAI_API_KEY is not configured");
            return Ok(AiSummary::NotConfigured(fallback_score(
                "AI scoring is not configured on the server.",
            )));
        };

        let prompt = request.to_prompt();
        let user_content = serde_json::to_string(&prompt)
            .map_err(|err| DealCalculatorError::Internal(err.into()))?;

        let raw = match llm
            .score_deal(SCORING_SYSTEM_PROMPT.to_string(), user_content)
            .await
        {
            Ok(raw) => raw,
            Err(err) => {
                error!(%user_id, error = ?err, "deal_calculator: scoring request failed");
                return Ok(AiSummary::UpstreamFailed(fallback_score(
                    "AI scoring failed. Please try again.",
                )));
            }
        };

        match parse_model_output(&raw) {
            Ok(score) => {
                info!(%user_id, score = score.score, "deal_calculator: deal scored");
                Ok(AiSummary::Scored(score))
            }
            Err(parse_error) => {
                warn!(%user_id, ?parse_error, "deal_calculator: model returned unusable output");
                Ok(AiSummary::UpstreamFailed(fallback_score(
                    "AI returned an unreadable response. Please try again.",
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::{always, eq};
    use underwrite_core::{
        domain::repositories::{
            feature_usage::MockFeatureUsageRepository, user_access::MockUserAccessRepository,
        },
        llm::openai_client::MockLlmGateway,
    };

    type UseCase =
        DealCalculatorUseCase<MockUserAccessRepository, MockFeatureUsageRepository, MockLlmGateway>;

    fn access_repo(plan: Plan, is_admin: bool) -> MockUserAccessRepository {
        let mut repo = MockUserAccessRepository::new();
        repo.expect_get_or_create().returning(move |user_id| {
            let mut access = UserAccessEntity::free(user_id);
            access.plan = plan.to_string();
            access.is_admin = is_admin;
            Ok(access)
        });
        repo
    }

    fn projection_input() -> ProjectionInput {
        ProjectionInput {
            sde_year1: 300_000.0,
            annual_debt: 150_000.0,
            upfront_cash: 100_000.0,
            ..Default::default()
        }
    }

    fn scoring_request() -> ScoringRequest {
        ScoringRequest {
            industry: Some("HVAC".to_string()),
            asking_price: Some(1_000_000.0),
            sde: Some(300_000.0),
            ..Default::default()
        }
    }

    fn usecase(
        access: MockUserAccessRepository,
        usage: MockFeatureUsageRepository,
        llm: Option<MockLlmGateway>,
    ) -> UseCase {
        DealCalculatorUseCase::new(Arc::new(access), Arc::new(usage), llm.map(Arc::new))
    }

    #[tokio::test]
    async fn free_user_cannot_analyze() {
        let usecase = usecase(
            access_repo(Plan::Free, false),
            MockFeatureUsageRepository::new(),
            None,
        );
        let err = usecase.analyze("user_1", &projection_input()).await.unwrap_err();
        assert!(matches!(err, DealCalculatorError::SubscriptionRequired));
    }

    #[tokio::test]
    async fn non_finite_inputs_are_rejected() {
        let usecase = usecase(
            access_repo(Plan::Pro, false),
            MockFeatureUsageRepository::new(),
            None,
        );
        let input = ProjectionInput {
            sde_year1: f64::NAN,
            ..projection_input()
        };
        let err = usecase.analyze("user_1", &input).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn pro_analyze_counts_usage() {
        let mut usage = MockFeatureUsageRepository::new();
        usage
            .expect_count_for_day()
            .with(eq("user_1"), eq(Feature::DealAnalyze), always())
            .returning(|_, _, _| Ok(1));
        usage
            .expect_increment()
            .with(eq("user_1"), eq(Feature::DealAnalyze), always())
            .times(1)
            .returning(|_, _, _| Ok(2));

        let usecase = usecase(access_repo(Plan::Pro, false), usage, None);
        let result = usecase.analyze("user_1", &projection_input()).await.unwrap();
        assert_eq!(result.rows.len(), 5);
    }

    #[tokio::test]
    async fn pro_hits_daily_limit() {
        let mut usage = MockFeatureUsageRepository::new();
        usage.expect_count_for_day().returning(|_, _, _| Ok(3));
        usage.expect_increment().never();

        let usecase = usecase(access_repo(Plan::Pro, false), usage, None);
        let err = usecase.analyze("user_1", &projection_input()).await.unwrap_err();

        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.code(), Some("DAILY_LIMIT"));
        assert_eq!(
            err.to_string(),
            "Daily limit reached (3/day). Upgrade to Pro+ for unlimited analyses."
        );
    }

    #[tokio::test]
    async fn admin_analyze_is_not_metered() {
        let mut usage = MockFeatureUsageRepository::new();
        usage.expect_count_for_day().never();
        usage.expect_increment().never();

        let usecase = usecase(access_repo(Plan::Free, true), usage, None);
        assert!(usecase.analyze("admin", &projection_input()).await.is_ok());
    }

    #[tokio::test]
    async fn projection_is_locked_for_pro() {
        let usecase = usecase(
            access_repo(Plan::Pro, false),
            MockFeatureUsageRepository::new(),
            None,
        );
        let err = usecase.projection("user_1", &projection_input()).await.unwrap_err();
        assert_eq!(err.code(), Some("PROJECTION_LOCKED"));
    }

    #[tokio::test]
    async fn projection_sanitizes_inputs_for_pro_plus() {
        let usecase = usecase(
            access_repo(Plan::ProPlus, false),
            MockFeatureUsageRepository::new(),
            None,
        );
        let input = ProjectionInput {
            capex_annual: f64::NAN,
            ..projection_input()
        };
        let result = usecase.projection("user_1", &input).await.unwrap();
        assert_eq!(result.rows[0].capex, 0.0);
    }

    #[tokio::test]
    async fn missing_inputs_skip_the_model() {
        let mut llm = MockLlmGateway::new();
        llm.expect_score_deal().never();

        let usecase = usecase(
            access_repo(Plan::Pro, false),
            MockFeatureUsageRepository::new(),
            Some(llm),
        );
        let request = ScoringRequest {
            sde: None,
            ..scoring_request()
        };
        let summary = usecase.ai_summary("user_1", &request).await.unwrap();
        assert_eq!(summary.status_code(), StatusCode::OK);
        assert_eq!(summary.into_score().score, 1);
    }

    #[tokio::test]
    async fn unconfigured_llm_is_server_error() {
        let usecase = usecase(
            access_repo(Plan::Pro, false),
            MockFeatureUsageRepository::new(),
            None,
        );
        let summary = usecase.ai_summary("user_1", &scoring_request()).await.unwrap();
        assert_eq!(summary.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn model_score_is_parsed() {
        let mut llm = MockLlmGateway::new();
        llm.expect_score_deal()
            .withf(|system, user| {
                system == SCORING_SYSTEM_PROMPT && user.contains("\"industry\":\"HVAC\"")
            })
            .times(1)
            .returning(|_, _| {
                Ok(r#"{"score": 14, "topWeaknesses": ["Thin margin"], "summary": "Fair deal."}"#
                    .to_string())
            });

        let usecase = usecase(
            access_repo(Plan::ProPlus, false),
            MockFeatureUsageRepository::new(),
            Some(llm),
        );
        let summary = usecase.ai_summary("user_1", &scoring_request()).await.unwrap();

        assert_eq!(summary.status_code(), StatusCode::OK);
        let score = summary.into_score();
        assert_eq!(score.score, 10);
        assert_eq!(score.top_weaknesses, vec!["Thin margin".to_string()]);
    }

    #[tokio::test]
    async fn non_json_model_output_is_bad_gateway() {
        let mut llm = MockLlmGateway::new();
        llm.expect_score_deal()
            .returning(|_, _| Ok("I think this deal is fine".to_string()));

        let usecase = usecase(
            access_repo(Plan::Pro, false),
            MockFeatureUsageRepository::new(),
            Some(llm),
        );
        let summary = usecase.ai_summary("user_1", &scoring_request()).await.unwrap();
        assert_eq!(summary.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(summary.into_score().score, 1);
    }
}
