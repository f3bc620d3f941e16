use std::sync::Arc;

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{error, info};
use underwrite_core::domain::{
    entities::user_access::UserAccessEntity,
    repositories::{feature_usage::FeatureUsageRepository, user_access::UserAccessRepository},
    value_objects::{
        access::{AccessDto, AccessUserDto, MeAccessDto, UsageMeterDto, has_plan},
        entitlements::{
            EntitlementLimits, UsageLimit, daily_limit_for, get_entitlements, usage_day,
        },
        enums::{features::Feature, plans::Plan},
    },
};

use crate::{auth::AuthUser, axum_http::error_responses::UseCaseError};

#[derive(Debug, Error)]
pub enum AccessError {
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl UseCaseError for AccessError {
    fn status_code(&self) -> StatusCode {
        match self {
            AccessError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, AccessError>;

/// Plan the record grants right now. A running trial counts as Pro.
pub fn effective_plan(access: &UserAccessEntity, now: DateTime<Utc>) -> Plan {
    if has_plan(access, Plan::ProPlus, now) {
        Plan::ProPlus
    } else if has_plan(access, Plan::Pro, now) {
        Plan::Pro
    } else {
        Plan::Free
    }
}

/// Today's meter for one feature.
pub async fn feature_limit<F>(
    feature_usage_repo: &F,
    access: &UserAccessEntity,
    feature: Feature,
    now: DateTime<Utc>,
) -> anyhow::Result<UsageLimit>
where
    F: FeatureUsageRepository + Send + Sync,
{
    let daily_limit = daily_limit_for(effective_plan(access, now), access.is_admin, feature);
    let used_today = feature_usage_repo
        .count_for_day(&access.user_id, feature, usage_day(now))
        .await?;
    Ok(UsageLimit::new(daily_limit, used_today, now))
}

pub struct AccessUseCase<U, F>
where
    U: UserAccessRepository + Send + Sync + 'static,
    F: FeatureUsageRepository + Send + Sync + 'static,
{
    user_access_repo: Arc<U>,
    feature_usage_repo: Arc<F>,
}

impl<U, F> AccessUseCase<U, F>
where
    U: UserAccessRepository + Send + Sync + 'static,
    F: FeatureUsageRepository + Send + Sync + 'static,
{
    pub fn new(user_access_repo: Arc<U>, feature_usage_repo: Arc<F>) -> Self {
        Self {
            user_access_repo,
            feature_usage_repo,
        }
    }

    pub async fn get_access(&self, user_id: &str) -> UseCaseResult<AccessDto> {
        let access = self
            .user_access_repo
            .get_or_create(user_id)
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "access: failed to load access row");
                AccessError::Internal(err)
            })?;

        Ok(AccessDto::from_entity(&access, Utc::now()))
    }

    pub async fn me_access(&self, user: &AuthUser) -> UseCaseResult<MeAccessDto> {
        let user_id = user.user_id.as_str();
        let access = self
            .user_access_repo
            .upsert_identity(user_id, user.email.clone(), user.email_verified)
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "access: failed to upsert identity");
                AccessError::Internal(err)
            })?;

        let now = Utc::now();
        let plan = effective_plan(&access, now);

        let cim_analyzer =
            feature_limit(self.feature_usage_repo.as_ref(), &access, Feature::CimAnalyzer, now)
                .await?;
        let deal_analyze =
            feature_limit(self.feature_usage_repo.as_ref(), &access, Feature::DealAnalyze, now)
                .await?;

        info!(%user_id, plan = %plan, is_admin = access.is_admin, "access: me/access resolved");

        Ok(MeAccessDto {
            ok: true,
            plan,
            is_admin: access.is_admin,
            user: AccessUserDto {
                user_id: access.user_id.clone(),
                email: access.email.clone(),
                email_verified: access.email_verified,
            },
            entitlements: get_entitlements(plan, access.is_admin).with_limits(
                EntitlementLimits {
                    cim_analyzer,
                    deal_analyze,
                },
            ),
        })
    }

    /// Deal-analyze meter. Disabled when signed out or on the free tier.
    pub async fn deal_usage(&self, user: Option<&AuthUser>) -> UseCaseResult<UsageMeterDto> {
        let Some(user) = user else {
            return Ok(UsageMeterDto::disabled());
        };
        let user_id = user.user_id.as_str();

        let access = match self.user_access_repo.find_by_user_id(user_id).await? {
            Some(access) => access,
            None => return Ok(UsageMeterDto::disabled()),
        };

        let now = Utc::now();
        if effective_plan(&access, now) == Plan::Free && !access.is_admin {
            return Ok(UsageMeterDto::disabled());
        }

        let limit = feature_limit(
            self.feature_usage_repo.as_ref(),
            &access,
            Feature::DealAnalyze,
            now,
        )
        .await?;

        Ok(UsageMeterDto::enabled(limit.used_today, limit.daily_limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use mockall::predicate::{always, eq};
    use underwrite_core::domain::repositories::{
        feature_usage::MockFeatureUsageRepository, user_access::MockUserAccessRepository,
    };

    fn user() -> AuthUser {
        AuthUser {
            user_id: "user_1".to_string(),
            email: Some("buyer@example.com".to_string()),
            email_verified: true,
        }
    }

    fn access_with(plan: Plan) -> UserAccessEntity {
        let mut access = UserAccessEntity::free("user_1");
        access.plan = plan.to_string();
        access
    }

    #[test]
    fn trial_counts_as_pro() {
        let now = Utc::now();
        let mut access = access_with(Plan::Free);
        access.trial_ends_at = Some(now + Duration::days(2));
        assert_eq!(effective_plan(&access, now), Plan::Pro);

        access.trial_ends_at = Some(now - Duration::days(1));
        assert_eq!(effective_plan(&access, now), Plan::Free);
    }

    #[tokio::test]
    async fn me_access_reports_limits_for_pro() {
        let mut user_access_repo = MockUserAccessRepository::new();
        let mut feature_usage_repo = MockFeatureUsageRepository::new();

        user_access_repo
            .expect_upsert_identity()
            .with(eq("user_1"), eq(Some("buyer@example.com".to_string())), eq(true))
            .times(1)
            .returning(|_, _, _| Ok(access_with(Plan::Pro)));

        feature_usage_repo
            .expect_count_for_day()
            .with(eq("user_1"), eq(Feature::CimAnalyzer), always())
            .returning(|_, _, _| Ok(1));
        feature_usage_repo
            .expect_count_for_day()
            .with(eq("user_1"), eq(Feature::DealAnalyze), always())
            .returning(|_, _, _| Ok(3));

        let usecase = AccessUseCase::new(Arc::new(user_access_repo), Arc::new(feature_usage_repo));
        let dto = usecase.me_access(&user()).await.unwrap();

        assert_eq!(dto.plan, Plan::Pro);
        assert!(dto.entitlements.can_use_cim_analyzer);
        assert!(!dto.entitlements.can_use_5_year_projection);
        let limits = dto.entitlements.limits.unwrap();
        assert_eq!(limits.cim_analyzer.remaining, Some(2));
        assert!(limits.deal_analyze.is_exhausted());
    }

    #[tokio::test]
    async fn usage_is_disabled_when_signed_out() {
        let usecase = AccessUseCase::new(
            Arc::new(MockUserAccessRepository::new()),
            Arc::new(MockFeatureUsageRepository::new()),
        );
        let meter = usecase.deal_usage(None).await.unwrap();
        assert!(!meter.enabled);
    }

    #[tokio::test]
    async fn usage_is_disabled_for_free_plan() {
        let mut user_access_repo = MockUserAccessRepository::new();
        user_access_repo
            .expect_find_by_user_id()
            .returning(|_| Ok(Some(access_with(Plan::Free))));

        let usecase = AccessUseCase::new(
            Arc::new(user_access_repo),
            Arc::new(MockFeatureUsageRepository::new()),
        );
        let meter = usecase.deal_usage(Some(&user())).await.unwrap();
        assert_eq!(meter, UsageMeterDto::disabled());
    }

    #[tokio::test]
    async fn usage_meter_for_pro() {
        let mut user_access_repo = MockUserAccessRepository::new();
        let mut feature_usage_repo = MockFeatureUsageRepository::new();

        user_access_repo
            .expect_find_by_user_id()
            .returning(|_| Ok(Some(access_with(Plan::Pro))));
        feature_usage_repo
            .expect_count_for_day()
            .with(eq("user_1"), eq(Feature::DealAnalyze), always())
            .returning(|_, _, _| Ok(2));

        let usecase = AccessUseCase::new(Arc::new(user_access_repo), Arc::new(feature_usage_repo));
        let meter = usecase.deal_usage(Some(&user())).await.unwrap();

        assert_eq!(meter.count_today, Some(2));
        assert_eq!(meter.remaining, Some(Some(1)));
        assert_eq!(meter.pct_used, Some(67));
    }

    #[tokio::test]
    async fn get_access_creates_missing_row() {
        let mut user_access_repo = MockUserAccessRepository::new();
        user_access_repo
            .expect_get_or_create()
            .with(eq("user_9"))
            .times(1)
            .returning(|user_id| Ok(UserAccessEntity::free(user_id)));

        let usecase = AccessUseCase::new(
            Arc::new(user_access_repo),
            Arc::new(MockFeatureUsageRepository::new()),
        );
        let dto = usecase.get_access("user_9").await.unwrap();
        assert_eq!(dto.plan, Plan::Free);
        assert!(!dto.trial_active);
    }
}
