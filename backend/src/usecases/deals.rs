use std::sync::Arc;

use axum::http::StatusCode;
use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};
use underwrite_core::domain::{
    repositories::{deals::DealRepository, user_access::UserAccessRepository},
    value_objects::{
        deals::{DealDto, insert_deal_from_payload},
        entitlements::get_entitlements,
    },
};
use uuid::Uuid;

use crate::{axum_http::error_responses::UseCaseError, usecases::access::effective_plan};

#[derive(Debug, Error)]
pub enum DealError {
    #[error("Upgrade required to save deals")]
    SaveNotAllowed,
    #[error("Deal payload must be a JSON object")]
    InvalidPayload,
    #[error("Deal not found")]
    NotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl UseCaseError for DealError {
    fn status_code(&self) -> StatusCode {
        match self {
            DealError::SaveNotAllowed => StatusCode::FORBIDDEN,
            DealError::InvalidPayload => StatusCode::BAD_REQUEST,
            DealError::NotFound => StatusCode::NOT_FOUND,
            DealError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, DealError>;

pub struct DealsUseCase<D, U>
where
    D: DealRepository + Send + Sync + 'static,
    U: UserAccessRepository + Send + Sync + 'static,
{
    deal_repo: Arc<D>,
    user_access_repo: Arc<U>,
}

impl<D, U> DealsUseCase<D, U>
where
    D: DealRepository + Send + Sync + 'static,
    U: UserAccessRepository + Send + Sync + 'static,
{
    pub fn new(deal_repo: Arc<D>, user_access_repo: Arc<U>) -> Self {
        Self {
            deal_repo,
            user_access_repo,
        }
    }

    pub async fn save(&self, user_id: &str, payload: Value) -> UseCaseResult<Uuid> {
        if !payload.is_object() {
            return Err(DealError::InvalidPayload);
        }

        let access = self.user_access_repo.get_or_create(user_id).await?;
        let entitlements = get_entitlements(effective_plan(&access, Utc::now()), access.is_admin);
        if !entitlements.can_save_deals {
            warn!(%user_id, plan = %access.plan, "deals: save attempted without entitlement");
            return Err(DealError::SaveNotAllowed);
        }

        let insert_deal_entity = insert_deal_from_payload(user_id, payload);
        let deal_id = self
            .deal_repo
            .create(insert_deal_entity)
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "deals: failed to save deal");
                DealError::Internal(err)
            })?;

        info!(%user_id, %deal_id, "deals: deal saved");
        Ok(deal_id)
    }

    pub async fn list(&self, user_id: &str) -> UseCaseResult<Vec<DealDto>> {
        let deals = self.deal_repo.list_by_user(user_id).await.map_err(|err| {
            error!(%user_id, db_error = ?err, "deals: failed to list deals");
            DealError::Internal(err)
        })?;
        Ok(deals.into_iter().map(DealDto::from).collect())
    }

    pub async fn delete(&self, user_id: &str, deal_id: Uuid) -> UseCaseResult<()> {
        let deleted = self
            .deal_repo
            .delete_owned(user_id, deal_id)
            .await
            .map_err(|err| {
                error!(%user_id, %deal_id, db_error = ?err, "deals: failed to delete deal");
                DealError::Internal(err)
            })?;

        if deleted == 0 {
            return Err(DealError::NotFound);
        }
        info!(%user_id, %deal_id, "deals: deal deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use serde_json::json;
    use underwrite_core::domain::{
        entities::{deals::DealEntity, user_access::UserAccessEntity},
        repositories::{deals::MockDealRepository, user_access::MockUserAccessRepository},
        value_objects::enums::plans::Plan,
    };

    fn access_with(plan: Plan) -> UserAccessEntity {
        let mut access = UserAccessEntity::free("user_1");
        access.plan = plan.to_string();
        access
    }

    #[tokio::test]
    async fn pro_user_can_save_deal() {
        let deal_id = Uuid::new_v4();
        let mut deal_repo = MockDealRepository::new();
        let mut user_access_repo = MockUserAccessRepository::new();

        user_access_repo
            .expect_get_or_create()
            .returning(|_| Ok(access_with(Plan::Pro)));
        deal_repo
            .expect_create()
            .withf(|insert| {
                insert.user_id == "user_1"
                    && insert.year == 2023
                    && insert.title.as_deref() == Some("Laundromat")
            })
            .times(1)
            .returning(move |_| Ok(deal_id));

        let usecase = DealsUseCase::new(Arc::new(deal_repo), Arc::new(user_access_repo));
        let payload = json!({ "dealInput": { "year": 2023, "industry": "Laundromat" } });

        assert_eq!(usecase.save("user_1", payload).await.unwrap(), deal_id);
    }

    #[tokio::test]
    async fn free_user_cannot_save() {
        let mut user_access_repo = MockUserAccessRepository::new();
        user_access_repo
            .expect_get_or_create()
            .returning(|_| Ok(access_with(Plan::Free)));

        let usecase = DealsUseCase::new(
            Arc::new(MockDealRepository::new()),
            Arc::new(user_access_repo),
        );
        let err = usecase.save("user_1", json!({})).await.unwrap_err();
        assert!(matches!(err, DealError::SaveNotAllowed));
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn non_object_payload_is_rejected() {
        let usecase = DealsUseCase::new(
            Arc::new(MockDealRepository::new()),
            Arc::new(MockUserAccessRepository::new()),
        );
        let err = usecase.save("user_1", json!([1, 2])).await.unwrap_err();
        assert!(matches!(err, DealError::InvalidPayload));
    }

    #[tokio::test]
    async fn list_maps_entities() {
        let mut deal_repo = MockDealRepository::new();
        deal_repo
            .expect_list_by_user()
            .with(eq("user_1"))
            .returning(|user_id| {
                let now = Utc::now();
                Ok(vec![DealEntity {
                    id: Uuid::new_v4(),
                    user_id: user_id.to_string(),
                    year: 2024,
                    title: Some("HVAC".to_string()),
                    payload: json!({ "title": "HVAC" }),
                    created_at: now,
                    updated_at: now,
                }])
            });

        let usecase = DealsUseCase::new(
            Arc::new(deal_repo),
            Arc::new(MockUserAccessRepository::new()),
        );
        let deals = usecase.list("user_1").await.unwrap();
        assert_eq!(deals.len(), 1);
        assert_eq!(deals[0].title.as_deref(), Some("HVAC"));
    }

    #[tokio::test]
    async fn deleting_someone_elses_deal_is_not_found() {
        let deal_id = Uuid::new_v4();
        let mut deal_repo = MockDealRepository::new();
        deal_repo
            .expect_delete_owned()
            .with(eq("user_1"), eq(deal_id))
            .returning(|_, _| Ok(0));

        let usecase = DealsUseCase::new(
            Arc::new(deal_repo),
            Arc::new(MockUserAccessRepository::new()),
        );
        let err = usecase.delete("user_1", deal_id).await.unwrap_err();
        assert!(matches!(err, DealError::NotFound));
    }
}
