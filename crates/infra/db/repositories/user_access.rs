use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use diesel::{RunQueryDsl, insert_into, prelude::*, update};
use std::sync::Arc;

use crate::{
    domain::{
        entities::user_access::{BillingChangeset, InsertUserAccessEntity, UserAccessEntity},
        repositories::user_access::UserAccessRepository,
    },
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::user_access},
};

pub struct UserAccessPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl UserAccessPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

fn stamped(changeset: BillingChangeset) -> BillingChangeset {
    BillingChangeset {
        updated_at: Some(changeset.updated_at.unwrap_or_else(Utc::now)),
        ..changeset
    }
}

#[async_trait]
impl UserAccessRepository for UserAccessPostgres {
    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<UserAccessEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = user_access::table
            .filter(user_access::user_id.eq(user_id))
            .select(UserAccessEntity::as_select())
            .first::<UserAccessEntity>(&mut conn)
            .optional()?;

        Ok(result)
    }

    async fn get_or_create(&self, user_id: &str) -> Result<UserAccessEntity> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        insert_into(user_access::table)
            .values(&InsertUserAccessEntity::free(user_id, None, false))
            .on_conflict(user_access::user_id)
            .do_nothing()
            .execute(&mut conn)?;

        let result = user_access::table
            .filter(user_access::user_id.eq(user_id))
            .select(UserAccessEntity::as_select())
            .first::<UserAccessEntity>(&mut conn)?;

        Ok(result)
    }

    async fn upsert_identity(
        &self,
        user_id: &str,
        email: Option<String>,
        email_verified: bool,
    ) -> Result<UserAccessEntity> {
        let mut conn = Arc::clone(&self.db_pool).get()?;
        let now = Utc::now();

        let insert = InsertUserAccessEntity::free(user_id, email.clone(), email_verified);

        let result = match email {
            Some(email) => insert_into(user_access::table)
                .values(&insert)
                .on_conflict(user_access::user_id)
                .do_update()
                .set((
                    user_access::email.eq(Some(email)),
                    user_access::email_verified.eq(email_verified),
                    user_access::updated_at.eq(now),
                ))
                .returning(UserAccessEntity::as_returning())
                .get_result::<UserAccessEntity>(&mut conn)?,
            None => insert_into(user_access::table)
                .values(&insert)
                .on_conflict(user_access::user_id)
                .do_update()
                .set((
                    user_access::email_verified.eq(email_verified),
                    user_access::updated_at.eq(now),
                ))
                .returning(UserAccessEntity::as_returning())
                .get_result::<UserAccessEntity>(&mut conn)?,
        };

        Ok(result)
    }

    async fn find_by_stripe_customer_id(
        &self,
        stripe_customer_id: &str,
    ) -> Result<Option<UserAccessEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = user_access::table
            .filter(user_access::stripe_customer_id.eq(stripe_customer_id))
            .order(user_access::updated_at.desc())
            .select(UserAccessEntity::as_select())
            .first::<UserAccessEntity>(&mut conn)
            .optional()?;

        Ok(result)
    }

    async fn set_stripe_customer_id(
        &self,
        user_id: &str,
        stripe_customer_id: &str,
    ) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(user_access::table)
            .filter(user_access::user_id.eq(user_id))
            .set((
                user_access::stripe_customer_id.eq(Some(stripe_customer_id)),
                user_access::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(())
    }

    async fn apply_billing_update(
        &self,
        user_id: &str,
        changeset: BillingChangeset,
    ) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;
        let changeset = stamped(changeset);

        conn.transaction::<_, anyhow::Error, _>(|conn| {
            insert_into(user_access::table)
                .values(&InsertUserAccessEntity::free(user_id, None, false))
                .on_conflict(user_access::user_id)
                .do_nothing()
                .execute(conn)?;

            update(user_access::table)
                .filter(user_access::user_id.eq(user_id))
                .set(&changeset)
                .execute(conn)?;

            Ok(())
        })?;

        Ok(())
    }

    async fn apply_billing_update_by_customer(
        &self,
        stripe_customer_id: &str,
        changeset: BillingChangeset,
    ) -> Result<usize> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let affected = update(user_access::table)
            .filter(user_access::stripe_customer_id.eq(stripe_customer_id))
            .set(&stamped(changeset))
            .execute(&mut conn)?;

        Ok(affected)
    }
}
