use anyhow::Result;
use async_trait::async_trait;
use diesel::{RunQueryDsl, delete, insert_into, prelude::*};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::{
        entities::deals::{DealEntity, InsertDealEntity},
        repositories::deals::DealRepository,
    },
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::deals},
};

pub struct DealPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl DealPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl DealRepository for DealPostgres {
    async fn create(&self, insert_deal_entity: InsertDealEntity) -> Result<Uuid> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = insert_into(deals::table)
            .values(&insert_deal_entity)
            .returning(deals::id)
            .get_result::<Uuid>(&mut conn)?;

        Ok(result)
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<DealEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let results = deals::table
            .filter(deals::user_id.eq(user_id))
            .order(deals::created_at.desc())
            .select(DealEntity::as_select())
            .load::<DealEntity>(&mut conn)?;

        Ok(results)
    }

    async fn delete_owned(&self, user_id: &str, deal_id: Uuid) -> Result<usize> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let deleted = delete(deals::table)
            .filter(deals::id.eq(deal_id))
            .filter(deals::user_id.eq(user_id))
            .execute(&mut conn)?;

        Ok(deleted)
    }
}
