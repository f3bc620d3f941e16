use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use diesel::{RunQueryDsl, insert_into, prelude::*};
use std::sync::Arc;

use crate::{
    domain::{
        entities::feature_usage::InsertFeatureUsageEntity,
        repositories::feature_usage::FeatureUsageRepository,
        value_objects::enums::features::Feature,
    },
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::feature_usage},
};

pub struct FeatureUsagePostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl FeatureUsagePostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl FeatureUsageRepository for FeatureUsagePostgres {
    async fn count_for_day(&self, user_id: &str, feature: Feature, day: NaiveDate) -> Result<i32> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let count = feature_usage::table
            .filter(feature_usage::user_id.eq(user_id))
            .filter(feature_usage::feature.eq(feature.as_str()))
            .filter(feature_usage::day.eq(day))
            .select(feature_usage::count)
            .first::<i32>(&mut conn)
            .optional()?;

        Ok(count.unwrap_or(0))
    }

    async fn increment(&self, user_id: &str, feature: Feature, day: NaiveDate) -> Result<i32> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let row = InsertFeatureUsageEntity {
            user_id: user_id.to_string(),
            feature: feature.as_str().to_string(),
            day,
            count: 1,
        };

        let count = insert_into(feature_usage::table)
            .values(&row)
            .on_conflict((
                feature_usage::user_id,
                feature_usage::feature,
                feature_usage::day,
            ))
            .do_update()
            .set((
                feature_usage::count.eq(feature_usage::count + 1),
                feature_usage::updated_at.eq(Utc::now()),
            ))
            .returning(feature_usage::count)
            .get_result::<i32>(&mut conn)?;

        Ok(count)
    }
}
