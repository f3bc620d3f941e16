use chrono::NaiveDate;
use diesel::prelude::*;

use crate::infra::db::postgres::schema::feature_usage;

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = feature_usage)]
pub struct InsertFeatureUsageEntity {
    pub user_id: String,
    pub feature: String,
    pub day: NaiveDate,
    pub count: i32,
}
