use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infra::db::postgres::schema::deals;

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = deals)]
pub struct DealEntity {
    pub id: Uuid,
    pub user_id: String,
    pub year: i32,
    pub title: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = deals)]
pub struct InsertDealEntity {
    pub user_id: String,
    pub year: i32,
    pub title: Option<String>,
    pub payload: serde_json::Value,
}
