use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::entities::deals::{DealEntity, InsertDealEntity};

pub const DEFAULT_DEAL_YEAR: i32 = 2024;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DealDto {
    pub id: Uuid,
    pub title: Option<String>,
    pub year: i32,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DealEntity> for DealDto {
    fn from(value: DealEntity) -> Self {
        Self {
            id: value.id,
            title: value.title,
            year: value.year,
            payload: value.payload,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

/// Builds the stored row for a saved deal. The payload is kept as-is; year and title are
/// lifted out of it for listing.
pub fn insert_deal_from_payload(user_id: &str, payload: Value) -> InsertDealEntity {
    let deal_input = payload.get("dealInput");

    let year = deal_input
        .and_then(|input| input.get("year"))
        .and_then(json_year)
        .unwrap_or(DEFAULT_DEAL_YEAR);

    let title = payload
        .get("title")
        .and_then(Value::as_str)
        .or_else(|| {
            deal_input
                .and_then(|input| input.get("industry"))
                .and_then(Value::as_str)
        })
        .map(str::to_string);

    InsertDealEntity {
        user_id: user_id.to_string(),
        year,
        title,
        payload,
    }
}

fn json_year(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()).map(|v| v as i32),
        Value::String(s) => s.trim().parse::<i32>().ok(),
        _ => None,
    }
}
