use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{
    entities::user_access::UserAccessEntity,
    value_objects::{entitlements::Entitlements, enums::plans::Plan},
};

pub fn is_trial_active(trial_ends_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    trial_ends_at.is_some_and(|ends_at| ends_at > now)
}

/// Whether the record satisfies a required tier. A running trial counts as Pro.
pub fn has_plan(access: &UserAccessEntity, required: Plan, now: DateTime<Utc>) -> bool {
    let plan = access.plan();
    match required {
        Plan::Free => true,
        Plan::Pro => {
            matches!(plan, Plan::Pro | Plan::ProPlus) || is_trial_active(access.trial_ends_at, now)
        }
        Plan::ProPlus => plan == Plan::ProPlus,
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccessDto {
    pub plan: Plan,
    pub trial_started_at: Option<DateTime<Utc>>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub trial_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccessDto {
    pub fn from_entity(entity: &UserAccessEntity, now: DateTime<Utc>) -> Self {
        Self {
            plan: entity.plan(),
            trial_started_at: entity.trial_started_at,
            trial_ends_at: entity.trial_ends_at,
            trial_active: is_trial_active(entity.trial_ends_at, now),
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccessUserDto {
    pub user_id: String,
    pub email: Option<String>,
    pub email_verified: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeAccessDto {
    pub ok: bool,
    pub plan: Plan,
    pub is_admin: bool,
    pub user: AccessUserDto,
    pub entitlements: Entitlements,
}

/// Deal-analyze meter shown in the header. Disabled for signed-out and free users.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageMeterDto {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count_today: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_limit: Option<Option<i32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<Option<i32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pct_used: Option<i32>,
}

impl UsageMeterDto {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            count_today: None,
            daily_limit: None,
            remaining: None,
            pct_used: None,
        }
    }

    pub fn enabled(count_today: i32, daily_limit: Option<i32>) -> Self {
        let remaining = daily_limit.map(|limit| (limit - count_today).max(0));
        let pct_used = match daily_limit {
            Some(limit) if limit > 0 => {
                ((count_today as f64 / limit as f64) * 100.0).round().min(100.0) as i32
            }
            _ => 0,
        };

        Self {
            enabled: true,
            count_today: Some(count_today),
            daily_limit: Some(daily_limit),
            remaining: Some(remaining),
            pct_used: Some(pct_used),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn access(plan: Plan, trial_ends_at: Option<DateTime<Utc>>) -> UserAccessEntity {
        let mut entity = UserAccessEntity::free("user_1");
        entity.plan = plan.to_string();
        entity.trial_ends_at = trial_ends_at;
        entity
    }

    #[test]
    fn trial_is_active_only_in_the_future() {
        let now = Utc::now();
        assert!(is_trial_active(Some(now + Duration::hours(1)), now));
        assert!(!is_trial_active(Some(now - Duration::seconds(1)), now));
        assert!(!is_trial_active(None, now));
    }

    #[test]
    fn active_trial_satisfies_pro_but_not_pro_plus() {
        let now = Utc::now();
        let entity = access(Plan::Free, Some(now + Duration::days(2)));

        assert!(has_plan(&entity, Plan::Pro, now));
        assert!(!has_plan(&entity, Plan::ProPlus, now));
    }

    #[test]
    fn pro_plus_satisfies_every_tier() {
        let now = Utc::now();
        let entity = access(Plan::ProPlus, None);

        assert!(has_plan(&entity, Plan::Free, now));
        assert!(has_plan(&entity, Plan::Pro, now));
        assert!(has_plan(&entity, Plan::ProPlus, now));
    }

    #[test]
    fn usage_meter_caps_percentage() {
        let meter = UsageMeterDto::enabled(5, Some(3));
        assert_eq!(meter.remaining, Some(Some(0)));
        assert_eq!(meter.pct_used, Some(100));

        let json = serde_json::to_value(UsageMeterDto::enabled(1, None)).unwrap();
        assert_eq!(json["dailyLimit"], serde_json::Value::Null);
        assert_eq!(json["pctUsed"], 0);
    }

    #[test]
    fn disabled_meter_only_reports_flag() {
        let json = serde_json::to_value(UsageMeterDto::disabled()).unwrap();
        assert_eq!(json, serde_json::json!({ "enabled": false }));
    }
}
