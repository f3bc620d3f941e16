use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::domain::value_objects::enums::{features::Feature, plans::Plan};

/// Capabilities derived from a plan tier and the admin flag.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Entitlements {
    pub can_use_cim_analyzer: bool,
    pub can_use_deal_calculator: bool,
    pub can_analyze_deal: bool,
    #[serde(rename = "canUse5YearProjection")]
    pub can_use_5_year_projection: bool,
    pub can_save_deals: bool,
    pub is_free: bool,
    pub is_pro: bool,
    pub is_pro_plus: bool,
    pub is_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limits: Option<EntitlementLimits>,
}

impl Entitlements {
    /// Pro, Pro+ and admins count as subscribed.
    pub fn is_subscribed(&self) -> bool {
        self.is_pro || self.is_pro_plus || self.is_admin
    }

    pub fn with_limits(mut self, limits: EntitlementLimits) -> Self {
        self.limits = Some(limits);
        self
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementLimits {
    pub cim_analyzer: UsageLimit,
    pub deal_analyze: UsageLimit,
}

/// Daily meter for one feature. `None` limits mean unlimited.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UsageLimit {
    pub daily_limit: Option<i32>,
    pub used_today: i32,
    pub remaining: Option<i32>,
    pub resets_at: String,
}

impl UsageLimit {
    pub fn new(daily_limit: Option<i32>, used_today: i32, now: DateTime<Utc>) -> Self {
        Self {
            daily_limit,
            used_today,
            remaining: daily_limit.map(|limit| (limit - used_today).max(0)),
            resets_at: next_reset_utc(now).to_rfc3339(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.daily_limit, Some(limit) if self.used_today >= limit)
    }
}

pub fn get_entitlements(plan: Plan, is_admin: bool) -> Entitlements {
    if is_admin {
        return Entitlements {
            can_use_cim_analyzer: true,
            can_use_deal_calculator: true,
            can_analyze_deal: true,
            can_use_5_year_projection: true,
            can_save_deals: true,
            is_free: false,
            is_pro: true,
            is_pro_plus: true,
            is_admin: true,
            limits: None,
        };
    }

    let is_pro = plan == Plan::Pro;
    let is_pro_plus = plan == Plan::ProPlus;
    let paid = is_pro || is_pro_plus;

    Entitlements {
        can_use_cim_analyzer: paid,
        can_use_deal_calculator: paid,
        can_analyze_deal: paid,
        can_use_5_year_projection: is_pro_plus,
        can_save_deals: paid,
        is_free: plan == Plan::Free,
        is_pro,
        is_pro_plus,
        is_admin: false,
        limits: None,
    }
}

/// Per-day quota for a feature. `None` means unlimited.
pub fn daily_limit_for(plan: Plan, is_admin: bool, feature: Feature) -> Option<i32> {
    if is_admin {
        return None;
    }

    match (plan, feature) {
        (Plan::ProPlus, Feature::CimAnalyzer) => Some(10),
        (Plan::ProPlus, Feature::DealAnalyze) => None,
        (Plan::Pro, _) => Some(3),
        (Plan::Free, _) => Some(0),
    }
}

/// Usage counters roll over at UTC midnight.
pub fn usage_day(now: DateTime<Utc>) -> NaiveDate {
    now.date_naive()
}

pub fn next_reset_utc(now: DateTime<Utc>) -> DateTime<Utc> {
    let midnight = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(now);
    midnight + Duration::days(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn admin_gets_everything() {
        let ent = get_entitlements(Plan::Free, true);
        assert!(ent.can_use_5_year_projection);
        assert!(ent.is_pro && ent.is_pro_plus && ent.is_admin);
        assert!(!ent.is_free);
    }

    #[test]
    fn pro_cannot_use_projection() {
        let ent = get_entitlements(Plan::Pro, false);
        assert!(ent.can_use_cim_analyzer);
        assert!(ent.can_save_deals);
        assert!(!ent.can_use_5_year_projection);
        assert!(ent.is_subscribed());
    }

    #[test]
    fn free_has_no_paid_features() {
        let ent = get_entitlements(Plan::Free, false);
        assert!(ent.is_free);
        assert!(!ent.can_use_deal_calculator);
        assert!(!ent.is_subscribed());
    }

    #[test]
    fn daily_limits_follow_plan_and_feature() {
        assert_eq!(daily_limit_for(Plan::ProPlus, false, Feature::CimAnalyzer), Some(10));
        assert_eq!(daily_limit_for(Plan::ProPlus, false, Feature::DealAnalyze), None);
        assert_eq!(daily_limit_for(Plan::Pro, false, Feature::DealAnalyze), Some(3));
        assert_eq!(daily_limit_for(Plan::Free, false, Feature::CimAnalyzer), Some(0));
        assert_eq!(daily_limit_for(Plan::Free, true, Feature::CimAnalyzer), None);
    }

    #[test]
    fn usage_limit_clamps_remaining_and_resets_next_midnight() {
        let now = Utc.with_ymd_and_hms(2025, 3, 9, 17, 45, 0).unwrap();
        let limit = UsageLimit::new(Some(3), 5, now);

        assert_eq!(limit.remaining, Some(0));
        assert!(limit.is_exhausted());
        assert_eq!(limit.resets_at, "2025-03-10T00:00:00+00:00");
    }

    #[test]
    fn unlimited_meter_is_never_exhausted() {
        let now = Utc::now();
        let limit = UsageLimit::new(None, 250, now);
        assert_eq!(limit.remaining, None);
        assert!(!limit.is_exhausted());
    }

    #[test]
    fn serializes_projection_flag_name() {
        let json = serde_json::to_value(get_entitlements(Plan::ProPlus, false)).unwrap();
        assert_eq!(json["canUse5YearProjection"], true);
        assert!(json.get("limits").is_none());
    }
}
