pub mod features;
pub mod plans;
pub mod subscription_statuses;
