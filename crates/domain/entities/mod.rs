pub mod deals;
pub mod feature_usage;
pub mod user_access;
