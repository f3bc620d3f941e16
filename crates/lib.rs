pub mod domain;
pub mod infra;
pub mod llm;
pub mod observability;
pub mod payments;
pub mod underwriting;
