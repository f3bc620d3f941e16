use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    #[default]
    Free,
    Pro,
    ProPlus,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Pro => "pro",
            Plan::ProPlus => "pro_plus",
        }
    }

    /// Unknown values fall back to the free tier.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "pro" => Plan::Pro,
            "pro_plus" | "proplus" | "pro-plus" => Plan::ProPlus,
            _ => Plan::Free,
        }
    }

    pub fn is_paid(&self) -> bool {
        !matches!(self, Plan::Free)
    }
}

impl Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
