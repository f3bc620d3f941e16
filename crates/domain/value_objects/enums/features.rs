use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Metered features with a per-day usage counter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Feature {
    #[serde(rename = "cimAnalyzer")]
    CimAnalyzer,
    #[serde(rename = "dealAnalyze")]
    DealAnalyze,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::CimAnalyzer => "cimAnalyzer",
            Feature::DealAnalyze => "dealAnalyze",
        }
    }
}

impl Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
