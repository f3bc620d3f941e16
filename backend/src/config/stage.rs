use std::fmt::Display;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Stage {
    #[default]
    Local,
    Development,
    Production,
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stage = match self {
            Stage::Local => "local",
            Stage::Development => "dev",
            Stage::Production => "prod",
        };
        write!(f, "{}", stage)
    }
}

impl TryFrom<&str> for Stage {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Stage::Local),
            "dev" | "development" => Ok(Stage::Development),
            "prod" | "production" => Ok(Stage::Production),
            other => Err(anyhow::anyhow!("unknown stage: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stage_aliases() {
        assert_eq!(Stage::try_from("PROD").unwrap(), Stage::Production);
        assert_eq!(Stage::try_from("development").unwrap(), Stage::Development);
        assert!(Stage::try_from("staging").is_err());
    }
}
