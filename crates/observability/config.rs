use std::env;

#[derive(Clone)]
pub(crate) struct ServiceContext {
    pub(crate) service_name: String,
    pub(crate) environment: String,
    pub(crate) component: String,
}

#[derive(Clone)]
pub(crate) struct ObservabilityConfig {
    pub(crate) service_context: ServiceContext,
    /// Used when `RUST_LOG` is unset.
    pub(crate) default_filter: String,
    pub(crate) with_target: bool,
}

impl ObservabilityConfig {
    pub(crate) fn from_env(component: &str) -> Self {
        let component = component.trim().to_string();

        let service_name = env_string("SERVICE_NAME").unwrap_or_else(|| component.clone());
        let environment = env_string("STAGE").unwrap_or_else(|| "unknown".to_string());

        let default_filter = env_string("LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        let with_target = env_bool("LOG_WITH_TARGET").unwrap_or(true);

        Self {
            service_context: ServiceContext {
                service_name,
                environment,
                component,
            },
            default_filter,
            with_target,
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_bool(key: &str) -> Option<bool> {
    let raw = env::var(key).ok()?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_component_name_and_info() {
        unsafe {
            env::remove_var("SERVICE_NAME");
            env::remove_var("LOG_LEVEL");
        }

        let config = ObservabilityConfig::from_env("  backend ");
        assert_eq!(config.service_context.service_name, "backend");
        assert_eq!(config.service_context.component, "backend");
        assert_eq!(config.default_filter, "info");
    }

    #[test]
    fn env_bool_accepts_common_spellings() {
        unsafe {
            env::set_var("OBS_TEST_FLAG", "Yes");
        }
        assert_eq!(env_bool("OBS_TEST_FLAG"), Some(true));
        unsafe {
            env::set_var("OBS_TEST_FLAG", "off");
        }
        assert_eq!(env_bool("OBS_TEST_FLAG"), Some(false));
        unsafe {
            env::remove_var("OBS_TEST_FLAG");
        }
    }
}
