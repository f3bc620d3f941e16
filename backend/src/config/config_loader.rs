use anyhow::{Context, Result, anyhow};

use super::{
    config_model::{
        App, Auth, BackendServer, Benchmarks, Database, DotEnvyConfig, OpenAi, Stripe,
    },
    stage::Stage,
};

const DEFAULT_APP_URL: &str = "http://localhost:3000";
const DEFAULT_MEMO_MODEL: &str = "gpt-4.1-mini";
const DEFAULT_SCORING_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TRIAL_DAYS: u32 = 3;

fn required(key: &str) -> Result<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| anyhow!("{key} is required"))
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parsed_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional(key) {
        Some(raw) => raw.parse().with_context(|| format!("{key} is invalid")),
        None => Ok(default),
    }
}

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let backend_server = BackendServer {
        port: parsed_or("SERVER_PORT_BACKEND", 8080)?,
        body_limit: parsed_or("SERVER_BODY_LIMIT", 10)?,
        timeout: parsed_or("SERVER_TIMEOUT", 120)?,
    };

    let database = Database {
        url: required("DATABASE_URL")?,
        max_connections: parsed_or("DATABASE_MAX_CONNECTIONS", 10)?,
    };

    let auth = Auth {
        // Env files cannot hold raw newlines, so `\n` escapes are expanded.
        jwt_public_key: optional("AUTH_JWT_PUBLIC_KEY").map(|pem| pem.replace("\\n", "\n")),
        jwt_secret: optional("AUTH_JWT_SECRET"),
        issuer: optional("AUTH_JWT_ISSUER"),
    };
    if auth.jwt_public_key.is_none() && auth.jwt_secret.is_none() {
        return Err(anyhow!(
            "AUTH_JWT_PUBLIC_KEY or AUTH_JWT_SECRET is required"
        ));
    }

    let stripe = Stripe {
        secret_key: required("STRIPE_SECRET_KEY")?,
        webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
        price_pro: required("STRIPE_PRICE_PRO")?,
        price_pro_plus: required("STRIPE_PRICE_PRO_PLUS")?,
        trial_days: parsed_or("STRIPE_TRIAL_DAYS", DEFAULT_TRIAL_DAYS)?,
    };

    let openai = OpenAi {
        api_key: optional("OPENAI_API_KEY"),
        memo_model: optional("OPENAI_MEMO_MODEL").unwrap_or_else(|| DEFAULT_MEMO_MODEL.to_string()),
        scoring_model: optional("OPENAI_SCORING_MODEL")
            .unwrap_or_else(|| DEFAULT_SCORING_MODEL.to_string()),
    };

    let app = App {
        url: optional("APP_URL")
            .unwrap_or_else(|| DEFAULT_APP_URL.to_string())
            .trim_end_matches('/')
            .to_string(),
    };

    let benchmarks = Benchmarks {
        data_dir: optional("BENCHMARK_DATA_DIR").unwrap_or_else(|| "data".to_string()),
    };

    Ok(DotEnvyConfig {
        stage: get_stage(),
        backend_server,
        database,
        auth,
        stripe,
        openai,
        app,
        benchmarks,
    })
}

pub fn get_stage() -> Stage {
    dotenvy::dotenv().ok();

    let stage_str = std::env::var("STAGE").unwrap_or_default();
    Stage::try_from(stage_str.as_str()).unwrap_or_default()
}
