use super::stage::Stage;

#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub stage: Stage,
    pub backend_server: BackendServer,
    pub database: Database,
    pub auth: Auth,
    pub stripe: Stripe,
    pub openai: OpenAi,
    pub app: App,
    pub benchmarks: Benchmarks,
}

#[derive(Debug, Clone)]
pub struct BackendServer {
    pub port: u16,
    /// MiB
    pub body_limit: u64,
    /// Seconds
    pub timeout: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
    pub max_connections: u32,
}

/// Session token verification. A PEM public key (RS256) wins over the shared secret (HS256).
#[derive(Debug, Clone)]
pub struct Auth {
    pub jwt_public_key: Option<String>,
    pub jwt_secret: Option<String>,
    pub issuer: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Stripe {
    pub secret_key: String,
    pub webhook_secret: String,
    pub price_pro: String,
    pub price_pro_plus: String,
    pub trial_days: u32,
}

#[derive(Debug, Clone)]
pub struct OpenAi {
    pub api_key: Option<String>,
    pub memo_model: String,
    pub scoring_model: String,
}

#[derive(Debug, Clone)]
pub struct App {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct Benchmarks {
    pub data_dir: String,
}
