use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Result;
use axum::{
    Extension, Router,
    extract::DefaultBodyLimit,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::get,
};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use underwrite_core::{
    infra::db::postgres::postgres_connection::PgPoolSquad,
    llm::openai_client::OpenAiClient,
    payments::stripe_client::StripeClient,
};

use crate::{
    auth::JwtVerifier,
    axum_http::{default_routers, routers},
    config::config_model::DotEnvyConfig,
    usecases::{billing::BillingSettings, billing_state::PriceBook},
};

fn api_routes(config: &DotEnvyConfig, db_pool: Arc<PgPoolSquad>) -> Router {
    let stripe = Arc::new(StripeClient::new(
        config.stripe.secret_key.clone(),
        config.stripe.webhook_secret.clone(),
        format!("{}/billing/success", config.app.url),
        format!("{}/pricing", config.app.url),
    ));
    let billing_settings = BillingSettings {
        prices: PriceBook {
            pro: config.stripe.price_pro.clone(),
            pro_plus: config.stripe.price_pro_plus.clone(),
        },
        trial_days: config.stripe.trial_days,
        app_url: config.app.url.clone(),
    };

    let llm = match config.openai.api_key.clone() {
        Some(api_key) => Some(Arc::new(OpenAiClient::new(
            api_key,
            config.openai.memo_model.clone(),
            config.openai.scoring_model.clone(),
        ))),
        None => {
            warn!("OPENAI_API_KEY is not set, AI endpoints will answer 500");
            None
        }
    };

    Router::new()
        .merge(routers::access::routes(Arc::clone(&db_pool)))
        .merge(routers::deals::routes(Arc::clone(&db_pool)))
        .merge(routers::deal_calculator::routes(
            Arc::clone(&db_pool),
            llm.clone(),
        ))
        .merge(routers::cim::routes(Arc::clone(&db_pool), llm))
        .merge(routers::benchmarks::routes(
            Arc::clone(&db_pool),
            &config.benchmarks.data_dir,
        ))
        .merge(routers::billing::routes(
            Arc::clone(&db_pool),
            stripe,
            billing_settings,
        ))
        .route("/health-check", get(default_routers::health_check))
}

pub async fn start(config: Arc<DotEnvyConfig>, db_pool: Arc<PgPoolSquad>) -> Result<()> {
    let verifier = Arc::new(JwtVerifier::from_config(&config.auth)?);
    let body_limit: usize = (config.backend_server.body_limit * 1024 * 1024).try_into()?;

    let app = Router::new()
        .fallback(default_routers::not_found)
        .nest("/api", api_routes(&config, Arc::clone(&db_pool)))
        .layer(Extension(verifier))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.backend_server.timeout,
        )))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST, Method::DELETE])
                .allow_headers([AUTHORIZATION, CONTENT_TYPE])
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.backend_server.port));
    let listener = TcpListener::bind(addr).await?;

    info!(stage = %config.stage, "Server is running on port {}", config.backend_server.port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to install CTRL+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}
