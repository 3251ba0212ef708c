mod rate_limit;
mod routes;
mod services;
mod state;

use tracing_subscriber::EnvFilter;

const DEFAULT_PORT: u16 = 3000;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let dotenv = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    if let Err(e) = dotenv {
        tracing::debug!(error = %e, "no .env loaded");
    }

    let port = match std::env::var("PORT") {
        Ok(raw) => raw.parse().unwrap_or_else(|e| {
            tracing::warn!(value = %raw, error = %e, default = DEFAULT_PORT, "invalid PORT; using default");
            DEFAULT_PORT
        }),
        Err(_) => DEFAULT_PORT,
    };

    let limits = rate_limit::RateLimitConfig::from_env();
    tracing::info!(
        per_client = limits.per_client_limit,
        per_client_window_secs = limits.per_client_window.as_secs(),
        global = limits.global_limit,
        global_window_secs = limits.global_window.as_secs(),
        "broadcast rate limits"
    );
    let state = state::AppState::new(rate_limit::RateLimiter::new(limits));

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;

    tracing::info!(%port, "office relay listening");
    axum::serve(listener, app).await
}
