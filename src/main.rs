use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use eats_tracker::gateway::session;
use eats_tracker::state::{AccountContext, register_account};
use eats_tracker::{api, config, error, state};

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    let config = config::Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let bootstrap = config.bootstrap.clone();
    let http_port = config.http_port;
    let shared_state = Arc::new(state::AppState::new(config)?);

    if let Some(bootstrap) = bootstrap {
        match session::validate_cookie(&bootstrap.cookie) {
            Ok(tokens) => {
                let context = register_account(
                    &shared_state,
                    AccountContext::new(bootstrap.account_name, bootstrap.time_zone, tokens),
                );
                info!(account_id = %context.id, "bootstrap account registered");
            }
            Err(err) => {
                warn!(error = %err, "bootstrap cookie rejected; register an account via the api");
            }
        }
    }

    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{http_port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| error::AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    info!(http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| error::AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
