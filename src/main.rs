use std::{sync::Arc, time::Duration};

use tracing::info;
use weather_mcp_server::{
    build_app,
    config::Config,
    domain::tools::build_dispatcher,
    logging,
    session::SessionRegistry,
    weather_client::{OpenWeatherClient, WeatherProvider},
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let provider = Arc::new(OpenWeatherClient::new(
        config.openweather_base_url.clone(),
        config.openweather_api_key.clone(),
        config.upstream_timeout,
    )?);
    if !provider.is_configured() {
        tracing::warn!("OPENWEATHER_API_KEY is not set, weather tools will report errors");
    }

    let dispatcher = build_dispatcher(provider)?;
    let registry = Arc::new(SessionRegistry::new(config.event_buffer_size));
    let state = AppState::new(
        Arc::clone(&registry),
        Arc::new(dispatcher),
        config.sse_keep_alive,
        config.weather_api_configured(),
    );

    let bind_socket = config.bind_socket()?;
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(bind_socket).await?;

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        "server starting"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(registry, config.shutdown_grace))
        .await?;

    info!("server stopped");
    Ok(())
}

/// Resolves once SIGINT or SIGTERM arrives and every session has been closed.
async fn shutdown_signal(registry: Arc<SessionRegistry>, grace: Duration) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!(grace_secs = grace.as_secs(), "shutdown requested, closing sessions");
    registry.shutdown(grace).await;
}
