use std::sync::Arc;

use {
    axum::{
        Router,
        http::{
            HeaderName, HeaderValue, Method,
            header::{AUTHORIZATION, CONTENT_TYPE},
        },
    },
    tokio::{net::TcpListener, sync::watch},
    tower::ServiceBuilder,
    tower_http::{
        cors::{AllowOrigin, CorsLayer},
        sensitive_headers::SetSensitiveRequestHeadersLayer,
        trace::TraceLayer,
    },
    tracing::{info, warn},
};

use {
    idgate_auth::{CredentialEngine, SERVICE_KEY_HEADER, SqliteUserStore, TrustGate},
    idgate_config::IdgateConfig,
};

use crate::{
    backend_routes::backend_router,
    state::{AppState, BackendState},
    user_routes::user_router,
};

// ── Router construction ──────────────────────────────────────────────────────

/// Build the end-user router (shared between production startup and tests).
pub fn build_user_app(state: AppState, allowed_origins: &[String]) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(parse_origins(allowed_origins)))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    Router::new()
        .nest("/api/v1", user_router(state.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(sensitive_headers())
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Build the backend router. No CORS: callers are services, not browsers.
pub fn build_backend_app(state: BackendState) -> Router {
    Router::new()
        .nest("/v1/auth", backend_router(&state))
        .layer(
            ServiceBuilder::new()
                .layer(sensitive_headers())
                .layer(TraceLayer::new_for_http()),
        )
        .with_state(state)
}

fn sensitive_headers() -> SetSensitiveRequestHeadersLayer {
    SetSensitiveRequestHeadersLayer::new([AUTHORIZATION, HeaderName::from_static(SERVICE_KEY_HEADER)])
}

fn parse_origins(origins: &[String]) -> Vec<HeaderValue> {
    origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin, "ignoring invalid CORS origin");
                None
            },
        })
        .collect()
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Open the store, wire the engine and serve both surfaces until Ctrl-C.
pub async fn start(config: IdgateConfig) -> anyhow::Result<()> {
    let pool = idgate_auth::connect(&config.database.url, config.database.max_connections).await?;
    let store = Arc::new(SqliteUserStore::new(pool).await?);
    let engine = Arc::new(CredentialEngine::from_config(store, &config)?);
    info!(
        ttl_secs = engine.codec().ttl().as_secs(),
        database = %config.database.url,
        "credential engine ready"
    );

    // Refuse to start with an unconfigured trust gate before binding anything.
    let gate = if config.backend.enabled {
        Some(Arc::new(TrustGate::from_config(&config.trust)?))
    } else {
        None
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let user_app = build_user_app(
        AppState::new(Arc::clone(&engine)),
        &config.cors.allowed_origins,
    );
    let user_listener = TcpListener::bind((config.server.bind.as_str(), config.server.port)).await?;
    info!(addr = %user_listener.local_addr()?, "user surface listening");
    let user_server = serve(user_listener, user_app, shutdown_rx.clone());

    let Some(gate) = gate else {
        info!("backend surface disabled");
        return user_server.await;
    };

    let backend_app = build_backend_app(BackendState { engine, gate });
    let backend_listener =
        TcpListener::bind((config.backend.bind.as_str(), config.backend.port)).await?;
    info!(addr = %backend_listener.local_addr()?, "backend surface listening");
    let backend_server = serve(backend_listener, backend_app, shutdown_rx);

    tokio::try_join!(user_server, backend_server)?;
    info!("servers stopped");
    Ok(())
}

async fn serve(listener: TcpListener, app: Router, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn invalid_origins_are_dropped() {
        let parsed = parse_origins(&["http://localhost:5173".into(), "bad\norigin".into()]);
        assert_eq!(parsed, vec![HeaderValue::from_static("http://localhost:5173")]);
    }
}
