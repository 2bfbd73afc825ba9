mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::{
        HeaderMap, HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use ecotrack_api::mail::Mailer;
use ecotrack_api::middleware::request_token;
use ecotrack_api::{AppState, AppStateInner};
use ecotrack_db::Database;
use ecotrack_gateway::connection;
use ecotrack_gateway::dispatcher::Dispatcher;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "ecotrack=debug,ecotrack_api=debug,ecotrack_gateway=debug,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);
    info!("Database ready at {}", config.db_path.display());

    if let Some(email) = &config.admin_email {
        let email = email.to_lowercase();
        if db.set_admin_by_email(&email, true)? {
            info!("Granted admin to {}", email);
        } else {
            warn!("ECOTRACK_ADMIN_EMAIL {} does not match any user yet", email);
        }
    }

    let mailer = match &config.mail_endpoint {
        Some(endpoint) => {
            info!("Sending mail through {}", endpoint);
            Mailer::http(endpoint.clone(), config.mail_api_key.clone(), config.mail_from.clone())
        }
        None => {
            warn!("ECOTRACK_MAIL_ENDPOINT not set, outgoing mail is only logged");
            Mailer::Disabled
        }
    };

    // Shared state
    let app_state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        token_ttl_days: config.token_ttl_days,
        cookie_secure: config.cookie_secure,
        frontend_url: config.frontend_url.clone(),
        mailer,
        dispatcher: Dispatcher::new(),
    });

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(app_state.clone());

    // Credentialed CORS needs an explicit origin
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_str(&config.frontend_url)?)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    let app = Router::new()
        .merge(ecotrack_api::router(app_state))
        .merge(ws_route)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("EcoTrack server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: Option<String>,
}

/// The token may come from `?token=` (browsers cannot set headers on a
/// WebSocket), the Authorization header, or the auth cookie.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let token = query
        .token
        .filter(|token| !token.is_empty())
        .or_else(|| request_token(&headers));
    let auth = connection::authenticate(&state.db, &state.jwt_secret, token.as_deref()).await;

    let dispatcher = state.dispatcher.clone();
    let db = state.db.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, db, auth))
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
