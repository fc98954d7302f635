use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use shoptalk_api::router::MessageRouter;
use shoptalk_api::{AppState, AppStateInner, businesses, messages, users};
use shoptalk_gateway::{ConnectionRegistry, connection};
use shoptalk_intelligence::IntelligenceGateway;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shoptalk=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let db_path = std::env::var("SHOPTALK_DB_PATH").unwrap_or_else(|_| "shoptalk.db".into());
    let host = std::env::var("SHOPTALK_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("SHOPTALK_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Storage, live-connection table, model gateway, write path
    let store = Arc::new(shoptalk_db::Database::open(&PathBuf::from(&db_path))?);
    let registry = ConnectionRegistry::new();
    let intelligence = Arc::new(IntelligenceGateway::from_env()?);
    let router = MessageRouter::new(store.clone(), registry.clone(), intelligence.clone());

    let state: AppState = Arc::new(AppStateInner {
        store,
        registry,
        intelligence,
        router,
    });

    // Routes
    let api_routes = Router::new()
        .route("/api/users", post(users::create_user))
        .route("/api/users/{id}", get(users::get_user))
        .route("/api/businesses", post(businesses::create_business))
        .route("/api/businesses/search", get(businesses::search_businesses))
        .route("/api/messages", post(messages::send_message))
        .route("/api/messages/ai", post(messages::assistant_turn))
        .route(
            "/api/messages/ai/{user_id}",
            get(messages::get_assistant_conversation),
        )
        .route("/api/messages/{a}/{b}", get(messages::get_conversation))
        .route("/ws", get(ws_upgrade))
        .with_state(state);

    let app = Router::new()
        .route("/health", get(health))
        .merge(api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Shoptalk server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> impl IntoResponse {
    axum::Json(serde_json::json!({"status": "ok"}))
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let registry = state.registry.clone();
    ws.on_upgrade(move |socket| connection::handle_socket(socket, registry))
}
