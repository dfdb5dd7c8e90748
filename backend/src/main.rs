//! Bamboo Forest Backend
//!
//! REST backend for the small-business owners' community: decision polls,
//! member profiles with points and badges, and the mini-games.

mod api;
mod auth;
mod badges;
mod config;
mod db;
mod errors;
mod games;
mod models;
mod sessions;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::Repository;
use sessions::PuzzleSessions;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub puzzles: Arc<PuzzleSessions>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if config.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting Bamboo Forest Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    // Warn if PSKs are not configured
    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (BAMBOO_API_PSK). Authentication is disabled!");
    }
    if config.admin_psk.is_none() {
        tracing::warn!("No admin PSK configured (BAMBOO_ADMIN_PSK). Verification endpoint is disabled");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    // Create application state
    let state = AppState {
        repo,
        puzzles: Arc::new(PuzzleSessions::new()),
        config: Arc::new(config.clone()),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone PSK for the auth layer
    let psk = state.config.api_psk.clone();

    // API routes
    let api_routes = Router::new()
        // Profiles
        .route(
            "/profile",
            get(api::get_my_profile).put(api::update_my_profile),
        )
        .route("/users/{id}", get(api::get_user_profile))
        .route("/users/{id}/verification", put(api::set_user_verification))
        .route("/badges", get(api::list_badges))
        // Polls
        .route("/polls", get(api::list_polls).post(api::create_poll))
        .route("/polls/{id}", get(api::get_poll))
        .route("/polls/{id}/vote", post(api::vote_poll))
        .route("/polls/{id}/close", post(api::close_poll))
        // Lucky box
        .route("/games/box", get(api::get_box))
        .route("/games/box/open", post(api::open_box))
        .route("/games/box/open-ten", post(api::open_ten_boxes))
        // Store
        .route("/games/store", get(api::get_store))
        .route("/games/store/tick", post(api::tick_store))
        .route("/games/store/upgrades/{id}", post(api::purchase_upgrade))
        // Puzzle
        .route("/games/puzzle/sessions", post(api::start_puzzle))
        .route("/games/puzzle/sessions/{id}", get(api::get_puzzle))
        .route(
            "/games/puzzle/sessions/{id}/inputs",
            post(api::apply_puzzle_inputs),
        )
        .route("/games/puzzle/leaderboard", get(api::puzzle_leaderboard))
        // Apply PSK auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
