//! Backend of the Golden Ticket raffle.
//!
//! Users sign in with Firebase in the browser, buy numbered tickets with
//! in-app credits, and wait for the draw. This server owns every balance and
//! ticket; the browser only renders what it is told.
//!
//!
//!
//! # General Infrastructure
//! - Browser client talks to this server over JSON with a Firebase ID token
//! - Server verifies the token with Firebase, then reads/writes Redis
//! - Draw resolution is a separate job: it flips ticket statuses, archives them,
//!   and publishes winners, winning numbers and draw records. Nothing here
//!   decides a winner
//! - Prize and next draw documents are written by admin tooling
//!
//!
//!
//! # Purchases
//!
//! **Goal**: no user ever holds more than 2 pending tickets, no balance goes
//! negative, and the stats always add up to the tickets sold, under any number
//! of concurrent requests.
//!
//! - Price comes from the prize document, never from the request
//! - A cheap pre-check rejects obvious failures early, but decides nothing
//! - The decision is made again inside a store transaction over fresh reads
//! - Debit, ticket and stats are written together or not at all
//!
//! See [`tickets`] for the flow and [`database`] for how Redis runs it.
//!
//!
//!
//! # Endpoints
//!
//! | Method | Path | |
//! |---|---|---|
//! | GET | `/api/game-data` | balance, tickets, prize, draw, stats, winners flag |
//! | POST | `/api/buy-ticket`, `/api/purchase-ticket` | buy one ticket |
//! | POST | `/api/add-credits` | direct top-up |
//! | POST | `/api/redeem-code` | recharge card top-up |
//! | POST | `/api/register` | first sign-in, welcome credits |
//! | POST | `/api/complete-profile` | shipping details for winners |
//! | GET | `/api/history` | archived tickets |
//! | GET | `/api/results` | winners, winning numbers, prize, next draw |
//! | GET | `/api/draws` | completed draws, newest first |
//! | GET | `/test-firebase` | store probe, no auth |
//!
//!
//!
//! # Setup
//!
//! Run locally without Redis.
//! ```sh
//! STORE_BACKEND=memory FIREBASE_API_KEY=... cargo run
//! ```
//!
//! Log more.
//! ```sh
//! RUST_LOG=server=debug,tower_http=debug cargo run --features verbose
//! ```
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::{
    Router,
    http::{
        HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post},
};
use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

pub mod accounts;
pub mod auth;
pub mod config;
pub mod credits;
pub mod database;
pub mod error;
pub mod game;
pub mod memory;
pub mod models;
pub mod results;
pub mod routes;
pub mod state;
pub mod store;
pub mod tickets;
pub mod utils;

use auth::{FirebaseVerifier, Verifier};
use config::{Config, StoreBackend};
use database::RedisStore;
use memory::MemoryStore;
use routes::{
    add_credits_handler, buy_ticket_handler, complete_profile_handler, draws_handler,
    game_data_handler, history_handler, probe_handler, redeem_code_handler, register_handler,
    results_handler,
};
use state::State;
use store::Store;

pub async fn start_server() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Loading config...");
    let config = Config::load()?;
    let verifier = FirebaseVerifier::new(config.firebase_api_key.clone());

    match config.store_backend {
        StoreBackend::Redis => {
            info!("Connecting to Redis at {}", config.redis_url);
            let store = RedisStore::connect(&config.redis_url)
                .await
                .context("Redis unreachable")?;

            serve(State::new(config, store, verifier)).await
        }
        StoreBackend::Memory => {
            warn!("Using in-process store, data is lost on restart");

            serve(State::new(config, MemoryStore::new(), verifier)).await
        }
    }
}

pub fn app<S: Store, V: Verifier>(state: Arc<State<S, V>>) -> Router {
    Router::new()
        .route("/api/game-data", get(game_data_handler::<S, V>))
        .route("/api/buy-ticket", post(buy_ticket_handler::<S, V>))
        .route("/api/purchase-ticket", post(buy_ticket_handler::<S, V>))
        .route("/api/add-credits", post(add_credits_handler::<S, V>))
        .route("/api/redeem-code", post(redeem_code_handler::<S, V>))
        .route("/api/register", post(register_handler::<S, V>))
        .route("/api/complete-profile", post(complete_profile_handler::<S, V>))
        .route("/api/history", get(history_handler::<S, V>))
        .route("/api/results", get(results_handler::<S, V>))
        .route("/api/draws", get(draws_handler::<S, V>))
        .route("/test-firebase", get(probe_handler::<S, V>))
        .layer(cors(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|e| warn!("Ignoring invalid origin {origin}: {e}"))
                .ok()
        })
        .collect();

    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

async fn serve<S: Store, V: Verifier>(state: Arc<State<S, V>>) -> Result<()> {
    info!("Starting server...");

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!("Server running on {address}");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
