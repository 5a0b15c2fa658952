//! # HTTP API
//!
//! JSON over axum. Every route except `/health` passes through [`guard`],
//! which applies the global rate limit and, when configured, the bearer
//! api key.

pub mod error;
mod handlers;

pub use error::ApiError;

use crate::config::ServerConfig;
use crate::error::{AppError, AppResult};
use axum::Router;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use chrono::NaiveDateTime;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use labres_core::{RedbStore, Session};
use std::num::NonZeroU32;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub type SharedSession = Arc<RwLock<Session<RedbStore>>>;

/// Wall clock used for every "now" the handlers need.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    pub session: SharedSession,
    clock: Clock,
    api_key: Option<Arc<str>>,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl AppState {
    pub fn new(session: SharedSession, server: &ServerConfig) -> AppResult<Self> {
        let per_second = NonZeroU32::new(server.rate_limit_per_second)
            .ok_or_else(|| AppError::config("rate_limit_per_second must be greater than 0"))?;
        let burst = NonZeroU32::new(server.rate_limit_burst)
            .ok_or_else(|| AppError::config("rate_limit_burst must be greater than 0"))?;
        let quota = Quota::per_second(per_second).allow_burst(burst);
        Ok(Self {
            session,
            clock: Arc::new(|| chrono::Local::now().naive_local()),
            api_key: server.api_key.as_deref().map(Arc::from),
            limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    #[must_use]
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn now(&self) -> NaiveDateTime {
        (self.clock)()
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/calendar/hours", get(handlers::work_hours))
        .route("/calendar/end-time", get(handlers::end_time))
        .route("/calendar/period", get(handlers::period))
        .route("/calendar/holidays/{year}", get(handlers::holidays))
        .route(
            "/equipment",
            get(handlers::list_equipment).post(handlers::register_equipment),
        )
        .route("/equipment/{id}", get(handlers::get_equipment))
        .route("/equipment/{id}/borrows", get(handlers::equipment_borrows))
        .route("/equipment/{id}/window", get(handlers::allowed_window))
        .route("/borrows", post(handlers::apply_borrow))
        .route(
            "/borrows/{id}",
            get(handlers::get_borrow).delete(handlers::cancel_borrow),
        )
        .route("/borrows/{id}/schedule", put(handlers::reschedule))
        .route("/borrows/{id}/approve", post(handlers::approve))
        .route("/borrows/{id}/reject", post(handlers::reject))
        .route("/borrows/{id}/check-out", post(handlers::check_out))
        .route("/returns", post(handlers::request_return))
        .route("/returns/{borrow}/confirm", post(handlers::confirm_return))
        .route(
            "/calibrations",
            get(handlers::list_calibrations).post(handlers::upsert_calibration),
        )
        .route("/calibrations/refresh", post(handlers::refresh_calibrations))
        .route("/maintains", post(handlers::upsert_maintain))
        .route(
            "/maintenance",
            get(handlers::list_maintenance).post(handlers::complete_maintenance),
        )
        .route("/reminders/run", post(handlers::run_reminders))
        .route("/reports/usage", get(handlers::usage_report))
        .route("/reports/maintenance", get(handlers::maintenance_report))
        .route("/reports/fees", get(handlers::fee_report))
        .route(
            "/currencies",
            get(handlers::list_currencies).post(handlers::upsert_currency),
        )
        .route("/currencies/rates", put(handlers::update_rates))
        .route("/foundry/quote", post(handlers::foundry_quote))
        .route(
            "/foundry/assets",
            get(handlers::list_foundry_assets).post(handlers::register_foundry_asset),
        )
        .route("/foundry/assets/{id}", get(handlers::get_foundry_asset))
        .route(
            "/foundry/transfers",
            get(handlers::list_foundry_transfers).post(handlers::foundry_transfer),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), guard));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn guard(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.limiter.check().is_err() {
        return ApiError::RateLimited.into_response();
    }
    if let Some(expected) = &state.api_key {
        let provided = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if !provided.is_some_and(|key| keys_match(key, expected)) {
            tracing::warn!(path = %request.uri().path(), "rejected request without valid api key");
            return ApiError::Unauthorized.into_response();
        }
    }
    next.run(request).await
}

fn keys_match(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Bind and serve until ctrl-c.
pub async fn serve(state: AppState, bind: &str) -> AppResult<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(addr = %bind, "labres api listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::Server(e.to_string()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
    }
    tracing::info!("shutting down");
}
