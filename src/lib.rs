pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod sessions;

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use std::sync::Arc;

/// The services HTTP handlers dispatch into.
#[derive(Clone)]
pub struct AppServices {
    pub catalog: services::ProductCatalogService,
    pub cart: services::CartService,
    pub order: services::OrderService,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<events::EventSender>,
        config: Arc<config::AppConfig>,
    ) -> Self {
        Self {
            catalog: services::ProductCatalogService::new(db.clone(), event_sender.clone()),
            cart: services::CartService::new(db.clone(), event_sender.clone()),
            order: services::OrderService::new(db, event_sender, config),
        }
    }
}

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: AppServices,
}

/// The versioned API surface, mounted under `/api/v1`.
pub fn api_v1_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/carts", handlers::carts_routes())
        .nest("/checkout", handlers::checkout_routes())
        .nest("/orders", handlers::orders_routes())
        .nest("/products", handlers::products_routes())
        .nest("/categories", handlers::categories_routes())
}

/// Liveness and database health.
pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health_check))
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    Json(json!({
        "status": db_status,
        "database": db_status,
        "environment": state.config.environment,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
