use crate::handlers::common::{
    created_response, map_service_error, no_content_response, success_response,
};
use crate::{
    errors::ApiError,
    services::{CreateProductInput, ProductFilters, UpdateProductInput},
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

/// Creates the router for catalog and admin product endpoints
pub fn products_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_products))
        .route("/", post(create_product))
        .route("/slug/:slug", get(get_product_by_slug))
        .route("/:id", get(get_product))
        .route("/:id", put(update_product))
        .route("/:id", delete(deactivate_product))
}

/// Creates the router for category endpoints
pub fn categories_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_categories))
        .route("/", post(create_category))
}

/// List products with optional filters
async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(filters): Query<ProductFilters>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let page = state
        .services
        .catalog
        .list_products(filters)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(page))
}

/// Get a product by id
async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let product = state
        .services
        .catalog
        .get_product_by_id(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(product))
}

/// Get a product by slug
async fn get_product_by_slug(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let product = state
        .services
        .catalog
        .get_product_by_slug(&slug)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(product))
}

/// Create a product (admin)
async fn create_product(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateProductInput>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let product = state
        .services
        .catalog
        .create_product(payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(product))
}

/// Partially update a product (admin)
async fn update_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProductInput>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let product = state
        .services
        .catalog
        .update_product(id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(product))
}

/// Deactivate a product (admin). Historical orders are unaffected.
async fn deactivate_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    state
        .services
        .catalog
        .deactivate_product(id)
        .await
        .map_err(map_service_error)?;

    Ok(no_content_response())
}

/// List all categories
async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let categories = state
        .services
        .catalog
        .list_categories()
        .await
        .map_err(map_service_error)?;

    Ok(success_response(categories))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
}

/// Create a category (admin)
async fn create_category(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCategoryRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let category = state
        .services
        .catalog
        .create_category(payload.name, payload.slug, payload.description)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(category))
}
