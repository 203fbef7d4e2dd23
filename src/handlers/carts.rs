use crate::handlers::common::{
    created_response, map_service_error, no_content_response, success_response, validate_input,
};
use crate::{
    entities::{customization::CustomizationBundle, CartItemModel},
    errors::ApiError,
    services::{CartIdentity, MergeOutcome, QuantityOutcome},
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    routing::{delete, get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Creates the router for cart endpoints
pub fn carts_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_cart))
        .route("/guest", post(guest_cart))
        .route("/items", post(add_item))
        .route("/items/:item_id", put(update_item_quantity))
        .route("/items/:item_id", delete(remove_item))
        .route("/merge", post(merge_carts))
        .route("/convert", post(convert_cart))
        .route("/clear", post(clear_cart))
}

/// Optional identity parts carried by cart requests.
#[derive(Debug, Deserialize, ToSchema)]
pub struct IdentityParams {
    pub user_id: Option<i64>,
    pub session_id: Option<String>,
}

impl IdentityParams {
    fn into_identity(self) -> Result<CartIdentity, ApiError> {
        CartIdentity::from_parts(self.user_id, self.session_id).map_err(map_service_error)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GuestCartRequest {
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GuestCartResponse {
    pub cart_id: Uuid,
    pub session_token: String,
    pub is_new: bool,
}

/// Get or create a guest cart, minting a session token when needed
async fn guest_cart(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<GuestCartRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let guest = state
        .services
        .cart
        .get_or_create_guest_cart(payload.session_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(GuestCartResponse {
        cart_id: guest.cart.id,
        session_token: guest.session_token,
        is_new: guest.is_new,
    }))
}

/// Get the priced cart view for a user or guest session
async fn get_cart(
    State(state): State<Arc<AppState>>,
    Query(params): Query<IdentityParams>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let identity = params.into_identity()?;
    let view = state
        .services
        .cart
        .get_cart(&identity)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(view))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddItemRequest {
    pub user_id: Option<i64>,
    pub session_id: Option<String>,
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub customizations: Option<CustomizationBundle>,
}

/// Add a product to the cart, merging into a bundle-equal line
async fn add_item(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AddItemRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;
    let identity = CartIdentity::from_parts(payload.user_id, payload.session_id)
        .map_err(map_service_error)?;

    let line = state
        .services
        .cart
        .add_item(
            &identity,
            payload.product_id,
            payload.quantity,
            payload.customizations,
        )
        .await
        .map_err(map_service_error)?;

    Ok(created_response(line))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateQuantityRequest {
    pub quantity: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UpdateQuantityResponse {
    pub removed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<CartItemModel>,
}

/// Update a line's quantity; zero or less removes the line
async fn update_item_quantity(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let outcome = state
        .services
        .cart
        .update_item_quantity(item_id, payload.quantity)
        .await
        .map_err(map_service_error)?;

    let response = match outcome {
        QuantityOutcome::Updated(item) => UpdateQuantityResponse {
            removed: false,
            item: Some(item),
        },
        QuantityOutcome::Removed { .. } => UpdateQuantityResponse {
            removed: true,
            item: None,
        },
    };

    Ok(success_response(response))
}

/// Remove a cart line (idempotent)
async fn remove_item(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    state
        .services
        .cart
        .remove_item(item_id)
        .await
        .map_err(map_service_error)?;

    Ok(no_content_response())
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MergeRequest {
    pub user_id: i64,
    pub session_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MergeResponse {
    pub cart_id: Uuid,
    pub merged: bool,
    pub moved: u32,
    pub combined: u32,
}

/// Merge a guest cart into a user cart after sign-in
async fn merge_carts(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<MergeRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let outcome = state
        .services
        .cart
        .merge_carts(payload.user_id, &payload.session_id)
        .await
        .map_err(map_service_error)?;

    let response = match outcome {
        MergeOutcome::Merged {
            cart,
            moved,
            combined,
        } => MergeResponse {
            cart_id: cart.id,
            merged: true,
            moved,
            combined,
        },
        MergeOutcome::EnsuredOnly(cart) => MergeResponse {
            cart_id: cart.id,
            merged: false,
            moved: 0,
            combined: 0,
        },
    };

    Ok(success_response(response))
}

/// Re-point a guest cart at a signed-in user
async fn convert_cart(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<MergeRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let cart = state
        .services
        .cart
        .convert_guest_cart(&payload.session_id, payload.user_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

/// Remove every line from the identity's cart
async fn clear_cart(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<IdentityParams>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let identity = payload.into_identity()?;
    state
        .services
        .cart
        .clear_cart(&identity)
        .await
        .map_err(map_service_error)?;

    Ok(no_content_response())
}
