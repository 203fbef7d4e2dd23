use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Barrelworks Storefront API",
        version = "1.0.0",
        description = r#"
# Barrelworks Storefront API

Storefront backend for a catalog of customizable products: carts keyed
by user or guest session, per-line customization bundles (barrel length,
barrel material, engraving, color finish), checkout into immutable
orders, and a small admin back-office.

## Identity

Guests get an opaque session token from `POST /api/v1/carts/guest`;
authenticated traffic sends a `user_id`. When both appear on a request
the user wins.

## Error Handling

All errors share one response shape:

```json
{
  "error": "Not Found",
  "message": "Product not found",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Carts", description = "Cart and cart line management"),
        (name = "Checkout", description = "Cart-to-order conversion"),
        (name = "Orders", description = "Order retrieval, status, and mock payment"),
        (name = "Products", description = "Catalog and admin product management")
    ),
    components(
        schemas(
            crate::errors::ErrorResponse,
            crate::entities::cart::Model,
            crate::entities::cart_item::Model,
            crate::entities::category::Model,
            crate::entities::order::Model,
            crate::entities::order_item::Model,
            crate::entities::product::Model,
            crate::entities::customization::CustomizationBundle,
            crate::entities::customization::SlotSelection,
            crate::entities::customization::EngravingSelection,
            crate::entities::customization::BarrelLengthSelection,
            crate::services::carts::CartView,
            crate::services::carts::CartLineView,
            crate::services::orders::OrderDetail,
            crate::services::orders::OrderLineView,
            crate::services::orders::OrderStats,
            crate::services::products::CreateProductInput,
            crate::services::products::UpdateProductInput,
            crate::services::products::ProductPage,
            crate::handlers::carts::AddItemRequest,
            crate::handlers::carts::GuestCartRequest,
            crate::handlers::carts::GuestCartResponse,
            crate::handlers::carts::MergeRequest,
            crate::handlers::carts::MergeResponse,
            crate::handlers::carts::UpdateQuantityRequest,
            crate::handlers::carts::UpdateQuantityResponse,
            crate::handlers::orders::CheckoutRequest,
            crate::handlers::orders::UpdateStatusRequest,
            crate::handlers::orders::UpdatePaymentStatusRequest,
            crate::handlers::orders::PaymentRequest,
            crate::handlers::products::CreateCategoryRequest,
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_builds() {
        let doc = ApiDocV1::openapi();
        let json = serde_json::to_string(&doc).expect("openapi serializes");
        assert!(json.contains("Barrelworks Storefront API"));
        assert!(json.contains("CustomizationBundle"));
    }
}
