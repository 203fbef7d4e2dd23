pub mod carts;
pub mod orders;
pub mod products;

pub use carts::{
    CartIdentity, CartLineView, CartService, CartView, GuestCart, MergeOutcome, QuantityOutcome,
};
pub use orders::{CheckoutInput, OrderDetail, OrderLineView, OrderService, OrderStats};
pub use products::{
    CreateProductInput, ProductCatalogService, ProductFilters, ProductPage, UpdateProductInput,
};
