pub mod carts;
pub mod common;
pub mod orders;
pub mod products;

pub use carts::carts_routes;
pub use orders::{checkout_routes, orders_routes};
pub use products::{categories_routes, products_routes};
