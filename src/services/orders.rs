use crate::{
    config::AppConfig,
    entities::{
        cart_item, customization::CustomizationBundle, order, order_item, Cart, CartItem, Order,
        OrderItem, OrderModel, Product,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Order statuses the service accepts.
const ALLOWED_STATUSES: &[&str] = &[
    "pending",
    "awaiting_payment",
    "payment_required",
    "pending_payment",
    "processing",
    "paid",
    "shipped",
    "delivered",
    "completed",
    "cancelled",
    "refunded",
];

/// Payment statuses the service accepts.
const ALLOWED_PAYMENT_STATUSES: &[&str] = &["pending", "paid", "failed", "refunded"];

/// Statuses a successful payment advances to `processing`. A freshly
/// created order stays `pending` until the back office moves it.
const PAYMENT_ADVANCE_STATUSES: &[&str] = &["awaiting_payment", "payment_required"];

/// Input for converting a cart into an order.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutInput {
    pub cart_id: Uuid,
    pub user_id: i64,
    pub shipping_address: String,
    pub billing_address: Option<String>,
    pub payment_method: String,
    pub notes: Option<String>,
}

/// An order line joined with catalog display fields.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderLineView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_images: Option<serde_json::Value>,
    pub quantity: i32,
    pub price: Decimal,
    pub line_total: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customizations: Option<CustomizationBundle>,
}

/// An order with its lines, as returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: OrderModel,
    pub items: Vec<OrderLineView>,
}

/// Aggregate counts for the back-office dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderStats {
    pub total_orders: u64,
    pub pending_orders: u64,
    pub processing_orders: u64,
    pub completed_orders: u64,
    pub cancelled_orders: u64,
    pub total_revenue: Decimal,
}

/// Deterministic payment-status side effect of an order-status change.
/// Returns `None` when the payment status should be left untouched.
pub fn payment_status_for(status: &str) -> Option<&'static str> {
    match status {
        "cancelled" => Some("refunded"),
        "paid" | "completed" | "delivered" => Some("paid"),
        "awaiting_payment" | "payment_required" | "pending_payment" => Some("pending"),
        _ => None,
    }
}

fn generate_order_number() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(char::from)
        .collect();
    format!("ORD-{}-{}", Utc::now().timestamp_millis(), suffix)
}

/// Order service: checkout, retrieval, status transitions, and the
/// mock payment endpoint.
///
/// Orders are immutable snapshots. All monetary fields are computed
/// once at checkout and frozen; catalog changes afterwards never
/// reprice an existing order.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
        }
    }

    /// Converts a cart into an order.
    ///
    /// Prices each line from the live catalog the same way the cart
    /// view does, freezes the totals, writes the order and its lines,
    /// and empties the cart, all in one transaction. A duplicate order
    /// number restarts the whole transaction with a fresh number.
    #[instrument(skip(self, input), fields(cart_id = %input.cart_id, user_id = input.user_id))]
    pub async fn checkout(&self, input: CheckoutInput) -> Result<OrderModel, ServiceError> {
        if input.shipping_address.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Shipping address is required".to_string(),
            ));
        }
        if input.payment_method.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Payment method is required".to_string(),
            ));
        }

        const MAX_ATTEMPTS: u32 = 3;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.checkout_attempt(&input).await {
                Ok(order) => {
                    self.event_sender.send_or_log(Event::OrderCreated(order.id)).await;
                    info!(order_number = %order.order_number, total = %order.total, "Checkout complete");
                    return Ok(order);
                }
                Err(ServiceError::Conflict(_)) if attempt < MAX_ATTEMPTS => {
                    warn!(attempt, "Order number collided; retrying checkout");
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn checkout_attempt(&self, input: &CheckoutInput) -> Result<OrderModel, ServiceError> {
        let txn = self.db.begin().await?;

        let cart = Cart::find_by_id(input.cart_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart not found".to_string()))?;

        let lines = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .find_also_related(Product)
            .all(&txn)
            .await?;

        if lines.is_empty() {
            txn.rollback().await?;
            return Err(ServiceError::EmptyCart);
        }

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let mut subtotal = Decimal::ZERO;
        let mut item_models = Vec::with_capacity(lines.len());

        for (line, product) in lines {
            let product = product.ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "Cart line {} references a missing product",
                    line.id
                ))
            })?;

            let bundle = match line.customizations.as_ref() {
                Some(stored) => Some(CustomizationBundle::from_stored(stored)?),
                None => None,
            };

            let delta = bundle.as_ref().map(|b| b.price_delta()).unwrap_or_default();
            let unit_price = (product.base_price + delta).round_dp(2);
            subtotal += unit_price * Decimal::from(line.quantity);

            item_models.push(order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(product.id),
                quantity: Set(line.quantity),
                price: Set(unit_price),
                customizations: Set(line.customizations.clone()),
                created_at: Set(now),
                updated_at: Set(now),
            });
        }

        let subtotal = subtotal.round_dp(2);
        let tax = (subtotal * self.config.tax_rate_decimal()).round_dp(2);
        let shipping = self.config.shipping_fee_decimal();
        let total = (subtotal + tax + shipping).round_dp(2);

        let new_order = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(generate_order_number()),
            user_id: Set(input.user_id),
            status: Set("pending".to_string()),
            payment_status: Set("pending".to_string()),
            subtotal: Set(subtotal),
            shipping: Set(shipping),
            tax: Set(tax),
            total: Set(total),
            shipping_address: Set(input.shipping_address.clone()),
            billing_address: Set(input.billing_address.clone()),
            payment_method: Set(input.payment_method.clone()),
            notes: Set(input.notes.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let order = new_order
            .insert(&txn)
            .await
            .map_err(|e| ServiceError::from_db_conflict(e, "Order number already exists"))?;

        OrderItem::insert_many(item_models).exec(&txn).await?;

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        Ok(order)
    }

    async fn find_by_number(&self, order_number: &str) -> Result<OrderModel, ServiceError> {
        Order::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))
    }

    /// Fetches an order and its lines by order number, the external
    /// lookup key.
    #[instrument(skip(self))]
    pub async fn get_order_by_number(
        &self,
        order_number: &str,
    ) -> Result<OrderDetail, ServiceError> {
        let order = self.find_by_number(order_number).await?;

        let lines = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .find_also_related(Product)
            .all(&*self.db)
            .await?;

        let mut items = Vec::with_capacity(lines.len());
        for (line, product) in lines {
            let (product_name, product_slug, product_images) = match product {
                Some(p) => (p.name, p.slug, p.images),
                None => (String::new(), String::new(), None),
            };

            let bundle = match line.customizations.as_ref() {
                Some(stored) => Some(CustomizationBundle::from_stored(stored)?),
                None => None,
            };

            let line_total = (line.price * Decimal::from(line.quantity)).round_dp(2);
            items.push(OrderLineView {
                id: line.id,
                product_id: line.product_id,
                product_name,
                product_slug,
                product_images,
                quantity: line.quantity,
                price: line.price,
                line_total,
                customizations: bundle,
            });
        }

        Ok(OrderDetail { order, items })
    }

    /// All orders for a user, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders_for_user(&self, user_id: i64) -> Result<Vec<OrderModel>, ServiceError> {
        Ok(Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Sets an order's status and applies the deterministic payment
    /// side effect for the new status.
    #[instrument(skip(self))]
    pub async fn update_order_status(
        &self,
        order_number: &str,
        status: &str,
        notes: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        if !ALLOWED_STATUSES.contains(&status) {
            return Err(ServiceError::ValidationError(format!(
                "Unknown order status: {}",
                status
            )));
        }

        let order = self.find_by_number(order_number).await?;
        let old_status = order.status.clone();
        let order_id = order.id;

        let mut active: order::ActiveModel = order.into();
        active.status = Set(status.to_string());
        if let Some(payment_status) = payment_status_for(status) {
            active.payment_status = Set(payment_status.to_string());
        }
        if let Some(notes) = notes {
            active.notes = Set(Some(notes));
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::OrderStatusUpdated {
                order_id,
                old_status,
                new_status: status.to_string(),
            })
            .await;

        Ok(updated)
    }

    /// Sets the payment status directly, without touching the order
    /// status.
    #[instrument(skip(self))]
    pub async fn update_payment_status(
        &self,
        order_number: &str,
        payment_status: &str,
    ) -> Result<OrderModel, ServiceError> {
        if !ALLOWED_PAYMENT_STATUSES.contains(&payment_status) {
            return Err(ServiceError::ValidationError(format!(
                "Unknown payment status: {}",
                payment_status
            )));
        }

        let order = self.find_by_number(order_number).await?;
        let mut active: order::ActiveModel = order.into();
        active.payment_status = Set(payment_status.to_string());
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    /// Records a payment against an order (mock gateway).
    ///
    /// Paying less than the frozen total is rejected and leaves the
    /// order exactly as it was. A sufficient payment marks the order
    /// paid and, if it was waiting on payment, moves it to
    /// `processing`.
    #[instrument(skip(self))]
    pub async fn record_payment(
        &self,
        order_number: &str,
        amount: Decimal,
    ) -> Result<OrderModel, ServiceError> {
        let order = self.find_by_number(order_number).await?;

        if amount < order.total {
            return Err(ServiceError::InsufficientPayment(format!(
                "Payment of {} is less than order total {}",
                amount, order.total
            )));
        }

        let order_id = order.id;
        let advance_status = PAYMENT_ADVANCE_STATUSES.contains(&order.status.as_str());

        let mut active: order::ActiveModel = order.into();
        active.payment_status = Set("paid".to_string());
        if advance_status {
            active.status = Set("processing".to_string());
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::PaymentRecorded {
                order_id,
                amount: amount.to_string(),
            })
            .await;

        Ok(updated)
    }

    /// Dashboard aggregates: order counts by status bucket and paid
    /// revenue.
    #[instrument(skip(self))]
    pub async fn order_stats(&self) -> Result<OrderStats, ServiceError> {
        let total_orders = Order::find().count(&*self.db).await?;
        let pending_orders = Order::find()
            .filter(order::Column::Status.eq("pending"))
            .count(&*self.db)
            .await?;
        let processing_orders = Order::find()
            .filter(order::Column::Status.eq("processing"))
            .count(&*self.db)
            .await?;
        let completed_orders = Order::find()
            .filter(order::Column::Status.is_in(vec!["completed", "delivered"]))
            .count(&*self.db)
            .await?;
        let cancelled_orders = Order::find()
            .filter(order::Column::Status.eq("cancelled"))
            .count(&*self.db)
            .await?;

        let total_revenue: Option<Option<Decimal>> = Order::find()
            .select_only()
            .column_as(order::Column::Total.sum(), "revenue")
            .filter(order::Column::PaymentStatus.eq("paid"))
            .into_tuple()
            .one(&*self.db)
            .await?;

        Ok(OrderStats {
            total_orders,
            pending_orders,
            processing_orders,
            completed_orders,
            cancelled_orders,
            total_revenue: total_revenue.flatten().unwrap_or(Decimal::ZERO),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_number_has_expected_shape() {
        let number = generate_order_number();
        let parts: Vec<&str> = number.splitn(3, '-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ORD");
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn order_numbers_are_unique_enough() {
        let a = generate_order_number();
        let b = generate_order_number();
        assert_ne!(a, b);
    }

    #[test]
    fn cancellation_refunds_payment() {
        assert_eq!(payment_status_for("cancelled"), Some("refunded"));
    }

    #[test]
    fn terminal_statuses_mark_paid() {
        assert_eq!(payment_status_for("paid"), Some("paid"));
        assert_eq!(payment_status_for("completed"), Some("paid"));
        assert_eq!(payment_status_for("delivered"), Some("paid"));
    }

    #[test]
    fn awaiting_statuses_reset_payment_to_pending() {
        assert_eq!(payment_status_for("awaiting_payment"), Some("pending"));
        assert_eq!(payment_status_for("payment_required"), Some("pending"));
        assert_eq!(payment_status_for("pending_payment"), Some("pending"));
    }

    #[test]
    fn other_statuses_leave_payment_untouched() {
        assert_eq!(payment_status_for("processing"), None);
        assert_eq!(payment_status_for("shipped"), None);
        assert_eq!(payment_status_for("pending"), None);
    }

    #[test]
    fn pending_is_not_a_payment_advance_status() {
        assert!(!PAYMENT_ADVANCE_STATUSES.contains(&"pending"));
        assert!(PAYMENT_ADVANCE_STATUSES.contains(&"awaiting_payment"));
        assert!(PAYMENT_ADVANCE_STATUSES.contains(&"payment_required"));
    }
}
