use crate::{
    entities::{
        cart, cart_item,
        customization::{matches_stored, stored_bundles_equal, CustomizationBundle},
        Cart, CartItem, CartItemModel, CartModel, Product,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    sessions,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Who a cart belongs to. A request must resolve to exactly one of
/// these before any cart operation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartIdentity {
    User(i64),
    Session(String),
}

impl CartIdentity {
    /// Builds an identity from the optional parts a request carries.
    /// The authenticated user wins when both are present.
    pub fn from_parts(
        user_id: Option<i64>,
        session_id: Option<String>,
    ) -> Result<Self, ServiceError> {
        match (user_id, session_id) {
            (Some(user_id), _) => Ok(CartIdentity::User(user_id)),
            (None, Some(session_id)) => {
                if !sessions::is_valid_session_token(&session_id) {
                    return Err(ServiceError::ValidationError(
                        "Invalid session token".to_string(),
                    ));
                }
                Ok(CartIdentity::Session(session_id))
            }
            (None, None) => Err(ServiceError::ValidationError(
                "Either user_id or session_id is required".to_string(),
            )),
        }
    }
}

/// A priced cart line as returned to clients. Prices are computed at
/// read time from the live catalog, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartLineView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_slug: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customizations: Option<CustomizationBundle>,
}

/// The priced view of a whole cart.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cart_id: Option<Uuid>,
    pub items: Vec<CartLineView>,
    pub subtotal: Decimal,
}

impl CartView {
    /// The view handed back when the identity has no cart yet.
    pub fn empty() -> Self {
        Self {
            cart_id: None,
            items: Vec::new(),
            subtotal: Decimal::ZERO,
        }
    }
}

/// Result of fetching or creating a guest cart.
#[derive(Debug, Clone)]
pub struct GuestCart {
    pub cart: CartModel,
    pub session_token: String,
    pub is_new: bool,
}

/// How a quantity update resolved. Zero or negative quantities are
/// treated as removal rather than rejected.
#[derive(Debug, Clone)]
pub enum QuantityOutcome {
    Updated(CartItemModel),
    Removed { line_id: Uuid },
}

/// Result of merging a guest cart into a user cart.
///
/// `EnsuredOnly` is the degraded path: the merge itself failed, the
/// guest cart was left untouched, and the caller still gets a usable
/// user cart.
#[derive(Debug, Clone)]
pub enum MergeOutcome {
    Merged {
        cart: CartModel,
        moved: u32,
        combined: u32,
    },
    EnsuredOnly(CartModel),
}

impl MergeOutcome {
    pub fn cart(&self) -> &CartModel {
        match self {
            MergeOutcome::Merged { cart, .. } => cart,
            MergeOutcome::EnsuredOnly(cart) => cart,
        }
    }
}

/// Shopping cart service.
///
/// Carts are identity-addressed (one open cart per user or guest
/// session) and store only product references, quantities, and the
/// customization bundle. Everything money-related is recomputed from
/// the catalog on read, so price changes propagate to open carts
/// automatically.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    async fn find_cart(&self, identity: &CartIdentity) -> Result<Option<CartModel>, ServiceError> {
        let query = match identity {
            CartIdentity::User(user_id) => {
                Cart::find().filter(cart::Column::UserId.eq(*user_id))
            }
            CartIdentity::Session(session_id) => {
                Cart::find().filter(cart::Column::SessionId.eq(session_id.clone()))
            }
        };
        Ok(query.one(&*self.db).await?)
    }

    /// Finds the cart for this identity, creating it when missing.
    ///
    /// Concurrent creation for the same identity is resolved by the
    /// unique indexes on `user_id` and `session_id`: the loser of the
    /// race re-fetches the winner's row, so the call is idempotent.
    #[instrument(skip(self))]
    pub async fn ensure_cart(&self, identity: &CartIdentity) -> Result<CartModel, ServiceError> {
        if let Some(cart) = self.find_cart(identity).await? {
            return Ok(cart);
        }

        let now = Utc::now();
        let (user_id, session_id) = match identity {
            CartIdentity::User(user_id) => (Some(*user_id), None),
            CartIdentity::Session(session_id) => (None, Some(session_id.clone())),
        };

        let new_cart = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            session_id: Set(session_id),
            created_at: Set(now),
            updated_at: Set(now),
        };

        match new_cart.insert(&*self.db).await {
            Ok(created) => {
                self.event_sender
                    .send_or_log(Event::CartCreated(created.id))
                    .await;
                Ok(created)
            }
            Err(err) if err.sql_err().map_or(false, |e| {
                matches!(e, sea_orm::SqlErr::UniqueConstraintViolation(_))
            }) =>
            {
                // Lost the race; the winner's cart is what we want.
                self.find_cart(identity).await?.ok_or_else(|| {
                    ServiceError::InternalError(
                        "Cart vanished after unique-constraint conflict".to_string(),
                    )
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Adds a product to the identity's cart.
    ///
    /// A line with the same product and a structurally equal
    /// customization bundle absorbs the quantity; anything else gets
    /// its own line. The match-or-insert decision re-reads the lines
    /// inside a transaction so two concurrent adds of the same
    /// selection cannot both insert.
    #[instrument(skip(self, customizations))]
    pub async fn add_item(
        &self,
        identity: &CartIdentity,
        product_id: Uuid,
        quantity: i32,
        customizations: Option<CustomizationBundle>,
    ) -> Result<CartItemModel, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        // An empty bundle means "no customization"; normalize so it
        // compares equal to an absent one.
        let customizations = customizations.filter(|bundle| !bundle.is_empty());

        let cart = self.ensure_cart(identity).await?;

        let txn = self.db.begin().await?;

        let product = Product::find_by_id(product_id).one(&txn).await?;
        let product = match product {
            Some(p) if p.is_active => p,
            _ => {
                txn.rollback().await?;
                return Err(ServiceError::NotFound("Product not found".to_string()));
            }
        };

        let existing_lines = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product.id))
            .all(&txn)
            .await?;

        let matching = existing_lines.into_iter().find(|line| {
            matches_stored(customizations.as_ref(), line.customizations.as_ref())
        });

        let (line, merged) = match matching {
            Some(existing) => {
                let new_quantity = existing.quantity + quantity;
                let mut active: cart_item::ActiveModel = existing.into();
                active.quantity = Set(new_quantity);
                active.updated_at = Set(Utc::now());
                (active.update(&txn).await?, true)
            }
            None => {
                let now = Utc::now();
                let new_line = cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(product.id),
                    quantity: Set(quantity),
                    customizations: Set(customizations.as_ref().map(|b| b.to_stored())),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                (new_line.insert(&txn).await?, false)
            }
        };

        txn.commit().await?;

        let event = if merged {
            Event::CartItemUpdated {
                cart_id: cart.id,
                item_id: line.id,
            }
        } else {
            Event::CartItemAdded {
                cart_id: cart.id,
                item_id: line.id,
            }
        };
        self.event_sender.send_or_log(event).await;

        Ok(line)
    }

    /// Sets a line's quantity. Zero or negative removes the line.
    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        line_id: Uuid,
        quantity: i32,
    ) -> Result<QuantityOutcome, ServiceError> {
        if quantity <= 0 {
            self.remove_item(line_id).await?;
            return Ok(QuantityOutcome::Removed { line_id });
        }

        let line = CartItem::find_by_id(line_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart item not found".to_string()))?;

        let cart_id = line.cart_id;
        let mut active: cart_item::ActiveModel = line.into();
        active.quantity = Set(quantity);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartItemUpdated {
                cart_id,
                item_id: updated.id,
            })
            .await;

        Ok(QuantityOutcome::Updated(updated))
    }

    /// Removes a line. Deleting an already-absent line succeeds, so
    /// retried deletes are harmless.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, line_id: Uuid) -> Result<(), ServiceError> {
        let line = CartItem::find_by_id(line_id).one(&*self.db).await?;

        if let Some(line) = line {
            let cart_id = line.cart_id;
            CartItem::delete_by_id(line.id).exec(&*self.db).await?;
            self.event_sender
                .send_or_log(Event::CartItemRemoved {
                    cart_id,
                    item_id: line_id,
                })
                .await;
        }

        Ok(())
    }

    /// Returns the priced view of the identity's cart. An identity with
    /// no cart gets an empty view rather than an error.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, identity: &CartIdentity) -> Result<CartView, ServiceError> {
        let cart = match self.find_cart(identity).await? {
            Some(cart) => cart,
            None => return Ok(CartView::empty()),
        };

        self.build_cart_view(&cart).await
    }

    async fn build_cart_view(&self, cart: &CartModel) -> Result<CartView, ServiceError> {
        let lines = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .find_also_related(Product)
            .all(&*self.db)
            .await?;

        let mut items = Vec::with_capacity(lines.len());
        let mut subtotal = Decimal::ZERO;

        for (line, product) in lines {
            // Products are deactivated rather than deleted, so the join
            // resolves for every line that passed add_item.
            let product = match product {
                Some(product) => product,
                None => {
                    warn!(line_id = %line.id, "Cart line references missing product; skipping");
                    continue;
                }
            };

            let bundle = match line.customizations.as_ref() {
                Some(stored) => Some(CustomizationBundle::from_stored(stored)?),
                None => None,
            };

            let delta = bundle.as_ref().map(|b| b.price_delta()).unwrap_or_default();
            let unit_price = (product.base_price + delta).round_dp(2);
            let line_total = (unit_price * Decimal::from(line.quantity)).round_dp(2);
            subtotal += line_total;

            items.push(CartLineView {
                id: line.id,
                product_id: product.id,
                product_name: product.name,
                product_slug: product.slug,
                quantity: line.quantity,
                unit_price,
                line_total,
                customizations: bundle,
            });
        }

        Ok(CartView {
            cart_id: Some(cart.id),
            items,
            subtotal: subtotal.round_dp(2),
        })
    }

    /// Fetches the guest cart for a session token, minting a fresh
    /// token (and cart) when none was supplied.
    #[instrument(skip(self))]
    pub async fn get_or_create_guest_cart(
        &self,
        session_id: Option<String>,
    ) -> Result<GuestCart, ServiceError> {
        let (session_token, is_new) = match session_id {
            Some(token) if sessions::is_valid_session_token(&token) => (token, false),
            _ => (sessions::generate_session_token(), true),
        };

        let cart = self
            .ensure_cart(&CartIdentity::Session(session_token.clone()))
            .await?;

        Ok(GuestCart {
            cart,
            session_token,
            is_new,
        })
    }

    /// Re-points a guest cart at a user after sign-in.
    ///
    /// When the user already has a cart of their own the guest cart is
    /// merged into it instead; when there is no guest cart the user's
    /// cart is simply ensured.
    #[instrument(skip(self))]
    pub async fn convert_guest_cart(
        &self,
        session_id: &str,
        user_id: i64,
    ) -> Result<CartModel, ServiceError> {
        let guest_cart = match self
            .find_cart(&CartIdentity::Session(session_id.to_string()))
            .await?
        {
            Some(cart) => cart,
            None => return self.ensure_cart(&CartIdentity::User(user_id)).await,
        };

        let user_cart = self.find_cart(&CartIdentity::User(user_id)).await?;
        if user_cart.is_some() {
            let outcome = self.merge_carts(user_id, session_id).await?;
            return Ok(outcome.cart().clone());
        }

        let guest_cart_id = guest_cart.id;
        let mut active: cart::ActiveModel = guest_cart.into();
        active.user_id = Set(Some(user_id));
        active.session_id = Set(None);
        active.updated_at = Set(Utc::now());

        match active.update(&*self.db).await {
            Ok(converted) => {
                self.event_sender
                    .send_or_log(Event::CartConverted {
                        cart_id: converted.id,
                        user_id,
                    })
                    .await;
                Ok(converted)
            }
            Err(err) if err.sql_err().map_or(false, |e| {
                matches!(e, sea_orm::SqlErr::UniqueConstraintViolation(_))
            }) =>
            {
                // A user cart appeared between the check and the update.
                info!(%guest_cart_id, user_id, "Conversion raced a new user cart; merging instead");
                let outcome = self.merge_carts(user_id, session_id).await?;
                Ok(outcome.cart().clone())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Merges the guest cart for `session_id` into the cart of
    /// `user_id`, combining bundle-equal lines and re-parenting the
    /// rest.
    ///
    /// Merging is best effort: if anything inside the merge fails the
    /// guest cart is left where it was, the failure is logged, and the
    /// caller gets `EnsuredOnly` with a usable user cart. Sign-in must
    /// not fail because of cart housekeeping.
    #[instrument(skip(self))]
    pub async fn merge_carts(
        &self,
        user_id: i64,
        session_id: &str,
    ) -> Result<MergeOutcome, ServiceError> {
        match self.try_merge_carts(user_id, session_id).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                warn!(user_id, session_id, error = %err, "Cart merge failed; falling back to ensure");
                let cart = self.ensure_cart(&CartIdentity::User(user_id)).await?;
                Ok(MergeOutcome::EnsuredOnly(cart))
            }
        }
    }

    async fn try_merge_carts(
        &self,
        user_id: i64,
        session_id: &str,
    ) -> Result<MergeOutcome, ServiceError> {
        let guest_cart = self
            .find_cart(&CartIdentity::Session(session_id.to_string()))
            .await?;

        let guest_cart = match guest_cart {
            Some(cart) => cart,
            None => {
                let cart = self.ensure_cart(&CartIdentity::User(user_id)).await?;
                return Ok(MergeOutcome::Merged {
                    cart,
                    moved: 0,
                    combined: 0,
                });
            }
        };

        let user_cart = self.ensure_cart(&CartIdentity::User(user_id)).await?;
        if user_cart.id == guest_cart.id {
            return Ok(MergeOutcome::Merged {
                cart: user_cart,
                moved: 0,
                combined: 0,
            });
        }

        // All line moves and the guest cart removal commit together, so
        // a failed merge leaves both carts exactly as they were.
        let txn = self.db.begin().await?;

        let guest_lines = CartItem::find()
            .filter(cart_item::Column::CartId.eq(guest_cart.id))
            .all(&txn)
            .await?;
        let user_lines = CartItem::find()
            .filter(cart_item::Column::CartId.eq(user_cart.id))
            .all(&txn)
            .await?;

        let mut moved = 0u32;
        let mut combined = 0u32;

        for guest_line in guest_lines {
            let matching = user_lines.iter().find(|user_line| {
                user_line.product_id == guest_line.product_id
                    && stored_bundles_equal(
                        user_line.customizations.as_ref(),
                        guest_line.customizations.as_ref(),
                    )
            });

            match matching {
                Some(user_line) => {
                    let new_quantity = user_line.quantity + guest_line.quantity;
                    let mut active: cart_item::ActiveModel = user_line.clone().into();
                    active.quantity = Set(new_quantity);
                    active.updated_at = Set(Utc::now());
                    active.update(&txn).await?;

                    CartItem::delete_by_id(guest_line.id).exec(&txn).await?;
                    combined += 1;
                }
                None => {
                    // Re-parent in place: line id and created_at survive.
                    let mut active: cart_item::ActiveModel = guest_line.into();
                    active.cart_id = Set(user_cart.id);
                    active.updated_at = Set(Utc::now());
                    active.update(&txn).await?;
                    moved += 1;
                }
            }
        }

        Cart::delete_by_id(guest_cart.id).exec(&txn).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartsMerged {
                source_cart_id: guest_cart.id,
                target_cart_id: user_cart.id,
            })
            .await;

        info!(
            source = %guest_cart.id,
            target = %user_cart.id,
            moved,
            combined,
            "Merged guest cart into user cart"
        );

        Ok(MergeOutcome::Merged {
            cart: user_cart,
            moved,
            combined,
        })
    }

    /// Deletes every line from the identity's cart. The cart row itself
    /// stays so the identity keeps a stable cart id.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, identity: &CartIdentity) -> Result<(), ServiceError> {
        let cart = self
            .find_cart(identity)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart not found".to_string()))?;

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&*self.db)
            .await?;

        self.event_sender.send_or_log(Event::CartCleared(cart.id)).await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_prefers_user_over_session() {
        let token = sessions::generate_session_token();
        let identity = CartIdentity::from_parts(Some(7), Some(token)).expect("valid parts");
        assert_eq!(identity, CartIdentity::User(7));
    }

    #[test]
    fn identity_requires_at_least_one_part() {
        let err = CartIdentity::from_parts(None, None).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[test]
    fn identity_rejects_malformed_session_token() {
        let err = CartIdentity::from_parts(None, Some("nope".to_string())).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[test]
    fn empty_view_has_zero_subtotal() {
        let view = CartView::empty();
        assert!(view.items.is_empty());
        assert_eq!(view.subtotal, Decimal::ZERO);
        assert!(view.cart_id.is_none());
    }
}
