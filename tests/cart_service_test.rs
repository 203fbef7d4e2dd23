mod common;

use common::{seed_product, TestApp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};

use barrelworks_api::{
    entities::{
        cart, cart_item,
        customization::{CustomizationBundle, EngravingSelection, SlotSelection},
        Cart, CartItem,
    },
    errors::ServiceError,
    services::{CartIdentity, MergeOutcome, QuantityOutcome},
    sessions,
};

fn engraving_bundle(text: &str, price: Decimal) -> CustomizationBundle {
    CustomizationBundle {
        engraving: Some(EngravingSelection {
            kind: "text".to_string(),
            text: Some(text.to_string()),
            logo: None,
            value: "custom-text".to_string(),
            price,
        }),
        ..Default::default()
    }
}

fn color_bundle(value: &str, price: Decimal) -> CustomizationBundle {
    CustomizationBundle {
        color_finish: Some(SlotSelection {
            value: value.to_string(),
            price,
        }),
        ..Default::default()
    }
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn ensure_cart_is_idempotent() {
    let app = TestApp::new().await;
    let identity = CartIdentity::User(42);

    let first = app.state.services.cart.ensure_cart(&identity).await.unwrap();
    let second = app.state.services.cart.ensure_cart(&identity).await.unwrap();

    assert_eq!(first.id, second.id);

    let carts = Cart::find()
        .filter(cart::Column::UserId.eq(42i64))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(carts.len(), 1);
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn add_item_merges_bundle_equal_lines() {
    let app = TestApp::new().await;
    let product = seed_product(&app, "Stainless Barrel", dec!(100.00)).await;
    let identity = CartIdentity::User(1);

    app.state
        .services
        .cart
        .add_item(&identity, product.id, 2, Some(engraving_bundle("ACME", dec!(25.00))))
        .await
        .unwrap();

    // Same selection built fresh; must land on the existing line.
    let line = app
        .state
        .services
        .cart
        .add_item(&identity, product.id, 3, Some(engraving_bundle("ACME", dec!(25.00))))
        .await
        .unwrap();

    assert_eq!(line.quantity, 5);

    let lines = CartItem::find()
        .filter(cart_item::Column::ProductId.eq(product.id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(lines.len(), 1);
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn add_item_distinct_bundle_creates_new_line() {
    let app = TestApp::new().await;
    let product = seed_product(&app, "Carbon Barrel", dec!(150.00)).await;
    let identity = CartIdentity::User(2);

    app.state
        .services
        .cart
        .add_item(&identity, product.id, 1, Some(engraving_bundle("ACME", dec!(25.00))))
        .await
        .unwrap();

    // One extra slot on top of an otherwise identical bundle.
    let mut extended = engraving_bundle("ACME", dec!(25.00));
    extended.color_finish = Some(SlotSelection {
        value: "matte-black".to_string(),
        price: dec!(10.00),
    });

    app.state
        .services
        .cart
        .add_item(&identity, product.id, 1, Some(extended))
        .await
        .unwrap();

    let lines = CartItem::find()
        .filter(cart_item::Column::ProductId.eq(product.id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(lines.len(), 2);
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn add_item_without_customizations_merges_with_plain_line() {
    let app = TestApp::new().await;
    let product = seed_product(&app, "Plain Barrel", dec!(80.00)).await;
    let identity = CartIdentity::User(3);

    app.state
        .services
        .cart
        .add_item(&identity, product.id, 1, None)
        .await
        .unwrap();

    // An explicitly empty bundle is the same selection as no bundle.
    let line = app
        .state
        .services
        .cart
        .add_item(&identity, product.id, 2, Some(CustomizationBundle::default()))
        .await
        .unwrap();

    assert_eq!(line.quantity, 3);
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn add_item_unknown_product_is_not_found() {
    let app = TestApp::new().await;
    let identity = CartIdentity::User(4);

    let err = app
        .state
        .services
        .cart
        .add_item(&identity, uuid::Uuid::new_v4(), 1, None)
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn cart_view_reprices_from_live_catalog() {
    let app = TestApp::new().await;
    let product = seed_product(&app, "Repriced Barrel", dec!(100.00)).await;
    let identity = CartIdentity::User(5);

    app.state
        .services
        .cart
        .add_item(&identity, product.id, 2, Some(color_bundle("cerakote", dec!(15.00))))
        .await
        .unwrap();

    let view = app.state.services.cart.get_cart(&identity).await.unwrap();
    assert_eq!(view.items[0].unit_price, dec!(115.00));
    assert_eq!(view.subtotal, dec!(230.00));

    // Raise the base price; the open cart must follow.
    app.state
        .services
        .catalog
        .update_product(
            product.id,
            barrelworks_api::services::UpdateProductInput {
                base_price: Some(dec!(120.00)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let view = app.state.services.cart.get_cart(&identity).await.unwrap();
    assert_eq!(view.items[0].unit_price, dec!(135.00));
    assert_eq!(view.subtotal, dec!(270.00));
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn cart_view_for_unknown_identity_is_empty() {
    let app = TestApp::new().await;

    let view = app
        .state
        .services
        .cart
        .get_cart(&CartIdentity::User(999))
        .await
        .unwrap();

    assert!(view.cart_id.is_none());
    assert!(view.items.is_empty());
    assert_eq!(view.subtotal, Decimal::ZERO);
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn zero_quantity_update_removes_line() {
    let app = TestApp::new().await;
    let product = seed_product(&app, "Short Lived Barrel", dec!(60.00)).await;
    let identity = CartIdentity::User(6);

    let line = app
        .state
        .services
        .cart
        .add_item(&identity, product.id, 2, None)
        .await
        .unwrap();

    let outcome = app
        .state
        .services
        .cart
        .update_item_quantity(line.id, 0)
        .await
        .unwrap();
    assert!(matches!(outcome, QuantityOutcome::Removed { .. }));

    let remaining = CartItem::find_by_id(line.id)
        .one(&*app.state.db)
        .await
        .unwrap();
    assert!(remaining.is_none());
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn remove_item_is_idempotent() {
    let app = TestApp::new().await;
    let product = seed_product(&app, "Removable Barrel", dec!(70.00)).await;
    let identity = CartIdentity::User(7);

    let line = app
        .state
        .services
        .cart
        .add_item(&identity, product.id, 1, None)
        .await
        .unwrap();

    app.state.services.cart.remove_item(line.id).await.unwrap();
    // Second removal of the same line must also succeed.
    app.state.services.cart.remove_item(line.id).await.unwrap();
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn guest_cart_mints_a_valid_session_token() {
    let app = TestApp::new().await;

    let guest = app
        .state
        .services
        .cart
        .get_or_create_guest_cart(None)
        .await
        .unwrap();

    assert!(guest.is_new);
    assert!(sessions::is_valid_session_token(&guest.session_token));

    // Supplying the token back resolves to the same cart.
    let again = app
        .state
        .services
        .cart
        .get_or_create_guest_cart(Some(guest.session_token.clone()))
        .await
        .unwrap();
    assert!(!again.is_new);
    assert_eq!(again.cart.id, guest.cart.id);
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn merge_combines_overlapping_and_moves_distinct_lines() {
    let app = TestApp::new().await;
    let shared = seed_product(&app, "Shared Barrel", dec!(100.00)).await;
    let guest_only = seed_product(&app, "Guest Only Barrel", dec!(50.00)).await;

    let guest = app
        .state
        .services
        .cart
        .get_or_create_guest_cart(None)
        .await
        .unwrap();
    let guest_identity = CartIdentity::Session(guest.session_token.clone());
    let user_identity = CartIdentity::User(8);

    app.state
        .services
        .cart
        .add_item(&user_identity, shared.id, 1, Some(engraving_bundle("X", dec!(5.00))))
        .await
        .unwrap();
    app.state
        .services
        .cart
        .add_item(&guest_identity, shared.id, 2, Some(engraving_bundle("X", dec!(5.00))))
        .await
        .unwrap();
    app.state
        .services
        .cart
        .add_item(&guest_identity, guest_only.id, 1, None)
        .await
        .unwrap();

    let outcome = app
        .state
        .services
        .cart
        .merge_carts(8, &guest.session_token)
        .await
        .unwrap();

    let (cart_model, moved, combined) = match outcome {
        MergeOutcome::Merged {
            cart,
            moved,
            combined,
        } => (cart, moved, combined),
        MergeOutcome::EnsuredOnly(_) => panic!("merge should succeed"),
    };
    assert_eq!(moved, 1);
    assert_eq!(combined, 1);

    let view = app.state.services.cart.get_cart(&user_identity).await.unwrap();
    assert_eq!(view.cart_id, Some(cart_model.id));
    assert_eq!(view.items.len(), 2);
    let shared_line = view
        .items
        .iter()
        .find(|line| line.product_id == shared.id)
        .unwrap();
    assert_eq!(shared_line.quantity, 3);

    // The guest cart is gone.
    let guest_cart = Cart::find_by_id(guest.cart.id).one(&*app.state.db).await.unwrap();
    assert!(guest_cart.is_none());
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn merge_without_guest_cart_still_yields_user_cart() {
    let app = TestApp::new().await;
    let token = sessions::generate_session_token();

    let outcome = app.state.services.cart.merge_carts(9, &token).await.unwrap();

    match outcome {
        MergeOutcome::Merged {
            cart,
            moved,
            combined,
        } => {
            assert_eq!(cart.user_id, Some(9));
            assert_eq!(moved, 0);
            assert_eq!(combined, 0);
        }
        MergeOutcome::EnsuredOnly(_) => panic!("no-op merge should report Merged"),
    }
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn failed_merge_falls_back_and_leaves_guest_cart_intact() {
    let app = TestApp::new().await;
    let product = seed_product(&app, "Stranded Barrel", dec!(40.00)).await;

    let guest = app
        .state
        .services
        .cart
        .get_or_create_guest_cart(None)
        .await
        .unwrap();
    let guest_identity = CartIdentity::Session(guest.session_token.clone());
    app.state
        .services
        .cart
        .add_item(&guest_identity, product.id, 2, None)
        .await
        .unwrap();
    app.state
        .services
        .cart
        .ensure_cart(&CartIdentity::User(10))
        .await
        .unwrap();

    // Break the line table so the merge cannot complete.
    app.state
        .db
        .execute_unprepared("DROP TABLE cart_items")
        .await
        .unwrap();

    let outcome = app
        .state
        .services
        .cart
        .merge_carts(10, &guest.session_token)
        .await
        .unwrap();

    match outcome {
        MergeOutcome::EnsuredOnly(cart) => assert_eq!(cart.user_id, Some(10)),
        MergeOutcome::Merged { .. } => panic!("broken merge should degrade to EnsuredOnly"),
    }

    // The guest cart row survives for a later retry.
    let guest_cart = Cart::find_by_id(guest.cart.id).one(&*app.state.db).await.unwrap();
    assert!(guest_cart.is_some());
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn convert_repoints_guest_cart_and_keeps_lines() {
    let app = TestApp::new().await;
    let product = seed_product(&app, "Converted Barrel", dec!(90.00)).await;

    let guest = app
        .state
        .services
        .cart
        .get_or_create_guest_cart(None)
        .await
        .unwrap();
    let guest_identity = CartIdentity::Session(guest.session_token.clone());

    let line = app
        .state
        .services
        .cart
        .add_item(&guest_identity, product.id, 2, None)
        .await
        .unwrap();

    let converted = app
        .state
        .services
        .cart
        .convert_guest_cart(&guest.session_token, 10)
        .await
        .unwrap();

    assert_eq!(converted.id, guest.cart.id);
    assert_eq!(converted.user_id, Some(10));
    assert_eq!(converted.session_id, None);

    // Line id survives the conversion.
    let view = app
        .state
        .services
        .cart
        .get_cart(&CartIdentity::User(10))
        .await
        .unwrap();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].id, line.id);
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn clear_cart_drops_lines_but_keeps_cart_row() {
    let app = TestApp::new().await;
    let product = seed_product(&app, "Clearable Barrel", dec!(40.00)).await;
    let identity = CartIdentity::User(11);

    app.state
        .services
        .cart
        .add_item(&identity, product.id, 3, None)
        .await
        .unwrap();

    app.state.services.cart.clear_cart(&identity).await.unwrap();

    let view = app.state.services.cart.get_cart(&identity).await.unwrap();
    assert!(view.items.is_empty());
    assert!(view.cart_id.is_some());
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn clear_cart_without_cart_is_not_found() {
    let app = TestApp::new().await;

    let err = app
        .state
        .services
        .cart
        .clear_cart(&CartIdentity::User(404))
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::NotFound(_)));
}
