//! Integration tests for the cart REST wire format.
//!
//! These tests verify request shapes, status mapping and that every signed-in
//! mutation replaces the local cart with the server's response.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use cartsync_client::storage::{keys, load_json};
use cartsync_client::{ApiError, CartApi, CartError, SyncPhase};
use cartsync_core::{CartSnapshot, LineItemId, ProductId};
use cartsync_integration_tests::{TestContext, cart_json, line_json, product, route};
use rust_decimal::Decimal;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

// =============================================================================
// Request Shapes
// =============================================================================

#[tokio::test]
async fn test_add_item_request_and_wholesale_replacement() {
    let ctx = TestContext::new().await;
    ctx.login("tok", Some("ref"));

    // The server already holds a line this client has never seen.
    let body = cart_json(&[line_json("srv-1", "p9", 1, 9), line_json("srv-2", "p1", 2, 5)]);
    Mock::given(method("POST"))
        .and(path(route("/cart/items")))
        .and(header("authorization", "Bearer tok"))
        .and(body_json(json!({"productId": "p1", "qty": 2})))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .expect(1)
        .mount(&ctx.server)
        .await;

    let outcome = ctx.store.add_item(product("p1", 5), 2).await.unwrap();

    let expected: CartSnapshot = serde_json::from_value(body).unwrap();
    assert_eq!(ctx.store.snapshot(), expected);
    assert_eq!(outcome.item_id.unwrap().as_str(), "srv-2");
    assert_eq!(outcome.quantity, 2);
    assert_eq!(ctx.store.subtotal(), Decimal::new(3750, 2));
    assert_eq!(ctx.store.phase(), SyncPhase::AuthSynced);

    let persisted: CartSnapshot = load_json(ctx.storage.as_ref(), keys::CART)
        .unwrap()
        .unwrap();
    assert_eq!(persisted, expected);
}

#[tokio::test]
async fn test_update_remove_and_clear_requests() {
    let ctx = TestContext::new().await;
    ctx.login("tok", None);

    Mock::given(method("PATCH"))
        .and(path(route("/cart/items/srv-1")))
        .and(body_json(json!({"qty": 3})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(cart_json(&[line_json("srv-1", "p1", 3, 5)])),
        )
        .expect(1)
        .mount(&ctx.server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(route("/cart/items/srv-1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(cart_json(&[])))
        .expect(1)
        .mount(&ctx.server)
        .await;
    Mock::given(method("POST"))
        .and(path(route("/cart/clear")))
        .respond_with(ResponseTemplate::new(200).set_body_json(cart_json(&[])))
        .expect(1)
        .mount(&ctx.server)
        .await;

    let id = LineItemId::new("srv-1");
    let outcome = ctx.store.update_qty(&id, 3).await.unwrap().unwrap();
    assert_eq!(outcome.quantity, 3);
    assert_eq!(ctx.store.total_item_count(), 3);

    ctx.store.remove_item(&id).await.unwrap();
    assert!(ctx.store.snapshot().is_empty());

    ctx.store.clear_cart().await.unwrap();
    assert!(ctx.store.snapshot().is_empty());
}

#[tokio::test]
async fn test_zero_quantity_update_sends_delete() {
    let ctx = TestContext::new().await;
    ctx.login("tok", None);

    Mock::given(method("DELETE"))
        .and(path(route("/cart/items/srv-4")))
        .respond_with(ResponseTemplate::new(200).set_body_json(cart_json(&[])))
        .expect(1)
        .mount(&ctx.server)
        .await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&ctx.server)
        .await;

    let result = ctx.store.update_qty(&LineItemId::new("srv-4"), 0).await;
    assert!(result.unwrap().is_none());
}

// =============================================================================
// Status Mapping
// =============================================================================

#[tokio::test]
async fn test_remove_not_found_is_noop() {
    let ctx = TestContext::new().await;
    ctx.login("tok", None);

    Mock::given(method("GET"))
        .and(path(route("/cart")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(cart_json(&[line_json("srv-1", "p1", 1, 5)])),
        )
        .mount(&ctx.server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "no such item"})))
        .mount(&ctx.server)
        .await;

    ctx.store.handle_auth_change(true).await;
    let before = ctx.store.snapshot();

    ctx.store
        .remove_item(&LineItemId::new("srv-gone"))
        .await
        .unwrap();
    ctx.store
        .remove_item(&LineItemId::new("srv-gone"))
        .await
        .unwrap();

    assert_eq!(ctx.store.snapshot(), before);
    assert!(ctx.store.sync_state().is_synced);
}

#[tokio::test]
async fn test_server_error_maps_to_status() {
    let ctx = TestContext::new().await;
    ctx.login("tok", None);

    Mock::given(method("POST"))
        .and(path(route("/cart/items")))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({"error": "out of stock"})))
        .mount(&ctx.server)
        .await;

    let err = ctx.api.add_item(&ProductId::new("p1"), 1).await.unwrap_err();
    match err {
        ApiError::Status { status, message } => {
            assert_eq!(status, 422);
            assert_eq!(message, "out of stock");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_body_is_parse_error() {
    let ctx = TestContext::new().await;
    ctx.login("tok", None);

    Mock::given(method("GET"))
        .and(path(route("/cart")))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&ctx.server)
        .await;

    let err = ctx.api.get_cart().await.unwrap_err();
    assert!(matches!(err, ApiError::Parse(_)));
}

#[tokio::test]
async fn test_signed_out_calls_are_rejected_locally() {
    let ctx = TestContext::new().await;

    let err = ctx.api.get_cart().await.unwrap_err();
    assert!(matches!(err, ApiError::NotAuthenticated));
    assert!(ctx.server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_add_zero_never_reaches_server() {
    let ctx = TestContext::new().await;
    ctx.login("tok", None);

    let err = ctx.store.add_item(product("p1", 5), 0).await.unwrap_err();
    assert!(matches!(err, CartError::InvalidQuantity(0)));
    assert!(ctx.server.received_requests().await.unwrap().is_empty());
}
