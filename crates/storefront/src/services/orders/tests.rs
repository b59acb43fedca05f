use bazaar_core::{CheckoutItem, PaymentMethod, UserRole, WebsiteId};
use rust_decimal::Decimal;

use super::*;
use crate::config::IdentityPolicy;
use crate::db::{CartStore, FailPoint, MemoryStorage, OrderStore};

const SITE: WebsiteId = WebsiteId::new(1);

fn config(policy: IdentityPolicy) -> CheckoutConfig {
    CheckoutConfig {
        website_id: SITE,
        identity_policy: policy,
        price_tolerance: Money::from_cents(1).unwrap(),
    }
}

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn money(s: &str) -> Money {
    Money::new(dec(s)).unwrap()
}

fn admin() -> Identity {
    Identity {
        id: UserId::new(1000),
        name: "Admin".into(),
        email: Email::parse("admin@bazaar.test").unwrap(),
        role: UserRole::Admin,
    }
}

fn product(id: i32, price: &str, stock: i32) -> CatalogProduct {
    CatalogProduct {
        id: ProductId::new(id),
        website_id: SITE,
        name: format!("Product {id}"),
        image_url: Some(format!("/img/{id}.jpg")),
        price: money(price),
        stock,
    }
}

async fn storage() -> MemoryStorage {
    let storage = MemoryStorage::new();
    storage.add_website(SITE, "Main Store").await;
    storage
        .put_user(
            Identity {
                id: UserId::new(7),
                name: "Robin".into(),
                email: Email::parse("robin@example.com").unwrap(),
                role: UserRole::Customer,
            },
            "hash",
        )
        .await;
    storage.put_user(admin(), "hash").await;
    storage.put_product(product(1, "10.00", 10)).await;
    storage.put_product(product(5, "50.00", 3)).await;
    storage
}

fn item(product_id: i32, quantity: i32, price: Option<&str>) -> CheckoutItem {
    CheckoutItem {
        product_id: ProductId::new(product_id),
        quantity,
        price: price.map(dec),
    }
}

fn guest_request(items: Vec<CheckoutItem>, total: &str) -> CheckoutRequest {
    CheckoutRequest {
        user_id: None,
        website_id: None,
        guest_name: Some("Alex".into()),
        guest_email: Some("a@b.com".into()),
        guest_phone: None,
        items,
        total_amount: dec(total),
        shipping_address: "12 Harbour Road".into(),
        payment_method: None,
    }
}

fn registered_request(items: Vec<CheckoutItem>, total: &str) -> CheckoutRequest {
    CheckoutRequest {
        guest_name: None,
        guest_email: None,
        ..guest_request(items, total)
    }
}

#[tokio::test]
async fn test_registered_checkout_owns_order_and_clears_cart() {
    let storage = storage().await;
    storage
        .upsert_cart_item(SITE, UserId::new(7), ProductId::new(5), 1)
        .await
        .unwrap();
    storage
        .upsert_cart_item(SITE, UserId::new(7), ProductId::new(1), 4)
        .await
        .unwrap();
    let config = config(IdentityPolicy::Strict);
    let service = OrderService::new(&storage, &config);

    let placed = service
        .place_order(
            OwnerClaim::token(UserId::new(7)),
            registered_request(vec![item(5, 1, Some("50"))], "50"),
        )
        .await
        .unwrap();

    let order = &placed.detail.order;
    assert_eq!(order.user_id, Some(UserId::new(7)));
    assert!(order.guest_name.is_none());
    assert!(order.guest_email.is_none());
    assert_eq!(placed.receipt.payment_method, PaymentMethod::CashOnDelivery);
    assert_eq!(placed.receipt.payment_status, PaymentStatus::Pending);
    assert_eq!(placed.receipt.status, FulfillmentStatus::Pending);
    assert_eq!(storage.product(ProductId::new(5)).await.unwrap().stock, 2);
    assert!(storage.cart_of(UserId::new(7)).await.is_empty());
}

#[tokio::test]
async fn test_registered_checkout_drops_guest_fields() {
    let storage = storage().await;
    let config = config(IdentityPolicy::Strict);
    let service = OrderService::new(&storage, &config);

    let placed = service
        .place_order(
            OwnerClaim::token(UserId::new(7)),
            guest_request(vec![item(1, 1, None)], "10"),
        )
        .await
        .unwrap();

    assert_eq!(placed.detail.order.user_id, Some(UserId::new(7)));
    assert!(placed.detail.order.guest_email.is_none());
    assert_eq!(placed.detail.customer_name.as_deref(), Some("Robin"));
}

#[tokio::test]
async fn test_guest_paypal_checkout_is_paid() {
    let storage = storage().await;
    let config = config(IdentityPolicy::Strict);
    let service = OrderService::new(&storage, &config);

    let request = CheckoutRequest {
        payment_method: Some(PaymentMethod::PayPal),
        ..guest_request(vec![item(1, 1, Some("10.00"))], "10.00")
    };
    let placed = service.place_order(OwnerClaim::guest(), request).await.unwrap();

    assert!(placed.detail.order.user_id.is_none());
    assert_eq!(placed.receipt.payment_status, PaymentStatus::Completed);
    assert_eq!(
        placed.detail.order.guest_email.as_ref().map(Email::as_str),
        Some("a@b.com")
    );
}

#[tokio::test]
async fn test_unknown_claim_downgrades_to_guest_when_lenient() {
    let storage = storage().await;
    let config = config(IdentityPolicy::Lenient);
    let service = OrderService::new(&storage, &config);

    let request = CheckoutRequest {
        user_id: Some(UserId::new(99999)),
        ..guest_request(vec![item(1, 1, None)], "10")
    };
    let placed = service.place_order(OwnerClaim::guest(), request).await.unwrap();

    assert!(placed.detail.order.user_id.is_none());
    assert_eq!(placed.detail.order.guest_name.as_deref(), Some("Alex"));
}

#[tokio::test]
async fn test_unknown_claim_without_contact_is_rejected() {
    let storage = storage().await;
    let config = config(IdentityPolicy::Lenient);
    let service = OrderService::new(&storage, &config);

    let request = CheckoutRequest {
        user_id: Some(UserId::new(99999)),
        ..registered_request(vec![item(1, 1, None)], "10")
    };
    let err = service
        .place_order(OwnerClaim::guest(), request)
        .await
        .unwrap_err();

    assert!(matches!(err, OrderError::Invalid(CheckoutError::MissingContact)));
    assert_eq!(storage.order_count().await, 0);
}

#[tokio::test]
async fn test_unknown_claim_rejected_when_strict() {
    let storage = storage().await;
    let config = config(IdentityPolicy::Strict);
    let service = OrderService::new(&storage, &config);

    let request = CheckoutRequest {
        user_id: Some(UserId::new(99999)),
        ..guest_request(vec![item(1, 1, None)], "10")
    };
    let err = service
        .place_order(OwnerClaim::guest(), request)
        .await
        .unwrap_err();

    assert!(matches!(err, OrderError::IdentityUnresolvable));
    assert_eq!(storage.order_count().await, 0);
}

#[tokio::test]
async fn test_round_trip_keeps_captured_price() {
    let storage = storage().await;
    let config = config(IdentityPolicy::Strict);
    let service = OrderService::new(&storage, &config);

    let placed = service
        .place_order(
            OwnerClaim::guest(),
            guest_request(vec![item(1, 2, Some("10.00"))], "20.00"),
        )
        .await
        .unwrap();

    // A later catalog price change must not leak into the stored order.
    storage.put_product(product(1, "12.50", 8)).await;

    let detail = service
        .get_order_by_id(&admin(), placed.receipt.order_id)
        .await
        .unwrap();
    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.items[0].quantity, 2);
    assert_eq!(detail.items[0].price, money("10.00"));
    assert_eq!(detail.order.total_amount, money("20.00"));
}

#[tokio::test]
async fn test_reads_are_idempotent() {
    let storage = storage().await;
    let config = config(IdentityPolicy::Strict);
    let service = OrderService::new(&storage, &config);

    let placed = service
        .place_order(OwnerClaim::guest(), guest_request(vec![item(1, 1, None)], "10"))
        .await
        .unwrap();

    let first = service
        .get_order_by_id(&admin(), placed.receipt.order_id)
        .await
        .unwrap();
    let second = service
        .get_order_by_id(&admin(), placed.receipt.order_id)
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(first, placed.detail);
}

#[tokio::test]
async fn test_stock_decreases_by_aggregated_quantity() {
    let storage = storage().await;
    let config = config(IdentityPolicy::Strict);
    let service = OrderService::new(&storage, &config);

    let placed = service
        .place_order(
            OwnerClaim::guest(),
            guest_request(vec![item(1, 2, None), item(1, 3, None), item(5, 1, None)], "100"),
        )
        .await
        .unwrap();

    assert_eq!(placed.detail.items.len(), 3);
    assert_eq!(storage.product(ProductId::new(1)).await.unwrap().stock, 5);
    assert_eq!(storage.product(ProductId::new(5)).await.unwrap().stock, 2);
}

#[tokio::test]
async fn test_duplicate_lines_checked_against_total_stock() {
    let storage = storage().await;
    let config = config(IdentityPolicy::Strict);
    let service = OrderService::new(&storage, &config);

    // 2 + 2 exceeds the 3 units of product 5 even though each line fits.
    let err = service
        .place_order(
            OwnerClaim::guest(),
            guest_request(vec![item(5, 2, None), item(5, 2, None)], "200"),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrderError::InsufficientStock {
            requested: 4,
            available: 3,
            ..
        }
    ));
    assert_eq!(storage.product(ProductId::new(5)).await.unwrap().stock, 3);
}

#[tokio::test]
async fn test_empty_items_rejected_without_writes() {
    let storage = storage().await;
    let config = config(IdentityPolicy::Strict);
    let service = OrderService::new(&storage, &config);

    let err = service
        .place_order(OwnerClaim::guest(), guest_request(vec![], "0"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrderError::Invalid(CheckoutError::InvalidLineItem(LineItemIssue::NoItems))
    ));
    assert_eq!(storage.order_count().await, 0);
}

#[tokio::test]
async fn test_unknown_product_rejected() {
    let storage = storage().await;
    let config = config(IdentityPolicy::Strict);
    let service = OrderService::new(&storage, &config);

    let err = service
        .place_order(OwnerClaim::guest(), guest_request(vec![item(42, 1, None)], "1"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrderError::Invalid(CheckoutError::InvalidLineItem(
            LineItemIssue::UnknownProduct { .. }
        ))
    ));
}

#[tokio::test]
async fn test_price_and_total_mismatch() {
    let storage = storage().await;
    let config = config(IdentityPolicy::Strict);
    let service = OrderService::new(&storage, &config);

    let err = service
        .place_order(
            OwnerClaim::guest(),
            guest_request(vec![item(1, 1, Some("9.00"))], "9.00"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::PriceMismatch { .. }));

    let err = service
        .place_order(OwnerClaim::guest(), guest_request(vec![item(1, 1, None)], "1.00"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::TotalMismatch { .. }));

    // Within tolerance: the server total is recorded.
    let placed = service
        .place_order(OwnerClaim::guest(), guest_request(vec![item(1, 1, None)], "10.01"))
        .await
        .unwrap();
    assert_eq!(placed.receipt.total_amount, money("10.00"));
}

#[tokio::test]
async fn test_foreign_website_rejected() {
    let storage = storage().await;
    let config = config(IdentityPolicy::Strict);
    let service = OrderService::new(&storage, &config);

    let request = CheckoutRequest {
        website_id: Some(WebsiteId::new(2)),
        ..guest_request(vec![item(1, 1, None)], "10")
    };
    let err = service
        .place_order(OwnerClaim::guest(), request)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::WrongWebsite));
}

#[tokio::test]
async fn test_failed_step_rolls_back_everything() {
    let storage = storage().await;
    storage
        .upsert_cart_item(SITE, UserId::new(7), ProductId::new(1), 2)
        .await
        .unwrap();
    let config = config(IdentityPolicy::Strict);
    let service = OrderService::new(&storage, &config);

    for step in [
        FailPoint::InsertOrder,
        FailPoint::InsertOrderLine,
        FailPoint::DecrementStock,
        FailPoint::ClearCart,
        FailPoint::Commit,
    ] {
        storage.set_fail_point(Some(step)).await;
        let err = service
            .place_order(
                OwnerClaim::token(UserId::new(7)),
                registered_request(vec![item(1, 2, None)], "20"),
            )
            .await
            .unwrap_err();

        assert!(
            matches!(err, OrderError::Persistence { .. }),
            "{step:?} produced {err:?}"
        );
        assert_eq!(storage.order_count().await, 0);
        assert_eq!(storage.order_line_count().await, 0);
        assert_eq!(storage.product(ProductId::new(1)).await.unwrap().stock, 10);
        assert_eq!(storage.cart_of(UserId::new(7)).await.len(), 1);
    }
}

#[tokio::test]
async fn test_identity_lookup_failure_by_policy() {
    let storage = storage().await;
    storage
        .upsert_cart_item(SITE, UserId::new(7), ProductId::new(1), 2)
        .await
        .unwrap();
    storage.set_fail_point(Some(FailPoint::FindIdentity)).await;

    let strict = config(IdentityPolicy::Strict);
    let err = OrderService::new(&storage, &strict)
        .place_order(
            OwnerClaim::token(UserId::new(7)),
            guest_request(vec![item(1, 2, None)], "20"),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrderError::Persistence {
            step: CheckoutStep::ResolveIdentity,
            ..
        }
    ));
    assert_eq!(storage.order_count().await, 0);
    assert_eq!(storage.order_line_count().await, 0);
    assert_eq!(storage.product(ProductId::new(1)).await.unwrap().stock, 10);

    let lenient = config(IdentityPolicy::Lenient);
    let placed = OrderService::new(&storage, &lenient)
        .place_order(
            OwnerClaim::token(UserId::new(7)),
            guest_request(vec![item(1, 2, None)], "20"),
        )
        .await
        .unwrap();
    assert_eq!(placed.detail.order.user_id, None);
    assert_eq!(
        placed.detail.order.guest_email.as_ref().map(Email::as_str),
        Some("a@b.com")
    );
    assert_eq!(storage.product(ProductId::new(1)).await.unwrap().stock, 8);
    assert_eq!(storage.cart_of(UserId::new(7)).await.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_last_unit_sells_once() {
    let storage = storage().await;
    storage.put_product(product(9, "5.00", 1)).await;
    let config = config(IdentityPolicy::Strict);

    let attempts: Vec<_> = (0..2)
        .map(|_| {
            let storage = storage.clone();
            tokio::spawn(async move {
                OrderService::new(&storage, &config)
                    .place_order(OwnerClaim::guest(), guest_request(vec![item(9, 1, None)], "5"))
                    .await
            })
        })
        .collect();

    let mut placed = 0;
    let mut sold_out = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(_) => placed += 1,
            Err(OrderError::InsufficientStock { .. }) => sold_out += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!((placed, sold_out), (1, 1));
    assert_eq!(storage.product(ProductId::new(9)).await.unwrap().stock, 0);
    assert_eq!(storage.order_count().await, 1);
}

#[tokio::test]
async fn test_user_orders_and_visibility() {
    let storage = storage().await;
    let config = config(IdentityPolicy::Strict);
    let service = OrderService::new(&storage, &config);

    let mine = service
        .place_order(
            OwnerClaim::token(UserId::new(7)),
            registered_request(vec![item(1, 1, None)], "10"),
        )
        .await
        .unwrap();
    service
        .place_order(OwnerClaim::guest(), guest_request(vec![item(1, 1, None)], "10"))
        .await
        .unwrap();

    let orders = service.get_user_orders(UserId::new(7)).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].order.id, mine.receipt.order_id);
    assert_eq!(orders[0].display_name, "Robin");

    let all = service.get_all_orders().await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].display_name, "Alex (Guest)");
    assert_eq!(all[0].website_name, "Main Store");

    let stranger = Identity {
        id: UserId::new(8),
        role: UserRole::Customer,
        ..admin()
    };
    assert!(matches!(
        service.get_order_by_id(&stranger, mine.receipt.order_id).await,
        Err(OrderError::NotFound)
    ));
}

#[tokio::test]
async fn test_track_order_by_reference_and_email() {
    let storage = storage().await;
    let config = config(IdentityPolicy::Strict);
    let service = OrderService::new(&storage, &config);

    let placed = service
        .place_order(OwnerClaim::guest(), guest_request(vec![item(1, 1, None)], "10"))
        .await
        .unwrap();
    let reference = placed.receipt.reference.clone();

    let tracked = service.track_order(&reference, "A@B.COM").await.unwrap();
    assert_eq!(tracked.order.id, placed.receipt.order_id);

    let bare = placed.receipt.order_id.to_string();
    assert!(service.track_order(&bare, "a@b.com").await.is_ok());

    for (reference, email) in [
        (reference.as_str(), "other@b.com"),
        ("ORD-", "a@b.com"),
        (reference.as_str(), "not-an-email"),
    ] {
        assert!(matches!(
            service.track_order(reference, email).await,
            Err(OrderError::NotFound)
        ));
    }
}

#[tokio::test]
async fn test_status_follows_state_machine() {
    let storage = storage().await;
    let config = config(IdentityPolicy::Strict);
    let service = OrderService::new(&storage, &config);

    let id = service
        .place_order(OwnerClaim::guest(), guest_request(vec![item(1, 1, None)], "10"))
        .await
        .unwrap()
        .receipt
        .order_id;

    let err = service
        .update_order_status(id, FulfillmentStatus::Delivered)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::InvalidTransition { .. }));

    for next in [
        FulfillmentStatus::Processing,
        FulfillmentStatus::Shipped,
        FulfillmentStatus::Delivered,
    ] {
        let detail = service.update_order_status(id, next).await.unwrap();
        assert_eq!(detail.order.status, next);
    }

    let err = service
        .update_order_status(id, FulfillmentStatus::Cancelled)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::InvalidTransition { .. }));

    assert!(matches!(
        service
            .update_order_status(OrderId::new(777), FulfillmentStatus::Processing)
            .await,
        Err(OrderError::NotFound)
    ));
}

#[tokio::test]
async fn test_confirm_payment_once() {
    let storage = storage().await;
    let config = config(IdentityPolicy::Strict);
    let service = OrderService::new(&storage, &config);

    let id = service
        .place_order(OwnerClaim::guest(), guest_request(vec![item(1, 1, None)], "10"))
        .await
        .unwrap()
        .receipt
        .order_id;

    let detail = service.confirm_payment(id).await.unwrap();
    assert_eq!(detail.order.payment_status, PaymentStatus::Completed);
    assert!(matches!(
        service.confirm_payment(id).await,
        Err(OrderError::PaymentAlreadyCompleted)
    ));

    let stored = storage.get_order(SITE, id).await.unwrap().unwrap();
    assert_eq!(stored.order.payment_status, PaymentStatus::Completed);
}
