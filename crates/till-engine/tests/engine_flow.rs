//! End-to-end engine flows: a full sale from scan to receipt, and the
//! lifecycle edges around it (hold/resume, void, expiry, double-finalize).

use till_core::{CoreError, CustomerInfo, PaymentMethod, Product, SessionStatus, TaxRate};
use till_db::repository::product::seed_product;
use till_db::{Database, DbConfig};
use till_engine::{EngineConfig, EngineError, PosEngine};

async fn setup() -> (Database, PosEngine) {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let config = EngineConfig::default().with_tax_rate(TaxRate::from_bps(825));
    let engine = PosEngine::new(db.clone(), config);
    (db, engine)
}

async fn seed(db: &Database, engine: &PosEngine, sku_code: &str, price: i64, stock: i64) -> Product {
    let product = seed_product("store1", sku_code, &format!("Item {sku_code}"), price);
    db.products().insert(&product).await.unwrap();
    engine.set_physical_stock(&product.id, stock).await.unwrap();
    product
}

#[tokio::test]
async fn test_full_sale_flow() {
    let (db, engine) = setup().await;
    let wig = seed(&db, &engine, "WIG-001", 12000, 3).await;
    let comb = seed(&db, &engine, "COMB-002", 500, 10).await;

    // Scan two items.
    let session = engine.create_session("store1", "R1", Some("cashier-7")).await.unwrap();
    engine.add_to_cart(&session.id, &wig.id, 1).await.unwrap();
    let after_add = engine.add_to_cart(&session.id, &comb.id, 2).await.unwrap();
    assert_eq!(after_add.cart.line_count(), 2);

    // Bump the wig to 2 via its line id.
    let wig_line = after_add.cart.line_for_sku(&wig.id).unwrap().id.clone();
    let after_update = engine.update_cart_quantity(&session.id, &wig_line, 2).await.unwrap();

    // 2 × $120.00 + 2 × $5.00 = $250.00, 8.25% tax.
    assert_eq!(after_update.subtotal_cents, 25000);
    assert_eq!(after_update.tax_cents, 2063);
    assert_eq!(after_update.total_cents, 27063);

    // Holds mirror the cart while the sale is live.
    assert_eq!(engine.stock_level(&wig.id).await.unwrap().available_qty, 1);

    let sale = engine
        .complete_transaction(&session.id, PaymentMethod::Cash)
        .await
        .unwrap();
    assert_eq!(sale.transaction.total_cents, 27063);
    assert_eq!(sale.items.len(), 2);
    assert!(sale.transaction.transaction_number.contains("-R1-"));

    // Holds became permanent decrements.
    let level = engine.stock_level(&wig.id).await.unwrap();
    assert_eq!(level.physical_qty, 1);
    assert_eq!(level.reserved_qty, 0);

    // Session is terminal and the register is free again.
    let done = engine.get_session(&session.id).await.unwrap();
    assert_eq!(done.status, SessionStatus::Completed);
    assert!(engine.active_session("store1", "R1").await.unwrap().is_none());
    engine.create_session("store1", "R1", None).await.unwrap();

    // Receipt replay by number.
    let replay = engine
        .transaction_by_number(&sale.transaction.transaction_number)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(replay.transaction.id, sale.transaction.id);
    assert_eq!(replay.items.len(), 2);
}

#[tokio::test]
async fn test_add_beyond_available_rejected() {
    let (db, engine) = setup().await;
    let wig = seed(&db, &engine, "WIG-001", 12000, 3).await;

    let a = engine.create_session("store1", "R1", None).await.unwrap();
    let b = engine.create_session("store1", "R2", None).await.unwrap();

    engine.add_to_cart(&a.id, &wig.id, 2).await.unwrap();

    // Register 2 wants 2 more; only 1 is unreserved.
    let err = engine.add_to_cart(&b.id, &wig.id, 2).await.unwrap_err();
    match err {
        EngineError::Core(CoreError::InsufficientStock {
            available,
            requested,
            ..
        }) => {
            assert_eq!(available, 1);
            assert_eq!(requested, 2);
        }
        other => panic!("expected InsufficientStock, got {other}"),
    }

    // The losing session is completely untouched.
    let b_after = engine.get_session(&b.id).await.unwrap();
    assert!(b_after.cart.is_empty());
    assert_eq!(b_after.total_cents, 0);
    assert_eq!(engine.stock_level(&wig.id).await.unwrap().reserved_qty, 2);
}

#[tokio::test]
async fn test_duplicate_active_session_rejected() {
    let (_db, engine) = setup().await;

    engine.create_session("store1", "R1", None).await.unwrap();
    let err = engine.create_session("store1", "R1", None).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Core(CoreError::DuplicateActiveSession { .. })
    ));

    // Other registers are unaffected.
    engine.create_session("store1", "R2", None).await.unwrap();
}

#[tokio::test]
async fn test_hold_resume_roundtrip_keeps_cart_and_holds() {
    let (db, engine) = setup().await;
    let wig = seed(&db, &engine, "WIG-001", 12000, 3).await;

    let session = engine.create_session("store1", "R1", None).await.unwrap();
    engine.add_to_cart(&session.id, &wig.id, 2).await.unwrap();
    let before = engine
        .set_customer_draft(
            &session.id,
            Some(CustomerInfo {
                name: "Amina Raza".to_string(),
                email: None,
                phone: Some("0301-1234567".to_string()),
            }),
        )
        .await
        .unwrap();
    assert_eq!(before.subtotal_cents, 24000);
    assert_eq!(before.tax_cents, 1980);

    let held = engine
        .hold_session(&session.id, Some("customer fetching card"))
        .await
        .unwrap();
    assert_eq!(held.status, SessionStatus::Held);
    assert_eq!(held.hold_reason.as_deref(), Some("customer fetching card"));

    // Holds survive the hold; the register is free for a new sale.
    assert_eq!(engine.stock_level(&wig.id).await.unwrap().reserved_qty, 2);
    let interim = engine.create_session("store1", "R1", None).await.unwrap();
    engine.void_session(&interim.id, "interim done").await.unwrap();

    let outcome = engine.resume_session(&session.id).await.unwrap();
    assert!(outcome.lapsed.is_empty());
    assert_eq!(outcome.session.status, SessionStatus::Active);
    assert!(outcome.session.hold_reason.is_none());

    // The round trip restores cart lines, customer draft, and totals
    // exactly as they stood before the hold.
    assert_eq!(outcome.session.cart.items, before.cart.items);
    assert_eq!(outcome.session.customer, before.customer);
    assert_eq!(outcome.session.subtotal_cents, before.subtotal_cents);
    assert_eq!(outcome.session.tax_cents, before.tax_cents);
    assert_eq!(outcome.session.total_cents, before.total_cents);
}

#[tokio::test]
async fn test_resume_blocked_while_register_busy() {
    let (db, engine) = setup().await;
    let wig = seed(&db, &engine, "WIG-001", 12000, 3).await;

    let first = engine.create_session("store1", "R1", None).await.unwrap();
    engine.add_to_cart(&first.id, &wig.id, 1).await.unwrap();
    engine.hold_session(&first.id, None).await.unwrap();

    engine.create_session("store1", "R1", None).await.unwrap();

    let err = engine.resume_session(&first.id).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Core(CoreError::DuplicateActiveSession { .. })
    ));
}

#[tokio::test]
async fn test_resume_reports_lapsed_lines() {
    let (db, engine) = setup().await;
    let wig = seed(&db, &engine, "WIG-001", 12000, 2).await;

    let session = engine.create_session("store1", "R1", None).await.unwrap();
    engine.add_to_cart(&session.id, &wig.id, 2).await.unwrap();
    engine.hold_session(&session.id, None).await.unwrap();

    // Stocktake wipes the holds and most of the stock out from under the
    // held session.
    db.stock().release(&session.id).await.unwrap();
    engine.set_physical_stock(&wig.id, 1).await.unwrap();

    let outcome = engine.resume_session(&session.id).await.unwrap();
    assert_eq!(outcome.session.status, SessionStatus::Active);
    assert_eq!(outcome.lapsed.len(), 1);
    assert_eq!(outcome.lapsed[0].sku_id, wig.id);
    assert_eq!(outcome.lapsed[0].requested, 2);
    assert_eq!(outcome.lapsed[0].held, 0);
}

#[tokio::test]
async fn test_void_releases_holds_and_is_terminal() {
    let (db, engine) = setup().await;
    let wig = seed(&db, &engine, "WIG-001", 12000, 3).await;

    let session = engine.create_session("store1", "R1", None).await.unwrap();
    engine.add_to_cart(&session.id, &wig.id, 2).await.unwrap();
    assert_eq!(engine.stock_level(&wig.id).await.unwrap().available_qty, 1);

    let voided = engine.void_session(&session.id, "customer walked out").await.unwrap();
    assert_eq!(voided.status, SessionStatus::Voided);
    assert_eq!(voided.void_reason.as_deref(), Some("customer walked out"));

    // Everything back on the shelf, no physical movement.
    let level = engine.stock_level(&wig.id).await.unwrap();
    assert_eq!(level.physical_qty, 3);
    assert_eq!(level.reserved_qty, 0);

    // Terminal: no further mutations.
    let err = engine.void_session(&session.id, "again").await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Core(CoreError::InvalidSessionStatus { .. })
    ));
    let err = engine.add_to_cart(&session.id, &wig.id, 1).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Core(CoreError::InvalidSessionStatus { .. })
    ));
}

#[tokio::test]
async fn test_remove_and_clear_release_holds() {
    let (db, engine) = setup().await;
    let wig = seed(&db, &engine, "WIG-001", 12000, 3).await;
    let comb = seed(&db, &engine, "COMB-002", 500, 10).await;

    let session = engine.create_session("store1", "R1", None).await.unwrap();
    let with_items = engine.add_to_cart(&session.id, &wig.id, 2).await.unwrap();
    engine.add_to_cart(&session.id, &comb.id, 3).await.unwrap();

    let wig_line = with_items.cart.line_for_sku(&wig.id).unwrap().id.clone();
    let after_remove = engine.remove_from_cart(&session.id, &wig_line).await.unwrap();
    assert_eq!(after_remove.cart.line_count(), 1);
    assert_eq!(engine.stock_level(&wig.id).await.unwrap().reserved_qty, 0);

    let cleared = engine.clear_cart(&session.id).await.unwrap();
    assert!(cleared.cart.is_empty());
    assert_eq!(cleared.total_cents, 0);
    assert_eq!(engine.stock_level(&comb.id).await.unwrap().reserved_qty, 0);
}

#[tokio::test]
async fn test_quantity_zero_removes_line() {
    let (db, engine) = setup().await;
    let wig = seed(&db, &engine, "WIG-001", 12000, 3).await;

    let session = engine.create_session("store1", "R1", None).await.unwrap();
    let with_item = engine.add_to_cart(&session.id, &wig.id, 2).await.unwrap();
    let line = with_item.cart.items[0].id.clone();

    let after = engine.update_cart_quantity(&session.id, &line, 0).await.unwrap();
    assert!(after.cart.is_empty());
    assert_eq!(engine.stock_level(&wig.id).await.unwrap().reserved_qty, 0);
}

#[tokio::test]
async fn test_double_completion_preserves_original() {
    let (db, engine) = setup().await;
    let wig = seed(&db, &engine, "WIG-001", 12000, 3).await;

    let session = engine.create_session("store1", "R1", None).await.unwrap();
    engine.add_to_cart(&session.id, &wig.id, 1).await.unwrap();

    let sale = engine
        .complete_transaction(&session.id, PaymentMethod::Cash)
        .await
        .unwrap();

    let err = engine
        .complete_transaction(&session.id, PaymentMethod::ExternalCard)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Core(CoreError::AlreadyCompleted(_))
    ));

    // Stock decremented exactly once, original record stands.
    assert_eq!(engine.stock_level(&wig.id).await.unwrap().physical_qty, 2);
    let stored = engine.transaction_for_session(&session.id).await.unwrap().unwrap();
    assert_eq!(stored.transaction.id, sale.transaction.id);
    assert_eq!(stored.transaction.payment_method, PaymentMethod::Cash);
}

#[tokio::test]
async fn test_empty_cart_cannot_complete() {
    let (_db, engine) = setup().await;

    let session = engine.create_session("store1", "R1", None).await.unwrap();
    let err = engine
        .complete_transaction(&session.id, PaymentMethod::Cash)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::EmptyCart(_))));
}

#[tokio::test]
async fn test_commit_short_aborts_and_allows_retry() {
    let (db, engine) = setup().await;
    let wig = seed(&db, &engine, "WIG-001", 12000, 3).await;

    let session = engine.create_session("store1", "R1", None).await.unwrap();
    engine.add_to_cart(&session.id, &wig.id, 2).await.unwrap();

    // Stocktake correction invalidates the hold before checkout.
    engine.set_physical_stock(&wig.id, 1).await.unwrap();

    let err = engine
        .complete_transaction(&session.id, PaymentMethod::Cash)
        .await
        .unwrap_err();
    match err {
        EngineError::CommitShort(lines) => {
            assert_eq!(lines.len(), 1);
            assert_eq!(lines[0].sku_id, wig.id);
            assert_eq!(lines[0].available, 1);
            assert_eq!(lines[0].requested, 2);
        }
        other => panic!("expected CommitShort, got {other}"),
    }

    // Nothing was written; the session can be corrected and retried.
    assert!(engine.transaction_for_session(&session.id).await.unwrap().is_none());
    engine.set_physical_stock(&wig.id, 2).await.unwrap();
    let sale = engine
        .complete_transaction(&session.id, PaymentMethod::Cash)
        .await
        .unwrap();
    assert_eq!(sale.items[0].quantity, 2);
    assert_eq!(engine.stock_level(&wig.id).await.unwrap().physical_qty, 0);
}

#[tokio::test]
async fn test_expired_session_lapses_on_touch() {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let engine = PosEngine::new(db.clone(), EngineConfig::default().with_session_ttl_hours(0));
    let wig = seed(&db, &engine, "WIG-001", 12000, 3).await;

    let session = engine.create_session("store1", "R1", None).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    let err = engine.add_to_cart(&session.id, &wig.id, 1).await.unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::SessionExpired(_))));

    let lapsed = engine.get_session(&session.id).await.unwrap();
    assert_eq!(lapsed.status, SessionStatus::Expired);

    // Register is free: the squatter no longer blocks a new sale.
    assert!(engine.active_session("store1", "R1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_customer_draft_saved_and_frozen_on_receipt() {
    let (db, engine) = setup().await;
    let wig = seed(&db, &engine, "WIG-001", 12000, 3).await;

    let session = engine.create_session("store1", "R1", None).await.unwrap();
    engine.add_to_cart(&session.id, &wig.id, 1).await.unwrap();

    let draft = CustomerInfo {
        name: "Amina Bello".to_string(),
        email: Some("amina@example.com".to_string()),
        phone: None,
    };
    engine.set_customer_draft(&session.id, Some(draft)).await.unwrap();
    let linked = engine.save_customer(&session.id).await.unwrap();
    let customer_id = linked.customer_id.clone().unwrap();

    let sale = engine
        .complete_transaction(&session.id, PaymentMethod::ExternalCard)
        .await
        .unwrap();
    assert_eq!(sale.transaction.customer_id.as_deref(), Some(customer_id.as_str()));
    assert_eq!(sale.transaction.customer_name.as_deref(), Some("Amina Bello"));

    // The saved record is findable for the next visit.
    let found = engine.search_customers("store1", "Amina", 10).await.unwrap();
    assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn test_invalid_customer_draft_rejected_on_save() {
    let (_db, engine) = setup().await;

    let session = engine.create_session("store1", "R1", None).await.unwrap();
    let draft = CustomerInfo {
        name: "Amina".to_string(),
        email: Some("not-an-email".to_string()),
        phone: None,
    };
    engine.set_customer_draft(&session.id, Some(draft)).await.unwrap();

    let err = engine.save_customer(&session.id).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Core(CoreError::Validation(_))
    ));

    // Invalid drafts sit on the session unharmed.
    let reloaded = engine.get_session(&session.id).await.unwrap();
    assert!(reloaded.customer.is_some());
    assert!(reloaded.customer_id.is_none());
}

#[tokio::test]
async fn test_held_sessions_listing_drops_expired() {
    let (db, engine) = setup().await;

    let fleeting = engine.create_session("store1", "R1", None).await.unwrap();
    engine.hold_session(&fleeting.id, None).await.unwrap();

    let lasting = engine.create_session("store1", "R2", None).await.unwrap();
    engine.hold_session(&lasting.id, Some("lunch")).await.unwrap();

    // Push the first hold past its deadline.
    sqlx::query("UPDATE sessions SET expires_at = ?1 WHERE id = ?2")
        .bind(chrono::Utc::now() - chrono::Duration::hours(1))
        .bind(&fleeting.id)
        .execute(db.pool())
        .await
        .unwrap();

    let held = engine.list_held_sessions("store1").await.unwrap();
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].id, lasting.id);

    let gone = engine.get_session(&fleeting.id).await.unwrap();
    assert_eq!(gone.status, SessionStatus::Expired);
}
