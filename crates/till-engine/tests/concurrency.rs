//! Races between registers: the last unit of stock, simultaneous
//! finalizes, and two terminals grabbing the same register.

use till_core::{Cart, CoreError, PaymentMethod, SessionPatch, SessionStatus};
use till_db::repository::product::seed_product;
use till_db::{Database, DbConfig};
use till_engine::{EngineConfig, EngineError, PosEngine};

async fn setup() -> (Database, PosEngine) {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let engine = PosEngine::new(db.clone(), EngineConfig::default());
    (db, engine)
}

#[tokio::test]
async fn test_two_registers_race_for_last_unit() {
    let (db, engine) = setup().await;
    let product = seed_product("store1", "WIG-001", "Lace Front Wig", 12000);
    db.products().insert(&product).await.unwrap();
    engine.set_physical_stock(&product.id, 1).await.unwrap();

    let a = engine.create_session("store1", "R1", None).await.unwrap();
    let b = engine.create_session("store1", "R2", None).await.unwrap();

    let (res_a, res_b) = tokio::join!(
        engine.add_to_cart(&a.id, &product.id, 1),
        engine.add_to_cart(&b.id, &product.id, 1),
    );

    // Exactly one winner, and the loser saw zero availability.
    let successes = [res_a.is_ok(), res_b.is_ok()];
    assert_eq!(successes.iter().filter(|s| **s).count(), 1);
    for res in [res_a, res_b] {
        if let Err(err) = res {
            match err {
                EngineError::Core(CoreError::InsufficientStock { available, .. }) => {
                    assert_eq!(available, 0);
                }
                other => panic!("expected InsufficientStock, got {other}"),
            }
        }
    }

    let level = engine.stock_level(&product.id).await.unwrap();
    assert_eq!(level.reserved_qty, 1);
    assert_eq!(level.available_qty, 0);
}

#[tokio::test]
async fn test_simultaneous_finalize_decrements_once() {
    let (db, engine) = setup().await;
    let product = seed_product("store1", "WIG-001", "Lace Front Wig", 12000);
    db.products().insert(&product).await.unwrap();
    engine.set_physical_stock(&product.id, 5).await.unwrap();

    let session = engine.create_session("store1", "R1", None).await.unwrap();
    engine.add_to_cart(&session.id, &product.id, 2).await.unwrap();

    let (first, second) = tokio::join!(
        engine.complete_transaction(&session.id, PaymentMethod::Cash),
        engine.complete_transaction(&session.id, PaymentMethod::Cash),
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for res in &results {
        if let Err(err) = res {
            assert!(
                matches!(err, EngineError::Core(CoreError::AlreadyCompleted(_))),
                "loser should see AlreadyCompleted, got {err}"
            );
        }
    }

    // Decremented once, exactly one record.
    assert_eq!(engine.stock_level(&product.id).await.unwrap().physical_qty, 3);
    assert!(engine.transaction_for_session(&session.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_update_racing_void_never_strands_holds() {
    // A snapshot patch and a void can interleave so that the void
    // releases the holds and the patch re-acquires them afterwards.
    // Whatever order the race resolves in, a voided session must end up
    // holding nothing. Repeated because the interleaving is scheduler-
    // dependent.
    for _ in 0..20 {
        let (db, engine) = setup().await;
        let product = seed_product("store1", "WIG-001", "Lace Front Wig", 12000);
        db.products().insert(&product).await.unwrap();
        engine.set_physical_stock(&product.id, 5).await.unwrap();

        let session = engine.create_session("store1", "R1", None).await.unwrap();
        engine.add_to_cart(&session.id, &product.id, 1).await.unwrap();

        let mut cart = Cart::new();
        cart.add_item(&product, 3).unwrap();
        let patch = SessionPatch {
            cart: Some(cart),
            ..SessionPatch::default()
        };

        let (updated, voided) = tokio::join!(
            engine.update_session(&session.id, patch),
            engine.void_session(&session.id, "customer left"),
        );
        // The void always lands; the patch either beat it or was rejected.
        voided.unwrap();
        drop(updated);

        let after = engine.get_session(&session.id).await.unwrap();
        assert_eq!(after.status, SessionStatus::Voided);
        let level = engine.stock_level(&product.id).await.unwrap();
        assert_eq!(level.reserved_qty, 0, "voided session left a stranded hold");
        assert_eq!(level.physical_qty, 5);
    }
}

#[tokio::test]
async fn test_simultaneous_create_yields_one_session() {
    let (_db, engine) = setup().await;

    let (first, second) = tokio::join!(
        engine.create_session("store1", "R1", None),
        engine.create_session("store1", "R1", None),
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for res in &results {
        if let Err(err) = res {
            assert!(matches!(
                err,
                EngineError::Core(CoreError::DuplicateActiveSession { .. })
            ));
        }
    }
}
