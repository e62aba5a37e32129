//! End-to-end flows across the ledger, documents and query facade.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use ledgerkit_core::{AggregateId, Money, Retryable, TenantId};
use ledgerkit_documents::{
    DocumentType, LineItem, LineItemId, Payment, PaymentId, PaymentKind,
};
use ledgerkit_stock::{Direction, MaterialId, MovementId, ShelfId, StockMovement};

use crate::config::RuntimeConfig;
use crate::document_store::{DocumentStore, NewDocument};
use crate::sequencer::InMemorySequencer;
use crate::stock_ledger::InMemoryStockLedger;
use crate::with_retries;

fn test_config() -> RuntimeConfig {
    RuntimeConfig {
        lock_timeout_ms: 5_000,
        ..RuntimeConfig::default()
    }
}

fn movement(
    tenant_id: TenantId,
    material_id: MaterialId,
    shelf_id: Option<ShelfId>,
    direction: Direction,
    amount: Decimal,
    expiration: Option<NaiveDate>,
) -> StockMovement {
    StockMovement::new(
        MovementId::new(AggregateId::new()),
        tenant_id,
        material_id,
        shelf_id,
        direction,
        amount,
        expiration,
        Utc::now(),
    )
    .unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn movements_flow_through_views_queries_and_bus() {
    let ledger = InMemoryStockLedger::in_memory(test_config());
    let subscription = ledgerkit_events::EventBus::subscribe(ledger.bus());

    let tenant_id = TenantId::new();
    let material_id = MaterialId::new(AggregateId::new());
    let shelf_id = ShelfId::new(AggregateId::new());

    ledger
        .apply(movement(
            tenant_id,
            material_id,
            Some(shelf_id),
            Direction::In,
            dec!(10),
            Some(date(2025, 1, 1)),
        ))
        .unwrap();
    ledger
        .apply(movement(
            tenant_id,
            material_id,
            Some(shelf_id),
            Direction::In,
            dec!(5),
            Some(date(2025, 2, 1)),
        ))
        .unwrap();
    ledger
        .apply(movement(
            tenant_id,
            material_id,
            Some(shelf_id),
            Direction::Out,
            dec!(3),
            Some(date(2025, 1, 1)),
        ))
        .unwrap();

    let queries = ledger.queries();
    assert_eq!(queries.current_stock(tenant_id, material_id), dec!(12));
    assert_eq!(
        queries.earliest_expiration(tenant_id, material_id),
        Some(date(2025, 1, 1))
    );

    let lots = queries.lots_for(tenant_id, material_id);
    assert_eq!(lots.len(), 2);
    assert_eq!(lots[0].amount, dec!(7));
    assert_eq!(lots[1].amount, dec!(5));

    let contents = queries.contents_for(tenant_id, shelf_id);
    assert_eq!(contents.len(), 2);
    assert!(ledger.check_agreement(tenant_id, material_id, shelf_id));

    // Each committed movement was published with its stream position.
    for expected_seq in 1..=3u64 {
        let envelope = subscription.try_recv().unwrap();
        assert_eq!(envelope.tenant_id(), tenant_id);
        assert_eq!(envelope.sequence_number(), expected_seq);
    }
    assert!(subscription.try_recv().is_err());
}

#[test]
fn rejected_withdrawal_leaves_no_partial_update() {
    let ledger = InMemoryStockLedger::in_memory(test_config());
    let tenant_id = TenantId::new();
    let material_id = MaterialId::new(AggregateId::new());
    let shelf_id = ShelfId::new(AggregateId::new());

    ledger
        .apply(movement(
            tenant_id,
            material_id,
            Some(shelf_id),
            Direction::In,
            dec!(5),
            None,
        ))
        .unwrap();

    let err = ledger
        .apply(movement(
            tenant_id,
            material_id,
            Some(shelf_id),
            Direction::Out,
            dec!(9),
            None,
        ))
        .unwrap_err();
    assert!(!err.is_retryable());

    let queries = ledger.queries();
    assert_eq!(queries.current_stock(tenant_id, material_id), dec!(5));
    assert_eq!(queries.contents_for(tenant_id, shelf_id).len(), 1);
    assert!(ledger.check_agreement(tenant_id, material_id, shelf_id));
}

#[test]
fn concurrent_writers_on_one_material_lose_no_updates() {
    let ledger = Arc::new(InMemoryStockLedger::in_memory(test_config()));
    let tenant_id = TenantId::new();
    let material_id = MaterialId::new(AggregateId::new());

    let threads = 8;
    let per_thread = 50;

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            std::thread::spawn(move || {
                for _ in 0..per_thread {
                    with_retries(5, || {
                        ledger.apply(movement(
                            tenant_id,
                            material_id,
                            None,
                            Direction::In,
                            dec!(1),
                            None,
                        ))
                    })
                    .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let expected = Decimal::from(threads * per_thread);
    assert_eq!(
        ledger.queries().current_stock(tenant_id, material_id),
        expected
    );
}

#[test]
fn concurrent_writers_on_disjoint_materials_proceed_independently() {
    let ledger = Arc::new(InMemoryStockLedger::in_memory(test_config()));
    let tenant_id = TenantId::new();
    let materials: Vec<MaterialId> = (0..4).map(|_| MaterialId::new(AggregateId::new())).collect();

    let handles: Vec<_> = materials
        .iter()
        .map(|&material_id| {
            let ledger = Arc::clone(&ledger);
            std::thread::spawn(move || {
                for _ in 0..25 {
                    ledger
                        .apply(movement(
                            tenant_id,
                            material_id,
                            None,
                            Direction::In,
                            dec!(2),
                            None,
                        ))
                        .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    for material_id in materials {
        assert_eq!(
            ledger.queries().current_stock(tenant_id, material_id),
            dec!(50)
        );
    }
}

#[test]
fn deleting_a_line_item_cascades_to_its_movements() {
    let ledger = InMemoryStockLedger::in_memory(test_config());
    let store = DocumentStore::new(test_config(), InMemorySequencer::new());

    let tenant_id = TenantId::new();
    let material_id = MaterialId::new(AggregateId::new());
    let shelf_id = ShelfId::new(AggregateId::new());

    // Stock arrives.
    ledger
        .apply(movement(
            tenant_id,
            material_id,
            Some(shelf_id),
            Direction::In,
            dec!(10),
            None,
        ))
        .unwrap();

    // A sale draws some of it down.
    let sale = store
        .create(
            tenant_id,
            NewDocument {
                id: ledgerkit_documents::DocumentId::new(AggregateId::new()),
                doc_type: DocumentType::Sale,
                tax_included: false,
                currency: None,
                external_number: None,
                source_document: None,
                created_at: Utc::now(),
            },
        )
        .unwrap();
    let sale_id = sale.id_typed();

    let line_item = LineItem::new(
        LineItemId::new(AggregateId::new()),
        Money::new(dec!(40)),
        dec!(3),
        dec!(21),
        dec!(0),
    )
    .unwrap();
    let line_item_id = line_item.id();
    store.add_line_item(tenant_id, sale_id, line_item).unwrap();

    ledger
        .apply(
            movement(
                tenant_id,
                material_id,
                Some(shelf_id),
                Direction::Out,
                dec!(3),
                None,
            )
            .with_origin(line_item_id),
        )
        .unwrap();
    assert_eq!(
        ledger.queries().current_stock(tenant_id, material_id),
        dec!(7)
    );

    // Removing the line removes its movement record; the rebuilt views show
    // the intake alone. No compensating movement is generated.
    store
        .delete_line_item(tenant_id, sale_id, line_item_id, &ledger)
        .unwrap();

    assert_eq!(
        ledger.queries().current_stock(tenant_id, material_id),
        dec!(10)
    );
    assert!(ledger.check_agreement(tenant_id, material_id, shelf_id));

    let doc = store.get(tenant_id, sale_id).unwrap();
    assert_eq!(doc.active_line_items().count(), 0);
}

#[test]
fn deleting_a_document_cascades_through_lines_to_movements() {
    let ledger = InMemoryStockLedger::in_memory(test_config());
    let store = DocumentStore::new(test_config(), InMemorySequencer::new());

    let tenant_id = TenantId::new();
    let material_id = MaterialId::new(AggregateId::new());

    ledger
        .apply(movement(
            tenant_id,
            material_id,
            None,
            Direction::In,
            dec!(6),
            None,
        ))
        .unwrap();

    let doc = store
        .create(
            tenant_id,
            NewDocument {
                id: ledgerkit_documents::DocumentId::new(AggregateId::new()),
                doc_type: DocumentType::Invoice,
                tax_included: false,
                currency: None,
                external_number: None,
                source_document: None,
                created_at: Utc::now(),
            },
        )
        .unwrap();
    let doc_id = doc.id_typed();

    let line_item = LineItem::new(
        LineItemId::new(AggregateId::new()),
        Money::new(dec!(10)),
        dec!(6),
        dec!(0),
        dec!(0),
    )
    .unwrap();
    let line_item_id = line_item.id();
    store.add_line_item(tenant_id, doc_id, line_item).unwrap();

    ledger
        .apply(
            movement(tenant_id, material_id, None, Direction::Out, dec!(6), None)
                .with_origin(line_item_id),
        )
        .unwrap();
    assert_eq!(
        ledger.queries().current_stock(tenant_id, material_id),
        dec!(0)
    );

    store.delete_document(tenant_id, doc_id, &ledger).unwrap();

    let doc = store.get(tenant_id, doc_id).unwrap();
    assert!(doc.is_deleted());
    assert_eq!(
        ledger.queries().current_stock(tenant_id, material_id),
        dec!(6)
    );
}

#[test]
fn document_balances_settle_within_tolerance() {
    let store = DocumentStore::new(test_config(), InMemorySequencer::new());
    let tenant_id = TenantId::new();

    let doc = store
        .create(
            tenant_id,
            NewDocument {
                id: ledgerkit_documents::DocumentId::new(AggregateId::new()),
                doc_type: DocumentType::Invoice,
                tax_included: false,
                currency: Some("EUR".to_string()),
                external_number: None,
                source_document: None,
                created_at: Utc::now(),
            },
        )
        .unwrap();
    let doc_id = doc.id_typed();

    store
        .add_line_item(
            tenant_id,
            doc_id,
            LineItem::new(
                LineItemId::new(AggregateId::new()),
                Money::new(dec!(100)),
                dec!(1),
                dec!(0),
                dec!(0),
            )
            .unwrap(),
        )
        .unwrap();

    store
        .record_payment(
            tenant_id,
            doc_id,
            Payment::new(
                PaymentId::new(AggregateId::new()),
                doc_id,
                Money::new(dec!(99.99)),
                PaymentKind::BankTransfer,
                true,
                Utc::now(),
            )
            .unwrap(),
        )
        .unwrap();

    let totals = store.totals(tenant_id, doc_id).unwrap();
    assert_eq!(totals.total, Money::new(dec!(100)));
    assert!(totals.total_to_pay.is_zero());
}

#[test]
fn reporting_projection_follows_the_bus_idempotently() {
    let ledger = InMemoryStockLedger::in_memory(test_config());
    let subscription = ledgerkit_events::EventBus::subscribe(ledger.bus());

    let tenant_id = TenantId::new();
    let material_id = MaterialId::new(AggregateId::new());

    ledger
        .apply(movement(
            tenant_id,
            material_id,
            None,
            Direction::In,
            dec!(10),
            None,
        ))
        .unwrap();
    ledger
        .apply(movement(
            tenant_id,
            material_id,
            None,
            Direction::Out,
            dec!(4),
            None,
        ))
        .unwrap();

    let projection = crate::stock_activity::StockActivityProjection::new(
        crate::tenant_store::InMemoryTenantStore::new(),
    );

    let mut envelopes = Vec::new();
    while let Ok(envelope) = subscription.try_recv() {
        envelopes.push(envelope);
    }
    assert_eq!(envelopes.len(), 2);

    for envelope in &envelopes {
        projection.apply_envelope(envelope).unwrap();
    }

    let activity = projection.get(tenant_id, &material_id).unwrap();
    assert_eq!(activity.intake_total, dec!(10));
    assert_eq!(activity.withdrawal_total, dec!(4));
    assert_eq!(activity.movement_count, 2);

    // At-least-once delivery: replaying the same envelopes changes nothing.
    for envelope in &envelopes {
        projection.apply_envelope(envelope).unwrap();
    }
    let replayed = projection.get(tenant_id, &material_id).unwrap();
    assert_eq!(replayed, activity);

    // The read model sees nothing from other tenants.
    assert!(projection.list(TenantId::new()).is_empty());
}

#[test]
fn concurrent_document_creation_yields_distinct_numbers() {
    let store = Arc::new(DocumentStore::new(test_config(), InMemorySequencer::new()));
    let tenant_id = TenantId::new();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                (0..25)
                    .map(|_| {
                        store
                            .create(
                                tenant_id,
                                NewDocument {
                                    id: ledgerkit_documents::DocumentId::new(AggregateId::new()),
                                    doc_type: DocumentType::Sale,
                                    tax_included: false,
                                    currency: None,
                                    external_number: None,
                                    source_document: None,
                                    created_at: Utc::now(),
                                },
                            )
                            .unwrap()
                            .number()
                            .to_string()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let numbers: Vec<String> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    let distinct: std::collections::HashSet<&String> = numbers.iter().collect();
    assert_eq!(distinct.len(), 200);
}
