//! Black-box tests of the workflow service over the in-memory stores.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};

use chrono::{DateTime, Utc};

use offerflow_core::{AggregateId, WorkflowError};
use offerflow_engine::{
    FinalizationOutcome, InMemoryOfferStore, InMemoryTimelineStore, OfferStore, TimelineStore,
    WorkflowService,
};
use offerflow_offers::{
    AddOfferItem, CreateOffer, FinanceDecide, FinanceStatus, ItemDecision, ItemFinanceStatus,
    ManagerDecide, MerchantId, OfferId, OfferItemDraft, OfferItemId, OfferStatus,
    SendToFinalizing, StartOffer, SubmitOffer,
};
use offerflow_purchasing::{
    PaymentRequestCreator, PurchaseOrderCreator, PurchaseOrderError, PurchaseOrderId,
    PurchaseOrderRequest,
};
use offerflow_requests::{
    Approval, ItemTypeId, RequestItem, RequestItemId, RequestOrder, RequestOrderId,
};
use offerflow_timeline::StepStatus;

#[derive(Default)]
struct StubPurchaseOrders {
    fail: AtomicBool,
    created: Mutex<Vec<PurchaseOrderRequest>>,
}

impl PurchaseOrderCreator for StubPurchaseOrders {
    fn create(
        &self,
        request: &PurchaseOrderRequest,
    ) -> Result<PurchaseOrderId, PurchaseOrderError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PurchaseOrderError::Creation(
                "downstream unavailable".to_string(),
            ));
        }
        self.created
            .lock()
            .expect("stub lock")
            .push(request.clone());
        Ok(PurchaseOrderId::new(AggregateId::new()))
    }
}

#[derive(Default)]
struct StubPaymentRequests {
    fail: AtomicBool,
    created: AtomicUsize,
}

impl PaymentRequestCreator for StubPaymentRequests {
    fn create(
        &self,
        _purchase_order_id: PurchaseOrderId,
        _amount: u64,
        _currency: &str,
    ) -> Result<(), PurchaseOrderError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PurchaseOrderError::PaymentRequest(
                "payment system offline".to_string(),
            ));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A purchase order creator that parks inside `create` until the test lets
/// it continue, exposing the window between PO creation and the store
/// commit.
struct GatedPurchaseOrders {
    entered: Barrier,
    release: Barrier,
    created: AtomicUsize,
}

impl GatedPurchaseOrders {
    fn new() -> Self {
        Self {
            entered: Barrier::new(2),
            release: Barrier::new(2),
            created: AtomicUsize::new(0),
        }
    }
}

impl PurchaseOrderCreator for GatedPurchaseOrders {
    fn create(
        &self,
        _request: &PurchaseOrderRequest,
    ) -> Result<PurchaseOrderId, PurchaseOrderError> {
        self.entered.wait();
        self.release.wait();
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(PurchaseOrderId::new(AggregateId::new()))
    }
}

struct Harness<P = Arc<StubPurchaseOrders>> {
    service: WorkflowService<Arc<InMemoryOfferStore>, Arc<InMemoryTimelineStore>, P, Arc<StubPaymentRequests>>,
    offers: Arc<InMemoryOfferStore>,
    timeline: Arc<InMemoryTimelineStore>,
    purchase_orders: P,
    payments: Arc<StubPaymentRequests>,
}

fn harness_with<P: PurchaseOrderCreator + Clone>(purchase_orders: P) -> Harness<P> {
    offerflow_observability::init();
    let offers = Arc::new(InMemoryOfferStore::new());
    let timeline = Arc::new(InMemoryTimelineStore::new());
    let payments = Arc::new(StubPaymentRequests::default());
    let service = WorkflowService::new(
        offers.clone(),
        timeline.clone(),
        purchase_orders.clone(),
        payments.clone(),
    );
    Harness {
        service,
        offers,
        timeline,
        purchase_orders,
        payments,
    }
}

fn harness() -> Harness {
    harness_with(Arc::new(StubPurchaseOrders::default()))
}

fn now() -> DateTime<Utc> {
    Utc::now()
}

fn approved_order(item_type: ItemTypeId, quantity: i64) -> RequestOrder {
    RequestOrder {
        id: RequestOrderId::new(AggregateId::new()),
        title: "Field sensors".to_string(),
        items: vec![RequestItem {
            id: RequestItemId::new(AggregateId::new()),
            item_type_id: item_type,
            quantity,
            comment: None,
        }],
        approval: Some(Approval {
            approved_by: "dept-head".to_string(),
            approved_at: now(),
        }),
    }
}

fn create_started_offer<P: PurchaseOrderCreator>(
    h: &Harness<P>,
    item_type: ItemTypeId,
    quantity: i64,
) -> OfferId {
    let offer_id = OfferId::new(AggregateId::new());
    h.service
        .create_offer(CreateOffer {
            offer_id,
            title: "Offer for field sensors".to_string(),
            description: None,
            request_order: approved_order(item_type, quantity),
            created_by: "alice".to_string(),
            retry_count: 0,
            current_attempt_number: 1,
            parent_offer_id: None,
            occurred_at: now(),
        })
        .expect("create");
    h.service
        .start(StartOffer {
            offer_id,
            actor: "alice".to_string(),
            occurred_at: now(),
        })
        .expect("start");
    offer_id
}

fn quote<P: PurchaseOrderCreator>(
    h: &Harness<P>,
    offer_id: OfferId,
    item_type: ItemTypeId,
    quantity: i64,
) -> OfferItemId {
    let id = OfferItemId::new(AggregateId::new());
    h.service
        .add_offer_item(AddOfferItem {
            offer_id,
            item: OfferItemDraft {
                id,
                item_type_id: item_type,
                merchant_id: MerchantId::new(AggregateId::new()),
                quantity,
                unit_price: 250,
                currency: "USD".to_string(),
                estimated_delivery_days: Some(10),
                comment: None,
            },
            actor: "alice".to_string(),
            occurred_at: now(),
        })
        .expect("add item");
    id
}

fn submit_and_accept<P: PurchaseOrderCreator>(h: &Harness<P>, offer_id: OfferId) {
    h.service
        .submit(SubmitOffer {
            offer_id,
            actor: "alice".to_string(),
            occurred_at: now(),
        })
        .expect("submit");
    h.service
        .manager_decide(ManagerDecide {
            offer_id,
            accept: true,
            reason: None,
            actor: "manager".to_string(),
            occurred_at: now(),
        })
        .expect("manager accept");
}

fn finance<P: PurchaseOrderCreator>(
    h: &Harness<P>,
    offer_id: OfferId,
    decisions: Vec<(OfferItemId, ItemFinanceStatus)>,
) {
    h.service
        .finance_decide(FinanceDecide {
            offer_id,
            decisions: decisions
                .into_iter()
                .map(|(offer_item_id, status)| ItemDecision {
                    offer_item_id,
                    status,
                })
                .collect(),
            actor: "finance".to_string(),
            occurred_at: now(),
        })
        .expect("finance decide");
}

fn send_to_finalizing<P: PurchaseOrderCreator>(h: &Harness<P>, offer_id: OfferId) {
    h.service
        .send_to_finalizing(SendToFinalizing {
            offer_id,
            actor: "alice".to_string(),
            occurred_at: now(),
        })
        .expect("send to finalizing");
}

#[test]
fn full_lifecycle_runs_to_completion() -> anyhow::Result<()> {
    let h = harness();
    let item_type = ItemTypeId::new(AggregateId::new());
    let offer_id = create_started_offer(&h, item_type, 10);
    let item = quote(&h, offer_id, item_type, 10);
    submit_and_accept(&h, offer_id);
    finance(&h, offer_id, vec![(item, ItemFinanceStatus::Accepted)]);
    send_to_finalizing(&h, offer_id);

    let outcome = h
        .service
        .finalize(offer_id, vec![item], None, "alice", now())?;
    match outcome {
        FinalizationOutcome::Finalized {
            remainder_offer_id,
            payment_request_created,
            ..
        } => {
            assert!(remainder_offer_id.is_none());
            assert!(payment_request_created);
        }
        other => panic!("expected Finalized, got {other:?}"),
    }

    let offer = h.service.get_offer(offer_id)?;
    assert_eq!(offer.status(), OfferStatus::Completed);
    assert!(offer.items()[0].finalized());
    assert_eq!(h.purchase_orders.created.lock().expect("stub lock").len(), 1);
    assert_eq!(h.payments.created.load(Ordering::SeqCst), 1);

    let steps = h.service.get_timeline(offer_id)?;
    assert_eq!(steps[0].title, "Request Approved");
    assert!(steps.iter().any(|s| s.title == "Offer Completed"));
    assert!(steps.iter().all(|s| s.status != StepStatus::Pending));
    Ok(())
}

#[test]
fn manager_rejection_reason_lands_on_the_timeline() -> anyhow::Result<()> {
    let h = harness();
    let item_type = ItemTypeId::new(AggregateId::new());
    let offer_id = create_started_offer(&h, item_type, 4);
    quote(&h, offer_id, item_type, 4);
    h.service.submit(SubmitOffer {
        offer_id,
        actor: "alice".to_string(),
        occurred_at: now(),
    })?;

    let err = h
        .service
        .manager_decide(ManagerDecide {
            offer_id,
            accept: false,
            reason: None,
            actor: "manager".to_string(),
            occurred_at: now(),
        })
        .unwrap_err();
    assert_eq!(err, WorkflowError::MissingRejectionReason);

    h.service.manager_decide(ManagerDecide {
        offer_id,
        accept: false,
        reason: Some("budget exceeded".to_string()),
        actor: "manager".to_string(),
        occurred_at: now(),
    })?;

    let steps = h.service.get_timeline(offer_id)?;
    let rejected = steps
        .iter()
        .find(|s| s.status == StepStatus::Rejected)
        .expect("rejected step");
    assert_eq!(rejected.notes.as_deref(), Some("budget exceeded"));
    Ok(())
}

#[test]
fn concurrent_retries_have_exactly_one_winner() {
    let h = Arc::new(harness());
    let item_type = ItemTypeId::new(AggregateId::new());
    let offer_id = create_started_offer(&h, item_type, 10);
    quote(&h, offer_id, item_type, 10);
    h.service
        .submit(SubmitOffer {
            offer_id,
            actor: "alice".to_string(),
            occurred_at: now(),
        })
        .expect("submit");
    h.service
        .manager_decide(ManagerDecide {
            offer_id,
            accept: false,
            reason: Some("too expensive".to_string()),
            actor: "manager".to_string(),
            occurred_at: now(),
        })
        .expect("reject");

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let h = h.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                h.service.retry_entire_offer(offer_id, "alice", now())
            })
        })
        .collect();
    let results: Vec<_> = handles
        .into_iter()
        .map(|j| j.join().expect("thread"))
        .collect();

    let winners: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
    assert_eq!(winners.len(), 1, "exactly one retry must win: {results:?}");
    // The loser either hit the in-flight lock or arrived after the original
    // was already replaced.
    for r in &results {
        if let Err(err) = r {
            assert!(
                matches!(
                    err,
                    WorkflowError::RetryAlreadyInProgress | WorkflowError::NotFound
                ),
                "unexpected loser error: {err:?}"
            );
        }
    }

    // The store holds exactly the single replacement offer.
    let offers = h.offers.list().expect("list");
    assert_eq!(offers.len(), 1);
    let retried = &offers[0];
    assert_eq!(retried.status(), OfferStatus::InProgress);
    assert_eq!(retried.retry_count(), 1);
    assert_eq!(retried.current_attempt_number(), 2);
    assert_eq!(retried.parent_offer_id(), Some(offer_id));
    assert!(h.offers.get(offer_id).is_err());
}

#[test]
fn partial_acceptance_split_leaves_two_independent_offers() -> anyhow::Result<()> {
    let h = harness();
    let item_type = ItemTypeId::new(AggregateId::new());
    let offer_id = create_started_offer(&h, item_type, 10);
    let accepted_quote = quote(&h, offer_id, item_type, 5);
    let rejected_quote = quote(&h, offer_id, item_type, 5);
    submit_and_accept(&h, offer_id);
    finance(
        &h,
        offer_id,
        vec![
            (accepted_quote, ItemFinanceStatus::Accepted),
            (rejected_quote, ItemFinanceStatus::Rejected),
        ],
    );
    assert_eq!(
        h.service.get_offer(offer_id)?.finance_status(),
        Some(FinanceStatus::PartiallyAccepted)
    );

    let split = h.service.continue_and_return(offer_id, "alice", now())?;

    assert_eq!(split.accepted.status(), OfferStatus::Finalizing);
    assert_eq!(split.accepted.items().len(), 1);
    assert_eq!(split.accepted.items()[0].quantity(), 5);

    assert_eq!(split.remainder.status(), OfferStatus::InProgress);
    assert!(split.remainder.items().is_empty());
    let effective = split.remainder.effective_request_items();
    assert_eq!(effective.len(), 1);
    assert_eq!(effective[0].quantity, 5);
    assert_eq!(split.remainder.current_attempt_number(), 2);

    // The original is gone, replaced by both branches.
    assert!(h.service.get_offer(offer_id).is_err());
    assert!(h.service.get_offer(split.accepted.id_typed()).is_ok());
    assert!(h.service.get_offer(split.remainder.id_typed()).is_ok());

    // Both branches reconstruct a timeline of their own.
    let steps = h.service.get_timeline(split.remainder.id_typed())?;
    assert!(steps.iter().any(|s| s.title == "Offer Split"));
    Ok(())
}

#[test]
fn continue_and_return_is_rejected_when_nothing_was_accepted() -> anyhow::Result<()> {
    let h = harness();
    let item_type = ItemTypeId::new(AggregateId::new());
    let offer_id = create_started_offer(&h, item_type, 10);
    let item = quote(&h, offer_id, item_type, 10);
    submit_and_accept(&h, offer_id);
    finance(&h, offer_id, vec![(item, ItemFinanceStatus::Rejected)]);

    let err = h
        .service
        .continue_and_return(offer_id, "alice", now())
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));
    // The offer is untouched and still retriable.
    assert!(h.service.get_offer(offer_id)?.can_retry());
    Ok(())
}

#[test]
fn failed_purchase_order_creation_leaves_the_offer_untouched() -> anyhow::Result<()> {
    let h = harness();
    let item_type = ItemTypeId::new(AggregateId::new());
    let offer_id = create_started_offer(&h, item_type, 10);
    let item = quote(&h, offer_id, item_type, 10);
    submit_and_accept(&h, offer_id);
    finance(&h, offer_id, vec![(item, ItemFinanceStatus::Accepted)]);
    send_to_finalizing(&h, offer_id);

    h.purchase_orders.fail.store(true, Ordering::SeqCst);
    let err = h
        .service
        .finalize(offer_id, vec![item], None, "alice", now())
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Conflict(_)));

    let offer = h.service.get_offer(offer_id)?;
    assert_eq!(offer.status(), OfferStatus::Finalizing);
    assert!(!offer.items()[0].finalized());
    assert_eq!(h.payments.created.load(Ordering::SeqCst), 0);
    let steps = h.service.get_timeline(offer_id)?;
    assert!(steps.iter().all(|s| s.title != "Offer Completed"));

    // The same call succeeds once the downstream recovers.
    h.purchase_orders.fail.store(false, Ordering::SeqCst);
    let outcome = h
        .service
        .finalize(offer_id, vec![item], None, "alice", now())?;
    assert!(matches!(outcome, FinalizationOutcome::Finalized { .. }));
    Ok(())
}

#[test]
fn payment_request_failure_degrades_but_completes() -> anyhow::Result<()> {
    let h = harness();
    let item_type = ItemTypeId::new(AggregateId::new());
    let offer_id = create_started_offer(&h, item_type, 10);
    let item = quote(&h, offer_id, item_type, 10);
    submit_and_accept(&h, offer_id);
    finance(&h, offer_id, vec![(item, ItemFinanceStatus::Accepted)]);
    send_to_finalizing(&h, offer_id);

    h.payments.fail.store(true, Ordering::SeqCst);
    let outcome = h
        .service
        .finalize(offer_id, vec![item], None, "alice", now())?;
    match &outcome {
        FinalizationOutcome::Finalized {
            payment_request_created,
            ..
        } => assert!(!payment_request_created),
        other => panic!("expected Finalized, got {other:?}"),
    }
    assert!(matches!(
        outcome.degradation(),
        Some(WorkflowError::FinalizationPartialFailure(_))
    ));
    assert_eq!(h.service.get_offer(offer_id)?.status(), OfferStatus::Completed);
    Ok(())
}

#[test]
fn finalize_pauses_until_the_remainder_decision_is_explicit() -> anyhow::Result<()> {
    let h = harness();
    let item_type = ItemTypeId::new(AggregateId::new());
    let offer_id = create_started_offer(&h, item_type, 10);
    let accepted_quote = quote(&h, offer_id, item_type, 6);
    let rejected_quote = quote(&h, offer_id, item_type, 4);
    submit_and_accept(&h, offer_id);
    finance(
        &h,
        offer_id,
        vec![
            (accepted_quote, ItemFinanceStatus::Accepted),
            (rejected_quote, ItemFinanceStatus::Rejected),
        ],
    );
    send_to_finalizing(&h, offer_id);

    // Undecided remainder: the processor pauses instead of guessing.
    let outcome = h
        .service
        .finalize(offer_id, vec![accepted_quote], None, "alice", now())?;
    match outcome {
        FinalizationOutcome::RemainderDecisionRequired {
            unfinalized_item_ids,
        } => assert_eq!(unfinalized_item_ids, vec![rejected_quote]),
        other => panic!("expected RemainderDecisionRequired, got {other:?}"),
    }
    assert_eq!(h.service.get_offer(offer_id)?.status(), OfferStatus::Finalizing);

    // Explicit yes: completion plus a remainder offer for the leftovers.
    let outcome = h
        .service
        .finalize(offer_id, vec![accepted_quote], Some(true), "alice", now())?;
    let remainder_id = match outcome {
        FinalizationOutcome::Finalized {
            remainder_offer_id, ..
        } => remainder_offer_id.expect("remainder offer"),
        other => panic!("expected Finalized, got {other:?}"),
    };

    assert_eq!(h.service.get_offer(offer_id)?.status(), OfferStatus::Completed);
    let remainder = h.service.get_offer(remainder_id)?;
    assert_eq!(remainder.status(), OfferStatus::InProgress);
    assert_eq!(remainder.effective_request_items()[0].quantity, 4);
    assert_eq!(remainder.current_attempt_number(), 2);
    Ok(())
}

#[test]
fn concurrent_delete_cannot_orphan_a_purchase_order() {
    let h = Arc::new(harness_with(Arc::new(GatedPurchaseOrders::new())));
    let item_type = ItemTypeId::new(AggregateId::new());
    let offer_id = create_started_offer(&h, item_type, 10);
    let item = quote(&h, offer_id, item_type, 10);
    submit_and_accept(&h, offer_id);
    finance(&h, offer_id, vec![(item, ItemFinanceStatus::Accepted)]);
    send_to_finalizing(&h, offer_id);

    let finalizer = {
        let h = h.clone();
        std::thread::spawn(move || h.service.finalize(offer_id, vec![item], None, "alice", now()))
    };

    // Rendezvous inside purchase order creation: finalize is mid-flight,
    // after validation but before the store commit.
    h.purchase_orders.entered.wait();
    let err = h.service.delete(offer_id, "mallory", now()).unwrap_err();
    assert_eq!(err, WorkflowError::RetryAlreadyInProgress);
    h.purchase_orders.release.wait();

    let outcome = finalizer
        .join()
        .expect("finalizer thread")
        .expect("finalize succeeds");
    assert!(matches!(outcome, FinalizationOutcome::Finalized { .. }));
    assert_eq!(h.purchase_orders.created.load(Ordering::SeqCst), 1);
    // The completed offer backs the purchase order; nothing was orphaned.
    let offer = h.service.get_offer(offer_id).expect("offer survives");
    assert_eq!(offer.status(), OfferStatus::Completed);
}

#[test]
fn delete_removes_the_offer_and_its_timeline() -> anyhow::Result<()> {
    let h = harness();
    let item_type = ItemTypeId::new(AggregateId::new());
    let offer_id = create_started_offer(&h, item_type, 10);

    h.service.delete(offer_id, "alice", now())?;

    assert!(matches!(
        h.service.get_offer(offer_id).unwrap_err(),
        WorkflowError::NotFound
    ));
    assert!(h.timeline.events_for(offer_id).expect("events").is_empty());
    Ok(())
}
