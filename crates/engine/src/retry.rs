//! Retry and split branch construction.
//!
//! Both builders are pure: they produce fully-formed replacement offers and
//! the domain events that shaped them, without touching any store. The
//! caller commits the swap atomically via `OfferStore::commit_split`, so a
//! failure at any point here leaves no half-built state behind.

use chrono::{DateTime, Utc};

use offerflow_core::{Aggregate, WorkflowError};
use offerflow_offers::{
    CarryOverAcceptedItems, CreateOffer, Offer, OfferCommand, OfferEvent, OfferId, OfferItem,
    SeedRequestItems, SendToFinalizing, StartOffer, available_actions, FinanceOutcomeActions,
};
use offerflow_requests::RequestItemFork;

fn drive(
    offer: &mut Offer,
    cmd: OfferCommand,
    out: &mut Vec<OfferEvent>,
) -> Result<(), WorkflowError> {
    let events = offer.handle(&cmd)?;
    for event in &events {
        offer.apply(event);
    }
    out.extend(events);
    Ok(())
}

/// Build the full-retry replacement for `original`.
///
/// The new offer restarts procurement from scratch for the full original
/// quantities: it references the same request order, carries the effective
/// item overlay forward when one exists, and starts at `INPROGRESS` with
/// `retry_count + 1` / `current_attempt_number + 1` and the original as
/// parent.
pub fn build_retry_offer(
    original: &Offer,
    new_id: OfferId,
    actor: &str,
    occurred_at: DateTime<Utc>,
) -> Result<(Offer, Vec<OfferEvent>), WorkflowError> {
    if !original.can_retry() {
        return Err(WorkflowError::invalid_transition(format!(
            "cannot retry an offer in state {}",
            original.status()
        )));
    }
    let request_order = original
        .request_order()
        .cloned()
        .ok_or_else(|| WorkflowError::validation("offer has no request order snapshot"))?;

    let mut offer = Offer::empty(new_id);
    let mut events = Vec::new();

    drive(
        &mut offer,
        OfferCommand::CreateOffer(CreateOffer {
            offer_id: new_id,
            title: original.title().to_string(),
            description: original.description().map(str::to_string),
            request_order,
            created_by: actor.to_string(),
            retry_count: original.retry_count() + 1,
            current_attempt_number: original.current_attempt_number() + 1,
            parent_offer_id: Some(original.id_typed()),
            occurred_at,
        }),
        &mut events,
    )?;

    if let Some(forks) = original.modified_items() {
        drive(
            &mut offer,
            OfferCommand::SeedRequestItems(SeedRequestItems {
                offer_id: new_id,
                forks: forks.to_vec(),
                actor: actor.to_string(),
                occurred_at,
            }),
            &mut events,
        )?;
    }

    drive(
        &mut offer,
        OfferCommand::StartOffer(StartOffer {
            offer_id: new_id,
            actor: actor.to_string(),
            occurred_at,
        }),
        &mut events,
    )?;

    Ok((offer, events))
}

/// The two offers a partial-acceptance split produces.
#[derive(Debug, Clone)]
pub struct SplitBranches {
    pub accepted: Offer,
    pub accepted_events: Vec<OfferEvent>,
    pub remainder: Offer,
    pub remainder_events: Vec<OfferEvent>,
}

/// Build the split of a partially-fulfilled offer: an accepted branch
/// carrying only the finance-accepted items, already at `FINALIZING`, and a
/// remainder branch with fresh unquoted request items for the unfulfilled
/// quantity deltas, at `INPROGRESS`.
///
/// The accepted branch keeps the original's lineage numbers (it is the same
/// attempt, narrowed); the remainder is a new attempt and increments them.
pub fn build_split_branches(
    original: &Offer,
    accepted_id: OfferId,
    remainder_id: OfferId,
    actor: &str,
    occurred_at: DateTime<Utc>,
) -> Result<SplitBranches, WorkflowError> {
    let fulfillment = original.fulfillment();
    match available_actions(&fulfillment) {
        FinanceOutcomeActions::ContinueRetryOrDelete => {}
        FinanceOutcomeActions::FinalizeOnly => {
            return Err(WorkflowError::conflict(
                "offer is fully fulfilled; finalize it instead of splitting",
            ));
        }
        FinanceOutcomeActions::RetryOrDelete => {
            return Err(WorkflowError::validation(
                "no accepted items; there is nothing to carry forward",
            ));
        }
    }
    let request_order = original
        .request_order()
        .cloned()
        .ok_or_else(|| WorkflowError::validation("offer has no request order snapshot"))?;

    let accepted_items: Vec<OfferItem> = original
        .items()
        .iter()
        .filter(|i| i.is_accepted())
        .cloned()
        .collect();

    let mut accepted = Offer::empty(accepted_id);
    let mut accepted_events = Vec::new();
    drive(
        &mut accepted,
        OfferCommand::CreateOffer(CreateOffer {
            offer_id: accepted_id,
            title: original.title().to_string(),
            description: original.description().map(str::to_string),
            request_order,
            created_by: actor.to_string(),
            retry_count: original.retry_count(),
            current_attempt_number: original.current_attempt_number(),
            parent_offer_id: Some(original.id_typed()),
            occurred_at,
        }),
        &mut accepted_events,
    )?;
    drive(
        &mut accepted,
        OfferCommand::CarryOverAcceptedItems(CarryOverAcceptedItems {
            offer_id: accepted_id,
            items: accepted_items,
            actor: actor.to_string(),
            occurred_at,
        }),
        &mut accepted_events,
    )?;
    drive(
        &mut accepted,
        OfferCommand::SendToFinalizing(SendToFinalizing {
            offer_id: accepted_id,
            actor: actor.to_string(),
            occurred_at,
        }),
        &mut accepted_events,
    )?;

    let remainder_forks: Vec<RequestItemFork> = fulfillment
        .unfulfilled_deltas()
        .into_iter()
        .map(|(item_type_id, delta)| RequestItemFork::fresh(item_type_id, delta, None))
        .collect();

    let (remainder, remainder_events) =
        build_remainder_offer(original, remainder_id, remainder_forks, actor, occurred_at)?;

    Ok(SplitBranches {
        accepted,
        accepted_events,
        remainder,
        remainder_events,
    })
}

/// Build a remainder offer: a new attempt seeded with the given fresh
/// request items, started at `INPROGRESS`. Shared by the split engine and
/// the finalization processor's `create_offer_for_remaining` path.
pub fn build_remainder_offer(
    original: &Offer,
    new_id: OfferId,
    forks: Vec<RequestItemFork>,
    actor: &str,
    occurred_at: DateTime<Utc>,
) -> Result<(Offer, Vec<OfferEvent>), WorkflowError> {
    let request_order = original
        .request_order()
        .cloned()
        .ok_or_else(|| WorkflowError::validation("offer has no request order snapshot"))?;

    let mut remainder = Offer::empty(new_id);
    let mut events = Vec::new();
    drive(
        &mut remainder,
        OfferCommand::CreateOffer(CreateOffer {
            offer_id: new_id,
            title: original.title().to_string(),
            description: original.description().map(str::to_string),
            request_order,
            created_by: actor.to_string(),
            retry_count: original.retry_count() + 1,
            current_attempt_number: original.current_attempt_number() + 1,
            parent_offer_id: Some(original.id_typed()),
            occurred_at,
        }),
        &mut events,
    )?;
    drive(
        &mut remainder,
        OfferCommand::SeedRequestItems(SeedRequestItems {
            offer_id: new_id,
            forks,
            actor: actor.to_string(),
            occurred_at,
        }),
        &mut events,
    )?;
    drive(
        &mut remainder,
        OfferCommand::StartOffer(StartOffer {
            offer_id: new_id,
            actor: actor.to_string(),
            occurred_at,
        }),
        &mut events,
    )?;

    Ok((remainder, events))
}
