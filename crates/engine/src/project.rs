//! Projection of domain events into persisted timeline records.
//!
//! Only lifecycle milestones become timeline records; content edits (offer
//! items, request item amendments) are visible through the offer itself and
//! the modification history, not the timeline.

use offerflow_core::AggregateId;
use offerflow_offers::{FinanceStatus, Offer, OfferEvent};
use offerflow_timeline::{TimelineEvent, TimelineEventId, TimelineEventKind};

/// User-facing lineage note, shown on the created step of a retry attempt.
pub fn attempt_description(attempt_number: u32) -> Option<String> {
    if attempt_number <= 1 {
        return None;
    }
    let previous = attempt_number - 1;
    if previous == 1 {
        Some(format!("Attempt #{attempt_number} after 1 previous attempt"))
    } else {
        Some(format!(
            "Attempt #{attempt_number} after {previous} previous attempts"
        ))
    }
}

/// Translate one domain event into its timeline record, if it is a
/// milestone. `offer` is the post-apply aggregate, used for attempt lineage.
pub fn project(offer: &Offer, event: &OfferEvent) -> Option<TimelineEvent> {
    let attempt_number = offer.current_attempt_number();
    let record = |kind: TimelineEventKind,
                  title: &str,
                  description: Option<String>,
                  action_by: String,
                  notes: Option<String>,
                  event_time: chrono::DateTime<chrono::Utc>| {
        TimelineEvent {
            id: TimelineEventId::new(AggregateId::new()),
            offer_id: offer.id_typed(),
            kind,
            event_time,
            action_by,
            notes,
            attempt_number,
            display_title: title.to_string(),
            display_description: description,
        }
    };

    match event {
        OfferEvent::OfferCreated(e) => Some(record(
            TimelineEventKind::OfferCreated,
            "Offer Created",
            attempt_description(e.current_attempt_number),
            e.created_by.clone(),
            None,
            e.occurred_at,
        )),
        OfferEvent::OfferStarted(e) => Some(record(
            TimelineEventKind::OfferStarted,
            "Procurement Started",
            None,
            e.actor.clone(),
            None,
            e.occurred_at,
        )),
        OfferEvent::OfferSubmitted(e) => Some(record(
            TimelineEventKind::OfferSubmitted,
            "Offer Submitted",
            None,
            e.actor.clone(),
            None,
            e.occurred_at,
        )),
        OfferEvent::ManagerAccepted(e) => Some(record(
            TimelineEventKind::ManagerAccepted,
            "Accepted by Management",
            None,
            e.actor.clone(),
            None,
            e.occurred_at,
        )),
        OfferEvent::ManagerRejected(e) => Some(record(
            TimelineEventKind::ManagerRejected,
            "Rejected by Management",
            None,
            e.actor.clone(),
            Some(e.reason.clone()),
            e.occurred_at,
        )),
        OfferEvent::FinanceDecided(e) => {
            let (kind, title) = match e.outcome {
                FinanceStatus::Accepted => {
                    (TimelineEventKind::FinanceAccepted, "Accepted by Finance")
                }
                FinanceStatus::PartiallyAccepted => (
                    TimelineEventKind::FinancePartiallyAccepted,
                    "Partially Accepted by Finance",
                ),
                FinanceStatus::Rejected => {
                    (TimelineEventKind::FinanceRejected, "Rejected by Finance")
                }
                // handle() never emits a pending outcome.
                FinanceStatus::PendingFinanceReview => return None,
            };
            Some(record(
                kind,
                title,
                None,
                e.actor.clone(),
                None,
                e.occurred_at,
            ))
        }
        OfferEvent::SentToFinalizing(e) => Some(record(
            TimelineEventKind::SentToFinalizing,
            "Sent to Finalization",
            None,
            e.actor.clone(),
            None,
            e.occurred_at,
        )),
        OfferEvent::OfferCompleted(e) => Some(record(
            TimelineEventKind::OfferCompleted,
            "Offer Completed",
            None,
            e.finalized_by.clone(),
            None,
            e.occurred_at,
        )),
        // Content edits and branch seeding are not timeline milestones.
        OfferEvent::OfferItemAdded(_)
        | OfferEvent::OfferItemUpdated(_)
        | OfferEvent::OfferItemRemoved(_)
        | OfferEvent::RequestItemsForked(_)
        | OfferEvent::RequestItemAdded(_)
        | OfferEvent::RequestItemAmended(_)
        | OfferEvent::RequestItemRemoved(_)
        | OfferEvent::RequestItemsSeeded(_)
        | OfferEvent::AcceptedItemsCarriedOver(_)
        | OfferEvent::OfferDeleted(_) => None,
    }
}
