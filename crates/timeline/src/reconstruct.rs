//! Timeline reconstruction.
//!
//! `build_timeline` merges the persisted event log with the offer's current
//! state. The log may be sparse (created before some event types existed) or
//! carry records a correct transition discipline would not have produced;
//! reconstruction tolerates both and never panics on log contents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use offerflow_offers::{FinanceStatus, Offer, OfferStatus};

use crate::event::{TimelineEvent, TimelineEventKind, field_labels};

/// Display classification of one step.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Completed, positive.
    Active,
    Rejected,
    Partial,
    /// Inferred, not yet happened.
    Pending,
}

/// One display step: either a persisted event or a synthetic placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineStep {
    pub title: String,
    pub description: Option<String>,
    pub status: StepStatus,
    pub date_label: &'static str,
    pub user_label: &'static str,
    pub event_time: Option<DateTime<Utc>>,
    pub action_by: Option<String>,
    pub notes: Option<String>,
    pub attempt_number: Option<u32>,
}

const PENDING_ADDING_SOLUTIONS: &str = "Adding Procurement Solutions";
const PENDING_MANAGEMENT_REVIEW: &str = "Awaiting Management Review";
const PENDING_FINANCE_PROCESSING: &str = "Finance Processing";
const PENDING_AWAITING_FINALIZATION: &str = "Awaiting Finalization";
const PENDING_COMPLETING_FINALIZATION: &str = "Completing Finalization";

fn step_status(kind: TimelineEventKind) -> StepStatus {
    match kind {
        TimelineEventKind::ManagerRejected | TimelineEventKind::FinanceRejected => {
            StepStatus::Rejected
        }
        TimelineEventKind::FinancePartiallyAccepted => StepStatus::Partial,
        _ => StepStatus::Active,
    }
}

/// The single synthetic pending step, if any.
///
/// This is an ordered decision table: each condition is evaluated only when
/// every earlier one failed to match, and a matched condition ends the scan
/// even when it contributes no step. The log can contain records out of step
/// with the offer's status; the priority order resolves those without
/// emitting conflicting placeholders.
pub fn pending_step(offer: &Offer, events: &[TimelineEvent]) -> Option<&'static str> {
    let has_manager_decision = events.iter().any(|e| e.kind.is_manager_decision());
    let has_finance_decision = events.iter().any(|e| e.kind.is_finance_decision())
        || matches!(
            offer.finance_status(),
            Some(FinanceStatus::Accepted)
                | Some(FinanceStatus::PartiallyAccepted)
                | Some(FinanceStatus::Rejected)
        );
    let has_terminal_event = events.iter().any(|e| e.kind.is_terminal());

    if matches!(
        offer.status(),
        OfferStatus::Unstarted | OfferStatus::InProgress
    ) {
        return Some(PENDING_ADDING_SOLUTIONS);
    }
    if !has_manager_decision && offer.status() == OfferStatus::Submitted {
        return Some(PENDING_MANAGEMENT_REVIEW);
    }
    if offer.status() == OfferStatus::ManagerAccepted && !has_finance_decision {
        return Some(PENDING_FINANCE_PROCESSING);
    }
    if has_finance_decision
        && !matches!(
            offer.status(),
            OfferStatus::Finalizing | OfferStatus::Completed
        )
    {
        if offer.has_accepted_item() {
            return Some(PENDING_AWAITING_FINALIZATION);
        }
        return None;
    }
    if offer.status() == OfferStatus::Finalizing && !has_terminal_event {
        return Some(PENDING_COMPLETING_FINALIZATION);
    }
    None
}

/// Reconstruct the display timeline for an offer.
///
/// `events` are assumed already time-ordered ascending; their relative order
/// is preserved verbatim. Output: optional synthetic approval head, the
/// persisted events, then at most one synthetic pending step.
pub fn build_timeline(offer: &Offer, events: &[TimelineEvent]) -> Vec<TimelineStep> {
    let mut steps = Vec::with_capacity(events.len() + 2);

    if let Some(order) = offer.request_order() {
        if let Some(approval) = &order.approval {
            let (date_label, user_label) = field_labels(TimelineEventKind::RequestApproved);
            steps.push(TimelineStep {
                title: "Request Approved".to_string(),
                description: Some(order.title.clone()),
                status: StepStatus::Active,
                date_label,
                user_label,
                event_time: Some(approval.approved_at),
                action_by: Some(approval.approved_by.clone()),
                notes: None,
                attempt_number: None,
            });
        }
    }

    for event in events {
        let (date_label, user_label) = field_labels(event.kind);
        steps.push(TimelineStep {
            title: event.display_title.clone(),
            description: event.display_description.clone(),
            status: step_status(event.kind),
            date_label,
            user_label,
            event_time: Some(event.event_time),
            action_by: Some(event.action_by.clone()),
            notes: event.notes.clone(),
            attempt_number: Some(event.attempt_number),
        });
    }

    if let Some(title) = pending_step(offer, events) {
        steps.push(TimelineStep {
            title: title.to_string(),
            description: None,
            status: StepStatus::Pending,
            date_label: "Pending",
            user_label: "Pending",
            event_time: None,
            action_by: None,
            notes: None,
            attempt_number: None,
        });
    }

    steps
}
