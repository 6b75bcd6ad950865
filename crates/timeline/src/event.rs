use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use offerflow_core::AggregateId;
use offerflow_offers::OfferId;

/// Timeline event identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimelineEventId(pub AggregateId);

impl TimelineEventId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for TimelineEventId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Persisted timeline event types.
///
/// The log is long-lived; an old record whose type this build no longer
/// knows must still render, so deserialization falls back to `Unknown`
/// instead of failing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimelineEventKind {
    #[serde(rename = "REQUEST_APPROVED")]
    RequestApproved,
    #[serde(rename = "OFFER_CREATED")]
    OfferCreated,
    #[serde(rename = "OFFER_STARTED")]
    OfferStarted,
    #[serde(rename = "OFFER_SUBMITTED")]
    OfferSubmitted,
    #[serde(rename = "MANAGER_ACCEPTED")]
    ManagerAccepted,
    #[serde(rename = "MANAGER_REJECTED")]
    ManagerRejected,
    #[serde(rename = "FINANCE_ACCEPTED")]
    FinanceAccepted,
    #[serde(rename = "FINANCE_PARTIALLY_ACCEPTED")]
    FinancePartiallyAccepted,
    #[serde(rename = "FINANCE_REJECTED")]
    FinanceRejected,
    #[serde(rename = "SENT_TO_FINALIZING")]
    SentToFinalizing,
    #[serde(rename = "OFFER_RETRIED")]
    OfferRetried,
    #[serde(rename = "OFFER_SPLIT")]
    OfferSplit,
    #[serde(rename = "OFFER_FINALIZED")]
    OfferFinalized,
    #[serde(rename = "OFFER_COMPLETED")]
    OfferCompleted,
    #[serde(other)]
    Unknown,
}

impl TimelineEventKind {
    pub fn is_manager_decision(self) -> bool {
        matches!(
            self,
            TimelineEventKind::ManagerAccepted | TimelineEventKind::ManagerRejected
        )
    }

    pub fn is_finance_decision(self) -> bool {
        matches!(
            self,
            TimelineEventKind::FinanceAccepted
                | TimelineEventKind::FinancePartiallyAccepted
                | TimelineEventKind::FinanceRejected
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TimelineEventKind::OfferFinalized | TimelineEventKind::OfferCompleted
        )
    }
}

/// Date/user field labels per event type; unknown types get the generic pair.
pub fn field_labels(kind: TimelineEventKind) -> (&'static str, &'static str) {
    match kind {
        TimelineEventKind::RequestApproved => ("Approved at", "Approved by"),
        TimelineEventKind::OfferCreated => ("Created at", "Created by"),
        TimelineEventKind::OfferStarted => ("Started at", "Started by"),
        TimelineEventKind::OfferSubmitted => ("Submitted at", "Submitted by"),
        TimelineEventKind::ManagerAccepted => ("Accepted at", "Accepted by"),
        TimelineEventKind::ManagerRejected => ("Rejected at", "Rejected by"),
        TimelineEventKind::FinanceAccepted => ("Accepted at", "Accepted by"),
        TimelineEventKind::FinancePartiallyAccepted => ("Reviewed at", "Reviewed by"),
        TimelineEventKind::FinanceRejected => ("Rejected at", "Rejected by"),
        TimelineEventKind::SentToFinalizing => ("Sent at", "Sent by"),
        TimelineEventKind::OfferRetried => ("Retried at", "Retried by"),
        TimelineEventKind::OfferSplit => ("Split at", "Split by"),
        TimelineEventKind::OfferFinalized => ("Finalized at", "Finalized by"),
        TimelineEventKind::OfferCompleted => ("Completed at", "Completed by"),
        TimelineEventKind::Unknown => ("Processed at", "Processed by"),
    }
}

/// One persisted timeline record. Immutable: produced as a side effect of a
/// state transition, never edited or reordered afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub id: TimelineEventId,
    pub offer_id: OfferId,
    pub kind: TimelineEventKind,
    pub event_time: DateTime<Utc>,
    pub action_by: String,
    /// Rejection reason and similar free-form context.
    pub notes: Option<String>,
    pub attempt_number: u32,
    pub display_title: String,
    pub display_description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_event_types_deserialize_to_unknown() {
        let kind: TimelineEventKind = serde_json::from_str("\"SOME_FUTURE_TYPE\"").unwrap();
        assert_eq!(kind, TimelineEventKind::Unknown);
        assert_eq!(field_labels(kind), ("Processed at", "Processed by"));
    }

    #[test]
    fn known_event_types_round_trip_their_wire_names() {
        let json = serde_json::to_string(&TimelineEventKind::FinancePartiallyAccepted).unwrap();
        assert_eq!(json, "\"FINANCE_PARTIALLY_ACCEPTED\"");
    }
}
