use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use offerflow_core::{Aggregate, AggregateId, AggregateRoot, Event, WorkflowError};
use offerflow_requests::{
    EffectiveRequestItem, ItemTypeId, ModificationHistoryEntry, ModificationKind, RequestItemFork,
    RequestOrder, effective_items,
};

use crate::fulfillment::{Fulfillment, classify};
use crate::item::{ItemFinanceStatus, OfferItem, OfferItemDraft, OfferItemId};

/// Offer identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OfferId(pub AggregateId);

impl OfferId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OfferId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Offer status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OfferStatus {
    #[serde(rename = "UNSTARTED")]
    Unstarted,
    #[serde(rename = "INPROGRESS")]
    InProgress,
    #[serde(rename = "SUBMITTED")]
    Submitted,
    #[serde(rename = "MANAGERACCEPTED")]
    ManagerAccepted,
    #[serde(rename = "MANAGERREJECTED")]
    ManagerRejected,
    #[serde(rename = "FINALIZING")]
    Finalizing,
    #[serde(rename = "COMPLETED")]
    Completed,
}

impl core::fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            OfferStatus::Unstarted => "UNSTARTED",
            OfferStatus::InProgress => "INPROGRESS",
            OfferStatus::Submitted => "SUBMITTED",
            OfferStatus::ManagerAccepted => "MANAGERACCEPTED",
            OfferStatus::ManagerRejected => "MANAGERREJECTED",
            OfferStatus::Finalizing => "FINALIZING",
            OfferStatus::Completed => "COMPLETED",
        };
        f.write_str(s)
    }
}

/// Finance sub-state, tracked once the manager has accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinanceStatus {
    #[serde(rename = "PENDING_FINANCE_REVIEW")]
    PendingFinanceReview,
    #[serde(rename = "FINANCE_ACCEPTED")]
    Accepted,
    #[serde(rename = "FINANCE_PARTIALLY_ACCEPTED")]
    PartiallyAccepted,
    #[serde(rename = "FINANCE_REJECTED")]
    Rejected,
}

/// Per-item finance decision input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDecision {
    pub offer_item_id: OfferItemId,
    pub status: ItemFinanceStatus,
}

/// Aggregate root: Offer.
///
/// One procurement proposal against a request order, moving through manager
/// approval, finance review and finalization. Every transition goes through
/// `handle`/`apply`; nothing mutates status directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offer {
    id: OfferId,
    title: String,
    description: Option<String>,
    status: OfferStatus,
    finance_status: Option<FinanceStatus>,
    created_at: Option<DateTime<Utc>>,
    created_by: Option<String>,
    retry_count: u32,
    current_attempt_number: u32,
    parent_offer_id: Option<OfferId>,
    request_order: Option<RequestOrder>,
    /// Copy-on-write overlay; once present it is the full effective item set.
    modified_items: Option<Vec<RequestItemFork>>,
    items: Vec<OfferItem>,
    modification_history: Vec<ModificationHistoryEntry>,
    finalized_at: Option<DateTime<Utc>>,
    finalized_by: Option<String>,
    deleted: bool,
    version: u64,
    created: bool,
}

impl Offer {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: OfferId) -> Self {
        Self {
            id,
            title: String::new(),
            description: None,
            status: OfferStatus::Unstarted,
            finance_status: None,
            created_at: None,
            created_by: None,
            retry_count: 0,
            current_attempt_number: 1,
            parent_offer_id: None,
            request_order: None,
            modified_items: None,
            items: Vec::new(),
            modification_history: Vec::new(),
            finalized_at: None,
            finalized_by: None,
            deleted: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OfferId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn status(&self) -> OfferStatus {
        self.status
    }

    pub fn finance_status(&self) -> Option<FinanceStatus> {
        self.finance_status
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn current_attempt_number(&self) -> u32 {
        self.current_attempt_number
    }

    pub fn parent_offer_id(&self) -> Option<OfferId> {
        self.parent_offer_id
    }

    pub fn request_order(&self) -> Option<&RequestOrder> {
        self.request_order.as_ref()
    }

    pub fn modified_items(&self) -> Option<&[RequestItemFork]> {
        self.modified_items.as_deref()
    }

    pub fn items(&self) -> &[OfferItem] {
        &self.items
    }

    pub fn item(&self, id: OfferItemId) -> Option<&OfferItem> {
        self.items.iter().find(|i| i.id() == id)
    }

    pub fn modification_history(&self) -> &[ModificationHistoryEntry] {
        &self.modification_history
    }

    pub fn finalized_at(&self) -> Option<DateTime<Utc>> {
        self.finalized_at
    }

    pub fn finalized_by(&self) -> Option<&str> {
        self.finalized_by.as_deref()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// The request items this offer is procuring against: the fork overlay
    /// when one exists, the request order originals otherwise.
    pub fn effective_request_items(&self) -> Vec<EffectiveRequestItem> {
        match &self.request_order {
            Some(order) => effective_items(order, self.modified_items.as_deref()),
            None => Vec::new(),
        }
    }

    /// Recompute the fulfillment classification from current state.
    pub fn fulfillment(&self) -> Fulfillment {
        classify(&self.effective_request_items(), &self.items)
    }

    pub fn has_accepted_item(&self) -> bool {
        self.items.iter().any(|i| i.is_accepted())
    }

    /// Whether a full retry is a legal recovery action from the current state.
    ///
    /// Retry is offered after a manager rejection, or after a finance outcome
    /// that left quantities uncovered. Once finalization has begun the offer
    /// is committed to purchase-order creation and retry is rejected.
    pub fn can_retry(&self) -> bool {
        match self.status {
            OfferStatus::ManagerRejected => true,
            OfferStatus::ManagerAccepted => matches!(
                self.finance_status,
                Some(FinanceStatus::Rejected) | Some(FinanceStatus::PartiallyAccepted)
            ),
            _ => false,
        }
    }
}

impl AggregateRoot for Offer {
    type Id = OfferId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateOffer (external trigger: the request order was approved).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOffer {
    pub offer_id: OfferId,
    pub title: String,
    pub description: Option<String>,
    pub request_order: RequestOrder,
    pub created_by: String,
    pub retry_count: u32,
    pub current_attempt_number: u32,
    pub parent_offer_id: Option<OfferId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: StartOffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOffer {
    pub offer_id: OfferId,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddOfferItem (only while in progress).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOfferItem {
    pub offer_id: OfferId,
    pub item: OfferItemDraft,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateOfferItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOfferItem {
    pub offer_id: OfferId,
    pub offer_item_id: OfferItemId,
    pub quantity: i64,
    pub unit_price: u64,
    pub estimated_delivery_days: Option<u32>,
    pub comment: Option<String>,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveOfferItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveOfferItem {
    pub offer_id: OfferId,
    pub offer_item_id: OfferItemId,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddRequestItem (forks the effective items if not yet forked).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddRequestItem {
    pub offer_id: OfferId,
    pub item_type_id: ItemTypeId,
    pub quantity: i64,
    pub comment: Option<String>,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AmendRequestItem (forks the effective items if not yet forked).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmendRequestItem {
    pub offer_id: OfferId,
    pub item_type_id: ItemTypeId,
    pub new_quantity: i64,
    pub new_comment: Option<String>,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveRequestItem (forks the effective items if not yet forked).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveRequestItem {
    pub offer_id: OfferId,
    pub item_type_id: ItemTypeId,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SeedRequestItems (retry/remainder construction only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedRequestItems {
    pub offer_id: OfferId,
    pub forks: Vec<RequestItemFork>,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CarryOverAcceptedItems (split construction only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarryOverAcceptedItems {
    pub offer_id: OfferId,
    pub items: Vec<OfferItem>,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SubmitOffer (completeness-checked).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOffer {
    pub offer_id: OfferId,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ManagerDecide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerDecide {
    pub offer_id: OfferId,
    pub accept: bool,
    pub reason: Option<String>,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: FinanceDecide (per-item decisions).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinanceDecide {
    pub offer_id: OfferId,
    pub decisions: Vec<ItemDecision>,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SendToFinalizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendToFinalizing {
    pub offer_id: OfferId,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteOffer (issued by the finalization processor once the
/// purchase order exists).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteOffer {
    pub offer_id: OfferId,
    pub selected_item_ids: Vec<OfferItemId>,
    pub finalized_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteOffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOffer {
    pub offer_id: OfferId,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OfferCommand {
    CreateOffer(CreateOffer),
    StartOffer(StartOffer),
    AddOfferItem(AddOfferItem),
    UpdateOfferItem(UpdateOfferItem),
    RemoveOfferItem(RemoveOfferItem),
    AddRequestItem(AddRequestItem),
    AmendRequestItem(AmendRequestItem),
    RemoveRequestItem(RemoveRequestItem),
    SeedRequestItems(SeedRequestItems),
    CarryOverAcceptedItems(CarryOverAcceptedItems),
    SubmitOffer(SubmitOffer),
    ManagerDecide(ManagerDecide),
    FinanceDecide(FinanceDecide),
    SendToFinalizing(SendToFinalizing),
    CompleteOffer(CompleteOffer),
    DeleteOffer(DeleteOffer),
}

/// Event: OfferCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferCreated {
    pub offer_id: OfferId,
    pub title: String,
    pub description: Option<String>,
    pub request_order: RequestOrder,
    pub created_by: String,
    pub retry_count: u32,
    pub current_attempt_number: u32,
    pub parent_offer_id: Option<OfferId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OfferStarted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferStarted {
    pub offer_id: OfferId,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OfferItemAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferItemAdded {
    pub offer_id: OfferId,
    pub item: OfferItem,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OfferItemUpdated. `apply` recomputes the total price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferItemUpdated {
    pub offer_id: OfferId,
    pub offer_item_id: OfferItemId,
    pub quantity: i64,
    pub unit_price: u64,
    pub estimated_delivery_days: Option<u32>,
    pub comment: Option<String>,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OfferItemRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferItemRemoved {
    pub offer_id: OfferId,
    pub offer_item_id: OfferItemId,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestItemsForked (the copy-on-write initialization).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestItemsForked {
    pub offer_id: OfferId,
    pub forks: Vec<RequestItemFork>,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestItemAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestItemAdded {
    pub offer_id: OfferId,
    pub fork: RequestItemFork,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestItemAmended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestItemAmended {
    pub offer_id: OfferId,
    pub item_type_id: ItemTypeId,
    pub old_quantity: i64,
    pub new_quantity: i64,
    pub old_comment: Option<String>,
    pub new_comment: Option<String>,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestItemRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestItemRemoved {
    pub offer_id: OfferId,
    pub item_type_id: ItemTypeId,
    pub old_quantity: i64,
    pub old_comment: Option<String>,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestItemsSeeded (retry/remainder construction).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestItemsSeeded {
    pub offer_id: OfferId,
    pub forks: Vec<RequestItemFork>,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AcceptedItemsCarriedOver (split construction).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedItemsCarriedOver {
    pub offer_id: OfferId,
    pub items: Vec<OfferItem>,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OfferSubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferSubmitted {
    pub offer_id: OfferId,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ManagerAccepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerAccepted {
    pub offer_id: OfferId,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ManagerRejected (reason is mandatory and non-empty).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerRejected {
    pub offer_id: OfferId,
    pub reason: String,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: FinanceDecided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinanceDecided {
    pub offer_id: OfferId,
    pub decisions: Vec<ItemDecision>,
    pub outcome: FinanceStatus,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SentToFinalizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentToFinalizing {
    pub offer_id: OfferId,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OfferCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferCompleted {
    pub offer_id: OfferId,
    pub selected_item_ids: Vec<OfferItemId>,
    pub finalized_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OfferDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferDeleted {
    pub offer_id: OfferId,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OfferEvent {
    OfferCreated(OfferCreated),
    OfferStarted(OfferStarted),
    OfferItemAdded(OfferItemAdded),
    OfferItemUpdated(OfferItemUpdated),
    OfferItemRemoved(OfferItemRemoved),
    RequestItemsForked(RequestItemsForked),
    RequestItemAdded(RequestItemAdded),
    RequestItemAmended(RequestItemAmended),
    RequestItemRemoved(RequestItemRemoved),
    RequestItemsSeeded(RequestItemsSeeded),
    AcceptedItemsCarriedOver(AcceptedItemsCarriedOver),
    OfferSubmitted(OfferSubmitted),
    ManagerAccepted(ManagerAccepted),
    ManagerRejected(ManagerRejected),
    FinanceDecided(FinanceDecided),
    SentToFinalizing(SentToFinalizing),
    OfferCompleted(OfferCompleted),
    OfferDeleted(OfferDeleted),
}

impl Event for OfferEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OfferEvent::OfferCreated(_) => "offer.created",
            OfferEvent::OfferStarted(_) => "offer.started",
            OfferEvent::OfferItemAdded(_) => "offer.item_added",
            OfferEvent::OfferItemUpdated(_) => "offer.item_updated",
            OfferEvent::OfferItemRemoved(_) => "offer.item_removed",
            OfferEvent::RequestItemsForked(_) => "offer.request_items_forked",
            OfferEvent::RequestItemAdded(_) => "offer.request_item_added",
            OfferEvent::RequestItemAmended(_) => "offer.request_item_amended",
            OfferEvent::RequestItemRemoved(_) => "offer.request_item_removed",
            OfferEvent::RequestItemsSeeded(_) => "offer.request_items_seeded",
            OfferEvent::AcceptedItemsCarriedOver(_) => "offer.accepted_items_carried_over",
            OfferEvent::OfferSubmitted(_) => "offer.submitted",
            OfferEvent::ManagerAccepted(_) => "offer.manager_accepted",
            OfferEvent::ManagerRejected(_) => "offer.manager_rejected",
            OfferEvent::FinanceDecided(_) => "offer.finance_decided",
            OfferEvent::SentToFinalizing(_) => "offer.sent_to_finalizing",
            OfferEvent::OfferCompleted(_) => "offer.completed",
            OfferEvent::OfferDeleted(_) => "offer.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OfferEvent::OfferCreated(e) => e.occurred_at,
            OfferEvent::OfferStarted(e) => e.occurred_at,
            OfferEvent::OfferItemAdded(e) => e.occurred_at,
            OfferEvent::OfferItemUpdated(e) => e.occurred_at,
            OfferEvent::OfferItemRemoved(e) => e.occurred_at,
            OfferEvent::RequestItemsForked(e) => e.occurred_at,
            OfferEvent::RequestItemAdded(e) => e.occurred_at,
            OfferEvent::RequestItemAmended(e) => e.occurred_at,
            OfferEvent::RequestItemRemoved(e) => e.occurred_at,
            OfferEvent::RequestItemsSeeded(e) => e.occurred_at,
            OfferEvent::AcceptedItemsCarriedOver(e) => e.occurred_at,
            OfferEvent::OfferSubmitted(e) => e.occurred_at,
            OfferEvent::ManagerAccepted(e) => e.occurred_at,
            OfferEvent::ManagerRejected(e) => e.occurred_at,
            OfferEvent::FinanceDecided(e) => e.occurred_at,
            OfferEvent::SentToFinalizing(e) => e.occurred_at,
            OfferEvent::OfferCompleted(e) => e.occurred_at,
            OfferEvent::OfferDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Offer {
    type Command = OfferCommand;
    type Event = OfferEvent;
    type Error = WorkflowError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OfferEvent::OfferCreated(e) => {
                self.id = e.offer_id;
                self.title = e.title.clone();
                self.description = e.description.clone();
                self.status = OfferStatus::Unstarted;
                self.finance_status = None;
                self.created_at = Some(e.occurred_at);
                self.created_by = Some(e.created_by.clone());
                self.retry_count = e.retry_count;
                self.current_attempt_number = e.current_attempt_number;
                self.parent_offer_id = e.parent_offer_id;
                self.request_order = Some(e.request_order.clone());
                self.modified_items = None;
                self.items.clear();
                self.modification_history.clear();
                self.created = true;
            }
            OfferEvent::OfferStarted(_) => {
                self.status = OfferStatus::InProgress;
            }
            OfferEvent::OfferItemAdded(e) => {
                self.items.push(e.item.clone());
            }
            OfferEvent::OfferItemUpdated(e) => {
                if let Some(item) = self.items.iter_mut().find(|i| i.id() == e.offer_item_id) {
                    item.update_quote(
                        e.quantity,
                        e.unit_price,
                        e.estimated_delivery_days,
                        e.comment.clone(),
                    );
                }
            }
            OfferEvent::OfferItemRemoved(e) => {
                self.items.retain(|i| i.id() != e.offer_item_id);
            }
            OfferEvent::RequestItemsForked(e) => {
                self.modified_items = Some(e.forks.clone());
            }
            OfferEvent::RequestItemAdded(e) => {
                if let Some(forks) = self.modified_items.as_mut() {
                    forks.push(e.fork.clone());
                }
                self.modification_history.push(ModificationHistoryEntry {
                    item_type_id: e.fork.item_type_id,
                    kind: ModificationKind::Added,
                    old_quantity: None,
                    new_quantity: Some(e.fork.quantity),
                    old_comment: None,
                    new_comment: e.fork.comment.clone(),
                    actor: e.actor.clone(),
                    occurred_at: e.occurred_at,
                });
            }
            OfferEvent::RequestItemAmended(e) => {
                if let Some(forks) = self.modified_items.as_mut() {
                    if let Some(fork) = forks.iter_mut().find(|f| f.item_type_id == e.item_type_id)
                    {
                        fork.quantity = e.new_quantity;
                        fork.comment = e.new_comment.clone();
                    }
                }
                self.modification_history.push(ModificationHistoryEntry {
                    item_type_id: e.item_type_id,
                    kind: ModificationKind::Edited,
                    old_quantity: Some(e.old_quantity),
                    new_quantity: Some(e.new_quantity),
                    old_comment: e.old_comment.clone(),
                    new_comment: e.new_comment.clone(),
                    actor: e.actor.clone(),
                    occurred_at: e.occurred_at,
                });
            }
            OfferEvent::RequestItemRemoved(e) => {
                if let Some(forks) = self.modified_items.as_mut() {
                    forks.retain(|f| f.item_type_id != e.item_type_id);
                }
                self.modification_history.push(ModificationHistoryEntry {
                    item_type_id: e.item_type_id,
                    kind: ModificationKind::Deleted,
                    old_quantity: Some(e.old_quantity),
                    new_quantity: None,
                    old_comment: e.old_comment.clone(),
                    new_comment: None,
                    actor: e.actor.clone(),
                    occurred_at: e.occurred_at,
                });
            }
            OfferEvent::RequestItemsSeeded(e) => {
                self.modified_items = Some(e.forks.clone());
            }
            OfferEvent::AcceptedItemsCarriedOver(e) => {
                self.items = e.items.clone();
                self.status = OfferStatus::ManagerAccepted;
                self.finance_status = Some(FinanceStatus::Accepted);
            }
            OfferEvent::OfferSubmitted(_) => {
                self.status = OfferStatus::Submitted;
            }
            OfferEvent::ManagerAccepted(_) => {
                self.status = OfferStatus::ManagerAccepted;
                self.finance_status = Some(FinanceStatus::PendingFinanceReview);
            }
            OfferEvent::ManagerRejected(_) => {
                self.status = OfferStatus::ManagerRejected;
            }
            OfferEvent::FinanceDecided(e) => {
                for decision in &e.decisions {
                    if let Some(item) = self
                        .items
                        .iter_mut()
                        .find(|i| i.id() == decision.offer_item_id)
                    {
                        item.set_finance_status(decision.status);
                    }
                }
                self.finance_status = Some(e.outcome);
            }
            OfferEvent::SentToFinalizing(_) => {
                self.status = OfferStatus::Finalizing;
            }
            OfferEvent::OfferCompleted(e) => {
                for id in &e.selected_item_ids {
                    if let Some(item) = self.items.iter_mut().find(|i| i.id() == *id) {
                        item.mark_finalized();
                    }
                }
                self.status = OfferStatus::Completed;
                self.finalized_at = Some(e.occurred_at);
                self.finalized_by = Some(e.finalized_by.clone());
            }
            OfferEvent::OfferDeleted(_) => {
                self.deleted = true;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OfferCommand::CreateOffer(cmd) => self.handle_create(cmd),
            OfferCommand::StartOffer(cmd) => self.handle_start(cmd),
            OfferCommand::AddOfferItem(cmd) => self.handle_add_item(cmd),
            OfferCommand::UpdateOfferItem(cmd) => self.handle_update_item(cmd),
            OfferCommand::RemoveOfferItem(cmd) => self.handle_remove_item(cmd),
            OfferCommand::AddRequestItem(cmd) => self.handle_add_request_item(cmd),
            OfferCommand::AmendRequestItem(cmd) => self.handle_amend_request_item(cmd),
            OfferCommand::RemoveRequestItem(cmd) => self.handle_remove_request_item(cmd),
            OfferCommand::SeedRequestItems(cmd) => self.handle_seed_request_items(cmd),
            OfferCommand::CarryOverAcceptedItems(cmd) => self.handle_carry_over(cmd),
            OfferCommand::SubmitOffer(cmd) => self.handle_submit(cmd),
            OfferCommand::ManagerDecide(cmd) => self.handle_manager_decide(cmd),
            OfferCommand::FinanceDecide(cmd) => self.handle_finance_decide(cmd),
            OfferCommand::SendToFinalizing(cmd) => self.handle_send_to_finalizing(cmd),
            OfferCommand::CompleteOffer(cmd) => self.handle_complete(cmd),
            OfferCommand::DeleteOffer(cmd) => self.handle_delete(cmd),
        }
    }
}

impl Offer {
    fn ensure_created(&self) -> Result<(), WorkflowError> {
        if !self.created || self.deleted {
            return Err(WorkflowError::not_found());
        }
        Ok(())
    }

    fn ensure_offer_id(&self, offer_id: OfferId) -> Result<(), WorkflowError> {
        if self.id != offer_id {
            return Err(WorkflowError::validation("offer_id mismatch"));
        }
        Ok(())
    }

    fn ensure_status(&self, expected: OfferStatus, action: &str) -> Result<(), WorkflowError> {
        if self.status != expected {
            return Err(WorkflowError::invalid_transition(format!(
                "cannot {action} an offer in state {}",
                self.status
            )));
        }
        Ok(())
    }

    fn ensure_editable(&self, action: &str) -> Result<(), WorkflowError> {
        if !matches!(
            self.status,
            OfferStatus::Unstarted | OfferStatus::InProgress
        ) {
            return Err(WorkflowError::invalid_transition(format!(
                "cannot {action} an offer in state {}",
                self.status
            )));
        }
        Ok(())
    }

    /// Fork-initialization event, emitted before the first request item edit.
    fn fork_if_needed(&self, actor: &str, occurred_at: DateTime<Utc>) -> Option<OfferEvent> {
        if self.modified_items.is_some() {
            return None;
        }
        let order = self.request_order.as_ref()?;
        let forks = order.items.iter().map(RequestItemFork::from_original).collect();
        Some(OfferEvent::RequestItemsForked(RequestItemsForked {
            offer_id: self.id,
            forks,
            actor: actor.to_string(),
            occurred_at,
        }))
    }

    fn handle_create(&self, cmd: &CreateOffer) -> Result<Vec<OfferEvent>, WorkflowError> {
        if self.created {
            return Err(WorkflowError::conflict("offer already exists"));
        }
        if cmd.title.trim().is_empty() {
            return Err(WorkflowError::validation("offer title must not be empty"));
        }
        if cmd.request_order.approval.is_none() {
            return Err(WorkflowError::validation(
                "an offer requires an approved request order",
            ));
        }
        if cmd.current_attempt_number != cmd.retry_count + 1 {
            return Err(WorkflowError::validation(
                "attempt number must equal retry count + 1",
            ));
        }

        Ok(vec![OfferEvent::OfferCreated(OfferCreated {
            offer_id: cmd.offer_id,
            title: cmd.title.clone(),
            description: cmd.description.clone(),
            request_order: cmd.request_order.clone(),
            created_by: cmd.created_by.clone(),
            retry_count: cmd.retry_count,
            current_attempt_number: cmd.current_attempt_number,
            parent_offer_id: cmd.parent_offer_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_start(&self, cmd: &StartOffer) -> Result<Vec<OfferEvent>, WorkflowError> {
        self.ensure_created()?;
        self.ensure_offer_id(cmd.offer_id)?;
        self.ensure_status(OfferStatus::Unstarted, "start")?;

        Ok(vec![OfferEvent::OfferStarted(OfferStarted {
            offer_id: cmd.offer_id,
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_item(&self, cmd: &AddOfferItem) -> Result<Vec<OfferEvent>, WorkflowError> {
        self.ensure_created()?;
        self.ensure_offer_id(cmd.offer_id)?;
        self.ensure_status(OfferStatus::InProgress, "add an item to")?;

        if cmd.item.quantity <= 0 {
            return Err(WorkflowError::validation("quantity must be positive"));
        }
        if cmd.item.unit_price == 0 {
            return Err(WorkflowError::validation("unit price must be positive"));
        }
        if cmd.item.currency.trim().is_empty() {
            return Err(WorkflowError::validation("currency must not be empty"));
        }
        if self.item(cmd.item.id).is_some() {
            return Err(WorkflowError::conflict("offer item already exists"));
        }

        Ok(vec![OfferEvent::OfferItemAdded(OfferItemAdded {
            offer_id: cmd.offer_id,
            item: OfferItem::from_draft(cmd.item.clone()),
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_item(&self, cmd: &UpdateOfferItem) -> Result<Vec<OfferEvent>, WorkflowError> {
        self.ensure_created()?;
        self.ensure_offer_id(cmd.offer_id)?;
        self.ensure_status(OfferStatus::InProgress, "edit an item of")?;

        if cmd.quantity <= 0 {
            return Err(WorkflowError::validation("quantity must be positive"));
        }
        if cmd.unit_price == 0 {
            return Err(WorkflowError::validation("unit price must be positive"));
        }
        if self.item(cmd.offer_item_id).is_none() {
            return Err(WorkflowError::not_found());
        }

        Ok(vec![OfferEvent::OfferItemUpdated(OfferItemUpdated {
            offer_id: cmd.offer_id,
            offer_item_id: cmd.offer_item_id,
            quantity: cmd.quantity,
            unit_price: cmd.unit_price,
            estimated_delivery_days: cmd.estimated_delivery_days,
            comment: cmd.comment.clone(),
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_item(&self, cmd: &RemoveOfferItem) -> Result<Vec<OfferEvent>, WorkflowError> {
        self.ensure_created()?;
        self.ensure_offer_id(cmd.offer_id)?;
        self.ensure_status(OfferStatus::InProgress, "remove an item from")?;

        if self.item(cmd.offer_item_id).is_none() {
            return Err(WorkflowError::not_found());
        }

        Ok(vec![OfferEvent::OfferItemRemoved(OfferItemRemoved {
            offer_id: cmd.offer_id,
            offer_item_id: cmd.offer_item_id,
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_request_item(
        &self,
        cmd: &AddRequestItem,
    ) -> Result<Vec<OfferEvent>, WorkflowError> {
        self.ensure_created()?;
        self.ensure_offer_id(cmd.offer_id)?;
        self.ensure_editable("amend request items of")?;

        if cmd.quantity <= 0 {
            return Err(WorkflowError::validation("quantity must be positive"));
        }
        if self
            .effective_request_items()
            .iter()
            .any(|i| i.item_type_id == cmd.item_type_id)
        {
            return Err(WorkflowError::conflict(
                "request item for this item type already exists",
            ));
        }

        let mut events = Vec::new();
        events.extend(self.fork_if_needed(&cmd.actor, cmd.occurred_at));
        events.push(OfferEvent::RequestItemAdded(RequestItemAdded {
            offer_id: cmd.offer_id,
            fork: RequestItemFork::fresh(cmd.item_type_id, cmd.quantity, cmd.comment.clone()),
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        }));
        Ok(events)
    }

    fn handle_amend_request_item(
        &self,
        cmd: &AmendRequestItem,
    ) -> Result<Vec<OfferEvent>, WorkflowError> {
        self.ensure_created()?;
        self.ensure_offer_id(cmd.offer_id)?;
        self.ensure_editable("amend request items of")?;

        if cmd.new_quantity <= 0 {
            return Err(WorkflowError::validation("quantity must be positive"));
        }
        let current = self
            .effective_request_items()
            .into_iter()
            .find(|i| i.item_type_id == cmd.item_type_id)
            .ok_or(WorkflowError::NotFound)?;

        let mut events = Vec::new();
        events.extend(self.fork_if_needed(&cmd.actor, cmd.occurred_at));
        events.push(OfferEvent::RequestItemAmended(RequestItemAmended {
            offer_id: cmd.offer_id,
            item_type_id: cmd.item_type_id,
            old_quantity: current.quantity,
            new_quantity: cmd.new_quantity,
            old_comment: current.comment,
            new_comment: cmd.new_comment.clone(),
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        }));
        Ok(events)
    }

    fn handle_remove_request_item(
        &self,
        cmd: &RemoveRequestItem,
    ) -> Result<Vec<OfferEvent>, WorkflowError> {
        self.ensure_created()?;
        self.ensure_offer_id(cmd.offer_id)?;
        self.ensure_editable("amend request items of")?;

        let current = self
            .effective_request_items()
            .into_iter()
            .find(|i| i.item_type_id == cmd.item_type_id)
            .ok_or(WorkflowError::NotFound)?;

        let mut events = Vec::new();
        events.extend(self.fork_if_needed(&cmd.actor, cmd.occurred_at));
        events.push(OfferEvent::RequestItemRemoved(RequestItemRemoved {
            offer_id: cmd.offer_id,
            item_type_id: cmd.item_type_id,
            old_quantity: current.quantity,
            old_comment: current.comment,
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        }));
        Ok(events)
    }

    fn handle_seed_request_items(
        &self,
        cmd: &SeedRequestItems,
    ) -> Result<Vec<OfferEvent>, WorkflowError> {
        self.ensure_created()?;
        self.ensure_offer_id(cmd.offer_id)?;
        self.ensure_status(OfferStatus::Unstarted, "seed request items into")?;

        if self.parent_offer_id.is_none() {
            return Err(WorkflowError::invalid_transition(
                "only retry/split offers can be seeded with request items",
            ));
        }
        if self.modified_items.is_some() {
            return Err(WorkflowError::conflict("request items already seeded"));
        }
        if cmd.forks.iter().any(|f| f.quantity <= 0) {
            return Err(WorkflowError::validation("quantity must be positive"));
        }

        Ok(vec![OfferEvent::RequestItemsSeeded(RequestItemsSeeded {
            offer_id: cmd.offer_id,
            forks: cmd.forks.clone(),
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_carry_over(
        &self,
        cmd: &CarryOverAcceptedItems,
    ) -> Result<Vec<OfferEvent>, WorkflowError> {
        self.ensure_created()?;
        self.ensure_offer_id(cmd.offer_id)?;
        self.ensure_status(OfferStatus::Unstarted, "carry accepted items into")?;

        if self.parent_offer_id.is_none() {
            return Err(WorkflowError::invalid_transition(
                "only split offers can carry over accepted items",
            ));
        }
        if cmd.items.is_empty() {
            return Err(WorkflowError::validation(
                "at least one accepted item is required",
            ));
        }
        if cmd.items.iter().any(|i| !i.is_accepted()) {
            return Err(WorkflowError::validation(
                "only finance-accepted items can be carried over",
            ));
        }

        Ok(vec![OfferEvent::AcceptedItemsCarriedOver(
            AcceptedItemsCarriedOver {
                offer_id: cmd.offer_id,
                items: cmd.items.clone(),
                actor: cmd.actor.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_submit(&self, cmd: &SubmitOffer) -> Result<Vec<OfferEvent>, WorkflowError> {
        self.ensure_created()?;
        self.ensure_offer_id(cmd.offer_id)?;
        self.ensure_status(OfferStatus::InProgress, "submit")?;

        // Completeness: every effective request item must be fully covered by
        // offer item quantities for its item type.
        for req in self.effective_request_items() {
            let quoted: i64 = self
                .items
                .iter()
                .filter(|i| i.item_type_id() == req.item_type_id)
                .map(|i| i.quantity())
                .sum();
            if quoted < req.quantity {
                return Err(WorkflowError::incomplete(format!(
                    "item type {} is covered for {quoted} of {} requested",
                    req.item_type_id, req.quantity
                )));
            }
        }

        Ok(vec![OfferEvent::OfferSubmitted(OfferSubmitted {
            offer_id: cmd.offer_id,
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_manager_decide(
        &self,
        cmd: &ManagerDecide,
    ) -> Result<Vec<OfferEvent>, WorkflowError> {
        self.ensure_created()?;
        self.ensure_offer_id(cmd.offer_id)?;
        self.ensure_status(OfferStatus::Submitted, "manager-review")?;

        if cmd.accept {
            return Ok(vec![OfferEvent::ManagerAccepted(ManagerAccepted {
                offer_id: cmd.offer_id,
                actor: cmd.actor.clone(),
                occurred_at: cmd.occurred_at,
            })]);
        }

        let reason = cmd
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or(WorkflowError::MissingRejectionReason)?;

        Ok(vec![OfferEvent::ManagerRejected(ManagerRejected {
            offer_id: cmd.offer_id,
            reason: reason.to_string(),
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_finance_decide(
        &self,
        cmd: &FinanceDecide,
    ) -> Result<Vec<OfferEvent>, WorkflowError> {
        self.ensure_created()?;
        self.ensure_offer_id(cmd.offer_id)?;
        self.ensure_status(OfferStatus::ManagerAccepted, "finance-review")?;

        if cmd.decisions.is_empty() {
            return Err(WorkflowError::validation(
                "finance review requires at least one decision",
            ));
        }
        for (idx, d) in cmd.decisions.iter().enumerate() {
            if self.item(d.offer_item_id).is_none() {
                return Err(WorkflowError::validation(format!(
                    "decision {idx} references an unknown offer item"
                )));
            }
            if cmd.decisions[..idx]
                .iter()
                .any(|prev| prev.offer_item_id == d.offer_item_id)
            {
                return Err(WorkflowError::validation(format!(
                    "duplicate decision for offer item {}",
                    d.offer_item_id
                )));
            }
        }

        // Apply decisions to a scratch copy and classify; every item must be
        // decided before the outcome is computed.
        let mut decided = self.items.clone();
        for d in &cmd.decisions {
            if let Some(item) = decided.iter_mut().find(|i| i.id() == d.offer_item_id) {
                item.set_finance_status(d.status);
            }
        }
        if let Some(undecided) = decided.iter().find(|i| i.finance_status().is_none()) {
            return Err(WorkflowError::validation(format!(
                "offer item {} received no finance decision",
                undecided.id()
            )));
        }

        let fulfillment = classify(&self.effective_request_items(), &decided);
        let outcome = if !fulfillment.has_accepted_items {
            FinanceStatus::Rejected
        } else if fulfillment.fully_fulfilled {
            FinanceStatus::Accepted
        } else {
            FinanceStatus::PartiallyAccepted
        };

        Ok(vec![OfferEvent::FinanceDecided(FinanceDecided {
            offer_id: cmd.offer_id,
            decisions: cmd.decisions.clone(),
            outcome,
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_send_to_finalizing(
        &self,
        cmd: &SendToFinalizing,
    ) -> Result<Vec<OfferEvent>, WorkflowError> {
        self.ensure_created()?;
        self.ensure_offer_id(cmd.offer_id)?;
        self.ensure_status(OfferStatus::ManagerAccepted, "finalize")?;

        match self.finance_status {
            Some(FinanceStatus::Accepted) | Some(FinanceStatus::PartiallyAccepted) => {}
            _ => {
                return Err(WorkflowError::invalid_transition(
                    "finalization requires a finance outcome with at least one accepted item",
                ));
            }
        }

        Ok(vec![OfferEvent::SentToFinalizing(SentToFinalizing {
            offer_id: cmd.offer_id,
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &CompleteOffer) -> Result<Vec<OfferEvent>, WorkflowError> {
        self.ensure_created()?;
        self.ensure_offer_id(cmd.offer_id)?;
        self.ensure_status(OfferStatus::Finalizing, "complete")?;

        if cmd.selected_item_ids.is_empty() {
            return Err(WorkflowError::validation(
                "finalization requires at least one selected item",
            ));
        }
        for id in &cmd.selected_item_ids {
            let item = self.item(*id).ok_or(WorkflowError::NotFound)?;
            if !item.is_accepted() {
                return Err(WorkflowError::validation(format!(
                    "offer item {id} is not finance-accepted"
                )));
            }
            if item.finalized() {
                return Err(WorkflowError::conflict(format!(
                    "offer item {id} is already finalized"
                )));
            }
        }

        Ok(vec![OfferEvent::OfferCompleted(OfferCompleted {
            offer_id: cmd.offer_id,
            selected_item_ids: cmd.selected_item_ids.clone(),
            finalized_by: cmd.finalized_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteOffer) -> Result<Vec<OfferEvent>, WorkflowError> {
        self.ensure_created()?;
        self.ensure_offer_id(cmd.offer_id)?;

        if self.status == OfferStatus::Completed {
            return Err(WorkflowError::invalid_transition(
                "a completed offer cannot be deleted",
            ));
        }

        Ok(vec![OfferEvent::OfferDeleted(OfferDeleted {
            offer_id: cmd.offer_id,
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
