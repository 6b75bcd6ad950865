use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use offerflow_core::{AggregateId, Entity, ValueObject};

/// Request order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestOrderId(pub AggregateId);

impl RequestOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for RequestOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Request item identifier (original or fork).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestItemId(pub AggregateId);

impl RequestItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for RequestItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Identifier of an item type (catalog key shared by request and offer items).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemTypeId(pub AggregateId);

impl ItemTypeId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ItemTypeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Approval metadata stamped on a request order when it was approved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub approved_by: String,
    pub approved_at: DateTime<Utc>,
}

impl ValueObject for Approval {}

/// One requested item type with its needed quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestItem {
    pub id: RequestItemId,
    pub item_type_id: ItemTypeId,
    pub quantity: i64,
    pub comment: Option<String>,
}

impl Entity for RequestItem {
    type Id = RequestItemId;

    fn id(&self) -> &RequestItemId {
        &self.id
    }
}

/// Read-only snapshot of a request order, as consumed from the requesting side.
///
/// An offer is created only for an approved request order, so `approval` is
/// normally present; it is optional here because the snapshot shape is owned
/// by the collaborator, not by this engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOrder {
    pub id: RequestOrderId,
    pub title: String,
    pub items: Vec<RequestItem>,
    pub approval: Option<Approval>,
}

impl RequestOrder {
    pub fn item_for_type(&self, item_type_id: ItemTypeId) -> Option<&RequestItem> {
        self.items.iter().find(|i| i.item_type_id == item_type_id)
    }
}

/// Per-offer copy of a request item.
///
/// Once an offer forks its request items, all edits target the forks; the
/// original request order stays immutable from the offer's perspective.
/// `original_request_order_item_id` is `None` for items added on the offer
/// itself (no original to trace back to).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestItemFork {
    pub id: RequestItemId,
    pub original_request_order_item_id: Option<RequestItemId>,
    pub item_type_id: ItemTypeId,
    pub quantity: i64,
    pub comment: Option<String>,
}

impl Entity for RequestItemFork {
    type Id = RequestItemId;

    fn id(&self) -> &RequestItemId {
        &self.id
    }
}

impl RequestItemFork {
    /// Fork an original request item, retaining its id for traceability.
    pub fn from_original(item: &RequestItem) -> Self {
        Self {
            id: RequestItemId::new(AggregateId::new()),
            original_request_order_item_id: Some(item.id),
            item_type_id: item.item_type_id,
            quantity: item.quantity,
            comment: item.comment.clone(),
        }
    }

    /// A fresh request item with no original (added on the offer, or seeded
    /// into a remainder offer).
    pub fn fresh(item_type_id: ItemTypeId, quantity: i64, comment: Option<String>) -> Self {
        Self {
            id: RequestItemId::new(AggregateId::new()),
            original_request_order_item_id: None,
            item_type_id,
            quantity,
            comment,
        }
    }
}

/// The effective request item view an offer works against: the fork when one
/// exists, the original otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveRequestItem {
    pub request_item_id: RequestItemId,
    pub original_request_order_item_id: Option<RequestItemId>,
    pub item_type_id: ItemTypeId,
    pub quantity: i64,
    pub comment: Option<String>,
    pub modified: bool,
}

/// Resolve the effective request items for an offer.
///
/// When `forks` is `Some`, the fork list *is* the effective set (it was
/// initialized as a full copy of the originals and edited from there).
/// Otherwise the originals pass through unmodified.
pub fn effective_items(
    order: &RequestOrder,
    forks: Option<&[RequestItemFork]>,
) -> Vec<EffectiveRequestItem> {
    match forks {
        Some(forks) => forks
            .iter()
            .map(|f| EffectiveRequestItem {
                request_item_id: f.id,
                original_request_order_item_id: f.original_request_order_item_id,
                item_type_id: f.item_type_id,
                quantity: f.quantity,
                comment: f.comment.clone(),
                modified: true,
            })
            .collect(),
        None => order
            .items
            .iter()
            .map(|i| EffectiveRequestItem {
                request_item_id: i.id,
                original_request_order_item_id: Some(i.id),
                item_type_id: i.item_type_id,
                quantity: i.quantity,
                comment: i.comment.clone(),
                modified: false,
            })
            .collect(),
    }
}
