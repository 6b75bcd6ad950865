use serde::{Deserialize, Serialize};

use offerflow_core::{AggregateId, Entity};
use offerflow_requests::ItemTypeId;

/// Offer item identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OfferItemId(pub AggregateId);

impl OfferItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OfferItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Merchant identifier (directory entry, consumed read-only for grouping).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MerchantId(pub AggregateId);

impl MerchantId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for MerchantId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Per-item finance decision.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemFinanceStatus {
    Accepted,
    Rejected,
}

/// Input shape for adding an offer item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferItemDraft {
    pub id: OfferItemId,
    pub item_type_id: ItemTypeId,
    pub merchant_id: MerchantId,
    pub quantity: i64,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: u64,
    pub currency: String,
    pub estimated_delivery_days: Option<u32>,
    pub comment: Option<String>,
}

/// One merchant's quote against a request item's item type.
///
/// `total_price` is derived from quantity and unit price and recomputed on
/// every edit; it is never settable on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferItem {
    id: OfferItemId,
    item_type_id: ItemTypeId,
    merchant_id: MerchantId,
    quantity: i64,
    unit_price: u64,
    total_price: u64,
    currency: String,
    finance_status: Option<ItemFinanceStatus>,
    finalized: bool,
    estimated_delivery_days: Option<u32>,
    comment: Option<String>,
}

fn total(quantity: i64, unit_price: u64) -> u64 {
    (quantity.max(0) as u64).saturating_mul(unit_price)
}

impl Entity for OfferItem {
    type Id = OfferItemId;

    fn id(&self) -> &OfferItemId {
        &self.id
    }
}

impl OfferItem {
    pub fn from_draft(draft: OfferItemDraft) -> Self {
        Self {
            id: draft.id,
            item_type_id: draft.item_type_id,
            merchant_id: draft.merchant_id,
            quantity: draft.quantity,
            unit_price: draft.unit_price,
            total_price: total(draft.quantity, draft.unit_price),
            currency: draft.currency,
            finance_status: None,
            finalized: false,
            estimated_delivery_days: draft.estimated_delivery_days,
            comment: draft.comment,
        }
    }

    pub fn id(&self) -> OfferItemId {
        self.id
    }

    pub fn item_type_id(&self) -> ItemTypeId {
        self.item_type_id
    }

    pub fn merchant_id(&self) -> MerchantId {
        self.merchant_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn unit_price(&self) -> u64 {
        self.unit_price
    }

    pub fn total_price(&self) -> u64 {
        self.total_price
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn finance_status(&self) -> Option<ItemFinanceStatus> {
        self.finance_status
    }

    pub fn is_accepted(&self) -> bool {
        self.finance_status == Some(ItemFinanceStatus::Accepted)
    }

    pub fn finalized(&self) -> bool {
        self.finalized
    }

    pub fn estimated_delivery_days(&self) -> Option<u32> {
        self.estimated_delivery_days
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub(crate) fn update_quote(
        &mut self,
        quantity: i64,
        unit_price: u64,
        estimated_delivery_days: Option<u32>,
        comment: Option<String>,
    ) {
        self.quantity = quantity;
        self.unit_price = unit_price;
        self.total_price = total(quantity, unit_price);
        self.estimated_delivery_days = estimated_delivery_days;
        self.comment = comment;
    }

    pub(crate) fn set_finance_status(&mut self, status: ItemFinanceStatus) {
        self.finance_status = Some(status);
    }

    /// Consuming builder for a pre-decided item, used when constructing
    /// fixtures or carrying decided items across offers.
    pub fn with_finance_status(mut self, status: ItemFinanceStatus) -> Self {
        self.finance_status = Some(status);
        self
    }

    pub(crate) fn mark_finalized(&mut self) {
        self.finalized = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(quantity: i64, unit_price: u64) -> OfferItemDraft {
        OfferItemDraft {
            id: OfferItemId::new(AggregateId::new()),
            item_type_id: ItemTypeId::new(AggregateId::new()),
            merchant_id: MerchantId::new(AggregateId::new()),
            quantity,
            unit_price,
            currency: "USD".to_string(),
            estimated_delivery_days: Some(14),
            comment: None,
        }
    }

    #[test]
    fn total_price_is_derived_on_construction() {
        let item = OfferItem::from_draft(draft(3, 250));
        assert_eq!(item.total_price(), 750);
    }

    #[test]
    fn total_price_is_recomputed_on_every_edit() {
        let mut item = OfferItem::from_draft(draft(3, 250));
        item.update_quote(5, 200, None, Some("revised".to_string()));

        assert_eq!(item.quantity(), 5);
        assert_eq!(item.unit_price(), 200);
        assert_eq!(item.total_price(), 1000);
        assert_eq!(item.comment(), Some("revised"));
    }
}
