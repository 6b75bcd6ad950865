use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use offerflow_core::{AggregateId, ValueObject};
use offerflow_offers::{MerchantId, OfferId, OfferItem, OfferItemId};
use offerflow_requests::ItemTypeId;

/// Purchase order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseOrderId(pub AggregateId);

impl PurchaseOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PurchaseOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PurchaseOrderError {
    #[error("a purchase order requires at least one line")]
    Empty,
    #[error("offer item {0} is not finance-accepted")]
    NotAccepted(OfferItemId),
    #[error("purchase order creation failed: {0}")]
    Creation(String),
    #[error("payment request creation failed: {0}")]
    PaymentRequest(String),
}

/// One purchase order line, snapshotted from a finance-accepted offer item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderLine {
    pub offer_item_id: OfferItemId,
    pub item_type_id: ItemTypeId,
    pub merchant_id: MerchantId,
    pub quantity: i64,
    pub unit_price: u64,
    pub total_price: u64,
    pub currency: String,
}

impl ValueObject for PurchaseOrderLine {}

/// The purchase order request handed to the downstream creator.
///
/// One purchase order may span multiple merchants; grouping by merchant is a
/// display concern, not a processing constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderRequest {
    pub offer_id: OfferId,
    pub lines: Vec<PurchaseOrderLine>,
    pub requested_at: DateTime<Utc>,
    pub requested_by: String,
}

impl PurchaseOrderRequest {
    /// Build a request from the selected offer items. Every item must carry
    /// an accepting finance decision.
    pub fn from_offer_items(
        offer_id: OfferId,
        items: &[OfferItem],
        requested_by: String,
        requested_at: DateTime<Utc>,
    ) -> Result<Self, PurchaseOrderError> {
        if items.is_empty() {
            return Err(PurchaseOrderError::Empty);
        }
        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            if !item.is_accepted() {
                return Err(PurchaseOrderError::NotAccepted(item.id()));
            }
            lines.push(PurchaseOrderLine {
                offer_item_id: item.id(),
                item_type_id: item.item_type_id(),
                merchant_id: item.merchant_id(),
                quantity: item.quantity(),
                unit_price: item.unit_price(),
                total_price: item.total_price(),
                currency: item.currency().to_string(),
            });
        }
        Ok(Self {
            offer_id,
            lines,
            requested_at,
            requested_by,
        })
    }

    pub fn total_amount(&self) -> u64 {
        self.lines.iter().map(|l| l.total_price).sum()
    }

    /// Lines grouped by merchant, first-seen merchant order preserved.
    pub fn lines_by_merchant(&self) -> Vec<(MerchantId, Vec<&PurchaseOrderLine>)> {
        let mut groups: Vec<(MerchantId, Vec<&PurchaseOrderLine>)> = Vec::new();
        for line in &self.lines {
            match groups.iter_mut().find(|(m, _)| *m == line.merchant_id) {
                Some((_, lines)) => lines.push(line),
                None => groups.push((line.merchant_id, vec![line])),
            }
        }
        groups
    }
}

/// Downstream purchase order creation seam.
pub trait PurchaseOrderCreator: Send + Sync {
    fn create(&self, request: &PurchaseOrderRequest)
    -> Result<PurchaseOrderId, PurchaseOrderError>;
}

impl<T: PurchaseOrderCreator + ?Sized> PurchaseOrderCreator for Arc<T> {
    fn create(
        &self,
        request: &PurchaseOrderRequest,
    ) -> Result<PurchaseOrderId, PurchaseOrderError> {
        (**self).create(request)
    }
}

/// Downstream payment request creation seam. A failure here is non-fatal to
/// finalization; the caller reports it as a degraded success.
pub trait PaymentRequestCreator: Send + Sync {
    fn create(
        &self,
        purchase_order_id: PurchaseOrderId,
        amount: u64,
        currency: &str,
    ) -> Result<(), PurchaseOrderError>;
}

impl<T: PaymentRequestCreator + ?Sized> PaymentRequestCreator for Arc<T> {
    fn create(
        &self,
        purchase_order_id: PurchaseOrderId,
        amount: u64,
        currency: &str,
    ) -> Result<(), PurchaseOrderError> {
        (**self).create(purchase_order_id, amount, currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offerflow_offers::{ItemFinanceStatus, OfferItemDraft};

    fn accepted_item(merchant_id: MerchantId, quantity: i64, unit_price: u64) -> OfferItem {
        OfferItem::from_draft(OfferItemDraft {
            id: OfferItemId::new(AggregateId::new()),
            item_type_id: ItemTypeId::new(AggregateId::new()),
            merchant_id,
            quantity,
            unit_price,
            currency: "USD".to_string(),
            estimated_delivery_days: None,
            comment: None,
        })
        .with_finance_status(ItemFinanceStatus::Accepted)
    }

    #[test]
    fn request_snapshots_lines_and_totals() {
        let merchant = MerchantId::new(AggregateId::new());
        let items = vec![accepted_item(merchant, 3, 100), accepted_item(merchant, 2, 50)];
        let request = PurchaseOrderRequest::from_offer_items(
            OfferId::new(AggregateId::new()),
            &items,
            "alice".to_string(),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(request.lines.len(), 2);
        assert_eq!(request.total_amount(), 400);
    }

    #[test]
    fn rejected_items_cannot_become_lines() {
        let merchant = MerchantId::new(AggregateId::new());
        let item = accepted_item(merchant, 3, 100).with_finance_status(ItemFinanceStatus::Rejected);

        let err = PurchaseOrderRequest::from_offer_items(
            OfferId::new(AggregateId::new()),
            &[item],
            "alice".to_string(),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, PurchaseOrderError::NotAccepted(_)));
    }

    #[test]
    fn lines_group_by_merchant_in_first_seen_order() {
        let m1 = MerchantId::new(AggregateId::new());
        let m2 = MerchantId::new(AggregateId::new());
        let items = vec![
            accepted_item(m1, 1, 100),
            accepted_item(m2, 1, 100),
            accepted_item(m1, 1, 100),
        ];
        let request = PurchaseOrderRequest::from_offer_items(
            OfferId::new(AggregateId::new()),
            &items,
            "alice".to_string(),
            Utc::now(),
        )
        .unwrap();

        let groups = request.lines_by_merchant();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, m1);
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, m2);
        assert_eq!(groups[1].1.len(), 1);
    }
}
