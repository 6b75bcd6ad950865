//! Finalization outcome shapes and the remainder-scoping helper.
//!
//! Orchestration lives in [`crate::service::WorkflowService::finalize`]; this
//! module defines what finalization can return and how leftover offer items
//! translate into a remainder offer's request items.

use offerflow_core::WorkflowError;
use offerflow_offers::{OfferId, OfferItem, OfferItemId};
use offerflow_purchasing::PurchaseOrderId;
use offerflow_requests::RequestItemFork;

/// Result of a finalization call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizationOutcome {
    /// Some offer items were left out of the selection and the caller has
    /// not said what to do with them. Nothing was executed; re-invoke with
    /// an explicit `create_offer_for_remaining`.
    RemainderDecisionRequired {
        unfinalized_item_ids: Vec<OfferItemId>,
    },
    /// The purchase order exists and the offer is completed.
    Finalized {
        purchase_order_id: PurchaseOrderId,
        remainder_offer_id: Option<OfferId>,
        /// False when the downstream payment request failed; the purchase
        /// order and the completion stand, reported as a degraded success.
        payment_request_created: bool,
    },
}

impl FinalizationOutcome {
    /// Degraded-success detail, for callers that surface partial failures as
    /// errors alongside the completed result.
    pub fn degradation(&self) -> Option<WorkflowError> {
        match self {
            FinalizationOutcome::Finalized {
                purchase_order_id,
                payment_request_created: false,
                ..
            } => Some(WorkflowError::FinalizationPartialFailure(format!(
                "payment request creation failed for purchase order {purchase_order_id}"
            ))),
            _ => None,
        }
    }
}

/// Request items for a remainder offer scoped to exactly the unfinalized
/// items: one fresh, unquoted request item per item type, quantities summed.
pub fn remainder_forks(unfinalized: &[&OfferItem]) -> Vec<RequestItemFork> {
    let mut forks: Vec<RequestItemFork> = Vec::new();
    for item in unfinalized {
        match forks
            .iter_mut()
            .find(|f| f.item_type_id == item.item_type_id())
        {
            Some(fork) => fork.quantity += item.quantity(),
            None => forks.push(RequestItemFork::fresh(
                item.item_type_id(),
                item.quantity(),
                None,
            )),
        }
    }
    forks
}

#[cfg(test)]
mod tests {
    use super::*;
    use offerflow_core::AggregateId;
    use offerflow_offers::{MerchantId, OfferItemDraft};
    use offerflow_requests::ItemTypeId;

    fn item(item_type: ItemTypeId, quantity: i64) -> OfferItem {
        OfferItem::from_draft(OfferItemDraft {
            id: OfferItemId::new(AggregateId::new()),
            item_type_id: item_type,
            merchant_id: MerchantId::new(AggregateId::new()),
            quantity,
            unit_price: 100,
            currency: "USD".to_string(),
            estimated_delivery_days: None,
            comment: None,
        })
    }

    #[test]
    fn remainder_quantities_sum_per_item_type() {
        let a = ItemTypeId::new(AggregateId::new());
        let b = ItemTypeId::new(AggregateId::new());
        let items = vec![item(a, 3), item(b, 2), item(a, 4)];
        let refs: Vec<&OfferItem> = items.iter().collect();

        let forks = remainder_forks(&refs);

        assert_eq!(forks.len(), 2);
        assert_eq!(forks[0].item_type_id, a);
        assert_eq!(forks[0].quantity, 7);
        assert_eq!(forks[1].item_type_id, b);
        assert_eq!(forks[1].quantity, 2);
        assert!(forks.iter().all(|f| f.original_request_order_item_id.is_none()));
    }
}
