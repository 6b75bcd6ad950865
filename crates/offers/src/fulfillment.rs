//! Fulfillment classification and the finance-outcome branch policy.

use serde::{Deserialize, Serialize};

use offerflow_requests::{EffectiveRequestItem, ItemTypeId};

use crate::item::OfferItem;

/// Requested vs. finance-accepted quantity for one effective request item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFulfillment {
    pub item_type_id: ItemTypeId,
    pub requested: i64,
    pub accepted: i64,
}

/// Aggregate fulfillment classification for an offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fulfillment {
    pub fully_fulfilled: bool,
    pub has_accepted_items: bool,
    pub per_item: Vec<ItemFulfillment>,
}

impl Fulfillment {
    pub fn for_item(&self, item_type_id: ItemTypeId) -> Option<&ItemFulfillment> {
        self.per_item.iter().find(|i| i.item_type_id == item_type_id)
    }

    /// Item types with an unfulfilled remainder, paired with the missing quantity.
    pub fn unfulfilled_deltas(&self) -> Vec<(ItemTypeId, i64)> {
        self.per_item
            .iter()
            .filter(|i| i.accepted < i.requested)
            .map(|i| (i.item_type_id, i.requested - i.accepted))
            .collect()
    }
}

/// Classify an offer's fulfillment from its effective request items and its
/// offer items.
///
/// Pure: recompute whenever finance decisions change, never cache.
/// Over-acceptance counts as fulfilled, never as an error.
pub fn classify(effective: &[EffectiveRequestItem], items: &[OfferItem]) -> Fulfillment {
    let per_item: Vec<ItemFulfillment> = effective
        .iter()
        .map(|req| {
            let accepted = items
                .iter()
                .filter(|i| i.item_type_id() == req.item_type_id && i.is_accepted())
                .map(|i| i.quantity())
                .sum();
            ItemFulfillment {
                item_type_id: req.item_type_id,
                requested: req.quantity,
                accepted,
            }
        })
        .collect();

    let fully_fulfilled = per_item.iter().all(|i| i.accepted >= i.requested);
    let has_accepted_items = per_item.iter().any(|i| i.accepted > 0);

    Fulfillment {
        fully_fulfilled,
        has_accepted_items,
        per_item,
    }
}

/// The mutually exclusive user actions offered after a finance decision.
///
/// This is a decision policy, not a persisted state: it is derived from the
/// classification every time it is needed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinanceOutcomeActions {
    /// Full fulfillment: the only offered action is finalization.
    FinalizeOnly,
    /// Partial fulfillment: continue-and-return, retry the entire offer,
    /// or delete. Invoking any one invalidates the offer for the others.
    ContinueRetryOrDelete,
    /// Nothing accepted: retry or delete; continue-and-return would be a
    /// no-op and is rejected.
    RetryOrDelete,
}

pub fn available_actions(fulfillment: &Fulfillment) -> FinanceOutcomeActions {
    if fulfillment.fully_fulfilled {
        FinanceOutcomeActions::FinalizeOnly
    } else if fulfillment.has_accepted_items {
        FinanceOutcomeActions::ContinueRetryOrDelete
    } else {
        FinanceOutcomeActions::RetryOrDelete
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offerflow_core::AggregateId;
    use offerflow_requests::RequestItemId;

    use crate::item::{ItemFinanceStatus, MerchantId, OfferItemDraft, OfferItemId};

    fn request(item_type_id: ItemTypeId, quantity: i64) -> EffectiveRequestItem {
        EffectiveRequestItem {
            request_item_id: RequestItemId::new(AggregateId::new()),
            original_request_order_item_id: None,
            item_type_id,
            quantity,
            comment: None,
            modified: false,
        }
    }

    fn quoted(item_type_id: ItemTypeId, quantity: i64, status: Option<ItemFinanceStatus>) -> OfferItem {
        let mut item = OfferItem::from_draft(OfferItemDraft {
            id: OfferItemId::new(AggregateId::new()),
            item_type_id,
            merchant_id: MerchantId::new(AggregateId::new()),
            quantity,
            unit_price: 100,
            currency: "USD".to_string(),
            estimated_delivery_days: None,
            comment: None,
        });
        if let Some(status) = status {
            item.set_finance_status(status);
        }
        item
    }

    #[test]
    fn partial_acceptance_is_classified_per_item() {
        let a = ItemTypeId::new(AggregateId::new());
        let b = ItemTypeId::new(AggregateId::new());
        let effective = vec![request(a, 10), request(b, 5)];
        let items = vec![
            quoted(a, 10, Some(ItemFinanceStatus::Accepted)),
            quoted(b, 3, Some(ItemFinanceStatus::Accepted)),
        ];

        let f = classify(&effective, &items);

        assert!(!f.fully_fulfilled);
        assert!(f.has_accepted_items);
        assert_eq!(f.for_item(a).unwrap().requested, 10);
        assert_eq!(f.for_item(a).unwrap().accepted, 10);
        assert_eq!(f.for_item(b).unwrap().requested, 5);
        assert_eq!(f.for_item(b).unwrap().accepted, 3);
        assert_eq!(f.unfulfilled_deltas(), vec![(b, 2)]);
    }

    #[test]
    fn rejected_and_undecided_items_do_not_count() {
        let a = ItemTypeId::new(AggregateId::new());
        let effective = vec![request(a, 10)];
        let items = vec![
            quoted(a, 6, Some(ItemFinanceStatus::Rejected)),
            quoted(a, 4, None),
        ];

        let f = classify(&effective, &items);

        assert!(!f.fully_fulfilled);
        assert!(!f.has_accepted_items);
        assert_eq!(f.for_item(a).unwrap().accepted, 0);
    }

    #[test]
    fn over_acceptance_counts_as_fulfilled() {
        let a = ItemTypeId::new(AggregateId::new());
        let effective = vec![request(a, 5)];
        let items = vec![quoted(a, 8, Some(ItemFinanceStatus::Accepted))];

        let f = classify(&effective, &items);

        assert!(f.fully_fulfilled);
        assert!(f.unfulfilled_deltas().is_empty());
    }

    #[test]
    fn branch_policy_covers_all_three_outcomes() {
        let a = ItemTypeId::new(AggregateId::new());
        let effective = vec![request(a, 10)];

        let full = classify(&effective, &[quoted(a, 10, Some(ItemFinanceStatus::Accepted))]);
        assert_eq!(available_actions(&full), FinanceOutcomeActions::FinalizeOnly);

        let partial = classify(&effective, &[quoted(a, 4, Some(ItemFinanceStatus::Accepted))]);
        assert_eq!(
            available_actions(&partial),
            FinanceOutcomeActions::ContinueRetryOrDelete
        );

        let none = classify(&effective, &[quoted(a, 10, Some(ItemFinanceStatus::Rejected))]);
        assert_eq!(available_actions(&none), FinanceOutcomeActions::RetryOrDelete);
    }
}
