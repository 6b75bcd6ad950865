//! `offerflow-purchasing` — the purchase order artifact built from finalized
//! offer items, and the downstream collaborator seams (purchase order and
//! payment request creation).

pub mod order;

pub use order::{
    PaymentRequestCreator, PurchaseOrderCreator, PurchaseOrderError, PurchaseOrderId,
    PurchaseOrderLine, PurchaseOrderRequest,
};
