//! `offerflow-requests` — request orders and effective request items.
//!
//! A `RequestOrder` is a read-only snapshot consumed from the requesting
//! side. Offers never edit it; per-offer amendments fork the items into a
//! copy-on-write overlay, and every fork mutation is recorded in the
//! modification history.

pub mod history;
pub mod request;

pub use history::{ModificationHistoryEntry, ModificationKind, newest_first};
pub use request::{
    Approval, EffectiveRequestItem, ItemTypeId, RequestItem, RequestItemFork, RequestItemId,
    RequestOrder, RequestOrderId, effective_items,
};
