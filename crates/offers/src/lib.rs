//! `offerflow-offers` — the Offer aggregate and its state machine.
//!
//! All lifecycle transitions live behind the [`Offer`] aggregate: a command
//! is validated by `handle` (pure, fails fast with a typed error) and the
//! resulting events are folded back in by `apply`. The fulfillment
//! calculator and the finance-outcome branch selector are pure functions
//! over the aggregate's state.

pub mod fulfillment;
pub mod item;
pub mod offer;

pub use fulfillment::{
    FinanceOutcomeActions, Fulfillment, ItemFulfillment, available_actions, classify,
};
pub use item::{ItemFinanceStatus, MerchantId, OfferItem, OfferItemDraft, OfferItemId};
pub use offer::{
    AddOfferItem, AddRequestItem, AmendRequestItem, CarryOverAcceptedItems, CompleteOffer,
    CreateOffer, DeleteOffer, FinanceDecide, FinanceStatus, ItemDecision, ManagerDecide, Offer,
    OfferCommand, OfferEvent, OfferId, OfferStatus, RemoveOfferItem, RemoveRequestItem,
    SeedRequestItems, SendToFinalizing, StartOffer, SubmitOffer, UpdateOfferItem,
};
