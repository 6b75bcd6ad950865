//! `offerflow-engine` — the application layer around the Offer aggregate.
//!
//! Composition: `WorkflowService` loads offers from an [`OfferStore`], routes
//! commands through the aggregate, persists the result, and projects domain
//! events into the append-only [`TimelineStore`]. Retry and split branch
//! construction is pure (everything is built in memory first); the store
//! swap is a single atomic commit. Finalization talks to the downstream
//! purchase order and payment request seams.

pub mod finalize;
pub mod lock;
pub mod project;
pub mod retry;
pub mod service;
pub mod store;

pub use finalize::{FinalizationOutcome, remainder_forks};
pub use lock::{RetryGuard, RetryLock};
pub use project::{attempt_description, project};
pub use retry::{SplitBranches, build_remainder_offer, build_retry_offer, build_split_branches};
pub use service::{SplitOutcome, WorkflowService};
pub use store::{
    InMemoryOfferStore, InMemoryTimelineStore, OfferStore, StoreError, TimelineStore,
};
