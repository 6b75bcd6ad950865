//! `offerflow-timeline` — the persisted timeline record and the
//! reconstruction of a display timeline from it.
//!
//! The event log is append-only and consumed read-only here. Reconstruction
//! merges persisted events with at most one inferred pending step derived
//! from the offer's current state; it never reorders or drops input events.

pub mod event;
pub mod reconstruct;

pub use event::{TimelineEvent, TimelineEventId, TimelineEventKind, field_labels};
pub use reconstruct::{StepStatus, TimelineStep, build_timeline, pending_step};
