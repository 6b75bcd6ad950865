//! Offer and timeline persistence seams, with in-memory implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use offerflow_core::{AggregateRoot, ExpectedVersion, WorkflowError};
use offerflow_offers::{Offer, OfferId};
use offerflow_timeline::TimelineEvent;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("offer not found")]
    NotFound,
    #[error("offer already exists")]
    Duplicate,
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),
    #[error("store lock poisoned")]
    Poisoned,
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => WorkflowError::NotFound,
            StoreError::Duplicate => WorkflowError::conflict("offer already exists"),
            StoreError::Concurrency(msg) => WorkflowError::conflict(msg),
            StoreError::Poisoned => WorkflowError::conflict("store lock poisoned"),
        }
    }
}

/// Offer persistence.
///
/// `update` carries the version observed at load time; a mismatch means a
/// concurrent writer got there first. `commit_split` is the atomic replace
/// used by retry, split and finalization-with-remainder: callers must never
/// observe the store between the removal and the inserts.
pub trait OfferStore: Send + Sync {
    fn insert(&self, offer: Offer) -> Result<(), StoreError>;
    fn get(&self, id: OfferId) -> Result<Offer, StoreError>;
    fn update(&self, offer: Offer, expected: ExpectedVersion) -> Result<(), StoreError>;
    fn remove(&self, id: OfferId) -> Result<Offer, StoreError>;
    fn list(&self) -> Result<Vec<Offer>, StoreError>;

    /// Remove `remove_id` and insert every offer in `inserts`, atomically.
    /// An insert may reuse `remove_id` (the finalization case, where the
    /// completed offer stays and only gains a sibling).
    fn commit_split(&self, remove_id: OfferId, inserts: Vec<Offer>) -> Result<(), StoreError>;
}

impl<T: OfferStore + ?Sized> OfferStore for Arc<T> {
    fn insert(&self, offer: Offer) -> Result<(), StoreError> {
        (**self).insert(offer)
    }
    fn get(&self, id: OfferId) -> Result<Offer, StoreError> {
        (**self).get(id)
    }
    fn update(&self, offer: Offer, expected: ExpectedVersion) -> Result<(), StoreError> {
        (**self).update(offer, expected)
    }
    fn remove(&self, id: OfferId) -> Result<Offer, StoreError> {
        (**self).remove(id)
    }
    fn list(&self) -> Result<Vec<Offer>, StoreError> {
        (**self).list()
    }
    fn commit_split(&self, remove_id: OfferId, inserts: Vec<Offer>) -> Result<(), StoreError> {
        (**self).commit_split(remove_id, inserts)
    }
}

/// In-memory offer store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryOfferStore {
    offers: RwLock<HashMap<OfferId, Offer>>,
}

impl InMemoryOfferStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OfferStore for InMemoryOfferStore {
    fn insert(&self, offer: Offer) -> Result<(), StoreError> {
        let mut offers = self.offers.write().map_err(|_| StoreError::Poisoned)?;
        if offers.contains_key(&offer.id_typed()) {
            return Err(StoreError::Duplicate);
        }
        offers.insert(offer.id_typed(), offer);
        Ok(())
    }

    fn get(&self, id: OfferId) -> Result<Offer, StoreError> {
        let offers = self.offers.read().map_err(|_| StoreError::Poisoned)?;
        offers.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    fn update(&self, offer: Offer, expected: ExpectedVersion) -> Result<(), StoreError> {
        let mut offers = self.offers.write().map_err(|_| StoreError::Poisoned)?;
        let current = offers.get(&offer.id_typed()).ok_or(StoreError::NotFound)?;
        if !expected.matches(current.version()) {
            return Err(StoreError::Concurrency(format!(
                "expected {expected:?}, found {}",
                current.version()
            )));
        }
        offers.insert(offer.id_typed(), offer);
        Ok(())
    }

    fn remove(&self, id: OfferId) -> Result<Offer, StoreError> {
        let mut offers = self.offers.write().map_err(|_| StoreError::Poisoned)?;
        offers.remove(&id).ok_or(StoreError::NotFound)
    }

    fn list(&self) -> Result<Vec<Offer>, StoreError> {
        let offers = self.offers.read().map_err(|_| StoreError::Poisoned)?;
        Ok(offers.values().cloned().collect())
    }

    fn commit_split(&self, remove_id: OfferId, inserts: Vec<Offer>) -> Result<(), StoreError> {
        let mut offers = self.offers.write().map_err(|_| StoreError::Poisoned)?;
        if !offers.contains_key(&remove_id) {
            return Err(StoreError::NotFound);
        }
        for offer in &inserts {
            if offer.id_typed() != remove_id && offers.contains_key(&offer.id_typed()) {
                return Err(StoreError::Duplicate);
            }
        }
        offers.remove(&remove_id);
        for offer in inserts {
            offers.insert(offer.id_typed(), offer);
        }
        Ok(())
    }
}

/// Append-only timeline persistence. Events are stored per offer in append
/// order; the reconstructor assumes that order is ascending in time.
pub trait TimelineStore: Send + Sync {
    fn append(&self, event: TimelineEvent) -> Result<(), StoreError>;
    fn events_for(&self, offer_id: OfferId) -> Result<Vec<TimelineEvent>, StoreError>;
    fn remove_for(&self, offer_id: OfferId) -> Result<(), StoreError>;
}

impl<T: TimelineStore + ?Sized> TimelineStore for Arc<T> {
    fn append(&self, event: TimelineEvent) -> Result<(), StoreError> {
        (**self).append(event)
    }
    fn events_for(&self, offer_id: OfferId) -> Result<Vec<TimelineEvent>, StoreError> {
        (**self).events_for(offer_id)
    }
    fn remove_for(&self, offer_id: OfferId) -> Result<(), StoreError> {
        (**self).remove_for(offer_id)
    }
}

/// In-memory timeline store.
#[derive(Debug, Default)]
pub struct InMemoryTimelineStore {
    events: RwLock<HashMap<OfferId, Vec<TimelineEvent>>>,
}

impl InMemoryTimelineStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TimelineStore for InMemoryTimelineStore {
    fn append(&self, event: TimelineEvent) -> Result<(), StoreError> {
        let mut events = self.events.write().map_err(|_| StoreError::Poisoned)?;
        events.entry(event.offer_id).or_default().push(event);
        Ok(())
    }

    fn events_for(&self, offer_id: OfferId) -> Result<Vec<TimelineEvent>, StoreError> {
        let events = self.events.read().map_err(|_| StoreError::Poisoned)?;
        Ok(events.get(&offer_id).cloned().unwrap_or_default())
    }

    fn remove_for(&self, offer_id: OfferId) -> Result<(), StoreError> {
        let mut events = self.events.write().map_err(|_| StoreError::Poisoned)?;
        events.remove(&offer_id);
        Ok(())
    }
}
