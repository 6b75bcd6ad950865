//! Advisory retry lock, keyed by offer id.
//!
//! `retry_entire_offer`, `continue_and_return`, `finalize` and `delete` must
//! serialize per offer: a second caller while one is unresolved observes
//! `RetryAlreadyInProgress`, never a race that produces two siblings or an
//! orphaned purchase order.

use std::collections::HashSet;
use std::sync::Mutex;

use offerflow_core::WorkflowError;
use offerflow_offers::OfferId;

#[derive(Debug, Default)]
pub struct RetryLock {
    in_flight: Mutex<HashSet<OfferId>>,
}

impl RetryLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `offer_id`, released when the guard drops.
    pub fn acquire(&self, offer_id: OfferId) -> Result<RetryGuard<'_>, WorkflowError> {
        let mut in_flight = self
            .in_flight
            .lock()
            .map_err(|_| WorkflowError::conflict("retry lock poisoned"))?;
        if !in_flight.insert(offer_id) {
            return Err(WorkflowError::RetryAlreadyInProgress);
        }
        Ok(RetryGuard {
            lock: self,
            offer_id,
        })
    }

    pub fn is_held(&self, offer_id: OfferId) -> bool {
        self.in_flight
            .lock()
            .map(|set| set.contains(&offer_id))
            .unwrap_or(true)
    }

    fn release(&self, offer_id: OfferId) {
        // A poisoned set still holds valid data; recover and release.
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        in_flight.remove(&offer_id);
    }
}

pub struct RetryGuard<'a> {
    lock: &'a RetryLock,
    offer_id: OfferId,
}

impl Drop for RetryGuard<'_> {
    fn drop(&mut self) {
        self.lock.release(self.offer_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offerflow_core::AggregateId;

    #[test]
    fn second_acquire_fails_until_the_guard_drops() {
        let lock = RetryLock::new();
        let id = OfferId::new(AggregateId::new());

        let guard = lock.acquire(id).unwrap();
        assert!(matches!(
            lock.acquire(id),
            Err(WorkflowError::RetryAlreadyInProgress)
        ));
        assert!(lock.is_held(id));

        drop(guard);
        assert!(!lock.is_held(id));
        assert!(lock.acquire(id).is_ok());
    }

    #[test]
    fn locks_are_per_offer() {
        let lock = RetryLock::new();
        let a = OfferId::new(AggregateId::new());
        let b = OfferId::new(AggregateId::new());

        let _guard = lock.acquire(a).unwrap();
        assert!(lock.acquire(b).is_ok());
    }
}
