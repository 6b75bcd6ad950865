//! The workflow service: the transport-agnostic operation surface.
//!
//! Every mutating operation follows the same pipeline: load the offer,
//! route the command through the aggregate, persist the updated aggregate,
//! then project the emitted domain events into the timeline store. Retry,
//! split and finalization additionally build their replacement offers fully
//! in memory and commit them with one atomic store swap.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use offerflow_core::{
    Aggregate, AggregateId, AggregateRoot, ExpectedVersion, WorkflowError, WorkflowResult,
};
use offerflow_offers::{
    AddOfferItem, AddRequestItem, AmendRequestItem, CompleteOffer, CreateOffer, DeleteOffer,
    FinanceDecide, FinanceOutcomeActions, ManagerDecide, Offer, OfferCommand, OfferEvent,
    OfferId, OfferItem, OfferItemId, RemoveOfferItem, RemoveRequestItem, SendToFinalizing,
    StartOffer, SubmitOffer, UpdateOfferItem, available_actions,
};
use offerflow_purchasing::{PaymentRequestCreator, PurchaseOrderCreator, PurchaseOrderRequest};
use offerflow_requests::{EffectiveRequestItem, ModificationHistoryEntry, newest_first};
use offerflow_timeline::{
    TimelineEvent, TimelineEventId, TimelineEventKind, TimelineStep, build_timeline,
};

use crate::finalize::{FinalizationOutcome, remainder_forks};
use crate::lock::RetryLock;
use crate::project::{attempt_description, project};
use crate::retry::{build_remainder_offer, build_retry_offer, build_split_branches};
use crate::store::{OfferStore, TimelineStore};

/// The two offers `continue_and_return` leaves behind.
#[derive(Debug, Clone)]
pub struct SplitOutcome {
    pub accepted: Offer,
    pub remainder: Offer,
}

pub struct WorkflowService<S, T, P, Y> {
    offers: S,
    timeline: T,
    purchase_orders: P,
    payment_requests: Y,
    retry_lock: RetryLock,
}

impl<S, T, P, Y> WorkflowService<S, T, P, Y>
where
    S: OfferStore,
    T: TimelineStore,
    P: PurchaseOrderCreator,
    Y: PaymentRequestCreator,
{
    pub fn new(offers: S, timeline: T, purchase_orders: P, payment_requests: Y) -> Self {
        Self {
            offers,
            timeline,
            purchase_orders,
            payment_requests,
            retry_lock: RetryLock::new(),
        }
    }

    fn execute(offer: &mut Offer, cmd: OfferCommand) -> WorkflowResult<Vec<OfferEvent>> {
        let events = offer.handle(&cmd)?;
        for event in &events {
            offer.apply(event);
        }
        Ok(events)
    }

    fn record_events(&self, offer: &Offer, events: &[OfferEvent]) -> WorkflowResult<()> {
        for event in events {
            if let Some(record) = project(offer, event) {
                self.timeline.append(record)?;
            }
        }
        Ok(())
    }

    fn mutate(&self, offer_id: OfferId, cmd: OfferCommand) -> WorkflowResult<Offer> {
        let mut offer = self.offers.get(offer_id)?;
        let expected = ExpectedVersion::Exact(offer.version());
        let events = Self::execute(&mut offer, cmd)?;
        self.offers.update(offer.clone(), expected)?;
        self.record_events(&offer, &events)?;
        Ok(offer)
    }

    fn marker(
        &self,
        offer: &Offer,
        kind: TimelineEventKind,
        title: &str,
        actor: &str,
        occurred_at: DateTime<Utc>,
    ) -> TimelineEvent {
        TimelineEvent {
            id: TimelineEventId::new(AggregateId::new()),
            offer_id: offer.id_typed(),
            kind,
            event_time: occurred_at,
            action_by: actor.to_string(),
            notes: None,
            attempt_number: offer.current_attempt_number(),
            display_title: title.to_string(),
            display_description: attempt_description(offer.current_attempt_number()),
        }
    }

    /// External trigger: a request order was approved.
    pub fn create_offer(&self, cmd: CreateOffer) -> WorkflowResult<Offer> {
        let offer_id = cmd.offer_id;
        let mut offer = Offer::empty(offer_id);
        let events = Self::execute(&mut offer, OfferCommand::CreateOffer(cmd))?;
        self.offers.insert(offer.clone())?;
        self.record_events(&offer, &events)?;
        info!(%offer_id, "offer created");
        Ok(offer)
    }

    pub fn start(&self, cmd: StartOffer) -> WorkflowResult<Offer> {
        let offer = self.mutate(cmd.offer_id, OfferCommand::StartOffer(cmd))?;
        info!(offer_id = %offer.id_typed(), "offer started");
        Ok(offer)
    }

    pub fn add_offer_item(&self, cmd: AddOfferItem) -> WorkflowResult<Offer> {
        self.mutate(cmd.offer_id, OfferCommand::AddOfferItem(cmd))
    }

    pub fn update_offer_item(&self, cmd: UpdateOfferItem) -> WorkflowResult<Offer> {
        self.mutate(cmd.offer_id, OfferCommand::UpdateOfferItem(cmd))
    }

    pub fn remove_offer_item(&self, cmd: RemoveOfferItem) -> WorkflowResult<Offer> {
        self.mutate(cmd.offer_id, OfferCommand::RemoveOfferItem(cmd))
    }

    pub fn add_request_item(&self, cmd: AddRequestItem) -> WorkflowResult<Offer> {
        self.mutate(cmd.offer_id, OfferCommand::AddRequestItem(cmd))
    }

    pub fn amend_request_item(&self, cmd: AmendRequestItem) -> WorkflowResult<Offer> {
        self.mutate(cmd.offer_id, OfferCommand::AmendRequestItem(cmd))
    }

    pub fn remove_request_item(&self, cmd: RemoveRequestItem) -> WorkflowResult<Offer> {
        self.mutate(cmd.offer_id, OfferCommand::RemoveRequestItem(cmd))
    }

    pub fn submit(&self, cmd: SubmitOffer) -> WorkflowResult<Offer> {
        let offer = self.mutate(cmd.offer_id, OfferCommand::SubmitOffer(cmd))?;
        info!(offer_id = %offer.id_typed(), "offer submitted");
        Ok(offer)
    }

    pub fn manager_decide(&self, cmd: ManagerDecide) -> WorkflowResult<Offer> {
        let accept = cmd.accept;
        let offer = self.mutate(cmd.offer_id, OfferCommand::ManagerDecide(cmd))?;
        info!(offer_id = %offer.id_typed(), accept, "manager decision recorded");
        Ok(offer)
    }

    pub fn finance_decide(&self, cmd: FinanceDecide) -> WorkflowResult<Offer> {
        let offer = self.mutate(cmd.offer_id, OfferCommand::FinanceDecide(cmd))?;
        info!(
            offer_id = %offer.id_typed(),
            finance_status = ?offer.finance_status(),
            "finance decision recorded"
        );
        Ok(offer)
    }

    pub fn send_to_finalizing(&self, cmd: SendToFinalizing) -> WorkflowResult<Offer> {
        if self.retry_lock.is_held(cmd.offer_id) {
            return Err(WorkflowError::RetryAlreadyInProgress);
        }
        let offer = self.mutate(cmd.offer_id, OfferCommand::SendToFinalizing(cmd))?;
        info!(offer_id = %offer.id_typed(), "offer sent to finalizing");
        Ok(offer)
    }

    /// Full retry: replace the offer with a fresh attempt over the full
    /// original quantities. The swap is atomic; callers never observe
    /// neither offer existing, nor both active.
    pub fn retry_entire_offer(
        &self,
        offer_id: OfferId,
        actor: &str,
        occurred_at: DateTime<Utc>,
    ) -> WorkflowResult<Offer> {
        let _guard = self.retry_lock.acquire(offer_id)?;
        let original = self.offers.get(offer_id)?;
        let new_id = OfferId::new(AggregateId::new());
        let (next, events) = build_retry_offer(&original, new_id, actor, occurred_at)?;

        self.offers.commit_split(offer_id, vec![next.clone()])?;
        self.timeline.remove_for(offer_id)?;
        self.timeline.append(self.marker(
            &next,
            TimelineEventKind::OfferRetried,
            "Retry Initiated",
            actor,
            occurred_at,
        ))?;
        self.record_events(&next, &events)?;

        info!(
            original = %offer_id,
            retried = %next.id_typed(),
            attempt = next.current_attempt_number(),
            "offer retried"
        );
        Ok(next)
    }

    /// Partial-acceptance split: keep the accepted items moving toward
    /// finalization and reopen procurement for the unfulfilled remainder.
    pub fn continue_and_return(
        &self,
        offer_id: OfferId,
        actor: &str,
        occurred_at: DateTime<Utc>,
    ) -> WorkflowResult<SplitOutcome> {
        let _guard = self.retry_lock.acquire(offer_id)?;
        let original = self.offers.get(offer_id)?;
        let branches = build_split_branches(
            &original,
            OfferId::new(AggregateId::new()),
            OfferId::new(AggregateId::new()),
            actor,
            occurred_at,
        )?;

        self.offers.commit_split(
            offer_id,
            vec![branches.accepted.clone(), branches.remainder.clone()],
        )?;
        self.timeline.remove_for(offer_id)?;
        for offer in [&branches.accepted, &branches.remainder] {
            self.timeline.append(self.marker(
                offer,
                TimelineEventKind::OfferSplit,
                "Offer Split",
                actor,
                occurred_at,
            ))?;
        }
        self.record_events(&branches.accepted, &branches.accepted_events)?;
        self.record_events(&branches.remainder, &branches.remainder_events)?;

        info!(
            original = %offer_id,
            accepted = %branches.accepted.id_typed(),
            remainder = %branches.remainder.id_typed(),
            "offer split after partial finance acceptance"
        );
        Ok(SplitOutcome {
            accepted: branches.accepted,
            remainder: branches.remainder,
        })
    }

    /// Terminal transition: create the purchase order from the selected
    /// items and complete the offer.
    ///
    /// Leaving items unselected without deciding `create_offer_for_remaining`
    /// pauses with a disambiguation outcome instead of guessing. Purchase
    /// order failure leaves the offer untouched; payment request failure
    /// degrades the result but the completion stands.
    ///
    /// Holds the per-offer lock from entry to commit: a concurrent retry,
    /// split or delete cannot remove the offer between purchase order
    /// creation and the store write.
    pub fn finalize(
        &self,
        offer_id: OfferId,
        selected_item_ids: Vec<OfferItemId>,
        create_offer_for_remaining: Option<bool>,
        finalized_by: &str,
        occurred_at: DateTime<Utc>,
    ) -> WorkflowResult<FinalizationOutcome> {
        let _guard = self.retry_lock.acquire(offer_id)?;
        let offer = self.offers.get(offer_id)?;

        let unfinalized: Vec<&OfferItem> = offer
            .items()
            .iter()
            .filter(|i| !selected_item_ids.contains(&i.id()))
            .collect();
        if !unfinalized.is_empty() && create_offer_for_remaining.is_none() {
            return Ok(FinalizationOutcome::RemainderDecisionRequired {
                unfinalized_item_ids: unfinalized.iter().map(|i| i.id()).collect(),
            });
        }

        // Validate the completion before any external call; handle is pure.
        let completion_events = offer.handle(&OfferCommand::CompleteOffer(CompleteOffer {
            offer_id,
            selected_item_ids: selected_item_ids.clone(),
            finalized_by: finalized_by.to_string(),
            occurred_at,
        }))?;

        let selected_items: Vec<OfferItem> = offer
            .items()
            .iter()
            .filter(|i| selected_item_ids.contains(&i.id()))
            .cloned()
            .collect();
        let po_request = PurchaseOrderRequest::from_offer_items(
            offer_id,
            &selected_items,
            finalized_by.to_string(),
            occurred_at,
        )
        .map_err(|e| WorkflowError::validation(e.to_string()))?;

        let remainder = if create_offer_for_remaining == Some(true) && !unfinalized.is_empty() {
            let forks = remainder_forks(&unfinalized);
            Some(build_remainder_offer(
                &offer,
                OfferId::new(AggregateId::new()),
                forks,
                finalized_by,
                occurred_at,
            )?)
        } else {
            None
        };

        // All-or-nothing boundary: nothing below runs if the purchase order
        // cannot be created, and nothing above has written anything.
        let purchase_order_id = self
            .purchase_orders
            .create(&po_request)
            .map_err(|e| WorkflowError::conflict(e.to_string()))?;

        let mut completed = offer;
        for event in &completion_events {
            completed.apply(event);
        }
        let mut inserts = vec![completed.clone()];
        if let Some((offer, _)) = &remainder {
            inserts.push(offer.clone());
        }
        self.offers.commit_split(offer_id, inserts)?;
        self.record_events(&completed, &completion_events)?;
        if let Some((offer, events)) = &remainder {
            self.record_events(offer, events)?;
        }

        let currency = po_request
            .lines
            .first()
            .map(|l| l.currency.clone())
            .unwrap_or_default();
        let payment_request_created = match self.payment_requests.create(
            purchase_order_id,
            po_request.total_amount(),
            &currency,
        ) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    %offer_id,
                    %purchase_order_id,
                    error = %err,
                    "payment request creation failed; purchase order and completion stand"
                );
                false
            }
        };

        info!(
            %offer_id,
            %purchase_order_id,
            payment_request_created,
            "offer finalized"
        );
        Ok(FinalizationOutcome::Finalized {
            purchase_order_id,
            remainder_offer_id: remainder.map(|(offer, _)| offer.id_typed()),
            payment_request_created,
        })
    }

    /// Permanently remove an offer and its timeline. Rejected for completed
    /// offers; serialized against retry/split on the same offer.
    pub fn delete(
        &self,
        offer_id: OfferId,
        actor: &str,
        occurred_at: DateTime<Utc>,
    ) -> WorkflowResult<()> {
        let _guard = self.retry_lock.acquire(offer_id)?;
        let offer = self.offers.get(offer_id)?;
        offer.handle(&OfferCommand::DeleteOffer(DeleteOffer {
            offer_id,
            actor: actor.to_string(),
            occurred_at,
        }))?;

        self.offers.remove(offer_id)?;
        self.timeline.remove_for(offer_id)?;
        info!(%offer_id, "offer deleted");
        Ok(())
    }

    pub fn get_offer(&self, offer_id: OfferId) -> WorkflowResult<Offer> {
        Ok(self.offers.get(offer_id)?)
    }

    pub fn list_offers(&self) -> WorkflowResult<Vec<Offer>> {
        Ok(self.offers.list()?)
    }

    pub fn get_timeline(&self, offer_id: OfferId) -> WorkflowResult<Vec<TimelineStep>> {
        let offer = self.offers.get(offer_id)?;
        let events = self.timeline.events_for(offer_id)?;
        Ok(build_timeline(&offer, &events))
    }

    pub fn get_effective_request_items(
        &self,
        offer_id: OfferId,
    ) -> WorkflowResult<Vec<EffectiveRequestItem>> {
        Ok(self.offers.get(offer_id)?.effective_request_items())
    }

    /// Modification history, newest first.
    pub fn get_modification_history(
        &self,
        offer_id: OfferId,
    ) -> WorkflowResult<Vec<ModificationHistoryEntry>> {
        Ok(newest_first(
            self.offers.get(offer_id)?.modification_history(),
        ))
    }

    /// The branch policy for the offer's current finance outcome.
    pub fn get_available_actions(&self, offer_id: OfferId) -> WorkflowResult<FinanceOutcomeActions> {
        let offer = self.offers.get(offer_id)?;
        Ok(available_actions(&offer.fulfillment()))
    }
}
