use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::info;

use crate::error::{BusinessRule, ServiceError};
use crate::session::SessionToken;

use super::basket::{BasketManager, BasketRepository};
use super::domain::{BasketKey, CandidateId, EventId, InterviewEvent, InterviewerId};
use super::store::InterviewStore;

/// Outcome of a successful confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmationReceipt {
    pub event_id: EventId,
    pub interviewer_id: Option<InterviewerId>,
    /// Invitations inserted by this call.
    pub created: usize,
    /// Candidates that already held an invitation for the event.
    pub skipped: usize,
}

/// One mutex per (vacancy, date) so confirmations of the same event run one
/// at a time inside the process.
#[derive(Debug, Default)]
struct EventLocks {
    slots: Mutex<HashMap<BasketKey, Arc<Mutex<()>>>>,
}

impl EventLocks {
    fn slot(&self, key: &BasketKey) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(key.clone()).or_default().clone()
    }

    /// Drop the slot once nobody else is holding or waiting on it.
    fn release(&self, key: &BasketKey, slot: Arc<Mutex<()>>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if Arc::strong_count(&slot) == 2 {
            slots.remove(key);
        }
    }
}

/// Turns a session basket into durable interview events and invitations.
pub struct ConfirmationEngine<S, B> {
    store: Arc<S>,
    baskets: Arc<BasketManager<S, B>>,
    locks: EventLocks,
}

impl<S, B> ConfirmationEngine<S, B>
where
    S: InterviewStore,
    B: BasketRepository,
{
    pub fn new(store: Arc<S>, baskets: Arc<BasketManager<S, B>>) -> Self {
        Self {
            store,
            baskets,
            locks: EventLocks::default(),
        }
    }

    /// Confirm the basket for `key`. An empty basket is rejected with
    /// `basket_empty` and nothing is written; re-running after success hits
    /// that path because the basket was cleared.
    pub fn confirm(
        &self,
        token: &SessionToken,
        key: &BasketKey,
        interviewer_id: Option<InterviewerId>,
    ) -> Result<ConfirmationReceipt, ServiceError> {
        let basket = self.baskets.load(token, key)?;
        if basket.is_empty() {
            return Err(ServiceError::BusinessRule(BusinessRule::BasketEmpty));
        }
        let interviewer_id = interviewer_id.or(basket.interviewer_id);

        let slot = self.locks.slot(key);
        let receipt = {
            let _guard: MutexGuard<'_, ()> = slot.lock().unwrap_or_else(PoisonError::into_inner);
            self.persist(key, interviewer_id, &basket.candidate_ids())
        };
        self.locks.release(key, slot);
        let receipt = receipt?;

        self.baskets.clear(token, key)?;
        info!(
            vacancy_id = %key.vacancy_id,
            date = %key.date,
            event_id = %receipt.event_id,
            created = receipt.created,
            skipped = receipt.skipped,
            "interview basket confirmed"
        );
        Ok(receipt)
    }

    fn persist(
        &self,
        key: &BasketKey,
        interviewer_id: Option<InterviewerId>,
        candidates: &[CandidateId],
    ) -> Result<ConfirmationReceipt, ServiceError> {
        let event = self.ensure_event(key, interviewer_id)?;

        let mut created = 0;
        let mut skipped = 0;
        for &candidate_id in candidates {
            if self.store.invitation_exists(event.event_id, candidate_id)? {
                skipped += 1;
                continue;
            }
            self.store
                .insert_invitation(event.event_id, candidate_id, event.interviewer_id)?;
            created += 1;
        }

        Ok(ConfirmationReceipt {
            event_id: event.event_id,
            interviewer_id: event.interviewer_id,
            created,
            skipped,
        })
    }

    /// Find or create the event. An interviewer is back-filled only while the
    /// event has none; an assigned interviewer is never replaced.
    fn ensure_event(
        &self,
        key: &BasketKey,
        interviewer_id: Option<InterviewerId>,
    ) -> Result<InterviewEvent, ServiceError> {
        let event = match self.store.find_event(key.vacancy_id, &key.date)? {
            Some(event) => event,
            None => {
                self.store
                    .insert_event(key.vacancy_id, &key.date, interviewer_id)?;
                self.reload(key)?
            }
        };

        match (event.interviewer_id, interviewer_id) {
            (None, Some(supplied)) => {
                self.store.assign_interviewer(event.event_id, supplied)?;
                self.reload(key)
            }
            _ => Ok(event),
        }
    }

    fn reload(&self, key: &BasketKey) -> Result<InterviewEvent, ServiceError> {
        self.store
            .find_event(key.vacancy_id, &key.date)?
            .ok_or_else(|| {
                ServiceError::not_found(format!(
                    "Interview event for vacancy {} on {} disappeared",
                    key.vacancy_id, key.date
                ))
            })
    }
}
