use std::sync::Arc;

use crate::error::ServiceError;
use crate::session::{InMemorySessionStore, RepositoryError, SessionToken};

use super::candidates::CandidateDirectory;
use super::domain::{Basket, BasketItem, BasketKey, CandidateId, InterviewerId};
use super::store::InterviewStore;

/// Per-session basket storage. Implementations keep baskets of different
/// sessions apart; writes are visible to the next read of the same session.
pub trait BasketRepository: Send + Sync {
    fn load(&self, token: &SessionToken, key: &BasketKey)
        -> Result<Option<Basket>, RepositoryError>;
    fn save(&self, token: &SessionToken, basket: &Basket) -> Result<(), RepositoryError>;
    fn clear(&self, token: &SessionToken, key: &BasketKey) -> Result<(), RepositoryError>;
}

fn slot_name(key: &BasketKey) -> String {
    format!("basket:{key}")
}

impl BasketRepository for InMemorySessionStore {
    fn load(
        &self,
        token: &SessionToken,
        key: &BasketKey,
    ) -> Result<Option<Basket>, RepositoryError> {
        self.slot(token, &slot_name(key))?
            .map(serde_json::from_value)
            .transpose()
            .map_err(|err| {
                RepositoryError::Unavailable(format!("stored basket unreadable: {err}"))
            })
    }

    fn save(&self, token: &SessionToken, basket: &Basket) -> Result<(), RepositoryError> {
        let value = serde_json::to_value(basket)
            .map_err(|err| RepositoryError::Unavailable(format!("basket not storable: {err}")))?;
        self.put_slot(token, &slot_name(&basket.key()), value)
    }

    fn clear(&self, token: &SessionToken, key: &BasketKey) -> Result<(), RepositoryError> {
        self.remove_slot(token, &slot_name(key))
    }
}

/// Idempotent basket mutations for one session.
pub struct BasketManager<S, B> {
    repository: Arc<B>,
    candidates: Arc<CandidateDirectory<S>>,
}

impl<S, B> BasketManager<S, B>
where
    S: InterviewStore,
    B: BasketRepository,
{
    pub fn new(repository: Arc<B>, candidates: Arc<CandidateDirectory<S>>) -> Self {
        Self {
            repository,
            candidates,
        }
    }

    /// Existing basket, or a freshly persisted empty one.
    pub fn load(&self, token: &SessionToken, key: &BasketKey) -> Result<Basket, ServiceError> {
        if let Some(basket) = self.repository.load(token, key)? {
            return Ok(basket);
        }
        let basket = Basket::empty(key);
        self.repository.save(token, &basket)?;
        Ok(basket)
    }

    /// Replace the interviewer; `None` unsets it.
    pub fn set_interviewer(
        &self,
        token: &SessionToken,
        key: &BasketKey,
        interviewer_id: Option<InterviewerId>,
    ) -> Result<Basket, ServiceError> {
        let mut basket = self.load(token, key)?;
        if basket.interviewer_id != interviewer_id {
            basket.interviewer_id = interviewer_id;
            self.repository.save(token, &basket)?;
        }
        Ok(basket)
    }

    /// Snapshot the candidate into the basket. Unknown candidates leave it as is.
    pub fn add_candidate(
        &self,
        token: &SessionToken,
        key: &BasketKey,
        candidate_id: CandidateId,
    ) -> Result<Basket, ServiceError> {
        let mut basket = self.load(token, key)?;
        let Some(candidate) = self.candidates.by_id(candidate_id)? else {
            return Ok(basket);
        };
        basket.insert(BasketItem::snapshot(&candidate, key.vacancy_id));
        self.repository.save(token, &basket)?;
        Ok(basket)
    }

    pub fn remove_candidate(
        &self,
        token: &SessionToken,
        key: &BasketKey,
        candidate_id: CandidateId,
    ) -> Result<Basket, ServiceError> {
        let mut basket = self.load(token, key)?;
        if basket.remove(candidate_id).is_some() {
            self.repository.save(token, &basket)?;
        }
        Ok(basket)
    }

    pub fn clear(&self, token: &SessionToken, key: &BasketKey) -> Result<(), ServiceError> {
        self.repository.clear(token, key)?;
        Ok(())
    }
}
