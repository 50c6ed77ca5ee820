use std::sync::Arc;

use crate::cache::{cache_key, ReadThroughCache};
use crate::database::SqlError;

use super::domain::{Candidate, CandidateId, VacancyId};
use super::store::InterviewStore;

/// Candidate lookups routed through the read-through cache.
pub struct CandidateDirectory<S> {
    store: Arc<S>,
    cache: ReadThroughCache,
}

impl<S: InterviewStore> CandidateDirectory<S> {
    pub fn new(store: Arc<S>, cache: ReadThroughCache) -> Self {
        Self { store, cache }
    }

    pub fn by_vacancy(&self, vacancy_id: VacancyId) -> Result<Vec<Candidate>, SqlError> {
        let key = cache_key("candidates_by_vacancy", &[&vacancy_id]);
        self.cache
            .get_or_compute(&key, None, || self.store.candidates_by_vacancy(vacancy_id))
    }

    pub fn by_id(&self, candidate_id: CandidateId) -> Result<Option<Candidate>, SqlError> {
        let key = cache_key("candidate_by_id", &[&candidate_id]);
        self.cache
            .get_or_compute(&key, None, || self.store.candidate(candidate_id))
    }
}
