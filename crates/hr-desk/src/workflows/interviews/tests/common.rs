use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::response::Response;
use serde_json::Value;

use crate::access::{AccessGate, AccessPolicy};
use crate::cache::{CacheBackend, CacheError, MemoryCache, ReadThroughCache, DEFAULT_TTL};
use crate::database::SqlError;
use crate::session::{Caller, Identity, InMemorySessionStore, SessionStore};
use crate::workflows::interviews::domain::{
    Candidate, CandidateId, EventId, InterviewEvent, Interviewer, InterviewerId, Vacancy,
    VacancyId,
};
use crate::workflows::interviews::store::InterviewStore;
use crate::workflows::interviews::{interview_router, AppointmentService};

pub(super) const OPEN_VACANCY: VacancyId = VacancyId(17);
pub(super) const CLOSED_VACANCY: VacancyId = VacancyId(18);
pub(super) const DATE: &str = "2024-05-01";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct StoredInvitation {
    pub event_id: EventId,
    pub candidate_id: CandidateId,
    pub interviewer_id: Option<InterviewerId>,
}

#[derive(Debug, Default)]
struct StoreState {
    vacancies: Vec<Vacancy>,
    interviewers: Vec<Interviewer>,
    candidates: BTreeMap<i64, Candidate>,
    events: Vec<InterviewEvent>,
    invitations: Vec<StoredInvitation>,
    candidate_lookups: usize,
}

/// In-memory relational double with the same conditional back-fill
/// semantics as the SQL scripts.
#[derive(Debug, Default)]
pub(super) struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub(super) fn seeded() -> Self {
        let store = Self::default();
        {
            let mut state = store.state.lock().expect("store lock");
            state.vacancies = vec![
                vacancy(OPEN_VACANCY, "Backend engineer", "open"),
                vacancy(CLOSED_VACANCY, "Office manager", "closed"),
            ];
            state.interviewers = vec![interviewer(9, "Irina Volkova"), interviewer(12, "Pavel Orlov")];
            for (id, name) in [(5, "Anna Smirnova"), (6, "Boris Ivanov"), (7, "Vera Kim")] {
                state.candidates.insert(id, candidate(id, name));
            }
        }
        store
    }

    pub(super) fn seed_event(&self, interviewer_id: Option<InterviewerId>) -> EventId {
        let mut state = self.state.lock().expect("store lock");
        let event_id = EventId(state.events.len() as i64 + 1);
        state.events.push(InterviewEvent {
            event_id,
            vacancy_id: OPEN_VACANCY,
            date: DATE.to_string(),
            interviewer_id,
        });
        event_id
    }

    pub(super) fn seed_invitation(&self, event_id: EventId, candidate_id: CandidateId) {
        self.state
            .lock()
            .expect("store lock")
            .invitations
            .push(StoredInvitation {
                event_id,
                candidate_id,
                interviewer_id: None,
            });
    }

    pub(super) fn rename_candidate(&self, candidate_id: CandidateId, name: &str) {
        if let Some(candidate) = self
            .state
            .lock()
            .expect("store lock")
            .candidates
            .get_mut(&candidate_id.0)
        {
            candidate.full_name = Some(name.to_string());
        }
    }

    pub(super) fn invitations(&self) -> Vec<StoredInvitation> {
        self.state.lock().expect("store lock").invitations.clone()
    }

    pub(super) fn events(&self) -> Vec<InterviewEvent> {
        self.state.lock().expect("store lock").events.clone()
    }

    pub(super) fn candidate_lookups(&self) -> usize {
        self.state.lock().expect("store lock").candidate_lookups
    }
}

impl InterviewStore for MemoryStore {
    fn open_vacancies(&self) -> Result<Vec<Vacancy>, SqlError> {
        let state = self.state.lock().expect("store lock");
        Ok(state
            .vacancies
            .iter()
            .filter(|vacancy| vacancy.is_open())
            .cloned()
            .collect())
    }

    fn interviewers(&self) -> Result<Vec<Interviewer>, SqlError> {
        Ok(self.state.lock().expect("store lock").interviewers.clone())
    }

    fn vacancy(&self, vacancy_id: VacancyId) -> Result<Option<Vacancy>, SqlError> {
        let state = self.state.lock().expect("store lock");
        Ok(state
            .vacancies
            .iter()
            .find(|vacancy| vacancy.vacancy_id == vacancy_id)
            .cloned())
    }

    fn candidates_by_vacancy(&self, _vacancy_id: VacancyId) -> Result<Vec<Candidate>, SqlError> {
        let mut state = self.state.lock().expect("store lock");
        state.candidate_lookups += 1;
        Ok(state.candidates.values().cloned().collect())
    }

    fn candidate(&self, candidate_id: CandidateId) -> Result<Option<Candidate>, SqlError> {
        let mut state = self.state.lock().expect("store lock");
        state.candidate_lookups += 1;
        Ok(state.candidates.get(&candidate_id.0).cloned())
    }

    fn find_event(
        &self,
        vacancy_id: VacancyId,
        date: &str,
    ) -> Result<Option<InterviewEvent>, SqlError> {
        let state = self.state.lock().expect("store lock");
        Ok(state
            .events
            .iter()
            .find(|event| event.vacancy_id == vacancy_id && event.date == date)
            .cloned())
    }

    fn insert_event(
        &self,
        vacancy_id: VacancyId,
        date: &str,
        interviewer_id: Option<InterviewerId>,
    ) -> Result<EventId, SqlError> {
        let mut state = self.state.lock().expect("store lock");
        let event_id = EventId(state.events.len() as i64 + 1);
        state.events.push(InterviewEvent {
            event_id,
            vacancy_id,
            date: date.to_string(),
            interviewer_id,
        });
        Ok(event_id)
    }

    fn assign_interviewer(
        &self,
        event_id: EventId,
        interviewer_id: InterviewerId,
    ) -> Result<bool, SqlError> {
        let mut state = self.state.lock().expect("store lock");
        match state
            .events
            .iter_mut()
            .find(|event| event.event_id == event_id && event.interviewer_id.is_none())
        {
            Some(event) => {
                event.interviewer_id = Some(interviewer_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn invitation_exists(
        &self,
        event_id: EventId,
        candidate_id: CandidateId,
    ) -> Result<bool, SqlError> {
        let state = self.state.lock().expect("store lock");
        Ok(state
            .invitations
            .iter()
            .any(|call| call.event_id == event_id && call.candidate_id == candidate_id))
    }

    fn insert_invitation(
        &self,
        event_id: EventId,
        candidate_id: CandidateId,
        interviewer_id: Option<InterviewerId>,
    ) -> Result<(), SqlError> {
        // yield between check and insert so racing confirmations would interleave
        std::thread::sleep(Duration::from_millis(2));
        self.state
            .lock()
            .expect("store lock")
            .invitations
            .push(StoredInvitation {
                event_id,
                candidate_id,
                interviewer_id,
            });
        Ok(())
    }
}

/// Cache backend that refuses every call.
pub(super) struct DownCache;

impl CacheBackend for DownCache {
    fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    fn set(&self, _key: &str, _payload: String, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }
}

pub(super) type TestService = AppointmentService<MemoryStore, InMemorySessionStore>;

pub(super) struct Harness {
    pub service: Arc<TestService>,
    pub store: Arc<MemoryStore>,
    pub sessions: Arc<InMemorySessionStore>,
}

impl Harness {
    pub(super) fn login(&self, role: &str) -> Caller {
        let identity = Identity {
            user_id: 1,
            login: format!("{role}-user"),
            role: role.to_string(),
        };
        let token = self.sessions.create(identity.clone()).expect("session");
        Caller { token, identity }
    }

    pub(super) fn router(&self) -> axum::Router {
        interview_router(self.service.clone())
    }
}

pub(super) fn policy() -> AccessPolicy {
    AccessPolicy::from_entries([("recruiter", vec!["interviews"]), ("clerk", vec!["reports"])])
}

pub(super) fn harness() -> Harness {
    harness_with_cache(ReadThroughCache::new(
        Arc::new(MemoryCache::default()),
        DEFAULT_TTL,
    ))
}

pub(super) fn harness_with_cache(cache: ReadThroughCache) -> Harness {
    let store = Arc::new(MemoryStore::seeded());
    let sessions = Arc::new(InMemorySessionStore::default());
    let service = Arc::new(AppointmentService::new(
        AccessGate::new(Arc::new(policy())),
        store.clone(),
        sessions.clone(),
        cache,
    ));
    Harness {
        service,
        store,
        sessions,
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

fn vacancy(vacancy_id: VacancyId, title: &str, status: &str) -> Vacancy {
    Vacancy {
        vacancy_id,
        title: Some(title.to_string()),
        status: status.to_string(),
    }
}

fn interviewer(id: i64, name: &str) -> Interviewer {
    Interviewer {
        employee_id: InterviewerId(id),
        full_name: Some(name.to_string()),
    }
}

fn candidate(id: i64, name: &str) -> Candidate {
    Candidate {
        candidate_id: CandidateId(id),
        full_name: Some(name.to_string()),
        age: Some(30),
        gender: None,
        job_id: Some(OPEN_VACANCY.0),
    }
}
