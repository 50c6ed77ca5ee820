use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::access::{section, AccessGate};
use crate::cache::ReadThroughCache;
use crate::error::{BusinessRule, ServiceError};
use crate::forms::{collect, FieldKind, FieldSpec, RawForm, ValidationFailure};
use crate::session::{Caller, Flash, FlashLevel, SessionStore};

use super::basket::{BasketManager, BasketRepository};
use super::candidates::CandidateDirectory;
use super::confirmation::{ConfirmationEngine, ConfirmationReceipt};
use super::domain::{
    Basket, BasketKey, Candidate, CandidateId, Interviewer, InterviewerId, Vacancy, VacancyId,
};
use super::store::InterviewStore;

/// The (vacancy, date) slot a request addresses plus the chosen interviewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppointmentSlot {
    pub key: BasketKey,
    pub interviewer_id: Option<InterviewerId>,
}

impl AppointmentSlot {
    pub fn new(vacancy_id: VacancyId, date: &str, interviewer_id: Option<InterviewerId>) -> Self {
        Self {
            key: BasketKey::new(vacancy_id, date),
            interviewer_id,
        }
    }

    pub fn from_form(form: &RawForm) -> Result<Self, ValidationFailure> {
        let values = collect(form, &slot_fields())?;
        // the date is an opaque key: keep it byte-for-byte
        let date = match form.raw_text("date") {
            Some(date) => date,
            None => values.required_text("date")?,
        };
        Ok(Self {
            key: BasketKey::new(VacancyId(values.required_int("vacancy_id")?), date),
            interviewer_id: values.int("interviewer_id").map(InterviewerId),
        })
    }
}

fn slot_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::new("vacancy_id", "Vacancy", FieldKind::Int, true),
        FieldSpec::new("date", "Interview date", FieldKind::Text, true),
        FieldSpec::new("interviewer_id", "Interviewer", FieldKind::Int, false),
    ]
}

/// Candidate id submitted alongside a slot.
pub fn candidate_from_form(form: &RawForm) -> Result<CandidateId, ValidationFailure> {
    let fields = [FieldSpec::new("candidate_id", "Candidate", FieldKind::Int, true)];
    let values = collect(form, &fields)?;
    Ok(CandidateId(values.required_int("candidate_id")?))
}

#[derive(Debug, Clone, Serialize)]
pub struct InterviewMenu {
    pub vacancies: Vec<Vacancy>,
    pub interviewers: Vec<Interviewer>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidatesView {
    pub vacancy: Vacancy,
    pub candidates: Vec<Candidate>,
    pub basket: Basket,
}

/// Caller-facing interview operations; each passes the access gate first.
pub struct AppointmentService<S, B> {
    gate: AccessGate,
    store: Arc<S>,
    sessions: Arc<B>,
    candidates: Arc<CandidateDirectory<S>>,
    baskets: Arc<BasketManager<S, B>>,
    engine: ConfirmationEngine<S, B>,
}

impl<S, B> AppointmentService<S, B>
where
    S: InterviewStore + 'static,
    B: BasketRepository + SessionStore + 'static,
{
    pub fn new(gate: AccessGate, store: Arc<S>, sessions: Arc<B>, cache: ReadThroughCache) -> Self {
        let candidates = Arc::new(CandidateDirectory::new(store.clone(), cache));
        let baskets = Arc::new(BasketManager::new(sessions.clone(), candidates.clone()));
        let engine = ConfirmationEngine::new(store.clone(), baskets.clone());
        Self {
            gate,
            store,
            sessions,
            candidates,
            baskets,
            engine,
        }
    }

    pub fn sessions(&self) -> &B {
        &self.sessions
    }

    /// Gate check on its own, for callers that validate input afterwards.
    pub fn admit(&self, caller: Option<&Caller>) -> Result<(), ServiceError> {
        self.gate.admit(caller, section::INTERVIEWS)?;
        Ok(())
    }

    pub fn view_menu(&self, caller: Option<&Caller>) -> Result<InterviewMenu, ServiceError> {
        self.gate.admit(caller, section::INTERVIEWS)?;
        Ok(InterviewMenu {
            vacancies: self.store.open_vacancies()?,
            interviewers: self.store.interviewers()?,
        })
    }

    pub fn view_candidates(
        &self,
        caller: Option<&Caller>,
        slot: &AppointmentSlot,
    ) -> Result<CandidatesView, ServiceError> {
        let caller = self.gate.admit(caller, section::INTERVIEWS)?;
        let vacancy = self
            .store
            .vacancy(slot.key.vacancy_id)?
            .ok_or_else(|| ServiceError::not_found(format!("Vacancy {} not found", slot.key.vacancy_id)))?;
        if !vacancy.is_open() {
            return Err(ServiceError::BusinessRule(BusinessRule::VacancyClosed));
        }

        let basket = self
            .baskets
            .set_interviewer(&caller.token, &slot.key, slot.interviewer_id)?;
        let candidates = self.candidates.by_vacancy(slot.key.vacancy_id)?;
        Ok(CandidatesView {
            vacancy,
            candidates,
            basket,
        })
    }

    pub fn add_to_basket(
        &self,
        caller: Option<&Caller>,
        slot: &AppointmentSlot,
        candidate_id: CandidateId,
    ) -> Result<Basket, ServiceError> {
        let caller = self.gate.admit(caller, section::INTERVIEWS)?;
        self.baskets
            .set_interviewer(&caller.token, &slot.key, slot.interviewer_id)?;
        self.baskets
            .add_candidate(&caller.token, &slot.key, candidate_id)
    }

    pub fn remove_from_basket(
        &self,
        caller: Option<&Caller>,
        slot: &AppointmentSlot,
        candidate_id: CandidateId,
    ) -> Result<Basket, ServiceError> {
        let caller = self.gate.admit(caller, section::INTERVIEWS)?;
        self.baskets
            .set_interviewer(&caller.token, &slot.key, slot.interviewer_id)?;
        self.baskets
            .remove_candidate(&caller.token, &slot.key, candidate_id)
    }

    pub fn confirm(
        &self,
        caller: Option<&Caller>,
        slot: &AppointmentSlot,
    ) -> Result<ConfirmationReceipt, ServiceError> {
        let caller = self.gate.admit(caller, section::INTERVIEWS)?;
        let receipt = self
            .engine
            .confirm(&caller.token, &slot.key, slot.interviewer_id)?;

        let flash = Flash::new(
            FlashLevel::Success,
            format!("Invitations created: {}", receipt.created),
        );
        if let Err(err) = self.sessions.push_flash(&caller.token, flash) {
            warn!(error = %err, "could not record confirmation flash");
        }
        Ok(receipt)
    }
}
