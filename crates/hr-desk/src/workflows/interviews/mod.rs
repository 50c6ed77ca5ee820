//! Interview appointment workflow: a per-session basket of candidates for one
//! (vacancy, date) slot, confirmed into durable interview events and
//! deduplicated invitations.

pub mod basket;
pub mod candidates;
pub mod confirmation;
pub mod domain;
pub mod router;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use basket::{BasketManager, BasketRepository};
pub use candidates::CandidateDirectory;
pub use confirmation::{ConfirmationEngine, ConfirmationReceipt};
pub use domain::{
    Basket, BasketItem, BasketKey, Candidate, CandidateId, EventId, InterviewEvent, Interviewer,
    InterviewerId, Vacancy, VacancyId,
};
pub use router::interview_router;
pub use service::{AppointmentService, AppointmentSlot, CandidatesView, InterviewMenu};
pub use store::{InterviewStore, SqlInterviewStore};
