use crate::database::{decode_row, decode_rows, named_params, RowExpectation, SqlError, SqlGateway};

use super::domain::{
    Candidate, CandidateId, EventId, InterviewEvent, Interviewer, InterviewerId, Vacancy,
    VacancyId,
};

/// Relational operations the interview workflow depends on.
pub trait InterviewStore: Send + Sync {
    fn open_vacancies(&self) -> Result<Vec<Vacancy>, SqlError>;
    fn interviewers(&self) -> Result<Vec<Interviewer>, SqlError>;
    fn vacancy(&self, vacancy_id: VacancyId) -> Result<Option<Vacancy>, SqlError>;
    fn candidates_by_vacancy(&self, vacancy_id: VacancyId) -> Result<Vec<Candidate>, SqlError>;
    fn candidate(&self, candidate_id: CandidateId) -> Result<Option<Candidate>, SqlError>;

    fn find_event(&self, vacancy_id: VacancyId, date: &str)
        -> Result<Option<InterviewEvent>, SqlError>;
    fn insert_event(
        &self,
        vacancy_id: VacancyId,
        date: &str,
        interviewer_id: Option<InterviewerId>,
    ) -> Result<EventId, SqlError>;
    /// Sets the interviewer only while the event has none; returns whether a
    /// row changed.
    fn assign_interviewer(
        &self,
        event_id: EventId,
        interviewer_id: InterviewerId,
    ) -> Result<bool, SqlError>;

    fn invitation_exists(
        &self,
        event_id: EventId,
        candidate_id: CandidateId,
    ) -> Result<bool, SqlError>;
    fn insert_invitation(
        &self,
        event_id: EventId,
        candidate_id: CandidateId,
        interviewer_id: Option<InterviewerId>,
    ) -> Result<(), SqlError>;
}

/// `InterviewStore` over the named scripts in `sql/interviews`.
#[derive(Debug, Clone)]
pub struct SqlInterviewStore {
    gateway: SqlGateway,
}

impl SqlInterviewStore {
    pub fn new(gateway: SqlGateway) -> Self {
        Self { gateway }
    }
}

impl InterviewStore for SqlInterviewStore {
    fn open_vacancies(&self) -> Result<Vec<Vacancy>, SqlError> {
        decode_rows(self.gateway.run_many("interview_vacancies_open.sql", &[])?)
    }

    fn interviewers(&self) -> Result<Vec<Interviewer>, SqlError> {
        decode_rows(self.gateway.run_many("interview_employees.sql", &[])?)
    }

    fn vacancy(&self, vacancy_id: VacancyId) -> Result<Option<Vacancy>, SqlError> {
        self.gateway
            .run_one(
                "vacancy_by_id.sql",
                named_params! { ":vacancy_id": vacancy_id.0 },
                RowExpectation::OPTIONAL,
            )?
            .map(decode_row)
            .transpose()
    }

    fn candidates_by_vacancy(&self, vacancy_id: VacancyId) -> Result<Vec<Candidate>, SqlError> {
        decode_rows(self.gateway.run_many(
            "candidates_by_vacancy.sql",
            named_params! { ":vacancy_id": vacancy_id.0 },
        )?)
    }

    fn candidate(&self, candidate_id: CandidateId) -> Result<Option<Candidate>, SqlError> {
        self.gateway
            .run_one(
                "candidate_by_id.sql",
                named_params! { ":candidate_id": candidate_id.0 },
                RowExpectation::OPTIONAL,
            )?
            .map(decode_row)
            .transpose()
    }

    fn find_event(
        &self,
        vacancy_id: VacancyId,
        date: &str,
    ) -> Result<Option<InterviewEvent>, SqlError> {
        self.gateway
            .run_one(
                "interview_event_find.sql",
                named_params! { ":vacancy_id": vacancy_id.0, ":date": date },
                RowExpectation::OPTIONAL,
            )?
            .map(decode_row)
            .transpose()
    }

    fn insert_event(
        &self,
        vacancy_id: VacancyId,
        date: &str,
        interviewer_id: Option<InterviewerId>,
    ) -> Result<EventId, SqlError> {
        let id = self.gateway.execute_returning_id(
            "interview_event_insert.sql",
            named_params! {
                ":vacancy_id": vacancy_id.0,
                ":date": date,
                ":interviewer_id": interviewer_id.map(|id| id.0),
            },
        )?;
        Ok(EventId(id))
    }

    fn assign_interviewer(
        &self,
        event_id: EventId,
        interviewer_id: InterviewerId,
    ) -> Result<bool, SqlError> {
        let changed = self.gateway.execute(
            "interview_event_set_interviewer.sql",
            named_params! { ":event_id": event_id.0, ":interviewer_id": interviewer_id.0 },
        )?;
        Ok(changed > 0)
    }

    fn invitation_exists(
        &self,
        event_id: EventId,
        candidate_id: CandidateId,
    ) -> Result<bool, SqlError> {
        let row = self.gateway.run_one(
            "calls_exists.sql",
            named_params! { ":event_id": event_id.0, ":candidate_id": candidate_id.0 },
            RowExpectation::OPTIONAL,
        )?;
        Ok(row.is_some())
    }

    fn insert_invitation(
        &self,
        event_id: EventId,
        candidate_id: CandidateId,
        interviewer_id: Option<InterviewerId>,
    ) -> Result<(), SqlError> {
        self.gateway.execute(
            "interview_call_insert.sql",
            named_params! {
                ":event_id": event_id.0,
                ":candidate_id": candidate_id.0,
                ":interviewer_id": interviewer_id.map(|id| id.0),
            },
        )?;
        Ok(())
    }
}
