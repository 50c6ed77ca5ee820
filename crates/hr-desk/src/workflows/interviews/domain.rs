use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Vacancy identifier in the relational store.
    VacancyId
);
numeric_id!(CandidateId);
numeric_id!(
    /// Employee acting as interviewer.
    InterviewerId
);
numeric_id!(EventId);

/// Status value every basket item carries until it is confirmed.
pub const PLANNED_STATUS: &str = "planned";

const OPEN_STATUS: &str = "open";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vacancy {
    pub vacancy_id: VacancyId,
    #[serde(default)]
    pub title: Option<String>,
    pub status: String,
}

impl Vacancy {
    pub fn is_open(&self) -> bool {
        self.status.eq_ignore_ascii_case(OPEN_STATUS)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub candidate_id: CandidateId,
    pub full_name: Option<String>,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub job_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interviewer {
    pub employee_id: InterviewerId,
    pub full_name: Option<String>,
}

/// Durable interview session for one vacancy on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewEvent {
    pub event_id: EventId,
    pub vacancy_id: VacancyId,
    pub date: String,
    pub interviewer_id: Option<InterviewerId>,
}

/// Identifies one basket inside a session. The date is opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BasketKey {
    pub vacancy_id: VacancyId,
    pub date: String,
}

impl BasketKey {
    pub fn new(vacancy_id: VacancyId, date: impl Into<String>) -> Self {
        Self {
            vacancy_id,
            date: date.into(),
        }
    }
}

impl fmt::Display for BasketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.vacancy_id, self.date)
    }
}

/// Candidate snapshot taken when it was added; later edits do not leak in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasketItem {
    pub candidate_id: CandidateId,
    pub full_name: Option<String>,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub job_id: Option<i64>,
    pub vacancy_id: VacancyId,
    pub status: String,
}

impl BasketItem {
    pub fn snapshot(candidate: &Candidate, vacancy_id: VacancyId) -> Self {
        Self {
            candidate_id: candidate.candidate_id,
            full_name: candidate.full_name.clone(),
            age: candidate.age,
            gender: candidate.gender.clone(),
            job_id: candidate.job_id,
            vacancy_id,
            status: PLANNED_STATUS.to_string(),
        }
    }
}

/// Uncommitted selection of candidates for one (vacancy, date) slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Basket {
    pub vacancy_id: VacancyId,
    pub date: String,
    pub interviewer_id: Option<InterviewerId>,
    /// Keyed by the candidate id rendered as a string.
    pub items: BTreeMap<String, BasketItem>,
}

impl Basket {
    pub fn empty(key: &BasketKey) -> Self {
        Self {
            vacancy_id: key.vacancy_id,
            date: key.date.clone(),
            interviewer_id: None,
            items: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> BasketKey {
        BasketKey::new(self.vacancy_id, self.date.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn insert(&mut self, item: BasketItem) {
        self.items.insert(item.candidate_id.to_string(), item);
    }

    pub fn remove(&mut self, candidate_id: CandidateId) -> Option<BasketItem> {
        self.items.remove(&candidate_id.to_string())
    }

    pub fn candidate_ids(&self) -> Vec<CandidateId> {
        self.items.values().map(|item| item.candidate_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_basket_serializes_with_null_interviewer() {
        let basket = Basket::empty(&BasketKey::new(VacancyId(17), "2024-05-01"));
        let json = serde_json::to_value(&basket).expect("basket serializes");
        assert_eq!(
            json,
            serde_json::json!({
                "vacancy_id": 17,
                "date": "2024-05-01",
                "interviewer_id": null,
                "items": {}
            })
        );
    }

    #[test]
    fn basket_key_renders_as_storage_key() {
        assert_eq!(
            BasketKey::new(VacancyId(3), "2024-06-10").to_string(),
            "3|2024-06-10"
        );
    }

    #[test]
    fn vacancy_status_is_case_insensitive() {
        let vacancy = Vacancy {
            vacancy_id: VacancyId(1),
            title: None,
            status: "OPEN".to_string(),
        };
        assert!(vacancy.is_open());
    }
}
