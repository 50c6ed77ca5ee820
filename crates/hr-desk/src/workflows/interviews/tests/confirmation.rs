use std::thread;

use super::common::*;
use crate::error::{BusinessRule, ServiceError};
use crate::session::SessionStore;
use crate::workflows::interviews::domain::{CandidateId, InterviewerId};
use crate::workflows::interviews::service::AppointmentSlot;

fn slot(interviewer: Option<i64>) -> AppointmentSlot {
    AppointmentSlot::new(OPEN_VACANCY, DATE, interviewer.map(InterviewerId))
}

fn fill(harness: &Harness, caller: &crate::session::Caller, candidates: &[i64]) {
    for &id in candidates {
        harness
            .service
            .add_to_basket(Some(caller), &slot(None), CandidateId(id))
            .expect("candidate added");
    }
}

#[test]
fn empty_basket_is_rejected_without_side_effects() {
    let harness = harness();
    let caller = harness.login("recruiter");

    let err = harness
        .service
        .confirm(Some(&caller), &slot(Some(9)))
        .expect_err("empty basket");

    assert!(matches!(
        err,
        ServiceError::BusinessRule(BusinessRule::BasketEmpty)
    ));
    assert!(harness.store.events().is_empty());
    assert!(harness.store.invitations().is_empty());
}

#[test]
fn confirm_creates_event_and_invitations_then_clears_basket() {
    let harness = harness();
    let caller = harness.login("recruiter");
    fill(&harness, &caller, &[5, 6]);

    let receipt = harness
        .service
        .confirm(Some(&caller), &slot(Some(9)))
        .expect("confirmed");

    assert_eq!(receipt.created, 2);
    assert_eq!(receipt.skipped, 0);
    assert_eq!(receipt.interviewer_id, Some(InterviewerId(9)));

    let events = harness.store.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].interviewer_id, Some(InterviewerId(9)));
    assert!(harness
        .store
        .invitations()
        .iter()
        .all(|call| call.event_id == receipt.event_id
            && call.interviewer_id == Some(InterviewerId(9))));

    let basket = harness
        .service
        .remove_from_basket(Some(&caller), &slot(None), CandidateId(5))
        .expect("basket reloads");
    assert!(basket.is_empty());
}

#[test]
fn second_confirm_is_rejected_and_creates_nothing() {
    let harness = harness();
    let caller = harness.login("recruiter");
    fill(&harness, &caller, &[5]);

    harness
        .service
        .confirm(Some(&caller), &slot(None))
        .expect("first confirm");
    let err = harness
        .service
        .confirm(Some(&caller), &slot(None))
        .expect_err("second confirm");

    assert_eq!(err.code(), "basket_empty");
    assert_eq!(harness.store.invitations().len(), 1);
}

#[test]
fn existing_invitations_are_skipped() {
    let harness = harness();
    let event_id = harness.store.seed_event(None);
    harness.store.seed_invitation(event_id, CandidateId(5));
    let caller = harness.login("recruiter");
    fill(&harness, &caller, &[5, 6]);

    let receipt = harness
        .service
        .confirm(Some(&caller), &slot(None))
        .expect("confirmed");

    assert_eq!(receipt.event_id, event_id);
    assert_eq!(receipt.created, 1);
    assert_eq!(receipt.skipped, 1);
    let for_six: Vec<_> = harness
        .store
        .invitations()
        .into_iter()
        .filter(|call| call.candidate_id == CandidateId(6))
        .collect();
    assert_eq!(for_six.len(), 1);
}

#[test]
fn interviewer_is_back_filled_once_and_never_replaced() {
    let harness = harness();
    harness.store.seed_event(None);

    let first = harness.login("recruiter");
    fill(&harness, &first, &[5]);
    harness
        .service
        .confirm(Some(&first), &slot(Some(9)))
        .expect("first confirm");
    assert_eq!(
        harness.store.events()[0].interviewer_id,
        Some(InterviewerId(9))
    );

    let second = harness.login("recruiter");
    fill(&harness, &second, &[6]);
    let receipt = harness
        .service
        .confirm(Some(&second), &slot(Some(12)))
        .expect("second confirm");

    assert_eq!(receipt.interviewer_id, Some(InterviewerId(9)));
    assert_eq!(
        harness.store.events()[0].interviewer_id,
        Some(InterviewerId(9))
    );
    assert!(harness
        .store
        .invitations()
        .iter()
        .all(|call| call.interviewer_id == Some(InterviewerId(9))));
}

#[test]
fn basket_interviewer_is_used_when_none_is_submitted() {
    let harness = harness();
    let caller = harness.login("recruiter");
    harness
        .service
        .add_to_basket(Some(&caller), &slot(Some(12)), CandidateId(7))
        .expect("added");

    let receipt = harness
        .service
        .confirm(Some(&caller), &slot(None))
        .expect("confirmed");

    assert_eq!(receipt.interviewer_id, Some(InterviewerId(12)));
}

#[test]
fn concurrent_confirmations_do_not_duplicate_invitations() {
    let harness = harness();
    let callers: Vec<_> = (0..4).map(|_| harness.login("recruiter")).collect();
    for caller in &callers {
        fill(&harness, caller, &[5, 6, 7]);
    }

    let created: usize = thread::scope(|scope| {
        let handles: Vec<_> = callers
            .iter()
            .map(|caller| {
                let service = harness.service.clone();
                scope.spawn(move || {
                    service
                        .confirm(Some(caller), &slot(Some(9)))
                        .expect("confirmed")
                        .created
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("thread joins"))
            .sum()
    });

    assert_eq!(created, 3);
    assert_eq!(harness.store.invitations().len(), 3);
    assert_eq!(harness.store.events().len(), 1);
}

#[test]
fn confirmation_leaves_a_success_flash() {
    let harness = harness();
    let caller = harness.login("recruiter");
    fill(&harness, &caller, &[5, 6]);

    harness
        .service
        .confirm(Some(&caller), &slot(None))
        .expect("confirmed");

    let flashes = harness.sessions.take_flashes(&caller.token).expect("flashes");
    assert_eq!(flashes.len(), 1);
    assert!(flashes[0].message.contains('2'));
}
