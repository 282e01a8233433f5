// service/state_machine.rs
//
// pending -> booked -> completed -> {rewarded | rejected}
// A booking may create a row directly in `booked`; `rewarded` and `rejected`
// are terminal and nothing moves backwards.
use uuid::Uuid;

use crate::{
    models::referralmodel::{Referral, ReferralStatus},
    service::error::ServiceError,
    utils::currency::format_cents,
};

use crate::models::referralmodel::ReferralStatus::*;

pub fn is_valid_transition(from: ReferralStatus, to: ReferralStatus) -> bool {
    if from.is_terminal() {
        return false;
    }
    matches!(
        (from, to),
        (Pending, Booked)
            // a repeated booking refreshes the referred person's details
            | (Booked, Booked)
            | (Booked, Completed)
            | (Completed, Rewarded)
            | (Pending, Rejected)
            | (Booked, Rejected)
            | (Completed, Rejected)
    )
}

/// Every status a referral may hold immediately before moving to `to`.
/// Used as the precondition of the conditional store update.
pub fn sources_for(to: ReferralStatus) -> Vec<ReferralStatus> {
    ReferralStatus::ALL
        .into_iter()
        .filter(|from| is_valid_transition(*from, to))
        .collect()
}

pub fn ensure_transition(referral: &Referral, to: ReferralStatus) -> Result<(), ServiceError> {
    transition_error(referral.id, referral.status, to).map_or(Ok(()), Err)
}

/// The error a failed move from `from` to `to` reports, if it fails at all.
pub fn transition_error(id: Uuid, from: ReferralStatus, to: ReferralStatus) -> Option<ServiceError> {
    if is_valid_transition(from, to) {
        return None;
    }
    if from == Rewarded && to == Rewarded {
        return Some(ServiceError::AlreadyRewarded(id));
    }
    Some(ServiceError::InvalidTransition { id, from, to })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobAssessment {
    Qualified,
    BelowThreshold { reason: String },
}

/// A job at exactly the threshold qualifies.
pub fn assess_job_value(total_cents: i64, min_job_value_cents: i64) -> JobAssessment {
    if total_cents >= min_job_value_cents {
        JobAssessment::Qualified
    } else {
        JobAssessment::BelowThreshold {
            reason: format!(
                "Job total {} below minimum threshold of {}",
                format_cents(total_cents),
                format_cents(min_job_value_cents)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_never_move() {
        for from in ReferralStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            assert!(sources_for(from).iter().all(|s| !s.is_terminal()));
        }
        for to in ReferralStatus::ALL {
            assert!(!is_valid_transition(Rewarded, to));
            assert!(!is_valid_transition(Rejected, to));
        }
    }

    #[test]
    fn never_regresses() {
        assert!(!is_valid_transition(Booked, Pending));
        assert!(!is_valid_transition(Completed, Booked));
        assert!(!is_valid_transition(Completed, Pending));
    }

    #[test]
    fn reward_only_from_completed() {
        assert_eq!(sources_for(Rewarded), vec![Completed]);
        assert_eq!(sources_for(Rejected), vec![Pending, Booked, Completed]);
        assert_eq!(sources_for(Booked), vec![Pending, Booked]);
        assert_eq!(sources_for(Completed), vec![Booked]);
    }

    #[test]
    fn rewarding_twice_is_a_distinct_error() {
        let id = Uuid::new_v4();
        assert!(matches!(
            transition_error(id, Rewarded, Rewarded),
            Some(ServiceError::AlreadyRewarded(_))
        ));
        assert!(matches!(
            transition_error(id, Pending, Rewarded),
            Some(ServiceError::InvalidTransition { from: Pending, to: Rewarded, .. })
        ));
        assert!(matches!(
            transition_error(id, Booked, Rewarded),
            Some(ServiceError::InvalidTransition { from: Booked, .. })
        ));
        assert!(transition_error(id, Completed, Rewarded).is_none());
    }

    #[test]
    fn threshold_is_inclusive() {
        assert_eq!(assess_job_value(15_000, 15_000), JobAssessment::Qualified);
        assert_eq!(assess_job_value(20_000, 15_000), JobAssessment::Qualified);
    }

    #[test]
    fn one_cent_below_threshold_rejects_with_both_amounts() {
        match assess_job_value(14_999, 15_000) {
            JobAssessment::BelowThreshold { reason } => {
                assert_eq!(reason, "Job total $149.99 below minimum threshold of $150");
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn rejection_message_uses_whole_dollars() {
        assert_eq!(
            assess_job_value(10_000, 15_000),
            JobAssessment::BelowThreshold {
                reason: "Job total $100 below minimum threshold of $150".to_string()
            }
        );
    }
}
