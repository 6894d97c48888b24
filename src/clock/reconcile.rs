//! Decides what the fast-path punch action is for a scanned user, given the
//! day's existing record. The day is a three-state machine: no record yet,
//! checked in, complete. Completion is terminal for the fast path; reopening
//! a finished day goes through the explicit edit endpoint only.

use crate::clock::ClockError;
use crate::model::record::AttendanceRecord;
use serde::Serialize;
use strum::Display;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, ToSchema)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum NextAction {
    CheckIn,
    CheckOut,
    AlreadyComplete,
}

/// The decision procedure: absent record means check in, an open record
/// means check out, a closed record means the day is done.
pub fn decide(record: Option<&AttendanceRecord>) -> NextAction {
    match record {
        None => NextAction::CheckIn,
        Some(r) if r.check_in.is_some() && r.check_out.is_none() => NextAction::CheckOut,
        Some(r) if r.check_in.is_some() && r.check_out.is_some() => NextAction::AlreadyComplete,
        // A row with no check-in can only come from a retroactive edit that
        // set deduction/notes first; the fast path treats it as a fresh day.
        Some(_) => NextAction::CheckIn,
    }
}

/// A second check-in is an illegal transition, never a silent merge.
pub fn ensure_can_check_in(record: Option<&AttendanceRecord>) -> Result<(), ClockError> {
    match decide(record) {
        NextAction::CheckIn => Ok(()),
        NextAction::CheckOut => Err(ClockError::AlreadyCheckedIn),
        NextAction::AlreadyComplete => Err(ClockError::AlreadyComplete),
    }
}

/// Check-out requires an open check-in; anything else is rejected before a
/// write is attempted.
pub fn ensure_can_check_out(record: Option<&AttendanceRecord>) -> Result<(), ClockError> {
    match decide(record) {
        NextAction::CheckOut => Ok(()),
        NextAction::CheckIn => Err(ClockError::NotCheckedIn),
        NextAction::AlreadyComplete => Err(ClockError::AlreadyComplete),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(check_in: bool, check_out: bool) -> AttendanceRecord {
        AttendanceRecord {
            user_email: "alice@example.com".into(),
            date: "2026-03-02".into(),
            check_in: check_in.then(|| Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()),
            check_out: check_out.then(|| Utc.with_ymd_and_hms(2026, 3, 2, 17, 0, 0).unwrap()),
            check_in_recorder_uid: None,
            check_out_recorder_uid: None,
            deduction_minutes: 0,
            notes: None,
        }
    }

    #[test]
    fn no_record_means_check_in() {
        assert_eq!(decide(None), NextAction::CheckIn);
    }

    #[test]
    fn open_record_means_check_out() {
        assert_eq!(decide(Some(&record(true, false))), NextAction::CheckOut);
    }

    #[test]
    fn closed_record_is_terminal() {
        assert_eq!(decide(Some(&record(true, true))), NextAction::AlreadyComplete);
    }

    #[test]
    fn second_check_in_is_rejected_not_merged() {
        let open = record(true, false);
        assert_eq!(
            ensure_can_check_in(Some(&open)),
            Err(ClockError::AlreadyCheckedIn)
        );
    }

    #[test]
    fn check_in_after_completion_is_rejected() {
        let closed = record(true, true);
        assert_eq!(
            ensure_can_check_in(Some(&closed)),
            Err(ClockError::AlreadyComplete)
        );
    }

    #[test]
    fn check_out_without_record_is_rejected() {
        assert_eq!(ensure_can_check_out(None), Err(ClockError::NotCheckedIn));
    }

    #[test]
    fn check_out_without_check_in_is_rejected() {
        let bare = record(false, false);
        assert_eq!(
            ensure_can_check_out(Some(&bare)),
            Err(ClockError::NotCheckedIn)
        );
    }

    #[test]
    fn check_out_after_completion_is_rejected() {
        let closed = record(true, true);
        assert_eq!(
            ensure_can_check_out(Some(&closed)),
            Err(ClockError::AlreadyComplete)
        );
    }

    /// Scan three times across a day: check in, check out, then the day is
    /// closed and the third scan performs no write.
    #[test]
    fn full_day_walkthrough() {
        assert_eq!(decide(None), NextAction::CheckIn);

        let after_first = record(true, false);
        assert_eq!(decide(Some(&after_first)), NextAction::CheckOut);

        let after_second = record(true, true);
        assert_eq!(decide(Some(&after_second)), NextAction::AlreadyComplete);
        assert!(ensure_can_check_in(Some(&after_second)).is_err());
        assert!(ensure_can_check_out(Some(&after_second)).is_err());
    }
}
