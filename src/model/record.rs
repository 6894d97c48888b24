use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One attendance document per user per local calendar day.
/// `(user_email, date)` is the natural key; the row is created by the first
/// check-in of the day and completed by a later check-out merge-write.
///
/// "No checkout yet" is always an SQL NULL; readers never distinguish an
/// absent field from an explicit null.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(
    example = json!({
        "userEmail": "alice@example.com",
        "date": "2026-03-02",
        "checkIn": "2026-03-02T08:01:12Z",
        "checkOut": null,
        "checkInRecorderUid": "gatekeeper",
        "checkOutRecorderUid": null,
        "deductionMinutes": 0,
        "notes": null
    })
)]
pub struct AttendanceRecord {
    #[schema(example = "alice@example.com")]
    pub user_email: String,

    /// Local calendar day, `YYYY-MM-DD`.
    #[schema(example = "2026-03-02")]
    pub date: String,

    #[schema(value_type = Option<String>, format = "date-time", nullable = true)]
    pub check_in: Option<DateTime<Utc>>,

    #[schema(value_type = Option<String>, format = "date-time", nullable = true)]
    pub check_out: Option<DateTime<Utc>>,

    /// Username of the operator who recorded the check-in, if any.
    #[schema(example = "gatekeeper", nullable = true)]
    pub check_in_recorder_uid: Option<String>,

    #[schema(nullable = true)]
    pub check_out_recorder_uid: Option<String>,

    /// Minutes subtracted from the worked duration (breaks etc.).
    #[schema(example = 30)]
    pub deduction_minutes: u32,

    #[schema(nullable = true)]
    pub notes: Option<String>,
}

impl AttendanceRecord {
    /// Worked minutes net of deductions, clamped at zero.
    /// `None` until the day has both a check-in and a check-out.
    pub fn worked_minutes(&self) -> Option<i64> {
        let check_in = self.check_in?;
        let check_out = self.check_out?;
        let gross = (check_out - check_in).num_minutes();
        Some((gross - self.deduction_minutes as i64).max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(check_in_min: i64, check_out_min: Option<i64>, deduction: u32) -> AttendanceRecord {
        let base = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        AttendanceRecord {
            user_email: "alice@example.com".into(),
            date: "2026-03-02".into(),
            check_in: Some(base + chrono::Duration::minutes(check_in_min)),
            check_out: check_out_min.map(|m| base + chrono::Duration::minutes(m)),
            check_in_recorder_uid: None,
            check_out_recorder_uid: None,
            deduction_minutes: deduction,
            notes: None,
        }
    }

    #[test]
    fn worked_minutes_subtracts_deduction() {
        assert_eq!(record(0, Some(480), 30).worked_minutes(), Some(450));
    }

    #[test]
    fn worked_minutes_clamps_at_zero() {
        assert_eq!(record(0, Some(20), 60).worked_minutes(), Some(0));
    }

    #[test]
    fn worked_minutes_requires_checkout() {
        assert_eq!(record(0, None, 0).worked_minutes(), None);
    }
}
