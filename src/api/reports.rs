use crate::auth::auth::AuthUser;
use crate::model::record::AttendanceRecord;
use crate::utils::time;
use actix_web::{HttpResponse, Responder, error::ErrorInternalServerError, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use std::collections::HashMap;
use tracing::error;
use utoipa::ToSchema;

#[derive(Debug, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySummary {
    /// One slot per day of the month, hours net of deductions
    pub daily_hours: Vec<f64>,
    pub total_hours: f64,
    pub work_days: u32,
    pub avg_hours: f64,
}

/// Fold one month of records into the per-day series the report chart
/// consumes. Incomplete days contribute nothing.
pub fn monthly_summary(records: &[AttendanceRecord], days_in_month: u32) -> MonthlySummary {
    let mut daily_hours = vec![0.0; days_in_month as usize];
    let mut total_hours = 0.0;
    let mut work_days = 0;

    for record in records {
        let Some(minutes) = record.worked_minutes() else {
            continue;
        };
        // Day-of-month from the date key; the record layout guarantees
        // YYYY-MM-DD but a malformed row must not panic the report.
        let Some(day) = record
            .date
            .get(8..10)
            .and_then(|d| d.parse::<usize>().ok())
            .filter(|d| (1..=daily_hours.len()).contains(d))
        else {
            continue;
        };

        let hours = minutes as f64 / 60.0;
        daily_hours[day - 1] = hours;
        total_hours += hours;
        if minutes > 0 {
            work_days += 1;
        }
    }

    let avg_hours = if work_days > 0 {
        total_hours / work_days as f64
    } else {
        0.0
    };

    MonthlySummary {
        daily_hours,
        total_hours,
        work_days,
        avg_hours,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedTotal {
    pub email: String,
    pub total_minutes: i64,
    pub work_days: u32,
}

/// Total worked minutes per user over a record set, highest first; ties
/// break on email for a stable order.
pub fn rank_totals(records: &[AttendanceRecord]) -> Vec<RankedTotal> {
    let mut totals: HashMap<&str, (i64, u32)> = HashMap::new();

    for record in records {
        let Some(minutes) = record.worked_minutes() else {
            continue;
        };
        let entry = totals.entry(record.user_email.as_str()).or_default();
        entry.0 += minutes;
        entry.1 += 1;
    }

    let mut ranked: Vec<RankedTotal> = totals
        .into_iter()
        .map(|(email, (total_minutes, work_days))| RankedTotal {
            email: email.to_string(),
            total_minutes,
            work_days,
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.total_minutes
            .cmp(&a.total_minutes)
            .then_with(|| a.email.cmp(&b.email))
    });
    ranked
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UserReportQuery {
    pub email: String,
    /// Month to report, `YYYY-MM`
    pub month: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserReportResponse {
    pub email: String,
    pub month: String,
    #[serde(flatten)]
    pub summary: MonthlySummary,
    pub records: Vec<AttendanceRecord>,
}

/// Monthly per-user report: the per-day worked-hours series plus totals,
/// net of deductions.
#[utoipa::path(
    get,
    path = "/api/v1/reports/user",
    params(
        ("email", Query, description = "User email"),
        ("month", Query, description = "Month, YYYY-MM")
    ),
    responses(
        (status = 200, description = "Monthly report", body = UserReportResponse),
        (status = 400, description = "Malformed month"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Reports"
)]
pub async fn user_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<UserReportQuery>,
) -> actix_web::Result<impl Responder> {
    let email = query.email.to_lowercase();

    if !auth.role.is_admin() && !super::owns_email(&auth, &email, pool.get_ref()).await? {
        return Err(actix_web::error::ErrorForbidden("Not your report"));
    }

    let Some((start, end)) = time::month_bounds(&query.month) else {
        return Ok(HttpResponse::BadRequest().json(json!({
            "message": "Invalid month, expected YYYY-MM"
        })));
    };
    let days = (end - start).num_days() as u32;

    let records = sqlx::query_as::<_, AttendanceRecord>(
        r#"
        SELECT user_email, date, check_in, check_out,
               check_in_recorder_uid, check_out_recorder_uid,
               deduction_minutes, notes
        FROM attendance_records
        WHERE user_email = ? AND date >= ? AND date < ?
        ORDER BY date ASC
        "#,
    )
    .bind(&email)
    .bind(start.format("%Y-%m-%d").to_string())
    .bind(end.format("%Y-%m-%d").to_string())
    .fetch_all(pool.get_ref())
    .await
    .map_err(|e| {
        error!(error = %e, %email, "Monthly report query failed");
        ErrorInternalServerError("Internal Server Error")
    })?;

    let summary = monthly_summary(&records, days);

    Ok(HttpResponse::Ok().json(UserReportResponse {
        email,
        month: query.month.clone(),
        summary,
        records,
    }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RankingsQuery {
    /// Inclusive lower day bound, YYYY-MM-DD
    pub from: String,
    /// Inclusive upper day bound, YYYY-MM-DD
    pub to: String,
    pub limit: Option<usize>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RankingRow {
    pub rank: usize,
    pub email: String,
    #[schema(nullable = true)]
    pub name: Option<String>,
    pub total_hours: f64,
    pub work_days: u32,
}

/// Total-hours leaderboard over a day range (the top-three chart and the
/// rankings table both read this).
#[utoipa::path(
    get,
    path = "/api/v1/reports/rankings",
    params(
        ("from", Query, description = "Inclusive lower day bound"),
        ("to", Query, description = "Inclusive upper day bound"),
        ("limit", Query, description = "Max rows, default 10")
    ),
    responses(
        (status = 200, description = "Ranked totals", body = [RankingRow]),
        (status = 400, description = "Malformed day bound"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Reports"
)]
pub async fn rankings(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<RankingsQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    if time::parse_day(&query.from).is_none() || time::parse_day(&query.to).is_none() {
        return Ok(HttpResponse::BadRequest().json(json!({
            "message": "Invalid day bound, expected YYYY-MM-DD"
        })));
    }
    let limit = query.limit.unwrap_or(10).clamp(1, 100);

    let records = sqlx::query_as::<_, AttendanceRecord>(
        r#"
        SELECT user_email, date, check_in, check_out,
               check_in_recorder_uid, check_out_recorder_uid,
               deduction_minutes, notes
        FROM attendance_records
        WHERE date >= ? AND date <= ?
        AND check_in IS NOT NULL AND check_out IS NOT NULL
        "#,
    )
    .bind(&query.from)
    .bind(&query.to)
    .fetch_all(pool.get_ref())
    .await
    .map_err(|e| {
        error!(error = %e, "Rankings query failed");
        ErrorInternalServerError("Internal Server Error")
    })?;

    let mut rows = Vec::with_capacity(limit);
    for (index, total) in rank_totals(&records).into_iter().take(limit).enumerate() {
        let name = super::attendance::fetch_profile(pool.get_ref(), &total.email)
            .await
            .map_err(|e| {
                error!(error = %e, email = %total.email, "Ranking profile lookup failed");
                ErrorInternalServerError("Internal Server Error")
            })?
            .map(|p| p.name);

        rows.push(RankingRow {
            rank: index + 1,
            email: total.email,
            name,
            total_hours: total.total_minutes as f64 / 60.0,
            work_days: total.work_days,
        });
    }

    Ok(HttpResponse::Ok().json(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(email: &str, date: &str, hours: i64, deduction: u32) -> AttendanceRecord {
        let day: Vec<u32> = date.split('-').skip(1).map(|p| p.parse().unwrap()).collect();
        let start = Utc
            .with_ymd_and_hms(2026, day[0], day[1], 8, 0, 0)
            .unwrap();
        AttendanceRecord {
            user_email: email.into(),
            date: date.into(),
            check_in: Some(start),
            check_out: Some(start + chrono::Duration::hours(hours)),
            check_in_recorder_uid: None,
            check_out_recorder_uid: None,
            deduction_minutes: deduction,
            notes: None,
        }
    }

    fn open_record(email: &str, date: &str) -> AttendanceRecord {
        let mut r = record(email, date, 1, 0);
        r.check_out = None;
        r
    }

    #[test]
    fn monthly_summary_places_hours_by_day() {
        let records = vec![
            record("a@x", "2026-03-02", 8, 0),
            record("a@x", "2026-03-03", 6, 60),
            open_record("a@x", "2026-03-04"),
        ];
        let summary = monthly_summary(&records, 31);

        assert_eq!(summary.daily_hours.len(), 31);
        assert_eq!(summary.daily_hours[1], 8.0);
        assert_eq!(summary.daily_hours[2], 5.0); // deduction taken off
        assert_eq!(summary.daily_hours[3], 0.0); // still open, no hours
        assert_eq!(summary.work_days, 2);
        assert_eq!(summary.total_hours, 13.0);
        assert_eq!(summary.avg_hours, 6.5);
    }

    #[test]
    fn monthly_summary_of_nothing_is_all_zero() {
        let summary = monthly_summary(&[], 30);
        assert_eq!(summary.total_hours, 0.0);
        assert_eq!(summary.work_days, 0);
        assert_eq!(summary.avg_hours, 0.0);
    }

    #[test]
    fn rank_totals_orders_by_minutes_desc() {
        let records = vec![
            record("a@x", "2026-03-02", 4, 0),
            record("b@x", "2026-03-02", 8, 0),
            record("a@x", "2026-03-03", 3, 0),
            open_record("c@x", "2026-03-02"),
        ];
        let ranked = rank_totals(&records);

        assert_eq!(ranked.len(), 2); // open day never ranks
        assert_eq!(ranked[0].email, "b@x");
        assert_eq!(ranked[0].total_minutes, 480);
        assert_eq!(ranked[0].work_days, 1);
        assert_eq!(ranked[1].email, "a@x");
        assert_eq!(ranked[1].total_minutes, 420);
        assert_eq!(ranked[1].work_days, 2);
    }

    #[test]
    fn rank_totals_breaks_ties_on_email() {
        let records = vec![
            record("b@x", "2026-03-02", 8, 0),
            record("a@x", "2026-03-02", 8, 0),
        ];
        let ranked = rank_totals(&records);
        assert_eq!(ranked[0].email, "a@x");
        assert_eq!(ranked[1].email, "b@x");
    }
}
