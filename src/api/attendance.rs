use crate::auth::auth::AuthUser;
use crate::clock::guard::PUNCH_FLIGHTS;
use crate::clock::reconcile::{self, NextAction};
use crate::clock::ClockError;
use crate::model::profile::Profile;
use crate::model::record::AttendanceRecord;
use crate::utils::time;
use actix_web::{HttpResponse, Responder, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use utoipa::ToSchema;

const RECORD_COLUMNS: &str = r#"
    user_email, date, check_in, check_out,
    check_in_recorder_uid, check_out_recorder_uid,
    deduction_minutes, notes
"#;

pub async fn fetch_record(
    pool: &MySqlPool,
    email: &str,
    date: &str,
) -> sqlx::Result<Option<AttendanceRecord>> {
    sqlx::query_as::<_, AttendanceRecord>(&format!(
        "SELECT {RECORD_COLUMNS} FROM attendance_records WHERE user_email = ? AND date = ?"
    ))
    .bind(email)
    .bind(date)
    .fetch_optional(pool)
    .await
}

pub async fn fetch_profile(pool: &MySqlPool, email: &str) -> sqlx::Result<Option<Profile>> {
    if let Some(profile) = crate::utils::directory_cache::get(email).await {
        return Ok(Some(profile));
    }

    let profile = sqlx::query_as::<_, Profile>(
        "SELECT id, name, class_id, seat_no, email, student_id FROM profiles WHERE email = ?",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    if let Some(p) = &profile {
        crate::utils::directory_cache::remember(p.clone()).await;
    }
    Ok(profile)
}

fn conflict(err: ClockError) -> HttpResponse {
    HttpResponse::Conflict().json(json!({ "message": err.to_string() }))
}

fn store_error(err: sqlx::Error, email: &str, what: &str) -> actix_web::Error {
    tracing::error!(error = %err, email, "{} failed", what);
    actix_web::error::ErrorInternalServerError("Internal Server Error")
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TodayStatusResponse {
    pub user: Profile,
    #[schema(nullable = true)]
    pub record: Option<AttendanceRecord>,
    pub next_action: NextAction,
}

/// Scan step: today's record for one user plus the decided fast-path action,
/// so the client can render the right confirmation.
#[utoipa::path(
    get,
    path = "/api/v1/attendance/{email}/today",
    params(("email", Path, description = "User email")),
    responses(
        (status = 200, description = "Today's state for the user", body = TodayStatusResponse),
        (status = 404, description = "Unknown user"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn today_status(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> actix_web::Result<impl Responder> {
    auth.require_clocker()?;

    let email = path.into_inner().to_lowercase();
    let today = time::today_string();

    let Some(user) = fetch_profile(pool.get_ref(), &email)
        .await
        .map_err(|e| store_error(e, &email, "Profile lookup"))?
    else {
        return Ok(HttpResponse::NotFound().json(json!({ "message": "User not found" })));
    };

    let record = fetch_record(pool.get_ref(), &email, &today)
        .await
        .map_err(|e| store_error(e, &email, "Record lookup"))?;

    let next_action = reconcile::decide(record.as_ref());

    Ok(HttpResponse::Ok().json(TodayStatusResponse {
        user,
        record,
        next_action,
    }))
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PunchResponse {
    pub action: NextAction,
    pub record: AttendanceRecord,
}

/// Confirm step of the scan flow: re-decides against the live record and
/// applies the one legal write. A punch already in flight for the same
/// `(user, day)` is acknowledged with 202 and performs nothing.
#[utoipa::path(
    post,
    path = "/api/v1/attendance/{email}/punch",
    params(("email", Path, description = "User email")),
    responses(
        (status = 200, description = "Punch applied", body = PunchResponse),
        (status = 202, description = "An identical punch is already in flight; ignored"),
        (status = 404, description = "Unknown user"),
        (status = 409, description = "Illegal transition (already complete, no check-in)"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn punch(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> actix_web::Result<impl Responder> {
    auth.require_clocker()?;

    let email = path.into_inner().to_lowercase();
    let today = time::today_string();

    // Re-entrant scans are no-ops, not errors. The permit releases on drop,
    // so a store failure below cannot wedge the key.
    let flight_key = format!("{email}:{today}");
    let Some(_permit) = PUNCH_FLIGHTS.try_begin(&flight_key) else {
        return Ok(HttpResponse::Accepted().json(json!({
            "message": "Punch already in progress",
            "applied": false
        })));
    };

    if fetch_profile(pool.get_ref(), &email)
        .await
        .map_err(|e| store_error(e, &email, "Profile lookup"))?
        .is_none()
    {
        return Ok(HttpResponse::NotFound().json(json!({ "message": "User not found" })));
    }

    let record = fetch_record(pool.get_ref(), &email, &today)
        .await
        .map_err(|e| store_error(e, &email, "Record lookup"))?;

    let now = Utc::now();
    let action = reconcile::decide(record.as_ref());

    match action {
        NextAction::CheckIn => {
            if let Err(e) = reconcile::ensure_can_check_in(record.as_ref()) {
                return Ok(conflict(e));
            }
            // Merge-write: only the check-in columns are touched, and only
            // when still unset, so a lost race cannot clobber anything.
            sqlx::query(
                r#"
                INSERT INTO attendance_records
                    (user_email, date, check_in, check_in_recorder_uid, deduction_minutes)
                VALUES (?, ?, ?, ?, 0)
                ON DUPLICATE KEY UPDATE
                    check_in = COALESCE(check_in, VALUES(check_in)),
                    check_in_recorder_uid = COALESCE(check_in_recorder_uid, VALUES(check_in_recorder_uid))
                "#,
            )
            .bind(&email)
            .bind(&today)
            .bind(now)
            .bind(auth.recorder_uid())
            .execute(pool.get_ref())
            .await
            .map_err(|e| store_error(e, &email, "Check-in"))?;
        }
        NextAction::CheckOut => {
            if let Err(e) = reconcile::ensure_can_check_out(record.as_ref()) {
                return Ok(conflict(e));
            }
            let result = sqlx::query(
                r#"
                UPDATE attendance_records
                SET check_out = ?, check_out_recorder_uid = ?
                WHERE user_email = ?
                AND date = ?
                AND check_in IS NOT NULL
                AND check_out IS NULL
                "#,
            )
            .bind(now)
            .bind(auth.recorder_uid())
            .bind(&email)
            .bind(&today)
            .execute(pool.get_ref())
            .await
            .map_err(|e| store_error(e, &email, "Check-out"))?;

            // Zero rows means the record changed under us; never silent.
            if result.rows_affected() == 0 {
                return Ok(conflict(ClockError::AlreadyComplete));
            }
        }
        NextAction::AlreadyComplete => {
            return Ok(HttpResponse::Conflict().json(json!({
                "message": ClockError::AlreadyComplete.to_string(),
                "record": record,
            })));
        }
    }

    let record = fetch_record(pool.get_ref(), &email, &today)
        .await
        .map_err(|e| store_error(e, &email, "Record refetch"))?
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("Record vanished after write"))?;

    tracing::info!(%email, %action, recorder = auth.recorder_uid(), "Punch applied");

    Ok(HttpResponse::Ok().json(PunchResponse { action, record }))
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecordReq {
    /// Wall-clock `HH:MM` on the record's day
    #[schema(example = "08:05", nullable = true)]
    pub check_in: Option<String>,
    #[schema(example = "17:30", nullable = true)]
    pub check_out: Option<String>,
    #[schema(example = 30, nullable = true)]
    pub deduction_minutes: Option<u32>,
    #[schema(nullable = true)]
    pub notes: Option<String>,
}

enum EditValue {
    Instant(DateTime<Utc>),
    Minutes(u32),
    Text(String),
    Recorder(String),
}

/// Explicit edit path: makeup punches and deduction/notes edits, including
/// retroactively for past dates. Times are strict `HH:MM`; a malformed time
/// rejects the whole request before any write.
#[utoipa::path(
    put,
    path = "/api/v1/attendance/{email}/{date}",
    params(
        ("email", Path, description = "User email"),
        ("date", Path, description = "Calendar day, YYYY-MM-DD")
    ),
    request_body = UpdateRecordReq,
    responses(
        (status = 200, description = "Record updated", body = AttendanceRecord),
        (status = 400, description = "Malformed date or time"),
        (status = 404, description = "No record to edit and no check-in supplied"),
        (status = 409, description = "Edit would leave a check-out without a check-in"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn update_record(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<(String, String)>,
    body: web::Json<UpdateRecordReq>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let (email, date) = path.into_inner();
    let email = email.to_lowercase();

    let Some(day) = time::parse_day(&date) else {
        return Ok(HttpResponse::BadRequest().json(json!({
            "message": "Invalid date, expected YYYY-MM-DD"
        })));
    };

    // Validate every supplied field before touching the store.
    let parse_edit_time = |raw: &Option<String>| -> Result<Option<DateTime<Utc>>, HttpResponse> {
        match raw {
            None => Ok(None),
            Some(s) => {
                let Some(hhmm) = time::parse_hhmm(s) else {
                    return Err(HttpResponse::BadRequest().json(json!({
                        "message": "Invalid time format, expected HH:MM"
                    })));
                };
                time::local_instant(day, hhmm).map(Some).ok_or_else(|| {
                    HttpResponse::BadRequest().json(json!({
                        "message": "Time does not exist on that day"
                    }))
                })
            }
        }
    };

    let new_check_in = match parse_edit_time(&body.check_in) {
        Ok(v) => v,
        Err(resp) => return Ok(resp),
    };
    let new_check_out = match parse_edit_time(&body.check_out) {
        Ok(v) => v,
        Err(resp) => return Ok(resp),
    };

    if new_check_in.is_none()
        && new_check_out.is_none()
        && body.deduction_minutes.is_none()
        && body.notes.is_none()
    {
        return Ok(HttpResponse::BadRequest().json(json!({
            "message": "No fields provided for update"
        })));
    }

    let existing = fetch_record(pool.get_ref(), &email, &date)
        .await
        .map_err(|e| store_error(e, &email, "Record lookup"))?;

    // The edit must not produce a check-out without a check-in.
    let has_check_in_after =
        new_check_in.is_some() || existing.as_ref().is_some_and(|r| r.check_in.is_some());
    let has_check_out_after =
        new_check_out.is_some() || existing.as_ref().is_some_and(|r| r.check_out.is_some());
    if has_check_out_after && !has_check_in_after {
        return Ok(conflict(ClockError::NotCheckedIn));
    }

    let recorder = auth.recorder_uid().to_string();

    match existing {
        None => {
            // Makeup punch for a day with no record yet.
            if new_check_in.is_none() {
                return Ok(HttpResponse::NotFound().json(json!({
                    "message": "No record for that date; supply checkIn to create one"
                })));
            }
            sqlx::query(
                r#"
                INSERT INTO attendance_records
                    (user_email, date, check_in, check_in_recorder_uid,
                     check_out, check_out_recorder_uid, deduction_minutes, notes)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&email)
            .bind(&date)
            .bind(new_check_in)
            .bind(&recorder)
            .bind(new_check_out)
            .bind(new_check_out.map(|_| recorder.clone()))
            .bind(body.deduction_minutes.unwrap_or(0))
            .bind(&body.notes)
            .execute(pool.get_ref())
            .await
            .map_err(|e| store_error(e, &email, "Record create"))?;
        }
        Some(_) => {
            // Column-targeted update: untouched fields keep whatever a
            // concurrent writer put there (field-level last-write-wins).
            let mut sets = Vec::new();
            let mut values: Vec<EditValue> = Vec::new();

            if let Some(t) = new_check_in {
                sets.push("check_in = ?");
                values.push(EditValue::Instant(t));
                sets.push("check_in_recorder_uid = ?");
                values.push(EditValue::Recorder(recorder.clone()));
            }
            if let Some(t) = new_check_out {
                sets.push("check_out = ?");
                values.push(EditValue::Instant(t));
                sets.push("check_out_recorder_uid = ?");
                values.push(EditValue::Recorder(recorder.clone()));
            }
            if let Some(m) = body.deduction_minutes {
                sets.push("deduction_minutes = ?");
                values.push(EditValue::Minutes(m));
            }
            if let Some(n) = &body.notes {
                sets.push("notes = ?");
                values.push(EditValue::Text(n.clone()));
            }

            let sql = format!(
                "UPDATE attendance_records SET {} WHERE user_email = ? AND date = ?",
                sets.join(", ")
            );
            let mut query = sqlx::query(&sql);
            for value in values {
                query = match value {
                    EditValue::Instant(v) => query.bind(v),
                    EditValue::Minutes(v) => query.bind(v),
                    EditValue::Text(v) => query.bind(v),
                    EditValue::Recorder(v) => query.bind(v),
                };
            }
            query
                .bind(&email)
                .bind(&date)
                .execute(pool.get_ref())
                .await
                .map_err(|e| store_error(e, &email, "Record update"))?;
        }
    }

    let record = fetch_record(pool.get_ref(), &email, &date)
        .await
        .map_err(|e| store_error(e, &email, "Record refetch"))?
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("Record vanished after write"))?;

    tracing::info!(%email, %date, recorder = auth.recorder_uid(), "Record edited");

    Ok(HttpResponse::Ok().json(record))
}

#[derive(Deserialize)]
pub struct ConfirmQuery {
    pub confirm: Option<bool>,
}

/// Destructive; requires `?confirm=true`.
#[utoipa::path(
    delete,
    path = "/api/v1/attendance/{email}/{date}",
    params(
        ("email", Path, description = "User email"),
        ("date", Path, description = "Calendar day, YYYY-MM-DD"),
        ("confirm", Query, description = "Must be true")
    ),
    responses(
        (status = 200, description = "Record deleted"),
        (status = 400, description = "Missing confirmation"),
        (status = 404, description = "No such record"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn delete_record(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<(String, String)>,
    query: web::Query<ConfirmQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    if query.confirm != Some(true) {
        return Ok(HttpResponse::BadRequest().json(json!({
            "message": "Deletion requires confirm=true"
        })));
    }

    let (email, date) = path.into_inner();
    let email = email.to_lowercase();

    let result = sqlx::query("DELETE FROM attendance_records WHERE user_email = ? AND date = ?")
        .bind(&email)
        .bind(&date)
        .execute(pool.get_ref())
        .await
        .map_err(|e| store_error(e, &email, "Record delete"))?;

    if result.rows_affected() == 0 {
        return Ok(HttpResponse::NotFound().json(json!({ "message": "Record not found" })));
    }

    tracing::info!(%email, %date, recorder = auth.recorder_uid(), "Record deleted");

    Ok(HttpResponse::Ok().json(json!({ "message": "Record deleted" })))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecordQuery {
    /// Inclusive lower day bound, YYYY-MM-DD
    pub from: Option<String>,
    /// Inclusive upper day bound, YYYY-MM-DD
    pub to: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordRow {
    #[serde(flatten)]
    pub record: AttendanceRecord,
    /// Net of deductions; absent until the day is complete
    #[schema(nullable = true)]
    pub worked_minutes: Option<i64>,
}

#[derive(Serialize, ToSchema)]
pub struct RecordListResponse {
    pub data: Vec<RecordRow>,
}

/// Personal history, newest first. Admins may read anyone; other roles only
/// the profile their account is linked to.
#[utoipa::path(
    get,
    path = "/api/v1/attendance/{email}",
    params(
        ("email", Path, description = "User email"),
        ("from", Query, description = "Inclusive lower day bound"),
        ("to", Query, description = "Inclusive upper day bound")
    ),
    responses(
        (status = 200, description = "Attendance history", body = RecordListResponse),
        (status = 400, description = "Malformed day bound"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn list_records(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
    query: web::Query<RecordQuery>,
) -> actix_web::Result<impl Responder> {
    let email = path.into_inner().to_lowercase();

    if !auth.role.is_admin() && !super::owns_email(&auth, &email, pool.get_ref()).await? {
        return Err(actix_web::error::ErrorForbidden("Not your records"));
    }

    for bound in [&query.from, &query.to].into_iter().flatten() {
        if time::parse_day(bound).is_none() {
            return Ok(HttpResponse::BadRequest().json(json!({
                "message": "Invalid day bound, expected YYYY-MM-DD"
            })));
        }
    }

    let mut sql = format!(
        "SELECT {RECORD_COLUMNS} FROM attendance_records WHERE user_email = ?"
    );
    if query.from.is_some() {
        sql.push_str(" AND date >= ?");
    }
    if query.to.is_some() {
        sql.push_str(" AND date <= ?");
    }
    sql.push_str(" ORDER BY date DESC");

    let mut q = sqlx::query_as::<_, AttendanceRecord>(&sql).bind(&email);
    if let Some(from) = &query.from {
        q = q.bind(from);
    }
    if let Some(to) = &query.to {
        q = q.bind(to);
    }

    let records = q
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| store_error(e, &email, "Record list"))?;

    let data = records
        .into_iter()
        .map(|record| RecordRow {
            worked_minutes: record.worked_minutes(),
            record,
        })
        .collect();

    Ok(HttpResponse::Ok().json(RecordListResponse { data }))
}
