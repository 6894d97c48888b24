use crate::auth::auth::AuthUser;
use crate::clock::batch::{ActionKind, BatchCache, CachedAction, EffectiveState, Toggled};
use crate::clock::guard::SYNC_FLIGHTS;
use crate::clock::kv::KvStore;
use crate::clock::snapshot::DirectorySnapshot;
use crate::model::profile::Profile;
use crate::utils::time;
use actix_web::{HttpResponse, Responder, web};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use utoipa::ToSchema;

/// Today's server truth: who is on the clock, who already closed their day.
/// The two standing queries behind `PendingSet`/`CompletedTodaySet`.
pub async fn load_snapshot(pool: &MySqlPool, date: &str) -> sqlx::Result<DirectorySnapshot> {
    let pending: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT user_email FROM attendance_records
        WHERE date = ? AND check_in IS NOT NULL AND check_out IS NULL
        "#,
    )
    .bind(date)
    .fetch_all(pool)
    .await?;

    let completed: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT user_email FROM attendance_records
        WHERE date = ? AND check_out IS NOT NULL
        "#,
    )
    .bind(date)
    .fetch_all(pool)
    .await?;

    Ok(DirectorySnapshot::new(pending, completed))
}

fn store_error(err: sqlx::Error, what: &str) -> actix_web::Error {
    tracing::error!(error = %err, "{} failed", what);
    actix_web::error::ErrorInternalServerError("Internal Server Error")
}

fn cache_error(err: anyhow::Error, what: &str) -> actix_web::Error {
    tracing::error!(error = %err, "{} failed", what);
    actix_web::error::ErrorInternalServerError("Batch cache unavailable")
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchRow {
    pub user: Profile,
    pub state: EffectiveState,
    #[schema(nullable = true)]
    pub staged: Option<CachedAction>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchListResponse {
    pub data: Vec<BatchRow>,
    pub staged_count: usize,
}

/// The batch page: every directory profile with its merged server+local
/// state. Rows with `pendingSync` carry intentions the server has not seen.
#[utoipa::path(
    get,
    path = "/api/v1/batch",
    responses(
        (status = 200, description = "Merged batch view", body = BatchListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Batch"
)]
pub async fn list_batch(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    kv: web::Data<dyn KvStore>,
) -> actix_web::Result<impl Responder> {
    auth.require_clocker()?;

    let today = time::today_string();
    let snapshot = load_snapshot(pool.get_ref(), &today)
        .await
        .map_err(|e| store_error(e, "Snapshot load"))?;

    let cache = BatchCache::load(kv.get_ref(), &auth.username)
        .map_err(|e| cache_error(e, "Batch cache load"))?;

    let profiles = sqlx::query_as::<_, Profile>(
        r#"
        SELECT id, name, class_id, seat_no, email, student_id
        FROM profiles
        ORDER BY class_id, seat_no
        "#,
    )
    .fetch_all(pool.get_ref())
    .await
    .map_err(|e| store_error(e, "Directory list"))?;

    let staged_count = cache.len();
    let data = profiles
        .into_iter()
        .map(|user| BatchRow {
            state: cache.effective_state(&user.email, &snapshot),
            staged: cache.get(&user.email).cloned(),
            user,
        })
        .collect();

    Ok(HttpResponse::Ok().json(BatchListResponse { data, staged_count }))
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToggleReq {
    #[schema(example = "bob@example.com")]
    pub email: String,
    pub kind: ActionKind,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToggleResponse {
    pub staged: bool,
    /// An un-staged check-in also dropped the staged check-out
    pub cascaded: bool,
    pub state: EffectiveState,
    pub staged_count: usize,
}

/// Stage or un-stage one intention for one user. Staging against the
/// effective state (already checked in, nothing to check out of) is a 409.
#[utoipa::path(
    post,
    path = "/api/v1/batch/toggle",
    request_body = ToggleReq,
    responses(
        (status = 200, description = "Toggle applied to the local cache", body = ToggleResponse),
        (status = 404, description = "Unknown user"),
        (status = 409, description = "Illegal staging for the current effective state"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Batch"
)]
pub async fn toggle_action(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    kv: web::Data<dyn KvStore>,
    body: web::Json<ToggleReq>,
) -> actix_web::Result<impl Responder> {
    auth.require_clocker()?;

    let email = body.email.to_lowercase();
    let today = time::today_string();

    let Some(profile) = super::attendance::fetch_profile(pool.get_ref(), &email)
        .await
        .map_err(|e| store_error(e, "Profile lookup"))?
    else {
        return Ok(HttpResponse::NotFound().json(json!({ "message": "User not found" })));
    };

    let snapshot = load_snapshot(pool.get_ref(), &today)
        .await
        .map_err(|e| store_error(e, "Snapshot load"))?;

    let mut cache = BatchCache::load(kv.get_ref(), &auth.username)
        .map_err(|e| cache_error(e, "Batch cache load"))?;

    let toggled = match cache.toggle(&email, body.kind, Utc::now(), &profile.name, &snapshot) {
        Ok(t) => t,
        Err(e) => {
            return Ok(HttpResponse::Conflict().json(json!({ "message": e.to_string() })));
        }
    };

    cache
        .persist(kv.get_ref(), &auth.username)
        .map_err(|e| cache_error(e, "Batch cache persist"))?;

    let (staged, cascaded) = match toggled {
        Toggled::Staged => (true, false),
        Toggled::Unstaged { cascaded } => (false, cascaded),
    };

    Ok(HttpResponse::Ok().json(ToggleResponse {
        staged,
        cascaded,
        state: cache.effective_state(&email, &snapshot),
        staged_count: cache.len(),
    }))
}

/// Commit every staged intention in one transaction: all users' records
/// update or none do. On failure the cache is left untouched for retry.
#[utoipa::path(
    post,
    path = "/api/v1/batch/sync",
    responses(
        (status = 200, description = "Batch committed (or nothing to commit)"),
        (status = 202, description = "A sync is already running for this operator; ignored"),
        (status = 409, description = "A staged check-out had no check-in on the server; nothing applied"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Store failure; nothing applied, cache preserved")
    ),
    security(("bearer_auth" = [])),
    tag = "Batch"
)]
pub async fn sync_batch(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    kv: web::Data<dyn KvStore>,
) -> actix_web::Result<impl Responder> {
    auth.require_clocker()?;

    let Some(_permit) = SYNC_FLIGHTS.try_begin(&auth.username) else {
        return Ok(HttpResponse::Accepted().json(json!({
            "message": "Sync already in progress",
            "applied": false
        })));
    };

    let mut cache = BatchCache::load(kv.get_ref(), &auth.username)
        .map_err(|e| cache_error(e, "Batch cache load"))?;

    if cache.is_empty() {
        return Ok(HttpResponse::Ok().json(json!({
            "message": "Nothing to sync",
            "synced": 0
        })));
    }

    let today = time::today_string();
    let plan = cache.commit_plan(&today, auth.recorder_uid());

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| store_error(e, "Batch begin"))?;

    for write in &plan {
        if write.check_in.is_some() {
            // Staged check-in (possibly paired with a check-out). A lone
            // check-in explicitly nulls the check-out columns so the fresh
            // day cannot inherit a stale one.
            sqlx::query(
                r#"
                INSERT INTO attendance_records
                    (user_email, date, check_in, check_in_recorder_uid,
                     check_out, check_out_recorder_uid, deduction_minutes)
                VALUES (?, ?, ?, ?, ?, ?, 0)
                ON DUPLICATE KEY UPDATE
                    check_in = VALUES(check_in),
                    check_in_recorder_uid = VALUES(check_in_recorder_uid),
                    check_out = VALUES(check_out),
                    check_out_recorder_uid = VALUES(check_out_recorder_uid)
                "#,
            )
            .bind(&write.user_email)
            .bind(&write.date)
            .bind(write.check_in)
            .bind(&write.recorder_uid)
            .bind(write.check_out)
            .bind(write.check_out.map(|_| write.recorder_uid.clone()))
            .execute(&mut *tx)
            .await
            .map_err(|e| store_error(e, "Batch check-in write"))?;
        } else {
            // Check-out alone: requires the server-side check-in to still
            // exist; otherwise the whole batch rolls back.
            let result = sqlx::query(
                r#"
                UPDATE attendance_records
                SET check_out = ?, check_out_recorder_uid = ?
                WHERE user_email = ? AND date = ? AND check_in IS NOT NULL
                "#,
            )
            .bind(write.check_out)
            .bind(&write.recorder_uid)
            .bind(&write.user_email)
            .bind(&write.date)
            .execute(&mut *tx)
            .await
            .map_err(|e| store_error(e, "Batch check-out write"))?;

            if result.rows_affected() == 0 {
                tx.rollback()
                    .await
                    .map_err(|e| store_error(e, "Batch rollback"))?;
                return Ok(HttpResponse::Conflict().json(json!({
                    "message": "No active check-in found for today",
                    "user": write.user_email,
                })));
            }
        }
    }

    tx.commit().await.map_err(|e| store_error(e, "Batch commit"))?;

    // Only after the store acknowledged the batch does the cache clear.
    let synced = plan.len();
    cache.clear();
    cache
        .persist(kv.get_ref(), &auth.username)
        .map_err(|e| cache_error(e, "Batch cache clear"))?;

    tracing::info!(operator = %auth.username, synced, "Batch synchronized");

    Ok(HttpResponse::Ok().json(json!({
        "message": format!("Synchronized {synced} users"),
        "synced": synced
    })))
}

#[derive(Deserialize)]
pub struct ConfirmQuery {
    pub confirm: Option<bool>,
}

/// Discard every staged intention without contacting the record store.
/// Destructive; requires `?confirm=true`.
#[utoipa::path(
    delete,
    path = "/api/v1/batch",
    params(("confirm", Query, description = "Must be true")),
    responses(
        (status = 200, description = "Cache cleared"),
        (status = 400, description = "Missing confirmation"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Batch"
)]
pub async fn clear_batch(
    auth: AuthUser,
    kv: web::Data<dyn KvStore>,
    query: web::Query<ConfirmQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_clocker()?;

    if query.confirm != Some(true) {
        return Ok(HttpResponse::BadRequest().json(json!({
            "message": "Clearing the cache requires confirm=true"
        })));
    }

    let mut cache = BatchCache::load(kv.get_ref(), &auth.username)
        .map_err(|e| cache_error(e, "Batch cache load"))?;
    let cleared = cache.len();

    cache.clear();
    cache
        .persist(kv.get_ref(), &auth.username)
        .map_err(|e| cache_error(e, "Batch cache clear"))?;

    Ok(HttpResponse::Ok().json(json!({
        "message": format!("Discarded {cleared} staged users"),
        "cleared": cleared
    })))
}
