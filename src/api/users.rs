use crate::auth::auth::AuthUser;
use crate::model::profile::Profile;
use crate::utils::db_utils::{build_update_sql, execute_update};
use crate::utils::{directory_cache, email_filter};
use actix_web::{HttpResponse, Responder, error::ErrorInternalServerError, web};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, error};
use utoipa::ToSchema;

/// Payload keys accepted by the profile update endpoint, mapped to columns.
const PROFILE_FIELDS: &[(&str, &str)] = &[
    ("name", "name"),
    ("classId", "class_id"),
    ("seatNo", "seat_no"),
    ("email", "email"),
    ("studentId", "student_id"),
];

/// true => some profile already uses this email.
/// Three tiers: the cuckoo filter gives a definitive negative, the
/// directory cache a fast positive, the database settles the rest.
pub async fn is_email_registered(email: &str, pool: &MySqlPool) -> bool {
    let email = email.to_lowercase();

    if !email_filter::might_exist(&email) {
        return false;
    }

    if directory_cache::get(&email).await.is_some() {
        return true;
    }

    sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM profiles WHERE email = ? LIMIT 1)")
        .bind(&email)
        .fetch_one(pool)
        .await
        .unwrap_or(true) // fail-safe
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LookupQuery {
    #[schema(example = "101")]
    pub class_id: String,
    #[schema(example = "01")]
    pub seat_no: String,
}

/// Keypad flow: resolve a class/seat pair to a directory profile.
#[utoipa::path(
    get,
    path = "/api/v1/users/lookup",
    params(
        ("classId", Query, description = "Class identifier"),
        ("seatNo", Query, description = "Seat number")
    ),
    responses(
        (status = 200, description = "Profile found", body = Profile),
        (status = 404, description = "No profile for that class/seat"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn lookup(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LookupQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_clocker()?;

    let profile = sqlx::query_as::<_, Profile>(
        r#"
        SELECT id, name, class_id, seat_no, email, student_id
        FROM profiles
        WHERE class_id = ? AND seat_no = ?
        "#,
    )
    .bind(query.class_id.trim())
    .bind(query.seat_no.trim())
    .fetch_optional(pool.get_ref())
    .await
    .map_err(|e| {
        error!(error = %e, class_id = %query.class_id, "Profile lookup failed");
        ErrorInternalServerError("Internal Server Error")
    })?;

    match profile {
        Some(p) => {
            directory_cache::remember(p.clone()).await;
            Ok(HttpResponse::Ok().json(p))
        }
        None => Ok(HttpResponse::NotFound().json(json!({ "message": "User not found" }))),
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProfileQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ProfileListResponse {
    pub data: Vec<Profile>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 42)]
    pub total: i64,
}

/// Paginated directory, ordered the way the batch page sorts: class then
/// seat. `search` matches name, class/seat, email and student id.
#[utoipa::path(
    get,
    path = "/api/v1/users",
    params(
        ("page", Query, description = "Page number"),
        ("per_page", Query, description = "Items per page"),
        ("search", Query, description = "Search by name, class/seat, email or student id")
    ),
    responses(
        (status = 200, description = "Paginated directory", body = ProfileListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn list_profiles(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ProfileQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_clocker()?;

    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1) * per_page;

    // ---------- build WHERE clause dynamically ----------
    let mut where_clause = String::new();
    let mut like = None;

    if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
        where_clause = "WHERE (name LIKE ? OR email LIKE ? OR student_id LIKE ? \
                        OR CONCAT(class_id, seat_no) LIKE ?)"
            .to_string();
        like = Some(format!("%{}%", search.trim()));
    }

    // ---------- total count ----------
    let count_sql = format!("SELECT COUNT(*) FROM profiles {}", where_clause);
    debug!(sql = %count_sql, "Counting profiles");

    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(like) = &like {
        for _ in 0..4 {
            count_query = count_query.bind(like.clone());
        }
    }

    let total = count_query.fetch_one(pool.get_ref()).await.map_err(|e| {
        error!(error = %e, "Failed to count profiles");
        ErrorInternalServerError("Database error")
    })?;

    // ---------- data query ----------
    let data_sql = format!(
        "SELECT id, name, class_id, seat_no, email, student_id FROM profiles {} \
         ORDER BY class_id, seat_no LIMIT ? OFFSET ?",
        where_clause
    );
    debug!(sql = %data_sql, page, per_page, "Fetching profiles");

    let mut data_query = sqlx::query_as::<_, Profile>(&data_sql);
    if let Some(like) = &like {
        for _ in 0..4 {
            data_query = data_query.bind(like.clone());
        }
    }
    data_query = data_query.bind(per_page as i64).bind(offset as i64);

    let profiles = data_query.fetch_all(pool.get_ref()).await.map_err(|e| {
        error!(error = %e, "Failed to fetch profiles");
        ErrorInternalServerError("Database error")
    })?;

    Ok(HttpResponse::Ok().json(ProfileListResponse {
        data: profiles,
        page,
        per_page,
        total,
    }))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateProfile {
    #[schema(example = "Alice Lin")]
    pub name: String,
    #[schema(example = "101")]
    pub class_id: String,
    #[schema(example = "01")]
    pub seat_no: String,
    #[schema(example = "alice@example.com", format = "email")]
    pub email: String,
    #[schema(example = "S110101")]
    pub student_id: String,
}

/// Create Profile
#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = CreateProfile,
    responses(
        (status = 201, description = "Profile created"),
        (status = 400, description = "Missing name or email"),
        (status = 409, description = "Email already registered"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn create_profile(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateProfile>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let name = payload.name.trim();
    let email = payload.email.trim().to_lowercase();

    if name.is_empty() || email.is_empty() || !email.contains('@') {
        return Ok(HttpResponse::BadRequest().json(json!({
            "message": "Name and a valid email are required"
        })));
    }

    if is_email_registered(&email, pool.get_ref()).await {
        return Ok(HttpResponse::Conflict().json(json!({
            "message": "Email already registered"
        })));
    }

    sqlx::query(
        r#"
        INSERT INTO profiles (name, class_id, seat_no, email, student_id)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(name)
    .bind(payload.class_id.trim())
    .bind(payload.seat_no.trim())
    .bind(&email)
    .bind(payload.student_id.trim())
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        error!(error = %e, %email, "Failed to create profile");
        ErrorInternalServerError("Internal Server Error")
    })?;

    email_filter::insert(&email);

    Ok(HttpResponse::Created().json(json!({
        "message": "Profile created"
    })))
}

/// Update Profile
#[utoipa::path(
    put,
    path = "/api/v1/users/{profile_id}",
    params(("profile_id", Path, description = "Profile ID")),
    request_body = Object,
    responses(
        (status = 200, description = "Profile updated"),
        (status = 400, description = "Unknown field in payload"),
        (status = 404, description = "Profile not found"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn update_profile(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let profile_id = path.into_inner();

    // Old email needed to keep the filter and cache truthful after a change.
    let old_email: Option<String> = sqlx::query_scalar("SELECT email FROM profiles WHERE id = ?")
        .bind(profile_id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(|e| {
            error!(error = %e, profile_id, "Failed to fetch profile");
            ErrorInternalServerError("Internal Server Error")
        })?;

    let Some(old_email) = old_email else {
        return Ok(HttpResponse::NotFound().json(json!({ "message": "Profile not found" })));
    };

    let update = build_update_sql("profiles", &body, PROFILE_FIELDS, "id", profile_id)?;

    execute_update(pool.get_ref(), update).await.map_err(|e| {
        error!(error = %e, profile_id, "Failed to update profile");
        ErrorInternalServerError("Internal Server Error")
    })?;

    directory_cache::forget(&old_email).await;
    if let Some(new_email) = body.get("email").and_then(Value::as_str) {
        if !new_email.eq_ignore_ascii_case(&old_email) {
            email_filter::remove(&old_email);
            email_filter::insert(new_email);
        }
    }

    Ok(HttpResponse::Ok().json(json!({ "message": "Profile updated" })))
}

/// Delete Profile. Destructive; requires `?confirm=true`.
#[utoipa::path(
    delete,
    path = "/api/v1/users/{profile_id}",
    params(
        ("profile_id", Path, description = "Profile ID"),
        ("confirm", Query, description = "Must be true")
    ),
    responses(
        (status = 200, description = "Profile deleted"),
        (status = 400, description = "Missing confirmation"),
        (status = 404, description = "Profile not found"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn delete_profile(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    query: web::Query<super::attendance::ConfirmQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    if query.confirm != Some(true) {
        return Ok(HttpResponse::BadRequest().json(json!({
            "message": "Deletion requires confirm=true"
        })));
    }

    let profile_id = path.into_inner();

    let email: Option<String> = sqlx::query_scalar("SELECT email FROM profiles WHERE id = ?")
        .bind(profile_id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(|e| {
            error!(error = %e, profile_id, "Failed to fetch profile");
            ErrorInternalServerError("Internal Server Error")
        })?;

    let Some(email) = email else {
        return Ok(HttpResponse::NotFound().json(json!({ "message": "Profile not found" })));
    };

    sqlx::query("DELETE FROM profiles WHERE id = ?")
        .bind(profile_id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| {
            error!(error = %e, profile_id, "Failed to delete profile");
            ErrorInternalServerError("Internal Server Error")
        })?;

    directory_cache::forget(&email).await;
    email_filter::remove(&email);

    Ok(HttpResponse::Ok().json(json!({ "message": "Profile deleted" })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportRow {
    name: String,
    class_id: String,
    seat_no: String,
    email: String,
    student_id: String,
}

#[derive(Serialize, ToSchema)]
pub struct SkippedRow {
    pub line: usize,
    pub reason: String,
}

#[derive(Serialize, ToSchema)]
pub struct ImportResponse {
    pub imported: usize,
    pub skipped: Vec<SkippedRow>,
}

/// Bulk directory import. Body is CSV with a header row:
/// `name,classId,seatNo,email,studentId`. Rows that fail validation or
/// collide with an existing email are reported and skipped; the accepted
/// rows land in one transaction.
#[utoipa::path(
    post,
    path = "/api/v1/users/import",
    request_body(content = String, content_type = "text/csv"),
    responses(
        (status = 200, description = "Import summary", body = ImportResponse),
        (status = 400, description = "Unreadable CSV"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn import_profiles(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    body: web::Bytes,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(body.as_ref());

    let mut accepted: Vec<ImportRow> = Vec::new();
    let mut skipped: Vec<SkippedRow> = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for (index, row) in reader.deserialize::<ImportRow>().enumerate() {
        let line = index + 2; // header is line 1
        let mut row = match row {
            Ok(r) => r,
            Err(e) => {
                skipped.push(SkippedRow {
                    line,
                    reason: format!("Unparseable row: {e}"),
                });
                continue;
            }
        };

        row.email = row.email.to_lowercase();

        if row.name.is_empty() || row.email.is_empty() || !row.email.contains('@') {
            skipped.push(SkippedRow {
                line,
                reason: "Name and a valid email are required".into(),
            });
            continue;
        }

        if !seen.insert(row.email.clone()) {
            skipped.push(SkippedRow {
                line,
                reason: "Duplicate email within the file".into(),
            });
            continue;
        }

        if is_email_registered(&row.email, pool.get_ref()).await {
            skipped.push(SkippedRow {
                line,
                reason: "Email already registered".into(),
            });
            continue;
        }

        accepted.push(row);
    }

    if !accepted.is_empty() {
        let mut tx = pool.begin().await.map_err(|e| {
            error!(error = %e, "Import begin failed");
            ErrorInternalServerError("Internal Server Error")
        })?;

        for row in &accepted {
            sqlx::query(
                r#"
                INSERT INTO profiles (name, class_id, seat_no, email, student_id)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.name)
            .bind(&row.class_id)
            .bind(&row.seat_no)
            .bind(&row.email)
            .bind(&row.student_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!(error = %e, email = %row.email, "Import insert failed");
                ErrorInternalServerError("Internal Server Error")
            })?;
        }

        tx.commit().await.map_err(|e| {
            error!(error = %e, "Import commit failed");
            ErrorInternalServerError("Internal Server Error")
        })?;

        for row in &accepted {
            email_filter::insert(&row.email);
        }
    }

    tracing::info!(
        imported = accepted.len(),
        skipped = skipped.len(),
        operator = %auth.username,
        "Directory import finished"
    );

    Ok(HttpResponse::Ok().json(ImportResponse {
        imported: accepted.len(),
        skipped,
    }))
}
