pub mod attendance;
pub mod batch;
pub mod reports;
pub mod users;

use crate::auth::auth::AuthUser;
use sqlx::MySqlPool;

/// Whether the account is linked to the profile owning `email`. Used for
/// self-service reads by non-admin roles.
pub async fn owns_email(
    auth: &AuthUser,
    email: &str,
    pool: &MySqlPool,
) -> actix_web::Result<bool> {
    let Some(profile_id) = auth.profile_id else {
        return Ok(false);
    };

    let owned: Option<String> = sqlx::query_scalar("SELECT email FROM profiles WHERE id = ?")
        .bind(profile_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, profile_id, "Profile ownership lookup failed");
            actix_web::error::ErrorInternalServerError("Internal Server Error")
        })?;

    Ok(owned.is_some_and(|e| e.eq_ignore_ascii_case(email)))
}
