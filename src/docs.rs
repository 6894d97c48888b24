use crate::api::attendance::{
    PunchResponse, RecordListResponse, RecordRow, TodayStatusResponse, UpdateRecordReq,
};
use crate::api::batch::{BatchListResponse, BatchRow, ToggleReq, ToggleResponse};
use crate::api::reports::{MonthlySummary, RankingRow, UserReportResponse};
use crate::api::users::{CreateProfile, ImportResponse, ProfileListResponse, SkippedRow};
use crate::clock::batch::{ActionKind, CachedAction, EffectiveState, StagedPunch};
use crate::clock::reconcile::NextAction;
use crate::model::profile::Profile;
use crate::model::record::AttendanceRecord;
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Timeclock API",
        version = "1.0.0",
        description = r#"
## Attendance Clock Service

This API powers a **clock-in/clock-out** attendance system for a shared
workspace: a keypad/scan flow for single punches, an offline-first batch
page for operators, a user directory, and reporting.

### 🔹 Key Features
- **Punch Flow**
  - Scan a user, get the one legal action (check-in, check-out, done),
    confirm and write it idempotently
- **Batch Clocking**
  - Stage check-ins/check-outs for many users, then commit them in a
    single all-or-nothing batch
- **Directory**
  - Manage profiles, look them up by class/seat, bulk-import from CSV
- **Reports**
  - Monthly per-user worked-hours series and total-hours rankings

### 🔐 Security
Most endpoints are protected using **JWT Bearer authentication**.
Recording punches requires the **Clocker** role; directory and record
edits require **Admin**.

### 📦 Response Format
- JSON-based RESTful responses
- Attendance documents keep the wire schema: `checkIn`, `checkOut`,
  `date`, `deductionMinutes`, `notes`, recorder uid fields

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::attendance::today_status,
        crate::api::attendance::punch,
        crate::api::attendance::update_record,
        crate::api::attendance::delete_record,
        crate::api::attendance::list_records,

        crate::api::batch::list_batch,
        crate::api::batch::toggle_action,
        crate::api::batch::sync_batch,
        crate::api::batch::clear_batch,

        crate::api::users::lookup,
        crate::api::users::list_profiles,
        crate::api::users::create_profile,
        crate::api::users::update_profile,
        crate::api::users::delete_profile,
        crate::api::users::import_profiles,

        crate::api::reports::user_report,
        crate::api::reports::rankings
    ),
    components(
        schemas(
            Profile,
            AttendanceRecord,
            NextAction,
            ActionKind,
            StagedPunch,
            CachedAction,
            EffectiveState,
            TodayStatusResponse,
            PunchResponse,
            UpdateRecordReq,
            RecordRow,
            RecordListResponse,
            BatchRow,
            BatchListResponse,
            ToggleReq,
            ToggleResponse,
            CreateProfile,
            ProfileListResponse,
            SkippedRow,
            ImportResponse,
            MonthlySummary,
            UserReportResponse,
            RankingRow
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Attendance", description = "Punch flow and record management APIs"),
        (name = "Batch", description = "Batch clocking APIs"),
        (name = "Users", description = "Directory management APIs"),
        (name = "Reports", description = "Reporting APIs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
