use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Directory entry for a clockable person. Profiles exist independently of
/// login accounts; the keypad flow addresses them by `(class_id, seat_no)`
/// and attendance records by `email`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(
    example = json!({
        "id": 1,
        "name": "Alice Lin",
        "classId": "101",
        "seatNo": "01",
        "email": "alice@example.com",
        "studentId": "S110101"
    })
)]
pub struct Profile {
    #[schema(example = 1)]
    pub id: u64,

    #[schema(example = "Alice Lin")]
    pub name: String,

    #[schema(example = "101")]
    pub class_id: String,

    #[schema(example = "01")]
    pub seat_no: String,

    #[schema(example = "alice@example.com")]
    pub email: String,

    #[schema(example = "S110101")]
    pub student_id: String,
}
