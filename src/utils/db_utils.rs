use actix_web::error::ErrorBadRequest;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::MySqlPool;

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug)]
pub enum SqlValue {
    String(String),
    I64(i64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Null,
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// ===============================
/// Build dynamic UPDATE SQL
/// ===============================
/// `allowed` maps the JSON payload key (camelCase, as the clients send it)
/// to the backing column. Unknown keys are rejected rather than passed
/// through to SQL.
pub fn build_update_sql(
    table: &str,
    payload: &Value,
    allowed: &[(&str, &str)],
    id_column: &str,
    id_value: u64,
) -> Result<SqlUpdate, actix_web::Error> {
    let obj = payload
        .as_object()
        .ok_or_else(|| ErrorBadRequest("Payload must be a JSON object"))?;

    if obj.is_empty() {
        return Err(ErrorBadRequest("No fields provided for update"));
    }

    let mut columns = Vec::with_capacity(obj.len());
    let mut values = Vec::with_capacity(obj.len() + 1);

    for (key, value) in obj {
        let column = allowed
            .iter()
            .find(|(json_key, _)| json_key == key)
            .map(|(_, column)| *column)
            .ok_or_else(|| ErrorBadRequest(format!("Unknown field: {}", key)))?;
        columns.push(format!("{} = ?", column));

        match value {
            Value::String(s) => {
                if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                    values.push(SqlValue::Date(d));
                } else if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                    values.push(SqlValue::DateTime(dt.with_timezone(&Utc)));
                } else {
                    values.push(SqlValue::String(s.clone()));
                }
            }
            Value::Number(n) => {
                let i = n
                    .as_i64()
                    .ok_or_else(|| ErrorBadRequest("Unsupported numeric value"))?;
                values.push(SqlValue::I64(i));
            }
            Value::Bool(b) => values.push(SqlValue::Bool(*b)),
            Value::Null => values.push(SqlValue::Null),
            _ => return Err(ErrorBadRequest("Unsupported JSON value type")),
        }
    }

    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?",
        table,
        columns.join(", "),
        id_column
    );
    values.push(SqlValue::I64(id_value as i64));

    Ok(SqlUpdate { sql, values })
}

/// ===============================
/// Execute the update
/// ===============================
pub async fn execute_update(pool: &MySqlPool, update: SqlUpdate) -> Result<u64, sqlx::Error> {
    let mut query = sqlx::query(&update.sql);

    for value in update.values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::DateTime(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }

    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ALLOWED: &[(&str, &str)] = &[
        ("name", "name"),
        ("classId", "class_id"),
        ("seatNo", "seat_no"),
    ];

    #[test]
    fn maps_payload_keys_to_columns() {
        let update =
            build_update_sql("profiles", &json!({"classId": "102"}), ALLOWED, "id", 7).unwrap();
        assert_eq!(update.sql, "UPDATE profiles SET class_id = ? WHERE id = ?");
        assert_eq!(update.values.len(), 2);
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(build_update_sql("profiles", &json!({"role": 4}), ALLOWED, "id", 7).is_err());
    }

    #[test]
    fn rejects_empty_payloads() {
        assert!(build_update_sql("profiles", &json!({}), ALLOWED, "id", 7).is_err());
    }
}
