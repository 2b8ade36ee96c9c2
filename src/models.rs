use crate::error::{AppError, AppResult};
use crate::orm::{BoxFuture, Db, Migration, Model};
use crate::template::TemplateValue;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use std::collections::HashMap;
use std::sync::Arc;

const COLUMNS: &str = "id, city, country, confirmed, dead, recovered";

/// One city's case counts, a row of `corona_records`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CoronaRecord {
    pub id: i64,
    pub city: String,
    pub country: String,
    pub confirmed: i64,
    pub dead: i64,
    pub recovered: i64,
}

/// Every writable column of a record. Updates overwrite all of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFields {
    pub city: String,
    pub country: String,
    pub confirmed: i64,
    pub dead: i64,
    pub recovered: i64,
}

/// A keyed payload fields can be read from: form data or a JSON object.
pub trait FieldSource {
    fn text(&self, key: &str) -> AppResult<String>;
    fn integer(&self, key: &str) -> AppResult<i64>;
}

/// Parses an integer the way a lenient `int()` would: surrounding whitespace is ignored.
pub fn coerce_int(field: &str, raw: &str) -> AppResult<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| AppError::InvalidInteger {
            field: field.to_string(),
            value: raw.to_string(),
        })
}

fn missing_form_field(key: &str) -> AppError {
    AppError::BadRequest(format!("missing form field `{}`", key))
}

/// Form data. A missing field is a bad request; a non-numeric count is not.
impl FieldSource for HashMap<String, String> {
    fn text(&self, key: &str) -> AppResult<String> {
        self.get(key).cloned().ok_or_else(|| missing_form_field(key))
    }

    fn integer(&self, key: &str) -> AppResult<i64> {
        let raw = self.get(key).ok_or_else(|| missing_form_field(key))?;
        coerce_int(key, raw)
    }
}

impl FieldSource for serde_json::Map<String, Value> {
    fn text(&self, key: &str) -> AppResult<String> {
        match self.get(key) {
            None => Err(AppError::MissingField(key.to_string())),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(v @ (Value::Number(_) | Value::Bool(_))) => Ok(v.to_string()),
            Some(_) => Err(AppError::InvalidText(key.to_string())),
        }
    }

    fn integer(&self, key: &str) -> AppResult<i64> {
        let invalid = |v: &Value| AppError::InvalidInteger {
            field: key.to_string(),
            value: v.to_string(),
        };
        match self.get(key) {
            None => Err(AppError::MissingField(key.to_string())),
            Some(Value::String(s)) => coerce_int(key, s),
            Some(Value::Bool(b)) => Ok(i64::from(*b)),
            Some(v @ Value::Number(n)) => match n.as_i64() {
                Some(i) => Ok(i),
                // Floats truncate toward zero; out-of-range values are rejected.
                None => n
                    .as_f64()
                    .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                    .map(|f| f.trunc() as i64)
                    .ok_or_else(|| invalid(v)),
            },
            Some(v) => Err(invalid(v)),
        }
    }
}

impl RecordFields {
    pub fn from_source(source: &impl FieldSource) -> AppResult<Self> {
        Ok(RecordFields {
            city: source.text("city")?,
            country: source.text("country")?,
            confirmed: source.integer("confirmed")?,
            dead: source.integer("dead")?,
            recovered: source.integer("recovered")?,
        })
    }
}

#[async_trait::async_trait]
impl Model for CoronaRecord {
    fn table_name() -> &'static str {
        "corona_records"
    }

    // Length bounds are declared for documentation only; SQLite does not enforce them.
    fn create_table_sql() -> String {
        "CREATE TABLE IF NOT EXISTS corona_records (
            id INTEGER NOT NULL PRIMARY KEY,
            city VARCHAR(20) NOT NULL,
            country VARCHAR(20) NOT NULL,
            confirmed INTEGER NOT NULL,
            dead INTEGER NOT NULL,
            recovered INTEGER NOT NULL
        )"
        .to_string()
    }

    fn index_sql() -> Vec<String> {
        vec![
            "CREATE UNIQUE INDEX IF NOT EXISTS ix_corona_records_city ON corona_records (city)"
                .to_string(),
        ]
    }
}

fn migrate_corona_records(db: Arc<Db>) -> BoxFuture<'static, Result<(), sqlx::Error>> {
    CoronaRecord::migrate(db)
}

inventory::submit! {
    Migration(migrate_corona_records)
}

impl CoronaRecord {
    /// All records in insertion order.
    pub async fn all(db: &Db) -> AppResult<Vec<CoronaRecord>> {
        let sql = format!("SELECT {} FROM corona_records ORDER BY id", COLUMNS);
        Ok(db.fetch_all(&sql).await?)
    }

    pub async fn get(db: &Db, id: i64) -> AppResult<Option<CoronaRecord>> {
        debug!("Loading record {}", id);
        let sql = format!("SELECT {} FROM corona_records WHERE id = ?", COLUMNS);
        let record: Option<CoronaRecord> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(db.pool())
            .await?;
        Ok(record)
    }

    /// Records whose country matches `country` exactly (case-sensitive).
    pub async fn filter_by_country(db: &Db, country: &str) -> AppResult<Vec<CoronaRecord>> {
        debug!("Filtering records by country {:?}", country);
        let sql = format!(
            "SELECT {} FROM corona_records WHERE country = ? ORDER BY id",
            COLUMNS
        );
        let records: Vec<CoronaRecord> = sqlx::query_as(&sql)
            .bind(country)
            .fetch_all(db.pool())
            .await?;
        Ok(records)
    }

    /// Insert a new row and return it with its generated id.
    pub async fn insert(db: &Db, fields: &RecordFields) -> AppResult<CoronaRecord> {
        let sql = format!(
            "INSERT INTO corona_records (city, country, confirmed, dead, recovered) \
             VALUES (?, ?, ?, ?, ?) RETURNING {}",
            COLUMNS
        );
        let record: CoronaRecord = sqlx::query_as(&sql)
            .bind(&fields.city)
            .bind(&fields.country)
            .bind(fields.confirmed)
            .bind(fields.dead)
            .bind(fields.recovered)
            .fetch_one(db.pool())
            .await?;
        log::info!("Inserted record {} ({})", record.id, record.city);
        Ok(record)
    }

    /// Overwrite every column of row `id`. Last write wins.
    pub async fn update(db: &Db, id: i64, fields: &RecordFields) -> AppResult<CoronaRecord> {
        let sql = format!(
            "UPDATE corona_records \
             SET city = ?, country = ?, confirmed = ?, dead = ?, recovered = ? \
             WHERE id = ? RETURNING {}",
            COLUMNS
        );
        let record: Option<CoronaRecord> = sqlx::query_as(&sql)
            .bind(&fields.city)
            .bind(&fields.country)
            .bind(fields.confirmed)
            .bind(fields.dead)
            .bind(fields.recovered)
            .bind(id)
            .fetch_optional(db.pool())
            .await?;
        let record = record.ok_or(AppError::RecordNotFound(id))?;
        log::info!("Updated record {}", id);
        Ok(record)
    }

    pub async fn delete(db: &Db, id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM corona_records WHERE id = ?")
            .bind(id)
            .execute(db.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::RecordNotFound(id));
        }
        log::info!("Deleted record {}", id);
        Ok(())
    }
}

impl From<&CoronaRecord> for TemplateValue {
    fn from(record: &CoronaRecord) -> Self {
        let mut fields = HashMap::new();
        fields.insert("id".to_string(), TemplateValue::Int(record.id));
        fields.insert("city".to_string(), record.city.as_str().into());
        fields.insert("country".to_string(), record.country.as_str().into());
        fields.insert("confirmed".to_string(), TemplateValue::Int(record.confirmed));
        fields.insert("dead".to_string(), TemplateValue::Int(record.dead));
        fields.insert("recovered".to_string(), TemplateValue::Int(record.recovered));
        TemplateValue::Object(fields)
    }
}
