use chrono::{DateTime, Utc};
use sqlx::Row;

use fitsync_core::domain::customer::{CustomerProfile, CustomerRecord, ExternalCustomerId, Gender};

use super::{CustomerRepository, RepositoryError};
use crate::DbPool;

const CUSTOMER_COLUMNS: &str = "id, customer_id, customer_name, gender, height, weight, neck,
     shoulder_width, sleeve_length, bicep_circumference, wrist_circumference,
     chest_bust_circumference, waist_circumference, lower_waist, hips_seat,
     created_at, updated_at";

pub struct SqlCustomerRepository {
    pool: DbPool,
}

impl SqlCustomerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode<T>(result: Result<T, sqlx::Error>) -> Result<T, RepositoryError> {
    result.map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

fn row_to_customer(row: &sqlx::sqlite::SqliteRow) -> Result<CustomerRecord, RepositoryError> {
    let gender: Option<String> = decode(row.try_get("gender"))?;
    let gender = gender
        .map(|raw| raw.parse::<Gender>())
        .transpose()
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String = decode(row.try_get("created_at"))?;
    let updated_at: String = decode(row.try_get("updated_at"))?;

    Ok(CustomerRecord {
        id: decode(row.try_get("id"))?,
        customer_id: ExternalCustomerId(decode(row.try_get("customer_id"))?),
        profile: CustomerProfile {
            customer_name: decode(row.try_get("customer_name"))?,
            gender,
            height: decode(row.try_get("height"))?,
            weight: decode(row.try_get("weight"))?,
            neck: decode(row.try_get("neck"))?,
            shoulder_width: decode(row.try_get("shoulder_width"))?,
            sleeve_length: decode(row.try_get("sleeve_length"))?,
            bicep_circumference: decode(row.try_get("bicep_circumference"))?,
            wrist_circumference: decode(row.try_get("wrist_circumference"))?,
            chest_bust_circumference: decode(row.try_get("chest_bust_circumference"))?,
            waist_circumference: decode(row.try_get("waist_circumference"))?,
            lower_waist: decode(row.try_get("lower_waist"))?,
            hips_seat: decode(row.try_get("hips_seat"))?,
        },
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

impl SqlCustomerRepository {
    async fn fetch_required(
        &self,
        id: &ExternalCustomerId,
    ) -> Result<CustomerRecord, RepositoryError> {
        self.find_by_external_id(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }
}

#[async_trait::async_trait]
impl CustomerRepository for SqlCustomerRepository {
    async fn find_by_external_id(
        &self,
        id: &ExternalCustomerId,
    ) -> Result<Option<CustomerRecord>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customer WHERE customer_id = ?"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_customer(r)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<CustomerRecord>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> =
            sqlx::query(&format!("SELECT {CUSTOMER_COLUMNS} FROM customer ORDER BY id ASC"))
                .fetch_all(&self.pool)
                .await?;

        rows.iter().map(row_to_customer).collect::<Result<Vec<_>, _>>()
    }

    async fn insert(
        &self,
        id: &ExternalCustomerId,
        profile: &CustomerProfile,
    ) -> Result<CustomerRecord, RepositoryError> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "INSERT INTO customer (customer_id, customer_name, gender, height, weight, neck,
                                   shoulder_width, sleeve_length, bicep_circumference,
                                   wrist_circumference, chest_bust_circumference,
                                   waist_circumference, lower_waist, hips_seat,
                                   created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.as_str())
        .bind(&profile.customer_name)
        .bind(profile.gender.map(|gender| gender.as_str()))
        .bind(&profile.height)
        .bind(&profile.weight)
        .bind(&profile.neck)
        .bind(&profile.shoulder_width)
        .bind(&profile.sleeve_length)
        .bind(&profile.bicep_circumference)
        .bind(&profile.wrist_circumference)
        .bind(&profile.chest_bust_circumference)
        .bind(&profile.waist_circumference)
        .bind(&profile.lower_waist)
        .bind(&profile.hips_seat)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => self.fetch_required(id).await,
            Err(error) if is_unique_violation(&error) => {
                Err(RepositoryError::Conflict(id.to_string()))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn update(
        &self,
        id: &ExternalCustomerId,
        profile: &CustomerProfile,
    ) -> Result<CustomerRecord, RepositoryError> {
        let result = sqlx::query(
            "UPDATE customer SET
                 customer_name = ?,
                 gender = ?,
                 height = ?,
                 weight = ?,
                 neck = ?,
                 shoulder_width = ?,
                 sleeve_length = ?,
                 bicep_circumference = ?,
                 wrist_circumference = ?,
                 chest_bust_circumference = ?,
                 waist_circumference = ?,
                 lower_waist = ?,
                 hips_seat = ?,
                 updated_at = ?
             WHERE customer_id = ?",
        )
        .bind(&profile.customer_name)
        .bind(profile.gender.map(|gender| gender.as_str()))
        .bind(&profile.height)
        .bind(&profile.weight)
        .bind(&profile.neck)
        .bind(&profile.shoulder_width)
        .bind(&profile.sleeve_length)
        .bind(&profile.bicep_circumference)
        .bind(&profile.wrist_circumference)
        .bind(&profile.chest_bust_circumference)
        .bind(&profile.waist_circumference)
        .bind(&profile.lower_waist)
        .bind(&profile.hips_seat)
        .bind(Utc::now().to_rfc3339())
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(id.to_string()));
        }
        self.fetch_required(id).await
    }

    async fn delete(&self, id: &ExternalCustomerId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM customer WHERE customer_id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
