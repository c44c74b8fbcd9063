use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use uuid::Uuid;

use segmint_core::auth::PasswordRecord;
use segmint_core::domain::user::{Role, User, UserId};

use super::{RepositoryError, UserProfileUpdate, UserRepository};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn create(&self, user: &User, password: &PasswordRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id, email, password_digest, password_salt, first_name, last_name,
                role, is_active, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.0.to_string())
        .bind(&user.email)
        .bind(&password.digest)
        .bind(&password.salt)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(user.created_at.to_rfc3339())
        .bind(user.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!("{USER_COLUMNS} WHERE id = ?"))
            .bind(id.0.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| user_from_row(&row)).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!("{USER_COLUMNS} WHERE email = ?"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| user_from_row(&row)).transpose()
    }

    async fn credentials(
        &self,
        email: &str,
    ) -> Result<Option<(User, PasswordRecord)>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, email, password_digest, password_salt, first_name, last_name, role, is_active, created_at, updated_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let user = user_from_row(&row)?;
            let record = PasswordRecord {
                salt: row.get("password_salt"),
                digest: row.get("password_digest"),
            };
            Ok((user, record))
        })
        .transpose()
    }

    async fn list(&self) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query(&format!("{USER_COLUMNS} ORDER BY created_at DESC"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(user_from_row).collect()
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    async fn update_profile(
        &self,
        id: &UserId,
        update: UserProfileUpdate,
    ) -> Result<Option<User>, RepositoryError> {
        let existing = match self.find_by_id(id).await? {
            Some(user) => user,
            None => return Ok(None),
        };

        let first_name = update.first_name.unwrap_or(existing.first_name);
        let last_name = update.last_name.unwrap_or(existing.last_name);
        let role = update.role.unwrap_or(existing.role);
        let is_active = update.is_active.unwrap_or(existing.is_active);
        let updated_at = Utc::now();

        sqlx::query(
            "UPDATE users SET first_name = ?, last_name = ?, role = ?, is_active = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&first_name)
        .bind(&last_name)
        .bind(role.as_str())
        .bind(is_active)
        .bind(updated_at.to_rfc3339())
        .bind(id.0.to_string())
        .execute(&self.pool)
        .await?;

        Ok(Some(User {
            first_name,
            last_name,
            role,
            is_active,
            updated_at,
            ..existing
        }))
    }

    async fn deactivate(&self, id: &UserId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE users SET is_active = 0, updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id.0.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

const USER_COLUMNS: &str = "SELECT id, email, first_name, last_name, role, is_active, created_at, updated_at FROM users";

fn user_from_row(row: &SqliteRow) -> Result<User, RepositoryError> {
    let id: String = row.get("id");
    let role: String = row.get("role");

    Ok(User {
        id: UserId(parse_uuid("users.id", &id)?),
        email: row.get("email"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        role: Role::parse(&role)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown role `{role}`")))?,
        is_active: row.get::<i64, _>("is_active") != 0,
        created_at: parse_datetime("users.created_at", &row.get::<String, _>("created_at"))?,
        updated_at: parse_datetime("users.updated_at", &row.get::<String, _>("updated_at"))?,
    })
}

pub(crate) fn parse_uuid(field: &str, value: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(value)
        .map_err(|error| RepositoryError::Decode(format!("{field}: invalid uuid: {error}")))
}

pub(crate) fn parse_datetime(field: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{field}: invalid timestamp: {error}")))
}
