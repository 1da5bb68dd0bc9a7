use sqlx::Row;

use tierflow_core::domain::org::UnitId;
use tierflow_core::domain::user::{UserAccount, UserId};

use super::{RepositoryError, UserRepository};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<UserAccount, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let role_code: String =
        row.try_get("role_code").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let unit_id: i64 =
        row.try_get("unit_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let active: bool =
        row.try_get("active").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(UserAccount { id: UserId(id), name, role_code, unit_id: UnitId(unit_id), active })
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_id(&self, id: UserId) -> Result<Option<UserAccount>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, role_code, unit_id, active FROM user_account WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_user(r)?)),
            None => Ok(None),
        }
    }

    async fn list_active(&self) -> Result<Vec<UserAccount>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, name, role_code, unit_id, active FROM user_account
             WHERE active = 1 ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_user).collect::<Result<Vec<_>, _>>()
    }

    async fn save(&self, user: UserAccount) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO user_account (id, name, role_code, unit_id, active)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 role_code = excluded.role_code,
                 unit_id = excluded.unit_id,
                 active = excluded.active",
        )
        .bind(user.id.0)
        .bind(&user.name)
        .bind(&user.role_code)
        .bind(user.unit_id.0)
        .bind(user.active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
