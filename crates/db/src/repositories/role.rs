use sqlx::Row;

use tierflow_core::domain::role::{Role, RoleCategory};

use super::{RepositoryError, RoleRepository};
use crate::DbPool;

pub struct SqlRoleRepository {
    pool: DbPool,
}

impl SqlRoleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn row_to_role(row: &sqlx::sqlite::SqliteRow) -> Result<Role, RepositoryError> {
    let code: String = row.try_get("code").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let category_str: String =
        row.try_get("category").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let dept_family_required: Option<String> = row
        .try_get("dept_family_required")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let category = RoleCategory::parse(&category_str).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown role category `{category_str}`"))
    })?;

    Ok(Role { code, name, category, dept_family_required })
}

#[async_trait::async_trait]
impl RoleRepository for SqlRoleRepository {
    async fn find(&self, code: &str) -> Result<Option<Role>, RepositoryError> {
        let row = sqlx::query(
            "SELECT code, name, category, dept_family_required FROM role WHERE code = ?",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_role(r)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<Role>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT code, name, category, dept_family_required FROM role ORDER BY code",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_role).collect::<Result<Vec<_>, _>>()
    }

    async fn save(&self, role: Role) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO role (code, name, category, dept_family_required)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(code) DO UPDATE SET
                 name = excluded.name,
                 category = excluded.category,
                 dept_family_required = excluded.dept_family_required",
        )
        .bind(&role.code)
        .bind(&role.name)
        .bind(role.category.as_str())
        .bind(&role.dept_family_required)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
