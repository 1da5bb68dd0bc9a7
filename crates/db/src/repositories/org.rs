use sqlx::Row;

use tierflow_core::domain::org::{OrgLevel, OrgUnit, UnitId};
use tierflow_core::domain::user::UserId;

use super::{OrgRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOrgRepository {
    pool: DbPool,
}

impl SqlOrgRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn row_to_unit(row: &sqlx::sqlite::SqliteRow) -> Result<OrgUnit, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let parent_id: Option<i64> =
        row.try_get("parent_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let code: String = row.try_get("code").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let family: Option<String> =
        row.try_get("family").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let level_str: String =
        row.try_get("level").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let manager_id: Option<i64> =
        row.try_get("manager_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let sort_order: i32 =
        row.try_get("sort_order").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let deleted: bool =
        row.try_get("deleted").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let level = OrgLevel::parse(&level_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown org level `{level_str}`")))?;

    Ok(OrgUnit {
        id: UnitId(id),
        parent_id: parent_id.map(UnitId),
        name,
        code,
        family,
        level,
        manager_id: manager_id.map(UserId),
        sort_order,
        deleted,
    })
}

pub(crate) const UNIT_COLUMNS: &str =
    "id, parent_id, name, code, family, level, manager_id, sort_order, deleted";

#[async_trait::async_trait]
impl OrgRepository for SqlOrgRepository {
    async fn find_unit(&self, id: UnitId) -> Result<Option<OrgUnit>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {UNIT_COLUMNS} FROM org_unit WHERE id = ? AND deleted = 0"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_unit(r)?)),
            None => Ok(None),
        }
    }

    async fn list_units(&self) -> Result<Vec<OrgUnit>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {UNIT_COLUMNS} FROM org_unit WHERE deleted = 0 ORDER BY sort_order, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_unit).collect::<Result<Vec<_>, _>>()
    }

    async fn save_unit(&self, unit: OrgUnit) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO org_unit (id, parent_id, name, code, family, level, manager_id, sort_order, deleted)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 parent_id = excluded.parent_id,
                 name = excluded.name,
                 code = excluded.code,
                 family = excluded.family,
                 level = excluded.level,
                 manager_id = excluded.manager_id,
                 sort_order = excluded.sort_order,
                 deleted = excluded.deleted",
        )
        .bind(unit.id.0)
        .bind(unit.parent_id.map(|p| p.0))
        .bind(&unit.name)
        .bind(&unit.code)
        .bind(&unit.family)
        .bind(unit.level.as_str())
        .bind(unit.manager_id.map(|m| m.0))
        .bind(unit.sort_order)
        .bind(unit.deleted)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_unit(&self, id: UnitId) -> Result<(), RepositoryError> {
        let children: i64 = sqlx::query(
            "SELECT COUNT(*) AS count FROM org_unit WHERE parent_id = ? AND deleted = 0",
        )
        .bind(id.0)
        .fetch_one(&self.pool)
        .await?
        .get("count");
        if children > 0 {
            return Err(RepositoryError::Conflict(format!(
                "unit {} still has {children} live child unit(s)",
                id.0
            )));
        }

        let users: i64 = sqlx::query(
            "SELECT COUNT(*) AS count FROM user_account WHERE unit_id = ? AND active = 1",
        )
        .bind(id.0)
        .fetch_one(&self.pool)
        .await?
        .get("count");
        if users > 0 {
            return Err(RepositoryError::Conflict(format!(
                "unit {} still has {users} active user(s)",
                id.0
            )));
        }

        sqlx::query("UPDATE org_unit SET deleted = 1 WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
