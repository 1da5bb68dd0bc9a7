use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Applies outstanding migrations and reports how many were newly applied.
pub async fn run_pending(pool: &DbPool) -> Result<u64, MigrateError> {
    let before = applied_count(pool).await;
    MIGRATOR.run(pool).await?;
    Ok(applied_count(pool).await.saturating_sub(before))
}

/// Rows in the sqlx bookkeeping table; zero before the first migration runs.
async fn applied_count(pool: &DbPool) -> u64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .map_or(0, |count| count as u64)
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::run_pending;
    use crate::{connect_with_settings, migrations::MIGRATOR};

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "org_unit",
        "role",
        "user_account",
        "contract",
        "scenario_definition",
        "scenario_step",
        "approval_instance",
        "approval_task",
        "idx_org_unit_parent_id",
        "idx_user_account_unit_id",
        "idx_user_account_role_code",
        "idx_scenario_definition_sub_type",
        "uq_approval_instance_running",
        "idx_approval_instance_contract_id",
        "idx_approval_task_instance_id",
        "idx_approval_task_assignee_status",
    ];

    #[tokio::test]
    async fn run_pending_counts_newly_applied_migrations() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        let applied = run_pending(&pool).await.expect("first run");
        assert!(applied > 0);
        let applied = run_pending(&pool).await.expect("second run");
        assert_eq!(applied, 0);
    }

    #[tokio::test]
    async fn migrations_create_baseline_tables() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for table in
            ["org_unit", "scenario_definition", "approval_instance", "approval_task"]
        {
            let count = sqlx::query(
                "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .expect("check table")
            .get::<i64, _>("count");
            assert_eq!(count, 1, "table {table} should exist");
        }
    }

    #[tokio::test]
    async fn running_instance_index_is_unique_per_contract() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        sqlx::query(
            "INSERT INTO org_unit (id, parent_id, name, code, level) \
             VALUES (1, NULL, 'Province', 'PROV', 'province')",
        )
        .execute(&pool)
        .await
        .expect("org unit");
        sqlx::query("INSERT INTO role (code, name, category) VALUES ('r', 'Role', 'business')")
            .execute(&pool)
            .await
            .expect("role");
        sqlx::query(
            "INSERT INTO user_account (id, name, role_code, unit_id) VALUES (1, 'u', 'r', 1)",
        )
        .execute(&pool)
        .await
        .expect("user");
        sqlx::query(
            "INSERT INTO contract (id, name, sub_type_code, amount, status) \
             VALUES (1, 'c', 'B2', '100', 'in_review')",
        )
        .execute(&pool)
        .await
        .expect("contract");
        sqlx::query(
            "INSERT INTO scenario_definition (scenario_id, sub_type_code, sub_type_name, amount_min) \
             VALUES ('B2-001', 'B2', 'B2', '0')",
        )
        .execute(&pool)
        .await
        .expect("scenario");

        let insert = "INSERT INTO approval_instance \
             (contract_id, scenario_id, status, current_step, requester_id, started_at) \
             VALUES (1, 'B2-001', ?, 1, 1, '2026-01-01T00:00:00Z')";
        sqlx::query(insert).bind("cancelled").execute(&pool).await.expect("terminal row");
        sqlx::query(insert).bind("running").execute(&pool).await.expect("first running row");
        let second = sqlx::query(insert).bind("running").execute(&pool).await;
        assert!(second.is_err(), "second running instance for a contract should be rejected");
    }

    #[tokio::test]
    async fn migrations_are_reversible() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        let count = sqlx::query(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = 'org_unit'",
        )
        .fetch_one(&pool)
        .await
        .expect("check org_unit table removed")
        .get::<i64, _>("count");

        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn migrations_up_down_up_preserves_schema_signature() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let initial_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            initial_signature.len(),
            MANAGED_SCHEMA_OBJECTS.len(),
            "initial migration pass should create all managed schema objects",
        );

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        let after_down_signature = managed_schema_signature(&pool).await;
        assert!(
            after_down_signature.is_empty(),
            "managed schema objects should be removed after full undo",
        );

        run_pending(&pool).await.expect("re-run migrations");

        let after_second_up_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            after_second_up_signature, initial_signature,
            "up/down/up should preserve migration-managed schema signature",
        );
    }

    async fn managed_schema_signature(pool: &sqlx::SqlitePool) -> Vec<(String, String, String)> {
        let mut signature: Vec<(String, String, String)> = sqlx::query(
            "SELECT type, name, IFNULL(sql, '') AS sql
             FROM sqlite_master
             WHERE type IN ('table', 'index')",
        )
        .fetch_all(pool)
        .await
        .expect("load schema objects")
        .into_iter()
        .filter_map(|row| {
            let name = row.get::<String, _>("name");
            if MANAGED_SCHEMA_OBJECTS.contains(&name.as_str()) {
                Some((row.get::<String, _>("type"), name, row.get::<String, _>("sql")))
            } else {
                None
            }
        })
        .collect();
        signature.sort();
        signature
    }
}
