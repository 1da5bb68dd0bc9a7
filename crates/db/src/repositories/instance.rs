use std::collections::HashMap;

use sqlx::Row;

use tierflow_core::domain::contract::ContractId;
use tierflow_core::domain::instance::{
    ApprovalInstance, ApprovalTask, InstanceId, InstanceStatus, TaskId, TaskStatus,
};
use tierflow_core::domain::scenario::ScenarioId;
use tierflow_core::domain::user::UserId;

use super::{parse_opt_timestamp, parse_timestamp, RepositoryError};
use crate::DbPool;

/// Read side of the instance tables. All writes go through the workflow
/// service so they stay inside one transaction per decision.
pub struct SqlInstanceRepository {
    pool: DbPool,
}

impl SqlInstanceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_instance(
        &self,
        id: InstanceId,
    ) -> Result<Option<ApprovalInstance>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM approval_instance WHERE id = ?"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_instance(r)?)),
            None => Ok(None),
        }
    }

    pub async fn running_for_contract(
        &self,
        contract_id: ContractId,
    ) -> Result<Option<ApprovalInstance>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM approval_instance
             WHERE contract_id = ? AND status = 'running'"
        ))
        .bind(contract_id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_instance(r)?)),
            None => Ok(None),
        }
    }

    pub async fn list_for_contract(
        &self,
        contract_id: ContractId,
    ) -> Result<Vec<ApprovalInstance>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM approval_instance
             WHERE contract_id = ? ORDER BY id"
        ))
        .bind(contract_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_instance).collect::<Result<Vec<_>, _>>()
    }

    pub async fn tasks_for_instance(
        &self,
        instance_id: InstanceId,
    ) -> Result<Vec<ApprovalTask>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM approval_task WHERE instance_id = ? ORDER BY id"
        ))
        .bind(instance_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_task).collect::<Result<Vec<_>, _>>()
    }

    pub async fn pending_tasks_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ApprovalTask>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM approval_task
             WHERE assignee_id = ? AND status = 'pending' ORDER BY created_at, id"
        ))
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_task).collect::<Result<Vec<_>, _>>()
    }

    /// Pending task count per assignee, for load-balanced routing.
    pub async fn open_task_counts(&self) -> Result<HashMap<UserId, u32>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT assignee_id, COUNT(*) AS count FROM approval_task
             WHERE status = 'pending' GROUP BY assignee_id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let assignee: i64 = row
                    .try_get("assignee_id")
                    .map_err(|e| RepositoryError::Decode(e.to_string()))?;
                let count: i64 =
                    row.try_get("count").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                Ok((UserId(assignee), count as u32))
            })
            .collect()
    }
}

pub(crate) const INSTANCE_COLUMNS: &str =
    "id, contract_id, scenario_id, status, current_step, requester_id, started_at, ended_at";
pub(crate) const TASK_COLUMNS: &str =
    "id, instance_id, scenario_id, step_order, step_name, role_code, assignee_id, status, \
     comment, created_at, finished_at";

pub(crate) fn row_to_instance(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<ApprovalInstance, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let contract_id: i64 =
        row.try_get("contract_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let scenario_id: String =
        row.try_get("scenario_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let current_step: i64 =
        row.try_get("current_step").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let requester_id: i64 =
        row.try_get("requester_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let started_at_str: String =
        row.try_get("started_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let ended_at_str: Option<String> =
        row.try_get("ended_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let status = InstanceStatus::parse(&status_str).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown instance status `{status_str}`"))
    })?;

    Ok(ApprovalInstance {
        id: InstanceId(id),
        contract_id: ContractId(contract_id),
        scenario_id: ScenarioId(scenario_id),
        status,
        current_step: current_step as u32,
        requester_id: UserId(requester_id),
        started_at: parse_timestamp(&started_at_str)?,
        ended_at: parse_opt_timestamp(ended_at_str)?,
    })
}

pub(crate) fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalTask, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let instance_id: i64 =
        row.try_get("instance_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let scenario_id: String =
        row.try_get("scenario_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let step_order: i64 =
        row.try_get("step_order").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let step_name: String =
        row.try_get("step_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let role_code: String =
        row.try_get("role_code").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let assignee_id: i64 =
        row.try_get("assignee_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let comment: Option<String> =
        row.try_get("comment").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let finished_at_str: Option<String> =
        row.try_get("finished_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let status = TaskStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown task status `{status_str}`")))?;

    Ok(ApprovalTask {
        id: TaskId(id),
        instance_id: InstanceId(instance_id),
        scenario_id: ScenarioId(scenario_id),
        step_order: step_order as u32,
        step_name,
        role_code,
        assignee_id: UserId(assignee_id),
        status,
        comment,
        created_at: parse_timestamp(&created_at_str)?,
        finished_at: parse_opt_timestamp(finished_at_str)?,
    })
}
