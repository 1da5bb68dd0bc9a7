//! Transactional orchestration of the approval state machine.
//!
//! Every operation runs in a single transaction: scenario matching, approver
//! resolution, and the compare-and-set writes all see one consistent view.
//! Exactly-once task completion rests on two guards the schema enforces: the
//! partial unique index on running instances, and `WHERE status = 'pending'`
//! on every task close (zero rows affected means someone got there first).

use chrono::Utc;
use sqlx::{Row, Sqlite, Transaction};
use thiserror::Error;
use tracing::{info, instrument};

use tierflow_core::domain::contract::{ContractId, ContractStatus};
use tierflow_core::domain::instance::{
    ApprovalInstance, ApprovalTask, InstanceId, InstanceSnapshot, InstanceStatus, TaskId,
};
use tierflow_core::domain::scenario::ScenarioStep;
use tierflow_core::domain::user::{UserAccount, UserId};
use tierflow_core::lifecycle::{self, Decision, DecisionEffect, LifecycleError};
use tierflow_core::{ApproverResolver, OrgDirectory, Roster, RoutingError, ScenarioCatalog};

use crate::repositories::instance::{
    row_to_instance, row_to_task, INSTANCE_COLUMNS, TASK_COLUMNS,
};
use crate::repositories::org::{row_to_unit, UNIT_COLUMNS};
use crate::repositories::role::row_to_role;
use crate::repositories::scenario::load_catalog_tx;
use crate::repositories::user::row_to_user;
use crate::repositories::{RepositoryError, SqlInstanceRepository};
use crate::DbPool;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("contract {0:?} not found")]
    ContractNotFound(ContractId),
    #[error("contract {contract:?} is {status:?} and cannot be submitted")]
    ContractNotSubmittable { contract: ContractId, status: ContractStatus },
    #[error("contract {0:?} already has a running approval instance")]
    AlreadyInReview(ContractId),
    #[error("user {0:?} not found or inactive")]
    UserNotFound(UserId),
    #[error("instance {0:?} not found")]
    InstanceNotFound(InstanceId),
    #[error("task {0:?} not found")]
    TaskNotFound(TaskId),
    #[error("task {0:?} was already processed")]
    AlreadyProcessed(TaskId),
    #[error("user {user:?} is not the assignee of task {task:?}")]
    NotAssignee { task: TaskId, user: UserId },
    #[error("user {user:?} is not the requester of instance {instance:?}")]
    NotRequester { instance: InstanceId, user: UserId },
}

impl From<sqlx::Error> for WorkflowError {
    fn from(err: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(err))
    }
}

/// What a processed decision did to the instance.
#[derive(Clone, Debug)]
pub enum DecisionOutcome {
    /// Task approved; a new pending task was created for the next step.
    Advanced { next_task: ApprovalTask },
    /// Task approved on the final step; the contract is now effective.
    Completed,
    /// Task rejected; the contract returns to its requester.
    Rejected,
}

pub struct WorkflowService {
    pool: DbPool,
}

impl WorkflowService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Starts an approval run for a contract: match the scenario, route the
    /// first step, open the instance, and flip the contract to in-review.
    /// A scenario with no steps completes in the same transaction and takes
    /// the contract straight to effective, with no task created.
    #[instrument(skip(self))]
    pub async fn submit(
        &self,
        contract_id: ContractId,
        requester_id: UserId,
    ) -> Result<(ApprovalInstance, Option<ApprovalTask>), WorkflowError> {
        let mut tx = self.pool.begin().await?;

        let contract_row = sqlx::query(
            "SELECT id, name, sub_type_code, amount, status FROM contract WHERE id = ?",
        )
        .bind(contract_id.0)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(WorkflowError::ContractNotFound(contract_id))?;
        let contract = crate::repositories::contract::row_to_contract(&contract_row)?;

        if !contract.status.submittable() {
            return Err(WorkflowError::ContractNotSubmittable {
                contract: contract_id,
                status: contract.status,
            });
        }

        let requester = load_user_tx(&mut tx, requester_id).await?;

        let catalog = load_catalog_tx(&mut tx).await?;
        let scenario = catalog
            .match_scenario(&contract.sub_type_code, contract.amount)
            .ok_or_else(|| RoutingError::NoScenario {
                sub_type: contract.sub_type_code.clone(),
                amount: contract.amount,
            })?
            .clone();
        let first_step = catalog.next_step(&scenario.scenario_id, 0).cloned();

        let approver = match &first_step {
            Some(step) => {
                let directory = load_directory_tx(&mut tx).await?;
                let roster = load_roster_tx(&mut tx).await?;
                let resolver = ApproverResolver::new(&directory, &roster);
                Some(resolver.resolve_approver(requester.unit_id, step)?.clone())
            }
            None => None,
        };

        let now = Utc::now().to_rfc3339();
        let insert = sqlx::query(
            "INSERT INTO approval_instance
                 (contract_id, scenario_id, status, current_step, requester_id, started_at)
             VALUES (?, ?, 'running', ?, ?, ?)",
        )
        .bind(contract_id.0)
        .bind(&scenario.scenario_id.0)
        .bind(first_step.as_ref().map_or(0, |step| i64::from(step.order)))
        .bind(requester_id.0)
        .bind(&now)
        .execute(&mut *tx)
        .await;
        let instance_id = match insert {
            Ok(done) => InstanceId(done.last_insert_rowid()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(WorkflowError::AlreadyInReview(contract_id));
            }
            Err(err) => return Err(err.into()),
        };

        let task = match (first_step, approver) {
            (Some(step), Some(approver)) => {
                let task =
                    insert_task_tx(&mut tx, instance_id, &step, approver.id, &now).await?;
                let flipped = sqlx::query(
                    "UPDATE contract SET status = 'in_review'
                     WHERE id = ? AND status IN ('draft', 'rejected')",
                )
                .bind(contract_id.0)
                .execute(&mut *tx)
                .await?;
                if flipped.rows_affected() == 0 {
                    return Err(WorkflowError::ContractNotSubmittable {
                        contract: contract_id,
                        status: contract.status,
                    });
                }
                Some(task)
            }
            _ => {
                close_instance_tx(&mut tx, instance_id, InstanceStatus::Completed, &now).await?;
                let flipped = sqlx::query(
                    "UPDATE contract SET status = 'effective'
                     WHERE id = ? AND status IN ('draft', 'rejected')",
                )
                .bind(contract_id.0)
                .execute(&mut *tx)
                .await?;
                if flipped.rows_affected() == 0 {
                    return Err(WorkflowError::ContractNotSubmittable {
                        contract: contract_id,
                        status: contract.status,
                    });
                }
                None
            }
        };

        let instance = load_instance_tx(&mut tx, instance_id).await?;
        tx.commit().await?;

        info!(
            contract = contract_id.0,
            instance = instance_id.0,
            scenario = %scenario.scenario_id.0,
            assignee = task.as_ref().map(|task| task.assignee_id.0),
            "approval instance started"
        );
        Ok((instance, task))
    }

    /// Applies an approve or reject decision to a pending task. The task row
    /// is closed with a compare-and-set; a second decision on the same task
    /// comes back as `AlreadyProcessed`.
    #[instrument(skip(self, decision))]
    pub async fn decide(
        &self,
        task_id: TaskId,
        actor_id: UserId,
        decision: Decision,
    ) -> Result<DecisionOutcome, WorkflowError> {
        let mut tx = self.pool.begin().await?;

        let task = load_task_tx(&mut tx, task_id).await?;
        if task.assignee_id != actor_id {
            return Err(WorkflowError::NotAssignee { task: task_id, user: actor_id });
        }
        let instance = load_instance_tx(&mut tx, task.instance_id).await?;

        let effect = lifecycle::evaluate(instance.status, task.status, &decision)?;
        let (task_status, comment) = match &decision {
            Decision::Approve { comment } => ("approved", comment.clone()),
            Decision::Reject { comment } => ("rejected", Some(comment.clone())),
            Decision::Cancel => ("voided", None),
        };

        let now = Utc::now().to_rfc3339();
        let closed = sqlx::query(
            "UPDATE approval_task SET status = ?, comment = ?, finished_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(task_status)
        .bind(&comment)
        .bind(&now)
        .bind(task_id.0)
        .execute(&mut *tx)
        .await?;
        if closed.rows_affected() == 0 {
            return Err(WorkflowError::AlreadyProcessed(task_id));
        }

        let outcome = match effect {
            DecisionEffect::TaskApproved => {
                let catalog = load_catalog_tx(&mut tx).await?;
                if catalog.is_last_step(&instance.scenario_id, task.step_order) {
                    close_instance_tx(&mut tx, instance.id, InstanceStatus::Completed, &now)
                        .await?;
                    set_contract_status_tx(
                        &mut tx,
                        instance.contract_id,
                        "effective",
                        "in_review",
                    )
                    .await?;
                    DecisionOutcome::Completed
                } else {
                    let next_step = catalog
                        .next_step(&instance.scenario_id, task.step_order)
                        .ok_or(WorkflowError::AlreadyProcessed(task_id))?
                        .clone();
                    let requester = load_user_tx(&mut tx, instance.requester_id).await?;
                    let directory = load_directory_tx(&mut tx).await?;
                    let roster = load_roster_tx(&mut tx).await?;
                    let resolver = ApproverResolver::new(&directory, &roster);
                    let approver =
                        resolver.resolve_approver(requester.unit_id, &next_step)?.clone();

                    let advanced = sqlx::query(
                        "UPDATE approval_instance SET current_step = ?
                         WHERE id = ? AND status = 'running'",
                    )
                    .bind(next_step.order as i64)
                    .bind(instance.id.0)
                    .execute(&mut *tx)
                    .await?;
                    if advanced.rows_affected() == 0 {
                        return Err(WorkflowError::AlreadyProcessed(task_id));
                    }
                    let next_task =
                        insert_task_tx(&mut tx, instance.id, &next_step, approver.id, &now)
                            .await?;
                    DecisionOutcome::Advanced { next_task }
                }
            }
            DecisionEffect::TaskRejected => {
                close_instance_tx(&mut tx, instance.id, InstanceStatus::Rejected, &now).await?;
                set_contract_status_tx(&mut tx, instance.contract_id, "rejected", "in_review")
                    .await?;
                DecisionOutcome::Rejected
            }
            // Cancellation goes through `cancel`, which checks the requester.
            DecisionEffect::InstanceCancelled => {
                return Err(WorkflowError::NotRequester {
                    instance: instance.id,
                    user: actor_id,
                });
            }
        };

        tx.commit().await?;
        info!(task = task_id.0, instance = instance.id.0, status = task_status, "task decided");
        Ok(outcome)
    }

    /// Requester withdraws a running instance. The pending task is voided and
    /// the contract returns to draft.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        instance_id: InstanceId,
        actor_id: UserId,
    ) -> Result<(), WorkflowError> {
        let mut tx = self.pool.begin().await?;

        let instance = load_instance_tx(&mut tx, instance_id).await?;
        if instance.requester_id != actor_id {
            return Err(WorkflowError::NotRequester { instance: instance_id, user: actor_id });
        }
        if instance.status.is_terminal() {
            return Err(
                LifecycleError::InstanceNotRunning { status: instance.status }.into()
            );
        }

        let now = Utc::now().to_rfc3339();
        close_instance_tx(&mut tx, instance_id, InstanceStatus::Cancelled, &now).await?;
        sqlx::query(
            "UPDATE approval_task SET status = 'voided', finished_at = ?
             WHERE instance_id = ? AND status = 'pending'",
        )
        .bind(&now)
        .bind(instance_id.0)
        .execute(&mut *tx)
        .await?;
        set_contract_status_tx(&mut tx, instance.contract_id, "draft", "in_review").await?;

        tx.commit().await?;
        info!(instance = instance_id.0, "approval instance cancelled by requester");
        Ok(())
    }

    /// Progress view: the most recent instance for a contract with its full
    /// task history.
    pub async fn progress(
        &self,
        contract_id: ContractId,
    ) -> Result<Option<InstanceSnapshot>, WorkflowError> {
        let reader = SqlInstanceRepository::new(self.pool.clone());
        let instances = reader.list_for_contract(contract_id).await?;
        let Some(instance) = instances.into_iter().last() else {
            return Ok(None);
        };

        let tasks = reader.tasks_for_instance(instance.id).await?;
        let catalog = self.load_catalog().await?;
        let total_steps = catalog.total_steps(&instance.scenario_id);
        Ok(Some(InstanceSnapshot { instance, tasks, total_steps }))
    }

    /// Pending tasks assigned to a user, oldest first.
    pub async fn my_tasks(&self, user_id: UserId) -> Result<Vec<ApprovalTask>, WorkflowError> {
        let reader = SqlInstanceRepository::new(self.pool.clone());
        Ok(reader.pending_tasks_for_user(user_id).await?)
    }

    async fn load_catalog(&self) -> Result<ScenarioCatalog, WorkflowError> {
        let mut tx = self.pool.begin().await?;
        let catalog = load_catalog_tx(&mut tx).await?;
        tx.commit().await?;
        Ok(catalog)
    }
}

async fn load_user_tx(
    tx: &mut Transaction<'_, Sqlite>,
    id: UserId,
) -> Result<UserAccount, WorkflowError> {
    let row = sqlx::query(
        "SELECT id, name, role_code, unit_id, active FROM user_account
         WHERE id = ? AND active = 1",
    )
    .bind(id.0)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(WorkflowError::UserNotFound(id))?;
    Ok(row_to_user(&row)?)
}

async fn load_instance_tx(
    tx: &mut Transaction<'_, Sqlite>,
    id: InstanceId,
) -> Result<ApprovalInstance, WorkflowError> {
    let row = sqlx::query(&format!(
        "SELECT {INSTANCE_COLUMNS} FROM approval_instance WHERE id = ?"
    ))
    .bind(id.0)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(WorkflowError::InstanceNotFound(id))?;
    Ok(row_to_instance(&row)?)
}

async fn load_task_tx(
    tx: &mut Transaction<'_, Sqlite>,
    id: TaskId,
) -> Result<ApprovalTask, WorkflowError> {
    let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM approval_task WHERE id = ?"))
        .bind(id.0)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(WorkflowError::TaskNotFound(id))?;
    Ok(row_to_task(&row)?)
}

async fn load_directory_tx(
    tx: &mut Transaction<'_, Sqlite>,
) -> Result<OrgDirectory, WorkflowError> {
    let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
        "SELECT {UNIT_COLUMNS} FROM org_unit WHERE deleted = 0 ORDER BY sort_order, id"
    ))
    .fetch_all(&mut **tx)
    .await?;
    let units = rows.iter().map(row_to_unit).collect::<Result<Vec<_>, _>>()?;
    Ok(OrgDirectory::from_units(units))
}

async fn load_roster_tx(tx: &mut Transaction<'_, Sqlite>) -> Result<Roster, WorkflowError> {
    let role_rows: Vec<sqlx::sqlite::SqliteRow> =
        sqlx::query("SELECT code, name, category, dept_family_required FROM role")
            .fetch_all(&mut **tx)
            .await?;
    let roles = role_rows
        .iter()
        .map(|row| row_to_role(row).map(|role| (role.code.clone(), role)))
        .collect::<Result<_, _>>()?;

    let user_rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
        "SELECT id, name, role_code, unit_id, active FROM user_account WHERE active = 1",
    )
    .fetch_all(&mut **tx)
    .await?;
    let users = user_rows.iter().map(row_to_user).collect::<Result<Vec<_>, _>>()?;

    let count_rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
        "SELECT assignee_id, COUNT(*) AS count FROM approval_task
         WHERE status = 'pending' GROUP BY assignee_id",
    )
    .fetch_all(&mut **tx)
    .await?;
    let open_tasks = count_rows
        .iter()
        .map(|row| {
            let assignee: i64 =
                row.try_get("assignee_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let count: i64 =
                row.try_get("count").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            Ok::<_, RepositoryError>((UserId(assignee), count as u32))
        })
        .collect::<Result<_, _>>()?;

    Ok(Roster { roles, users, open_tasks })
}

async fn insert_task_tx(
    tx: &mut Transaction<'_, Sqlite>,
    instance_id: InstanceId,
    step: &ScenarioStep,
    assignee_id: UserId,
    now: &str,
) -> Result<ApprovalTask, WorkflowError> {
    let done = sqlx::query(
        "INSERT INTO approval_task
             (instance_id, scenario_id, step_order, step_name, role_code, assignee_id, status, created_at)
         VALUES (?, ?, ?, ?, ?, ?, 'pending', ?)",
    )
    .bind(instance_id.0)
    .bind(&step.scenario_id.0)
    .bind(step.order as i64)
    .bind(&step.name)
    .bind(&step.role_code)
    .bind(assignee_id.0)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    let task_id = done.last_insert_rowid();
    let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM approval_task WHERE id = ?"))
        .bind(task_id)
        .fetch_one(&mut **tx)
        .await?;
    Ok(row_to_task(&row)?)
}

async fn close_instance_tx(
    tx: &mut Transaction<'_, Sqlite>,
    id: InstanceId,
    status: InstanceStatus,
    now: &str,
) -> Result<(), WorkflowError> {
    let done = sqlx::query(
        "UPDATE approval_instance SET status = ?, ended_at = ?
         WHERE id = ? AND status = 'running'",
    )
    .bind(status.as_str())
    .bind(now)
    .bind(id.0)
    .execute(&mut **tx)
    .await?;
    if done.rows_affected() == 0 {
        return Err(LifecycleError::InstanceNotRunning { status }.into());
    }
    Ok(())
}

async fn set_contract_status_tx(
    tx: &mut Transaction<'_, Sqlite>,
    id: ContractId,
    to: &str,
    from: &str,
) -> Result<(), WorkflowError> {
    sqlx::query("UPDATE contract SET status = ? WHERE id = ? AND status = ?")
        .bind(to)
        .bind(id.0)
        .bind(from)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
