use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::contract::ContractId;
use crate::domain::scenario::ScenarioId;
use crate::domain::user::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceStatus {
    Running,
    Completed,
    Rejected,
    Cancelled,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Approved,
    Rejected,
    /// Closed by the engine, not the assignee: the instance ended before the
    /// task was acted on (requester cancel or an earlier rejection).
    Voided,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Voided => "voided",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "voided" => Some(Self::Voided),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// One serial approval run over a contract. At most one instance per contract
/// may be running at a time; `current_step` is the 1-based order of the step
/// whose task is open.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalInstance {
    pub id: InstanceId,
    pub contract_id: ContractId,
    pub scenario_id: ScenarioId,
    pub status: InstanceStatus,
    pub current_step: u32,
    pub requester_id: UserId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// One assignment of a step to a concrete approver. Exactly one pending task
/// exists per running instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalTask {
    pub id: TaskId,
    pub instance_id: InstanceId,
    pub scenario_id: ScenarioId,
    pub step_order: u32,
    pub step_name: String,
    pub role_code: String,
    pub assignee_id: UserId,
    pub status: TaskStatus,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Read model for the progress view: the instance plus every task it has
/// produced so far, newest last.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    pub instance: ApprovalInstance,
    pub tasks: Vec<ApprovalTask>,
    pub total_steps: u32,
}

#[cfg(test)]
mod tests {
    use super::{InstanceStatus, TaskStatus};

    #[test]
    fn instance_status_round_trips_through_strings() {
        for status in [
            InstanceStatus::Running,
            InstanceStatus::Completed,
            InstanceStatus::Rejected,
            InstanceStatus::Cancelled,
        ] {
            assert_eq!(InstanceStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(InstanceStatus::parse("paused"), None);
    }

    #[test]
    fn only_running_instances_are_live() {
        assert!(!InstanceStatus::Running.is_terminal());
        assert!(InstanceStatus::Completed.is_terminal());
        assert!(InstanceStatus::Rejected.is_terminal());
        assert!(InstanceStatus::Cancelled.is_terminal());
    }

    #[test]
    fn only_pending_tasks_are_live() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(TaskStatus::Approved.is_terminal());
        assert!(TaskStatus::Rejected.is_terminal());
        assert!(TaskStatus::Voided.is_terminal());
    }
}
