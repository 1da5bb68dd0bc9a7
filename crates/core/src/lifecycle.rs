//! Pure decision rules for the instance state machine. The persistence layer
//! re-checks these under a transaction; this module is the single place the
//! legal transitions are written down.

use thiserror::Error;

use crate::domain::instance::{InstanceStatus, TaskStatus};

/// What an actor asked the engine to do with a running instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Approve { comment: Option<String> },
    Reject { comment: String },
    /// Requester withdraws the whole instance; no task comment is recorded.
    Cancel,
}

/// The transition a valid decision produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecisionEffect {
    /// Close the pending task as approved; advance or complete the instance.
    TaskApproved,
    /// Close the pending task as rejected; the instance ends rejected.
    TaskRejected,
    /// Void the pending task; the instance ends cancelled.
    InstanceCancelled,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("instance is {status:?}, not running")]
    InstanceNotRunning { status: InstanceStatus },
    #[error("task is {status:?}, already processed")]
    TaskNotPending { status: TaskStatus },
}

/// Validates a decision against the current instance and task state.
pub fn evaluate(
    instance: InstanceStatus,
    task: TaskStatus,
    decision: &Decision,
) -> Result<DecisionEffect, LifecycleError> {
    if instance.is_terminal() {
        return Err(LifecycleError::InstanceNotRunning { status: instance });
    }
    if task.is_terminal() {
        return Err(LifecycleError::TaskNotPending { status: task });
    }
    match decision {
        Decision::Approve { .. } => Ok(DecisionEffect::TaskApproved),
        Decision::Reject { .. } => Ok(DecisionEffect::TaskRejected),
        Decision::Cancel => Ok(DecisionEffect::InstanceCancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::{evaluate, Decision, DecisionEffect, LifecycleError};
    use crate::domain::instance::{InstanceStatus, TaskStatus};

    #[test]
    fn pending_task_on_running_instance_accepts_each_decision() {
        let approve = Decision::Approve { comment: None };
        let reject = Decision::Reject { comment: "missing annex".to_string() };
        assert_eq!(
            evaluate(InstanceStatus::Running, TaskStatus::Pending, &approve),
            Ok(DecisionEffect::TaskApproved)
        );
        assert_eq!(
            evaluate(InstanceStatus::Running, TaskStatus::Pending, &reject),
            Ok(DecisionEffect::TaskRejected)
        );
        assert_eq!(
            evaluate(InstanceStatus::Running, TaskStatus::Pending, &Decision::Cancel),
            Ok(DecisionEffect::InstanceCancelled)
        );
    }

    #[test]
    fn terminal_instance_rejects_everything() {
        for status in
            [InstanceStatus::Completed, InstanceStatus::Rejected, InstanceStatus::Cancelled]
        {
            let err = evaluate(status, TaskStatus::Pending, &Decision::Cancel).unwrap_err();
            assert_eq!(err, LifecycleError::InstanceNotRunning { status });
        }
    }

    #[test]
    fn processed_task_cannot_be_decided_again() {
        for status in [TaskStatus::Approved, TaskStatus::Rejected, TaskStatus::Voided] {
            let err = evaluate(
                InstanceStatus::Running,
                status,
                &Decision::Approve { comment: None },
            )
            .unwrap_err();
            assert_eq!(err, LifecycleError::TaskNotPending { status });
        }
    }
}
