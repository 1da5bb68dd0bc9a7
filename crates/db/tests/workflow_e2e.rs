//! End-to-end workflow runs over the demo dataset: submit, approve through
//! the chain, reject, cancel, and the double-decision guards.

use tierflow_core::domain::contract::{ContractId, ContractStatus};
use tierflow_core::domain::instance::{ApprovalInstance, ApprovalTask, InstanceStatus, TaskStatus};
use tierflow_core::domain::user::UserId;
use tierflow_core::lifecycle::Decision;
use tierflow_core::RoutingError;

use tierflow_db::repositories::{ContractRepository, SqlContractRepository};
use tierflow_db::workflow::DecisionOutcome;
use tierflow_db::{connect_with_settings, migrations, DemoDataset, WorkflowError, WorkflowService};

const REQUESTER: UserId = UserId(1); // field agent in the county network dept
const COUNTY_MANAGER: UserId = UserId(2); // manages the same county network dept
const CITY_LEAD_A: UserId = UserId(3);
const CITY_LEAD_B: UserId = UserId(4);
const PROVINCE_DIRECTOR: UserId = UserId(5);

const MID_TIER: ContractId = ContractId(1); // 45k, B2-002
const FAST_TRACK: ContractId = ContractId(2); // 8k, B2-001
const LARGE: ContractId = ContractId(3); // 2m, B2-003

async fn setup() -> sqlx::SqlitePool {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    DemoDataset::load(&pool).await.expect("seed");
    pool
}

fn approve() -> Decision {
    Decision::Approve { comment: None }
}

/// Submits as the demo requester and unwraps the first task the chain opens.
async fn submit(
    service: &WorkflowService,
    contract: ContractId,
) -> (ApprovalInstance, ApprovalTask) {
    let (instance, task) = service.submit(contract, REQUESTER).await.expect("submit");
    (instance, task.expect("first task"))
}

async fn contract_status(pool: &sqlx::SqlitePool, id: ContractId) -> ContractStatus {
    SqlContractRepository::new(pool.clone())
        .find_by_id(id)
        .await
        .expect("find contract")
        .expect("contract exists")
        .status
}

#[tokio::test]
async fn mid_tier_contract_walks_the_two_step_chain() {
    let pool = setup().await;
    let service = WorkflowService::new(pool.clone());

    let (instance, task) = submit(&service, MID_TIER).await;
    assert_eq!(instance.status, InstanceStatus::Running);
    assert_eq!(instance.current_step, 1);
    assert_eq!(instance.scenario_id.0, "B2-002");
    assert_eq!(task.assignee_id, COUNTY_MANAGER);
    assert_eq!(contract_status(&pool, MID_TIER).await, ContractStatus::InReview);

    let outcome = service.decide(task.id, COUNTY_MANAGER, approve()).await.expect("step 1");
    let next = match outcome {
        DecisionOutcome::Advanced { next_task } => next_task,
        other => panic!("expected advance, got {other:?}"),
    };
    assert_eq!(next.step_order, 2);
    assert_eq!(next.role_code, "city_net_lead");
    // Both city leads are idle; the lower id wins the tie.
    assert_eq!(next.assignee_id, CITY_LEAD_A);

    let outcome = service.decide(next.id, CITY_LEAD_A, approve()).await.expect("step 2");
    assert!(matches!(outcome, DecisionOutcome::Completed));
    assert_eq!(contract_status(&pool, MID_TIER).await, ContractStatus::Effective);

    let snapshot = service.progress(MID_TIER).await.expect("progress").expect("snapshot");
    assert_eq!(snapshot.instance.status, InstanceStatus::Completed);
    assert!(snapshot.instance.ended_at.is_some());
    assert_eq!(snapshot.total_steps, 2);
    assert_eq!(snapshot.tasks.len(), 2);
    assert!(snapshot.tasks.iter().all(|t| t.status == TaskStatus::Approved));
}

#[tokio::test]
async fn fast_track_contract_completes_in_one_step() {
    let pool = setup().await;
    let service = WorkflowService::new(pool.clone());

    let (instance, task) = submit(&service, FAST_TRACK).await;
    assert_eq!(instance.scenario_id.0, "B2-001");

    let outcome = service.decide(task.id, COUNTY_MANAGER, approve()).await.expect("decide");
    assert!(matches!(outcome, DecisionOutcome::Completed));
    assert_eq!(contract_status(&pool, FAST_TRACK).await, ContractStatus::Effective);
}

#[tokio::test]
async fn large_contract_climbs_to_the_province() {
    let pool = setup().await;
    let service = WorkflowService::new(pool.clone());

    let (instance, task) = submit(&service, LARGE).await;
    assert_eq!(instance.scenario_id.0, "B2-003");

    let task = match service.decide(task.id, COUNTY_MANAGER, approve()).await.expect("step 1") {
        DecisionOutcome::Advanced { next_task } => next_task,
        other => panic!("expected advance, got {other:?}"),
    };
    let task = match service.decide(task.id, CITY_LEAD_A, approve()).await.expect("step 2") {
        DecisionOutcome::Advanced { next_task } => next_task,
        other => panic!("expected advance, got {other:?}"),
    };
    assert_eq!(task.assignee_id, PROVINCE_DIRECTOR);
    assert_eq!(task.step_order, 3);

    let outcome = service.decide(task.id, PROVINCE_DIRECTOR, approve()).await.expect("step 3");
    assert!(matches!(outcome, DecisionOutcome::Completed));
}

#[tokio::test]
async fn second_submit_while_running_is_rejected() {
    let pool = setup().await;
    let service = WorkflowService::new(pool);

    service.submit(MID_TIER, REQUESTER).await.expect("first submit");
    let err = service.submit(MID_TIER, REQUESTER).await.unwrap_err();
    // The contract is already in review, so the submittable check fires
    // before the unique index would.
    assert!(matches!(
        err,
        WorkflowError::ContractNotSubmittable { .. } | WorkflowError::AlreadyInReview(_)
    ));
}

#[tokio::test]
async fn rejection_ends_the_run_and_allows_resubmission() {
    let pool = setup().await;
    let service = WorkflowService::new(pool.clone());

    let (first_instance, task) = submit(&service, MID_TIER).await;
    let outcome = service
        .decide(task.id, COUNTY_MANAGER, Decision::Reject { comment: "budget code missing".into() })
        .await
        .expect("reject");
    assert!(matches!(outcome, DecisionOutcome::Rejected));
    assert_eq!(contract_status(&pool, MID_TIER).await, ContractStatus::Rejected);

    // A rejected contract can go around again with a fresh instance.
    let (second_instance, task) = submit(&service, MID_TIER).await;
    assert_ne!(second_instance.id, first_instance.id);
    assert_eq!(task.step_order, 1);

    let snapshot = service.progress(MID_TIER).await.expect("progress").expect("snapshot");
    assert_eq!(snapshot.instance.id, second_instance.id);
}

#[tokio::test]
async fn decisions_are_exactly_once() {
    let pool = setup().await;
    let service = WorkflowService::new(pool);

    let (_, task) = submit(&service, MID_TIER).await;
    service.decide(task.id, COUNTY_MANAGER, approve()).await.expect("first decision");

    let err = service.decide(task.id, COUNTY_MANAGER, approve()).await.unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Lifecycle(_) | WorkflowError::AlreadyProcessed(_)
    ));
}

#[tokio::test]
async fn only_the_assignee_may_decide() {
    let pool = setup().await;
    let service = WorkflowService::new(pool);

    let (_, task) = submit(&service, MID_TIER).await;
    let err = service.decide(task.id, CITY_LEAD_A, approve()).await.unwrap_err();
    assert!(matches!(err, WorkflowError::NotAssignee { .. }));
}

#[tokio::test]
async fn cancel_voids_the_pending_task_and_restores_the_draft() {
    let pool = setup().await;
    let service = WorkflowService::new(pool.clone());

    let (instance, task) = submit(&service, MID_TIER).await;

    let err = service.cancel(instance.id, COUNTY_MANAGER).await.unwrap_err();
    assert!(matches!(err, WorkflowError::NotRequester { .. }));

    service.cancel(instance.id, REQUESTER).await.expect("cancel");
    assert_eq!(contract_status(&pool, MID_TIER).await, ContractStatus::Draft);

    let snapshot = service.progress(MID_TIER).await.expect("progress").expect("snapshot");
    assert_eq!(snapshot.instance.status, InstanceStatus::Cancelled);
    assert_eq!(snapshot.tasks.len(), 1);
    assert_eq!(snapshot.tasks[0].status, TaskStatus::Voided);
    assert_eq!(snapshot.tasks[0].id, task.id);

    // The approver can no longer act on the voided task.
    let err = service.decide(task.id, COUNTY_MANAGER, approve()).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Lifecycle(_)));
}

#[tokio::test]
async fn city_step_balances_across_idle_leads() {
    let pool = setup().await;
    let service = WorkflowService::new(pool.clone());

    // Walk two contracts to the city step; the second should go to the lead
    // who is not already holding a pending task.
    let (_, task) = submit(&service, MID_TIER).await;
    let first_city = match service.decide(task.id, COUNTY_MANAGER, approve()).await.expect("adv") {
        DecisionOutcome::Advanced { next_task } => next_task,
        other => panic!("expected advance, got {other:?}"),
    };
    assert_eq!(first_city.assignee_id, CITY_LEAD_A);

    let (_, task) = submit(&service, LARGE).await;
    let second_city = match service.decide(task.id, COUNTY_MANAGER, approve()).await.expect("adv")
    {
        DecisionOutcome::Advanced { next_task } => next_task,
        other => panic!("expected advance, got {other:?}"),
    };
    assert_eq!(second_city.assignee_id, CITY_LEAD_B);

    let my_tasks = service.my_tasks(CITY_LEAD_A).await.expect("my tasks");
    assert_eq!(my_tasks.len(), 1);
    assert_eq!(my_tasks[0].id, first_city.id);
}

#[tokio::test]
async fn routing_failure_rolls_the_submit_back() {
    let pool = setup().await;
    let service = WorkflowService::new(pool.clone());

    sqlx::query("UPDATE user_account SET active = 0 WHERE id = ?")
        .bind(COUNTY_MANAGER.0)
        .execute(&pool)
        .await
        .expect("deactivate county manager");

    let err = service.submit(LARGE, REQUESTER).await.unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Routing(RoutingError::NoEligibleApprover { step_order: 1, .. })
    ));

    // Nothing was committed: no instance, contract still a draft.
    assert_eq!(contract_status(&pool, LARGE).await, ContractStatus::Draft);
    assert!(service.progress(LARGE).await.expect("progress").is_none());
}

#[tokio::test]
async fn unknown_contract_and_unknown_user_fail_cleanly() {
    let pool = setup().await;
    let service = WorkflowService::new(pool);

    let err = service.submit(ContractId(999), REQUESTER).await.unwrap_err();
    assert!(matches!(err, WorkflowError::ContractNotFound(_)));

    let err = service.submit(MID_TIER, UserId(999)).await.unwrap_err();
    assert!(matches!(err, WorkflowError::UserNotFound(_)));
}

#[tokio::test]
async fn unmatched_amounts_surface_as_routing_errors() {
    let pool = setup().await;
    let service = WorkflowService::new(pool.clone());

    sqlx::query(
        "INSERT INTO contract (id, name, sub_type_code, amount, status)
         VALUES (10, 'Unknown sub-type', 'ZZ', '100', 'draft')",
    )
    .execute(&pool)
    .await
    .expect("insert contract");

    let err = service.submit(ContractId(10), REQUESTER).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Routing(RoutingError::NoScenario { .. })));
    assert_eq!(contract_status(&pool, ContractId(10)).await, ContractStatus::Draft);
}

#[tokio::test]
async fn stepless_scenario_completes_on_submit() {
    let pool = setup().await;
    let service = WorkflowService::new(pool.clone());

    sqlx::query(
        "INSERT INTO scenario_definition
             (scenario_id, sub_type_code, sub_type_name, amount_min, amount_max, fast_track, active)
         VALUES ('Z1-001', 'Z1', 'Prepaid top-up', '0', NULL, 1, 1)",
    )
    .execute(&pool)
    .await
    .expect("insert scenario");
    sqlx::query(
        "INSERT INTO contract (id, name, sub_type_code, amount, status)
         VALUES (20, 'County C prepaid refill', 'Z1', '100', 'draft')",
    )
    .execute(&pool)
    .await
    .expect("insert contract");

    let (instance, task) =
        service.submit(ContractId(20), REQUESTER).await.expect("submit");
    assert!(task.is_none());
    assert_eq!(instance.status, InstanceStatus::Completed);
    assert!(instance.ended_at.is_some());
    assert_eq!(instance.current_step, 0);
    assert_eq!(contract_status(&pool, ContractId(20)).await, ContractStatus::Effective);

    let snapshot = service.progress(ContractId(20)).await.expect("progress").expect("snapshot");
    assert!(snapshot.tasks.is_empty());
    assert_eq!(snapshot.total_steps, 0);
}
