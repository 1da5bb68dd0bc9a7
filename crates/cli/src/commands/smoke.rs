use std::time::Instant;

use serde::Serialize;

use crate::commands::CommandResult;
use tierflow_core::config::{AppConfig, LoadOptions};
use tierflow_core::domain::contract::ContractId;
use tierflow_core::domain::user::UserId;
use tierflow_core::lifecycle::Decision;
use tierflow_db::workflow::DecisionOutcome;
use tierflow_db::{connect, connect_with_settings, migrations, DemoDataset, WorkflowService};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

pub fn run() -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let config = match timed_check(|| AppConfig::load(LoadOptions::default())) {
        Ok((elapsed_ms, config)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Pass,
                elapsed_ms,
                message: "configuration loaded and validated".to_string(),
            });
            config
        }
        Err((elapsed_ms, error)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Fail,
                elapsed_ms,
                message: error.to_string(),
            });
            checks.push(skipped("db_connectivity"));
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("workflow_round_trip"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Fail,
                elapsed_ms: 0,
                message: format!("failed to initialize async runtime: {error}"),
            });
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("workflow_round_trip"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let db_started = Instant::now();
    let db_result = runtime.block_on(async { connect(&config.database).await });

    let pool = match db_result {
        Ok(pool) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Pass,
                elapsed_ms: db_started.elapsed().as_millis() as u64,
                message: format!("connected using `{}`", config.database.url),
            });
            pool
        }
        Err(error) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Fail,
                elapsed_ms: db_started.elapsed().as_millis() as u64,
                message: format!("failed to connect: {error}"),
            });
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("workflow_round_trip"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let migration_started = Instant::now();
    let migration_result = runtime.block_on(async { migrations::run_pending(&pool).await });
    runtime.block_on(async {
        pool.close().await;
    });

    match migration_result {
        Ok(applied) => checks.push(SmokeCheck {
            name: "migration_visibility",
            status: SmokeStatus::Pass,
            elapsed_ms: migration_started.elapsed().as_millis() as u64,
            message: format!("schema is current ({applied} newly applied)"),
        }),
        Err(error) => {
            checks.push(SmokeCheck {
                name: "migration_visibility",
                status: SmokeStatus::Fail,
                elapsed_ms: migration_started.elapsed().as_millis() as u64,
                message: format!("migration execution failed: {error}"),
            });
            checks.push(skipped("workflow_round_trip"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    }

    // The round trip runs against a throwaway in-memory database so a smoke
    // run never writes workflow state into the configured one.
    let round_trip_started = Instant::now();
    let round_trip_result = runtime.block_on(workflow_round_trip());
    match round_trip_result {
        Ok(message) => checks.push(SmokeCheck {
            name: "workflow_round_trip",
            status: SmokeStatus::Pass,
            elapsed_ms: round_trip_started.elapsed().as_millis() as u64,
            message,
        }),
        Err(error) => checks.push(SmokeCheck {
            name: "workflow_round_trip",
            status: SmokeStatus::Fail,
            elapsed_ms: round_trip_started.elapsed().as_millis() as u64,
            message: error,
        }),
    }

    finalize_report(checks, started.elapsed().as_millis() as u64)
}

/// Drives the mid-tier demo contract through its full two-step chain:
/// submit, county approval, city approval, completed.
async fn workflow_round_trip() -> Result<String, String> {
    const CONTRACT: ContractId = ContractId(1);
    const REQUESTER: UserId = UserId(1);

    let pool = connect_with_settings("sqlite::memory:", 1, 30)
        .await
        .map_err(|error| format!("in-memory connect failed: {error}"))?;
    migrations::run_pending(&pool)
        .await
        .map_err(|error| format!("in-memory migration failed: {error}"))?;
    DemoDataset::load(&pool).await.map_err(|error| format!("demo seed failed: {error}"))?;

    let service = WorkflowService::new(pool.clone());

    let (instance, first_task) = service
        .submit(CONTRACT, REQUESTER)
        .await
        .map_err(|error| format!("submit failed: {error}"))?;
    let first_task =
        first_task.ok_or_else(|| "submit opened no task for the first step".to_string())?;

    let outcome = service
        .decide(first_task.id, first_task.assignee_id, Decision::Approve { comment: None })
        .await
        .map_err(|error| format!("first approval failed: {error}"))?;
    let second_task = match outcome {
        DecisionOutcome::Advanced { next_task } => next_task,
        other => return Err(format!("expected advance after first approval, got {other:?}")),
    };

    let outcome = service
        .decide(second_task.id, second_task.assignee_id, Decision::Approve { comment: None })
        .await
        .map_err(|error| format!("second approval failed: {error}"))?;
    if !matches!(outcome, DecisionOutcome::Completed) {
        return Err(format!("expected completion after final approval, got {outcome:?}"));
    }

    pool.close().await;
    Ok(format!(
        "scenario {} completed in {} steps on an in-memory database",
        instance.scenario_id.0, second_task.step_order
    ))
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((started.elapsed().as_millis() as u64, value)),
        Err(error) => Err((started.elapsed().as_millis() as u64, error)),
    }
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due previous failure".to_string(),
    }
}

fn finalize_report(checks: Vec<SmokeCheck>, total_elapsed_ms: u64) -> CommandResult {
    let passed = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status == SmokeStatus::Fail);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let human = report.summary.clone();
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult { exit_code: if failed { 6 } else { 0 }, output: format!("{human}\n{machine}") }
}
