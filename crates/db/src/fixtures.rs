use sqlx::Executor;

use tierflow_core::validate_catalog;

use crate::connection::DbPool;
use crate::repositories::{RepositoryError, ScenarioRepository, SqlScenarioRepository};

/// Contracts the demo dataset seeds, with the scenario each should match.
const SEED_CONTRACTS: &[ContractSeed] = &[
    ContractSeed {
        contract_id: 1,
        name: "County C fiber maintenance",
        amount: "45000",
        expected_scenario: "B2-002",
        description: "mid-tier amount, two-step chain ending at the city",
    },
    ContractSeed {
        contract_id: 2,
        name: "Microcell tower lease",
        amount: "8000",
        expected_scenario: "B2-001",
        description: "fast-track amount, single county step",
    },
    ContractSeed {
        contract_id: 3,
        name: "Backbone capacity upgrade",
        amount: "2000000",
        expected_scenario: "B2-003",
        description: "large amount, full three-step chain up to the province",
    },
];

struct ContractSeed {
    contract_id: i64,
    name: &'static str,
    amount: &'static str,
    expected_scenario: &'static str,
    description: &'static str,
}

pub struct SeedResult {
    pub contracts_seeded: Vec<ContractSeedInfo>,
}

pub struct ContractSeedInfo {
    pub contract_id: i64,
    pub name: &'static str,
    pub description: &'static str,
}

pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

/// Demo dataset for driving the workflow end to end: a one-province org
/// tree, four roles, five users, the three-tier B2 scenario chain, and
/// three draft contracts that each land in a different tier.
pub struct DemoDataset;

impl DemoDataset {
    /// SQL fixture content for the demo dataset.
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed_data.sql");

    /// Load the demo dataset into the database.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let contracts_seeded = SEED_CONTRACTS
            .iter()
            .map(|contract| ContractSeedInfo {
                contract_id: contract.contract_id,
                name: contract.name,
                description: contract.description,
            })
            .collect::<Vec<_>>();

        Ok(SeedResult { contracts_seeded })
    }

    /// Verify that seed data exists and matches the contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for (label, table, expected) in [
            ("org-units", "org_unit", 6i64),
            ("roles", "role", 4),
            ("users", "user_account", 5),
            ("scenario-definitions", "scenario_definition", 3),
            ("scenario-steps", "scenario_step", 6),
        ] {
            let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(1) FROM {table}"))
                .fetch_one(pool)
                .await?;
            checks.push((label, count == expected));
        }

        for contract in SEED_CONTRACTS {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM contract
                     WHERE id = ?1 AND name = ?2 AND amount = ?3 AND status = 'draft')",
            )
            .bind(contract.contract_id)
            .bind(contract.name)
            .bind(contract.amount)
            .fetch_one(pool)
            .await?;
            checks.push((contract.name, exists == 1));
        }

        let repo = SqlScenarioRepository::new(pool.clone());
        let catalog = repo.load_catalog().await?;
        checks.push(("catalog-validates", validate_catalog(&catalog).is_ok()));
        for contract in SEED_CONTRACTS {
            let amount =
                crate::repositories::parse_decimal(contract.amount).unwrap_or_default();
            let matched = catalog
                .match_scenario("B2", amount)
                .map(|definition| definition.scenario_id.0 == contract.expected_scenario)
                .unwrap_or(false);
            checks.push((contract.expected_scenario, matched));
        }

        let all_present = checks.iter().all(|(_, exists)| *exists);
        Ok(VerificationResult { all_present, checks })
    }
}
