use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use tierflow_core::domain::contract::{ContractId, ContractRecord};
use tierflow_core::domain::org::{OrgUnit, UnitId};
use tierflow_core::domain::role::Role;
use tierflow_core::domain::scenario::{ScenarioDefinition, ScenarioId, ScenarioStep};
use tierflow_core::domain::user::{UserAccount, UserId};
use tierflow_core::ScenarioCatalog;

pub mod contract;
pub mod instance;
pub mod org;
pub mod role;
pub mod scenario;
pub mod user;

pub use contract::SqlContractRepository;
pub use instance::SqlInstanceRepository;
pub use org::SqlOrgRepository;
pub use role::SqlRoleRepository;
pub use scenario::SqlScenarioRepository;
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("catalog validation failed: {0}")]
    CatalogInvalid(String),
}

#[async_trait]
pub trait OrgRepository: Send + Sync {
    async fn find_unit(&self, id: UnitId) -> Result<Option<OrgUnit>, RepositoryError>;
    async fn list_units(&self) -> Result<Vec<OrgUnit>, RepositoryError>;
    async fn save_unit(&self, unit: OrgUnit) -> Result<(), RepositoryError>;
    /// Soft delete. Refuses units that still have live children or users.
    async fn delete_unit(&self, id: UnitId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn find(&self, code: &str) -> Result<Option<Role>, RepositoryError>;
    async fn list(&self) -> Result<Vec<Role>, RepositoryError>;
    async fn save(&self, role: Role) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Result<Option<UserAccount>, RepositoryError>;
    async fn list_active(&self) -> Result<Vec<UserAccount>, RepositoryError>;
    async fn save(&self, user: UserAccount) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ScenarioRepository: Send + Sync {
    async fn load_catalog(&self) -> Result<ScenarioCatalog, RepositoryError>;
    async fn find_definition(
        &self,
        id: &ScenarioId,
    ) -> Result<Option<ScenarioDefinition>, RepositoryError>;
    /// Writes the definition and its full step chain, then re-validates the
    /// whole catalog; an edit that breaks coverage is rolled back.
    async fn upsert_scenario(
        &self,
        definition: ScenarioDefinition,
        steps: Vec<ScenarioStep>,
    ) -> Result<(), RepositoryError>;
    /// Replaces every tier of a sub-type in one transaction. Multi-tier
    /// chains can only be built this way: each tier on its own would fail
    /// coverage validation.
    async fn replace_sub_type(
        &self,
        sub_type_code: &str,
        scenarios: Vec<(ScenarioDefinition, Vec<ScenarioStep>)>,
    ) -> Result<(), RepositoryError>;
    async fn set_active(&self, id: &ScenarioId, active: bool) -> Result<(), RepositoryError>;
    /// Next free id for a sub-type, in `SUBTYPE-NNN` form.
    async fn next_scenario_id(&self, sub_type_code: &str) -> Result<ScenarioId, RepositoryError>;
}

#[async_trait]
pub trait ContractRepository: Send + Sync {
    async fn find_by_id(&self, id: ContractId) -> Result<Option<ContractRecord>, RepositoryError>;
    async fn save(&self, contract: ContractRecord) -> Result<(), RepositoryError>;
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("bad timestamp `{value}`: {e}")))
}

pub(crate) fn parse_opt_timestamp(
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.as_deref().map(parse_timestamp).transpose()
}

pub(crate) fn parse_decimal(value: &str) -> Result<Decimal, RepositoryError> {
    use std::str::FromStr;
    Decimal::from_str(value)
        .map_err(|e| RepositoryError::Decode(format!("bad decimal `{value}`: {e}")))
}
