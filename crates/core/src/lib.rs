pub mod catalog;
pub mod config;
pub mod domain;
pub mod lifecycle;
pub mod org;
pub mod resolver;

pub use catalog::{validate_catalog, CatalogError, ScenarioCatalog};
pub use domain::contract::{ContractId, ContractRecord, ContractStatus};
pub use domain::instance::{
    ApprovalInstance, ApprovalTask, InstanceId, InstanceSnapshot, InstanceStatus, TaskId,
    TaskStatus,
};
pub use domain::org::{OrgLevel, OrgUnit, UnitId};
pub use domain::role::{Role, RoleCategory};
pub use domain::scenario::{ApprovalLevel, ScenarioDefinition, ScenarioId, ScenarioStep};
pub use domain::user::{UserAccount, UserId};
pub use lifecycle::{Decision, DecisionEffect, LifecycleError};
pub use org::OrgDirectory;
pub use resolver::{ApproverResolver, Roster, RoutingError};
