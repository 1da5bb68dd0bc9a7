//! Approver resolution: given a requester's position in the org tree and a
//! scenario step, find the concrete user who should receive the step's task.
//!
//! Resolution is two-phase. First the step's level is climbed from the
//! requester's unit to a scope company (city or province; a county step stays
//! in the requester's own unit), and the requester's functional family picks
//! the sibling department under the scope. Then the roster is filtered to
//! active holders of the step's role inside that unit, ranked by open task
//! count so work spreads across peers.

use std::collections::HashMap;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::warn;

use crate::domain::org::{OrgLevel, OrgUnit, UnitId};
use crate::domain::role::Role;
use crate::domain::scenario::{ApprovalLevel, ScenarioStep};
use crate::domain::user::{UserAccount, UserId};
use crate::org::OrgDirectory;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("no scenario covers sub-type {sub_type} at amount {amount}")]
    NoScenario { sub_type: String, amount: Decimal },
    #[error("no unit at level {level:?} encloses unit {unit_id:?}")]
    ScopeNotFound { unit_id: UnitId, level: ApprovalLevel },
    #[error("no eligible approver holds role {role_code} for step {step_order}")]
    NoEligibleApprover { role_code: String, level: ApprovalLevel, step_order: u32 },
}

/// Everyone who could receive a task, plus how loaded they already are.
#[derive(Clone, Debug, Default)]
pub struct Roster {
    pub roles: HashMap<String, Role>,
    pub users: Vec<UserAccount>,
    /// Pending task count per user; absent means zero.
    pub open_tasks: HashMap<UserId, u32>,
}

impl Roster {
    pub fn open_count(&self, user: UserId) -> u32 {
        self.open_tasks.get(&user).copied().unwrap_or(0)
    }
}

pub struct ApproverResolver<'a> {
    directory: &'a OrgDirectory,
    roster: &'a Roster,
}

impl<'a> ApproverResolver<'a> {
    pub fn new(directory: &'a OrgDirectory, roster: &'a Roster) -> Self {
        Self { directory, roster }
    }

    fn scope_level(level: ApprovalLevel) -> Option<OrgLevel> {
        match level {
            ApprovalLevel::County => None,
            ApprovalLevel::City => Some(OrgLevel::City),
            ApprovalLevel::Province => Some(OrgLevel::Province),
        }
    }

    /// Unit the step's task should be routed into. A county step stays in the
    /// requester's own unit. A city or province step climbs to the enclosing
    /// company at that level, then descends into the sibling department whose
    /// functional family matches the requester's own; a missing sibling falls
    /// back to the company itself rather than failing the route.
    pub fn resolve_target_unit(
        &self,
        requester_unit: UnitId,
        step: &ScenarioStep,
    ) -> Result<&'a OrgUnit, RoutingError> {
        let initiator = self
            .directory
            .get(requester_unit)
            .ok_or(RoutingError::ScopeNotFound { unit_id: requester_unit, level: step.level })?;
        let Some(scope_level) = Self::scope_level(step.level) else {
            return Ok(initiator);
        };

        let scope = self
            .directory
            .enclosing(requester_unit, scope_level)
            .ok_or(RoutingError::ScopeNotFound { unit_id: requester_unit, level: step.level })?;

        let Some(family) = initiator.functional_family() else {
            return Ok(scope);
        };
        let required = self
            .roster
            .roles
            .get(&step.role_code)
            .and_then(|role| role.dept_family_required.as_deref());

        let sibling = self
            .directory
            .functional_dept_under(scope.id, family)
            .filter(|dept| required.map_or(true, |req| dept.functional_family() == Some(req)));
        match sibling {
            Some(dept) => Ok(dept),
            None => {
                warn!(
                    scope = %scope.code,
                    family,
                    role = %step.role_code,
                    "no sibling department matches the requester's family; routing to the company"
                );
                Ok(scope)
            }
        }
    }

    /// Active holders of the step's role in the target unit, least-loaded
    /// first, ties broken by id. City-level steps with an empty target widen
    /// to the departments directly under the city before giving up; county
    /// companies and their departments stay out of reach.
    pub fn find_candidates(
        &self,
        target: &OrgUnit,
        step: &ScenarioStep,
    ) -> Vec<&'a UserAccount> {
        let mut candidates = self.holders_in(step, |user| user.unit_id == target.id);

        if candidates.is_empty() && step.level == ApprovalLevel::City {
            let city = self.directory.enclosing(target.id, OrgLevel::City);
            if let Some(city) = city {
                candidates = self.holders_in(step, |user| {
                    user.unit_id == city.id
                        || self
                            .directory
                            .get(user.unit_id)
                            .is_some_and(|unit| unit.parent_id == Some(city.id))
                });
                if !candidates.is_empty() {
                    warn!(
                        target = %target.code,
                        city = %city.code,
                        role = %step.role_code,
                        "no role holder in the target department; widened to the city's direct departments"
                    );
                }
            }
        }

        candidates.sort_by_key(|user| (self.roster.open_count(user.id), user.id));
        candidates
    }

    fn holders_in(
        &self,
        step: &ScenarioStep,
        in_scope: impl Fn(&UserAccount) -> bool,
    ) -> Vec<&'a UserAccount> {
        self.roster
            .users
            .iter()
            .filter(|user| user.active && user.role_code == step.role_code && in_scope(user))
            .collect()
    }

    pub fn resolve_candidates(
        &self,
        requester_unit: UnitId,
        step: &ScenarioStep,
    ) -> Result<Vec<&'a UserAccount>, RoutingError> {
        let target = self.resolve_target_unit(requester_unit, step)?;
        let candidates = self.find_candidates(target, step);
        if candidates.is_empty() {
            return Err(RoutingError::NoEligibleApprover {
                role_code: step.role_code.clone(),
                level: step.level,
                step_order: step.order,
            });
        }
        Ok(candidates)
    }

    /// The single user the step's task is assigned to.
    pub fn resolve_approver(
        &self,
        requester_unit: UnitId,
        step: &ScenarioStep,
    ) -> Result<&'a UserAccount, RoutingError> {
        let candidates = self.resolve_candidates(requester_unit, step)?;
        Ok(candidates[0])
    }
}
