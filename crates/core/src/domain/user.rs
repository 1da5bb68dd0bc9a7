use serde::{Deserialize, Serialize};

use crate::domain::org::UnitId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

/// Minimal account record the routing core consumes: a user is eligible for a
/// step when active, holding the step's role, and sitting in the resolved unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: UserId,
    pub name: String,
    pub role_code: String,
    pub unit_id: UnitId,
    pub active: bool,
}
