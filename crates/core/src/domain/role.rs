use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleCategory {
    Business,
    Technical,
    Legal,
    Finance,
    Management,
}

impl RoleCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Business => "business",
            Self::Technical => "technical",
            Self::Legal => "legal",
            Self::Finance => "finance",
            Self::Management => "management",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "business" => Some(Self::Business),
            "technical" => Some(Self::Technical),
            "legal" => Some(Self::Legal),
            "finance" => Some(Self::Finance),
            "management" => Some(Self::Management),
            _ => None,
        }
    }
}

/// Named approval role. Immutable reference data; a role optionally requires
/// its holders to sit in a department of a given functional family.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub code: String,
    pub name: String,
    pub category: RoleCategory,
    pub dept_family_required: Option<String>,
}
