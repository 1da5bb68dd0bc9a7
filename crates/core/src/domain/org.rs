use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub i64);

/// Position of a unit in the province/city/county legal hierarchy. `Dept` is a
/// functional department attached under a city or county company.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrgLevel {
    Province,
    City,
    County,
    Dept,
}

impl OrgLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Province => "province",
            Self::City => "city",
            Self::County => "county",
            Self::Dept => "dept",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "province" => Some(Self::Province),
            "city" => Some(Self::City),
            "county" => Some(Self::County),
            "dept" => Some(Self::Dept),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgUnit {
    pub id: UnitId,
    /// `None` only for the root unit (the province company).
    pub parent_id: Option<UnitId>,
    pub name: String,
    /// Hyphen-delimited short code, e.g. `CITY-A-NET`. The last segment encodes
    /// the functional family for department units.
    pub code: String,
    /// Explicit functional family keyword (`NET`, `LEGAL`, `FIN`, ...). When
    /// absent the family is derived from `code` as a migration shim.
    pub family: Option<String>,
    pub level: OrgLevel,
    pub manager_id: Option<UserId>,
    pub sort_order: i32,
    pub deleted: bool,
}

impl OrgUnit {
    pub fn functional_family(&self) -> Option<&str> {
        self.family.as_deref().or_else(|| family_from_code(&self.code))
    }
}

/// Migration shim for org data that predates the explicit `family` column:
/// the family keyword is the segment after the last hyphen of the short code.
pub fn family_from_code(code: &str) -> Option<&str> {
    let (_, suffix) = code.rsplit_once('-')?;
    if suffix.is_empty() {
        None
    } else {
        Some(suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::{family_from_code, OrgLevel, OrgUnit, UnitId};

    fn unit(code: &str, family: Option<&str>) -> OrgUnit {
        OrgUnit {
            id: UnitId(1),
            parent_id: None,
            name: "Test Unit".to_string(),
            code: code.to_string(),
            family: family.map(str::to_string),
            level: OrgLevel::Dept,
            manager_id: None,
            sort_order: 0,
            deleted: false,
        }
    }

    #[test]
    fn explicit_family_wins_over_code_suffix() {
        let unit = unit("CITY-A-NET", Some("LEGAL"));
        assert_eq!(unit.functional_family(), Some("LEGAL"));
    }

    #[test]
    fn family_falls_back_to_code_suffix() {
        let unit = unit("COUNTY-C-NET", None);
        assert_eq!(unit.functional_family(), Some("NET"));
    }

    #[test]
    fn code_without_hyphen_has_no_family() {
        assert_eq!(family_from_code("PROVINCE"), None);
        assert_eq!(family_from_code("CITY-"), None);
        assert_eq!(unit("PROVINCE", None).functional_family(), None);
    }

    #[test]
    fn org_level_round_trips_through_strings() {
        for level in [OrgLevel::Province, OrgLevel::City, OrgLevel::County, OrgLevel::Dept] {
            assert_eq!(OrgLevel::parse(level.as_str()), Some(level));
        }
        assert_eq!(OrgLevel::parse("campus"), None);
    }
}
