use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScenarioId(pub String);

/// How far up the org tree a step's approver is resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalLevel {
    County,
    City,
    Province,
}

impl ApprovalLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::County => "county",
            Self::City => "city",
            Self::Province => "province",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "county" => Some(Self::County),
            "city" => Some(Self::City),
            "province" => Some(Self::Province),
            _ => None,
        }
    }
}

/// One row of the scenario rule table: a contract sub-type plus an amount tier
/// selects an ordered list of approval steps.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    pub scenario_id: ScenarioId,
    pub sub_type_code: String,
    pub sub_type_name: String,
    /// Inclusive lower bound.
    pub amount_min: Decimal,
    /// Exclusive upper bound; `None` means unbounded.
    pub amount_max: Option<Decimal>,
    pub fast_track: bool,
    pub active: bool,
}

impl ScenarioDefinition {
    pub fn contains(&self, amount: Decimal) -> bool {
        self.amount_min <= amount && self.amount_max.map_or(true, |max| amount < max)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioStep {
    pub scenario_id: ScenarioId,
    /// 1-based position in the scenario; contiguous, no gaps or duplicates.
    pub order: u32,
    pub role_code: String,
    pub level: ApprovalLevel,
    pub name: String,
    pub mandatory: bool,
    pub skippable: bool,
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{ApprovalLevel, ScenarioDefinition, ScenarioId};

    fn definition(min: i64, max: Option<i64>) -> ScenarioDefinition {
        ScenarioDefinition {
            scenario_id: ScenarioId("B2-001".to_string()),
            sub_type_code: "B2".to_string(),
            sub_type_name: "Base Station Maintenance".to_string(),
            amount_min: Decimal::new(min, 0),
            amount_max: max.map(|value| Decimal::new(value, 0)),
            fast_track: false,
            active: true,
        }
    }

    #[test]
    fn range_is_inclusive_below_exclusive_above() {
        let tier = definition(10_000, Some(50_000));
        assert!(tier.contains(Decimal::new(10_000, 0)));
        assert!(tier.contains(Decimal::new(49_999, 0)));
        assert!(!tier.contains(Decimal::new(50_000, 0)));
        assert!(!tier.contains(Decimal::new(9_999, 0)));
    }

    #[test]
    fn unbounded_range_accepts_any_amount_above_min() {
        let tier = definition(50_000, None);
        assert!(tier.contains(Decimal::new(50_000, 0)));
        assert!(tier.contains(Decimal::new(10_000_000, 0)));
        assert!(!tier.contains(Decimal::new(49_999, 0)));
    }

    #[test]
    fn approval_level_round_trips_through_strings() {
        for level in [ApprovalLevel::County, ApprovalLevel::City, ApprovalLevel::Province] {
            assert_eq!(ApprovalLevel::parse(level.as_str()), Some(level));
        }
        assert_eq!(ApprovalLevel::parse("region"), None);
    }
}
