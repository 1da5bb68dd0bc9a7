use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractStatus {
    Draft,
    InReview,
    Effective,
    Rejected,
}

impl ContractStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::InReview => "in_review",
            Self::Effective => "effective",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "in_review" => Some(Self::InReview),
            "effective" => Some(Self::Effective),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Only drafts and previously rejected contracts may be (re)submitted.
    pub fn submittable(&self) -> bool {
        matches!(self, Self::Draft | Self::Rejected)
    }
}

/// The slice of a contract the approval core reads and writes. Everything else
/// about contracts lives with the contract-lifecycle collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub id: ContractId,
    pub name: String,
    pub sub_type_code: String,
    pub amount: Decimal,
    pub status: ContractStatus,
}
