use sqlx::Row;

use tierflow_core::domain::contract::{ContractId, ContractRecord, ContractStatus};

use super::{parse_decimal, ContractRepository, RepositoryError};
use crate::DbPool;

pub struct SqlContractRepository {
    pool: DbPool,
}

impl SqlContractRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn row_to_contract(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<ContractRecord, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let sub_type_code: String =
        row.try_get("sub_type_code").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let amount_str: String =
        row.try_get("amount").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let status = ContractStatus::parse(&status_str).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown contract status `{status_str}`"))
    })?;

    Ok(ContractRecord {
        id: ContractId(id),
        name,
        sub_type_code,
        amount: parse_decimal(&amount_str)?,
        status,
    })
}

#[async_trait::async_trait]
impl ContractRepository for SqlContractRepository {
    async fn find_by_id(&self, id: ContractId) -> Result<Option<ContractRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, sub_type_code, amount, status FROM contract WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_contract(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, contract: ContractRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO contract (id, name, sub_type_code, amount, status)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 sub_type_code = excluded.sub_type_code,
                 amount = excluded.amount,
                 status = excluded.status",
        )
        .bind(contract.id.0)
        .bind(&contract.name)
        .bind(&contract.sub_type_code)
        .bind(contract.amount.to_string())
        .bind(contract.status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use tierflow_core::domain::contract::{ContractId, ContractRecord, ContractStatus};

    use super::SqlContractRepository;
    use crate::repositories::ContractRepository;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn save_and_find_round_trips_decimal_amounts() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlContractRepository::new(pool);

        let contract = ContractRecord {
            id: ContractId(1),
            name: "Tower lease renewal".to_string(),
            sub_type_code: "B2".to_string(),
            amount: Decimal::new(4_500_075, 2),
            status: ContractStatus::Draft,
        };
        repo.save(contract.clone()).await.expect("save");

        let found = repo.find_by_id(ContractId(1)).await.expect("find").expect("exists");
        assert_eq!(found.amount, Decimal::new(4_500_075, 2));
        assert_eq!(found.status, ContractStatus::Draft);
        assert!(repo.find_by_id(ContractId(99)).await.expect("find").is_none());
    }
}
