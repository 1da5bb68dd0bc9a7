use sqlx::{Row, Sqlite, Transaction};

use tierflow_core::domain::scenario::{
    ApprovalLevel, ScenarioDefinition, ScenarioId, ScenarioStep,
};
use tierflow_core::{validate_catalog, ScenarioCatalog};

use super::{parse_decimal, RepositoryError, ScenarioRepository};
use crate::DbPool;

pub struct SqlScenarioRepository {
    pool: DbPool,
}

impl SqlScenarioRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_definition(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<ScenarioDefinition, RepositoryError> {
    let scenario_id: String =
        row.try_get("scenario_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let sub_type_code: String =
        row.try_get("sub_type_code").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let sub_type_name: String =
        row.try_get("sub_type_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let amount_min_str: String =
        row.try_get("amount_min").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let amount_max_str: Option<String> =
        row.try_get("amount_max").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let fast_track: bool =
        row.try_get("fast_track").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let active: bool =
        row.try_get("active").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(ScenarioDefinition {
        scenario_id: ScenarioId(scenario_id),
        sub_type_code,
        sub_type_name,
        amount_min: parse_decimal(&amount_min_str)?,
        amount_max: amount_max_str.as_deref().map(parse_decimal).transpose()?,
        fast_track,
        active,
    })
}

fn row_to_step(row: &sqlx::sqlite::SqliteRow) -> Result<ScenarioStep, RepositoryError> {
    let scenario_id: String =
        row.try_get("scenario_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let step_order: i64 =
        row.try_get("step_order").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let role_code: String =
        row.try_get("role_code").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let level_str: String =
        row.try_get("level").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let mandatory: bool =
        row.try_get("mandatory").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let skippable: bool =
        row.try_get("skippable").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let level = ApprovalLevel::parse(&level_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown approval level `{level_str}`")))?;

    Ok(ScenarioStep {
        scenario_id: ScenarioId(scenario_id),
        order: step_order as u32,
        role_code,
        level,
        name,
        mandatory,
        skippable,
    })
}

const DEFINITION_COLUMNS: &str =
    "scenario_id, sub_type_code, sub_type_name, amount_min, amount_max, fast_track, active";
const STEP_COLUMNS: &str =
    "scenario_id, step_order, role_code, level, name, mandatory, skippable";

pub(crate) async fn load_catalog_tx(
    tx: &mut Transaction<'_, Sqlite>,
) -> Result<ScenarioCatalog, RepositoryError> {
    let definition_rows: Vec<sqlx::sqlite::SqliteRow> =
        sqlx::query(&format!("SELECT {DEFINITION_COLUMNS} FROM scenario_definition"))
            .fetch_all(&mut **tx)
            .await?;
    let step_rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
        "SELECT {STEP_COLUMNS} FROM scenario_step ORDER BY scenario_id, step_order"
    ))
    .fetch_all(&mut **tx)
    .await?;

    let definitions =
        definition_rows.iter().map(row_to_definition).collect::<Result<Vec<_>, _>>()?;
    let steps = step_rows.iter().map(row_to_step).collect::<Result<Vec<_>, _>>()?;
    Ok(ScenarioCatalog::new(definitions, steps))
}

fn validate_tx_catalog(catalog: &ScenarioCatalog) -> Result<(), RepositoryError> {
    validate_catalog(catalog).map_err(|errors| {
        let joined =
            errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ");
        RepositoryError::CatalogInvalid(joined)
    })
}

#[async_trait::async_trait]
impl ScenarioRepository for SqlScenarioRepository {
    async fn load_catalog(&self) -> Result<ScenarioCatalog, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let catalog = load_catalog_tx(&mut tx).await?;
        tx.commit().await?;
        Ok(catalog)
    }

    async fn find_definition(
        &self,
        id: &ScenarioId,
    ) -> Result<Option<ScenarioDefinition>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {DEFINITION_COLUMNS} FROM scenario_definition WHERE scenario_id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_definition(r)?)),
            None => Ok(None),
        }
    }

    async fn upsert_scenario(
        &self,
        definition: ScenarioDefinition,
        steps: Vec<ScenarioStep>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO scenario_definition
                 (scenario_id, sub_type_code, sub_type_name, amount_min, amount_max, fast_track, active)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(scenario_id) DO UPDATE SET
                 sub_type_code = excluded.sub_type_code,
                 sub_type_name = excluded.sub_type_name,
                 amount_min = excluded.amount_min,
                 amount_max = excluded.amount_max,
                 fast_track = excluded.fast_track,
                 active = excluded.active",
        )
        .bind(&definition.scenario_id.0)
        .bind(&definition.sub_type_code)
        .bind(&definition.sub_type_name)
        .bind(definition.amount_min.to_string())
        .bind(definition.amount_max.map(|max| max.to_string()))
        .bind(definition.fast_track)
        .bind(definition.active)
        .execute(&mut *tx)
        .await?;

        // The step chain is replaced wholesale; partial edits are how gaps
        // sneak in.
        sqlx::query("DELETE FROM scenario_step WHERE scenario_id = ?")
            .bind(&definition.scenario_id.0)
            .execute(&mut *tx)
            .await?;
        for step in &steps {
            sqlx::query(
                "INSERT INTO scenario_step
                     (scenario_id, step_order, role_code, level, name, mandatory, skippable)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&definition.scenario_id.0)
            .bind(step.order as i64)
            .bind(&step.role_code)
            .bind(step.level.as_str())
            .bind(&step.name)
            .bind(step.mandatory)
            .bind(step.skippable)
            .execute(&mut *tx)
            .await?;
        }

        let catalog = load_catalog_tx(&mut tx).await?;
        validate_tx_catalog(&catalog)?;

        tx.commit().await?;
        Ok(())
    }

    async fn replace_sub_type(
        &self,
        sub_type_code: &str,
        scenarios: Vec<(ScenarioDefinition, Vec<ScenarioStep>)>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM scenario_step WHERE scenario_id IN
                 (SELECT scenario_id FROM scenario_definition WHERE sub_type_code = ?)",
        )
        .bind(sub_type_code)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM scenario_definition WHERE sub_type_code = ?")
            .bind(sub_type_code)
            .execute(&mut *tx)
            .await?;

        for (definition, steps) in &scenarios {
            if definition.sub_type_code != sub_type_code {
                return Err(RepositoryError::Conflict(format!(
                    "scenario {} belongs to sub-type {}, not {sub_type_code}",
                    definition.scenario_id.0, definition.sub_type_code
                )));
            }
            sqlx::query(
                "INSERT INTO scenario_definition
                     (scenario_id, sub_type_code, sub_type_name, amount_min, amount_max, fast_track, active)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&definition.scenario_id.0)
            .bind(&definition.sub_type_code)
            .bind(&definition.sub_type_name)
            .bind(definition.amount_min.to_string())
            .bind(definition.amount_max.map(|max| max.to_string()))
            .bind(definition.fast_track)
            .bind(definition.active)
            .execute(&mut *tx)
            .await?;
            for step in steps {
                sqlx::query(
                    "INSERT INTO scenario_step
                         (scenario_id, step_order, role_code, level, name, mandatory, skippable)
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&definition.scenario_id.0)
                .bind(step.order as i64)
                .bind(&step.role_code)
                .bind(step.level.as_str())
                .bind(&step.name)
                .bind(step.mandatory)
                .bind(step.skippable)
                .execute(&mut *tx)
                .await?;
            }
        }

        let catalog = load_catalog_tx(&mut tx).await?;
        validate_tx_catalog(&catalog)?;

        tx.commit().await?;
        Ok(())
    }

    async fn set_active(&self, id: &ScenarioId, active: bool) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE scenario_definition SET active = ? WHERE scenario_id = ?")
            .bind(active)
            .bind(&id.0)
            .execute(&mut *tx)
            .await?;

        let catalog = load_catalog_tx(&mut tx).await?;
        validate_tx_catalog(&catalog)?;

        tx.commit().await?;
        Ok(())
    }

    async fn next_scenario_id(&self, sub_type_code: &str) -> Result<ScenarioId, RepositoryError> {
        let prefix = format!("{sub_type_code}-");
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT scenario_id FROM scenario_definition WHERE scenario_id LIKE ? || '%'",
        )
        .bind(&prefix)
        .fetch_all(&self.pool)
        .await?;

        let max_serial = rows
            .iter()
            .filter_map(|row| row.try_get::<String, _>("scenario_id").ok())
            .filter_map(|id| id.strip_prefix(&prefix)?.parse::<u32>().ok())
            .max()
            .unwrap_or(0);

        Ok(ScenarioId(format!("{sub_type_code}-{:03}", max_serial + 1)))
    }
}
