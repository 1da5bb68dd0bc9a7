//! Scenario catalog: the rule table that maps (contract sub-type, amount) to
//! an ordered chain of approval steps, plus the validator that keeps the table
//! coherent whenever an administrator edits it.

use std::collections::HashMap;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::warn;

use crate::domain::scenario::{ScenarioDefinition, ScenarioId, ScenarioStep};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("scenario {0:?} has an empty amount range")]
    EmptyRange(ScenarioId),
    #[error("sub-type {sub_type} ranges {first:?} and {second:?} overlap")]
    RangeOverlap { sub_type: String, first: ScenarioId, second: ScenarioId },
    #[error("sub-type {sub_type} has a gap between {below:?} and {above:?}")]
    RangeGap { sub_type: String, below: ScenarioId, above: ScenarioId },
    #[error("sub-type {sub_type} does not cover amounts from zero")]
    UncoveredLowEnd { sub_type: String },
    #[error("sub-type {sub_type} top range {scenario:?} is bounded; large amounts would not match")]
    BoundedHighEnd { sub_type: String, scenario: ScenarioId },
    #[error("scenario {scenario:?} steps are not contiguous from 1 (found order {order})")]
    NonContiguousSteps { scenario: ScenarioId, order: u32 },
}

#[derive(Clone, Debug, Default)]
pub struct ScenarioCatalog {
    definitions: Vec<ScenarioDefinition>,
    steps: HashMap<ScenarioId, Vec<ScenarioStep>>,
}

impl ScenarioCatalog {
    pub fn new(
        definitions: Vec<ScenarioDefinition>,
        steps: impl IntoIterator<Item = ScenarioStep>,
    ) -> Self {
        let mut by_scenario: HashMap<ScenarioId, Vec<ScenarioStep>> = HashMap::new();
        for step in steps {
            by_scenario.entry(step.scenario_id.clone()).or_default().push(step);
        }
        for chain in by_scenario.values_mut() {
            chain.sort_by_key(|step| step.order);
        }
        Self { definitions, steps: by_scenario }
    }

    pub fn definitions(&self) -> &[ScenarioDefinition] {
        &self.definitions
    }

    pub fn definition(&self, id: &ScenarioId) -> Option<&ScenarioDefinition> {
        self.definitions.iter().find(|definition| &definition.scenario_id == id)
    }

    /// Picks the active scenario whose sub-type matches and whose amount tier
    /// contains `amount`. A validated catalog yields at most one match; if the
    /// table is mid-edit and ambiguous, the tier with the lowest lower bound
    /// wins and the ambiguity is logged.
    pub fn match_scenario(
        &self,
        sub_type_code: &str,
        amount: Decimal,
    ) -> Option<&ScenarioDefinition> {
        let mut matches: Vec<&ScenarioDefinition> = self
            .definitions
            .iter()
            .filter(|definition| {
                definition.active
                    && definition.sub_type_code == sub_type_code
                    && definition.contains(amount)
            })
            .collect();
        matches.sort_by_key(|definition| definition.amount_min);
        if matches.len() > 1 {
            warn!(
                sub_type = sub_type_code,
                %amount,
                candidates = matches.len(),
                chosen = %matches[0].scenario_id.0,
                "ambiguous scenario match; catalog ranges overlap"
            );
        }
        matches.first().copied()
    }

    pub fn steps(&self, id: &ScenarioId) -> &[ScenarioStep] {
        self.steps.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn total_steps(&self, id: &ScenarioId) -> u32 {
        self.steps(id).len() as u32
    }

    /// Step after `current_order`, or the first step when `current_order` is 0.
    pub fn next_step(&self, id: &ScenarioId, current_order: u32) -> Option<&ScenarioStep> {
        self.steps(id).iter().find(|step| step.order == current_order + 1)
    }

    pub fn is_last_step(&self, id: &ScenarioId, order: u32) -> bool {
        order >= self.total_steps(id)
    }
}

/// Full-table validation, run on load and after every administrative edit.
///
/// Per sub-type the active tiers must partition `[0, inf)`: the first starts
/// at zero, each upper bound equals the next lower bound, and the last tier is
/// unbounded. Per scenario the steps must run 1..=N without gaps. A scenario
/// with no steps is legal and completes on submit.
pub fn validate_catalog(catalog: &ScenarioCatalog) -> Result<(), Vec<CatalogError>> {
    let mut errors = Vec::new();

    let mut by_sub_type: HashMap<&str, Vec<&ScenarioDefinition>> = HashMap::new();
    for definition in catalog.definitions() {
        if let Some(max) = definition.amount_max {
            if max <= definition.amount_min {
                errors.push(CatalogError::EmptyRange(definition.scenario_id.clone()));
            }
        }
        if definition.active {
            by_sub_type.entry(definition.sub_type_code.as_str()).or_default().push(definition);
        }
    }

    for (sub_type, mut tiers) in by_sub_type {
        tiers.sort_by_key(|definition| definition.amount_min);
        if let Some(first) = tiers.first() {
            if first.amount_min != Decimal::ZERO {
                errors.push(CatalogError::UncoveredLowEnd { sub_type: sub_type.to_string() });
            }
        }
        for pair in tiers.windows(2) {
            let (below, above) = (pair[0], pair[1]);
            match below.amount_max {
                Some(max) if max < above.amount_min => errors.push(CatalogError::RangeGap {
                    sub_type: sub_type.to_string(),
                    below: below.scenario_id.clone(),
                    above: above.scenario_id.clone(),
                }),
                Some(max) if max > above.amount_min => {
                    errors.push(CatalogError::RangeOverlap {
                        sub_type: sub_type.to_string(),
                        first: below.scenario_id.clone(),
                        second: above.scenario_id.clone(),
                    })
                }
                Some(_) => {}
                None => errors.push(CatalogError::RangeOverlap {
                    sub_type: sub_type.to_string(),
                    first: below.scenario_id.clone(),
                    second: above.scenario_id.clone(),
                }),
            }
        }
        if let Some(last) = tiers.last() {
            if last.amount_max.is_some() {
                errors.push(CatalogError::BoundedHighEnd {
                    sub_type: sub_type.to_string(),
                    scenario: last.scenario_id.clone(),
                });
            }
        }
    }

    for definition in catalog.definitions() {
        let steps = catalog.steps(&definition.scenario_id);
        for (index, step) in steps.iter().enumerate() {
            let expected = index as u32 + 1;
            if step.order != expected {
                errors.push(CatalogError::NonContiguousSteps {
                    scenario: definition.scenario_id.clone(),
                    order: step.order,
                });
                break;
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
