//! Execution unit registry

use dstage_errors::PipelineError;
use dstage_types::Stage;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// Internal handle sequencing a stage's dependents
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExecutionUnit {
    /// `runDistributedStage` + stage name without whitespace
    pub name: String,
    /// Stage the unit was derived from
    pub stage: String,
    /// Units that must wait for this one
    pub dependents: BTreeSet<String>,
}

/// Units by name, in registration order
#[derive(Clone, Debug, Default)]
pub struct ExecutionUnits {
    units: Vec<ExecutionUnit>,
    index: HashMap<String, usize>,
}

impl ExecutionUnits {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the unit for `stage`, optionally recording a dependent unit.
    ///
    /// Registering the same stage again returns the existing unit and merges
    /// the dependent into it.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionUnitCollision` when a different stage already owns
    /// the unit name.
    pub fn register(
        &mut self,
        stage: &Stage,
        dependent: Option<&str>,
    ) -> Result<&ExecutionUnit, PipelineError> {
        let name = stage.execution_unit_name();

        let idx = if let Some(&idx) = self.index.get(&name) {
            let existing = &self.units[idx];
            if existing.stage != stage.name {
                return Err(PipelineError::ExecutionUnitCollision {
                    unit: name,
                    existing: existing.stage.clone(),
                    stage: stage.name.clone(),
                });
            }
            idx
        } else {
            let idx = self.units.len();
            self.units.push(ExecutionUnit {
                name: name.clone(),
                stage: stage.name.clone(),
                dependents: BTreeSet::new(),
            });
            self.index.insert(name, idx);
            idx
        };

        let unit = &mut self.units[idx];
        if let Some(dependent) = dependent {
            unit.dependents.insert(dependent.to_string());
        }
        Ok(unit)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ExecutionUnit> {
        self.index.get(name).map(|&idx| &self.units[idx])
    }

    /// Unit derived from a stage
    #[must_use]
    pub fn for_stage(&self, stage: &Stage) -> Option<&ExecutionUnit> {
        self.get(&stage.execution_unit_name())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExecutionUnit> {
        self.units.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
