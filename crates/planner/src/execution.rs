//! Execution plan for a run

use crate::graph;
use crate::units::ExecutionUnits;
use dstage_errors::Error;
use dstage_types::{Pipeline, Stage};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Deduplicated, topologically ordered closure of the requested stages
#[derive(Clone, Debug)]
pub struct ExecutionPlan {
    /// Requested stage names, sorted and unique
    requested: Vec<String>,
    /// Every stage of the closure, dependencies first
    stages: Vec<Arc<Stage>>,
    positions: HashMap<String, usize>,
    /// Stage -> stages in the plan that depend on it, in plan order
    dependents: HashMap<String, Vec<String>>,
    units: ExecutionUnits,
    /// Waves of stages whose dependencies all lie in earlier waves
    batches: Vec<Vec<String>>,
}

impl ExecutionPlan {
    /// Plan the closure of `requested` over `pipeline`
    ///
    /// # Errors
    ///
    /// Returns `UnknownStage` for a requested name that is not in the
    /// pipeline (checked before anything else), `UnknownDependency`,
    /// `CyclicDependency` or `ExecutionUnitCollision`.
    pub fn new<S: AsRef<str>>(pipeline: &Pipeline, requested: &[S]) -> Result<Self, Error> {
        let requested: Vec<String> = requested
            .iter()
            .map(|name| name.as_ref().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let stages = graph::closure(pipeline, &requested)?;

        let positions: HashMap<String, usize> = stages
            .iter()
            .enumerate()
            .map(|(idx, stage)| (stage.name.clone(), idx))
            .collect();

        let mut units = ExecutionUnits::new();
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        for stage in &stages {
            units.register(stage, None)?;
            let unit = stage.execution_unit_name();
            for dependency in &stage.dependencies {
                // Closure succeeded, so every dependency is in the plan
                if let Some(&idx) = positions.get(dependency) {
                    units.register(&stages[idx], Some(unit.as_str()))?;
                    let entry = dependents.entry(dependency.clone()).or_default();
                    if !entry.contains(&stage.name) {
                        entry.push(stage.name.clone());
                    }
                }
            }
        }

        let batches = Self::compute_batches(&stages, &positions);

        tracing::debug!(
            requested = ?requested,
            stages = stages.len(),
            batches = batches.len(),
            "execution plan computed"
        );

        Ok(Self {
            requested,
            stages,
            positions,
            dependents,
            units,
            batches,
        })
    }

    /// Group stages into waves by longest dependency chain
    fn compute_batches(stages: &[Arc<Stage>], positions: &HashMap<String, usize>) -> Vec<Vec<String>> {
        let mut levels = vec![0usize; stages.len()];
        let mut batches: Vec<Vec<String>> = Vec::new();

        for (idx, stage) in stages.iter().enumerate() {
            let level = stage
                .dependencies
                .iter()
                .filter_map(|dep| positions.get(dep))
                .map(|&dep_idx| levels[dep_idx] + 1)
                .max()
                .unwrap_or(0);
            levels[idx] = level;

            if batches.len() <= level {
                batches.resize_with(level + 1, Vec::new);
            }
            batches[level].push(stage.name.clone());
        }

        batches
    }

    /// Requested stage names, sorted
    #[must_use]
    pub fn requested(&self) -> &[String] {
        &self.requested
    }

    /// Every stage in the plan, dependencies first
    #[must_use]
    pub fn stages(&self) -> &[Arc<Stage>] {
        &self.stages
    }

    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&Arc<Stage>> {
        self.positions.get(name).map(|&idx| &self.stages[idx])
    }

    #[must_use]
    pub fn units(&self) -> &ExecutionUnits {
        &self.units
    }

    #[must_use]
    pub fn batches(&self) -> &[Vec<String>] {
        &self.batches
    }

    /// Position of a stage in plan order
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// Direct dependencies of a stage
    #[must_use]
    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.stage(name)
            .map(|stage| stage.dependencies.as_slice())
            .unwrap_or_default()
    }

    /// Stages in the plan that directly depend on `name`
    #[must_use]
    pub fn dependents_of(&self, name: &str) -> &[String] {
        self.dependents
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every stage reachable from `name` with its longest dependency
    /// distance below it (`name` itself has depth 0).
    #[must_use]
    pub fn dependency_depths(&self, name: &str) -> HashMap<String, usize> {
        let mut depths = HashMap::new();
        let Some(root) = self.position(name) else {
            return depths;
        };
        depths.insert(name.to_string(), 0);

        // Reverse plan order visits every dependent before its dependencies
        for stage in self.stages[..=root].iter().rev() {
            let Some(&depth) = depths.get(&stage.name) else {
                continue;
            };
            for dependency in &stage.dependencies {
                let entry = depths.entry(dependency.clone()).or_insert(0);
                *entry = (*entry).max(depth + 1);
            }
        }

        depths
    }

    /// Number of stages in the plan
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// compile <- {unit, docs} <- release
    fn diamond() -> Pipeline {
        Pipeline::builder()
            .stage(Stage::new("compile", ""))
            .stage(Stage::new("unit", "").depends_on("compile"))
            .stage(Stage::new("docs", "").depends_on("compile"))
            .stage(Stage::new("release", "").depends_on("unit").depends_on("docs"))
            .stage(Stage::new("unrelated", ""))
            .build()
            .unwrap()
    }

    #[test]
    fn test_plan_diamond() {
        let plan = ExecutionPlan::new(&diamond(), &["release"]).unwrap();

        let names: Vec<_> = plan.stages().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["compile", "unit", "docs", "release"]);
        assert_eq!(plan.position("compile"), Some(0));
        assert_eq!(plan.position("unrelated"), None);
        assert_eq!(plan.dependents_of("compile"), ["unit", "docs"]);
        assert_eq!(plan.dependencies_of("release"), ["unit", "docs"]);
        assert_eq!(
            plan.batches(),
            [
                vec!["compile".to_string()],
                vec!["unit".to_string(), "docs".to_string()],
                vec!["release".to_string()],
            ]
        );
    }

    #[test]
    fn test_shared_unit_has_both_dependents() {
        let plan = ExecutionPlan::new(&diamond(), &["release"]).unwrap();

        assert_eq!(plan.units().len(), 4);
        let unit = plan.units().get("runDistributedStagecompile").unwrap();
        assert_eq!(unit.dependents.len(), 2);
        assert!(unit.dependents.contains("runDistributedStageunit"));
        assert!(unit.dependents.contains("runDistributedStagedocs"));
    }

    #[test]
    fn test_requested_sorted_and_deduplicated() {
        let plan = ExecutionPlan::new(&diamond(), &["unrelated", "docs", "docs"]).unwrap();
        assert_eq!(plan.requested(), ["docs", "unrelated"]);
        let names: Vec<_> = plan.stages().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["compile", "docs", "unrelated"]);
    }

    #[test]
    fn test_dependency_depths() {
        let pipeline = Pipeline::builder()
            .stage(Stage::new("a", ""))
            .stage(Stage::new("b", "").depends_on("a"))
            .stage(Stage::new("c", "").depends_on("b").depends_on("a"))
            .build()
            .unwrap();
        let plan = ExecutionPlan::new(&pipeline, &["c"]).unwrap();

        let depths = plan.dependency_depths("c");
        assert_eq!(depths["c"], 0);
        assert_eq!(depths["b"], 1);
        // The longest path wins over the direct edge
        assert_eq!(depths["a"], 2);
        assert!(plan.dependency_depths("missing").is_empty());
    }
}
