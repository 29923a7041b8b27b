//! Task/invocation wiring
//!
//! Turns each invocation's build type tasks into the concrete targets sent
//! to the remote build. Results are collected into a fresh [`Wiring`]; the
//! plan itself is never touched.

use crate::ExecutionPlan;
use dstage_errors::PipelineError;
use dstage_types::{BuildInvocation, TASK_PATH_SEPARATOR};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Sub-units and the task names each one declares
#[derive(Clone, Debug, Default)]
pub struct TaskCatalog {
    subunits: BTreeMap<String, BTreeSet<String>>,
}

impl TaskCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare tasks for a sub-unit, merging with earlier declarations
    pub fn declare<I, S>(&mut self, subunit: impl Into<String>, tasks: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subunits
            .entry(subunit.into())
            .or_default()
            .extend(tasks.into_iter().map(Into::into));
    }

    /// Whether `subunit` declares `task`
    #[must_use]
    pub fn declares(&self, subunit: &str, task: &str) -> bool {
        self.subunits
            .get(subunit)
            .is_some_and(|tasks| tasks.contains(task))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subunits.is_empty()
    }
}

impl<S, T> FromIterator<(S, Vec<T>)> for TaskCatalog
where
    S: Into<String>,
    T: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (S, Vec<T>)>>(iter: I) -> Self {
        let mut catalog = Self::new();
        for (subunit, tasks) in iter {
            catalog.declare(subunit, tasks);
        }
        catalog
    }
}

/// Resolved targets for every invocation of a plan
#[derive(Clone, Debug, Default)]
pub struct Wiring {
    /// Stage -> per-invocation target lists, in fan-out order
    targets: HashMap<String, Vec<Vec<String>>>,
    /// (target, execution unit it waits for)
    edges: BTreeSet<(String, String)>,
    /// Every target, first occurrence order
    additional_units: Vec<String>,
}

impl Wiring {
    /// Targets of one invocation; empty when nothing resolved
    #[must_use]
    pub fn targets_for(&self, stage: &str, invocation: usize) -> &[String] {
        self.targets
            .get(stage)
            .and_then(|per_invocation| per_invocation.get(invocation))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Target -> execution unit edges
    #[must_use]
    pub fn edges(&self) -> &BTreeSet<(String, String)> {
        &self.edges
    }

    /// Deduplicated list of every wired target
    #[must_use]
    pub fn additional_units(&self) -> &[String] {
        &self.additional_units
    }

    fn record(&mut self, unit: &str, targets: &[String], seen: &mut HashSet<String>) {
        for target in targets {
            self.edges.insert((target.clone(), unit.to_string()));
            if seen.insert(target.clone()) {
                self.additional_units.push(target.clone());
            }
        }
    }
}

/// Resolve every invocation of every stage in `plan`.
///
/// Without a catalog every task is forwarded verbatim (after environment
/// remapping). With a catalog, qualified tasks must be declared by their
/// sub-unit and bare tasks fan out over `fanout`, keeping only the
/// sub-units that declare them.
///
/// # Errors
///
/// Returns `PipelineError::UnknownTask` when a catalog is configured and a
/// qualified task is not declared by its sub-unit.
pub fn wire(
    plan: &ExecutionPlan,
    catalog: Option<&TaskCatalog>,
    fanout: &[String],
) -> Result<Wiring, PipelineError> {
    let mut wiring = Wiring::default();
    let mut seen = HashSet::new();

    for stage in plan.stages() {
        let unit = stage.execution_unit_name();
        let mut per_invocation = Vec::with_capacity(stage.build_invocations.len());

        for invocation in &stage.build_invocations {
            let targets = resolve_invocation(invocation, catalog, fanout)?;
            wiring.record(&unit, &targets, &mut seen);
            per_invocation.push(targets);
        }

        wiring.targets.insert(stage.name.clone(), per_invocation);
    }

    tracing::debug!(
        targets = wiring.additional_units.len(),
        edges = wiring.edges.len(),
        "invocations wired"
    );

    Ok(wiring)
}

/// Resolve the tasks of one invocation, deduplicated in declaration order.
///
/// Sub-units are selected by the declared task name; the environment
/// remapping is applied afterwards and must also be declared.
fn resolve_invocation(
    invocation: &BuildInvocation,
    catalog: Option<&TaskCatalog>,
    fanout: &[String],
) -> Result<Vec<String>, PipelineError> {
    let mut targets = Vec::new();
    let mut push = |target: String| {
        if !targets.contains(&target) {
            targets.push(target);
        }
    };

    for task in &invocation.build_type.tasks {
        let Some(catalog) = catalog else {
            push(remap_path(invocation, task));
            continue;
        };

        match task.rsplit_once(TASK_PATH_SEPARATOR) {
            Some((path, name)) => {
                let subunit = path.trim_start_matches(TASK_PATH_SEPARATOR);
                // `:task` names a root task, which is not part of any sub-unit
                if !subunit.is_empty() {
                    require(catalog, subunit, name)?;
                    require(catalog, subunit, &remap(invocation, name))?;
                }
                push(remap_path(invocation, task));
            }
            None => {
                let name = remap(invocation, task);
                for subunit in fanout {
                    if catalog.declares(subunit, task) {
                        require(catalog, subunit, &name)?;
                        push(format!("{subunit}{TASK_PATH_SEPARATOR}{name}"));
                    }
                }
            }
        }
    }

    Ok(targets)
}

fn require(catalog: &TaskCatalog, subunit: &str, task: &str) -> Result<(), PipelineError> {
    if catalog.declares(subunit, task) {
        Ok(())
    } else {
        Err(PipelineError::UnknownTask {
            subunit: subunit.to_string(),
            task: task.to_string(),
        })
    }
}

/// Apply environment remapping to a bare task name
fn remap(invocation: &BuildInvocation, name: &str) -> String {
    if invocation.build_type.environment_specific {
        invocation.environment.environment_specific_task_name(name)
    } else {
        name.to_string()
    }
}

/// Apply environment remapping to the task name, keeping any path prefix
fn remap_path(invocation: &BuildInvocation, task: &str) -> String {
    match task.rsplit_once(TASK_PATH_SEPARATOR) {
        Some((path, name)) => format!("{path}{TASK_PATH_SEPARATOR}{}", remap(invocation, name)),
        None => remap(invocation, task),
    }
}
