//! Stage closure collection and cycle detection

use dstage_errors::PipelineError;
use dstage_types::{Pipeline, Stage};
use std::collections::HashMap;
use std::sync::Arc;

/// DFS colour of a visited stage. Unvisited stages have no entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Collect the closure of the requested stages in topological order.
///
/// Every requested name is checked first. The walk is an iterative
/// post-order DFS, so each stage is emitted after all of its dependencies
/// and exactly once. Requested names must already be sorted and unique.
pub(crate) fn closure(
    pipeline: &Pipeline,
    requested: &[String],
) -> Result<Vec<Arc<Stage>>, PipelineError> {
    let mut roots = Vec::with_capacity(requested.len());
    for name in requested {
        let stage = pipeline
            .stage(name)
            .ok_or_else(|| PipelineError::UnknownStage { name: name.clone() })?;
        roots.push(stage);
    }

    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut order = Vec::new();

    for root in roots {
        if marks.contains_key(root.name.as_str()) {
            continue;
        }

        marks.insert(root.name.as_str(), Mark::InProgress);
        // (stage, index of the next dependency to visit)
        let mut stack: Vec<(&Arc<Stage>, usize)> = vec![(root, 0)];

        while let Some(top) = stack.last_mut() {
            let stage = top.0;
            let next = top.1;

            let Some(dependency) = stage.dependencies.get(next) else {
                marks.insert(stage.name.as_str(), Mark::Done);
                order.push(Arc::clone(stage));
                stack.pop();
                continue;
            };
            top.1 += 1;

            let dep_stage =
                pipeline
                    .stage(dependency)
                    .ok_or_else(|| PipelineError::UnknownDependency {
                        stage: stage.name.clone(),
                        dependency: dependency.clone(),
                    })?;

            match marks.get(dep_stage.name.as_str()) {
                Some(Mark::Done) => {}
                Some(Mark::InProgress) => {
                    return Err(PipelineError::CyclicDependency {
                        cycle: cycle_path(&stack, &dep_stage.name),
                    });
                }
                None => {
                    marks.insert(dep_stage.name.as_str(), Mark::InProgress);
                    stack.push((dep_stage, 0));
                }
            }
        }
    }

    Ok(order)
}

/// Path from the first occurrence of `reentered` on the DFS stack back to it
fn cycle_path(stack: &[(&Arc<Stage>, usize)], reentered: &str) -> Vec<String> {
    let start = stack
        .iter()
        .position(|(stage, _)| stage.name == reentered)
        .unwrap_or(0);

    stack[start..]
        .iter()
        .map(|(stage, _)| stage.name.clone())
        .chain(std::iter::once(reentered.to_string()))
        .collect()
}
