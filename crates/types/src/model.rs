//! Pipeline model: environments, build types, invocations and stages

use dstage_errors::PipelineError;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Prefix of every stage execution unit name
pub const EXECUTION_UNIT_PREFIX: &str = "runDistributedStage";

/// Separator between a sub-unit path and a task name (`core:test`)
pub const TASK_PATH_SEPARATOR: char = ':';

/// Target execution environment of a build invocation
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BuildEnvironment {
    /// Environment identifier, also the key for its remote job URL
    pub name: String,
    /// Operating system
    pub os: String,
    /// JDK version, if the environment pins one
    pub jdk: Option<String>,
}

impl BuildEnvironment {
    /// Create a new environment
    pub fn new(name: impl Into<String>, os: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            os: os.into(),
            jdk: None,
        }
    }

    /// Pin a JDK version
    #[must_use]
    pub fn with_jdk(mut self, jdk: impl Into<String>) -> Self {
        self.jdk = Some(jdk.into());
        self
    }

    /// Rename a task for this environment.
    ///
    /// `test` on `linux` becomes `testLinux`; with JDK 11 pinned it becomes
    /// `testLinuxJdk11`.
    #[must_use]
    pub fn environment_specific_task_name(&self, base_task_name: &str) -> String {
        let mut name = String::with_capacity(base_task_name.len() + self.os.len() + 8);
        name.push_str(base_task_name);
        name.push_str(&capitalize(&self.os));
        if let Some(jdk) = &self.jdk {
            name.push_str("Jdk");
            name.push_str(jdk);
        }
        name
    }
}

impl fmt::Display for BuildEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.jdk {
            Some(jdk) => write!(f, "{} (jdk {jdk})", self.os),
            None => write!(f, "{}", self.os),
        }
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// A named, reusable unit of work
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BuildType {
    pub name: String,
    /// Task identifiers; qualified (`core:test`) or bare (`test`)
    pub tasks: Vec<String>,
    /// Whether task names are remapped per environment
    pub environment_specific: bool,
}

impl BuildType {
    /// Create a new build type
    pub fn new<I, S>(name: impl Into<String>, tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            tasks: tasks.into_iter().map(Into::into).collect(),
            environment_specific: false,
        }
    }

    /// Mark the build type as environment specific
    #[must_use]
    pub fn environment_specific(mut self) -> Self {
        self.environment_specific = true;
        self
    }
}

/// One build type paired with one environment
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BuildInvocation {
    pub build_type: Arc<BuildType>,
    pub environment: Arc<BuildEnvironment>,
}

impl BuildInvocation {
    /// Create a new invocation
    #[must_use]
    pub fn new(build_type: Arc<BuildType>, environment: Arc<BuildEnvironment>) -> Self {
        Self {
            build_type,
            environment,
        }
    }

    /// Human readable label
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} on {}", self.build_type.name, self.environment)
    }
}

/// A named node in the pipeline graph
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stage {
    pub name: String,
    pub description: String,
    pub build_invocations: Vec<BuildInvocation>,
    /// Names of the stages that must succeed before this one starts
    pub dependencies: Vec<String>,
}

impl Stage {
    /// Create a stage without invocations or dependencies
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            build_invocations: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// Add an invocation
    #[must_use]
    pub fn with_invocation(mut self, invocation: BuildInvocation) -> Self {
        self.build_invocations.push(invocation);
        self
    }

    /// Add a dependency on another stage
    #[must_use]
    pub fn depends_on(mut self, stage: impl Into<String>) -> Self {
        self.dependencies.push(stage.into());
        self
    }

    /// Name of the execution unit sequencing this stage's dependents
    #[must_use]
    pub fn execution_unit_name(&self) -> String {
        let mut unit = String::from(EXECUTION_UNIT_PREFIX);
        unit.extend(self.name.chars().filter(|c| !c.is_whitespace()));
        unit
    }
}

/// Root container of the stage graph
///
/// Stages reference their dependencies by name; the pipeline owns every
/// stage and resolves those names.
#[derive(Clone, Debug, Default)]
pub struct Pipeline {
    stages: Vec<Arc<Stage>>,
    index: HashMap<String, usize>,
    top_level: Vec<String>,
}

impl Pipeline {
    /// Start building a pipeline
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Look up a stage by name
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&Arc<Stage>> {
        self.index.get(name).map(|&i| &self.stages[i])
    }

    /// Every registered stage in registration order
    #[must_use]
    pub fn stages(&self) -> &[Arc<Stage>] {
        &self.stages
    }

    /// Names of the top-level stages
    #[must_use]
    pub fn top_level(&self) -> &[String] {
        &self.top_level
    }

    /// Top-level stages plus everything they depend on, deduplicated.
    ///
    /// Dependencies naming unknown stages are ignored here; the planner
    /// reports them.
    #[must_use]
    pub fn all_stages(&self) -> Vec<Arc<Stage>> {
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        let mut stack: Vec<&str> = self.top_level.iter().rev().map(String::as_str).collect();

        while let Some(name) = stack.pop() {
            if !seen.insert(name) {
                continue;
            }
            if let Some(stage) = self.stage(name) {
                result.push(Arc::clone(stage));
                stack.extend(stage.dependencies.iter().rev().map(String::as_str));
            }
        }

        result
    }
}

/// Builder for [`Pipeline`]
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    stages: Vec<Stage>,
    top_level: Option<Vec<String>>,
}

impl PipelineBuilder {
    /// Register a stage
    #[must_use]
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Set the top-level stages (defaults to every registered stage)
    #[must_use]
    pub fn top_level<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.top_level = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Finish the pipeline
    ///
    /// # Errors
    ///
    /// Returns `DuplicateStage` when two stages share a name and
    /// `UnknownStage` when a top-level name was never registered.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        let mut index = HashMap::with_capacity(self.stages.len());
        let mut stages = Vec::with_capacity(self.stages.len());

        for stage in self.stages {
            if index.contains_key(&stage.name) {
                return Err(PipelineError::DuplicateStage { name: stage.name });
            }
            index.insert(stage.name.clone(), stages.len());
            stages.push(Arc::new(stage));
        }

        let top_level = match self.top_level {
            Some(names) => {
                if let Some(missing) = names.iter().find(|name| !index.contains_key(*name)) {
                    return Err(PipelineError::UnknownStage {
                        name: missing.clone(),
                    });
                }
                names
            }
            None => stages.iter().map(|stage| stage.name.clone()).collect(),
        };

        Ok(Pipeline {
            stages,
            index,
            top_level,
        })
    }
}
