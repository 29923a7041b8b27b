//! Pipeline definition files
//!
//! A definition names environments and build types once and lets stages
//! refer to them by name:
//!
//! ```toml
//! top_level = ["commitStage"]
//!
//! [[environments]]
//! name = "linux"
//! os = "linux"
//!
//! [[build_types]]
//! name = "quickTest"
//! tasks = ["test"]
//! environment_specific = true
//!
//! [[stages]]
//! name = "commitStage"
//! description = "Commit stage"
//! invocations = [{ build_type = "quickTest", environment = "linux" }]
//! ```

use dstage_errors::{ConfigError, Error, PipelineError};
use dstage_types::{BuildEnvironment, BuildInvocation, BuildType, Pipeline, Stage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipelineDefinition {
    /// Defaults to every stage when absent
    #[serde(default)]
    pub top_level: Option<Vec<String>>,
    #[serde(default)]
    pub environments: Vec<EnvironmentDefinition>,
    #[serde(default)]
    pub build_types: Vec<BuildTypeDefinition>,
    #[serde(default)]
    pub stages: Vec<StageDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentDefinition {
    pub name: String,
    pub os: String,
    #[serde(default)]
    pub jdk: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildTypeDefinition {
    pub name: String,
    #[serde(default)]
    pub tasks: Vec<String>,
    #[serde(default)]
    pub environment_specific: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub invocations: Vec<InvocationDefinition>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationDefinition {
    pub build_type: String,
    pub environment: String,
}

impl PipelineDefinition {
    /// Load a definition file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        Self::from_toml(&contents)
    }

    /// Parse a definition from TOML
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ParseError` for malformed input.
    pub fn from_toml(contents: &str) -> Result<Self, Error> {
        toml::from_str(contents)
            .map_err(|e| ConfigError::ParseError {
                message: e.to_string(),
            })
            .map_err(Into::into)
    }

    /// Build the immutable pipeline graph.
    ///
    /// Dependencies are not checked here: a definition that references a
    /// missing or cyclic dependency still loads and is rejected when a run
    /// is planned.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidDefinition` for duplicate or undefined
    /// environments and build types, and the builder's errors for duplicate
    /// stages or unknown top-level names.
    pub fn into_pipeline(self) -> Result<Pipeline, Error> {
        let mut environments = HashMap::with_capacity(self.environments.len());
        for env in self.environments {
            let mut environment = BuildEnvironment::new(env.name.clone(), env.os);
            if let Some(jdk) = env.jdk {
                environment = environment.with_jdk(jdk);
            }
            if environments
                .insert(env.name.clone(), Arc::new(environment))
                .is_some()
            {
                return Err(invalid(format!("environment '{}' defined twice", env.name)));
            }
        }

        let mut build_types = HashMap::with_capacity(self.build_types.len());
        for def in self.build_types {
            let mut build_type = BuildType::new(def.name.clone(), def.tasks);
            if def.environment_specific {
                build_type = build_type.environment_specific();
            }
            if build_types
                .insert(def.name.clone(), Arc::new(build_type))
                .is_some()
            {
                return Err(invalid(format!("build type '{}' defined twice", def.name)));
            }
        }

        let mut builder = Pipeline::builder();
        for def in self.stages {
            let mut stage = Stage::new(def.name.clone(), def.description);
            for inv in def.invocations {
                let build_type = build_types.get(&inv.build_type).ok_or_else(|| {
                    invalid(format!(
                        "stage '{}' references undefined build type '{}'",
                        def.name, inv.build_type
                    ))
                })?;
                let environment = environments.get(&inv.environment).ok_or_else(|| {
                    invalid(format!(
                        "stage '{}' references undefined environment '{}'",
                        def.name, inv.environment
                    ))
                })?;
                stage = stage.with_invocation(BuildInvocation::new(
                    Arc::clone(build_type),
                    Arc::clone(environment),
                ));
            }
            for dependency in def.dependencies {
                stage = stage.depends_on(dependency);
            }
            builder = builder.stage(stage);
        }

        if let Some(top_level) = self.top_level {
            builder = builder.top_level(top_level);
        }

        Ok(builder.build()?)
    }
}

fn invalid(message: String) -> Error {
    PipelineError::InvalidDefinition { message }.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFINITION: &str = r#"
top_level = ["readyForNightly"]

[[environments]]
name = "linux"
os = "linux"

[[environments]]
name = "windows-jdk11"
os = "windows"
jdk = "11"

[[build_types]]
name = "compileAll"
tasks = [":createBuildReceipt", "compileAll"]

[[build_types]]
name = "quickTest"
tasks = ["test"]
environment_specific = true

[[stages]]
name = "Sanity Check"
description = "Sanity check"
invocations = [{ build_type = "compileAll", environment = "linux" }]

[[stages]]
name = "readyForNightly"
description = "Ready for nightly"
dependencies = ["Sanity Check"]
invocations = [
    { build_type = "quickTest", environment = "linux" },
    { build_type = "quickTest", environment = "windows-jdk11" },
]
"#;

    #[test]
    fn test_into_pipeline() {
        let pipeline = PipelineDefinition::from_toml(DEFINITION)
            .unwrap()
            .into_pipeline()
            .unwrap();

        assert_eq!(pipeline.top_level(), ["readyForNightly".to_string()]);
        let stage = pipeline.stage("readyForNightly").unwrap();
        assert_eq!(stage.dependencies, vec!["Sanity Check".to_string()]);
        assert_eq!(stage.build_invocations.len(), 2);
        assert_eq!(
            stage.build_invocations[1].label(),
            "quickTest on windows (jdk 11)"
        );
        // Invocations targeting the same build type share it
        assert!(Arc::ptr_eq(
            &stage.build_invocations[0].build_type,
            &stage.build_invocations[1].build_type
        ));
    }

    #[test]
    fn test_undefined_environment() {
        let def = PipelineDefinition::from_toml(
            r#"
[[build_types]]
name = "quickTest"
tasks = ["test"]

[[stages]]
name = "a"
invocations = [{ build_type = "quickTest", environment = "solaris" }]
"#,
        )
        .unwrap();

        let err = def.into_pipeline().unwrap_err();
        assert!(matches!(
            err,
            Error::Pipeline(PipelineError::InvalidDefinition { .. })
        ));
        assert!(err.to_string().contains("solaris"));
    }

    #[test]
    fn test_missing_dependency_still_loads() {
        let pipeline = PipelineDefinition::from_toml(
            r#"
[[stages]]
name = "b"
dependencies = ["a"]
"#,
        )
        .unwrap()
        .into_pipeline()
        .unwrap();
        assert_eq!(pipeline.top_level(), ["b".to_string()]);
    }

    #[test]
    fn test_duplicate_stage() {
        let err = PipelineDefinition::from_toml(
            r#"
[[stages]]
name = "a"

[[stages]]
name = "a"
"#,
        )
        .unwrap()
        .into_pipeline()
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Pipeline(PipelineError::DuplicateStage { .. })
        ));
    }
}
