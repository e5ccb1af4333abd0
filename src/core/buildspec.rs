//! Build specification and build project factory

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::role::{Grantable, PermissionKind};

/// Version tag of the build specification format
pub const BUILDSPEC_VERSION: &str = "0.2";

/// Selector for files that become part of an output artifact
#[derive(Debug, Clone)]
pub enum FileSelector {
    /// Exact relative path match
    Exact(String),
    /// Wildcard pattern (`*` within a path segment, `**` across segments)
    Pattern { source: String, regex: Regex },
}

impl FileSelector {
    /// Compile a selector string; plain strings stay exact matches
    pub fn compile(selector: &str) -> Self {
        if !selector.contains('*') {
            return FileSelector::Exact(selector.to_string());
        }

        let mut pattern = String::from("^");
        let mut chars = selector.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '*' => {
                    if chars.peek() == Some(&'*') {
                        chars.next();
                        pattern.push_str(".*");
                    } else {
                        pattern.push_str("[^/]*");
                    }
                }
                _ => pattern.push_str(&regex::escape(&c.to_string())),
            }
        }
        pattern.push('$');

        match Regex::new(&pattern) {
            Ok(regex) => FileSelector::Pattern {
                source: selector.to_string(),
                regex,
            },
            // Escaped char-by-char above, so this only trips on pathological
            // input; fall back to treating the selector literally.
            Err(_) => FileSelector::Exact(selector.to_string()),
        }
    }

    /// Check a relative path against the selector
    pub fn matches(&self, path: &str) -> bool {
        match self {
            FileSelector::Exact(expected) => path == expected,
            FileSelector::Pattern { regex, .. } => regex.is_match(path),
        }
    }

    /// The selector as written in configuration
    pub fn source(&self) -> &str {
        match self {
            FileSelector::Exact(s) => s,
            FileSelector::Pattern { source, .. } => source,
        }
    }
}

/// Ordered command phases run by the build service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildPhases {
    /// Dependency installation, shared preamble
    pub install: Vec<String>,

    /// Compilation, shared preamble
    pub build: Vec<String>,

    /// Per-project commands run after the preamble
    pub post_build: Vec<String>,
}

impl BuildPhases {
    /// Phases in execution order, with their names
    pub fn ordered(&self) -> [(&'static str, &[String]); 3] {
        [
            ("install", self.install.as_slice()),
            ("build", self.build.as_slice()),
            ("post_build", self.post_build.as_slice()),
        ]
    }
}

/// Which produced files become the output artifact
#[derive(Debug, Clone)]
pub struct ArtifactSelection {
    /// Directory (relative to the build workspace) holding the outputs
    pub base_directory: String,

    /// Selectors applied to paths under the base directory
    pub files: Vec<FileSelector>,
}

/// Full build specification consumed by the build runner
#[derive(Debug, Clone)]
pub struct BuildSpec {
    pub version: String,
    pub phases: BuildPhases,
    pub artifacts: ArtifactSelection,
}

/// An independently triggerable build definition
///
/// All projects of one pipeline share the execution role and encryption
/// key; only name, post-build commands, and artifact selection differ.
#[derive(Debug, Clone)]
pub struct BuildProject {
    /// Unique project name within the pipeline
    pub name: String,

    /// The build specification
    pub spec: BuildSpec,

    /// Role the build executes under
    pub role_name: String,
}

impl Grantable for BuildProject {
    fn resource_id(&self) -> String {
        format!("build/{}", self.name)
    }

    fn supported_permissions(&self) -> &'static [PermissionKind] {
        &[PermissionKind::StartBuild]
    }
}

/// Create a build project from its distinguishing parameters
///
/// The install and build phases are the fixed preamble shared by every
/// project of the pipeline; `post_build_commands` runs after them and the
/// selected files under `output_directory` become the output artifact.
pub fn build_project(
    name: &str,
    preamble_install: &[String],
    preamble_build: &[String],
    post_build_commands: &[String],
    output_directory: &str,
    output_file_selectors: &[String],
    role_name: &str,
) -> BuildProject {
    BuildProject {
        name: name.to_string(),
        spec: BuildSpec {
            version: BUILDSPEC_VERSION.to_string(),
            phases: BuildPhases {
                install: preamble_install.to_vec(),
                build: preamble_build.to_vec(),
                post_build: post_build_commands.to_vec(),
            },
            artifacts: ArtifactSelection {
                base_directory: output_directory.to_string(),
                files: output_file_selectors
                    .iter()
                    .map(|s| FileSelector::compile(s))
                    .collect(),
            },
        },
        role_name: role_name.to_string(),
    }
}
