//! External service backends
//!
//! Every unit of real work is delegated through one of these traits; the
//! pipeline only configures and sequences them. Each trait ships with a
//! local reference implementation so the CLI works end to end.

pub mod build;
pub mod deploy;
pub mod secrets;
pub mod source;

use std::sync::Arc;

pub use build::{BuildBackend, BuildError, ShellBuildBackend};
pub use deploy::{DeployBackend, DeployError, DeployOutcome, DeployRequest, LocalTargetEnvironment};
pub use secrets::{Credential, EnvSecretStore, SecretError, SecretStore};
pub use source::{GitSourceProvider, PushEvent, PushListener, RepoCoordinates, SourceError, SourceProvider};

/// The full set of collaborators a pipeline run needs
#[derive(Clone)]
pub struct Backends {
    pub secrets: Arc<dyn SecretStore>,
    pub source: Arc<dyn SourceProvider>,
    pub build: Arc<dyn BuildBackend>,
    pub deploy: Arc<dyn DeployBackend>,
}

impl Backends {
    pub fn new(
        secrets: Arc<dyn SecretStore>,
        source: Arc<dyn SourceProvider>,
        build: Arc<dyn BuildBackend>,
        deploy: Arc<dyn DeployBackend>,
    ) -> Self {
        Self {
            secrets,
            source,
            build,
            deploy,
        }
    }
}
