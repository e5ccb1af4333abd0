//! Shared access role and permission grants
//!
//! Every action in the pipeline executes under one role. Broadening the
//! role's grants affects every stage at once; the permission set is the
//! single shared security boundary and should be read as a whole.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kinds of permission a grant can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionKind {
    /// Read an object or secret value
    Read,
    /// Write objects
    Write,
    /// Use an encryption key for both encrypt and decrypt
    EncryptDecrypt,
    /// Start a build project
    StartBuild,
    /// Apply a template to a target environment
    Deploy,
    /// Publish to a notification topic
    Publish,
}

impl std::fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PermissionKind::Read => "read",
            PermissionKind::Write => "write",
            PermissionKind::EncryptDecrypt => "encrypt-decrypt",
            PermissionKind::StartBuild => "start-build",
            PermissionKind::Deploy => "deploy",
            PermissionKind::Publish => "publish",
        };
        f.write_str(s)
    }
}

/// Services that may assume the pipeline role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServicePrincipal {
    Checkout,
    Build,
    Deploy,
}

/// A resource that can appear as the target of a grant
///
/// Resources declare which permission kinds they support; granting an
/// unsupported kind is a definition-time error.
pub trait Grantable {
    /// Stable identifier used in grants and permission checks
    fn resource_id(&self) -> String;

    /// Permission kinds this resource supports
    fn supported_permissions(&self) -> &'static [PermissionKind];
}

/// A single (resource, permission) entry in the role's permission set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub resource: String,
    pub kind: PermissionKind,
}

#[derive(Debug, Error)]
pub enum RoleError {
    #[error("resource '{resource}' does not support {kind} grants")]
    UnsupportedPermission {
        resource: String,
        kind: PermissionKind,
    },
}

/// The single identity assumed by every pipeline action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRole {
    /// Role name
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// Identifier of the base permission policy attached to the role
    pub policy: String,

    /// Services trusted to assume this role
    trusted: Vec<ServicePrincipal>,

    /// Explicit grants accumulated by other components
    grants: Vec<Grant>,
}

impl AccessRole {
    pub fn new(name: &str, description: &str, policy: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            policy: policy.to_string(),
            trusted: Vec::new(),
            grants: Vec::new(),
        }
    }

    /// Add a service to the role's trust relationship
    pub fn trust(&mut self, principal: ServicePrincipal) {
        if !self.trusted.contains(&principal) {
            self.trusted.push(principal);
        }
    }

    /// Whether a service may assume this role
    pub fn trusts(&self, principal: ServicePrincipal) -> bool {
        self.trusted.contains(&principal)
    }

    /// Grant a permission on a resource to this role
    ///
    /// Fails when the resource does not support the requested kind.
    pub fn grant(&mut self, resource: &dyn Grantable, kind: PermissionKind) -> Result<(), RoleError> {
        if !resource.supported_permissions().contains(&kind) {
            return Err(RoleError::UnsupportedPermission {
                resource: resource.resource_id(),
                kind,
            });
        }
        let grant = Grant {
            resource: resource.resource_id(),
            kind,
        };
        if !self.grants.contains(&grant) {
            self.grants.push(grant);
        }
        Ok(())
    }

    /// Whether the role holds a permission on a resource
    pub fn allows(&self, resource_id: &str, kind: PermissionKind) -> bool {
        self.grants
            .iter()
            .any(|g| g.resource == resource_id && g.kind == kind)
    }

    /// The full permission set, for auditing as a whole
    pub fn grants(&self) -> &[Grant] {
        &self.grants
    }
}
