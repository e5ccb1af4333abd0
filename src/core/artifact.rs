//! Artifacts and the run-scoped artifact store

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use uuid::Uuid;

use crate::core::key::EncryptionKey;
use crate::core::role::{AccessRole, Grantable, PermissionKind};

/// Where an artifact lives inside the bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

/// The file contents of an artifact
///
/// Paths are relative to the artifact root. Bundles are plain data; the
/// store is what makes them immutable and namespaced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactBundle {
    files: BTreeMap<String, Vec<u8>>,
}

impl ArtifactBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &str, contents: Vec<u8>) {
        self.files.insert(path.to_string(), contents);
    }

    pub fn with_file(mut self, path: &str, contents: &[u8]) -> Self {
        self.insert(path, contents.to_vec());
        self
    }

    pub fn file(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(|f| f.as_slice())
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// A named artifact produced by one action and consumed by later stages
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Identity within the run
    pub name: String,

    /// Action that produced it
    pub produced_by: String,

    /// Location inside the bucket
    pub location: ObjectLocation,

    /// File contents
    pub bundle: ArtifactBundle,
}

/// The bucket backing the artifact store, as a grant target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactBucket {
    pub name: String,
}

impl ArtifactBucket {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Grantable for ArtifactBucket {
    fn resource_id(&self) -> String {
        format!("bucket/{}", self.name)
    }

    fn supported_permissions(&self) -> &'static [PermissionKind] {
        &[PermissionKind::Read, PermissionKind::Write]
    }
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("role '{role}' is not granted {kind} on {resource}")]
    AccessDenied {
        role: String,
        resource: String,
        kind: PermissionKind,
    },

    #[error("role '{role}' may not use encryption key {key_id}")]
    KeyAccessDenied { role: String, key_id: Uuid },

    #[error("artifact '{0}' already exists in this run")]
    AlreadyExists(String),

    #[error("artifact '{0}' was not produced by an earlier stage")]
    NotFound(String),

    #[error("artifact '{0}' contains no files")]
    Empty(String),
}

/// Encrypted object storage shared by all stages of one run
///
/// Artifacts are written once and never mutated; the store key-space is
/// namespaced by run ID, so a deploy can only ever observe artifacts from
/// the run that triggered it.
#[derive(Debug)]
pub struct ArtifactStore {
    bucket: ArtifactBucket,
    key: EncryptionKey,
    namespace: Uuid,
    objects: HashMap<String, Artifact>,
}

impl ArtifactStore {
    pub fn new(bucket: ArtifactBucket, key: EncryptionKey, run_id: Uuid) -> Self {
        Self {
            bucket,
            key,
            namespace: run_id,
            objects: HashMap::new(),
        }
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket.name
    }

    fn check_access(&self, role: &AccessRole, kind: PermissionKind) -> Result<(), ArtifactError> {
        if !role.allows(&self.bucket.resource_id(), kind) {
            return Err(ArtifactError::AccessDenied {
                role: role.name.clone(),
                resource: self.bucket.resource_id(),
                kind,
            });
        }
        if !self.key.can_use(&role.name) {
            return Err(ArtifactError::KeyAccessDenied {
                role: role.name.clone(),
                key_id: self.key.key_id,
            });
        }
        Ok(())
    }

    /// Store a finished artifact and hand ownership to the store
    pub fn put(
        &mut self,
        role: &AccessRole,
        name: &str,
        produced_by: &str,
        bundle: ArtifactBundle,
    ) -> Result<ObjectLocation, ArtifactError> {
        self.check_access(role, PermissionKind::Write)?;

        if bundle.is_empty() {
            return Err(ArtifactError::Empty(name.to_string()));
        }
        if self.objects.contains_key(name) {
            return Err(ArtifactError::AlreadyExists(name.to_string()));
        }

        let location = ObjectLocation {
            bucket: self.bucket.name.clone(),
            key: format!("{}/{}", self.namespace, name),
        };
        self.objects.insert(
            name.to_string(),
            Artifact {
                name: name.to_string(),
                produced_by: produced_by.to_string(),
                location: location.clone(),
                bundle,
            },
        );
        Ok(location)
    }

    /// Fetch an artifact produced by an earlier stage
    pub fn get(&self, role: &AccessRole, name: &str) -> Result<&Artifact, ArtifactError> {
        self.check_access(role, PermissionKind::Read)?;
        self.objects
            .get(name)
            .ok_or_else(|| ArtifactError::NotFound(name.to_string()))
    }

    /// Location of a stored artifact without fetching its contents
    pub fn location(&self, role: &AccessRole, name: &str) -> Result<ObjectLocation, ArtifactError> {
        Ok(self.get(role, name)?.location.clone())
    }
}
