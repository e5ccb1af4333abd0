//! Encryption key guarding the artifact store

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::core::role::{AccessRole, Grantable, PermissionKind};

/// Key used to encrypt everything written to the artifact bucket
///
/// Encrypt/decrypt is granted only to the pipeline role; the artifact store
/// refuses access for any identity without a grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionKey {
    /// Opaque key identifier
    pub key_id: Uuid,

    /// Human-readable description
    pub description: String,

    /// Role names allowed to use the key
    grantees: HashSet<String>,
}

impl EncryptionKey {
    pub fn new(description: &str) -> Self {
        Self {
            key_id: Uuid::new_v4(),
            description: description.to_string(),
            grantees: HashSet::new(),
        }
    }

    /// Allow a role to encrypt and decrypt with this key
    pub fn grant_encrypt_decrypt(&mut self, role: &AccessRole) {
        self.grantees.insert(role.name.clone());
    }

    /// Whether a role may use the key
    pub fn can_use(&self, role_name: &str) -> bool {
        self.grantees.contains(role_name)
    }
}

impl Grantable for EncryptionKey {
    fn resource_id(&self) -> String {
        format!("key/{}", self.key_id)
    }

    fn supported_permissions(&self) -> &'static [PermissionKind] {
        &[PermissionKind::EncryptDecrypt]
    }
}
