//! Control-plane authentication configuration: who may connect as a
//! supervisor transport or call the control surface, and with which role.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Role granted to an authenticated principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// May observe sessions, take over / hand back, inject context, end calls.
    Supervisor,
    /// Supervisor privileges plus control-plane administration (key rotation, etc).
    Admin,
}

impl Role {
    pub fn can_supervise(self) -> bool {
        matches!(self, Role::Supervisor | Role::Admin)
    }
}

/// A single configured API key entry. Keys are stored hashed; the plaintext
/// never round-trips through config after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyEntry {
    pub supervisor_id: String,
    pub role: Role,
    #[serde(skip_serializing)]
    key_hash: [u8; 32],
}

impl ApiKeyEntry {
    pub fn new(supervisor_id: impl Into<String>, role: Role, plaintext_key: &str) -> Self {
        Self {
            supervisor_id: supervisor_id.into(),
            role,
            key_hash: hash_key(plaintext_key),
        }
    }

    fn matches(&self, plaintext_key: &str) -> bool {
        use subtle::ConstantTimeEq;
        hash_key(plaintext_key).ct_eq(&self.key_hash).into()
    }
}

fn hash_key(plaintext: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hasher.finalize().into()
}

/// Authentication config for the control plane: the set of accepted API keys.
#[derive(Debug, Clone, Default)]
pub struct ControlPlaneAuthConfig {
    entries: HashMap<String, ApiKeyEntry>,
}

impl ControlPlaneAuthConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, plaintext_key: impl Into<String>, entry: ApiKeyEntry) -> Self {
        self.entries.insert(plaintext_key.into(), entry);
        self
    }

    /// Resolve a bearer token to the matching entry, constant-time per candidate.
    pub fn authenticate(&self, plaintext_key: &str) -> Option<&ApiKeyEntry> {
        self.entries
            .values()
            .find(|entry| entry.matches(plaintext_key))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authenticate_matches_correct_key() {
        let cfg = ControlPlaneAuthConfig::new().with_key(
            "secret-123",
            ApiKeyEntry::new("sup-1", Role::Supervisor, "secret-123"),
        );
        let entry = cfg.authenticate("secret-123").expect("should match");
        assert_eq!(entry.supervisor_id, "sup-1");
        assert!(entry.role.can_supervise());
    }

    #[test]
    fn authenticate_rejects_wrong_key() {
        let cfg = ControlPlaneAuthConfig::new().with_key(
            "secret-123",
            ApiKeyEntry::new("sup-1", Role::Supervisor, "secret-123"),
        );
        assert!(cfg.authenticate("wrong").is_none());
    }

    #[test]
    fn empty_config_rejects_everything() {
        let cfg = ControlPlaneAuthConfig::new();
        assert!(cfg.is_empty());
        assert!(cfg.authenticate("anything").is_none());
    }
}
