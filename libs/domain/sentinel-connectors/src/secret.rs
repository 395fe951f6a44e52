use std::collections::HashMap;
use std::fmt;

use crate::error::ConnectorError;

/// A resolved credential value. Deliberately opaque: the only thing callers
/// can do with it is hand it to an HTTP client header. `Debug`/`Display`
/// never print the inner value, so a stray `{:?}` in a log line can't leak
/// it.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***")
    }
}

/// A pointer to a credential, never the credential itself. Connectors are
/// configured with a `credential_ref` and resolve it through a `SecretStore`
/// at call time — nothing about the reference format implies where the
/// secret actually lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialRef(pub String);

impl From<&str> for CredentialRef {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

pub trait SecretStore: Send + Sync {
    fn resolve(&self, credential_ref: &CredentialRef) -> Result<Secret, ConnectorError>;
}

/// Resolves a `credential_ref` as the name of an environment variable. This
/// is the default used outside of a deployment that wires in a real vault
/// client; it is adequate for local runs and tests and keeps no secret
/// material in process memory beyond what `std::env` already holds.
pub struct EnvSecretStore;

impl SecretStore for EnvSecretStore {
    fn resolve(&self, credential_ref: &CredentialRef) -> Result<Secret, ConnectorError> {
        std::env::var(&credential_ref.0)
            .map(Secret::new)
            .map_err(|_| {
                ConnectorError::Credential(format!(
                    "no environment variable named {}",
                    credential_ref.0
                ))
            })
    }
}

/// Fixed-map secret store for tests and fixture-driven runs.
#[derive(Default)]
pub struct InMemorySecretStore {
    secrets: HashMap<String, Secret>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, credential_ref: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(credential_ref.into(), Secret::new(value));
        self
    }
}

impl SecretStore for InMemorySecretStore {
    fn resolve(&self, credential_ref: &CredentialRef) -> Result<Secret, ConnectorError> {
        self.secrets
            .get(&credential_ref.0)
            .cloned()
            .ok_or_else(|| {
                ConnectorError::Credential(format!("unknown credential_ref {}", credential_ref.0))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_store_resolves_known_ref() {
        let store = InMemorySecretStore::new().with("aws-prod", "super-secret-key");
        let secret = store.resolve(&CredentialRef::from("aws-prod")).unwrap();
        assert_eq!(secret.expose(), "super-secret-key");
    }

    #[test]
    fn in_memory_store_rejects_unknown_ref() {
        let store = InMemorySecretStore::new();
        let err = store.resolve(&CredentialRef::from("missing")).unwrap_err();
        assert!(matches!(err, ConnectorError::Credential(_)));
    }

    #[test]
    fn secret_debug_never_prints_value() {
        let secret = Secret::new("super-secret-key");
        let rendered = format!("{secret:?}");
        assert!(!rendered.contains("super-secret-key"));
    }
}
