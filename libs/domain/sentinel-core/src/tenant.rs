use serde::{Deserialize, Serialize};

/// Stable tenant identifier. A newtype rather than a bare `String` so it
/// can't be swapped for an arbitrary string at a call site by accident.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TenantId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Carried through every operation that touches tenant-owned data. This is
/// the only way a caller can assert "I am operating as tenant X" — there is
/// no path that lets a filter or query substitute a different tenant id
/// once a `TenantContext` has been constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// Returns an error-shaped bool rather than panicking: callers decide
    /// what kind of rejection this becomes in their own error enum.
    pub fn owns(&self, candidate: &TenantId) -> bool {
        &self.tenant_id == candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owns_rejects_foreign_tenant() {
        let ctx = TenantContext::new(TenantId::new("t1"));
        assert!(ctx.owns(&TenantId::new("t1")));
        assert!(!ctx.owns(&TenantId::new("t2")));
    }
}
