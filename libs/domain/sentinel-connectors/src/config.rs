use crate::secret::CredentialRef;

/// Connector-agnostic tuning knobs. Concrete connectors read whichever
/// fields apply to them (a cloud connector uses `regions`, an identity
/// connector ignores it).
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    pub credential_ref: CredentialRef,
    pub base_url: Option<String>,
    pub regions: Vec<String>,
    pub max_parallelism: usize,
    pub page_size: u32,
    pub requests_per_second: u32,
    pub burst_size: u32,
    /// Resource-kind allowlist (e.g. `"Host"`, `"Application"`). Empty
    /// means "no restriction" — every kind a connector can produce is kept.
    pub include: Vec<String>,
    /// Resource-kind denylist, applied after `include`. A kind named in
    /// both lists is excluded.
    pub exclude: Vec<String>,
}

impl ConnectorConfig {
    pub fn new(credential_ref: impl Into<CredentialRef>) -> Self {
        Self {
            credential_ref: credential_ref.into(),
            base_url: None,
            regions: Vec::new(),
            max_parallelism: 8,
            page_size: 100,
            requests_per_second: 10,
            burst_size: 10,
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_regions(mut self, regions: Vec<String>) -> Self {
        self.regions = regions;
        self
    }

    pub fn with_max_parallelism(mut self, max_parallelism: usize) -> Self {
        self.max_parallelism = max_parallelism.max(1);
        self
    }

    pub fn with_include(mut self, include: Vec<String>) -> Self {
        self.include = include;
        self
    }

    pub fn with_exclude(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }

    /// Whether a node kind (as returned by `NodeKind::label()`) survives
    /// this config's allow/deny lists. An empty `include` allows everything
    /// that isn't separately excluded.
    pub fn allows_kind(&self, kind_label: &str) -> bool {
        let allowed = self.include.is_empty() || self.include.iter().any(|k| k == kind_label);
        allowed && !self.exclude.iter().any(|k| k == kind_label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_include_allows_everything_not_excluded() {
        let config = ConnectorConfig::new("cred").with_exclude(vec!["Policy".to_string()]);
        assert!(config.allows_kind("Host"));
        assert!(!config.allows_kind("Policy"));
    }

    #[test]
    fn non_empty_include_is_an_allowlist() {
        let config = ConnectorConfig::new("cred").with_include(vec!["Host".to_string()]);
        assert!(config.allows_kind("Host"));
        assert!(!config.allows_kind("Vpc"));
    }

    #[test]
    fn exclude_wins_over_include() {
        let config = ConnectorConfig::new("cred")
            .with_include(vec!["Host".to_string()])
            .with_exclude(vec!["Host".to_string()]);
        assert!(!config.allows_kind("Host"));
    }
}
