use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::natural_key::fingerprint;
use crate::property::{PropertyMap, PropertyValue};
use crate::severity::{Criticality, Severity};
use crate::tenant::TenantId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Tcp,
    Udp,
    Http,
    Https,
    Ssh,
    Rdp,
    Dns,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Running,
    Stopped,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortState {
    Open,
    Closed,
    Filtered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    EntraId,
    Okta,
    AwsIam,
    AzureRbac,
    GcpIam,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Human,
    ServiceAccount,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyType {
    IamPolicy,
    FirewallRule,
    SecurityGroup,
    ConditionalAccess,
    NetworkAcl,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub ip: String,
    pub hostname: Option<String>,
    pub os: Option<String>,
    pub mac: Option<String>,
    pub provider: Option<String>,
    pub instance_id: Option<String>,
    pub region: Option<String>,
    pub criticality: Criticality,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub version: Option<String>,
    pub port: u16,
    pub protocol: Protocol,
    pub state: ServiceState,
    pub banner: Option<String>,
    /// Natural key of the owning `Host`, so a service's identity stays
    /// stable across runs even though it carries no standalone source id.
    pub host_natural_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub number: u16,
    pub protocol: Protocol,
    pub state: PortState,
    pub host_natural_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub source: IdentitySource,
    pub source_id: String,
    pub username: String,
    pub email: Option<String>,
    pub user_type: UserType,
    pub enabled: bool,
    pub mfa_enabled: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub source: IdentitySource,
    pub source_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub source: IdentitySource,
    pub source_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub policy_type: PolicyType,
    pub source_id: String,
    pub name: String,
    pub rules: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subnet {
    pub cidr: String,
    pub region: Option<String>,
    pub is_public: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vpc {
    pub source_id: String,
    pub cidr: Option<String>,
    pub region: Option<String>,
    pub is_public: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub cve_id: String,
    pub cvss_score: Option<f64>,
    pub cvss_vector: Option<String>,
    pub epss_score: Option<f64>,
    pub severity: Severity,
    pub exploitable: bool,
    pub in_kev: bool,
    pub description: Option<String>,
    pub published_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    pub subject: String,
    pub issuer: String,
    pub serial: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub sha256_fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub name: String,
    pub app_type: String,
    pub provider: Option<String>,
    pub source_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpServer {
    pub name: String,
    pub endpoint: Option<String>,
    pub source_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub title: String,
    pub description: Option<String>,
    pub severity: Severity,
    pub resource_ref: Option<String>,
    pub source_id: String,
}

/// Every node variant named in the data model. `#[serde(tag = "label",
/// content = "attrs")]` keeps the wire shape self-describing without a
/// separate discriminant field to keep in sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "label", content = "attrs")]
pub enum NodeKind {
    Host(Host),
    Service(Service),
    Port(Port),
    User(User),
    Group(Group),
    Role(Role),
    Policy(Policy),
    Subnet(Subnet),
    Vpc(Vpc),
    Vulnerability(Vulnerability),
    Certificate(Certificate),
    Application(Application),
    McpServer(McpServer),
    Finding(Finding),
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Host(_) => "Host",
            NodeKind::Service(_) => "Service",
            NodeKind::Port(_) => "Port",
            NodeKind::User(_) => "User",
            NodeKind::Group(_) => "Group",
            NodeKind::Role(_) => "Role",
            NodeKind::Policy(_) => "Policy",
            NodeKind::Subnet(_) => "Subnet",
            NodeKind::Vpc(_) => "Vpc",
            NodeKind::Vulnerability(_) => "Vulnerability",
            NodeKind::Certificate(_) => "Certificate",
            NodeKind::Application(_) => "Application",
            NodeKind::McpServer(_) => "McpServer",
            NodeKind::Finding(_) => "Finding",
        }
    }

    /// Flat map of primitive-typed attributes, used both for storage as an
    /// opaque JSON blob in the graph adapter and as input to engram
    /// canonical serialization.
    pub fn properties(&self) -> PropertyMap {
        let mut map = PropertyMap::new();
        macro_rules! put {
            ($k:expr, $v:expr) => {
                map.insert($k.to_string(), PropertyValue::from($v));
            };
        }
        match self {
            NodeKind::Host(h) => {
                put!("ip", h.ip.clone());
                put!("hostname", h.hostname.clone());
                put!("os", h.os.clone());
                put!("mac", h.mac.clone());
                put!("provider", h.provider.clone());
                put!("instance_id", h.instance_id.clone());
                put!("region", h.region.clone());
                put!(
                    "criticality",
                    serde_json::to_value(h.criticality)
                        .ok()
                        .and_then(|v| v.as_str().map(str::to_string))
                );
                put!("tags", PropertyValue::StringList(h.tags.clone()));
            }
            NodeKind::Service(s) => {
                put!("name", s.name.clone());
                put!("version", s.version.clone());
                put!("port", s.port as i64);
                put!("protocol", format!("{:?}", s.protocol).to_lowercase());
                put!("state", format!("{:?}", s.state).to_lowercase());
                put!("banner", s.banner.clone());
            }
            NodeKind::Port(p) => {
                put!("number", p.number as i64);
                put!("protocol", format!("{:?}", p.protocol).to_lowercase());
                put!("state", format!("{:?}", p.state).to_lowercase());
            }
            NodeKind::User(u) => {
                put!("username", u.username.clone());
                put!("email", u.email.clone());
                put!("user_type", format!("{:?}", u.user_type).to_lowercase());
                put!("enabled", u.enabled);
                put!("mfa_enabled", u.mfa_enabled);
            }
            NodeKind::Group(g) => {
                put!("name", g.name.clone());
            }
            NodeKind::Role(r) => {
                put!("name", r.name.clone());
            }
            NodeKind::Policy(p) => {
                put!("name", p.name.clone());
                put!("policy_type", format!("{:?}", p.policy_type).to_lowercase());
                put!("rules", p.rules.to_string());
            }
            NodeKind::Subnet(s) => {
                put!("cidr", s.cidr.clone());
                put!("region", s.region.clone());
                put!("is_public", s.is_public);
            }
            NodeKind::Vpc(v) => {
                put!("cidr", v.cidr.clone());
                put!("region", v.region.clone());
                put!("is_public", v.is_public);
            }
            NodeKind::Vulnerability(v) => {
                put!("cve_id", v.cve_id.clone());
                put!("cvss_score", v.cvss_score);
                put!("cvss_vector", v.cvss_vector.clone());
                put!("epss_score", v.epss_score);
                put!(
                    "severity",
                    serde_json::to_value(v.severity)
                        .ok()
                        .and_then(|val| val.as_str().map(str::to_string))
                );
                put!("exploitable", v.exploitable);
                put!("in_kev", v.in_kev);
                put!("description", v.description.clone());
            }
            NodeKind::Certificate(c) => {
                put!("subject", c.subject.clone());
                put!("issuer", c.issuer.clone());
                put!("serial", c.serial.clone());
                put!("not_before", c.not_before.to_rfc3339());
                put!("not_after", c.not_after.to_rfc3339());
                put!("sha256_fingerprint", c.sha256_fingerprint.clone());
            }
            NodeKind::Application(a) => {
                put!("name", a.name.clone());
                put!("app_type", a.app_type.clone());
                put!("provider", a.provider.clone());
            }
            NodeKind::McpServer(m) => {
                put!("name", m.name.clone());
                put!("endpoint", m.endpoint.clone());
            }
            NodeKind::Finding(f) => {
                put!("title", f.title.clone());
                put!("description", f.description.clone());
                put!(
                    "severity",
                    serde_json::to_value(f.severity)
                        .ok()
                        .and_then(|val| val.as_str().map(str::to_string))
                );
                put!("resource_ref", f.resource_ref.clone());
            }
        }
        map
    }

    /// The source-native parts that make this node's fingerprint stable
    /// across re-discovery (I6). Never includes `first_seen`/`last_seen`
    /// or any other value that would change run to run.
    fn natural_key_parts(&self) -> Vec<String> {
        match self {
            NodeKind::Host(h) => vec![
                h.provider.clone().unwrap_or_default(),
                h.instance_id.clone().unwrap_or_else(|| h.ip.clone()),
            ],
            NodeKind::Service(s) => vec![
                s.host_natural_key.clone(),
                s.name.clone(),
                s.port.to_string(),
                format!("{:?}", s.protocol),
            ],
            NodeKind::Port(p) => vec![
                p.host_natural_key.clone(),
                p.number.to_string(),
                format!("{:?}", p.protocol),
            ],
            NodeKind::User(u) => vec![format!("{:?}", u.source), u.source_id.clone()],
            NodeKind::Group(g) => vec![format!("{:?}", g.source), g.source_id.clone()],
            NodeKind::Role(r) => vec![format!("{:?}", r.source), r.source_id.clone()],
            NodeKind::Policy(p) => vec![format!("{:?}", p.policy_type), p.source_id.clone()],
            NodeKind::Subnet(s) => vec![s.cidr.clone()],
            NodeKind::Vpc(v) => vec![v.source_id.clone()],
            NodeKind::Vulnerability(v) => vec![v.cve_id.clone()],
            NodeKind::Certificate(c) => vec![c.sha256_fingerprint.clone()],
            NodeKind::Application(a) => vec![a.source_id.clone()],
            NodeKind::McpServer(m) => vec![m.source_id.clone()],
            NodeKind::Finding(f) => vec![f.source_id.clone()],
        }
    }

    /// Deterministic fingerprint used as the node's `id` (I6).
    pub fn natural_key(&self) -> String {
        let parts = self.natural_key_parts();
        let parts_ref: Vec<&str> = parts.iter().map(String::as_str).collect();
        fingerprint(self.label(), &parts_ref)
    }
}

/// A node together with its tenant scoping and discovery timestamps.
/// `id` is always `kind.natural_key()` — there is deliberately no way to
/// construct a `Node` with an `id` that disagrees with its own kind, since
/// [`Node::new`] is the only constructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub tenant_id: TenantId,
    pub id: String,
    pub kind: NodeKind,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Node {
    /// Constructs a freshly-discovered node: `first_seen == last_seen ==
    /// now`. Upsert semantics (preserving `first_seen` across re-discovery)
    /// live in the graph adapter, not here.
    pub fn new(tenant_id: TenantId, kind: NodeKind, now: DateTime<Utc>) -> Self {
        let id = kind.natural_key();
        Self {
            tenant_id,
            id,
            kind,
            first_seen: now,
            last_seen: now,
        }
    }

    pub fn label(&self) -> &'static str {
        self.kind.label()
    }

    pub fn properties(&self) -> PropertyMap {
        self.kind.properties()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_host() -> NodeKind {
        NodeKind::Host(Host {
            ip: "10.0.0.1".into(),
            hostname: None,
            os: None,
            mac: None,
            provider: Some("aws".into()),
            instance_id: Some("i-1".into()),
            region: Some("us-east-1".into()),
            criticality: Criticality::Medium,
            tags: vec![],
        })
    }

    #[test]
    fn natural_key_is_stable_across_rediscovery() {
        let a = sample_host().natural_key();
        let b = sample_host().natural_key();
        assert_eq!(a, b);
    }

    #[test]
    fn natural_key_changes_with_identity_not_with_mutable_fields() {
        let mut mutated = sample_host();
        if let NodeKind::Host(ref mut h) = mutated {
            h.os = Some("linux".into());
            h.tags.push("prod".into());
        }
        assert_eq!(sample_host().natural_key(), mutated.natural_key());
    }

    #[test]
    fn different_labels_never_collide() {
        let host_key = sample_host().natural_key();
        let service = NodeKind::Service(Service {
            name: "nginx".into(),
            version: None,
            port: 443,
            protocol: Protocol::Https,
            state: ServiceState::Running,
            banner: None,
            host_natural_key: host_key.clone(),
        });
        assert_ne!(host_key, service.natural_key());
    }
}
