//! Core domain model shared by every Sentinel crate: tenant context, node
//! and edge variants, severity/criticality enums, and natural-key
//! fingerprinting. Time is always an explicit parameter here, never read
//! from a hidden clock, so discovery operations stay deterministic in
//! tests.

pub mod edge;
pub mod error;
pub mod events;
pub mod natural_key;
pub mod node;
pub mod property;
pub mod severity;
pub mod tenant;

pub use edge::{Edge, EdgeAttrs, EdgeType};
pub use error::CoreError;
pub use events::{DomainEvent, EventEnvelope, EventPublisher, NullEventPublisher};
pub use node::{
    Application, Certificate, Finding, Group, Host, IdentitySource, McpServer, Node, NodeKind,
    Policy, PolicyType, Port, PortState, Protocol, Role, Service, ServiceState, Subnet, User,
    UserType, Vpc, Vulnerability,
};
pub use property::{PropertyMap, PropertyValue};
pub use severity::{is_actionable_for_remediation, severity_for_cvss, Criticality, Severity};
pub use tenant::{TenantContext, TenantId};
