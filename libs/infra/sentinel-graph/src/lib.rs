//! Typed, tenant-scoped adapter over the property-graph backend. This is
//! the only crate that issues raw queries against `nodes`/`edges`; every
//! other component goes through [`GraphStore`].

pub mod client;
pub mod error;
pub mod retry;
pub mod schema;
pub mod store;
pub mod time_fmt;

pub use client::GraphClient;
pub use error::GraphError;
pub use store::{
    BatchResult, Direction, EdgeApplyOutcome, GraphStats, GraphStore, NodeFilter, Page,
    StoredNode, UpsertResult,
};
