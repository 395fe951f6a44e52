pub mod config;
pub mod error;
pub mod handlers;
pub mod kernel;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod state;

pub mod prelude {
    pub use crate::config::OrchestratorConfig;
    pub use crate::error::OrchestratorError;
    pub use crate::kernel::OrchestratorKernel;
    pub use crate::state::AppState;
}
