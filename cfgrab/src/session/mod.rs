//! Session execution.
//!
//! A [`SessionPlan`] binds a vendor protocol to one device and its
//! credentials; a [`SessionEngine`] runs that plan over a terminal channel
//! and returns the captured configuration or a classified failure.

mod config;
mod engine;
mod plan;
mod state;

pub use config::{DEFAULT_CLOSE_TIMEOUT, DEFAULT_SEARCH_DEPTH, DEFAULT_TIMEOUT, EngineConfig};
pub use engine::{SessionEngine, run};
pub use plan::SessionPlan;
pub use state::SessionState;
