//! State-driven orchestration of a requirements → architecture → code → audit
//! pipeline.
//!
//! Every iteration rebuilds a [`state::ProjectState`] from the workspace files,
//! asks [`decision::decide`] for one action and runs it through the
//! [`executor::ActionExecutor`]. The filesystem is the only durable state.

pub mod agents;
pub mod conductor_config;
pub mod config;
pub mod decision;
pub mod errors;
pub mod executor;
pub mod logging;
pub mod markers;
pub mod orchestrator;
pub mod resolve;
pub mod scope;
pub mod state;
pub mod stream;
pub mod templates;
pub mod transcript;
pub mod ui;
pub mod workspace;
