//! # berth-docker
//!
//! Docker backends for the Berth orchestration façade.
//!
//! Two adapters implement [`berth_core::Engine`] against the same engine
//! through different transports:
//!
//! - [`DockerApi`] — the Engine HTTP API over the local socket (bollard).
//! - [`DockerCli`] — the `docker` client binary as a child process.
//!
//! Behavior is intentionally identical between the two; a caller holding
//! an `Orchestration` cannot tell which transport is underneath. The one
//! observable difference is statistics sourcing: the API adapter samples
//! raw counters itself, while the CLI adapter parses the ratios the client
//! already computed.

mod api;
mod cli;
mod limits;

pub use api::DockerApi;
pub use cli::DockerCli;
