//! # berth-core
//!
//! Backend-agnostic core of the Berth container orchestration façade.
//!
//! Berth presents one uniform surface — image pull, container lifecycle,
//! in-container execution, network management, live resource statistics —
//! over any Docker-compatible engine. This crate defines the contract and
//! the engine-independent machinery; concrete backends (native Engine API,
//! CLI shim) live in adapter crates and plug in behind the [`Engine`]
//! trait.
//!
//! ## Architecture
//!
//! ```text
//! caller ──▶ Orchestration ──▶ Engine (adapter) ──▶ transport ──▶ engine
//!                │                   │
//!                │                   ├── Deadline   (bounded execute)
//!                └── parse_command   └── stats      (counter → ratios)
//! ```
//!
//! The façade holds exactly one adapter for its lifetime and delegates
//! every call unchanged. Expected negative outcomes (an image that does
//! not resolve) come back as `Ok(false)`; raised [`Error`]s are reserved
//! for unexpected and transport-level conditions.
//!
//! ## Quick Start
//!
//! ```ignore
//! use berth_core::{Orchestration, RunOptions, StatsQuery};
//!
//! # async fn example(engine: Box<dyn berth_core::Engine>) -> berth_core::Result<()> {
//! let orchestration = Orchestration::new(engine);
//!
//! orchestration.pull("alpine:3.20").await?;
//! let id = orchestration
//!     .run(
//!         RunOptions::builder()
//!             .image("alpine:3.20")
//!             .name("worker")
//!             .command(["sh", "-c", "tail -f /dev/null"])
//!             .build()?,
//!     )
//!     .await?;
//!
//! let mut stdout = String::new();
//! let mut stderr = String::new();
//! orchestration
//!     .execute_shell(&id, "echo hello", &mut stdout, &mut stderr, &Default::default(), None)
//!     .await?;
//!
//! let stats = orchestration.stats(StatsQuery::Container(id.clone())).await?;
//! orchestration.remove(&id, true).await?;
//! # Ok(())
//! # }
//! ```

mod command;
mod deadline;
mod engine;
mod error;
mod orchestration;
pub mod stats;
mod types;

pub use command::parse_command;
pub use deadline::Deadline;
pub use engine::{Engine, RunOptions, RunOptionsBuilder, StatsQuery};
pub use error::{Error, Result};
pub use orchestration::Orchestration;
pub use stats::{compute_all, compute_one, RawSnapshot};
pub use types::{Container, ContainerStatus, IoPair, Network, UsageStats};
