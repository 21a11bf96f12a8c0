//! Value records returned by the adapters.
//!
//! These are point-in-time reads owned by the engine; nothing here is
//! cached by the adapters beyond a single call's response.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;

/// Engine-reported container state.
///
/// There is no paused state in this contract; anything the engine reports
/// beyond the known set is carried through as `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerStatus {
    /// Created but not started.
    Created,
    /// Running.
    Running,
    /// Exited (stopped or finished).
    Exited,
    /// Any other engine-reported state, carried verbatim.
    Unknown(String),
}

impl ContainerStatus {
    /// Parse an engine-reported state string.
    pub fn parse(state: &str) -> Self {
        match state.to_ascii_lowercase().as_str() {
            "created" => Self::Created,
            "running" | "up" => Self::Running,
            "exited" | "dead" => Self::Exited,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Exited => write!(f, "exited"),
            Self::Unknown(s) => write!(f, "{s}"),
        }
    }
}

/// A container as reported by the engine at one point in time.
#[derive(Debug, Clone)]
pub struct Container {
    /// Engine-assigned ID, opaque and unique per engine instance.
    pub id: String,
    /// Caller-chosen name, unique among live containers.
    pub name: String,
    /// Image reference the container was created from.
    pub image: String,
    /// Engine-reported state.
    pub status: ContainerStatus,
    /// Labels attached at creation time, usable as filters.
    pub labels: HashMap<String, String>,
    /// Creation time, when the backend reports one.
    pub created_at: Option<DateTime<Utc>>,
}

/// A network as reported by the engine.
#[derive(Debug, Clone)]
pub struct Network {
    /// Engine-assigned ID.
    pub id: String,
    /// Unique network name.
    pub name: String,
    /// Network driver (e.g. `bridge`).
    pub driver: String,
    /// Engine scope (e.g. `local`).
    pub scope: String,
}

/// Cumulative `{in, out}` byte counters since container start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoPair {
    /// Bytes in (read / received).
    pub bytes_in: u64,
    /// Bytes out (written / sent).
    pub bytes_out: u64,
}

impl IoPair {
    /// Construct a pair.
    pub fn new(bytes_in: u64, bytes_out: u64) -> Self {
        Self {
            bytes_in,
            bytes_out,
        }
    }
}

/// Point-in-time resource usage snapshot for one container.
///
/// Ephemeral: computed on demand and never persisted. Two consecutive
/// samplings are not guaranteed numerically identical.
#[derive(Debug, Clone)]
pub struct UsageStats {
    /// Engine-assigned container ID.
    pub container_id: String,
    /// Container name.
    pub container_name: String,
    /// CPU utilization ratio over the sampling window. Dimensionless;
    /// can exceed 1.0 when a container bursts across cores.
    pub cpu_usage: f64,
    /// Memory in use as a ratio of the container's memory limit, 0.0–1.0.
    pub memory_usage: f64,
    /// Cumulative block-device bytes.
    pub disk_io: IoPair,
    /// Cumulative memory I/O bytes.
    pub memory_io: IoPair,
    /// Cumulative network-interface bytes.
    pub network_io: IoPair,
}
