//! The adapter contract implemented by each concrete backend.

use crate::error::{Error, Result};
use crate::types::{Container, Network, UsageStats};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Options for creating and starting a container.
///
/// Built via [`RunOptions::builder`]; `image`, `name`, and `command` are
/// required, everything else is optional.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Image reference to run.
    pub image: String,
    /// Caller-chosen container name, unique among live containers.
    pub name: String,
    /// Argv to run as the container command.
    pub command: Vec<String>,
    /// Entrypoint override; empty keeps the image default.
    pub entrypoint: Vec<String>,
    /// Working directory inside the container.
    pub workdir: Option<String>,
    /// `host:container[:mode]` bind specifications, passed through to the
    /// engine unmodified.
    pub volumes: Vec<String>,
    /// Environment variables.
    pub env: HashMap<String, String>,
    /// Host folder bound read-write to `/tmp` inside the container.
    pub mount_folder: Option<String>,
    /// Labels attached to the container, usable as list/stats filters.
    pub labels: HashMap<String, String>,
    /// Network to attach at creation time.
    pub network: Option<String>,
    /// Ask the engine to delete the container once it exits.
    pub auto_remove: bool,
}

impl RunOptions {
    /// Create a new options builder.
    pub fn builder() -> RunOptionsBuilder {
        RunOptionsBuilder::default()
    }
}

/// Builder for [`RunOptions`].
#[derive(Debug, Default)]
pub struct RunOptionsBuilder {
    opts: RunOptions,
}

impl RunOptionsBuilder {
    /// Set the image reference.
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.opts.image = image.into();
        self
    }

    /// Set the container name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.opts.name = name.into();
        self
    }

    /// Set the command argv.
    pub fn command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.opts.command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Set the entrypoint override.
    pub fn entrypoint<I, S>(mut self, entrypoint: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.opts.entrypoint = entrypoint.into_iter().map(Into::into).collect();
        self
    }

    /// Set the working directory.
    pub fn workdir(mut self, workdir: impl Into<String>) -> Self {
        self.opts.workdir = Some(workdir.into());
        self
    }

    /// Add one `host:container[:mode]` bind.
    pub fn volume(mut self, spec: impl Into<String>) -> Self {
        self.opts.volumes.push(spec.into());
        self
    }

    /// Add one environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.opts.env.insert(key.into(), value.into());
        self
    }

    /// Set the host folder bound to `/tmp`.
    pub fn mount_folder(mut self, folder: impl Into<String>) -> Self {
        self.opts.mount_folder = Some(folder.into());
        self
    }

    /// Add one label.
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.opts.labels.insert(key.into(), value.into());
        self
    }

    /// Set the network to attach at creation time.
    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.opts.network = Some(network.into());
        self
    }

    /// Request engine-side deletion once the container exits.
    pub fn auto_remove(mut self, auto_remove: bool) -> Self {
        self.opts.auto_remove = auto_remove;
        self
    }

    /// Build the options, validating required fields.
    pub fn build(self) -> Result<RunOptions> {
        if self.opts.image.is_empty() {
            return Err(Error::InvalidOptions("image is required".into()));
        }
        if self.opts.name.is_empty() {
            return Err(Error::InvalidOptions("name is required".into()));
        }
        if self.opts.command.is_empty() {
            return Err(Error::InvalidOptions("command is required".into()));
        }
        Ok(self.opts)
    }
}

/// Target selection for [`Engine::stats`].
///
/// Identifier and filter query modes are mutually exclusive by
/// construction.
#[derive(Debug, Clone, Default)]
pub enum StatsQuery {
    /// Every running container.
    #[default]
    All,
    /// One container by exact ID or name.
    Container(String),
    /// Flat key=value equality filters (e.g. `label` → `team=infra`).
    Filters(HashMap<String, String>),
}

/// Uniform contract over one concrete container engine backend.
///
/// Every operation resolves only after the engine has acknowledged
/// completion (or, for [`Engine::execute`], after output capture finished).
/// Expected, recoverable negative outcomes return `Ok(false)`; raised
/// errors are reserved for unexpected or transport-level conditions —
/// collapsing the two channels loses a caller-visible distinction.
///
/// Concurrent calls against the same container are serialized by the
/// engine, not by this layer; nothing is retried here.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Backend name, for diagnostics.
    fn name(&self) -> &'static str;

    /// Set the CPU limit applied to subsequently created containers.
    /// Not retroactive.
    fn set_cpus(&self, cpus: f64);

    /// Set the memory limit in MiB applied to subsequently created
    /// containers. Not retroactive.
    fn set_memory_mib(&self, mib: u64);

    /// Pull an image. Returns `Ok(false)` when the image cannot be
    /// resolved — a common, recoverable outcome, distinct from transport
    /// failures which propagate as errors.
    async fn pull(&self, image: &str) -> Result<bool>;

    /// Create and start a container, returning the engine-assigned ID.
    ///
    /// Fails with [`Error::Conflict`] when the name is already in use
    /// (the engine's own constraint, surfaced rather than pre-checked).
    async fn run(&self, opts: RunOptions) -> Result<String>;

    /// Run `command` inside an already-running container, appending
    /// captured output to the caller-owned `stdout`/`stderr` buffers.
    ///
    /// Returns `Ok(true)` on zero exit status, `Ok(false)` otherwise.
    /// Fails with [`Error::Timeout`] when `timeout` elapses first; output
    /// produced before the deadline is still present in the buffers.
    /// Fails with [`Error::NotFound`] when the container does not exist.
    async fn execute(
        &self,
        container: &str,
        command: &[String],
        stdout: &mut String,
        stderr: &mut String,
        env: &HashMap<String, String>,
        timeout: Option<Duration>,
    ) -> Result<bool>;

    /// List containers matching flat key=value filters (`id`, `name`,
    /// `label`, `status`). An empty map lists every container.
    /// Unrecognized keys surface the engine's rejection rather than
    /// silently matching everything.
    async fn list(&self, filters: &HashMap<String, String>) -> Result<Vec<Container>>;

    /// Remove a container by ID or name. Fails with [`Error::NotFound`]
    /// when it does not resolve, including double-removal.
    async fn remove(&self, container: &str, force: bool) -> Result<bool>;

    /// Create a named network. `internal` restricts external access.
    async fn create_network(&self, name: &str, internal: bool) -> Result<bool>;

    /// Remove a network by name.
    async fn remove_network(&self, name: &str) -> Result<bool>;

    /// List networks.
    async fn list_networks(&self) -> Result<Vec<Network>>;

    /// Connect a container to a network.
    async fn network_connect(&self, container: &str, network: &str) -> Result<bool>;

    /// Disconnect a container from a network.
    async fn network_disconnect(&self, container: &str, network: &str, force: bool)
        -> Result<bool>;

    /// Sample resource usage for the selected containers.
    ///
    /// Results follow the engine's reporting order. Filter queries that
    /// match nothing yield an empty vector; an explicit identifier that
    /// resolves to nothing fails with [`Error::NotFound`].
    async fn stats(&self, query: StatsQuery) -> Result<Vec<UsageStats>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_minimal() {
        let opts = RunOptions::builder()
            .image("alpine:3.20")
            .name("worker")
            .command(["sh", "-c", "true"])
            .build()
            .unwrap();
        assert_eq!(opts.image, "alpine:3.20");
        assert_eq!(opts.command.len(), 3);
        assert!(!opts.auto_remove);
    }

    #[test]
    fn test_builder_accumulates_volumes_env_labels() {
        let opts = RunOptions::builder()
            .image("alpine")
            .name("worker")
            .command(["true"])
            .volume("/data:/data:ro")
            .volume("/cache:/cache")
            .env("FOO", "bar")
            .label("team", "infra")
            .mount_folder("/srv/resources")
            .network("backend")
            .auto_remove(true)
            .build()
            .unwrap();
        assert_eq!(opts.volumes.len(), 2);
        assert_eq!(opts.env.get("FOO").map(String::as_str), Some("bar"));
        assert_eq!(opts.labels.get("team").map(String::as_str), Some("infra"));
        assert_eq!(opts.mount_folder.as_deref(), Some("/srv/resources"));
        assert!(opts.auto_remove);
    }

    #[test]
    fn test_builder_rejects_missing_fields() {
        assert!(matches!(
            RunOptions::builder().name("x").command(["true"]).build(),
            Err(Error::InvalidOptions(_))
        ));
        assert!(matches!(
            RunOptions::builder().image("alpine").command(["true"]).build(),
            Err(Error::InvalidOptions(_))
        ));
        assert!(matches!(
            RunOptions::builder().image("alpine").name("x").build(),
            Err(Error::InvalidOptions(_))
        ));
    }
}
