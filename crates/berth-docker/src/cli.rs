//! Docker CLI shim backend.
//!
//! Drives the `docker` binary as a child process instead of talking to the
//! daemon directly. Useful where the socket is not reachable but the CLI
//! is, and as a cross-check against the API backend. Listing and stats use
//! the CLI's `{{json .}}` format so the output stays machine-parseable
//! across client versions.

use async_trait::async_trait;
use berth_core::stats::{parse_percent, parse_size_pair};
use berth_core::{
    Container, ContainerStatus, Deadline, Engine, Error, Network, Result, RunOptions, StatsQuery,
    UsageStats,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::process::{Output, Stdio};
use std::sync::RwLock;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::limits::Limits;

/// [`Engine`] backend shelling out to the `docker` CLI.
pub struct DockerCli {
    binary: String,
    limits: RwLock<Limits>,
}

impl DockerCli {
    /// Use the `docker` binary found on `PATH`.
    pub fn new() -> Self {
        Self::with_binary("docker")
    }

    /// Use a specific client binary (e.g. `podman`, or an absolute path).
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            limits: RwLock::new(Limits::default()),
        }
    }

    fn limits(&self) -> Limits {
        match self.limits.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    async fn run_cli(&self, args: &[String]) -> Result<Output> {
        tracing::trace!(args = ?args, "invoking docker cli");
        Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Transport(format!("failed to spawn {}: {e}", self.binary)))
    }

    /// Run a CLI command where any failure is a raised error.
    async fn run_cli_checked(&self, args: &[String]) -> Result<String> {
        let output = self.run_cli(args).await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(classify_stderr(&String::from_utf8_lossy(&output.stderr)))
        }
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Engine for DockerCli {
    fn name(&self) -> &'static str {
        "docker-cli"
    }

    fn set_cpus(&self, cpus: f64) {
        if let Ok(mut limits) = self.limits.write() {
            limits.cpus = Some(cpus);
        }
    }

    fn set_memory_mib(&self, mib: u64) {
        if let Ok(mut limits) = self.limits.write() {
            limits.memory_mib = Some(mib);
        }
    }

    async fn pull(&self, image: &str) -> Result<bool> {
        tracing::info!(image = %image, "pulling image");
        let output = self
            .run_cli(&["pull".to_string(), image.to_string()])
            .await?;
        if output.status.success() {
            return Ok(true);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_unresolvable_image(&stderr) {
            tracing::debug!(image = %image, reason = %stderr.trim(), "image not resolvable");
            Ok(false)
        } else {
            Err(classify_stderr(&stderr))
        }
    }

    async fn run(&self, opts: RunOptions) -> Result<String> {
        let args = run_args(&opts, self.limits());
        let id = self.run_cli_checked(&args).await?;
        tracing::info!(container = %id, name = %opts.name, image = %opts.image, "container started");
        Ok(id)
    }

    async fn execute(
        &self,
        container: &str,
        command: &[String],
        stdout: &mut String,
        stderr: &mut String,
        env: &HashMap<String, String>,
        timeout: Option<Duration>,
    ) -> Result<bool> {
        let deadline = Deadline::new(timeout);
        let mut child = Command::new(&self.binary)
            .args(exec_args(container, command, env))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Transport(format!("failed to spawn {}: {e}", self.binary)))?;

        let out_pipe = child
            .stdout
            .take()
            .ok_or_else(|| Error::Transport("stdout pipe missing".to_string()))?;
        let err_pipe = child
            .stderr
            .take()
            .ok_or_else(|| Error::Transport("stderr pipe missing".to_string()))?;

        // Both pipes are drained concurrently, each chunk read bounded by
        // the same deadline, so partial output survives a timeout in the
        // caller's buffers.
        let pumped = futures::future::try_join(
            pump(out_pipe, stdout, &deadline),
            pump(err_pipe, stderr, &deadline),
        )
        .await;
        if let Err(err) = pumped {
            if matches!(err, Error::Timeout(_)) {
                tracing::warn!(container = %container, "execute deadline elapsed; killing client");
                let _ = child.kill().await;
            }
            return Err(err);
        }

        let status = match deadline.bound(child.wait()).await {
            Ok(waited) => waited?,
            Err(err) => {
                let _ = child.kill().await;
                return Err(err);
            }
        };

        if status.success() {
            return Ok(true);
        }
        // a missing or stopped container surfaces on the client's stderr,
        // already captured into the caller's buffer
        if let Some(err) = exec_failure(stderr) {
            return Err(err);
        }
        Ok(false)
    }

    async fn list(&self, filters: &HashMap<String, String>) -> Result<Vec<Container>> {
        let stdout = self.run_cli_checked(&ps_args(filters)).await?;
        let mut containers = parse_json_lines::<PsLine>(&stdout)?
            .into_iter()
            .map(Container::from)
            .collect::<Vec<_>>();
        // the client's name filter is a substring match; the contract is
        // exact
        if let Some(name) = filters.get("name") {
            containers.retain(|c| c.name == *name);
        }
        Ok(containers)
    }

    async fn remove(&self, container: &str, force: bool) -> Result<bool> {
        let mut args = vec!["rm".to_string()];
        if force {
            args.push("--force".to_string());
        }
        args.push(container.to_string());
        self.run_cli_checked(&args).await?;
        tracing::info!(container = %container, force, "container removed");
        Ok(true)
    }

    async fn create_network(&self, name: &str, internal: bool) -> Result<bool> {
        let mut args = vec!["network".to_string(), "create".to_string()];
        if internal {
            args.push("--internal".to_string());
        }
        args.push(name.to_string());
        self.run_cli_checked(&args).await?;
        tracing::info!(network = %name, internal, "network created");
        Ok(true)
    }

    async fn remove_network(&self, name: &str) -> Result<bool> {
        self.run_cli_checked(&[
            "network".to_string(),
            "rm".to_string(),
            name.to_string(),
        ])
        .await?;
        tracing::info!(network = %name, "network removed");
        Ok(true)
    }

    async fn list_networks(&self) -> Result<Vec<Network>> {
        let stdout = self
            .run_cli_checked(&[
                "network".to_string(),
                "ls".to_string(),
                "--no-trunc".to_string(),
                "--format".to_string(),
                "{{json .}}".to_string(),
            ])
            .await?;
        Ok(parse_json_lines::<NetworkLine>(&stdout)?
            .into_iter()
            .map(Network::from)
            .collect())
    }

    async fn network_connect(&self, container: &str, network: &str) -> Result<bool> {
        self.run_cli_checked(&[
            "network".to_string(),
            "connect".to_string(),
            network.to_string(),
            container.to_string(),
        ])
        .await?;
        Ok(true)
    }

    async fn network_disconnect(
        &self,
        container: &str,
        network: &str,
        force: bool,
    ) -> Result<bool> {
        let mut args = vec!["network".to_string(), "disconnect".to_string()];
        if force {
            args.push("--force".to_string());
        }
        args.push(network.to_string());
        args.push(container.to_string());
        self.run_cli_checked(&args).await?;
        Ok(true)
    }

    async fn stats(&self, query: StatsQuery) -> Result<Vec<UsageStats>> {
        let mut args = vec![
            "stats".to_string(),
            "--no-stream".to_string(),
            "--no-trunc".to_string(),
            "--format".to_string(),
            "{{json .}}".to_string(),
        ];
        match query {
            StatsQuery::All => {}
            StatsQuery::Container(ident) => args.push(ident),
            StatsQuery::Filters(filters) => {
                // the stats subcommand takes no filters; resolve them
                // through a listing first
                let matched: Vec<Container> = self
                    .list(&filters)
                    .await?
                    .into_iter()
                    .filter(|c| c.status == ContainerStatus::Running)
                    .collect();
                if matched.is_empty() {
                    return Ok(vec![]);
                }
                args.extend(matched.into_iter().map(|c| c.id));
            }
        }
        let stdout = self.run_cli_checked(&args).await?;
        Ok(parse_json_lines::<StatsLine>(&stdout)?
            .into_iter()
            .map(UsageStats::from)
            .collect())
    }
}

/// Client failures reported on exec's stderr that must raise instead of
/// reading as a non-zero command exit. "is not running" is the client's
/// wording for the daemon's 409 on exec against a stopped container, so
/// both adapters raise the same error there.
fn exec_failure(stderr: &str) -> Option<Error> {
    let lower = stderr.to_lowercase();
    if lower.contains("no such container") {
        Some(Error::NotFound(stderr.trim().to_string()))
    } else if lower.contains("is not running") {
        Some(Error::Conflict(stderr.trim().to_string()))
    } else {
        None
    }
}

/// Drain one pipe into a caller-owned buffer, chunk reads bounded by the
/// shared deadline. A multi-byte UTF-8 sequence split across chunk reads
/// stays buffered until its remaining bytes arrive; whatever has decoded
/// so far is already in the sink when a timeout fires.
async fn pump<R>(mut pipe: R, sink: &mut String, deadline: &Deadline) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 4096];
    let mut pending: Vec<u8> = Vec::new();
    loop {
        let n = match deadline.bound(pipe.read(&mut buf)).await {
            Ok(read) => read?,
            Err(err) => {
                sink.push_str(&String::from_utf8_lossy(&pending));
                return Err(err);
            }
        };
        if n == 0 {
            sink.push_str(&String::from_utf8_lossy(&pending));
            return Ok(());
        }
        pending.extend_from_slice(&buf[..n]);
        flush_decoded(&mut pending, sink);
    }
}

/// Move the valid UTF-8 prefix of `pending` into `sink`, replacing any
/// truly invalid bytes and keeping at most one incomplete trailing
/// sequence buffered.
fn flush_decoded(pending: &mut Vec<u8>, sink: &mut String) {
    loop {
        let err = match std::str::from_utf8(pending) {
            Ok(s) => {
                sink.push_str(s);
                pending.clear();
                return;
            }
            Err(err) => err,
        };
        let valid = err.valid_up_to();
        sink.push_str(&String::from_utf8_lossy(&pending[..valid]));
        match err.error_len() {
            Some(bad) => {
                sink.push('\u{FFFD}');
                pending.drain(..valid + bad);
            }
            // incomplete sequence at the end; wait for the next chunk
            None => {
                pending.drain(..valid);
                return;
            }
        }
    }
}

fn run_args(opts: &RunOptions, limits: Limits) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "--detach".to_string(),
        "--name".to_string(),
        opts.name.clone(),
    ];
    if let Some(workdir) = &opts.workdir {
        args.push("--workdir".to_string());
        args.push(workdir.clone());
    }
    for volume in &opts.volumes {
        args.push("--volume".to_string());
        args.push(volume.clone());
    }
    if let Some(folder) = &opts.mount_folder {
        args.push("--volume".to_string());
        args.push(format!("{folder}:/tmp:rw"));
    }
    for (key, value) in sorted(&opts.env) {
        args.push("--env".to_string());
        args.push(format!("{key}={value}"));
    }
    for (key, value) in sorted(&opts.labels) {
        args.push("--label".to_string());
        args.push(format!("{key}={value}"));
    }
    if let Some(network) = &opts.network {
        args.push("--network".to_string());
        args.push(network.clone());
    }
    if opts.auto_remove {
        args.push("--rm".to_string());
    }
    if let Some(cpus) = limits.cpus {
        args.push("--cpus".to_string());
        args.push(cpus.to_string());
    }
    if let Some(mib) = limits.memory_mib {
        args.push("--memory".to_string());
        args.push(format!("{mib}m"));
    }
    // the client accepts a single entrypoint token; extra tokens become
    // leading command arguments
    let mut entrypoint = opts.entrypoint.iter();
    if let Some(first) = entrypoint.next() {
        args.push("--entrypoint".to_string());
        args.push(first.clone());
    }
    args.push(opts.image.clone());
    args.extend(entrypoint.cloned());
    args.extend(opts.command.iter().cloned());
    args
}

fn exec_args(
    container: &str,
    command: &[String],
    env: &HashMap<String, String>,
) -> Vec<String> {
    let mut args = vec!["exec".to_string()];
    for (key, value) in sorted(env) {
        args.push("--env".to_string());
        args.push(format!("{key}={value}"));
    }
    args.push(container.to_string());
    args.extend(command.iter().cloned());
    args
}

fn ps_args(filters: &HashMap<String, String>) -> Vec<String> {
    let mut args = vec![
        "ps".to_string(),
        "--all".to_string(),
        "--no-trunc".to_string(),
        "--format".to_string(),
        "{{json .}}".to_string(),
    ];
    for (key, value) in sorted(filters) {
        args.push("--filter".to_string());
        args.push(format!("{key}={value}"));
    }
    args
}

/// Deterministic argv order for map-backed options.
fn sorted(map: &HashMap<String, String>) -> Vec<(&String, &String)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by_key(|(key, _)| key.as_str());
    entries
}

fn parse_json_lines<T: for<'de> Deserialize<'de>>(stdout: &str) -> Result<Vec<T>> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str(line)
                .map_err(|e| Error::Parse(format!("malformed client output line: {e}")))
        })
        .collect()
}

/// One `docker ps --format "{{json .}}"` line.
#[derive(Debug, Deserialize)]
struct PsLine {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Names")]
    names: String,
    #[serde(rename = "Image")]
    image: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Labels", default)]
    labels: String,
    #[serde(rename = "CreatedAt", default)]
    created_at: String,
}

impl From<PsLine> for Container {
    fn from(line: PsLine) -> Self {
        Container {
            id: line.id,
            name: line
                .names
                .split(',')
                .next()
                .unwrap_or_default()
                .trim_start_matches('/')
                .to_string(),
            image: line.image,
            status: ContainerStatus::parse(&line.state),
            labels: parse_label_list(&line.labels),
            created_at: parse_created_at(&line.created_at),
        }
    }
}

/// One `docker network ls --format "{{json .}}"` line.
#[derive(Debug, Deserialize)]
struct NetworkLine {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Driver", default)]
    driver: String,
    #[serde(rename = "Scope", default)]
    scope: String,
}

impl From<NetworkLine> for Network {
    fn from(line: NetworkLine) -> Self {
        Network {
            id: line.id,
            name: line.name,
            driver: line.driver,
            scope: line.scope,
        }
    }
}

/// One `docker stats --no-stream --format "{{json .}}"` line. The client
/// has already computed ratios over its own sampling window, so these
/// parse directly instead of going through the two-read calculator.
#[derive(Debug, Deserialize)]
struct StatsLine {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "CPUPerc", default)]
    cpu_percent: String,
    #[serde(rename = "MemPerc", default)]
    mem_percent: String,
    #[serde(rename = "MemUsage", default)]
    mem_usage: String,
    #[serde(rename = "NetIO", default)]
    net_io: String,
    #[serde(rename = "BlockIO", default)]
    block_io: String,
}

impl From<StatsLine> for UsageStats {
    fn from(line: StatsLine) -> Self {
        UsageStats {
            container_id: line.id,
            container_name: line.name,
            cpu_usage: parse_percent(&line.cpu_percent).unwrap_or(0.0),
            memory_usage: parse_percent(&line.mem_percent).unwrap_or(0.0),
            disk_io: parse_size_pair(&line.block_io).unwrap_or_default(),
            memory_io: parse_size_pair(&line.mem_usage).unwrap_or_default(),
            network_io: parse_size_pair(&line.net_io).unwrap_or_default(),
        }
    }
}

/// Parse the `k1=v1,k2=v2` label list the client formats.
fn parse_label_list(labels: &str) -> HashMap<String, String> {
    labels
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

/// Parse the client's `CreatedAt` column, e.g.
/// `2024-06-01 12:30:00 +0200 CEST`. The trailing zone name duplicates the
/// numeric offset and is dropped.
fn parse_created_at(value: &str) -> Option<DateTime<Utc>> {
    let fields: Vec<&str> = value.split_whitespace().take(3).collect();
    if fields.len() < 3 {
        return None;
    }
    DateTime::parse_from_str(&fields.join(" "), "%Y-%m-%d %H:%M:%S %z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Map a failed client invocation's stderr onto the shared taxonomy.
fn classify_stderr(stderr: &str) -> Error {
    let message = stderr.trim().to_string();
    let lower = message.to_lowercase();
    if lower.contains("no such container")
        || lower.contains("no such network")
        || lower.contains("no such image")
        || lower.contains("no such object")
        || lower.contains("not found")
    {
        Error::NotFound(message)
    } else if lower.contains("already in use") || lower.contains("already exists") {
        Error::Conflict(message)
    } else {
        Error::Engine(message)
    }
}

/// Registry-side rejections reported by a failed pull.
fn is_unresolvable_image(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("not found")
        || lower.contains("manifest unknown")
        || lower.contains("pull access denied")
        || lower.contains("does not exist")
}
