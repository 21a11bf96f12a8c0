//! Docker Engine API backend.
//!
//! Talks to the daemon directly over its local socket via [`bollard`].
//! Daemon-reported HTTP failures map onto the shared error taxonomy by
//! status code (404 → `NotFound`, 409 → `Conflict`); everything below the
//! HTTP layer is a `Transport` error.

use async_trait::async_trait;
use berth_core::stats;
use berth_core::{
    Container, ContainerStatus, Deadline, Engine, Error, IoPair, Network, RawSnapshot, Result,
    RunOptions, StatsQuery, UsageStats,
};
use bollard::container::{
    BlkioStatsEntry, Config, CreateContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StartContainerOptions, Stats, StatsOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::{
    ContainerSummary, EndpointSettings, HostConfig, Network as NetworkModel,
};
use bollard::network::{
    ConnectNetworkOptions, CreateNetworkOptions, DisconnectNetworkOptions, ListNetworksOptions,
};
use bollard::Docker;
use chrono::DateTime;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use crate::limits::Limits;

/// Counter sampling window shared by every container in one stats call.
const SAMPLE_WINDOW: Duration = Duration::from_secs(1);

/// [`Engine`] backend using the Docker Engine HTTP API.
pub struct DockerApi {
    docker: Docker,
    limits: RwLock<Limits>,
}

impl DockerApi {
    /// Connect to the local daemon and verify it responds.
    pub async fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| Error::Transport(e.to_string()))?;
        docker
            .ping()
            .await
            .map_err(|e| Error::Transport(format!("daemon did not respond to ping: {e}")))?;
        tracing::debug!("connected to docker daemon");
        Ok(Self {
            docker,
            limits: RwLock::new(Limits::default()),
        })
    }

    /// Wrap an existing client, for callers with custom connection setup.
    pub fn from_client(docker: Docker) -> Self {
        Self {
            docker,
            limits: RwLock::new(Limits::default()),
        }
    }

    fn limits(&self) -> Limits {
        match self.limits.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// One counter read for a single container.
    async fn sample(&self, id: &str) -> Result<Sample> {
        let options = StatsOptions {
            stream: false,
            one_shot: true,
        };
        let raw = self
            .docker
            .stats(id, Some(options))
            .next()
            .await
            .ok_or_else(|| Error::Engine(format!("no stats reported for {id}")))?
            .map_err(map_engine_error)?;
        Ok(Sample::from(raw))
    }

    /// Resolve a stats query to the containers it addresses.
    async fn stats_targets(&self, query: &StatsQuery) -> Result<Vec<Container>> {
        match query {
            StatsQuery::All => {
                let filters = HashMap::from([("status".to_string(), "running".to_string())]);
                self.list(&filters).await
            }
            StatsQuery::Container(ident) => {
                let by_id = HashMap::from([("id".to_string(), ident.clone())]);
                let mut matched = self.list(&by_id).await?;
                if matched.is_empty() {
                    let by_name = HashMap::from([("name".to_string(), ident.clone())]);
                    matched = self.list(&by_name).await?;
                }
                match matched.into_iter().next() {
                    Some(container) => Ok(vec![container]),
                    None => Err(Error::NotFound(format!("no container {ident}"))),
                }
            }
            StatsQuery::Filters(filters) => self.list(filters).await,
        }
    }
}

#[async_trait]
impl Engine for DockerApi {
    fn name(&self) -> &'static str {
        "docker-api"
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
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };
        let mut progress = self.docker.create_image(Some(options), None, None);
        while let Some(item) = progress.next().await {
            match item {
                Ok(info) => {
                    if let Some(status) = info.status {
                        tracing::trace!(status = %status, "pull progress");
                    }
                }
                Err(err) => {
                    return match map_engine_error(err) {
                        Error::NotFound(reason) => {
                            tracing::debug!(image = %image, reason = %reason, "image not resolvable");
                            Ok(false)
                        }
                        Error::Engine(reason) if is_unresolvable_image(&reason) => {
                            tracing::debug!(image = %image, reason = %reason, "image not resolvable");
                            Ok(false)
                        }
                        other => Err(other),
                    };
                }
            }
        }
        Ok(true)
    }

    async fn run(&self, opts: RunOptions) -> Result<String> {
        let limits = self.limits();
        let mut binds = opts.volumes.clone();
        if let Some(folder) = &opts.mount_folder {
            binds.push(format!("{folder}:/tmp:rw"));
        }
        let env: Vec<String> = opts.env.iter().map(|(k, v)| format!("{k}={v}")).collect();

        let host_config = HostConfig {
            binds: (!binds.is_empty()).then_some(binds),
            auto_remove: opts.auto_remove.then_some(true),
            network_mode: opts.network.clone(),
            nano_cpus: limits.cpus.map(|c| (c * 1e9) as i64),
            memory: limits.memory_mib.map(|m| m as i64 * 1024 * 1024),
            ..Default::default()
        };
        let config = Config {
            image: Some(opts.image.clone()),
            cmd: Some(opts.command.clone()),
            entrypoint: (!opts.entrypoint.is_empty()).then(|| opts.entrypoint.clone()),
            env: (!env.is_empty()).then_some(env),
            working_dir: opts.workdir.clone(),
            labels: (!opts.labels.is_empty()).then(|| opts.labels.clone()),
            host_config: Some(host_config),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: opts.name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(map_engine_error)?;
        self.docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(map_engine_error)?;

        tracing::info!(
            container = %created.id,
            name = %opts.name,
            image = %opts.image,
            "container started"
        );
        Ok(created.id)
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
        let env: Vec<String> = env.iter().map(|(k, v)| format!("{k}={v}")).collect();

        let exec = self
            .docker
            .create_exec(
                container,
                CreateExecOptions {
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    cmd: Some(command.to_vec()),
                    env: (!env.is_empty()).then_some(env),
                    ..Default::default()
                },
            )
            .await
            .map_err(map_engine_error)?;

        let started = self
            .docker
            .start_exec(&exec.id, None::<StartExecOptions>)
            .await
            .map_err(map_engine_error)?;

        if let StartExecResults::Attached { mut output, .. } = started {
            // Each chunk read is bounded by the one shared deadline, so
            // everything received before a timeout is already in the
            // caller's buffers. Dropping the stream abandons the exec.
            loop {
                let item = match deadline.bound(output.next()).await {
                    Ok(item) => item,
                    Err(err) => {
                        tracing::warn!(container = %container, "execute deadline elapsed");
                        return Err(err);
                    }
                };
                let Some(item) = item else { break };
                match item.map_err(map_engine_error)? {
                    bollard::container::LogOutput::StdOut { message }
                    | bollard::container::LogOutput::Console { message } => {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    bollard::container::LogOutput::StdErr { message } => {
                        stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    _ => {}
                }
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(map_engine_error)?;
        Ok(inspect.exit_code.unwrap_or(-1) == 0)
    }

    async fn list(&self, filters: &HashMap<String, String>) -> Result<Vec<Container>> {
        let engine_filters: HashMap<String, Vec<String>> = filters
            .iter()
            .map(|(k, v)| (k.clone(), vec![v.clone()]))
            .collect();
        let options = ListContainersOptions {
            all: true,
            filters: engine_filters,
            ..Default::default()
        };
        let summaries = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(map_engine_error)?;

        let mut containers: Vec<Container> =
            summaries.into_iter().map(summary_to_container).collect();
        // The daemon's name filter is a substring match; the contract is
        // exact.
        if let Some(name) = filters.get("name") {
            containers.retain(|c| c.name == *name);
        }
        Ok(containers)
    }

    async fn remove(&self, container: &str, force: bool) -> Result<bool> {
        self.docker
            .remove_container(
                container,
                Some(RemoveContainerOptions {
                    force,
                    ..Default::default()
                }),
            )
            .await
            .map_err(map_engine_error)?;
        tracing::info!(container = %container, force, "container removed");
        Ok(true)
    }

    async fn create_network(&self, name: &str, internal: bool) -> Result<bool> {
        self.docker
            .create_network(CreateNetworkOptions {
                name: name.to_string(),
                driver: "bridge".to_string(),
                internal,
                check_duplicate: true,
                ..Default::default()
            })
            .await
            .map_err(map_engine_error)?;
        tracing::info!(network = %name, internal, "network created");
        Ok(true)
    }

    async fn remove_network(&self, name: &str) -> Result<bool> {
        self.docker
            .remove_network(name)
            .await
            .map_err(map_engine_error)?;
        tracing::info!(network = %name, "network removed");
        Ok(true)
    }

    async fn list_networks(&self) -> Result<Vec<Network>> {
        let networks = self
            .docker
            .list_networks(None::<ListNetworksOptions<String>>)
            .await
            .map_err(map_engine_error)?;
        Ok(networks.into_iter().map(model_to_network).collect())
    }

    async fn network_connect(&self, container: &str, network: &str) -> Result<bool> {
        self.docker
            .connect_network(
                network,
                ConnectNetworkOptions {
                    container: container.to_string(),
                    endpoint_config: EndpointSettings::default(),
                },
            )
            .await
            .map_err(map_engine_error)?;
        Ok(true)
    }

    async fn network_disconnect(
        &self,
        container: &str,
        network: &str,
        force: bool,
    ) -> Result<bool> {
        self.docker
            .disconnect_network(
                network,
                DisconnectNetworkOptions {
                    container: container.to_string(),
                    force,
                },
            )
            .await
            .map_err(map_engine_error)?;
        Ok(true)
    }

    async fn stats(&self, query: StatsQuery) -> Result<Vec<UsageStats>> {
        let explicit = matches!(query, StatsQuery::Container(_));
        let targets = self.stats_targets(&query).await?;
        if targets.is_empty() {
            return Ok(vec![]);
        }

        // Two time-separated counter reads per container, with one shared
        // sampling window batched across the whole set.
        let mut first = Vec::with_capacity(targets.len());
        for container in targets {
            match self.sample(&container.id).await {
                Ok(sample) => first.push((container, sample)),
                // a removal raced the query; removed containers are never
                // reported, but an explicit identifier must still fail
                Err(Error::NotFound(reason)) if !explicit => {
                    tracing::debug!(container = %container.id, reason = %reason, "skipped mid-sampling");
                }
                Err(err) => return Err(err),
            }
        }

        tokio::time::sleep(SAMPLE_WINDOW).await;

        let mut raws = Vec::with_capacity(first.len());
        for (container, before) in first {
            let after = match self.sample(&container.id).await {
                Ok(sample) => sample,
                Err(Error::NotFound(reason)) if !explicit => {
                    tracing::debug!(container = %container.id, reason = %reason, "skipped mid-sampling");
                    continue;
                }
                Err(err) => return Err(err),
            };
            raws.push(RawSnapshot {
                container_id: container.id,
                container_name: container.name,
                cpu_delta: after.cpu_total.saturating_sub(before.cpu_total),
                system_cpu_delta: after.system_cpu.saturating_sub(before.system_cpu),
                online_cpus: after.online_cpus,
                memory_used: after.memory_used,
                memory_limit: after.memory_limit,
                disk_io: after.disk_io,
                memory_io: IoPair::new(after.memory_used, after.memory_max),
                network_io: after.network_io,
            });
        }
        Ok(stats::compute_all(&raws))
    }
}

/// One decoded counter read.
struct Sample {
    cpu_total: u64,
    system_cpu: u64,
    online_cpus: u32,
    memory_used: u64,
    memory_limit: u64,
    memory_max: u64,
    disk_io: IoPair,
    network_io: IoPair,
}

impl From<Stats> for Sample {
    fn from(raw: Stats) -> Self {
        let disk_io = accumulate_blkio(
            raw.blkio_stats
                .io_service_bytes_recursive
                .as_deref()
                .unwrap_or_default(),
        );
        let mut network_io = IoPair::default();
        for net in raw.networks.unwrap_or_default().values() {
            network_io.bytes_in += net.rx_bytes;
            network_io.bytes_out += net.tx_bytes;
        }
        Self {
            cpu_total: raw.cpu_stats.cpu_usage.total_usage,
            system_cpu: raw.cpu_stats.system_cpu_usage.unwrap_or(0),
            online_cpus: raw.cpu_stats.online_cpus.unwrap_or(1) as u32,
            memory_used: raw.memory_stats.usage.unwrap_or(0),
            memory_limit: raw.memory_stats.limit.unwrap_or(0),
            memory_max: raw.memory_stats.max_usage.unwrap_or(0),
            disk_io,
            network_io,
        }
    }
}

/// Sum block-device counters into a read/write pair. Ops other than
/// read/write (sync, async, total) are ignored; cgroup v2 reports the op
/// in lowercase.
fn accumulate_blkio(entries: &[BlkioStatsEntry]) -> IoPair {
    let mut pair = IoPair::default();
    for entry in entries {
        match entry.op.to_ascii_lowercase().as_str() {
            "read" => pair.bytes_in += entry.value,
            "write" => pair.bytes_out += entry.value,
            _ => {}
        }
    }
    pair
}

fn summary_to_container(summary: ContainerSummary) -> Container {
    let name = summary
        .names
        .as_ref()
        .and_then(|names| names.first())
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_default();
    Container {
        id: summary.id.unwrap_or_default(),
        name,
        image: summary.image.unwrap_or_default(),
        status: ContainerStatus::parse(summary.state.as_deref().unwrap_or("")),
        labels: summary.labels.unwrap_or_default(),
        created_at: summary
            .created
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
    }
}

fn model_to_network(model: NetworkModel) -> Network {
    Network {
        id: model.id.unwrap_or_default(),
        name: model.name.unwrap_or_default(),
        driver: model.driver.unwrap_or_default(),
        scope: model.scope.unwrap_or_default(),
    }
}

/// Map a daemon error onto the shared taxonomy.
fn map_engine_error(err: bollard::errors::Error) -> Error {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } => match status_code {
            404 => Error::NotFound(message),
            409 => Error::Conflict(message),
            _ => Error::Engine(message),
        },
        other => Error::Transport(other.to_string()),
    }
}

/// Registry-side rejections the daemon reports as generic server errors.
fn is_unresolvable_image(reason: &str) -> bool {
    let reason = reason.to_lowercase();
    reason.contains("not found")
        || reason.contains("manifest unknown")
        || reason.contains("pull access denied")
        || reason.contains("does not exist")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_404_maps_to_not_found() {
        let err = map_engine_error(bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message: "No such container: missing".to_string(),
        });
        assert!(matches!(err, Error::NotFound(m) if m.contains("missing")));
    }

    #[test]
    fn test_409_maps_to_conflict() {
        let err = map_engine_error(bollard::errors::Error::DockerResponseServerError {
            status_code: 409,
            message: "name already in use".to_string(),
        });
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_other_status_maps_to_engine() {
        let err = map_engine_error(bollard::errors::Error::DockerResponseServerError {
            status_code: 500,
            message: "boom".to_string(),
        });
        assert!(matches!(err, Error::Engine(m) if m == "boom"));
    }

    #[test]
    fn test_blkio_read_write_accumulation() {
        let entry = |op: &str, value: u64| BlkioStatsEntry {
            major: 8,
            minor: 0,
            op: op.to_string(),
            value,
        };
        let pair = accumulate_blkio(&[
            entry("Read", 100),
            entry("Write", 200),
            entry("read", 10),
            entry("write", 20),
            entry("Total", 330),
        ]);
        assert_eq!(pair, IoPair::new(110, 220));
    }

    #[test]
    fn test_unresolvable_image_markers() {
        assert!(is_unresolvable_image("manifest unknown"));
        assert!(is_unresolvable_image(
            "pull access denied for example/nope, repository does not exist"
        ));
        assert!(!is_unresolvable_image("connection reset by peer"));
    }
}
