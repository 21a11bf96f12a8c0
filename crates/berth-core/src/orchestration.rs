//! Backend-agnostic calling surface.
//!
//! [`Orchestration`] holds exactly one adapter for its lifetime and
//! delegates every operation to it unchanged — it carries no state of its
//! own and adds no error translation. Its only extra duty is routing
//! commands supplied as a single string through the command parser before
//! they reach the adapter.

use crate::command::parse_command;
use crate::engine::{Engine, RunOptions, StatsQuery};
use crate::error::Result;
use crate::types::{Container, Network, UsageStats};
use std::collections::HashMap;
use std::time::Duration;

/// Uniform façade over one container engine backend.
///
/// The backend is selected at construction time; callers never see which
/// adapter is behind the façade.
pub struct Orchestration {
    engine: Box<dyn Engine>,
}

impl Orchestration {
    /// Create a façade over the given adapter.
    pub fn new(engine: Box<dyn Engine>) -> Self {
        tracing::debug!(adapter = engine.name(), "orchestration initialized");
        Self { engine }
    }

    /// Name of the adapter behind this façade.
    pub fn adapter_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Tokenize a shell-like command string into an argv vector.
    pub fn parse_command_string(&self, command: &str) -> Result<Vec<String>> {
        parse_command(command)
    }

    /// Set the CPU limit for subsequently created containers.
    pub fn set_cpus(&self, cpus: f64) {
        self.engine.set_cpus(cpus);
    }

    /// Set the memory limit in MiB for subsequently created containers.
    pub fn set_memory_mib(&self, mib: u64) {
        self.engine.set_memory_mib(mib);
    }

    /// Pull an image. `Ok(false)` when the image cannot be resolved.
    pub async fn pull(&self, image: &str) -> Result<bool> {
        self.engine.pull(image).await
    }

    /// Create and start a container, returning the engine-assigned ID.
    pub async fn run(&self, opts: RunOptions) -> Result<String> {
        self.engine.run(opts).await
    }

    /// Run an already-tokenized command inside a running container.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute(
        &self,
        container: &str,
        command: &[String],
        stdout: &mut String,
        stderr: &mut String,
        env: &HashMap<String, String>,
        timeout: Option<Duration>,
    ) -> Result<bool> {
        self.engine
            .execute(container, command, stdout, stderr, env, timeout)
            .await
    }

    /// Run a command supplied as a single string inside a running
    /// container. The string is tokenized by the command parser first;
    /// a malformed string fails before anything reaches the adapter.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute_shell(
        &self,
        container: &str,
        command: &str,
        stdout: &mut String,
        stderr: &mut String,
        env: &HashMap<String, String>,
        timeout: Option<Duration>,
    ) -> Result<bool> {
        let argv = parse_command(command)?;
        self.engine
            .execute(container, &argv, stdout, stderr, env, timeout)
            .await
    }

    /// List containers matching flat key=value filters.
    pub async fn list(&self, filters: &HashMap<String, String>) -> Result<Vec<Container>> {
        self.engine.list(filters).await
    }

    /// Remove a container by ID or name.
    pub async fn remove(&self, container: &str, force: bool) -> Result<bool> {
        self.engine.remove(container, force).await
    }

    /// Create a named network.
    pub async fn create_network(&self, name: &str, internal: bool) -> Result<bool> {
        self.engine.create_network(name, internal).await
    }

    /// Remove a network by name.
    pub async fn remove_network(&self, name: &str) -> Result<bool> {
        self.engine.remove_network(name).await
    }

    /// List networks.
    pub async fn list_networks(&self) -> Result<Vec<Network>> {
        self.engine.list_networks().await
    }

    /// Connect a container to a network.
    pub async fn network_connect(&self, container: &str, network: &str) -> Result<bool> {
        self.engine.network_connect(container, network).await
    }

    /// Disconnect a container from a network.
    pub async fn network_disconnect(
        &self,
        container: &str,
        network: &str,
        force: bool,
    ) -> Result<bool> {
        self.engine.network_disconnect(container, network, force).await
    }

    /// Sample resource usage for the selected containers.
    pub async fn stats(&self, query: StatsQuery) -> Result<Vec<UsageStats>> {
        self.engine.stats(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Records every call that reaches the adapter.
    #[derive(Default)]
    struct MockEngine {
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl MockEngine {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }
    }

    #[async_trait]
    impl Engine for MockEngine {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn set_cpus(&self, cpus: f64) {
            self.record(format!("set_cpus {cpus}"));
        }

        fn set_memory_mib(&self, mib: u64) {
            self.record(format!("set_memory {mib}"));
        }

        async fn pull(&self, image: &str) -> Result<bool> {
            self.record(format!("pull {image}"));
            Ok(image != "missing/image")
        }

        async fn run(&self, opts: RunOptions) -> Result<String> {
            self.record(format!("run {}", opts.name));
            Ok("id-1".to_string())
        }

        async fn execute(
            &self,
            container: &str,
            command: &[String],
            stdout: &mut String,
            _stderr: &mut String,
            _env: &HashMap<String, String>,
            _timeout: Option<Duration>,
        ) -> Result<bool> {
            self.record(format!("execute {container} {}", command.join(" ")));
            stdout.push_str("ok");
            Ok(true)
        }

        async fn list(&self, _filters: &HashMap<String, String>) -> Result<Vec<Container>> {
            self.record("list");
            Ok(vec![])
        }

        async fn remove(&self, container: &str, force: bool) -> Result<bool> {
            self.record(format!("remove {container} {force}"));
            Ok(true)
        }

        async fn create_network(&self, name: &str, _internal: bool) -> Result<bool> {
            self.record(format!("create_network {name}"));
            Ok(true)
        }

        async fn remove_network(&self, name: &str) -> Result<bool> {
            self.record(format!("remove_network {name}"));
            Ok(true)
        }

        async fn list_networks(&self) -> Result<Vec<Network>> {
            self.record("list_networks");
            Ok(vec![])
        }

        async fn network_connect(&self, container: &str, network: &str) -> Result<bool> {
            self.record(format!("connect {container} {network}"));
            Ok(true)
        }

        async fn network_disconnect(
            &self,
            container: &str,
            network: &str,
            force: bool,
        ) -> Result<bool> {
            self.record(format!("disconnect {container} {network} {force}"));
            Ok(true)
        }

        async fn stats(&self, _query: StatsQuery) -> Result<Vec<UsageStats>> {
            self.record("stats");
            Ok(vec![])
        }
    }

    fn facade() -> (Orchestration, Arc<Mutex<Vec<String>>>) {
        let mock = MockEngine::default();
        let calls = Arc::clone(&mock.calls);
        (Orchestration::new(Box::new(mock)), calls)
    }

    #[tokio::test]
    async fn test_delegation_is_unmodified() {
        let (orchestration, calls) = facade();

        assert!(orchestration.pull("alpine").await.unwrap());
        assert!(!orchestration.pull("missing/image").await.unwrap());
        orchestration.set_cpus(1.5);
        orchestration.remove("c1", true).await.unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec!["pull alpine", "pull missing/image", "set_cpus 1.5", "remove c1 true"]
        );
    }

    #[tokio::test]
    async fn test_execute_shell_routes_through_parser() {
        let (orchestration, calls) = facade();
        let mut stdout = String::new();
        let mut stderr = String::new();

        let ok = orchestration
            .execute_shell(
                "c1",
                "sh -c 'echo hi'",
                &mut stdout,
                &mut stderr,
                &HashMap::new(),
                None,
            )
            .await
            .unwrap();

        assert!(ok);
        assert_eq!(stdout, "ok");
        let calls = calls.lock().unwrap();
        assert_eq!(*calls, vec!["execute c1 sh -c 'echo hi'"]);
    }

    #[tokio::test]
    async fn test_execute_shell_parse_error_never_reaches_adapter() {
        let (orchestration, calls) = facade();
        let mut stdout = String::new();
        let mut stderr = String::new();

        let result = orchestration
            .execute_shell(
                "c1",
                "sh -c 'unterminated",
                &mut stdout,
                &mut stderr,
                &HashMap::new(),
                None,
            )
            .await;

        assert!(matches!(result, Err(Error::Parse(_))));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_parse_command_string_utility() {
        let (orchestration, _) = facade();
        assert_eq!(
            orchestration.parse_command_string("sudo apt-get update").unwrap(),
            vec!["sudo", "apt-get", "update"]
        );
    }
}
