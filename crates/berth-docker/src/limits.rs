//! Process-wide resource limits for new containers.

/// CPU and memory limits applied to subsequently created containers.
///
/// Set through the adapter's `set_cpus`/`set_memory_mib`; never applied
/// retroactively to containers that already exist.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Limits {
    /// CPU quota in cores (fractional allowed).
    pub cpus: Option<f64>,
    /// Memory limit in MiB.
    pub memory_mib: Option<u64>,
}
