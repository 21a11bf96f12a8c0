//! Resource-usage statistics computation.
//!
//! The calculator is pure: adapters perform the two time-separated counter
//! reads against the engine and hand pre-sampled deltas here. Division by
//! zero (no system delta observed, no memory limit reported) yields a 0.0
//! ratio, not an error.

use crate::types::{IoPair, UsageStats};

/// Raw counter deltas and cumulative totals for one container, as sampled
/// by a transport between two counter reads.
#[derive(Debug, Clone, Default)]
pub struct RawSnapshot {
    /// Engine-assigned container ID.
    pub container_id: String,
    /// Container name.
    pub container_name: String,
    /// Container CPU time consumed between the two reads, in nanoseconds.
    pub cpu_delta: u64,
    /// Host CPU time elapsed between the two reads, in nanoseconds.
    pub system_cpu_delta: u64,
    /// Number of CPUs available to the container.
    pub online_cpus: u32,
    /// Bytes of memory in use at the second read.
    pub memory_used: u64,
    /// Memory limit in bytes. The engine reports host total memory here
    /// for unbounded containers; 0 means it reported nothing.
    pub memory_limit: u64,
    /// Cumulative block-device bytes since container start.
    pub disk_io: IoPair,
    /// Cumulative memory I/O bytes since container start.
    pub memory_io: IoPair,
    /// Cumulative network-interface bytes since container start.
    pub network_io: IoPair,
}

/// Convert one raw snapshot into normalized usage metrics.
///
/// CPU usage is `(cpu_delta / system_cpu_delta) * online_cpus` and can
/// exceed 1.0 on multi-core bursts. I/O pairs pass through unchanged —
/// cumulative since container start, no smoothing or windowing.
pub fn compute_one(raw: &RawSnapshot) -> UsageStats {
    let cpu_usage = if raw.system_cpu_delta == 0 {
        0.0
    } else {
        (raw.cpu_delta as f64 / raw.system_cpu_delta as f64) * raw.online_cpus as f64
    };

    let memory_usage = if raw.memory_limit == 0 {
        0.0
    } else {
        raw.memory_used as f64 / raw.memory_limit as f64
    };

    UsageStats {
        container_id: raw.container_id.clone(),
        container_name: raw.container_name.clone(),
        cpu_usage,
        memory_usage,
        disk_io: raw.disk_io,
        memory_io: raw.memory_io,
        network_io: raw.network_io,
    }
}

/// Convert a batch of snapshots, preserving the engine's reporting order.
///
/// Callers that need one specific container must filter by ID or name,
/// never by positional index.
pub fn compute_all(raws: &[RawSnapshot]) -> Vec<UsageStats> {
    raws.iter().map(compute_one).collect()
}

/// Parse an engine-formatted percentage like `"12.34%"` into a ratio.
pub fn parse_percent(s: &str) -> Option<f64> {
    s.trim()
        .strip_suffix('%')
        .unwrap_or_else(|| s.trim())
        .parse::<f64>()
        .ok()
        .map(|v| v / 100.0)
}

/// Parse a human-readable byte size like `"1.2kB"`, `"3.5MiB"`, or `"0B"`.
///
/// Decimal units (`kB`, `MB`, …) are powers of 1000, binary units (`KiB`,
/// `MiB`, …) powers of 1024, matching the engine's own formatting.
pub fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim();
    let unit_start = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(unit_start);
    let value: f64 = number.parse().ok()?;
    let factor: f64 = match unit.trim() {
        "" | "B" => 1.0,
        "kB" | "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024f64.powi(3),
        "TiB" => 1024f64.powi(4),
        _ => return None,
    };
    Some((value * factor) as u64)
}

/// Parse an `"<in> / <out>"` size pair as formatted by the engine's CLI
/// (e.g. `"1.2kB / 3MB"`).
pub fn parse_size_pair(s: &str) -> Option<IoPair> {
    let (left, right) = s.split_once('/')?;
    Some(IoPair::new(parse_size(left)?, parse_size(right)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: &str) -> RawSnapshot {
        RawSnapshot {
            container_id: id.to_string(),
            container_name: format!("name-{id}"),
            cpu_delta: 250_000_000,
            system_cpu_delta: 1_000_000_000,
            online_cpus: 4,
            memory_used: 512,
            memory_limit: 2048,
            disk_io: IoPair::new(10, 20),
            memory_io: IoPair::new(30, 40),
            network_io: IoPair::new(50, 60),
        }
    }

    #[test]
    fn test_cpu_ratio_scales_by_cores() {
        let stats = compute_one(&snapshot("a"));
        // 25% of system time across 4 cores
        assert!((stats.cpu_usage - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cpu_ratio_zero_system_delta() {
        let mut raw = snapshot("a");
        raw.system_cpu_delta = 0;
        assert_eq!(compute_one(&raw).cpu_usage, 0.0);
    }

    #[test]
    fn test_cpu_ratio_can_exceed_one() {
        let mut raw = snapshot("a");
        raw.cpu_delta = 600_000_000;
        raw.system_cpu_delta = 1_000_000_000;
        raw.online_cpus = 8;
        assert!(compute_one(&raw).cpu_usage > 1.0);
    }

    #[test]
    fn test_memory_ratio() {
        let stats = compute_one(&snapshot("a"));
        assert!((stats.memory_usage - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_memory_ratio_zero_limit() {
        let mut raw = snapshot("a");
        raw.memory_limit = 0;
        assert_eq!(compute_one(&raw).memory_usage, 0.0);
    }

    #[test]
    fn test_io_pairs_pass_through() {
        let stats = compute_one(&snapshot("a"));
        assert_eq!(stats.disk_io, IoPair::new(10, 20));
        assert_eq!(stats.memory_io, IoPair::new(30, 40));
        assert_eq!(stats.network_io, IoPair::new(50, 60));
    }

    #[test]
    fn test_compute_all_preserves_order() {
        let raws = vec![snapshot("b"), snapshot("a"), snapshot("c")];
        let stats = compute_all(&raws);
        let ids: Vec<&str> = stats.iter().map(|s| s.container_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_parse_percent() {
        assert_eq!(parse_percent("12.5%"), Some(0.125));
        assert_eq!(parse_percent("0.00%"), Some(0.0));
        assert_eq!(parse_percent(" 150.00% "), Some(1.5));
        assert_eq!(parse_percent("abc"), None);
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("0B"), Some(0));
        assert_eq!(parse_size("1.2kB"), Some(1200));
        assert_eq!(parse_size("3MB"), Some(3_000_000));
        assert_eq!(parse_size("1MiB"), Some(1_048_576));
        assert_eq!(parse_size("512"), Some(512));
        assert_eq!(parse_size("1.5GiB"), Some(1_610_612_736));
        assert_eq!(parse_size("7x"), None);
    }

    #[test]
    fn test_parse_size_pair() {
        assert_eq!(
            parse_size_pair("1.2kB / 3MB"),
            Some(IoPair::new(1200, 3_000_000))
        );
        assert_eq!(parse_size_pair("0B / 0B"), Some(IoPair::new(0, 0)));
        assert_eq!(parse_size_pair("1.2kB"), None);
    }
}
