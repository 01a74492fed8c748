//! Worker-pool sizing.
//!
//! Containers usually cap CPU well below the host's core count; sizing the
//! tokio pool from the host would over-provision threads. The limit is taken
//! from the first probe that yields one, falling back to host parallelism.
//!
//! Runs before tracing is initialised, so diagnostics go to stderr.

/// Number of worker threads for the tokio runtime.
pub fn worker_thread_count() -> usize {
    let probes: [(&str, fn() -> Option<f64>); 3] = [
        ("GATEWAY_CPU_LIMIT", env_limit),
        ("cgroup v2", cgroup_v2_limit),
        ("cgroup v1", cgroup_v1_limit),
    ];

    for (source, probe) in probes {
        if let Some(cores) = probe() {
            // Fractional quotas (e.g. 500m) still get one thread.
            let threads = (cores.ceil() as usize).max(1);
            eprintln!("[runtime] worker threads: {} ({})", threads, source);
            return threads;
        }
    }

    let threads = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1);
    eprintln!("[runtime] worker threads: {} (host parallelism)", threads);
    threads
}

fn env_limit() -> Option<f64> {
    parse_cores(&std::env::var("GATEWAY_CPU_LIMIT").ok()?)
}

/// Accepts plain cores ("2", "0.5") and kubernetes millicores ("1500m").
fn parse_cores(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let cores = match raw.strip_suffix('m') {
        Some(milli) => milli.parse::<f64>().ok()? / 1000.0,
        None => raw.parse::<f64>().ok()?,
    };
    (cores > 0.0).then_some(cores)
}

/// cgroup v2 unified hierarchy: `cpu.max` holds "<quota> <period>", with a
/// literal "max" quota meaning unlimited.
fn cgroup_v2_limit() -> Option<f64> {
    let content = std::fs::read_to_string("/sys/fs/cgroup/cpu.max").ok()?;
    let mut fields = content.split_whitespace();
    let quota = fields.next()?;
    if quota == "max" {
        return None;
    }
    quota_ratio(quota, fields.next()?)
}

/// cgroup v1 legacy hierarchy: quota and period live in separate files; a
/// negative quota means unlimited.
fn cgroup_v1_limit() -> Option<f64> {
    let quota = std::fs::read_to_string("/sys/fs/cgroup/cpu/cpu.cfs_quota_us").ok()?;
    let period = std::fs::read_to_string("/sys/fs/cgroup/cpu/cpu.cfs_period_us").ok()?;
    quota_ratio(quota.trim(), period.trim())
}

fn quota_ratio(quota: &str, period: &str) -> Option<f64> {
    let quota: f64 = quota.parse().ok()?;
    let period: f64 = period.parse().ok()?;
    (quota > 0.0 && period > 0.0).then(|| quota / period)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_and_fractional_cores() {
        assert_eq!(parse_cores("4"), Some(4.0));
        assert_eq!(parse_cores(" 2 "), Some(2.0));
        assert_eq!(parse_cores("0.5"), Some(0.5));
    }

    #[test]
    fn millicores() {
        assert_eq!(parse_cores("1500m"), Some(1.5));
        assert_eq!(parse_cores("250m"), Some(0.25));
    }

    #[test]
    fn garbage_and_non_positive_values_are_ignored() {
        assert_eq!(parse_cores(""), None);
        assert_eq!(parse_cores("lots"), None);
        assert_eq!(parse_cores("0"), None);
        assert_eq!(parse_cores("-2"), None);
        assert_eq!(parse_cores("m"), None);
    }

    #[test]
    fn quota_ratio_requires_positive_quota_and_period() {
        assert_eq!(quota_ratio("150000", "100000"), Some(1.5));
        assert_eq!(quota_ratio("-1", "100000"), None);
        assert_eq!(quota_ratio("100000", "0"), None);
        assert_eq!(quota_ratio("max", "100000"), None);
    }
}
