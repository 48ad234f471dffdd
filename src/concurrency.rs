//! Process-wide worker-pool sizing, keyed by operation kind.
//!
//! Stages build their own `rayon` thread pools sized per operation instead
//! of hammering the global rayon pool, so a hash-heavy stage and an
//! EXIF-heavy stage never fight each other for the same slots.

use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Hash,
    Exif,
    Duplicate,
    FileIo,
    MoveCopy,
    Other,
}

/// Caches `num_cpus::get()` once per process; reused by every sizing call.
fn cores() -> usize {
    static CORES: OnceLock<usize> = OnceLock::new();
    *CORES.get_or_init(num_cpus::get)
}

/// Limit for a given operation kind, clamped to a sane floor/ceiling so a
/// 1-core CI runner and a 128-core workstation both get a workable pool.
pub fn limit_for(op: Operation) -> usize {
    let cores = cores();
    let raw = match op {
        Operation::Hash => cores * 4,
        Operation::Exif => (cores * 8).min(32),
        Operation::Duplicate => cores * 2,
        Operation::FileIo | Operation::MoveCopy => disk_optimized(cores),
        Operation::Other => cores * 2,
    };
    raw.clamp(4, 128)
}

/// Disk-bound work doesn't scale linearly with CPU count; a modest
/// multiplier avoids saturating the I/O subsystem with thousands of
/// concurrent moves on a spinning disk while still overlapping latency on
/// an SSD.
fn disk_optimized(cores: usize) -> usize {
    (cores * 2).clamp(4, 64)
}

/// Builds a scoped `rayon::ThreadPool` sized for `op`. Callers install it
/// with `pool.install(|| ...)` around the stage's parallel work so the
/// limit is local to that stage, not global process state.
pub fn pool_for(op: Operation) -> anyhow::Result<rayon::ThreadPool> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(limit_for(op))
        .build()?;
    Ok(pool)
}

/// Scales a base limit given a recent throughput sample relative to a
/// target: above `threshold` the limit triples, below it the limit halves.
/// Kept deliberately simple since the pipeline runs once per invocation and
/// has no steady-state to tune.
pub fn adaptive_scale(base: usize, recent_throughput: f64, threshold: f64) -> usize {
    if recent_throughput > threshold {
        (base * 3).clamp(4, 256)
    } else if recent_throughput < threshold {
        ((base as f64 * 0.5).round() as usize).clamp(1, base.max(1))
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exif_limit_clamped_to_32() {
        assert!(limit_for(Operation::Exif) <= 32);
    }

    #[test]
    fn test_limits_never_below_floor() {
        for op in [
            Operation::Hash,
            Operation::Exif,
            Operation::Duplicate,
            Operation::FileIo,
            Operation::MoveCopy,
            Operation::Other,
        ] {
            assert!(limit_for(op) >= 4);
        }
    }

    #[test]
    fn test_adaptive_scale_up_above_threshold() {
        assert_eq!(adaptive_scale(4, 100.0, 50.0), 12);
    }

    #[test]
    fn test_adaptive_scale_down_below_threshold() {
        assert_eq!(adaptive_scale(10, 1.0, 50.0), 5);
    }
}
