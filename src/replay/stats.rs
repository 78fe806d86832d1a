//! Timing counters fed by the worker pool.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::ResourceKind;

/// Per-category creation counters. Only successful creates are recorded.
///
/// Relaxed ordering is sufficient: the driver reads the counters only
/// after the final barrier, which already orders all worker writes.
#[derive(Default)]
pub struct ReplayStats {
    shader_module_count: AtomicU64,
    shader_module_ns: AtomicU64,
    graphics_pipeline_count: AtomicU64,
    graphics_pipeline_ns: AtomicU64,
    compute_pipeline_count: AtomicU64,
    compute_pipeline_ns: AtomicU64,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct CategoryStats {
    pub count: u64,
    pub total_ns: u64,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub shader_modules: CategoryStats,
    pub graphics_pipelines: CategoryStats,
    pub compute_pipelines: CategoryStats,
}

impl ReplayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, kind: ResourceKind, elapsed: Duration) {
        let (count, ns) = match kind {
            ResourceKind::ShaderModule => (&self.shader_module_count, &self.shader_module_ns),
            ResourceKind::GraphicsPipeline => {
                (&self.graphics_pipeline_count, &self.graphics_pipeline_ns)
            }
            ResourceKind::ComputePipeline => {
                (&self.compute_pipeline_count, &self.compute_pipeline_ns)
            }
            _ => return,
        };
        count.fetch_add(1, Ordering::Relaxed);
        ns.fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            shader_modules: CategoryStats {
                count: self.shader_module_count.load(Ordering::Relaxed),
                total_ns: self.shader_module_ns.load(Ordering::Relaxed),
            },
            graphics_pipelines: CategoryStats {
                count: self.graphics_pipeline_count.load(Ordering::Relaxed),
                total_ns: self.graphics_pipeline_ns.load(Ordering::Relaxed),
            },
            compute_pipelines: CategoryStats {
                count: self.compute_pipeline_count.load(Ordering::Relaxed),
                total_ns: self.compute_pipeline_ns.load(Ordering::Relaxed),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_accumulate_per_category() {
        let stats = ReplayStats::new();
        stats.record(ResourceKind::ShaderModule, Duration::from_nanos(100));
        stats.record(ResourceKind::ShaderModule, Duration::from_nanos(50));
        stats.record(ResourceKind::GraphicsPipeline, Duration::from_nanos(7));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.shader_modules.count, 2);
        assert_eq!(snapshot.shader_modules.total_ns, 150);
        assert_eq!(snapshot.graphics_pipelines.count, 1);
        assert_eq!(snapshot.graphics_pipelines.total_ns, 7);
        assert_eq!(snapshot.compute_pipelines, CategoryStats::default());
    }

    #[test]
    fn trivial_categories_are_ignored() {
        let stats = ReplayStats::new();
        stats.record(ResourceKind::Sampler, Duration::from_nanos(10));
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }
}
