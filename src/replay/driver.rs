//! The phase driver walking an archive in dependency order.

use std::time::{Duration, Instant};

use crate::archive::{Archive, ArchiveError};
use crate::device::DeviceError;
use crate::parser::{ParseError, RecordParser};
use crate::replay::stats::StatsSnapshot;
use crate::replay::{ReplayConsumer, ReplayError, Replayer};
use crate::ResourceKind;

/// Categories in replay order.
///
/// Shader modules are kicked off right after the application info so the
/// worker pool compiles them while the trivial categories replay inline on
/// the driver thread. The barrier after render passes guarantees every
/// module a pipeline references exists before pipeline creation begins.
pub const PLAYBACK_ORDER: [ResourceKind; 8] = [
    ResourceKind::ApplicationInfo,
    ResourceKind::ShaderModule,
    ResourceKind::Sampler,
    ResourceKind::DescriptorSetLayout,
    ResourceKind::PipelineLayout,
    ResourceKind::RenderPass,
    ResourceKind::GraphicsPipeline,
    ResourceKind::ComputePipeline,
];

/// Errors that abort a replay run. Per-record failures never do; they are
/// logged and skipped.
#[derive(Debug)]
pub enum RunError {
    Archive(ArchiveError),
    Device(DeviceError),
}

impl From<ArchiveError> for RunError {
    fn from(err: ArchiveError) -> Self {
        RunError::Archive(err)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReplayReport {
    pub samplers: usize,
    pub descriptor_set_layouts: usize,
    pub pipeline_layouts: usize,
    pub render_passes: usize,
    pub shader_modules: usize,
    pub graphics_pipelines: usize,
    pub compute_pipelines: usize,
    pub stats: StatsSnapshot,
    pub elapsed: Duration,
}

impl ReplayReport {
    pub fn total_objects(&self) -> usize {
        self.samplers
            + self.descriptor_set_layouts
            + self.pipeline_layouts
            + self.render_passes
            + self.shader_modules
            + self.graphics_pipelines
            + self.compute_pipelines
    }

    pub fn log(&self) {
        log::info!(
            "Playing back {} shader modules took {:.3} s (accumulated time)",
            self.stats.shader_modules.count,
            self.stats.shader_modules.total_ns as f64 * 1e-9
        );
        log::info!(
            "Playing back {} graphics pipelines took {:.3} s (accumulated time)",
            self.stats.graphics_pipelines.count,
            self.stats.graphics_pipelines.total_ns as f64 * 1e-9
        );
        log::info!(
            "Playing back {} compute pipelines took {:.3} s (accumulated time)",
            self.stats.compute_pipelines.count,
            self.stats.compute_pipelines.total_ns as f64 * 1e-9
        );
        log::info!(
            "Replayed {} objects in {} ms:",
            self.total_objects(),
            self.elapsed.as_millis()
        );
        log::info!("  samplers:               {:7}", self.samplers);
        log::info!("  descriptor set layouts: {:7}", self.descriptor_set_layouts);
        log::info!("  pipeline layouts:       {:7}", self.pipeline_layouts);
        log::info!("  render passes:          {:7}", self.render_passes);
        log::info!("  shader modules:         {:7}", self.shader_modules);
        log::info!("  graphics pipelines:     {:7}", self.graphics_pipelines);
        log::info!("  compute pipelines:      {:7}", self.compute_pipelines);
    }
}

/// Replays the whole archive through `replayer`.
///
/// Archive access failures and device-creation failure are fatal; every
/// other per-record failure has already been logged by the parser or a
/// worker and the record is skipped.
pub fn run_replay(archive: &dyn Archive, replayer: &Replayer) -> Result<ReplayReport, RunError> {
    let start = Instant::now();
    let mut parser = RecordParser::new();

    for kind in PLAYBACK_ORDER {
        for hash in archive.hashes(kind)? {
            let blob = archive.read(kind, hash)?;
            if let Err(err) = parser.parse(replayer, kind, hash, &blob) {
                if kind == ResourceKind::ApplicationInfo {
                    if let ParseError::Replay(ReplayError::Device(device_err)) = err {
                        return Err(RunError::Device(device_err));
                    }
                }
            }
        }

        // Before continuing with pipelines, make sure the queued shader
        // modules have all been created.
        if kind == ResourceKind::RenderPass {
            replayer.sync();
        }
    }

    // Drain all outstanding pipeline builds.
    replayer.sync();

    let registry = replayer.registry();
    Ok(ReplayReport {
        samplers: registry.len(ResourceKind::Sampler),
        descriptor_set_layouts: registry.len(ResourceKind::DescriptorSetLayout),
        pipeline_layouts: registry.len(ResourceKind::PipelineLayout),
        render_passes: registry.len(ResourceKind::RenderPass),
        shader_modules: registry.len(ResourceKind::ShaderModule),
        graphics_pipelines: registry.len(ResourceKind::GraphicsPipeline),
        compute_pipelines: registry.len(ResourceKind::ComputePipeline),
        stats: replayer.stats(),
        elapsed: start.elapsed(),
    })
}
