#[macro_use]
extern crate static_assertions;

pub mod archive;
pub mod descriptors;
pub mod device;
pub mod filter;
pub mod parser;
pub mod replay;

pub use replay::driver::{run_replay, ReplayReport, RunError};
pub use replay::{ReplayConsumer, ReplayOptions, Replayer};

/// Opaque 64-bit content hash identifying a serialized creation record.
///
/// Hashes are unique within a resource category but may collide across
/// categories.
pub type Hash = u64;

/// The resource categories a replay archive can contain.
///
/// The declaration order is the dependency order: an object may only
/// reference objects of categories declared before its own.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    ApplicationInfo,
    Sampler,
    DescriptorSetLayout,
    PipelineLayout,
    RenderPass,
    ShaderModule,
    GraphicsPipeline,
    ComputePipeline,
}

impl ResourceKind {
    /// Subdirectory holding this category's records in an on-disk archive.
    pub fn directory_name(&self) -> &'static str {
        match self {
            ResourceKind::ApplicationInfo => "application_info",
            ResourceKind::Sampler => "samplers",
            ResourceKind::DescriptorSetLayout => "descriptor_set_layouts",
            ResourceKind::PipelineLayout => "pipeline_layouts",
            ResourceKind::RenderPass => "render_passes",
            ResourceKind::ShaderModule => "shader_modules",
            ResourceKind::GraphicsPipeline => "graphics_pipelines",
            ResourceKind::ComputePipeline => "compute_pipelines",
        }
    }

    /// True for categories whose objects are built on the worker pool
    /// rather than inline on the driver thread.
    pub fn is_deferred(&self) -> bool {
        matches!(
            self,
            ResourceKind::ShaderModule
                | ResourceKind::GraphicsPipeline
                | ResourceKind::ComputePipeline
        )
    }
}
