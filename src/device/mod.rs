//! Device abstraction the replay scheduler drives.
//!
//! The scheduler never talks to Vulkan directly. All object creation and
//! destruction goes through [`GpuDevice`], with one implementation backed
//! by a real driver ([`vulkan::VulkanDevice`]) and one headless
//! implementation ([`null::NullDevice`]) for tests and driverless
//! benchmarking.

pub mod null;
pub mod vulkan;

use ash::vk;

use crate::descriptors::{
    ApplicationInfoDesc, DeviceFeaturesDesc, RenderPassDesc, ResolvedComputePipeline,
    ResolvedGraphicsPipeline, ResolvedPipelineLayout, ResolvedSetLayout, SamplerDesc,
    ShaderModuleDesc,
};
use crate::{Hash, ResourceKind};

/// Raw device handle. Matches the `u64` representation of non-dispatchable
/// Vulkan handles; `NULL_HANDLE` marks an uninitialized or destroyed slot.
pub type RawHandle = u64;

pub const NULL_HANDLE: RawHandle = 0;

#[derive(Debug)]
pub enum DeviceError {
    Vulkan(vk::Result),
    Loading(ash::LoadingError),
    NoSupportedDevice,
    InvalidDeviceIndex(usize),
}

impl From<vk::Result> for DeviceError {
    fn from(result: vk::Result) -> Self {
        DeviceError::Vulkan(result)
    }
}

/// One create operation per resource category plus teardown support.
///
/// `set_application_info` performs the lazy one-time device initialization
/// and is called at most once, from the driver thread, before any create.
/// Implementations must tolerate create calls without a prior
/// `set_application_info` by initializing with default application info.
/// Create operations for deferred categories are called concurrently from
/// worker threads; the handed-out device state is immutable after
/// initialization.
pub trait GpuDevice: Send + Sync {
    fn set_application_info(
        &self,
        app: &ApplicationInfoDesc,
        features: &DeviceFeaturesDesc,
    ) -> Result<(), DeviceError>;

    fn create_sampler(&self, hash: Hash, desc: &SamplerDesc) -> Result<RawHandle, DeviceError>;

    fn create_descriptor_set_layout(
        &self,
        hash: Hash,
        desc: &ResolvedSetLayout,
    ) -> Result<RawHandle, DeviceError>;

    fn create_pipeline_layout(
        &self,
        hash: Hash,
        desc: &ResolvedPipelineLayout,
    ) -> Result<RawHandle, DeviceError>;

    fn create_render_pass(&self, hash: Hash, desc: &RenderPassDesc)
        -> Result<RawHandle, DeviceError>;

    fn create_shader_module(
        &self,
        hash: Hash,
        desc: &ShaderModuleDesc,
    ) -> Result<RawHandle, DeviceError>;

    fn create_graphics_pipeline(
        &self,
        hash: Hash,
        desc: &ResolvedGraphicsPipeline,
    ) -> Result<RawHandle, DeviceError>;

    fn create_compute_pipeline(
        &self,
        hash: Hash,
        desc: &ResolvedComputePipeline,
    ) -> Result<RawHandle, DeviceError>;

    /// Destroys a previously created handle. Must accept every handle this
    /// device ever returned, exactly once per handle.
    fn destroy(&self, kind: ResourceKind, handle: RawHandle);
}
