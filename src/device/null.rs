//! Headless [`GpuDevice`] that fabricates handles without a driver.
//!
//! Useful for tests and for exercising the scheduler on machines without a
//! Vulkan implementation. Every create and destroy is recorded so callers
//! can assert ordering, repetition counts, and teardown completeness, and
//! individual records can be made to fail to simulate driver errors.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use ash::vk;

use crate::descriptors::{
    ApplicationInfoDesc, DeviceFeaturesDesc, RenderPassDesc, ResolvedComputePipeline,
    ResolvedGraphicsPipeline, ResolvedPipelineLayout, ResolvedSetLayout, SamplerDesc,
    ShaderModuleDesc,
};
use crate::device::{DeviceError, GpuDevice, RawHandle};
use crate::{Hash, ResourceKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Init,
    Create {
        kind: ResourceKind,
        hash: Hash,
        handle: RawHandle,
        /// Handles of the objects this create referenced, in descriptor
        /// order (stage modules, then layout, then render pass for
        /// graphics pipelines).
        inputs: Vec<RawHandle>,
    },
    CreateFailed {
        kind: ResourceKind,
        hash: Hash,
    },
    Destroy {
        kind: ResourceKind,
        handle: RawHandle,
    },
}

pub struct NullDevice {
    next_handle: AtomicU64,
    events: Mutex<Vec<DeviceEvent>>,
    failures: Mutex<HashSet<(ResourceKind, Hash)>>,
}

impl Default for NullDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl NullDevice {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            events: Mutex::new(Vec::new()),
            failures: Mutex::new(HashSet::new()),
        }
    }

    /// Makes every create of `(kind, hash)` fail with a driver-style error.
    pub fn fail_on(&self, kind: ResourceKind, hash: Hash) {
        self.failures.lock().unwrap().insert((kind, hash));
    }

    pub fn events(&self) -> Vec<DeviceEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Handles created but not yet destroyed.
    pub fn live_handles(&self) -> Vec<RawHandle> {
        let mut live = Vec::new();
        for event in self.events.lock().unwrap().iter() {
            match event {
                DeviceEvent::Create { handle, .. } => live.push(*handle),
                DeviceEvent::Destroy { handle, .. } => {
                    live.retain(|h| h != handle);
                }
                _ => {}
            }
        }
        live
    }

    fn create(
        &self,
        kind: ResourceKind,
        hash: Hash,
        inputs: Vec<RawHandle>,
    ) -> Result<RawHandle, DeviceError> {
        if self.failures.lock().unwrap().contains(&(kind, hash)) {
            self.events
                .lock()
                .unwrap()
                .push(DeviceEvent::CreateFailed { kind, hash });
            return Err(DeviceError::Vulkan(vk::Result::ERROR_INITIALIZATION_FAILED));
        }

        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.events.lock().unwrap().push(DeviceEvent::Create {
            kind,
            hash,
            handle,
            inputs,
        });
        Ok(handle)
    }
}

impl GpuDevice for NullDevice {
    fn set_application_info(
        &self,
        _app: &ApplicationInfoDesc,
        _features: &DeviceFeaturesDesc,
    ) -> Result<(), DeviceError> {
        self.events.lock().unwrap().push(DeviceEvent::Init);
        Ok(())
    }

    fn create_sampler(&self, hash: Hash, _desc: &SamplerDesc) -> Result<RawHandle, DeviceError> {
        self.create(ResourceKind::Sampler, hash, Vec::new())
    }

    fn create_descriptor_set_layout(
        &self,
        hash: Hash,
        desc: &ResolvedSetLayout,
    ) -> Result<RawHandle, DeviceError> {
        let inputs = desc.immutable_samplers.iter().flatten().copied().collect();
        self.create(ResourceKind::DescriptorSetLayout, hash, inputs)
    }

    fn create_pipeline_layout(
        &self,
        hash: Hash,
        desc: &ResolvedPipelineLayout,
    ) -> Result<RawHandle, DeviceError> {
        self.create(ResourceKind::PipelineLayout, hash, desc.set_layouts.clone())
    }

    fn create_render_pass(
        &self,
        hash: Hash,
        _desc: &RenderPassDesc,
    ) -> Result<RawHandle, DeviceError> {
        self.create(ResourceKind::RenderPass, hash, Vec::new())
    }

    fn create_shader_module(
        &self,
        hash: Hash,
        _desc: &ShaderModuleDesc,
    ) -> Result<RawHandle, DeviceError> {
        self.create(ResourceKind::ShaderModule, hash, Vec::new())
    }

    fn create_graphics_pipeline(
        &self,
        hash: Hash,
        desc: &ResolvedGraphicsPipeline,
    ) -> Result<RawHandle, DeviceError> {
        let mut inputs = desc.stage_modules.clone();
        inputs.push(desc.layout);
        inputs.push(desc.render_pass);
        self.create(ResourceKind::GraphicsPipeline, hash, inputs)
    }

    fn create_compute_pipeline(
        &self,
        hash: Hash,
        desc: &ResolvedComputePipeline,
    ) -> Result<RawHandle, DeviceError> {
        self.create(
            ResourceKind::ComputePipeline,
            hash,
            vec![desc.module, desc.layout],
        )
    }

    fn destroy(&self, kind: ResourceKind, handle: RawHandle) {
        self.events
            .lock()
            .unwrap()
            .push(DeviceEvent::Destroy { kind, handle });
    }
}
