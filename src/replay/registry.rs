//! Per-category handle storage with address-stable cells.
//!
//! Work items capture an [`Arc`] of the cell at enqueue time and publish
//! into it from a worker thread later, so cells must never move once
//! inserted. The indirection through `Arc<HandleSlot>` provides that
//! guarantee regardless of how the backing maps rehash.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::device::{GpuDevice, RawHandle, NULL_HANDLE};
use crate::{Hash, ResourceKind};

/// A single handle cell. Null until the owning object has been created.
#[derive(Debug, Default)]
pub struct HandleSlot(AtomicU64);

impl HandleSlot {
    pub fn get(&self) -> RawHandle {
        self.0.load(Ordering::Acquire)
    }

    pub fn is_null(&self) -> bool {
        self.get() == NULL_HANDLE
    }

    pub fn store(&self, handle: RawHandle) {
        self.0.store(handle, Ordering::Release);
    }

    /// Clears the cell and returns the previous handle.
    pub fn take(&self) -> RawHandle {
        self.0.swap(NULL_HANDLE, Ordering::AcqRel)
    }
}

/// Handles are destroyed in reverse dependency order so that no object
/// outlives one it references.
const DESTRUCTION_ORDER: [ResourceKind; 7] = [
    ResourceKind::GraphicsPipeline,
    ResourceKind::ComputePipeline,
    ResourceKind::ShaderModule,
    ResourceKind::RenderPass,
    ResourceKind::PipelineLayout,
    ResourceKind::DescriptorSetLayout,
    ResourceKind::Sampler,
];

#[derive(Default)]
pub struct HandleRegistry {
    samplers: Mutex<HashMap<Hash, Arc<HandleSlot>>>,
    descriptor_set_layouts: Mutex<HashMap<Hash, Arc<HandleSlot>>>,
    pipeline_layouts: Mutex<HashMap<Hash, Arc<HandleSlot>>>,
    render_passes: Mutex<HashMap<Hash, Arc<HandleSlot>>>,
    shader_modules: Mutex<HashMap<Hash, Arc<HandleSlot>>>,
    graphics_pipelines: Mutex<HashMap<Hash, Arc<HandleSlot>>>,
    compute_pipelines: Mutex<HashMap<Hash, Arc<HandleSlot>>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, kind: ResourceKind) -> &Mutex<HashMap<Hash, Arc<HandleSlot>>> {
        match kind {
            ResourceKind::Sampler => &self.samplers,
            ResourceKind::DescriptorSetLayout => &self.descriptor_set_layouts,
            ResourceKind::PipelineLayout => &self.pipeline_layouts,
            ResourceKind::RenderPass => &self.render_passes,
            ResourceKind::ShaderModule => &self.shader_modules,
            ResourceKind::GraphicsPipeline => &self.graphics_pipelines,
            ResourceKind::ComputePipeline => &self.compute_pipelines,
            ResourceKind::ApplicationInfo => {
                unreachable!("application info records produce no handles")
            }
        }
    }

    /// Returns the cell for `hash`, inserting a null cell if absent. The
    /// returned cell stays valid for the registry's whole lifetime.
    pub fn get_or_insert(&self, kind: ResourceKind, hash: Hash) -> Arc<HandleSlot> {
        self.map(kind)
            .lock()
            .unwrap()
            .entry(hash)
            .or_default()
            .clone()
    }

    pub fn len(&self, kind: ResourceKind) -> usize {
        self.map(kind).lock().unwrap().len()
    }

    pub fn is_empty(&self, kind: ResourceKind) -> bool {
        self.len(kind) == 0
    }

    /// Snapshot of all entries in a category.
    pub fn entries(&self, kind: ResourceKind) -> Vec<(Hash, RawHandle)> {
        self.map(kind)
            .lock()
            .unwrap()
            .iter()
            .map(|(hash, slot)| (*hash, slot.get()))
            .collect()
    }

    /// Destroys every live handle and clears all maps. Called once at
    /// teardown, after the worker pool has been joined.
    pub fn drain_and_destroy(&self, device: &dyn GpuDevice) {
        for kind in DESTRUCTION_ORDER {
            let mut map = self.map(kind).lock().unwrap();
            for (_, slot) in map.drain() {
                let handle = slot.take();
                if handle != NULL_HANDLE {
                    device.destroy(kind, handle);
                }
            }
        }
    }
}
