//! The staged replay scheduler.
//!
//! A [`Replayer`] owns the handle registries, the work queue, and a fixed
//! pool of worker threads. The record parser feeds it through the
//! [`ReplayConsumer`] operations: trivial categories are created inline on
//! the calling thread, deferred categories (shader modules and pipelines)
//! are bundled into work items and built by the pool. [`ReplayConsumer::sync`]
//! is the cross-phase barrier.

pub mod driver;
pub mod queue;
pub mod registry;
pub mod stats;
mod worker;

use std::sync::Arc;
use std::thread::JoinHandle;

use crate::descriptors::{
    ApplicationInfoDesc, DeviceFeaturesDesc, RenderPassDesc, ResolvedComputePipeline,
    ResolvedGraphicsPipeline, ResolvedPipelineLayout, ResolvedSetLayout, SamplerDesc,
    ShaderModuleDesc,
};
use crate::device::{DeviceError, GpuDevice, RawHandle, NULL_HANDLE};
use crate::filter::ReplayFilter;
use crate::replay::queue::{WorkItem, WorkPayload, WorkQueue};
use crate::replay::registry::{HandleRegistry, HandleSlot};
use crate::replay::stats::{ReplayStats, StatsSnapshot};
use crate::replay::worker::{run_worker, Share};
use crate::{Hash, ResourceKind};

#[derive(Debug)]
pub enum ReplayError {
    Device(DeviceError),
}

impl From<DeviceError> for ReplayError {
    fn from(err: DeviceError) -> Self {
        ReplayError::Device(err)
    }
}

/// The callback surface the record parser drives.
///
/// Deferred operations return as soon as the work item is queued; their
/// output cell is only guaranteed to be populated after the next `sync`.
pub trait ReplayConsumer {
    /// Called at most once, before any enqueue.
    fn set_application_info(
        &self,
        app: &ApplicationInfoDesc,
        features: &DeviceFeaturesDesc,
    ) -> Result<(), ReplayError>;

    fn enqueue_sampler(
        &self,
        hash: Hash,
        desc: SamplerDesc,
        output: &Arc<HandleSlot>,
    ) -> Result<(), ReplayError>;

    fn enqueue_descriptor_set_layout(
        &self,
        hash: Hash,
        desc: ResolvedSetLayout,
        output: &Arc<HandleSlot>,
    ) -> Result<(), ReplayError>;

    fn enqueue_pipeline_layout(
        &self,
        hash: Hash,
        desc: ResolvedPipelineLayout,
        output: &Arc<HandleSlot>,
    ) -> Result<(), ReplayError>;

    fn enqueue_render_pass(
        &self,
        hash: Hash,
        desc: RenderPassDesc,
        output: &Arc<HandleSlot>,
    ) -> Result<(), ReplayError>;

    fn enqueue_shader_module(
        &self,
        hash: Hash,
        desc: ShaderModuleDesc,
        output: &Arc<HandleSlot>,
    ) -> Result<(), ReplayError>;

    fn enqueue_graphics_pipeline(
        &self,
        hash: Hash,
        desc: ResolvedGraphicsPipeline,
        output: &Arc<HandleSlot>,
    ) -> Result<(), ReplayError>;

    fn enqueue_compute_pipeline(
        &self,
        hash: Hash,
        desc: ResolvedComputePipeline,
        output: &Arc<HandleSlot>,
    ) -> Result<(), ReplayError>;

    /// Blocks until the work queue has fully drained.
    fn sync(&self);
}

#[derive(Debug, Copy, Clone)]
pub struct ReplayOptions {
    /// Worker thread count. `0` selects the number of hardware threads.
    pub num_threads: usize,
    /// How many times each deferred object is re-created, for driver
    /// benchmarking. Floored at 1.
    pub loop_count: u32,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            num_threads: 0,
            loop_count: 1,
        }
    }
}

pub struct Replayer {
    share: Arc<Share>,
    registry: HandleRegistry,
    filter: ReplayFilter,
    device: Arc<dyn GpuDevice>,
    workers: Vec<JoinHandle<()>>,
}

impl Replayer {
    pub fn new(device: Arc<dyn GpuDevice>, filter: ReplayFilter, options: ReplayOptions) -> Self {
        let num_threads = if options.num_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            options.num_threads
        };

        let share = Arc::new(Share {
            queue: WorkQueue::new(),
            device: device.clone(),
            stats: ReplayStats::new(),
            loop_count: options.loop_count.max(1),
        });

        let workers = (0..num_threads)
            .map(|_| {
                let share = share.clone();
                std::thread::spawn(move || run_worker(share))
            })
            .collect();

        Self {
            share,
            registry: HandleRegistry::new(),
            filter,
            device,
            workers,
        }
    }

    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.share.stats.snapshot()
    }

    fn register_trivial(
        &self,
        kind: ResourceKind,
        hash: Hash,
        result: Result<RawHandle, DeviceError>,
        output: &Arc<HandleSlot>,
    ) -> Result<(), ReplayError> {
        match result {
            Ok(handle) => {
                output.store(handle);
                self.registry.get_or_insert(kind, hash).store(handle);
                Ok(())
            }
            Err(err) => {
                log::error!("Creating {:?} {:#018x} failed: {:?}", kind, hash, err);
                Err(ReplayError::Device(err))
            }
        }
    }

    fn push_deferred(
        &self,
        kind: ResourceKind,
        hash: Hash,
        payload: WorkPayload,
        output: &Arc<HandleSlot>,
    ) {
        let registry_slot = self.registry.get_or_insert(kind, hash);
        self.share.queue.push(WorkItem {
            hash,
            payload,
            output: output.clone(),
            registry_slot,
        });
    }
}

impl ReplayConsumer for Replayer {
    fn set_application_info(
        &self,
        app: &ApplicationInfoDesc,
        features: &DeviceFeaturesDesc,
    ) -> Result<(), ReplayError> {
        self.device.set_application_info(app, features).map_err(|err| {
            log::error!("Failed to create device: {:?}", err);
            ReplayError::Device(err)
        })
    }

    fn enqueue_sampler(
        &self,
        hash: Hash,
        desc: SamplerDesc,
        output: &Arc<HandleSlot>,
    ) -> Result<(), ReplayError> {
        // Playback in-order on the driver thread.
        let result = self.device.create_sampler(hash, &desc);
        self.register_trivial(ResourceKind::Sampler, hash, result, output)
    }

    fn enqueue_descriptor_set_layout(
        &self,
        hash: Hash,
        desc: ResolvedSetLayout,
        output: &Arc<HandleSlot>,
    ) -> Result<(), ReplayError> {
        let result = self.device.create_descriptor_set_layout(hash, &desc);
        self.register_trivial(ResourceKind::DescriptorSetLayout, hash, result, output)
    }

    fn enqueue_pipeline_layout(
        &self,
        hash: Hash,
        desc: ResolvedPipelineLayout,
        output: &Arc<HandleSlot>,
    ) -> Result<(), ReplayError> {
        let result = self.device.create_pipeline_layout(hash, &desc);
        self.register_trivial(ResourceKind::PipelineLayout, hash, result, output)
    }

    fn enqueue_render_pass(
        &self,
        hash: Hash,
        desc: RenderPassDesc,
        output: &Arc<HandleSlot>,
    ) -> Result<(), ReplayError> {
        let result = self.device.create_render_pass(hash, &desc);
        self.register_trivial(ResourceKind::RenderPass, hash, result, output)
    }

    fn enqueue_shader_module(
        &self,
        hash: Hash,
        desc: ShaderModuleDesc,
        output: &Arc<HandleSlot>,
    ) -> Result<(), ReplayError> {
        self.push_deferred(
            ResourceKind::ShaderModule,
            hash,
            WorkPayload::ShaderModule(Arc::new(desc)),
            output,
        );
        Ok(())
    }

    fn enqueue_graphics_pipeline(
        &self,
        hash: Hash,
        desc: ResolvedGraphicsPipeline,
        output: &Arc<HandleSlot>,
    ) -> Result<(), ReplayError> {
        if self.filter.allows_graphics(hash) {
            self.push_deferred(
                ResourceKind::GraphicsPipeline,
                hash,
                WorkPayload::GraphicsPipeline(Arc::new(desc)),
                output,
            );
        } else {
            output.store(NULL_HANDLE);
        }
        Ok(())
    }

    fn enqueue_compute_pipeline(
        &self,
        hash: Hash,
        desc: ResolvedComputePipeline,
        output: &Arc<HandleSlot>,
    ) -> Result<(), ReplayError> {
        if self.filter.allows_compute(hash) {
            self.push_deferred(
                ResourceKind::ComputePipeline,
                hash,
                WorkPayload::ComputePipeline(Arc::new(desc)),
                output,
            );
        } else {
            output.store(NULL_HANDLE);
        }
        Ok(())
    }

    fn sync(&self) {
        self.share.queue.barrier();
    }
}

impl Drop for Replayer {
    fn drop(&mut self) {
        self.share.queue.shutdown();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("Replay worker panicked");
            }
        }
        self.registry.drain_and_destroy(self.device.as_ref());
    }
}
