//! The worker loop draining the work queue.

use std::sync::Arc;
use std::time::Instant;

use crate::device::{DeviceError, GpuDevice, RawHandle, NULL_HANDLE};
use crate::replay::queue::{WorkItem, WorkPayload, WorkQueue};
use crate::replay::stats::ReplayStats;
use crate::ResourceKind;

/// State shared between the driver thread and the worker pool.
pub(super) struct Share {
    pub queue: WorkQueue,
    pub device: Arc<dyn GpuDevice>,
    pub stats: ReplayStats,
    pub loop_count: u32,
}

pub(super) fn run_worker(share: Arc<Share>) {
    while let Some(item) = share.queue.pop_blocking() {
        match &item.payload {
            WorkPayload::ShaderModule(desc) => {
                let desc = desc.clone();
                replay_item(&share, &item, move |device, hash| {
                    device.create_shader_module(hash, &desc)
                });
            }
            WorkPayload::GraphicsPipeline(desc) => {
                let desc = desc.clone();
                replay_item(&share, &item, move |device, hash| {
                    device.create_graphics_pipeline(hash, &desc)
                });
            }
            WorkPayload::ComputePipeline(desc) => {
                let desc = desc.clone();
                replay_item(&share, &item, move |device, hash| {
                    device.create_compute_pipeline(hash, &desc)
                });
            }
        }
        share.queue.mark_completed();
    }
}

/// Builds one item `loop_count` times, destroying the previous handle
/// before each repetition so repetitions never leak. On success the new
/// handle is published to both the caller's output cell and the registry
/// cell; on failure both stay null and the failure is only logged.
fn replay_item(
    share: &Share,
    item: &WorkItem,
    create: impl Fn(&dyn GpuDevice, crate::Hash) -> Result<RawHandle, DeviceError>,
) {
    let kind = item.kind();
    for _ in 0..share.loop_count {
        let previous = item.registry_slot.take();
        if previous != NULL_HANDLE {
            share.device.destroy(kind, previous);
        }

        let start = Instant::now();
        match create(share.device.as_ref(), item.hash) {
            Ok(handle) => {
                share.stats.record(kind, start.elapsed());
                item.output.store(handle);
                item.registry_slot.store(handle);
            }
            Err(err) => {
                log_create_failure(kind, item.hash, &err);
                item.output.store(NULL_HANDLE);
            }
        }
    }
}

fn log_create_failure(kind: ResourceKind, hash: crate::Hash, err: &DeviceError) {
    match kind {
        ResourceKind::ShaderModule => {
            log::error!("Failed to create shader module for hash {:#018x}: {:?}", hash, err)
        }
        ResourceKind::GraphicsPipeline => {
            log::error!("Failed to create graphics pipeline for hash {:#018x}: {:?}", hash, err)
        }
        ResourceKind::ComputePipeline => {
            log::error!("Failed to create compute pipeline for hash {:#018x}: {:?}", hash, err)
        }
        _ => log::error!("Failed to create object for hash {:#018x}: {:?}", hash, err),
    }
}
