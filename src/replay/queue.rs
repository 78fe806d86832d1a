//! The work queue feeding the worker pool.
//!
//! A single FIFO is shared by all deferred categories. The queued/completed
//! counter pair under the queue mutex is the only synchronization between
//! the driver thread and the workers: the driver's barrier waits until
//! every item ever pushed has been marked completed.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use crate::descriptors::{ResolvedComputePipeline, ResolvedGraphicsPipeline, ShaderModuleDesc};
use crate::replay::registry::HandleSlot;
use crate::{Hash, ResourceKind};

/// Descriptor payload of a deferred creation. Kept alive by the item until
/// the worker has finished with it.
#[derive(Debug, Clone)]
pub enum WorkPayload {
    ShaderModule(Arc<ShaderModuleDesc>),
    GraphicsPipeline(Arc<ResolvedGraphicsPipeline>),
    ComputePipeline(Arc<ResolvedComputePipeline>),
}

/// One unit of deferred creation.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub hash: Hash,
    pub payload: WorkPayload,
    /// The caller's output cell, inspectable after a barrier.
    pub output: Arc<HandleSlot>,
    /// The registry cell for `hash`; the worker publishes here.
    pub registry_slot: Arc<HandleSlot>,
}

impl WorkItem {
    pub fn kind(&self) -> ResourceKind {
        match self.payload {
            WorkPayload::ShaderModule(_) => ResourceKind::ShaderModule,
            WorkPayload::GraphicsPipeline(_) => ResourceKind::GraphicsPipeline,
            WorkPayload::ComputePipeline(_) => ResourceKind::ComputePipeline,
        }
    }
}

#[derive(Default)]
struct QueueState {
    items: VecDeque<WorkItem>,
    queued_count: u64,
    completed_count: u64,
    shutting_down: bool,
}

#[derive(Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    work_available: Condvar,
    work_done: Condvar,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: WorkItem) {
        let mut state = self.state.lock().unwrap();
        state.items.push_back(item);
        state.queued_count += 1;
        self.work_available.notify_one();
    }

    /// Blocks until an item is available or the queue is shut down.
    /// Returns `None` on shutdown; items still queued at that point are
    /// discarded with the queue.
    pub fn pop_blocking(&self) -> Option<WorkItem> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.shutting_down {
                return None;
            }
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            state = self.work_available.wait(state).unwrap();
        }
    }

    /// Marks one popped item as finished. Must be called exactly once per
    /// successful `pop_blocking`, whether the creation succeeded or not.
    pub fn mark_completed(&self) {
        let mut state = self.state.lock().unwrap();
        state.completed_count += 1;
        if state.completed_count == state.queued_count {
            self.work_done.notify_one();
        }
    }

    /// Blocks until every pushed item has completed.
    pub fn barrier(&self) {
        let mut state = self.state.lock().unwrap();
        while state.queued_count != state.completed_count {
            state = self.work_done.wait(state).unwrap();
        }
    }

    pub fn shutdown(&self) {
        let mut state = self.state.lock().unwrap();
        state.shutting_down = true;
        self.work_available.notify_all();
    }

    /// Current `(queued, completed)` counters.
    pub fn counters(&self) -> (u64, u64) {
        let state = self.state.lock().unwrap();
        (state.queued_count, state.completed_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_item(hash: Hash) -> WorkItem {
        WorkItem {
            hash,
            payload: WorkPayload::ShaderModule(Arc::new(ShaderModuleDesc::default())),
            output: Arc::new(HandleSlot::default()),
            registry_slot: Arc::new(HandleSlot::default()),
        }
    }

    #[test]
    fn fifo_order_and_counters() {
        let queue = WorkQueue::new();
        queue.push(dummy_item(1));
        queue.push(dummy_item(2));
        assert_eq!(queue.counters(), (2, 0));

        assert_eq!(queue.pop_blocking().unwrap().hash, 1);
        queue.mark_completed();
        assert_eq!(queue.pop_blocking().unwrap().hash, 2);
        queue.mark_completed();
        assert_eq!(queue.counters(), (2, 2));
    }

    #[test]
    fn barrier_returns_once_drained() {
        let queue = Arc::new(WorkQueue::new());
        queue.push(dummy_item(1));

        let worker_queue = queue.clone();
        let worker = std::thread::spawn(move || {
            let item = worker_queue.pop_blocking().unwrap();
            assert_eq!(item.hash, 1);
            worker_queue.mark_completed();
        });

        queue.barrier();
        let (queued, completed) = queue.counters();
        assert_eq!(queued, completed);
        worker.join().unwrap();
    }

    #[test]
    fn empty_barrier_does_not_block() {
        let queue = WorkQueue::new();
        queue.barrier();
    }

    #[test]
    fn shutdown_wakes_blocked_pop() {
        let queue = Arc::new(WorkQueue::new());
        let worker_queue = queue.clone();
        let worker = std::thread::spawn(move || worker_queue.pop_blocking());

        // Give the worker a chance to block on the condvar first.
        std::thread::sleep(std::time::Duration::from_millis(10));
        queue.shutdown();
        assert!(worker.join().unwrap().is_none());
    }

    #[test]
    fn shutdown_takes_priority_over_pending_items() {
        let queue = WorkQueue::new();
        queue.push(dummy_item(1));
        queue.shutdown();
        assert!(queue.pop_blocking().is_none());
    }
}
